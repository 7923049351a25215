//! Delta-p (pressure) stress ratio.

use log::info;

use crate::error::Result;
use crate::store::Store;
use crate::stress::StressSampler;
use crate::task::Task;

/// Scales the stress of the delta-p load case linearly with the delta-p
/// of each peak.
#[derive(Debug, Clone, PartialEq)]
pub struct DPRatio {
    pub reference_dp: f64,
    /// Stress of the delta-p load case at the reference pressure.
    pub reference_stress: f64,
    pub flight_phase: String,
    pub issy_code: String,
}

impl DPRatio {
    pub fn new(reference_dp: f64, reference_stress: f64, flight_phase: &str, issy_code: &str) -> Self {
        Self {
            reference_dp,
            reference_stress,
            flight_phase: flight_phase.to_string(),
            issy_code: issy_code.to_string(),
        }
    }

    /// Stress at a delta-p. A zero reference pressure gives no stress.
    pub fn stress(&self, delta_p: f64) -> f64 {
        if self.reference_dp == 0.0 {
            return 0.0;
        }
        self.reference_stress * delta_p / self.reference_dp
    }
}

/// Reference pressure from, in order of preference, the user, the
/// conversion table and the largest delta-p of the spectrum.
pub fn reference_dp(store: &dyn Store, user_ref_dp: Option<f64>, conv_id: i64, ana_id: i64) -> Result<f64> {
    let ref_dp = user_ref_dp.unwrap_or(0.0);
    if ref_dp != 0.0 {
        return Ok(ref_dp);
    }

    let ref_dp = store.conversion_ref_dp(conv_id)?;
    if ref_dp != 0.0 {
        return Ok(ref_dp);
    }

    let ref_dp = store.max_delta_p(ana_id)?;
    info!("Using maximum delta-p of the spectrum {} as reference pressure", ref_dp);
    Ok(ref_dp)
}

/// Build the delta-p ratio of a spectrum.
///
/// When `loadcase` is given it is used directly, otherwise the load case
/// flagged as the delta-p case is used. `None` is returned when no load
/// case is found. A configured load case that cannot be found is also
/// reported as a warning on the task.
pub fn dp_ratio(
    store: &dyn Store,
    sampler: &StressSampler,
    task: &dyn Task,
    txt_id: i64,
    loadcase: Option<&str>,
    reference_dp: f64,
) -> Result<Option<DPRatio>> {
    let info = match loadcase {
        Some(code) => store.loadcase(txt_id, code)?,
        None => store.delta_p_loadcase(txt_id)?,
    };

    match info {
        Some(info) => {
            let stress = sampler.sample(&info.issy_code)?;
            Ok(Some(DPRatio::new(reference_dp, stress, &info.flight_phase, &info.issy_code)))
        }
        None => {
            if let Some(code) = loadcase {
                task.add_warning(&format!("Delta-P load case '{}' could not be found.", code));
            }
            Ok(None)
        }
    }
}
