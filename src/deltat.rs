//! Delta-t (temperature) stress interpolation.

use crate::error::Result;
use crate::modifier::{Factors, Segment};
use crate::store::Store;
use crate::stress::{StressSampler, StressType};
use crate::task::Task;

/// A load case sampled at a reference temperature.
#[derive(Debug, Clone, PartialEq)]
pub struct DTPoint {
    pub flight_phase: String,
    pub issy_code: String,
    pub stress: f64,
    pub reference_temperature: f64,
}

/// How the delta-t stress of a peak is found from its temperature.
#[derive(Debug, Clone, PartialEq)]
pub enum DTInterpolator {
    None,
    /// Stress proportional to the temperature through a single point.
    OnePoint(DTPoint),
    /// Straight line through a superior and an inferior point. A missing
    /// point counts as zero stress at its reference temperature.
    TwoPoints {
        sup: Option<DTPoint>,
        inf: Option<DTPoint>,
        ref_sup: f64,
        ref_inf: f64,
    },
}

impl Default for DTInterpolator {
    fn default() -> Self {
        DTInterpolator::None
    }
}

impl DTInterpolator {
    /// Raw delta-t stress at a temperature, before any correction.
    pub fn stress(&self, temperature: f64) -> f64 {
        match self {
            DTInterpolator::None => 0.0,
            DTInterpolator::OnePoint(point) => {
                if point.reference_temperature == 0.0 {
                    return 0.0;
                }
                point.stress * temperature / point.reference_temperature
            }
            DTInterpolator::TwoPoints {
                sup,
                inf,
                ref_sup,
                ref_inf,
            } => {
                let stress_sup = sup.as_ref().map_or(0.0, |p| p.stress);
                let stress_inf = inf.as_ref().map_or(0.0, |p| p.stress);
                if ref_sup == ref_inf {
                    return stress_sup;
                }
                stress_inf + (stress_sup - stress_inf) * (temperature - ref_inf) / (ref_sup - ref_inf)
            }
        }
    }

    /// Delta-t stress at a temperature with the corrections of `factors`
    /// applied. The two point variant runs the load case pass against
    /// either of its issy codes.
    pub fn corrected_stress(&self, temperature: f64, factors: &Factors, segment: Option<&Segment>) -> f64 {
        let stress = self.stress(temperature);
        match self {
            DTInterpolator::None => stress,
            DTInterpolator::OnePoint(point) => {
                factors.modify(stress, StressType::DeltaT, segment, Some(&point.issy_code))
            }
            DTInterpolator::TwoPoints { sup, inf, .. } => {
                let codes = sup
                    .iter()
                    .chain(inf.iter())
                    .map(|p| p.issy_code.as_str())
                    .collect::<Vec<_>>();
                factors.modify_matching(stress, StressType::DeltaT, segment, &codes)
            }
        }
    }
}

/// The delta-t load cases asked for by a run.
#[derive(Debug, Clone, PartialEq)]
pub enum DTInput {
    None,
    OnePoint { loadcase: String, reference_temperature: f64 },
    TwoPoints {
        loadcase_sup: String,
        loadcase_inf: String,
        ref_sup: f64,
        ref_inf: f64,
    },
}

impl Default for DTInput {
    fn default() -> Self {
        DTInput::None
    }
}

fn dt_point(
    store: &dyn Store,
    sampler: &StressSampler,
    txt_id: i64,
    loadcase: &str,
    reference_temperature: f64,
) -> Result<Option<DTPoint>> {
    match store.loadcase(txt_id, loadcase)? {
        Some(info) => Ok(Some(DTPoint {
            stress: sampler.sample(&info.issy_code)?,
            flight_phase: info.flight_phase,
            issy_code: info.issy_code,
            reference_temperature,
        })),
        None => Ok(None),
    }
}

/// Look up the load cases of `input` and build the interpolator. Load cases
/// that cannot be found are reported as task warnings.
pub fn dt_interpolator(
    store: &dyn Store,
    sampler: &StressSampler,
    task: &dyn Task,
    txt_id: i64,
    input: &DTInput,
) -> Result<DTInterpolator> {
    match input {
        DTInput::None => Ok(DTInterpolator::None),
        DTInput::OnePoint {
            loadcase,
            reference_temperature,
        } => match dt_point(store, sampler, txt_id, loadcase, *reference_temperature)? {
            Some(point) => Ok(DTInterpolator::OnePoint(point)),
            None => {
                task.add_warning(&format!("Delta-T superior load case '{}' could not be found.", loadcase));
                Ok(DTInterpolator::None)
            }
        },
        DTInput::TwoPoints {
            loadcase_sup,
            loadcase_inf,
            ref_sup,
            ref_inf,
        } => {
            let sup = dt_point(store, sampler, txt_id, loadcase_sup, *ref_sup)?;
            if sup.is_none() {
                task.add_warning(&format!("Delta-T superior load case '{}' could not be found.", loadcase_sup));
            }
            let inf = dt_point(store, sampler, txt_id, loadcase_inf, *ref_inf)?;
            if inf.is_none() {
                task.add_warning(&format!("Delta-T inferior load case '{}' could not be found.", loadcase_inf));
            }
            if sup.is_none() && inf.is_none() {
                return Ok(DTInterpolator::None);
            }
            Ok(DTInterpolator::TwoPoints {
                sup,
                inf,
                ref_sup: *ref_sup,
                ref_inf: *ref_inf,
            })
        }
    }
}
