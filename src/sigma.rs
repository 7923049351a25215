//! Generation of sigma files, the stress sequence format read by the
//! fatigue analysis engine.
//!
//! Each peak of the spectrum becomes one stress made of four parts,
//! 1g + increment + delta-p + delta-t, each corrected separately before
//! they are summed. Values are written 10 to a line in 14 character
//! fields.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::classcode::ClassCode;
use crate::deltap::{self, DPRatio};
use crate::deltat::{self, DTInput, DTInterpolator};
use crate::error::Result;
use crate::modifier::{Factors, Segment};
use crate::store::{AnaPeak, Store};
use crate::stress::{StressComponent, StressSampler, StressType};
use crate::task::Task;

/// Number of values on a full line of peaks.
pub const NUM_COLS: usize = 10;

/// Everything needed to turn a spectrum and a stress table into a sigma
/// file.
#[derive(Debug, Clone, Default)]
pub struct SigmaInput {
    pub component: StressComponent,
    pub factors: Factors,
    pub remove_negative: bool,
    /// Reference pressure, zero or `None` to look it up.
    pub reference_dp: Option<f64>,
    /// Delta-p load case, `None` for the flagged one.
    pub dp_loadcase: Option<String>,
    pub delta_t: DTInput,
    pub ana_id: i64,
    pub txt_id: i64,
    pub fls_id: i64,
    pub conv_id: i64,
    pub stf_id: i64,
    /// Total number of flights of the sequence.
    pub validity: i64,
}

/// Format a stress the way the engine reads it, e.g. `1.234560E02` or
/// `-5.000000E-03`.
pub fn format_stress(value: f64) -> String {
    let text = format!("{:.6e}", value);
    match text.find('e') {
        Some(pos) => {
            let mantissa = &text[..pos];
            let exponent = text[pos + 1..].parse::<i32>().unwrap_or(0);
            let sign = if exponent < 0 { "-" } else { "" };
            format!("{}E{}{:02}", mantissa, sign, exponent.abs())
        }
        None => text,
    }
}

#[derive(Debug, Clone)]
struct OnegStress {
    segment: Option<Segment>,
    stress: f64,
}

/// Stresses already computed during a run.
#[derive(Debug, Default)]
struct StressCache {
    /// Keyed by 1g code.
    oneg: HashMap<String, OnegStress>,
    /// Keyed by the full class code.
    increment: HashMap<String, f64>,
}

/// Composes the stress of a peak from its parts.
struct Composer<'a> {
    store: &'a dyn Store,
    input: &'a SigmaInput,
    sampler: StressSampler<'a>,
    dp_ratio: Option<DPRatio>,
    delta_t: DTInterpolator,
}

impl<'a> Composer<'a> {
    fn oneg_stress(&self, oneg_code: &str) -> Result<OnegStress> {
        match self.store.oneg_issy_code(self.input.txt_id, oneg_code)? {
            Some(code) => {
                let segment = Segment::from_flight_phase(&code.flight_phase, code.order);
                let stress = self.sampler.sample(&code.issy_code)?;
                let stress = self
                    .input
                    .factors
                    .modify(stress, StressType::OneG, Some(&segment), Some(&code.issy_code));
                Ok(OnegStress {
                    segment: Some(segment),
                    stress,
                })
            }
            None => {
                debug!("no 1g load case for code '{}'", oneg_code);
                Ok(OnegStress {
                    segment: None,
                    stress: self.input.factors.modify(0.0, StressType::OneG, None, None),
                })
            }
        }
    }

    fn increment_stress(&self, class_code: &ClassCode, segment: Option<&Segment>) -> Result<f64> {
        let mut total = 0.0;
        for increment in &class_code.increments {
            for code in self.store.increment_issy_codes(self.input.txt_id, &class_code.oneg, increment)? {
                let stress = code.factor * self.sampler.sample(&code.issy_code)?;
                total += self
                    .input
                    .factors
                    .modify(stress, StressType::Increment, segment, Some(&code.issy_code));
            }
        }
        Ok(total)
    }

    fn peak_stress(&self, cache: &mut StressCache, peak: &AnaPeak) -> Result<f64> {
        let class_code = ClassCode::parse(&peak.class_code)?;

        let oneg = match cache.oneg.get(&class_code.oneg).cloned() {
            Some(oneg) => oneg,
            None => {
                let oneg = self.oneg_stress(&class_code.oneg)?;
                cache.oneg.insert(class_code.oneg.clone(), oneg.clone());
                oneg
            }
        };
        let segment = oneg.segment.as_ref();

        let increment = match cache.increment.get(&class_code.code).cloned() {
            Some(stress) => stress,
            None => {
                let stress = self.increment_stress(&class_code, segment)?;
                cache.increment.insert(class_code.code.clone(), stress);
                stress
            }
        };

        let delta_p = match self.dp_ratio {
            Some(ref ratio) => self.input.factors.modify(
                ratio.stress(peak.delta_p),
                StressType::DeltaP,
                segment,
                Some(&ratio.issy_code),
            ),
            None => 0.0,
        };

        let delta_t = self.delta_t.corrected_stress(peak.delta_t, &self.input.factors, segment);

        let total = oneg.stress + increment + delta_p + delta_t;
        if total < 0.0 && self.input.remove_negative {
            Ok(0.0)
        } else {
            Ok(total)
        }
    }
}

/// Removes a partly written output file unless told to keep it.
pub(crate) struct PartialOutput<'a> {
    path: &'a Path,
    keep: bool,
}

impl<'a> PartialOutput<'a> {
    pub(crate) fn new(path: &'a Path) -> Self {
        Self { path, keep: false }
    }

    pub(crate) fn keep(&mut self) {
        self.keep = true;
    }
}

impl<'a> Drop for PartialOutput<'a> {
    fn drop(&mut self) {
        if !self.keep {
            let _e = fs::remove_file(self.path);
        }
    }
}

fn write_header<W: Write>(store: &dyn Store, task: &dyn Task, input: &SigmaInput, writer: &mut W) -> Result<()> {
    task.update_message("Writing SIGMA file header...");
    writeln!(writer, "NBVOL {:>6} ! TOTAL NUMBER OF FLIGHTS", input.validity)?;
    writeln!(
        writer,
        "NBTYPEVOL {:>6} ! TOTAL NUMBER OF TYPE FLIGHTS",
        store.num_flight_types(input.ana_id)?
    )?;
    writeln!(writer)?;
    Ok(())
}

/// Returns false when cancelled.
fn write_flight_sequence<W: Write>(store: &dyn Store, task: &dyn Task, input: &SigmaInput, writer: &mut W) -> Result<bool> {
    task.update_message("Writing flight sequence...");
    writeln!(writer, "FLIGHTS SEQUENCE")?;

    let total = input.validity.max(0) as usize;
    for (count, name) in store.fls_flight_names(input.fls_id)?.iter().enumerate() {
        if task.is_cancelled() {
            return Ok(false);
        }
        task.update_progress(count, total);
        for flight_num in store.ana_flight_numbers(input.ana_id, name)? {
            writeln!(writer, "{:>6} ! FLIGHT {}", flight_num + 1, name)?;
        }
    }
    Ok(true)
}

/// Write the sigma file of `input` to `output`.
///
/// Returns the path of the written file, or `None` when the task was
/// cancelled, in which case nothing is left at `output`.
pub fn generate_sigma(store: &dyn Store, task: &dyn Task, input: &SigmaInput, output: &Path) -> Result<Option<PathBuf>> {
    task.update_message("Generating stress sequence...");

    let mut partial = PartialOutput::new(output);
    let mut writer = BufWriter::new(File::create(output)?);

    write_header(store, task, input, &mut writer)?;
    if task.is_cancelled() {
        return Ok(None);
    }

    if !write_flight_sequence(store, task, input, &mut writer)? || task.is_cancelled() {
        return Ok(None);
    }

    let sampler = StressSampler::new(store, input.stf_id, input.component);

    task.update_message("Computing delta-p ratio...");
    let reference_dp = deltap::reference_dp(store, input.reference_dp, input.conv_id, input.ana_id)?;
    let dp_ratio = deltap::dp_ratio(
        store,
        &sampler,
        task,
        input.txt_id,
        input.dp_loadcase.as_ref().map(|s| s.as_str()),
        reference_dp,
    )?;

    task.update_message("Computing delta-t interpolation...");
    let delta_t = deltat::dt_interpolator(store, &sampler, task, input.txt_id, &input.delta_t)?;

    let total_peaks = store.total_peaks(input.ana_id)?;
    if task.is_cancelled() {
        return Ok(None);
    }

    let composer = Composer {
        store,
        input,
        sampler,
        dp_ratio,
        delta_t,
    };
    let mut cache = StressCache::default();
    let mut peak_count = 0;

    for flight in store.ana_flights(input.ana_id)? {
        if task.is_cancelled() {
            return Ok(None);
        }

        task.update_message(&format!("Generating flight '{}'...", flight.name));
        let flight_num = flight.flight_num + 1;
        writeln!(writer)?;
        writeln!(writer, "NUVOL {:>6} ! FLIGHT {}", flight_num, flight.name)?;
        writeln!(writer, "TITLE FLIGHT NB {:>6} ! FLIGHT {}", flight_num, flight.name)?;
        writeln!(writer, "NBOCCU {:>4}", flight.validity as i64)?;
        writeln!(writer, "NBVAL {:>6}", flight.num_peaks)?;

        let mut line = String::new();
        let mut column = 0;
        for peak in store.ana_peaks(input.ana_id, flight.flight_id)? {
            if task.is_cancelled() {
                return Ok(None);
            }
            task.update_progress(peak_count, total_peaks);
            peak_count += 1;

            let stress = composer.peak_stress(&mut cache, &peak)?;
            line.push_str(&format!("{:>14}", format_stress(stress)));
            column += 1;
            if column == NUM_COLS {
                writeln!(writer, "{}", line)?;
                line.clear();
                column = 0;
            }
        }
        if column > 0 {
            writeln!(writer, "{}", line)?;
        }
    }

    writeln!(writer)?;
    writer.flush()?;
    drop(writer);

    partial.keep();
    info!("Sigma file written to {}", output.display());
    Ok(Some(output.to_path_buf()))
}
