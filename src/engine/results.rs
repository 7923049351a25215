//! Reading the damage and equivalent stress out of the engine output.

use std::fs;
use std::path::Path;

use crate::error::Result;

/// Marks the start of the sequence results in the dossier.
pub const SEQUENCE_MARKER: &str = "ANALYSE DE LA SEQUENCE";
pub const EQUIVALENT_STRESS_MARKER: &str = "SMAX equivalent amor (MPa)";
pub const DAMAGE_MARKER: &str = "ENDOMMAGEMENT SEQUENCE";

/// Outcome of the analysis of one damage contribution.
#[derive(Debug, Clone, PartialEq)]
pub struct DamageContributionResult {
    pub index: usize,
    pub damage: f64,
    /// Fatigue equivalent stress.
    pub stress: f64,
}

/// Read a text file, replacing anything that is not valid UTF-8.
pub fn read_lossy(path: &Path) -> Result<String> {
    let bytes = fs::read(path)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Equivalent stress from the dossier, taken from the third `:` separated
/// field of the first stress line after the sequence marker.
pub fn extract_equivalent_stress(dossier: &str) -> Option<f64> {
    dossier
        .lines()
        .skip_while(|line| !line.contains(SEQUENCE_MARKER))
        .skip(1)
        .find(|line| line.contains(EQUIVALENT_STRESS_MARKER))
        .and_then(|line| line.split(':').nth(2))
        .and_then(|field| field.trim().parse::<f64>().ok())
}

/// Damage from the engine log, the value after `=` on the damage line.
pub fn extract_damage(log: &str) -> Option<f64> {
    log.lines()
        .find(|line| line.contains(DAMAGE_MARKER))
        .and_then(|line| line.split('=').nth(1))
        .and_then(|field| field.trim().parse::<f64>().ok())
}
