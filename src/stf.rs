//! Export of a stress table to an STF text file.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use log::info;

use crate::error::Result;
use crate::sigma::PartialOutput;
use crate::store::Store;
use crate::task::Task;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Write all stresses of stress table `stf_id` to `output`, one load case
/// per line ordered by issy code. The shear and Y columns are only
/// written for a 2D stress state.
pub fn save_stf(store: &dyn Store, task: &dyn Task, stf_id: i64, is_2d: bool, output: &Path) -> Result<Option<PathBuf>> {
    task.update_message("Writing STF stresses...");

    let mut partial = PartialOutput::new(output);
    let mut writer = BufWriter::new(File::create(output)?);

    writeln!(writer, "# STF Generated by stressgen Version {}", VERSION)?;
    let mut header = format!("{:<10}{:<10}", "LCASE", "SX");
    if is_2d {
        header.push_str(&format!("{:<10}{:<10}", "SY", "SXY"));
    }
    writeln!(writer, "{}", header)?;

    let stresses = store.stf_stresses(stf_id)?;
    let total = stresses.len();
    for (count, (issy_code, row)) in stresses.iter().enumerate() {
        if task.is_cancelled() {
            return Ok(None);
        }
        task.update_progress(count + 1, total);

        let mut line = format!("{:<10}{:<10}", issy_code, format!("{:.2}", row.x));
        if is_2d {
            line.push_str(&format!("{:<10}{:<10}", format!("{:.2}", row.y), format!("{:.2}", row.xy)));
        }
        writeln!(writer, "{}", line)?;
    }

    writer.flush()?;
    drop(writer);
    partial.keep();
    info!("Saved {} stresses to {}", total, output.display());
    Ok(Some(output.to_path_buf()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteStore;
    use crate::stress::StressRow;
    use crate::task::Tracker;
    use std::fs;
    use tempdir::TempDir;

    fn table() -> SqliteStore {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .insert_stf_stress(4, "2001", &StressRow { x: -3.456, y: 2.0, xy: 0.125 })
            .unwrap();
        store
            .insert_stf_stress(4, "1001", &StressRow { x: 120.0, y: 15.5, xy: -7.25 })
            .unwrap();
        store.insert_stf_stress(5, "9999", &StressRow::default()).unwrap();
        store
    }

    #[test]
    fn one_dimensional_table() {
        let store = table();
        let dir = TempDir::new("stf").unwrap();
        let output = dir.path().join("table.stf");

        save_stf(&store, &Tracker::new(), 4, false, &output).unwrap().unwrap();

        let text = fs::read_to_string(&output).unwrap();
        let lines = text.lines().collect::<Vec<_>>();
        assert_eq!(lines[0], format!("# STF Generated by stressgen Version {}", VERSION));
        assert_eq!(lines[1], "LCASE     SX        ");
        assert_eq!(lines[2], "1001      120.00    ");
        assert_eq!(lines[3], "2001      -3.46     ");
        assert_eq!(lines.len(), 4);
    }

    #[test]
    fn two_dimensional_table() {
        let store = table();
        let dir = TempDir::new("stf").unwrap();
        let output = dir.path().join("table.stf");

        save_stf(&store, &Tracker::new(), 4, true, &output).unwrap().unwrap();

        let text = fs::read_to_string(&output).unwrap();
        let lines = text.lines().collect::<Vec<_>>();
        assert_eq!(lines[1], "LCASE     SX        SY        SXY       ");
        assert_eq!(lines[2], "1001      120.00    15.50     -7.25     ");
    }

    #[test]
    fn cancelled_export_removes_file() {
        let store = table();
        let dir = TempDir::new("stf").unwrap();
        let output = dir.path().join("table.stf");
        let tracker = Tracker::new();
        tracker.cancel();

        assert!(save_stf(&store, &tracker, 4, false, &output).unwrap().is_none());
        assert!(!output.exists());
    }
}
