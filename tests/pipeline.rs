extern crate fatigue;
extern crate tempdir;

use std::fs;
use std::path::Path;

use fatigue::deltat::DTInput;
use fatigue::modifier::{Factors, LoadcaseFactor, Method, Modifier, Segment, SegmentFactor};
use fatigue::sigma::{generate_sigma, SigmaInput};
use fatigue::stf::save_stf;
use fatigue::sth::load_sth;
use fatigue::store::{AnaPeak, SqliteStore, Store};
use fatigue::stress::{StressRow, StressType};
use fatigue::task::Tracker;
use tempdir::TempDir;

fn stress(x: f64) -> StressRow {
    StressRow { x, y: 0.0, xy: 0.0 }
}

/// One typical flight of two peaks over a load case table with a 1g,
/// an increment, a delta-p and a delta-t load case.
fn build_spectrum(database: &Path) -> SigmaInput {
    let store = SqliteStore::open(database).unwrap();
    let ana_id = store.insert_ana_file("spectrum", 1).unwrap();
    let flight_id = store.insert_ana_flight(ana_id, 0, "TF_A", 2, 1.0, 4.0).unwrap();
    let peaks = [("01001100000000", 4.0, 10.0), ("01000000000000", 0.0, 0.0)];
    for (i, &(code, delta_p, delta_t)) in peaks.iter().enumerate() {
        let peak = AnaPeak {
            peak_num: i as i64,
            class_code: code.to_string(),
            delta_p,
            delta_t,
        };
        store.insert_ana_peak(ana_id, flight_id, &peak).unwrap();
    }

    store.insert_oneg_code(1, "0100", "CRUISE_1G", "1001", 1, false).unwrap();
    store
        .insert_increment_code(1, "0100", 1, "1", None, "CRUISE_GUST", "2001", &[0.5])
        .unwrap();
    store.insert_loadcase(1, "CABIN_DP", "3001", true).unwrap();
    store.insert_loadcase(1, "CRUISE_DT", "4001", false).unwrap();
    for &(issy, x) in &[("1001", 100.0), ("2001", 40.0), ("3001", 30.0), ("4001", 60.0)] {
        store.insert_stf_stress(1, issy, &stress(x)).unwrap();
    }
    store.insert_fls_flight_name(1, 0, "TF_A").unwrap();
    let conv_id = store.insert_conversion_table(Some(8.0)).unwrap();

    let mut factors = Factors::default();
    factors.overall.set(StressType::OneG, Modifier::new(Method::Multiply, 1.1));
    factors
        .segments
        .push(SegmentFactor::new(Segment::new("CRUISE", 1)).with(StressType::OneG, Modifier::new(Method::Add, 5.0)));
    factors
        .loadcases
        .push(LoadcaseFactor::new("2001", Modifier::new(Method::Multiply, 2.0)));

    SigmaInput {
        factors,
        delta_t: DTInput::OnePoint {
            loadcase: "4001".to_string(),
            reference_temperature: 20.0,
        },
        ana_id,
        txt_id: 1,
        fls_id: 1,
        conv_id,
        stf_id: 1,
        validity: 1,
        ..SigmaInput::default()
    }
}

#[test]
fn sigma_from_file_database() {
    let dir = TempDir::new("pipeline").unwrap();
    let database = dir.path().join("stressgen.db");
    let input = build_spectrum(&database);

    // reopen to read back what was committed
    let store = SqliteStore::open(&database).unwrap();
    let output = dir.path().join("job.sigma");
    let tracker = Tracker::new();
    generate_sigma(&store, &tracker, &input, &output).unwrap().unwrap();

    // 1g: 100 * 1.1 + 5, increment: 0.5 * 40 * 2, delta-p: 30 * 4 / 8, delta-t: 60 * 10 / 20
    let text = fs::read_to_string(&output).unwrap();
    let values = text
        .lines()
        .skip_while(|line| !line.starts_with("NBVAL"))
        .nth(1)
        .unwrap();
    assert_eq!(values, "   2.000000E02   1.150000E02");
    assert!(text.starts_with("NBVOL      1 ! TOTAL NUMBER OF FLIGHTS\n"));
    assert!(tracker.warnings().is_empty());
}

#[test]
fn missing_delta_t_loadcase_is_a_warning() {
    let dir = TempDir::new("pipeline").unwrap();
    let database = dir.path().join("stressgen.db");
    let mut input = build_spectrum(&database);
    input.delta_t = DTInput::OnePoint {
        loadcase: "9999".to_string(),
        reference_temperature: 20.0,
    };

    let store = SqliteStore::open(&database).unwrap();
    let output = dir.path().join("job.sigma");
    let tracker = Tracker::new();
    generate_sigma(&store, &tracker, &input, &output).unwrap().unwrap();

    let text = fs::read_to_string(&output).unwrap();
    assert!(text.contains("   1.700000E02   1.150000E02"));
    assert_eq!(tracker.warnings().len(), 1);
    assert!(tracker.warnings()[0].contains("9999"));
}

#[test]
fn loaded_sequence_and_stress_table_survive_reopening() {
    let dir = TempDir::new("pipeline").unwrap();
    let database = dir.path().join("stressgen.db");
    let sth = dir.path().join("gust.sth");
    let fls = dir.path().join("gust.fls");
    fs::write(
        &sth,
        "title\nunits\ncomment\ncolumns\n  3.00  1.00\n     4 A\n  12.5 -3.0\n  8.0  -1.5\n",
    )
    .unwrap();
    fs::write(&fls, "1 TF_A high\n1 TF_A high\n1 TF_A high\n").unwrap();

    let sequence = {
        let store = SqliteStore::open(&database).unwrap();
        store.insert_stf_stress(7, "1001", &StressRow { x: 1.005, y: -2.5, xy: 0.0 }).unwrap();
        load_sth(&store, &Tracker::new(), &sth, &fls).unwrap().unwrap()
    };

    let store = SqliteStore::open(&database).unwrap();
    assert_eq!(sequence.name, "gust");
    assert_eq!(store.sth_num_flights(sequence.id).unwrap(), 1);
    let flights = store.sth_flights(sequence.id).unwrap();
    assert_eq!(flights[0].name, "TF_A");
    assert_eq!(flights[0].num_peaks, 4);
    assert_eq!(
        store.sth_peaks(&sequence.peaks_table, sequence.flights[0].flight_id).unwrap(),
        vec![12.5, -3.0, 8.0, -1.5]
    );
    assert_eq!(store.fls_flights(sequence.id).unwrap().len(), 3);

    let output = dir.path().join("table.stf");
    save_stf(&store, &Tracker::new(), 7, true, &output).unwrap().unwrap();
    let text = fs::read_to_string(&output).unwrap();
    assert_eq!(text.lines().nth(2).unwrap(), "1001      1.00      -2.50     0.00      ");
    assert_eq!(store.stf_stresses(7).unwrap().len(), 1);
}
