/// stressgen
///
/// A program to build the stress sequences used in fatigue damage
/// calculations.
///
/// **stressgen** is a thin command line front end. The calculations are
/// done through calls to the associated **fatigue** library which is
/// included. The command line flags are used to build the
/// **StressgenOptions** data structure, one subcommand at a time:
///
/// 1. `load` reads an STH stress sequence and its FLS flight sequence
///    into the database
/// 2. `sigma` combines a spectrum with a stress table and writes the
///    sigma file read by the fatigue engine
/// 3. `analyse` runs damage contributions through the external engine
///    and reports the damage and equivalent stress of each
/// 4. `stf` exports a stress table to text

#[macro_use]
extern crate clap;
extern crate env_logger;
extern crate fatigue;
extern crate log;

use std::path::Path;

use fatigue::error::Result;
use fatigue::store::{SqliteStore, Store};
use fatigue::task::Tracker;
use fatigue::{engine, sigma, stf, sth, COMMENT};
use log::error;
use options::clap::get_options_clap;
use options::{AnalyseOptions, Command, LoadOptions, SigmaOptions, StfOptions};

mod options;

fn main() {
    env_logger::init();

    let mut options = options::get_default_options();
    get_options_clap("", &mut options);
    println!("{}stressgen: version {}", COMMENT, crate_version!());
    println!("{}", COMMENT);
    if options.verbosity == options::Verbosity::Verbose {
        println!("{}Options: ", COMMENT);
        println!("{}", options);
    }

    let task = Tracker::new();
    let outcome = match options.command {
        Command::Load(ref load) => open_store(&options.database).and_then(|store| run_load(&store, &task, load)),
        Command::Sigma(ref sigma) => open_store(&options.database).and_then(|store| run_sigma(&store, &task, sigma)),
        Command::Analyse(ref analyse) => run_analyse(&task, analyse),
        Command::Stf(ref stf) => open_store(&options.database).and_then(|store| run_stf(&store, &task, stf)),
        Command::None => {
            error!("Error: no command given. Use --help for the list of commands.");
            std::process::exit(2)
        }
    };

    for warning in task.warnings() {
        println!("{}Warning: {}", COMMENT, warning);
    }

    if let Err(why) = outcome {
        error!("Error: {}", why);
        std::process::exit(1)
    }
}

fn open_store(database: &str) -> Result<SqliteStore> {
    SqliteStore::open(database)
}

fn run_load(store: &SqliteStore, task: &Tracker, load: &LoadOptions) -> Result<()> {
    let sequence = sth::load_sth(store, task, Path::new(&load.sth_infile), Path::new(&load.fls_infile))?;
    if let Some(sequence) = sequence {
        println!("{}Loaded sequence {} '{}'", COMMENT, sequence.id, sequence.name);
        println!("{}Flights: {}", COMMENT, sequence.flights.len());
        println!("{}Peaks table: {}", COMMENT, sequence.peaks_table);
    }
    Ok(())
}

fn run_sigma(store: &SqliteStore, task: &Tracker, sigma: &SigmaOptions) -> Result<()> {
    let mut input = sigma.input.clone();
    if input.validity <= 0 {
        input.validity = store.fls_flight_names(input.fls_id)?.len() as i64;
    }

    if let Some(output) = sigma::generate_sigma(store, task, &input, Path::new(&sigma.outfile))? {
        println!("{}Sigma file: {}", COMMENT, output.display());
    }
    Ok(())
}

fn run_analyse(task: &Tracker, analyse: &AnalyseOptions) -> Result<()> {
    let results = engine::run_contributions(&analyse.engine_config(), task, &analyse.requests())?;

    if let Some(results) = results {
        println!("{}{:<20} {:>14} {:>14}", COMMENT, "contribution", "damage", "stress");
        for result in results {
            let name = analyse
                .contributions
                .get(result.index)
                .map(|contribution| contribution.name.as_str())
                .unwrap_or_default();
            println!("{:<23} {:>14.6e} {:>14.4}", name, result.damage, result.stress);
        }
    }
    Ok(())
}

fn run_stf(store: &SqliteStore, task: &Tracker, stf: &StfOptions) -> Result<()> {
    if let Some(output) = stf::save_stf(store, task, stf.stf_id, stf.is_2d, Path::new(&stf.outfile))? {
        println!("{}STF file: {}", COMMENT, output.display());
    }
    Ok(())
}
