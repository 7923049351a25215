use fatigue::deltat::DTInput;
use fatigue::error::Error;
use fatigue::modifier::{Factors, LoadcaseFactor, Modifier, OverallFactors, Segment, SegmentFactor};
use fatigue::stress::StressType;
use crate::options::{
    get_default_analyse, get_default_sigma, AnalyseOptions, Command, Component, Contribution, LoadOptions,
    SigmaOptions, StfOptions, StressgenOptions, Verbosity,
};
use clap::{App, AppSettings, Arg, ArgMatches, SubCommand};
use log::error;

/// Get the options from the command line.
pub fn get_options_clap(line: &str, options: &mut StressgenOptions) {
    let process = App::new("stressgen: fatigue stress sequence generation")
        .version(crate_version!())
        .about(include_str!("../description.md"))
        .setting(AppSettings::SubcommandRequiredElseHelp)

        .arg(Arg::with_name("database")
             .short("d")
             .long("database")
             .value_name("FILE")
             .help("SQLite database holding the spectra, stress tables and sequences (default stressgen.db)")
             .global(true)
             .takes_value(true))

        .arg(Arg::with_name("verbose")
             .short("v")
             .long("verbose")
             .global(true)
             .help("print the options before running"))

        .subcommand(SubCommand::with_name("load")
            .about("load an STH stress sequence and its FLS flight sequence into the database")
            .arg(Arg::with_name("sth_infile")
                 .long("sth")
                 .value_name("FILE")
                 .help("STH file of peak stresses per flight")
                 .required(true)
                 .takes_value(true))
            .arg(Arg::with_name("fls_infile")
                 .long("fls")
                 .value_name("FILE")
                 .help("FLS file of flight numbers, names and severities")
                 .required(true)
                 .takes_value(true)))

        .subcommand(SubCommand::with_name("sigma")
            .about("generate the sigma file of a spectrum")
            .arg(Arg::with_name("outfile")
                 .short("o")
                 .long("outfile")
                 .value_name("FILE")
                 .help("sigma file to write")
                 .required(true)
                 .takes_value(true))
            .arg(Arg::with_name("ana")
                 .long("ana")
                 .value_name("ID")
                 .help("spectrum of typical flights (default 1)")
                 .takes_value(true))
            .arg(Arg::with_name("txt")
                 .long("txt")
                 .value_name("ID")
                 .help("class code table (default 1)")
                 .takes_value(true))
            .arg(Arg::with_name("fls")
                 .long("fls")
                 .value_name("ID")
                 .help("flight sequence (default 1)")
                 .takes_value(true))
            .arg(Arg::with_name("conv")
                 .long("conv")
                 .value_name("ID")
                 .help("conversion table holding the reference pressure (default 1)")
                 .takes_value(true))
            .arg(Arg::with_name("stf")
                 .long("stf")
                 .value_name("ID")
                 .help("stress table (default 1)")
                 .takes_value(true))
            .arg(Arg::with_name("validity")
                 .long("validity")
                 .value_name("N")
                 .help("total number of flights (default: the length of the flight sequence)")
                 .takes_value(true))
            .arg(Arg::with_name("component")
                 .short("c")
                 .long("component")
                 .value_name("NAME")
                 .possible_values(&Component::variants())
                 .case_insensitive(true)
                 .help("stress component taken from the stress table (default x)")
                 .takes_value(true))
            .arg(Arg::with_name("angle")
                 .long("angle")
                 .value_name("DEGREES")
                 .help("angle of the rotated stress component (default 0)")
                 .allow_hyphen_values(true)
                 .takes_value(true))
            .arg(Arg::with_name("overall")
                 .long("overall")
                 .value_name("TYPE=METHOD:VALUE,...")
                 .help("correction applied to every stress of a type, e.g. oneg=multiply:1.1,dp=add:5. Types are oneg, increment, deltap and deltat. Methods are multiply, add and set.")
                 .takes_value(true))
            .arg(Arg::with_name("segment")
                 .long("segment")
                 .value_name("NAME,ORDER,TYPE=METHOD:VALUE,...")
                 .help("correction applied to the stresses of one segment, e.g. CRUISE,1,oneg=multiply:1.2. May be repeated, the first matching segment is used.")
                 .multiple(true)
                 .number_of_values(1)
                 .takes_value(true))
            .arg(Arg::with_name("loadcase")
                 .long("loadcase")
                 .value_name("ISSY=METHOD:VALUE,...")
                 .help("correction applied to the stresses of individual load cases, e.g. 1001=set:0,2001=multiply:2")
                 .takes_value(true))
            .arg(Arg::with_name("remove_negative")
                 .long("remove_negative")
                 .help("clamp negative peak stresses to zero"))
            .arg(Arg::with_name("ref_dp")
                 .long("ref_dp")
                 .value_name("PRESSURE")
                 .help("reference pressure of the delta-p load case (default: from the conversion table, else the largest delta-p of the spectrum)")
                 .allow_hyphen_values(true)
                 .takes_value(true))
            .arg(Arg::with_name("dp_loadcase")
                 .long("dp_loadcase")
                 .value_name("ISSY")
                 .help("delta-p load case (default: the load case flagged as delta-p)")
                 .takes_value(true))
            .arg(Arg::with_name("dt")
                 .long("dt")
                 .value_name("ISSY:TEMPERATURE")
                 .help("one point delta-t load case and its reference temperature")
                 .conflicts_with_all(&["dt_sup", "dt_inf"])
                 .takes_value(true))
            .arg(Arg::with_name("dt_sup")
                 .long("dt_sup")
                 .value_name("ISSY:TEMPERATURE")
                 .help("superior load case and reference temperature of a two point delta-t interpolation")
                 .requires("dt_inf")
                 .takes_value(true))
            .arg(Arg::with_name("dt_inf")
                 .long("dt_inf")
                 .value_name("ISSY:TEMPERATURE")
                 .help("inferior load case and reference temperature of a two point delta-t interpolation")
                 .requires("dt_sup")
                 .takes_value(true)))

        .subcommand(SubCommand::with_name("analyse")
            .about("run damage contributions through the external fatigue engine")
            .arg(Arg::with_name("contribution")
                 .long("contribution")
                 .value_names(&["NAME", "STH", "FLS"])
                 .help("damage contribution to analyse. May be repeated, contributions are run in parallel.")
                 .multiple(true)
                 .number_of_values(3)
                 .required(true)
                 .takes_value(true))
            .arg(Arg::with_name("material")
                 .short("m")
                 .long("material")
                 .value_name("FILE")
                 .help("material file used by the engine")
                 .required(true)
                 .takes_value(true))
            .arg(Arg::with_name("validity")
                 .long("validity")
                 .value_name("N")
                 .help("number of flights passed to the sigma conversion (default 1)")
                 .takes_value(true))
            .arg(Arg::with_name("omission")
                 .long("omission")
                 .value_name("LEVEL")
                 .help("omission level applied to the stress sequence before the analysis (default none)")
                 .takes_value(true))
            .arg(Arg::with_name("scripts")
                 .long("scripts")
                 .value_name("DIR")
                 .help("directory holding the conversion scripts and engine executables (default scripts)")
                 .takes_value(true))
            .arg(Arg::with_name("work")
                 .long("work")
                 .value_name("DIR")
                 .help("directory in which the working directories are created (default: the system temporary directory)")
                 .takes_value(true))
            .arg(Arg::with_name("extended")
                 .long("extended")
                 .help("use the engine build without a limit on the number of peaks per flight")))

        .subcommand(SubCommand::with_name("stf")
            .about("export a stress table to an STF file")
            .arg(Arg::with_name("outfile")
                 .short("o")
                 .long("outfile")
                 .value_name("FILE")
                 .help("STF file to write")
                 .required(true)
                 .takes_value(true))
            .arg(Arg::with_name("stf")
                 .long("stf")
                 .value_name("ID")
                 .help("stress table (default 1)")
                 .takes_value(true))
            .arg(Arg::with_name("2d")
                 .long("2d")
                 .help("also write the SY and SXY columns")));

    // turn the commands into matches
    let matches = if line.is_empty() {
        process.get_matches()
    } else {
        // add command word since it skips first argument
        process.get_matches_from(("stressgen ".to_string() + line.trim()).split(' '))
    };

    if let Some(database) = matches.value_of("database") {
        options.database = database.to_string();
    }
    if matches.is_present("verbose") {
        options.verbosity = Verbosity::Verbose;
    }

    options.command = match matches.subcommand() {
        ("load", Some(sub)) => Command::Load(LoadOptions {
            sth_infile: sub.value_of("sth_infile").unwrap_or_default().to_string(),
            fls_infile: sub.value_of("fls_infile").unwrap_or_default().to_string(),
        }),
        ("sigma", Some(sub)) => Command::Sigma(sigma_options(sub)),
        ("analyse", Some(sub)) => Command::Analyse(analyse_options(sub)),
        ("stf", Some(sub)) => {
            let mut stf = StfOptions {
                stf_id: 1,
                is_2d: sub.is_present("2d"),
                outfile: sub.value_of("outfile").unwrap_or_default().to_string(),
            };
            if let Some(id) = id_value(sub, "stf") {
                stf.stf_id = id;
            }
            Command::Stf(stf)
        }
        _ => Command::None,
    };

    // database override given after the subcommand
    if let (_, Some(sub)) = matches.subcommand() {
        if let Some(database) = sub.value_of("database") {
            options.database = database.to_string();
        }
        if sub.is_present("verbose") {
            options.verbosity = Verbosity::Verbose;
        }
    }
}

fn exit_on_error<T>(option: &str, result: Result<T, String>) -> T {
    match result {
        Ok(value) => value,
        Err(reason) => {
            let why = Error::InvalidOption {
                option: format!("--{}", option),
                reason,
            };
            error!("Error: {}", why);
            std::process::exit(2)
        }
    }
}

fn id_value(matches: &ArgMatches, name: &str) -> Option<i64> {
    if !matches.is_present(name) {
        return None;
    }
    match value_t!(matches, name, i64) {
        Ok(id) => Some(id),
        Err(why) => {
            error!("Error: invalid value for --{}: {}", name, why);
            std::process::exit(2)
        }
    }
}

fn float_value(matches: &ArgMatches, name: &str) -> Option<f64> {
    if !matches.is_present(name) {
        return None;
    }
    match value_t!(matches, name, f64) {
        Ok(value) => Some(value),
        Err(why) => {
            error!("Error: invalid value for --{}: {}", name, why);
            std::process::exit(2)
        }
    }
}

fn sigma_options(matches: &ArgMatches) -> SigmaOptions {
    let mut sigma = get_default_sigma();
    sigma.outfile = matches.value_of("outfile").unwrap_or_default().to_string();

    if let Some(id) = id_value(matches, "ana") {
        sigma.input.ana_id = id;
    }
    if let Some(id) = id_value(matches, "txt") {
        sigma.input.txt_id = id;
    }
    if let Some(id) = id_value(matches, "fls") {
        sigma.input.fls_id = id;
    }
    if let Some(id) = id_value(matches, "conv") {
        sigma.input.conv_id = id;
    }
    if let Some(id) = id_value(matches, "stf") {
        sigma.input.stf_id = id;
    }
    if let Some(validity) = id_value(matches, "validity") {
        sigma.input.validity = validity;
    }

    if let Ok(component) = value_t!(matches.value_of("component"), Component) {
        sigma.component = component;
    }
    if let Some(angle) = float_value(matches, "angle") {
        sigma.angle = angle;
    }
    sigma.input.component = sigma.stress_component();

    let mut factors = Factors::default();
    if let Some(overall) = matches.value_of("overall") {
        factors.overall = exit_on_error("overall", parse_overall(overall));
    }
    if let Some(segments) = matches.values_of("segment") {
        for segment in segments {
            factors.segments.push(exit_on_error("segment", parse_segment(segment)));
        }
    }
    if let Some(loadcases) = matches.value_of("loadcase") {
        factors.loadcases = exit_on_error("loadcase", parse_loadcases(loadcases));
    }
    sigma.input.factors = factors;

    sigma.input.remove_negative = matches.is_present("remove_negative");
    sigma.input.reference_dp = float_value(matches, "ref_dp");
    sigma.input.dp_loadcase = matches.value_of("dp_loadcase").map(|issy| issy.to_string());

    if let Some(point) = matches.value_of("dt") {
        let (loadcase, reference_temperature) = exit_on_error("dt", parse_dt_point(point));
        sigma.input.delta_t = DTInput::OnePoint {
            loadcase,
            reference_temperature,
        };
    } else if let (Some(sup), Some(inf)) = (matches.value_of("dt_sup"), matches.value_of("dt_inf")) {
        let (loadcase_sup, ref_sup) = exit_on_error("dt_sup", parse_dt_point(sup));
        let (loadcase_inf, ref_inf) = exit_on_error("dt_inf", parse_dt_point(inf));
        sigma.input.delta_t = DTInput::TwoPoints {
            loadcase_sup,
            loadcase_inf,
            ref_sup,
            ref_inf,
        };
    }

    sigma
}

fn analyse_options(matches: &ArgMatches) -> AnalyseOptions {
    let mut analyse = get_default_analyse();

    if let Some(values) = matches.values_of("contribution") {
        let values = values.collect::<Vec<_>>();
        analyse.contributions = values
            .chunks(3)
            .filter(|chunk| chunk.len() == 3)
            .map(|chunk| Contribution {
                name: chunk[0].to_string(),
                sth_infile: chunk[1].to_string(),
                fls_infile: chunk[2].to_string(),
            })
            .collect();
    }
    analyse.material = matches.value_of("material").unwrap_or_default().to_string();
    if let Some(validity) = matches.value_of("validity") {
        analyse.validity = validity.to_string();
    }
    analyse.omission = float_value(matches, "omission");
    if let Some(dir) = matches.value_of("scripts") {
        analyse.scripts_dir = dir.to_string();
    }
    if let Some(dir) = matches.value_of("work") {
        analyse.work_dir = dir.to_string();
    }
    analyse.use_extended = matches.is_present("extended");

    analyse
}

/// Split `key=value` pairs separated by commas.
fn parse_pairs(input: &str) -> Result<Vec<(&str, &str)>, String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let mut split = pair.splitn(2, '=');
            match (split.next(), split.next()) {
                (Some(key), Some(value)) if !key.trim().is_empty() => Ok((key.trim(), value.trim())),
                _ => Err(format!("expected 'key=value' but found '{}'", pair)),
            }
        })
        .collect()
}

// Expected format:
// oneg=multiply:1.1,dp=add:5
fn parse_type_modifiers(input: &str) -> Result<Vec<(StressType, Modifier)>, String> {
    parse_pairs(input)?
        .into_iter()
        .map(|(key, value)| -> Result<(StressType, Modifier), String> {
            Ok((key.parse::<StressType>()?, value.parse::<Modifier>()?))
        })
        .collect()
}

pub fn parse_overall(input: &str) -> Result<OverallFactors, String> {
    let mut overall = OverallFactors::default();
    for (stress_type, modifier) in parse_type_modifiers(input)? {
        overall.set(stress_type, modifier);
    }
    Ok(overall)
}

// Expected format:
// CRUISE,1,oneg=multiply:1.2,dt=add:-3
pub fn parse_segment(input: &str) -> Result<SegmentFactor, String> {
    let mut parts = input.splitn(3, ',');
    let name = parts.next().map(str::trim).unwrap_or_default();
    if name.is_empty() {
        return Err(format!("missing segment name in '{}'", input));
    }
    let order = parts
        .next()
        .ok_or_else(|| format!("missing segment order in '{}'", input))?
        .trim()
        .parse::<i64>()
        .map_err(|why| format!("invalid segment order in '{}': {}", input, why))?;

    let mut factor = SegmentFactor::new(Segment::new(name, order));
    for (stress_type, modifier) in parse_type_modifiers(parts.next().unwrap_or_default())? {
        factor = factor.with(stress_type, modifier);
    }
    Ok(factor)
}

// Expected format:
// 1001=set:0,2001=multiply:2
pub fn parse_loadcases(input: &str) -> Result<Vec<LoadcaseFactor>, String> {
    parse_pairs(input)?
        .into_iter()
        .map(|(issy_code, value)| -> Result<LoadcaseFactor, String> {
            Ok(LoadcaseFactor::new(issy_code, value.parse::<Modifier>()?))
        })
        .collect()
}

// Expected format:
// 3001:-55.0
pub fn parse_dt_point(input: &str) -> Result<(String, f64), String> {
    let mut split = input.rsplitn(2, ':');
    match (split.next(), split.next()) {
        (Some(temperature), Some(loadcase)) if !loadcase.trim().is_empty() => {
            let temperature = temperature
                .trim()
                .parse::<f64>()
                .map_err(|why| format!("invalid reference temperature in '{}': {}", input, why))?;
            Ok((loadcase.trim().to_string(), temperature))
        }
        _ => Err(format!("expected 'issy:temperature' but found '{}'", input)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fatigue::modifier::Method;

    #[test]
    fn overall_factors_by_type() {
        let overall = parse_overall("oneg=multiply:1.5, dp=add:-2").unwrap();

        assert_eq!(overall.get(StressType::OneG), Modifier::new(Method::Multiply, 1.5));
        assert_eq!(overall.get(StressType::DeltaP), Modifier::new(Method::Add, -2.0));
        assert_eq!(overall.get(StressType::DeltaT), Modifier::default());
    }

    #[test]
    fn overall_factors_reject_unknown_type() {
        assert!(parse_overall("gust=multiply:2").is_err());
        assert!(parse_overall("oneg").is_err());
        assert!(parse_overall("oneg=scale:2").is_err());
    }

    #[test]
    fn segment_factor_with_several_types() {
        let factor = parse_segment("CRUISE,2,oneg=multiply:1.2,dt=set:0").unwrap();

        assert_eq!(factor.segment, Segment::new("CRUISE", 2));
        assert_eq!(factor.get(StressType::OneG), Modifier::new(Method::Multiply, 1.2));
        assert_eq!(factor.get(StressType::DeltaT), Modifier::new(Method::Set, 0.0));
        assert_eq!(factor.get(StressType::Increment), Modifier::default());
    }

    #[test]
    fn segment_needs_name_and_order() {
        assert!(parse_segment(",1,oneg=add:1").is_err());
        assert!(parse_segment("CRUISE").is_err());
        assert!(parse_segment("CRUISE,first,oneg=add:1").is_err());
        assert!(parse_segment("CRUISE,1").unwrap().modifiers.is_empty());
    }

    #[test]
    fn loadcase_factors_keep_order() {
        let factors = parse_loadcases("1001=set:0,2001=multiply:2").unwrap();

        assert_eq!(factors.len(), 2);
        assert_eq!(factors[0], LoadcaseFactor::new("1001", Modifier::new(Method::Set, 0.0)));
        assert_eq!(factors[1], LoadcaseFactor::new("2001", Modifier::new(Method::Multiply, 2.0)));
    }

    #[test]
    fn delta_t_point_allows_negative_temperature() {
        let (loadcase, temperature) = parse_dt_point("3001:-55.5").unwrap();

        assert_eq!(loadcase, "3001");
        assert!((temperature + 55.5).abs() <= f64::EPSILON);
        assert!(parse_dt_point("3001").is_err());
        assert!(parse_dt_point(":20").is_err());
        assert!(parse_dt_point("3001:hot").is_err());
    }

    #[test]
    fn sigma_command_line() {
        let mut options = crate::options::get_default_options();
        get_options_clap(
            "sigma -o out.sigma --stf 4 --component rotated --angle 90 --overall oneg=multiply:2 --segment CRUISE,1,dt=add:1 --dt_sup 3001:80 --dt_inf 3002:-20 --remove_negative",
            &mut options,
        );

        match options.command {
            Command::Sigma(ref sigma) => {
                assert_eq!(sigma.outfile, "out.sigma");
                assert_eq!(sigma.input.stf_id, 4);
                assert_eq!(sigma.input.ana_id, 1);
                assert!(sigma.input.remove_negative);
                assert_eq!(sigma.input.factors.segments.len(), 1);
                assert_eq!(
                    sigma.input.delta_t,
                    DTInput::TwoPoints {
                        loadcase_sup: "3001".to_string(),
                        loadcase_inf: "3002".to_string(),
                        ref_sup: 80.0,
                        ref_inf: -20.0,
                    }
                );
                match sigma.input.component {
                    fatigue::stress::StressComponent::Rotated(angle) => {
                        assert!((angle - std::f64::consts::FRAC_PI_2).abs() < 1e-12)
                    }
                    other => panic!("expected a rotated component, got {:?}", other),
                }
            }
            ref other => panic!("expected the sigma command, got {:?}", other),
        }
    }

    #[test]
    fn analyse_command_line() {
        let mut options = crate::options::get_default_options();
        get_options_clap(
            "analyse -m steel.mat --omission 2.5 --contribution GUST a.sth a.fls --contribution MANO b.sth b.fls -d other.db",
            &mut options,
        );

        assert_eq!(options.database, "other.db");
        match options.command {
            Command::Analyse(ref analyse) => {
                let requests = analyse.requests();
                assert_eq!(requests.len(), 2);
                assert_eq!(requests[1].index, 1);
                assert_eq!(requests[1].name, "MANO");
                assert_eq!(requests[1].fls_file, std::path::PathBuf::from("b.fls"));
                assert_eq!(requests[0].omission_level, Some(2.5));
                assert_eq!(analyse.material, "steel.mat");
            }
            ref other => panic!("expected the analyse command, got {:?}", other),
        }
    }
}
