/// These are the data structures for command line options as well as
/// the initial default values.

use std::fmt;
use std::path::Path;

use fatigue::engine::{ContributionRequest, EngineConfig};
use fatigue::sigma::SigmaInput;
use fatigue::stress::StressComponent;
use fatigue::COMMENT;

pub mod clap;

arg_enum!{
    #[derive(Debug, Clone, Copy, PartialEq)]
    pub enum Component {
        X,
        Y,
        XY,
        Rotated
    }
}

arg_enum!{
    #[derive(Debug, Clone, Copy, PartialEq)]
    pub enum Verbosity {
        Terse,
        Verbose
    }
}

/// Load an STH and FLS pair into the database.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub sth_infile: String,
    pub fls_infile: String,
}

/// Generate a sigma file from a spectrum.
#[derive(Debug, Clone)]
pub struct SigmaOptions {
    pub outfile: String,
    pub component: Component,
    /// Angle of the rotated component in degrees.
    pub angle: f64,
    pub input: SigmaInput,
}

/// A damage contribution given on the command line.
#[derive(Debug, Clone, PartialEq)]
pub struct Contribution {
    pub name: String,
    pub sth_infile: String,
    pub fls_infile: String,
}

/// Run damage contributions through the external engine.
#[derive(Debug, Clone)]
pub struct AnalyseOptions {
    pub scripts_dir: String,
    pub work_dir: String,
    pub use_extended: bool,
    pub material: String,
    pub validity: String,
    pub omission: Option<f64>,
    pub contributions: Vec<Contribution>,
}

/// Export a stress table.
#[derive(Debug, Clone, Default)]
pub struct StfOptions {
    pub stf_id: i64,
    pub is_2d: bool,
    pub outfile: String,
}

#[derive(Debug, Clone)]
pub enum Command {
    None,
    Load(LoadOptions),
    Sigma(SigmaOptions),
    Analyse(AnalyseOptions),
    Stf(StfOptions),
}

#[derive(Debug, Clone)]
pub struct StressgenOptions {
    /// SQLite database holding spectra, stress tables and sequences.
    pub database: String,
    pub verbosity: Verbosity,
    pub command: Command,
}

impl SigmaOptions {
    /// The stress component with the angle converted to radians.
    pub fn stress_component(&self) -> StressComponent {
        match self.component {
            Component::X => StressComponent::NormalX,
            Component::Y => StressComponent::NormalY,
            Component::XY => StressComponent::ShearXY,
            Component::Rotated => StressComponent::Rotated(self.angle.to_radians()),
        }
    }
}

impl AnalyseOptions {
    pub fn engine_config(&self) -> EngineConfig {
        let mut config = EngineConfig::new(Path::new(&self.scripts_dir), Path::new(&self.work_dir));
        config.use_extended = self.use_extended;
        config
    }

    /// One request per contribution, indexed in command line order.
    pub fn requests(&self) -> Vec<ContributionRequest> {
        self.contributions
            .iter()
            .enumerate()
            .map(|(index, contribution)| ContributionRequest {
                index,
                name: contribution.name.clone(),
                sth_file: contribution.sth_infile.clone().into(),
                fls_file: contribution.fls_infile.clone().into(),
                material_file: self.material.clone().into(),
                validity: self.validity.clone(),
                omission_level: self.omission,
            })
            .collect()
    }
}

impl fmt::Display for StressgenOptions {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "{}database: {:?}", COMMENT, self.database)?;
        match self.command {
            Command::None => write!(f, "{}command: none", COMMENT),
            Command::Load(ref load) => {
                writeln!(f, "{}sth_infile: {:?}", COMMENT, load.sth_infile)?;
                write!(f, "{}fls_infile: {:?}", COMMENT, load.fls_infile)
            }
            Command::Sigma(ref sigma) => {
                writeln!(f, "{}outfile: {:?}", COMMENT, sigma.outfile)?;
                writeln!(f, "{}component: {:?}", COMMENT, sigma.stress_component())?;
                writeln!(f, "{}factors: {:?}", COMMENT, sigma.input.factors)?;
                writeln!(f, "{}delta_t: {:?}", COMMENT, sigma.input.delta_t)?;
                writeln!(f, "{}reference_dp: {:?}", COMMENT, sigma.input.reference_dp)?;
                write!(f, "{}remove_negative: {:?}", COMMENT, sigma.input.remove_negative)
            }
            Command::Analyse(ref analyse) => {
                writeln!(f, "{}scripts_dir: {:?}", COMMENT, analyse.scripts_dir)?;
                writeln!(f, "{}work_dir: {:?}", COMMENT, analyse.work_dir)?;
                writeln!(f, "{}use_extended: {:?}", COMMENT, analyse.use_extended)?;
                writeln!(f, "{}material: {:?}", COMMENT, analyse.material)?;
                writeln!(f, "{}omission: {:?}", COMMENT, analyse.omission)?;
                write!(f, "{}contributions: {:?}", COMMENT, analyse.contributions)
            }
            Command::Stf(ref stf) => {
                writeln!(f, "{}stf_id: {:?}", COMMENT, stf.stf_id)?;
                writeln!(f, "{}is_2d: {:?}", COMMENT, stf.is_2d)?;
                write!(f, "{}outfile: {:?}", COMMENT, stf.outfile)
            }
        }
    }
}

pub fn get_default_options() -> StressgenOptions {
    StressgenOptions {
        database: "stressgen.db".to_string(),
        verbosity: Verbosity::Terse,
        command: Command::None,
    }
}

pub fn get_default_sigma() -> SigmaOptions {
    SigmaOptions {
        outfile: "".to_string(),
        component: Component::X,
        angle: 0.0,
        input: SigmaInput {
            ana_id: 1,
            txt_id: 1,
            fls_id: 1,
            conv_id: 1,
            stf_id: 1,
            ..SigmaInput::default()
        },
    }
}

pub fn get_default_analyse() -> AnalyseOptions {
    AnalyseOptions {
        scripts_dir: "scripts".to_string(),
        work_dir: std::env::temp_dir().to_string_lossy().into_owned(),
        use_extended: false,
        material: "".to_string(),
        validity: "1".to_string(),
        omission: None,
        contributions: vec![],
    }
}
