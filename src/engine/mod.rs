//! Damage contribution analysis with the external fatigue engine.
//!
//! Each contribution runs in its own working directory through up to three
//! external programs:
//!
//! 1. omission (optional), a perl script filtering small cycles out of
//!    the stress sequence,
//! 2. conversion, a perl script turning the sequence into a sigma file,
//! 3. analysis, the native engine.
//!
//! The damage and the equivalent stress are then read from the engine
//! output. Every program writes its stdout and stderr to its own log in
//! the working directory, and the directory is removed when the run ends.

pub mod platform;
pub mod process;
pub mod results;

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use log::info;
use rayon::prelude::*;
use tempdir::TempDir;

use crate::error::{Error, Result};
use crate::task::Task;

pub use self::platform::Platform;
pub use self::process::EngineProcess;
pub use self::results::DamageContributionResult;

/// Base name of the files handed to the conversion script and the engine.
pub const JOB_NAME: &str = "jobstpa_SIGMA_proto";
pub const OMISSION_SCRIPT: &str = "omission.pl";
pub const CONVERSION_SCRIPT: &str = "writeSigmaFile.pl";
/// Last argument of the conversion script, selecting crack initiation.
pub const ANALYSIS_TYPE: &str = "AMORCAGE";
pub const MATERIAL_FILE: &str = "material.mat";
pub const ENGINE_LOG: &str = "engine.log";
pub const CONVERSION_LOG: &str = "writeSigmaFile.log";
const OMISSION_INPUT: &str = "input.sth";

/// Where to find the external programs and how to run them.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Directory holding the scripts and engine executables.
    pub scripts_dir: PathBuf,
    /// Parent directory of the per contribution working directories.
    pub work_root: PathBuf,
    /// Use the engine build without a limit on peaks per flight.
    pub use_extended: bool,
    /// Defaults to the platform being run on.
    pub platform: Option<Platform>,
    /// Replaces the platform's perl interpreter.
    pub interpreter: Option<PathBuf>,
}

impl EngineConfig {
    pub fn new(scripts_dir: &Path, work_root: &Path) -> Self {
        Self {
            scripts_dir: scripts_dir.to_path_buf(),
            work_root: work_root.to_path_buf(),
            use_extended: false,
            platform: None,
            interpreter: None,
        }
    }
}

/// One damage contribution to analyse.
#[derive(Debug, Clone)]
pub struct ContributionRequest {
    pub index: usize,
    pub name: String,
    pub sth_file: PathBuf,
    pub fls_file: PathBuf,
    pub material_file: PathBuf,
    /// Number of flights, passed as given to the conversion script.
    pub validity: String,
    /// Omission is applied only for a level above zero.
    pub omission_level: Option<f64>,
}

/// A contribution being run in its working directory.
struct Run<'a> {
    task: &'a dyn Task,
    request: &'a ContributionRequest,
    work_dir: &'a Path,
    platform: Platform,
    scripts_dir: PathBuf,
    interpreter: OsString,
}

impl<'a> Run<'a> {
    fn copy_in(&self, source: &Path, name: &str) -> Result<PathBuf> {
        let target = self.work_dir.join(name);
        fs::copy(source, &target)?;
        Ok(target)
    }

    fn script(&self, script: &str) -> Command {
        let mut command = Command::new(&self.interpreter);
        command.arg(self.scripts_dir.join(script)).current_dir(self.work_dir);
        command
    }

    /// Run a program to completion. Returns false if cancelled.
    fn execute(&self, command: Command, stage: &str, log: &str) -> Result<bool> {
        let mut process = EngineProcess::start(command, &self.work_dir.join(log))?;
        let status = match process.wait_for_exit(self.task)? {
            Some(status) => status,
            None => return Ok(false),
        };
        if self.task.is_cancelled() {
            return Ok(false);
        }
        if !status.success() {
            return Err(self.failure(stage, log));
        }
        Ok(true)
    }

    fn failure(&self, stage: &str, log: &str) -> Error {
        Error::Subprocess {
            stage: stage.to_string(),
            contribution: self.request.name.clone(),
            log: log.to_string(),
        }
    }

    fn require(&self, output: &Path, stage: &str, log: &str) -> Result<()> {
        if output.exists() {
            Ok(())
        } else {
            Err(Error::MissingOutput {
                stage: stage.to_string(),
                contribution: self.request.name.clone(),
                output: output
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                log: log.to_string(),
            })
        }
    }

    /// Filter the stress sequence and return the filtered file.
    fn omission(&self, level: f64) -> Result<Option<PathBuf>> {
        let stage = "Stress sequence omission";
        self.task.update_message(&format!(
            "Applying omission for damage contribution {}...",
            self.request.name
        ));
        let input = self.copy_in(&self.request.sth_file, OMISSION_INPUT)?;
        let log = format!("{}_omission.log", OMISSION_INPUT);

        let mut command = self.script(OMISSION_SCRIPT);
        command.arg(OMISSION_INPUT).arg(format!("{:?}", level));
        if !self.execute(command, stage, &log)? {
            return Ok(None);
        }

        let mut output = input.into_os_string();
        output.push(".rfort");
        let output = PathBuf::from(output);
        self.require(&output, stage, &log)?;
        Ok(Some(output))
    }

    fn conversion(&self, sth_file: &Path) -> Result<Option<PathBuf>> {
        let stage = "Writing sigma file";
        let sth = format!("{}.sth", JOB_NAME);
        let fls = format!("{}.fls", JOB_NAME);

        self.task.update_message(&format!(
            "Saving input STH file for damage contribution {}...",
            self.request.name
        ));
        self.copy_in(sth_file, &sth)?;
        self.task.update_message(&format!(
            "Saving input FLS file for damage contribution {}...",
            self.request.name
        ));
        self.copy_in(&self.request.fls_file, &fls)?;

        self.task.update_message(&format!(
            "Creating sigma file for damage contribution {}...",
            self.request.name
        ));
        let mut command = self.script(CONVERSION_SCRIPT);
        command
            .arg(&sth)
            .arg(&fls)
            .arg(&self.request.validity)
            .arg(ANALYSIS_TYPE);
        if !self.execute(command, stage, CONVERSION_LOG)? {
            return Ok(None);
        }

        let output = self.work_dir.join(format!("{}.sigma", JOB_NAME));
        self.require(&output, stage, CONVERSION_LOG)?;
        Ok(Some(output))
    }

    /// Run the engine and return the path of its dossier.
    fn analysis(&self, use_extended: bool) -> Result<Option<PathBuf>> {
        let stage = "Analysis";
        self.task.update_message(&format!(
            "Running analysis for damage contribution {}...",
            self.request.name
        ));

        let engine = self.platform.engine(&self.scripts_dir, use_extended)?;
        if self.platform.entry()?.set_executable {
            platform::make_executable(&engine)?;
        }
        let mut command = Command::new(&engine);
        command.arg(JOB_NAME).current_dir(self.work_dir);
        for (var, dir) in self.platform.engine_env(&self.scripts_dir)? {
            command.env(var, dir);
        }
        if !self.execute(command, stage, ENGINE_LOG)? {
            return Ok(None);
        }

        if self.work_dir.join(format!("{}.erreurs", JOB_NAME)).exists() {
            return Err(self.failure(stage, ENGINE_LOG));
        }
        let dossier = self.work_dir.join(format!("{}.dossier", JOB_NAME));
        self.require(&dossier, stage, ENGINE_LOG)?;
        Ok(Some(dossier))
    }

    fn extract(&self, dossier: &Path) -> Result<DamageContributionResult> {
        self.task.update_message(&format!(
            "Parsing analysis results for damage contribution {}...",
            self.request.name
        ));
        let failed = || Error::Extraction {
            contribution: self.request.name.clone(),
            log: ENGINE_LOG.to_string(),
        };

        let log = results::read_lossy(&self.work_dir.join(ENGINE_LOG))?;
        let damage = results::extract_damage(&log).ok_or_else(failed)?;
        let dossier = results::read_lossy(dossier)?;
        let stress = results::extract_equivalent_stress(&dossier).ok_or_else(failed)?;

        Ok(DamageContributionResult {
            index: self.request.index,
            damage,
            stress,
        })
    }

    fn process(&self, use_extended: bool) -> Result<Option<DamageContributionResult>> {
        let mut sth_file = self.request.sth_file.clone();
        if let Some(level) = self.request.omission_level.filter(|&level| level > 0.0) {
            sth_file = match self.omission(level)? {
                Some(filtered) => filtered,
                None => return Ok(None),
            };
        }
        if self.task.is_cancelled() {
            return Ok(None);
        }

        self.task.update_message(&format!(
            "Saving input material file for damage contribution {}...",
            self.request.name
        ));
        self.copy_in(&self.request.material_file, MATERIAL_FILE)?;

        if self.conversion(&sth_file)?.is_none() || self.task.is_cancelled() {
            return Ok(None);
        }

        let dossier = match self.analysis(use_extended)? {
            Some(dossier) => dossier,
            None => return Ok(None),
        };
        if self.task.is_cancelled() {
            return Ok(None);
        }

        self.extract(&dossier).map(Some)
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    Ok(fs::canonicalize(path)?)
}

/// Analyse one damage contribution.
///
/// Returns `None` if the task is cancelled. The working directory is
/// removed whatever the outcome, and no child process outlives the call.
pub fn run_contribution(
    config: &EngineConfig,
    task: &dyn Task,
    request: &ContributionRequest,
) -> Result<Option<DamageContributionResult>> {
    let platform = match config.platform {
        Some(platform) => platform,
        None => Platform::current()?,
    };
    platform.entry()?;

    let scripts_dir = absolute(&config.scripts_dir)?;
    let interpreter = match config.interpreter {
        Some(ref interpreter) => interpreter.clone().into_os_string(),
        None => platform.interpreter(&scripts_dir)?,
    };
    // paths given relative to where we were started
    let mut request = request.clone();
    request.sth_file = absolute(&request.sth_file)?;
    request.fls_file = absolute(&request.fls_file)?;
    request.material_file = absolute(&request.material_file)?;

    fs::create_dir_all(&config.work_root)?;
    let work_dir = TempDir::new_in(&config.work_root, &format!("DamageContribution_{}", request.name))?;

    let run = Run {
        task,
        request: &request,
        work_dir: work_dir.path(),
        platform,
        scripts_dir,
        interpreter,
    };
    let result = run.process(config.use_extended);

    match result {
        Ok(Some(ref result)) => info!(
            "Damage contribution {}: damage {}, equivalent stress {}",
            request.name, result.damage, result.stress
        ),
        Err(ref why) => task.add_warning(&format!(
            "Analysis for damage contribution {} has failed due to an exception.\n{}",
            request.name, why
        )),
        Ok(None) => (),
    }
    result
}

/// Analyse several damage contributions in parallel.
///
/// The results are ordered by contribution index. Any failure fails the
/// whole batch and `None` is returned if the task is cancelled.
pub fn run_contributions(
    config: &EngineConfig,
    task: &dyn Task,
    requests: &[ContributionRequest],
) -> Result<Option<Vec<DamageContributionResult>>> {
    let outcomes = requests
        .par_iter()
        .map(|request| run_contribution(config, task, request))
        .collect::<Result<Vec<_>>>()?;

    if task.is_cancelled() {
        return Ok(None);
    }
    let mut results = match outcomes.into_iter().collect::<Option<Vec<_>>>() {
        Some(results) => results,
        None => return Ok(None),
    };
    results.sort_by_key(|result| result.index);
    Ok(Some(results))
}

#[cfg(all(test, target_os = "linux"))]
mod tests {
    use super::*;
    use crate::task::Tracker;
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    static OMISSION: &str = "echo \"omission $1 $2\"\ncp \"$1\" \"$1.rfort\"\n";
    static CONVERSION: &str = "echo \"convert $1 $2 $3 $4\"\ncp \"$1\" jobstpa_SIGMA_proto.sigma\n";
    static ENGINE: &str = "#!/bin/sh
test -f material.mat || exit 2
test -f jobstpa_SIGMA_proto.sigma || exit 3
cat > jobstpa_SIGMA_proto.dossier <<EOF
 ANALYSE DE LA SEQUENCE
 SMAX equivalent amor (MPa) : 1 : 187.5
EOF
echo ' ENDOMMAGEMENT SEQUENCE = 2.5E-04'
";

    struct Fixture {
        root: TempDir,
        config: EngineConfig,
    }

    impl Fixture {
        fn new(engine: &str) -> Fixture {
            Fixture::with_scripts(OMISSION, CONVERSION, engine)
        }

        fn with_scripts(omission: &str, conversion: &str, engine: &str) -> Fixture {
            let root = TempDir::new("engine").unwrap();
            let scripts = root.path().join("scripts");
            fs::create_dir(&scripts).unwrap();
            fs::write(scripts.join(OMISSION_SCRIPT), omission).unwrap();
            fs::write(scripts.join(CONVERSION_SCRIPT), conversion).unwrap();
            fs::write(scripts.join("spectre_proto_CG_linux"), engine).unwrap();
            fs::write(root.path().join("seq.sth"), "sequence\n").unwrap();
            fs::write(root.path().join("seq.fls"), "1 TF_A\n").unwrap();
            fs::write(root.path().join("steel.mat"), "material\n").unwrap();

            let mut config = EngineConfig::new(&scripts, &root.path().join("work"));
            config.platform = Some(Platform::Linux);
            config.interpreter = Some(PathBuf::from("/bin/sh"));
            Fixture { root, config }
        }

        fn request(&self, index: usize, name: &str) -> ContributionRequest {
            ContributionRequest {
                index,
                name: name.to_string(),
                sth_file: self.root.path().join("seq.sth"),
                fls_file: self.root.path().join("seq.fls"),
                material_file: self.root.path().join("steel.mat"),
                validity: "100".to_string(),
                omission_level: None,
            }
        }

        fn work_dirs(&self) -> usize {
            fs::read_dir(&self.config.work_root).map(|dir| dir.count()).unwrap_or(0)
        }
    }

    #[test]
    fn successful_contribution() {
        let fixture = Fixture::new(ENGINE);
        let tracker = Tracker::new();

        let result = run_contribution(&fixture.config, &tracker, &fixture.request(3, "GUST"))
            .unwrap()
            .unwrap();

        assert_eq!(result.index, 3);
        assert!((result.damage - 2.5e-4).abs() <= f64::EPSILON);
        assert!((result.stress - 187.5).abs() <= f64::EPSILON);
        assert!(tracker.warnings().is_empty());
        assert_eq!(fixture.work_dirs(), 0);
    }

    #[test]
    fn omission_feeds_the_conversion() {
        let engine = format!(
            "{}grep -q sequence jobstpa_SIGMA_proto.sth || exit 4\n",
            ENGINE.replace("echo ' ENDOMMAGEMENT", "test -f input.sth.rfort || exit 5\necho ' ENDOMMAGEMENT")
        );
        let fixture = Fixture::new(&engine);
        let mut request = fixture.request(0, "OMITTED");
        request.omission_level = Some(2.5);

        let result = run_contribution(&fixture.config, &Tracker::new(), &request)
            .unwrap()
            .unwrap();
        assert!((result.stress - 187.5).abs() <= f64::EPSILON);
    }

    #[test]
    fn failing_analysis_names_engine_log() {
        let fixture = Fixture::new("#!/bin/sh\necho ' ENDOMMAGEMENT SEQUENCE = 1.0'\nexit 1\n");
        let tracker = Tracker::new();

        let error = run_contribution(&fixture.config, &tracker, &fixture.request(0, "FAIL")).unwrap_err();

        match error {
            Error::Subprocess { ref stage, ref log, .. } => {
                assert_eq!(stage, "Analysis");
                assert_eq!(log, ENGINE_LOG);
            }
            ref other => panic!("expected a subprocess failure, got {:?}", other),
        }
        assert!(error.to_string().contains("'engine.log'"));
        assert_eq!(tracker.warnings().len(), 1);
        assert_eq!(fixture.work_dirs(), 0);
    }

    #[test]
    fn failing_omission_names_its_log() {
        let fixture = Fixture::with_scripts("exit 1\n", CONVERSION, ENGINE);
        let tracker = Tracker::new();
        let mut request = fixture.request(0, "OMIT");
        request.omission_level = Some(2.5);

        let error = run_contribution(&fixture.config, &tracker, &request).unwrap_err();

        match error {
            Error::Subprocess { ref stage, ref log, .. } => {
                assert_eq!(stage, "Stress sequence omission");
                assert_eq!(log, "input.sth_omission.log");
            }
            ref other => panic!("expected a subprocess failure, got {:?}", other),
        }
        assert!(error.to_string().contains("'input.sth_omission.log'"));
        assert_eq!(tracker.warnings().len(), 1);
        assert_eq!(fixture.work_dirs(), 0);
    }

    #[test]
    fn omission_without_filtered_file() {
        let fixture = Fixture::with_scripts("echo \"omission $1 $2\"\n", CONVERSION, ENGINE);
        let mut request = fixture.request(0, "OMIT");
        request.omission_level = Some(1.0);

        let error = run_contribution(&fixture.config, &Tracker::new(), &request).unwrap_err();

        match error {
            Error::MissingOutput {
                ref stage,
                ref output,
                ref log,
                ..
            } => {
                assert_eq!(stage, "Stress sequence omission");
                assert_eq!(output, "input.sth.rfort");
                assert_eq!(log, "input.sth_omission.log");
            }
            ref other => panic!("expected a missing output, got {:?}", other),
        }
        assert!(error.to_string().contains("'input.sth.rfort'"));
        assert_eq!(fixture.work_dirs(), 0);
    }

    #[test]
    fn conversion_without_sigma_file() {
        let fixture = Fixture::with_scripts(OMISSION, "echo \"convert $1 $2 $3 $4\"\n", ENGINE);
        let tracker = Tracker::new();

        let error = run_contribution(&fixture.config, &tracker, &fixture.request(0, "CONV")).unwrap_err();

        match error {
            Error::MissingOutput {
                ref stage,
                ref output,
                ref log,
                ..
            } => {
                assert_eq!(stage, "Writing sigma file");
                assert_eq!(output, "jobstpa_SIGMA_proto.sigma");
                assert_eq!(log, CONVERSION_LOG);
            }
            ref other => panic!("expected a missing output, got {:?}", other),
        }
        assert!(error.to_string().contains("'writeSigmaFile.log'"));
        assert_eq!(tracker.warnings().len(), 1);
        assert_eq!(fixture.work_dirs(), 0);
    }

    #[test]
    fn error_marker_fails_analysis() {
        let engine = format!("{}touch jobstpa_SIGMA_proto.erreurs\n", ENGINE);
        let fixture = Fixture::new(&engine);

        match run_contribution(&fixture.config, &Tracker::new(), &fixture.request(0, "ERR")) {
            Err(Error::Subprocess { log, .. }) => assert_eq!(log, ENGINE_LOG),
            other => panic!("expected a subprocess failure, got {:?}", other),
        }
    }

    #[test]
    fn missing_damage_is_an_extraction_error() {
        let engine = ENGINE.replace("ENDOMMAGEMENT SEQUENCE", "NO RESULT");
        let fixture = Fixture::new(&engine);

        match run_contribution(&fixture.config, &Tracker::new(), &fixture.request(0, "EMPTY")) {
            Err(Error::Extraction { contribution, .. }) => assert_eq!(contribution, "EMPTY"),
            other => panic!("expected an extraction failure, got {:?}", other),
        }
    }

    #[test]
    fn cancellation_kills_engine_and_cleans_up() {
        let pid_file = TempDir::new("pid").unwrap();
        let pid_path = pid_file.path().join("engine.pid");
        let engine = format!("#!/bin/sh\necho $$ > {}\nexec sleep 30\n", pid_path.display());
        let fixture = Fixture::new(&engine);
        let tracker = Arc::new(Tracker::new());

        let canceller = {
            let tracker = Arc::clone(&tracker);
            let pid_path = pid_path.clone();
            thread::spawn(move || {
                let started = Instant::now();
                while !pid_path.exists() && started.elapsed() < Duration::from_secs(10) {
                    thread::sleep(Duration::from_millis(20));
                }
                thread::sleep(Duration::from_millis(100));
                tracker.cancel();
            })
        };

        let started = Instant::now();
        let result = run_contribution(&fixture.config, &*tracker, &fixture.request(0, "SLOW")).unwrap();
        canceller.join().unwrap();

        assert!(result.is_none());
        assert!(started.elapsed() < Duration::from_secs(20));
        assert_eq!(fixture.work_dirs(), 0);

        let pid = fs::read_to_string(&pid_path).unwrap();
        assert!(!Path::new("/proc").join(pid.trim()).exists());
    }

    #[test]
    fn batch_results_are_ordered_by_index() {
        let fixture = Fixture::new(ENGINE);
        let requests = vec![fixture.request(2, "C"), fixture.request(0, "A"), fixture.request(1, "B")];

        let results = run_contributions(&fixture.config, &Tracker::new(), &requests)
            .unwrap()
            .unwrap();

        assert_eq!(results.iter().map(|r| r.index).collect::<Vec<_>>(), vec![0, 1, 2]);
        assert_eq!(fixture.work_dirs(), 0);
    }
}
