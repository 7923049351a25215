//! Operating system specific details of launching the analysis tools.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Base name of the native analysis engine.
pub const ENGINE_NAME: &str = "spectre_proto_CG";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Platform {
    Windows,
    MacOs,
    Linux,
}

/// Where the script interpreter comes from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Interpreter {
    /// Shipped with the scripts, relative to the scripts directory.
    Bundled(&'static str),
    /// Found on the search path.
    System(&'static str),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlatformEntry {
    pub engine_suffix: &'static str,
    pub interpreter: Interpreter,
    /// Environment variables pointing at directories inside the scripts
    /// directory.
    pub library_paths: Vec<(&'static str, &'static str)>,
    /// The engine must have its executable bit set before it is run.
    pub set_executable: bool,
}

lazy_static! {
    static ref PLATFORMS: BTreeMap<Platform, PlatformEntry> = {
        let mut platforms = BTreeMap::new();
        platforms.insert(
            Platform::Windows,
            PlatformEntry {
                engine_suffix: ".exe",
                interpreter: Interpreter::Bundled("perl/bin/perl.exe"),
                library_paths: vec![],
                set_executable: false,
            },
        );
        platforms.insert(
            Platform::MacOs,
            PlatformEntry {
                engine_suffix: "_mac",
                interpreter: Interpreter::System("perl"),
                library_paths: vec![("DYLD_LIBRARY_PATH", "fortran")],
                set_executable: true,
            },
        );
        platforms.insert(
            Platform::Linux,
            PlatformEntry {
                engine_suffix: "_linux",
                interpreter: Interpreter::System("perl"),
                library_paths: vec![],
                set_executable: true,
            },
        );
        platforms
    };
}

impl Platform {
    /// The platform this program is running on.
    pub fn current() -> Result<Platform> {
        Platform::from_os(std::env::consts::OS)
    }

    pub fn from_os(os: &str) -> Result<Platform> {
        match os {
            "windows" => Ok(Platform::Windows),
            "macos" => Ok(Platform::MacOs),
            "linux" => Ok(Platform::Linux),
            other => Err(Error::UnsupportedPlatform(other.to_string())),
        }
    }

    pub fn entry(self) -> Result<&'static PlatformEntry> {
        PLATFORMS
            .get(&self)
            .ok_or_else(|| Error::UnsupportedPlatform(self.to_string()))
    }

    /// Path of the engine executable in the scripts directory.
    pub fn engine(self, scripts_dir: &Path, use_extended: bool) -> Result<PathBuf> {
        let extended = if use_extended { "_extended" } else { "" };
        let name = format!("{}{}{}", ENGINE_NAME, extended, self.entry()?.engine_suffix);
        Ok(scripts_dir.join(name))
    }

    /// The program used to run the perl scripts.
    pub fn interpreter(self, scripts_dir: &Path) -> Result<OsString> {
        Ok(match self.entry()?.interpreter {
            Interpreter::Bundled(relative) => scripts_dir.join(relative).into_os_string(),
            Interpreter::System(program) => OsString::from(program),
        })
    }

    /// Environment variables to set for the engine.
    pub fn engine_env(self, scripts_dir: &Path) -> Result<Vec<(&'static str, PathBuf)>> {
        Ok(self
            .entry()?
            .library_paths
            .iter()
            .map(|&(var, dir)| (var, scripts_dir.join(dir)))
            .collect())
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let text = match *self {
            Platform::Windows => "windows",
            Platform::MacOs => "macos",
            Platform::Linux => "linux",
        };
        write!(f, "{}", text)
    }
}

#[cfg(unix)]
pub fn make_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut permissions = fs::metadata(path)?.permissions();
    permissions.set_mode(permissions.mode() | 0o755);
    fs::set_permissions(path, permissions)?;
    Ok(())
}

#[cfg(not(unix))]
pub fn make_executable(path: &Path) -> Result<()> {
    fs::metadata(path)?;
    Ok(())
}
