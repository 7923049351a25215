//! Errors raised by the stress sequence pipeline.
//!
//! Lookup misses are not errors. They are reported as warnings on the
//! owning task and the affected stress falls back to zero. Cancellation
//! is not an error either: operations return `Ok(None)`.

use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A token in an input text file could not be interpreted.
    #[error("could not parse '{token}' in file '{file}' at line {line}: {reason}")]
    Parse {
        file: String,
        line: usize,
        token: String,
        reason: String,
    },

    /// The file ended before the flight being read was complete.
    #[error("unexpected end of file '{file}' while reading flight '{flight}'")]
    PrematureEof { file: String, flight: String },

    /// More peaks were found for a flight than its header declared.
    #[error("flight '{flight}' declares {declared} peaks but {found} were read")]
    PeakCountMismatch {
        flight: String,
        declared: usize,
        found: usize,
    },

    #[error("invalid class code '{0}'")]
    InvalidClassCode(String),

    #[error("unsupported operating system '{0}'")]
    UnsupportedPlatform(String),

    /// An external executable exited with a failure or left an error marker.
    #[error("{stage} for damage contribution {contribution} has failed! See '{log}' file for details.")]
    Subprocess {
        stage: String,
        contribution: String,
        log: String,
    },

    /// An external executable finished but did not produce its output.
    #[error("{stage} for damage contribution {contribution} did not produce '{output}'. See '{log}' file for details.")]
    MissingOutput {
        stage: String,
        contribution: String,
        output: String,
        log: String,
    },

    /// The analysis output does not contain the expected result marker.
    #[error("extracting analysis results for damage contribution {contribution} has failed! See '{log}' file for details.")]
    Extraction { contribution: String, log: String },

    #[error("invalid option '{option}': {reason}")]
    InvalidOption { option: String, reason: String },
}
