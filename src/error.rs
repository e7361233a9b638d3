//! Crate-wide error type.
//!
//! The taxonomy is deliberately small:
//!
//! - `DataIntegrity`: inconsistent input metadata (mismatched parallel
//!   arrays, duplicate run identifiers). Fatal to the band being calibrated.
//! - `Io` / `Csv`: file-level failures with enough context to name the file.
//! - `InvalidInput`: bad user-supplied arguments or unusable table content.
//!
//! Missing-overlap and solver-nonconvergence situations are *not* errors:
//! both have defined fallbacks and are surfaced through the log instead.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CalibError {
    /// Inconsistent metadata. The whole band calibration stops; nothing is
    /// persisted.
    #[error("data integrity: {0}")]
    DataIntegrity(String),

    #[error("{context} '{}': {source}", path.display())]
    Io {
        context: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("{context} '{}': {source}", path.display())]
    Csv {
        context: &'static str,
        path: PathBuf,
        source: csv::Error,
    },

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl CalibError {
    pub fn io(context: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CalibError::Io {
            context,
            path: path.into(),
            source,
        }
    }

    pub fn csv(context: &'static str, path: impl Into<PathBuf>, source: csv::Error) -> Self {
        CalibError::Csv {
            context,
            path: path.into(),
            source,
        }
    }

    /// Process exit code for the binary.
    pub fn exit_code(&self) -> u8 {
        match self {
            CalibError::InvalidInput(_) | CalibError::Io { .. } | CalibError::Csv { .. } => 2,
            CalibError::DataIntegrity(_) => 4,
        }
    }
}
