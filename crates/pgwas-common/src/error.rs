//! Error types shared by the PGWAS crates

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for common operations
pub type Result<T> = std::result::Result<T, CommonError>;

/// Errors raised while reading delimited input files
#[derive(Error, Debug)]
pub enum CommonError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed delimited file {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("File {0} contains no data")]
    EmptyFile(PathBuf),

    #[error("Parse error in {path} (row {row}): {message}")]
    Parse {
        path: PathBuf,
        row: usize,
        message: String,
    },
}

impl CommonError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn parse(path: impl Into<PathBuf>, row: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            row,
            message: message.into(),
        }
    }
}
