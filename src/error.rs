use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Failures of a merge or rewrite run. None of them are recovered; they end the run.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("failed to read {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse {path:?}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("failed to write {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl DataError {
    pub fn read(path: impl Into<PathBuf>, source: io::Error) -> Self {
        DataError::Read { path: path.into(), source }
    }

    pub fn parse(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        DataError::Parse { path: path.into(), message: message.to_string() }
    }

    pub fn write(path: impl Into<PathBuf>, source: io::Error) -> Self {
        DataError::Write { path: path.into(), source }
    }
}

pub type Result<T> = std::result::Result<T, DataError>;
