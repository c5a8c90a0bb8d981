use thiserror::Error;
use std::io;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("usage: {0}")]
    Usage(String),
    #[error("file '{path}' not found")]
    NotFound { path: String },
    #[error("record already exists: '{0}'")]
    DuplicateKey(String),
    #[error("index file format error: {0}")]
    Format(String),
    #[error("internal invariant violated: {0}")]
    InvariantViolation(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl IndexError {
    /// Duplicate keys are skipped by the bulk loader; everything else aborts.
    pub fn is_duplicate(&self) -> bool {
        matches!(self, IndexError::DuplicateKey(_))
    }

    /// Map an `io::Error` from opening `path`, keeping missing files distinct.
    pub fn open_failed(path: &str, err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::NotFound {
            IndexError::NotFound { path: path.to_string() }
        } else {
            IndexError::Io(err)
        }
    }
}

pub type IndexResult<T> = Result<T, IndexError>;
