use std::io;
use std::num::ParseIntError;
use std::str::Utf8Error;
use std::string::FromUtf8Error;

use thiserror::Error;

use pool::PoolError;

pub type CResult<T> = Result<T, MuxError>;

/// Workspace-wide error. User-visible permission and match failures are
/// never carried here; those travel as notify text or `#-1` tokens.
#[derive(Debug, Error)]
pub enum MuxError {
    /// Must never happen. If it does, it is a defect.
    #[error("BUG: {0}")]
    Bug(String),

    #[error("{0}")]
    Error(String),

    #[error("config: {0}")]
    ConfigFileParseErr(String),

    /// On-disk state failed a structural or checksum validation.
    #[error("corrupt store: {0}")]
    Corrupt(String),

    #[error("buffer pool: {0}")]
    Pool(#[from] PoolError),

    #[error(transparent)]
    IoError(#[from] io::Error),

    #[error(transparent)]
    Utf8Error(#[from] Utf8Error),

    #[error(transparent)]
    FromUtf8Error(#[from] FromUtf8Error),

    #[error(transparent)]
    ParseIntError(#[from] ParseIntError),
}

impl MuxError {
    pub fn is_corrupt(&self) -> bool {
        matches!(self, MuxError::Corrupt(_))
    }
}
