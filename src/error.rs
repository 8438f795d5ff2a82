//! Error types for blockfile operations

use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BlockfileError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("could not open blockfile {path:?}: {source}")]
    Open { path: PathBuf, source: io::Error },

    #[error("could not open index for {path:?}: {source}")]
    OpenIndex {
        path: PathBuf,
        source: Box<BlockfileError>,
    },

    #[error("read failed at offset {offset}: {source}")]
    Read { offset: u64, source: io::Error },

    #[error("invalid block format at offset {offset}: {reason}")]
    Format { offset: u64, reason: String },

    #[error("index lookup failure: {0}")]
    IndexLookup(#[source] Box<BlockfileError>),

    #[error("index error: {0}")]
    Index(String),

    #[error("lookup cancelled")]
    Cancelled,
}

impl BlockfileError {
    /// True when this error reports caller cancellation rather than a
    /// read or format failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, BlockfileError>;
