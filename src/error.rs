use std::io;

use thiserror::Error;

use crate::model::ObjectId;

pub type Result<T> = std::result::Result<T, GraphError>;

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("corrupt commit-graph: {0}")]
    Corrupt(String),
    #[error("unsupported commit-graph version {0}")]
    UnsupportedVersion(u8),
    #[error("commit-graph checksum mismatch")]
    ChecksumMismatch,
    #[error("missing object {0}")]
    MissingObject(ObjectId),
    #[error("operation cancelled")]
    Cancelled,
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}
