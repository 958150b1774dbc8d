use std::path::PathBuf;

use thiserror::Error;

use crate::mmdb::MmdbError;

/// Fatal failures of a patch run, one variant per stage.
#[derive(Error, Debug)]
pub enum PatchError {
    #[error("database")]
    Database(#[source] MmdbError),

    #[error("lookup store {}: {message}", path.display())]
    LookupStore { path: PathBuf, message: String },

    #[error("block list {}: {message}", path.display())]
    BlockList { path: PathBuf, message: String },

    #[error("block list line {line}: expected at least 3 fields, found {fields}")]
    MalformedRow { line: u64, fields: usize },

    #[error("block list line {line}: invalid network {text:?}")]
    InvalidNetwork { line: u64, text: String },

    #[error("insert {network}")]
    Insert {
        network: String,
        #[source]
        source: MmdbError,
    },

    #[error("write")]
    Write(#[source] MmdbError),
}

impl PatchError {
    /// Name of the stage that failed.
    pub fn stage(&self) -> &'static str {
        match self {
            Self::Database(_) => "database",
            Self::LookupStore { .. } => "lookup store",
            Self::BlockList { .. } | Self::MalformedRow { .. } | Self::InvalidNetwork { .. } => {
                "block list"
            }
            Self::Insert { .. } => "insert",
            Self::Write(_) => "write",
        }
    }
}
