use signet_libmdbx::{MdbxError as LibMdbxError, ReadError};
use strata_kv::model::{EngineError, KvError};

/// Error type for the [`signet_libmdbx`] engine.
#[derive(Debug, thiserror::Error)]
pub enum MdbxError {
    /// Inner error
    #[error(transparent)]
    Mdbx(#[from] LibMdbxError),

    /// A stored row could not be decoded into the requested shape.
    #[error(transparent)]
    Decoding(Box<dyn std::error::Error + Send + Sync + 'static>),

    /// Table not found.
    #[error("table not found: {0}")]
    UnknownTable(String),

    /// A write transaction was requested from a read-only environment.
    #[error("environment is opened read-only")]
    ReadOnlyEnv,
}

impl EngineError for MdbxError {
    fn into_kv_error(self) -> KvError {
        match self {
            MdbxError::UnknownTable(table) => KvError::UnknownTable(table),
            MdbxError::ReadOnlyEnv => KvError::ReadOnly,
            _ => KvError::from_err(self),
        }
    }
}

impl From<ReadError> for MdbxError {
    fn from(err: ReadError) -> Self {
        match err {
            ReadError::Mdbx(e) => MdbxError::Mdbx(e),
            ReadError::Decoding(e) => MdbxError::Decoding(e),
        }
    }
}
