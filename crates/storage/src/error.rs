//! Error types for opening storage.

use crate::config::ConfigError;
use strata_kv::KvError;

/// Error type for storage construction.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The builder is missing a setting, or the setting cannot be honored.
    #[error("storage configuration error: {0}")]
    Config(String),
    /// Reading the environment failed.
    #[error(transparent)]
    Env(#[from] ConfigError),
    /// Opening the database failed.
    #[error("database error: {0}")]
    Kv(#[source] KvError),
    /// Opening the MDBX environment failed.
    #[cfg(feature = "mdbx")]
    #[error("mdbx error: {0}")]
    Mdbx(#[from] strata_kv_mdbx::MdbxError),
    /// Preparing the database directory failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<KvError> for StorageError {
    fn from(err: KvError) -> Self {
        Self::Kv(err)
    }
}

/// Result type alias for storage construction.
pub type StorageResult<T> = Result<T, StorageError>;
