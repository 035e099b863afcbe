use crate::iter::Order;
use strata_storage_types::IntegerListError;

/// Error type for the access layer.
#[derive(thiserror::Error, Debug)]
pub enum KvError {
    /// The database is closing or closed.
    #[error("database closed")]
    Closed,

    /// The caller's cancellation token fired before the operation could
    /// proceed.
    #[error("operation cancelled")]
    Cancelled,

    /// The transaction was already committed or rolled back.
    #[error("transaction already terminated")]
    Terminated,

    /// Write access was requested on a read-only database.
    #[error("database is opened in read-only mode")]
    ReadOnly,

    /// [`Stream::next`] was called on a stream with no remaining items.
    ///
    /// [`Stream::next`]: crate::iter::Stream::next
    #[error("stream exhausted")]
    StreamExhausted,

    /// A key of unsupported length was written to an auto-conversion table.
    #[error(
        "key length conflict in table {table}: got {len} bytes, expected exactly {from} or fewer than {to}"
    )]
    KeyLengthConflict {
        /// The table name.
        table: String,
        /// Length of the offending key.
        len: usize,
        /// Full composite key length.
        from: usize,
        /// Stored primary key length.
        to: usize,
    },

    /// A dup-sort operation was attempted on a table without `DUP_SORT`.
    #[error("table {0} is not dup-sort")]
    NotDupSort(String),

    /// Only deprecated tables may be dropped.
    #[error("attempt to delete non-deprecated table: {0}")]
    DeleteNonDeprecatedTable(String),

    /// Range bounds contradict the iteration order.
    #[error("invalid {order} range: from {from} to {to}")]
    InvalidRange {
        /// Lower or upper bound, depending on order.
        from: String,
        /// Exclusive end bound.
        to: String,
        /// Requested iteration order.
        order: Order,
    },

    /// A temporal write used a timestamp older than the latest one already
    /// recorded for the key.
    #[error("timestamp {ts} precedes latest recorded timestamp {latest}")]
    TimestampRegression {
        /// The rejected timestamp.
        ts: u64,
        /// Latest timestamp already indexed for the key.
        latest: u64,
    },

    /// The table is not part of the table configuration.
    #[error("unknown table: {0}")]
    UnknownTable(String),

    /// A stored row does not have the layout its table requires.
    #[error("corrupted row in table {table}: {reason}")]
    Corrupted {
        /// The table name.
        table: String,
        /// What was wrong with the row.
        reason: &'static str,
    },

    /// Stored index data could not be decoded.
    #[error(transparent)]
    IntegerList(#[from] IntegerListError),

    /// Boxed error. Indicates an issue with the storage engine.
    #[error(transparent)]
    Engine(#[from] Box<dyn std::error::Error + Send + Sync + 'static>),
}

impl KvError {
    /// Internal helper to create a `KvError::Engine` from any error.
    pub fn from_err<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        KvError::Engine(Box::new(err))
    }

    /// Returns `true` if the error reports a closed database.
    pub const fn is_closed(&self) -> bool {
        matches!(self, KvError::Closed)
    }

    /// Returns `true` if the error reports cancellation.
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, KvError::Cancelled)
    }

    pub(crate) fn corrupted(table: &str, reason: &'static str) -> Self {
        KvError::Corrupted { table: table.to_owned(), reason }
    }
}

/// Trait to convert engine-specific errors into [`KvError`].
pub trait EngineError: std::error::Error + Send + Sync + 'static {
    /// Convert the error into a [`KvError`].
    fn into_kv_error(self) -> KvError;
}

impl EngineError for KvError {
    fn into_kv_error(self) -> KvError {
        self
    }
}

/// Result type for access-layer operations.
pub type KvResult<T> = Result<T, KvError>;
