use crate::{
    model::{EngineError, KvError, RawCursor, RawCursorMut, RawValue},
    tables::TableFlags,
};

/// A storage engine. This is a KV store with read/write transactions.
///
/// This is the seam between the access layer and the B-tree engine. The
/// engine owns page management, MVCC and durability. It knows nothing of
/// table configuration, auto-conversion or transaction accounting, all of
/// which live in [`Database`].
///
/// When implementing this trait, consult the [`model`] module documentation
/// for details on the associated types and their requirements.
///
/// [`Database`]: crate::db::Database
/// [`model`]: crate::model
#[auto_impl::auto_impl(&, Arc, Box)]
pub trait KvEngine {
    /// The read-only transaction type.
    type RoTx: EngineRead;
    /// The read-write transaction type.
    type RwTx: EngineWrite;

    /// Create a read-only transaction.
    fn reader(&self) -> Result<Self::RoTx, KvError>;

    /// Create a read-write transaction.
    ///
    /// Engines MAY block until other write transactions finish, or fail.
    /// The [`Database`] never requests a second writer while one is open.
    ///
    /// [`Database`]: crate::db::Database
    fn writer(&self) -> Result<Self::RwTx, KvError>;
}

/// An engine read transaction.
///
/// Tables are addressed by name. Opening a cursor or reading from a table
/// that does not exist is an engine error.
pub trait EngineRead {
    /// Error type for engine operations.
    type Error: EngineError;

    /// The cursor type for traversing a table.
    type Cursor<'a>: RawCursor<Self::Error>
    where
        Self: 'a;

    /// Get a raw cursor over a table.
    fn raw_cursor<'a>(&'a self, table: &str) -> Result<Self::Cursor<'a>, Self::Error>;

    /// Get a raw value from a table.
    ///
    /// For dup-sort tables, this returns the first duplicate.
    fn raw_get<'a>(&'a self, table: &str, key: &[u8])
    -> Result<Option<RawValue<'a>>, Self::Error>;

    /// Returns `true` if the table exists.
    fn table_exists(&self, table: &str) -> Result<bool, Self::Error>;

    /// List the names of all existing tables, sorted.
    fn table_names(&self) -> Result<Vec<String>, Self::Error>;

    /// End the transaction. Read transactions release their snapshot.
    fn raw_commit(self) -> Result<(), Self::Error>
    where
        Self: Sized;
}

/// An engine read-write transaction.
///
/// Changes become visible to other transactions only after
/// [`EngineRead::raw_commit`]. Dropping the transaction discards them.
pub trait EngineWrite: EngineRead {
    /// The mutable cursor type for traversing a table.
    type CursorMut<'a>: RawCursorMut<Self::Error>
    where
        Self: 'a;

    /// Get a raw mutable cursor over a table.
    fn raw_cursor_mut<'a>(&'a self, table: &str) -> Result<Self::CursorMut<'a>, Self::Error>;

    /// Write a raw pair.
    ///
    /// Plain tables replace the value stored under `key`. Dup-sort tables
    /// add `value` to the duplicates of `key`, which is a no-op if the exact
    /// pair exists.
    fn raw_put(&self, table: &str, key: &[u8], value: &[u8]) -> Result<(), Self::Error>;

    /// Delete a raw key.
    ///
    /// With `value == None`, every value stored under `key` is removed. With
    /// a value, only that duplicate is removed.
    fn raw_delete(
        &self,
        table: &str,
        key: &[u8],
        value: Option<&[u8]>,
    ) -> Result<(), Self::Error>;

    /// Create a table if it does not exist. Creating an existing table is a
    /// no-op.
    fn create_table(&self, table: &str, flags: TableFlags) -> Result<(), Self::Error>;

    /// Remove a table and its contents. Dropping a missing table is a no-op.
    fn drop_table(&self, table: &str) -> Result<(), Self::Error>;

    /// Remove every row of a table, keeping the table.
    fn clear_table(&self, table: &str) -> Result<(), Self::Error>;
}
