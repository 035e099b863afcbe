//! Raw cursor traversal traits implemented by storage engines.

use super::{EngineError, RawKeyValue, RawValue};

/// Trait for traversing the raw rows of one table.
///
/// Rows are ordered by key, then, for dup-sort tables, by value. Every
/// positioning call leaves the cursor at the returned row. A call that
/// returns `Ok(None)` leaves the position implementation-defined, so callers
/// re-position before continuing.
pub trait RawCursor<E: EngineError> {
    /// Set position to the first row in the table, and return it.
    fn first<'a>(&'a mut self) -> Result<Option<RawKeyValue<'a>>, E>;

    /// Set position to the last row in the table, and return it.
    fn last<'a>(&'a mut self) -> Result<Option<RawKeyValue<'a>>, E>;

    /// Set the cursor to the first row with exactly `key`, and return its
    /// value if it exists.
    fn exact<'a>(&'a mut self, key: &[u8]) -> Result<Option<RawValue<'a>>, E>;

    /// Seek to the first row AT OR ABOVE the specified key, and return it.
    fn lower_bound<'a>(&'a mut self, key: &[u8]) -> Result<Option<RawKeyValue<'a>>, E>;

    /// Get the next row, and advance the cursor.
    ///
    /// Returning `Ok(None)` indicates the cursor is past the end of the
    /// table. On an unpositioned cursor this behaves like [`first`].
    ///
    /// [`first`]: RawCursor::first
    fn read_next<'a>(&'a mut self) -> Result<Option<RawKeyValue<'a>>, E>;

    /// Get the previous row, and move the cursor.
    ///
    /// Returning `Ok(None)` indicates the cursor is before the start of the
    /// table. On an unpositioned cursor this behaves like [`last`].
    ///
    /// [`last`]: RawCursor::last
    fn read_prev<'a>(&'a mut self) -> Result<Option<RawKeyValue<'a>>, E>;

    /// Position at the exact `(key, value)` duplicate, returning the value if
    /// it exists.
    fn exact_dual<'a>(&'a mut self, key: &[u8], value: &[u8])
    -> Result<Option<RawValue<'a>>, E>;

    /// Position at the first duplicate of `key` that is AT OR ABOVE `value`,
    /// and return it. Never moves to another key.
    fn dual_lower_bound<'a>(
        &'a mut self,
        key: &[u8],
        value: &[u8],
    ) -> Result<Option<RawValue<'a>>, E>;

    /// Move to the next duplicate of the current key.
    fn next_dup<'a>(&'a mut self) -> Result<Option<RawKeyValue<'a>>, E>;

    /// Move to the first duplicate of the next key.
    fn next_no_dup<'a>(&'a mut self) -> Result<Option<RawKeyValue<'a>>, E>;

    /// Move to the previous duplicate of the current key.
    fn prev_dup<'a>(&'a mut self) -> Result<Option<RawKeyValue<'a>>, E>;

    /// Move to the last duplicate of the previous key.
    fn prev_no_dup<'a>(&'a mut self) -> Result<Option<RawKeyValue<'a>>, E>;

    /// Move to the last duplicate of the current key.
    fn last_dup<'a>(&'a mut self) -> Result<Option<RawValue<'a>>, E>;
}

/// Trait for traversing the raw rows of one table with mutation
/// capabilities.
pub trait RawCursorMut<E: EngineError>: RawCursor<E> {
    /// Write a row and position the cursor at it. Plain tables replace the
    /// value of `key`, dup-sort tables add a duplicate.
    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), E>;

    /// Delete the row at the current position.
    ///
    /// Afterwards [`read_next`] returns the row that followed the deleted
    /// one.
    ///
    /// [`read_next`]: RawCursor::read_next
    fn delete_current(&mut self) -> Result<(), E>;

    /// Delete every duplicate of the current key.
    fn delete_current_dups(&mut self) -> Result<(), E>;

    /// Append a row to the end of the table.
    ///
    /// Key must be greater than all existing keys. If it is not, behavior is
    /// backend-specific. The backend may return an error, or silently fall
    /// back to a regular put.
    fn append(&mut self, key: &[u8], value: &[u8]) -> Result<(), E>;

    /// Append a duplicate to the end of the duplicates of `key`. The same
    /// ordering caveats as [`append`](RawCursorMut::append) apply.
    fn append_dup(&mut self, key: &[u8], value: &[u8]) -> Result<(), E>;
}
