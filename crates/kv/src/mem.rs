//! In-memory key-value engine.
//!
//! This is not a good implementation for production use, but is useful for
//! testing.

use crate::{
    model::{
        EngineError, EngineRead, EngineWrite, KvEngine, KvError, RawCursor, RawCursorMut,
        RawKeyValue, RawValue,
    },
    tables::TableFlags,
};
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use std::{
    borrow::Cow,
    collections::{BTreeMap, BTreeSet},
    ops::Bound,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

// Rows are ordered by key, then by value, like a dup-sort B-tree.
type Row = (Bytes, Bytes);
type Store = BTreeMap<String, Arc<MemTable>>;

/// Flags the in-memory engine can honor.
const SUPPORTED_FLAGS: TableFlags = TableFlags::DUP_SORT;

/// A simple copy-on-write in-memory key-value store.
///
/// Every committed state is an immutable snapshot. Read transactions hold
/// the snapshot that was current when they began, so they never block and
/// never observe later commits. A write transaction works on a private copy
/// of the table map, copying each table on first write, and publishes it
/// atomically on commit.
///
/// One write transaction may be open at a time. A second concurrent
/// [`KvEngine::writer`] call fails with [`MemKvError::WriteLocked`].
#[derive(Clone, Default)]
pub struct MemKv {
    root: Arc<RwLock<Arc<Store>>>,
    writer: Arc<AtomicBool>,
}

impl core::fmt::Debug for MemKv {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MemKv").finish()
    }
}

impl MemKv {
    /// Create a new empty in-memory KV store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvEngine for MemKv {
    type RoTx = MemKvRoTx;
    type RwTx = MemKvRwTx;

    fn reader(&self) -> Result<Self::RoTx, KvError> {
        Ok(MemKvRoTx { snapshot: Arc::clone(&self.root.read()) })
    }

    fn writer(&self) -> Result<Self::RwTx, KvError> {
        if self.writer.swap(true, Ordering::AcqRel) {
            return Err(MemKvError::WriteLocked.into_kv_error());
        }
        let slot = WriterSlot(Arc::clone(&self.writer));
        let working = Store::clone(&self.root.read());
        Ok(MemKvRwTx { root: Arc::clone(&self.root), working: Mutex::new(working), _slot: slot })
    }
}

/// Error type for MemKv operations.
#[derive(Debug, thiserror::Error)]
pub enum MemKvError {
    /// The table does not exist.
    #[error("no such table: {0}")]
    NoSuchTable(String),

    /// Indicates that a write transaction is already in progress.
    #[error("a write transaction is already in progress")]
    WriteLocked,

    /// The table flags require a custom comparator.
    #[error("table flags not supported in memory: {0:?}")]
    UnsupportedFlags(TableFlags),

    /// Mutation through a cursor of a read transaction.
    #[error("cursor belongs to a read-only transaction")]
    ReadOnlyCursor,
}

impl EngineError for MemKvError {
    fn into_kv_error(self) -> KvError {
        KvError::from_err(self)
    }
}

/// A table: a sorted set of rows.
#[derive(Debug, Clone, Default)]
pub(crate) struct MemTable {
    dup_sort: bool,
    rows: BTreeSet<Row>,
}

/// The smallest row of `key`.
fn floor_of(key: &[u8]) -> Row {
    (Bytes::copy_from_slice(key), Bytes::new())
}

/// The smallest row above every row of `key`.
fn ceiling_of(key: &[u8]) -> Row {
    let mut next = Vec::with_capacity(key.len() + 1);
    next.extend_from_slice(key);
    next.push(0);
    (next.into(), Bytes::new())
}

impl MemTable {
    fn lower_bound(&self, key: &[u8]) -> Option<&Row> {
        self.rows.range(floor_of(key)..).next()
    }

    fn exact(&self, key: &[u8]) -> Option<&Row> {
        self.lower_bound(key).filter(|(rk, _)| rk == key)
    }

    fn after(&self, row: &Row) -> Option<&Row> {
        self.rows.range((Bound::Excluded(row), Bound::Unbounded)).next()
    }

    fn before(&self, row: &Row) -> Option<&Row> {
        self.rows.range(..row).next_back()
    }

    fn first_above_key(&self, key: &[u8]) -> Option<&Row> {
        self.rows.range(ceiling_of(key)..).next()
    }

    fn last_below_key(&self, key: &[u8]) -> Option<&Row> {
        self.rows.range(..floor_of(key)).next_back()
    }

    fn last_of_key(&self, key: &[u8]) -> Option<&Row> {
        self.rows.range(..ceiling_of(key)).next_back().filter(|(rk, _)| rk == key)
    }

    fn dual_lower_bound(&self, key: &[u8], value: &[u8]) -> Option<&Row> {
        let from = (Bytes::copy_from_slice(key), Bytes::copy_from_slice(value));
        self.rows.range(from..).next().filter(|(rk, _)| rk == key)
    }

    fn put(&mut self, key: &[u8], value: &[u8]) -> Row {
        if !self.dup_sort {
            self.remove_key(key);
        }
        let row = (Bytes::copy_from_slice(key), Bytes::copy_from_slice(value));
        self.rows.insert(row.clone());
        row
    }

    fn remove_key(&mut self, key: &[u8]) {
        let doomed: Vec<Row> = self
            .rows
            .range(floor_of(key)..)
            .take_while(|(rk, _)| rk == key)
            .cloned()
            .collect();
        for row in doomed {
            self.rows.remove(&row);
        }
    }
}

/// Releases the engine's writer slot when the write transaction ends.
struct WriterSlot(Arc<AtomicBool>);

impl Drop for WriterSlot {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Read-only transaction for MemKv.
pub struct MemKvRoTx {
    snapshot: Arc<Store>,
}

impl core::fmt::Debug for MemKvRoTx {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MemKvRoTx").finish()
    }
}

impl MemKvRoTx {
    fn table(&self, table: &str) -> Result<&Arc<MemTable>, MemKvError> {
        self.snapshot.get(table).ok_or_else(|| MemKvError::NoSuchTable(table.to_owned()))
    }
}

impl EngineRead for MemKvRoTx {
    type Error = MemKvError;

    type Cursor<'a> = MemKvCursor<'a>;

    fn raw_cursor<'a>(&'a self, table: &str) -> Result<Self::Cursor<'a>, Self::Error> {
        let table = Arc::clone(self.table(table)?);
        Ok(MemKvCursor { source: Source::Snapshot(table), pos: None })
    }

    fn raw_get<'a>(
        &'a self,
        table: &str,
        key: &[u8],
    ) -> Result<Option<RawValue<'a>>, Self::Error> {
        Ok(self.table(table)?.exact(key).map(|(_, v)| Cow::Borrowed(v.as_ref())))
    }

    fn table_exists(&self, table: &str) -> Result<bool, Self::Error> {
        Ok(self.snapshot.contains_key(table))
    }

    fn table_names(&self) -> Result<Vec<String>, Self::Error> {
        Ok(self.snapshot.keys().cloned().collect())
    }

    fn raw_commit(self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// Read-write transaction for MemKv.
pub struct MemKvRwTx {
    root: Arc<RwLock<Arc<Store>>>,
    working: Mutex<Store>,
    _slot: WriterSlot,
}

impl core::fmt::Debug for MemKvRwTx {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MemKvRwTx").finish()
    }
}

impl MemKvRwTx {
    fn table(&self, table: &str) -> Result<Arc<MemTable>, MemKvError> {
        self.working
            .lock()
            .get(table)
            .cloned()
            .ok_or_else(|| MemKvError::NoSuchTable(table.to_owned()))
    }

    fn with_table_mut<R>(
        &self,
        table: &str,
        f: impl FnOnce(&mut MemTable) -> R,
    ) -> Result<R, MemKvError> {
        let mut working = self.working.lock();
        let entry =
            working.get_mut(table).ok_or_else(|| MemKvError::NoSuchTable(table.to_owned()))?;
        Ok(f(Arc::make_mut(entry)))
    }

    fn cursor(&self, table: &str) -> Result<MemKvCursor<'_>, MemKvError> {
        self.table(table)?;
        Ok(MemKvCursor { source: Source::Working { tx: self, table: table.to_owned() }, pos: None })
    }
}

impl EngineRead for MemKvRwTx {
    type Error = MemKvError;

    type Cursor<'a> = MemKvCursor<'a>;

    fn raw_cursor<'a>(&'a self, table: &str) -> Result<Self::Cursor<'a>, Self::Error> {
        self.cursor(table)
    }

    fn raw_get<'a>(
        &'a self,
        table: &str,
        key: &[u8],
    ) -> Result<Option<RawValue<'a>>, Self::Error> {
        let table = self.table(table)?;
        Ok(table.exact(key).map(|(_, v)| Cow::Owned(v.to_vec())))
    }

    fn table_exists(&self, table: &str) -> Result<bool, Self::Error> {
        Ok(self.working.lock().contains_key(table))
    }

    fn table_names(&self) -> Result<Vec<String>, Self::Error> {
        Ok(self.working.lock().keys().cloned().collect())
    }

    fn raw_commit(self) -> Result<(), Self::Error> {
        let Self { root, working, _slot } = self;
        *root.write() = Arc::new(working.into_inner());
        Ok(())
    }
}

impl EngineWrite for MemKvRwTx {
    type CursorMut<'a> = MemKvCursor<'a>;

    fn raw_cursor_mut<'a>(&'a self, table: &str) -> Result<Self::CursorMut<'a>, Self::Error> {
        self.cursor(table)
    }

    fn raw_put(&self, table: &str, key: &[u8], value: &[u8]) -> Result<(), Self::Error> {
        self.with_table_mut(table, |t| {
            t.put(key, value);
        })
    }

    fn raw_delete(
        &self,
        table: &str,
        key: &[u8],
        value: Option<&[u8]>,
    ) -> Result<(), Self::Error> {
        self.with_table_mut(table, |t| match value {
            Some(value) => {
                t.rows.remove(&(Bytes::copy_from_slice(key), Bytes::copy_from_slice(value)));
            }
            None => t.remove_key(key),
        })
    }

    fn create_table(&self, table: &str, flags: TableFlags) -> Result<(), Self::Error> {
        let unsupported = flags.difference(SUPPORTED_FLAGS);
        if !unsupported.is_empty() {
            return Err(MemKvError::UnsupportedFlags(unsupported));
        }
        self.working.lock().entry(table.to_owned()).or_insert_with(|| {
            Arc::new(MemTable {
                dup_sort: flags.contains(TableFlags::DUP_SORT),
                rows: BTreeSet::new(),
            })
        });
        Ok(())
    }

    fn drop_table(&self, table: &str) -> Result<(), Self::Error> {
        self.working.lock().remove(table);
        Ok(())
    }

    fn clear_table(&self, table: &str) -> Result<(), Self::Error> {
        self.with_table_mut(table, |t| t.rows.clear())
    }
}

enum Source<'a> {
    /// A committed snapshot of the table.
    Snapshot(Arc<MemTable>),
    /// The working copy of a write transaction, looked up on every call so
    /// the cursor sees the transaction's own writes.
    Working { tx: &'a MemKvRwTx, table: String },
}

/// Memory cursor over one table.
///
/// The position is the last row returned. It stays meaningful after that
/// row is deleted, so stepping forward finds the row that followed it.
pub struct MemKvCursor<'a> {
    source: Source<'a>,
    pos: Option<Row>,
}

impl core::fmt::Debug for MemKvCursor<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MemKvCursor").field("pos", &self.pos).finish()
    }
}

impl MemKvCursor<'_> {
    fn table(&self) -> Result<Arc<MemTable>, MemKvError> {
        match &self.source {
            Source::Snapshot(table) => Ok(Arc::clone(table)),
            Source::Working { tx, table } => tx.table(table),
        }
    }

    fn with_table_mut<R>(&self, f: impl FnOnce(&mut MemTable) -> R) -> Result<R, MemKvError> {
        match &self.source {
            Source::Snapshot(_) => Err(MemKvError::ReadOnlyCursor),
            Source::Working { tx, table } => tx.with_table_mut(table, f),
        }
    }

    /// Move to `row`, or clear the position if there is none.
    fn seek_to(&mut self, row: Option<Row>) -> Option<RawKeyValue<'_>> {
        self.pos = row;
        self.pos.as_ref().map(|(k, v)| (Cow::Borrowed(k.as_ref()), Cow::Borrowed(v.as_ref())))
    }

    /// Move to `row` if there is one. Otherwise keep the position.
    fn step_to(&mut self, row: Option<Row>) -> Option<RawKeyValue<'_>> {
        match row {
            Some(row) => self.seek_to(Some(row)),
            None => None,
        }
    }

    fn current_key(&self) -> Option<Bytes> {
        self.pos.as_ref().map(|(k, _)| k.clone())
    }
}

impl RawCursor<MemKvError> for MemKvCursor<'_> {
    fn first<'b>(&'b mut self) -> Result<Option<RawKeyValue<'b>>, MemKvError> {
        let row = self.table()?.rows.first().cloned();
        Ok(self.seek_to(row))
    }

    fn last<'b>(&'b mut self) -> Result<Option<RawKeyValue<'b>>, MemKvError> {
        let row = self.table()?.rows.last().cloned();
        Ok(self.seek_to(row))
    }

    fn exact<'b>(&'b mut self, key: &[u8]) -> Result<Option<RawValue<'b>>, MemKvError> {
        let row = self.table()?.exact(key).cloned();
        Ok(self.seek_to(row).map(|(_, v)| v))
    }

    fn lower_bound<'b>(&'b mut self, key: &[u8]) -> Result<Option<RawKeyValue<'b>>, MemKvError> {
        let row = self.table()?.lower_bound(key).cloned();
        Ok(self.seek_to(row))
    }

    fn read_next<'b>(&'b mut self) -> Result<Option<RawKeyValue<'b>>, MemKvError> {
        let table = self.table()?;
        let row = match &self.pos {
            Some(pos) => table.after(pos).cloned(),
            None => table.rows.first().cloned(),
        };
        Ok(self.step_to(row))
    }

    fn read_prev<'b>(&'b mut self) -> Result<Option<RawKeyValue<'b>>, MemKvError> {
        let table = self.table()?;
        let row = match &self.pos {
            Some(pos) => table.before(pos).cloned(),
            None => table.rows.last().cloned(),
        };
        Ok(self.step_to(row))
    }

    fn exact_dual<'b>(
        &'b mut self,
        key: &[u8],
        value: &[u8],
    ) -> Result<Option<RawValue<'b>>, MemKvError> {
        let row = self.table()?.dual_lower_bound(key, value).filter(|(_, v)| v == value).cloned();
        Ok(self.seek_to(row).map(|(_, v)| v))
    }

    fn dual_lower_bound<'b>(
        &'b mut self,
        key: &[u8],
        value: &[u8],
    ) -> Result<Option<RawValue<'b>>, MemKvError> {
        let row = self.table()?.dual_lower_bound(key, value).cloned();
        Ok(self.seek_to(row).map(|(_, v)| v))
    }

    fn next_dup<'b>(&'b mut self) -> Result<Option<RawKeyValue<'b>>, MemKvError> {
        let table = self.table()?;
        let row = self
            .pos
            .as_ref()
            .and_then(|pos| table.after(pos).filter(|(k, _)| *k == pos.0))
            .cloned();
        Ok(self.step_to(row))
    }

    fn next_no_dup<'b>(&'b mut self) -> Result<Option<RawKeyValue<'b>>, MemKvError> {
        let table = self.table()?;
        let row = match self.current_key() {
            Some(key) => table.first_above_key(&key).cloned(),
            None => table.rows.first().cloned(),
        };
        Ok(self.step_to(row))
    }

    fn prev_dup<'b>(&'b mut self) -> Result<Option<RawKeyValue<'b>>, MemKvError> {
        let table = self.table()?;
        let row = self
            .pos
            .as_ref()
            .and_then(|pos| table.before(pos).filter(|(k, _)| *k == pos.0))
            .cloned();
        Ok(self.step_to(row))
    }

    fn prev_no_dup<'b>(&'b mut self) -> Result<Option<RawKeyValue<'b>>, MemKvError> {
        let table = self.table()?;
        let row = match self.current_key() {
            Some(key) => table.last_below_key(&key).cloned(),
            None => table.rows.last().cloned(),
        };
        Ok(self.step_to(row))
    }

    fn last_dup<'b>(&'b mut self) -> Result<Option<RawValue<'b>>, MemKvError> {
        let table = self.table()?;
        let row = self.current_key().and_then(|key| table.last_of_key(&key).cloned());
        Ok(self.step_to(row).map(|(_, v)| v))
    }
}

impl RawCursorMut<MemKvError> for MemKvCursor<'_> {
    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), MemKvError> {
        let row = self.with_table_mut(|t| t.put(key, value))?;
        self.pos = Some(row);
        Ok(())
    }

    fn delete_current(&mut self) -> Result<(), MemKvError> {
        let Some(pos) = self.pos.clone() else {
            return Ok(());
        };
        self.with_table_mut(|t| {
            t.rows.remove(&pos);
        })
    }

    fn delete_current_dups(&mut self) -> Result<(), MemKvError> {
        let Some(key) = self.current_key() else {
            return Ok(());
        };
        self.with_table_mut(|t| t.remove_key(&key))?;
        // Step forward from the last possible row of the key.
        self.pos = Some(ceiling_of(&key));
        Ok(())
    }

    fn append(&mut self, key: &[u8], value: &[u8]) -> Result<(), MemKvError> {
        self.put(key, value)
    }

    fn append_dup(&mut self, key: &[u8], value: &[u8]) -> Result<(), MemKvError> {
        self.put(key, value)
    }
}
