use super::{
    DbContext,
    cursor::{Cursor, DupCursor},
    lifecycle::{TxMode, TxTicket},
    range::RangeStream,
};
use crate::{
    codec::StoredKey,
    iter::Order,
    model::{EngineError, EngineRead, EngineWrite, KvEngine, KvError, KvResult},
    tables::TableCfgItem,
};
use bytes::Bytes;
use core::{cell::Cell, fmt, mem};
use std::{
    sync::Arc,
    time::{Duration, Instant},
};
use tracing::{info, trace, warn};

/// A read-only transaction of engine `E`.
pub type RoTx<E> = Tx<<E as KvEngine>::RoTx>;

/// A read-write transaction of engine `E`.
pub type RwTx<E> = Tx<<E as KvEngine>::RwTx>;

/// Byte counters kept for diagnostics.
#[derive(Debug, Default)]
pub(crate) struct TxStats {
    read: Cell<u64>,
    written: Cell<u64>,
}

impl TxStats {
    pub(crate) fn read(&self, bytes: usize) {
        self.read.set(self.read.get().saturating_add(bytes as u64));
    }

    pub(crate) fn write(&self, bytes: usize) {
        self.written.set(self.written.get().saturating_add(bytes as u64));
    }
}

enum TxState<T> {
    Open(T),
    Committed,
    RolledBack,
}

impl<T> TxState<T> {
    const fn name(&self) -> &'static str {
        match self {
            TxState::Open(_) => "open",
            TxState::Committed => "committed",
            TxState::RolledBack => "rolled back",
        }
    }
}

/// A transaction.
///
/// Transactions are `Open` until [`commit`](Tx::commit) or
/// [`rollback`](Tx::rollback), after which every operation fails with
/// [`KvError::Terminated`]. Dropping an open transaction rolls it back.
///
/// Keys and values are copied out of the engine, so results stay valid after
/// the transaction ends.
pub struct Tx<T: EngineRead> {
    state: TxState<T>,
    ticket: TxTicket,
    ctx: Arc<DbContext>,
    started: Instant,
    stats: TxStats,
}

impl<T: EngineRead> fmt::Debug for Tx<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tx")
            .field("id", &self.ticket.id())
            .field("mode", &self.ticket.mode())
            .field("state", &self.state.name())
            .finish_non_exhaustive()
    }
}

impl<T: EngineRead> Tx<T> {
    pub(crate) fn new(inner: T, ticket: TxTicket, ctx: Arc<DbContext>) -> Self {
        trace!(target: "strata::kv", parent: &ctx.span, tx_id = ticket.id(), mode = ?ticket.mode(), "transaction started");
        Self {
            state: TxState::Open(inner),
            ticket,
            ctx,
            started: Instant::now(),
            stats: TxStats::default(),
        }
    }

    /// The transaction id. Ids increase across the life of a database.
    pub const fn id(&self) -> u64 {
        self.ticket.id()
    }

    /// The transaction mode.
    pub const fn mode(&self) -> TxMode {
        self.ticket.mode()
    }

    /// Returns `true` until the transaction commits or rolls back.
    pub const fn is_open(&self) -> bool {
        matches!(self.state, TxState::Open(_))
    }

    /// The engine transaction.
    pub fn engine(&self) -> KvResult<&T> {
        match &self.state {
            TxState::Open(inner) => Ok(inner),
            _ => Err(KvError::Terminated),
        }
    }

    pub(crate) fn table_cfg(&self, table: &str) -> KvResult<(&str, &TableCfgItem)> {
        self.ctx.tables.entry(table).ok_or_else(|| KvError::UnknownTable(table.to_owned()))
    }

    pub(crate) const fn ctx(&self) -> &Arc<DbContext> {
        &self.ctx
    }

    /// Commit the transaction.
    ///
    /// Write transactions make their changes visible. Read transactions
    /// release their snapshot. If the engine fails to commit, the transaction
    /// is rolled back and the error returned.
    pub fn commit(&mut self) -> KvResult<()> {
        let inner = match mem::replace(&mut self.state, TxState::Committed) {
            TxState::Open(inner) => inner,
            done => {
                self.state = done;
                return Err(KvError::Terminated);
            }
        };

        let start = Instant::now();
        let res = inner.raw_commit().map_err(EngineError::into_kv_error);
        let took = start.elapsed();
        self.ticket.release();

        if res.is_err() {
            self.state = TxState::RolledBack;
        }
        self.report(Some(took));
        res
    }

    /// Roll back the transaction, discarding its changes. Does nothing if the
    /// transaction has already ended.
    pub fn rollback(&mut self) {
        if !self.is_open() {
            return;
        }
        // Dropping the engine transaction ends it before the slot is freed.
        self.state = TxState::RolledBack;
        self.ticket.release();
        self.report(None);
    }

    fn report(&self, commit: Option<Duration>) {
        let opts = &self.ctx.opts;
        let span = &self.ctx.span;
        let id = self.ticket.id();
        let lifetime = self.started.elapsed();

        trace!(
            target: "strata::kv",
            parent: span,
            tx_id = id,
            state = self.state.name(),
            elapsed_ms = lifetime.as_millis() as u64,
            "transaction ended"
        );

        if let Some(limit) = opts.slow_tx
            && lifetime > limit
        {
            warn!(
                target: "strata::kv",
                parent: span,
                tx_id = id,
                mode = ?self.ticket.mode(),
                elapsed_ms = lifetime.as_millis() as u64,
                "slow transaction"
            );
        }

        if let (Some(limit), Some(took)) = (opts.slow_commit, commit)
            && took > limit
        {
            warn!(target: "strata::kv", parent: span, tx_id = id, commit_ms = took.as_millis() as u64, "slow commit");
        }

        match self.ticket.mode() {
            TxMode::Ro => {
                let read = self.stats.read.get();
                if let Some(limit) = opts.big_ro_tx_bytes
                    && read > limit
                {
                    info!(target: "strata::kv", parent: span, tx_id = id, read_kb = read / 1024, "big read transaction");
                }
            }
            TxMode::Rw => {
                let written = self.stats.written.get();
                if let Some(limit) = opts.big_rw_tx_bytes
                    && written > limit
                {
                    info!(target: "strata::kv", parent: span, tx_id = id, written_kb = written / 1024, "big write transaction");
                }
            }
        }
    }

    /// Open a cursor over a table.
    pub fn cursor(&self, table: &str) -> KvResult<Cursor<'_, T::Cursor<'_>, T::Error>> {
        let (name, cfg) = self.table_cfg(table)?;
        let inner = self.engine()?.raw_cursor(name).map_err(EngineError::into_kv_error)?;
        Ok(Cursor::new(inner, name, *cfg, &self.stats))
    }

    /// Open a cursor over a dup-sort table. Fails with
    /// [`KvError::NotDupSort`] for other tables.
    pub fn cursor_dup_sort(
        &self,
        table: &str,
    ) -> KvResult<DupCursor<'_, T::Cursor<'_>, T::Error>> {
        DupCursor::new(self.cursor(table)?)
    }

    /// Read the value of `key`.
    ///
    /// On dup-sort tables this is the first duplicate, except that a
    /// full-length key of an auto-conversion table reads its own duplicate.
    /// Auto-conversion tables reject key lengths they would reject on write.
    pub fn get_one(&self, table: &str, key: &[u8]) -> KvResult<Option<Bytes>> {
        let (name, cfg) = self.table_cfg(table)?;
        if let Some(layout) = cfg.dup_layout()
            && matches!(layout.classify(name, key)?, StoredKey::Split { .. })
        {
            return Ok(self.cursor(name)?.seek_exact(key)?.map(|(_, v)| v));
        }

        let value = self
            .engine()?
            .raw_get(name, key)
            .map_err(EngineError::into_kv_error)?
            .map(|v| Bytes::copy_from_slice(&v));
        if let Some(v) = &value {
            self.stats.read(key.len() + v.len());
        }
        Ok(value)
    }

    /// Returns `true` if `key` has a value.
    pub fn has(&self, table: &str, key: &[u8]) -> KvResult<bool> {
        self.get_one(table, key).map(|v| v.is_some())
    }

    /// Ascending stream over `[from, to)`. `None` is unbounded.
    pub fn range(
        &self,
        table: &str,
        from: Option<&[u8]>,
        to: Option<&[u8]>,
    ) -> KvResult<RangeStream<'_, T::Cursor<'_>, T::Error>> {
        self.range_ascend(table, from, to, -1)
    }

    /// Ascending stream over `[from, to)`, yielding at most `limit` pairs.
    /// A negative limit is unlimited.
    pub fn range_ascend(
        &self,
        table: &str,
        from: Option<&[u8]>,
        to: Option<&[u8]>,
        limit: i64,
    ) -> KvResult<RangeStream<'_, T::Cursor<'_>, T::Error>> {
        Ok(RangeStream::new(self.cursor(table)?, from, to, Order::Asc, limit))
    }

    /// Descending stream from `from` down to `to`, exclusive. `None` is
    /// unbounded.
    pub fn range_descend(
        &self,
        table: &str,
        from: Option<&[u8]>,
        to: Option<&[u8]>,
        limit: i64,
    ) -> KvResult<RangeStream<'_, T::Cursor<'_>, T::Error>> {
        Ok(RangeStream::new(self.cursor(table)?, from, to, Order::Desc, limit))
    }

    /// Ascending stream over the keys starting with `prefix`.
    pub fn prefix(
        &self,
        table: &str,
        prefix: &[u8],
    ) -> KvResult<RangeStream<'_, T::Cursor<'_>, T::Error>> {
        let upper = next_subtree(prefix);
        self.range(table, Some(prefix), upper.as_deref())
    }

    /// Call `f` for every pair at or after `from`, stopping at the first
    /// error.
    pub fn for_each<F>(&self, table: &str, from: &[u8], mut f: F) -> KvResult<()>
    where
        F: FnMut(&[u8], &[u8]) -> KvResult<()>,
    {
        let mut cursor = self.cursor(table)?;
        let mut row = cursor.seek(from)?;
        while let Some((k, v)) = row {
            f(&k, &v)?;
            row = cursor.next()?;
        }
        Ok(())
    }

    /// Call `f` for every pair whose key starts with `prefix`.
    pub fn for_prefix<F>(&self, table: &str, prefix: &[u8], mut f: F) -> KvResult<()>
    where
        F: FnMut(&[u8], &[u8]) -> KvResult<()>,
    {
        let mut cursor = self.cursor(table)?;
        let mut row = cursor.seek(prefix)?;
        while let Some((k, v)) = row {
            if !k.starts_with(prefix) {
                break;
            }
            f(&k, &v)?;
            row = cursor.next()?;
        }
        Ok(())
    }

    /// Number of rows in a table. Each duplicate counts as a row.
    pub fn count(&self, table: &str) -> KvResult<u64> {
        let mut cursor = self.cursor(table)?;
        let mut n = 0;
        let mut row = cursor.first()?;
        while row.is_some() {
            n += 1;
            row = cursor.next()?;
        }
        Ok(n)
    }
}

impl<T: EngineWrite> Tx<T> {
    /// Open a mutable cursor over a table.
    pub fn rw_cursor(&self, table: &str) -> KvResult<Cursor<'_, T::CursorMut<'_>, T::Error>> {
        let (name, cfg) = self.table_cfg(table)?;
        let inner = self.engine()?.raw_cursor_mut(name).map_err(EngineError::into_kv_error)?;
        Ok(Cursor::new(inner, name, *cfg, &self.stats))
    }

    /// Open a mutable cursor over a dup-sort table.
    pub fn rw_cursor_dup_sort(
        &self,
        table: &str,
    ) -> KvResult<DupCursor<'_, T::CursorMut<'_>, T::Error>> {
        DupCursor::new(self.rw_cursor(table)?)
    }

    /// Write a pair. See [`Cursor::put`].
    ///
    /// Tables without auto-conversion write straight to the engine.
    pub fn put(&self, table: &str, key: &[u8], value: &[u8]) -> KvResult<()> {
        let (name, cfg) = self.table_cfg(table)?;
        if cfg.dup_layout().is_some() {
            return self.rw_cursor(name)?.put(key, value);
        }
        let engine = self.engine()?;
        self.stats.write(key.len() + value.len());
        engine.raw_put(name, key, value).map_err(EngineError::into_kv_error)
    }

    /// Delete a key. See [`Cursor::delete`].
    ///
    /// Tables without auto-conversion lose every value of `key`.
    pub fn delete(&self, table: &str, key: &[u8]) -> KvResult<()> {
        let (name, cfg) = self.table_cfg(table)?;
        if cfg.dup_layout().is_some() {
            return self.rw_cursor(name)?.delete(key);
        }
        self.engine()?.raw_delete(name, key, None).map_err(EngineError::into_kv_error)
    }

    /// Delete the single duplicate `value` of `key` on a dup-sort table.
    /// Auto-conversion tables take the stored, split form of the pair.
    pub fn delete_dup(&self, table: &str, key: &[u8], value: &[u8]) -> KvResult<()> {
        let (name, cfg) = self.table_cfg(table)?;
        if !cfg.is_dup_sort() {
            return Err(KvError::NotDupSort(name.to_owned()));
        }
        self.engine()?.raw_delete(name, key, Some(value)).map_err(EngineError::into_kv_error)
    }

    /// Append a pair after every existing key.
    pub fn append(&self, table: &str, key: &[u8], value: &[u8]) -> KvResult<()> {
        self.rw_cursor(table)?.append(key, value)
    }
}

impl<T: EngineRead> Drop for Tx<T> {
    fn drop(&mut self) {
        self.rollback();
    }
}

/// The smallest key greater than every key starting with `prefix`, or `None`
/// if no such key exists.
pub(crate) fn next_subtree(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut upper = prefix.to_vec();
    while let Some(last) = upper.pop() {
        if last < u8::MAX {
            upper.push(last + 1);
            return Some(upper);
        }
    }
    None
}
