use super::tx::TxStats;
use crate::{
    codec::{DupLayout, StoredKey},
    iter::KvPair,
    model::{EngineError, KvError, KvResult, RawCursor, RawCursorMut, RawKeyValue, RawValue},
    tables::TableCfgItem,
};
use bytes::Bytes;
use core::{
    fmt,
    marker::PhantomData,
    ops::{Deref, DerefMut},
};

fn own(row: Option<RawKeyValue<'_>>) -> Option<KvPair> {
    row.map(|(k, v)| (Bytes::copy_from_slice(&k), Bytes::copy_from_slice(&v)))
}

fn own_value(value: Option<RawValue<'_>>) -> Option<Bytes> {
    value.map(|v| Bytes::copy_from_slice(&v))
}

/// A cursor over one table of a transaction.
///
/// Keys and values are returned in the caller's layout. For tables with
/// automatic key conversion, rows are joined back into full keys on read and
/// split on write (see [`crate::codec`]).
///
/// A cursor borrows its transaction, so it cannot outlive it, and the
/// transaction cannot be committed while the cursor is alive.
pub struct Cursor<'tx, C, E> {
    inner: C,
    table: &'tx str,
    cfg: TableCfgItem,
    stats: &'tx TxStats,
    /// The stored row at the cursor position.
    current: Option<KvPair>,
    _err: PhantomData<fn() -> E>,
}

impl<C, E> fmt::Debug for Cursor<'_, C, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cursor").field("table", &self.table).finish_non_exhaustive()
    }
}

impl<'tx, C, E> Cursor<'tx, C, E>
where
    C: RawCursor<E>,
    E: EngineError,
{
    pub(crate) const fn new(
        inner: C,
        table: &'tx str,
        cfg: TableCfgItem,
        stats: &'tx TxStats,
    ) -> Self {
        Self { inner, table, cfg, stats, current: None, _err: PhantomData }
    }

    /// The table this cursor reads.
    pub const fn table(&self) -> &'tx str {
        self.table
    }

    /// The table's configuration.
    pub const fn config(&self) -> &TableCfgItem {
        &self.cfg
    }

    const fn layout(&self) -> Option<DupLayout> {
        self.cfg.dup_layout()
    }

    fn decode(&self, key: Bytes, value: Bytes) -> KvResult<KvPair> {
        match self.layout() {
            Some(layout) => layout.decode(self.table, key, value),
            None => Ok((key, value)),
        }
    }

    /// Record the stored row at the new position, without decoding.
    fn land_raw(&mut self, raw: Option<KvPair>) -> Option<KvPair> {
        if let Some((k, v)) = &raw {
            self.stats.read(k.len() + v.len());
        }
        self.current.clone_from(&raw);
        raw
    }

    /// Record the stored row at the new position, and decode it.
    fn land(&mut self, raw: Option<KvPair>) -> KvResult<Option<KvPair>> {
        self.land_raw(raw).map(|(k, v)| self.decode(k, v)).transpose()
    }

    /// Position at the first row.
    pub fn first(&mut self) -> KvResult<Option<KvPair>> {
        let raw = own(self.inner.first().map_err(E::into_kv_error)?);
        self.land(raw)
    }

    /// Position at the last row.
    pub fn last(&mut self) -> KvResult<Option<KvPair>> {
        let raw = own(self.inner.last().map_err(E::into_kv_error)?);
        self.land(raw)
    }

    /// Move to the next row.
    pub fn next(&mut self) -> KvResult<Option<KvPair>> {
        let raw = own(self.inner.read_next().map_err(E::into_kv_error)?);
        self.land(raw)
    }

    /// Move to the previous row.
    pub fn prev(&mut self) -> KvResult<Option<KvPair>> {
        let raw = own(self.inner.read_prev().map_err(E::into_kv_error)?);
        self.land(raw)
    }

    /// The row at the cursor position.
    pub fn current(&self) -> KvResult<Option<KvPair>> {
        self.current.clone().map(|(k, v)| self.decode(k, v)).transpose()
    }

    /// Position at the first row whose key is at or above `key`.
    ///
    /// On auto-conversion tables, a key longer than the stored primary seeks
    /// the primary and then the duplicates at or above the rest of the key.
    pub fn seek(&mut self, key: &[u8]) -> KvResult<Option<KvPair>> {
        if key.is_empty() {
            return self.first();
        }
        let Some(layout) = self.layout() else {
            let raw = own(self.inner.lower_bound(key).map_err(E::into_kv_error)?);
            return self.land(raw);
        };

        let (primary, sub) = layout.split_seek(key);
        let mut raw = own(self.inner.lower_bound(primary).map_err(E::into_kv_error)?);
        if let Some(sub) = sub
            && raw.as_ref().is_some_and(|(k, _)| k == primary)
        {
            raw = match own_value(
                self.inner.dual_lower_bound(primary, sub).map_err(E::into_kv_error)?,
            ) {
                Some(v) => Some((Bytes::copy_from_slice(primary), v)),
                None => {
                    // No duplicate is large enough: fall through to the next
                    // primary.
                    self.inner.lower_bound(primary).map_err(E::into_kv_error)?;
                    own(self.inner.next_no_dup().map_err(E::into_kv_error)?)
                }
            };
        }
        self.land(raw)
    }

    /// Position at exactly `key`.
    ///
    /// On auto-conversion tables, keys that could not have been written fail
    /// with [`KvError::KeyLengthConflict`].
    pub fn seek_exact(&mut self, key: &[u8]) -> KvResult<Option<KvPair>> {
        if let Some(layout) = self.layout()
            && let StoredKey::Split { primary, sub } = layout.classify(self.table, key)?
        {
            let found =
                own_value(self.inner.dual_lower_bound(primary, sub).map_err(E::into_kv_error)?)
                    .filter(|v| layout.has_sub(v, sub));
            let raw = found.map(|v| (Bytes::copy_from_slice(primary), v));
            return self.land(raw);
        }
        let raw = own_value(self.inner.exact(key).map_err(E::into_kv_error)?)
            .map(|v| (Bytes::copy_from_slice(key), v));
        self.land(raw)
    }
}

impl<C, E> Cursor<'_, C, E>
where
    C: RawCursorMut<E>,
    E: EngineError,
{
    /// Write a row.
    ///
    /// Plain tables replace the value of `key`; dup-sort tables add a
    /// duplicate. On auto-conversion tables, a full-length key replaces the
    /// duplicate carrying the same sub key, a short key replaces its single
    /// value, and any other length fails with
    /// [`KvError::KeyLengthConflict`].
    pub fn put(&mut self, key: &[u8], value: &[u8]) -> KvResult<()> {
        self.stats.write(key.len() + value.len());
        let Some(layout) = self.layout() else {
            self.inner.put(key, value).map_err(E::into_kv_error)?;
            self.current = Some((Bytes::copy_from_slice(key), Bytes::copy_from_slice(value)));
            return Ok(());
        };

        match layout.classify(self.table, key)? {
            StoredKey::Whole(key) => {
                if self.inner.exact(key).map_err(E::into_kv_error)?.is_some() {
                    self.inner.delete_current_dups().map_err(E::into_kv_error)?;
                }
                self.inner.put(key, value).map_err(E::into_kv_error)?;
                self.current = Some((Bytes::copy_from_slice(key), Bytes::copy_from_slice(value)));
            }
            StoredKey::Split { primary, sub } => {
                let existing = own_value(
                    self.inner.dual_lower_bound(primary, sub).map_err(E::into_kv_error)?,
                );
                if existing.is_some_and(|v| layout.has_sub(&v, sub)) {
                    self.inner.delete_current().map_err(E::into_kv_error)?;
                }
                let stored = DupLayout::join_value(sub, value);
                self.inner.put(primary, &stored).map_err(E::into_kv_error)?;
                self.current = Some((Bytes::copy_from_slice(primary), stored.into()));
            }
        }
        Ok(())
    }

    /// Delete `key`.
    ///
    /// On auto-conversion tables a full-length key deletes only its own
    /// duplicate. Otherwise every value of the key is deleted.
    pub fn delete(&mut self, key: &[u8]) -> KvResult<()> {
        self.current = None;
        if let Some(layout) = self.layout() {
            return match layout.classify(self.table, key)? {
                StoredKey::Split { primary, sub } => {
                    let found = own_value(
                        self.inner.dual_lower_bound(primary, sub).map_err(E::into_kv_error)?,
                    );
                    if found.is_some_and(|v| layout.has_sub(&v, sub)) {
                        self.inner.delete_current().map_err(E::into_kv_error)?;
                    }
                    Ok(())
                }
                StoredKey::Whole(key) => self.delete_key(key),
            };
        }
        self.delete_key(key)
    }

    fn delete_key(&mut self, key: &[u8]) -> KvResult<()> {
        if self.inner.exact(key).map_err(E::into_kv_error)?.is_none() {
            return Ok(());
        }
        if self.cfg.is_dup_sort() {
            self.inner.delete_current_dups().map_err(E::into_kv_error)
        } else {
            self.inner.delete_current().map_err(E::into_kv_error)
        }
    }

    /// Delete the row at the cursor position. For dup-sort tables this is a
    /// single duplicate.
    pub fn delete_current(&mut self) -> KvResult<()> {
        self.current = None;
        self.inner.delete_current().map_err(E::into_kv_error)
    }

    /// Append a row after every existing row.
    ///
    /// Auto-conversion tables go through [`put`](Self::put), so their keys
    /// are converted the same way.
    pub fn append(&mut self, key: &[u8], value: &[u8]) -> KvResult<()> {
        if self.layout().is_some() {
            return self.put(key, value);
        }
        self.stats.write(key.len() + value.len());
        self.inner.append(key, value).map_err(E::into_kv_error)?;
        self.current = Some((Bytes::copy_from_slice(key), Bytes::copy_from_slice(value)));
        Ok(())
    }
}

/// A cursor over a dup-sort table.
///
/// Dereferences to [`Cursor`]. The dup-sort operations work on the stored
/// layout: keys are stored primaries and values are stored duplicates,
/// without automatic conversion.
pub struct DupCursor<'tx, C, E>(Cursor<'tx, C, E>);

impl<C, E> fmt::Debug for DupCursor<'_, C, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("DupCursor").field(&self.0).finish()
    }
}

impl<'tx, C, E> Deref for DupCursor<'tx, C, E> {
    type Target = Cursor<'tx, C, E>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<C, E> DerefMut for DupCursor<'_, C, E> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl<'tx, C, E> DupCursor<'tx, C, E>
where
    C: RawCursor<E>,
    E: EngineError,
{
    /// Wrap a cursor, failing with [`KvError::NotDupSort`] if its table is
    /// not dup-sort.
    pub fn new(cursor: Cursor<'tx, C, E>) -> KvResult<Self> {
        if !cursor.cfg.is_dup_sort() {
            return Err(KvError::NotDupSort(cursor.table.to_owned()));
        }
        Ok(Self(cursor))
    }

    /// Unwrap into the plain cursor.
    pub fn into_inner(self) -> Cursor<'tx, C, E> {
        self.0
    }

    fn current_key(&self) -> Option<Bytes> {
        self.0.current.as_ref().map(|(k, _)| k.clone())
    }

    fn land_value(&mut self, key: &[u8], value: Option<Bytes>) -> Option<Bytes> {
        let raw = value.map(|v| (Bytes::copy_from_slice(key), v));
        self.0.land_raw(raw).map(|(_, v)| v)
    }

    /// Position at the exact `(key, value)` pair.
    pub fn seek_both_exact(&mut self, key: &[u8], value: &[u8]) -> KvResult<Option<KvPair>> {
        let found = own_value(self.0.inner.exact_dual(key, value).map_err(E::into_kv_error)?);
        Ok(self.land_value(key, found).map(|v| (Bytes::copy_from_slice(key), v)))
    }

    /// Position at the first duplicate of `key` at or above `value`.
    ///
    /// Returns `None` if `key` is absent or has no such duplicate.
    pub fn seek_both_range(&mut self, key: &[u8], value: &[u8]) -> KvResult<Option<Bytes>> {
        let found =
            own_value(self.0.inner.dual_lower_bound(key, value).map_err(E::into_kv_error)?);
        Ok(self.land_value(key, found))
    }

    /// Move to the first duplicate of the current key.
    pub fn first_dup(&mut self) -> KvResult<Option<Bytes>> {
        let Some(key) = self.current_key() else {
            return Ok(None);
        };
        let found = own_value(self.0.inner.exact(&key).map_err(E::into_kv_error)?);
        Ok(self.land_value(&key, found))
    }

    /// Move to the next duplicate of the current key.
    pub fn next_dup(&mut self) -> KvResult<Option<KvPair>> {
        let raw = own(self.0.inner.next_dup().map_err(E::into_kv_error)?);
        Ok(self.land_step(raw))
    }

    /// Move to the first duplicate of the next key.
    pub fn next_no_dup(&mut self) -> KvResult<Option<KvPair>> {
        let raw = own(self.0.inner.next_no_dup().map_err(E::into_kv_error)?);
        Ok(self.land_step(raw))
    }

    /// Move to the previous duplicate of the current key.
    pub fn prev_dup(&mut self) -> KvResult<Option<KvPair>> {
        let raw = own(self.0.inner.prev_dup().map_err(E::into_kv_error)?);
        Ok(self.land_step(raw))
    }

    /// Move to the last duplicate of the previous key.
    pub fn prev_no_dup(&mut self) -> KvResult<Option<KvPair>> {
        let raw = own(self.0.inner.prev_no_dup().map_err(E::into_kv_error)?);
        Ok(self.land_step(raw))
    }

    /// Move to the last duplicate of the current key.
    pub fn last_dup(&mut self) -> KvResult<Option<Bytes>> {
        let Some(key) = self.current_key() else {
            return Ok(None);
        };
        let found = own_value(self.0.inner.last_dup().map_err(E::into_kv_error)?);
        Ok(self.land_value(&key, found))
    }

    /// Number of duplicates of the current key. The position is restored
    /// afterwards.
    pub fn count_duplicates(&mut self) -> KvResult<u64> {
        let Some((key, value)) = self.0.current.clone() else {
            return Ok(0);
        };
        let inner = &mut self.0.inner;
        let mut count = 0;
        if inner.exact(&key).map_err(E::into_kv_error)?.is_some() {
            count += 1;
            while inner.next_dup().map_err(E::into_kv_error)?.is_some() {
                count += 1;
            }
        }
        inner.exact_dual(&key, &value).map_err(E::into_kv_error)?;
        Ok(count)
    }

    /// A step that finds nothing leaves the position unchanged.
    fn land_step(&mut self, raw: Option<KvPair>) -> Option<KvPair> {
        match raw {
            Some(raw) => self.0.land_raw(Some(raw)),
            None => None,
        }
    }
}

impl<C, E> DupCursor<'_, C, E>
where
    C: RawCursorMut<E>,
    E: EngineError,
{
    /// Delete the exact `(key, value)` pair, if present.
    pub fn delete_exact(&mut self, key: &[u8], value: &[u8]) -> KvResult<()> {
        self.0.current = None;
        if self.0.inner.exact_dual(key, value).map_err(E::into_kv_error)?.is_some() {
            self.0.inner.delete_current().map_err(E::into_kv_error)?;
        }
        Ok(())
    }

    /// Delete every duplicate of the current key.
    pub fn delete_current_duplicates(&mut self) -> KvResult<()> {
        self.0.current = None;
        self.0.inner.delete_current_dups().map_err(E::into_kv_error)
    }

    /// Append a duplicate after every existing duplicate of `key`.
    pub fn append_dup(&mut self, key: &[u8], value: &[u8]) -> KvResult<()> {
        self.0.stats.write(key.len() + value.len());
        self.0.inner.append_dup(key, value).map_err(E::into_kv_error)?;
        self.0.current = Some((Bytes::copy_from_slice(key), Bytes::copy_from_slice(value)));
        Ok(())
    }

    /// Add the `(key, value)` pair unless it exists. Returns `true` if it was
    /// added.
    pub fn put_no_dup_data(&mut self, key: &[u8], value: &[u8]) -> KvResult<bool> {
        if self.0.inner.exact_dual(key, value).map_err(E::into_kv_error)?.is_some() {
            return Ok(false);
        }
        self.0.stats.write(key.len() + value.len());
        self.0.inner.put(key, value).map_err(E::into_kv_error)?;
        self.0.current = Some((Bytes::copy_from_slice(key), Bytes::copy_from_slice(value)));
        Ok(true)
    }
}
