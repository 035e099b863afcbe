use super::{Domain, History, InvertedIdx, TsWindow, history_key, index::IndexScan};
use crate::{
    db::Tx,
    iter::{
        BoxKvStream, BoxU64Stream, KvPair, Order, Stream, array, filter_kv, limit, limit_kv,
        to_array, union_kv_ordered,
    },
    model::{EngineRead, KvError, KvResult},
};
use bytes::Bytes;
use std::collections::BTreeMap;
use strata_storage_types::{ShardedKey, Timestamp, decode_ts, encode_ts};

/// Point-in-time and ranged reads over temporal tables.
///
/// Implemented for every transaction. Range calls take `i64` timestamps where
/// a negative bound is unbounded in that direction, and a negative limit is
/// unlimited. Ascending ranges require `from <= to` and descending ranges
/// `from >= to`, otherwise they fail with [`KvError::InvalidRange`].
pub trait TemporalTx: super::sealed::Sealed {
    /// Current value of `k || k2` in a domain.
    fn domain_get(&self, domain: Domain, k: &[u8], k2: &[u8]) -> KvResult<Option<Bytes>>;

    /// Value of `k || k2` in a domain as of `ts`, including writes made at
    /// `ts`.
    fn domain_get_as_of(
        &self,
        domain: Domain,
        k: &[u8],
        k2: &[u8],
        ts: Timestamp,
    ) -> KvResult<Option<Bytes>>;

    /// The value `key` had as of `ts`, read from history.
    ///
    /// Returns `None` if the key has not changed after `ts`, in which case
    /// the current value applies. Returns an empty value if the key did not
    /// exist at `ts`.
    fn history_get(&self, history: History, key: &[u8], ts: Timestamp)
    -> KvResult<Option<Bytes>>;

    /// Timestamps at which `key` changed, within the range.
    fn index_range(
        &self,
        idx: InvertedIdx,
        key: &[u8],
        from_ts: i64,
        to_ts: i64,
        order: Order,
        limit: i64,
    ) -> KvResult<BoxU64Stream<'_>>;

    /// Every key changed within the range, with the value it had before its
    /// first change in the range. Keys are sorted in `order`.
    fn history_range(
        &self,
        history: History,
        from_ts: i64,
        to_ts: i64,
        order: Order,
        limit: i64,
    ) -> KvResult<BoxKvStream<'_>>;

    /// The domain as of `ts`, over the key range `[from, to)` in `order`.
    /// Keys that did not exist at `ts` are skipped.
    fn domain_range(
        &self,
        domain: Domain,
        from: Option<&[u8]>,
        to: Option<&[u8]>,
        ts: Timestamp,
        order: Order,
        limit: i64,
    ) -> KvResult<BoxKvStream<'_>>;
}

impl<T: EngineRead> Tx<T> {
    /// The highest shard of `key` in an index table, as its highest
    /// timestamp and raw list.
    pub(crate) fn last_shard(
        &self,
        idx_table: &str,
        key: &[u8],
    ) -> KvResult<Option<(Timestamp, Bytes)>> {
        let open = ShardedKey::last(key).encode();
        let mut rows = self.range_descend(idx_table, Some(&open), None, -1)?;
        while rows.has_next() {
            let (k, v) = rows.next()?;
            if !k.starts_with(key) {
                break;
            }
            if let Some(shard) = ShardedKey::decode(&k)
                && shard.is_for(key)
            {
                return Ok(Some((shard.highest_ts, v)));
            }
        }
        Ok(None)
    }

    fn index_scan(
        &self,
        idx: InvertedIdx,
        key: &[u8],
        window: TsWindow,
    ) -> KvResult<IndexScan<'_, T::Cursor<'_>, T::Error>> {
        Ok(IndexScan::new(self.cursor(&idx.idx_table())?, key, window))
    }

    /// For each key changed within `window`, the value before its first
    /// change there. Sorted by key.
    fn first_changes(&self, history: History, window: TsWindow) -> KvResult<Vec<KvPair>> {
        let keys_table = history.index().keys_table();
        let vals_table = history.vals_table();

        let lo = encode_ts(window.lo);
        let hi = window.hi.map(encode_ts);
        let mut changes = BTreeMap::new();
        let mut rows = self.range(&keys_table, Some(&lo), hi.as_ref().map(|hi| hi.as_slice()))?;
        while rows.has_next() {
            let (ts, key) = rows.next()?;
            let ts = decode_ts(&ts)
                .ok_or_else(|| KvError::corrupted(&keys_table, "timestamp key is not 8 bytes"))?;
            changes.entry(key).or_insert(ts);
        }

        changes
            .into_iter()
            .map(|(key, ts)| {
                let prev = self
                    .get_one(&vals_table, &history_key(&key, ts))?
                    .ok_or_else(|| KvError::corrupted(&vals_table, "indexed change has no history"))?;
                Ok((key, prev))
            })
            .collect()
    }
}

impl<T: EngineRead> TemporalTx for Tx<T> {
    fn domain_get(&self, domain: Domain, k: &[u8], k2: &[u8]) -> KvResult<Option<Bytes>> {
        self.get_one(&domain.vals_table(), &[k, k2].concat())
    }

    fn domain_get_as_of(
        &self,
        domain: Domain,
        k: &[u8],
        k2: &[u8],
        ts: Timestamp,
    ) -> KvResult<Option<Bytes>> {
        let key = [k, k2].concat();
        match self.history_get(domain.history(), &key, ts)? {
            Some(prev) => Ok(Some(prev).filter(|v| !v.is_empty())),
            None => self.get_one(&domain.vals_table(), &key),
        }
    }

    fn history_get(
        &self,
        history: History,
        key: &[u8],
        ts: Timestamp,
    ) -> KvResult<Option<Bytes>> {
        let Some(window) = TsWindow::after(ts) else {
            return Ok(None);
        };
        let mut changes = self.index_scan(history.index(), key, window)?;
        if !changes.has_next() {
            return Ok(None);
        }
        let changed_at = changes.next()?;

        let vals_table = history.vals_table();
        self.get_one(&vals_table, &history_key(key, changed_at))?
            .ok_or_else(|| KvError::corrupted(&vals_table, "indexed change has no history"))
            .map(Some)
    }

    fn index_range(
        &self,
        idx: InvertedIdx,
        key: &[u8],
        from_ts: i64,
        to_ts: i64,
        order: Order,
        limit_to: i64,
    ) -> KvResult<BoxU64Stream<'_>> {
        let window = TsWindow::new(from_ts, to_ts, order)?;
        let scan = self.index_scan(idx, key, window)?;
        match order {
            Order::Asc => Ok(Box::new(limit(scan, limit_to))),
            Order::Desc => {
                let mut all = to_array(scan).map_err(|e| e.source)?;
                all.reverse();
                Ok(Box::new(limit(array(all), limit_to)))
            }
        }
    }

    fn history_range(
        &self,
        history: History,
        from_ts: i64,
        to_ts: i64,
        order: Order,
        limit_to: i64,
    ) -> KvResult<BoxKvStream<'_>> {
        let window = TsWindow::new(from_ts, to_ts, order)?;
        let mut changes = self.first_changes(history, window)?;
        if order == Order::Desc {
            changes.reverse();
        }
        Ok(Box::new(limit_kv(array(changes), limit_to)))
    }

    fn domain_range(
        &self,
        domain: Domain,
        from: Option<&[u8]>,
        to: Option<&[u8]>,
        ts: Timestamp,
        order: Order,
        limit_to: i64,
    ) -> KvResult<BoxKvStream<'_>> {
        if let (Some(from), Some(to)) = (from, to)
            && order.cmp_keys(from, to).is_gt()
        {
            return Err(KvError::InvalidRange {
                from: format!("{from:02x?}"),
                to: format!("{to:02x?}"),
                order,
            });
        }

        let in_range = |k: &[u8]| match order {
            Order::Asc => from.is_none_or(|f| k >= f) && to.is_none_or(|t| k < t),
            Order::Desc => from.is_none_or(|f| k <= f) && to.is_none_or(|t| k > t),
        };
        let mut overrides = match TsWindow::after(ts) {
            Some(window) => self.first_changes(domain.history(), window)?,
            None => Vec::new(),
        };
        overrides.retain(|(k, _)| in_range(k));
        if order == Order::Desc {
            overrides.reverse();
        }

        let vals_table = domain.vals_table();
        let current = match order {
            Order::Asc => self.range_ascend(&vals_table, from, to, -1)?,
            Order::Desc => self.range_descend(&vals_table, from, to, -1)?,
        };

        let merged = union_kv_ordered(array(overrides), current, order, -1);
        Ok(Box::new(limit_kv(filter_kv(merged, |_, v| !v.is_empty()), limit_to)))
    }
}
