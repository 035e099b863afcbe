use super::{Domain, InvertedIdx, history_key};
use crate::{
    db::Tx,
    model::{EngineWrite, KvError, KvResult},
};
use strata_storage_types::{IntegerList, ShardedKey, Timestamp, encode_ts};
use tracing::trace;

/// Versioned writes to temporal tables.
///
/// Timestamps must not decrease per key. Writing the same key twice at one
/// timestamp records history only for the first write, so reads as of that
/// timestamp see the last write.
pub trait TemporalRwTx: super::sealed::Sealed {
    /// Set `k || k2` in a domain at `ts`. An empty value deletes the key.
    fn domain_put(
        &self,
        domain: Domain,
        k: &[u8],
        k2: &[u8],
        value: &[u8],
        ts: Timestamp,
    ) -> KvResult<()>;

    /// Delete `k || k2` from a domain at `ts`.
    fn domain_delete(&self, domain: Domain, k: &[u8], k2: &[u8], ts: Timestamp) -> KvResult<()> {
        self.domain_put(domain, k, k2, &[], ts)
    }

    /// Record that `key` changed at `ts`. Returns `false` if `ts` is already
    /// recorded.
    ///
    /// Fails with [`KvError::TimestampRegression`] if `ts` is below the
    /// latest recorded timestamp of `key`.
    fn index_add(&self, idx: InvertedIdx, key: &[u8], ts: Timestamp) -> KvResult<bool>;
}

impl<T: EngineWrite> TemporalRwTx for Tx<T> {
    fn domain_put(
        &self,
        domain: Domain,
        k: &[u8],
        k2: &[u8],
        value: &[u8],
        ts: Timestamp,
    ) -> KvResult<()> {
        let key = [k, k2].concat();
        let vals_table = domain.vals_table();
        let history = domain.history();

        let prev = self.get_one(&vals_table, &key)?.unwrap_or_default();
        if self.index_add(history.index(), &key, ts)? {
            self.put(&history.vals_table(), &history_key(&key, ts), &prev)?;
        }

        if value.is_empty() {
            self.delete(&vals_table, &key)
        } else {
            self.put(&vals_table, &key, value)
        }
    }

    fn index_add(&self, idx: InvertedIdx, key: &[u8], ts: Timestamp) -> KvResult<bool> {
        let idx_table = idx.idx_table();

        let (mut list, latest) = match self.last_shard(&idx_table, key)? {
            Some((Timestamp::MAX, raw)) => {
                let list = IntegerList::from_bytes(&raw)?;
                let latest = list.max();
                (list, latest)
            }
            Some((highest, _)) => (IntegerList::empty(), Some(highest)),
            None => (IntegerList::empty(), None),
        };

        if let Some(latest) = latest {
            if ts < latest {
                return Err(KvError::TimestampRegression { ts, latest });
            }
            if ts == latest {
                return Ok(false);
            }
        }

        list.push(ts)?;
        let open = ShardedKey::last(key).encode();
        if list.len() >= ShardedKey::<()>::SHARD_COUNT {
            self.delete(&idx_table, &open)?;
            self.put(&idx_table, &ShardedKey::new(key, ts).encode(), &list.to_bytes())?;
            trace!(target: "strata::kv", index = %idx, ts, "closed index shard");
        } else {
            self.put(&idx_table, &open, &list.to_bytes())?;
        }
        self.put(&idx.keys_table(), &encode_ts(ts), key)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        db::Database,
        iter::{Order, to_array, to_kv_array},
        mem::MemKv,
        tables::TableCfg,
        temporal::TemporalTx,
    };
    use bytes::Bytes;
    use tokio_util::sync::CancellationToken;

    const D: Domain = Domain::ACCOUNTS;

    fn db() -> Database<MemKv> {
        Database::open(MemKv::new(), TableCfg::new().with_domain(D)).unwrap()
    }

    fn get(value: Option<Bytes>) -> Option<Vec<u8>> {
        value.map(|v| v.to_vec())
    }

    #[test]
    fn as_of_reads() {
        let db = db();
        let cancel = CancellationToken::new();
        db.update(&cancel, |tx| {
            tx.domain_put(D, b"a", b"", b"1", 10)?;
            tx.domain_put(D, b"a", b"", b"2", 20)?;
            tx.domain_delete(D, b"a", b"", 30)
        })
        .unwrap();

        let tx = db.begin_ro(&cancel).unwrap();
        assert_eq!(tx.domain_get(D, b"a", b"").unwrap(), None);
        assert_eq!(get(tx.domain_get_as_of(D, b"a", b"", 5).unwrap()), None);
        assert_eq!(get(tx.domain_get_as_of(D, b"a", b"", 10).unwrap()), Some(b"1".to_vec()));
        assert_eq!(get(tx.domain_get_as_of(D, b"a", b"", 25).unwrap()), Some(b"2".to_vec()));
        assert_eq!(get(tx.domain_get_as_of(D, b"a", b"", 30).unwrap()), None);

        let h = D.history();
        assert_eq!(get(tx.history_get(h, b"a", 5).unwrap()), Some(vec![]));
        assert_eq!(get(tx.history_get(h, b"a", 15).unwrap()), Some(b"1".to_vec()));
        assert_eq!(tx.history_get(h, b"a", 30).unwrap(), None);
    }

    #[test]
    fn index_rejects_regression() {
        let db = db();
        let tx = db.begin_rw(&CancellationToken::new()).unwrap();
        let idx = D.history().index();

        assert!(tx.index_add(idx, b"k", 7).unwrap());
        assert!(!tx.index_add(idx, b"k", 7).unwrap());
        let err = tx.index_add(idx, b"k", 3).unwrap_err();
        assert!(matches!(err, KvError::TimestampRegression { ts: 3, latest: 7 }));
        assert!(tx.index_add(idx, b"other", 3).unwrap());
    }

    #[test]
    fn index_ranges() {
        let db = db();
        let cancel = CancellationToken::new();
        let idx = D.history().index();
        db.update(&cancel, |tx| {
            for ts in [1, 3, 5, 7, 9] {
                tx.index_add(idx, b"k", ts)?;
            }
            tx.index_add(idx, b"k\x00", 4).map(drop)
        })
        .unwrap();

        let tx = db.begin_ro(&cancel).unwrap();
        let range = |from, to, order, limit| {
            to_array(tx.index_range(idx, b"k", from, to, order, limit).unwrap()).unwrap()
        };
        assert_eq!(range(-1, -1, Order::Asc, -1), [1, 3, 5, 7, 9]);
        assert_eq!(range(3, 7, Order::Asc, -1), [3, 5]);
        assert_eq!(range(2, -1, Order::Asc, 2), [3, 5]);
        assert_eq!(range(7, 3, Order::Desc, -1), [7, 5]);
        assert_eq!(range(-1, 3, Order::Desc, -1), [9, 7, 5]);
        assert_eq!(range(-1, -1, Order::Desc, 1), [9]);

        assert!(matches!(
            tx.index_range(idx, b"k", 7, 3, Order::Asc, -1),
            Err(KvError::InvalidRange { .. })
        ));
        assert!(matches!(
            tx.index_range(idx, b"k", 3, 7, Order::Desc, -1),
            Err(KvError::InvalidRange { .. })
        ));
    }

    #[test]
    fn ranges_over_domain() {
        let db = db();
        let cancel = CancellationToken::new();
        db.update(&cancel, |tx| {
            tx.domain_put(D, b"a", b"", b"a1", 1)?;
            tx.domain_put(D, b"b", b"", b"b1", 1)?;
            tx.domain_put(D, b"a", b"", b"a2", 2)?;
            tx.domain_put(D, b"c", b"", b"c2", 2)?;
            tx.domain_delete(D, b"b", b"", 3)
        })
        .unwrap();

        let tx = db.begin_ro(&cancel).unwrap();
        let (keys, vals) =
            to_kv_array(tx.history_range(D.history(), 2, -1, Order::Asc, -1).unwrap()).unwrap();
        assert_eq!(keys, [&b"a"[..], b"b", b"c"]);
        assert_eq!(vals, [&b"a1"[..], b"b1", b""]);

        let (keys, vals) =
            to_kv_array(tx.domain_range(D, None, None, 1, Order::Asc, -1).unwrap()).unwrap();
        assert_eq!(keys, [&b"a"[..], b"b"]);
        assert_eq!(vals, [&b"a1"[..], b"b1"]);

        let (keys, vals) =
            to_kv_array(tx.domain_range(D, None, None, 3, Order::Desc, -1).unwrap()).unwrap();
        assert_eq!(keys, [&b"c"[..], b"a"]);
        assert_eq!(vals, [&b"c2"[..], b"a2"]);

        let (keys, _) =
            to_kv_array(tx.domain_range(D, Some(b"b"), None, 2, Order::Asc, 1).unwrap()).unwrap();
        assert_eq!(keys, [&b"b"[..]]);
        assert!(tx.domain_range(D, Some(b"c"), Some(b"a"), 2, Order::Asc, -1).is_err());
    }

    #[test]
    fn shards_close_at_capacity() {
        let db = db();
        let cancel = CancellationToken::new();
        let idx = D.history().index();
        let total = ShardedKey::<()>::SHARD_COUNT + 5;
        db.update(&cancel, |tx| {
            for ts in 0..total {
                tx.index_add(idx, b"k", ts)?;
            }
            Ok(())
        })
        .unwrap();

        let tx = db.begin_ro(&cancel).unwrap();
        assert_eq!(tx.count(&idx.idx_table()).unwrap(), 2);
        let all = to_array(tx.index_range(idx, b"k", -1, -1, Order::Asc, -1).unwrap()).unwrap();
        assert_eq!(all.len() as u64, total);
        let tail = to_array(tx.index_range(idx, b"k", -1, -1, Order::Desc, 3).unwrap()).unwrap();
        assert_eq!(tail, [total - 1, total - 2, total - 3]);
        drop(tx);

        let tx = db.begin_rw(&cancel).unwrap();
        assert!(matches!(
            tx.index_add(idx, b"k", 10),
            Err(KvError::TimestampRegression { .. })
        ));
    }
}
