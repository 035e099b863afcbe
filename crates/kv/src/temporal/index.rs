use super::TsWindow;
use crate::{
    db::Cursor,
    iter::Stream,
    model::{EngineError, KvError, KvResult, RawCursor},
};
use core::fmt;
use strata_storage_types::{IntegerList, ShardedKey};

/// Ascending scan of the timestamps of one key in an inverted index.
///
/// Shards are decoded one at a time, as the scan reaches them.
pub(crate) struct IndexScan<'tx, C, E> {
    cursor: Cursor<'tx, C, E>,
    key: Vec<u8>,
    window: TsWindow,
    shard: std::vec::IntoIter<u64>,
    started: bool,
    finished: bool,
    next: Option<KvResult<u64>>,
}

impl<C, E> fmt::Debug for IndexScan<'_, C, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexScan")
            .field("window", &self.window)
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

impl<'tx, C, E> IndexScan<'tx, C, E>
where
    C: RawCursor<E>,
    E: EngineError,
{
    pub(crate) fn new(cursor: Cursor<'tx, C, E>, key: &[u8], window: TsWindow) -> Self {
        let mut scan = Self {
            cursor,
            key: key.to_vec(),
            window,
            shard: Vec::new().into_iter(),
            started: false,
            finished: false,
            next: None,
        };
        scan.fill();
        scan
    }

    fn fill(&mut self) {
        self.next = self.scan().transpose();
        if matches!(self.next, Some(Err(_))) {
            self.finished = true;
        }
    }

    fn scan(&mut self) -> KvResult<Option<u64>> {
        loop {
            for ts in self.shard.by_ref() {
                if self.window.hi.is_some_and(|hi| ts >= hi) {
                    self.finished = true;
                    return Ok(None);
                }
                if self.window.contains(ts) {
                    return Ok(Some(ts));
                }
            }
            if self.finished {
                return Ok(None);
            }

            let row = if self.started {
                self.cursor.next()?
            } else {
                self.started = true;
                let start = ShardedKey::new(self.key.as_slice(), self.window.lo).encode();
                self.cursor.seek(&start)?
            };

            // Shards of other keys sharing our prefix may sit between ours.
            let Some((k, v)) = row.filter(|(k, _)| k.starts_with(&self.key)) else {
                self.finished = true;
                return Ok(None);
            };
            if ShardedKey::decode(&k).is_some_and(|shard| shard.is_for(&self.key)) {
                self.shard = IntegerList::from_bytes(&v)?.iter().collect::<Vec<_>>().into_iter();
            }
        }
    }
}

impl<C, E> Stream for IndexScan<'_, C, E>
where
    C: RawCursor<E>,
    E: EngineError,
{
    type Item = u64;

    fn has_next(&self) -> bool {
        self.next.is_some()
    }

    fn next(&mut self) -> KvResult<u64> {
        let ts = self.next.take().ok_or(KvError::StreamExhausted)??;
        self.fill();
        Ok(ts)
    }
}
