use super::cursor::Cursor;
use crate::{
    iter::{KvPair, Order, Stream, take_one},
    model::{EngineError, KvError, KvResult, RawCursor},
};
use bytes::Bytes;
use core::fmt;

/// A lazy range scan over one table.
///
/// Ascending scans cover `[from, to)`. Descending scans start at the last key
/// at or below `from` and stop before reaching `to`. An unset bound is the
/// end of the table in that direction.
pub struct RangeStream<'tx, C, E> {
    cursor: Cursor<'tx, C, E>,
    to: Option<Bytes>,
    order: Order,
    limit: i64,
    next: Option<KvResult<KvPair>>,
}

impl<C, E> fmt::Debug for RangeStream<'_, C, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RangeStream")
            .field("cursor", &self.cursor)
            .field("to", &self.to)
            .field("order", &self.order)
            .field("limit", &self.limit)
            .finish_non_exhaustive()
    }
}

impl<'tx, C, E> RangeStream<'tx, C, E>
where
    C: RawCursor<E>,
    E: EngineError,
{
    pub(crate) fn new(
        mut cursor: Cursor<'tx, C, E>,
        from: Option<&[u8]>,
        to: Option<&[u8]>,
        order: Order,
        limit: i64,
    ) -> Self {
        let first = if limit == 0 {
            Ok(None)
        } else {
            match order {
                Order::Asc => match from {
                    Some(from) => cursor.seek(from),
                    None => cursor.first(),
                },
                Order::Desc => Self::seek_back(&mut cursor, from),
            }
        };

        let mut stream = Self { cursor, to: to.map(Bytes::copy_from_slice), order, limit, next: None };
        stream.next = stream.bounded(first).transpose();
        stream
    }

    /// Position at the last key at or below `from`.
    fn seek_back(cursor: &mut Cursor<'tx, C, E>, from: Option<&[u8]>) -> KvResult<Option<KvPair>> {
        let Some(from) = from else {
            return cursor.last();
        };
        match cursor.seek(from)? {
            None => cursor.last(),
            Some((k, _)) if &k[..] > from => cursor.prev(),
            found => Ok(found),
        }
    }

    fn in_bounds(&self, key: &[u8]) -> bool {
        match (&self.to, self.order) {
            (None, _) => true,
            (Some(to), Order::Asc) => key < &to[..],
            (Some(to), Order::Desc) => key > &to[..],
        }
    }

    fn bounded(&self, row: KvResult<Option<KvPair>>) -> KvResult<Option<KvPair>> {
        Ok(row?.filter(|(k, _)| self.in_bounds(k)))
    }

    fn advance(&mut self) {
        let row = match self.order {
            Order::Asc => self.cursor.next(),
            Order::Desc => self.cursor.prev(),
        };
        self.next = self.bounded(row).transpose();
    }
}

impl<C, E> Stream for RangeStream<'_, C, E>
where
    C: RawCursor<E>,
    E: EngineError,
{
    type Item = KvPair;

    fn has_next(&self) -> bool {
        self.next.is_some()
    }

    fn next(&mut self) -> KvResult<KvPair> {
        let pair = self.next.take().ok_or(KvError::StreamExhausted)??;
        if take_one(&mut self.limit) {
            self.advance();
        }
        Ok(pair)
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        db::Database,
        iter::{Stream, to_kv_array},
        mem::MemKv,
        tables::{Headers, Table, TableCfg},
    };
    use bytes::Bytes;
    use tokio_util::sync::CancellationToken;

    fn keys(stream: impl Stream<Item = (Bytes, Bytes)>) -> Vec<Vec<u8>> {
        to_kv_array(stream).unwrap().0.into_iter().map(|k| k.to_vec()).collect()
    }

    fn filled() -> Database<MemKv> {
        let db = Database::open(MemKv::new(), TableCfg::new().with::<Headers>()).unwrap();
        db.update(&CancellationToken::new(), |tx| {
            for k in [b"a", b"b", b"c", b"d", b"e"] {
                tx.put(Headers::NAME, k, b"v")?;
            }
            Ok(())
        })
        .unwrap();
        db
    }

    #[test]
    fn ascending_bounds() {
        let db = filled();
        let tx = db.begin_ro(&CancellationToken::new()).unwrap();
        let h = Headers::NAME;

        assert_eq!(keys(tx.range(h, Some(b"b"), Some(b"d")).unwrap()), [b"b", b"c"]);
        assert_eq!(keys(tx.range(h, None, None).unwrap()).len(), 5);
        assert_eq!(keys(tx.range(h, Some(b"bb"), None).unwrap()), [b"c", b"d", b"e"]);
        assert_eq!(keys(tx.range_ascend(h, None, None, 2).unwrap()), [b"a", b"b"]);
        assert!(keys(tx.range_ascend(h, None, None, 0).unwrap()).is_empty());
    }

    #[test]
    fn descending_bounds() {
        let db = filled();
        let tx = db.begin_ro(&CancellationToken::new()).unwrap();
        let h = Headers::NAME;

        assert_eq!(keys(tx.range_descend(h, Some(b"d"), Some(b"a"), -1).unwrap()), [b"d", b"c", b"b"]);
        assert_eq!(keys(tx.range_descend(h, Some(b"cc"), None, 2).unwrap()), [b"c", b"b"]);
        assert_eq!(keys(tx.range_descend(h, Some(b"z"), Some(b"c"), -1).unwrap()), [b"e", b"d"]);
        assert_eq!(keys(tx.range_descend(h, None, None, -1).unwrap()).len(), 5);
        assert!(keys(tx.range_descend(h, Some(b"0"), None, -1).unwrap()).is_empty());
    }

    #[test]
    fn exhausted_range_errors() {
        let db = filled();
        let tx = db.begin_ro(&CancellationToken::new()).unwrap();
        let mut stream = tx.range(Headers::NAME, Some(b"e"), None).unwrap();
        assert!(stream.has_next());
        stream.next().unwrap();
        assert!(!stream.has_next());
        assert!(stream.next().is_err());
    }
}
