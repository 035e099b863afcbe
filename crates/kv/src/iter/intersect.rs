use super::{KvPair, MergeKey, Order, Peeked, Stream, take_one};
use crate::model::{KvError, KvResult};
use core::cmp::Ordering;

/// Items whose keys appear in both of two sorted streams. The item of the
/// first input is emitted.
///
/// The next match is located ahead of time, so [`Stream::has_next`] is
/// exact.
pub struct Intersect<X, Y>
where
    X: Stream,
    Y: Stream<Item = X::Item>,
{
    x: Peeked<X>,
    y: Peeked<Y>,
    order: Order,
    limit: i64,
    pending: Option<KvResult<X::Item>>,
}

impl<X, Y> core::fmt::Debug for Intersect<X, Y>
where
    X: Stream,
    Y: Stream<Item = X::Item>,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Intersect")
            .field("order", &self.order)
            .field("limit", &self.limit)
            .finish_non_exhaustive()
    }
}

impl<X, Y> Intersect<X, Y>
where
    X: Stream,
    Y: Stream<Item = X::Item>,
    X::Item: MergeKey,
{
    /// Create an intersection of two streams sorted in `order`.
    pub fn new(x: X, y: Y, order: Order, limit: i64) -> Self {
        let mut this = Self { x: Peeked::new(x), y: Peeked::new(y), order, limit, pending: None };
        if limit != 0 {
            this.advance_both();
        }
        this
    }

    fn advance_both(&mut self) {
        if let Err(e) = self.x.advance().and_then(|_| self.y.advance()) {
            self.pending = Some(Err(e));
            return;
        }
        self.seek_match();
    }

    fn seek_match(&mut self) {
        loop {
            let (Some(a), Some(b)) = (self.x.head(), self.y.head()) else {
                return;
            };
            let step = match self.order.cmp_keys(a.merge_key(), b.merge_key()) {
                Ordering::Less => self.x.advance(),
                Ordering::Greater => self.y.advance(),
                Ordering::Equal => {
                    self.y.take();
                    self.pending = self.x.take().map(Ok);
                    return;
                }
            };
            if let Err(e) = step {
                self.pending = Some(Err(e));
                return;
            }
        }
    }
}

impl<X, Y> Stream for Intersect<X, Y>
where
    X: Stream,
    Y: Stream<Item = X::Item>,
    X::Item: MergeKey,
{
    type Item = X::Item;

    fn has_next(&self) -> bool {
        self.pending.is_some()
    }

    fn next(&mut self) -> KvResult<Self::Item> {
        let item = self.pending.take().ok_or(KvError::StreamExhausted)??;
        if take_one(&mut self.limit) {
            self.advance_both();
        }
        Ok(item)
    }
}

/// Generic intersection over any mergeable items.
pub fn intersect<X, Y>(x: X, y: Y, order: Order, limit: i64) -> Intersect<X, Y>
where
    X: Stream,
    Y: Stream<Item = X::Item>,
    X::Item: MergeKey,
{
    Intersect::new(x, y, order, limit)
}

/// Ascending intersection of two KV streams, taking values from `x`.
pub fn intersect_kv<X, Y>(x: X, y: Y, limit: i64) -> Intersect<X, Y>
where
    X: Stream<Item = KvPair>,
    Y: Stream<Item = KvPair>,
{
    Intersect::new(x, y, Order::Asc, limit)
}
