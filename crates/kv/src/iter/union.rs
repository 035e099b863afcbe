use super::{KvPair, MergeKey, Order, Peeked, Stream, take_one};
use crate::model::{KvError, KvResult};
use core::cmp::Ordering;

/// Merge of two sorted streams with unique keys.
///
/// When both inputs hold the same key, the item of the first input wins and
/// both advance. Stops after `limit` items, leaving the rest of the input
/// unread. A negative limit is unbounded.
pub struct Union<X, Y>
where
    X: Stream,
    Y: Stream<Item = X::Item>,
{
    x: Peeked<X>,
    y: Peeked<Y>,
    order: Order,
    limit: i64,
    err: Option<KvError>,
    done: bool,
}

impl<X, Y> core::fmt::Debug for Union<X, Y>
where
    X: Stream,
    Y: Stream<Item = X::Item>,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Union")
            .field("order", &self.order)
            .field("limit", &self.limit)
            .field("done", &self.done)
            .finish_non_exhaustive()
    }
}

impl<X, Y> Union<X, Y>
where
    X: Stream,
    Y: Stream<Item = X::Item>,
    X::Item: MergeKey,
{
    /// Create a union of two streams sorted in `order`.
    pub fn new(x: X, y: Y, order: Order, limit: i64) -> Self {
        let mut this = Self {
            x: Peeked::new(x),
            y: Peeked::new(y),
            order,
            limit,
            err: None,
            done: limit == 0,
        };
        if !this.done {
            this.advance_x();
            this.advance_y();
        }
        this
    }

    fn advance_x(&mut self) {
        if self.err.is_none()
            && let Err(e) = self.x.advance()
        {
            self.err = Some(e);
        }
    }

    fn advance_y(&mut self) {
        if self.err.is_none()
            && let Err(e) = self.y.advance()
        {
            self.err = Some(e);
        }
    }
}

impl<X, Y> Stream for Union<X, Y>
where
    X: Stream,
    Y: Stream<Item = X::Item>,
    X::Item: MergeKey,
{
    type Item = X::Item;

    fn has_next(&self) -> bool {
        !self.done && (self.err.is_some() || self.x.head().is_some() || self.y.head().is_some())
    }

    fn next(&mut self) -> KvResult<Self::Item> {
        if self.done {
            return Err(KvError::StreamExhausted);
        }
        if let Some(err) = self.err.take() {
            self.done = true;
            return Err(err);
        }

        let ord = match (self.x.head(), self.y.head()) {
            (Some(a), Some(b)) => self.order.cmp_keys(a.merge_key(), b.merge_key()),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => {
                self.done = true;
                return Err(KvError::StreamExhausted);
            }
        };

        let more = take_one(&mut self.limit);
        let item = match ord {
            Ordering::Less => self.x.take(),
            Ordering::Equal => {
                self.y.take();
                self.x.take()
            }
            Ordering::Greater => self.y.take(),
        };

        if more {
            if ord != Ordering::Greater {
                self.advance_x();
            }
            if ord != Ordering::Less {
                self.advance_y();
            }
        } else {
            self.done = true;
        }

        item.ok_or(KvError::StreamExhausted)
    }
}

/// Generic union over any mergeable items.
pub fn union<X, Y>(x: X, y: Y, order: Order, limit: i64) -> Union<X, Y>
where
    X: Stream,
    Y: Stream<Item = X::Item>,
    X::Item: MergeKey,
{
    Union::new(x, y, order, limit)
}

/// Ascending union of two KV streams. `x` wins on equal keys.
pub fn union_kv<X, Y>(x: X, y: Y, limit: i64) -> Union<X, Y>
where
    X: Stream<Item = KvPair>,
    Y: Stream<Item = KvPair>,
{
    Union::new(x, y, Order::Asc, limit)
}

/// Union of two KV streams sorted in `order`. `x` wins on equal keys.
pub fn union_kv_ordered<X, Y>(x: X, y: Y, order: Order, limit: i64) -> Union<X, Y>
where
    X: Stream<Item = KvPair>,
    Y: Stream<Item = KvPair>,
{
    Union::new(x, y, order, limit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iter::{array, empty, pairs_with_error, to_array, to_kv_array};
    use bytes::Bytes;

    fn kv(pairs: &[(&'static str, &'static str)]) -> impl Stream<Item = KvPair> + use<> {
        array(
            pairs
                .iter()
                .map(|&(k, v)| (Bytes::from_static(k.as_bytes()), Bytes::from_static(v.as_bytes())))
                .collect(),
        )
    }

    fn strings(items: Vec<Bytes>) -> Vec<String> {
        items.into_iter().map(|b| String::from_utf8(b.to_vec()).unwrap()).collect()
    }

    #[test]
    fn simple() {
        let s1 = kv(&[("1", "01"), ("3", "03"), ("4", "04"), ("6", "06"), ("7", "07")]);
        let s2 = kv(&[("2", "12"), ("3", "13")]);
        let (keys, values) = to_kv_array(union_kv(s1, s2, -1)).unwrap();
        assert_eq!(strings(keys), ["1", "2", "3", "4", "6", "7"]);
        assert_eq!(strings(values), ["01", "12", "03", "04", "06", "07"]);
    }

    #[test]
    fn empty_inputs() {
        let (keys, _) = to_kv_array(union_kv(empty(), kv(&[("2", "12")]), -1)).unwrap();
        assert_eq!(strings(keys), ["2"]);

        let (keys, _) = to_kv_array(union_kv(kv(&[("1", "01")]), empty(), -1)).unwrap();
        assert_eq!(strings(keys), ["1"]);

        let mut both = union_kv(empty(), empty(), -1);
        assert!(!both.has_next());
        assert!(matches!(both.next(), Err(KvError::StreamExhausted)));
    }

    #[test]
    fn limit_stops_early() {
        let s1 = kv(&[("1", "01"), ("3", "03"), ("5", "05")]);
        let s2 = kv(&[("2", "12"), ("4", "14")]);
        let (keys, _) = to_kv_array(union_kv(s1, s2, 3)).unwrap();
        assert_eq!(strings(keys), ["1", "2", "3"]);

        let none = union_kv(kv(&[("1", "01")]), empty(), 0);
        assert!(!none.has_next());
    }

    #[test]
    fn error_after_prefix() {
        let mut s = union_kv(pairs_with_error(10), empty(), -1);
        let err = to_kv_array(&mut s).unwrap_err();
        assert_eq!(err.collected.0.len(), 10);
        assert_eq!(err.to_string(), "expected error at iteration: 10");
        assert!(!s.has_next());

        let err = to_kv_array(union_kv(empty(), pairs_with_error(10), -1)).unwrap_err();
        assert_eq!(err.collected.0.len(), 10);
    }

    #[test]
    fn timestamps_descending() {
        let x = array(vec![9u64, 5, 1]);
        let y = array(vec![8u64, 5, 2]);
        assert_eq!(to_array(union(x, y, Order::Desc, -1)).unwrap(), [9, 8, 5, 2, 1]);
    }
}
