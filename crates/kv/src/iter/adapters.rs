use super::{KvPair, Stream};
use crate::model::{KvError, KvResult};
use core::{fmt, marker::PhantomData};

/// A stream over materialized items.
#[derive(Debug, Clone)]
pub struct ArrayStream<T> {
    items: std::vec::IntoIter<T>,
}

impl<T> ArrayStream<T> {
    /// Create a stream yielding `items` in order.
    pub fn new(items: Vec<T>) -> Self {
        Self { items: items.into_iter() }
    }
}

impl<T> Stream for ArrayStream<T> {
    type Item = T;

    fn has_next(&self) -> bool {
        !self.items.as_slice().is_empty()
    }

    fn next(&mut self) -> KvResult<T> {
        self.items.next().ok_or(KvError::StreamExhausted)
    }
}

/// Create an [`ArrayStream`].
pub fn array<T>(items: Vec<T>) -> ArrayStream<T> {
    ArrayStream::new(items)
}

/// A stream with no items.
pub struct Empty<T>(PhantomData<fn() -> T>);

impl<T> Clone for Empty<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Empty<T> {}

impl<T> fmt::Debug for Empty<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Empty")
    }
}

impl<T> Stream for Empty<T> {
    type Item = T;

    fn has_next(&self) -> bool {
        false
    }

    fn next(&mut self) -> KvResult<T> {
        Err(KvError::StreamExhausted)
    }
}

/// Create an [`Empty`] stream.
pub const fn empty<T>() -> Empty<T> {
    Empty(PhantomData)
}

/// Items of a stream that satisfy a predicate.
pub struct Filter<S: Stream, F> {
    stream: S,
    pred: F,
    pending: Option<KvResult<S::Item>>,
}

impl<S: Stream, F> fmt::Debug for Filter<S, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Filter").field("has_next", &self.pending.is_some()).finish()
    }
}

impl<S, F> Filter<S, F>
where
    S: Stream,
    F: FnMut(&S::Item) -> bool,
{
    /// Create a filtered stream.
    pub fn new(stream: S, pred: F) -> Self {
        let mut this = Self { stream, pred, pending: None };
        this.fill();
        this
    }

    fn fill(&mut self) {
        while self.stream.has_next() {
            match self.stream.next() {
                Ok(item) if (self.pred)(&item) => {
                    self.pending = Some(Ok(item));
                    return;
                }
                Ok(_) => {}
                Err(e) => {
                    self.pending = Some(Err(e));
                    return;
                }
            }
        }
    }
}

impl<S, F> Stream for Filter<S, F>
where
    S: Stream,
    F: FnMut(&S::Item) -> bool,
{
    type Item = S::Item;

    fn has_next(&self) -> bool {
        self.pending.is_some()
    }

    fn next(&mut self) -> KvResult<S::Item> {
        let item = self.pending.take().ok_or(KvError::StreamExhausted)??;
        self.fill();
        Ok(item)
    }
}

/// Create a [`Filter`].
pub fn filter<S, F>(stream: S, pred: F) -> Filter<S, F>
where
    S: Stream,
    F: FnMut(&S::Item) -> bool,
{
    Filter::new(stream, pred)
}

/// Filter a KV stream by key and value.
pub fn filter_kv<S, F>(stream: S, mut pred: F) -> Filter<S, impl FnMut(&KvPair) -> bool>
where
    S: Stream<Item = KvPair>,
    F: FnMut(&[u8], &[u8]) -> bool,
{
    Filter::new(stream, move |(k, v): &KvPair| pred(k, v))
}

/// A stream with a fallible function applied to every item.
pub struct Transform<S, F> {
    stream: S,
    f: F,
    failed: bool,
}

impl<S, F> fmt::Debug for Transform<S, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transform").field("failed", &self.failed).finish()
    }
}

impl<S, F, T> Stream for Transform<S, F>
where
    S: Stream,
    F: FnMut(S::Item) -> KvResult<T>,
{
    type Item = T;

    fn has_next(&self) -> bool {
        !self.failed && self.stream.has_next()
    }

    fn next(&mut self) -> KvResult<T> {
        if self.failed {
            return Err(KvError::StreamExhausted);
        }
        let out = self.stream.next().and_then(&mut self.f);
        self.failed = out.is_err();
        out
    }
}

/// Create a [`Transform`].
pub const fn transform<S, F, T>(stream: S, f: F) -> Transform<S, F>
where
    S: Stream,
    F: FnMut(S::Item) -> KvResult<T>,
{
    Transform { stream, f, failed: false }
}

/// Transform every pair of a KV stream.
pub const fn transform_kv<S, F>(stream: S, f: F) -> Transform<S, F>
where
    S: Stream<Item = KvPair>,
    F: FnMut(KvPair) -> KvResult<KvPair>,
{
    Transform { stream, f, failed: false }
}

/// The first `limit` items of a stream. A negative limit is unbounded.
#[derive(Debug)]
pub struct Limit<S> {
    stream: S,
    limit: i64,
}

impl<S: Stream> Stream for Limit<S> {
    type Item = S::Item;

    fn has_next(&self) -> bool {
        self.limit != 0 && self.stream.has_next()
    }

    fn next(&mut self) -> KvResult<S::Item> {
        if self.limit == 0 {
            return Err(KvError::StreamExhausted);
        }
        if self.limit > 0 {
            self.limit -= 1;
        }
        self.stream.next()
    }
}

/// Create a [`Limit`].
pub const fn limit<S: Stream>(stream: S, limit: i64) -> Limit<S> {
    Limit { stream, limit }
}

/// Limit a KV stream.
pub const fn limit_kv<S: Stream<Item = KvPair>>(stream: S, limit: i64) -> Limit<S> {
    Limit { stream, limit }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iter::{pairs_with_error, to_array, to_kv_array};
    use bytes::Bytes;

    #[test]
    fn filter_skips_and_reports_errors() {
        let evens = filter(array(vec![1u64, 2, 3, 4]), |n| n % 2 == 0);
        assert_eq!(to_array(evens).unwrap(), [2, 4]);

        let key = |n: u64| Bytes::from(format!("{n:016x}"));
        let skip = key(2);
        let odd_keys = filter_kv(pairs_with_error(4), move |k, _| k != &skip[..]);
        let err = to_kv_array(odd_keys).unwrap_err();
        assert_eq!(err.collected.0, [key(1), key(3), key(4)]);
    }

    #[test]
    fn transform_stops_at_first_failure() {
        let mut s = transform(array(vec![1u64, 2, 3]), |n| {
            if n == 2 { Err(KvError::Cancelled) } else { Ok(n * 10) }
        });
        assert_eq!(s.next().unwrap(), 10);
        assert!(s.next().unwrap_err().is_cancelled());
        assert!(!s.has_next());
    }

    #[test]
    fn limit_counts() {
        let s = limit(array(vec![1u64, 2, 3]), 2);
        assert_eq!(to_array(s).unwrap(), [1, 2]);
        let s = limit(array(vec![1u64, 2, 3]), -1);
        assert_eq!(to_array(s).unwrap(), [1, 2, 3]);
    }
}
