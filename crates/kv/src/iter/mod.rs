//! Lazy sorted streams and their algebra.
//!
//! A [`Stream`] is a forward-only, pull-based sequence of items that may
//! fail. Table range scans, temporal queries and the combinators in this
//! module all produce streams:
//!
//! - [`union`] / [`union_kv`]: merge two sorted streams, deduplicating keys.
//! - [`intersect`] / [`intersect_kv`]: keys present in both inputs.
//! - [`filter`], [`transform`], [`limit`]: per-item adapters.
//! - [`ArrayStream`], [`empty`]: materialized sources.
//!
//! Combinators never emit an item past an input error. Once an input fails,
//! the error is reported exactly once and the combinator is finished.

mod adapters;
pub use adapters::{
    ArrayStream, Empty, Filter, Limit, Transform, array, empty, filter, filter_kv, limit,
    limit_kv, transform, transform_kv,
};

mod intersect;
pub use intersect::{Intersect, intersect, intersect_kv};

mod union;
pub use union::{Union, union, union_kv, union_kv_ordered};

#[cfg(any(test, feature = "test-utils"))]
mod testing;
#[cfg(any(test, feature = "test-utils"))]
pub use testing::{PairsWithError, pairs_with_error};

use crate::model::{KvError, KvResult};
use bytes::Bytes;
use core::{cmp::Ordering, fmt};

/// A key-value pair yielded by KV streams.
pub type KvPair = (Bytes, Bytes);

/// A boxed KV stream.
pub type BoxKvStream<'a> = Box<dyn Stream<Item = KvPair> + 'a>;

/// A boxed stream of timestamps.
pub type BoxU64Stream<'a> = Box<dyn Stream<Item = u64> + 'a>;

/// Iteration order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Order {
    /// Ascending.
    #[default]
    Asc,
    /// Descending.
    Desc,
}

impl Order {
    /// Compare two keys in iteration order. `Less` means `a` comes first.
    pub fn cmp_keys<K: Ord + ?Sized>(self, a: &K, b: &K) -> Ordering {
        match self {
            Order::Asc => a.cmp(b),
            Order::Desc => b.cmp(a),
        }
    }
}

impl fmt::Display for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Order::Asc => "ascending",
            Order::Desc => "descending",
        })
    }
}

/// A lazy, forward-only sequence of fallible items.
pub trait Stream {
    /// The item type.
    type Item;

    /// Returns `true` if a call to [`next`](Stream::next) will produce an
    /// item or an error.
    fn has_next(&self) -> bool;

    /// Produce the next item.
    ///
    /// Returns [`KvError::StreamExhausted`] if [`has_next`] is `false`.
    ///
    /// [`has_next`]: Stream::has_next
    fn next(&mut self) -> KvResult<Self::Item>;
}

impl<S: Stream + ?Sized> Stream for &mut S {
    type Item = S::Item;

    fn has_next(&self) -> bool {
        (**self).has_next()
    }

    fn next(&mut self) -> KvResult<Self::Item> {
        (**self).next()
    }
}

impl<S: Stream + ?Sized> Stream for Box<S> {
    type Item = S::Item;

    fn has_next(&self) -> bool {
        (**self).has_next()
    }

    fn next(&mut self) -> KvResult<Self::Item> {
        (**self).next()
    }
}

/// Items that sorted combinators can merge.
pub trait MergeKey {
    /// The comparison key.
    type Key: Ord + ?Sized;

    /// The key this item sorts by.
    fn merge_key(&self) -> &Self::Key;
}

impl MergeKey for KvPair {
    type Key = [u8];

    fn merge_key(&self) -> &[u8] {
        &self.0
    }
}

impl MergeKey for u64 {
    type Key = u64;

    fn merge_key(&self) -> &u64 {
        self
    }
}

/// A stream with one item of lookahead, used by the merging combinators.
#[derive(Debug)]
pub(crate) struct Peeked<S: Stream> {
    stream: S,
    head: Option<S::Item>,
}

impl<S: Stream> Peeked<S> {
    pub(crate) const fn new(stream: S) -> Self {
        Self { stream, head: None }
    }

    pub(crate) const fn head(&self) -> Option<&S::Item> {
        self.head.as_ref()
    }

    pub(crate) const fn take(&mut self) -> Option<S::Item> {
        self.head.take()
    }

    /// Pull the next item into the head. On error the head is empty.
    pub(crate) fn advance(&mut self) -> KvResult<()> {
        self.head = None;
        if self.stream.has_next() {
            self.head = Some(self.stream.next()?);
        }
        Ok(())
    }
}

/// Error returned when draining a stream fails partway.
///
/// Holds the items collected before the failure.
#[derive(Debug, thiserror::Error)]
#[error("{source}")]
pub struct PartialDrain<T: fmt::Debug> {
    /// Items read before the error.
    pub collected: T,
    /// The stream error.
    #[source]
    pub source: KvError,
}

/// Drain a stream into a vector.
pub fn to_array<S: Stream>(mut stream: S) -> Result<Vec<S::Item>, PartialDrain<Vec<S::Item>>>
where
    S::Item: fmt::Debug,
{
    let mut collected = Vec::new();
    while stream.has_next() {
        match stream.next() {
            Ok(item) => collected.push(item),
            Err(source) => return Err(PartialDrain { collected, source }),
        }
    }
    Ok(collected)
}

/// Drain a KV stream into parallel key and value vectors.
pub fn to_kv_array<S>(
    mut stream: S,
) -> Result<(Vec<Bytes>, Vec<Bytes>), PartialDrain<(Vec<Bytes>, Vec<Bytes>)>>
where
    S: Stream<Item = KvPair>,
{
    let mut keys = Vec::new();
    let mut values = Vec::new();
    while stream.has_next() {
        match stream.next() {
            Ok((k, v)) => {
                keys.push(k);
                values.push(v);
            }
            Err(source) => return Err(PartialDrain { collected: (keys, values), source }),
        }
    }
    Ok((keys, values))
}

/// Count the remaining items of a stream.
pub fn count<S: Stream>(mut stream: S) -> KvResult<u64> {
    let mut n = 0;
    while stream.has_next() {
        stream.next()?;
        n += 1;
    }
    Ok(n)
}

/// Decrement a `-1`-is-unlimited counter. Returns `false` once it is
/// exhausted.
pub(crate) const fn take_one(limit: &mut i64) -> bool {
    if *limit > 0 {
        *limit -= 1;
    }
    *limit != 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_collects_prefix_on_error() {
        let err = to_kv_array(pairs_with_error(3)).unwrap_err();
        assert_eq!(err.collected.0.len(), 3);
        assert_eq!(err.to_string(), "expected error at iteration: 3");
    }

    #[test]
    fn error_stream_stays_sorted() {
        let err = to_kv_array(pairs_with_error(40)).unwrap_err();
        let keys = &err.collected.0;
        assert_eq!(keys.len(), 40);
        assert!(keys.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(&keys[16][..], b"0000000000000011");
    }

    #[test]
    fn exhausted_stream_errors() {
        let mut s = empty::<u64>();
        assert!(!s.has_next());
        assert!(matches!(s.next(), Err(KvError::StreamExhausted)));
    }

    #[test]
    fn descending_comparison() {
        assert_eq!(Order::Desc.cmp_keys(&1u64, &2), Ordering::Greater);
        assert_eq!(Order::Asc.cmp_keys(&b"a"[..], &b"b"[..]), Ordering::Less);
        assert_eq!(Order::Desc.to_string(), "descending");
    }
}
