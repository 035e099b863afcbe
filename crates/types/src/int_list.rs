use bytes::BufMut;
use core::fmt;
use roaring::RoaringTreemap;

/// Set of timestamps at which a key changed.
pub type TimestampList = IntegerList;

/// Failure to build or decode an [`IntegerList`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum IntegerListError {
    /// Values were not given in ascending order.
    #[error("integer list values must be ascending")]
    Unsorted,

    /// Stored bytes are not a serialized roaring treemap.
    #[error("malformed integer list encoding")]
    Malformed,

    /// A pushed value did not exceed the current maximum.
    #[error("integer list push must exceed the current maximum")]
    NotIncreasing,
}

/// An ordered set of `u64`s backed by a roaring bitmap.
///
/// Inverted indices store one of these per key shard. Lookups use
/// [`rank`](Self::rank) and [`select`](Self::select) to find the first
/// element above a bound without decoding the whole list.
#[derive(Clone, PartialEq, Default)]
pub struct IntegerList(RoaringTreemap);

impl fmt::Debug for IntegerList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IntegerList")?;
        f.debug_set().entries(self.iter()).finish()
    }
}

impl IntegerList {
    /// A list with no elements.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a list from ascending values.
    pub fn new(values: impl IntoIterator<Item = u64>) -> Result<Self, IntegerListError> {
        match RoaringTreemap::from_sorted_iter(values) {
            Ok(map) => Ok(Self(map)),
            Err(_) => Err(IntegerListError::Unsorted),
        }
    }

    /// Append `value`, which must exceed every element.
    pub fn push(&mut self, value: u64) -> Result<(), IntegerListError> {
        if self.0.push(value) { Ok(()) } else { Err(IntegerListError::NotIncreasing) }
    }

    /// The portable roaring encoding of the list.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.0.serialized_size());
        self.write_to(&mut out);
        out
    }

    /// Write the encoding of the list into `buf`.
    pub fn write_to<B: BufMut>(&self, buf: &mut B) {
        // Writing into a `BufMut` cannot fail short of allocation failure.
        let _ = self.0.serialize_into(buf.writer());
    }

    /// Decode bytes produced by [`to_bytes`](Self::to_bytes).
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, IntegerListError> {
        match RoaringTreemap::deserialize_from(bytes) {
            Ok(map) => Ok(Self(map)),
            Err(_) => Err(IntegerListError::Malformed),
        }
    }

    /// Ascending iterator over the elements.
    pub fn iter(&self) -> roaring::treemap::Iter<'_> {
        self.0.iter()
    }

    /// Number of elements.
    pub fn len(&self) -> u64 {
        self.0.len()
    }

    /// Whether the list has no elements.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Largest element.
    pub fn max(&self) -> Option<u64> {
        self.0.max()
    }

    /// How many elements are `<= value`.
    pub fn rank(&self, value: u64) -> u64 {
        self.0.rank(value)
    }

    /// Element at ascending position `n`.
    pub fn select(&self, n: u64) -> Option<u64> {
        self.0.select(n)
    }

    /// Returns the first element `>= value`, if any.
    pub fn first_at_or_after(&self, value: u64) -> Option<u64> {
        let below = if value == 0 { 0 } else { self.rank(value - 1) };
        self.select(below)
    }

    /// Returns the last element `<= value`, if any.
    pub fn last_at_or_before(&self, value: u64) -> Option<u64> {
        match self.rank(value) {
            0 => None,
            n => self.select(n - 1),
        }
    }
}

impl FromIterator<u64> for IntegerList {
    fn from_iter<I: IntoIterator<Item = u64>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unsorted() {
        assert_eq!(IntegerList::new([3, 1]).unwrap_err(), IntegerListError::Unsorted);
    }

    #[test]
    fn push_must_grow() {
        let mut list = IntegerList::new([5]).unwrap();
        list.push(6).unwrap();
        assert_eq!(list.push(6), Err(IntegerListError::NotIncreasing));
        assert_eq!(list.push(2), Err(IntegerListError::NotIncreasing));
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn push_onto_empty() {
        let mut list = IntegerList::empty();
        list.push(0).unwrap();
        assert_eq!(list.push(0), Err(IntegerListError::NotIncreasing));
        list.push(u64::MAX).unwrap();
        assert_eq!(list.iter().collect::<Vec<_>>(), [0, u64::MAX]);
    }

    #[test]
    fn bound_lookups() {
        let list = IntegerList::new([10, 20, 30]).unwrap();

        assert_eq!(list.first_at_or_after(0), Some(10));
        assert_eq!(list.first_at_or_after(10), Some(10));
        assert_eq!(list.first_at_or_after(11), Some(20));
        assert_eq!(list.first_at_or_after(31), None);

        assert_eq!(list.last_at_or_before(9), None);
        assert_eq!(list.last_at_or_before(20), Some(20));
        assert_eq!(list.last_at_or_before(u64::MAX), Some(30));
    }

    #[test]
    fn bytes_survive_storage() {
        let list: IntegerList = [1u64, 7, 1 << 40].into_iter().collect();
        let decoded = IntegerList::from_bytes(&list.to_bytes()).unwrap();
        assert_eq!(decoded, list);
        assert!(IntegerList::from_bytes(&[1, 2, 3]).is_err());
    }
}
