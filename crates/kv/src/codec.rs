//! Automatic key/value conversion for dup-sort tables.
//!
//! Some dup-sort tables are written with fixed-length composite keys, but
//! store only a prefix of the key as the engine key:
//!
//! ```text
//! caller key (from bytes)       = primary (to bytes) || sub (from - to bytes)
//! stored row                    = primary => sub || value
//! ```
//!
//! Keys shorter than `to` are stored unchanged, one value per key. Any other
//! length is rejected. On read, a stored key of exactly `to` bytes is joined
//! back with the first `from - to` bytes of its value.

use crate::model::{KvError, KvResult};
use bytes::Bytes;

/// Key lengths of an auto-converting dup-sort table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DupLayout {
    from: usize,
    to: usize,
}

/// How a caller key maps onto the stored layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoredKey<'a> {
    /// A full composite key, split into the stored primary and the prefix of
    /// the stored value.
    Split {
        /// Stored primary key.
        primary: &'a [u8],
        /// Leading bytes of the stored value.
        sub: &'a [u8],
    },
    /// A short key stored unchanged.
    Whole(&'a [u8]),
}

impl DupLayout {
    /// Create a layout converting `from`-byte keys into `to`-byte primaries.
    ///
    /// # Panics
    ///
    /// If `to >= from`.
    pub const fn new(from: usize, to: usize) -> Self {
        assert!(to < from, "stored key must be shorter than the composite key");
        Self { from, to }
    }

    /// Composite key length.
    pub const fn from(&self) -> usize {
        self.from
    }

    /// Stored primary key length.
    pub const fn to(&self) -> usize {
        self.to
    }

    /// Number of key bytes moved into the value.
    pub const fn sub_len(&self) -> usize {
        self.from - self.to
    }

    /// Classify a key for writing or deleting.
    pub fn classify<'a>(&self, table: &str, key: &'a [u8]) -> KvResult<StoredKey<'a>> {
        let len = key.len();
        if len == self.from {
            let (primary, sub) = key.split_at(self.to);
            Ok(StoredKey::Split { primary, sub })
        } else if len < self.to {
            Ok(StoredKey::Whole(key))
        } else {
            Err(KvError::KeyLengthConflict {
                table: table.to_owned(),
                len,
                from: self.from,
                to: self.to,
            })
        }
    }

    /// Split a seek key. Keys longer than the primary seek the primary, then
    /// the duplicates at or above the rest of the key.
    pub fn split_seek<'a>(&self, key: &'a [u8]) -> (&'a [u8], Option<&'a [u8]>) {
        if key.len() > self.to {
            let (primary, sub) = key.split_at(self.to);
            (primary, Some(sub))
        } else {
            (key, None)
        }
    }

    /// Build the stored value of a split key.
    pub fn join_value(sub: &[u8], value: &[u8]) -> Vec<u8> {
        let mut stored = Vec::with_capacity(sub.len() + value.len());
        stored.extend_from_slice(sub);
        stored.extend_from_slice(value);
        stored
    }

    /// Returns `true` if a stored value carries the given sub key.
    pub fn has_sub(&self, stored_value: &[u8], sub: &[u8]) -> bool {
        stored_value.len() >= self.sub_len() && &stored_value[..self.sub_len()] == sub
    }

    /// Turn a stored row back into the caller's key and value.
    pub fn decode(&self, table: &str, key: Bytes, value: Bytes) -> KvResult<(Bytes, Bytes)> {
        if key.len() != self.to {
            return Ok((key, value));
        }
        if value.len() < self.sub_len() {
            return Err(KvError::corrupted(table, "dup-sort value shorter than its sub key"));
        }
        let mut full = Vec::with_capacity(self.from);
        full.extend_from_slice(&key);
        full.extend_from_slice(&value[..self.sub_len()]);
        Ok((full.into(), value.slice(self.sub_len()..)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LAYOUT: DupLayout = DupLayout::new(6, 2);

    #[test]
    fn classify_lengths() {
        assert_eq!(
            LAYOUT.classify("t", b"abcdef").unwrap(),
            StoredKey::Split { primary: b"ab", sub: b"cdef" }
        );
        assert_eq!(LAYOUT.classify("t", b"a").unwrap(), StoredKey::Whole(b"a"));

        for bad in [&b"ab"[..], b"abc", b"abcdefg"] {
            let err = LAYOUT.classify("t", bad).unwrap_err();
            assert!(matches!(err, KvError::KeyLengthConflict { len, .. } if len == bad.len()));
        }
    }

    #[test]
    fn decode_joins_primary_and_sub() {
        let (k, v) = LAYOUT
            .decode("t", Bytes::from_static(b"ab"), Bytes::from_static(b"cdefVAL"))
            .unwrap();
        assert_eq!(&k[..], b"abcdef");
        assert_eq!(&v[..], b"VAL");

        let (k, v) =
            LAYOUT.decode("t", Bytes::from_static(b"a"), Bytes::from_static(b"x")).unwrap();
        assert_eq!((&k[..], &v[..]), (&b"a"[..], &b"x"[..]));

        assert!(LAYOUT.decode("t", Bytes::from_static(b"ab"), Bytes::from_static(b"c")).is_err());
    }

    #[test]
    fn seek_split() {
        assert_eq!(LAYOUT.split_seek(b"abc"), (&b"ab"[..], Some(&b"c"[..])));
        assert_eq!(LAYOUT.split_seek(b"ab"), (&b"ab"[..], None));
        assert!(LAYOUT.has_sub(b"cdefVAL", b"cdef"));
        assert!(!LAYOUT.has_sub(b"cd", b"cdef"));
    }
}
