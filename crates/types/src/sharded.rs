use crate::{TIMESTAMP_SIZE, Timestamp, decode_ts, encode_ts};

/// Sometimes an index is too big to be saved for a single key. This divides
/// it into shards, each keyed by the highest timestamp it contains:
///
/// `key | 200` -> timestamps up to 200.
///
/// `key | u64::MAX` -> the open shard with everything after 200.
#[derive(Debug, Default, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ShardedKey<T> {
    /// The key for this shard.
    pub key: T,
    /// Highest timestamp stored in this shard.
    pub highest_ts: Timestamp,
}

impl ShardedKey<()> {
    /// Number of timestamps in one closed shard.
    pub const SHARD_COUNT: u64 = 2000;
}

impl<T> ShardedKey<T> {
    /// Creates a new `ShardedKey<T>`.
    pub const fn new(key: T, highest_ts: Timestamp) -> Self {
        Self { key, highest_ts }
    }

    /// Creates the key of the open shard, whose highest timestamp is the
    /// maximum. Seeking it finds the last shard for `key`.
    pub const fn last(key: T) -> Self {
        Self { key, highest_ts: Timestamp::MAX }
    }

    /// Returns `true` if this is the open shard.
    pub const fn is_last(&self) -> bool {
        self.highest_ts == Timestamp::MAX
    }
}

impl<T: AsRef<[u8]>> ShardedKey<T> {
    /// Encodes the shard key as `key || be(highest_ts)`.
    pub fn encode(&self) -> Vec<u8> {
        let key = self.key.as_ref();
        let mut buf = Vec::with_capacity(key.len() + TIMESTAMP_SIZE);
        buf.extend_from_slice(key);
        buf.extend_from_slice(&encode_ts(self.highest_ts));
        buf
    }
}

impl<'a> ShardedKey<&'a [u8]> {
    /// Decodes an encoded shard key. Returns `None` if the data is shorter
    /// than a timestamp.
    pub fn decode(data: &'a [u8]) -> Option<Self> {
        let split = data.len().checked_sub(TIMESTAMP_SIZE)?;
        let (key, ts) = data.split_at(split);
        Some(Self { key, highest_ts: decode_ts(ts)? })
    }

    /// Returns `true` if this shard belongs to `key`.
    pub fn is_for(&self, key: &[u8]) -> bool {
        self.key == key
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode() {
        let shard = ShardedKey::new(b"acct".as_slice(), 77);
        let encoded = shard.encode();
        assert_eq!(encoded.len(), 4 + TIMESTAMP_SIZE);
        assert_eq!(ShardedKey::decode(&encoded), Some(shard));
        assert!(ShardedKey::decode(&encoded[..3]).is_none());
    }

    #[test]
    fn shards_of_one_key_sort_by_timestamp() {
        let a = ShardedKey::new(b"k".as_slice(), 10).encode();
        let b = ShardedKey::new(b"k".as_slice(), 2000).encode();
        let last = ShardedKey::last(b"k".as_slice()).encode();
        assert!(a < b && b < last);
        assert!(ShardedKey::decode(&last).unwrap().is_last());
    }
}
