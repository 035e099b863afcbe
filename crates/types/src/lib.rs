//! Types used by the strata storage crates.
//!
//! These are low-level types shared between the access layer and its storage
//! engines, mostly the encodings used by the temporal tables: timestamp sets
//! for inverted indices and the sharded keys they are stored under.

#![warn(
    missing_copy_implementations,
    missing_debug_implementations,
    missing_docs,
    unreachable_pub,
    clippy::missing_const_for_fn,
    rustdoc::all
)]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![deny(unused_must_use, rust_2018_idioms)]
#![cfg_attr(docsrs, feature(doc_cfg))]

mod int_list;
pub use int_list::{IntegerList, IntegerListError, TimestampList};

mod sharded;
pub use sharded::ShardedKey;

/// A logical timestamp. Temporal tables version their rows by this value.
pub type Timestamp = u64;

/// Size of an encoded [`Timestamp`].
pub const TIMESTAMP_SIZE: usize = 8;

/// Encode a timestamp as big-endian bytes, so byte order matches numeric
/// order.
#[inline]
pub const fn encode_ts(ts: Timestamp) -> [u8; TIMESTAMP_SIZE] {
    ts.to_be_bytes()
}

/// Decode a big-endian timestamp. Returns `None` if `data` is not exactly
/// [`TIMESTAMP_SIZE`] bytes.
#[inline]
pub fn decode_ts(data: &[u8]) -> Option<Timestamp> {
    let arr: [u8; TIMESTAMP_SIZE] = data.try_into().ok()?;
    Some(Timestamp::from_be_bytes(arr))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ts_encoding_sorts_numerically() {
        let a = encode_ts(255);
        let b = encode_ts(256);
        assert!(a < b);
        assert_eq!(decode_ts(&b), Some(256));
        assert_eq!(decode_ts(&b[..7]), None);
    }
}
