use super::{KvPair, Stream};
use crate::model::{KvError, KvResult};
use bytes::Bytes;

/// Error produced by [`PairsWithError`].
#[derive(Debug, thiserror::Error)]
#[error("expected error at iteration: {0}")]
struct InjectedError(u64);

/// A KV stream that yields `n` pairs and then fails.
///
/// Keys and values are the 16-digit lowercase hex of a counter starting at
/// 1, so the stream stays sorted at any length.
/// [`Stream::has_next`] is always `true`.
#[derive(Debug, Clone, Copy)]
pub struct PairsWithError {
    emitted: u64,
    fail_at: u64,
}

impl Stream for PairsWithError {
    type Item = KvPair;

    fn has_next(&self) -> bool {
        true
    }

    fn next(&mut self) -> KvResult<KvPair> {
        if self.emitted >= self.fail_at {
            return Err(KvError::from_err(InjectedError(self.fail_at)));
        }
        self.emitted += 1;
        let key = Bytes::from(format!("{:016x}", self.emitted));
        Ok((key.clone(), key))
    }
}

/// Create a [`PairsWithError`] failing after `n` pairs.
pub const fn pairs_with_error(n: u64) -> PairsWithError {
    PairsWithError { emitted: 0, fail_at: n }
}
