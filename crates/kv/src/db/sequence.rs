//! Named counters stored in the [`Sequence`] table.

use super::tx::Tx;
use crate::{
    model::{EngineRead, EngineWrite, KvError, KvResult},
    tables::{Sequence, Table},
};

fn decode(raw: Option<&[u8]>) -> KvResult<u64> {
    let Some(raw) = raw else {
        return Ok(0);
    };
    let bytes: [u8; 8] = raw
        .try_into()
        .map_err(|_| KvError::corrupted(Sequence::NAME, "sequence value is not 8 bytes"))?;
    Ok(u64::from_be_bytes(bytes))
}

impl<T: EngineRead> Tx<T> {
    /// Current value of the counter `name`. Missing counters are zero.
    pub fn read_sequence(&self, name: &str) -> KvResult<u64> {
        let raw = self.get_one(Sequence::NAME, name.as_bytes())?;
        decode(raw.as_deref())
    }
}

impl<T: EngineWrite> Tx<T> {
    /// Add `amount` to the counter `name`, returning its value before the
    /// increment.
    pub fn increment_sequence(&self, name: &str, amount: u64) -> KvResult<u64> {
        let current = self.read_sequence(name)?;
        let next = current.wrapping_add(amount);
        self.put(Sequence::NAME, name.as_bytes(), &next.to_be_bytes())?;
        Ok(current)
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        db::Database,
        mem::MemKv,
        model::KvError,
        tables::{Sequence, Table, TableCfg},
    };
    use tokio_util::sync::CancellationToken;

    #[test]
    fn increments_return_previous() {
        let db = Database::open(MemKv::new(), TableCfg::new()).unwrap();
        let cancel = CancellationToken::new();

        let mut tx = db.begin_rw(&cancel).unwrap();
        assert_eq!(tx.read_sequence("blocks").unwrap(), 0);
        assert_eq!(tx.increment_sequence("blocks", 5).unwrap(), 0);
        assert_eq!(tx.increment_sequence("blocks", 2).unwrap(), 5);
        assert_eq!(tx.read_sequence("blocks").unwrap(), 7);
        assert_eq!(tx.read_sequence("txs").unwrap(), 0);
        tx.commit().unwrap();

        let tx = db.begin_ro(&cancel).unwrap();
        assert_eq!(tx.read_sequence("blocks").unwrap(), 7);
    }

    #[test]
    fn rolled_back_increment_is_lost() {
        let db = Database::open(MemKv::new(), TableCfg::new()).unwrap();
        let cancel = CancellationToken::new();
        db.update(&cancel, |tx| tx.increment_sequence("a", 1).map(drop)).unwrap();

        let mut tx = db.begin_rw(&cancel).unwrap();
        tx.increment_sequence("a", 10).unwrap();
        tx.rollback();

        assert_eq!(db.view(&cancel, |tx| tx.read_sequence("a")).unwrap(), 1);
    }

    #[test]
    fn malformed_counter() {
        let db = Database::open(MemKv::new(), TableCfg::new()).unwrap();
        let cancel = CancellationToken::new();
        db.update(&cancel, |tx| tx.put(Sequence::NAME, b"bad", b"123")).unwrap();
        let err = db.view(&cancel, |tx| tx.read_sequence("bad")).unwrap_err();
        assert!(matches!(err, KvError::Corrupted { .. }));
    }
}
