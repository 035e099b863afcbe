//! Table management on transactions.

use super::tx::Tx;
use crate::model::{EngineError, EngineRead, EngineWrite, KvError, KvResult};
use tracing::debug;

impl<T: EngineRead> Tx<T> {
    /// Names of the tables that exist in the engine, sorted.
    pub fn list_buckets(&self) -> KvResult<Vec<String>> {
        self.engine()?.table_names().map_err(EngineError::into_kv_error)
    }

    /// Returns `true` if the table exists in the engine.
    pub fn exists_bucket(&self, name: &str) -> KvResult<bool> {
        self.engine()?.table_exists(name).map_err(EngineError::into_kv_error)
    }
}

impl<T: EngineWrite> Tx<T> {
    /// Create a configured table if it does not exist.
    ///
    /// Creating a table missing from the catalog fails with
    /// [`KvError::UnknownTable`], since its flags are unknown.
    pub fn create_bucket(&self, name: &str) -> KvResult<()> {
        let (name, cfg) = self.table_cfg(name)?;
        let engine = self.engine()?;
        if engine.table_exists(name).map_err(EngineError::into_kv_error)? {
            return Ok(());
        }
        engine.create_table(name, cfg.flags).map_err(EngineError::into_kv_error)?;
        debug!(target: "strata::kv", parent: &self.ctx().span, table = name, "created table");
        Ok(())
    }

    /// Drop a deprecated table and its contents.
    ///
    /// Only tables marked deprecated in the catalog may be dropped. Any other
    /// name fails with [`KvError::DeleteNonDeprecatedTable`]. Dropping a
    /// table that does not exist is a no-op.
    pub fn drop_bucket(&self, name: &str) -> KvResult<()> {
        let engine = self.engine()?;
        let deprecated = self.ctx().tables.get(name).is_some_and(|cfg| cfg.is_deprecated);
        if !deprecated {
            return Err(KvError::DeleteNonDeprecatedTable(name.to_owned()));
        }
        if !engine.table_exists(name).map_err(EngineError::into_kv_error)? {
            return Ok(());
        }
        engine.drop_table(name).map_err(EngineError::into_kv_error)?;
        debug!(target: "strata::kv", parent: &self.ctx().span, table = name, "dropped table");
        Ok(())
    }

    /// Remove every row of a table.
    pub fn clear_bucket(&self, name: &str) -> KvResult<()> {
        let engine = self.engine()?;
        if !engine.table_exists(name).map_err(EngineError::into_kv_error)? {
            return Ok(());
        }
        engine.clear_table(name).map_err(EngineError::into_kv_error)
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        db::Database,
        mem::MemKv,
        model::KvError,
        tables::{Clique, Headers, Sequence, Table, TableCfg},
    };
    use tokio_util::sync::CancellationToken;

    #[test]
    fn deprecated_tables_come_and_go() {
        let db = Database::open(MemKv::new(), TableCfg::new().with::<Headers>().with::<Clique>())
            .unwrap();
        let mut tx = db.begin_rw(&CancellationToken::new()).unwrap();

        assert!(!tx.exists_bucket(Clique::NAME).unwrap());
        tx.drop_bucket(Clique::NAME).unwrap();
        tx.create_bucket(Clique::NAME).unwrap();
        tx.create_bucket(Clique::NAME).unwrap();
        assert!(tx.exists_bucket(Clique::NAME).unwrap());
        assert_eq!(tx.list_buckets().unwrap(), [Clique::NAME, Headers::NAME, Sequence::NAME]);

        tx.drop_bucket(Clique::NAME).unwrap();
        tx.drop_bucket(Clique::NAME).unwrap();
        assert!(!tx.exists_bucket(Clique::NAME).unwrap());
        tx.commit().unwrap();
    }

    #[test]
    fn live_tables_are_protected() {
        let db = Database::open(MemKv::new(), TableCfg::new().with::<Headers>()).unwrap();
        let tx = db.begin_rw(&CancellationToken::new()).unwrap();

        let err = tx.drop_bucket(Headers::NAME).unwrap_err();
        assert!(matches!(&err, KvError::DeleteNonDeprecatedTable(t) if t == Headers::NAME));
        assert!(matches!(tx.drop_bucket("Unknown"), Err(KvError::DeleteNonDeprecatedTable(_))));
        assert!(matches!(tx.create_bucket("Unknown"), Err(KvError::UnknownTable(_))));
        assert!(tx.exists_bucket(Headers::NAME).unwrap());
    }

    #[test]
    fn ended_transaction_reports_lifecycle() {
        let db = Database::open(MemKv::new(), TableCfg::new().with::<Headers>()).unwrap();
        let mut tx = db.begin_rw(&CancellationToken::new()).unwrap();
        tx.commit().unwrap();
        assert!(matches!(tx.drop_bucket(Headers::NAME), Err(KvError::Terminated)));
        assert!(matches!(tx.drop_bucket(Clique::NAME), Err(KvError::Terminated)));

        let mut tx = db.begin_rw(&CancellationToken::new()).unwrap();
        tx.rollback();
        assert!(matches!(tx.drop_bucket(Headers::NAME), Err(KvError::Terminated)));
    }

    #[test]
    fn clear_keeps_table() {
        let db = Database::open(MemKv::new(), TableCfg::new().with::<Headers>()).unwrap();
        let tx = db.begin_rw(&CancellationToken::new()).unwrap();
        tx.put(Headers::NAME, b"a", b"1").unwrap();
        tx.clear_bucket(Headers::NAME).unwrap();
        assert!(tx.exists_bucket(Headers::NAME).unwrap());
        assert_eq!(tx.count(Headers::NAME).unwrap(), 0);
    }
}
