//! Constructors for tests.

use crate::{
    db::{Database, RoTx, RwTx},
    mem::MemKv,
    tables::chaindata_tables_cfg,
    temporal::temporal_tables_cfg,
};
use tokio_util::sync::CancellationToken;

/// An in-memory database holding the chain data and temporal tables.
pub fn new_test_db() -> Database<MemKv> {
    let tables = chaindata_tables_cfg().merge(temporal_tables_cfg());
    Database::open(MemKv::new(), tables).expect("in-memory database opens")
}

/// A read-write transaction over a fresh [`new_test_db`].
///
/// The database is returned too, since the transaction must not outlive it.
pub fn new_test_tx() -> (Database<MemKv>, RwTx<MemKv>) {
    let db = new_test_db();
    let tx = db.begin_rw(&CancellationToken::new()).expect("fresh database admits a writer");
    (db, tx)
}

/// A read-only transaction over `db`.
pub fn begin_test_ro(db: &Database<MemKv>) -> RoTx<MemKv> {
    db.begin_ro(&CancellationToken::new()).expect("open database admits readers")
}
