//! Transaction lifecycle and isolation tests.

use super::{open, token};
use crate::{
    db::TxMode,
    model::{KvEngine, KvError},
    tables::TableCfgItem,
};

const LIFECYCLE: &str = "conf_lifecycle";
const ISOLATION: &str = "conf_isolation";

/// Test that ended transactions refuse further work.
pub fn test_transaction_lifecycle<E: KvEngine>(engine: &E) {
    let db = open(engine, &[(LIFECYCLE, TableCfgItem::plain())]);

    let mut rw = db.begin_rw(&token()).unwrap();
    assert_eq!(rw.mode(), TxMode::Rw);
    assert!(rw.is_open());
    rw.put(LIFECYCLE, b"k", b"v").unwrap();
    rw.commit().unwrap();
    assert!(!rw.is_open());
    assert!(matches!(rw.commit(), Err(KvError::Terminated)));
    assert!(matches!(rw.put(LIFECYCLE, b"k", b"w"), Err(KvError::Terminated)));
    assert!(matches!(rw.get_one(LIFECYCLE, b"k"), Err(KvError::Terminated)));
    // Rolling back a committed transaction does nothing.
    rw.rollback();

    let mut ro = db.begin_ro(&token()).unwrap();
    assert_eq!(ro.mode(), TxMode::Ro);
    assert!(ro.id() > rw.id(), "ids increase");
    ro.rollback();
    ro.rollback();
    assert!(matches!(ro.cursor(LIFECYCLE), Err(KvError::Terminated)));
    assert!(matches!(ro.commit(), Err(KvError::Terminated)));

    let mut ro = db.begin_ro(&token()).unwrap();
    assert_eq!(ro.get_one(LIFECYCLE, b"k").unwrap().as_deref(), Some(&b"v"[..]));
    assert!(matches!(ro.get_one("conf_missing", b"k"), Err(KvError::UnknownTable(_))));
    ro.commit().unwrap();
    assert_eq!(db.open_transactions(), 0);

    let cancelled = token();
    cancelled.cancel();
    assert!(matches!(db.begin_ro(&cancelled), Err(KvError::Cancelled)));
    assert!(matches!(db.begin_rw(&cancelled), Err(KvError::Cancelled)));
}

/// Test that readers see a consistent snapshot.
pub fn test_snapshot_isolation<E: KvEngine>(engine: &E) {
    let db = open(engine, &[(ISOLATION, TableCfgItem::plain())]);
    db.update(&token(), |tx| tx.put(ISOLATION, b"k", b"v1")).unwrap();

    let before = db.begin_ro(&token()).unwrap();
    let mut rw = db.begin_rw(&token()).unwrap();
    rw.put(ISOLATION, b"k", b"v2").unwrap();
    rw.put(ISOLATION, b"new", b"x").unwrap();
    assert_eq!(rw.get_one(ISOLATION, b"k").unwrap().as_deref(), Some(&b"v2"[..]));
    assert_eq!(
        before.get_one(ISOLATION, b"k").unwrap().as_deref(),
        Some(&b"v1"[..]),
        "uncommitted writes are invisible"
    );
    rw.commit().unwrap();

    assert_eq!(
        before.get_one(ISOLATION, b"k").unwrap().as_deref(),
        Some(&b"v1"[..]),
        "later commits are invisible"
    );
    assert!(!before.has(ISOLATION, b"new").unwrap());
    drop(before);

    let mut rw = db.begin_rw(&token()).unwrap();
    rw.put(ISOLATION, b"k", b"v3").unwrap();
    rw.delete(ISOLATION, b"new").unwrap();
    rw.rollback();

    let after = db.begin_ro(&token()).unwrap();
    assert_eq!(after.get_one(ISOLATION, b"k").unwrap().as_deref(), Some(&b"v2"[..]));
    assert!(after.has(ISOLATION, b"new").unwrap(), "rolled back delete is discarded");
    drop(after);

    // Dropping an open write transaction rolls it back.
    {
        let rw = db.begin_rw(&token()).unwrap();
        rw.put(ISOLATION, b"k", b"dropped").unwrap();
    }
    let value = db.view(&token(), |tx| tx.get_one(ISOLATION, b"k")).unwrap();
    assert_eq!(value.as_deref(), Some(&b"v2"[..]));
}
