//! Table management and sequence tests.

use super::{open, token};
use crate::{
    model::{KvEngine, KvError},
    tables::{Sequence, Table, TableCfgItem},
};

const LIVE: &str = "conf_live";
const DEPRECATED: &str = "conf_deprecated";
const DEPRECATED_DUPS: &str = "conf_deprecated_dups";

/// Test creating, dropping and clearing tables.
pub fn test_buckets<E: KvEngine>(engine: &E) {
    let db = open(
        engine,
        &[
            (LIVE, TableCfgItem::plain()),
            (DEPRECATED, TableCfgItem::plain().deprecated()),
            (DEPRECATED_DUPS, TableCfgItem::dup_sort().deprecated()),
        ],
    );
    let mut tx = db.begin_rw(&token()).unwrap();

    assert!(tx.exists_bucket(LIVE).unwrap());
    assert!(!tx.exists_bucket(DEPRECATED).unwrap(), "deprecated tables are not created at open");
    let names = tx.list_buckets().unwrap();
    assert!(names.iter().any(|n| n == LIVE));
    assert!(names.iter().any(|n| n == Sequence::NAME));
    assert!(names.windows(2).all(|w| w[0] < w[1]), "names are sorted");

    tx.drop_bucket(DEPRECATED).unwrap();
    tx.create_bucket(DEPRECATED).unwrap();
    tx.create_bucket(DEPRECATED).unwrap();
    assert!(tx.exists_bucket(DEPRECATED).unwrap());

    // Created tables take their flags from the catalog.
    tx.create_bucket(DEPRECATED_DUPS).unwrap();
    tx.put(DEPRECATED_DUPS, b"k", b"2").unwrap();
    tx.put(DEPRECATED_DUPS, b"k", b"1").unwrap();
    assert_eq!(tx.count(DEPRECATED_DUPS).unwrap(), 2);

    tx.put(DEPRECATED, b"k", b"v").unwrap();
    tx.drop_bucket(DEPRECATED).unwrap();
    assert!(!tx.exists_bucket(DEPRECATED).unwrap());
    tx.drop_bucket(DEPRECATED_DUPS).unwrap();

    let err = tx.drop_bucket(LIVE).unwrap_err();
    assert!(matches!(&err, KvError::DeleteNonDeprecatedTable(t) if t == LIVE));
    assert!(matches!(tx.drop_bucket("conf_nowhere"), Err(KvError::DeleteNonDeprecatedTable(_))));
    assert!(matches!(tx.create_bucket("conf_nowhere"), Err(KvError::UnknownTable(_))));

    tx.put(LIVE, b"a", b"1").unwrap();
    tx.put(LIVE, b"b", b"2").unwrap();
    tx.clear_bucket(LIVE).unwrap();
    assert!(tx.exists_bucket(LIVE).unwrap(), "clearing keeps the table");
    assert_eq!(tx.count(LIVE).unwrap(), 0);
    tx.commit().unwrap();

    let tx = db.begin_ro(&token()).unwrap();
    assert!(!tx.exists_bucket(DEPRECATED).unwrap());
    assert!(!tx.exists_bucket(DEPRECATED_DUPS).unwrap());
    assert!(tx.exists_bucket(LIVE).unwrap());
}

/// Test named counters.
pub fn test_sequences<E: KvEngine>(engine: &E) {
    let db = open(engine, &[]);

    let mut tx = db.begin_rw(&token()).unwrap();
    assert_eq!(tx.read_sequence("conf_seq").unwrap(), 0);
    assert_eq!(tx.increment_sequence("conf_seq", 3).unwrap(), 0);
    assert_eq!(tx.increment_sequence("conf_seq", 4).unwrap(), 3);
    assert_eq!(tx.increment_sequence("conf_seq", 0).unwrap(), 7);
    assert_eq!(tx.read_sequence("conf_seq_other").unwrap(), 0);
    tx.commit().unwrap();

    let mut tx = db.begin_rw(&token()).unwrap();
    assert_eq!(tx.increment_sequence("conf_seq", 1).unwrap(), 7);
    tx.rollback();

    let tx = db.begin_ro(&token()).unwrap();
    assert_eq!(tx.read_sequence("conf_seq").unwrap(), 7);
}
