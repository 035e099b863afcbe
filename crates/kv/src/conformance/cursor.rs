//! Plain table cursor tests.

use super::{open, token};
use crate::{model::KvEngine, tables::TableCfgItem};

const TABLE: &str = "conf_cursor";
const MUT_TABLE: &str = "conf_cursor_mut";

fn key(k: &[u8]) -> Vec<u8> {
    k.to_vec()
}

/// Test positioning calls on a plain table.
pub fn test_cursor_navigation<E: KvEngine>(engine: &E) {
    let db = open(engine, &[(TABLE, TableCfgItem::plain())]);

    {
        let mut tx = db.begin_rw(&token()).unwrap();
        for (k, v) in [(b"b", b"2"), (b"d", b"4"), (b"a", b"1"), (b"c", b"3")] {
            tx.put(TABLE, k, v).unwrap();
        }
        // Plain tables replace on put.
        tx.put(TABLE, b"c", b"33").unwrap();
        tx.commit().unwrap();
    }

    let tx = db.begin_ro(&token()).unwrap();
    let mut cursor = tx.cursor(TABLE).unwrap();

    assert!(cursor.current().unwrap().is_none(), "fresh cursor has no position");

    let (k, v) = cursor.first().unwrap().unwrap();
    assert_eq!((key(&k), key(&v)), (key(b"a"), key(b"1")));
    assert_eq!(key(&cursor.next().unwrap().unwrap().0), key(b"b"));
    let (k, v) = cursor.next().unwrap().unwrap();
    assert_eq!((key(&k), key(&v)), (key(b"c"), key(b"33")));
    assert_eq!(key(&cursor.current().unwrap().unwrap().0), key(b"c"));
    assert_eq!(key(&cursor.prev().unwrap().unwrap().0), key(b"b"));

    let (k, _) = cursor.last().unwrap().unwrap();
    assert_eq!(key(&k), key(b"d"));
    assert!(cursor.next().unwrap().is_none(), "next past the end");

    let (k, _) = cursor.seek(b"bb").unwrap().unwrap();
    assert_eq!(key(&k), key(b"c"), "seek lands on the next key");
    assert!(cursor.seek(b"e").unwrap().is_none());
    let (k, _) = cursor.seek(b"").unwrap().unwrap();
    assert_eq!(key(&k), key(b"a"), "empty seek is first");

    assert!(cursor.seek_exact(b"bb").unwrap().is_none());
    let (k, v) = cursor.seek_exact(b"d").unwrap().unwrap();
    assert_eq!((key(&k), key(&v)), (key(b"d"), key(b"4")));

    assert_eq!(tx.get_one(TABLE, b"b").unwrap().as_deref(), Some(&b"2"[..]));
    assert_eq!(tx.get_one(TABLE, b"z").unwrap(), None);
    assert_eq!(tx.count(TABLE).unwrap(), 4);
}

/// Test writes through a cursor on a plain table.
pub fn test_cursor_mutation<E: KvEngine>(engine: &E) {
    let db = open(engine, &[(MUT_TABLE, TableCfgItem::plain())]);
    let mut tx = db.begin_rw(&token()).unwrap();

    {
        let mut cursor = tx.rw_cursor(MUT_TABLE).unwrap();
        for k in [b"a", b"b", b"c", b"d"] {
            cursor.append(k, b"v").unwrap();
        }

        cursor.seek_exact(b"b").unwrap().unwrap();
        cursor.delete_current().unwrap();
        let (k, _) = cursor.next().unwrap().unwrap();
        assert_eq!(key(&k), key(b"c"), "next after delete is the following row");

        cursor.delete(b"d").unwrap();
        cursor.delete(b"missing").unwrap();
        cursor.put(b"a", b"new").unwrap();
    }

    assert_eq!(tx.get_one(MUT_TABLE, b"a").unwrap().as_deref(), Some(&b"new"[..]));
    assert!(!tx.has(MUT_TABLE, b"b").unwrap());
    assert!(!tx.has(MUT_TABLE, b"d").unwrap());
    assert_eq!(tx.count(MUT_TABLE).unwrap(), 2);

    tx.delete(MUT_TABLE, b"a").unwrap();
    assert!(!tx.has(MUT_TABLE, b"a").unwrap());
    tx.commit().unwrap();
}
