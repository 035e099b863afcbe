//! Dup-sort cursor and auto-conversion tests.

use super::{open, token};
use crate::{
    model::{KvEngine, KvError},
    tables::TableCfgItem,
};

const DUPS: &str = "conf_dups";
const DUPS_MUT: &str = "conf_dups_mut";
const AUTO: &str = "conf_auto";
const AUTO_RANGE: &str = "conf_auto_range";
const AUTO_STRICT: &str = "conf_auto_strict";
const DIRECT_PLAIN: &str = "conf_direct_plain";
const DIRECT_DUPS: &str = "conf_direct_dups";

/// An account key, an incarnation and a storage slot, 60 bytes together.
fn storage_key(addr: &[u8; 20], slot: u8) -> Vec<u8> {
    let mut key = addr.to_vec();
    key.extend_from_slice(&1u64.to_be_bytes());
    key.extend_from_slice(&[slot; 32]);
    key
}

fn pair(row: Option<(bytes::Bytes, bytes::Bytes)>) -> Option<(Vec<u8>, Vec<u8>)> {
    row.map(|(k, v)| (k.to_vec(), v.to_vec()))
}

fn fill_dups<E: KvEngine>(db: &crate::Database<&E>, table: &str) {
    let mut tx = db.begin_rw(&token()).unwrap();
    for (k, v) in [(b"a", b"3"), (b"a", b"1"), (b"a", b"2"), (b"b", b"1"), (b"c", b"6"), (b"c", b"5")]
    {
        tx.put(table, k, v).unwrap();
    }
    tx.commit().unwrap();
}

/// Test duplicate navigation on a dup-sort table without conversion.
pub fn test_dup_sort_navigation<E: KvEngine>(engine: &E) {
    let db = open(engine, &[(DUPS, TableCfgItem::dup_sort())]);
    fill_dups(&db, DUPS);

    let tx = db.begin_ro(&token()).unwrap();
    assert!(matches!(tx.cursor_dup_sort("Sequence"), Err(KvError::NotDupSort(_))));
    let mut cursor = tx.cursor_dup_sort(DUPS).unwrap();

    assert_eq!(cursor.seek_both_range(b"a", b"2").unwrap().as_deref(), Some(&b"2"[..]));
    assert_eq!(cursor.seek_both_range(b"a", b"15").unwrap().as_deref(), Some(&b"2"[..]));
    assert_eq!(cursor.seek_both_range(b"a", b"4").unwrap(), None, "no value at or above");
    assert_eq!(cursor.seek_both_range(b"x", b"").unwrap(), None, "missing key is not an error");

    let found = pair(cursor.seek_both_exact(b"a", b"3").unwrap());
    assert_eq!(found, Some((b"a".to_vec(), b"3".to_vec())));
    assert!(cursor.seek_both_exact(b"a", b"9").unwrap().is_none());

    cursor.seek_both_exact(b"a", b"3").unwrap().unwrap();
    assert!(cursor.next_dup().unwrap().is_none(), "next_dup past the last duplicate");
    assert_eq!(cursor.first_dup().unwrap().as_deref(), Some(&b"1"[..]));
    assert_eq!(cursor.last_dup().unwrap().as_deref(), Some(&b"3"[..]));

    cursor.seek_both_exact(b"a", b"2").unwrap().unwrap();
    assert_eq!(cursor.count_duplicates().unwrap(), 3);
    assert_eq!(pair(cursor.next_dup().unwrap()), Some((b"a".to_vec(), b"3".to_vec())));

    assert_eq!(pair(cursor.next_no_dup().unwrap()), Some((b"b".to_vec(), b"1".to_vec())));
    assert_eq!(pair(cursor.next_no_dup().unwrap()), Some((b"c".to_vec(), b"5".to_vec())));
    assert_eq!(pair(cursor.prev_no_dup().unwrap()), Some((b"b".to_vec(), b"1".to_vec())));
    assert!(cursor.prev_dup().unwrap().is_none());

    cursor.seek_exact(b"c").unwrap().unwrap();
    assert_eq!(pair(cursor.next_dup().unwrap()), Some((b"c".to_vec(), b"6".to_vec())));
    assert_eq!(pair(cursor.prev_dup().unwrap()), Some((b"c".to_vec(), b"5".to_vec())));

    // Plain gets read the first duplicate.
    assert_eq!(tx.get_one(DUPS, b"a").unwrap().as_deref(), Some(&b"1"[..]));
    assert_eq!(tx.count(DUPS).unwrap(), 6);
}

/// Test duplicate writes on a dup-sort table without conversion.
pub fn test_dup_sort_mutation<E: KvEngine>(engine: &E) {
    let db = open(engine, &[(DUPS_MUT, TableCfgItem::dup_sort())]);
    fill_dups(&db, DUPS_MUT);

    let mut tx = db.begin_rw(&token()).unwrap();
    {
        let mut cursor = tx.rw_cursor_dup_sort(DUPS_MUT).unwrap();
        cursor.delete_exact(b"a", b"2").unwrap();
        cursor.delete_exact(b"a", b"missing").unwrap();
        assert!(!cursor.put_no_dup_data(b"a", b"3").unwrap());
        assert!(cursor.put_no_dup_data(b"a", b"4").unwrap());
        cursor.append_dup(b"c", b"7").unwrap();

        cursor.seek_exact(b"b").unwrap().unwrap();
        cursor.delete_current_duplicates().unwrap();
        cursor.delete(b"c").unwrap();
    }
    tx.commit().unwrap();

    let tx = db.begin_ro(&token()).unwrap();
    let mut cursor = tx.cursor_dup_sort(DUPS_MUT).unwrap();
    let mut values = Vec::new();
    let mut row = cursor.first().unwrap();
    while let Some((k, v)) = row {
        values.push((k.to_vec(), v.to_vec()));
        row = cursor.next().unwrap();
    }
    let expected: Vec<_> =
        [b"1", b"3", b"4"].iter().map(|v| (b"a".to_vec(), v.to_vec())).collect();
    assert_eq!(values, expected);
}

/// Test the automatic key conversion of dup-sort tables.
pub fn test_auto_conversion<E: KvEngine>(engine: &E) {
    let db = open(engine, &[(AUTO, TableCfgItem::auto_dup_sort(60, 28))]);
    let addr = [0x01; 20];
    let key1 = storage_key(&addr, 0x01);
    let key2 = storage_key(&addr, 0x02);

    let mut tx = db.begin_rw(&token()).unwrap();
    tx.put(AUTO, &addr, b"account").unwrap();
    tx.put(AUTO, &key1, b"value1").unwrap();
    tx.put(AUTO, &key2, b"value2").unwrap();
    tx.commit().unwrap();

    let tx = db.begin_ro(&token()).unwrap();
    {
        let mut cursor = tx.cursor(AUTO).unwrap();
        assert_eq!(pair(cursor.first().unwrap()), Some((addr.to_vec(), b"account".to_vec())));
        assert_eq!(pair(cursor.next().unwrap()), Some((key1.clone(), b"value1".to_vec())));
        assert_eq!(pair(cursor.next().unwrap()), Some((key2.clone(), b"value2".to_vec())));
        assert!(cursor.next().unwrap().is_none());
        assert_eq!(pair(cursor.last().unwrap()), Some((key2.clone(), b"value2".to_vec())));
        assert_eq!(pair(cursor.prev().unwrap()), Some((key1.clone(), b"value1".to_vec())));

        assert_eq!(pair(cursor.seek_exact(&key1).unwrap()), Some((key1.clone(), b"value1".to_vec())));
        assert!(cursor.seek_exact(&storage_key(&addr, 0x03)).unwrap().is_none());
        assert_eq!(pair(cursor.seek(&key1[..28]).unwrap()), Some((key1.clone(), b"value1".to_vec())));
    }

    // The stored layout holds one primary with two duplicates.
    {
        let mut dups = tx.cursor_dup_sort(AUTO).unwrap();
        let raw = dups.seek_both_range(&key1[..28], &key1[28..]).unwrap().unwrap();
        assert_eq!(&raw[..32], &key1[28..]);
        assert_eq!(&raw[32..], b"value1");
        assert_eq!(dups.count_duplicates().unwrap(), 2);
    }
    assert_eq!(tx.get_one(AUTO, &key2).unwrap().as_deref(), Some(&b"value2"[..]));
    drop(tx);

    let mut tx = db.begin_rw(&token()).unwrap();
    tx.put(AUTO, &key1, b"value1b").unwrap();
    tx.put(AUTO, &addr, b"account2").unwrap();
    tx.delete(AUTO, &key2).unwrap();
    {
        let mut cursor = tx.cursor(AUTO).unwrap();
        assert_eq!(pair(cursor.seek(&key1[..28]).unwrap()), Some((key1.clone(), b"value1b".to_vec())));
        assert!(cursor.next().unwrap().is_none(), "deleted duplicate is gone");
    }
    assert_eq!(tx.get_one(AUTO, &addr).unwrap().as_deref(), Some(&b"account2"[..]));
    assert_eq!(tx.count(AUTO).unwrap(), 2, "overwrites replace, never add");

    tx.delete(AUTO, &addr).unwrap();
    assert!(!tx.has(AUTO, &addr).unwrap());
    assert!(tx.has(AUTO, &key1).unwrap());
    tx.commit().unwrap();
}

/// Test seeking into the duplicates of a converted key.
pub fn test_auto_conversion_seek_both_range<E: KvEngine>(engine: &E) {
    let db = open(engine, &[(AUTO_RANGE, TableCfgItem::auto_dup_sort(60, 28))]);
    let addr = [0x02; 20];
    let key1 = storage_key(&addr, 0x01);
    let key2 = storage_key(&addr, 0x02);
    let key3 = storage_key(&addr, 0x03);
    let next_addr = [0x03; 20];

    let mut tx = db.begin_rw(&token()).unwrap();
    tx.put(AUTO_RANGE, &key1, b"value1").unwrap();
    tx.put(AUTO_RANGE, &key3, b"value3").unwrap();
    tx.put(AUTO_RANGE, &next_addr, b"next").unwrap();
    tx.commit().unwrap();

    let tx = db.begin_ro(&token()).unwrap();
    let mut cursor = tx.cursor(AUTO_RANGE).unwrap();
    assert_eq!(pair(cursor.seek(&key2).unwrap()), Some((key3.clone(), b"value3".to_vec())));

    let mut past = key3.clone();
    past[59] = 0x04;
    assert_eq!(
        pair(cursor.seek(&past).unwrap()),
        Some((next_addr.to_vec(), b"next".to_vec())),
        "a seek past the last duplicate falls through to the next key"
    );

    let mut dups = tx.cursor_dup_sort(AUTO_RANGE).unwrap();
    let raw = dups.seek_both_range(&key2[..28], &key2[28..]).unwrap().unwrap();
    assert_eq!(&raw[..32], &key3[28..]);
    assert_eq!(dups.seek_both_range(&key2[..28], &past[28..]).unwrap(), None);
}

/// Test that keys of the wrong length are rejected.
pub fn test_key_length_conflict<E: KvEngine>(engine: &E) {
    let db = open(engine, &[(AUTO_STRICT, TableCfgItem::auto_dup_sort(60, 28))]);
    let tx = db.begin_rw(&token()).unwrap();

    for len in [28, 40, 61] {
        let err = tx.put(AUTO_STRICT, &vec![0xab; len], b"v").unwrap_err();
        assert!(
            matches!(err, KvError::KeyLengthConflict { len: l, from: 60, to: 28, .. } if l == len),
            "length {len} must conflict"
        );
    }
    assert!(tx.delete(AUTO_STRICT, &[0xab; 40]).is_err());
    assert_eq!(tx.count(AUTO_STRICT).unwrap(), 0);

    // A stored primary is not a readable key either.
    let full = [0xab; 60];
    tx.put(AUTO_STRICT, &full, b"v").unwrap();
    for len in [28, 40] {
        let err = tx.get_one(AUTO_STRICT, &full[..len]).unwrap_err();
        assert!(matches!(err, KvError::KeyLengthConflict { len: l, .. } if l == len));
        let err = tx.cursor(AUTO_STRICT).unwrap().seek_exact(&full[..len]).unwrap_err();
        assert!(matches!(err, KvError::KeyLengthConflict { len: l, .. } if l == len));
    }
    assert_eq!(tx.get_one(AUTO_STRICT, &full).unwrap().as_deref(), Some(&b"v"[..]));
    assert_eq!(tx.get_one(AUTO_STRICT, &full[..27]).unwrap(), None);
}

/// Test transaction-level writes that bypass cursors.
pub fn test_direct_writes<E: KvEngine>(engine: &E) {
    let db = open(
        engine,
        &[(DIRECT_PLAIN, TableCfgItem::plain()), (DIRECT_DUPS, TableCfgItem::dup_sort())],
    );

    let mut tx = db.begin_rw(&token()).unwrap();
    tx.put(DIRECT_PLAIN, b"k", b"1").unwrap();
    tx.put(DIRECT_PLAIN, b"k", b"2").unwrap();
    tx.delete(DIRECT_PLAIN, b"missing").unwrap();
    for v in [b"3", b"1", b"2"] {
        tx.put(DIRECT_DUPS, b"a", v).unwrap();
    }
    tx.put(DIRECT_DUPS, b"b", b"1").unwrap();
    tx.commit().unwrap();

    let mut tx = db.begin_rw(&token()).unwrap();
    assert_eq!(tx.get_one(DIRECT_PLAIN, b"k").unwrap().as_deref(), Some(&b"2"[..]));
    assert_eq!(tx.count(DIRECT_PLAIN).unwrap(), 1, "plain put replaces");
    assert_eq!(tx.count(DIRECT_DUPS).unwrap(), 4, "dup-sort put adds");

    tx.delete_dup(DIRECT_DUPS, b"a", b"1").unwrap();
    tx.delete_dup(DIRECT_DUPS, b"a", b"9").unwrap();
    assert_eq!(tx.get_one(DIRECT_DUPS, b"a").unwrap().as_deref(), Some(&b"2"[..]));
    assert!(matches!(tx.delete_dup(DIRECT_PLAIN, b"k", b"2"), Err(KvError::NotDupSort(_))));

    tx.delete(DIRECT_DUPS, b"a").unwrap();
    tx.delete(DIRECT_PLAIN, b"k").unwrap();
    tx.commit().unwrap();

    let tx = db.begin_ro(&token()).unwrap();
    assert!(!tx.has(DIRECT_PLAIN, b"k").unwrap());
    assert!(!tx.has(DIRECT_DUPS, b"a").unwrap(), "delete drops every duplicate");
    assert_eq!(tx.get_one(DIRECT_DUPS, b"b").unwrap().as_deref(), Some(&b"1"[..]));
}
