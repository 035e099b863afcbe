//! Range stream tests.

use super::{open, token};
use crate::{
    iter::{Stream, count, to_kv_array},
    model::{KvEngine, KvError},
    tables::TableCfgItem,
};
use bytes::Bytes;

const RANGE: &str = "conf_range";
const RANGE_AUTO: &str = "conf_range_auto";

fn keys(stream: impl Stream<Item = (Bytes, Bytes)>) -> Vec<Vec<u8>> {
    to_kv_array(stream).unwrap().0.into_iter().map(|k| k.to_vec()).collect()
}

fn k(key: &[u8]) -> Vec<u8> {
    key.to_vec()
}

/// Test ascending, descending and prefix streams on a plain table.
pub fn test_range_streams<E: KvEngine>(engine: &E) {
    let db = open(engine, &[(RANGE, TableCfgItem::plain())]);
    db.update(&token(), |tx| {
        for key in [&b"a1"[..], b"a2", b"a3", b"b1", b"b2", b"c", b"\xff", b"\xff\x01"] {
            tx.put(RANGE, key, key)?;
        }
        Ok(())
    })
    .unwrap();

    let tx = db.begin_ro(&token()).unwrap();

    assert_eq!(keys(tx.range(RANGE, Some(b"a2"), Some(b"b2")).unwrap()), [k(b"a2"), k(b"a3"), k(b"b1")]);
    assert_eq!(keys(tx.range_ascend(RANGE, Some(b"b"), None, 2).unwrap()), [k(b"b1"), k(b"b2")]);
    assert_eq!(count(tx.range(RANGE, None, None).unwrap()).unwrap(), 8);
    assert!(keys(tx.range(RANGE, Some(b"b"), Some(b"b")).unwrap()).is_empty());

    assert_eq!(
        keys(tx.range_descend(RANGE, Some(b"b1"), Some(b"a1"), -1).unwrap()),
        [k(b"b1"), k(b"a3"), k(b"a2")],
        "descending ranges exclude the lower bound"
    );
    assert_eq!(keys(tx.range_descend(RANGE, Some(b"a9"), None, 1).unwrap()), [k(b"a3")]);

    assert_eq!(keys(tx.prefix(RANGE, b"a").unwrap()), [k(b"a1"), k(b"a2"), k(b"a3")]);
    assert_eq!(keys(tx.prefix(RANGE, b"\xff").unwrap()), [k(b"\xff"), k(b"\xff\x01")]);
    assert!(keys(tx.prefix(RANGE, b"d").unwrap()).is_empty());

    let mut seen = Vec::new();
    tx.for_prefix(RANGE, b"b", |key, _| {
        seen.push(key.to_vec());
        Ok(())
    })
    .unwrap();
    assert_eq!(seen, [k(b"b1"), k(b"b2")]);

    let mut visited = 0;
    let err = tx
        .for_each(RANGE, b"b", |_, _| {
            visited += 1;
            if visited == 2 { Err(KvError::Cancelled) } else { Ok(()) }
        })
        .unwrap_err();
    assert!(err.is_cancelled(), "callback errors stop the walk");
    assert_eq!(visited, 2);

    let mut stream = tx.range(RANGE, Some(b"c"), Some(b"d")).unwrap();
    stream.next().unwrap();
    assert!(matches!(stream.next(), Err(KvError::StreamExhausted)));
}

/// Test that ranges over a converted table yield full keys.
pub fn test_range_streams_converted<E: KvEngine>(engine: &E) {
    let db = open(engine, &[(RANGE_AUTO, TableCfgItem::auto_dup_sort(60, 28))]);
    let primary = [0x07; 28];
    let full = |slot: u8| [&primary[..], &[slot; 32][..]].concat();

    db.update(&token(), |tx| {
        tx.put(RANGE_AUTO, &primary[..20], b"account")?;
        for slot in 1..=3 {
            tx.put(RANGE_AUTO, &full(slot), &[slot])?;
        }
        Ok(())
    })
    .unwrap();

    let tx = db.begin_ro(&token()).unwrap();
    let (keys, values) = to_kv_array(tx.range(RANGE_AUTO, None, None).unwrap()).unwrap();
    assert_eq!(keys.len(), 4);
    assert_eq!(&keys[0][..], &primary[..20]);
    assert_eq!(&values[0][..], b"account");
    for (i, slot) in (1..=3u8).enumerate() {
        assert_eq!(keys[i + 1], full(slot), "duplicates decode into full keys");
        assert_eq!(&values[i + 1][..], &[slot]);
    }

    let (keys, _) = to_kv_array(tx.prefix(RANGE_AUTO, &primary).unwrap()).unwrap();
    assert_eq!(keys, [full(1), full(2), full(3)]);

    let (keys, _) =
        to_kv_array(tx.range_descend(RANGE_AUTO, Some(&full(2)), None, -1).unwrap()).unwrap();
    assert_eq!(keys.len(), 3);
    assert_eq!(keys[0], full(2));
    assert_eq!(&keys[2][..], &primary[..20]);
}
