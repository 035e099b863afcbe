//! Stream combinators over live table scans.

use bytes::Bytes;
use strata_kv::{
    Database,
    iter::{
        KvPair, Order, Stream, array, filter_kv, intersect_kv, limit_kv, pairs_with_error,
        to_kv_array, transform_kv, union_kv, union_kv_ordered,
    },
    mem::MemKv,
    model::KvError,
    tables::{HeaderNumbers, Headers, Table, TableCfg},
};
use tokio_util::sync::CancellationToken;

fn pair(k: &str, v: &str) -> KvPair {
    (Bytes::copy_from_slice(k.as_bytes()), Bytes::copy_from_slice(v.as_bytes()))
}

fn key_strings(stream: impl Stream<Item = KvPair>) -> Vec<String> {
    let (keys, _) = to_kv_array(stream).unwrap();
    keys.iter().map(|k| String::from_utf8(k.to_vec()).unwrap()).collect()
}

fn filled() -> Database<MemKv> {
    let tables = TableCfg::new().with::<Headers>().with::<HeaderNumbers>();
    let db = Database::open(MemKv::new(), tables).unwrap();
    db.update(&CancellationToken::new(), |tx| {
        for k in ["1", "2", "3", "5"] {
            tx.put(Headers::NAME, k.as_bytes(), b"h")?;
        }
        for k in ["2", "4"] {
            tx.put(HeaderNumbers::NAME, k.as_bytes(), b"n")?;
        }
        Ok(())
    })
    .unwrap();
    db
}

#[test]
fn union_of_tables() {
    let db = filled();
    let tx = db.begin_ro(&CancellationToken::new()).unwrap();

    let merged = union_kv(
        tx.range(Headers::NAME, None, None).unwrap(),
        tx.range(HeaderNumbers::NAME, None, None).unwrap(),
        -1,
    );
    let (keys, values) = to_kv_array(merged).unwrap();
    assert_eq!(keys, [&b"1"[..], b"2", b"3", b"4", b"5"]);
    assert_eq!(values[1], &b"h"[..], "the first input wins on equal keys");
    assert_eq!(values[3], &b"n"[..]);

    let merged = union_kv_ordered(
        tx.range_descend(Headers::NAME, None, None, -1).unwrap(),
        tx.range_descend(HeaderNumbers::NAME, None, None, -1).unwrap(),
        Order::Desc,
        3,
    );
    assert_eq!(key_strings(merged), ["5", "4", "3"]);
}

#[test]
fn union_stops_at_input_error() {
    let db = filled();
    let tx = db.begin_ro(&CancellationToken::new()).unwrap();

    let merged = union_kv(pairs_with_error(3), tx.range(HeaderNumbers::NAME, None, None).unwrap(), -1);
    let drained = to_kv_array(merged).unwrap_err();
    let collected: Vec<_> = drained.collected.0.iter().map(|k| k.to_vec()).collect();
    let expected: Vec<_> = (1..=3u64).map(|n| format!("{n:016x}").into_bytes()).collect();
    assert_eq!(collected, expected);
    assert!(drained.source.to_string().contains("expected error at iteration: 3"));
}

#[test]
fn union_reports_error_once() {
    let mut merged = union_kv(pairs_with_error(1), array(vec![pair("0", "x")]), -1);
    assert_eq!(merged.next().unwrap().0, &b"0"[..]);
    assert_eq!(merged.next().unwrap().0, &b"0000000000000001"[..]);
    assert!(merged.has_next());
    assert!(matches!(merged.next(), Err(KvError::Engine(_))));
    assert!(!merged.has_next());
    assert!(matches!(merged.next(), Err(KvError::StreamExhausted)));
}

#[test]
fn intersect_of_tables() {
    let db = filled();
    let tx = db.begin_ro(&CancellationToken::new()).unwrap();

    let both = intersect_kv(
        tx.range(Headers::NAME, None, None).unwrap(),
        array(vec![pair("2", "a"), pair("3", "b"), pair("4", "c"), pair("5", "d")]),
        -1,
    );
    let (keys, values) = to_kv_array(both).unwrap();
    assert_eq!(keys, [&b"2"[..], b"3", b"5"]);
    assert!(values.iter().all(|v| v == &b"h"[..]), "values come from the first input");

    let both = intersect_kv(
        tx.range(Headers::NAME, None, None).unwrap(),
        tx.range(HeaderNumbers::NAME, None, None).unwrap(),
        1,
    );
    assert_eq!(key_strings(both), ["2"]);
}

#[test]
fn adapters_compose() {
    let db = filled();
    let tx = db.begin_ro(&CancellationToken::new()).unwrap();

    let odd = filter_kv(tx.range(Headers::NAME, None, None).unwrap(), |k, _| k[0] % 2 == 1);
    let tagged = transform_kv(odd, |(k, v)| Ok((k, Bytes::from([&v[..], b"!"].concat()))));
    let (keys, values) = to_kv_array(limit_kv(tagged, 2)).unwrap();
    assert_eq!(keys, [&b"1"[..], b"3"]);
    assert_eq!(values, [&b"h!"[..], b"h!"]);

    let failing = transform_kv(tx.range(Headers::NAME, None, None).unwrap(), |(k, v)| {
        if &k[..] == b"3" { Err(KvError::Cancelled) } else { Ok((k, v)) }
    });
    let drained = to_kv_array(failing).unwrap_err();
    assert_eq!(drained.collected.0.len(), 2);
    assert!(drained.source.is_cancelled());
}
