//! Temporal read tests.

use super::token;
use crate::{
    db::Database,
    iter::{Order, to_array, to_kv_array},
    model::{KvEngine, KvError},
    tables::TableCfg,
    temporal::{Domain, InvertedIdx, TemporalRwTx, TemporalTx},
};

const STATE: Domain = Domain("ConfStorage");
const TRACES: InvertedIdx = InvertedIdx("ConfTraces");

/// Test as-of reads and ranges over a domain and an inverted index.
pub fn test_temporal_reads<E: KvEngine>(engine: &E) {
    let cfg = TableCfg::new().with_domain(STATE).with_inverted_index(TRACES);
    let db = Database::open(engine, cfg).unwrap();
    let addr = [0x0a; 20];

    db.update(&token(), |tx| {
        tx.domain_put(STATE, &addr, b"slot1", b"v1", 100)?;
        tx.domain_put(STATE, &addr, b"slot2", b"w1", 100)?;
        tx.domain_put(STATE, &addr, b"slot1", b"v2", 200)?;
        tx.domain_delete(STATE, &addr, b"slot2", 300)?;
        for ts in [5, 10, 15] {
            tx.index_add(TRACES, &addr, ts)?;
        }
        Ok(())
    })
    .unwrap();

    let tx = db.begin_ro(&token()).unwrap();
    let get = |k2: &[u8], ts| tx.domain_get_as_of(STATE, &addr, k2, ts).unwrap().map(|v| v.to_vec());

    assert_eq!(tx.domain_get(STATE, &addr, b"slot1").unwrap().as_deref(), Some(&b"v2"[..]));
    assert_eq!(tx.domain_get(STATE, &addr, b"slot2").unwrap(), None);
    assert_eq!(get(b"slot1", 99), None, "nothing before the first write");
    assert_eq!(get(b"slot1", 100), Some(b"v1".to_vec()), "writes at ts are visible");
    assert_eq!(get(b"slot1", 199), Some(b"v1".to_vec()));
    assert_eq!(get(b"slot1", 200), Some(b"v2".to_vec()));
    assert_eq!(get(b"slot2", 299), Some(b"w1".to_vec()));
    assert_eq!(get(b"slot2", 300), None, "deleted at 300");

    let history = STATE.history();
    let key1 = [&addr[..], b"slot1"].concat();
    let changes = to_array(tx.index_range(history.index(), &key1, -1, -1, Order::Asc, -1).unwrap());
    assert_eq!(changes.unwrap(), [100, 200]);

    let traces = |from, to, order, limit| {
        to_array(tx.index_range(TRACES, &addr, from, to, order, limit).unwrap()).unwrap()
    };
    assert_eq!(traces(-1, -1, Order::Asc, -1), [5, 10, 15]);
    assert_eq!(traces(6, 15, Order::Asc, -1), [10]);
    assert_eq!(traces(15, 5, Order::Desc, -1), [15, 10]);
    assert_eq!(traces(-1, -1, Order::Desc, 2), [15, 10]);
    assert!(traces(16, -1, Order::Asc, -1).is_empty());
    assert!(matches!(
        tx.index_range(TRACES, &addr, 10, 5, Order::Asc, -1),
        Err(KvError::InvalidRange { .. })
    ));

    let (keys, vals) =
        to_kv_array(tx.history_range(history, 150, -1, Order::Asc, -1).unwrap()).unwrap();
    assert_eq!(keys, [key1.clone(), [&addr[..], b"slot2"].concat()]);
    assert_eq!(vals, [&b"v1"[..], b"w1"]);
    let (keys, _) =
        to_kv_array(tx.history_range(history, -1, 150, Order::Desc, 1).unwrap()).unwrap();
    assert_eq!(keys, [[&addr[..], b"slot2"].concat()]);

    let (keys, vals) =
        to_kv_array(tx.domain_range(STATE, Some(&addr), None, 150, Order::Asc, -1).unwrap())
            .unwrap();
    assert_eq!(keys.len(), 2);
    assert_eq!(vals, [&b"v1"[..], b"w1"]);
    let (_, vals) =
        to_kv_array(tx.domain_range(STATE, None, None, 50, Order::Desc, -1).unwrap()).unwrap();
    assert!(vals.is_empty(), "the domain was empty at 50");
}
