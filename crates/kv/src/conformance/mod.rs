//! Every engine must pass these tests. Each test opens a [`Database`] over
//! the engine with its own tables, so tests can share one engine.

mod cursor;
mod dup_sort;
mod lifecycle;
mod range;
mod tables;
mod temporal;

pub use cursor::*;
pub use dup_sort::*;
pub use lifecycle::*;
pub use range::*;
pub use tables::*;
pub use temporal::*;

use crate::{
    db::Database,
    model::KvEngine,
    tables::{TableCfg, TableCfgItem},
};
use tokio_util::sync::CancellationToken;

/// Run all conformance tests against a [`KvEngine`] implementation.
pub fn conformance<E: KvEngine>(engine: &E) {
    test_cursor_navigation(engine);
    test_cursor_mutation(engine);
    test_dup_sort_navigation(engine);
    test_dup_sort_mutation(engine);
    test_direct_writes(engine);
    test_auto_conversion(engine);
    test_auto_conversion_seek_both_range(engine);
    test_key_length_conflict(engine);
    test_range_streams(engine);
    test_range_streams_converted(engine);
    test_buckets(engine);
    test_sequences(engine);
    test_transaction_lifecycle(engine);
    test_snapshot_isolation(engine);
    test_temporal_reads(engine);
}

/// Open a database over `engine` with the given extra tables.
pub(crate) fn open<'a, E: KvEngine>(
    engine: &'a E,
    tables: &[(&str, TableCfgItem)],
) -> Database<&'a E> {
    let cfg = tables
        .iter()
        .fold(TableCfg::new(), |cfg, (name, item)| cfg.with_table(*name, *item));
    Database::open(engine, cfg).unwrap()
}

/// A token that never fires.
pub(crate) fn token() -> CancellationToken {
    CancellationToken::new()
}
