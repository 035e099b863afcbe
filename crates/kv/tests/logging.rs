//! Transaction diagnostics emitted through `tracing`.

use std::{
    io,
    sync::{Arc, Mutex},
    time::Duration,
};
use strata_kv::{
    Database, DbOptions,
    mem::MemKv,
    tables::{Headers, Table, TableCfg},
};
use tokio_util::sync::CancellationToken;
use tracing::{Level, info_span};

/// A writer that appends to a shared buffer.
#[derive(Clone, Default)]
struct Captured(Arc<Mutex<Vec<u8>>>);

impl Captured {
    fn contents(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

impl io::Write for Captured {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn capture(f: impl FnOnce()) -> String {
    let out = Captured::default();
    let writer = out.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(Level::TRACE)
        .with_writer(move || writer.clone())
        .finish();
    tracing::subscriber::with_default(subscriber, f);
    out.contents()
}

fn db(opts: DbOptions) -> Database<MemKv> {
    Database::builder(MemKv::new())
        .with_tables(TableCfg::new().with::<Headers>())
        .with_options(opts)
        .with_span(info_span!("test_db"))
        .open()
        .unwrap()
}

#[test]
fn slow_and_big_transactions_are_reported() {
    let logs = capture(|| {
        let opts = DbOptions::new()
            .with_slow_tx(Duration::ZERO)
            .with_big_rw_tx_bytes(16)
            .with_big_ro_tx_bytes(16);
        let db = db(opts);
        let cancel = CancellationToken::new();

        let mut tx = db.begin_rw(&cancel).unwrap();
        tx.put(Headers::NAME, b"key", &[0u8; 64]).unwrap();
        tx.commit().unwrap();

        let mut tx = db.begin_ro(&cancel).unwrap();
        tx.get_one(Headers::NAME, b"key").unwrap();
        tx.commit().unwrap();
    });

    assert!(logs.contains("slow transaction"), "{logs}");
    assert!(logs.contains("big write transaction"), "{logs}");
    assert!(logs.contains("big read transaction"), "{logs}");
    assert!(logs.contains("test_db"), "events carry the database span: {logs}");
}

#[test]
fn quiet_without_thresholds() {
    let logs = capture(|| {
        let db = db(DbOptions::new());
        let cancel = CancellationToken::new();
        db.update(&cancel, |tx| tx.put(Headers::NAME, b"key", &[0u8; 64])).unwrap();
        db.close();
    });

    assert!(!logs.contains("slow transaction"));
    assert!(!logs.contains("big write transaction"));
    assert!(logs.contains("transaction ended"));
    assert!(logs.contains("database closed"));
}
