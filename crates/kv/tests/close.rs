//! Shutdown and admission behavior of [`Database`] across threads.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::{Duration, Instant},
};
use strata_kv::{
    Database, KvError,
    db::TxMode,
    mem::MemKv,
    tables::{Headers, Table, TableCfg},
    test_utils::new_test_db,
};
use tokio_util::sync::CancellationToken;

const SETTLE: Duration = Duration::from_millis(20);

fn db() -> Database<MemKv> {
    Database::open(MemKv::new(), TableCfg::new().with::<Headers>()).unwrap()
}

/// Spawn `close` on another thread, returning a flag set once it returns.
fn close_in_background(db: &Database<MemKv>) -> (Arc<AtomicBool>, thread::JoinHandle<()>) {
    let done = Arc::new(AtomicBool::new(false));
    let handle = {
        let db = db.clone();
        let done = Arc::clone(&done);
        thread::spawn(move || {
            db.close();
            done.store(true, Ordering::SeqCst);
        })
    };
    (done, handle)
}

fn wait_for_closing(db: &Database<MemKv>) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !db.is_closed() {
        assert!(Instant::now() < deadline, "close never started");
        thread::sleep(Duration::from_millis(1));
    }
}

#[test]
fn close_waits_for_one_reader() {
    let db = db();
    let cancel = CancellationToken::new();
    let mut tx = db.begin_ro(&cancel).unwrap();

    let (done, handle) = close_in_background(&db);
    wait_for_closing(&db);
    thread::sleep(SETTLE);
    assert!(!done.load(Ordering::SeqCst), "close returned with a reader open");

    tx.commit().unwrap();
    handle.join().unwrap();
    assert!(done.load(Ordering::SeqCst));
}

#[test]
fn close_waits_for_every_reader() {
    let db = db();
    let cancel = CancellationToken::new();
    let mut readers: Vec<_> = (0..3).map(|_| db.begin_ro(&cancel).unwrap()).collect();

    let (done, handle) = close_in_background(&db);
    wait_for_closing(&db);

    // End the readers one by one, alternating commit and rollback.
    while let Some(mut tx) = readers.pop() {
        thread::sleep(SETTLE);
        assert!(!done.load(Ordering::SeqCst), "close returned with {} readers open", readers.len() + 1);
        if readers.len() % 2 == 0 {
            tx.rollback();
        } else {
            tx.commit().unwrap();
        }
    }
    handle.join().unwrap();
    assert_eq!(db.open_transactions(), 0);
}

#[test]
fn close_waits_for_writer() {
    let db = db();
    let cancel = CancellationToken::new();
    let mut tx = db.begin_rw(&cancel).unwrap();
    tx.put(Headers::NAME, b"k", b"v").unwrap();

    let (done, handle) = close_in_background(&db);
    wait_for_closing(&db);
    thread::sleep(SETTLE);
    assert!(!done.load(Ordering::SeqCst));

    // The open writer keeps working while the database closes.
    tx.put(Headers::NAME, b"k2", b"v2").unwrap();
    tx.commit().unwrap();
    handle.join().unwrap();

    assert!(matches!(db.begin_ro(&cancel), Err(KvError::Closed)));
    assert!(db.begin_rw(&cancel).unwrap_err().is_closed());
}

#[test]
fn dropped_transactions_release_close() {
    let db = new_test_db();
    let tx = db.begin_ro(&CancellationToken::new()).unwrap();

    let (done, handle) = close_in_background(&db);
    wait_for_closing(&db);
    thread::sleep(SETTLE);
    assert!(!done.load(Ordering::SeqCst));

    drop(tx);
    handle.join().unwrap();
}

#[test]
fn writers_are_serialized() {
    let db = db();
    let cancel = CancellationToken::new();
    let mut first = db.begin_rw(&cancel).unwrap();
    first.put(Headers::NAME, b"k", b"first").unwrap();

    let second = {
        let db = db.clone();
        thread::spawn(move || {
            let mut tx = db.begin_rw(&CancellationToken::new())?;
            let seen = tx.get_one(Headers::NAME, b"k")?;
            tx.put(Headers::NAME, b"k", b"second")?;
            tx.commit()?;
            Ok::<_, KvError>(seen)
        })
    };

    thread::sleep(SETTLE);
    assert!(!second.is_finished(), "second writer admitted while the first is open");
    first.commit().unwrap();

    let seen = second.join().unwrap().unwrap();
    assert_eq!(seen.as_deref(), Some(&b"first"[..]), "second writer sees the first commit");
    let value = db.view(&cancel, |tx| tx.get_one(Headers::NAME, b"k")).unwrap();
    assert_eq!(value.as_deref(), Some(&b"second"[..]));
}

#[test]
fn blocked_writer_is_cancelled() {
    let db = db();
    let first = db.begin_rw(&CancellationToken::new()).unwrap();
    assert_eq!(first.mode(), TxMode::Rw);

    let cancel = CancellationToken::new();
    let waiter = {
        let db = db.clone();
        let cancel = cancel.clone();
        thread::spawn(move || db.begin_rw(&cancel).map(drop))
    };
    thread::sleep(SETTLE);
    let start = Instant::now();
    cancel.cancel();

    let err = waiter.join().unwrap().unwrap_err();
    assert!(err.is_cancelled());
    assert!(start.elapsed() < Duration::from_secs(1), "cancellation is prompt");
    assert_eq!(db.open_transactions(), 1);
}

#[test]
fn blocked_writer_is_refused_on_close() {
    let db = db();
    let mut first = db.begin_rw(&CancellationToken::new()).unwrap();

    let waiter = {
        let db = db.clone();
        thread::spawn(move || db.begin_rw(&CancellationToken::new()).map(drop))
    };
    thread::sleep(SETTLE);

    let (_, handle) = close_in_background(&db);
    wait_for_closing(&db);
    assert!(waiter.join().unwrap().unwrap_err().is_closed());

    first.rollback();
    handle.join().unwrap();
}

#[tokio::test]
async fn cancellation_from_async_context() {
    let db = db();
    let first = db.begin_rw(&CancellationToken::new()).unwrap();

    let cancel = CancellationToken::new();
    let waiter = tokio::task::spawn_blocking({
        let db = db.clone();
        let cancel = cancel.clone();
        move || db.begin_rw(&cancel).map(drop)
    });

    tokio::time::sleep(SETTLE).await;
    cancel.cancel();
    assert!(waiter.await.unwrap().unwrap_err().is_cancelled());
    drop(first);

    let mut tx = db.begin_rw(&CancellationToken::new()).unwrap();
    tx.commit().unwrap();
}
