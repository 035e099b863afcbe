//! The database handle, transactions and cursors.
//!
//! A [`Database`] wraps a [`KvEngine`] with a table catalog and transaction
//! accounting. Transactions are admitted through [`Database::begin_ro`] and
//! [`Database::begin_rw`], which honor a caller-supplied
//! [`CancellationToken`]. [`Database::close`] refuses new transactions and
//! blocks until every open one has ended.
//!
//! ```
//! # use strata_kv::{db::Database, mem::MemKv, tables::{TableCfg, Headers, Table}};
//! # use tokio_util::sync::CancellationToken;
//! let db = Database::open(MemKv::new(), TableCfg::new().with::<Headers>())?;
//! let cancel = CancellationToken::new();
//!
//! let mut tx = db.begin_rw(&cancel)?;
//! tx.put(Headers::NAME, b"k", b"v")?;
//! tx.commit()?;
//!
//! let tx = db.begin_ro(&cancel)?;
//! assert_eq!(tx.get_one(Headers::NAME, b"k")?.as_deref(), Some(&b"v"[..]));
//! # Ok::<_, strata_kv::model::KvError>(())
//! ```

mod bucket;

mod cursor;
pub use cursor::{Cursor, DupCursor};

mod lifecycle;
pub use lifecycle::TxMode;
use lifecycle::TxTracker;

mod range;
pub use range::RangeStream;

mod sequence;

mod tx;
pub use tx::{RoTx, RwTx, Tx};

use crate::{
    model::{EngineError, EngineRead, EngineWrite, KvEngine, KvError, KvResult},
    tables::{TableCfg, default_tables_cfg},
};
use std::{sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;
use tracing::{Span, debug};

/// Diagnostic thresholds for transactions. Unset thresholds are off.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DbOptions {
    /// Warn when a transaction stays open longer than this.
    pub slow_tx: Option<Duration>,
    /// Warn when a commit takes longer than this.
    pub slow_commit: Option<Duration>,
    /// Report read transactions that read more bytes than this.
    pub big_ro_tx_bytes: Option<u64>,
    /// Report write transactions that write more bytes than this.
    pub big_rw_tx_bytes: Option<u64>,
}

impl DbOptions {
    /// Options with every diagnostic off.
    pub const fn new() -> Self {
        Self { slow_tx: None, slow_commit: None, big_ro_tx_bytes: None, big_rw_tx_bytes: None }
    }

    /// Set the slow transaction threshold.
    #[must_use]
    pub const fn with_slow_tx(mut self, threshold: Duration) -> Self {
        self.slow_tx = Some(threshold);
        self
    }

    /// Set the slow commit threshold.
    #[must_use]
    pub const fn with_slow_commit(mut self, threshold: Duration) -> Self {
        self.slow_commit = Some(threshold);
        self
    }

    /// Set the big read transaction threshold.
    #[must_use]
    pub const fn with_big_ro_tx_bytes(mut self, bytes: u64) -> Self {
        self.big_ro_tx_bytes = Some(bytes);
        self
    }

    /// Set the big write transaction threshold.
    #[must_use]
    pub const fn with_big_rw_tx_bytes(mut self, bytes: u64) -> Self {
        self.big_rw_tx_bytes = Some(bytes);
        self
    }
}

/// State shared by a database and its transactions.
#[derive(Debug)]
pub(crate) struct DbContext {
    pub(crate) tables: TableCfg,
    pub(crate) opts: DbOptions,
    pub(crate) span: Span,
    pub(crate) tracker: Arc<TxTracker>,
}

#[derive(Debug)]
struct DbInner<E> {
    engine: E,
    ctx: Arc<DbContext>,
    read_only: bool,
}

/// A database: an engine, its table catalog and transaction accounting.
///
/// Cloning is cheap and clones share the same state. The handle is safe to
/// use from many threads; transactions are single-owner.
#[derive(Debug)]
pub struct Database<E> {
    inner: Arc<DbInner<E>>,
}

impl<E> Clone for Database<E> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<E: KvEngine> Database<E> {
    /// Open a database over `engine` with the given catalog, creating every
    /// non-deprecated table that does not exist yet.
    pub fn open(engine: E, tables: TableCfg) -> KvResult<Self> {
        DatabaseBuilder::new(engine).with_tables(tables).open()
    }

    /// Start building a database over `engine`.
    pub fn builder(engine: E) -> DatabaseBuilder<E> {
        DatabaseBuilder::new(engine)
    }

    /// The underlying engine.
    pub fn engine(&self) -> &E {
        &self.inner.engine
    }

    /// The table catalog.
    pub fn tables(&self) -> &TableCfg {
        &self.inner.ctx.tables
    }

    /// The diagnostic options.
    pub fn options(&self) -> &DbOptions {
        &self.inner.ctx.opts
    }

    /// Returns `true` if write transactions are refused.
    pub fn is_read_only(&self) -> bool {
        self.inner.read_only
    }

    /// Returns `true` once [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.inner.ctx.tracker.is_closing()
    }

    /// Number of transactions currently open.
    pub fn open_transactions(&self) -> usize {
        self.inner.ctx.tracker.open_count()
    }

    /// Begin a read-only transaction.
    ///
    /// Fails with [`KvError::Cancelled`] if `cancel` has fired, and with
    /// [`KvError::Closed`] if the database is closing.
    pub fn begin_ro(&self, cancel: &CancellationToken) -> KvResult<RoTx<E>> {
        let ticket = self.inner.ctx.tracker.admit(TxMode::Ro, cancel)?;
        let engine_tx = self.inner.engine.reader()?;
        Ok(Tx::new(engine_tx, ticket, Arc::clone(&self.inner.ctx)))
    }

    /// Begin a read-write transaction.
    ///
    /// Only one write transaction is open at a time. This blocks until the
    /// current one ends, returning early with [`KvError::Cancelled`] if
    /// `cancel` fires or [`KvError::Closed`] if the database starts closing.
    pub fn begin_rw(&self, cancel: &CancellationToken) -> KvResult<RwTx<E>> {
        if self.inner.read_only {
            return Err(KvError::ReadOnly);
        }
        let ticket = self.inner.ctx.tracker.admit(TxMode::Rw, cancel)?;
        let engine_tx = self.inner.engine.writer()?;
        Ok(Tx::new(engine_tx, ticket, Arc::clone(&self.inner.ctx)))
    }

    /// Run `f` in a read-only transaction, which is committed afterwards.
    pub fn view<R>(
        &self,
        cancel: &CancellationToken,
        f: impl FnOnce(&RoTx<E>) -> KvResult<R>,
    ) -> KvResult<R> {
        let mut tx = self.begin_ro(cancel)?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }

    /// Run `f` in a read-write transaction. The transaction commits if `f`
    /// succeeds and rolls back otherwise.
    pub fn update<R>(
        &self,
        cancel: &CancellationToken,
        f: impl FnOnce(&RwTx<E>) -> KvResult<R>,
    ) -> KvResult<R> {
        let mut tx = self.begin_rw(cancel)?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }

    /// Close the database.
    ///
    /// New transactions fail with [`KvError::Closed`] from now on. This
    /// blocks until every transaction admitted earlier has committed or
    /// rolled back. Calling it again returns once that holds.
    pub fn close(&self) {
        if self.inner.ctx.tracker.close() {
            debug!(target: "strata::kv", parent: &self.inner.ctx.span, "database closed");
        }
    }

    fn create_tables(&self) -> KvResult<()> {
        let mut tx = self.begin_rw(&CancellationToken::new())?;
        for (name, item) in self.tables().iter().filter(|(_, item)| !item.is_deprecated) {
            let engine = tx.engine()?;
            if !engine.table_exists(name).map_err(EngineError::into_kv_error)? {
                engine.create_table(name, item.flags).map_err(EngineError::into_kv_error)?;
                debug!(target: "strata::kv", parent: &self.inner.ctx.span, table = name, "created table");
            }
        }
        tx.commit()
    }
}

/// Builder for a [`Database`].
#[derive(Debug)]
pub struct DatabaseBuilder<E> {
    engine: E,
    tables: Option<TableCfg>,
    opts: DbOptions,
    span: Span,
    read_only: bool,
}

impl<E: KvEngine> DatabaseBuilder<E> {
    /// Create a new builder over `engine`.
    pub fn new(engine: E) -> Self {
        Self { engine, tables: None, opts: DbOptions::new(), span: Span::none(), read_only: false }
    }

    /// Set the table catalog. Defaults to [`default_tables_cfg`].
    #[must_use]
    pub fn with_tables(mut self, tables: TableCfg) -> Self {
        self.tables = Some(tables);
        self
    }

    /// Set the diagnostic options.
    #[must_use]
    pub const fn with_options(mut self, opts: DbOptions) -> Self {
        self.opts = opts;
        self
    }

    /// Set the span diagnostics are emitted under. Defaults to
    /// [`Span::none`], which discards them.
    #[must_use]
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Open read-only. Write transactions fail with [`KvError::ReadOnly`]
    /// and no tables are created.
    #[must_use]
    pub const fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    /// Open the database.
    pub fn open(self) -> KvResult<Database<E>> {
        let ctx = DbContext {
            tables: self.tables.unwrap_or_else(default_tables_cfg),
            opts: self.opts,
            span: self.span,
            tracker: Arc::default(),
        };
        let db = Database {
            inner: Arc::new(DbInner {
                engine: self.engine,
                ctx: Arc::new(ctx),
                read_only: self.read_only,
            }),
        };
        if !db.inner.read_only {
            db.create_tables()?;
        }
        debug!(
            target: "strata::kv",
            parent: &db.inner.ctx.span,
            tables = db.tables().len(),
            read_only = db.inner.read_only,
            "database opened"
        );
        Ok(db)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        mem::MemKv,
        tables::{Clique, Headers, Table},
    };

    #[test]
    fn open_creates_live_tables() {
        let db = Database::open(MemKv::new(), TableCfg::new().with::<Headers>().with::<Clique>())
            .unwrap();
        let tx = db.begin_ro(&CancellationToken::new()).unwrap();
        assert!(tx.exists_bucket(Headers::NAME).unwrap());
        assert!(!tx.exists_bucket(Clique::NAME).unwrap());
    }

    #[test]
    fn read_only_refuses_writers() {
        let engine = MemKv::new();
        Database::open(engine.clone(), TableCfg::new()).unwrap();

        let db = Database::builder(engine).with_tables(TableCfg::new()).read_only().open().unwrap();
        assert!(matches!(db.begin_rw(&CancellationToken::new()), Err(KvError::ReadOnly)));
        assert!(db.begin_ro(&CancellationToken::new()).is_ok());
    }

    #[test]
    fn update_rolls_back_on_error() {
        let db = Database::open(MemKv::new(), TableCfg::new().with::<Headers>()).unwrap();
        let cancel = CancellationToken::new();
        let res: KvResult<()> = db.update(&cancel, |tx| {
            tx.put(Headers::NAME, b"k", b"v")?;
            Err(KvError::Cancelled)
        });
        assert!(res.unwrap_err().is_cancelled());
        assert!(!db.view(&cancel, |tx| tx.has(Headers::NAME, b"k")).unwrap());
    }

    #[test]
    fn begin_after_close() {
        let db = Database::open(MemKv::new(), TableCfg::new()).unwrap();
        db.close();
        db.close();
        assert!(db.is_closed());
        let err = db.begin_ro(&CancellationToken::new()).unwrap_err();
        assert!(err.to_string().contains("closed"));
        assert!(db.begin_rw(&CancellationToken::new()).unwrap_err().is_closed());
    }
}
