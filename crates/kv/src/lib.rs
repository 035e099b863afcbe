//! Transactional key-value access layer.
//!
//! This crate sits on top of an embedded, ordered, transactional key-value
//! engine and adds what the raw engine does not provide:
//!
//! - A transaction lifecycle with single-writer admission, cancellation and
//!   blocking shutdown ([`db::Database`]).
//! - Table-aware cursors, including automatic key/value conversion for
//!   dup-sort tables ([`db::Cursor`], [`codec`]).
//! - A lazy, fallible stream algebra for combining sorted scans ([`iter`]).
//! - Versioned reads over domains, histories and inverted indices
//!   ([`temporal`]).
//!
//! # Quick Start
//!
//! ```
//! use strata_kv::{
//!     db::Database,
//!     mem::MemKv,
//!     tables::{PlainState, Table, chaindata_tables_cfg},
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! let db = Database::open(MemKv::new(), chaindata_tables_cfg())?;
//! let cancel = CancellationToken::new();
//!
//! // Write operations
//! let mut tx = db.begin_rw(&cancel)?;
//! tx.put(PlainState::NAME, &[0xaa; 20], b"account")?;
//! tx.commit()?;
//!
//! // Read operations
//! let tx = db.begin_ro(&cancel)?;
//! let account = tx.get_one(PlainState::NAME, &[0xaa; 20])?;
//! assert_eq!(account.as_deref(), Some(&b"account"[..]));
//! # Ok::<_, strata_kv::KvError>(())
//! ```
//!
//! # Layers
//!
//! ```text
//! KvEngine                   ← Engine seam (MemKv, MDBX)
//!   └─ Database              ← Admission, shutdown, diagnostics
//!        └─ Tx               ← Lifecycle, table catalog, byte accounting
//!             ├─ Cursor      ← Auto-conversion, dup-sort navigation
//!             ├─ RangeStream ← Lazy table scans
//!             └─ TemporalTx  ← As-of reads, history and index ranges
//! ```
//!
//! Engines implement [`KvEngine`] and the raw traits of [`model`]. They know
//! nothing of table configuration. Everything above the seam is shared.
//!
//! # Feature Flags
//!
//! - **`in-memory`**: Enables the [`mem`] module, providing an in-memory
//!   [`KvEngine`] for testing.
//! - **`test-utils`**: Enables the [`conformance`] module with engine
//!   conformance tests, and the [`test_utils`] constructors. Implies
//!   `in-memory`.

#![warn(
    missing_copy_implementations,
    missing_debug_implementations,
    missing_docs,
    unreachable_pub,
    clippy::missing_const_for_fn,
    rustdoc::all
)]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![deny(unused_must_use, rust_2018_idioms)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod codec;

/// Conformance tests for storage engines.
#[cfg(any(test, feature = "test-utils"))]
pub mod conformance;

pub mod db;
pub use db::{Database, DatabaseBuilder, DbOptions};

pub mod iter;

#[cfg(any(test, feature = "in-memory"))]
pub mod mem;

pub mod model;
pub use model::{KvEngine, KvError, KvResult};

/// Predefined tables module.
pub mod tables;

pub mod temporal;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
