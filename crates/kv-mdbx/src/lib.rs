//! MDBX engine for the strata key-value access layer.
//!
//! ## Notes on implementation
//!
//! This crate implements the [`KvEngine`] seam of [`strata_kv`] over MDBX.
//! [`DatabaseEnv`] wraps the MDBX environment and hands out read-only and
//! read-write transactions. [`DatabaseArguments`] configures the
//! environment: geometry, sync mode, write map, readahead, dirty space and
//! the maximum number of readers.
//!
//! The engine stores raw rows only. Table configuration, auto-conversion and
//! transaction accounting live in [`strata_kv::Database`], which owns the
//! environment once opened:
//!
//! ```no_run
//! use strata_kv::{Database, tables::chaindata_tables_cfg};
//! use strata_kv_mdbx::DatabaseArguments;
//!
//! let env = DatabaseArguments::new().open_rw("/tmp/chaindata".as_ref())?;
//! let db = Database::open(env, chaindata_tables_cfg())?;
//! # Ok::<_, Box<dyn std::error::Error>>(())
//! ```
//!
//! ### Table flags
//!
//! MDBX stores the flags of each named table itself. [`TableFlags`] bits are
//! mapped one to one onto MDBX database flags when a table is created, so an
//! environment written by this crate can be read by other MDBX tooling.
//!
//! [`TableFlags`]: strata_kv::tables::TableFlags

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

use signet_libmdbx::{
    Environment, EnvironmentFlags, Geometry, Mode, Ro, RoSync, Rw, RwSync, ffi,
    sys::{HandleSlowReadersReturnCode, PageSize},
};
pub use signet_libmdbx::SyncMode;
use std::{
    ops::{Deref, Range},
    path::Path,
};
use strata_kv::model::{KvEngine, KvError};

mod cursor;
pub use cursor::{Cursor, CursorRo, CursorRoSync, CursorRw, CursorRwSync};

mod error;
pub use error::MdbxError;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

mod tx;
pub use tx::Tx;

/// Bytes in a kibibyte.
pub const KILOBYTE: usize = 1 << 10;
/// Bytes in a mebibyte.
pub const MEGABYTE: usize = 1 << 20;
/// Bytes in a gibibyte.
pub const GIGABYTE: usize = 1 << 30;
/// Bytes in a tebibyte.
pub const TERABYTE: usize = 1 << 40;

/// Reader slots when none are configured. `MDBX_READERS_LIMIT` is 32767.
const DEFAULT_MAX_READERS: u64 = 32_000;

/// Maximum number of named tables in one environment.
const MAX_TABLES: u64 = 256;

/// Page size assumed when converting dirty space into pages.
const DIRTY_PAGE_SIZE: usize = 4 * KILOBYTE;

/// Retained space above which a lagging reader is reported.
const MAX_SAFE_READER_SPACE: usize = 10 * GIGABYTE;

/// Access mode of an opened environment.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DatabaseEnvKind {
    /// Readers only. Write transactions fail with [`MdbxError::ReadOnlyEnv`].
    RO,
    /// Readers and a single writer.
    RW,
}

impl DatabaseEnvKind {
    /// Whether write transactions may be started.
    pub const fn is_rw(&self) -> bool {
        matches!(self, Self::RW)
    }
}

/// Settings applied when an environment is opened.
#[derive(Clone, Debug)]
pub struct DatabaseArguments {
    /// Size bounds, growth step and page size.
    geometry: Geometry<Range<usize>>,

    /// Exclusive mode fails with `MDBX_BUSY` when another process holds the
    /// environment. Fixed once the environment is open.
    exclusive: Option<bool>,
    /// Reader slots. Defaults to [`DEFAULT_MAX_READERS`].
    max_readers: Option<u64>,
    /// Synchronization strategy used when committing.
    ///
    /// - [`SyncMode::Durable`]: every commit is flushed to disk before it is
    ///   reported as committed.
    /// - [`SyncMode::SafeNoSync`]: skips fsync on commit. Integrity is kept,
    ///   but the most recent commits may be lost on a system crash.
    sync_mode: SyncMode,
    /// Map the data file writable. Only applies to read-write environments.
    write_map: bool,
    /// OS readahead on the data file.
    readahead: bool,
    /// Upper bound on the dirty pages a write transaction may hold, in bytes.
    dirty_space: Option<usize>,
}

impl Default for DatabaseArguments {
    fn default() -> Self {
        Self::new()
    }
}

impl DatabaseArguments {
    /// Create new database arguments with the default geometry, durable sync,
    /// write map enabled and readahead disabled.
    pub const fn new() -> Self {
        Self {
            geometry: Geometry {
                size: Some(0..(8 * TERABYTE)),
                growth_step: Some(4 * GIGABYTE as isize),
                shrink_threshold: Some(0),
                page_size: None,
            },
            exclusive: None,
            max_readers: None,
            sync_mode: SyncMode::Durable,
            write_map: true,
            readahead: false,
            dirty_space: None,
        }
    }

    /// Cap the data file at `max_size` bytes.
    pub const fn with_geometry_max_size(mut self, max_size: Option<usize>) -> Self {
        if let Some(max_size) = max_size {
            self.geometry.size = Some(0..max_size);
        }
        self
    }

    /// Use a fixed page size instead of the MDBX default.
    pub const fn with_geometry_page_size(mut self, page_size: Option<usize>) -> Self {
        if let Some(size) = page_size {
            self.geometry.page_size = Some(PageSize::Set(size));
        }
        self
    }

    /// Choose how commits reach the disk.
    pub const fn with_sync_mode(mut self, sync_mode: Option<SyncMode>) -> Self {
        if let Some(sync_mode) = sync_mode {
            self.sync_mode = sync_mode;
        }
        self
    }

    /// Grow the data file by `growth_step` bytes at a time.
    pub const fn with_growth_step(mut self, growth_step: Option<usize>) -> Self {
        if let Some(growth_step) = growth_step {
            self.geometry.growth_step = Some(growth_step as isize);
        }
        self
    }

    /// Open in exclusive mode. [`None`] keeps the MDBX default.
    pub const fn with_exclusive(mut self, exclusive: Option<bool>) -> Self {
        self.exclusive = exclusive;
        self
    }

    /// Override the number of reader slots.
    pub const fn with_max_readers(mut self, max_readers: Option<u64>) -> Self {
        self.max_readers = max_readers;
        self
    }

    /// Enable or disable the writable memory map.
    pub const fn with_write_map(mut self, write_map: bool) -> Self {
        self.write_map = write_map;
        self
    }

    /// Enable or disable OS readahead.
    pub const fn with_readahead(mut self, readahead: bool) -> Self {
        self.readahead = readahead;
        self
    }

    /// Limit the dirty space of a write transaction, in bytes.
    pub const fn with_dirty_space(mut self, dirty_space: Option<usize>) -> Self {
        self.dirty_space = dirty_space;
        self
    }

    /// Returns the configured sync mode.
    pub const fn sync_mode(&self) -> SyncMode {
        self.sync_mode
    }

    /// Returns `true` if the write map is enabled.
    pub const fn write_map(&self) -> bool {
        self.write_map
    }

    /// Returns `true` if OS readahead is enabled.
    pub const fn readahead(&self) -> bool {
        self.readahead
    }

    /// Returns the dirty space limit in bytes, if any.
    pub const fn dirty_space(&self) -> Option<usize> {
        self.dirty_space
    }

    /// Open the environment at `path` for reading only.
    pub fn open_ro(self, path: &Path) -> Result<DatabaseEnv, MdbxError> {
        DatabaseEnv::open(path, DatabaseEnvKind::RO, self)
    }

    /// Open the environment at `path` for reading and writing.
    pub fn open_rw(self, path: &Path) -> Result<DatabaseEnv, MdbxError> {
        DatabaseEnv::open(path, DatabaseEnvKind::RW, self)
    }
}

/// Whether a reader slot belongs to this process or the one that spawned it.
fn is_own_reader(pid: u32) -> bool {
    if pid == std::process::id() {
        return true;
    }
    #[cfg(unix)]
    if pid == std::os::unix::process::parent_id() {
        return true;
    }
    false
}

#[allow(clippy::too_many_arguments)]
extern "C" fn handle_slow_readers(
    _env: *const ffi::MDBX_env,
    _txn: *const ffi::MDBX_txn,
    process_id: ffi::mdbx_pid_t,
    thread_id: ffi::mdbx_tid_t,
    read_txn_id: u64,
    gap: std::ffi::c_uint,
    space: usize,
    retry: std::ffi::c_int,
) -> HandleSlowReadersReturnCode {
    if space > MAX_SAFE_READER_SPACE {
        let message = if is_own_reader(process_id as u32) {
            "lagging reader in this process is holding back page reuse"
        } else {
            "lagging reader in another process is holding back page reuse"
        };
        tracing::warn!(
            target: "strata::kv::mdbx",
            ?process_id,
            ?thread_id,
            read_txn_id,
            gap,
            space,
            retry,
            "{message}"
        )
    }

    HandleSlowReadersReturnCode::ProceedWithoutKillingReader
}

/// An open MDBX environment, usable as a [`KvEngine`].
#[derive(Debug)]
pub struct DatabaseEnv {
    /// The native environment.
    inner: Environment,
    /// The mode the environment was opened in.
    kind: DatabaseEnvKind,
}

impl DatabaseEnv {
    /// Open the environment at `path` in the given mode.
    pub fn open(
        path: &Path,
        kind: DatabaseEnvKind,
        args: DatabaseArguments,
    ) -> Result<Self, MdbxError> {
        let mut builder = Environment::builder();

        let mode = match kind {
            DatabaseEnvKind::RO => Mode::ReadOnly,
            DatabaseEnvKind::RW => {
                if args.write_map {
                    builder.write_map();
                }
                Mode::ReadWrite { sync_mode: args.sync_mode }
            }
        };

        builder.set_max_dbs(MAX_TABLES as usize);
        builder.set_geometry(args.geometry);
        builder.set_handle_slow_readers(handle_slow_readers);
        builder.set_flags(EnvironmentFlags {
            mode,
            no_rdahead: !args.readahead,
            coalesce: true,
            exclusive: args.exclusive.unwrap_or_default(),
            ..Default::default()
        });
        builder.set_max_readers(args.max_readers.unwrap_or(DEFAULT_MAX_READERS));
        // Bound the freelist search before allocating pages at the end of the
        // file.
        builder.set_rp_augment_limit(256 * 1024);
        if let Some(dirty_space) = args.dirty_space {
            builder.set_txn_dp_limit((dirty_space / DIRTY_PAGE_SIZE).max(1) as u64);
        }

        let inner = builder.open(path)?;
        tracing::debug!(
            target: "strata::kv::mdbx",
            path = %path.display(),
            ?kind,
            write_map = args.write_map,
            readahead = args.readahead,
            "opened mdbx environment"
        );

        Ok(Self { inner, kind })
    }

    /// Returns the mode the environment was opened in.
    pub const fn kind(&self) -> DatabaseEnvKind {
        self.kind
    }

    /// Begin a read transaction bound to the calling thread.
    pub fn tx(&self) -> Result<Tx<Ro>, MdbxError> {
        self.inner.begin_ro_unsync().map(Tx::new).map_err(MdbxError::Mdbx)
    }

    /// Begin a write transaction bound to the calling thread.
    pub fn tx_rw(&self) -> Result<Tx<Rw>, MdbxError> {
        if !self.kind.is_rw() {
            return Err(MdbxError::ReadOnlyEnv);
        }
        self.inner.begin_rw_unsync().map(Tx::new).map_err(MdbxError::Mdbx)
    }

    /// Begin a read transaction that may move between threads.
    pub fn tx_sync(&self) -> Result<Tx<RoSync>, MdbxError> {
        self.inner.begin_ro_sync().map(Tx::new).map_err(MdbxError::Mdbx)
    }

    /// Begin a write transaction that may move between threads.
    pub fn tx_rw_sync(&self) -> Result<Tx<RwSync>, MdbxError> {
        if !self.kind.is_rw() {
            return Err(MdbxError::ReadOnlyEnv);
        }
        self.inner.begin_rw_sync().map(Tx::new).map_err(MdbxError::Mdbx)
    }
}

impl Deref for DatabaseEnv {
    type Target = Environment;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl KvEngine for DatabaseEnv {
    type RoTx = Tx<Ro>;
    type RwTx = Tx<Rw>;

    fn reader(&self) -> Result<Self::RoTx, KvError> {
        self.tx().map_err(KvError::from_err)
    }

    fn writer(&self) -> Result<Self::RwTx, KvError> {
        self.tx_rw().map_err(KvError::from_err)
    }
}
