//! Storage configuration and construction for strata.
//!
//! This crate ties the access layer to its runtime settings:
//!
//! - [`ExperimentConfig`] reads the experiment variables of the process
//!   environment once, logs the ones that are set, and converts into the
//!   transaction diagnostics of [`DbOptions`] and, with the `mdbx` feature,
//!   into MDBX environment arguments.
//! - [`StorageBuilder`] selects an engine, opens it and wraps it in a
//!   [`Database`] with the table catalog, span and configuration applied.
//!
//! # Example
//!
//! ```
//! use strata_storage::{EngineKind, ExperimentConfig, StorageBuilder};
//!
//! let config = ExperimentConfig::from_lookup(|_| None)?;
//! let storage = StorageBuilder::new().engine(EngineKind::Mem).config(config).build()?;
//! assert_eq!(storage.engine_kind(), EngineKind::Mem);
//! # Ok::<_, Box<dyn std::error::Error>>(())
//! ```
//!
//! # Feature Flags
//!
//! - **`mdbx`**: Enables the MDBX engine through `strata-kv-mdbx`.
//! - **`test-utils`**: Propagates `strata-kv/test-utils`, enabling the
//!   in-memory test constructors and engine conformance tests.

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

mod error;
pub use error::{StorageError, StorageResult};

pub mod config;
pub use config::{ConfigError, ExperimentConfig};

pub mod builder;
pub use builder::{EngineKind, StorageBuilder, StorageInstance};

// Re-export key types for convenience
pub use strata_kv::{Database, DbOptions, KvEngine, KvError, tables::TableCfg};
pub use tokio_util::sync::CancellationToken;

#[cfg(feature = "mdbx")]
pub use strata_kv_mdbx::{DatabaseArguments, DatabaseEnv};
