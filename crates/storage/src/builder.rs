//! Storage builder for programmatic and environment-based configuration.
//!
//! The builder opens a [`Database`] over the selected engine with a table
//! catalog, a diagnostic span and the [`ExperimentConfig`] applied.
//!
//! # Examples
//!
//! ## From Environment
//!
//! ```ignore
//! use strata_storage::builder::StorageBuilder;
//! use std::env;
//!
//! env::set_var("STRATA_ENGINE", "mdbx");
//! env::set_var("STRATA_DB_PATH", "/tmp/chaindata");
//!
//! let storage = StorageBuilder::from_env()?.build()?;
//! ```
//!
//! ## Programmatic
//!
//! ```
//! use strata_storage::builder::{EngineKind, StorageBuilder, StorageInstance};
//! use strata_kv::tables::chaindata_tables_cfg;
//!
//! let storage = StorageBuilder::new()
//!     .engine(EngineKind::Mem)
//!     .tables(chaindata_tables_cfg())
//!     .build()?;
//!
//! match storage {
//!     StorageInstance::Mem(db) => assert!(!db.is_read_only()),
//!     #[cfg(feature = "mdbx")]
//!     StorageInstance::Mdbx(_) => unreachable!(),
//! }
//! # Ok::<_, strata_storage::StorageError>(())
//! ```

use crate::{
    StorageError, StorageResult,
    config::{ConfigError, ExperimentConfig},
};
use std::{env, fmt, path::PathBuf, str::FromStr};
use strata_kv::{
    Database, DatabaseBuilder, KvEngine,
    mem::MemKv,
    tables::{TableCfg, default_tables_cfg},
};
use tracing::{Span, info};

/// Environment variable name for engine selection.
pub const ENV_ENGINE: &str = "STRATA_ENGINE";

/// Environment variable name for the database path.
pub const ENV_DB_PATH: &str = "STRATA_DB_PATH";

/// Storage engine selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineKind {
    /// In-memory engine. Contents are lost when the database is dropped.
    Mem,
    /// MDBX engine at a path on disk.
    Mdbx,
}

impl EngineKind {
    /// Load the engine kind from the `STRATA_ENGINE` environment variable.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingEnvVar`] if the environment variable is
    /// not set, or [`ConfigError::InvalidEngine`] if the value cannot be
    /// parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        let value = env::var(ENV_ENGINE).map_err(|_| ConfigError::MissingEnvVar(ENV_ENGINE))?;
        value.parse()
    }

    /// Returns `true` if the engine stores data on disk.
    pub const fn needs_path(&self) -> bool {
        matches!(self, Self::Mdbx)
    }
}

impl FromStr for EngineKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mem" => Ok(Self::Mem),
            "mdbx" => Ok(Self::Mdbx),
            _ => Err(ConfigError::InvalidEngine(s.to_owned())),
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mem => write!(f, "mem"),
            Self::Mdbx => write!(f, "mdbx"),
        }
    }
}

/// Storage instance returned by the builder.
///
/// Each variant holds a [`Database`] over its engine, so callers match once
/// and then work with a concrete type.
#[derive(Debug)]
pub enum StorageInstance {
    /// Database over the in-memory engine.
    Mem(Database<MemKv>),
    /// Database over an MDBX environment.
    #[cfg(feature = "mdbx")]
    Mdbx(Database<strata_kv_mdbx::DatabaseEnv>),
}

impl StorageInstance {
    /// The engine behind this instance.
    pub const fn engine_kind(&self) -> EngineKind {
        match self {
            Self::Mem(_) => EngineKind::Mem,
            #[cfg(feature = "mdbx")]
            Self::Mdbx(_) => EngineKind::Mdbx,
        }
    }

    /// Get a reference to the in-memory database, if that is the engine.
    pub const fn as_mem(&self) -> Option<&Database<MemKv>> {
        match self {
            Self::Mem(db) => Some(db),
            #[cfg(feature = "mdbx")]
            Self::Mdbx(_) => None,
        }
    }

    /// Get a reference to the MDBX database, if that is the engine.
    #[cfg(feature = "mdbx")]
    pub const fn as_mdbx(&self) -> Option<&Database<strata_kv_mdbx::DatabaseEnv>> {
        match self {
            Self::Mdbx(db) => Some(db),
            Self::Mem(_) => None,
        }
    }

    /// Close the database, blocking until open transactions end.
    pub fn close(&self) {
        match self {
            Self::Mem(db) => db.close(),
            #[cfg(feature = "mdbx")]
            Self::Mdbx(db) => db.close(),
        }
    }
}

/// Builder for storage configuration.
///
/// Supports both programmatic configuration and automatic loading from
/// environment variables. Use [`from_env`](Self::from_env) to load from
/// environment or [`new`](Self::new) for programmatic configuration.
#[derive(Debug)]
pub struct StorageBuilder {
    engine: Option<EngineKind>,
    path: Option<PathBuf>,
    tables: Option<TableCfg>,
    span: Span,
    read_only: bool,
    config: ExperimentConfig,
    #[cfg(feature = "mdbx")]
    db_args: Option<strata_kv_mdbx::DatabaseArguments>,
}

impl Default for StorageBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageBuilder {
    /// Create a new storage builder.
    ///
    /// Use the setter methods to configure the builder, then call
    /// [`build`](Self::build) to instantiate storage.
    pub fn new() -> Self {
        Self {
            engine: None,
            path: None,
            tables: None,
            span: Span::none(),
            read_only: false,
            config: ExperimentConfig::default(),
            #[cfg(feature = "mdbx")]
            db_args: None,
        }
    }

    /// Create a builder from environment variables.
    ///
    /// Reads configuration from:
    /// - `STRATA_ENGINE`: Engine selection
    /// - `STRATA_DB_PATH`: Database path (required for `mdbx`)
    /// - the experiment variables read by [`ExperimentConfig::from_env`]
    ///
    /// # Errors
    ///
    /// Returns an error if required environment variables are missing or
    /// invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        let engine = EngineKind::from_env()?;
        let mut builder = Self::new().engine(engine).config(ExperimentConfig::from_env()?);

        match env::var(ENV_DB_PATH) {
            Ok(path) => builder = builder.path(path),
            Err(_) if engine.needs_path() => {
                return Err(ConfigError::MissingPath { engine, env_var: ENV_DB_PATH });
            }
            Err(_) => {}
        }

        Ok(builder)
    }

    /// Set the storage engine.
    #[must_use]
    pub const fn engine(mut self, engine: EngineKind) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Set the database path.
    #[must_use]
    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Set the table catalog. Defaults to [`default_tables_cfg`].
    #[must_use]
    pub fn tables(mut self, tables: TableCfg) -> Self {
        self.tables = Some(tables);
        self
    }

    /// Set the span the database emits diagnostics under.
    #[must_use]
    pub fn span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Open read-only.
    #[must_use]
    pub const fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    /// Set the experiment configuration.
    #[must_use]
    pub fn config(mut self, config: ExperimentConfig) -> Self {
        self.config = config;
        self
    }

    /// Set base database arguments for MDBX. The experiment configuration
    /// is applied on top.
    ///
    /// If not set, default arguments are used.
    #[cfg(feature = "mdbx")]
    #[must_use]
    pub fn database_arguments(mut self, args: strata_kv_mdbx::DatabaseArguments) -> Self {
        self.db_args = Some(args);
        self
    }

    /// Build the storage instance.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Required configuration is missing
    /// - The engine was not compiled in
    /// - Engine initialization or table creation fails
    pub fn build(self) -> StorageResult<StorageInstance> {
        let engine = self
            .engine
            .ok_or_else(|| StorageError::Config("storage engine not configured".to_owned()))?;

        info!(
            target: "strata::storage",
            %engine,
            path = ?self.path,
            read_only = self.read_only,
            "opening storage"
        );

        match engine {
            EngineKind::Mem => {
                let db = self.database(MemKv::new())?;
                Ok(StorageInstance::Mem(db))
            }
            EngineKind::Mdbx => self.build_mdbx(),
        }
    }

    #[cfg(feature = "mdbx")]
    fn build_mdbx(mut self) -> StorageResult<StorageInstance> {
        let path = self.path.take().ok_or_else(|| {
            StorageError::Config("database path not configured for mdbx engine".to_owned())
        })?;
        let args = self.config.mdbx_arguments(self.db_args.take().unwrap_or_default());

        let env = if self.read_only {
            args.open_ro(&path)?
        } else {
            std::fs::create_dir_all(&path)?;
            args.open_rw(&path)?
        };
        Ok(StorageInstance::Mdbx(self.database(env)?))
    }

    #[cfg(not(feature = "mdbx"))]
    fn build_mdbx(self) -> StorageResult<StorageInstance> {
        Err(StorageError::Config("built without the `mdbx` feature".to_owned()))
    }

    fn database<E: KvEngine>(self, engine: E) -> StorageResult<Database<E>> {
        let mut builder = DatabaseBuilder::new(engine)
            .with_tables(self.tables.unwrap_or_else(default_tables_cfg))
            .with_options(self.config.db_options())
            .with_span(self.span);
        if self.read_only {
            builder = builder.read_only();
        }
        Ok(builder.open()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ENV_SLOW_TX;
    use serial_test::serial;
    use std::time::Duration;

    #[test]
    fn parse_engine_kind() {
        assert_eq!("mem".parse::<EngineKind>().unwrap(), EngineKind::Mem);
        assert_eq!("mdbx".parse::<EngineKind>().unwrap(), EngineKind::Mdbx);
        assert!("MDBX".parse::<EngineKind>().is_err());
        assert!("".parse::<EngineKind>().is_err());
        assert_eq!(EngineKind::Mdbx.to_string(), "mdbx");
    }

    #[test]
    fn builder_requires_engine() {
        let result = StorageBuilder::new().build();
        assert!(matches!(result, Err(StorageError::Config(_))));
    }

    #[test]
    fn builds_mem_with_options() {
        let config =
            ExperimentConfig { slow_tx: Some(Duration::from_secs(3)), ..Default::default() };
        let storage = StorageBuilder::new().engine(EngineKind::Mem).config(config).build().unwrap();
        let db = storage.as_mem().unwrap();
        assert_eq!(db.options().slow_tx, Some(Duration::from_secs(3)));
        assert_eq!(storage.engine_kind(), EngineKind::Mem);
        storage.close();
        assert!(db.is_closed());
    }

    #[test]
    fn read_only_mem_refuses_writers() {
        let storage = StorageBuilder::new().engine(EngineKind::Mem).read_only().build().unwrap();
        let db = storage.as_mem().unwrap();
        let err = db.begin_rw(&tokio_util::sync::CancellationToken::new()).unwrap_err();
        assert!(matches!(err, strata_kv::KvError::ReadOnly));
    }

    #[test]
    #[serial]
    fn from_env_missing_engine() {
        // SAFETY: env-var tests run serially
        unsafe {
            env::remove_var(ENV_ENGINE);
        }
        assert!(matches!(StorageBuilder::from_env(), Err(ConfigError::MissingEnvVar(ENV_ENGINE))));
    }

    #[test]
    #[serial]
    fn from_env_mdbx_requires_path() {
        // SAFETY: env-var tests run serially
        unsafe {
            env::set_var(ENV_ENGINE, "mdbx");
            env::remove_var(ENV_DB_PATH);
        }
        let result = StorageBuilder::from_env();
        assert!(matches!(result, Err(ConfigError::MissingPath { engine: EngineKind::Mdbx, .. })));

        // SAFETY: env-var tests run serially
        unsafe {
            env::remove_var(ENV_ENGINE);
        }
    }

    #[test]
    #[serial]
    fn from_env_mem_with_config() {
        // SAFETY: env-var tests run serially
        unsafe {
            env::set_var(ENV_ENGINE, "mem");
            env::set_var(ENV_DB_PATH, "/tmp/strata");
            env::set_var(ENV_SLOW_TX, "250ms");
        }

        let builder = StorageBuilder::from_env().unwrap();
        assert_eq!(builder.engine, Some(EngineKind::Mem));
        assert_eq!(builder.path, Some(PathBuf::from("/tmp/strata")));
        assert_eq!(builder.config.slow_tx, Some(Duration::from_millis(250)));

        // SAFETY: env-var tests run serially
        unsafe {
            env::remove_var(ENV_ENGINE);
            env::remove_var(ENV_DB_PATH);
            env::remove_var(ENV_SLOW_TX);
        }
    }

    #[test]
    #[serial]
    fn from_env_invalid_config() {
        // SAFETY: env-var tests run serially
        unsafe {
            env::set_var(ENV_ENGINE, "mem");
            env::set_var(ENV_SLOW_TX, "later");
        }
        assert!(matches!(StorageBuilder::from_env(), Err(ConfigError::InvalidValue { .. })));

        // SAFETY: env-var tests run serially
        unsafe {
            env::remove_var(ENV_ENGINE);
            env::remove_var(ENV_SLOW_TX);
        }
    }

    #[cfg(not(feature = "mdbx"))]
    #[test]
    fn mdbx_needs_feature() {
        let result = StorageBuilder::new().engine(EngineKind::Mdbx).path("/tmp/strata").build();
        assert!(matches!(result, Err(StorageError::Config(_))));
    }
}
