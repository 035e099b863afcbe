//! Experiment configuration read from the environment.
//!
//! Every setting is read once by [`ExperimentConfig::from_env`] and carried
//! as an immutable value afterwards. Settings that are present are logged
//! once under `[Experiment]`.
//!
//! # Environment Variables
//!
//! | Variable | Type | Effect |
//! |----------|------|--------|
//! | `MDBX_DIRTY_SPACE_MB` | integer, MiB | Dirty page limit of MDBX write transactions |
//! | `NO_SYNC` | bool | Skip fsync on commit |
//! | `MERGE_THRESHOLD` | integer, `0..=4` | Merge threshold for background merges |
//! | `WRITE_MAP` | bool | Writable memory map |
//! | `MDBX_READAHEAD` | bool | OS readahead on the data file |
//! | `DISCARD_HISTORY` | bool | Do not keep history |
//! | `DEBUG_BIG_RO_TX_KB` | integer, KiB | Report larger read transactions |
//! | `DEBUG_BIG_RW_TX_KB` | integer, KiB | Report larger write transactions |
//! | `SLOW_COMMIT` | duration | Warn on slower commits |
//! | `SLOW_TX` | duration | Warn on longer-lived transactions |
//! | `STOP_BEFORE_STAGE` | string | Stage to stop before |
//! | `STOP_AFTER_STAGE` | string | Stage to stop after |
//! | `STOP_AFTER_RECONSTITUTE` | bool | Stop after state reconstitution |
//! | `SNAPSHOT_VERSION` | integer, `u8` | Snapshot format version, zero is ignored |
//! | `LOG_HASH_MISMATCH_REASON` | bool | Log why hashes mismatch |
//! | `NO_MEMSTAT` | presence | Disable memory statistics |
//! | `DOWNLOADER_ONLY_BLOCKS` | bool | Download block files only |
//! | `STAGES_ONLY_BLOCKS` | bool | Run block stages only |
//!
//! Booleans are enabled only by the literal value `true`. Durations use
//! unit suffixes such as `250ms`, `2s` or `1m`.
//!
//! # Example
//!
//! ```rust
//! use strata_storage::config::ExperimentConfig;
//!
//! let config = ExperimentConfig::from_lookup(|name| match name {
//!     "SLOW_TX" => Some("2s".to_owned()),
//!     "NO_SYNC" => Some("true".to_owned()),
//!     _ => None,
//! })?;
//! assert!(config.no_sync);
//! assert_eq!(config.db_options().slow_tx, Some(std::time::Duration::from_secs(2)));
//! # Ok::<_, strata_storage::config::ConfigError>(())
//! ```

use crate::builder::EngineKind;
use std::{env, fmt::Display, str::FromStr, time::Duration};
use strata_kv::DbOptions;
use thiserror::Error;
use tracing::info;

/// Dirty space limit of MDBX write transactions, in MiB.
pub const ENV_DIRTY_SPACE_MB: &str = "MDBX_DIRTY_SPACE_MB";
/// Skip fsync on commit.
pub const ENV_NO_SYNC: &str = "NO_SYNC";
/// Merge threshold, `0..=4`.
pub const ENV_MERGE_THRESHOLD: &str = "MERGE_THRESHOLD";
/// Writable memory map.
pub const ENV_WRITE_MAP: &str = "WRITE_MAP";
/// OS readahead.
pub const ENV_MDBX_READAHEAD: &str = "MDBX_READAHEAD";
/// Do not keep history.
pub const ENV_DISCARD_HISTORY: &str = "DISCARD_HISTORY";
/// Big read transaction threshold, in KiB.
pub const ENV_BIG_RO_TX_KB: &str = "DEBUG_BIG_RO_TX_KB";
/// Big write transaction threshold, in KiB.
pub const ENV_BIG_RW_TX_KB: &str = "DEBUG_BIG_RW_TX_KB";
/// Slow commit threshold.
pub const ENV_SLOW_COMMIT: &str = "SLOW_COMMIT";
/// Slow transaction threshold.
pub const ENV_SLOW_TX: &str = "SLOW_TX";
/// Stage to stop before.
pub const ENV_STOP_BEFORE_STAGE: &str = "STOP_BEFORE_STAGE";
/// Stage to stop after.
pub const ENV_STOP_AFTER_STAGE: &str = "STOP_AFTER_STAGE";
/// Stop after state reconstitution.
pub const ENV_STOP_AFTER_RECONSTITUTE: &str = "STOP_AFTER_RECONSTITUTE";
/// Snapshot format version.
pub const ENV_SNAPSHOT_VERSION: &str = "SNAPSHOT_VERSION";
/// Log why hashes mismatch.
pub const ENV_LOG_HASH_MISMATCH_REASON: &str = "LOG_HASH_MISMATCH_REASON";
/// Disable memory statistics when present.
pub const ENV_NO_MEMSTAT: &str = "NO_MEMSTAT";
/// Download block files only.
pub const ENV_DOWNLOADER_ONLY_BLOCKS: &str = "DOWNLOADER_ONLY_BLOCKS";
/// Run block stages only.
pub const ENV_STAGES_ONLY_BLOCKS: &str = "STAGES_ONLY_BLOCKS";

/// Largest accepted merge threshold.
pub const MAX_MERGE_THRESHOLD: u8 = 4;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing environment variable: {0}")]
    MissingEnvVar(&'static str),

    /// Invalid engine name.
    #[error("invalid engine: {0} (expected: mem, mdbx)")]
    InvalidEngine(String),

    /// An environment variable holds a value that does not parse.
    #[error("invalid value for {var}: {value:?} ({reason})")]
    InvalidValue {
        /// The environment variable name.
        var: &'static str,
        /// The rejected value.
        value: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Missing required path for the selected engine.
    #[error("missing required path for engine {engine}: environment variable {env_var} not set")]
    MissingPath {
        /// The engine that requires the path.
        engine: EngineKind,
        /// The environment variable name.
        env_var: &'static str,
    },
}

impl ConfigError {
    fn invalid(var: &'static str, value: &str, reason: impl Display) -> Self {
        Self::InvalidValue { var, value: value.to_owned(), reason: reason.to_string() }
    }
}

/// Experimental settings, read once from the environment.
///
/// Unset variables leave their field at the [`Default`] value. Boolean
/// settings can only be switched on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExperimentConfig {
    /// Dirty space limit of MDBX write transactions, in bytes.
    pub dirty_space: Option<u64>,
    /// Skip fsync on commit.
    pub no_sync: bool,
    /// Merge threshold, `0..=4`.
    pub merge_threshold: u8,
    /// Writable memory map.
    pub write_map: bool,
    /// OS readahead on the data file.
    pub mdbx_readahead: bool,
    /// Do not keep history.
    pub discard_history: bool,
    /// Report read transactions larger than this, in KiB.
    pub big_ro_tx_kb: Option<u64>,
    /// Report write transactions larger than this, in KiB.
    pub big_rw_tx_kb: Option<u64>,
    /// Warn on commits slower than this.
    pub slow_commit: Option<Duration>,
    /// Warn on transactions open longer than this.
    pub slow_tx: Option<Duration>,
    /// Stage to stop before.
    pub stop_before_stage: Option<String>,
    /// Stage to stop after.
    pub stop_after_stage: Option<String>,
    /// Stop after state reconstitution.
    pub stop_after_reconstitute: bool,
    /// Snapshot format version. Never `Some(0)`.
    pub snapshot_version: Option<u8>,
    /// Log why hashes mismatch.
    pub log_hash_mismatch_reason: bool,
    /// Collect memory statistics. Cleared by `NO_MEMSTAT`.
    pub memstat: bool,
    /// Download block files only.
    pub downloader_only_blocks: bool,
    /// Run block stages only.
    pub stages_only_blocks: bool,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            dirty_space: None,
            no_sync: false,
            merge_threshold: 0,
            write_map: false,
            mdbx_readahead: false,
            discard_history: false,
            big_ro_tx_kb: None,
            big_rw_tx_kb: None,
            slow_commit: None,
            slow_tx: None,
            stop_before_stage: None,
            stop_after_stage: None,
            stop_after_reconstitute: false,
            snapshot_version: None,
            log_hash_mismatch_reason: false,
            memstat: true,
            downloader_only_blocks: false,
            stages_only_blocks: false,
        }
    }
}

/// Reads variables through a lookup function and logs the ones that are
/// set.
struct Reader<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> Reader<F> {
    /// A non-empty variable.
    fn raw(&self, var: &'static str) -> Option<String> {
        (self.lookup)(var).filter(|v| !v.is_empty())
    }

    fn flag(&self, var: &'static str) -> bool {
        let on = self.raw(var).is_some_and(|v| v == "true");
        if on {
            info!(target: "strata::storage", var, value = true, "[Experiment]");
        }
        on
    }

    fn number<T>(&self, var: &'static str) -> Result<Option<T>, ConfigError>
    where
        T: FromStr + Display,
        T::Err: Display,
    {
        let Some(raw) = self.raw(var) else { return Ok(None) };
        let value = raw.trim().parse::<T>().map_err(|e| ConfigError::invalid(var, &raw, e))?;
        info!(target: "strata::storage", var, %value, "[Experiment]");
        Ok(Some(value))
    }

    fn duration(&self, var: &'static str) -> Result<Option<Duration>, ConfigError> {
        let Some(raw) = self.raw(var) else { return Ok(None) };
        let value =
            humantime::parse_duration(raw.trim()).map_err(|e| ConfigError::invalid(var, &raw, e))?;
        info!(target: "strata::storage", var, value = ?value, "[Experiment]");
        Ok(Some(value))
    }

    fn string(&self, var: &'static str) -> Option<String> {
        let value = self.raw(var)?;
        info!(target: "strata::storage", var, value = %value, "[Experiment]");
        Some(value)
    }
}

impl ExperimentConfig {
    /// Read the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] if a numeric or duration
    /// variable does not parse, or if `MERGE_THRESHOLD` is outside `0..=4`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Read the configuration through `lookup`, which maps a variable name
    /// to its value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let r = Reader { lookup };

        let merge_threshold = r.number::<u8>(ENV_MERGE_THRESHOLD)?.unwrap_or_default();
        if merge_threshold > MAX_MERGE_THRESHOLD {
            return Err(ConfigError::invalid(
                ENV_MERGE_THRESHOLD,
                &merge_threshold.to_string(),
                format_args!("must be at most {MAX_MERGE_THRESHOLD}"),
            ));
        }

        // Unparseable versions are ignored like zero.
        let snapshot_version = r
            .raw(ENV_SNAPSHOT_VERSION)
            .and_then(|v| v.trim().parse::<u8>().ok())
            .filter(|&v| v > 0);
        if let Some(version) = snapshot_version {
            info!(target: "strata::storage", var = ENV_SNAPSHOT_VERSION, version, "[Experiment]");
        }

        let memstat = (r.lookup)(ENV_NO_MEMSTAT).is_none();
        if !memstat {
            info!(target: "strata::storage", var = ENV_NO_MEMSTAT, "[Experiment]");
        }

        Ok(Self {
            dirty_space: r.number::<u64>(ENV_DIRTY_SPACE_MB)?.map(|mb| mb * 1024 * 1024),
            no_sync: r.flag(ENV_NO_SYNC),
            merge_threshold,
            write_map: r.flag(ENV_WRITE_MAP),
            mdbx_readahead: r.flag(ENV_MDBX_READAHEAD),
            discard_history: r.flag(ENV_DISCARD_HISTORY),
            big_ro_tx_kb: r.number(ENV_BIG_RO_TX_KB)?,
            big_rw_tx_kb: r.number(ENV_BIG_RW_TX_KB)?,
            slow_commit: r.duration(ENV_SLOW_COMMIT)?,
            slow_tx: r.duration(ENV_SLOW_TX)?,
            stop_before_stage: r.string(ENV_STOP_BEFORE_STAGE),
            stop_after_stage: r.string(ENV_STOP_AFTER_STAGE),
            stop_after_reconstitute: r.flag(ENV_STOP_AFTER_RECONSTITUTE),
            snapshot_version,
            log_hash_mismatch_reason: r.flag(ENV_LOG_HASH_MISMATCH_REASON),
            memstat,
            downloader_only_blocks: r.flag(ENV_DOWNLOADER_ONLY_BLOCKS),
            stages_only_blocks: r.flag(ENV_STAGES_ONLY_BLOCKS),
        })
    }

    /// The transaction diagnostics this configuration asks for. Zero
    /// thresholds are off.
    pub fn db_options(&self) -> DbOptions {
        let mut opts = DbOptions::new();
        if let Some(threshold) = self.slow_tx.filter(|d| !d.is_zero()) {
            opts = opts.with_slow_tx(threshold);
        }
        if let Some(threshold) = self.slow_commit.filter(|d| !d.is_zero()) {
            opts = opts.with_slow_commit(threshold);
        }
        if let Some(kb) = self.big_ro_tx_kb.filter(|&kb| kb > 0) {
            opts = opts.with_big_ro_tx_bytes(kb * 1024);
        }
        if let Some(kb) = self.big_rw_tx_kb.filter(|&kb| kb > 0) {
            opts = opts.with_big_rw_tx_bytes(kb * 1024);
        }
        opts
    }

    /// Apply the MDBX settings of this configuration to `args`.
    ///
    /// Settings that are off leave `args` unchanged.
    #[cfg(feature = "mdbx")]
    pub fn mdbx_arguments(
        &self,
        mut args: strata_kv_mdbx::DatabaseArguments,
    ) -> strata_kv_mdbx::DatabaseArguments {
        if self.no_sync {
            args = args.with_sync_mode(Some(strata_kv_mdbx::SyncMode::SafeNoSync));
        }
        if self.write_map {
            args = args.with_write_map(true);
        }
        if self.mdbx_readahead {
            args = args.with_readahead(true);
        }
        if let Some(bytes) = self.dirty_space {
            args = args.with_dirty_space(Some(bytes as usize));
        }
        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<ExperimentConfig, ConfigError> {
        let vars: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        ExperimentConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_when_unset() {
        let config = config(&[]).unwrap();
        assert_eq!(config, ExperimentConfig::default());
        assert!(config.memstat);
        assert_eq!(config.db_options(), DbOptions::new());
    }

    #[test]
    fn booleans_need_literal_true() {
        let config =
            config(&[("NO_SYNC", "true"), ("WRITE_MAP", "1"), ("MDBX_READAHEAD", "TRUE")]).unwrap();
        assert!(config.no_sync);
        assert!(!config.write_map);
        assert!(!config.mdbx_readahead);
    }

    #[test]
    fn parse_numbers_and_durations() {
        let config = config(&[
            ("MDBX_DIRTY_SPACE_MB", "64"),
            ("DEBUG_BIG_RO_TX_KB", "10"),
            ("DEBUG_BIG_RW_TX_KB", "0"),
            ("SLOW_COMMIT", "250ms"),
            ("SLOW_TX", "1m"),
            ("MERGE_THRESHOLD", "4"),
        ])
        .unwrap();
        assert_eq!(config.dirty_space, Some(64 * 1024 * 1024));
        assert_eq!(config.merge_threshold, 4);

        let opts = config.db_options();
        assert_eq!(opts.slow_commit, Some(Duration::from_millis(250)));
        assert_eq!(opts.slow_tx, Some(Duration::from_secs(60)));
        assert_eq!(opts.big_ro_tx_bytes, Some(10 * 1024));
        assert_eq!(opts.big_rw_tx_bytes, None, "zero is off");
    }

    #[test]
    fn merge_threshold_out_of_range() {
        let err = config(&[("MERGE_THRESHOLD", "5")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { var: ENV_MERGE_THRESHOLD, .. }));
        assert!(config(&[("MERGE_THRESHOLD", "-1")]).is_err());
    }

    #[test]
    fn invalid_values_are_errors() {
        let err = config(&[("MDBX_DIRTY_SPACE_MB", "lots")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { var: ENV_DIRTY_SPACE_MB, .. }));
        assert!(config(&[("SLOW_TX", "soon")]).is_err());
        assert!(config(&[("DEBUG_BIG_RO_TX_KB", "1.5")]).is_err());
    }

    #[test]
    fn snapshot_version_ignores_zero() {
        assert_eq!(config(&[("SNAPSHOT_VERSION", "0")]).unwrap().snapshot_version, None);
        assert_eq!(config(&[("SNAPSHOT_VERSION", "x")]).unwrap().snapshot_version, None);
        assert_eq!(config(&[("SNAPSHOT_VERSION", "2")]).unwrap().snapshot_version, Some(2));
    }

    #[test]
    fn strings_and_presence() {
        let config = config(&[
            ("STOP_AFTER_STAGE", "Execution"),
            ("NO_MEMSTAT", ""),
            ("STAGES_ONLY_BLOCKS", "true"),
        ])
        .unwrap();
        assert_eq!(config.stop_after_stage.as_deref(), Some("Execution"));
        assert_eq!(config.stop_before_stage, None);
        assert!(!config.memstat, "presence alone disables memstat");
        assert!(config.stages_only_blocks);
    }

    #[cfg(feature = "mdbx")]
    #[test]
    fn mdbx_arguments_follow_flags() {
        let base = strata_kv_mdbx::DatabaseArguments::new().with_write_map(false);

        let untouched = config(&[]).unwrap().mdbx_arguments(base.clone());
        assert!(!untouched.write_map());
        assert!(!untouched.readahead());
        assert_eq!(untouched.dirty_space(), None);

        let config = config(&[
            ("NO_SYNC", "true"),
            ("WRITE_MAP", "true"),
            ("MDBX_READAHEAD", "true"),
            ("MDBX_DIRTY_SPACE_MB", "2"),
        ])
        .unwrap();
        let args = config.mdbx_arguments(base);
        assert!(args.write_map());
        assert!(args.readahead());
        assert_eq!(args.dirty_space(), Some(2 * 1024 * 1024));
        assert!(matches!(args.sync_mode(), strata_kv_mdbx::SyncMode::SafeNoSync));
    }
}
