//! Versioned reads over domains, histories and inverted indices.
//!
//! A [`Domain`] is a key space whose values change over logical time. Each
//! domain is backed by four tables:
//!
//! ```text
//! {name}Vals         key                   -> current value
//! {name}HistoryVals  key || be(ts)         -> value before the write at ts
//! {name}Idx          key || be(highest_ts) -> IntegerList of change timestamps
//! {name}Keys         be(ts)                -> key   (dup-sort)
//! ```
//!
//! The last two form the domain's [`InvertedIdx`]. The middle two with the
//! index form its [`History`]. Index shards hold up to
//! [`ShardedKey::SHARD_COUNT`] timestamps. The open shard of a key is stored
//! under `u64::MAX`.
//!
//! Reads go through [`TemporalTx`], writes through [`TemporalRwTx`].
//!
//! [`ShardedKey::SHARD_COUNT`]: strata_storage_types::ShardedKey::SHARD_COUNT

mod index;

mod read;
pub use read::TemporalTx;

mod write;
pub use write::TemporalRwTx;

pub(crate) mod sealed {
    use crate::{db::Tx, model::EngineRead};

    /// Sealed trait to prevent external implementations of temporal traits.
    #[allow(unreachable_pub)]
    pub trait Sealed {}
    impl<T: EngineRead> Sealed for Tx<T> {}
}

use crate::{
    iter::Order,
    model::{KvError, KvResult},
    tables::{TableCfg, TableCfgItem},
};
use core::fmt;
use strata_storage_types::{Timestamp, encode_ts};

/// A versioned key space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Domain(pub &'static str);

impl Domain {
    /// Account state.
    pub const ACCOUNTS: Self = Self("Accounts");
    /// Contract storage.
    pub const STORAGE: Self = Self("Storage");
    /// Contract code.
    pub const CODE: Self = Self("Code");

    /// The domain name.
    pub const fn name(self) -> &'static str {
        self.0
    }

    /// The history of this domain.
    pub const fn history(self) -> History {
        History(self.0)
    }

    /// Table holding current values.
    pub fn vals_table(self) -> String {
        format!("{}Vals", self.0)
    }
}

/// The change history of a domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct History(pub &'static str);

impl History {
    /// The inverted index of this history.
    pub const fn index(self) -> InvertedIdx {
        InvertedIdx(self.0)
    }

    /// Table holding the value before each change.
    pub fn vals_table(self) -> String {
        format!("{}HistoryVals", self.0)
    }
}

/// An index from keys to the timestamps at which they changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InvertedIdx(pub &'static str);

impl InvertedIdx {
    /// Log emitter addresses.
    pub const LOG_ADDRESS: Self = Self("LogAddress");
    /// Log topics.
    pub const LOG_TOPICS: Self = Self("LogTopics");
    /// Trace senders.
    pub const TRACES_FROM: Self = Self("TracesFrom");
    /// Trace recipients.
    pub const TRACES_TO: Self = Self("TracesTo");

    /// Table holding sharded timestamp lists.
    pub fn idx_table(self) -> String {
        format!("{}Idx", self.0)
    }

    /// Dup-sort table listing the keys changed at each timestamp.
    pub fn keys_table(self) -> String {
        format!("{}Keys", self.0)
    }
}

macro_rules! display_name {
    ($($ty:ty),+) => {$(
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.0)
            }
        }
    )+};
}

display_name!(Domain, History, InvertedIdx);

impl TableCfg {
    /// Add the tables of a domain.
    pub fn with_domain(self, domain: Domain) -> Self {
        self.with_history(domain.history()).with_table(domain.vals_table(), TableCfgItem::plain())
    }

    /// Add the tables of a history.
    pub fn with_history(self, history: History) -> Self {
        self.with_inverted_index(history.index())
            .with_table(history.vals_table(), TableCfgItem::plain())
    }

    /// Add the tables of an inverted index.
    pub fn with_inverted_index(self, idx: InvertedIdx) -> Self {
        self.with_table(idx.idx_table(), TableCfgItem::plain())
            .with_table(idx.keys_table(), TableCfgItem::dup_sort())
    }
}

/// The temporal catalog: every standard domain and inverted index.
pub fn temporal_tables_cfg() -> TableCfg {
    TableCfg::new()
        .with_domain(Domain::ACCOUNTS)
        .with_domain(Domain::STORAGE)
        .with_domain(Domain::CODE)
        .with_inverted_index(InvertedIdx::LOG_ADDRESS)
        .with_inverted_index(InvertedIdx::LOG_TOPICS)
        .with_inverted_index(InvertedIdx::TRACES_FROM)
        .with_inverted_index(InvertedIdx::TRACES_TO)
}

/// A validated timestamp range, as the ascending interval `[lo, hi)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TsWindow {
    pub(crate) lo: Timestamp,
    pub(crate) hi: Option<Timestamp>,
}

impl TsWindow {
    /// Every timestamp strictly after `ts`.
    pub(crate) const fn after(ts: Timestamp) -> Option<Self> {
        match ts.checked_add(1) {
            Some(lo) => Some(Self { lo, hi: None }),
            None => None,
        }
    }

    /// Validate a directional range.
    ///
    /// Negative bounds are unbounded. Ascending ranges cover `[from, to)`,
    /// descending ranges cover `(to, from]`.
    pub(crate) fn new(from: i64, to: i64, order: Order) -> KvResult<Self> {
        if from >= 0 && to >= 0 {
            let valid = match order {
                Order::Asc => from <= to,
                Order::Desc => from >= to,
            };
            if !valid {
                return Err(KvError::InvalidRange {
                    from: from.to_string(),
                    to: to.to_string(),
                    order,
                });
            }
        }

        let bound = |ts: i64| u64::try_from(ts).ok();
        Ok(match order {
            Order::Asc => Self { lo: bound(from).unwrap_or(0), hi: bound(to) },
            Order::Desc => Self {
                lo: bound(to).map_or(0, |to| to + 1),
                hi: bound(from).map(|from| from + 1),
            },
        })
    }

    pub(crate) const fn contains(&self, ts: Timestamp) -> bool {
        ts >= self.lo
            && match self.hi {
                Some(hi) => ts < hi,
                None => true,
            }
    }
}

/// Key of a history row.
pub(crate) fn history_key(key: &[u8], ts: Timestamp) -> Vec<u8> {
    let mut out = Vec::with_capacity(key.len() + 8);
    out.extend_from_slice(key);
    out.extend_from_slice(&encode_ts(ts));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_names() {
        assert_eq!(Domain::ACCOUNTS.vals_table(), "AccountsVals");
        assert_eq!(Domain::ACCOUNTS.history().vals_table(), "AccountsHistoryVals");
        assert_eq!(Domain::ACCOUNTS.history().index().idx_table(), "AccountsIdx");
        assert_eq!(InvertedIdx::LOG_TOPICS.keys_table(), "LogTopicsKeys");
        assert_eq!(Domain::STORAGE.to_string(), "Storage");

        let cfg = TableCfg::new().with_domain(Domain::CODE);
        assert_eq!(cfg.len(), 5);
        assert!(cfg.get("CodeKeys").unwrap().is_dup_sort());
        assert!(temporal_tables_cfg().contains("TracesToIdx"));
    }

    #[test]
    fn windows() {
        let w = TsWindow::new(2, 5, Order::Asc).unwrap();
        assert_eq!((w.lo, w.hi), (2, Some(5)));
        assert!(w.contains(2) && w.contains(4) && !w.contains(5));

        let w = TsWindow::new(5, 2, Order::Desc).unwrap();
        assert_eq!((w.lo, w.hi), (3, Some(6)));

        let w = TsWindow::new(-1, -1, Order::Desc).unwrap();
        assert_eq!((w.lo, w.hi), (0, None));
        let w = TsWindow::new(7, -1, Order::Desc).unwrap();
        assert_eq!((w.lo, w.hi), (0, Some(8)));

        assert!(TsWindow::new(3, 3, Order::Asc).is_ok());
        let err = TsWindow::new(5, 2, Order::Asc).unwrap_err();
        assert!(matches!(err, KvError::InvalidRange { order: Order::Asc, .. }));
        assert!(TsWindow::new(2, 5, Order::Desc).is_err());

        assert_eq!(TsWindow::after(u64::MAX), None);
        assert_eq!(TsWindow::after(4).unwrap().lo, 5);
    }
}
