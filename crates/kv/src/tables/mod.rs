#[macro_use]
mod macros;

/// Standard table definitions.
mod definitions;
pub use definitions::*;

use crate::codec::DupLayout;
use std::collections::BTreeMap;

bitflags::bitflags! {
    /// Engine-level table flags.
    ///
    /// The values match the MDBX database flags so engines can pass them
    /// through unchanged.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
    pub struct TableFlags: u32 {
        /// Keys compare as reversed byte strings.
        const REVERSE_KEY = 0x02;
        /// Each key holds a sorted set of values.
        const DUP_SORT = 0x04;
        /// Keys are native-endian unsigned integers.
        const INTEGER_KEY = 0x08;
        /// Duplicates are native-endian unsigned integers.
        const INTEGER_DUP = 0x20;
        /// Duplicates compare as reversed byte strings.
        const REVERSE_DUP = 0x40;
    }
}

impl TableFlags {
    /// No flags: a plain ordered table.
    pub const DEFAULT: Self = Self::empty();
}

/// Trait for table definitions.
///
/// Tables are compile-time definitions of named key spaces. Each table
/// defines its engine flags, its optional automatic key conversion and
/// whether it is deprecated.
pub trait Table: Sized + Send + Sync + 'static {
    /// A short, human-readable name for the table.
    const NAME: &'static str;

    /// Engine flags.
    const FLAGS: TableFlags = TableFlags::DEFAULT;

    /// Automatic key/value conversion for dup-sort tables. Must be `None`
    /// unless [`FLAGS`] contains [`TableFlags::DUP_SORT`].
    ///
    /// [`FLAGS`]: Table::FLAGS
    const DUP_CONVERSION: Option<DupLayout> = None;

    /// Deprecated tables are not created at open and may be dropped.
    const DEPRECATED: bool = false;

    /// The configuration entry for this table.
    fn cfg_item() -> TableCfgItem {
        TableCfgItem {
            flags: Self::FLAGS,
            auto_dup_sort_keys_conversion: Self::DUP_CONVERSION.is_some(),
            is_deprecated: Self::DEPRECATED,
            dup_from_len: Self::DUP_CONVERSION.map_or(0, |l| l.from()),
            dup_to_len: Self::DUP_CONVERSION.map_or(0, |l| l.to()),
        }
    }
}

/// Per-table configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TableCfgItem {
    /// Engine flags.
    pub flags: TableFlags,
    /// Enables the automatic key conversion described by
    /// [`dup_from_len`](Self::dup_from_len) and
    /// [`dup_to_len`](Self::dup_to_len).
    pub auto_dup_sort_keys_conversion: bool,
    /// Deprecated tables are not created at open and may be dropped.
    pub is_deprecated: bool,
    /// Composite key length accepted by the conversion.
    pub dup_from_len: usize,
    /// Stored primary key length produced by the conversion.
    pub dup_to_len: usize,
}

impl TableCfgItem {
    /// A plain ordered table.
    pub const fn plain() -> Self {
        Self {
            flags: TableFlags::DEFAULT,
            auto_dup_sort_keys_conversion: false,
            is_deprecated: false,
            dup_from_len: 0,
            dup_to_len: 0,
        }
    }

    /// A dup-sort table without key conversion.
    pub const fn dup_sort() -> Self {
        Self { flags: TableFlags::DUP_SORT, ..Self::plain() }
    }

    /// A dup-sort table converting `from`-byte keys into `to`-byte primaries.
    pub const fn auto_dup_sort(from: usize, to: usize) -> Self {
        Self {
            flags: TableFlags::DUP_SORT,
            auto_dup_sort_keys_conversion: true,
            is_deprecated: false,
            dup_from_len: from,
            dup_to_len: to,
        }
    }

    /// Marks the table deprecated.
    pub const fn deprecated(mut self) -> Self {
        self.is_deprecated = true;
        self
    }

    /// Returns `true` if the table is dup-sort.
    pub const fn is_dup_sort(&self) -> bool {
        self.flags.contains(TableFlags::DUP_SORT)
    }

    /// The active key conversion, if any. Conversion requires both
    /// `DUP_SORT` and the auto flag, and a primary shorter than the
    /// composite key.
    pub const fn dup_layout(&self) -> Option<DupLayout> {
        if self.auto_dup_sort_keys_conversion
            && self.is_dup_sort()
            && self.dup_to_len < self.dup_from_len
        {
            Some(DupLayout::new(self.dup_from_len, self.dup_to_len))
        } else {
            None
        }
    }
}

/// The table catalog: table name to configuration.
///
/// The catalog is consumed when a database opens and is immutable afterwards.
/// The [`Sequence`] table is always present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableCfg(BTreeMap<String, TableCfgItem>);

impl Default for TableCfg {
    fn default() -> Self {
        Self::new()
    }
}

impl TableCfg {
    /// Create a catalog holding only the [`Sequence`] table.
    pub fn new() -> Self {
        let mut map = BTreeMap::new();
        map.insert(Sequence::NAME.to_owned(), Sequence::cfg_item());
        Self(map)
    }

    /// Add a table defined as a [`Table`].
    pub fn with<T: Table>(self) -> Self {
        self.with_table(T::NAME, T::cfg_item())
    }

    /// Add a table by name.
    pub fn with_table(mut self, name: impl Into<String>, item: TableCfgItem) -> Self {
        self.insert(name, item);
        self
    }

    /// Add or replace a table by name.
    pub fn insert(&mut self, name: impl Into<String>, item: TableCfgItem) {
        self.0.insert(name.into(), item);
    }

    /// Add every table of `other`. Entries of `other` win.
    pub fn merge(mut self, other: TableCfg) -> Self {
        self.0.extend(other.0);
        self
    }

    /// Look up a table.
    pub fn get(&self, name: &str) -> Option<&TableCfgItem> {
        self.0.get(name)
    }

    /// Look up a table, returning the catalog's copy of its name.
    pub fn entry(&self, name: &str) -> Option<(&str, &TableCfgItem)> {
        self.0.get_key_value(name).map(|(name, item)| (name.as_str(), item))
    }

    /// Returns `true` if the table is configured.
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// Iterate over the tables in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &TableCfgItem)> {
        self.0.iter().map(|(name, item)| (name.as_str(), item))
    }

    /// Number of configured tables.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if no tables are configured.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// The chain data catalog.
pub fn chaindata_tables_cfg() -> TableCfg {
    TableCfg::new()
        .with::<PlainState>()
        .with::<HashedStorage>()
        .with::<HashedAccounts>()
        .with::<Code>()
        .with::<PlainContractCode>()
        .with::<AccountChangeSet>()
        .with::<StorageChangeSet>()
        .with::<E2AccountsHistory>()
        .with::<E2StorageHistory>()
        .with::<Headers>()
        .with::<HeaderNumbers>()
        .with::<HeaderCanonical>()
        .with::<BlockBody>()
        .with::<Receipts>()
        .with::<TxLookup>()
        .with::<SyncStage>()
        .with::<DatabaseInfo>()
        .with::<Clique>()
        .with::<TransitionBlockKey>()
}

/// The catalog used when none is given. Same as
/// [`chaindata_tables_cfg`].
pub fn default_tables_cfg() -> TableCfg {
    chaindata_tables_cfg()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_always_present() {
        assert!(TableCfg::new().contains(Sequence::NAME));
        let cfg = TableCfg::new().with::<Headers>();
        assert_eq!(cfg.len(), 2);
    }

    #[test]
    fn plain_state_converts() {
        let cfg = chaindata_tables_cfg();
        let item = cfg.get(PlainState::NAME).unwrap();
        assert!(item.is_dup_sort());
        assert_eq!(item.dup_layout(), Some(DupLayout::new(60, 28)));

        let headers = cfg.get(Headers::NAME).unwrap();
        assert_eq!(headers.dup_layout(), None);
        assert!(cfg.get(Clique::NAME).unwrap().is_deprecated);
    }

    #[test]
    fn documented_tables_keep_their_shape() {
        assert_eq!(HashedStorage::NAME, "HashedStorage");
        assert_eq!(HashedStorage::DUP_CONVERSION, Some(DupLayout::new(72, 40)));
        assert_eq!(AccountChangeSet::FLAGS, TableFlags::DUP_SORT);
        assert!(AccountChangeSet::DUP_CONVERSION.is_none());
        assert!(!PlainState::DEPRECATED);
    }

    #[test]
    fn conversion_needs_dup_sort() {
        let item = TableCfgItem { flags: TableFlags::DEFAULT, ..TableCfgItem::auto_dup_sort(60, 28) };
        assert_eq!(item.dup_layout(), None);
    }

    #[test]
    fn flag_values() {
        assert_eq!(TableFlags::DEFAULT.bits(), 0);
        assert_eq!(TableFlags::DUP_SORT.bits(), 0x04);
        assert_eq!(TableFlags::REVERSE_DUP.bits(), 0x40);
    }
}
