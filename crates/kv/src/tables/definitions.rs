table! {
    /// Named u64 counters, big-endian, keyed by counter name.
    Sequence
}

table! {
    /// Current account and storage state. Storage rows use a 60-byte key
    /// (`address || incarnation || slot`) stored as 28-byte primaries whose
    /// duplicates carry the slot.
    PlainState is dup_sort, auto 60 => 28
}

table! {
    /// Current storage state keyed by hashed address, incarnation and hashed
    /// slot. Stored as 40-byte primaries with the slot in the duplicate.
    HashedStorage is dup_sort, auto 72 => 40
}

table! {
    /// Current accounts keyed by hashed address.
    HashedAccounts
}

table! {
    /// Contract code keyed by code hash.
    Code
}

table! {
    /// Code hash of each contract, keyed by `address || incarnation`.
    PlainContractCode
}

table! {
    /// Previous account values, keyed by block number, one duplicate per
    /// changed account.
    AccountChangeSet is dup_sort
}

table! {
    /// Previous storage values, keyed by `block || address || incarnation`.
    StorageChangeSet is dup_sort
}

table! {
    /// Blocks in which each account changed, as sharded integer lists.
    E2AccountsHistory
}

table! {
    /// Blocks in which each storage slot changed, as sharded integer lists.
    E2StorageHistory
}

table! {
    /// Block headers keyed by `number || hash`.
    Headers
}

table! {
    /// Block number of each header hash.
    HeaderNumbers
}

table! {
    /// Canonical header hash by block number.
    HeaderCanonical
}

table! {
    /// Block bodies keyed by `number || hash`.
    BlockBody
}

table! {
    /// Receipts keyed by block number.
    Receipts
}

table! {
    /// Block number of each transaction hash.
    TxLookup
}

table! {
    /// Progress of each sync stage.
    SyncStage
}

table! {
    /// Database-level metadata.
    DatabaseInfo
}

table! {
    /// Clique consensus snapshots. No longer written.
    Clique is deprecated
}

table! {
    /// Block at which the consensus transition happened. No longer written.
    TransitionBlockKey is deprecated
}
