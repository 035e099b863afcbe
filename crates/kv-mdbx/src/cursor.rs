//! Cursor wrapper for libmdbx-sys.

use crate::MdbxError;
use signet_libmdbx::{Ro, RoSync, Rw, RwSync, TransactionKind, WriteFlags, tx::WriteMarker};
use std::{
    borrow::Cow,
    ops::{Deref, DerefMut},
};
use strata_kv::model::{RawCursor, RawCursorMut, RawKeyValue, RawValue};

/// Read only Cursor.
pub type CursorRo<'a> = Cursor<'a, Ro>;

/// Read write cursor.
pub type CursorRw<'a> = Cursor<'a, Rw>;

/// Synchronized read only cursor.
pub type CursorRoSync<'a> = Cursor<'a, RoSync>;

/// Synchronized read write cursor.
pub type CursorRwSync<'a> = Cursor<'a, RwSync>;

/// Cursor wrapper to access raw rows.
///
/// Dup-sort tables need no special handling here: MDBX keeps duplicates
/// sorted under their key, and the `*_dup` calls map onto the native
/// duplicate operations.
pub struct Cursor<'a, K: TransactionKind> {
    /// Inner `libmdbx` cursor.
    pub(crate) inner: signet_libmdbx::Cursor<'a, K>,
}

impl<K: TransactionKind> std::fmt::Debug for Cursor<'_, K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cursor").finish_non_exhaustive()
    }
}

impl<'a, K: TransactionKind> Deref for Cursor<'a, K> {
    type Target = signet_libmdbx::Cursor<'a, K>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl<'a, K: TransactionKind> DerefMut for Cursor<'a, K> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner
    }
}

impl<'a, K: TransactionKind> Cursor<'a, K> {
    /// Creates a new `Cursor` wrapping the given `libmdbx` cursor.
    pub const fn new(inner: signet_libmdbx::Cursor<'a, K>) -> Self {
        Self { inner }
    }
}

impl<K> RawCursor<MdbxError> for Cursor<'_, K>
where
    K: TransactionKind,
{
    fn first<'a>(&'a mut self) -> Result<Option<RawKeyValue<'a>>, MdbxError> {
        self.inner.first().map_err(MdbxError::from)
    }

    fn last<'a>(&'a mut self) -> Result<Option<RawKeyValue<'a>>, MdbxError> {
        self.inner.last().map_err(MdbxError::from)
    }

    fn exact<'a>(&'a mut self, key: &[u8]) -> Result<Option<RawValue<'a>>, MdbxError> {
        self.inner.set(key).map_err(MdbxError::from)
    }

    fn lower_bound<'a>(&'a mut self, key: &[u8]) -> Result<Option<RawKeyValue<'a>>, MdbxError> {
        self.inner.set_range(key).map_err(MdbxError::from)
    }

    fn read_next<'a>(&'a mut self) -> Result<Option<RawKeyValue<'a>>, MdbxError> {
        self.inner.next().map_err(MdbxError::from)
    }

    fn read_prev<'a>(&'a mut self) -> Result<Option<RawKeyValue<'a>>, MdbxError> {
        self.inner.prev().map_err(MdbxError::from)
    }

    fn exact_dual<'a>(
        &'a mut self,
        key: &[u8],
        value: &[u8],
    ) -> Result<Option<RawValue<'a>>, MdbxError> {
        self.inner.get_both(key, value).map_err(MdbxError::from)
    }

    fn dual_lower_bound<'a>(
        &'a mut self,
        key: &[u8],
        value: &[u8],
    ) -> Result<Option<RawValue<'a>>, MdbxError> {
        self.inner.get_both_range::<Cow<'_, [u8]>>(key, value).map_err(MdbxError::from)
    }

    fn next_dup<'a>(&'a mut self) -> Result<Option<RawKeyValue<'a>>, MdbxError> {
        self.inner.next_dup::<Cow<'_, [u8]>, Cow<'_, [u8]>>().map_err(MdbxError::from)
    }

    fn next_no_dup<'a>(&'a mut self) -> Result<Option<RawKeyValue<'a>>, MdbxError> {
        self.inner.next_nodup::<Cow<'_, [u8]>, Cow<'_, [u8]>>().map_err(MdbxError::from)
    }

    fn prev_dup<'a>(&'a mut self) -> Result<Option<RawKeyValue<'a>>, MdbxError> {
        self.inner.prev_dup::<Cow<'_, [u8]>, Cow<'_, [u8]>>().map_err(MdbxError::from)
    }

    fn prev_no_dup<'a>(&'a mut self) -> Result<Option<RawKeyValue<'a>>, MdbxError> {
        // MDBX lands on the last duplicate of the previous key.
        self.inner.prev_nodup::<Cow<'_, [u8]>, Cow<'_, [u8]>>().map_err(MdbxError::from)
    }

    fn last_dup<'a>(&'a mut self) -> Result<Option<RawValue<'a>>, MdbxError> {
        self.inner.last_dup::<Cow<'_, [u8]>>().map_err(MdbxError::from)
    }
}

impl<K: TransactionKind + WriteMarker> RawCursorMut<MdbxError> for Cursor<'_, K> {
    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), MdbxError> {
        self.inner.put(key, value, WriteFlags::UPSERT).map_err(MdbxError::from)
    }

    fn delete_current(&mut self) -> Result<(), MdbxError> {
        self.inner.del().map_err(MdbxError::Mdbx)
    }

    fn delete_current_dups(&mut self) -> Result<(), MdbxError> {
        self.inner.del_all_dups().map_err(MdbxError::from)
    }

    fn append(&mut self, key: &[u8], value: &[u8]) -> Result<(), MdbxError> {
        self.inner.append(key, value).map_err(MdbxError::from)
    }

    fn append_dup(&mut self, key: &[u8], value: &[u8]) -> Result<(), MdbxError> {
        self.inner.append_dup(key, value).map_err(MdbxError::from)
    }
}
