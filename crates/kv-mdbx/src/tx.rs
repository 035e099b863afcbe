//! Transaction wrapper for libmdbx-sys.
use crate::{Cursor, MdbxError};
use signet_libmdbx::{
    Database as MdbxTable, DatabaseFlags, MdbxError as LibMdbxError, Ro, RoSync, Rw, RwSync,
    TransactionKind, WriteFlags,
};
use std::borrow::Cow;
use strata_kv::{
    model::{EngineRead, EngineWrite, RawValue},
    tables::TableFlags,
};

/// Wrapper around [`signet_libmdbx::tx::Tx`].
///
/// Tables are opened by name on every access. MDBX caches table handles per
/// environment, so repeated opens are cheap.
pub struct Tx<K: TransactionKind> {
    /// Libmdbx-sys transaction.
    inner: signet_libmdbx::tx::Tx<K>,
}

impl<K: TransactionKind> std::fmt::Debug for Tx<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tx").finish_non_exhaustive()
    }
}

/// Map [`TableFlags`] onto the MDBX database flags with the same meaning.
fn mdbx_flags(flags: TableFlags) -> DatabaseFlags {
    let mut out = DatabaseFlags::default();
    out.set(DatabaseFlags::REVERSE_KEY, flags.contains(TableFlags::REVERSE_KEY));
    out.set(DatabaseFlags::DUP_SORT, flags.contains(TableFlags::DUP_SORT));
    out.set(DatabaseFlags::INTEGER_KEY, flags.contains(TableFlags::INTEGER_KEY));
    out.set(DatabaseFlags::INTEGER_DUP, flags.contains(TableFlags::INTEGER_DUP));
    out.set(DatabaseFlags::REVERSE_DUP, flags.contains(TableFlags::REVERSE_DUP));
    out
}

impl<K: TransactionKind> Tx<K> {
    /// Wrap an MDBX transaction.
    #[inline]
    pub(crate) const fn new(inner: signet_libmdbx::tx::Tx<K>) -> Self {
        Self { inner }
    }

    /// Gets this transaction ID.
    pub fn id(&self) -> Result<u64, MdbxError> {
        self.inner.id().map_err(MdbxError::Mdbx)
    }

    /// Open a named table, mapping a missing table to
    /// [`MdbxError::UnknownTable`].
    fn open_table(&self, table: &str) -> Result<MdbxTable, MdbxError> {
        match self.inner.open_db(Some(table)) {
            Ok(db) => Ok(db),
            Err(LibMdbxError::NotFound) => Err(MdbxError::UnknownTable(table.to_owned())),
            Err(e) => Err(MdbxError::Mdbx(e)),
        }
    }

    /// Gets the database handle (dbi) for the given table name.
    pub fn get_dbi(&self, table: &str) -> Result<u32, MdbxError> {
        self.open_table(table).map(|db| db.dbi())
    }

    /// Create a [`Cursor`] over a named table.
    pub fn new_cursor<'a>(&'a self, table: &str) -> Result<Cursor<'a, K>, MdbxError> {
        let db = self.open_table(table)?;
        let cursor = self.inner.cursor(db)?;
        Ok(Cursor::new(cursor))
    }

    fn get<'a>(&'a self, table: &str, key: &[u8]) -> Result<Option<RawValue<'a>>, MdbxError> {
        let dbi = self.get_dbi(table)?;
        let result: Result<Option<Cow<'_, [u8]>>, _> = self.inner.get(dbi, key);
        result.map_err(MdbxError::from)
    }

    fn exists(&self, table: &str) -> Result<bool, MdbxError> {
        match self.open_table(table) {
            Ok(_) => Ok(true),
            Err(MdbxError::UnknownTable(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Named tables are the keys of the unnamed main table, in byte order.
    fn names(&self) -> Result<Vec<String>, MdbxError> {
        let main = self.inner.open_db(None)?;
        let mut cursor = self.inner.cursor(main)?;

        let mut names = Vec::new();
        let mut row = cursor
            .first::<Cow<'_, [u8]>, ()>()?
            .map(|(k, ())| String::from_utf8_lossy(&k).into_owned());
        while let Some(name) = row {
            names.push(name);
            row = cursor
                .next::<Cow<'_, [u8]>, ()>()?
                .map(|(k, ())| String::from_utf8_lossy(&k).into_owned());
        }
        names.sort_unstable();
        Ok(names)
    }
}

macro_rules! impl_engine_read {
    ($ty:ty, |$tx:ident| $end:expr) => {
        impl EngineRead for Tx<$ty> {
            type Error = MdbxError;

            type Cursor<'a> = Cursor<'a, $ty>;

            fn raw_cursor<'a>(&'a self, table: &str) -> Result<Self::Cursor<'a>, Self::Error> {
                self.new_cursor(table)
            }

            fn raw_get<'a>(
                &'a self,
                table: &str,
                key: &[u8],
            ) -> Result<Option<RawValue<'a>>, Self::Error> {
                self.get(table, key)
            }

            fn table_exists(&self, table: &str) -> Result<bool, Self::Error> {
                self.exists(table)
            }

            fn table_names(&self) -> Result<Vec<String>, Self::Error> {
                self.names()
            }

            fn raw_commit(self) -> Result<(), Self::Error> {
                let $tx = self;
                $end
            }
        }
    };
}

// Read transactions release their snapshot when dropped.
impl_engine_read!(Ro, |tx| {
    drop(tx);
    Ok(())
});
impl_engine_read!(RoSync, |tx| {
    drop(tx);
    Ok(())
});
impl_engine_read!(Rw, |tx| tx.inner.commit().map_err(MdbxError::Mdbx));
impl_engine_read!(RwSync, |tx| tx.inner.commit().map_err(MdbxError::Mdbx));

macro_rules! impl_engine_write {
    ($ty:ty) => {
        impl EngineWrite for Tx<$ty> {
            type CursorMut<'a> = Cursor<'a, $ty>;

            fn raw_cursor_mut<'a>(
                &'a self,
                table: &str,
            ) -> Result<Self::CursorMut<'a>, Self::Error> {
                self.new_cursor(table)
            }

            fn raw_put(&self, table: &str, key: &[u8], value: &[u8]) -> Result<(), Self::Error> {
                let db = self.open_table(table)?;
                self.inner.put(db, key, value, WriteFlags::UPSERT).map_err(MdbxError::Mdbx)
            }

            fn raw_delete(
                &self,
                table: &str,
                key: &[u8],
                value: Option<&[u8]>,
            ) -> Result<(), Self::Error> {
                let db = self.open_table(table)?;
                self.inner.del(db, key, value).map(drop).map_err(MdbxError::Mdbx)
            }

            fn create_table(&self, table: &str, flags: TableFlags) -> Result<(), Self::Error> {
                self.inner.create_db(Some(table), mdbx_flags(flags))?;
                Ok(())
            }

            fn drop_table(&self, table: &str) -> Result<(), Self::Error> {
                let db = match self.open_table(table) {
                    Ok(db) => db,
                    Err(MdbxError::UnknownTable(_)) => return Ok(()),
                    Err(e) => return Err(e),
                };
                // SAFETY: the handle was opened by this transaction and is not
                // used after the drop. Cursors borrow the transaction and are
                // opened per call, so none outlives the table.
                unsafe { self.inner.drop_db(db) }.map_err(MdbxError::Mdbx)
            }

            fn clear_table(&self, table: &str) -> Result<(), Self::Error> {
                let db = self.open_table(table)?;
                self.inner.clear_db(db).map_err(MdbxError::Mdbx)
            }
        }
    };
}

impl_engine_write!(Rw);
impl_engine_write!(RwSync);
