//! Utilities for testing the MDBX engine.

use crate::{DatabaseArguments, DatabaseEnv, DatabaseEnvKind, SyncMode};
use tempfile::{TempDir, tempdir};

/// Creates a temporary MDBX environment for testing that will be
/// automatically cleaned up when the TempDir is dropped.
///
/// Commits skip fsync, which is safe for throwaway data.
pub fn create_test_rw_db() -> (TempDir, DatabaseEnv) {
    let dir = tempdir().unwrap();

    let args = DatabaseArguments::new()
        .with_geometry_max_size(Some(crate::GIGABYTE))
        .with_growth_step(Some(4 * crate::MEGABYTE))
        .with_sync_mode(Some(SyncMode::SafeNoSync));
    let db = DatabaseEnv::open(dir.path(), DatabaseEnvKind::RW, args).unwrap();

    (dir, db)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MdbxError, Tx};
    use serial_test::serial;
    use signet_libmdbx::{Ro, Rw};
    use strata_kv::{
        Database, KvError,
        conformance::conformance,
        model::{EngineRead, EngineWrite, KvEngine, RawCursor, RawCursorMut},
        tables::{PlainState, Table, TableCfg, TableCfgItem, TableFlags, chaindata_tables_cfg},
    };
    use tokio_util::sync::CancellationToken;

    fn token() -> CancellationToken {
        CancellationToken::new()
    }

    fn run_test<F: FnOnce(&DatabaseEnv)>(f: F) {
        let (dir, db) = create_test_rw_db();

        f(&db);

        drop(dir);
    }

    #[test]
    fn mdbx_conformance() {
        run_test(conformance)
    }

    #[test]
    fn test_raw_operations() {
        run_test(test_raw_operations_inner)
    }

    fn test_raw_operations_inner(db: &DatabaseEnv) {
        {
            let writer: Tx<Rw> = db.writer().unwrap();
            writer.create_table("raw_plain", TableFlags::DEFAULT).unwrap();
            writer.create_table("raw_dups", TableFlags::DUP_SORT).unwrap();
            // Creating twice is a no-op.
            writer.create_table("raw_plain", TableFlags::DEFAULT).unwrap();

            writer.raw_put("raw_plain", b"k", b"v1").unwrap();
            writer.raw_put("raw_plain", b"k", b"v2").unwrap();
            for v in [b"3", b"1", b"2", b"1"] {
                writer.raw_put("raw_dups", b"k", v).unwrap();
            }
            writer.raw_commit().unwrap();
        }

        let reader: Tx<Ro> = db.reader().unwrap();
        assert_eq!(reader.raw_get("raw_plain", b"k").unwrap().as_deref(), Some(&b"v2"[..]));
        assert_eq!(reader.raw_get("raw_dups", b"k").unwrap().as_deref(), Some(&b"1"[..]));
        assert!(reader.raw_get("raw_plain", b"missing").unwrap().is_none());

        let mut cursor = reader.raw_cursor("raw_dups").unwrap();
        let mut values = Vec::new();
        let mut row = cursor.first().unwrap().map(|(_, v)| v.to_vec());
        while let Some(v) = row {
            values.push(v);
            row = cursor.next_dup().unwrap().map(|(_, v)| v.to_vec());
        }
        assert_eq!(
            values,
            [b"1".to_vec(), b"2".to_vec(), b"3".to_vec()],
            "duplicates are sorted and unique"
        );
        assert_eq!(cursor.last_dup().unwrap().as_deref(), Some(&b"3"[..]));
    }

    #[test]
    fn test_table_management() {
        run_test(test_table_management_inner)
    }

    fn test_table_management_inner(db: &DatabaseEnv) {
        let writer: Tx<Rw> = db.writer().unwrap();
        for name in ["mgmt_c", "mgmt_a", "mgmt_b"] {
            writer.create_table(name, TableFlags::DEFAULT).unwrap();
        }
        writer.raw_put("mgmt_b", b"k", b"v").unwrap();

        let names = writer.table_names().unwrap();
        assert_eq!(names, ["mgmt_a", "mgmt_b", "mgmt_c"]);

        writer.clear_table("mgmt_b").unwrap();
        assert!(writer.table_exists("mgmt_b").unwrap());
        assert!(writer.raw_get("mgmt_b", b"k").unwrap().is_none());

        writer.drop_table("mgmt_c").unwrap();
        writer.drop_table("mgmt_c").unwrap();
        assert!(!writer.table_exists("mgmt_c").unwrap());

        let err = writer.raw_put("mgmt_c", b"k", b"v").unwrap_err();
        assert!(matches!(err, MdbxError::UnknownTable(ref t) if t == "mgmt_c"));
        writer.raw_commit().unwrap();

        let reader: Tx<Ro> = db.reader().unwrap();
        assert_eq!(reader.table_names().unwrap(), ["mgmt_a", "mgmt_b"]);
        assert!(matches!(reader.raw_cursor("mgmt_c"), Err(MdbxError::UnknownTable(_))));
    }

    #[test]
    fn test_cursor_delete_keeps_position() {
        run_test(test_cursor_delete_keeps_position_inner)
    }

    fn test_cursor_delete_keeps_position_inner(db: &DatabaseEnv) {
        let writer: Tx<Rw> = db.writer().unwrap();
        writer.create_table("del_dups", TableFlags::DUP_SORT).unwrap();
        {
            let mut cursor = writer.raw_cursor_mut("del_dups").unwrap();
            for (k, v) in [(b"a", b"1"), (b"a", b"2"), (b"b", b"1"), (b"c", b"1")] {
                cursor.append_dup(k, v).unwrap();
            }

            cursor.exact(b"a").unwrap().unwrap();
            cursor.delete_current_dups().unwrap();
            let (k, _) = cursor.read_next().unwrap().unwrap();
            assert_eq!(&k[..], b"b");

            cursor.delete_current().unwrap();
            let (k, _) = cursor.read_next().unwrap().unwrap();
            assert_eq!(&k[..], b"c");

            cursor.put(b"a", b"9").unwrap();
            assert_eq!(cursor.dual_lower_bound(b"a", b"5").unwrap().as_deref(), Some(&b"9"[..]));
            assert!(cursor.exact_dual(b"a", b"1").unwrap().is_none());
        }
        writer.raw_commit().unwrap();
    }

    #[test]
    #[serial]
    fn test_reopen_persists() {
        let dir = tempfile::tempdir().unwrap();
        let addr = [0x11; 20];

        {
            let env = DatabaseArguments::new().open_rw(dir.path()).unwrap();
            let db = Database::open(env, chaindata_tables_cfg()).unwrap();
            db.update(&token(), |tx| {
                tx.put(PlainState::NAME, &addr, b"account")?;
                tx.increment_sequence("blocks", 3).map(drop)
            })
            .unwrap();
            db.close();
        }

        let env = DatabaseArguments::new().open_ro(dir.path()).unwrap();
        assert!(matches!(env.tx_rw(), Err(MdbxError::ReadOnlyEnv)));

        let db = Database::builder(env)
            .with_tables(chaindata_tables_cfg())
            .read_only()
            .open()
            .unwrap();
        assert!(matches!(db.begin_rw(&token()), Err(KvError::ReadOnly)));

        let tx = db.begin_ro(&token()).unwrap();
        assert_eq!(tx.get_one(PlainState::NAME, &addr).unwrap().as_deref(), Some(&b"account"[..]));
        assert_eq!(tx.read_sequence("blocks").unwrap(), 3);
    }

    #[test]
    fn test_ordering_flags() {
        run_test(|env| {
            let item = TableCfgItem { flags: TableFlags::REVERSE_KEY, ..TableCfgItem::plain() };
            let cfg = TableCfg::new().with_table("rev_keys", item);
            let db = Database::open(env, cfg).unwrap();
            db.update(&token(), |tx| {
                for k in [&b"ab"[..], b"ba", b"ca"] {
                    tx.put("rev_keys", k, b"v")?;
                }
                Ok(())
            })
            .unwrap();

            // Keys compare from their last byte.
            let tx = db.begin_ro(&token()).unwrap();
            let mut cursor = tx.cursor("rev_keys").unwrap();
            let (first, _) = cursor.first().unwrap().unwrap();
            assert_eq!(&first[..], b"ba");
        });
    }
}
