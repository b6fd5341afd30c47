//! Integration tests for lock conflicts, injected storage failures, and the
//! missing-entry policy during relocation.


use heapwise::config::{ConfigError, MaintConfig, MissingEntryPolicy};
use heapwise::datum::Value;
use heapwise::db::{DatabaseError, MemoryDatabase};
use heapwise::maint::{CompressPhases, MaintError};
use heapwise::store::{
    FaultPoint, MemoryTransaction, OpenMode, OpenOptions, StoreError, TransactionController,
};
use heapwise::tx::TxError;
use maint_test_support::*;

/// Leaves a purged fixture whose tail rows will move on the next defragment.
/// With `orphan`, the last heap row has no index entry.
fn purged_fixture(db: &MemoryDatabase, tx: &MemoryTransaction, orphan: bool) {
    create_fixture(db);
    populate(db, 150);
    if orphan {
        let heap = db.heap_id(SCHEMA, TABLE).unwrap();
        let setup = db.begin(false);
        setup
            .open_conglomerate(heap, OpenOptions::table(OpenMode::ForUpdate))
            .unwrap()
            .insert_row(fixture_row(5000))
            .unwrap();
        setup.commit().unwrap();
    }
    delete_ids(db, &(0..60).collect::<Vec<_>>());
    db.compactor().unwrap().purge(tx, SCHEMA, TABLE).unwrap();
}

#[test]
fn test_lock_conflict_is_retryable_and_harmless() {
    let db = fixture(100);
    delete_random(&db, 100, 40, 9);
    let rows = rows_by_location(&db);
    let pages = heap_pages(&db);

    let writer = db.begin(false);
    db.insert(&writer, SCHEMA, TABLE, fixture_row(1000)).unwrap();

    let maintainer = db.begin(false);
    let err = db
        .compress(&maintainer, SCHEMA, TABLE, CompressPhases::ALL)
        .unwrap_err();
    assert!(err.is_retryable(), "{}", err);
    assert!(matches!(
        err,
        MaintError::Store(StoreError::Tx(TxError::LockTimeout { .. }))
    ));
    let check_err = db.check_table(&maintainer, SCHEMA, TABLE).unwrap_err();
    assert!(check_err.is_retryable());
    maintainer.abort().unwrap();

    writer.abort().unwrap();
    assert_eq!(rows_by_location(&db), rows);
    assert_eq!(heap_pages(&db), pages);

    // Once the writer is gone the same request goes through.
    let maintainer = db.begin(false);
    db.compress(&maintainer, SCHEMA, TABLE, CompressPhases::ALL)
        .unwrap();
    maintainer.commit().unwrap();
    assert_consistent(&db);
}

#[test]
fn test_read_only_transaction_cannot_compress() {
    let db = fixture(10);
    let tx = db.begin(true);
    assert!(matches!(
        db.compress(&tx, SCHEMA, TABLE, CompressPhases::ALL),
        Err(MaintError::Store(StoreError::ReadOnly(_)))
    ));
}

#[test]
fn test_failed_index_insert_rolls_back_defragment() {
    let db = open_db_with(MaintConfig::default().with_relocation_batch_size(8));
    let tx = db.begin(false);
    purged_fixture(&db, &tx, false);
    let before = rows_by_location(&db);
    let entries = db.index_entries(SCHEMA, TABLE, INDEX).unwrap();

    db.store().fail_after(FaultPoint::IndexInsert, 20);
    let err = db
        .compactor()
        .unwrap()
        .defragment(&tx, SCHEMA, TABLE)
        .unwrap_err();
    assert!(matches!(err, MaintError::Store(StoreError::Injected(_))));
    assert!(!err.is_retryable());

    assert_eq!(db.store().open_handles(), 0);
    assert_eq!(rows_by_location(&db), before);
    assert_eq!(db.index_entries(SCHEMA, TABLE, INDEX).unwrap(), entries);
    db.check_table(&tx, SCHEMA, TABLE).unwrap();

    // The caller's transaction survives and can retry.
    db.store().clear_faults();
    let report = db
        .compactor()
        .unwrap()
        .defragment(&tx, SCHEMA, TABLE)
        .unwrap();
    assert!(report.rows_relocated > 0);
    db.check_table(&tx, SCHEMA, TABLE).unwrap();
    tx.commit().unwrap();
}

#[test]
fn test_failed_relocation_batch_rolls_back_earlier_batches() {
    let db = open_db_with(MaintConfig::default().with_relocation_batch_size(4));
    let tx = db.begin(false);
    purged_fixture(&db, &tx, false);
    let before = rows_by_location(&db);

    db.store().fail_after(FaultPoint::RelocationBatch, 2);
    let err = db
        .compress(&tx, SCHEMA, TABLE, CompressPhases::new(false, true, true))
        .unwrap_err();
    assert!(matches!(err, MaintError::Store(StoreError::Injected(_))));
    assert_eq!(db.store().open_handles(), 0);
    assert_eq!(rows_by_location(&db), before);
    db.check_table(&tx, SCHEMA, TABLE).unwrap();
    tx.commit().unwrap();
}

#[test]
fn test_failed_entry_delete_rolls_back_defragment() {
    let db = open_db();
    let tx = db.begin(false);
    purged_fixture(&db, &tx, false);
    let before = rows_by_location(&db);

    db.store().fail_after(FaultPoint::ScanDelete, 3);
    assert!(
        db.compactor()
            .unwrap()
            .defragment(&tx, SCHEMA, TABLE)
            .is_err()
    );
    assert_eq!(db.store().open_handles(), 0);
    assert_eq!(rows_by_location(&db), before);
    db.check_table(&tx, SCHEMA, TABLE).unwrap();
}

#[test]
fn test_missing_entry_aborts_defragment() {
    let db = open_db();
    let tx = db.begin(false);
    purged_fixture(&db, &tx, true);
    let before = rows_by_location(&db);

    let err = db
        .compactor()
        .unwrap()
        .defragment(&tx, SCHEMA, TABLE)
        .unwrap_err();
    match err {
        MaintError::InternalInconsistency {
            table,
            index,
            index_row,
            ..
        } => {
            assert_eq!(table, "APP.T");
            assert_eq!(index, INDEX);
            assert!(index_row.contains("5000"));
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert_eq!(rows_by_location(&db), before);
    assert_eq!(db.store().open_handles(), 0);
}

#[test]
fn test_missing_entry_reinserted_when_configured() {
    let db = open_db_with(
        MaintConfig::default().with_missing_entry_policy(MissingEntryPolicy::Reinsert),
    );
    let tx = db.begin(false);
    purged_fixture(&db, &tx, true);
    assert!(db.check_table(&tx, SCHEMA, TABLE).is_err());

    let report = db
        .compactor()
        .unwrap()
        .defragment(&tx, SCHEMA, TABLE)
        .unwrap();
    assert!(report.rows_relocated > 0);

    // The moved orphan now has an entry at its new location.
    let report = db.check_table(&tx, SCHEMA, TABLE).unwrap();
    assert_eq!(report.heap_rows, Some(91));
    assert_eq!(report.indexes[0].entries, 91);
    tx.commit().unwrap();
}

#[test]
fn test_parent_abort_undoes_insert_despite_defragment() {
    let db = fixture(100);
    delete_ids(&db, &(0..40).collect::<Vec<_>>());

    let tx = db.begin(false);
    let inserted = db.insert(&tx, SCHEMA, TABLE, fixture_row(5000)).unwrap();
    let compactor = db.compactor().unwrap();
    compactor.purge(&tx, SCHEMA, TABLE).unwrap();
    let report = compactor.defragment(&tx, SCHEMA, TABLE).unwrap();
    assert!(report.rows_relocated > 0);

    // The uncommitted row keeps its place while other rows move.
    assert_eq!(rows_by_location(&db)[&inserted], fixture_row(5000));
    db.check_table(&tx, SCHEMA, TABLE).unwrap();
    tx.abort().unwrap();

    assert!(!rows_by_id(&db).contains_key(&5000));
    assert_eq!(rows_by_id(&db).len(), 60);
    let entries = db.index_entries(SCHEMA, TABLE, INDEX).unwrap();
    assert_eq!(entries.len(), 60);
    assert!(entries.iter().all(|e| e.columns[0] != Value::Int32(5000)));
    assert_consistent(&db);
}

#[test]
fn test_zero_batch_size_rejected() {
    let db = MemoryDatabase::with_config(
        Default::default(),
        MaintConfig::default().with_relocation_batch_size(0),
    );
    assert!(matches!(
        db,
        Err(DatabaseError::Config(ConfigError::ZeroBatchSize))
    ));
}
