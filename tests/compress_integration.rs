//! Integration tests for purge, defragment, truncate, and compress on the
//! fixture table.


use heapwise::maint::{CompressPhases, MaintError, Phase};
use heapwise::store::TransactionController;
use maint_test_support::*;

#[test]
fn test_purge_then_check() {
    let db = fixture(1000);
    delete_random(&db, 1000, 100, 7);

    let tx = db.begin(false);
    let report = db.compactor().unwrap().purge(&tx, SCHEMA, TABLE).unwrap();
    assert_eq!(report.phase, Phase::Purge);
    assert!(!report.skipped);
    assert_eq!(report.conglomerates, 2);

    let check = db.check_table(&tx, SCHEMA, TABLE).unwrap();
    assert_eq!(check.heap_rows, Some(900));
    assert_eq!(check.indexes.len(), 1);
    assert_eq!(check.indexes[0].name, INDEX);
    assert_eq!(check.indexes[0].entries, 900);
    tx.commit().unwrap();
}

#[test]
fn test_defragment_relocates_tail_rows() {
    let db = fixture(1000);
    delete_random(&db, 1000, 100, 11);
    let before = rows_by_id(&db);

    let tx = db.begin(false);
    let compactor = db.compactor().unwrap();
    compactor.purge(&tx, SCHEMA, TABLE).unwrap();
    let report = compactor.defragment(&tx, SCHEMA, TABLE).unwrap();
    assert!(report.rows_relocated > 0);

    let check = db.check_table(&tx, SCHEMA, TABLE).unwrap();
    assert_eq!(check.heap_rows, Some(900));
    assert_eq!(check.indexes[0].entries, 900);
    tx.commit().unwrap();

    assert_eq!(rows_by_id(&db), before);
    assert_eq!(db.index_entries(SCHEMA, TABLE, INDEX).unwrap().len(), 900);
}

#[test]
fn test_compress_releases_pages() {
    let db = fixture(200);
    let pages_before = heap_pages(&db);
    delete_random(&db, 200, 120, 3);

    let tx = db.begin(false);
    let summary = db
        .compress(&tx, SCHEMA, TABLE, CompressPhases::ALL)
        .unwrap();
    tx.commit().unwrap();

    assert_eq!(summary.table, "APP.T");
    assert_eq!(summary.phases_executed(), 3);
    assert_eq!(
        summary.phases.iter().map(|p| p.phase).collect::<Vec<_>>(),
        vec![Phase::Purge, Phase::Defragment, Phase::Truncate]
    );
    assert_eq!(summary.space_before[0].info.allocated_pages, pages_before);
    assert!(summary.pages_after() < summary.pages_before());
    assert!(heap_pages(&db) < pages_before);
    assert_eq!(summary.space_after[0].info.allocated_pages, heap_pages(&db));
    assert_eq!(summary.space_after[0].info.estimated_reclaimable_bytes, 0);
    assert_eq!(rows_by_id(&db).len(), 80);
    assert_consistent(&db);
}

#[test]
fn test_truncate_alone_releases_only_trailing_pages() {
    let db = fixture(100);
    let pages = heap_pages(&db);
    // The last ids sit on the last pages.
    delete_ids(&db, &(60..100).collect::<Vec<_>>());

    let tx = db.begin(false);
    let compactor = db.compactor().unwrap();
    compactor.truncate(&tx, SCHEMA, TABLE).unwrap();
    // Deleted rows still occupy their slots until purged.
    assert_eq!(heap_pages(&db), pages);

    compactor.purge(&tx, SCHEMA, TABLE).unwrap();
    compactor.truncate(&tx, SCHEMA, TABLE).unwrap();
    tx.commit().unwrap();

    assert!(heap_pages(&db) < pages);
    assert_eq!(rows_by_id(&db).len(), 60);
    assert_consistent(&db);
}

#[test]
fn test_selected_phases_only() {
    let db = fixture(100);
    delete_random(&db, 100, 50, 5);

    let tx = db.begin(false);
    let summary = db
        .compress(&tx, SCHEMA, TABLE, CompressPhases::new(true, false, false))
        .unwrap();
    tx.commit().unwrap();

    assert_eq!(summary.phases.len(), 1);
    assert_eq!(summary.phases[0].phase, Phase::Purge);
    assert_eq!(summary.rows_relocated(), 0);
    assert_consistent(&db);

    let tx = db.begin(false);
    let summary = db
        .compress(&tx, SCHEMA, TABLE, CompressPhases::default())
        .unwrap();
    tx.commit().unwrap();
    assert!(summary.phases.is_empty());
}

#[test]
fn test_uncommitted_deletes_survive_purge() {
    let db = fixture(50);

    let tx = db.begin(false);
    db.delete_where(&tx, SCHEMA, TABLE, |_| true).unwrap();
    db.compactor().unwrap().purge(&tx, SCHEMA, TABLE).unwrap();
    tx.abort().unwrap();

    assert_eq!(rows_by_id(&db).len(), 50);
    assert_consistent(&db);
}

#[test]
fn test_compress_on_view_is_noop() {
    let db = open_db();
    create_fixture(&db);
    db.create_view(SCHEMA, "V").unwrap();
    db.create_virtual_table(SCHEMA, "VT").unwrap();

    let tx = db.begin(false);
    for table in ["V", "VT"] {
        let summary = db.compress(&tx, SCHEMA, table, CompressPhases::ALL).unwrap();
        assert_eq!(summary.phases_executed(), 0);
        assert_eq!(summary.phases.len(), 3);
        assert!(summary.phases.iter().all(|p| p.skipped));
        assert!(summary.space_before.is_empty());
        assert!(summary.space_after.is_empty());
    }
    assert!(db.store().tx_manager().locks_held(tx.txid()).is_empty());
    tx.commit().unwrap();
}

#[test]
fn test_compress_missing_table() {
    let db = fixture(1);
    let tx = db.begin(false);
    assert_eq!(
        db.compress(&tx, SCHEMA, "NOPE", CompressPhases::ALL)
            .unwrap_err(),
        MaintError::TableNotFound {
            schema: SCHEMA.into(),
            table: "NOPE".into(),
        }
    );
    assert_eq!(
        db.compress(&tx, "NOPE", TABLE, CompressPhases::ALL)
            .unwrap_err(),
        MaintError::SchemaNotFound("NOPE".into())
    );
}

#[test]
fn test_small_batches_match_large_batches() {
    use heapwise::config::MaintConfig;

    let run = |batch| {
        let db = open_db_with(MaintConfig::default().with_relocation_batch_size(batch));
        create_fixture(&db);
        populate(&db, 300);
        delete_random(&db, 300, 150, 21);
        let tx = db.begin(false);
        let summary = db.compress(&tx, SCHEMA, TABLE, CompressPhases::ALL).unwrap();
        tx.commit().unwrap();
        assert_consistent(&db);
        (summary.rows_relocated(), rows_by_location(&db))
    };

    assert_eq!(run(1), run(100));
}
