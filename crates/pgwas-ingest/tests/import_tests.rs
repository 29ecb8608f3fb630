//! End-to-end imports into the in-memory store
//!
//! Covers the same path as `pgwas-ingest import --dry-run`.

use std::sync::Arc;

use pgwas_ingest::store::{EntityTable, MemoryStore};
use pgwas_ingest::validation::ValidationSelection;
use pgwas_ingest::IngestError;

mod helpers;

use helpers::{context, importer, write, write_dataset};

#[tokio::test]
async fn test_dry_run_imports_every_phase() {
    let dir = write_dataset();
    let store = Arc::new(MemoryStore::new());

    let (report, summary) = importer(store.clone())
        .validate_and_run(&context(&dir), &ValidationSelection::all())
        .await
        .unwrap();

    assert_eq!(report.skipped.len(), 0);
    assert_eq!(summary.lines, 3);
    assert_eq!(summary.variants_inserted, 5);
    assert_eq!(summary.growouts, 1);
    assert_eq!(store.row_count(EntityTable::Line), 3);
    assert_eq!(store.row_count(EntityTable::Phenotype), 6);
    assert_eq!(store.row_count(EntityTable::GwasRun), 2);
    assert_eq!(store.row_count(EntityTable::Location), 1);
}

#[tokio::test]
async fn test_second_import_only_appends_results() {
    let dir = write_dataset();
    let ctx = context(&dir);
    let store = Arc::new(MemoryStore::new());
    let importer = importer(store.clone());

    importer.run(&ctx).await.unwrap();
    let lines = store.row_count(EntityTable::Line);
    let variants = store.row_count(EntityTable::Variant);

    let again = importer.run(&ctx).await.unwrap();
    assert_eq!(again.variants_inserted, 0);
    assert_eq!(store.row_count(EntityTable::Line), lines);
    assert_eq!(store.row_count(EntityTable::Variant), variants);
    assert_eq!(store.row_count(EntityTable::GwasResult), 4);
}

#[tokio::test]
async fn test_missing_phenotype_file_writes_nothing() {
    let dir = write_dataset();
    std::fs::remove_file(dir.path().join("phenotypes.csv")).unwrap();
    let store = Arc::new(MemoryStore::new());

    let err = importer(store.clone())
        .validate_and_run(&context(&dir), &ValidationSelection::all())
        .await
        .unwrap_err();

    assert!(matches!(err, IngestError::FileNotFound { .. }));
    assert_eq!(store.row_count(EntityTable::Species), 0);
}

#[tokio::test]
async fn test_duplicate_line_names_fail_validation() {
    let dir = write_dataset();
    write(dir.path(), "chr1_maize.012.indv", "B73\nMo17\nB73\n");
    let store = Arc::new(MemoryStore::new());

    let err = importer(store.clone())
        .validate_and_run(&context(&dir), &ValidationSelection::all())
        .await
        .unwrap_err();

    assert!(matches!(err, IngestError::Schema(_)));
    assert_eq!(store.row_count(EntityTable::Line), 0);
}
