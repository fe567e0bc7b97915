//! Success-path integration tests
//!
//! A scripted toolkit stands in for the real programs; both databases are
//! temporary SQLite files.

mod helpers;

use helpers::fake_toolkit::SERIAL;
use helpers::{count, create_test_env, BandFixture, FakeToolkit};
use std::sync::Arc;
use upc_process::WorkItem;

const MRO_STEPS: &[&str] = &["mroctx2isis", "spiceinit", "footprintinit", "caminfo"];

#[tokio::test]
async fn test_full_recipe_records_metadata() {
    let env = create_test_env(MRO_STEPS).await.unwrap();
    let source = env.write_source("P01_001.IMG", b"raw pixels");
    env.enqueue(&WorkItem::new(&source, 101, "mro")).await;

    let toolkit = Arc::new(FakeToolkit::new());
    let stats = env.consumer(toolkit.clone()).await.drain().await.unwrap();

    assert_eq!(stats.dequeued, 1);
    assert_eq!(stats.succeeded, 1);
    assert_eq!(toolkit.executed(), MRO_STEPS);

    let upcid = env.upcid_by_isisid(SERIAL).await.expect("identity row");
    assert_eq!(
        env.upcid_by_source(&env.source_url("P01_001.IMG")).await,
        Some(upcid)
    );
    assert_eq!(env.error_flag(upcid).await, Some(false));
    assert_eq!(env.audit_outcome(101).await, Some(true));

    assert_eq!(
        env.text_value("meta_geometries", upcid, 6).await.as_deref(),
        Some("POINT (354.25 -4.5)")
    );
    assert_eq!(
        env.text_value("meta_geometries", upcid, 5).await.as_deref(),
        Some("MULTIPOLYGON (((354 -4, 355 -4, 355 -5, 354 -4)))")
    );
    let expected_checksum = format!("{:x}", md5::compute(b"raw pixels"));
    assert_eq!(
        env.text_value("meta_strings", upcid, 9).await,
        Some(expected_checksum)
    );
    assert_eq!(
        env.text_value("meta_strings", upcid, 10).await.as_deref(),
        Some("Mars")
    );
    assert_eq!(
        env.text_value("meta_strings", upcid, 40).await.as_deref(),
        Some("0906567432:152")
    );

    let counts = env.row_counts().await;
    assert_eq!(
        counts,
        vec![
            ("datafiles", 1),
            ("meta_times", 1),
            ("meta_strings", 3),
            ("meta_booleans", 1),
            ("meta_doubles", 1),
            ("meta_integers", 1),
            ("meta_geometries", 2),
            ("meta_bands", 3),
            ("process_runs", 1),
        ]
    );

    let lines: i64 = sqlx::query_scalar("SELECT value FROM meta_integers WHERE upcid = ? AND typeid = 41")
        .bind(upcid)
        .fetch_one(&env.upc)
        .await
        .unwrap();
    assert_eq!(lines, 1024);

    let resolution: f64 = sqlx::query_scalar("SELECT value FROM meta_doubles WHERE upcid = ? AND typeid = 11")
        .bind(upcid)
        .fetch_one(&env.upc)
        .await
        .unwrap();
    assert!((resolution - 5.9).abs() < 1e-9);

    // Working files and the per-item directory are gone; the source is untouched
    assert!(env.workarea_entries().is_empty());
    assert!(source.exists());
    assert_eq!(count(&env.pds, "work_queue").await, 0);
}

#[tokio::test]
async fn test_band_rows_follow_filter_list() {
    let env = create_test_env(MRO_STEPS).await.unwrap();
    let source = env.write_source("P01_002.IMG", b"x");
    env.enqueue(&WorkItem::new(&source, 102, "mro")).await;

    let toolkit = Arc::new(FakeToolkit::new());
    env.consumer(toolkit).await.drain().await.unwrap();

    let upcid = env.upcid_by_isisid(SERIAL).await.unwrap();
    let bands: Vec<(String, Option<f64>)> =
        sqlx::query_as("SELECT filter, centerwave FROM meta_bands WHERE upcid = ? ORDER BY centerwave")
            .bind(upcid)
            .fetch_all(&env.upc)
            .await
            .unwrap();
    assert_eq!(
        bands,
        vec![
            ("BLUE".to_string(), Some(0.5)),
            ("RED".to_string(), Some(0.65)),
            ("NIR".to_string(), Some(0.9)),
        ]
    );
}

#[tokio::test]
async fn test_scalar_band_writes_one_row() {
    let env = create_test_env(MRO_STEPS).await.unwrap();
    let source = env.write_source("P01_003.IMG", b"x");
    env.enqueue(&WorkItem::new(&source, 103, "mro")).await;

    let toolkit = Arc::new(FakeToolkit::new().with_bands(BandFixture::Scalar("BroadBand", 0.65)));
    let stats = env.consumer(toolkit).await.drain().await.unwrap();
    assert_eq!(stats.succeeded, 1);

    let bands: Vec<(String, Option<f64>)> = sqlx::query_as("SELECT filter, centerwave FROM meta_bands")
        .fetch_all(&env.upc)
        .await
        .unwrap();
    assert_eq!(bands, vec![("BroadBand".to_string(), Some(0.65))]);
}

#[tokio::test]
async fn test_missing_bandbin_still_succeeds() {
    let env = create_test_env(MRO_STEPS).await.unwrap();
    let source = env.write_source("P01_004.IMG", b"x");
    env.enqueue(&WorkItem::new(&source, 104, "mro")).await;

    let toolkit = Arc::new(FakeToolkit::new().with_bands(BandFixture::Missing));
    let stats = env.consumer(toolkit).await.drain().await.unwrap();

    assert_eq!(stats.succeeded, 1);
    assert_eq!(count(&env.upc, "meta_bands").await, 0);
    assert_eq!(env.audit_outcome(104).await, Some(true));
}

#[tokio::test]
async fn test_reprocessing_overwrites_instead_of_duplicating() {
    let env = create_test_env(MRO_STEPS).await.unwrap();
    let source = env.write_source("P01_005.IMG", b"first");
    let item = WorkItem::new(&source, 105, "mro");

    env.enqueue(&item).await;
    env.consumer(Arc::new(FakeToolkit::new())).await.drain().await.unwrap();
    let first_counts = env.row_counts().await;

    std::fs::write(&source, b"second").unwrap();
    env.enqueue(&item).await;
    let stats = env.consumer(Arc::new(FakeToolkit::new())).await.drain().await.unwrap();
    assert_eq!(stats.succeeded, 1);

    assert_eq!(env.row_counts().await, first_counts);
    let upcid = env.upcid_by_isisid(SERIAL).await.unwrap();
    assert_eq!(
        env.text_value("meta_strings", upcid, 9).await,
        Some(format!("{:x}", md5::compute(b"second")))
    );
}

#[tokio::test]
async fn test_framelet_merge_chains_odd_output() {
    let env = create_test_env(MRO_STEPS).await.unwrap();
    let source = env.write_source("I01001001RDR.QUB", b"themis");
    env.enqueue(&WorkItem::new(&source, 201, "themis")).await;

    let toolkit = Arc::new(FakeToolkit::new());
    let stats = env.consumer(toolkit.clone()).await.drain().await.unwrap();

    assert_eq!(stats.succeeded, 1, "stats: {}", stats.display_string());
    assert_eq!(
        toolkit.executed(),
        vec!["thmproc", "handmos", "spiceinit", "caminfo"]
    );
    assert_eq!(count(&env.upc, "meta_bands").await, 3);
    assert!(env.workarea_entries().is_empty());
}

#[tokio::test]
async fn test_success_after_late_failure_clears_failure_rows() {
    let env = create_test_env(MRO_STEPS).await.unwrap();
    let source = env.write_source("P01_006.IMG", b"x");
    let item = WorkItem::new(&source, 901, "mro");

    env.enqueue(&item).await;
    env.consumer(Arc::new(FakeToolkit::failing_on("footprintinit")))
        .await
        .drain()
        .await
        .unwrap();
    let upcid = env.upcid_by_isisid(SERIAL).await.unwrap();
    assert_eq!(env.error_flag(upcid).await, Some(true));

    // Rerun succeeds, but the report carries no centroid
    env.enqueue(&item).await;
    let toolkit = FakeToolkit::new().omitting(&["CentroidLongitude", "CentroidLatitude"]);
    let stats = env.consumer(Arc::new(toolkit)).await.drain().await.unwrap();
    assert_eq!(stats.succeeded, 1);

    assert_eq!(env.upcid_by_isisid(SERIAL).await, Some(upcid));
    assert_eq!(env.error_flag(upcid).await, Some(false));
    assert_eq!(env.audit_outcome(901).await, Some(true));
    assert_eq!(
        env.text_value("meta_geometries", upcid, 5).await.as_deref(),
        Some("MULTIPOLYGON (((354 -4, 355 -4, 355 -5, 354 -4)))")
    );
    assert!(env.text_value("meta_geometries", upcid, 6).await.is_none());
    assert!(env.text_value("meta_strings", upcid, 2).await.is_none());
    assert!(env.text_value("meta_strings", upcid, 3).await.is_none());

    let sentinels: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM meta_geometries WHERE value = ?")
        .bind(upc_process::services::persistence::SENTINEL_GEOMETRY)
        .fetch_one(&env.upc)
        .await
        .unwrap();
    assert_eq!(sentinels, 0);
}

#[tokio::test]
async fn test_missing_footprint_drops_stale_geometry() {
    let env = create_test_env(MRO_STEPS).await.unwrap();
    let source = env.write_source("P01_007.IMG", b"x");
    let item = WorkItem::new(&source, 902, "mro");

    env.enqueue(&item).await;
    env.consumer(Arc::new(FakeToolkit::failing_on("caminfo")))
        .await
        .drain()
        .await
        .unwrap();

    env.enqueue(&item).await;
    let toolkit = FakeToolkit::new().omitting(&["GisFootprint"]);
    env.consumer(Arc::new(toolkit)).await.drain().await.unwrap();

    let upcid = env.upcid_by_isisid(SERIAL).await.unwrap();
    assert!(env.text_value("meta_geometries", upcid, 5).await.is_none());
    assert_eq!(
        env.text_value("meta_geometries", upcid, 6).await.as_deref(),
        Some("POINT (354.25 -4.5)")
    );
}
