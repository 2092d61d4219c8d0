use std::collections::HashMap;

use chai_core::config::ChaiConfig;
use chai_core::error::ChaiError;
use chai_core::store::{CatalogStore, MemoryStore};
use chai_core::types::{DependencyType, PackageId, UrlType};
use chai_registries::Registry;
use chai_test::{fixture, homebrew_batch, ingest, init_tracing, pipeline};
use serde_json::json;

async fn ids_by_import_id(store: &MemoryStore, registry: Registry) -> HashMap<String, PackageId> {
    store
        .load_snapshot(registry)
        .await
        .unwrap()
        .packages
        .into_iter()
        .map(|p| (p.import_id, p.id))
        .collect()
}

fn full_reconciliation() -> ChaiConfig {
    ChaiConfig {
        ingest: chai_core::config::IngestSection {
            full_reconciliation: true,
        },
        ..ChaiConfig::default()
    }
}

// ── Every registry end to end ────────────────────────────────────

#[tokio::test]
async fn every_registry_fixture_ingests_cleanly() {
    init_tracing();
    let expected = [
        (Registry::Crates, 3, 3),
        (Registry::Homebrew, 5, 5),
        (Registry::Debian, 3, 3),
        (Registry::Pkgx, 3, 2),
        (Registry::Npm, 4, 3),
    ];

    for (registry, packages, edges) in expected {
        let store = MemoryStore::new();
        let stats = ingest(&store, registry, &fixture(registry)).await.unwrap();

        assert!(stats.errors.is_empty(), "{registry}: {:?}", stats.errors);
        assert_eq!(stats.applied.packages.insert, packages, "{registry}");
        assert_eq!(stats.applied.dependencies.insert, edges, "{registry}");

        let rank = stats.rank.unwrap();
        assert_eq!(rank.packages, packages, "{registry}");
        let total: f64 = store.load_ranks().await.unwrap().values().sum();
        assert!((total - 1.0).abs() < 1e-6, "{registry}: scores sum to {total}");
    }
}

#[tokio::test]
async fn homebrew_counts_unresolved_dependency() {
    init_tracing();
    let store = MemoryStore::new();
    let stats = ingest(&store, Registry::Homebrew, &homebrew_batch()).await.unwrap();
    // libidn2 is not in the batch.
    assert_eq!(stats.unresolved_dependencies(), 1);
}

#[tokio::test]
async fn debian_paragraphs_merge_into_one_package() {
    init_tracing();
    let store = MemoryStore::new();
    ingest(&store, Registry::Debian, &fixture(Registry::Debian)).await.unwrap();

    let snapshot = store.load_snapshot(Registry::Debian).await.unwrap();
    let ids = ids_by_import_id(&store, Registry::Debian).await;
    let curl = ids["debian/curl"];
    let libssl = ids["debian/libssl3"];

    // Runtime in the binary paragraph beats build in the source paragraph.
    let edge = snapshot
        .dependencies
        .iter()
        .find(|e| e.package_id == curl && e.dependency_id == libssl)
        .unwrap();
    assert_eq!(edge.dependency_type, DependencyType::Runtime);

    // A GitHub vcs_git is both source and repository.
    let curl_urls: Vec<UrlType> = snapshot
        .package_urls
        .iter()
        .filter(|l| l.package_id == curl)
        .filter_map(|l| snapshot.urls.iter().find(|u| u.id == l.url_id))
        .map(|u| u.url_type)
        .collect();
    assert_eq!(curl_urls.len(), 3);
    assert!(curl_urls.contains(&UrlType::Repository));
}

// ── Re-ingestion ─────────────────────────────────────────────────

#[tokio::test]
async fn rerun_is_idempotent() {
    init_tracing();
    let store = MemoryStore::new();
    let records = homebrew_batch();
    ingest(&store, Registry::Homebrew, &records).await.unwrap();
    let before = ids_by_import_id(&store, Registry::Homebrew).await;

    let stats = ingest(&store, Registry::Homebrew, &records).await.unwrap();
    assert_eq!(stats.applied.total(), 0);
    assert_eq!(ids_by_import_id(&store, Registry::Homebrew).await, before);
}

#[tokio::test]
async fn edge_type_follows_latest_batch() {
    init_tracing();
    let store = MemoryStore::new();
    ingest(&store, Registry::Homebrew, &homebrew_batch()).await.unwrap();

    let mut records = homebrew_batch();
    records[1] = json!({
        "formula": "curl",
        "description": "Get a file from an HTTP, HTTPS or FTP server",
        "homepage": "https://curl.se",
        "repository": "https://github.com/curl/curl",
        "dependencies": ["openssl@3"],
        "test_dependencies": ["pkgconf"]
    });
    let stats = ingest(&store, Registry::Homebrew, &records).await.unwrap();
    assert_eq!(stats.applied.dependencies.update, 1);

    let ids = ids_by_import_id(&store, Registry::Homebrew).await;
    let edges = store.load_dependency_edges().await.unwrap();
    let edge = edges
        .iter()
        .find(|e| e.package_id == ids["curl"] && e.dependency_id == ids["pkgconf"])
        .unwrap();
    assert_eq!(edge.dependency_type, DependencyType::Test);
}

#[tokio::test]
async fn malformed_record_does_not_stop_the_batch() {
    init_tracing();
    let store = MemoryStore::new();
    let mut records = homebrew_batch();
    records.push(json!({ "description": "formula name missing" }));

    let stats = ingest(&store, Registry::Homebrew, &records).await.unwrap();

    assert_eq!(stats.errors.len(), 1);
    assert!(matches!(stats.errors[0].1, ChaiError::Normalize(_)));
    assert_eq!(stats.applied.packages.insert, 5);
}

#[tokio::test]
async fn partial_batch_keeps_absent_packages() {
    init_tracing();
    let store = MemoryStore::new();
    ingest(&store, Registry::Homebrew, &homebrew_batch()).await.unwrap();

    let only_pkgconf = [json!({ "formula": "pkgconf", "homepage": "https://github.com/pkgconf/pkgconf" })];
    let stats = ingest(&store, Registry::Homebrew, &only_pkgconf).await.unwrap();

    assert_eq!(stats.applied.total(), 0);
    assert_eq!(store.stats().await.unwrap().packages, 5);
}

#[tokio::test]
async fn full_reconciliation_retires_missing_packages() {
    init_tracing();
    let store = MemoryStore::new();
    ingest(&store, Registry::Homebrew, &homebrew_batch()).await.unwrap();
    let retired = ids_by_import_id(&store, Registry::Homebrew).await["ca-certificates"];

    let records: Vec<_> = homebrew_batch()
        .into_iter()
        .filter(|r| r["formula"] != "ca-certificates")
        .collect();
    let stats = pipeline(Registry::Homebrew, full_reconciliation())
        .unwrap()
        .run(&store, &records)
        .await
        .unwrap();

    assert_eq!(stats.applied.packages.delete, 1);
    assert_eq!(stats.applied.package_urls.delete, 1);
    // openssl@3 → ca-certificates.
    assert_eq!(stats.applied.dependencies.delete, 1);

    assert!(!ids_by_import_id(&store, Registry::Homebrew).await.contains_key("ca-certificates"));
    assert!(!store.load_ranks().await.unwrap().contains_key(&retired));
    assert!(
        store
            .load_dependency_edges()
            .await
            .unwrap()
            .iter()
            .all(|e| e.dependency_id != retired)
    );
}

#[tokio::test]
async fn full_reconciliation_keeps_package_of_malformed_record() {
    init_tracing();
    let store = MemoryStore::new();
    ingest(&store, Registry::Homebrew, &homebrew_batch()).await.unwrap();
    let curl = ids_by_import_id(&store, Registry::Homebrew).await["curl"];

    let mut records = homebrew_batch();
    records[1] = json!({ "formula": "curl", "dependencies": "openssl@3" });
    let stats = pipeline(Registry::Homebrew, full_reconciliation())
        .unwrap()
        .run(&store, &records)
        .await
        .unwrap();

    assert_eq!(stats.errors.len(), 1);
    assert_eq!(stats.errors[0].0, "curl");
    assert_eq!(stats.applied.packages.delete, 0);
    assert_eq!(stats.applied.package_urls.delete, 0);
    assert_eq!(stats.applied.dependencies.delete, 0);

    let snapshot = store.load_snapshot(Registry::Homebrew).await.unwrap();
    assert!(snapshot.packages.iter().any(|p| p.id == curl));
    assert_eq!(snapshot.package_urls.iter().filter(|l| l.package_id == curl).count(), 2);
    assert_eq!(snapshot.dependencies.iter().filter(|e| e.package_id == curl).count(), 2);
    assert!(store.load_ranks().await.unwrap().contains_key(&curl));
}

#[tokio::test]
async fn null_dependency_lists_ingest() {
    init_tracing();
    let store = MemoryStore::new();
    let mut records = homebrew_batch();
    records[3] = json!({ "formula": "ca-certificates", "dependencies": null, "test_dependencies": null });

    let stats = ingest(&store, Registry::Homebrew, &records).await.unwrap();
    assert!(stats.errors.is_empty(), "{:?}", stats.errors);
    assert_eq!(stats.applied.packages.insert, 5);
}

// ── Ranking ──────────────────────────────────────────────────────

#[tokio::test]
async fn shared_dependencies_rank_highest() {
    init_tracing();
    let store = MemoryStore::new();
    ingest(&store, Registry::Homebrew, &homebrew_batch()).await.unwrap();

    let ids = ids_by_import_id(&store, Registry::Homebrew).await;
    let ranks = store.load_ranks().await.unwrap();
    assert!(ranks[&ids["openssl@3"]] > ranks[&ids["wget"]]);
    assert!(ranks[&ids["ca-certificates"]] > ranks[&ids["curl"]]);
    // openssl@3 passes its whole score on to ca-certificates.
    assert!(ranks[&ids["ca-certificates"]] > ranks[&ids["openssl@3"]]);
}

#[tokio::test]
async fn registries_share_one_ranking() {
    init_tracing();
    let store = MemoryStore::new();
    ingest(&store, Registry::Homebrew, &homebrew_batch()).await.unwrap();
    let stats = ingest(&store, Registry::Npm, &fixture(Registry::Npm)).await.unwrap();

    assert_eq!(stats.rank.unwrap().packages, 9);
    let ranks = store.load_ranks().await.unwrap();
    assert_eq!(ranks.len(), 9);
    let total: f64 = ranks.values().sum();
    assert!((total - 1.0).abs() < 1e-6);

    let by_registry = store.stats().await.unwrap().packages_by_registry;
    assert_eq!(by_registry["homebrew"], 5);
    assert_eq!(by_registry["npm"], 4);
}
