//! End-to-end scenarios: recorder, API server and viewer over real sockets.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use visitorlog::recorder::{ClientEnvironment, GeoInfo, IpGeoLookup};
use visitorlog::viewer::EmptyState;
use visitorlog::{Error, Reason, Record, RecordStore, Recorder, Result, Source, StoreResolver, Viewer};

mod common;

use common::{cache_in, sample_record, test_app, unreachable_remote, TestServer, FIREFOX_UA};

/// Lookup that never reaches the network.
struct OfflineLookup;

#[async_trait]
impl IpGeoLookup for OfflineLookup {
    async fn public_ip(&self) -> Result<String> {
        Err(Error::remote_unavailable("offline"))
    }

    async fn geo(&self) -> Result<GeoInfo> {
        Err(Error::remote_unavailable("offline"))
    }
}

fn browser_env() -> ClientEnvironment {
    ClientEnvironment {
        page: "/codex/index.html".to_string(),
        user_agent: FIREFOX_UA.to_string(),
        timezone: Some("Europe/Berlin".to_string()),
        ..ClientEnvironment::default()
    }
}

#[tokio::test]
async fn test_empty_store_shows_empty_state() {
    let server = TestServer::spawn(test_app()).await;
    let dir = tempfile::tempdir().unwrap();

    assert!(server.remote().list(100).await.unwrap().is_empty());

    let viewer = Viewer::load(StoreResolver::new(cache_in(&dir), Some(server.remote()), 5000)).await;
    assert!(viewer.source().is_server());
    assert_eq!(
        viewer.empty_state(""),
        Some(EmptyState::NoRecords { server: true })
    );

    server.stop().await;
}

#[tokio::test]
async fn test_reachable_server_append_then_clear() {
    let server = TestServer::spawn(test_app()).await;
    let dir = tempfile::tempdir().unwrap();
    let cache = cache_in(&dir);

    let mut recorder = Recorder::new(
        Arc::new(OfflineLookup),
        cache.clone(),
        Some(server.remote()),
        browser_env(),
    );
    let record = recorder.capture(Reason::InitialLoad).await.unwrap();
    recorder.flush().await;

    let listed = server.remote().list(100).await.unwrap();
    assert_eq!(listed, vec![record.clone()]);

    let mut viewer = Viewer::load(StoreResolver::new(cache.clone(), Some(server.remote()), 5000)).await;
    assert_eq!(
        viewer.source(),
        &Source::ServerFile {
            url: server.api_url()
        }
    );
    assert_eq!(viewer.records(), &[record]);
    // The server load is mirrored locally.
    assert_eq!(cache.read().len(), 1);

    viewer.clear().await.unwrap();
    assert!(server.remote().list(100).await.unwrap().is_empty());
    assert!(cache.read().is_empty());
    assert!(viewer.records().is_empty());

    server.stop().await;
}

#[tokio::test]
async fn test_unreachable_server_falls_back_to_cache() {
    let dir = tempfile::tempdir().unwrap();
    let cache = cache_in(&dir);

    let mut recorder = Recorder::new(
        Arc::new(OfflineLookup),
        cache.clone(),
        Some(unreachable_remote()),
        browser_env(),
    );
    let record = recorder.capture(Reason::InitialLoad).await.unwrap();
    recorder.flush().await;
    assert_eq!(record.ip(), "unavailable");
    assert_eq!(cache.read(), vec![record.clone()]);

    let viewer = Viewer::load(StoreResolver::new(cache, Some(unreachable_remote()), 5000)).await;
    assert_eq!(viewer.source(), &Source::BrowserCache);
    assert_eq!(
        viewer.source_label(),
        "Storage source: browser cache (API unavailable)"
    );
    assert_eq!(viewer.records(), &[record]);
}

#[tokio::test]
async fn test_failed_server_clear_leaves_mirror_intact() {
    let server = TestServer::spawn(test_app()).await;
    let dir = tempfile::tempdir().unwrap();
    let cache = cache_in(&dir);
    server.remote().append(&sample_record("10.0.0.1")).await.unwrap();

    let mut viewer = Viewer::load(StoreResolver::new(cache.clone(), Some(server.remote()), 5000)).await;
    assert!(viewer.source().is_server());
    server.stop().await;

    let err = viewer.clear().await.unwrap_err();
    assert!(err.is_clear_aborted());
    assert_eq!(cache.read().len(), 1);
    assert_eq!(viewer.records().len(), 1);
}

#[tokio::test]
async fn test_export_matches_loaded_records() {
    let server = TestServer::spawn(test_app()).await;
    let dir = tempfile::tempdir().unwrap();
    let remote = server.remote();
    for i in 0..4 {
        remote.append(&sample_record(&format!("10.0.0.{i}"))).await.unwrap();
    }

    let viewer = Viewer::load(StoreResolver::new(cache_in(&dir), Some(remote), 5000)).await;
    let out = tempfile::tempdir().unwrap();
    let path = viewer.export_to(out.path(), Utc::now()).unwrap();

    let exported: Vec<Record> =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(exported, viewer.records());
    assert_eq!(exported.len(), 4);

    server.stop().await;
}

#[tokio::test]
async fn test_client_skips_records_it_cannot_model() {
    let server = TestServer::spawn(test_app()).await;
    let remote = server.remote();
    let record = sample_record("10.0.0.1");
    remote.append(&record).await.unwrap();

    let response = reqwest::Client::new()
        .post(server.api_url())
        .json(&serde_json::json!({"id": "2-abcdef", "ip": null}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 201);

    assert_eq!(remote.list(100).await.unwrap(), vec![record]);

    server.stop().await;
}
