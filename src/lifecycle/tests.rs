use crate::config::CacheConfig;
use crate::fetcher::mock::ScriptedFetcher;
use crate::freshness::ManualClock;
use crate::lifecycle::{spawn_command_loop, Ack, Command, Lifecycle};
use crate::models::{AreaPurpose, WorkerState};
use crate::services::CacheService;
use crate::store::CacheStorage;
use crate::CacheError;
use http::StatusCode;
use std::sync::Arc;
use url::Url;

const ORIGIN: &str = "http://localhost:8081";

fn manifest() -> Vec<Url> {
    ["/", "/style.css", "/index.html"]
        .iter()
        .map(|p| Url::parse(ORIGIN).unwrap().join(p).unwrap())
        .collect()
}

fn setup(config: CacheConfig) -> (Lifecycle, Arc<ScriptedFetcher>, CacheStorage) {
    let fetcher = Arc::new(ScriptedFetcher::new());
    let storage = CacheStorage::new();
    let service = CacheService::new(
        Arc::new(config),
        storage.clone(),
        fetcher.clone(),
        Arc::new(ManualClock::new(0)),
    );
    (Lifecycle::new(service), fetcher, storage)
}

fn default_setup() -> (Lifecycle, Arc<ScriptedFetcher>, CacheStorage) {
    setup(CacheConfig::new(Url::parse(ORIGIN).unwrap()).with_manifest(manifest()))
}

#[tokio::test]
async fn test_install_tolerates_partial_failure() {
    let (lifecycle, fetcher, storage) = default_setup();
    fetcher.respond("http://localhost:8081/", StatusCode::OK, "<html>");
    fetcher.respond("http://localhost:8081/style.css", StatusCode::OK, "body{}");
    fetcher.respond("http://localhost:8081/index.html", StatusCode::INTERNAL_SERVER_ERROR, "boom");

    let report = lifecycle.install().await.unwrap();
    assert_eq!(report.cached.len(), 2);
    assert_eq!(report.failed, vec!["http://localhost:8081/index.html".to_string()]);
    assert!(matches!(
        report.clone().into_result(),
        Err(CacheError::InstallPartialFailure(1))
    ));

    assert_eq!(storage.entry_count("car-widget-static-v1").await, 2);
    assert_eq!(lifecycle.state().await, WorkerState::Waiting);
}

#[tokio::test]
async fn test_install_only_once() {
    let (lifecycle, _fetcher, _storage) = default_setup();
    lifecycle.install().await.unwrap();
    assert!(matches!(lifecycle.install().await, Err(CacheError::InvalidState(_))));
}

#[tokio::test]
async fn test_activate_before_install_fails() {
    let (lifecycle, _fetcher, _storage) = default_setup();
    assert!(matches!(lifecycle.activate().await, Err(CacheError::InvalidState(_))));
    assert!(!lifecycle.is_controlling().await);
}

#[tokio::test]
async fn test_activate_deletes_old_generations() {
    let (lifecycle, _fetcher, storage) = default_setup();
    storage.open("car-widget-v0").await;
    storage.open("car-widget-static-v1").await;
    storage.open("car-widget-dynamic-v1").await;

    lifecycle.install().await.unwrap();
    let report = lifecycle.activate().await.unwrap();

    assert_eq!(report.deleted, vec!["car-widget-v0".to_string()]);
    assert!(!storage.has("car-widget-v0").await);
    assert!(storage.has("car-widget-static-v1").await);
    assert!(storage.has("car-widget-dynamic-v1").await);
    assert_eq!(lifecycle.state().await, WorkerState::Active);
    assert!(lifecycle.is_controlling().await);
}

#[tokio::test]
async fn test_repeated_activation_deletes_nothing() {
    let (lifecycle, _fetcher, storage) = default_setup();
    storage.open("car-widget-image-v1").await;
    lifecycle.install().await.unwrap();

    lifecycle.activate().await.unwrap();
    let again = lifecycle.activate().await.unwrap();
    assert!(again.deleted.is_empty());
    assert!(storage.has("car-widget-image-v1").await);
}

#[tokio::test]
async fn test_version_bump_evicts_previous_generation() {
    let config = CacheConfig::new(Url::parse(ORIGIN).unwrap())
        .with_manifest(manifest())
        .with_version("v2");
    let (lifecycle, _fetcher, storage) = setup(config);
    for purpose in AreaPurpose::ALL {
        storage.open(&format!("car-widget-{}-v1", purpose.as_str())).await;
    }

    lifecycle.install().await.unwrap();
    let mut report = lifecycle.activate().await.unwrap();
    report.deleted.sort();
    assert_eq!(
        report.deleted,
        vec![
            "car-widget-dynamic-v1".to_string(),
            "car-widget-image-v1".to_string(),
            "car-widget-static-v1".to_string(),
        ]
    );
    assert!(storage.has("car-widget-static-v2").await);
}

#[tokio::test]
async fn test_retired_worker_cannot_activate() {
    let (lifecycle, _fetcher, _storage) = default_setup();
    lifecycle.install().await.unwrap();
    lifecycle.activate().await.unwrap();
    lifecycle.retire().await;

    assert_eq!(lifecycle.state().await, WorkerState::Redundant);
    assert!(!lifecycle.is_controlling().await);
    assert!(matches!(lifecycle.activate().await, Err(CacheError::InvalidState(_))));
}

#[tokio::test]
async fn test_clear_cache_command() {
    let (lifecycle, _fetcher, storage) = default_setup();
    storage.open("car-widget-static-v1").await;
    storage.open("car-widget-dynamic-v1").await;

    let ack = lifecycle.handle_command(Command::ClearCache).await;
    assert_eq!(ack, Ack { success: true });
    assert!(storage.keys().await.is_empty());
}

#[tokio::test]
async fn test_update_cache_command_reports_failure() {
    let (lifecycle, fetcher, storage) = default_setup();
    fetcher.respond("http://localhost:8081/", StatusCode::OK, "<html>");
    fetcher.respond("http://localhost:8081/style.css", StatusCode::OK, "body{}");

    let ack = lifecycle.handle_command(Command::UpdateCache).await;
    assert!(!ack.success);
    assert_eq!(storage.entry_count("car-widget-static-v1").await, 2);

    fetcher.respond("http://localhost:8081/index.html", StatusCode::OK, "<html>");
    let ack = lifecycle.handle_command(Command::UpdateCache).await;
    assert!(ack.success);
    assert_eq!(storage.entry_count("car-widget-static-v1").await, 3);
}

#[tokio::test]
async fn test_command_channel_acknowledges() {
    let (lifecycle, _fetcher, storage) = default_setup();
    storage.open("car-widget-static-v1").await;

    let (sender, handle) = spawn_command_loop(lifecycle);
    let ack = sender.send(Command::ClearCache).await;
    assert!(ack.success);
    assert!(storage.keys().await.is_empty());

    drop(sender);
    handle.await.unwrap();
}

#[test]
fn test_command_wire_format() {
    let command: Command = serde_json::from_str(r#"{"type":"CLEAR_CACHE"}"#).unwrap();
    assert_eq!(command, Command::ClearCache);
    let command: Command = serde_json::from_str(r#"{"type":"UPDATE_CACHE"}"#).unwrap();
    assert_eq!(command, Command::UpdateCache);
    assert!(serde_json::from_str::<Command>(r#"{"type":"SKIP_WAITING"}"#).is_err());
    assert_eq!(
        serde_json::to_string(&Ack { success: true }).unwrap(),
        r#"{"success":true}"#
    );
}
