//! Re-fetches stale API entries once connectivity comes back.

use crate::fetcher::FetchRequest;
use crate::freshness::is_within_ttl;
use crate::models::{Category, RequestKey};
use crate::services::CacheService;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use url::Url;

/// Tag of the connectivity-restored signal this layer reacts to.
pub const BACKGROUND_SYNC_TAG: &str = "background-sync";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SyncEvent {
    pub tag: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub refreshed: usize,
    pub failed: usize,
    /// Api entries still within their TTL.
    pub skipped: usize,
}

enum Outcome {
    Refreshed,
    Failed,
    Skipped,
}

impl CacheService {
    /// Handles a sync event; events with other tags are ignored.
    pub async fn handle_sync(&self, event: &SyncEvent) -> Option<SyncReport> {
        if event.tag != BACKGROUND_SYNC_TAG {
            return None;
        }
        info!("Background sync triggered");
        Some(self.reconcile_stale_api_entries().await)
    }

    /// Scans the dynamic area and re-fetches every stale Api entry. Entries
    /// are independent; one failing does not stop the others.
    pub async fn reconcile_stale_api_entries(&self) -> SyncReport {
        let area = self.config().area_for(Category::Api);
        let ttl = self.config().ttl(Category::Api);

        let keys: Vec<RequestKey> = self
            .storage()
            .entry_keys(&area)
            .await
            .iter()
            .filter_map(|url| Url::parse(url).ok())
            .filter_map(RequestKey::from_url)
            .filter(|key| self.classify(key) == Category::Api)
            .collect();

        let refreshes = keys.iter().map(|key| {
            let area = area.as_str();
            async move {
                let Some(entry) = self.storage().match_entry(area, key).await else {
                    return Outcome::Skipped;
                };
                if is_within_ttl(entry.fetched_at, ttl, self.now()) {
                    return Outcome::Skipped;
                }
                let request = FetchRequest::get(key.url().clone()).bypass_http_cache();
                match self.fetch_and_store(request, key, Category::Api).await {
                    Ok(parts) if parts.is_success() => Outcome::Refreshed,
                    Ok(parts) => {
                        warn!("Background sync got {} for {}", parts.status, key);
                        Outcome::Failed
                    }
                    Err(e) => {
                        warn!("Background sync failed for {}: {}", key, e);
                        Outcome::Failed
                    }
                }
            }
        });

        let mut report = SyncReport::default();
        for outcome in join_all(refreshes).await {
            match outcome {
                Outcome::Refreshed => report.refreshed += 1,
                Outcome::Failed => report.failed += 1,
                Outcome::Skipped => report.skipped += 1,
            }
        }
        info!(
            "Background sync done: {} refreshed, {} failed, {} fresh",
            report.refreshed, report.failed, report.skipped
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheConfig;
    use crate::fetcher::mock::ScriptedFetcher;
    use crate::freshness::{Clock, ManualClock};
    use crate::models::{InterceptedRequest, ResponseParts};
    use crate::store::CacheStorage;
    use bytes::Bytes;
    use http::{HeaderMap, StatusCode};
    use std::sync::Arc;
    use std::time::Duration;

    const MINUTE: Duration = Duration::from_secs(60);

    fn setup() -> (CacheService, Arc<ScriptedFetcher>, Arc<ManualClock>) {
        let fetcher = Arc::new(ScriptedFetcher::new());
        let clock = Arc::new(ManualClock::new(0));
        let config = CacheConfig::new(Url::parse("http://localhost:8081").unwrap());
        let service = CacheService::new(
            Arc::new(config),
            CacheStorage::new(),
            fetcher.clone(),
            clock.clone(),
        );
        (service, fetcher, clock)
    }

    async fn seed(service: &CacheService, url: &str, body: &'static str, at: u64) {
        let key = RequestKey::from_url(Url::parse(url).unwrap()).unwrap();
        let area = service.config().area_for(Category::Api);
        service
            .storage()
            .put(&area, &key, ResponseParts::new(StatusCode::OK, HeaderMap::new(), body), at)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_refreshes_only_stale_api_entries() {
        let (service, fetcher, clock) = setup();
        seed(&service, "http://localhost:8081/api/cars.json", "old", 0).await;
        seed(&service, "http://localhost:8081/car-detail/1", "page", 0).await;
        clock.advance(31 * MINUTE);
        seed(&service, "http://localhost:8081/api/brands", "recent", clock.now_millis()).await;
        fetcher.respond("http://localhost:8081/api/cars.json", StatusCode::OK, "new");

        let report = service.reconcile_stale_api_entries().await;
        assert_eq!(
            report,
            SyncReport {
                refreshed: 1,
                failed: 0,
                skipped: 1
            }
        );
        assert_eq!(fetcher.calls(), 1);

        let area = service.config().area_for(Category::Api);
        let key = RequestKey::from_url(Url::parse("http://localhost:8081/api/cars.json").unwrap()).unwrap();
        let entry = service.storage().match_entry(&area, &key).await.unwrap();
        assert_eq!(entry.response_parts.body, Bytes::from("new"));
        assert_eq!(entry.fetched_at, clock.now_millis());
    }

    #[tokio::test]
    async fn test_failures_do_not_abort_scan() {
        let (service, fetcher, clock) = setup();
        seed(&service, "http://localhost:8081/api/a", "a", 0).await;
        seed(&service, "http://localhost:8081/api/b", "b", 0).await;
        seed(&service, "http://localhost:8081/api/c", "c", 0).await;
        clock.advance(45 * MINUTE);
        fetcher.respond("http://localhost:8081/api/a", StatusCode::OK, "a2");
        fetcher.respond("http://localhost:8081/api/b", StatusCode::BAD_GATEWAY, "");

        let report = service.reconcile_stale_api_entries().await;
        assert_eq!(report.refreshed, 1);
        assert_eq!(report.failed, 2);
        assert_eq!(fetcher.calls(), 3);
    }

    #[tokio::test]
    async fn test_only_background_sync_tag() {
        let (service, fetcher, clock) = setup();
        seed(&service, "http://localhost:8081/api/cars.json", "old", 0).await;
        clock.advance(60 * MINUTE);
        fetcher.respond("http://localhost:8081/api/cars.json", StatusCode::OK, "new");

        let ignored = SyncEvent {
            tag: "periodic".to_string(),
        };
        assert!(service.handle_sync(&ignored).await.is_none());
        assert_eq!(fetcher.calls(), 0);

        let event = SyncEvent {
            tag: BACKGROUND_SYNC_TAG.to_string(),
        };
        let report = service.handle_sync(&event).await.unwrap();
        assert_eq!(report.refreshed, 1);
    }

    #[tokio::test]
    async fn test_refreshed_entry_serves_offline_again() {
        let (service, fetcher, clock) = setup();
        let url = "http://localhost:8081/api/cars.json";
        seed(&service, url, "old", 0).await;
        clock.advance(40 * MINUTE);
        fetcher.respond(url, StatusCode::OK, "synced");
        service.reconcile_stale_api_entries().await;

        fetcher.set_offline(true);
        let request = InterceptedRequest::get(Url::parse(url).unwrap());
        match service.intercept(&request).await {
            crate::models::Interception::Respond(resolved) => {
                assert_eq!(resolved.parts.body, Bytes::from("synced"));
            }
            crate::models::Interception::PassThrough => panic!("api request passed through"),
        }
    }
}
