use crate::classifier::classify;
use crate::config::CacheConfig;
use crate::errors::CacheError;
use crate::fetcher::{fetch_with_timeout, Credentials, FetchRequest, Fetcher, RequestMode};
use crate::freshness::{is_within_ttl, Clock};
use crate::models::{
    Category, InterceptedRequest, Interception, RequestKey, Resolved, ResponseParts,
    ResponseSource, Strategy,
};
use crate::store::CacheStorage;
use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderMap, HeaderValue, StatusCode};
use std::sync::Arc;
use tracing::{debug, info, warn};


pub const OFFLINE_BODY: &str = "Offline";
pub const RESOURCE_UNAVAILABLE_BODY: &str = "Resource not available";
pub const API_UNAVAILABLE_MESSAGE: &str = "API temporarily unavailable";

/// The strategy dispatcher. Cheap to clone; clones share storage, network
/// and clock.
#[derive(Clone)]
pub struct CacheService {
    config: Arc<CacheConfig>,
    storage: CacheStorage,
    fetcher: Arc<dyn Fetcher>,
    clock: Arc<dyn Clock>,
}

impl CacheService {
    pub fn new(
        config: Arc<CacheConfig>,
        storage: CacheStorage,
        fetcher: Arc<dyn Fetcher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            storage,
            fetcher,
            clock,
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn storage(&self) -> &CacheStorage {
        &self.storage
    }

    pub fn now(&self) -> u64 {
        self.clock.now_millis()
    }

    pub fn classify(&self, key: &RequestKey) -> Category {
        classify(&self.config.rules, key.url())
    }

    /// Entry point for every intercepted request. Non-GET and non-http(s)
    /// requests are left to the host.
    pub async fn intercept(&self, request: &InterceptedRequest) -> Interception {
        let Some(key) = RequestKey::from_request(request) else {
            return Interception::PassThrough;
        };

        let category = self.classify(&key);
        let resolved = match category.strategy() {
            Strategy::CacheFirst => self.cache_first(request, &key, category).await,
            Strategy::ImageCacheFirst => self.image_cache_first(request, &key).await,
            Strategy::NetworkFirst => self.network_first(request, &key).await,
            Strategy::StaleWhileRevalidate => self.stale_while_revalidate(request, &key).await,
        };

        debug!(
            "{} {} -> {} ({:?})",
            category,
            key,
            resolved.parts.status,
            resolved.source
        );
        Interception::Respond(resolved)
    }

    /// Fetches `request` and stores a 2xx response with the current time.
    /// A 304 re-stamps the cached copy through `record_fetch`. Other
    /// responses are returned but never stored; a failed storage write is
    /// logged and the response is still returned.
    pub(crate) async fn fetch_and_store(
        &self,
        request: FetchRequest,
        key: &RequestKey,
        category: Category,
    ) -> Result<ResponseParts, CacheError> {
        let limit = self.config.fetch_timeout(category);
        let response_parts = fetch_with_timeout(self.fetcher.as_ref(), request, limit).await?;

        if response_parts.is_success() {
            let area = self.config.area_for(category);
            if let Err(e) = self
                .storage
                .put(&area, key, response_parts.clone(), self.now())
                .await
            {
                warn!("Serving {} uncached: {}", key, e);
            }
        } else if response_parts.status == StatusCode::NOT_MODIFIED {
            let area = self.config.area_for(category);
            if self.storage.record_fetch(&area, key, self.now()).await {
                debug!("{} not modified, cached copy confirmed", key);
            }
        } else {
            debug!("Not caching {} with status {}", key, response_parts.status);
        }
        Ok(response_parts)
    }

    async fn fresh_entry(&self, key: &RequestKey, category: Category) -> Option<ResponseParts> {
        let area = self.config.area_for(category);
        let entry = self.storage.match_entry(&area, key).await?;
        is_within_ttl(entry.fetched_at, self.config.ttl(category), self.now())
            .then_some(entry.response_parts)
    }

    async fn any_entry(&self, key: &RequestKey, category: Category) -> Option<ResponseParts> {
        let area = self.config.area_for(category);
        self.storage
            .match_entry(&area, key)
            .await
            .map(|entry| entry.response_parts)
    }

    /// Static assets and fonts.
    async fn cache_first(
        &self,
        request: &InterceptedRequest,
        key: &RequestKey,
        category: Category,
    ) -> Resolved {
        if let Some(parts) = self.fresh_entry(key, category).await {
            return Resolved::new(parts, ResponseSource::Cache);
        }

        let mut fetch = FetchRequest::from(request);
        if category == Category::Font {
            fetch = fetch.mode(RequestMode::Cors);
        }

        match self.fetch_and_store(fetch, key, category).await {
            Ok(parts) => Resolved::new(parts, ResponseSource::Network),
            Err(e) => {
                warn!("{} fetch failed for {}: {}", category, key, e);
                match self.any_entry(key, category).await {
                    Some(parts) => Resolved::new(parts, ResponseSource::StaleCache),
                    None => Resolved::new(
                        ResponseParts::text(StatusCode::SERVICE_UNAVAILABLE, OFFLINE_BODY),
                        ResponseSource::Synthetic,
                    ),
                }
            }
        }
    }

    async fn image_cache_first(&self, request: &InterceptedRequest, key: &RequestKey) -> Resolved {
        let category = Category::Image;
        if let Some(parts) = self.fresh_entry(key, category).await {
            return Resolved::new(parts, ResponseSource::Cache);
        }

        let fetch = FetchRequest::from(request)
            .mode(RequestMode::Cors)
            .credentials(Credentials::Omit);

        match self.fetch_and_store(fetch, key, category).await {
            Ok(parts) => Resolved::new(parts, ResponseSource::Network),
            Err(e) => {
                warn!("Image fetch failed for {}: {}", key, e);
                match self.any_entry(key, category).await {
                    Some(parts) => Resolved::new(parts, ResponseSource::StaleCache),
                    None => Resolved::new(self.placeholder_image().await, ResponseSource::Synthetic),
                }
            }
        }
    }

    /// The remote placeholder when configured and reachable, otherwise an
    /// inline SVG. Never an error body.
    async fn placeholder_image(&self) -> ResponseParts {
        if let Some(url) = &self.config.placeholder.url {
            let request = FetchRequest::get(url.clone())
                .mode(RequestMode::Cors)
                .credentials(Credentials::Omit);
            let limit = self.config.fetch_timeout(Category::Image);
            match fetch_with_timeout(self.fetcher.as_ref(), request, limit).await {
                Ok(parts) if parts.is_success() => return parts,
                Ok(parts) => debug!("Placeholder {} answered {}", url, parts.status),
                Err(e) => debug!("Placeholder {} unavailable: {}", url, e),
            }
        }
        inline_placeholder(
            self.config.placeholder.width,
            self.config.placeholder.height,
            &self.config.placeholder.label,
        )
    }

    /// API requests: the network is always tried first.
    async fn network_first(&self, request: &InterceptedRequest, key: &RequestKey) -> Resolved {
        let category = Category::Api;
        let fetch = FetchRequest::from(request).bypass_http_cache();

        match self.fetch_and_store(fetch, key, category).await {
            Ok(parts) => Resolved::new(parts, ResponseSource::Network),
            Err(e) => {
                warn!("API fetch failed for {}, trying cache: {}", key, e);
                match self.fresh_entry(key, category).await {
                    Some(parts) => Resolved::new(parts, ResponseSource::Cache),
                    None => Resolved::new(api_unavailable(), ResponseSource::Synthetic),
                }
            }
        }
    }

    async fn stale_while_revalidate(&self, request: &InterceptedRequest, key: &RequestKey) -> Resolved {
        let category = Category::Default;
        let fetch = FetchRequest::from(request);

        if let Some(parts) = self.any_entry(key, category).await {
            let service = self.clone();
            let key = key.clone();
            tokio::spawn(async move {
                if let Err(e) = service.fetch_and_store(fetch, &key, category).await {
                    debug!("Revalidation of {} failed, keeping cached copy: {}", key, e);
                }
            });
            return Resolved::new(parts, ResponseSource::StaleCache);
        }

        match self.fetch_and_store(fetch, key, category).await {
            Ok(parts) => Resolved::new(parts, ResponseSource::Network),
            Err(e) => {
                warn!("Default fetch failed for {}: {}", key, e);
                Resolved::new(
                    ResponseParts::text(StatusCode::SERVICE_UNAVAILABLE, RESOURCE_UNAVAILABLE_BODY),
                    ResponseSource::Synthetic,
                )
            }
        }
    }

    /// Forwards a request the cache layer does not handle.
    pub async fn pass_through(&self, request: &InterceptedRequest) -> Result<ResponseParts, CacheError> {
        info!("Passing through {} {}", request.method, request.url);
        fetch_with_timeout(
            self.fetcher.as_ref(),
            FetchRequest::from(request),
            self.config.fetch_timeout(Category::Default),
        )
        .await
    }
}

/// `{"error": "API temporarily unavailable", "products": []}` with 503.
pub fn api_unavailable() -> ResponseParts {
    let body = serde_json::json!({
        "error": API_UNAVAILABLE_MESSAGE,
        "products": [],
    });
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    ResponseParts::new(
        StatusCode::SERVICE_UNAVAILABLE,
        headers,
        Bytes::from(body.to_string()),
    )
}

pub fn inline_placeholder(width: u32, height: u32, label: &str) -> ResponseParts {
    let label = label
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;");
    let svg = format!(
        concat!(
            r#"<svg width="{w}" height="{h}" xmlns="http://www.w3.org/2000/svg">"#,
            r##"<rect width="100%" height="100%" fill="#f0f0f0"/>"##,
            r##"<text x="50%" y="50%" text-anchor="middle" dy=".3em" font-size="16" fill="#999">{label}</text>"##,
            "</svg>"
        ),
        w = width,
        h = height,
        label = label
    );
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("image/svg+xml"));
    ResponseParts::new(StatusCode::OK, headers, svg)
}
