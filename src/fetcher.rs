use crate::errors::CacheError;
use crate::models::{InterceptedRequest, ResponseParts};
use async_trait::async_trait;
use bytes::Bytes;
use http::header::{AUTHORIZATION, CACHE_CONTROL, CONNECTION, COOKIE, HOST, TRANSFER_ENCODING};
use http::{HeaderMap, HeaderValue, Method};
use hyper::client::HttpConnector;
use hyper::{Body, Client, Request, Uri};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use std::time::Duration;
use tokio::time::timeout;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestMode {
    #[default]
    SameOrigin,
    Cors,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Credentials {
    #[default]
    Include,
    /// Cookie and authorization headers are not sent.
    Omit,
}

#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub mode: RequestMode,
    pub credentials: Credentials,
    /// Ask intermediaries for a revalidated response.
    pub bypass_http_cache: bool,
}

impl FetchRequest {
    pub fn get(url: Url) -> Self {
        Self {
            method: Method::GET,
            url,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            mode: RequestMode::default(),
            credentials: Credentials::default(),
            bypass_http_cache: false,
        }
    }

    pub fn mode(mut self, mode: RequestMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn bypass_http_cache(mut self) -> Self {
        self.bypass_http_cache = true;
        self
    }

    /// Outgoing headers after applying mode, credentials and cache options.
    pub fn outgoing_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (name, value) in self.headers.iter() {
            if name == HOST {
                continue;
            }
            if self.credentials == Credentials::Omit && (name == COOKIE || name == AUTHORIZATION) {
                continue;
            }
            headers.append(name, value.clone());
        }
        if self.mode == RequestMode::Cors {
            headers.insert("sec-fetch-mode", HeaderValue::from_static("cors"));
        }
        if self.bypass_http_cache {
            headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        }
        headers
    }
}

impl From<&InterceptedRequest> for FetchRequest {
    fn from(request: &InterceptedRequest) -> Self {
        Self {
            method: request.method.clone(),
            url: request.url.clone(),
            headers: request.headers.clone(),
            body: request.body.clone(),
            ..Self::get(request.url.clone())
        }
    }
}

/// The network. Returns the complete response, whatever its status;
/// `Err` only when no response could be obtained.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: FetchRequest) -> Result<ResponseParts, CacheError>;
}

pub async fn fetch_with_timeout(
    fetcher: &dyn Fetcher,
    request: FetchRequest,
    limit: Duration,
) -> Result<ResponseParts, CacheError> {
    match timeout(limit, fetcher.fetch(request)).await {
        Ok(result) => result,
        Err(_) => Err(CacheError::Timeout(limit)),
    }
}

pub struct HyperFetcher {
    client: Client<HttpsConnector<HttpConnector>>,
}

impl HyperFetcher {
    pub fn new() -> Self {
        let https = HttpsConnectorBuilder::new()
            .with_native_roots()
            .https_or_http()
            .enable_http1()
            .build();
        Self {
            client: Client::builder().build(https),
        }
    }
}

impl Default for HyperFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Fetcher for HyperFetcher {
    async fn fetch(&self, request: FetchRequest) -> Result<ResponseParts, CacheError> {
        let uri: Uri = request.url.as_str().parse().map_err(|e: http::uri::InvalidUri| {
            tracing::warn!("Failed to parse URI {}: {}", request.url, e);
            CacheError::InvalidUri(e.to_string())
        })?;

        let mut req_builder = Request::builder().method(request.method.clone()).uri(uri);
        if let Some(headers) = req_builder.headers_mut() {
            *headers = request.outgoing_headers();
        }

        let req = req_builder
            .body(Body::from(request.body))
            .map_err(|e| CacheError::InvalidUri(e.to_string()))?;

        let response = self
            .client
            .request(req)
            .await
            .map_err(|e| CacheError::NetworkUnreachable(e.to_string()))?;

        let (parts, body) = response.into_parts();
        // A body cut off mid-stream is a network failure, never a cacheable response.
        let body_bytes = hyper::body::to_bytes(body)
            .await
            .map_err(|e| CacheError::NetworkUnreachable(e.to_string()))?;

        let mut headers = parts.headers;
        headers.remove(TRANSFER_ENCODING);
        headers.remove(CONNECTION);

        Ok(ResponseParts::new(parts.status, headers, body_bytes))
    }
}
