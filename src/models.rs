use bytes::Bytes;
use http::{HeaderMap, HeaderValue, Method, StatusCode};
use hyper::{Body, Response};
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

/// Request categories, each served by one caching strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    StaticAsset,
    Image,
    Api,
    Font,
    Default,
}

impl Category {
    pub fn strategy(self) -> Strategy {
        match self {
            Self::StaticAsset | Self::Font => Strategy::CacheFirst,
            Self::Image => Strategy::ImageCacheFirst,
            Self::Api => Strategy::NetworkFirst,
            Self::Default => Strategy::StaleWhileRevalidate,
        }
    }

    /// Which cache area stores responses of this category.
    pub fn area(self) -> AreaPurpose {
        match self {
            Self::StaticAsset | Self::Font => AreaPurpose::Static,
            Self::Image => AreaPurpose::Image,
            Self::Api | Self::Default => AreaPurpose::Dynamic,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::StaticAsset => "static",
            Self::Image => "image",
            Self::Api => "api",
            Self::Font => "font",
            Self::Default => "default",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    CacheFirst,
    ImageCacheFirst,
    NetworkFirst,
    StaleWhileRevalidate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AreaPurpose {
    Static,
    Dynamic,
    Image,
}

impl AreaPurpose {
    pub const ALL: [AreaPurpose; 3] = [Self::Static, Self::Dynamic, Self::Image];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Static => "static",
            Self::Dynamic => "dynamic",
            Self::Image => "image",
        }
    }
}

/// A request as seen at the interception boundary.
#[derive(Debug, Clone)]
pub struct InterceptedRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl InterceptedRequest {
    pub fn get(url: Url) -> Self {
        Self {
            method: Method::GET,
            url,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }
}

/// Identity of a cacheable request: the exact URL string of a GET.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey {
    url: Url,
}

impl RequestKey {
    /// Returns `None` for requests that must bypass the cache entirely
    /// (non-GET or non-http(s) schemes).
    pub fn from_request(request: &InterceptedRequest) -> Option<Self> {
        if request.method != Method::GET {
            return None;
        }
        Self::from_url(request.url.clone())
    }

    pub fn from_url(url: Url) -> Option<Self> {
        match url.scheme() {
            "http" | "https" => Some(Self { url }),
            _ => None,
        }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status, headers and a complete body.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseParts {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ResponseParts {
    pub fn new(status: StatusCode, headers: HeaderMap, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers,
            body: body.into(),
        }
    }

    pub fn text(status: StatusCode, body: &'static str) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(
            http::header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        Self::new(status, headers, body)
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn into_response(self) -> Response<Body> {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

/// A stored response together with its freshness record.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub response_parts: ResponseParts,
    /// Epoch milliseconds of the last successful network write.
    pub fetched_at: u64,
}

impl CacheEntry {
    pub fn size(&self) -> usize {
        self.response_parts.body.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    /// Fresh cached copy.
    Cache,
    /// Expired cached copy served because the network failed, or a cached
    /// copy served while revalidation runs.
    StaleCache,
    Network,
    Synthetic,
}

/// Outcome of a strategy: what to answer and where it came from.
#[derive(Debug, Clone)]
pub struct Resolved {
    pub parts: ResponseParts,
    pub source: ResponseSource,
}

impl Resolved {
    pub fn new(parts: ResponseParts, source: ResponseSource) -> Self {
        Self { parts, source }
    }
}

/// Result of offering a request to the cache layer.
#[derive(Debug, Clone)]
pub enum Interception {
    /// Not handled; the host should forward the request untouched.
    PassThrough,
    Respond(Resolved),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    Installing,
    Waiting,
    Active,
    Redundant,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Installing => "installing",
            Self::Waiting => "waiting",
            Self::Active => "active",
            Self::Redundant => "redundant",
        };
        f.write_str(name)
    }
}
