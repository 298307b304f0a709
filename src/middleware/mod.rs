use crate::models::ResponseSource;
use hyper::{HeaderMap, header::{HeaderName, HeaderValue}};


pub const CACHE_STATUS_HEADER: &str = "x-cache";

pub fn cache_status(source: Option<ResponseSource>) -> &'static str {
    match source {
        Some(ResponseSource::Cache) => "HIT",
        Some(ResponseSource::StaleCache) => "STALE",
        Some(ResponseSource::Network) => "MISS",
        Some(ResponseSource::Synthetic) => "SYNTHETIC",
        None => "BYPASS",
    }
}

/// Marks where a response came from. `None` means the cache layer did not
/// handle the request.
pub fn add_cache_status_header(headers: &mut HeaderMap, source: Option<ResponseSource>) {
    headers.insert(
        HeaderName::from_static(CACHE_STATUS_HEADER),
        HeaderValue::from_static(cache_status(source)),
    );
}
