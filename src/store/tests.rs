use crate::models::{RequestKey, ResponseParts};
use crate::store::CacheStorage;
use crate::CacheError;
use bytes::Bytes;
use http::{HeaderMap, HeaderValue, StatusCode};
use url::Url;

fn key(url: &str) -> RequestKey {
    RequestKey::from_url(Url::parse(url).unwrap()).unwrap()
}

#[tokio::test]
async fn test_cache_round_trip() {
    let storage = CacheStorage::new();
    let cache_key = key("http://localhost:8081/style.css");
    let mut headers = HeaderMap::new();
    headers.insert("content-type", HeaderValue::from_static("text/css"));
    let body = Bytes::from("body { color: red; }");

    storage
        .put(
            "car-widget-static-v1",
            &cache_key,
            ResponseParts::new(StatusCode::OK, headers.clone(), body.clone()),
            1_000,
        )
        .await
        .unwrap();

    let cached = storage.match_entry("car-widget-static-v1", &cache_key).await;
    assert!(cached.is_some());

    if let Some(entry) = cached {
        assert_eq!(entry.response_parts.status, StatusCode::OK);
        assert_eq!(entry.response_parts.body, body);
        assert_eq!(entry.response_parts.headers, headers);
        assert_eq!(entry.fetched_at, 1_000);
    }
}

#[tokio::test]
async fn test_query_is_part_of_the_key() {
    let storage = CacheStorage::new();
    storage
        .put(
            "dynamic",
            &key("http://localhost:8081/api/cars.json?page=1"),
            ResponseParts::new(StatusCode::OK, HeaderMap::new(), "page one"),
            0,
        )
        .await
        .unwrap();

    assert!(storage
        .match_entry("dynamic", &key("http://localhost:8081/api/cars.json?page=2"))
        .await
        .is_none());
    assert!(storage
        .match_entry("dynamic", &key("http://localhost:8081/api/cars.json?page=1"))
        .await
        .is_some());
}

#[tokio::test]
async fn test_last_write_wins() {
    let storage = CacheStorage::new();
    let cache_key = key("http://localhost:8081/index.html");
    for (body, at) in [("first", 1), ("second", 2)] {
        storage
            .put("static", &cache_key, ResponseParts::new(StatusCode::OK, HeaderMap::new(), body), at)
            .await
            .unwrap();
    }
    let entry = storage.match_entry("static", &cache_key).await.unwrap();
    assert_eq!(entry.response_parts.body, Bytes::from("second"));
    assert_eq!(entry.fetched_at, 2);
    assert_eq!(storage.entry_count("static").await, 1);
}

#[tokio::test]
async fn test_area_management() {
    let storage = CacheStorage::new();
    storage.open("car-widget-v0").await;
    storage.open("car-widget-static-v1").await;
    storage.open("car-widget-static-v1").await;

    let mut names = storage.keys().await;
    names.sort();
    assert_eq!(names, vec!["car-widget-static-v1", "car-widget-v0"]);

    assert!(storage.delete("car-widget-v0").await);
    assert!(!storage.delete("car-widget-v0").await);
    assert!(!storage.has("car-widget-v0").await);
    assert!(storage.has("car-widget-static-v1").await);
}

#[tokio::test]
async fn test_quota_rejects_write() {
    let storage = CacheStorage::with_quota(Some(10));
    let small = key("http://localhost:8081/a.css");
    let large = key("http://localhost:8081/b.css");

    storage
        .put("static", &small, ResponseParts::new(StatusCode::OK, HeaderMap::new(), "12345"), 0)
        .await
        .unwrap();

    let result = storage
        .put("static", &large, ResponseParts::new(StatusCode::OK, HeaderMap::new(), "1234567890"), 0)
        .await;
    assert!(matches!(result, Err(CacheError::CacheStorageFailure(_))));
    assert!(storage.match_entry("static", &large).await.is_none());

    // Replacing an entry only counts the difference.
    storage
        .put("static", &small, ResponseParts::new(StatusCode::OK, HeaderMap::new(), "1234567890"), 0)
        .await
        .unwrap();
}
