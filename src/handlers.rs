use std::convert::Infallible;
use std::net::IpAddr;
use hyper::StatusCode;
use url::{Host, Url};
use warp::Reply;
use crate::config::CacheConfig;
use crate::errors::CacheError;


pub async fn handle_rejection(err: warp::Rejection) -> Result<impl warp::Reply, Infallible> {
    let (code, message) = if err.is_not_found() {
        (StatusCode::NOT_FOUND, "Not Found")
    } else if let Some(e) = err.find::<CacheError>() {
        match e {
            CacheError::NetworkUnreachable(_) => (StatusCode::BAD_GATEWAY, "Upstream unreachable"),
            CacheError::Timeout(_) => (StatusCode::GATEWAY_TIMEOUT, "Gateway timeout"),
            CacheError::InvalidUri(_) => (StatusCode::BAD_REQUEST, "Invalid request URI"),
            CacheError::InvalidState(_) => (StatusCode::CONFLICT, "Invalid lifecycle state"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error"),
        }
    } else if err.find::<warp::filters::body::BodyDeserializeError>().is_some() {
        (StatusCode::BAD_REQUEST, "Invalid message body")
    } else {
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
    };

    Ok(warp::reply::with_status(message.to_string(), code).into_response())
}

/// Whether a Host header addresses the gateway itself. A missing header
/// counts as local. Hostnames compare case-insensitively, and on a wildcard
/// bind any host reaching the listen port is local.
pub fn is_local_host(config: &CacheConfig, host: Option<&str>) -> bool {
    let Some(host) = host else {
        return true;
    };
    let Ok(url) = Url::parse(&format!("http://{}", host)) else {
        return false;
    };
    if url.port_or_known_default() != Some(config.listen_addr.port()) {
        return false;
    }

    let listen_ip = config.listen_addr.ip();
    match url.host() {
        Some(Host::Domain(name)) => name.eq_ignore_ascii_case("localhost") || listen_ip.is_unspecified(),
        Some(Host::Ipv4(ip)) => is_listen_ip(IpAddr::V4(ip), listen_ip),
        Some(Host::Ipv6(ip)) => is_listen_ip(IpAddr::V6(ip), listen_ip),
        None => false,
    }
}

fn is_listen_ip(ip: IpAddr, listen_ip: IpAddr) -> bool {
    ip.is_loopback() || ip == listen_ip || listen_ip.is_unspecified()
}

/// Rebuilds the absolute URL of an intercepted request. Requests addressed
/// to the gateway itself belong to the origin; anything else was sent
/// through the gateway as a forward proxy.
pub fn resolve_target_url(
    config: &CacheConfig,
    host: Option<&str>,
    path: &str,
    query: &str,
) -> Result<Url, CacheError> {
    let mut url = match host {
        Some(host) if !is_local_host(config, Some(host)) => Url::parse(&format!("http://{}{}", host, path)),
        _ => config.origin.join(path),
    }
    .map_err(|e| CacheError::InvalidUri(format!("{}: {}", path, e)))?;

    if !query.is_empty() {
        url.set_query(Some(query));
    }
    Ok(url)
}
