use crate::handlers::{handle_rejection, is_local_host, resolve_target_url};
use crate::lifecycle::{Command, CommandSender, Lifecycle};
use crate::middleware::add_cache_status_header;
use crate::models::{InterceptedRequest, Interception};
use crate::services::CacheService;
use crate::sync::SyncEvent;
use bytes::Bytes;
use hyper::header::HOST;
use hyper::{Body, HeaderMap, Method, Response};
use std::convert::Infallible;
use std::time::Instant;
use tracing::info;
use warp::{Filter, Rejection, Reply};

/// Everything the routes share.
#[derive(Clone)]
pub struct AppState {
    pub service: CacheService,
    pub lifecycle: Lifecycle,
    pub commands: CommandSender,
}

pub fn routes(state: AppState) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    let local = local_only(state.service.clone());
    let state_filter = warp::any().map(move || state.clone());

    let health_check = warp::path("health")
        .and(warp::path::end())
        .and(local.clone())
        .and(warp::get())
        .map(|| "OK");

    let message = warp::path!("__sw" / "message")
        .and(local.clone())
        .and(warp::post())
        .and(warp::body::json())
        .and(state_filter.clone())
        .and_then(handle_message);

    let sync = warp::path!("__sw" / "sync")
        .and(local)
        .and(warp::post())
        .and(warp::body::json())
        .and(state_filter.clone())
        .and_then(handle_sync_event);

    let intercept = warp::any()
        .and(warp::method())
        .and(warp::header::headers_cloned())
        .and(warp::path::full())
        .and(warp::query::raw().or_else(|_| async { Ok::<(String,), Infallible>((String::new(),)) }))
        .and(warp::body::bytes())
        .and(state_filter)
        .and_then(handle_intercept);

    health_check
        .or(message)
        .or(sync)
        .or(intercept)
        .recover(handle_rejection)
}

/// Management routes answer only requests addressed to the gateway; the
/// same paths on any other host fall through to interception.
fn local_only(service: CacheService) -> impl Filter<Extract = (), Error = Rejection> + Clone {
    warp::header::optional::<String>("host")
        .and_then(move |host: Option<String>| {
            let local = is_local_host(service.config(), host.as_deref());
            async move {
                if local {
                    Ok(())
                } else {
                    Err(warp::reject::not_found())
                }
            }
        })
        .untuple_one()
}

async fn handle_message(command: Command, state: AppState) -> Result<impl Reply, Rejection> {
    let ack = state.commands.send(command).await;
    Ok(warp::reply::json(&ack))
}

async fn handle_sync_event(event: SyncEvent, state: AppState) -> Result<impl Reply, Rejection> {
    let report = state.service.handle_sync(&event).await;
    Ok(warp::reply::json(&report))
}

async fn handle_intercept(
    method: Method,
    headers: HeaderMap,
    full_path: warp::path::FullPath,
    query: String,
    body: Bytes,
    state: AppState,
) -> Result<Response<Body>, Rejection> {
    let start_time = Instant::now();

    let host = headers.get(HOST).and_then(|h| h.to_str().ok());
    let url = resolve_target_url(state.service.config(), host, full_path.as_str(), &query)
        .map_err(warp::reject::custom)?;

    let request = InterceptedRequest {
        method,
        url,
        headers,
        body,
    };

    let outcome = if state.lifecycle.is_controlling().await {
        state.service.intercept(&request).await
    } else {
        Interception::PassThrough
    };

    let (parts, source) = match outcome {
        Interception::Respond(resolved) => (resolved.parts, Some(resolved.source)),
        Interception::PassThrough => {
            let parts = state
                .service
                .pass_through(&request)
                .await
                .map_err(warp::reject::custom)?;
            (parts, None)
        }
    };

    let mut response = parts.into_response();
    add_cache_status_header(response.headers_mut(), source);

    info!(
        "{} {} {} {:?} {}ms",
        request.method,
        request.url,
        response.status(),
        source,
        start_time.elapsed().as_millis()
    );

    Ok(response)
}
