use offline_gateway::{
    AppState,
    CacheConfig,
    CacheService,
    CacheStorage,
    fetcher::HyperFetcher,
    freshness::SystemClock,
    lifecycle::{spawn_command_loop, InstallReport, Lifecycle},
    server::routes,
};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("offline_gateway=info")),
        )
        .init();

    let config = match CacheConfig::from_env() {
        Ok(config) => Arc::new(config),
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    let storage = CacheStorage::with_quota(config.area_quota_bytes);
    let service = CacheService::new(
        config.clone(),
        storage,
        Arc::new(HyperFetcher::new()),
        Arc::new(SystemClock),
    );

    let lifecycle = Lifecycle::new(service.clone());
    match lifecycle.install().await.and_then(InstallReport::into_result) {
        Ok(report) => info!("Precached all {} static assets", report.cached.len()),
        Err(e) => warn!("Install incomplete, serving anyway: {}", e),
    }
    if let Err(e) = lifecycle.activate().await {
        error!("Activation failed: {}", e);
        std::process::exit(1);
    }

    let (commands, command_loop) = spawn_command_loop(lifecycle.clone());
    let state = AppState {
        service,
        lifecycle: lifecycle.clone(),
        commands,
    };

    let (addr, server) = warp::serve(routes(state))
        .bind_with_graceful_shutdown(config.listen_addr, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for shutdown signal: {}", e);
            }
        });

    info!("Offline gateway running on http://{} (origin {})", addr, config.origin);
    server.await;

    lifecycle.retire().await;
    command_loop.abort();
}
