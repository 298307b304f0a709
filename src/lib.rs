pub mod classifier;
pub mod config;
pub mod errors;
pub mod fetcher;
pub mod freshness;
pub mod handlers;
pub mod lifecycle;
pub mod middleware;
pub mod models;
pub mod server;
pub mod services;
pub mod store;
pub mod sync;

pub use config::CacheConfig;
pub use errors::CacheError;
pub use models::{CacheEntry, Category, Interception, RequestKey, ResponseParts, WorkerState};
pub use server::AppState;
pub use services::CacheService;
pub use store::CacheStorage;
