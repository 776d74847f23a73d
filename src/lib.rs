// gcs-bq-loader - incremental Cloud Storage to BigQuery loads with debounced, queued fan-out

pub mod auth;
pub mod config;
pub mod db;
pub mod dispatch;
pub mod jobs;
pub mod models;
pub mod orchestrator;
pub mod routes;
pub mod services;
pub mod state;
pub mod storage;
pub mod types;
pub mod utils;
pub mod warehouse;

// Re-exports for convenience
pub use config::Config;
pub use models::AppState;

pub fn create_router(state: AppState) -> axum::Router {
    routes::create_router(state)
}
