// Upload Relay - file uploads with per-client quotas and an upload history

pub mod config;
pub mod models;
pub mod types;
pub mod quota;     // Per-client byte/count quotas
pub mod ledger;    // Bounded in-memory upload history
pub mod storage;
pub mod uploads;   // Ticketing, transfer and completion
pub mod admin;
pub mod reconcile; // Purging history entries whose objects are gone
pub mod routes;
pub mod middleware;
pub mod utils;

// Re-exports for convenience
pub use config::Config;
pub use models::AppState;

pub fn create_router(state: AppState) -> axum::Router {
    routes::create_router(state)
}
