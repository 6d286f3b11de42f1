//! Quadrant Server
//!
//! A self-hosted backend for the Quadrant Eisenhower-matrix todo app.
//! Offline-capable clients queue task mutations locally and reconcile them
//! through the sync engine in [`sync`]; the rest is thin CRUD around the
//! same repository.

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub mod config;
pub mod db;
pub mod error;
pub mod extract;
pub mod identity;
pub mod routes;
pub mod state;
pub mod sync;

pub use state::AppState;

/// Build the application router
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .nest("/health", routes::health::router())
        .nest("/tasks", routes::tasks::router())
        .nest("/sync", routes::sync::router())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
