//! Sync API endpoints
//!
//! `POST /sync` ingests a client batch and returns the echo plus the server
//! delta; `GET /sync` returns the delta only.

use axum::{extract::State, routing::post, Router};
use serde::Deserialize;

use crate::error::Result;
use crate::extract::{Json, Query};
use crate::identity::UserContext;
use crate::state::AppState;
use crate::sync::{SyncCoordinator, SyncRequest, SyncResponse};

/// Create the sync router
pub fn router() -> Router<AppState> {
    Router::new().route("/", post(apply_and_diff).get(diff_only))
}

/// Apply client changes and return them together with the server delta
async fn apply_and_diff(
    State(state): State<AppState>,
    ctx: UserContext,
    Json(request): Json<SyncRequest>,
) -> Result<Json<SyncResponse>> {
    let coordinator = SyncCoordinator::new(state.db(), state.config().sync.missing_target);
    let response = coordinator.run(&ctx, request).await?;
    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
struct DiffParams {
    /// Epoch millis of the client's last successful sync
    last_sync_time: i64,
}

/// Return the server delta without ingesting anything
async fn diff_only(
    State(state): State<AppState>,
    ctx: UserContext,
    Query(params): Query<DiffParams>,
) -> Result<Json<SyncResponse>> {
    let coordinator = SyncCoordinator::new(state.db(), state.config().sync.missing_target);
    let response = coordinator.diff(&ctx, params.last_sync_time).await?;
    Ok(Json(response))
}
