//! Identity registration and resolution handlers

use crate::api::auth::Bearer;
use crate::api::state::AppState;
use crate::error::ApiResult;
use axum::{
    extract::{Path, State},
    Json,
};
use tandem_core::CoordinatorApi;
use tandem_types::wire::{RegisterRequest, ResolveResponse};
use tandem_types::{Identity, UserId};

/// Register a new identity. The only unauthenticated call.
pub async fn register_identity(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> ApiResult<Json<Identity>> {
    let identity = state.coordinator.register(request.user_id).await?;
    Ok(Json(identity))
}

/// Resolve a user id to its endpoint
pub async fn resolve_identity(
    State(state): State<AppState>,
    Bearer(credential): Bearer,
    Path(user_id): Path<String>,
) -> ApiResult<Json<ResolveResponse>> {
    let user_id = UserId::parse(user_id)?;
    let endpoint = state.coordinator.resolve(&credential, &user_id).await?;
    Ok(Json(ResolveResponse { user_id, endpoint }))
}
