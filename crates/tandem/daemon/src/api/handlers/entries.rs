//! Entry handlers

use crate::api::auth::Bearer;
use crate::api::state::AppState;
use crate::error::ApiResult;
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use tandem_core::CoordinatorApi;
use tandem_types::{Entry, EntryKey};

/// Read query parameters
#[derive(Debug, Default, Deserialize)]
pub struct ReadQuery {
    /// Wait for the entry to be written
    #[serde(default)]
    pub wait: bool,
    pub timeout_ms: Option<u64>,
}

/// Write an entry; the request body is the raw value
pub async fn write_entry(
    State(state): State<AppState>,
    Bearer(credential): Bearer,
    Path(key): Path<String>,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<Entry>)> {
    let key = EntryKey::parse(&key)?;
    let entry = state
        .coordinator
        .write_entry(&credential, &key, body.to_vec())
        .await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

/// Read an entry. Without `wait` this returns `null` for an unwritten key.
pub async fn read_entry(
    State(state): State<AppState>,
    Bearer(credential): Bearer,
    Path(key): Path<String>,
    Query(query): Query<ReadQuery>,
) -> ApiResult<Json<Option<Entry>>> {
    let key = EntryKey::parse(&key)?;
    let entry = if query.wait {
        let limit = state.wait_limit(query.timeout_ms);
        Some(
            state
                .coordinator
                .read_entry(&credential, &key, Some(limit))
                .await?,
        )
    } else {
        state.coordinator.try_read_entry(&credential, &key).await?
    };
    Ok(Json(entry))
}
