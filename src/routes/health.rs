use axum::{Json, extract::State};
use serde::Serialize;

use crate::{AppState, result::ApiResult};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub tracked_buckets: usize,
}

pub async fn health(State(state): State<AppState>) -> Json<ApiResult<HealthResponse>> {
    Json(ApiResult::success(HealthResponse {
        status: "ok",
        tracked_buckets: state.limiter.registry().len(),
    }))
}
