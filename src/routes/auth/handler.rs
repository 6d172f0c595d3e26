use axum::Json;

use crate::result::ApiResult;

use super::model::{AuthAck, CredentialsRequest};

pub async fn login(Json(req): Json<CredentialsRequest>) -> Json<ApiResult<AuthAck>> {
    acknowledge("login", req)
}

pub async fn register(Json(req): Json<CredentialsRequest>) -> Json<ApiResult<AuthAck>> {
    acknowledge("register", req)
}

fn acknowledge(endpoint: &'static str, req: CredentialsRequest) -> Json<ApiResult<AuthAck>> {
    tracing::debug!("Forwarding {} request for {}", endpoint, req.user_id);
    Json(ApiResult::success(AuthAck {
        user_id: req.user_id,
        endpoint,
    }))
}
