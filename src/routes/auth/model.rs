use serde::{Deserialize, Serialize};

/// Only the user id is read; the rest of the body is passed over.
#[derive(Debug, Deserialize)]
pub struct CredentialsRequest {
    pub user_id: String,
}

/// Acknowledgement returned once a request made it past the limiter.
/// Credential checks belong to the application mounted behind this service.
#[derive(Debug, Serialize)]
pub struct AuthAck {
    pub user_id: String,
    pub endpoint: &'static str,
}
