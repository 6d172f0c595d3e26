use serde::Serialize;

/// Envelope for successful route responses.
#[derive(Serialize)]
pub struct ApiResult<T: Serialize> {
    pub code: i32,
    pub content: T,
}

impl<T: Serialize> ApiResult<T> {
    pub fn success(content: T) -> Self {
        Self { code: 0, content }
    }
}
