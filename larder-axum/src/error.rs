use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use larder_auth::AuthError;
use larder_blob::AssetError;
use larder_core::LarderError;

#[derive(Debug)]
pub struct LarderAxumError(pub anyhow::Error);

impl From<anyhow::Error> for LarderAxumError {
    fn from(e: anyhow::Error) -> Self {
        Self(e)
    }
}

impl From<LarderError> for LarderAxumError {
    fn from(e: LarderError) -> Self {
        Self(e.into_anyhow())
    }
}

impl From<AssetError> for LarderAxumError {
    fn from(e: AssetError) -> Self {
        LarderError::from(e).into()
    }
}

impl From<AuthError> for LarderAxumError {
    fn from(e: AuthError) -> Self {
        LarderError::from(e).into()
    }
}

impl IntoResponse for LarderAxumError {
    fn into_response(self) -> Response {
        // Preserve structured fields even when wrapped by anyhow contexts.
        let larder = match self.0.chain().find_map(|e| e.downcast_ref::<LarderError>()) {
            Some(larder) => larder.sanitize_for_client(),
            None => LarderError::general_error(self.0.to_string()).sanitize_for_client(),
        };

        let status =
            StatusCode::from_u16(larder.code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            tracing::error!(error = %format!("{:#}", self.0), "request failed");
        } else {
            tracing::debug!(error = %self.0, "request rejected");
        }

        (status, Json(larder.to_json())).into_response()
    }
}
