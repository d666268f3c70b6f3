use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use iamgate_core::{AppError, FederationError};
use tracing::{error, warn};

mod types;

pub use types::ErrorResponse;

/// HTTP API error wrapper around core application errors.
#[derive(Debug)]
pub struct ApiError(pub AppError);

impl From<AppError> for ApiError {
    fn from(value: AppError) -> Self {
        Self(value)
    }
}

impl ApiError {
    fn status_and_message(&self) -> (StatusCode, String) {
        match &self.0 {
            AppError::Validation(_) => (StatusCode::BAD_REQUEST, self.0.to_string()),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, self.0.to_string()),
            AppError::Conflict(_) => (StatusCode::CONFLICT, self.0.to_string()),
            AppError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, self.0.to_string()),
            AppError::Forbidden(_) => (StatusCode::FORBIDDEN, self.0.to_string()),
            AppError::Federation(federation) => {
                (federation_status(federation), federation.public_message())
            }
            AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal error".to_owned(),
            ),
        }
    }
}

fn federation_status(error: &FederationError) -> StatusCode {
    match error {
        FederationError::UnsupportedCspType(_) => StatusCode::BAD_REQUEST,
        FederationError::IdentityRejected(_) => StatusCode::UNAUTHORIZED,
        FederationError::NoCspRoleMapping { .. } => StatusCode::NOT_FOUND,
        FederationError::RoleNotAssigned { .. }
        | FederationError::RoleNotFound(_)
        | FederationError::NoRolesAvailable
        | FederationError::AmbiguousRoleSelection(_)
        | FederationError::AssumeRoleFailed { .. } => StatusCode::FORBIDDEN,
        FederationError::IdentityExchangeFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = self.status_and_message();

        match &self.0 {
            AppError::Internal(detail) => error!(error = %detail, "request failed"),
            AppError::Federation(federation) => {
                warn!(error = %federation, status = %status, "federation request failed");
            }
            _ => {}
        }

        (status, Json(ErrorResponse::new(message))).into_response()
    }
}

/// Standard API result type.
pub type ApiResult<T> = Result<T, ApiError>;
