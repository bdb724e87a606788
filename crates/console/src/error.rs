//! Error responses of the console API

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use fleet_core::error::DispatchError;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Policy denied: {0}")]
    PolicyDenied(String),

    /// The fleet backend failed or refused the request
    #[error("Backend error: {0}")]
    Backend(String),
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR"),
            ApiError::PolicyDenied(_) => (StatusCode::FORBIDDEN, "POLICY_DENIED"),
            ApiError::Backend(_) => (StatusCode::BAD_GATEWAY, "BACKEND_ERROR"),
        };

        let body = ErrorResponse {
            error: self.to_string(),
            code: code.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

impl From<DispatchError> for ApiError {
    fn from(err: DispatchError) -> Self {
        let message = err.to_string();
        match err {
            DispatchError::InvalidIdentity(_) => ApiError::BadRequest(message),
            DispatchError::ProtectedNamespace { .. } => ApiError::PolicyDenied(message),
            DispatchError::Unsupported { .. } | DispatchError::InvalidArguments(_) => {
                ApiError::Validation(message)
            }
            DispatchError::Rejected { .. } => ApiError::Backend(message),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_core::models::{EntityIdentity, EntityKind};

    #[test]
    fn test_dispatch_errors_map_to_status_codes() {
        let protected: ApiError = DispatchError::ProtectedNamespace {
            command: "delete",
            identity: EntityIdentity::namespaced(EntityKind::Pod, "kube-system", "dns"),
        }
        .into();
        assert_eq!(protected.into_response().status(), StatusCode::FORBIDDEN);

        let unsupported: ApiError = DispatchError::Unsupported {
            command: "scale",
            kind: EntityKind::Pod,
        }
        .into();
        assert_eq!(
            unsupported.into_response().status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );

        let malformed: ApiError =
            DispatchError::InvalidIdentity(EntityIdentity::cluster(EntityKind::Pod, "p")).into();
        assert_eq!(malformed.into_response().status(), StatusCode::BAD_REQUEST);
    }
}
