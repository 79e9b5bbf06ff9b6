//! HTTP mapping of domain errors.
//!
//! Client errors carry their message. Server errors are logged in full and
//! answered with a generic body.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use domains::DomainError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("{0}")]
    BadRequest(String),
    #[error("payload too large")]
    PayloadTooLarge,
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Domain(err) => match err {
                DomainError::NotFound { .. } | DomainError::CategoryNotFound(_) => {
                    StatusCode::NOT_FOUND
                }
                DomainError::Validation(_) => StatusCode::BAD_REQUEST,
                DomainError::NotALeaf(_) => StatusCode::UNPROCESSABLE_ENTITY,
                DomainError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
                DomainError::Forbidden(_) => StatusCode::FORBIDDEN,
                DomainError::Conflict(_) => StatusCode::CONFLICT,
                DomainError::IncompleteHierarchy(_)
                | DomainError::HierarchyTooDeep(_)
                | DomainError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
            "internal server error".to_string()
        } else {
            self.to_string()
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_errors_map_to_statuses() {
        let cases = [
            (DomainError::not_found("listing", 1), StatusCode::NOT_FOUND),
            (DomainError::CategoryNotFound(3), StatusCode::NOT_FOUND),
            (DomainError::validation("bad"), StatusCode::BAD_REQUEST),
            (DomainError::Unauthorized("no".into()), StatusCode::UNAUTHORIZED),
            (DomainError::Forbidden("no".into()), StatusCode::FORBIDDEN),
            (DomainError::Conflict("dup".into()), StatusCode::CONFLICT),
            (DomainError::NotALeaf(2), StatusCode::UNPROCESSABLE_ENTITY),
            (DomainError::IncompleteHierarchy(7), StatusCode::INTERNAL_SERVER_ERROR),
            (DomainError::HierarchyTooDeep(9), StatusCode::INTERNAL_SERVER_ERROR),
            (DomainError::internal("db"), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status(), status);
        }
    }

    #[tokio::test]
    async fn server_errors_hide_detail() {
        let response = ApiError::from(DomainError::internal("password=hunter2")).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(!text.contains("hunter2"));
        assert!(text.contains("internal server error"));
    }
}
