use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

use ledgerdesk_core::AggregateId;
use ledgerdesk_infra::{DispatchError, LifecycleError};

/// Every failure a handler can return, rendered as
/// `{"error": code, "message": ...}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    /// The primary document was saved; a later step failed.
    #[error("{message}")]
    Incomplete {
        document: AggregateId,
        message: String,
    },

    #[error("{0}")]
    Internal(String),
}

impl From<LifecycleError> for ApiError {
    fn from(value: LifecycleError) -> Self {
        match value {
            LifecycleError::Dispatch(e) => ApiError::Dispatch(e),
            incomplete @ LifecycleError::Incomplete { document, .. } => ApiError::Incomplete {
                document,
                message: incomplete.to_string(),
            },
        }
    }
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            ApiError::Forbidden(_) => (StatusCode::FORBIDDEN, "forbidden"),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            ApiError::Dispatch(e) => dispatch_status(e),
            ApiError::Incomplete { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "incomplete"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        }
    }
}

fn dispatch_status(err: &DispatchError) -> (StatusCode, &'static str) {
    match err {
        DispatchError::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error"),
        DispatchError::InvariantViolation(_) => {
            (StatusCode::UNPROCESSABLE_ENTITY, "invariant_violation")
        }
        DispatchError::Conflict(_) | DispatchError::Concurrency(_) => {
            (StatusCode::CONFLICT, "conflict")
        }
        DispatchError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
        DispatchError::Unauthorized => (StatusCode::FORBIDDEN, "unauthorized"),
        DispatchError::TenantIsolation(_) => (StatusCode::FORBIDDEN, "tenant_isolation"),
        DispatchError::Deserialize(_) => (StatusCode::INTERNAL_SERVER_ERROR, "deserialize_error"),
        DispatchError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "store_error"),
        DispatchError::Publish(_) => (StatusCode::INTERNAL_SERVER_ERROR, "publish_error"),
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        if status.is_server_error() {
            tracing::error!(error = %self, code, "request failed");
        }
        let body = match &self {
            ApiError::Incomplete { document, message } => json!({
                "error": code,
                "message": message,
                "document_id": document,
            }),
            other => json!({
                "error": code,
                "message": other.to_string(),
            }),
        };
        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_rejections_map_to_client_errors() {
        let cases = [
            (DispatchError::Validation("x".into()), StatusCode::BAD_REQUEST),
            (
                DispatchError::InvariantViolation("x".into()),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (DispatchError::Concurrency("x".into()), StatusCode::CONFLICT),
            (DispatchError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (DispatchError::Unauthorized, StatusCode::FORBIDDEN),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).into_response().status(), status);
        }
    }

    #[test]
    fn incomplete_operations_report_the_saved_document() {
        let document = AggregateId::new();
        let err = ApiError::from(LifecycleError::Incomplete {
            document,
            step: "posting",
            source: DispatchError::Publish("bus closed".into()),
        });
        match &err {
            ApiError::Incomplete { document: d, .. } => assert_eq!(*d, document),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(
            err.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
