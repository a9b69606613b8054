//! Shared handler helpers: engine error mapping and consistent error
//! bodies.

use axum::http::StatusCode;
use axum::Json;

use embedb_core::Error;

use crate::types::ErrorResponse;

/// Maps an engine error to an HTTP response.
///
/// Validation problems are the client's fault (400), unknown ids are 404,
/// capacity exhaustion is 507, a missing embedding backend is 503, and
/// anything internal is logged server-side and returned as a generic 500
/// so implementation details never leak to API consumers.
pub fn engine_error(context: &str, err: &Error) -> (StatusCode, Json<ErrorResponse>) {
    let status = match err {
        Error::DimensionMismatch { .. }
        | Error::InvalidTopK(_)
        | Error::PayloadTooLarge { .. } => StatusCode::BAD_REQUEST,
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        Error::RebuildInProgress => StatusCode::CONFLICT,
        Error::IndexFull { .. } => StatusCode::INSUFFICIENT_STORAGE,
        Error::Embedding(_) => StatusCode::SERVICE_UNAVAILABLE,
        Error::Corrupted(_) | Error::Io(_) | Error::Config(_) => {
            return internal_error(context, err);
        }
    };
    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
        }),
    )
}

/// Builds an internal server error response without leaking details.
///
/// The full error is logged via `tracing::error!`; the client sees only a
/// generic message.
pub fn internal_error(
    context: &str,
    err: &dyn std::fmt::Display,
) -> (StatusCode, Json<ErrorResponse>) {
    tracing::error!(%context, error = %err, "internal server error");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: format!("{context}: internal error"),
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_errors_are_400() {
        let (status, _) = engine_error(
            "upsert",
            &Error::DimensionMismatch {
                expected: 2,
                actual: 3,
            },
        );
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = engine_error("search", &Error::InvalidTopK(0));
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_not_found_is_404() {
        let (status, Json(body)) = engine_error("delete", &Error::NotFound(9));
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body.error.contains('9'));
    }

    #[test]
    fn test_internal_error_does_not_leak_details() {
        let detail = "task panicked with sensitive path /secret";
        let (status, Json(body)) = internal_error("search", &detail);
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body.error.contains("internal error"));
        assert!(!body.error.contains("sensitive"));
        assert!(!body.error.contains("/secret"));
    }
}
