// crates/clace-server/src/error_response.rs
// ============================================================================
// Module: Error Response Mapping
// Description: Maps `ClaceError` kinds onto HTTP status codes and the
//              `{ "code": int, "message": string }` JSON body (spec.md §7).
// Purpose: Give every handler one `IntoResponse` impl instead of each
//          re-deriving the kind-to-status table.
// Dependencies: axum, clace-core, serde
// ============================================================================

use axum::Json;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use clace_core::ClaceError;
use serde::Serialize;

/// Wire shape of an error response (spec.md §7).
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// HTTP status code, duplicated in the body for clients that only
    /// inspect the payload.
    pub code: u16,
    /// Human-readable error message; not guaranteed stable across
    /// releases, unlike the underlying `ClaceError` kind.
    pub message: String,
}

/// Thin wrapper so [`ClaceError`] can be returned directly from an axum
/// handler.
pub struct ApiError(pub ClaceError);

impl From<ClaceError> for ApiError {
    fn from(err: ClaceError) -> Self {
        Self(err)
    }
}

/// Maps a [`ClaceError`] kind onto its HTTP status code (spec.md §7).
#[must_use]
pub const fn status_for(err: &ClaceError) -> StatusCode {
    match err {
        ClaceError::NotFound(_) => StatusCode::NOT_FOUND,
        ClaceError::Duplicate(_) => StatusCode::CONFLICT,
        ClaceError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
        ClaceError::NeedsApproval(_, _) => StatusCode::FORBIDDEN,
        ClaceError::SourceFetch(_) => StatusCode::BAD_GATEWAY,
        ClaceError::Conflict(_) => StatusCode::CONFLICT,
        ClaceError::PermissionDenied(_) => StatusCode::FORBIDDEN,
        ClaceError::DependencyFailed(_) => StatusCode::SERVICE_UNAVAILABLE,
        ClaceError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        let body = ErrorBody {
            code: status.as_u16(),
            message: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use clace_core::ClaceError;

    use super::status_for;

    #[test]
    fn not_found_maps_to_404() {
        assert_eq!(status_for(&ClaceError::NotFound("x".to_string())), StatusCode::NOT_FOUND);
    }

    #[test]
    fn needs_approval_maps_to_403() {
        assert_eq!(status_for(&ClaceError::NeedsApproval(1, 0)), StatusCode::FORBIDDEN);
    }

    #[test]
    fn duplicate_maps_to_409() {
        assert_eq!(status_for(&ClaceError::Duplicate("x".to_string())), StatusCode::CONFLICT);
    }
}
