//! Mapping from service errors to HTTP responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::{error, warn};

/// Response body shared by unknown tenants and non-members, so a caller
/// cannot probe which tenants exist.
const OPAQUE_NOT_FOUND: &str = "Not found";

#[derive(Debug)]
pub enum ApiError {
    /// No usable identity on the request.
    Unauthorized(String),
    Service(tacit_core::Error),
}

impl From<tacit_core::Error> for ApiError {
    fn from(err: tacit_core::Error) -> Self {
        ApiError::Service(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        use tacit_core::Error::*;
        match self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Service(err) => match err {
                TenantNotFound(_) | NotAuthorized(_) | NotFound(_) => StatusCode::NOT_FOUND,
                InsufficientRole { .. } | PlanUpgradeRequired { .. } => StatusCode::FORBIDDEN,
                InvalidInput(_) => StatusCode::BAD_REQUEST,
                Persistence(_) => StatusCode::SERVICE_UNAVAILABLE,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        use tacit_core::Error::*;
        let status = self.status();
        let body = match self {
            ApiError::Unauthorized(msg) => serde_json::json!({ "error": msg }),
            ApiError::Service(err) => match err {
                TenantNotFound(_) | NotAuthorized(_) => {
                    serde_json::json!({ "error": OPAQUE_NOT_FOUND })
                }
                PlanUpgradeRequired { required, current } => serde_json::json!({
                    "error": "plan_upgrade_required",
                    "required_plan": required,
                    "current_plan": current,
                }),
                InsufficientRole { required, .. } => serde_json::json!({
                    "error": "insufficient_role",
                    "required_role": required,
                }),
                InvalidInput(msg) | NotFound(msg) => serde_json::json!({ "error": msg }),
                Persistence(msg) => {
                    error!(subsystem = "api", error = %msg, "Persistence unavailable");
                    serde_json::json!({ "error": "Service temporarily unavailable" })
                }
                other => {
                    warn!(subsystem = "api", error = %other, "Request failed");
                    serde_json::json!({ "error": "Internal server error" })
                }
            },
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tacit_core::{Error, PlanTier, Role};

    #[test]
    fn test_status_mapping() {
        let cases = [
            (Error::TenantNotFound("x".into()), StatusCode::NOT_FOUND),
            (Error::NotAuthorized("x".into()), StatusCode::NOT_FOUND),
            (
                Error::InsufficientRole {
                    required: Role::Admin,
                    actual: Role::Viewer,
                },
                StatusCode::FORBIDDEN,
            ),
            (
                Error::PlanUpgradeRequired {
                    required: PlanTier::Starter,
                    current: PlanTier::Free,
                },
                StatusCode::FORBIDDEN,
            ),
            (Error::InvalidInput("x".into()), StatusCode::BAD_REQUEST),
            (Error::NotFound("x".into()), StatusCode::NOT_FOUND),
            (Error::Persistence("x".into()), StatusCode::SERVICE_UNAVAILABLE),
            (Error::Enrichment("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status(), status);
        }
        assert_eq!(
            ApiError::Unauthorized("missing".into()).status(),
            StatusCode::UNAUTHORIZED
        );
    }
}
