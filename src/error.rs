/// Unified error types for the Landhub backend
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for the service
#[derive(Error, Debug)]
pub enum AppError {
    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Authentication errors
    #[error("Authentication required: {0}")]
    Authentication(String),

    /// Missing permission; permission codes are not secret, so the code is
    /// surfaced to the caller
    #[error("Missing permission: {permission}")]
    Forbidden { permission: String },

    /// Admin-only operation attempted by a non-admin actor
    #[error("Not authorized: {0}")]
    Authorization(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Plain not-found (safe to disclose, e.g. public reads)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Mutation on a post that is either missing or not touchable by the
    /// actor; the two cases are deliberately indistinguishable
    #[error("Not allowed or not found")]
    NotAllowedOrNotFound,

    /// Conflict errors (e.g. duplicate favorite)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Bump attempted by someone other than the post owner
    #[error("Only the post owner can bump this listing")]
    NotOwner,

    /// Bump attempted without a live VIP membership
    #[error("No active membership")]
    NoActiveMembership,

    /// Active plan has a zero bump entitlement
    #[error("Current plan does not allow bumping")]
    NoBumpAllowed,

    /// Daily bump quota exhausted
    #[error("Daily bump limit of {limit} reached")]
    MaxDailyBumpReached { limit: i64 },

    /// Order state conflict: confirmation requires a PENDING order
    #[error("Order {0} is not pending")]
    OrderNotPending(i64),

    /// Reported payment amount does not match the order amount
    #[error("Paid amount {paid} does not match order amount {expected}")]
    AmountMismatch { paid: i64, expected: i64 },

    /// Referenced role is not registered (missing seed data)
    #[error("Role not found: {0}")]
    RoleNotFound(String),

    /// HTTP rate limit exceeded
    #[error("Rate limit exceeded, retry after {retry_after:?}")]
    RateLimitExceeded { retry_after: std::time::Duration },

    /// Internal server errors
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JWT errors
    #[error("JWT error: {0}")]
    Jwt(String),
}

impl AppError {
    /// Stable wire code for the `{ok:0, error, message}` response shape
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Database(_) => "INTERNAL_ERROR",
            AppError::Authentication(_) => "AUTHENTICATION_REQUIRED",
            AppError::Forbidden { .. } => "MISSING_PERMISSION",
            AppError::Authorization(_) => "FORBIDDEN",
            AppError::Validation(_) => "INVALID_REQUEST",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::NotAllowedOrNotFound => "NOT_ALLOWED_OR_NOT_FOUND",
            AppError::Conflict(_) => "CONFLICT",
            AppError::NotOwner => "NOT_OWNER",
            AppError::NoActiveMembership => "NO_ACTIVE_MEMBERSHIP",
            AppError::NoBumpAllowed => "NO_BUMP_ALLOWED",
            AppError::MaxDailyBumpReached { .. } => "MAX_DAILY_BUMP_REACHED",
            AppError::OrderNotPending(_) => "ORDER_NOT_PENDING",
            AppError::AmountMismatch { .. } => "AMOUNT_MISMATCH",
            AppError::RoleNotFound(_) => "ROLE_NOT_FOUND",
            AppError::RateLimitExceeded { .. } => "RATE_LIMIT_EXCEEDED",
            AppError::Internal(_) => "INTERNAL_ERROR",
            AppError::Io(_) => "INTERNAL_ERROR",
            AppError::Jwt(_) => "INVALID_TOKEN",
        }
    }
}

/// Error response wire format
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorResponse {
    pub ok: u8,
    pub error: String,
    pub message: String,
}

/// Convert AppError to HTTP response
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self {
            AppError::Authentication(_) | AppError::Jwt(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden { .. }
            | AppError::Authorization(_)
            | AppError::NotOwner
            | AppError::NoActiveMembership
            | AppError::NoBumpAllowed => StatusCode::FORBIDDEN,
            AppError::Validation(_)
            | AppError::OrderNotPending(_)
            | AppError::AmountMismatch { .. } => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) | AppError::NotAllowedOrNotFound => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::MaxDailyBumpReached { .. } | AppError::RateLimitExceeded { .. } => {
                StatusCode::TOO_MANY_REQUESTS
            }
            AppError::Database(_)
            | AppError::Internal(_)
            | AppError::Io(_)
            | AppError::RoleNotFound(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let message = match self {
            // Don't leak internals
            AppError::Database(_) | AppError::Internal(_) | AppError::Io(_) => {
                "Internal server error".to_string()
            }
            ref other => other.to_string(),
        };

        let body = Json(ApiErrorResponse {
            ok: 0,
            error: self.error_code().to_string(),
            message,
        });

        (status, body).into_response()
    }
}

/// Result type alias for service operations
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_are_stable() {
        assert_eq!(AppError::NotOwner.error_code(), "NOT_OWNER");
        assert_eq!(
            AppError::MaxDailyBumpReached { limit: 10 }.error_code(),
            "MAX_DAILY_BUMP_REACHED"
        );
        assert_eq!(
            AppError::NotAllowedOrNotFound.error_code(),
            "NOT_ALLOWED_OR_NOT_FOUND"
        );
        assert_eq!(AppError::OrderNotPending(5).error_code(), "ORDER_NOT_PENDING");
    }

    #[test]
    fn test_forbidden_surfaces_permission_code() {
        let err = AppError::Forbidden {
            permission: "post.approve".to_string(),
        };
        assert!(err.to_string().contains("post.approve"));
    }
}
