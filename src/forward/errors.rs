//! Domain error taxonomy for the forward aggregates

#[cfg(feature = "http")]
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

#[cfg(feature = "http")]
use crate::error::ErrorResponse;

/// Errors the `ForwardAgent` / `ForwardRule` aggregates can return.
///
/// The domain never logs; the caller decides what to log and at what level.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    #[error("rule not found")]
    RuleNotFound,

    #[error("agent not found")]
    AgentNotFound,

    #[error("port already in use")]
    PortAlreadyUsed,

    #[error("rule is already enabled")]
    RuleAlreadyEnabled,

    #[error("rule is already disabled")]
    RuleAlreadyDisabled,

    #[error("invalid protocol")]
    InvalidProtocol,

    #[error("invalid target address")]
    InvalidTargetAddress,

    #[error("agent not connected")]
    AgentNotConnected,

    #[error("probe already in progress")]
    ProbeInProgress,

    #[error("no probe targets available")]
    NoProbeTargets,

    #[error("{0}")]
    ValidationError(String),
}

#[cfg(feature = "http")]
impl IntoResponse for DomainError {
    fn into_response(self) -> Response {
        let status = match self {
            DomainError::RuleNotFound | DomainError::AgentNotFound => StatusCode::NOT_FOUND,
            DomainError::PortAlreadyUsed => StatusCode::CONFLICT,
            DomainError::RuleAlreadyEnabled | DomainError::RuleAlreadyDisabled => StatusCode::OK,
            DomainError::InvalidProtocol
            | DomainError::InvalidTargetAddress
            | DomainError::ValidationError(_) => StatusCode::BAD_REQUEST,
            DomainError::AgentNotConnected => StatusCode::CONFLICT,
            DomainError::ProbeInProgress => StatusCode::CONFLICT,
            DomainError::NoProbeTargets => StatusCode::UNPROCESSABLE_ENTITY,
        };

        let body = ErrorResponse::new(status, self.to_string());
        (status, Json(body)).into_response()
    }
}

/// Authentication-path errors raised while verifying an agent's API token.
///
/// Kept distinct from [`DomainError`] because authentication failures carry
/// their own logging policy: some are routine (a stale token), others are
/// worth flagging as security events (a tampered or malformed token).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ForwardAuthError {
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("token does not match any known agent")]
    TokenMismatch,

    #[error("token failed integrity verification")]
    TokenTampering,

    #[error("agent is disabled")]
    AgentDisabled,
}

impl ForwardAuthError {
    /// Whether the application layer should emit a log line for this failure.
    ///
    /// Routine credential mismatches are expected traffic noise;
    /// everything else is worth recording.
    pub fn should_log(&self) -> bool {
        !matches!(self, ForwardAuthError::InvalidCredentials)
    }

    /// Whether this failure indicates a possible attack rather than routine
    /// misuse (expired token, typo) and should be routed to security monitoring.
    pub fn is_security_event(&self) -> bool {
        matches!(
            self,
            ForwardAuthError::TokenTampering | ForwardAuthError::TokenMismatch
        )
    }
}

#[cfg(feature = "http")]
impl IntoResponse for ForwardAuthError {
    fn into_response(self) -> Response {
        let status = match self {
            ForwardAuthError::InvalidCredentials | ForwardAuthError::TokenMismatch => {
                StatusCode::UNAUTHORIZED
            }
            ForwardAuthError::TokenTampering | ForwardAuthError::AgentDisabled => {
                StatusCode::FORBIDDEN
            }
        };

        // Deliberately uniform message: never reveal which check failed.
        let body = ErrorResponse::new(status, "authentication failed");
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_credentials_is_not_logged_or_security_event() {
        let err = ForwardAuthError::InvalidCredentials;
        assert!(!err.should_log());
        assert!(!err.is_security_event());
    }

    #[test]
    fn token_tampering_is_logged_and_security_event() {
        let err = ForwardAuthError::TokenTampering;
        assert!(err.should_log());
        assert!(err.is_security_event());
    }

    #[test]
    fn token_mismatch_is_security_event_but_routine_to_log() {
        let err = ForwardAuthError::TokenMismatch;
        assert!(err.should_log());
        assert!(err.is_security_event());
    }

    #[test]
    fn validation_error_carries_message() {
        let err = DomainError::ValidationError("listen port is required".to_string());
        assert_eq!(err.to_string(), "listen port is required");
    }
}
