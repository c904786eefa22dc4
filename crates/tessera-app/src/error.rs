//! Application-level error type.
//!
//! [`AppError`] collects the errors of the lower layers for the CLI.

use tessera_auth::{AuthorizationDenied, PolicyError};
use tessera_lua::NormalizeError;
use tessera_runtime::config::ConfigError;
use tessera_runtime::{LimitError, ResourceError};
use tessera_types::ErrorCode;
use thiserror::Error;

/// Unified application error.
///
/// # Example
///
/// ```
/// use tessera_app::AppError;
/// use tessera_auth::{AuthorizationDenied, DenialReason};
/// use tessera_types::ErrorCode;
///
/// let err: AppError = AuthorizationDenied { reason: DenialReason::PlanRestricted }.into();
/// assert_eq!(err.code(), "AUTH_DENIED");
/// ```
#[derive(Debug, Error)]
pub enum AppError {
    /// Configuration could not be loaded.
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// The configured policy table is inconsistent.
    #[error("Policy error: {0}")]
    Policy(#[from] PolicyError),

    /// The gate rejected the request.
    #[error("{0}")]
    Denied(#[from] AuthorizationDenied),

    /// A limiter rejected the request.
    #[error("{0}")]
    Limited(#[from] LimitError),

    /// A resource could not be provided.
    #[error("Resource error: {0}")]
    Resource(#[from] ResourceError),

    /// Typed source could not be normalized.
    #[error("Normalize error: {0}")]
    Normalize(#[from] NormalizeError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ErrorCode for AppError {
    fn code(&self) -> &'static str {
        match self {
            Self::Config(e) => e.code(),
            Self::Policy(e) => e.code(),
            Self::Denied(e) => e.code(),
            Self::Limited(e) => e.code(),
            Self::Resource(e) => e.code(),
            Self::Normalize(e) => e.code(),
            Self::Io(_) => "APP_IO_ERROR",
        }
    }

    fn is_recoverable(&self) -> bool {
        match self {
            Self::Config(e) => e.is_recoverable(),
            Self::Policy(e) => e.is_recoverable(),
            Self::Denied(e) => e.is_recoverable(),
            Self::Limited(e) => e.is_recoverable(),
            Self::Resource(e) => e.is_recoverable(),
            Self::Normalize(e) => e.is_recoverable(),
            Self::Io(_) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_error_converts() {
        let err: AppError = LimitError::RateLimited { retry_after_ms: 10 }.into();
        assert!(matches!(err, AppError::Limited(_)));
        assert_eq!(err.code(), "RATE_LIMITED");
        assert!(err.is_recoverable());
    }

    #[test]
    fn io_error_code() {
        let err: AppError = std::io::Error::new(std::io::ErrorKind::NotFound, "x").into();
        assert_eq!(err.code(), "APP_IO_ERROR");
    }
}
