//! Authorization errors.

use crate::{AuthorizationDecision, DenialReason};
use tessera_types::ErrorCode;
use thiserror::Error;

/// A request was rejected by the gate.
///
/// Policy denials are final for the request as sent: the reason names the
/// offending values and nothing is silently narrowed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("authorization denied: {reason}")]
pub struct AuthorizationDenied {
    /// Why the request was rejected.
    pub reason: DenialReason,
}

impl ErrorCode for AuthorizationDenied {
    fn code(&self) -> &'static str {
        "AUTH_DENIED"
    }

    fn is_recoverable(&self) -> bool {
        false
    }
}

impl AuthorizationDecision {
    /// Converts the decision into the effective timeout, or the denial.
    ///
    /// # Errors
    ///
    /// Returns [`AuthorizationDenied`] when the request was not admitted.
    pub fn into_result(self) -> Result<u64, AuthorizationDenied> {
        match self.denial {
            None if self.admitted => Ok(self.effective_timeout_ms),
            Some(reason) => Err(AuthorizationDenied { reason }),
            None => Err(AuthorizationDenied {
                reason: DenialReason::PlanRestricted,
            }),
        }
    }
}
