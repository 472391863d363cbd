//! crates/carelink_core/src/error.rs
//!
//! The error taxonomy of the core operations. Port failures are converted at the
//! repository boundary so callers can tell "not found" apart from "store unreachable".

use crate::ports::{IdentityError, PortError};
use std::fmt;

/// The closed set of identity failures the core distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthErrorKind {
    InvalidCredentials,
    AccountDisabled,
    WeakPassword,
    EmailTaken,
    Unknown,
}

impl AuthErrorKind {
    /// Maps a provider-specific error code onto the closed set.
    pub fn from_provider_code(code: &str) -> Self {
        let code = code.trim().to_ascii_uppercase();
        match code.as_str() {
            "INVALID_PASSWORD" | "EMAIL_NOT_FOUND" | "INVALID_LOGIN_CREDENTIALS"
            | "INVALID_ID_TOKEN" | "TOKEN_EXPIRED" => AuthErrorKind::InvalidCredentials,
            "USER_DISABLED" => AuthErrorKind::AccountDisabled,
            "EMAIL_EXISTS" => AuthErrorKind::EmailTaken,
            c if c.starts_with("WEAK_PASSWORD") => AuthErrorKind::WeakPassword,
            _ => AuthErrorKind::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AuthErrorKind::InvalidCredentials => "invalid_credentials",
            AuthErrorKind::AccountDisabled => "account_disabled",
            AuthErrorKind::WeakPassword => "weak_password",
            AuthErrorKind::EmailTaken => "email_taken",
            AuthErrorKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for AuthErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One write of a multi-document mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStep {
    InvitationStatus,
    CallerLink,
    PeerLink,
    InvitationDelete,
}

impl fmt::Display for WriteStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            WriteStep::InvitationStatus => "invitation status",
            WriteStep::CallerLink => "caller's relationship array",
            WriteStep::PeerLink => "peer's relationship array",
            WriteStep::InvitationDelete => "invitation deletion",
        };
        f.write_str(text)
    }
}

fn list_steps(steps: &[WriteStep]) -> String {
    if steps.is_empty() {
        return "nothing".to_string();
    }
    steps
        .iter()
        .map(|s| s.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, thiserror::Error)]
pub enum CareError {
    #[error("Invalid input: {0}")]
    Validation(String),
    #[error("No user is registered with email {0}")]
    UserNotFound(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Invitation {0} is no longer pending")]
    NotPending(String),
    #[error("Concurrent update detected: {0}")]
    Conflict(String),
    #[error("Not allowed: {0}")]
    Forbidden(String),
    #[error("Survey incomplete: {answered} of {expected} questions answered")]
    IncompleteSubmission { answered: usize, expected: usize },
    #[error("Authentication failed: {0}")]
    Auth(AuthErrorKind),
    #[error("Storage timed out: {0}")]
    Timeout(String),
    #[error("Storage failure: {0}")]
    Persistence(String),
    /// A multi-document mutation stopped halfway; `applied` writes are durable.
    #[error("Partially applied: {} updated, {failed} failed ({cause})", list_steps(.applied))]
    PartialWrite {
        applied: Vec<WriteStep>,
        failed: WriteStep,
        cause: Box<CareError>,
    },
}

/// A convenience type alias for `Result<T, CareError>`.
pub type CareResult<T> = Result<T, CareError>;

impl From<PortError> for CareError {
    fn from(err: PortError) -> Self {
        match err {
            PortError::NotFound(what) => CareError::NotFound(what),
            PortError::Conflict(what) => CareError::Conflict(what),
            PortError::Timeout(what) => CareError::Timeout(what),
            PortError::Unauthorized => CareError::Auth(AuthErrorKind::InvalidCredentials),
            PortError::Unexpected(what) => CareError::Persistence(what),
        }
    }
}

impl From<IdentityError> for CareError {
    fn from(err: IdentityError) -> Self {
        match err {
            IdentityError::Rejected { code } => {
                CareError::Auth(AuthErrorKind::from_provider_code(&code))
            }
            IdentityError::Port(e) => e.into(),
        }
    }
}

impl CareError {
    /// Wraps the failure of `failed` after `applied` already succeeded.
    /// With nothing applied yet the original error is returned unchanged.
    pub fn partial(applied: &[WriteStep], failed: WriteStep, cause: CareError) -> Self {
        if applied.is_empty() {
            return cause;
        }
        CareError::PartialWrite {
            applied: applied.to_vec(),
            failed,
            cause: Box::new(cause),
        }
    }
}
