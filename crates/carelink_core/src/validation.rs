//! crates/carelink_core/src/validation.rs
//!
//! Input shape checks shared by the core operations.

use crate::error::{AuthErrorKind, CareError, CareResult};
use regex::Regex;
use std::sync::OnceLock;

/// The identity provider refuses anything shorter.
pub const MIN_PASSWORD_LEN: usize = 6;

fn email_regex() -> &'static Regex {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL.get_or_init(|| {
        Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("static email pattern compiles")
    })
}

pub fn validate_email(email: &str) -> CareResult<()> {
    if email.trim().is_empty() {
        return Err(CareError::Validation("email is required".to_string()));
    }
    if !email_regex().is_match(email.trim()) {
        return Err(CareError::Validation(format!("'{}' is not a valid email", email.trim())));
    }
    Ok(())
}

pub fn validate_password(password: &str) -> CareResult<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(CareError::Auth(AuthErrorKind::WeakPassword));
    }
    Ok(())
}

pub fn require_text(field: &str, value: &str) -> CareResult<()> {
    if value.trim().is_empty() {
        return Err(CareError::Validation(format!("{} is required", field)));
    }
    Ok(())
}
