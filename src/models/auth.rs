//! Authentication Models
//!
//! Users as reported by the identity provider, and the sign-up forms that
//! are validated before anything is sent to it.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Minimum password length accepted by the identity provider
pub const MIN_PASSWORD_LENGTH: usize = 6;

/// Signed-in user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    /// Provider user id; also the key of the user's stats document
    pub uid: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
}

/// Credential produced by the interactive (popup) sign-in in the browser
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdpCredential {
    /// e.g. `google.com`
    pub provider_id: String,
    pub id_token: String,
}

/// Request for a passwordless activation link
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailLinkRequest {
    pub email: String,
}

/// Completion of the email-link sign-up
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinishSignupRequest {
    pub email: String,
    pub oob_code: String,
    pub password: String,
    pub confirm_password: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

/// Form errors caught before submission
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignupValidationError {
    #[error("Passwords do not match")]
    PasswordMismatch,

    #[error("Password must be at least {0} characters")]
    PasswordTooShort(usize),

    #[error("Invalid email address: {0}")]
    InvalidEmail(String),

    #[error("Activation code is missing")]
    MissingOobCode,
}

/// Loose shape check; the provider does the real verification
pub fn validate_email(email: &str) -> Result<(), SignupValidationError> {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    let pattern = EMAIL.get_or_init(|| {
        Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email pattern is valid")
    });

    if pattern.is_match(email.trim()) {
        Ok(())
    } else {
        Err(SignupValidationError::InvalidEmail(email.to_string()))
    }
}

impl FinishSignupRequest {
    /// Validate the form in the order the user sees the messages
    pub fn validate(&self) -> Result<(), SignupValidationError> {
        validate_email(&self.email)?;

        if self.oob_code.trim().is_empty() {
            return Err(SignupValidationError::MissingOobCode);
        }

        if self.password != self.confirm_password {
            return Err(SignupValidationError::PasswordMismatch);
        }

        if self.password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(SignupValidationError::PasswordTooShort(MIN_PASSWORD_LENGTH));
        }

        Ok(())
    }
}
