//! One-time passwords for phone-based verification.
//!
//! OTPs live next to the payment flow because they share its shape: a
//! side-channel confirmation arriving out of band from the original
//! request. They are single-use and expire after a fixed window.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::order::PhoneNumber;

/// What an OTP was issued for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OtpPurpose {
    Login,
    Registration,
    PasswordReset,
}

impl OtpPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            OtpPurpose::Login => "login",
            OtpPurpose::Registration => "registration",
            OtpPurpose::PasswordReset => "password_reset",
        }
    }
}

impl std::fmt::Display for OtpPurpose {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Errors raised when verifying an OTP.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum OtpError {
    #[error("OTP has expired")]
    Expired,

    #[error("OTP has already been used")]
    AlreadyUsed,

    #[error("OTP code does not match")]
    CodeMismatch,
}

/// A single-use verification code sent to a phone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Otp {
    pub phone: PhoneNumber,
    pub code: String,
    pub purpose: OtpPurpose,
    pub expires_at: DateTime<Utc>,
    pub used: bool,
    pub created_at: DateTime<Utc>,
}

impl Otp {
    /// How long a code stays valid after issue.
    pub const VALIDITY_MINUTES: i64 = 5;

    /// Issues a new OTP valid for [`Self::VALIDITY_MINUTES`] from `now`.
    pub fn issue(
        phone: PhoneNumber,
        code: impl Into<String>,
        purpose: OtpPurpose,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            phone,
            code: code.into(),
            purpose,
            expires_at: now + Duration::minutes(Self::VALIDITY_MINUTES),
            used: false,
            created_at: now,
        }
    }

    /// Verifies the submitted code, consuming the OTP on success.
    pub fn verify(&mut self, submitted: &str, now: DateTime<Utc>) -> Result<(), OtpError> {
        if self.used {
            return Err(OtpError::AlreadyUsed);
        }
        if now >= self.expires_at {
            return Err(OtpError::Expired);
        }
        if self.code != submitted {
            return Err(OtpError::CodeMismatch);
        }
        self.used = true;
        Ok(())
    }
}
