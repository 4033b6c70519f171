//! The two-stage check pipeline and its result record.
//!
//! `run_check` never fails: format rejections and verifier errors are both
//! folded into the [`CheckResult`] so the caller always has exactly one
//! record to serialize. Only the process driver decides exit codes.

use std::fmt::Display;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::format::is_valid_format;

/// Per-stage detail of a [`CheckResult`].
///
/// `verify_email` is `None` exactly when `format` is false — verification
/// is never attempted for a syntactically invalid address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checks {
    pub format: bool,
    pub verify_email: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The single record emitted per invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    pub email: String,
    pub is_valid: bool,
    pub reason: String,
    pub checks: Checks,
}

/// Seam for the deliverability probe.
///
/// One attempt per call: `Ok(true)` means the mailbox plausibly exists,
/// `Ok(false)` means it was definitively rejected, and any inconclusive
/// outcome (timeout, DNS failure, temporary SMTP status) surfaces as an
/// error whose `Display` text ends up in the result record.
pub trait MailboxVerifier {
    type Error: Display;

    fn verify(&self, email: &str) -> Result<bool, Self::Error>;
}

/// Run the format gate and, if it passes, one verification attempt.
pub fn run_check<V: MailboxVerifier>(email: &str, verifier: &V) -> CheckResult {
    let format_ok = is_valid_format(email);
    debug!(email, format_ok, "format check");

    if !format_ok {
        return CheckResult {
            email: email.to_string(),
            is_valid: false,
            reason: "Invalid email format".to_string(),
            checks: Checks {
                format: false,
                verify_email: None,
                error: None,
            },
        };
    }

    match verifier.verify(email) {
        Ok(exists) => {
            debug!(email, exists, "verification finished");
            CheckResult {
                email: email.to_string(),
                is_valid: exists,
                reason: if exists {
                    "Email verified successfully".to_string()
                } else {
                    "Email does not exist".to_string()
                },
                checks: Checks {
                    format: true,
                    verify_email: Some(exists),
                    error: None,
                },
            }
        }
        Err(err) => {
            let message = err.to_string();
            debug!(email, error = %message, "verification failed");
            CheckResult {
                email: email.to_string(),
                is_valid: false,
                reason: format!("Verification failed: {message}"),
                checks: Checks {
                    format: true,
                    verify_email: Some(false),
                    error: Some(message),
                },
            }
        }
    }
}
