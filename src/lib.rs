#![forbid(unsafe_code)]
//! email_check — single-address e-mail checking: fast syntactic filter,
//! then an SMTP deliverability probe, summarized as one [`CheckResult`].

pub mod check;
pub mod format;
pub mod verify;

pub use check::{CheckResult, Checks, MailboxVerifier, run_check};
pub use format::is_valid_format;
pub use verify::{ProbeOptions, SmtpVerifier, VerifyError};
