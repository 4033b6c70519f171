//! SMTP deliverability probing.
//!
//! [`SmtpVerifier`] is the shipped [`MailboxVerifier`]: MX discovery (with
//! A/AAAA fallback), a minimal SMTP dialogue per host, and a catch-all
//! probe, condensed to the boolean the check pipeline consumes.

mod dns;
mod error;
mod options;
mod probe;
mod session;

pub use error::VerifyError;
pub use options::ProbeOptions;

use probe::{Outcome, probe_mailbox};

use crate::check::MailboxVerifier;

#[derive(Debug, Clone, Default)]
pub struct SmtpVerifier {
    options: ProbeOptions,
}

impl SmtpVerifier {
    pub fn new(options: ProbeOptions) -> Self {
        Self { options }
    }
}

impl MailboxVerifier for SmtpVerifier {
    type Error = VerifyError;

    fn verify(&self, email: &str) -> Result<bool, VerifyError> {
        let (local, domain) = split_address(email)?;
        let ascii_domain = idna::domain_to_ascii(domain).map_err(VerifyError::idna)?;
        match probe_mailbox(local, &ascii_domain, &self.options)? {
            // A catch-all acceptance still means the RCPT went through.
            Outcome::Accepted | Outcome::CatchAll => Ok(true),
            Outcome::Rejected => Ok(false),
            Outcome::Inconclusive(reason) => Err(VerifyError::Inconclusive(reason)),
        }
    }
}

/// Split at the last `@` so quoted-ish local parts do not eat the domain.
fn split_address(email: &str) -> Result<(&str, &str), VerifyError> {
    match email.rsplit_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok((local, domain)),
        _ => Err(VerifyError::MissingDomain),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_last_at() {
        let (local, domain) = split_address("a@b@example.com").expect("split");
        assert_eq!(local, "a@b");
        assert_eq!(domain, "example.com");
    }

    #[test]
    fn rejects_addresses_without_both_sides() {
        assert!(split_address("nodomain@").is_err());
        assert!(split_address("@nolocal.example").is_err());
        assert!(split_address("plain").is_err());
    }
}
