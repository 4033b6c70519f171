//! The probe itself: walk the MX hosts in preference order and run a
//! minimal dialogue (EHLO, opportunistic STARTTLS, MAIL FROM, RCPT TO)
//! until one host gives a conclusive answer.

use native_tls::TlsConnector;
use rand::{Rng, distributions::Alphanumeric};
use tracing::debug;

use crate::verify::dns::{MxHost, smtp_hosts, system_resolver};
use crate::verify::error::VerifyError;
use crate::verify::options::ProbeOptions;
use crate::verify::session::{Reply, Session};

/// What the dialogue established about the target mailbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Outcome {
    /// RCPT accepted and a random alias was not: the mailbox exists.
    Accepted,
    /// RCPT rejected with a permanent no-such-mailbox status.
    Rejected,
    /// The server accepts any recipient; the target is deliverable but
    /// its existence is unconfirmed.
    CatchAll,
    /// Nothing definitive (temporary status, policy block, odd reply).
    Inconclusive(String),
}

pub(crate) fn probe_mailbox(
    local: &str,
    domain: &str,
    options: &ProbeOptions,
) -> Result<Outcome, VerifyError> {
    let resolver = system_resolver()?;
    let hosts = smtp_hosts(&resolver, domain, options.max_hosts, options.ipv6)?;
    if hosts.is_empty() {
        return Err(VerifyError::NoSmtpServers);
    }

    let connector = TlsConnector::new().map_err(|source| VerifyError::Tls { source })?;

    let mut last = Outcome::Inconclusive("no server responded".to_string());
    for host in &hosts {
        debug!(host = %host.name, preference = host.preference, "probing MX host");
        match probe_host(host, local, domain, options, &connector) {
            Ok(outcome @ (Outcome::Accepted | Outcome::Rejected | Outcome::CatchAll)) => {
                return Ok(outcome);
            }
            Ok(inconclusive) => last = inconclusive,
            Err(err) => {
                debug!(host = %host.name, error = %err, "host probe failed");
                last = Outcome::Inconclusive(err.to_string());
            }
        }
    }
    Ok(last)
}

fn probe_host(
    host: &MxHost,
    local: &str,
    domain: &str,
    options: &ProbeOptions,
    connector: &TlsConnector,
) -> Result<Outcome, VerifyError> {
    let mut session = Session::connect(&host.name, &host.addresses, options.timeout())?;

    let banner = session.banner()?;
    if !banner.accepted() {
        session.quit();
        return Ok(Outcome::Inconclusive(format!(
            "unfriendly greeting {} from {}",
            banner.code, host.name
        )));
    }

    let ehlo = format!("EHLO {}", options.helo_for(domain));
    let mut capabilities = session.command(&ehlo)?;
    if !capabilities.accepted() {
        session.quit();
        return Ok(Outcome::Inconclusive(format!(
            "EHLO rejected with {}",
            capabilities.code
        )));
    }

    if capabilities.advertises("STARTTLS") {
        let tls_reply = session.starttls(connector, options.timeout())?;
        if tls_reply.accepted() {
            // capability set can change after the upgrade
            capabilities = session.command(&ehlo)?;
            if !capabilities.accepted() {
                session.quit();
                return Ok(Outcome::Inconclusive(format!(
                    "EHLO over TLS rejected with {}",
                    capabilities.code
                )));
            }
        }
    }

    let envelope = format!("MAIL FROM:<{}>", options.sender_for(domain));
    let mail = session.command(&envelope)?;
    if !mail.accepted() {
        session.quit();
        return Ok(Outcome::Inconclusive(format!(
            "MAIL FROM rejected with {}",
            mail.code
        )));
    }

    let target = session.command(&format!("RCPT TO:<{local}@{domain}>"))?;
    let outcome = match classify_rcpt(&target) {
        RcptStatus::Accepted => {
            if options.catchall_probe {
                catchall_verdict(&mut session, local, domain)?
            } else {
                Outcome::Accepted
            }
        }
        RcptStatus::NoMailbox => Outcome::Rejected,
        RcptStatus::Retry(code) => Outcome::Inconclusive(format!("temporary failure {code}")),
        RcptStatus::Other(code) => Outcome::Inconclusive(format!("unexpected response {code}")),
    };

    session.quit();
    Ok(outcome)
}

/// The target was accepted; check whether a random alias is too.
fn catchall_verdict(
    session: &mut Session,
    local: &str,
    domain: &str,
) -> Result<Outcome, VerifyError> {
    let alias = random_alias(local);
    let reply = session.command(&format!("RCPT TO:<{alias}@{domain}>"))?;
    Ok(match classify_rcpt(&reply) {
        RcptStatus::Accepted => Outcome::CatchAll,
        RcptStatus::NoMailbox => Outcome::Accepted,
        RcptStatus::Retry(_) => {
            Outcome::Inconclusive("temporary failure on catch-all probe".to_string())
        }
        RcptStatus::Other(code) => {
            Outcome::Inconclusive(format!("ambiguous catch-all probe ({code})"))
        }
    })
}

enum RcptStatus {
    Accepted,
    NoMailbox,
    Retry(u16),
    Other(u16),
}

fn classify_rcpt(reply: &Reply) -> RcptStatus {
    if reply.accepted() {
        return RcptStatus::Accepted;
    }
    match reply.code {
        550 | 551 | 553 => RcptStatus::NoMailbox,
        code if reply.transient() => RcptStatus::Retry(code),
        code => RcptStatus::Other(code),
    }
}

fn random_alias(local: &str) -> String {
    let length = local.len().clamp(6, 32);
    loop {
        let alias: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(length)
            .map(char::from)
            .collect();
        if alias != local {
            return alias;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reply(code: u16) -> Reply {
        Reply { code, lines: vec![] }
    }

    #[test]
    fn rcpt_2xx_is_accepted() {
        assert!(matches!(classify_rcpt(&reply(250)), RcptStatus::Accepted));
        assert!(matches!(classify_rcpt(&reply(251)), RcptStatus::Accepted));
    }

    #[test]
    fn rcpt_no_mailbox_codes() {
        for code in [550, 551, 553] {
            assert!(matches!(classify_rcpt(&reply(code)), RcptStatus::NoMailbox));
        }
    }

    #[test]
    fn rcpt_4xx_is_a_retry() {
        assert!(matches!(classify_rcpt(&reply(451)), RcptStatus::Retry(451)));
    }

    #[test]
    fn rcpt_policy_rejections_stay_ambiguous() {
        assert!(matches!(classify_rcpt(&reply(554)), RcptStatus::Other(554)));
        assert!(matches!(classify_rcpt(&reply(521)), RcptStatus::Other(521)));
    }

    #[test]
    fn random_alias_never_collides_with_target() {
        let alias = random_alias("ab");
        assert!(alias.len() >= 6);
        assert_ne!(alias, "ab");
        assert!(alias.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn random_alias_caps_length() {
        let long = "x".repeat(100);
        assert_eq!(random_alias(&long).len(), 32);
    }
}
