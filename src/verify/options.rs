use std::time::Duration;

/// Configuration knobs for the SMTP probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeOptions {
    /// Name announced in EHLO. Empty means: announce the target domain.
    pub helo_name: String,
    /// Envelope sender. Empty means: `postmaster@<target domain>`.
    pub mail_from: String,
    /// Socket connect/read/write deadline in milliseconds; 0 disables it.
    pub timeout_ms: u64,
    /// Upper bound on MX hosts contacted, in preference order.
    pub max_hosts: usize,
    /// Probe one random alias to spot catch-all servers.
    pub catchall_probe: bool,
    /// Consider AAAA addresses as connection candidates.
    pub ipv6: bool,
}

impl Default for ProbeOptions {
    fn default() -> Self {
        Self {
            helo_name: String::new(),
            mail_from: String::new(),
            timeout_ms: 5_000,
            max_hosts: 3,
            catchall_probe: true,
            ipv6: false,
        }
    }
}

impl ProbeOptions {
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_ms > 0).then(|| Duration::from_millis(self.timeout_ms))
    }

    pub(crate) fn helo_for<'a>(&'a self, domain: &'a str) -> &'a str {
        let name = self.helo_name.trim();
        if name.is_empty() { domain } else { name }
    }

    pub(crate) fn sender_for(&self, domain: &str) -> String {
        if self.mail_from.is_empty() {
            format!("postmaster@{domain}")
        } else {
            self.mail_from.clone()
        }
    }
}
