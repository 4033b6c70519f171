use thiserror::Error;

/// Everything the probe can fail with. The check pipeline never matches on
/// variants; it folds the `Display` text into the result record.
#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("address has no domain part")]
    MissingDomain,
    #[error("domain normalisation failed: {0}")]
    Idna(String),
    #[error("resolver initialization failed: {source}")]
    ResolverInit {
        #[source]
        source: std::io::Error,
    },
    #[error("DNS lookup failed: {source}")]
    Lookup {
        #[source]
        source: trust_dns_resolver::error::ResolveError,
    },
    #[error("no SMTP servers available for the domain")]
    NoSmtpServers,
    #[error("connection to {host} failed: {source}")]
    Connect {
        host: String,
        #[source]
        source: std::io::Error,
    },
    #[error("I/O error: {source}")]
    Io {
        #[source]
        source: std::io::Error,
    },
    #[error("TLS handshake failed: {source}")]
    Tls {
        #[source]
        source: native_tls::Error,
    },
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("{0}")]
    Inconclusive(String),
}

impl VerifyError {
    pub(crate) fn idna<T: std::fmt::Display>(err: T) -> Self {
        Self::Idna(err.to_string())
    }

    pub(crate) fn io(source: std::io::Error) -> Self {
        Self::Io { source }
    }
}
