//! MX discovery: explicit records first, implicit MX (the domain itself)
//! as the RFC 5321 fallback.

use std::net::{SocketAddr, ToSocketAddrs};

use tracing::trace;
use trust_dns_resolver::Resolver;
use trust_dns_resolver::error::ResolveErrorKind;

use crate::verify::error::VerifyError;

/// One connection candidate: an MX exchange (or the bare domain) together
/// with the socket addresses it resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct MxHost {
    pub name: String,
    pub preference: u16,
    pub addresses: Vec<SocketAddr>,
}

pub(crate) fn system_resolver() -> Result<Resolver, VerifyError> {
    Resolver::from_system_conf().map_err(|source| VerifyError::ResolverInit { source })
}

/// Resolve the SMTP hosts to contact for `domain`, best preference first,
/// capped at `max_hosts`.
pub(crate) fn smtp_hosts(
    resolver: &Resolver,
    domain: &str,
    max_hosts: usize,
    ipv6: bool,
) -> Result<Vec<MxHost>, VerifyError> {
    let mut hosts = Vec::new();

    match resolver.mx_lookup(domain) {
        Ok(lookup) => {
            for record in lookup.iter() {
                let name = normalize_exchange(&record.exchange().to_utf8());
                let addresses = smtp_addresses(&name, ipv6)?;
                if addresses.is_empty() {
                    trace!(host = %name, "MX exchange has no usable address, skipped");
                    continue;
                }
                hosts.push(MxHost {
                    name,
                    preference: record.preference(),
                    addresses,
                });
            }
        }
        Err(err) => match err.kind() {
            ResolveErrorKind::NoRecordsFound { .. } => {}
            _ => return Err(VerifyError::Lookup { source: err }),
        },
    }

    if hosts.is_empty() {
        trace!(domain, "no MX records, trying implicit MX");
        let addresses = smtp_addresses(domain, ipv6)?;
        if addresses.is_empty() {
            return Err(VerifyError::NoSmtpServers);
        }
        hosts.push(MxHost {
            name: domain.to_string(),
            preference: 0,
            addresses,
        });
    }

    Ok(order_hosts(hosts, max_hosts))
}

pub(crate) fn normalize_exchange(exchange: &str) -> String {
    exchange.trim_end_matches('.').to_ascii_lowercase()
}

pub(crate) fn order_hosts(mut hosts: Vec<MxHost>, max_hosts: usize) -> Vec<MxHost> {
    hosts.sort_by(|a, b| a.preference.cmp(&b.preference).then(a.name.cmp(&b.name)));
    hosts.dedup_by(|a, b| a.name == b.name);
    hosts.truncate(max_hosts.max(1));
    hosts
}

fn smtp_addresses(host: &str, ipv6: bool) -> Result<Vec<SocketAddr>, VerifyError> {
    let addrs = format!("{host}:25").to_socket_addrs().map_err(VerifyError::io)?;
    Ok(addrs.filter(|addr| ipv6 || !addr.is_ipv6()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host(name: &str, preference: u16) -> MxHost {
        MxHost {
            name: name.to_string(),
            preference,
            addresses: vec!["192.0.2.1:25".parse().expect("addr")],
        }
    }

    #[test]
    fn exchange_is_lowercased_and_undotted() {
        assert_eq!(normalize_exchange("Mail.EXAMPLE.com."), "mail.example.com");
    }

    #[test]
    fn hosts_are_ordered_deduped_and_capped() {
        let hosts = order_hosts(
            vec![
                host("mx2.example.com", 20),
                host("mx1.example.com", 10),
                host("mx1.example.com", 10),
                host("mx3.example.com", 30),
            ],
            2,
        );
        assert_eq!(hosts.len(), 2);
        assert_eq!(hosts[0].name, "mx1.example.com");
        assert_eq!(hosts[1].name, "mx2.example.com");
    }

    #[test]
    fn cap_never_drops_to_zero() {
        let hosts = order_hosts(vec![host("mx1.example.com", 10)], 0);
        assert_eq!(hosts.len(), 1);
    }
}
