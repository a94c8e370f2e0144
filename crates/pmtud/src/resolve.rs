//! Hostname resolution.
//!
//! Discovery treats resolution as a black box behind the [`Resolve`] trait;
//! the default implementation uses the system DNS configuration.

use async_trait::async_trait;
use hickory_resolver::TokioAsyncResolver;
use pmtud_core::PmtuError;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// At most one candidate address per family. A family with no address is
/// simply not probed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolvedAddrs {
    pub v4: Option<Ipv4Addr>,
    pub v6: Option<Ipv6Addr>,
}

impl ResolvedAddrs {
    pub fn is_empty(&self) -> bool {
        self.v4.is_none() && self.v6.is_none()
    }
}

/// Resolves a hostname to candidate addresses.
#[async_trait]
pub trait Resolve: Send + Sync {
    async fn resolve(&self, hostname: &str) -> Result<ResolvedAddrs, PmtuError>;
}

/// System-configuration DNS resolution, with a short-circuit for IP
/// literals.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemResolver;

#[async_trait]
impl Resolve for SystemResolver {
    async fn resolve(&self, hostname: &str) -> Result<ResolvedAddrs, PmtuError> {
        if let Ok(ip) = hostname.parse::<IpAddr>() {
            return Ok(match ip {
                IpAddr::V4(addr) => ResolvedAddrs {
                    v4: Some(addr),
                    v6: None,
                },
                IpAddr::V6(addr) => ResolvedAddrs {
                    v4: None,
                    v6: Some(addr),
                },
            });
        }

        let resolver = TokioAsyncResolver::tokio_from_system_conf().map_err(|e| {
            PmtuError::ResolutionFailed {
                hostname: hostname.to_string(),
                reason: format!("failed to create DNS resolver: {}", e),
            }
        })?;

        let lookup =
            resolver
                .lookup_ip(hostname)
                .await
                .map_err(|e| PmtuError::ResolutionFailed {
                    hostname: hostname.to_string(),
                    reason: e.to_string(),
                })?;

        let mut addrs = ResolvedAddrs::default();
        for ip in lookup.iter() {
            match ip {
                IpAddr::V4(addr) if addrs.v4.is_none() => addrs.v4 = Some(addr),
                IpAddr::V6(addr) if addrs.v6.is_none() => addrs.v6 = Some(addr),
                _ => {}
            }
        }

        if addrs.is_empty() {
            return Err(PmtuError::ResolutionFailed {
                hostname: hostname.to_string(),
                reason: "no addresses found".to_string(),
            });
        }

        Ok(addrs)
    }
}
