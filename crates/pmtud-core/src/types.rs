//! Core types for path MTU discovery.

use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::Duration;

/// Default per-probe reply deadline.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_millis(1000);

/// Default number of times a timed-out probe is resent before the timeout
/// is trusted as a negative signal.
pub const DEFAULT_MAX_RETRIES: u32 = 2;

/// Default cap on probe transmissions per family, baseline included.
pub const DEFAULT_PROBE_BUDGET: u32 = 20;

/// Global ident counter so concurrent discovery tasks never share an
/// identifier space.
static PROBE_IDENT_COUNTER: AtomicU16 = AtomicU16::new(1);

/// Gets the next unique probe identifier.
pub fn next_probe_ident() -> u16 {
    PROBE_IDENT_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// IP address family a discovery runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IpFamily {
    V4,
    V6,
}

impl IpFamily {
    /// The family of the given address.
    pub fn of(addr: IpAddr) -> Self {
        match addr {
            IpAddr::V4(_) => IpFamily::V4,
            IpAddr::V6(_) => IpFamily::V6,
        }
    }

    /// Smallest datagram every conforming link must carry (RFC 791 / RFC 8200).
    pub const fn min_datagram(self) -> u16 {
        match self {
            IpFamily::V4 => 68,
            IpFamily::V6 => 1280,
        }
    }

    /// Largest possible IP datagram.
    pub const fn max_datagram(self) -> u16 {
        65535
    }
}

impl std::fmt::Display for IpFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IpFamily::V4 => write!(f, "v4"),
            IpFamily::V6 => write!(f, "v6"),
        }
    }
}

impl std::str::FromStr for IpFamily {
    type Err = crate::PmtuError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "v4" | "ipv4" | "4" => Ok(IpFamily::V4),
            "v6" | "ipv6" | "6" => Ok(IpFamily::V6),
            _ => Err(crate::PmtuError::InvalidInput(format!(
                "unknown address family: {}",
                s
            ))),
        }
    }
}

/// One probe attempt: a single ICMP Echo Request of `size` total bytes.
///
/// Immutable per attempt. The identifier/sequence pair distinguishes the
/// in-flight probe from stale replies and from other discovery tasks.
#[derive(Debug, Clone)]
pub struct ProbeRequest {
    /// Destination address.
    pub dest: IpAddr,
    /// Address family (matches `dest`).
    pub family: IpFamily,
    /// Total IP datagram size in bytes, headers included.
    pub size: u16,
    /// Echo identifier for this discovery task.
    pub ident: u16,
    /// Echo sequence number, unique per transmission.
    pub seq: u16,
    /// Reply deadline.
    pub timeout: Duration,
}

/// Classification of what came back (or didn't) for a single probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// A matching Echo Reply arrived within the deadline.
    Delivered { rtt: Duration },
    /// The path signaled the probe was too big. The next-hop MTU hint is
    /// present only when the control message carried a nonzero value.
    FragmentationNeeded { mtu_hint: Option<u16> },
    /// Deadline elapsed with no matching reply.
    Timeout,
    /// The destination is administratively unreachable.
    Unreachable,
    /// Socket-level failure sending or receiving.
    TransportError(String),
}

/// Caller-facing discovery parameters. Hostname is mandatory, the rest
/// optional with documented defaults.
#[derive(Debug, Clone, Default)]
pub struct DiscoveryInput {
    /// Target hostname or IP literal.
    pub hostname: String,
    /// Expected path MTU. When set and plausible, probed first to
    /// short-circuit the search.
    pub expected_pmtu: Option<u16>,
    /// Per-probe reply deadline. Defaults to [`DEFAULT_PROBE_TIMEOUT`].
    pub probe_timeout: Option<Duration>,
}

impl DiscoveryInput {
    /// Creates an input for the given hostname with default settings.
    pub fn new(hostname: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            ..Self::default()
        }
    }

    /// Validates the input. Rejects an empty hostname before any probing.
    pub fn validate(&self) -> Result<(), crate::PmtuError> {
        if self.hostname.trim().is_empty() {
            return Err(crate::PmtuError::InvalidInput(
                "hostname must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// The effective per-probe deadline.
    pub fn effective_timeout(&self) -> Duration {
        self.probe_timeout.unwrap_or(DEFAULT_PROBE_TIMEOUT)
    }
}

/// Bounds for one family's size search.
#[derive(Debug, Clone, Copy)]
pub struct SearchParams {
    /// Smallest size probed; must already be deliverable for a search to run.
    pub floor: u16,
    /// Largest size considered.
    pub ceiling: u16,
    /// Retries per size before a timeout is trusted.
    pub max_retries: u32,
    /// Cap on probe transmissions, baseline included. Guarantees termination
    /// under loss.
    pub probe_budget: u32,
}

impl SearchParams {
    /// Default bounds for a family: the protocol minimum up to the largest
    /// possible datagram.
    pub fn for_family(family: IpFamily) -> Self {
        Self {
            floor: family.min_datagram(),
            ceiling: family.max_datagram(),
            max_retries: DEFAULT_MAX_RETRIES,
            probe_budget: DEFAULT_PROBE_BUDGET,
        }
    }

    /// Validates the bounds.
    pub fn validate(&self) -> Result<(), crate::PmtuError> {
        if self.floor == 0 || self.floor > self.ceiling {
            return Err(crate::PmtuError::InvalidRange {
                floor: self.floor,
                ceiling: self.ceiling,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_family_minimums() {
        assert_eq!(IpFamily::V4.min_datagram(), 68);
        assert_eq!(IpFamily::V6.min_datagram(), 1280);
        assert_eq!(IpFamily::V4.max_datagram(), 65535);
    }

    #[test]
    fn test_family_from_str() {
        assert_eq!("v4".parse::<IpFamily>().unwrap(), IpFamily::V4);
        assert_eq!("IPv6".parse::<IpFamily>().unwrap(), IpFamily::V6);
        assert!("v5".parse::<IpFamily>().is_err());
    }

    #[test]
    fn test_input_validation() {
        assert!(DiscoveryInput::new("example.com").validate().is_ok());
        assert!(DiscoveryInput::new("").validate().is_err());
        assert!(DiscoveryInput::new("   ").validate().is_err());
    }

    #[test]
    fn test_search_params_validate() {
        assert!(SearchParams::for_family(IpFamily::V4).validate().is_ok());

        let inverted = SearchParams {
            floor: 1500,
            ceiling: 68,
            max_retries: 2,
            probe_budget: 20,
        };
        assert!(inverted.validate().is_err());
    }

    #[test]
    fn test_probe_ident_uniqueness() {
        let a = next_probe_ident();
        let b = next_probe_ident();
        let c = next_probe_ident();
        assert_ne!(a, b);
        assert_ne!(b, c);
        assert_ne!(a, c);
    }
}
