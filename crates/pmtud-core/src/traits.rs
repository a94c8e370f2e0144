//! Trait seams between the search engine and the probe transport.

use crate::{PmtuError, ProbeOutcome, ProbeRequest};
use async_trait::async_trait;
use std::net::IpAddr;

/// A transport that can send one ICMP Echo Request and classify the response.
///
/// One invocation transmits exactly one packet. Retry policy belongs to the
/// caller. Failures are reported as [`ProbeOutcome`] values so the search
/// engine can treat them as convergence signals.
#[async_trait]
pub trait Prober: Send {
    /// Sends the probe and waits for its outcome within the request deadline.
    async fn probe(&mut self, request: &ProbeRequest) -> ProbeOutcome;
}

/// Opens a [`Prober`] for a target address.
///
/// Each discovery task acquires its own prober (and with it, its own socket)
/// so that abandoning one family never disturbs the other. The prober's
/// resources are released when it is dropped.
pub trait ProberFactory: Send + Sync {
    fn open(&self, target: IpAddr) -> Result<Box<dyn Prober>, PmtuError>;
}
