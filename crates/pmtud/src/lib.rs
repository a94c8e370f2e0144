//! Path MTU discovery over ICMP.
//!
//! Discovers the largest IP datagram deliverable to a host without
//! fragmentation, independently for IPv4 and IPv6, by probing with ICMP
//! Echo Requests of varying sizes.
//!
//! ```no_run
//! use pmtud::{DiscoveryInput, PmtuDetector};
//!
//! # async fn run() {
//! let detector = PmtuDetector::new();
//! let result = detector
//!     .detect(&DiscoveryInput::new("example.com"))
//!     .await
//!     .unwrap();
//! println!("{}", result.to_json().unwrap());
//! # }
//! ```
//!
//! Raw ICMP sockets require elevated privileges (`CAP_NET_RAW` on Linux);
//! acquiring them is the caller's concern.

pub mod resolve;
mod task;

pub use pmtud_core::{
    CombinedResult, DiscoveryInput, ErrorKind, FamilyResult, IpFamily, PmtuError, ProbeOutcome,
    ProbeRequest, Prober, ProberFactory, SearchParams,
};
pub use resolve::{Resolve, ResolvedAddrs, SystemResolver};

use pmtud_icmp::IcmpProberFactory;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use task::discover_family;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Top-level entry point: resolves the hostname, runs both family
/// discoveries concurrently, and assembles the combined result.
#[derive(Clone)]
pub struct PmtuDetector {
    resolver: Arc<dyn Resolve>,
    factory: Arc<dyn ProberFactory>,
}

impl PmtuDetector {
    /// A detector using system DNS and raw ICMP sockets.
    pub fn new() -> Self {
        Self {
            resolver: Arc::new(SystemResolver),
            factory: Arc::new(IcmpProberFactory),
        }
    }

    /// A detector with custom resolution and probing. This is the seam
    /// tests use to run discovery without sockets or DNS.
    pub fn with_parts(resolver: Arc<dyn Resolve>, factory: Arc<dyn ProberFactory>) -> Self {
        Self { resolver, factory }
    }

    /// Discovers the path MTU for both families of `input.hostname`.
    ///
    /// Family-level failures are values inside [`CombinedResult`]; only
    /// malformed input fails the call itself, before any probing.
    pub async fn detect(&self, input: &DiscoveryInput) -> Result<CombinedResult, PmtuError> {
        input.validate()?;

        info!(hostname = %input.hostname, "starting path MTU discovery");
        let addrs = match self.resolver.resolve(&input.hostname).await {
            Ok(addrs) => addrs,
            Err(e) => {
                warn!(hostname = %input.hostname, error = %e, "hostname resolution failed");
                return Ok(CombinedResult::total_failure(&e));
            }
        };
        debug!(v4 = ?addrs.v4, v6 = ?addrs.v6, "resolved candidate addresses");

        let deadline = family_deadline(input);

        let v4_handle = addrs.v4.map(|addr| {
            tokio::spawn(discover_family(
                Arc::clone(&self.factory),
                IpAddr::V4(addr),
                input.clone(),
            ))
        });
        let v6_handle = addrs.v6.map(|addr| {
            tokio::spawn(discover_family(
                Arc::clone(&self.factory),
                IpAddr::V6(addr),
                input.clone(),
            ))
        });

        let (v4, v6) = tokio::join!(
            join_family(v4_handle, deadline),
            join_family(v6_handle, deadline)
        );

        Ok(CombinedResult { v4, v6 })
    }

    /// Like [`Self::detect`], but spins up its own runtime and blocks.
    pub fn detect_blocking(&self, input: &DiscoveryInput) -> Result<CombinedResult, PmtuError> {
        let runtime = tokio::runtime::Runtime::new()
            .map_err(|e| PmtuError::Internal(format!("failed to start runtime: {}", e)))?;
        runtime.block_on(self.detect(input))
    }

    /// Starts discovery in the background and returns a one-shot handle
    /// yielding exactly one combined result. Must be called from within a
    /// tokio runtime.
    pub fn detect_async(
        &self,
        input: DiscoveryInput,
    ) -> oneshot::Receiver<Result<CombinedResult, PmtuError>> {
        let (tx, rx) = oneshot::channel();
        let detector = self.clone();
        tokio::spawn(async move {
            let _ = tx.send(detector.detect(&input).await);
        });
        rx
    }
}

impl Default for PmtuDetector {
    fn default() -> Self {
        Self::new()
    }
}

/// Discovers the path MTU with the default detector.
pub async fn detect_pmtu(input: &DiscoveryInput) -> Result<CombinedResult, PmtuError> {
    PmtuDetector::new().detect(input).await
}

/// Blocking variant of [`detect_pmtu`].
pub fn detect_pmtu_blocking(input: &DiscoveryInput) -> Result<CombinedResult, PmtuError> {
    PmtuDetector::new().detect_blocking(input)
}

/// Non-blocking variant of [`detect_pmtu`]; the receiver yields exactly one
/// result. Must be called from within a tokio runtime.
pub fn detect_pmtu_async(
    input: DiscoveryInput,
) -> oneshot::Receiver<Result<CombinedResult, PmtuError>> {
    PmtuDetector::new().detect_async(input)
}

/// Waits out one family's task, bounded by the orchestrator deadline. A
/// family still running at the deadline is aborted and reported as a
/// timeout without disturbing the other family.
async fn join_family(
    handle: Option<JoinHandle<FamilyResult>>,
    deadline: Duration,
) -> Option<FamilyResult> {
    let mut handle = handle?;
    match tokio::time::timeout(deadline, &mut handle).await {
        Ok(Ok(result)) => Some(result),
        Ok(Err(join_err)) => Some(FamilyResult::failed(&PmtuError::Internal(format!(
            "discovery task failed: {}",
            join_err
        )))),
        Err(_) => {
            warn!("family discovery exceeded the overall deadline, abandoning");
            handle.abort();
            Some(FamilyResult::failed(&PmtuError::Timeout))
        }
    }
}

/// Worst case one family can spend: every budgeted probe waiting out its
/// full deadline, plus the baseline and its retries.
fn family_deadline(input: &DiscoveryInput) -> Duration {
    let params = SearchParams::for_family(IpFamily::V4);
    input.effective_timeout() * (params.probe_budget + params.max_retries + 1)
}
