//! Size-search engine.
//!
//! Finds the largest datagram size the path delivers without fragmentation.
//! Generic over [`Prober`] and free of socket code, so the whole search is
//! testable with simulated probers.

use crate::types::{IpFamily, ProbeOutcome, ProbeRequest, SearchParams};
use crate::{PmtuError, Prober};
use std::net::IpAddr;
use std::time::Duration;
use tracing::{debug, trace};

/// What a completed search produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchOutcome {
    /// Largest size confirmed delivered.
    pub pmtu: u16,
    /// False when the probe budget ran out first; `pmtu` is then the best
    /// size confirmed so far rather than the exact path MTU.
    pub converged: bool,
    /// Probe transmissions spent, retries included.
    pub probes_sent: u32,
}

/// Convergence signal for one size after local retry policy was applied.
enum Signal {
    /// Confirmed delivered at this size.
    Good,
    /// The size is too big: explicit fragmentation signal, or timeouts past
    /// the retry budget.
    Bad { mtu_hint: Option<u16> },
    /// Probe budget exhausted before this size could be trusted.
    Exhausted,
}

/// One family's search over a prober.
///
/// Owns the identifier/sequence space for its probes: sequence numbers are
/// never reused across transmissions, so a late reply to an abandoned
/// attempt cannot be mistaken for the current one.
pub struct PmtuSearch<'a, P: ?Sized> {
    prober: &'a mut P,
    dest: IpAddr,
    family: IpFamily,
    params: SearchParams,
    timeout: Duration,
    ident: u16,
    seq: u16,
    probes_sent: u32,
}

impl<'a, P: Prober + ?Sized> PmtuSearch<'a, P> {
    pub fn new(
        prober: &'a mut P,
        dest: IpAddr,
        params: SearchParams,
        timeout: Duration,
        ident: u16,
    ) -> Self {
        Self {
            prober,
            dest,
            family: IpFamily::of(dest),
            params,
            timeout,
            ident,
            seq: 0,
            probes_sent: 0,
        }
    }

    /// Probe transmissions spent so far.
    pub fn probes_sent(&self) -> u32 {
        self.probes_sent
    }

    /// Verifies basic reachability with the smallest legal datagram.
    ///
    /// Must succeed before a search runs; a path that cannot deliver the
    /// floor size is reported without any searching.
    pub async fn baseline(&mut self) -> Result<(), PmtuError> {
        self.params.validate()?;

        let mut timeouts = 0;
        loop {
            match self.probe_once(self.params.floor).await {
                ProbeOutcome::Delivered { rtt } => {
                    debug!(family = %self.family, rtt_ms = rtt.as_secs_f64() * 1000.0, "baseline reachable");
                    return Ok(());
                }
                ProbeOutcome::FragmentationNeeded { .. } => {
                    return Err(PmtuError::FragmentationBlocked {
                        family: self.family,
                        floor: self.params.floor,
                    });
                }
                ProbeOutcome::Timeout => {
                    if timeouts >= self.params.max_retries {
                        return Err(PmtuError::Unreachable);
                    }
                    timeouts += 1;
                    trace!(family = %self.family, attempt = timeouts, "baseline timed out, retrying");
                }
                ProbeOutcome::Unreachable => return Err(PmtuError::Unreachable),
                ProbeOutcome::TransportError(detail) => return Err(PmtuError::Transport(detail)),
            }
        }
    }

    /// Runs the search and returns the largest size confirmed delivered.
    ///
    /// Classic binary search between the best known-good size (`lo`, assumed
    /// deliverable per [`Self::baseline`]) and the ceiling. A supplied hint
    /// is probed first: when the hint is the true path MTU, two probes
    /// settle the search. Ties resolve toward the larger confirmed size,
    /// and running out of budget yields the best `lo` found rather than an
    /// error.
    pub async fn run(&mut self, hint: Option<u16>) -> Result<SearchOutcome, PmtuError> {
        self.params.validate()?;

        let mut lo = self.params.floor;
        let mut hi = self.params.ceiling;

        if let Some(hint) = hint.filter(|h| *h > lo && *h <= hi) {
            debug!(family = %self.family, hint, "probing expected path MTU first");
            match self.probe_trusted(hint).await? {
                Signal::Good => {
                    lo = hint;
                    if lo < hi {
                        // Step one past the hint: if that already fails, the
                        // hint was exact and the search is over.
                        match self.probe_trusted(hint + 1).await? {
                            Signal::Good => lo = hint + 1,
                            Signal::Bad { .. } => hi = hint,
                            Signal::Exhausted => return Ok(self.partial(lo)),
                        }
                    }
                }
                Signal::Bad { mtu_hint } => {
                    hi = hint - 1;
                    hi = narrow(lo, hi, mtu_hint);
                }
                Signal::Exhausted => return Ok(self.partial(lo)),
            }
        }

        while lo < hi {
            let mid = lo + (hi - lo + 1) / 2;
            match self.probe_trusted(mid).await? {
                Signal::Good => lo = mid,
                Signal::Bad { mtu_hint } => {
                    hi = mid - 1;
                    hi = narrow(lo, hi, mtu_hint);
                }
                Signal::Exhausted => return Ok(self.partial(lo)),
            }
        }

        debug!(family = %self.family, pmtu = lo, probes = self.probes_sent, "search converged");
        Ok(SearchOutcome {
            pmtu: lo,
            converged: true,
            probes_sent: self.probes_sent,
        })
    }

    fn partial(&self, lo: u16) -> SearchOutcome {
        debug!(
            family = %self.family,
            best = lo,
            probes = self.probes_sent,
            "probe budget exhausted before convergence"
        );
        SearchOutcome {
            pmtu: lo,
            converged: false,
            probes_sent: self.probes_sent,
        }
    }

    /// Probes one size until the outcome can be trusted.
    ///
    /// An explicit fragmentation signal is trusted immediately. A timeout is
    /// retried up to the retry budget to rule out transient loss before it
    /// is treated as negative.
    async fn probe_trusted(&mut self, size: u16) -> Result<Signal, PmtuError> {
        let mut timeouts = 0;
        loop {
            if self.probes_sent >= self.params.probe_budget {
                return Ok(Signal::Exhausted);
            }
            match self.probe_once(size).await {
                ProbeOutcome::Delivered { .. } => return Ok(Signal::Good),
                ProbeOutcome::FragmentationNeeded { mtu_hint } => {
                    return Ok(Signal::Bad { mtu_hint })
                }
                ProbeOutcome::Timeout => {
                    if timeouts >= self.params.max_retries {
                        return Ok(Signal::Bad { mtu_hint: None });
                    }
                    timeouts += 1;
                    trace!(size, attempt = timeouts, "probe timed out, retrying");
                }
                ProbeOutcome::Unreachable => return Err(PmtuError::Unreachable),
                ProbeOutcome::TransportError(detail) => return Err(PmtuError::Transport(detail)),
            }
        }
    }

    async fn probe_once(&mut self, size: u16) -> ProbeOutcome {
        self.seq = self.seq.wrapping_add(1);
        self.probes_sent += 1;
        let request = ProbeRequest {
            dest: self.dest,
            family: self.family,
            size,
            ident: self.ident,
            seq: self.seq,
            timeout: self.timeout,
        };
        trace!(family = %self.family, size, seq = self.seq, "sending probe");
        let outcome = self.prober.probe(&request).await;
        trace!(family = %self.family, size, seq = self.seq, ?outcome, "probe outcome");
        outcome
    }
}

/// Applies a next-hop MTU hint from a fragmentation signal to the upper
/// bound. The hint only narrows the bracket; the final answer still has to
/// be confirmed by a delivered probe, and a hint below the best known-good
/// size is ignored as bogus.
fn narrow(lo: u16, hi: u16, mtu_hint: Option<u16>) -> u16 {
    match mtu_hint {
        Some(m) if m >= lo && m < hi => m,
        _ => hi,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::net::Ipv4Addr;

    const DEST: IpAddr = IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1));
    const TIMEOUT: Duration = Duration::from_millis(10);

    /// Delivers at or below a fixed path MTU, signals fragmentation above it.
    struct PathProber {
        true_mtu: u16,
        with_hint: bool,
    }

    #[async_trait]
    impl Prober for PathProber {
        async fn probe(&mut self, request: &ProbeRequest) -> ProbeOutcome {
            if request.size <= self.true_mtu {
                ProbeOutcome::Delivered {
                    rtt: Duration::from_millis(1),
                }
            } else {
                ProbeOutcome::FragmentationNeeded {
                    mtu_hint: self.with_hint.then_some(self.true_mtu),
                }
            }
        }
    }

    /// Never answers.
    struct BlackholeProber;

    #[async_trait]
    impl Prober for BlackholeProber {
        async fn probe(&mut self, _request: &ProbeRequest) -> ProbeOutcome {
            ProbeOutcome::Timeout
        }
    }

    /// Drops the first attempt at every size, then behaves like `PathProber`.
    struct LossyProber {
        true_mtu: u16,
        last_seq_by_size: std::collections::HashMap<u16, u16>,
    }

    #[async_trait]
    impl Prober for LossyProber {
        async fn probe(&mut self, request: &ProbeRequest) -> ProbeOutcome {
            let first = !self.last_seq_by_size.contains_key(&request.size);
            self.last_seq_by_size.insert(request.size, request.seq);
            if first {
                return ProbeOutcome::Timeout;
            }
            if request.size <= self.true_mtu {
                ProbeOutcome::Delivered {
                    rtt: Duration::from_millis(1),
                }
            } else {
                ProbeOutcome::FragmentationNeeded { mtu_hint: None }
            }
        }
    }

    fn params_v4() -> SearchParams {
        SearchParams::for_family(IpFamily::V4)
    }

    async fn search_with(prober: &mut dyn Prober, hint: Option<u16>) -> SearchOutcome {
        let mut search = PmtuSearch::new(prober, DEST, params_v4(), TIMEOUT, 7);
        search.run(hint).await.unwrap()
    }

    #[tokio::test]
    async fn test_converges_on_boundary_values() {
        for true_mtu in [68u16, 576, 1480, 1500, 9000] {
            let mut prober = PathProber {
                true_mtu,
                with_hint: false,
            };
            let outcome = search_with(&mut prober, None).await;
            assert_eq!(outcome.pmtu, true_mtu, "true_mtu={}", true_mtu);
            assert!(outcome.converged, "true_mtu={}", true_mtu);
        }
    }

    #[tokio::test]
    async fn test_converges_with_mtu_hint_in_signal() {
        for true_mtu in [576u16, 1480, 1500] {
            let mut prober = PathProber {
                true_mtu,
                with_hint: true,
            };
            let outcome = search_with(&mut prober, None).await;
            assert_eq!(outcome.pmtu, true_mtu);
            assert!(outcome.converged);
        }
    }

    #[tokio::test]
    async fn test_blackhole_terminates_with_floor() {
        let mut prober = BlackholeProber;
        let outcome = search_with(&mut prober, None).await;
        assert_eq!(outcome.pmtu, 68);
        assert!(!outcome.converged);
        assert!(outcome.probes_sent <= params_v4().probe_budget);
    }

    #[tokio::test]
    async fn test_blackhole_baseline_is_unreachable() {
        let mut prober = BlackholeProber;
        let mut search = PmtuSearch::new(&mut prober, DEST, params_v4(), TIMEOUT, 7);
        assert!(matches!(
            search.baseline().await,
            Err(PmtuError::Unreachable)
        ));
        // One initial attempt plus the retry budget.
        assert_eq!(search.probes_sent(), params_v4().max_retries + 1);
    }

    #[tokio::test]
    async fn test_fragmented_floor_is_blocked() {
        // Fragmentation needed even at the minimum size.
        let mut prober = PathProber {
            true_mtu: 67,
            with_hint: false,
        };
        let mut search = PmtuSearch::new(&mut prober, DEST, params_v4(), TIMEOUT, 7);
        assert!(matches!(
            search.baseline().await,
            Err(PmtuError::FragmentationBlocked { floor: 68, .. })
        ));
    }

    #[tokio::test]
    async fn test_exact_hint_beats_cold_search() {
        let true_mtu = 1480;

        let mut cold = PathProber {
            true_mtu,
            with_hint: false,
        };
        let cold_outcome = search_with(&mut cold, None).await;

        let mut hinted = PathProber {
            true_mtu,
            with_hint: false,
        };
        let hinted_outcome = search_with(&mut hinted, Some(true_mtu)).await;

        assert_eq!(cold_outcome.pmtu, true_mtu);
        assert_eq!(hinted_outcome.pmtu, true_mtu);
        assert!(
            hinted_outcome.probes_sent < cold_outcome.probes_sent,
            "hinted={} cold={}",
            hinted_outcome.probes_sent,
            cold_outcome.probes_sent
        );
        // The exact-hint fast path needs just the hint and one step past it.
        assert_eq!(hinted_outcome.probes_sent, 2);
    }

    #[tokio::test]
    async fn test_wrong_hint_still_converges() {
        let mut prober = PathProber {
            true_mtu: 1500,
            with_hint: false,
        };
        let outcome = search_with(&mut prober, Some(9000)).await;
        assert_eq!(outcome.pmtu, 1500);
        assert!(outcome.converged);
    }

    #[tokio::test]
    async fn test_out_of_range_hint_is_ignored() {
        let mut prober = PathProber {
            true_mtu: 1500,
            with_hint: false,
        };
        // Below the floor; must fall back to a plain search.
        let outcome = search_with(&mut prober, Some(10)).await;
        assert_eq!(outcome.pmtu, 1500);
    }

    #[tokio::test]
    async fn test_single_loss_per_size_is_tolerated() {
        let mut prober = LossyProber {
            true_mtu: 1500,
            last_seq_by_size: std::collections::HashMap::new(),
        };
        let params = SearchParams {
            // Every size costs two probes, so give the search more headroom.
            probe_budget: 60,
            ..params_v4()
        };
        let mut search = PmtuSearch::new(&mut prober, DEST, params, TIMEOUT, 7);
        let outcome = search.run(None).await.unwrap();
        assert_eq!(outcome.pmtu, 1500);
        assert!(outcome.converged);
    }

    #[tokio::test]
    async fn test_sequence_numbers_are_unique_per_transmission() {
        let mut prober = LossyProber {
            true_mtu: 1500,
            last_seq_by_size: std::collections::HashMap::new(),
        };
        let mut search = PmtuSearch::new(&mut prober, DEST, params_v4(), TIMEOUT, 7);
        let _ = search.run(None).await.unwrap();
        // Each retransmission must have used a fresh sequence number; with
        // one loss per size the retry's seq is always the size's stored seq,
        // and no two sizes may share one.
        let mut seen: Vec<u16> = prober.last_seq_by_size.values().copied().collect();
        seen.sort_unstable();
        let before = seen.len();
        seen.dedup();
        assert_eq!(seen.len(), before);
    }

    #[tokio::test]
    async fn test_unreachable_mid_search_propagates() {
        struct UnreachableProber;

        #[async_trait]
        impl Prober for UnreachableProber {
            async fn probe(&mut self, _request: &ProbeRequest) -> ProbeOutcome {
                ProbeOutcome::Unreachable
            }
        }

        let mut prober = UnreachableProber;
        let mut search = PmtuSearch::new(&mut prober, DEST, params_v4(), TIMEOUT, 7);
        assert!(matches!(
            search.run(None).await,
            Err(PmtuError::Unreachable)
        ));
    }

    #[test]
    fn test_narrow_ignores_bogus_hints() {
        assert_eq!(narrow(1000, 2000, Some(1500)), 1500);
        assert_eq!(narrow(1000, 2000, Some(500)), 2000);
        assert_eq!(narrow(1000, 2000, Some(3000)), 2000);
        assert_eq!(narrow(1000, 2000, None), 2000);
    }
}
