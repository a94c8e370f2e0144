//! Per-family discovery task.

use pmtud_core::{
    next_probe_ident, DiscoveryInput, FamilyResult, IpFamily, PmtuSearch, ProberFactory,
    SearchParams,
};
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Runs one family's discovery against one resolved address: open the
/// transport, verify baseline reachability, then search for the largest
/// deliverable size.
///
/// The task owns its prober (and socket) exclusively; every exit path,
/// including abandonment by the orchestrator deadline, releases it by drop.
pub(crate) async fn discover_family(
    factory: Arc<dyn ProberFactory>,
    target: IpAddr,
    input: DiscoveryInput,
) -> FamilyResult {
    let family = IpFamily::of(target);
    let params = SearchParams::for_family(family);
    let timeout = input.effective_timeout();

    let mut prober = match factory.open(target) {
        Ok(prober) => prober,
        Err(e) => {
            warn!(family = %family, target = %target, error = %e, "failed to open probe transport");
            return FamilyResult::failed(&e);
        }
    };

    let mut search = PmtuSearch::new(prober.as_mut(), target, params, timeout, next_probe_ident());

    if let Err(e) = search.baseline().await {
        debug!(family = %family, target = %target, error = %e, "baseline probe failed");
        return FamilyResult::failed(&e);
    }

    match search.run(input.expected_pmtu).await {
        Ok(outcome) => {
            info!(
                family = %family,
                target = %target,
                pmtu = outcome.pmtu,
                converged = outcome.converged,
                probes = outcome.probes_sent,
                "discovery finished"
            );
            FamilyResult::found(outcome.pmtu, !outcome.converged)
        }
        Err(e) => {
            debug!(family = %family, target = %target, error = %e, "search failed");
            FamilyResult::failed(&e)
        }
    }
}
