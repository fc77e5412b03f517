//! Long-term capacity search
//!
//! For each target flow count, binary-searches a sorted candidate rate list
//! for the largest rate whose measured latency percentile stays within the
//! SLO. Probes within one flow count are strictly sequential; independent
//! flow counts are spread over probe sessions running as separate tasks.

use super::CapacityProbe;
use crate::error::{ProfileError, SearchError};
use crate::observability::{ProfilerMetrics, StructuredLogger};
use crate::profile::{CapacityProfile, CapacityProfileSource, ProfileArtifact};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Explicit configuration of one long-term search run
#[derive(Debug, Clone)]
pub struct SearchPlan {
    /// Target latency bound in nanoseconds
    pub slo_ns: u64,
    /// Offered rates to choose from, strictly increasing
    pub candidate_rates: Vec<u64>,
    pub flow_counts: Vec<u32>,
    /// Percentile tiers to produce a profile for
    pub tiers: Vec<u32>,
    /// Upper bound on one probe invocation; exceeding it counts as no result
    pub probe_timeout: Option<Duration>,
}

impl SearchPlan {
    pub fn validate(&self) -> Result<(), SearchError> {
        if self.candidate_rates.is_empty() {
            return Err(SearchError::EmptyCandidates);
        }
        if self.candidate_rates.windows(2).any(|w| w[0] >= w[1]) {
            return Err(SearchError::UnsortedCandidates);
        }
        Ok(())
    }

    /// Column of each tier in a probe's latency vector
    fn tier_columns(&self, labels: &[u32]) -> Result<Vec<(u32, usize)>, SearchError> {
        self.tiers
            .iter()
            .map(|&tier| {
                labels
                    .iter()
                    .position(|&l| l == tier)
                    .map(|col| (tier, col))
                    .ok_or(SearchError::UnknownTier { tier })
            })
            .collect()
    }
}

/// Per-tier results for one flow count
#[derive(Debug, Clone, PartialEq)]
pub struct FlowCountOutcome {
    pub flow_count: u32,
    pub results: BTreeMap<u32, Result<u64, SearchError>>,
    /// Probe invocations spent on this flow count
    pub probes: usize,
}

impl FlowCountOutcome {
    fn aborted(flow_count: u32, tiers: &[u32], error: SearchError) -> Self {
        Self {
            flow_count,
            results: tiers.iter().map(|&t| (t, Err(error.clone()))).collect(),
            probes: 0,
        }
    }

    fn is_cancelled(&self) -> bool {
        self.results
            .values()
            .any(|r| matches!(r, Err(SearchError::Cancelled { .. })))
    }
}

/// Outcome of a whole long-term search
#[derive(Debug, Clone, Default)]
pub struct LongTermReport {
    pub slo_ns: u64,
    pub tiers: Vec<u32>,
    /// Ascending by flow count
    pub outcomes: Vec<FlowCountOutcome>,
}

impl LongTermReport {
    /// Resolved `(flow_count, rate)` pairs per tier
    pub fn profiles(&self) -> BTreeMap<u32, CapacityProfile> {
        let mut profiles: BTreeMap<u32, CapacityProfile> =
            self.tiers.iter().map(|&t| (t, CapacityProfile::new())).collect();
        for outcome in &self.outcomes {
            for (tier, result) in &outcome.results {
                if let Ok(rate) = result {
                    profiles
                        .entry(*tier)
                        .or_default()
                        .insert(outcome.flow_count, *rate);
                }
            }
        }
        profiles
    }

    pub fn failures(&self) -> Vec<SearchError> {
        self.outcomes
            .iter()
            .flat_map(|o| o.results.values())
            .filter_map(|r| r.as_ref().err().cloned())
            .collect()
    }

    pub fn total_probes(&self) -> usize {
        self.outcomes.iter().map(|o| o.probes).sum()
    }

    /// One artifact per tier, only when every flow count resolved
    pub fn artifacts(&self) -> Result<Vec<ProfileArtifact>, ProfileError> {
        let failures = self.failures();
        if let Some(first) = failures.first().cloned() {
            return Err(ProfileError::Search { first, failures });
        }
        Ok(self
            .profiles()
            .into_iter()
            .map(|(tier, profile)| {
                ProfileArtifact::new(ProfileArtifact::long_term_stem(self.slo_ns, tier), profile)
            })
            .collect())
    }
}

/// Sequential search state for one flow count on one probe session
struct FlowCountSession<'a> {
    probe: &'a dyn CapacityProbe,
    plan: &'a SearchPlan,
    flow_count: u32,
    logger: &'a StructuredLogger,
    metrics: ProfilerMetrics,
    /// Latency vectors by candidate index; every tier reuses a measurement
    cache: HashMap<usize, Vec<f64>>,
    probes: usize,
}

impl<'a> FlowCountSession<'a> {
    fn new(
        probe: &'a dyn CapacityProbe,
        plan: &'a SearchPlan,
        flow_count: u32,
        logger: &'a StructuredLogger,
    ) -> Self {
        Self {
            probe,
            plan,
            flow_count,
            logger,
            metrics: ProfilerMetrics::new(),
            cache: HashMap::new(),
            probes: 0,
        }
    }

    /// Measured latency of `column` at candidate `idx`
    async fn measure(
        &mut self,
        idx: usize,
        column: usize,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<f64, SearchError> {
        let rate = self.plan.candidate_rates[idx];
        let no_result = SearchError::NoResult {
            flow_count: self.flow_count,
            rate,
        };

        if let Some(latencies) = self.cache.get(&idx) {
            return latencies.get(column).copied().ok_or(no_result);
        }

        let already_cancelled = *shutdown.borrow();
        if already_cancelled {
            return Err(SearchError::Cancelled {
                flow_count: self.flow_count,
            });
        }

        let start = Instant::now();
        let outcome = tokio::select! {
            outcome = bounded(self.plan.probe_timeout, self.probe.probe(self.flow_count, rate)) => outcome,
            _ = wait_cancelled(shutdown) => {
                return Err(SearchError::Cancelled { flow_count: self.flow_count });
            }
        };
        self.probes += 1;

        let latencies = match outcome {
            Some(Ok(Some(reading))) if !reading.latency_percentiles_ns.is_empty() => {
                Some(reading.latency_percentiles_ns)
            }
            Some(Ok(_)) => None,
            Some(Err(e)) => {
                warn!(flow_count = self.flow_count, rate = rate, error = %e, "Probe failed");
                None
            }
            None => {
                warn!(flow_count = self.flow_count, rate = rate, "Probe timed out");
                None
            }
        };

        let elapsed = start.elapsed();
        let measured = latencies.as_ref().and_then(|l| l.get(column).copied());
        self.metrics
            .observe_probe(elapsed.as_secs_f64(), measured.is_none());
        self.logger
            .log_probe(self.flow_count, rate, measured, elapsed.as_millis());

        if let Some(latencies) = latencies {
            self.cache.insert(idx, latencies);
        }
        measured.ok_or(no_result)
    }

    /// Binary search over the candidate axis for one percentile column
    async fn search(
        &mut self,
        column: usize,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<u64, SearchError> {
        let plan = self.plan;
        let rates = &plan.candidate_rates;
        let slo = plan.slo_ns as f64;

        let mut left: isize = 0;
        let mut right: isize = rates.len() as isize - 1;
        while left <= right {
            let mid = (left + right) / 2;
            let measured = self.measure(mid as usize, column, shutdown).await?;
            debug!(
                flow_count = self.flow_count,
                rate = rates[mid as usize],
                measured_ns = measured,
                slo_ns = plan.slo_ns,
                "Search step"
            );
            if measured <= slo {
                left = mid + 1;
            } else {
                right = mid - 1;
            }
        }

        if left == 0 {
            return Err(SearchError::Unservable {
                flow_count: self.flow_count,
                min_rate: rates[0],
            });
        }
        Ok(rates[left as usize - 1])
    }

    /// Search every tier; an empty probe or cancellation aborts the rest
    async fn run(
        mut self,
        columns: &[(u32, usize)],
        shutdown: &mut watch::Receiver<bool>,
    ) -> FlowCountOutcome {
        let mut results = BTreeMap::new();
        let mut abort: Option<SearchError> = None;

        for &(tier, column) in columns {
            let result = match &abort {
                Some(e) => Err(e.clone()),
                None => self.search(column, shutdown).await,
            };

            match &result {
                Ok(rate) => {
                    self.metrics.inc_resolved();
                    self.logger
                        .log_search_resolved(self.flow_count, tier, *rate, self.probes);
                }
                Err(e @ SearchError::Unservable { .. }) => {
                    self.metrics.inc_unservable();
                    self.logger.log_search_failed(self.flow_count, tier, e);
                }
                Err(e) => {
                    if abort.is_none() {
                        self.metrics.inc_aborted();
                        abort = Some(e.clone());
                    }
                    self.logger.log_search_failed(self.flow_count, tier, e);
                }
            }
            results.insert(tier, result);
        }

        FlowCountOutcome {
            flow_count: self.flow_count,
            results,
            probes: self.probes,
        }
    }
}

/// Await `fut`, giving up after `timeout` when one is set
async fn bounded<F: Future>(timeout: Option<Duration>, fut: F) -> Option<F::Output> {
    match timeout {
        Some(limit) => tokio::time::timeout(limit, fut).await.ok(),
        None => Some(fut.await),
    }
}

/// Largest sustainable rate for a single flow count and tier
pub async fn search_flow_count(
    probe: &dyn CapacityProbe,
    flow_count: u32,
    candidate_rates: &[u64],
    slo_ns: u64,
    tier: u32,
) -> Result<u64, SearchError> {
    let plan = SearchPlan {
        slo_ns,
        candidate_rates: candidate_rates.to_vec(),
        flow_counts: vec![flow_count],
        tiers: vec![tier],
        probe_timeout: None,
    };
    plan.validate()?;
    let columns = plan.tier_columns(probe.percentile_labels())?;

    let logger = StructuredLogger::new("single-search");
    let cancel = CancelHandle::new();
    let mut shutdown = cancel.subscribe();
    let session = FlowCountSession::new(probe, &plan, flow_count, &logger);
    let mut outcome = session.run(&columns, &mut shutdown).await;
    outcome
        .results
        .remove(&tier)
        .unwrap_or(Err(SearchError::UnknownTier { tier }))
}

/// Resolves once the handle is cancelled; never resolves if it is dropped
async fn wait_cancelled(shutdown: &mut watch::Receiver<bool>) {
    loop {
        let done = *shutdown.borrow_and_update();
        if done {
            return;
        }
        if shutdown.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Cancels a long-term search. The cancelled state sticks, so a cancel that
/// lands before `run` subscribes still stops every flow count.
#[derive(Debug, Clone)]
pub struct CancelHandle(Arc<watch::Sender<bool>>);

impl CancelHandle {
    fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self(Arc::new(tx))
    }

    pub fn cancel(&self) {
        self.0.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.0.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.0.subscribe()
    }
}

/// Long-term search over many flow counts and probe sessions
pub struct LongTermSearch {
    sessions: Vec<Arc<dyn CapacityProbe>>,
    plan: Arc<SearchPlan>,
    logger: StructuredLogger,
    shutdown: CancelHandle,
}

impl LongTermSearch {
    pub fn new(
        sessions: Vec<Arc<dyn CapacityProbe>>,
        plan: SearchPlan,
        logger: StructuredLogger,
    ) -> Self {
        Self {
            sessions,
            plan: Arc::new(plan),
            logger,
            shutdown: CancelHandle::new(),
        }
    }

    pub fn plan(&self) -> &SearchPlan {
        &self.plan
    }

    /// Handle that cancels every in-flight and pending flow-count search
    pub fn cancel_handle(&self) -> CancelHandle {
        self.shutdown.clone()
    }

    pub fn cancel(&self) {
        self.shutdown.cancel();
    }

    /// Run the search; only an invalid plan fails the whole run
    pub async fn run(&self) -> Result<LongTermReport, SearchError> {
        self.plan.validate()?;
        if self.sessions.is_empty() {
            return Err(SearchError::NoSessions);
        }

        let session_columns = self
            .sessions
            .iter()
            .map(|probe| self.plan.tier_columns(probe.percentile_labels()))
            .collect::<Result<Vec<_>, _>>()?;

        let session_count = self.sessions.len();
        let mut handles = Vec::with_capacity(session_count);

        for (i, (probe, columns)) in self.sessions.iter().zip(session_columns).enumerate() {
            let assigned: Vec<u32> = self
                .plan
                .flow_counts
                .iter()
                .skip(i)
                .step_by(session_count)
                .copied()
                .collect();
            if assigned.is_empty() {
                continue;
            }

            let probe = Arc::clone(probe);
            let plan = Arc::clone(&self.plan);
            let logger = self.logger.clone();
            let mut shutdown = self.shutdown.subscribe();
            let task_flows = assigned.clone();

            let handle = tokio::spawn(async move {
                let mut outcomes = Vec::with_capacity(task_flows.len());
                let mut cancelled = false;
                for flow_count in task_flows {
                    if cancelled {
                        outcomes.push(FlowCountOutcome::aborted(
                            flow_count,
                            &plan.tiers,
                            SearchError::Cancelled { flow_count },
                        ));
                        continue;
                    }
                    let session = FlowCountSession::new(probe.as_ref(), &plan, flow_count, &logger);
                    let outcome = session.run(&columns, &mut shutdown).await;
                    cancelled = outcome.is_cancelled();
                    outcomes.push(outcome);
                }
                outcomes
            });
            handles.push((handle, assigned));
        }

        info!(
            flow_counts = self.plan.flow_counts.len(),
            sessions = handles.len(),
            candidates = self.plan.candidate_rates.len(),
            slo_ns = self.plan.slo_ns,
            "Starting long-term search"
        );

        let mut outcomes = Vec::with_capacity(self.plan.flow_counts.len());
        for (handle, assigned) in handles {
            match handle.await {
                Ok(session_outcomes) => outcomes.extend(session_outcomes),
                Err(e) => {
                    warn!(error = %e, "Probe session task failed");
                    outcomes.extend(assigned.into_iter().map(|flow_count| {
                        FlowCountOutcome::aborted(
                            flow_count,
                            &self.plan.tiers,
                            SearchError::Cancelled { flow_count },
                        )
                    }));
                }
            }
        }
        outcomes.sort_by_key(|o| o.flow_count);

        Ok(LongTermReport {
            slo_ns: self.plan.slo_ns,
            tiers: self.plan.tiers.clone(),
            outcomes,
        })
    }
}

#[async_trait]
impl CapacityProfileSource for LongTermSearch {
    fn name(&self) -> &'static str {
        "long_term_search"
    }

    async fn build(&self) -> Result<Vec<ProfileArtifact>, ProfileError> {
        let report = self.run().await.map_err(|e| ProfileError::Search {
            first: e.clone(),
            failures: vec![e],
        })?;
        report.artifacts()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::testing::ScriptedProbe;

    const RATES: [u64; 4] = [100, 200, 300, 400];

    /// p50 within a 1000ns SLO up to `limit`, p90 always twice the p50
    fn threshold_probe(limit: u64) -> ScriptedProbe {
        ScriptedProbe::new(move |_, rate| {
            let p50 = if rate <= limit { 900.0 } else { 1500.0 };
            Some(vec![p50, p50 * 2.0])
        })
    }

    fn plan(flow_counts: Vec<u32>, tiers: Vec<u32>) -> SearchPlan {
        SearchPlan {
            slo_ns: 1000,
            candidate_rates: RATES.to_vec(),
            flow_counts,
            tiers,
            probe_timeout: None,
        }
    }

    #[tokio::test]
    async fn test_converges_to_largest_sustainable_rate() {
        let probe = threshold_probe(300);
        assert_eq!(search_flow_count(&probe, 8, &RATES, 1000, 50).await, Ok(300));
        assert!(probe.calls() <= 3);
    }

    #[tokio::test]
    async fn test_every_rate_sustainable() {
        let probe = threshold_probe(1_000);
        assert_eq!(search_flow_count(&probe, 8, &RATES, 1000, 50).await, Ok(400));
    }

    #[tokio::test]
    async fn test_boundary_equal_to_slo_is_sustainable() {
        let probe = ScriptedProbe::new(|_, rate| Some(vec![rate as f64 * 5.0, 0.0]));
        // 200 * 5 == 1000 sits exactly on the SLO
        assert_eq!(search_flow_count(&probe, 1, &RATES, 1000, 50).await, Ok(200));
    }

    #[tokio::test]
    async fn test_minimum_rate_violation_is_unservable() {
        let probe = threshold_probe(50);
        assert_eq!(
            search_flow_count(&probe, 8, &RATES, 1000, 50).await,
            Err(SearchError::Unservable {
                flow_count: 8,
                min_rate: 100
            })
        );
    }

    #[tokio::test]
    async fn test_empty_probe_aborts_without_retry() {
        let probe = ScriptedProbe::new(|_, rate| (rate != 200).then(|| vec![100.0, 100.0]));
        assert_eq!(
            search_flow_count(&probe, 3, &RATES, 1000, 50).await,
            Err(SearchError::NoResult {
                flow_count: 3,
                rate: 200
            })
        );
        assert_eq!(probe.calls(), 1);
    }

    #[tokio::test]
    async fn test_invalid_plans_rejected() {
        let probe = threshold_probe(300);
        assert_eq!(
            search_flow_count(&probe, 1, &[], 1000, 50).await,
            Err(SearchError::EmptyCandidates)
        );
        assert_eq!(
            search_flow_count(&probe, 1, &[300, 200], 1000, 50).await,
            Err(SearchError::UnsortedCandidates)
        );
        assert_eq!(
            search_flow_count(&probe, 1, &RATES, 1000, 99).await,
            Err(SearchError::UnknownTier { tier: 99 })
        );
    }

    #[tokio::test]
    async fn test_long_term_search_builds_profiles_per_tier() {
        // Larger flow counts sustain less: limit = 400 - flow_count
        let probe = ScriptedProbe::new(|flow_count, rate| {
            let limit = 400u64.saturating_sub(flow_count as u64);
            let p50 = if rate <= limit { 500.0 } else { 5000.0 };
            let p90 = if rate + 100 <= limit { 800.0 } else { 5000.0 };
            Some(vec![p50, p90])
        });
        let sessions: Vec<Arc<dyn CapacityProbe>> = vec![Arc::new(probe)];
        let search = LongTermSearch::new(
            sessions,
            plan(vec![100, 0], vec![50, 90]),
            StructuredLogger::new("test"),
        );

        let report = search.run().await.unwrap();
        assert_eq!(report.outcomes[0].flow_count, 0);
        let profiles = report.profiles();
        assert_eq!(profiles[&50].get(0), Some(400));
        assert_eq!(profiles[&50].get(100), Some(300));
        assert_eq!(profiles[&90].get(0), Some(300));
        assert_eq!(profiles[&90].get(100), Some(200));

        let artifacts = report.artifacts().unwrap();
        assert_eq!(artifacts[0].stem, "long_term_slo1us_p50");
        assert_eq!(artifacts[1].stem, "long_term_slo1us_p90");
    }

    #[tokio::test]
    async fn test_tiers_share_measurements() {
        let probe = Arc::new(threshold_probe(300));
        let sessions: Vec<Arc<dyn CapacityProbe>> = vec![probe.clone()];
        let search = LongTermSearch::new(sessions, plan(vec![1], vec![50, 50]), StructuredLogger::new("test"));

        let report = search.run().await.unwrap();
        assert_eq!(report.total_probes(), probe.calls());
        assert!(probe.calls() <= 3);
    }

    #[tokio::test]
    async fn test_unservable_flow_count_blocks_artifacts() {
        let probe = ScriptedProbe::new(|flow_count, _| {
            Some(if flow_count > 10 { vec![9999.0, 9999.0] } else { vec![1.0, 1.0] })
        });
        let sessions: Vec<Arc<dyn CapacityProbe>> = vec![Arc::new(probe)];
        let search = LongTermSearch::new(sessions, plan(vec![5, 20], vec![50]), StructuredLogger::new("test"));

        let report = search.run().await.unwrap();
        assert_eq!(
            report.failures(),
            vec![SearchError::Unservable {
                flow_count: 20,
                min_rate: 100
            }]
        );
        assert!(matches!(report.artifacts(), Err(ProfileError::Search { .. })));
        assert!(search.build().await.is_err());
    }

    #[tokio::test]
    async fn test_parallel_sessions_cover_all_flow_counts() {
        let sessions: Vec<Arc<dyn CapacityProbe>> = vec![
            Arc::new(threshold_probe(200)),
            Arc::new(threshold_probe(200)),
            Arc::new(threshold_probe(200)),
        ];
        let flows: Vec<u32> = (1..=7).collect();
        let search = LongTermSearch::new(sessions, plan(flows.clone(), vec![50]), StructuredLogger::new("test"));

        let report = search.run().await.unwrap();
        let covered: Vec<u32> = report.outcomes.iter().map(|o| o.flow_count).collect();
        assert_eq!(covered, flows);
        assert!(report.profiles()[&50].iter().all(|(_, rate)| rate == 200));
    }

    #[tokio::test]
    async fn test_cancellation_aborts_whole_flow_count() {
        let mut probe = threshold_probe(300);
        probe.delay = Duration::from_secs(30);
        let sessions: Vec<Arc<dyn CapacityProbe>> = vec![Arc::new(probe)];
        let search = Arc::new(LongTermSearch::new(
            sessions,
            plan(vec![1, 2], vec![50, 90]),
            StructuredLogger::new("test"),
        ));

        let runner = {
            let search = Arc::clone(&search);
            tokio::spawn(async move { search.run().await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        search.cancel();

        let report = runner.await.unwrap().unwrap();
        assert_eq!(report.outcomes.len(), 2);
        for outcome in &report.outcomes {
            assert!(outcome
                .results
                .values()
                .all(|r| matches!(r, Err(SearchError::Cancelled { .. }))));
        }
    }

    #[tokio::test]
    async fn test_cancel_before_run_skips_all_work() {
        let probe = Arc::new(threshold_probe(300));
        let sessions: Vec<Arc<dyn CapacityProbe>> = vec![probe.clone() as Arc<dyn CapacityProbe>, probe.clone()];
        let search = LongTermSearch::new(
            sessions,
            plan(vec![1, 2, 3], vec![50, 90]),
            StructuredLogger::new("test"),
        );

        search.cancel();
        assert!(search.cancel_handle().is_cancelled());
        let report = search.run().await.unwrap();

        assert_eq!(report.outcomes.len(), 3);
        assert_eq!(report.total_probes(), 0);
        assert_eq!(probe.calls(), 0);
        assert!(report
            .failures()
            .iter()
            .all(|e| matches!(e, SearchError::Cancelled { .. })));
    }

    #[tokio::test]
    async fn test_probe_timeout_counts_as_no_result() {
        let mut probe = threshold_probe(300);
        probe.delay = Duration::from_secs(5);
        let mut p = plan(vec![4], vec![50]);
        p.probe_timeout = Some(Duration::from_millis(10));
        let sessions: Vec<Arc<dyn CapacityProbe>> = vec![Arc::new(probe)];
        let search = LongTermSearch::new(sessions, p, StructuredLogger::new("test"));

        let report = search.run().await.unwrap();
        assert!(matches!(
            report.failures()[0],
            SearchError::NoResult { flow_count: 4, .. }
        ));
    }
}
