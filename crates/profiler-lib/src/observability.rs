//! Observability infrastructure for the profiler
//!
//! Provides:
//! - Prometheus metrics (telemetry lines, probe latency, search outcomes)
//! - Structured logging with tracing

use prometheus::{register_histogram, register_int_counter, Histogram, IntCounter};
use crate::error::SearchError;
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for probe latency (in seconds); probes block for an
/// observation window of several seconds
const PROBE_LATENCY_BUCKETS: &[f64] = &[0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 15.0, 30.0, 60.0, 120.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<ProfilerMetricsInner> = OnceLock::new();

struct ProfilerMetricsInner {
    telemetry_lines_parsed: IntCounter,
    telemetry_lines_skipped: IntCounter,
    probe_latency_seconds: Histogram,
    probes_issued: IntCounter,
    probes_empty: IntCounter,
    searches_resolved: IntCounter,
    searches_unservable: IntCounter,
    searches_aborted: IntCounter,
}

impl ProfilerMetricsInner {
    fn new() -> Self {
        Self {
            telemetry_lines_parsed: register_int_counter!(
                "capprof_telemetry_lines_parsed_total",
                "Telemetry lines parsed into epoch records"
            )
            .expect("Failed to register telemetry_lines_parsed"),

            telemetry_lines_skipped: register_int_counter!(
                "capprof_telemetry_lines_skipped_total",
                "Telemetry lines skipped as unrelated or malformed"
            )
            .expect("Failed to register telemetry_lines_skipped"),

            probe_latency_seconds: register_histogram!(
                "capprof_probe_latency_seconds",
                "Wall time of one external probe invocation",
                PROBE_LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register probe_latency_seconds"),

            probes_issued: register_int_counter!(
                "capprof_probes_issued_total",
                "External probe invocations"
            )
            .expect("Failed to register probes_issued"),

            probes_empty: register_int_counter!(
                "capprof_probes_empty_total",
                "Probe invocations that returned no result"
            )
            .expect("Failed to register probes_empty"),

            searches_resolved: register_int_counter!(
                "capprof_searches_resolved_total",
                "Flow-count searches that found a sustainable rate"
            )
            .expect("Failed to register searches_resolved"),

            searches_unservable: register_int_counter!(
                "capprof_searches_unservable_total",
                "Flow-count searches where the minimum rate violated the SLO"
            )
            .expect("Failed to register searches_unservable"),

            searches_aborted: register_int_counter!(
                "capprof_searches_aborted_total",
                "Flow-count searches aborted by an empty probe or cancellation"
            )
            .expect("Failed to register searches_aborted"),
        }
    }
}

/// Handle to the process-wide profiler metrics.
///
/// Clones share the same underlying metrics.
#[derive(Clone)]
pub struct ProfilerMetrics {
    _private: (),
}

impl Default for ProfilerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ProfilerMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(ProfilerMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &ProfilerMetricsInner {
        GLOBAL_METRICS.get_or_init(ProfilerMetricsInner::new)
    }

    pub fn record_lines(&self, parsed: usize, skipped: usize) {
        self.inner().telemetry_lines_parsed.inc_by(parsed as u64);
        self.inner().telemetry_lines_skipped.inc_by(skipped as u64);
    }

    pub fn observe_probe(&self, duration_secs: f64, empty: bool) {
        self.inner().probes_issued.inc();
        self.inner().probe_latency_seconds.observe(duration_secs);
        if empty {
            self.inner().probes_empty.inc();
        }
    }

    pub fn inc_resolved(&self) {
        self.inner().searches_resolved.inc();
    }

    pub fn inc_unservable(&self) {
        self.inner().searches_unservable.inc();
    }

    pub fn inc_aborted(&self) {
        self.inner().searches_aborted.inc();
    }

    /// Prometheus text exposition of every registered metric
    pub fn render() -> String {
        use prometheus::{Encoder, TextEncoder};

        let mut buffer = Vec::new();
        if TextEncoder::new()
            .encode(&prometheus::gather(), &mut buffer)
            .is_err()
        {
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

/// Structured logger for profiler events
#[derive(Clone)]
pub struct StructuredLogger {
    run_label: String,
}

impl StructuredLogger {
    pub fn new(run_label: impl Into<String>) -> Self {
        Self {
            run_label: run_label.into(),
        }
    }

    pub fn log_telemetry_loaded(&self, source: &str, records: usize, skipped: usize, cores: usize) {
        info!(
            event = "telemetry_loaded",
            run = %self.run_label,
            source = %source,
            records = records,
            skipped = skipped,
            cores = cores,
            "Telemetry loaded"
        );
    }

    pub fn log_classification(&self, core_id: u32, violating: usize, non_violating: usize, unclassified: usize) {
        info!(
            event = "classification_complete",
            run = %self.run_label,
            core_id = core_id,
            violating = violating,
            non_violating = non_violating,
            unclassified = unclassified,
            "Epochs classified"
        );
    }

    pub fn log_profile_built(&self, source: &str, stem: &str, entries: usize) {
        info!(
            event = "profile_built",
            run = %self.run_label,
            source = %source,
            stem = %stem,
            entries = entries,
            "Capacity profile built"
        );
    }

    pub fn log_profile_written(&self, path: &str, entries: usize) {
        info!(
            event = "profile_written",
            run = %self.run_label,
            path = %path,
            entries = entries,
            "Capacity profile written"
        );
    }

    pub fn log_probe(&self, flow_count: u32, rate: u64, latency_ns: Option<f64>, elapsed_ms: u128) {
        match latency_ns {
            Some(latency_ns) => info!(
                event = "probe_completed",
                run = %self.run_label,
                flow_count = flow_count,
                rate = rate,
                latency_ns = latency_ns,
                elapsed_ms = elapsed_ms,
                "Probe completed"
            ),
            None => warn!(
                event = "probe_empty",
                run = %self.run_label,
                flow_count = flow_count,
                rate = rate,
                elapsed_ms = elapsed_ms,
                "Probe returned no result"
            ),
        }
    }

    pub fn log_search_resolved(&self, flow_count: u32, tier: u32, rate: u64, probes: usize) {
        info!(
            event = "search_resolved",
            run = %self.run_label,
            flow_count = flow_count,
            tier = tier,
            rate = rate,
            probes = probes,
            "Sustainable rate found"
        );
    }

    pub fn log_search_failed(&self, flow_count: u32, tier: u32, error: &SearchError) {
        warn!(
            event = failure_event(error),
            run = %self.run_label,
            flow_count = flow_count,
            tier = tier,
            reason = %error,
            "Flow-count search failed"
        );
    }

    pub fn log_violation_summary(&self, core_id: Option<u32>, short_events: usize, long_events: usize) {
        info!(
            event = "violation_summary",
            run = %self.run_label,
            core_id = ?core_id,
            short_events = short_events,
            long_events = long_events,
            "SLO violation events aggregated"
        );
    }
}

/// Stable `event` field for a failed flow-count search
pub fn failure_event(error: &SearchError) -> &'static str {
    match error {
        SearchError::Unservable { .. } => "search_unservable",
        SearchError::NoResult { .. } => "search_no_result",
        SearchError::Cancelled { .. } => "search_cancelled",
        _ => "search_failed",
    }
}
