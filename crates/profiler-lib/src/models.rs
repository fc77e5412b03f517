//! Core data models for the capacity profiler

use serde::{Deserialize, Serialize};

/// One observation window for one processing core
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EpochRecord {
    pub epoch_id: u64,
    pub epoch_size: u64,
    pub core_id: u32,
    pub slo_violations: u64,
    pub delay_error_count: u64,
    pub max_delay: u64,
    pub active_flow_count: u32,
    pub burst_flow_count: u32,
    pub packet_rate: u64,
    pub packets_processed: u64,
    pub packets_queued: u64,
}

impl EpochRecord {
    /// Whether any SLO-breaching packet was counted in this epoch
    pub fn is_violating(&self) -> bool {
        self.slo_violations > 0
    }

    /// The (flow count, packets processed) pair used for capacity fitting
    pub fn observation(&self) -> ObservationPoint {
        ObservationPoint {
            active_flow_count: self.active_flow_count,
            packets_processed: self.packets_processed,
        }
    }
}

/// Cluster-wide state for one epoch (coarse telemetry variant)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ClusterSnapshot {
    pub epoch_id: u64,
    pub active_cores: u32,
    pub packet_rate: u64,
}

/// `(active_flow_count, packets_processed)` extracted from one epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObservationPoint {
    pub active_flow_count: u32,
    pub packets_processed: u64,
}

impl ObservationPoint {
    pub fn new(active_flow_count: u32, packets_processed: u64) -> Self {
        Self {
            active_flow_count,
            packets_processed,
        }
    }
}

/// Duration class of an SLO event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    ShortTerm,
    LongTerm,
}

/// A maximal run of consecutive violating epochs on one core
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SloEvent {
    /// Run length in epochs, always >= 1
    pub epoch_count: u64,
    /// Sum of `slo_violations` over the run
    pub packet_count: u64,
    pub kind: EventKind,
}

/// A single reading returned by an external probe
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProbeReading {
    pub packets_observed: u64,
    /// Latency percentile values in nanoseconds, ordered like the probe's
    /// configured percentile labels
    pub latency_percentiles_ns: Vec<f64>,
    /// Per-core busy-time counter, when the probe reports one
    pub busy_cycles: Option<u64>,
    /// Telemetry epochs captured during the window (short-term calibration)
    pub telemetry: Vec<EpochRecord>,
}

impl ProbeReading {
    /// A reading without latency values carries no answer
    pub fn is_empty(&self) -> bool {
        self.latency_percentiles_ns.is_empty() && self.telemetry.is_empty()
    }
}
