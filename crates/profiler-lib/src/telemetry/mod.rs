//! Telemetry ingestion
//!
//! Turns raw per-epoch log lines emitted by a packet-processing core into
//! structured records. Two line variants exist: per-core epoch records and
//! coarser cluster snapshots.

mod log;
mod parser;

pub use log::{ClusterLog, ClusterSummary, TelemetryLog};
pub use parser::{
    has_markers, parse_cluster_line, parse_core_line, CLUSTER_MARKERS, CORE_FIELDS, CORE_MARKERS,
};
