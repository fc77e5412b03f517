//! Loading whole telemetry logs

use super::parser::{parse_cluster_line, parse_core_line};
use crate::error::TelemetryError;
use crate::models::{ClusterSnapshot, EpochRecord};
use crate::observability::ProfilerMetrics;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use tokio::fs;
use tracing::debug;

/// Parsed per-core epochs from one log, in file order
#[derive(Debug, Clone, Default)]
pub struct TelemetryLog {
    pub records: Vec<EpochRecord>,
    /// Lines that failed the marker sniff or carried malformed fields
    pub skipped_lines: usize,
}

impl TelemetryLog {
    /// Parse log contents held in memory
    pub fn from_text(content: &str) -> Self {
        let mut log = Self::default();
        for line in content.lines() {
            match parse_core_line(line) {
                Some(record) => log.records.push(record),
                None => log.skipped_lines += 1,
            }
        }
        log
    }

    /// Read and parse a telemetry log file
    pub async fn load(path: &Path) -> Result<Self, TelemetryError> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|source| TelemetryError::Read {
                path: path.to_path_buf(),
                source,
            })?;

        let log = Self::from_text(&content);
        ProfilerMetrics::new().record_lines(log.records.len(), log.skipped_lines);
        debug!(
            path = %path.display(),
            records = log.records.len(),
            skipped = log.skipped_lines,
            "Parsed telemetry log"
        );
        Ok(log)
    }

    /// Append another log's records, keeping file order
    pub fn extend(&mut self, other: TelemetryLog) {
        self.records.extend(other.records);
        self.skipped_lines += other.skipped_lines;
    }

    /// Group records by core, preserving per-core order
    pub fn by_core(&self) -> BTreeMap<u32, Vec<EpochRecord>> {
        let mut cores: BTreeMap<u32, Vec<EpochRecord>> = BTreeMap::new();
        for record in &self.records {
            cores.entry(record.core_id).or_default().push(*record);
        }
        cores
    }
}

/// Cluster-wide snapshots from one log
#[derive(Debug, Clone, Default)]
pub struct ClusterLog {
    pub snapshots: Vec<ClusterSnapshot>,
}

impl ClusterLog {
    pub fn from_text(content: &str) -> Self {
        Self {
            snapshots: content.lines().filter_map(parse_cluster_line).collect(),
        }
    }

    pub async fn load(path: &Path) -> Result<Self, TelemetryError> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|source| TelemetryError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self::from_text(&content))
    }

    /// Core usage and arrival-rate summary over the whole log
    pub fn summary(&self) -> Option<ClusterSummary> {
        if self.snapshots.is_empty() {
            return None;
        }
        let n = self.snapshots.len() as f64;
        let total_cores: u64 = self.snapshots.iter().map(|s| s.active_cores as u64).sum();
        let total_rate: u64 = self.snapshots.iter().map(|s| s.packet_rate).sum();
        let peak_active_cores = self
            .snapshots
            .iter()
            .map(|s| s.active_cores)
            .max()
            .unwrap_or(0);

        Some(ClusterSummary {
            epochs: self.snapshots.len(),
            mean_active_cores: total_cores as f64 / n,
            peak_active_cores,
            mean_packet_rate: total_rate as f64 / n,
        })
    }
}

/// Summary of a cluster snapshot log
#[derive(Debug, Clone, Serialize)]
pub struct ClusterSummary {
    pub epochs: usize,
    pub mean_active_cores: f64,
    pub peak_active_cores: u32,
    pub mean_packet_rate: f64,
}
