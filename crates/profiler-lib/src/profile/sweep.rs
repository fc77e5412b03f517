//! Long-term profile from a recorded rate/flow sweep
//!
//! A sweep records one row per experiment:
//!
//! ```text
//! pkt_size    pkt_rate    flow_cnt    P50         P75         ...
//! 1050        100000      1000        41234.0     52011.0     ...
//! ```
//!
//! Latencies are in nanoseconds. Header lines and rows whose arity does not
//! match the configured percentile labels are skipped.

use super::{CapacityProfile, CapacityProfileSource, ProfileArtifact};
use crate::error::{ProfileError, SearchError};
use async_trait::async_trait;
use std::collections::BTreeMap;

/// One experiment of a sweep
#[derive(Debug, Clone, PartialEq)]
pub struct SweepRow {
    pub pkt_size: u32,
    pub pkt_rate: u64,
    pub flow_count: u32,
    pub latencies_ns: Vec<f64>,
}

/// Parsed sweep results with the percentile labels of each latency column
#[derive(Debug, Clone, Default)]
pub struct SweepTable {
    pub percentile_labels: Vec<u32>,
    pub rows: Vec<SweepRow>,
}

impl SweepTable {
    pub fn parse(content: &str, percentile_labels: &[u32]) -> Self {
        let arity = 3 + percentile_labels.len();
        let rows = content
            .lines()
            .filter_map(|line| {
                let nums: Vec<f64> = line
                    .split_whitespace()
                    .map(str::parse)
                    .collect::<Result<_, _>>()
                    .ok()?;
                if nums.len() != arity || nums[..3].iter().any(|v| !v.is_finite() || *v < 0.0) {
                    return None;
                }
                Some(SweepRow {
                    pkt_size: nums[0] as u32,
                    pkt_rate: nums[1] as u64,
                    flow_count: nums[2] as u32,
                    latencies_ns: nums[3..].to_vec(),
                })
            })
            .collect();

        Self {
            percentile_labels: percentile_labels.to_vec(),
            rows,
        }
    }

    /// Column index of a percentile tier
    pub fn tier_index(&self, tier: u32) -> Option<usize> {
        self.percentile_labels.iter().position(|&p| p == tier)
    }
}

/// Largest rate per flow count whose `tier` latency stays strictly below `slo_ns`
pub fn build_sweep_profile(
    table: &SweepTable,
    pkt_size: u32,
    slo_ns: f64,
    tier: u32,
) -> Result<CapacityProfile, SearchError> {
    let idx = table
        .tier_index(tier)
        .ok_or(SearchError::UnknownTier { tier })?;

    let mut best: BTreeMap<u32, u64> = BTreeMap::new();
    for row in table.rows.iter().filter(|r| r.pkt_size == pkt_size) {
        if row.latencies_ns[idx] >= slo_ns {
            continue;
        }
        let rate = best.entry(row.flow_count).or_insert(row.pkt_rate);
        *rate = (*rate).max(row.pkt_rate);
    }

    Ok(best.into_iter().collect())
}

/// Sweep-table source producing one artifact per tier
pub struct SweepProfileSource {
    pub table: SweepTable,
    pub pkt_size: u32,
    pub slo_ns: u64,
    pub tiers: Vec<u32>,
}

#[async_trait]
impl CapacityProfileSource for SweepProfileSource {
    fn name(&self) -> &'static str {
        "sweep_table"
    }

    async fn build(&self) -> Result<Vec<ProfileArtifact>, ProfileError> {
        let mut artifacts = Vec::with_capacity(self.tiers.len());
        for &tier in &self.tiers {
            let profile = build_sweep_profile(&self.table, self.pkt_size, self.slo_ns as f64, tier)
                .map_err(|e| ProfileError::Search {
                    first: e.clone(),
                    failures: vec![e],
                })?;
            if profile.is_empty() {
                return Err(ProfileError::NoObservations);
            }
            let stem = format!(
                "{}_psize{}",
                ProfileArtifact::long_term_stem(self.slo_ns, tier),
                self.pkt_size
            );
            artifacts.push(ProfileArtifact::new(stem, profile));
        }
        Ok(artifacts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SWEEP: &str = "Results for nfvctrl/profile_chain4

pkt_size    pkt_rate    flow_cnt    P50         P90
1050        100000      1000        90000.0     150000.0
1050        200000      1000        120000.0    210000.0
1050        300000      1000        260000.0    400000.0
1050        100000      1500        110000.0    190000.0
1050        200000      1500        240000.0    300000.0
1400        900000      1000        1000.0      1000.0
1050        100000
";

    fn table() -> SweepTable {
        SweepTable::parse(SWEEP, &[50, 90])
    }

    #[test]
    fn test_parse_skips_headers_and_short_rows() {
        let t = table();
        assert_eq!(t.rows.len(), 6);
        assert_eq!(t.rows[0].latencies_ns, vec![90000.0, 150000.0]);
    }

    #[test]
    fn test_profile_per_tier() {
        let p50 = build_sweep_profile(&table(), 1050, 200_000.0, 50).unwrap();
        assert_eq!(p50.get(1000), Some(200_000));
        assert_eq!(p50.get(1500), Some(100_000));

        let p90 = build_sweep_profile(&table(), 1050, 200_000.0, 90).unwrap();
        assert_eq!(p90.get(1000), Some(100_000));
        assert_eq!(p90.get(1500), Some(100_000));
    }

    #[test]
    fn test_row_at_slo_is_excluded() {
        let t = SweepTable::parse(
            "1050 100000 1000 150000\n1050 200000 1000 200000\n",
            &[50],
        );
        let profile = build_sweep_profile(&t, 1050, 200_000.0, 50).unwrap();
        assert_eq!(profile.get(1000), Some(100_000));
    }

    #[test]
    fn test_packet_size_filter() {
        let profile = build_sweep_profile(&table(), 1400, 200_000.0, 50).unwrap();
        assert_eq!(profile.get(1000), Some(900_000));
        assert_eq!(profile.len(), 1);
    }

    #[test]
    fn test_unknown_tier() {
        assert_eq!(
            build_sweep_profile(&table(), 1050, 200_000.0, 99),
            Err(SearchError::UnknownTier { tier: 99 })
        );
    }

    #[tokio::test]
    async fn test_source_builds_artifact_per_tier() {
        let source = SweepProfileSource {
            table: table(),
            pkt_size: 1050,
            slo_ns: 200_000,
            tiers: vec![50, 90],
        };
        let artifacts = source.build().await.unwrap();
        let stems: Vec<&str> = artifacts.iter().map(|a| a.stem.as_str()).collect();
        assert_eq!(
            stems,
            vec!["long_term_slo200us_p50_psize1050", "long_term_slo200us_p90_psize1050"]
        );
    }
}
