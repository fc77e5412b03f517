//! Probe-driven capacity calibration
//!
//! This module drives an external probe instead of reading stored
//! telemetry:
//! - Long-term search: binary search over a candidate rate axis, trusting
//!   each probe measurement as a single reliable sample
//! - Short-term calibration: collects telemetry returned by the probe and
//!   feeds it through the classifier and envelope builder

mod calibration;
mod long_term;

pub use calibration::{ShortTermCalibration, CALIBRATED_STEM};
pub use long_term::{
    search_flow_count, CancelHandle, FlowCountOutcome, LongTermReport, LongTermSearch, SearchPlan,
};

use crate::models::ProbeReading;
use anyhow::Result;
use async_trait::async_trait;

/// External measurement of the live system at a given load.
///
/// Each call blocks for the probe's observation window. `Ok(None)` (or an
/// empty reading) signals an inconclusive window; callers never retry it.
#[async_trait]
pub trait CapacityProbe: Send + Sync {
    /// Percentile labels of `ProbeReading::latency_percentiles_ns`, in order
    fn percentile_labels(&self) -> &[u32];

    /// Offer `rate` packets per second spread over `flow_count` flows
    async fn probe(&self, flow_count: u32, rate: u64) -> Result<Option<ProbeReading>>;
}

/// Candidate rates `start, start + step, ...` below `stop`
pub fn rate_axis(start: u64, stop: u64, step: u64) -> Vec<u64> {
    if step == 0 {
        return Vec::new();
    }
    (start..stop).step_by(step as usize).collect()
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_axis() {
        assert_eq!(rate_axis(100, 500, 100), vec![100, 200, 300, 400]);
        assert_eq!(rate_axis(100_000, 1_100_000, 100_000).len(), 10);
        assert!(rate_axis(1, 10, 0).is_empty());
    }
}
