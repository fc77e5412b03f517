//! Short-term calibration through a live probe

use super::CapacityProbe;
use crate::classifier::{Classification, SloClassifier};
use crate::error::ProfileError;
use crate::models::EpochRecord;
use crate::observability::{ProfilerMetrics, StructuredLogger};
use crate::profile::{build_short_term_profile, CapacityProfileSource, ProfileArtifact};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::warn;

/// Stem of the artifact written by a calibration run
pub const CALIBRATED_STEM: &str = "short_term_calibrated";

/// Drives the probe over fixed `(flow_count, rate)` points and builds the
/// envelope from the violating epochs of the telemetry each probe returns.
pub struct ShortTermCalibration {
    probe: Arc<dyn CapacityProbe>,
    points: Vec<(u32, u64)>,
    classifier: SloClassifier,
    logger: StructuredLogger,
}

impl ShortTermCalibration {
    pub fn new(
        probe: Arc<dyn CapacityProbe>,
        points: Vec<(u32, u64)>,
        classifier: SloClassifier,
        logger: StructuredLogger,
    ) -> Self {
        Self {
            probe,
            points,
            classifier,
            logger,
        }
    }

    /// Probe every point and classify the returned telemetry per core
    pub async fn collect(&self) -> Result<Classification, ProfileError> {
        let metrics = ProfilerMetrics::new();
        let mut merged = Classification::default();

        for &(flow_count, rate) in &self.points {
            let start = Instant::now();
            let reading = match self.probe.probe(flow_count, rate).await {
                Ok(reading) => reading.filter(|r| !r.telemetry.is_empty()),
                Err(e) => {
                    warn!(flow_count = flow_count, rate = rate, error = %e, "Probe failed");
                    None
                }
            };
            let elapsed = start.elapsed();
            metrics.observe_probe(elapsed.as_secs_f64(), reading.is_none());
            self.logger.log_probe(
                flow_count,
                rate,
                reading
                    .as_ref()
                    .and_then(|r| r.latency_percentiles_ns.first().copied()),
                elapsed.as_millis(),
            );

            let Some(reading) = reading else {
                continue;
            };

            let mut by_core: BTreeMap<u32, Vec<EpochRecord>> = BTreeMap::new();
            for record in reading.telemetry {
                by_core.entry(record.core_id).or_default().push(record);
            }
            for (core_id, records) in by_core {
                let classification = self.classifier.classify(&records)?;
                self.logger.log_classification(
                    core_id,
                    classification.violating.len(),
                    classification.non_violating.len(),
                    classification.unclassified,
                );
                merged.merge(classification);
            }
        }

        Ok(merged)
    }
}

#[async_trait]
impl CapacityProfileSource for ShortTermCalibration {
    fn name(&self) -> &'static str {
        "short_term_calibration"
    }

    async fn build(&self) -> Result<Vec<ProfileArtifact>, ProfileError> {
        let classification = self.collect().await?;
        let profile = build_short_term_profile(&classification.violating)?;
        Ok(vec![ProfileArtifact::new(CALIBRATED_STEM, profile)])
    }
}
