//! Short-term profile from violating-epoch observations
//!
//! Samples at one flow count spread widely because of transient bursts.
//! Taking a running maximum from the highest observed flow count downward
//! yields a conservative envelope that is non-increasing in flow count by
//! construction.

use super::{CapacityProfile, CapacityProfileSource, ProfileArtifact};
use crate::error::ProfileError;
use crate::models::ObservationPoint;
use async_trait::async_trait;
use std::collections::BTreeMap;
use tracing::debug;

/// Build the envelope covering flow counts `1..max_flow - 1`.
///
/// `max_flow` is the largest observed flow count; it seeds the running
/// maximum but gets no entry of its own. Flow counts with no observation
/// inherit the running maximum, so the profile has no gaps.
pub fn build_short_term_profile(
    observations: &[ObservationPoint],
) -> Result<CapacityProfile, ProfileError> {
    let mut fc_to_pkt: BTreeMap<u32, u64> = BTreeMap::new();
    for obs in observations {
        let best = fc_to_pkt.entry(obs.active_flow_count).or_insert(0);
        *best = (*best).max(obs.packets_processed);
    }

    let (&max_flow, &seed) = fc_to_pkt.iter().next_back().ok_or(ProfileError::NoObservations)?;

    let mut profile = CapacityProfile::new();
    let mut curr_max = seed;
    for flow_count in (1..max_flow).rev() {
        if let Some(&pkts) = fc_to_pkt.get(&flow_count) {
            curr_max = curr_max.max(pkts);
        }
        profile.insert(flow_count, curr_max);
    }

    debug!(
        observations = observations.len(),
        max_flow = max_flow,
        entries = profile.len(),
        "Built short-term envelope"
    );
    Ok(profile)
}

/// Envelope source over an already-classified observation bag
pub struct EnvelopeProfileSource {
    stem: String,
    observations: Vec<ObservationPoint>,
}

impl EnvelopeProfileSource {
    /// `core_id` of `None` means observations merged across cores
    pub fn new(core_id: Option<u32>, observations: Vec<ObservationPoint>) -> Self {
        Self {
            stem: ProfileArtifact::short_term_stem(core_id),
            observations,
        }
    }
}

#[async_trait]
impl CapacityProfileSource for EnvelopeProfileSource {
    fn name(&self) -> &'static str {
        "short_term_envelope"
    }

    async fn build(&self) -> Result<Vec<ProfileArtifact>, ProfileError> {
        let profile = build_short_term_profile(&self.observations)?;
        Ok(vec![ProfileArtifact::new(self.stem.clone(), profile)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(points: &[(u32, u64)]) -> Vec<ObservationPoint> {
        points.iter().map(|&(f, p)| ObservationPoint::new(f, p)).collect()
    }

    #[test]
    fn test_envelope_example() {
        let profile = build_short_term_profile(&obs(&[(10, 500), (8, 700), (9, 300)])).unwrap();

        assert_eq!(profile.len(), 9);
        assert_eq!(profile.get(9), Some(500));
        assert_eq!(profile.get(8), Some(700));
        for flow_count in 1..=7 {
            assert_eq!(profile.get(flow_count), Some(700));
        }
        assert_eq!(profile.get(10), None);
    }

    #[test]
    fn test_duplicates_keep_maximum() {
        let profile = build_short_term_profile(&obs(&[(4, 100), (2, 50), (2, 900), (4, 300)])).unwrap();
        // Seed is the best sample at max_flow=4
        assert_eq!(profile.get(3), Some(300));
        assert_eq!(profile.get(2), Some(900));
        assert_eq!(profile.get(1), Some(900));
    }

    #[test]
    fn test_profile_is_non_increasing_and_gapless() {
        let points = obs(&[
            (40, 120),
            (33, 400),
            (31, 90),
            (20, 800),
            (20, 10),
            (12, 300),
            (5, 1000),
            (3, 20),
        ]);
        let profile = build_short_term_profile(&points).unwrap();

        assert!(profile.is_non_increasing());
        let flows: Vec<u32> = profile.iter().map(|(f, _)| f).collect();
        assert_eq!(flows, (1..40).collect::<Vec<_>>());
    }

    #[test]
    fn test_empty_bag_is_reported() {
        assert!(matches!(
            build_short_term_profile(&[]),
            Err(ProfileError::NoObservations)
        ));
    }

    #[test]
    fn test_single_flow_count_yields_empty_profile() {
        let profile = build_short_term_profile(&obs(&[(1, 100)])).unwrap();
        assert!(profile.is_empty());
    }

    #[test]
    fn test_builder_is_deterministic() {
        let points = obs(&[(6, 10), (2, 40), (4, 25)]);
        assert_eq!(
            build_short_term_profile(&points).unwrap(),
            build_short_term_profile(&points).unwrap()
        );
    }

    #[tokio::test]
    async fn test_envelope_source_names_artifact() {
        let source = EnvelopeProfileSource::new(Some(3), obs(&[(3, 10), (1, 20)]));
        let artifacts = source.build().await.unwrap();
        assert_eq!(artifacts.len(), 1);
        assert_eq!(artifacts[0].stem, "short_term_core3");
        assert_eq!(artifacts[0].profile.get(2), Some(10));
        assert_eq!(artifacts[0].profile.get(1), Some(20));
    }
}
