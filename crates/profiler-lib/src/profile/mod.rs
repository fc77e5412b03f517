//! Capacity profiles
//!
//! A capacity profile maps an active-flow count to the largest packet
//! volume a single core sustains while meeting the SLO. Profiles come from
//! independent sources with different reliability assumptions:
//! - [`EnvelopeProfileSource`]: retrospective envelope over noisy telemetry
//! - [`SweepProfileSource`]: offline table of a recorded rate/flow sweep
//! - [`crate::search::LongTermSearch`]: live binary search against a probe

mod envelope;
mod sweep;

pub use envelope::{build_short_term_profile, EnvelopeProfileSource};
pub use sweep::{build_sweep_profile, SweepRow, SweepProfileSource, SweepTable};

use crate::error::ProfileError;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;

/// File extension of profile artifacts
pub const PROFILE_EXTENSION: &str = "pro";

/// Ordered mapping from flow count to maximum sustainable packets or rate
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CapacityProfile {
    entries: BTreeMap<u32, u64>,
}

impl CapacityProfile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, flow_count: u32, capacity: u64) {
        self.entries.insert(flow_count, capacity);
    }

    pub fn get(&self, flow_count: u32) -> Option<u64> {
        self.entries.get(&flow_count).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries ascending by flow count
    pub fn iter(&self) -> impl Iterator<Item = (u32, u64)> + '_ {
        self.entries.iter().map(|(&f, &c)| (f, c))
    }

    /// Capacity never increases as the flow count grows
    pub fn is_non_increasing(&self) -> bool {
        self.entries
            .values()
            .zip(self.entries.values().skip(1))
            .all(|(lower_flow, higher_flow)| lower_flow >= higher_flow)
    }

    /// Render as `<flow_count> <capacity>` lines, ascending, no header
    pub fn to_artifact(&self) -> String {
        let mut out = String::new();
        for (flow_count, capacity) in self.iter() {
            out.push_str(&format!("{flow_count} {capacity}\n"));
        }
        out
    }

    /// Parse an artifact produced by [`CapacityProfile::to_artifact`]
    pub fn from_artifact(content: &str) -> Result<Self, ProfileError> {
        let mut profile = Self::new();
        for (idx, line) in content.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let malformed = || ProfileError::Malformed {
                line: idx + 1,
                content: line.to_string(),
            };
            let mut parts = trimmed.split_whitespace();
            let flow_count = parts
                .next()
                .and_then(|v| v.parse().ok())
                .ok_or_else(malformed)?;
            let capacity = parts
                .next()
                .and_then(|v| v.parse().ok())
                .ok_or_else(malformed)?;
            if parts.next().is_some() {
                return Err(malformed());
            }
            profile.insert(flow_count, capacity);
        }
        Ok(profile)
    }

    /// Write the artifact to `path`
    pub async fn write(&self, path: &Path) -> Result<(), ProfileError> {
        fs::write(path, self.to_artifact())
            .await
            .map_err(|source| ProfileError::Io {
                path: path.to_path_buf(),
                source,
            })
    }

    /// Read an artifact from `path`
    pub async fn read(path: &Path) -> Result<Self, ProfileError> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|source| ProfileError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_artifact(&content)
    }
}

impl FromIterator<(u32, u64)> for CapacityProfile {
    fn from_iter<I: IntoIterator<Item = (u32, u64)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// A named profile ready to be persisted
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProfileArtifact {
    /// File name without extension
    pub stem: String,
    pub profile: CapacityProfile,
}

impl ProfileArtifact {
    pub fn new(stem: impl Into<String>, profile: CapacityProfile) -> Self {
        Self {
            stem: stem.into(),
            profile,
        }
    }

    /// Short-term artifact stem for a core, or for all cores merged
    pub fn short_term_stem(core_id: Option<u32>) -> String {
        match core_id {
            Some(core) => format!("short_term_core{core}"),
            None => "short_term_all".to_string(),
        }
    }

    /// Long-term artifact stem; the SLO is encoded in microseconds
    pub fn long_term_stem(slo_ns: u64, tier: u32) -> String {
        format!("long_term_slo{}us_p{tier}", slo_ns / 1000)
    }

    pub fn file_name(&self) -> String {
        format!("{}.{PROFILE_EXTENSION}", self.stem)
    }

    /// Write into `dir`, returning the written path
    pub async fn persist(&self, dir: &Path) -> Result<PathBuf, ProfileError> {
        let path = dir.join(self.file_name());
        self.profile.write(&path).await?;
        Ok(path)
    }
}

/// Anything able to produce capacity profile artifacts
#[async_trait]
pub trait CapacityProfileSource: Send + Sync {
    /// Short label used in logs
    fn name(&self) -> &'static str;

    /// Build every artifact this source is responsible for
    async fn build(&self) -> Result<Vec<ProfileArtifact>, ProfileError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_artifact_format() {
        let profile: CapacityProfile = [(3, 500), (1, 700), (2, 700)].into_iter().collect();
        assert_eq!(profile.to_artifact(), "1 700\n2 700\n3 500\n");
    }

    #[test]
    fn test_parse_artifact() {
        let profile = CapacityProfile::from_artifact("1 700\n\n2 650\n").unwrap();
        assert_eq!(profile.get(1), Some(700));
        assert_eq!(profile.get(2), Some(650));
        assert_eq!(profile.len(), 2);
    }

    #[test]
    fn test_parse_artifact_rejects_garbage() {
        let err = CapacityProfile::from_artifact("1 700\n2 x\n").unwrap_err();
        assert!(matches!(err, ProfileError::Malformed { line: 2, .. }));
        assert!(CapacityProfile::from_artifact("1 2 3\n").is_err());
        assert!(CapacityProfile::from_artifact("1\n").is_err());
    }

    #[test]
    fn test_non_increasing_check() {
        let ok: CapacityProfile = [(1, 9), (2, 9), (5, 3)].into_iter().collect();
        let bad: CapacityProfile = [(1, 9), (2, 10)].into_iter().collect();
        assert!(ok.is_non_increasing());
        assert!(!bad.is_non_increasing());
        assert!(CapacityProfile::new().is_non_increasing());
    }

    #[test]
    fn test_stems() {
        assert_eq!(ProfileArtifact::long_term_stem(200_000, 50), "long_term_slo200us_p50");
        assert_eq!(ProfileArtifact::short_term_stem(Some(1)), "short_term_core1");
        assert_eq!(ProfileArtifact::short_term_stem(None), "short_term_all");
    }

    #[tokio::test]
    async fn test_persist_and_read_back() {
        let dir = TempDir::new().unwrap();
        let profile: CapacityProfile = [(1000, 800_000), (1500, 700_000)].into_iter().collect();
        let artifact = ProfileArtifact::new("long_term_slo200us_p90", profile.clone());

        let path = artifact.persist(dir.path()).await.unwrap();
        assert!(path.ends_with("long_term_slo200us_p90.pro"));
        assert_eq!(CapacityProfile::read(&path).await.unwrap(), profile);
    }
}
