//! Error taxonomy for the profiling pipeline

use std::path::PathBuf;
use thiserror::Error;

/// Failure while loading a telemetry log
#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("failed to read telemetry log {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// An epoch matched both the violating and the non-violating predicate.
///
/// This is a defect in the classification rule, never recoverable.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ClassificationError {
    #[error("epoch {epoch_id} (index {index}) classified as both violating and non-violating")]
    Overlap { epoch_id: u64, index: usize },
}

/// Explicit "Na" results of the percentile utility
#[derive(Debug, Error, Clone, Copy, PartialEq)]
pub enum StatsError {
    #[error("Na (not enough samples: {samples}, need {required})")]
    InsufficientSamples { samples: usize, required: usize },
    #[error("Na (p val out of range: {0})")]
    OutOfRange(f64),
}

/// Why the long-term search could not produce a rate for a flow count
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SearchError {
    /// Even the smallest candidate rate violates the SLO
    #[error("flow count {flow_count} is unservable: {min_rate} pps already violates the SLO")]
    Unservable { flow_count: u32, min_rate: u64 },
    /// The probe returned an empty or failed measurement window
    #[error("probe returned no result for flow count {flow_count} at {rate} pps")]
    NoResult { flow_count: u32, rate: u64 },
    #[error("search for flow count {flow_count} cancelled")]
    Cancelled { flow_count: u32 },
    #[error("candidate rate list is empty")]
    EmptyCandidates,
    #[error("candidate rates must be strictly increasing")]
    UnsortedCandidates,
    #[error("no probe sessions configured")]
    NoSessions,
    #[error("percentile tier p{tier} is not reported by the probe")]
    UnknownTier { tier: u32 },
}

/// Failure to build, read or write a capacity profile
#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("no observations to build a profile from")]
    NoObservations,
    #[error(transparent)]
    Classification(#[from] ClassificationError),
    #[error("long-term search failed with {} unresolved tier(s); first: {first}", .failures.len())]
    Search {
        first: SearchError,
        failures: Vec<SearchError>,
    },
    #[error("malformed profile line {line}: {content:?}")]
    Malformed { line: usize, content: String },
    #[error("profile artifact I/O on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
