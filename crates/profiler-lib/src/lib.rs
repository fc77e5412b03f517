//! Capacity profiling for a latency-sensitive packet-processing core
//!
//! Converts per-epoch telemetry, recorded sweeps and live probe
//! measurements into capacity profiles: non-increasing mappings from an
//! active-flow count to the packet volume one core sustains under an SLO.
//!
//! Pipeline:
//! telemetry lines -> [`telemetry`] -> [`classifier`] -> [`profile`] envelope,
//! and independently [`events`] -> [`stats`] for violation durations.
//! [`search`] drives an external [`search::CapacityProbe`] instead.

pub mod classifier;
pub mod error;
pub mod events;
pub mod models;
pub mod observability;
pub mod profile;
pub mod search;
pub mod stats;
pub mod telemetry;

pub use classifier::{Classification, ClassificationRule, SloClassifier, TrimWindow};
pub use error::{ClassificationError, ProfileError, SearchError, StatsError, TelemetryError};
pub use events::{EventAggregator, ViolationReport};
pub use models::{ClusterSnapshot, EpochRecord, EventKind, ObservationPoint, ProbeReading, SloEvent};
pub use profile::{CapacityProfile, CapacityProfileSource, ProfileArtifact};
pub use search::{CapacityProbe, LongTermSearch, SearchPlan};
pub use stats::Percentile;
pub use telemetry::{ClusterLog, TelemetryLog};
