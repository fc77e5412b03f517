//! Profiler configuration
//!
//! Loaded from an optional config file layered under `CAPPROF_*`
//! environment variables. Every field has a default.

use anyhow::{bail, Context, Result};
use profiler_lib::classifier::{ClassificationRule, SloClassifier, TrimWindow};
use profiler_lib::events::EventAggregator;
use profiler_lib::search::{rate_axis, SearchPlan};
use profiler_lib::stats::Percentile;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable prefix
const ENV_PREFIX: &str = "CAPPROF";

/// Keys read from the environment as comma-separated lists
const LIST_KEYS: [&str; 4] = ["latency_percentiles", "tiers", "flow_counts", "probe_command"];

/// Profiler configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ProfilerConfig {
    /// Target latency bound in nanoseconds
    #[serde(default = "default_slo_ns")]
    pub slo_ns: u64,

    /// Percentile labels reported by the probe and the sweep table columns
    #[serde(default = "default_latency_percentiles")]
    pub latency_percentiles: Vec<u32>,

    /// Percentiles to build long-term profiles for
    #[serde(default = "default_tiers")]
    pub tiers: Vec<u32>,

    #[serde(default = "default_rate_start")]
    pub rate_start: u64,

    /// Exclusive upper end of the candidate rate axis
    #[serde(default = "default_rate_stop")]
    pub rate_stop: u64,

    #[serde(default = "default_rate_step")]
    pub rate_step: u64,

    /// Target flow counts for probe-driven runs
    #[serde(default = "default_flow_counts")]
    pub flow_counts: Vec<u32>,

    #[serde(default = "default_trim_leading")]
    pub trim_leading: usize,

    #[serde(default = "default_trim_trailing")]
    pub trim_trailing: usize,

    #[serde(default)]
    pub classification_rule: ClassificationRule,

    /// Event length (in epochs) from which an SLO event is long-term
    #[serde(default = "default_long_term_event_epochs")]
    pub long_term_event_epochs: u64,

    #[serde(default = "default_min_percentile_samples")]
    pub min_percentile_samples: usize,

    /// Observation window each probe blocks for
    #[serde(default = "default_observation_window_secs")]
    pub observation_window_secs: u64,

    /// Hard limit on one probe invocation
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,

    /// Probe argv; `{flow_count}`, `{rate}` and `{window}` are substituted
    #[serde(default)]
    pub probe_command: Vec<String>,

    /// Parallel probe sessions for the long-term search
    #[serde(default = "default_sessions")]
    pub sessions: usize,

    /// Directory profile artifacts are written to
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

fn default_slo_ns() -> u64 {
    200_000
}

fn default_latency_percentiles() -> Vec<u32> {
    vec![50, 75, 90, 95, 99]
}

fn default_tiers() -> Vec<u32> {
    vec![50, 90]
}

fn default_rate_start() -> u64 {
    100_000
}

fn default_rate_stop() -> u64 {
    1_100_000
}

fn default_rate_step() -> u64 {
    100_000
}

fn default_flow_counts() -> Vec<u32> {
    (1000..21_000).step_by(500).collect()
}

fn default_trim_leading() -> usize {
    1
}

fn default_trim_trailing() -> usize {
    2
}

fn default_long_term_event_epochs() -> u64 {
    20
}

fn default_min_percentile_samples() -> usize {
    100
}

fn default_observation_window_secs() -> u64 {
    10
}

fn default_probe_timeout_secs() -> u64 {
    60
}

fn default_sessions() -> usize {
    1
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

impl Default for ProfilerConfig {
    fn default() -> Self {
        Self {
            slo_ns: default_slo_ns(),
            latency_percentiles: default_latency_percentiles(),
            tiers: default_tiers(),
            rate_start: default_rate_start(),
            rate_stop: default_rate_stop(),
            rate_step: default_rate_step(),
            flow_counts: default_flow_counts(),
            trim_leading: default_trim_leading(),
            trim_trailing: default_trim_trailing(),
            classification_rule: ClassificationRule::default(),
            long_term_event_epochs: default_long_term_event_epochs(),
            min_percentile_samples: default_min_percentile_samples(),
            observation_window_secs: default_observation_window_secs(),
            probe_timeout_secs: default_probe_timeout_secs(),
            probe_command: Vec::new(),
            sessions: default_sessions(),
            output_dir: default_output_dir(),
        }
    }
}

impl ProfilerConfig {
    /// Load configuration from an optional file and the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let mut env = config::Environment::with_prefix(ENV_PREFIX)
            .try_parsing(true)
            .list_separator(",");
        for key in LIST_KEYS {
            env = env.with_list_parse_key(key);
        }

        let settings = builder
            .add_source(env)
            .build()
            .context("Failed to load configuration")?;

        settings
            .try_deserialize()
            .context("Failed to parse configuration")
    }

    /// Reject settings no command can run with
    pub fn validate(&self) -> Result<()> {
        let rates = self.candidate_rates();
        if rates.is_empty() {
            bail!(
                "candidate rate axis is empty (start {}, stop {}, step {})",
                self.rate_start,
                self.rate_stop,
                self.rate_step
            );
        }
        if self.sessions == 0 {
            bail!("sessions must be at least 1");
        }
        if self.latency_percentiles.is_empty() {
            bail!("latency_percentiles must not be empty");
        }
        for tier in &self.tiers {
            if !self.latency_percentiles.contains(tier) {
                bail!(
                    "tier p{} is not one of the latency percentiles {:?}",
                    tier,
                    self.latency_percentiles
                );
            }
        }
        Ok(())
    }

    /// Configured tiers in order, repeats dropped
    pub fn profile_tiers(&self) -> Vec<u32> {
        let mut tiers = Vec::with_capacity(self.tiers.len());
        for &tier in &self.tiers {
            if !tiers.contains(&tier) {
                tiers.push(tier);
            }
        }
        tiers
    }

    pub fn candidate_rates(&self) -> Vec<u64> {
        rate_axis(self.rate_start, self.rate_stop, self.rate_step)
    }

    pub fn classifier(&self) -> SloClassifier {
        SloClassifier::new(
            TrimWindow::new(self.trim_leading, self.trim_trailing),
            self.classification_rule,
        )
    }

    pub fn event_aggregator(&self) -> EventAggregator {
        EventAggregator::new(self.long_term_event_epochs)
    }

    pub fn percentile(&self) -> Percentile {
        Percentile::with_min_samples(self.min_percentile_samples)
    }

    pub fn observation_window(&self) -> Duration {
        Duration::from_secs(self.observation_window_secs)
    }

    pub fn search_plan(&self) -> SearchPlan {
        SearchPlan {
            slo_ns: self.slo_ns,
            candidate_rates: self.candidate_rates(),
            flow_counts: self.flow_counts.clone(),
            tiers: self.profile_tiers(),
            probe_timeout: Some(Duration::from_secs(self.probe_timeout_secs)),
        }
    }
}
