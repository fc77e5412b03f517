//! Sub-command implementations

pub mod analyze;
pub mod calibrate;
pub mod long_term;
pub mod short_term;
pub mod sweep;

use crate::config::ProfilerConfig;
use crate::output::OutputFormat;
use anyhow::{Context, Result};
use profiler_lib::observability::StructuredLogger;
use profiler_lib::profile::ProfileArtifact;
use profiler_lib::telemetry::TelemetryLog;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// State shared by every sub-command
pub struct CommandContext {
    pub config: ProfilerConfig,
    pub format: OutputFormat,
    pub logger: StructuredLogger,
}

/// One written artifact, as reported to the user
#[derive(Debug, Serialize)]
pub struct WrittenArtifact {
    pub path: PathBuf,
    pub entries: usize,
}

/// Persist every artifact under `dir`, creating it if needed
pub async fn write_artifacts(
    artifacts: &[ProfileArtifact],
    dir: &Path,
    logger: &StructuredLogger,
) -> Result<Vec<WrittenArtifact>> {
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("Failed to create output directory {}", dir.display()))?;

    let mut written = Vec::with_capacity(artifacts.len());
    for artifact in artifacts {
        let path = artifact.persist(dir).await?;
        logger.log_profile_written(&path.display().to_string(), artifact.profile.len());
        written.push(WrittenArtifact {
            path,
            entries: artifact.profile.len(),
        });
    }
    Ok(written)
}

/// Load and concatenate telemetry logs in argument order
pub async fn load_telemetry(paths: &[PathBuf], logger: &StructuredLogger) -> Result<TelemetryLog> {
    let mut merged = TelemetryLog::default();
    for path in paths {
        let log = TelemetryLog::load(path).await?;
        logger.log_telemetry_loaded(
            &path.display().to_string(),
            log.records.len(),
            log.skipped_lines,
            log.by_core().len(),
        );
        merged.extend(log);
    }
    Ok(merged)
}
