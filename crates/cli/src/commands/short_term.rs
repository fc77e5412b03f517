//! `short-term`: envelope profile from violating epochs

use super::{load_telemetry, write_artifacts, CommandContext};
use crate::output::{print_json, print_success, print_warning, OutputFormat};
use anyhow::{bail, Result};
use profiler_lib::profile::{CapacityProfileSource, EnvelopeProfileSource};
use serde_json::json;
use std::path::PathBuf;

pub async fn run(ctx: &CommandContext, logs: Vec<PathBuf>, core: Option<u32>) -> Result<()> {
    if logs.is_empty() {
        bail!("no telemetry logs given");
    }

    let log = load_telemetry(&logs, &ctx.logger).await?;
    let classifier = ctx.config.classifier();

    let mut violating = Vec::new();
    for (core_id, records) in log.by_core() {
        if core.is_some_and(|c| c != core_id) {
            continue;
        }
        let classification = classifier.classify(&records)?;
        ctx.logger.log_classification(
            core_id,
            classification.violating.len(),
            classification.non_violating.len(),
            classification.unclassified,
        );
        violating.extend(classification.violating);
    }

    if violating.is_empty() {
        print_warning("No violating epochs found; nothing to build");
    }

    let source = EnvelopeProfileSource::new(core, violating);
    let artifacts = source.build().await?;
    for artifact in &artifacts {
        ctx.logger
            .log_profile_built(source.name(), &artifact.stem, artifact.profile.len());
    }

    let written = write_artifacts(&artifacts, &ctx.config.output_dir, &ctx.logger).await?;

    match ctx.format {
        OutputFormat::Json => print_json(&json!({
            "artifacts": written,
            "profiles": artifacts,
        }))?,
        OutputFormat::Table => {
            for w in &written {
                print_success(&format!("Wrote {} ({} entries)", w.path.display(), w.entries));
            }
        }
    }
    Ok(())
}
