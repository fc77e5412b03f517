//! `calibrate`: short-term calibration through the command probe

use super::{write_artifacts, CommandContext};
use crate::output::{print_info, print_json, print_success, OutputFormat};
use crate::probe::CommandProbe;
use anyhow::Result;
use profiler_lib::profile::CapacityProfileSource;
use profiler_lib::search::ShortTermCalibration;
use serde_json::json;
use std::sync::Arc;

pub async fn run(ctx: &CommandContext, rate: Option<u64>) -> Result<()> {
    let config = &ctx.config;
    let rate = rate.unwrap_or(config.rate_start);
    let points: Vec<(u32, u64)> = config.flow_counts.iter().map(|&f| (f, rate)).collect();

    let probe = CommandProbe::new(
        config.probe_command.clone(),
        config.latency_percentiles.clone(),
        config.observation_window(),
    )?;

    if let OutputFormat::Table = ctx.format {
        print_info(&format!(
            "Calibrating {} flow counts at {} pps",
            points.len(),
            rate
        ));
    }

    let calibration = ShortTermCalibration::new(
        Arc::new(probe),
        points,
        config.classifier(),
        ctx.logger.clone(),
    );
    let artifacts = calibration.build().await?;
    for artifact in &artifacts {
        ctx.logger
            .log_profile_built(calibration.name(), &artifact.stem, artifact.profile.len());
    }

    let written = write_artifacts(&artifacts, &config.output_dir, &ctx.logger).await?;
    match ctx.format {
        OutputFormat::Json => print_json(&json!({ "rate": rate, "artifacts": written }))?,
        OutputFormat::Table => {
            for w in &written {
                print_success(&format!("Wrote {} ({} entries)", w.path.display(), w.entries));
            }
        }
    }
    Ok(())
}
