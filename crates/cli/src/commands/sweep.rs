//! `sweep`: long-term profiles from a recorded rate/flow sweep

use super::{write_artifacts, CommandContext};
use crate::output::{print_info, print_json, print_success, OutputFormat};
use anyhow::{bail, Context, Result};
use profiler_lib::profile::{CapacityProfileSource, SweepProfileSource, SweepTable};
use serde_json::json;
use std::path::PathBuf;

pub async fn run(ctx: &CommandContext, results: PathBuf, pkt_size: u32) -> Result<()> {
    let content = tokio::fs::read_to_string(&results)
        .await
        .with_context(|| format!("Failed to read sweep results {}", results.display()))?;

    let table = SweepTable::parse(&content, &ctx.config.latency_percentiles);
    if table.rows.is_empty() {
        bail!(
            "no sweep rows with {} latency columns in {}",
            ctx.config.latency_percentiles.len(),
            results.display()
        );
    }
    let rows = table.rows.len();

    let source = SweepProfileSource {
        table,
        pkt_size,
        slo_ns: ctx.config.slo_ns,
        tiers: ctx.config.profile_tiers(),
    };
    let artifacts = source.build().await?;
    for artifact in &artifacts {
        ctx.logger
            .log_profile_built(source.name(), &artifact.stem, artifact.profile.len());
    }

    let written = write_artifacts(&artifacts, &ctx.config.output_dir, &ctx.logger).await?;

    match ctx.format {
        OutputFormat::Json => print_json(&json!({
            "rows": rows,
            "pkt_size": pkt_size,
            "slo_ns": ctx.config.slo_ns,
            "artifacts": written,
        }))?,
        OutputFormat::Table => {
            print_info(&format!("{} sweep rows, packet size {}", rows, pkt_size));
            for w in &written {
                print_success(&format!("Wrote {} ({} entries)", w.path.display(), w.entries));
            }
        }
    }
    Ok(())
}
