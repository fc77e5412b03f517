//! `analyze`: classification and violation statistics for telemetry logs

use super::{load_telemetry, CommandContext};
use crate::output::{format_ratio, format_stat, print_heading, print_info, print_json, print_table, OutputFormat};
use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use colored::Colorize;
use profiler_lib::events::ViolationReport;
use profiler_lib::telemetry::{ClusterLog, ClusterSummary};
use serde::Serialize;
use std::path::PathBuf;
use tabled::Tabled;

/// Per-core results
#[derive(Debug, Serialize)]
struct CoreAnalysis {
    core_id: u32,
    epochs: usize,
    violating: usize,
    non_violating: usize,
    unclassified: usize,
    report: ViolationReport,
}

#[derive(Debug, Serialize)]
struct DurationPercentile {
    percentile: f64,
    epochs: Option<u64>,
    /// Why the value is Na
    #[serde(skip_serializing_if = "Option::is_none")]
    na: Option<String>,
}

#[derive(Debug, Serialize)]
struct AnalysisOutput {
    generated_at: DateTime<Utc>,
    sources: Vec<PathBuf>,
    skipped_lines: usize,
    cores: Vec<CoreAnalysis>,
    cluster: ViolationReport,
    duration_percentiles: Vec<DurationPercentile>,
    #[serde(skip_serializing_if = "Option::is_none")]
    cluster_snapshots: Option<ClusterSummary>,
}

#[derive(Tabled)]
struct CoreRow {
    #[tabled(rename = "Core")]
    core: u32,
    #[tabled(rename = "Epochs")]
    epochs: usize,
    #[tabled(rename = "Violating")]
    violating: usize,
    #[tabled(rename = "Clear")]
    non_violating: usize,
    #[tabled(rename = "Unclassified")]
    unclassified: usize,
    #[tabled(rename = "Short events")]
    short_events: usize,
    #[tabled(rename = "Long events")]
    long_events: usize,
    #[tabled(rename = "Short epochs")]
    short_epochs: String,
    #[tabled(rename = "Long epochs")]
    long_epochs: String,
}

pub async fn run(ctx: &CommandContext, logs: Vec<PathBuf>, cluster: Option<PathBuf>) -> Result<()> {
    if logs.is_empty() {
        bail!("no telemetry logs given");
    }

    let log = load_telemetry(&logs, &ctx.logger).await?;
    let classifier = ctx.config.classifier();
    let aggregator = ctx.config.event_aggregator();

    let mut cores = Vec::new();
    let mut cluster_report = ViolationReport::default();
    for (core_id, records) in log.by_core() {
        let classification = classifier.classify(&records)?;
        ctx.logger.log_classification(
            core_id,
            classification.violating.len(),
            classification.non_violating.len(),
            classification.unclassified,
        );

        let report = ViolationReport::from_records(&aggregator, &records);
        ctx.logger.log_violation_summary(
            Some(core_id),
            report.short_term.events,
            report.long_term.events,
        );
        cluster_report.merge(report.clone());

        cores.push(CoreAnalysis {
            core_id,
            epochs: records.len(),
            violating: classification.violating.len(),
            non_violating: classification.non_violating.len(),
            unclassified: classification.unclassified,
            report,
        });
    }
    ctx.logger.log_violation_summary(
        None,
        cluster_report.short_term.events,
        cluster_report.long_term.events,
    );

    let percentile = ctx.config.percentile();
    let durations = cluster_report.duration_percentiles(&percentile);

    let cluster_snapshots = match &cluster {
        Some(path) => ClusterLog::load(path).await?.summary(),
        None => None,
    };

    match ctx.format {
        OutputFormat::Json => print_json(&AnalysisOutput {
            generated_at: Utc::now(),
            sources: logs,
            skipped_lines: log.skipped_lines,
            cores,
            duration_percentiles: durations
                .iter()
                .map(|(p, result)| DurationPercentile {
                    percentile: *p,
                    epochs: result.as_ref().ok().copied(),
                    na: result.as_ref().err().map(ToString::to_string),
                })
                .collect(),
            cluster: cluster_report,
            cluster_snapshots,
        })?,
        OutputFormat::Table => {
            print_heading("Telemetry Analysis");
            println!("Logs:                   {}", logs.len());
            println!("Records:                {}", log.records.len());
            println!("Skipped lines:          {}", log.skipped_lines);
            println!();

            let rows: Vec<CoreRow> = cores
                .iter()
                .map(|c| CoreRow {
                    core: c.core_id,
                    epochs: c.epochs,
                    violating: c.violating,
                    non_violating: c.non_violating,
                    unclassified: c.unclassified,
                    short_events: c.report.short_term.events,
                    long_events: c.report.long_term.events,
                    short_epochs: format_ratio(c.report.short_term.epoch_ratio),
                    long_epochs: format_ratio(c.report.long_term.epoch_ratio),
                })
                .collect();
            print_table(&rows);
            println!();

            println!("{}", "Cluster-wide SLO Events".bold());
            println!("{}", "-".repeat(50));
            println!("Total epochs:           {}", cluster_report.total_epochs);
            println!("Total packets:          {}", cluster_report.total_packets);
            println!(
                "Short-term:             {} events, {} epochs ({}), {} packets ({})",
                cluster_report.short_term.events,
                cluster_report.short_term.epochs,
                format_ratio(cluster_report.short_term.epoch_ratio),
                cluster_report.short_term.packets,
                format_ratio(cluster_report.short_term.packet_ratio),
            );
            println!(
                "Long-term:              {} events, {} epochs ({}), {} packets ({})",
                cluster_report.long_term.events,
                cluster_report.long_term.epochs,
                format_ratio(cluster_report.long_term.epoch_ratio),
                cluster_report.long_term.packets,
                format_ratio(cluster_report.long_term.packet_ratio),
            );
            for (p, result) in &durations {
                println!("Duration p{:<4}          {}", p, format_stat(result));
            }

            if let Some(summary) = cluster_snapshots {
                println!();
                println!("{}", "Cluster Snapshots".bold());
                println!("{}", "-".repeat(50));
                println!("Epochs:                 {}", summary.epochs);
                println!("Mean active cores:      {:.2}", summary.mean_active_cores);
                println!("Peak active cores:      {}", summary.peak_active_cores);
                println!("Mean packet rate:       {:.0}", summary.mean_packet_rate);
            } else if cluster.is_some() {
                print_info("Cluster log has no snapshot lines");
            }
        }
    }

    Ok(())
}
