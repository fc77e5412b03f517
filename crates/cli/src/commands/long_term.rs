//! `long-term`: live binary search against the command probe

use super::{write_artifacts, CommandContext};
use crate::output::{color_search_result, print_grid, print_json, print_success, print_warning, OutputFormat};
use crate::probe::CommandProbe;
use anyhow::Result;
use profiler_lib::error::SearchError;
use profiler_lib::search::{CapacityProbe, LongTermReport, LongTermSearch};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::warn;

#[derive(Debug, Serialize)]
struct FlowCountRow {
    flow_count: u32,
    probes: usize,
    rates: BTreeMap<String, Option<u64>>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    failures: BTreeMap<String, String>,
}

pub async fn run(ctx: &CommandContext) -> Result<()> {
    let config = &ctx.config;

    let mut sessions: Vec<Arc<dyn CapacityProbe>> = Vec::with_capacity(config.sessions);
    for _ in 0..config.sessions {
        sessions.push(Arc::new(CommandProbe::new(
            config.probe_command.clone(),
            config.latency_percentiles.clone(),
            config.observation_window(),
        )?));
    }

    let search = LongTermSearch::new(sessions, config.search_plan(), ctx.logger.clone());

    let cancel = search.cancel_handle();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling search");
            cancel.cancel();
        }
    });
    let report = search.run().await;
    interrupt.abort();
    let report = report?;

    render(ctx, &report)?;

    let artifacts = match report.artifacts() {
        Ok(artifacts) => artifacts,
        Err(e) => {
            let failures = report.failures();
            print_warning(&format!(
                "{} tier result(s) unresolved; no profile written",
                failures.len()
            ));
            if failures.iter().any(|f| matches!(f, SearchError::Unservable { .. })) {
                print_warning("Some flow counts cannot be served at the minimum candidate rate");
            }
            return Err(e.into());
        }
    };

    let written = write_artifacts(&artifacts, &config.output_dir, &ctx.logger).await?;
    if let OutputFormat::Table = ctx.format {
        for w in &written {
            print_success(&format!("Wrote {} ({} entries)", w.path.display(), w.entries));
        }
    }
    Ok(())
}

fn render(ctx: &CommandContext, report: &LongTermReport) -> Result<()> {
    match ctx.format {
        OutputFormat::Json => {
            let rows: Vec<FlowCountRow> = report
                .outcomes
                .iter()
                .map(|o| FlowCountRow {
                    flow_count: o.flow_count,
                    probes: o.probes,
                    rates: o
                        .results
                        .iter()
                        .map(|(tier, r)| (format!("p{tier}"), r.as_ref().ok().copied()))
                        .collect(),
                    failures: o
                        .results
                        .iter()
                        .filter_map(|(tier, r)| {
                            r.as_ref().err().map(|e| (format!("p{tier}"), e.to_string()))
                        })
                        .collect(),
                })
                .collect();
            print_json(&rows)
        }
        OutputFormat::Table => {
            let (header, rows) = grid(report);
            print_grid(header, rows);
            Ok(())
        }
    }
}

/// Header and rows of the result table, one column per tier in plan order
fn grid(report: &LongTermReport) -> (Vec<String>, Vec<Vec<String>>) {
    let mut header = vec!["Flow count".to_string(), "Probes".to_string()];
    header.extend(report.tiers.iter().map(|t| format!("p{t} rate")));

    let rows = report
        .outcomes
        .iter()
        .map(|o| {
            let mut row = vec![o.flow_count.to_string(), o.probes.to_string()];
            row.extend(report.tiers.iter().map(|tier| {
                o.results
                    .get(tier)
                    .map(color_search_result)
                    .unwrap_or_default()
            }));
            row
        })
        .collect();
    (header, rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use profiler_lib::search::FlowCountOutcome;

    #[test]
    fn test_grid_columns_follow_tier_order() {
        let report = LongTermReport {
            slo_ns: 200_000,
            tiers: vec![90, 50],
            outcomes: vec![FlowCountOutcome {
                flow_count: 1000,
                results: BTreeMap::from([
                    (50, Ok(300_000)),
                    (90, Err(SearchError::Unservable {
                        flow_count: 1000,
                        min_rate: 100_000,
                    })),
                ]),
                probes: 4,
            }],
        };

        let (header, rows) = grid(&report);
        assert_eq!(header[2], "p90 rate");
        assert_eq!(header[3], "p50 rate");
        assert_eq!(rows[0].len(), header.len());
        assert!(rows[0][2].contains("unservable"));
        assert!(rows[0][3].contains("300000"));
    }
}
