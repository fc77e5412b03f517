//! External-command probe
//!
//! Runs a configured command for every `(flow_count, rate)` point and reads
//! its report from stdout:
//!
//! ```text
//! latency_ns: 41234.0 52011.0 80120.5 95030.0 180222.0
//! packets: 1048576
//! busy: 2291000000
//! epoch:0, size:200, core:1, slo:0, ..., pktq:12
//! ```
//!
//! `latency_ns` carries one value per configured percentile label. Epoch
//! telemetry lines are optional and feed short-term calibration. Unrelated
//! output is ignored.

use anyhow::{Context, Result};
use async_trait::async_trait;
use profiler_lib::models::ProbeReading;
use profiler_lib::search::CapacityProbe;
use profiler_lib::telemetry::parse_core_line;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, warn};

/// Probe configuration and output errors
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("probe_command is not configured")]
    EmptyTemplate,
    #[error("malformed probe report line: {0:?}")]
    Malformed(String),
    #[error("probe reported {found} latency values, expected {expected}")]
    LatencyArity { expected: usize, found: usize },
}

/// Probe backed by an external command
pub struct CommandProbe {
    template: Vec<String>,
    labels: Vec<u32>,
    window: Duration,
}

impl CommandProbe {
    pub fn new(template: Vec<String>, labels: Vec<u32>, window: Duration) -> Result<Self, ProbeError> {
        if template.is_empty() {
            return Err(ProbeError::EmptyTemplate);
        }
        Ok(Self {
            template,
            labels,
            window,
        })
    }

    /// Substitute the placeholders of the argv template
    fn render(&self, flow_count: u32, rate: u64) -> Vec<String> {
        self.template
            .iter()
            .map(|arg| {
                arg.replace("{flow_count}", &flow_count.to_string())
                    .replace("{rate}", &rate.to_string())
                    .replace("{window}", &self.window.as_secs().to_string())
            })
            .collect()
    }
}

#[async_trait]
impl CapacityProbe for CommandProbe {
    fn percentile_labels(&self) -> &[u32] {
        &self.labels
    }

    async fn probe(&self, flow_count: u32, rate: u64) -> Result<Option<ProbeReading>> {
        let argv = self.render(flow_count, rate);
        debug!(argv = ?argv, "Running probe");

        // Dropping the future on cancellation kills the child
        let output = Command::new(&argv[0])
            .args(&argv[1..])
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| format!("Failed to run probe command {:?}", argv[0]))?;

        if !output.status.success() {
            warn!(
                flow_count = flow_count,
                rate = rate,
                status = %output.status,
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "Probe command failed"
            );
            return Ok(None);
        }

        let report = parse_report(&String::from_utf8_lossy(&output.stdout), self.labels.len())?;
        Ok(report)
    }
}

/// Parse a probe report; `None` when it carries neither latencies nor telemetry
pub fn parse_report(stdout: &str, expected_latencies: usize) -> Result<Option<ProbeReading>, ProbeError> {
    let mut reading = ProbeReading::default();

    for line in stdout.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if let Some(values) = line.strip_prefix("latency_ns:") {
            let latencies = values
                .split(|c: char| c.is_whitespace() || c == ',')
                .filter(|v| !v.is_empty())
                .map(str::parse::<f64>)
                .collect::<Result<Vec<_>, _>>()
                .map_err(|_| ProbeError::Malformed(line.to_string()))?;
            if !latencies.is_empty() && latencies.len() != expected_latencies {
                return Err(ProbeError::LatencyArity {
                    expected: expected_latencies,
                    found: latencies.len(),
                });
            }
            reading.latency_percentiles_ns = latencies;
        } else if let Some(value) = line.strip_prefix("packets:") {
            reading.packets_observed = value
                .trim()
                .parse()
                .map_err(|_| ProbeError::Malformed(line.to_string()))?;
        } else if let Some(value) = line.strip_prefix("busy:") {
            reading.busy_cycles = Some(
                value
                    .trim()
                    .parse()
                    .map_err(|_| ProbeError::Malformed(line.to_string()))?,
            );
        } else if let Some(record) = parse_core_line(line) {
            reading.telemetry.push(record);
        }
    }

    Ok((!reading.is_empty()).then_some(reading))
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPORT: &str = "warming up
latency_ns: 41234.0 52011.0 80120.5
packets: 1048576
busy: 2291000000
epoch:0, size:200, core:1, slo:0, delaye:0, delaym:9, flowa:10, flowb:0, rate:100, pktp:90, pktq:0
epoch:1, size:200, core:1, slo:4, delaye:0, delaym:9, flowa:12, flowb:0, rate:100, pktp:95, pktq:3
";

    #[test]
    fn test_parse_full_report() {
        let reading = parse_report(REPORT, 3).unwrap().unwrap();
        assert_eq!(reading.latency_percentiles_ns, vec![41234.0, 52011.0, 80120.5]);
        assert_eq!(reading.packets_observed, 1_048_576);
        assert_eq!(reading.busy_cycles, Some(2_291_000_000));
        assert_eq!(reading.telemetry.len(), 2);
        assert_eq!(reading.telemetry[1].slo_violations, 4);
    }

    #[test]
    fn test_empty_report_is_no_result() {
        assert_eq!(parse_report("", 3).unwrap(), None);
        assert_eq!(parse_report("packets: 12\nlatency_ns:\n", 3).unwrap(), None);
    }

    #[test]
    fn test_latency_arity_mismatch() {
        assert!(matches!(
            parse_report("latency_ns: 1.0, 2.0", 3),
            Err(ProbeError::LatencyArity {
                expected: 3,
                found: 2
            })
        ));
        assert!(matches!(
            parse_report("latency_ns: 1.0 fast", 2),
            Err(ProbeError::Malformed(_))
        ));
    }

    #[test]
    fn test_render_substitutes_placeholders() {
        let probe = CommandProbe::new(
            vec!["run-chain".into(), "--flows={flow_count}".into(), "{rate}".into(), "-t{window}".into()],
            vec![50],
            Duration::from_secs(10),
        )
        .unwrap();
        assert_eq!(
            probe.render(1500, 300_000),
            vec!["run-chain", "--flows=1500", "300000", "-t10"]
        );
    }

    #[test]
    fn test_empty_template_rejected() {
        assert!(matches!(
            CommandProbe::new(Vec::new(), vec![50], Duration::from_secs(1)),
            Err(ProbeError::EmptyTemplate)
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_probe_runs_shell() {
        let probe = CommandProbe::new(
            vec![
                "sh".into(),
                "-c".into(),
                "echo latency_ns: {rate} {flow_count}; echo packets: 7".into(),
            ],
            vec![50, 90],
            Duration::from_secs(1),
        )
        .unwrap();

        let reading = probe.probe(20, 900).await.unwrap().unwrap();
        assert_eq!(reading.latency_percentiles_ns, vec![900.0, 20.0]);
        assert_eq!(reading.packets_observed, 7);

        let failing = CommandProbe::new(vec!["false".into()], vec![50], Duration::from_secs(1)).unwrap();
        assert!(failing.probe(1, 1).await.unwrap().is_none());
    }
}
