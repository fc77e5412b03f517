//! Telemetry line parsing
//!
//! Each telemetry line is a comma-separated list of `key:value` fields,
//! for example:
//!
//! ```text
//! epoch:12, size:200, core:1, slo:0, delaye:0, delaym:87, flowa:1500, flowb:3, rate:4100, pktp:4096, pktq:12
//! ```
//!
//! A cheap marker sniff rejects unrelated lines before the field split.
//! Recognised keys populate a fixed record; unknown keys are ignored and
//! missing keys leave the field at zero.

use crate::models::{ClusterSnapshot, EpochRecord};

/// Markers a per-core telemetry line must contain
pub const CORE_MARKERS: [&str; 3] = ["epoch", "slo", "rate"];

/// Markers a cluster snapshot line must contain
pub const CLUSTER_MARKERS: [&str; 3] = ["epoch", "core", "rate"];

/// Keys recognised on a per-core telemetry line
pub const CORE_FIELDS: [&str; 11] = [
    "epoch", "size", "core", "slo", "delaye", "delaym", "flowa", "flowb", "rate", "pktp", "pktq",
];

/// Allow-list of per-core keys
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CoreField {
    Epoch,
    Size,
    Core,
    Slo,
    DelayErrors,
    DelayMax,
    ActiveFlows,
    BurstFlows,
    Rate,
    Processed,
    Queued,
}

impl CoreField {
    fn from_key(key: &str) -> Option<Self> {
        Some(match key {
            "epoch" => Self::Epoch,
            "size" => Self::Size,
            "core" => Self::Core,
            "slo" => Self::Slo,
            "delaye" => Self::DelayErrors,
            "delaym" => Self::DelayMax,
            "flowa" => Self::ActiveFlows,
            "flowb" => Self::BurstFlows,
            "rate" => Self::Rate,
            "pktp" => Self::Processed,
            "pktq" => Self::Queued,
            _ => return None,
        })
    }

    fn assign(self, record: &mut EpochRecord, value: u64) {
        match self {
            Self::Epoch => record.epoch_id = value,
            Self::Size => record.epoch_size = value,
            Self::Core => record.core_id = saturate_u32(value),
            Self::Slo => record.slo_violations = value,
            Self::DelayErrors => record.delay_error_count = value,
            Self::DelayMax => record.max_delay = value,
            Self::ActiveFlows => record.active_flow_count = saturate_u32(value),
            Self::BurstFlows => record.burst_flow_count = saturate_u32(value),
            Self::Rate => record.packet_rate = value,
            Self::Processed => record.packets_processed = value,
            Self::Queued => record.packets_queued = value,
        }
    }
}

/// Check whether `line` carries every marker in `markers`
pub fn has_markers(line: &str, markers: &[&str]) -> bool {
    markers.iter().all(|m| line.contains(m))
}

/// Parse a per-core telemetry line.
///
/// Returns `None` for lines that fail the marker sniff or carry a
/// malformed field (no `:` separator, negative or non-numeric value).
pub fn parse_core_line(line: &str) -> Option<EpochRecord> {
    if !has_markers(line, &CORE_MARKERS) {
        return None;
    }

    let mut record = EpochRecord::default();
    for (key, value) in split_fields(line) {
        let value = value?;
        if let Some(field) = CoreField::from_key(key) {
            field.assign(&mut record, value);
        }
    }
    Some(record)
}

/// Parse a cluster snapshot line (`epoch`, `core`, `rate`)
pub fn parse_cluster_line(line: &str) -> Option<ClusterSnapshot> {
    if !has_markers(line, &CLUSTER_MARKERS) {
        return None;
    }

    let mut snapshot = ClusterSnapshot::default();
    for (key, value) in split_fields(line) {
        let value = value?;
        match key {
            "epoch" => snapshot.epoch_id = value,
            "core" => snapshot.active_cores = saturate_u32(value),
            "rate" => snapshot.packet_rate = value,
            _ => {}
        }
    }
    Some(snapshot)
}

/// Split a line into `(key, value)` pairs.
///
/// A segment without a `:` yields `("", None)` so the caller rejects
/// the whole line.
fn split_fields(line: &str) -> impl Iterator<Item = (&str, Option<u64>)> {
    line.split(',')
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .map(|segment| match segment.split_once(':') {
            Some((key, value)) => (key.trim(), parse_value(value)),
            None => ("", None),
        })
}

/// Parse a non-negative numeric value; integral and float forms are accepted
fn parse_value(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    if let Ok(v) = raw.parse::<u64>() {
        return Some(v);
    }
    let v: f64 = raw.parse().ok()?;
    if v.is_finite() && v >= 0.0 {
        Some(v as u64)
    } else {
        None
    }
}

fn saturate_u32(value: u64) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL_LINE: &str = "epoch:12, size:200, core:1, slo:3, delaye:2, delaym:87, flowa:1500, flowb:4, rate:4100, pktp:4096, pktq:12";

    #[test]
    fn test_parse_full_line() {
        let record = parse_core_line(FULL_LINE).unwrap();
        assert_eq!(record.epoch_id, 12);
        assert_eq!(record.epoch_size, 200);
        assert_eq!(record.core_id, 1);
        assert_eq!(record.slo_violations, 3);
        assert_eq!(record.delay_error_count, 2);
        assert_eq!(record.max_delay, 87);
        assert_eq!(record.active_flow_count, 1500);
        assert_eq!(record.burst_flow_count, 4);
        assert_eq!(record.packet_rate, 4100);
        assert_eq!(record.packets_processed, 4096);
        assert_eq!(record.packets_queued, 12);
    }

    #[test]
    fn test_missing_keys_default_to_zero() {
        let record = parse_core_line("epoch:5, slo:1, rate:300").unwrap();
        assert_eq!(record.epoch_id, 5);
        assert_eq!(record.slo_violations, 1);
        assert_eq!(record.packet_rate, 300);
        assert_eq!(record.active_flow_count, 0);
        assert_eq!(record.packets_processed, 0);
    }

    #[test]
    fn test_unknown_keys_ignored() {
        let record = parse_core_line("epoch:5, slo:0, rate:300, bogus:77, pktp:10").unwrap();
        assert_eq!(record.packets_processed, 10);
    }

    #[test]
    fn test_float_values_accepted() {
        let record = parse_core_line("epoch:5.0, slo:0.0, rate:3e2, pktp:10.9").unwrap();
        assert_eq!(record.epoch_id, 5);
        assert_eq!(record.packet_rate, 300);
        assert_eq!(record.packets_processed, 10);
    }

    #[test]
    fn test_marker_sniff_rejects_unrelated_lines() {
        assert!(parse_core_line("").is_none());
        assert!(parse_core_line("Results for nfvctrl/profile_chain4").is_none());
        assert!(parse_core_line("epoch:1, rate:5").is_none());
    }

    #[test]
    fn test_malformed_fields_reject_line() {
        assert!(parse_core_line("epoch:1, slo:-3, rate:5").is_none());
        assert!(parse_core_line("epoch:1, slo:abc, rate:5").is_none());
        assert!(parse_core_line("epoch:1, slo, rate:5").is_none());
    }

    #[test]
    fn test_every_listed_key_is_recognised() {
        for key in CORE_FIELDS {
            assert!(CoreField::from_key(key).is_some(), "{key} not recognised");
        }
    }

    #[test]
    fn test_parse_is_deterministic() {
        assert_eq!(parse_core_line(FULL_LINE), parse_core_line(FULL_LINE));
    }

    #[test]
    fn test_parse_cluster_line() {
        let snapshot = parse_cluster_line("epoch:7, core:3, rate:125000").unwrap();
        assert_eq!(snapshot.epoch_id, 7);
        assert_eq!(snapshot.active_cores, 3);
        assert_eq!(snapshot.packet_rate, 125000);
        assert!(parse_cluster_line("epoch:7, rate:125000").is_none());
    }
}
