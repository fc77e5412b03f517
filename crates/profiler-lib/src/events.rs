//! SLO event aggregation
//!
//! Groups consecutive violating epochs of one core into SLO events and
//! summarises how much of the run they cover. An event is only counted
//! once its end has been observed; a run still open when the stream ends
//! is discarded.

use crate::error::StatsError;
use crate::models::{EpochRecord, EventKind, SloEvent};
use crate::stats::Percentile;
use serde::Serialize;

/// Events lasting at least this many epochs are long-term
pub const DEFAULT_LONG_TERM_EPOCHS: u64 = 20;

/// Event duration percentiles reported by [`ViolationReport`]
pub const DURATION_PERCENTILES: [f64; 3] = [90.0, 95.0, 99.0];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Clear,
    Violating { epoch_count: u64, packet_count: u64 },
}

/// Run-length encoder over the `slo_violations > 0` predicate
#[derive(Debug, Clone, Copy)]
pub struct EventAggregator {
    pub long_term_epochs: u64,
}

impl Default for EventAggregator {
    fn default() -> Self {
        Self {
            long_term_epochs: DEFAULT_LONG_TERM_EPOCHS,
        }
    }
}

impl EventAggregator {
    pub fn new(long_term_epochs: u64) -> Self {
        Self { long_term_epochs }
    }

    pub fn kind_of(&self, epoch_count: u64) -> EventKind {
        if epoch_count < self.long_term_epochs {
            EventKind::ShortTerm
        } else {
            EventKind::LongTerm
        }
    }

    /// Completed SLO events of one core's ordered epoch stream
    pub fn aggregate(&self, records: &[EpochRecord]) -> Vec<SloEvent> {
        let mut events = Vec::new();
        let mut state = State::Clear;

        for record in records {
            state = match (state, record.is_violating()) {
                (State::Clear, false) => State::Clear,
                (State::Clear, true) => State::Violating {
                    epoch_count: 1,
                    packet_count: record.slo_violations,
                },
                (
                    State::Violating {
                        epoch_count,
                        packet_count,
                    },
                    true,
                ) => State::Violating {
                    epoch_count: epoch_count.saturating_add(1),
                    packet_count: packet_count.saturating_add(record.slo_violations),
                },
                (
                    State::Violating {
                        epoch_count,
                        packet_count,
                    },
                    false,
                ) => {
                    events.push(SloEvent {
                        epoch_count,
                        packet_count,
                        kind: self.kind_of(epoch_count),
                    });
                    State::Clear
                }
            };
        }

        events
    }
}

/// Epoch and packet totals for one event class
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct EventClassSummary {
    pub events: usize,
    pub epochs: u64,
    pub packets: u64,
    /// Share of all epochs spent inside events of this class, in percent
    pub epoch_ratio: f64,
    /// Share of all packets that violated inside this class, in percent
    pub packet_ratio: f64,
}

/// Violation statistics over one or more cores
#[derive(Debug, Clone, Default, Serialize)]
pub struct ViolationReport {
    pub total_epochs: u64,
    /// Sum of per-epoch arrival rates
    pub total_packets: u64,
    pub short_term: EventClassSummary,
    pub long_term: EventClassSummary,
    #[serde(skip)]
    events: Vec<SloEvent>,
}

impl ViolationReport {
    /// Aggregate one core's stream into a report
    pub fn from_records(aggregator: &EventAggregator, records: &[EpochRecord]) -> Self {
        let mut report = Self {
            total_epochs: records.len() as u64,
            total_packets: saturating_sum(records.iter().map(|r| r.packet_rate)),
            ..Default::default()
        };
        report.events = aggregator.aggregate(records);
        report.recompute();
        report
    }

    /// Fold another core's report into this one
    pub fn merge(&mut self, other: ViolationReport) {
        self.total_epochs = self.total_epochs.saturating_add(other.total_epochs);
        self.total_packets = self.total_packets.saturating_add(other.total_packets);
        self.events.extend(other.events);
        self.recompute();
    }

    pub fn events(&self) -> &[SloEvent] {
        &self.events
    }

    /// Percentile of event durations in epochs, or an explicit Na
    pub fn duration_percentile(&self, percentile: &Percentile, p: f64) -> Result<u64, StatsError> {
        let durations: Vec<u64> = self.events.iter().map(|e| e.epoch_count).collect();
        percentile.compute(p, &durations)
    }

    /// Duration percentiles for [`DURATION_PERCENTILES`]
    pub fn duration_percentiles(&self, percentile: &Percentile) -> Vec<(f64, Result<u64, StatsError>)> {
        DURATION_PERCENTILES
            .iter()
            .map(|&p| (p, self.duration_percentile(percentile, p)))
            .collect()
    }

    fn recompute(&mut self) {
        let mut short = EventClassSummary::default();
        let mut long = EventClassSummary::default();

        for event in &self.events {
            let summary = match event.kind {
                EventKind::ShortTerm => &mut short,
                EventKind::LongTerm => &mut long,
            };
            summary.events += 1;
            summary.epochs = summary.epochs.saturating_add(event.epoch_count);
            summary.packets = summary.packets.saturating_add(event.packet_count);
        }

        for summary in [&mut short, &mut long] {
            summary.epoch_ratio = ratio(summary.epochs, self.total_epochs);
            summary.packet_ratio = ratio(summary.packets, self.total_packets);
        }

        self.short_term = short;
        self.long_term = long;
    }
}

/// Counters saturate at `u64::MAX` instead of wrapping
fn saturating_sum(values: impl Iterator<Item = u64>) -> u64 {
    values.fold(0u64, u64::saturating_add)
}

fn ratio(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 * 100.0 / total as f64
    }
}
