//! SLO classification of epochs
//!
//! Partitions the interior epochs of one core's record stream into
//! violating and non-violating observation sets. The first and last few
//! epochs are excluded because log captures start and stop mid-window.

use crate::error::ClassificationError;
use crate::models::{EpochRecord, ObservationPoint};
use serde::{Deserialize, Serialize};

/// Epochs excluded from each end of a record stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrimWindow {
    pub leading: usize,
    pub trailing: usize,
}

impl Default for TrimWindow {
    fn default() -> Self {
        Self {
            leading: 1,
            trailing: 2,
        }
    }
}

impl TrimWindow {
    pub fn new(leading: usize, trailing: usize) -> Self {
        Self { leading, trailing }
    }

    /// Index range of the interior epochs of a stream of length `n`
    pub fn interior(&self, n: usize) -> std::ops::Range<usize> {
        let end = n.saturating_sub(self.trailing);
        let start = self.leading.min(end);
        start..end
    }
}

/// Predicate deciding which class an epoch belongs to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum ClassificationRule {
    /// `slo_violations > 0` is violating, `== 0` is not
    #[default]
    SingleEpoch,
    /// An epoch is non-violating when it and the next `run - 1` epochs are
    /// all clear, and violating when it, its predecessor and the following
    /// `run - 2` epochs all carry at least `min_violations` violations.
    /// The violating window always spans the epoch itself, even for
    /// `run < 2`. Epochs matching neither remain unclassified.
    Hysteresis { run: usize, min_violations: u64 },
}

impl ClassificationRule {
    fn is_clear(&self, records: &[EpochRecord], idx: usize) -> bool {
        match *self {
            Self::SingleEpoch => records[idx].slo_violations == 0,
            Self::Hysteresis { run, .. } => window(records, idx, run)
                .map(|w| w.iter().all(|r| r.slo_violations == 0))
                .unwrap_or(false),
        }
    }

    fn is_violating(&self, records: &[EpochRecord], idx: usize) -> bool {
        match *self {
            Self::SingleEpoch => records[idx].slo_violations > 0,
            Self::Hysteresis {
                run,
                min_violations,
            } => idx
                .checked_sub(1)
                .and_then(|start| window(records, start, run.max(2)))
                .map(|w| w.iter().all(|r| r.slo_violations >= min_violations))
                .unwrap_or(false),
        }
    }
}

/// `records[start..start + len]`, or `None` if it runs past the end
fn window(records: &[EpochRecord], start: usize, len: usize) -> Option<&[EpochRecord]> {
    records.get(start..start.checked_add(len.max(1))?)
}

/// Result of classifying one core's epochs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub violating: Vec<ObservationPoint>,
    pub non_violating: Vec<ObservationPoint>,
    /// Interior epochs that matched neither predicate
    pub unclassified: usize,
}

impl Classification {
    /// Merge another core's classification into this one
    pub fn merge(&mut self, other: Classification) {
        self.violating.extend(other.violating);
        self.non_violating.extend(other.non_violating);
        self.unclassified += other.unclassified;
    }

    pub fn total(&self) -> usize {
        self.violating.len() + self.non_violating.len() + self.unclassified
    }
}

/// Classifies epochs of a single core
#[derive(Debug, Clone, Copy, Default)]
pub struct SloClassifier {
    pub trim: TrimWindow,
    pub rule: ClassificationRule,
}

impl SloClassifier {
    pub fn new(trim: TrimWindow, rule: ClassificationRule) -> Self {
        Self { trim, rule }
    }

    /// Partition the interior epochs of `records`.
    ///
    /// Fails fast when the rule places an epoch in both sets.
    pub fn classify(&self, records: &[EpochRecord]) -> Result<Classification, ClassificationError> {
        let mut result = Classification::default();

        for idx in self.trim.interior(records.len()) {
            let clear = self.rule.is_clear(records, idx);
            let violating = self.rule.is_violating(records, idx);

            match (violating, clear) {
                (true, true) => {
                    return Err(ClassificationError::Overlap {
                        epoch_id: records[idx].epoch_id,
                        index: idx,
                    });
                }
                (true, false) => result.violating.push(records[idx].observation()),
                (false, true) => result.non_violating.push(records[idx].observation()),
                (false, false) => result.unclassified += 1,
            }
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn epochs(slo: &[u64]) -> Vec<EpochRecord> {
        slo.iter()
            .enumerate()
            .map(|(i, &v)| EpochRecord {
                epoch_id: i as u64,
                slo_violations: v,
                active_flow_count: 10 + i as u32,
                packets_processed: 100 * (i as u64 + 1),
                ..Default::default()
            })
            .collect()
    }

    #[test]
    fn test_trim_window_interior() {
        let trim = TrimWindow::default();
        assert_eq!(trim.interior(10), 1..8);
        assert_eq!(trim.interior(3), 1..1);
        assert_eq!(trim.interior(0), 0..0);
        assert_eq!(TrimWindow::new(0, 0).interior(4), 0..4);
    }

    #[test]
    fn test_single_epoch_partition() {
        let records = epochs(&[5, 0, 3, 0, 1, 9, 9]);
        let result = SloClassifier::default().classify(&records).unwrap();

        // Interior is indices 1..5
        assert_eq!(result.non_violating.len(), 2);
        assert_eq!(result.violating.len(), 2);
        assert_eq!(result.unclassified, 0);
        assert_eq!(result.violating[0], ObservationPoint::new(12, 300));
        assert_eq!(result.violating[1], ObservationPoint::new(14, 500));
    }

    #[test]
    fn test_classification_is_mutually_exclusive_and_exhaustive() {
        let records = epochs(&[0, 1, 0, 2, 2, 0, 0, 3, 0, 0]);
        let result = SloClassifier::default().classify(&records).unwrap();
        assert_eq!(result.total(), TrimWindow::default().interior(records.len()).len());
        for v in &result.violating {
            assert!(!result.non_violating.contains(v));
        }
    }

    #[test]
    fn test_short_stream_yields_nothing() {
        let result = SloClassifier::default().classify(&epochs(&[1, 1, 1])).unwrap();
        assert_eq!(result.total(), 0);
    }

    #[test]
    fn test_hysteresis_leaves_ambiguous_epochs_unclassified() {
        let rule = ClassificationRule::Hysteresis {
            run: 3,
            min_violations: 10,
        };
        let classifier = SloClassifier::new(TrimWindow::new(1, 2), rule);
        let records = epochs(&[10, 12, 15, 0, 0, 0, 0, 0]);
        let result = classifier.classify(&records).unwrap();

        // idx 1: window 0..3 all >= 10 -> violating
        // idx 2: window 1..4 contains 0 -> not violating; 2..5 contains 15 -> not clear
        // idx 3..5: clear
        assert_eq!(result.violating.len(), 1);
        assert_eq!(result.unclassified, 1);
        assert_eq!(result.non_violating.len(), 3);
    }

    #[test]
    fn test_short_hysteresis_run_includes_the_epoch() {
        let rule = ClassificationRule::Hysteresis {
            run: 1,
            min_violations: 1,
        };
        let classifier = SloClassifier::new(TrimWindow::new(1, 0), rule);
        let records = epochs(&[5, 5, 0, 3, 0]);
        let result = classifier.classify(&records).unwrap();

        // idx 2 follows a violating epoch but is itself clear
        assert_eq!(result.violating, vec![ObservationPoint::new(11, 200)]);
        assert_eq!(result.non_violating.len(), 2);
        assert_eq!(result.unclassified, 1);
    }

    #[test]
    fn test_overlapping_rule_fails_fast() {
        let rule = ClassificationRule::Hysteresis {
            run: 1,
            min_violations: 0,
        };
        let classifier = SloClassifier::new(TrimWindow::new(1, 0), rule);
        let err = classifier.classify(&epochs(&[0, 0, 0])).unwrap_err();
        assert_eq!(
            err,
            ClassificationError::Overlap {
                epoch_id: 1,
                index: 1
            }
        );
    }

    #[test]
    fn test_classification_is_deterministic() {
        let records = epochs(&[0, 4, 0, 0, 7, 7, 0, 1, 0]);
        let classifier = SloClassifier::default();
        assert_eq!(
            classifier.classify(&records).unwrap(),
            classifier.classify(&records).unwrap()
        );
    }
}
