//! Nearest-rank percentile utility

use crate::error::StatsError;
use std::cmp::Ordering;

/// Minimum number of samples before a percentile is reported
pub const MIN_PERCENTILE_SAMPLES: usize = 100;

/// Nearest-rank percentile with a minimum-sample guard
#[derive(Debug, Clone, Copy)]
pub struct Percentile {
    pub min_samples: usize,
}

impl Default for Percentile {
    fn default() -> Self {
        Self {
            min_samples: MIN_PERCENTILE_SAMPLES,
        }
    }
}

impl Percentile {
    pub fn with_min_samples(min_samples: usize) -> Self {
        Self { min_samples }
    }

    /// Order statistic at index `floor(p * (n - 1) / 100)` of the sorted samples
    pub fn compute<T>(&self, p: f64, samples: &[T]) -> Result<T, StatsError>
    where
        T: Copy + PartialOrd,
    {
        // Sample guard first: an empty set is always insufficient
        if samples.len() < self.min_samples.max(1) {
            return Err(StatsError::InsufficientSamples {
                samples: samples.len(),
                required: self.min_samples.max(1),
            });
        }
        if !(0.0..=100.0).contains(&p) {
            return Err(StatsError::OutOfRange(p));
        }

        let mut sorted = samples.to_vec();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));

        let n = sorted.len();
        let idx = ((p * (n - 1) as f64) / 100.0).floor() as usize;
        Ok(sorted[idx.min(n - 1)])
    }
}

/// [`Percentile::compute`] with the default 100-sample guard
pub fn percentile<T>(p: f64, samples: &[T]) -> Result<T, StatsError>
where
    T: Copy + PartialOrd,
{
    Percentile::default().compute(p, samples)
}
