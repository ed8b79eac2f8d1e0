//! Aggregate counting error over an image set.

use serde::{Deserialize, Serialize};

/// Reduction applied to per-image absolute count errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorMetric {
    /// Arithmetic mean.
    #[default]
    Average,
    /// Total error.
    Sum,
    /// Worst single image.
    Max,
}

impl ErrorMetric {
    pub const ALL: [ErrorMetric; 3] = [Self::Average, Self::Sum, Self::Max];

    pub fn name(self) -> &'static str {
        match self {
            Self::Average => "average",
            Self::Sum => "sum",
            Self::Max => "max",
        }
    }

    /// Reduce per-image errors to one scalar. An empty slice scores 0.
    pub fn aggregate(self, errors: &[f64]) -> f64 {
        if errors.is_empty() {
            return 0.0;
        }
        match self {
            Self::Average => errors.iter().sum::<f64>() / errors.len() as f64,
            Self::Sum => errors.iter().sum(),
            Self::Max => errors.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        }
    }
}

impl std::fmt::Display for ErrorMetric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown error metric {0:?} (expected average, sum or max)")]
pub struct UnknownMetric(pub String);

impl std::str::FromStr for ErrorMetric {
    type Err = UnknownMetric;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|m| m.name().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| UnknownMetric(wanted.to_string()))
    }
}

/// `|detected - target|` for one image.
pub fn count_error(detected: usize, target: i64) -> f64 {
    (detected as i64 - target).unsigned_abs() as f64
}

/// Score detected counts against targets, pairwise.
pub fn score_counts(metric: ErrorMetric, detected: &[usize], targets: &[i64]) -> f64 {
    debug_assert_eq!(detected.len(), targets.len());
    let errors: Vec<f64> = detected
        .iter()
        .zip(targets)
        .map(|(&d, &t)| count_error(d, t))
        .collect();
    metric.aggregate(&errors)
}
