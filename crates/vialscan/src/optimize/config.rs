use serde::{Deserialize, Serialize};

use crate::scoring::ErrorMetric;

/// Configuration for the Bayesian parameter search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Objective evaluation budget.
    pub max_iterations: usize,
    /// Aggregation of per-image errors into the minimized scalar.
    pub metric: ErrorMetric,
    /// Random evaluations before the surrogate takes over.
    ///
    /// Capped at `max_iterations`.
    pub n_initial_points: usize,
    /// Random candidates scored by the acquisition function per proposal.
    pub n_candidates: usize,
    /// Seed for all sampling; equal seeds reproduce a run.
    pub seed: u64,
    /// Exploration margin of expected improvement, in normalized units.
    pub xi: f64,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            max_iterations: 50,
            metric: ErrorMetric::Average,
            n_initial_points: 10,
            n_candidates: 10_000,
            seed: 42,
            xi: 0.01,
        }
    }
}

impl OptimizerConfig {
    pub fn initial_points(&self) -> usize {
        self.n_initial_points.min(self.max_iterations)
    }
}
