use serde::{Deserialize, Serialize};

/// One objective evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trial {
    /// 1-based evaluation index.
    pub iteration: usize,
    /// Raw sampled point, one value per search dimension.
    pub x: Vec<f64>,
    pub value: f64,
    /// Strictly better than every earlier trial.
    pub is_best: bool,
    /// Best value seen up to and including this trial.
    pub best_so_far: f64,
}

/// Outcome of a search run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationResult {
    /// Best point, if at least one evaluation completed.
    pub best_x: Option<Vec<f64>>,
    /// `+inf` when nothing was evaluated.
    pub best_value: f64,
    pub trials: Vec<Trial>,
    /// The cancellation token stopped the run before the budget was used.
    pub stopped: bool,
}

impl OptimizationResult {
    pub fn iterations(&self) -> usize {
        self.trials.len()
    }
}

/// The search itself could not run.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OptimizerFailure {
    #[error("search space has no dimensions")]
    EmptySpace,
    #[error("malformed search dimension {name}: low {low} must be below high {high}")]
    MalformedSpace { name: String, low: f64, high: f64 },
    #[error("iteration budget must be at least 1")]
    ZeroBudget,
    #[error("objective returned a non-finite value ({value}) at iteration {iteration}")]
    NonFiniteObjective { iteration: usize, value: f64 },
    #[error("surrogate model failed: {0}")]
    Surrogate(String),
    #[error("optimization worker panicked")]
    WorkerPanicked,
}
