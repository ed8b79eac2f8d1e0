use crate::params::ParamId;
use crate::scoring::ErrorMetric;

/// Lifecycle of the session's optimization run.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum OptimizationStatus {
    #[default]
    Idle,
    Running {
        iteration: usize,
        max_iterations: usize,
        best_error: Option<f64>,
    },
    Completed {
        best_error: f64,
        iterations: usize,
        metric: ErrorMetric,
    },
    StoppedByUser,
    Failed(String),
}

impl OptimizationStatus {
    /// Whether this is a final state of a run.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed { .. } | Self::StoppedByUser | Self::Failed(_)
        )
    }
}

impl std::fmt::Display for OptimizationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Running {
                iteration,
                max_iterations,
                best_error,
            } => {
                write!(f, "Optimizing: iteration {iteration}/{max_iterations}")?;
                if let Some(best) = best_error {
                    write!(f, ", best error {best:.2}")?;
                }
                Ok(())
            }
            Self::Completed {
                best_error, metric, ..
            } => write!(
                f,
                "Optimization complete! Best {metric} error: {best_error:.2}"
            ),
            Self::StoppedByUser => write!(f, "Optimization stopped by user"),
            Self::Failed(msg) => write!(f, "Optimization error: {msg}"),
        }
    }
}

/// Per-trial progress for front ends.
#[derive(Debug, Clone, PartialEq)]
pub struct TrialReport {
    /// 1-based.
    pub iteration: usize,
    pub max_iterations: usize,
    pub metric: ErrorMetric,
    pub error: f64,
    pub is_best: bool,
    pub best_error: f64,
    /// Effective values of the searched parameters for this trial.
    pub values: Vec<(ParamId, f64)>,
    /// `name:detected/target` for the first images.
    pub summary: String,
}

impl TrialReport {
    /// `Iter i/N: <metric> error=<x.xx> | <summary>`, plus ` BEST!` on improvement.
    pub fn progress_line(&self) -> String {
        let mut line = format!(
            "Iter {}/{}: {} error={:.2} | {}",
            self.iteration, self.max_iterations, self.metric, self.error, self.summary
        );
        if self.is_best {
            line.push_str(" BEST!");
        }
        line
    }
}

/// Messages from the optimization worker, in order: one `Started`, zero or
/// more `Trial`s, one `Finished`.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    Started {
        n_params: usize,
        n_images: usize,
        max_iterations: usize,
    },
    Trial(TrialReport),
    Finished(OptimizationStatus),
}

impl ProgressEvent {
    /// Human-readable progress line.
    pub fn message(&self) -> String {
        match self {
            Self::Started {
                n_params, n_images, ..
            } => format!(
                "Starting optimization for {n_params} params across {n_images} images..."
            ),
            Self::Trial(report) => report.progress_line(),
            Self::Finished(status) => status.to_string(),
        }
    }
}
