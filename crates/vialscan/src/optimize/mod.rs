//! Bayesian search over the unlocked detection parameters.
//!
//! A Gaussian-process surrogate with expected-improvement acquisition,
//! preceded by a short random initial design. Integer parameters are
//! searched on integer dimensions; the model sees raw sampled values and
//! odd coercion is applied only when the objective builds its parameters.

mod acquisition;
mod bayes;
mod cancel;
mod config;
mod gp;
mod objective;
mod result;
mod space;

pub use bayes::minimize;
pub use cancel::CancellationToken;
pub use config::OptimizerConfig;
pub use objective::{count_or_zero, CountingObjective, Evaluation, ImageSample};
pub use result::{OptimizationResult, OptimizerFailure, Trial};
pub use space::{Dimension, SearchSpace};
