use rand::rngs::StdRng;
use rand::SeedableRng;

use super::acquisition::expected_improvement;
use super::cancel::CancellationToken;
use super::config::OptimizerConfig;
use super::gp::GaussianProcess;
use super::result::{OptimizationResult, OptimizerFailure, Trial};
use super::space::SearchSpace;

/// Sequential model-based minimization of `objective` over `space`.
///
/// The first `min(n_initial_points, max_iterations)` points are uniform
/// random samples; after that each point maximizes expected improvement
/// under a GP fitted to every observation so far. `cancel` is polled before
/// each evaluation. `on_trial` sees every completed evaluation in order.
pub fn minimize<F, P>(
    space: &SearchSpace,
    config: &OptimizerConfig,
    cancel: &CancellationToken,
    mut objective: F,
    mut on_trial: P,
) -> Result<OptimizationResult, OptimizerFailure>
where
    F: FnMut(&[f64]) -> f64,
    P: FnMut(&Trial),
{
    if config.max_iterations == 0 {
        return Err(OptimizerFailure::ZeroBudget);
    }
    space.validate()?;

    let mut rng = StdRng::seed_from_u64(config.seed);
    let n_initial = config.initial_points();
    let mut xs_unit: Vec<Vec<f64>> = Vec::with_capacity(config.max_iterations);
    let mut ys: Vec<f64> = Vec::with_capacity(config.max_iterations);
    let mut trials: Vec<Trial> = Vec::with_capacity(config.max_iterations);
    let mut best_value = f64::INFINITY;
    let mut best_x: Option<Vec<f64>> = None;

    for i in 0..config.max_iterations {
        if cancel.is_cancelled() {
            tracing::info!("search cancelled after {} evaluations", trials.len());
            break;
        }
        let x = if i < n_initial {
            space.sample(&mut rng)
        } else {
            propose(space, config, &xs_unit, &ys, best_value, &mut rng)?
        };

        let value = objective(&x);
        if !value.is_finite() {
            return Err(OptimizerFailure::NonFiniteObjective {
                iteration: i + 1,
                value,
            });
        }
        let is_best = value < best_value;
        if is_best {
            best_value = value;
            best_x = Some(x.clone());
        }
        xs_unit.push(space.to_unit(&x));
        ys.push(value);

        let trial = Trial {
            iteration: i + 1,
            x,
            value,
            is_best,
            best_so_far: best_value,
        };
        on_trial(&trial);
        trials.push(trial);
    }

    Ok(OptimizationResult {
        best_x,
        best_value,
        trials,
        stopped: cancel.is_cancelled(),
    })
}

fn propose(
    space: &SearchSpace,
    config: &OptimizerConfig,
    xs_unit: &[Vec<f64>],
    ys: &[f64],
    best_value: f64,
    rng: &mut StdRng,
) -> Result<Vec<f64>, OptimizerFailure> {
    let gp = GaussianProcess::fit(xs_unit, ys)?;
    let incumbent = gp.normalize(best_value);

    let mut best: Option<(f64, Vec<f64>)> = None;
    for _ in 0..config.n_candidates.max(1) {
        let c = space.sample(rng);
        let (mean, std) = gp.predict(&space.to_unit(&c));
        let ei = expected_improvement(mean, std, incumbent, config.xi);
        if best.as_ref().map_or(true, |(b, _)| ei > *b) {
            best = Some((ei, c));
        }
    }
    best.map(|(_, c)| c)
        .ok_or_else(|| OptimizerFailure::Surrogate("no candidate proposed".to_string()))
}
