//! Gaussian-process surrogate on the unit hypercube.

use nalgebra::{DMatrix, DVector};

use super::result::OptimizerFailure;

/// Candidate isotropic length scales; the best by marginal likelihood wins.
const LENGTH_SCALES: [f64; 8] = [0.05, 0.1, 0.2, 0.3, 0.5, 0.8, 1.2, 2.0];
/// Diagonal noise, escalated tenfold while the Cholesky factorization fails.
const BASE_NOISE: f64 = 1e-6;
const MAX_NOISE: f64 = 1e-2;

fn matern52(r: f64, l: f64) -> f64 {
    let s = 5f64.sqrt() * r / l;
    (1.0 + s + s * s / 3.0) * (-s).exp()
}

fn distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}

/// Fitted GP with a Matern-5/2 kernel and unit signal variance.
///
/// Observations are normalized to zero mean and unit variance; predictions
/// are reported in those normalized units.
#[derive(Debug, Clone)]
pub(crate) struct GaussianProcess {
    x: Vec<Vec<f64>>,
    l: DMatrix<f64>,
    alpha: DVector<f64>,
    length_scale: f64,
    y_mean: f64,
    y_std: f64,
}

struct Factorized {
    l: DMatrix<f64>,
    alpha: DVector<f64>,
    log_marginal: f64,
}

fn factorize(x: &[Vec<f64>], y: &DVector<f64>, length_scale: f64) -> Option<Factorized> {
    let n = x.len();
    let k = DMatrix::from_fn(n, n, |i, j| matern52(distance(&x[i], &x[j]), length_scale));
    let mut noise = BASE_NOISE;
    while noise <= MAX_NOISE {
        let mut kn = k.clone();
        for i in 0..n {
            kn[(i, i)] += noise;
        }
        if let Some(chol) = kn.cholesky() {
            let alpha = chol.solve(y);
            let l = chol.unpack();
            let log_det_half: f64 = (0..n).map(|i| l[(i, i)].ln()).sum();
            let log_marginal = -0.5 * y.dot(&alpha)
                - log_det_half
                - 0.5 * n as f64 * (2.0 * std::f64::consts::PI).ln();
            return Some(Factorized {
                l,
                alpha,
                log_marginal,
            });
        }
        noise *= 10.0;
    }
    None
}

impl GaussianProcess {
    pub(crate) fn fit(x: &[Vec<f64>], y: &[f64]) -> Result<Self, OptimizerFailure> {
        if x.is_empty() || x.len() != y.len() {
            return Err(OptimizerFailure::Surrogate(format!(
                "need matching non-empty observations, got {} points and {} values",
                x.len(),
                y.len()
            )));
        }
        let n = y.len() as f64;
        let y_mean = y.iter().sum::<f64>() / n;
        let var = y.iter().map(|v| (v - y_mean) * (v - y_mean)).sum::<f64>() / n;
        let y_std = if var.sqrt() > 1e-12 { var.sqrt() } else { 1.0 };
        let yn = DVector::from_iterator(y.len(), y.iter().map(|v| (v - y_mean) / y_std));

        let mut best: Option<(f64, Factorized)> = None;
        for &ls in &LENGTH_SCALES {
            let Some(f) = factorize(x, &yn, ls) else {
                continue;
            };
            if best
                .as_ref()
                .map_or(true, |(_, b)| f.log_marginal > b.log_marginal)
            {
                best = Some((ls, f));
            }
        }
        let (length_scale, f) = best.ok_or_else(|| {
            OptimizerFailure::Surrogate("covariance matrix is not positive definite".to_string())
        })?;
        tracing::trace!(
            "gp fit: n={} length_scale={} log_marginal={:.3}",
            x.len(),
            length_scale,
            f.log_marginal
        );

        Ok(Self {
            x: x.to_vec(),
            l: f.l,
            alpha: f.alpha,
            length_scale,
            y_mean,
            y_std,
        })
    }

    /// Map an observation into the model's normalized units.
    pub(crate) fn normalize(&self, y: f64) -> f64 {
        (y - self.y_mean) / self.y_std
    }

    /// Posterior mean and standard deviation at `q`, normalized units.
    pub(crate) fn predict(&self, q: &[f64]) -> (f64, f64) {
        let k_star = DVector::from_iterator(
            self.x.len(),
            self.x.iter().map(|xi| matern52(distance(xi, q), self.length_scale)),
        );
        let mean = k_star.dot(&self.alpha);
        let var = match self.l.solve_lower_triangular(&k_star) {
            Some(v) => 1.0 - v.dot(&v),
            None => 0.0,
        };
        (mean, var.max(0.0).sqrt())
    }

    #[cfg(test)]
    pub(crate) fn length_scale(&self) -> f64 {
        self.length_scale
    }
}
