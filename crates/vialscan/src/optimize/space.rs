use rand::Rng;
use serde::{Deserialize, Serialize};

use super::result::OptimizerFailure;
use crate::params::{ParamId, ParamKind};

/// One search dimension with inclusive integer or half-open real bounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dimension {
    pub name: String,
    pub kind: ParamKind,
    pub low: f64,
    pub high: f64,
}

impl Dimension {
    pub fn integer(name: impl Into<String>, low: i64, high: i64) -> Self {
        Self {
            name: name.into(),
            kind: ParamKind::Integer,
            low: low as f64,
            high: high as f64,
        }
    }

    pub fn real(name: impl Into<String>, low: f64, high: f64) -> Self {
        Self {
            name: name.into(),
            kind: ParamKind::Real,
            low,
            high,
        }
    }

    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        match self.kind {
            ParamKind::Integer => rng.gen_range(self.low as i64..=self.high as i64) as f64,
            ParamKind::Real => rng.gen_range(self.low..self.high),
        }
    }

    fn to_unit(&self, v: f64) -> f64 {
        (v - self.low) / (self.high - self.low)
    }
}

/// Ordered product of dimensions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchSpace {
    pub dims: Vec<Dimension>,
}

impl SearchSpace {
    pub fn new(dims: Vec<Dimension>) -> Self {
        Self { dims }
    }

    /// Space over the given parameters, using their table bounds.
    pub fn for_params(ids: &[ParamId]) -> Self {
        let dims = ids
            .iter()
            .map(|id| {
                let d = id.definition();
                match d.kind {
                    ParamKind::Integer => Dimension::integer(d.name, d.min as i64, d.max as i64),
                    ParamKind::Real => Dimension::real(d.name, d.min, d.max),
                }
            })
            .collect();
        Self { dims }
    }

    pub fn len(&self) -> usize {
        self.dims.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dims.is_empty()
    }

    pub fn validate(&self) -> Result<(), OptimizerFailure> {
        if self.dims.is_empty() {
            return Err(OptimizerFailure::EmptySpace);
        }
        for d in &self.dims {
            let ok = d.low.is_finite() && d.high.is_finite() && d.low < d.high;
            let integral =
                d.kind == ParamKind::Real || (d.low.fract() == 0.0 && d.high.fract() == 0.0);
            if !ok || !integral {
                return Err(OptimizerFailure::MalformedSpace {
                    name: d.name.clone(),
                    low: d.low,
                    high: d.high,
                });
            }
        }
        Ok(())
    }

    /// Uniform random point; integer dimensions get integer values.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<f64> {
        self.dims.iter().map(|d| d.sample(rng)).collect()
    }

    /// Map a point into the unit hypercube.
    pub fn to_unit(&self, x: &[f64]) -> Vec<f64> {
        self.dims
            .iter()
            .zip(x)
            .map(|(d, &v)| d.to_unit(v))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn integer_dimensions_sample_integers_within_bounds() {
        let space = SearchSpace::new(vec![
            Dimension::integer("BLUR_SIZE", 3, 51),
            Dimension::real("BRIGHTNESS_PERCENTILE", 80.0, 99.9),
        ]);
        let mut rng = StdRng::seed_from_u64(42);
        let mut saw_high = false;
        for _ in 0..2000 {
            let x = space.sample(&mut rng);
            assert_eq!(x[0].fract(), 0.0);
            assert!((3.0..=51.0).contains(&x[0]));
            saw_high |= x[0] == 51.0;
            assert!((80.0..99.9).contains(&x[1]));
        }
        assert!(saw_high, "inclusive upper bound never sampled");
    }

    #[test]
    fn parameter_space_uses_table_bounds_and_kinds() {
        let space =
            SearchSpace::for_params(&[ParamId::BrightnessPercentile, ParamId::MinBlobArea]);
        assert_eq!(space.dims[0].kind, ParamKind::Real);
        assert_eq!(space.dims[0].low, 80.0);
        assert_eq!(space.dims[1].kind, ParamKind::Integer);
        assert_eq!(space.dims[1].high, 500000.0);
        assert!(space.validate().is_ok());
        assert_eq!(space.to_unit(&[80.0, 500000.0]), vec![0.0, 1.0]);
    }

    #[test]
    fn malformed_dimensions_are_rejected() {
        let empty = SearchSpace::new(Vec::new());
        assert_eq!(empty.validate(), Err(OptimizerFailure::EmptySpace));

        let flat = SearchSpace::new(vec![Dimension::integer("X_MIN", 5, 5)]);
        assert!(matches!(
            flat.validate(),
            Err(OptimizerFailure::MalformedSpace { .. })
        ));

        let inverted = SearchSpace::new(vec![Dimension::real("P", 2.0, 1.0)]);
        assert!(matches!(
            inverted.validate(),
            Err(OptimizerFailure::MalformedSpace { .. })
        ));
    }
}
