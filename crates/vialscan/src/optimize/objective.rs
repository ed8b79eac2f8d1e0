use std::sync::Arc;

use image::GrayImage;

use crate::detect::detect_blobs;
use crate::params::{ParamId, ParameterSet};
use crate::scoring::{count_error, ErrorMetric};

/// One labeled image as seen by the objective.
#[derive(Debug, Clone)]
pub struct ImageSample {
    pub filename: String,
    pub pixels: Arc<GrayImage>,
    pub target: i64,
}

/// Detection count, with pipeline failures scored as zero detections.
pub fn count_or_zero(image: &GrayImage, params: &ParameterSet, filename: &str) -> usize {
    match detect_blobs(image, &params.detect_params()) {
        Ok(det) => det.count(),
        Err(e) => {
            tracing::warn!("{}: detection failed, counting 0: {}", filename, e);
            0
        }
    }
}

/// Outcome of one objective evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub error: f64,
    /// Per-image counts, in image order.
    pub detected: Vec<usize>,
    /// Full parameter set the counts were produced with.
    pub params: ParameterSet,
}

/// Aggregate counting error of a parameter vector over a labeled image set.
///
/// Point coordinates follow `ids`; every other parameter keeps its value
/// from `base`.
#[derive(Debug, Clone)]
pub struct CountingObjective {
    images: Vec<ImageSample>,
    base: ParameterSet,
    ids: Vec<ParamId>,
    metric: ErrorMetric,
}

impl CountingObjective {
    pub fn new(
        images: Vec<ImageSample>,
        base: ParameterSet,
        ids: Vec<ParamId>,
        metric: ErrorMetric,
    ) -> Self {
        Self {
            images,
            base,
            ids,
            metric,
        }
    }

    pub fn ids(&self) -> &[ParamId] {
        &self.ids
    }

    pub fn images(&self) -> &[ImageSample] {
        &self.images
    }

    pub fn metric(&self) -> ErrorMetric {
        self.metric
    }

    /// Full parameter set for a search point. Size parameters are coerced
    /// to odd here, never in the point itself.
    pub fn params_for(&self, x: &[f64]) -> ParameterSet {
        let mut p = self.base.clone();
        for (&id, &v) in self.ids.iter().zip(x) {
            p.set(id, v);
        }
        p
    }

    pub fn evaluate(&self, x: &[f64]) -> Evaluation {
        let params = self.params_for(x);
        let detected: Vec<usize> = self
            .images
            .iter()
            .map(|s| count_or_zero(&s.pixels, &params, &s.filename))
            .collect();
        let errors: Vec<f64> = detected
            .iter()
            .zip(&self.images)
            .map(|(&d, s)| count_error(d, s.target))
            .collect();
        Evaluation {
            error: self.metric.aggregate(&errors),
            detected,
            params,
        }
    }

    /// `name[:15]:detected/target` for the first three images.
    pub fn summary(&self, detected: &[usize]) -> String {
        self.images
            .iter()
            .zip(detected)
            .take(3)
            .map(|(s, d)| {
                let short: String = s.filename.chars().take(15).collect();
                format!("{}:{}/{}", short, d, s.target)
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}
