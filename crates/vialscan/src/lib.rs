//! vialscan: bright-blob counting for vial images, with Bayesian tuning of
//! the detection parameters against operator-labeled counts.
//!
//! The pipeline stages are:
//!
//! 1. **Crop** – cut the region of interest out of the grayscale frame.
//! 2. **Blur** – Gaussian smoothing with an odd kernel.
//! 3. **Threshold** – adaptive percentile threshold, binarize.
//! 4. **Morphology** – elliptical close ×3, then open ×2.
//! 5. **Components** – 8-connected labeling, area window filter.
//!
//! On top of the pipeline:
//! - [`TuningSession`] holds the labeled image set and the parameter set,
//!   and runs a background search over the unlocked parameters.
//! - [`optimize::minimize`] is the Gaussian-process search itself.
//! - [`batch`] is the per-vial batch analysis that consumes a tuned set.

pub mod batch;
pub mod detect;
pub mod image_set;
pub mod optimize;
pub mod params;
pub mod render;
pub mod scoring;
pub mod session;

#[cfg(test)]
pub(crate) mod test_utils;

pub use detect::{detect_blobs, DetectError, DetectParams, DetectedBlob, Detection, Roi};
pub use image_set::{ImageRecord, ImageSet, ImageSetError, DEFAULT_TARGET};
pub use optimize::{CancellationToken, OptimizerConfig, OptimizerFailure};
pub use params::{ParamId, ParameterSet, SnippetError};
pub use scoring::ErrorMetric;
pub use session::{
    OptimizationHandle, OptimizationRejected, OptimizationStatus, ProgressEvent, SessionError,
    TuningSession,
};
