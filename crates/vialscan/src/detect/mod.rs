//! Droplet detection pipeline.
//!
//! A fixed classical chain, run inside a rectangular region of interest:
//!
//! 1. crop to the ROI,
//! 2. Gaussian blur (`BLUR_SIZE`),
//! 3. percentile threshold (`BRIGHTNESS_PERCENTILE`, `pixel >= t`),
//! 4. close ×3 then open ×2 with an elliptical element (`MORPH_KERNEL_SIZE`),
//! 5. 8-connected components, filtered by `[MIN_BLOB_AREA, MAX_BLOB_AREA]`.
//!
//! The pipeline is deterministic and free of side effects.

mod blur;
mod components;
mod morphology;
mod threshold;

use image::GrayImage;
use serde::{Deserialize, Serialize};

use crate::params::odd_at_least;

pub(crate) use blur::gaussian_blur;

const CLOSE_ITERATIONS: usize = 3;
const OPEN_ITERATIONS: usize = 2;

/// Typed parameter values consumed by the pipeline.
///
/// Built from a [`crate::ParameterSet`] with integer parameters truncated.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectParams {
    pub x_min: i64,
    pub x_max: i64,
    pub y_min: i64,
    pub y_max: i64,
    pub brightness_percentile: f64,
    pub min_blob_area: i64,
    pub max_blob_area: i64,
    pub blur_size: i64,
    pub morph_kernel_size: i64,
}

impl DetectParams {
    /// Validate the ROI against an image of size `width × height`.
    pub fn roi_for(&self, width: u32, height: u32) -> Result<Roi, DetectError> {
        let ok = self.x_min >= 0
            && self.y_min >= 0
            && self.x_min < self.x_max
            && self.y_min < self.y_max
            && self.x_max <= width as i64
            && self.y_max <= height as i64;
        if !ok {
            return Err(DetectError::InvalidRoi {
                x_min: self.x_min,
                x_max: self.x_max,
                y_min: self.y_min,
                y_max: self.y_max,
                width,
                height,
            });
        }
        Ok(Roi {
            x_min: self.x_min as u32,
            y_min: self.y_min as u32,
            x_max: self.x_max as u32,
            y_max: self.y_max as u32,
        })
    }
}

/// Effective (odd, positive) kernel size for a requested size.
pub fn effective_kernel_size(requested: i64) -> usize {
    odd_at_least(requested as f64).max(1) as usize
}

/// Half-open pixel rectangle `[x_min, x_max) × [y_min, y_max)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roi {
    pub x_min: u32,
    pub y_min: u32,
    pub x_max: u32,
    pub y_max: u32,
}

impl Roi {
    pub fn width(&self) -> u32 {
        self.x_max - self.x_min
    }

    pub fn height(&self) -> u32 {
        self.y_max - self.y_min
    }
}

/// One blob surviving the area filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedBlob {
    /// Centroid in full-image pixel coordinates, truncated to integers.
    pub center: [u32; 2],
    /// `floor(sqrt(area / π))`.
    pub radius: u32,
    /// Pixel count of the component.
    pub area: u64,
    /// `4πA / P²` of the outer boundary, when shape measurement was requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub circularity: Option<f64>,
}

/// Result of one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub blobs: Vec<DetectedBlob>,
    /// Binarization threshold computed on the blurred ROI.
    pub threshold: f64,
    pub roi: Roi,
}

impl Detection {
    pub fn count(&self) -> usize {
        self.blobs.len()
    }
}

/// Pipeline failure for one image.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DetectError {
    #[error(
        "invalid ROI x=[{x_min}, {x_max}) y=[{y_min}, {y_max}) for {width}x{height} image"
    )]
    InvalidRoi {
        x_min: i64,
        x_max: i64,
        y_min: i64,
        y_max: i64,
        width: u32,
        height: u32,
    },
    #[error("image has no pixels")]
    EmptyImage,
}

/// Run the pipeline and return the surviving blobs.
pub fn detect_blobs(image: &GrayImage, params: &DetectParams) -> Result<Detection, DetectError> {
    run(image, params, false)
}

/// Like [`detect_blobs`], additionally measuring each blob's circularity.
pub fn detect_blobs_with_shape(
    image: &GrayImage,
    params: &DetectParams,
) -> Result<Detection, DetectError> {
    run(image, params, true)
}

fn run(image: &GrayImage, params: &DetectParams, measure_shape: bool) -> Result<Detection, DetectError> {
    let (w, h) = image.dimensions();
    if w == 0 || h == 0 {
        return Err(DetectError::EmptyImage);
    }
    let blur_k = effective_kernel_size(params.blur_size);
    let morph_k = effective_kernel_size(params.morph_kernel_size);
    let roi = params.roi_for(w, h)?;

    let crop = image::imageops::crop_imm(image, roi.x_min, roi.y_min, roi.width(), roi.height())
        .to_image();
    let blurred = gaussian_blur(&crop, blur_k);
    let threshold = threshold::percentile(&blurred, params.brightness_percentile);
    let binary = threshold::binarize(&blurred, threshold);

    let se = morphology::EllipseElement::new(morph_k);
    let closed = morphology::close(&binary, &se, CLOSE_ITERATIONS);
    let cleaned = morphology::open(&closed, &se, OPEN_ITERATIONS);

    let (labels, comps) = components::label_components(&cleaned);
    let n_components = comps.len();
    let blobs: Vec<DetectedBlob> = comps
        .iter()
        .filter(|c| {
            let a = c.area as i64;
            a >= params.min_blob_area && a <= params.max_blob_area
        })
        .map(|c| DetectedBlob {
            center: [
                c.centroid[0] as u32 + roi.x_min,
                c.centroid[1] as u32 + roi.y_min,
            ],
            radius: (c.area as f64 / std::f64::consts::PI).sqrt() as u32,
            area: c.area,
            circularity: measure_shape.then(|| {
                components::circularity(c.area, components::outer_perimeter(&labels, c))
            }),
        })
        .collect();

    tracing::trace!(
        "detect: roi={}x{} blur={} morph={} threshold={:.2} components={} kept={}",
        roi.width(),
        roi.height(),
        blur_k,
        morph_k,
        threshold,
        n_components,
        blobs.len()
    );

    Ok(Detection {
        blobs,
        threshold,
        roi,
    })
}
