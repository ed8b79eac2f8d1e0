//! Vial batch analysis.
//!
//! Runs the tuned pipeline over every frame of one vial, merges detections
//! of the same droplet across frames and writes marked frames, a summary
//! image and one JSON log line into an output directory.

mod cluster;
mod log;

use std::cmp::Ordering;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;
use image::GrayImage;
use serde::{Deserialize, Serialize};

use crate::detect::{detect_blobs_with_shape, DetectParams, Detection};
use crate::image_set::has_image_extension;
use crate::render::{render_frame, render_summary, Marker};

pub use cluster::{cluster_detections, DropletCluster, FrameBlob, DEFAULT_CLUSTER_DISTANCE};
pub use log::{append_record, DropletDetail, LogRecord, LOG_FILE_NAME};

const FRAME_EXTENSIONS: [&str; 2] = ["jpg", "jpeg"];

#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    #[error("failed to read directory {path}: {source}")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("no JPEG frames in {0}")]
    NoFrames(PathBuf),
    #[error("none of the {0} frames could be read")]
    NoReadableFrames(usize),
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write {path}: {source}")]
    Save {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("failed to encode log record: {0}")]
    Json(#[from] serde_json::Error),
}

/// Batch analysis settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Prefix of every output file and `vial_id` of the log record.
    pub vial_label: String,
    /// Center distance below which detections merge (pixels).
    pub cluster_distance: f64,
    /// Remove the input frames after a successful run.
    pub delete_inputs: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            vial_label: "Unknown".to_string(),
            cluster_distance: DEFAULT_CLUSTER_DISTANCE,
            delete_inputs: false,
        }
    }
}

/// One loaded frame.
#[derive(Debug, Clone)]
pub struct Frame {
    pub filename: String,
    pub pixels: GrayImage,
}

/// Per-frame pipeline outcome. `None` when detection failed for the frame.
#[derive(Debug, Clone)]
pub struct FrameOutcome {
    pub filename: String,
    pub detection: Option<Detection>,
}

impl FrameOutcome {
    pub fn count(&self) -> usize {
        self.detection.as_ref().map_or(0, Detection::count)
    }
}

#[derive(Debug, Clone)]
pub struct VialAnalysis {
    pub frames: Vec<FrameOutcome>,
    pub clusters: Vec<DropletCluster>,
    /// Detections over all frames, before clustering.
    pub total_detections: usize,
}

/// Files written by [`run_batch`] and the logged record.
#[derive(Debug, Clone)]
pub struct BatchReport {
    pub analysis: VialAnalysis,
    pub record: LogRecord,
    pub summary_path: PathBuf,
    pub frame_paths: Vec<PathBuf>,
    pub log_path: PathBuf,
    pub deleted: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum NameChunk {
    Text(String),
    Number(u64),
}

/// Sort key splitting digit runs out as numbers, so `f2` sorts before `f10`.
fn natural_key(name: &str) -> Vec<NameChunk> {
    let mut chunks = Vec::new();
    let mut text = String::new();
    let mut digits = String::new();
    for ch in name.chars() {
        if ch.is_ascii_digit() {
            if !text.is_empty() || chunks.is_empty() {
                chunks.push(NameChunk::Text(std::mem::take(&mut text)));
            }
            digits.push(ch);
        } else {
            if !digits.is_empty() {
                chunks.push(NameChunk::Number(digits.parse().unwrap_or(u64::MAX)));
                digits.clear();
            }
            text.extend(ch.to_lowercase());
        }
    }
    if !digits.is_empty() {
        chunks.push(NameChunk::Number(digits.parse().unwrap_or(u64::MAX)));
    }
    chunks.push(NameChunk::Text(text));
    chunks
}

fn natural_cmp(a: &Path, b: &Path) -> Ordering {
    let name = |p: &Path| {
        p.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    };
    natural_key(&name(a)).cmp(&natural_key(&name(b)))
}

/// JPEG files (any case) in `dir`, naturally sorted by file name.
pub fn list_frames(dir: &Path) -> Result<Vec<PathBuf>, BatchError> {
    let entries = fs::read_dir(dir).map_err(|source| BatchError::ReadDir {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut paths: Vec<PathBuf> = entries
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && has_image_extension(p, &FRAME_EXTENSIONS))
        .collect();
    paths.sort_by(|a, b| natural_cmp(a, b));
    Ok(paths)
}

/// Detect in every frame and cluster the detections.
///
/// A frame whose detection fails contributes no blobs; the failure is
/// logged.
pub fn analyze_frames(frames: &[Frame], params: &DetectParams, cluster_distance: f64) -> VialAnalysis {
    let n = frames.len();
    let mut outcomes = Vec::with_capacity(n);
    let mut all = Vec::new();
    for (i, frame) in frames.iter().enumerate() {
        let detection = match detect_blobs_with_shape(&frame.pixels, params) {
            Ok(det) => {
                tracing::debug!(
                    "frame {}/{} {}: {} droplets",
                    i + 1,
                    n,
                    frame.filename,
                    det.count()
                );
                all.extend(det.blobs.iter().map(|b| FrameBlob {
                    frame: i,
                    blob: b.clone(),
                }));
                Some(det)
            }
            Err(e) => {
                tracing::warn!(
                    "frame {}/{} {}: detection failed, counting 0: {}",
                    i + 1,
                    n,
                    frame.filename,
                    e
                );
                None
            }
        };
        outcomes.push(FrameOutcome {
            filename: frame.filename.clone(),
            detection,
        });
    }
    let clusters = cluster_detections(&all, cluster_distance);
    tracing::info!(
        "{} detections across {} frames clustered into {} droplets",
        all.len(),
        n,
        clusters.len()
    );
    VialAnalysis {
        frames: outcomes,
        clusters,
        total_detections: all.len(),
    }
}

fn load_frames(paths: &[PathBuf]) -> Vec<Frame> {
    paths
        .iter()
        .filter_map(|p| match image::open(p) {
            Ok(img) => Some(Frame {
                filename: p
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                pixels: img.to_luma8(),
            }),
            Err(e) => {
                tracing::warn!("skipping {}: {}", p.display(), e);
                None
            }
        })
        .collect()
}

fn save_rgb(img: &image::RgbImage, path: PathBuf) -> Result<PathBuf, BatchError> {
    match img.save(&path) {
        Ok(()) => Ok(path),
        Err(source) => Err(BatchError::Save { path, source }),
    }
}

/// Analyze every frame in `input_dir` and write the results to `output_dir`.
///
/// Writes `<label>_Frame<NN>.jpg` per analyzed frame, one
/// `<label>_RESULT_<timestamp>.jpg` drawn on the last frame, and appends a
/// record to [`LOG_FILE_NAME`]. Frames whose detection failed get no marked
/// image.
pub fn run_batch(
    input_dir: &Path,
    output_dir: &Path,
    params: &DetectParams,
    config: &BatchConfig,
) -> Result<BatchReport, BatchError> {
    let paths = list_frames(input_dir)?;
    if paths.is_empty() {
        return Err(BatchError::NoFrames(input_dir.to_path_buf()));
    }
    let frames = load_frames(&paths);
    let Some(last) = frames.last() else {
        return Err(BatchError::NoReadableFrames(paths.len()));
    };
    tracing::info!(
        "analyzing vial {} with {} of {} frames",
        config.vial_label,
        frames.len(),
        paths.len()
    );
    fs::create_dir_all(output_dir).map_err(|source| BatchError::Io {
        path: output_dir.to_path_buf(),
        source,
    })?;

    let analysis = analyze_frames(&frames, params, config.cluster_distance);
    let label = &config.vial_label;
    let now = Local::now();

    let markers: Vec<Marker> = analysis
        .clusters
        .iter()
        .enumerate()
        .map(|(i, c)| Marker {
            center: c.center,
            radius: c.radius,
            label: format!("#{}: {}PX", i + 1, c.area as u64),
        })
        .collect();
    let summary_roi = analysis
        .frames
        .iter()
        .rev()
        .find_map(|f| f.detection.as_ref().map(|d| d.roi));
    let summary_name = format!("{}_RESULT_{}.jpg", label, now.format("%Y%m%d_%H%M%S"));
    let summary = render_summary(&last.pixels, summary_roi.as_ref(), &markers);
    let summary_path = save_rgb(&summary, output_dir.join(&summary_name))?;

    let mut frame_paths = Vec::new();
    for (i, (frame, outcome)) in frames.iter().zip(&analysis.frames).enumerate() {
        let Some(det) = &outcome.detection else {
            continue;
        };
        let marked = render_frame(&frame.pixels, det, i + 1);
        let name = format!("{}_Frame{:02}.jpg", label, i + 1);
        frame_paths.push(save_rgb(&marked, output_dir.join(name))?);
    }

    let record = LogRecord::new(
        &now,
        label,
        paths.len(),
        analysis.total_detections,
        &summary_name,
        &analysis.clusters,
    );
    let log_path = append_record(output_dir, &record)?;

    let mut deleted = 0;
    if config.delete_inputs {
        for p in &paths {
            match fs::remove_file(p) {
                Ok(()) => deleted += 1,
                Err(e) => tracing::warn!("could not delete {}: {}", p.display(), e),
            }
        }
    }

    tracing::info!(
        "vial {}: {} ({} droplets, {} detections)",
        label,
        record.result,
        record.droplets_detected,
        record.total_detections
    );
    Ok(BatchReport {
        analysis,
        record,
        summary_path,
        frame_paths,
        log_path,
        deleted,
    })
}

#[cfg(test)]
mod tests;
