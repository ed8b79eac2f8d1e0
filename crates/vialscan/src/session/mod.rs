//! Tuning session: the loaded images, the parameter set and the state of
//! the background optimization.
//!
//! [`TuningSession`] is a cloneable handle. Front ends call the interactive
//! operations on their own thread; [`TuningSession::start_optimization`]
//! moves the search onto a worker thread and hands back an
//! [`OptimizationHandle`] for progress and cancellation. While a run is
//! active the parameter set, targets and image set are read-only and
//! mutations fail with [`SessionError::Busy`].

mod progress;
mod worker;

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use image::RgbImage;
use parking_lot::Mutex;

use crate::detect::{detect_blobs, DetectError, Detection};
use crate::image_set::{ImageSet, ImageSetError};
use crate::optimize::{
    count_or_zero, CountingObjective, ImageSample, OptimizerConfig, SearchSpace,
};
use crate::params::{ParamId, ParameterSet};
use crate::render::render_detection;
use crate::scoring::count_error;

pub use progress::{OptimizationStatus, ProgressEvent, TrialReport};
pub use worker::OptimizationHandle;

/// Why an optimization run could not start. No worker is spawned.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OptimizationRejected {
    #[error("no images loaded")]
    NoImages,
    #[error("an optimization is already running")]
    AlreadyRunning,
    #[error("target count of {filename} is negative ({target})")]
    NegativeTarget { filename: String, target: i64 },
    #[error("all parameters are locked")]
    NoUnlockedParameters,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session is read-only while an optimization is running")]
    Busy,
    #[error("no images loaded")]
    NoImages,
    #[error(transparent)]
    ImageSet(#[from] ImageSetError),
    #[error(transparent)]
    Detect(#[from] DetectError),
}

/// Result of processing the current image interactively.
#[derive(Debug, Clone)]
pub struct CurrentResult {
    pub index: usize,
    pub filename: String,
    pub detected: usize,
    pub target: i64,
    pub error: f64,
    pub detection: Detection,
    pub overlay: Arc<RgbImage>,
}

/// One row of a process-all run.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageOutcome {
    pub filename: String,
    pub detected: usize,
    pub target: i64,
    pub error: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProcessAllReport {
    pub rows: Vec<ImageOutcome>,
    pub average_error: f64,
}

#[derive(Debug)]
struct SessionState {
    images: ImageSet,
    params: ParameterSet,
    auto_update: bool,
    optimizer: OptimizerConfig,
    status: OptimizationStatus,
    last_overlay: Option<Arc<RgbImage>>,
    progress: String,
}

#[derive(Debug)]
struct Shared {
    state: Mutex<SessionState>,
    optimizing: AtomicBool,
}

/// Shared handle to one tuning session.
#[derive(Debug, Clone)]
pub struct TuningSession {
    shared: Arc<Shared>,
}

impl Default for TuningSession {
    fn default() -> Self {
        Self::new()
    }
}

impl TuningSession {
    /// Empty session with default parameters, all locked.
    pub fn new() -> Self {
        Self::with_images(ImageSet::default())
    }

    pub fn with_images(images: ImageSet) -> Self {
        let state = SessionState {
            images,
            params: ParameterSet::defaults(),
            auto_update: false,
            optimizer: OptimizerConfig::default(),
            status: OptimizationStatus::Idle,
            last_overlay: None,
            progress: String::new(),
        };
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(state),
                optimizing: AtomicBool::new(false),
            }),
        }
    }

    pub fn is_optimizing(&self) -> bool {
        self.shared.optimizing.load(Ordering::SeqCst)
    }

    /// Lock the state for a mutation. Fails while a run is active.
    fn lock_idle(&self) -> Result<parking_lot::MutexGuard<'_, SessionState>, SessionError> {
        let guard = self.shared.state.lock();
        if self.is_optimizing() {
            return Err(SessionError::Busy);
        }
        Ok(guard)
    }

    // --- images ---

    /// Replace the image set with every readable image in `dir`.
    pub fn load_images(&self, dir: &Path, default_target: i64) -> Result<usize, SessionError> {
        let mut state = self.lock_idle()?;
        let images = ImageSet::load_dir(dir, default_target)?;
        let n = images.len();
        state.images = images;
        state.last_overlay = None;
        Ok(n)
    }

    pub fn set_images(&self, images: ImageSet) -> Result<(), SessionError> {
        let mut state = self.lock_idle()?;
        state.images = images;
        state.last_overlay = None;
        Ok(())
    }

    /// Snapshot of the image set, including the latest detected counts.
    pub fn images(&self) -> ImageSet {
        self.shared.state.lock().images.clone()
    }

    pub fn image_count(&self) -> usize {
        self.shared.state.lock().images.len()
    }

    pub fn set_target(&self, index: usize, target: i64) -> Result<(), SessionError> {
        self.lock_idle()?.images.set_target(index, target)?;
        Ok(())
    }

    /// Returns `false` when no image has that file name.
    pub fn set_target_by_name(&self, filename: &str, target: i64) -> Result<bool, SessionError> {
        Ok(self.lock_idle()?.images.set_target_by_name(filename, target))
    }

    pub fn set_all_targets(&self, target: i64) -> Result<(), SessionError> {
        self.lock_idle()?.images.set_all_targets(target);
        Ok(())
    }

    // Navigation only moves the cursor, so it stays available during a run.

    pub fn current_index(&self) -> usize {
        self.shared.state.lock().images.current_index()
    }

    pub fn select(&self, index: usize) -> Result<(), SessionError> {
        self.shared.state.lock().images.select(index)?;
        Ok(())
    }

    pub fn next_image(&self) -> usize {
        self.shared.state.lock().images.next()
    }

    pub fn prev_image(&self) -> usize {
        self.shared.state.lock().images.prev()
    }

    // --- parameters ---

    pub fn params(&self) -> ParameterSet {
        self.shared.state.lock().params.clone()
    }

    /// Set one parameter and return the stored (possibly coerced) value.
    ///
    /// With auto-update on, the current image is re-processed; a failure
    /// there is logged and does not undo the change.
    pub fn set_param(&self, id: ParamId, value: f64) -> Result<f64, SessionError> {
        let mut state = self.lock_idle()?;
        let stored = state.params.set(id, value);
        if state.auto_update && !state.images.is_empty() {
            if let Err(e) = process_current_locked(&mut state) {
                tracing::warn!("auto-update after {} change failed: {}", id, e);
            }
        }
        Ok(stored)
    }

    /// Replace the whole parameter set, locks included.
    pub fn set_params(&self, params: ParameterSet) -> Result<(), SessionError> {
        self.lock_idle()?.params = params;
        Ok(())
    }

    pub fn set_locked(&self, id: ParamId, locked: bool) -> Result<(), SessionError> {
        self.lock_idle()?.params.set_locked(id, locked);
        Ok(())
    }

    pub fn unlock_only(&self, ids: &[ParamId]) -> Result<(), SessionError> {
        self.lock_idle()?.params.unlock_only(ids);
        Ok(())
    }

    pub fn reset_params(&self) -> Result<(), SessionError> {
        self.lock_idle()?.params.reset_to_defaults();
        Ok(())
    }

    pub fn export_snippet(&self) -> String {
        self.shared.state.lock().params.to_snippet()
    }

    // --- settings ---

    pub fn auto_update(&self) -> bool {
        self.shared.state.lock().auto_update
    }

    pub fn set_auto_update(&self, enabled: bool) {
        self.shared.state.lock().auto_update = enabled;
    }

    pub fn optimizer_config(&self) -> OptimizerConfig {
        self.shared.state.lock().optimizer.clone()
    }

    pub fn set_optimizer_config(&self, config: OptimizerConfig) -> Result<(), SessionError> {
        self.lock_idle()?.optimizer = config;
        Ok(())
    }

    // --- processing ---

    /// Run detection with visualization on the current image.
    ///
    /// Pipeline errors such as an ROI outside the image are returned.
    pub fn process_current(&self) -> Result<CurrentResult, SessionError> {
        let mut state = self.lock_idle()?;
        process_current_locked(&mut state)
    }

    /// Count every image, then render the current one.
    ///
    /// Per-image failures count as 0 and are logged.
    pub fn process_all(&self) -> Result<ProcessAllReport, SessionError> {
        let mut state = self.lock_idle()?;
        if state.images.is_empty() {
            return Err(SessionError::NoImages);
        }
        Ok(process_all_locked(&mut state))
    }

    /// Overlay from the most recent current-image render.
    pub fn last_overlay(&self) -> Option<Arc<RgbImage>> {
        self.shared.state.lock().last_overlay.clone()
    }

    // --- optimization ---

    pub fn status(&self) -> OptimizationStatus {
        self.shared.state.lock().status.clone()
    }

    /// Latest progress line published by the worker.
    pub fn progress_text(&self) -> String {
        self.shared.state.lock().progress.clone()
    }

    /// Check preconditions, claim the session and spawn the search worker.
    ///
    /// The worker searches the unlocked parameters over a snapshot of the
    /// images and targets. On normal completion the best vector is applied
    /// and every image is re-processed; cancellation leaves the parameters
    /// as they were.
    pub fn start_optimization(&self) -> Result<OptimizationHandle, OptimizationRejected> {
        let state = self.shared.state.lock();
        if state.images.is_empty() {
            return Err(OptimizationRejected::NoImages);
        }
        if self.is_optimizing() {
            return Err(OptimizationRejected::AlreadyRunning);
        }
        if let Some(r) = state.images.first_negative_target() {
            return Err(OptimizationRejected::NegativeTarget {
                filename: r.filename.clone(),
                target: r.target,
            });
        }
        let ids = state.params.unlocked();
        if ids.is_empty() {
            return Err(OptimizationRejected::NoUnlockedParameters);
        }
        if self
            .shared
            .optimizing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(OptimizationRejected::AlreadyRunning);
        }

        let samples: Vec<ImageSample> = state
            .images
            .records()
            .iter()
            .map(|r| ImageSample {
                filename: r.filename.clone(),
                pixels: r.shared_pixels(),
                target: r.target,
            })
            .collect();
        let config = state.optimizer.clone();
        let space = SearchSpace::for_params(&ids);
        let objective = CountingObjective::new(samples, state.params.clone(), ids, config.metric);
        drop(state);

        Ok(worker::spawn(self.clone(), objective, space, config))
    }

    fn publish_status(&self, status: OptimizationStatus, line: Option<String>) {
        let mut state = self.shared.state.lock();
        state.status = status;
        if let Some(line) = line {
            state.progress = line;
        }
    }
}

fn process_current_locked(state: &mut SessionState) -> Result<CurrentResult, SessionError> {
    let index = state.images.current_index();
    let record = state.images.current().ok_or(SessionError::NoImages)?;
    let detection = match detect_blobs(record.pixels(), &state.params.detect_params()) {
        Ok(d) => d,
        Err(e) => {
            state.last_overlay = None;
            return Err(e.into());
        }
    };
    let overlay = Arc::new(render_detection(record.pixels(), &detection));
    let detected = detection.count();
    let result = CurrentResult {
        index,
        filename: record.filename.clone(),
        detected,
        target: record.target,
        error: count_error(detected, record.target),
        detection,
        overlay: Arc::clone(&overlay),
    };
    state.images.record_detection(index, detected);
    state.last_overlay = Some(overlay);
    state.progress = format!(
        "{}: Detected {}, Target {}, Error {}",
        result.filename, result.detected, result.target, result.error
    );
    Ok(result)
}

fn process_all_locked(state: &mut SessionState) -> ProcessAllReport {
    let params = state.params.clone();
    let rows: Vec<ImageOutcome> = state
        .images
        .records()
        .iter()
        .map(|r| {
            let detected = count_or_zero(r.pixels(), &params, &r.filename);
            ImageOutcome {
                filename: r.filename.clone(),
                detected,
                target: r.target,
                error: count_error(detected, r.target),
            }
        })
        .collect();
    for (i, row) in rows.iter().enumerate() {
        state.images.record_detection(i, row.detected);
    }
    let average_error = if rows.is_empty() {
        0.0
    } else {
        rows.iter().map(|r| r.error).sum::<f64>() / rows.len() as f64
    };
    tracing::info!(
        "processed {} images, average error {:.2}",
        rows.len(),
        average_error
    );
    if let Err(e) = process_current_locked(state) {
        tracing::warn!("rendering current image failed: {}", e);
    }
    ProcessAllReport {
        rows,
        average_error,
    }
}

#[cfg(test)]
mod tests;
