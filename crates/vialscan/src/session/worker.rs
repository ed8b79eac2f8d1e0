use std::cell::RefCell;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::Ordering;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};

use super::progress::{OptimizationStatus, ProgressEvent, TrialReport};
use super::{process_all_locked, TuningSession};
use crate::optimize::{
    minimize, CancellationToken, CountingObjective, Evaluation, OptimizerConfig,
    OptimizerFailure, SearchSpace,
};

/// Owner-side view of a running optimization.
///
/// Dropping the handle detaches the worker; the session still receives the
/// final status.
#[derive(Debug)]
pub struct OptimizationHandle {
    cancel: CancellationToken,
    events: Receiver<ProgressEvent>,
    thread: JoinHandle<OptimizationStatus>,
}

impl OptimizationHandle {
    /// Request a stop. Honoured before the next evaluation starts.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Progress stream. Ends with exactly one [`ProgressEvent::Finished`].
    pub fn events(&self) -> &Receiver<ProgressEvent> {
        &self.events
    }

    /// Next pending event, without blocking.
    pub fn try_next(&self) -> Option<ProgressEvent> {
        self.events.try_recv().ok()
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Wait for the worker and return the terminal status.
    pub fn join(self) -> OptimizationStatus {
        self.thread.join().unwrap_or_else(|_| {
            OptimizationStatus::Failed(OptimizerFailure::WorkerPanicked.to_string())
        })
    }
}

pub(super) fn spawn(
    session: TuningSession,
    objective: CountingObjective,
    space: SearchSpace,
    config: OptimizerConfig,
) -> OptimizationHandle {
    let cancel = CancellationToken::new();
    let (tx, events) = mpsc::channel();
    let token = cancel.clone();
    let thread = thread::spawn(move || run(&session, &objective, &space, &config, &token, &tx));
    OptimizationHandle {
        cancel,
        events,
        thread,
    }
}

fn run(
    session: &TuningSession,
    objective: &CountingObjective,
    space: &SearchSpace,
    config: &OptimizerConfig,
    cancel: &CancellationToken,
    tx: &Sender<ProgressEvent>,
) -> OptimizationStatus {
    let started = ProgressEvent::Started {
        n_params: objective.ids().len(),
        n_images: objective.images().len(),
        max_iterations: config.max_iterations,
    };
    tracing::info!("{}", started.message());
    session.publish_status(
        OptimizationStatus::Running {
            iteration: 0,
            max_iterations: config.max_iterations,
            best_error: None,
        },
        Some(started.message()),
    );
    // A dropped receiver only means nobody is listening.
    let _ = tx.send(started);

    let outcome = catch_unwind(AssertUnwindSafe(|| {
        search_and_apply(session, objective, space, config, cancel, tx)
    }));
    let status = match outcome {
        Ok(Ok(status)) => status,
        Ok(Err(failure)) => OptimizationStatus::Failed(failure.to_string()),
        Err(_) => OptimizationStatus::Failed(OptimizerFailure::WorkerPanicked.to_string()),
    };
    match &status {
        OptimizationStatus::Failed(_) => tracing::warn!("{}", status),
        _ => tracing::info!("{}", status),
    }

    {
        let mut state = session.shared.state.lock();
        state.status = status.clone();
        state.progress = status.to_string();
        session.shared.optimizing.store(false, Ordering::SeqCst);
    }
    let _ = tx.send(ProgressEvent::Finished(status.clone()));
    status
}

fn search_and_apply(
    session: &TuningSession,
    objective: &CountingObjective,
    space: &SearchSpace,
    config: &OptimizerConfig,
    cancel: &CancellationToken,
    tx: &Sender<ProgressEvent>,
) -> Result<OptimizationStatus, OptimizerFailure> {
    let latest: RefCell<Option<Evaluation>> = RefCell::new(None);

    let result = minimize(
        space,
        config,
        cancel,
        |x| {
            let eval = objective.evaluate(x);
            let error = eval.error;
            *latest.borrow_mut() = Some(eval);
            error
        },
        |trial| {
            let guard = latest.borrow();
            let Some(eval) = guard.as_ref() else {
                return;
            };
            let report = TrialReport {
                iteration: trial.iteration,
                max_iterations: config.max_iterations,
                metric: objective.metric(),
                error: trial.value,
                is_best: trial.is_best,
                best_error: trial.best_so_far,
                values: objective
                    .ids()
                    .iter()
                    .map(|&id| (id, eval.params.get(id)))
                    .collect(),
                summary: objective.summary(&eval.detected),
            };
            let line = report.progress_line();
            tracing::debug!("{}", line);
            session.publish_status(
                OptimizationStatus::Running {
                    iteration: trial.iteration,
                    max_iterations: config.max_iterations,
                    best_error: Some(trial.best_so_far),
                },
                Some(line),
            );
            let _ = tx.send(ProgressEvent::Trial(report));
        },
    )?;

    if result.stopped || cancel.is_cancelled() {
        return Ok(OptimizationStatus::StoppedByUser);
    }
    let Some(best_x) = result.best_x.as_deref() else {
        return Err(OptimizerFailure::ZeroBudget);
    };

    // Locks cannot change during the run, so the objective's base still
    // carries the session's lock flags.
    let best = objective.params_for(best_x);
    let mut state = session.shared.state.lock();
    state.params = best;
    process_all_locked(&mut state);

    Ok(OptimizationStatus::Completed {
        best_error: result.best_value,
        iterations: result.iterations(),
        metric: objective.metric(),
    })
}
