use image::GrayImage;

use super::*;
use crate::image_set::{ImageRecord, ImageSet};
use crate::optimize::OptimizerConfig;
use crate::params::{ParamId, ParameterSet};
use crate::test_utils::{draw_disc_image, small_image_params};

fn two_disc_image() -> GrayImage {
    draw_disc_image(
        200,
        200,
        &[([60.0, 60.0], 22.0), ([140.0, 140.0], 22.0)],
        220,
        20,
    )
}

fn one_disc_image() -> GrayImage {
    draw_disc_image(200, 200, &[([100.0, 100.0], 25.0)], 220, 20)
}

/// Two labeled images whose counts are exact under `small_image_params`.
fn labeled_session() -> TuningSession {
    let images = ImageSet::new(vec![
        ImageRecord::new("two.png", two_disc_image(), 2),
        ImageRecord::new("one.png", one_disc_image(), 1),
    ]);
    let session = TuningSession::with_images(images);
    session
        .set_params(small_image_params(200, 200))
        .expect("idle session");
    session
}

fn quick_config(max_iterations: usize) -> OptimizerConfig {
    OptimizerConfig {
        max_iterations,
        n_initial_points: 3,
        n_candidates: 200,
        ..OptimizerConfig::default()
    }
}

#[test]
fn process_current_reports_count_and_overlay() {
    let session = labeled_session();
    let res = session.process_current().expect("processes");
    assert_eq!(res.filename, "two.png");
    assert_eq!(res.detected, 2);
    assert_eq!(res.target, 2);
    assert_eq!(res.error, 0.0);
    assert_eq!(res.overlay.dimensions(), (200, 200));
    assert_eq!(session.images().records()[0].last_detected, Some(2));
    assert!(session.last_overlay().is_some());
    assert_eq!(session.progress_text(), "two.png: Detected 2, Target 2, Error 0");
}

#[test]
fn process_current_surfaces_invalid_roi() {
    let session = labeled_session();
    session.process_current().expect("valid ROI");
    assert!(session.last_overlay().is_some());

    session.set_param(ParamId::XMax, 5000.0).unwrap();
    let err = session.process_current().unwrap_err();
    assert!(matches!(
        err,
        SessionError::Detect(DetectError::InvalidRoi { .. })
    ));
    assert!(session.last_overlay().is_none(), "stale overlay kept");
}

#[test]
fn process_current_without_images_fails() {
    let session = TuningSession::new();
    assert!(matches!(
        session.process_current(),
        Err(SessionError::NoImages)
    ));
    assert!(matches!(session.process_all(), Err(SessionError::NoImages)));
}

#[test]
fn process_all_scores_every_image() {
    let session = labeled_session();
    session.set_target(1, 3).unwrap();
    session.select(1).unwrap();
    let report = session.process_all().expect("processes");

    let detected: Vec<usize> = report.rows.iter().map(|r| r.detected).collect();
    assert_eq!(detected, vec![2, 1]);
    assert_eq!(report.rows[1].error, 2.0);
    assert_eq!(report.average_error, 1.0);
    let recorded: Vec<Option<usize>> = session
        .images()
        .records()
        .iter()
        .map(|r| r.last_detected)
        .collect();
    assert_eq!(recorded, vec![Some(2), Some(1)]);
    // The current image is rendered afterwards.
    assert!(session.progress_text().starts_with("one.png:"));
}

#[test]
fn process_all_counts_failures_as_zero() {
    let session = labeled_session();
    session.set_param(ParamId::YMax, 900.0).unwrap();
    let report = session.process_all().expect("per-image failures are not fatal");
    assert!(report.rows.iter().all(|r| r.detected == 0));
    assert_eq!(report.average_error, 1.5);
    assert!(session.last_overlay().is_none());
}

#[test]
fn one_pixel_roi_scores_instead_of_failing() {
    let session = labeled_session();
    let mut p = small_image_params(200, 200);
    p.set(ParamId::XMin, 10.0);
    p.set(ParamId::XMax, 11.0);
    p.set(ParamId::YMin, 10.0);
    p.set(ParamId::YMax, 11.0);
    session.set_params(p).unwrap();

    let report = session.process_all().expect("processes");
    assert!(report.rows.iter().all(|r| r.detected == 0));
    assert_eq!(report.average_error, 1.5);

    session.unlock_only(&[ParamId::BlurSize]).unwrap();
    session.set_optimizer_config(quick_config(4)).unwrap();
    let status = session.start_optimization().expect("starts").join();
    assert!(
        matches!(status, OptimizationStatus::Completed { best_error, .. } if best_error == 1.5),
        "{status:?}"
    );
}

#[test]
fn set_param_coerces_and_auto_updates() {
    let session = labeled_session();
    assert_eq!(session.set_param(ParamId::BlurSize, 6.0).unwrap(), 7.0);
    assert!(session.last_overlay().is_none());

    session.set_auto_update(true);
    session.set_param(ParamId::MinBlobArea, 60.0).unwrap();
    assert!(session.last_overlay().is_some());
    assert_eq!(session.images().records()[0].last_detected, Some(2));
}

#[test]
fn navigation_wraps() {
    let session = labeled_session();
    assert_eq!(session.next_image(), 1);
    assert_eq!(session.next_image(), 0);
    assert_eq!(session.prev_image(), 1);
    assert!(matches!(
        session.select(9),
        Err(SessionError::ImageSet(_))
    ));
}

#[test]
fn snippet_export_follows_parameters() {
    let session = TuningSession::new();
    session.set_param(ParamId::BlurSize, 20.0).unwrap();
    let snippet = session.export_snippet();
    assert!(snippet.contains("BLUR_SIZE = 21"));
    let parsed = ParameterSet::from_snippet(&snippet).expect("parses");
    assert_eq!(parsed.get(ParamId::BlurSize), 21.0);
}

#[test]
fn start_rejects_empty_session() {
    let session = TuningSession::new();
    session.unlock_only(&[ParamId::BlurSize]).unwrap();
    assert_eq!(
        session.start_optimization().unwrap_err(),
        OptimizationRejected::NoImages
    );
    assert!(!session.is_optimizing());
}

#[test]
fn start_rejects_all_locked_without_spawning() {
    let session = labeled_session();
    assert_eq!(
        session.start_optimization().unwrap_err(),
        OptimizationRejected::NoUnlockedParameters
    );
    assert!(!session.is_optimizing());
    assert_eq!(session.status(), OptimizationStatus::Idle);
}

#[test]
fn start_rejects_negative_targets() {
    let session = labeled_session();
    session.unlock_only(&[ParamId::MinBlobArea]).unwrap();
    session.set_target(1, -1).unwrap();
    assert_eq!(
        session.start_optimization().unwrap_err(),
        OptimizationRejected::NegativeTarget {
            filename: "one.png".to_string(),
            target: -1,
        }
    );
    assert!(!session.is_optimizing());
}

#[test]
fn session_is_read_only_while_optimizing() {
    let session = labeled_session();
    session.unlock_only(&[ParamId::BrightnessPercentile]).unwrap();
    session.set_optimizer_config(quick_config(10_000)).unwrap();
    let before = session.params();

    let handle = session.start_optimization().expect("starts");
    assert!(session.is_optimizing());
    assert_eq!(
        session.start_optimization().unwrap_err(),
        OptimizationRejected::AlreadyRunning
    );
    assert!(matches!(
        session.set_param(ParamId::BlurSize, 9.0),
        Err(SessionError::Busy)
    ));
    assert!(matches!(session.set_all_targets(1), Err(SessionError::Busy)));
    assert!(matches!(session.process_current(), Err(SessionError::Busy)));
    // Navigation stays available.
    assert_eq!(session.next_image(), 1);

    handle.cancel();
    assert_eq!(handle.join(), OptimizationStatus::StoppedByUser);
    assert!(!session.is_optimizing());
    assert_eq!(session.params(), before);
    assert_eq!(session.status(), OptimizationStatus::StoppedByUser);
    assert!(session.set_param(ParamId::BlurSize, 9.0).is_ok());
}

#[test]
fn immediate_cancel_leaves_parameters_unchanged() {
    let session = labeled_session();
    session
        .unlock_only(&[ParamId::MinBlobArea, ParamId::BlurSize])
        .unwrap();
    session.set_optimizer_config(quick_config(10_000)).unwrap();
    let before = session.params();

    let handle = session.start_optimization().expect("starts");
    handle.cancel();
    let events: Vec<ProgressEvent> = handle.events().iter().collect();
    assert!(matches!(
        events.first(),
        Some(ProgressEvent::Started {
            n_params: 2,
            n_images: 2,
            ..
        })
    ));
    assert_eq!(
        events.last(),
        Some(&ProgressEvent::Finished(OptimizationStatus::StoppedByUser))
    );
    assert_eq!(handle.join(), OptimizationStatus::StoppedByUser);
    assert_eq!(session.params(), before);
    assert_eq!(session.progress_text(), "Optimization stopped by user");
}

#[test]
fn completed_run_applies_best_parameters() {
    let session = labeled_session();
    session.unlock_only(&[ParamId::BrightnessPercentile]).unwrap();
    session.set_optimizer_config(quick_config(6)).unwrap();
    let before = session.params();

    let handle = session.start_optimization().expect("starts");
    let events: Vec<ProgressEvent> = handle.events().iter().collect();
    let status = handle.join();

    let (best_error, iterations, metric) = match status {
        OptimizationStatus::Completed {
            best_error,
            iterations,
            metric,
        } => (best_error, iterations, metric),
        other => panic!("unexpected status {other:?}"),
    };
    assert_eq!(iterations, 6);
    assert_eq!(metric, crate::scoring::ErrorMetric::Average);

    let trials: Vec<&TrialReport> = events
        .iter()
        .filter_map(|e| match e {
            ProgressEvent::Trial(t) => Some(t),
            _ => None,
        })
        .collect();
    assert_eq!(trials.len(), 6);
    assert_eq!(trials.last().unwrap().best_error, best_error);
    assert!(trials
        .iter()
        .all(|t| t.values.len() == 1 && t.values[0].0 == ParamId::BrightnessPercentile));
    assert!(matches!(events.last(), Some(ProgressEvent::Finished(_))));

    let best_trial = trials
        .iter()
        .rev()
        .find(|t| t.is_best)
        .expect("first trial always improves");
    assert_eq!(best_trial.error, best_error);

    let after = session.params();
    assert_eq!(
        after.get(ParamId::BrightnessPercentile),
        best_trial.values[0].1,
        "applied value is the best trial's"
    );
    for id in ParamId::ALL {
        if id != ParamId::BrightnessPercentile {
            assert_eq!(after.get(id), before.get(id), "{id} changed");
        }
        assert_eq!(after.is_locked(id), before.is_locked(id));
    }
    assert!(session
        .images()
        .records()
        .iter()
        .all(|r| r.last_detected.is_some()));
    assert!(session.last_overlay().is_some());
    assert!(!session.is_optimizing());
    assert!(session.progress_text().starts_with("Optimization complete!"));
}
