use std::fs;
use std::path::PathBuf;

use image::{GrayImage, Luma};

use super::*;
use crate::test_utils::{draw_disc_image, small_image_params};

fn disc_frame(name: &str, center: [f32; 2]) -> Frame {
    Frame {
        filename: name.to_string(),
        pixels: draw_disc_image(200, 200, &[(center, 25.0)], 220, 20),
    }
}

fn names(paths: &[PathBuf]) -> Vec<String> {
    paths
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect()
}

#[test]
fn natural_order_compares_digit_runs_numerically() {
    let mut v = vec!["f10.jpg", "F1.JPG", "f2.jpg", "a.jpg", "10.jpg", "9.jpg"];
    v.sort_by_key(|s| natural_key(s));
    assert_eq!(v, vec!["9.jpg", "10.jpg", "a.jpg", "F1.JPG", "f2.jpg", "f10.jpg"]);
}

#[test]
fn list_frames_keeps_jpeg_only() {
    let dir = tempfile::tempdir().unwrap();
    let img = GrayImage::from_pixel(4, 4, Luma([50]));
    for name in ["shot10.jpg", "shot2.JPG", "shot1.jpeg", "notes.png"] {
        img.save(dir.path().join(name)).unwrap();
    }
    fs::write(dir.path().join("readme.txt"), "x").unwrap();

    let paths = list_frames(dir.path()).unwrap();
    assert_eq!(names(&paths), vec!["shot1.jpeg", "shot2.JPG", "shot10.jpg"]);
}

#[test]
fn list_frames_reports_missing_directory() {
    let dir = tempfile::tempdir().unwrap();
    let err = list_frames(&dir.path().join("absent")).unwrap_err();
    assert!(matches!(err, BatchError::ReadDir { .. }));
}

#[test]
fn same_droplet_in_two_frames_is_one_cluster() {
    let params = small_image_params(200, 200).detect_params();
    let frames = vec![
        disc_frame("f1.jpg", [100.0, 100.0]),
        disc_frame("f2.jpg", [104.0, 102.0]),
    ];
    let analysis = analyze_frames(&frames, &params, DEFAULT_CLUSTER_DISTANCE);

    assert_eq!(analysis.total_detections, 2);
    assert_eq!(analysis.clusters.len(), 1);
    let c = &analysis.clusters[0];
    assert_eq!(c.frames, vec![0, 1]);
    assert_eq!(c.detection_count, 2);
    assert!((100..=104).contains(&c.center[0]));
    assert!(c.circularity > 0.7 && c.circularity < 1.2, "{}", c.circularity);
}

#[test]
fn failing_frame_counts_zero_and_does_not_abort() {
    let params = small_image_params(200, 200).detect_params();
    let frames = vec![
        disc_frame("ok.jpg", [100.0, 100.0]),
        Frame {
            filename: "small.jpg".to_string(),
            pixels: GrayImage::from_pixel(80, 80, Luma([20])),
        },
    ];
    let analysis = analyze_frames(&frames, &params, DEFAULT_CLUSTER_DISTANCE);
    assert_eq!(analysis.frames[0].count(), 1);
    assert!(analysis.frames[1].detection.is_none());
    assert_eq!(analysis.frames[1].count(), 0);
    assert_eq!(analysis.clusters.len(), 1);
}

#[test]
fn run_batch_writes_outputs_and_log() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    for (name, center) in [("v_2.jpg", [102.0, 98.0]), ("v_1.jpg", [100.0, 100.0])] {
        disc_frame(name, center)
            .pixels
            .save(input.path().join(name))
            .unwrap();
    }
    let keep = input.path().join("keep.png");
    GrayImage::new(4, 4).save(&keep).unwrap();

    let config = BatchConfig {
        vial_label: "V42".to_string(),
        delete_inputs: true,
        ..BatchConfig::default()
    };
    let params = small_image_params(200, 200).detect_params();
    let report = run_batch(input.path(), output.path(), &params, &config).unwrap();

    assert_eq!(report.analysis.frames[0].filename, "v_1.jpg");
    assert_eq!(names(&report.frame_paths), vec!["V42_Frame01.jpg", "V42_Frame02.jpg"]);
    assert!(report.frame_paths.iter().all(|p| p.exists()));
    assert!(report.summary_path.exists());
    let summary_name = report.summary_path.file_name().unwrap().to_string_lossy();
    assert!(summary_name.starts_with("V42_RESULT_"));
    assert_eq!(summary_name.len(), "V42_RESULT_20250101_120000.jpg".len());

    let text = fs::read_to_string(&report.log_path).unwrap();
    let rec: LogRecord = serde_json::from_str(text.trim_end()).unwrap();
    assert_eq!(rec, report.record);
    assert_eq!(rec.vial_id, "V42");
    assert_eq!(rec.images_analyzed, 2);
    assert_eq!(rec.output_main, summary_name);
    assert_eq!(rec.droplets_detected, report.analysis.clusters.len());
    assert_eq!(rec.droplet_details.len(), rec.droplets_detected);

    assert_eq!(report.deleted, 2);
    assert!(list_frames(input.path()).unwrap().is_empty());
    assert!(keep.exists());
}

#[test]
fn run_batch_without_frames_fails() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    let params = small_image_params(200, 200).detect_params();
    let err = run_batch(input.path(), output.path(), &params, &BatchConfig::default())
        .unwrap_err();
    assert!(matches!(err, BatchError::NoFrames(_)));
    assert!(!output.path().join(LOG_FILE_NAME).exists());
}

#[test]
fn batch_config_defaults() {
    let cfg: BatchConfig = serde_json::from_str("{}").unwrap();
    assert_eq!(cfg, BatchConfig::default());
    assert_eq!(cfg.vial_label, "Unknown");
    assert_eq!(cfg.cluster_distance, 200.0);
    assert!(!cfg.delete_inputs);
}
