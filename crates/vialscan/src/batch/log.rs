use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone};
use serde::{Deserialize, Serialize};

use super::cluster::DropletCluster;
use super::BatchError;

/// Append-only run log inside the output directory, one JSON object per line.
pub const LOG_FILE_NAME: &str = "droplet_detection_log.txt";

/// Per-droplet entry of a [`LogRecord`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DropletDetail {
    /// 1-based, in cluster order.
    pub droplet_num: usize,
    pub radius_px: u32,
    /// Rounded to one decimal.
    pub area_px2: f64,
    /// Rounded to two decimals.
    pub circularity: f64,
    pub frames_seen: usize,
    pub confidence: usize,
}

/// One analysis run as written to the log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    /// Local time, `%Y-%m-%d %H:%M:%S`.
    pub timestamp: String,
    pub vial_id: String,
    pub images_analyzed: usize,
    pub result: String,
    pub droplets_detected: usize,
    pub total_detections: usize,
    /// File name of the summary image.
    pub output_main: String,
    pub droplet_details: Vec<DropletDetail>,
}

pub(crate) fn result_label(droplets: usize) -> &'static str {
    if droplets > 0 {
        "DROPLETS DETECTED"
    } else {
        "NO DROPLETS DETECTED"
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round() / scale
}

impl LogRecord {
    pub fn new<Tz: TimeZone>(
        at: &DateTime<Tz>,
        vial_id: &str,
        images_analyzed: usize,
        total_detections: usize,
        output_main: &str,
        clusters: &[DropletCluster],
    ) -> Self
    where
        Tz::Offset: std::fmt::Display,
    {
        let droplet_details = clusters
            .iter()
            .enumerate()
            .map(|(i, c)| DropletDetail {
                droplet_num: i + 1,
                radius_px: c.radius,
                area_px2: round_to(c.area, 1),
                circularity: round_to(c.circularity, 2),
                frames_seen: c.frames.len(),
                confidence: c.detection_count,
            })
            .collect();
        Self {
            timestamp: at.format("%Y-%m-%d %H:%M:%S").to_string(),
            vial_id: vial_id.to_string(),
            images_analyzed,
            result: result_label(clusters.len()).to_string(),
            droplets_detected: clusters.len(),
            total_detections,
            output_main: output_main.to_string(),
            droplet_details,
        }
    }
}

/// Append `record` as one line to the log in `dir`, creating it if needed.
pub fn append_record(dir: &Path, record: &LogRecord) -> Result<PathBuf, BatchError> {
    let path = dir.join(LOG_FILE_NAME);
    let mut line = serde_json::to_string(record)?;
    line.push('\n');
    let io_err = |source| BatchError::Io {
        path: path.clone(),
        source,
    };
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(io_err)?;
    file.write_all(line.as_bytes()).map_err(io_err)?;
    Ok(path)
}
