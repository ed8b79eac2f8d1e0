use serde::{Deserialize, Serialize};

use crate::detect::DetectedBlob;

/// Center distance below which two detections are the same droplet.
pub const DEFAULT_CLUSTER_DISTANCE: f64 = 200.0;

/// A blob together with the 0-based frame it was found in.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameBlob {
    pub frame: usize,
    pub blob: DetectedBlob,
}

/// One physical droplet, merged across frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DropletCluster {
    /// Mean member center, truncated.
    pub center: [u32; 2],
    /// Mean member radius, truncated.
    pub radius: u32,
    pub area: f64,
    pub circularity: f64,
    /// Frame index of every member, in detection order.
    pub frames: Vec<usize>,
    /// Number of members; reported as the confidence.
    pub detection_count: usize,
}

/// Greedy single-pass clustering.
///
/// Each detection not yet taken seeds a cluster and absorbs every later
/// untaken detection whose center lies strictly closer than `max_distance`
/// to the seed. Clusters come back largest mean area first; equal areas
/// keep seed order.
pub fn cluster_detections(detections: &[FrameBlob], max_distance: f64) -> Vec<DropletCluster> {
    let mut taken = vec![false; detections.len()];
    let mut clusters = Vec::new();

    for (i, seed) in detections.iter().enumerate() {
        if taken[i] {
            continue;
        }
        taken[i] = true;
        let mut members = vec![seed];
        for (j, other) in detections.iter().enumerate().skip(i + 1) {
            if taken[j] {
                continue;
            }
            if center_distance(&seed.blob, &other.blob) < max_distance {
                taken[j] = true;
                members.push(other);
            }
        }
        clusters.push(merge(&members));
    }

    clusters.sort_by(|a, b| b.area.total_cmp(&a.area));
    clusters
}

fn center_distance(a: &DetectedBlob, b: &DetectedBlob) -> f64 {
    let dx = a.center[0] as f64 - b.center[0] as f64;
    let dy = a.center[1] as f64 - b.center[1] as f64;
    dx.hypot(dy)
}

fn mean_of(members: &[&FrameBlob], f: impl Fn(&FrameBlob) -> f64) -> f64 {
    members.iter().map(|m| f(*m)).sum::<f64>() / members.len() as f64
}

fn merge(members: &[&FrameBlob]) -> DropletCluster {
    DropletCluster {
        center: [
            mean_of(members, |m| m.blob.center[0] as f64) as u32,
            mean_of(members, |m| m.blob.center[1] as f64) as u32,
        ],
        radius: mean_of(members, |m| m.blob.radius as f64) as u32,
        area: mean_of(members, |m| m.blob.area as f64),
        circularity: mean_of(members, |m| m.blob.circularity.unwrap_or(0.0)),
        frames: members.iter().map(|m| m.frame).collect(),
        detection_count: members.len(),
    }
}
