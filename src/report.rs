use crate::config::{CorrectionMethod, WindowUnit};
use crate::interpolation::InterpolationKind;
use serde::{Deserialize, Serialize};

/// One processing step recorded on a derived sequence.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "processing_type", rename_all = "snake_case")]
pub enum ProcessingStep {
    CorrectJitter {
        velocity_threshold: f64,
        window: f64,
        window_unit: WindowUnit,
        method: CorrectionMethod,
        correct_twitches: bool,
        correct_jumps: bool,
    },
    CorrectZeros {
        spline_kind: InterpolationKind,
    },
}

/// Poses at which a joint moved faster than the threshold, per joint.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct OverThresholdFlags {
    joints: Vec<JointFlags>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct JointFlags {
    pub label: String,
    pub poses: Vec<usize>,
}

impl OverThresholdFlags {
    pub(crate) fn push(&mut self, label: &str, poses: Vec<usize>) {
        self.joints.push(JointFlags {
            label: label.to_string(),
            poses,
        });
    }

    pub fn poses(&self, label: &str) -> &[usize] {
        self.joints
            .iter()
            .find(|j| j.label == label)
            .map(|j| j.poses.as_slice())
            .unwrap_or(&[])
    }

    pub fn contains(&self, label: &str, pose: usize) -> bool {
        self.poses(label).binary_search(&pose).is_ok()
    }

    pub fn count(&self) -> usize {
        self.joints.iter().map(|j| j.poses.len()).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = &JointFlags> {
        self.joints.iter()
    }
}

/// Outcome of a jitter correction pass.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct JitterReport {
    /// Cells rewritten by interpolation
    pub realigned_points: usize,
    pub jumps: usize,
    pub twitches: usize,

    /// Detected but left as recorded (correction disabled for that class)
    pub skipped_jumps: usize,
    pub skipped_twitches: usize,

    /// Poses times joints
    pub total_points: usize,

    pub flags: OverThresholdFlags,

    /// Present when the method handed the corrected cells to a gap-fill pass
    pub zeros: Option<ZeroReport>,
}

impl JitterReport {
    pub fn percentage(&self) -> f64 {
        percentage(self.realigned_points, self.total_points)
    }

    pub(crate) fn absorb(&mut self, other: JointCounts) {
        self.realigned_points += other.realigned_points;
        self.jumps += other.jumps;
        self.twitches += other.twitches;
        self.skipped_jumps += other.skipped_jumps;
        self.skipped_twitches += other.skipped_twitches;
    }
}

/// Counters of a single joint column.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub(crate) struct JointCounts {
    pub realigned_points: usize,
    pub jumps: usize,
    pub twitches: usize,
    pub skipped_jumps: usize,
    pub skipped_twitches: usize,
}

/// Outcome of a gap-fill pass.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct ZeroReport {
    /// Cells holding the origin sentinel
    pub origin_cells: usize,
    pub joints_affected: usize,
    /// Longest bridged gap over all joints, seconds
    pub longest_run_s: f64,
    pub total_points: usize,
    /// False when nothing needed repair and the source was returned as is
    pub rebuilt: bool,
}

impl ZeroReport {
    pub fn percentage(&self) -> f64 {
        percentage(self.origin_cells, self.total_points)
    }
}

fn percentage(part: usize, total: usize) -> f64 {
    if total > 0 {
        part as f64 / total as f64 * 100.0
    } else {
        0.0
    }
}
