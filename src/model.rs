//! Pose and sequence data model.
//!
//! A [`Sequence`] is validated once at construction: at least one pose,
//! non-decreasing timestamps and the same joint labels in every pose. Joints
//! inside every pose are stored in the label order of pose 0, so a joint can
//! be addressed by its column index across the whole sequence.

use crate::error::{CorrectionError, Result};
use crate::geometry::Point3D;
use crate::report::ProcessingStep;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Joint {
    pub label: String,
    #[serde(flatten)]
    pub position: Point3D,
    /// Value produced by a correction pass rather than read from the source
    #[serde(default)]
    pub corrected: bool,
    /// Raw displacement into this frame exceeded the velocity threshold
    #[serde(default)]
    pub flagged_over_threshold: bool,
    /// Carried for other tools, never read here
    #[serde(default)]
    pub randomized: bool,
}

impl Joint {
    pub fn new(label: &str, position: Point3D) -> Self {
        Joint {
            label: label.to_string(),
            position,
            corrected: false,
            flagged_over_threshold: false,
            randomized: false,
        }
    }

    /// Copy of this joint moved to `position` and marked as corrected.
    pub fn corrected_to(&self, position: Point3D) -> Self {
        Joint {
            position,
            corrected: true,
            ..self.clone()
        }
    }

    /// Copy of this joint with its annotations cleared, as read from a source.
    pub fn verbatim(&self) -> Self {
        Joint {
            corrected: false,
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    timestamp: f64,
    #[serde(skip)]
    relative_timestamp: f64,
    joints: Vec<Joint>,
}

impl Pose {
    pub fn new(timestamp: f64) -> Self {
        Pose {
            timestamp,
            relative_timestamp: 0.0,
            joints: Vec::new(),
        }
    }

    /// Adds a joint, replacing any joint already holding the same label.
    pub fn add_joint(&mut self, joint: Joint) {
        match self.joints.iter_mut().find(|j| j.label == joint.label) {
            Some(existing) => *existing = joint,
            None => self.joints.push(joint),
        }
    }

    pub fn joint(&self, label: &str) -> Option<&Joint> {
        self.joints.iter().find(|j| j.label == label)
    }

    pub fn joints(&self) -> &[Joint] {
        &self.joints
    }

    pub fn timestamp(&self) -> f64 {
        self.timestamp
    }

    pub fn relative_timestamp(&self) -> f64 {
        self.relative_timestamp
    }

    pub(crate) fn set_relative_timestamp(&mut self, relative: f64) {
        self.relative_timestamp = relative;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawSequence")]
pub struct Sequence {
    name: Option<String>,
    poses: Vec<Pose>,
    processing_steps: Vec<ProcessingStep>,
}

#[derive(Deserialize)]
struct RawSequence {
    #[serde(default)]
    name: Option<String>,
    poses: Vec<Pose>,
    #[serde(default)]
    processing_steps: Vec<ProcessingStep>,
}

impl TryFrom<RawSequence> for Sequence {
    type Error = CorrectionError;

    fn try_from(raw: RawSequence) -> Result<Self> {
        let mut sequence = Sequence::new(raw.poses)?;
        sequence.name = raw.name;
        sequence.processing_steps = raw.processing_steps;
        Ok(sequence)
    }
}

impl Sequence {
    /// Validates `poses` and computes relative timestamps.
    pub fn new(mut poses: Vec<Pose>) -> Result<Self> {
        let first = poses.first().ok_or(CorrectionError::EmptySequence)?;
        let start = first.timestamp;
        let labels: Vec<String> = first.joints.iter().map(|j| j.label.clone()).collect();

        let mut previous = start;
        for (index, pose) in poses.iter_mut().enumerate() {
            if pose.timestamp < previous {
                return Err(CorrectionError::NonMonotonicTimestamps {
                    index,
                    timestamp: pose.timestamp,
                    previous,
                });
            }
            previous = pose.timestamp;
            pose.relative_timestamp = pose.timestamp - start;

            if index > 0 {
                pose.joints = Self::reorder(index, std::mem::take(&mut pose.joints), &labels)?;
            }
        }

        Ok(Sequence {
            name: None,
            poses,
            processing_steps: Vec::new(),
        })
    }

    fn reorder(pose: usize, mut joints: Vec<Joint>, labels: &[String]) -> Result<Vec<Joint>> {
        let mut ordered = Vec::with_capacity(labels.len());
        for label in labels {
            let at = joints
                .iter()
                .position(|j| &j.label == label)
                .ok_or_else(|| CorrectionError::MissingJoint {
                    pose,
                    label: label.clone(),
                })?;
            ordered.push(joints.swap_remove(at));
        }
        if let Some(extra) = joints.first() {
            return Err(CorrectionError::UnexpectedJoint {
                pose,
                label: extra.label.clone(),
            });
        }
        Ok(ordered)
    }

    /// Builds a sequence with the timestamps of `self` from per-joint columns
    /// laid out in the label order of `self`.
    pub(crate) fn from_columns(&self, columns: Vec<Vec<Joint>>) -> Result<Sequence> {
        let mut poses: Vec<Pose> = self
            .poses
            .iter()
            .map(|p| Pose {
                timestamp: p.timestamp,
                relative_timestamp: p.relative_timestamp,
                joints: Vec::with_capacity(columns.len()),
            })
            .collect();

        for column in columns {
            if column.len() != poses.len() {
                return Err(CorrectionError::LengthMismatch {
                    values: column.len(),
                    times: poses.len(),
                });
            }
            for (pose, joint) in poses.iter_mut().zip(column) {
                pose.joints.push(joint);
            }
        }

        Ok(Sequence {
            name: self.name.clone(),
            poses,
            processing_steps: self.processing_steps.clone(),
        })
    }

    pub fn len(&self) -> usize {
        self.poses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.poses.is_empty()
    }

    pub fn poses(&self) -> &[Pose] {
        &self.poses
    }

    pub fn pose(&self, index: usize) -> Option<&Pose> {
        self.poses.get(index)
    }

    pub fn joint_labels(&self) -> Vec<&str> {
        self.poses[0].joints.iter().map(|j| j.label.as_str()).collect()
    }

    pub fn joint_count(&self) -> usize {
        self.poses[0].joints.len()
    }

    /// Joint at `column` (label order of pose 0) in pose `pose`.
    pub(crate) fn joint_at(&self, pose: usize, column: usize) -> &Joint {
        &self.poses[pose].joints[column]
    }

    pub fn timestamps(&self) -> Vec<f64> {
        self.poses.iter().map(|p| p.timestamp).collect()
    }

    pub fn relative_timestamps(&self) -> Vec<f64> {
        self.poses.iter().map(|p| p.relative_timestamp).collect()
    }

    /// Recording length in seconds.
    pub fn duration(&self) -> f64 {
        self.poses.last().map_or(0.0, |p| p.relative_timestamp)
    }

    /// Positions of one joint across the whole sequence.
    pub fn joint_series(&self, label: &str) -> Option<Vec<Point3D>> {
        self.poses
            .iter()
            .map(|p| p.joint(label).map(|j| j.position))
            .collect()
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = Some(name.into());
    }

    pub fn processing_steps(&self) -> &[ProcessingStep] {
        &self.processing_steps
    }

    pub(crate) fn push_processing_step(&mut self, step: ProcessingStep) {
        self.processing_steps.push(step);
    }

    /// Name for a derived sequence: `"<name> <suffix>"`, or the suffix alone.
    pub(crate) fn derived_name(&self, suffix: &str) -> String {
        match &self.name {
            Some(name) => format!("{} {}", name, suffix),
            None => suffix.to_string(),
        }
    }
}
