//! Window-based jitter correction
//!
//! This module detects and corrects tracking artifacts in motion-capture
//! sequences, one joint at a time.
//!
//! ## The Problem
//! Skeleton trackers occasionally lose a joint for a few frames and report it
//! somewhere implausible:
//! - **Twitch**: the joint leaps away and comes back within a few frames
//! - **Jump**: the joint leaps away and does not come back within the window
//!
//! Both show up as a speed between two consecutive frames that no limb can
//! reach (typically above 0.1 to 1 m/s for Kinect recordings).
//!
//! ## Algorithm
//! For each joint, walking forward from pose 1:
//! 1. The **anchor** is the latest pose whose corrected value is trusted
//! 2. Speed from the anchor to the raw value at `p` under the threshold: keep
//!    the raw value, advance the anchor
//! 3. Over the threshold: scan up to `window` poses ahead for a raw value that
//!    is back under the threshold (twitch). If none is found by the end of the
//!    window, the last pose of the window ends the correction (jump)
//! 4. Every pose strictly between the anchor and the resolution pose is
//!    replaced by the straight line joining them, in time
//! 5. Poses already filled by a previous window are never rewritten
//!
//! The source sequence is never modified; the output column for every joint is
//! pre-sized and written at most once per cell.

use crate::config::{JitterConfig, VelocityStrategy, Window, ZeroConfig};
use crate::error::{CorrectionError, Result};
use crate::geometry::{delay, distance, Point3D};
use crate::model::{Joint, Sequence};
use crate::report::{JitterReport, JointCounts, ProcessingStep};
use crate::zeros::correct_zeros;
use log::{debug, info};
use std::ops::Range;

/// Smallest lookahead window, in poses, worth interpolating over.
const MIN_INTERPOLATED_WINDOW: usize = 2;

/// What one step of the scan did at pose `p`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Step {
    /// Filled earlier by a correction window
    AlreadyFilled,
    /// Raw value kept
    Accepted,
    /// Over threshold with a window under two poses: corrected anchor value
    /// copied
    Held,
    Twitch { start: usize, end: usize },
    Jump { start: usize, end: usize },
    /// Detected, left as recorded because that correction is disabled
    SkippedTwitch,
    SkippedJump,
}

/// Outcome of correcting one joint column.
#[derive(Debug)]
struct ColumnOutcome {
    joints: Vec<Joint>,
    counts: JointCounts,
    flagged: Vec<usize>,
    interpolated: Vec<usize>,
}

/// Correction state machine for a single joint.
#[derive(Debug)]
pub(crate) struct JointCorrector<'a> {
    source: &'a Sequence,
    column: usize,

    threshold: f64,
    window: Window,
    strategy: VelocityStrategy,
    correct_twitches: bool,
    correct_jumps: bool,

    /// Pre-sized output column
    slots: Vec<Option<Joint>>,

    /// Latest trusted pose; non-decreasing over the scan
    anchor: usize,

    counts: JointCounts,
    flagged: Vec<usize>,
    interpolated: Vec<usize>,

    /// Writes per slot
    #[cfg(test)]
    writes: Vec<u32>,
}

impl<'a> JointCorrector<'a> {
    pub(crate) fn new(
        source: &'a Sequence,
        column: usize,
        config: &JitterConfig,
        window: Window,
    ) -> Self {
        let mut slots = vec![None; source.len()];
        // Nothing precedes pose 0, it is always kept
        slots[0] = Some(source.joint_at(0, column).clone());

        JointCorrector {
            source,
            column,
            threshold: config.velocity_threshold,
            window,
            strategy: config.method.velocity_strategy(),
            correct_twitches: config.correct_twitches,
            correct_jumps: config.correct_jumps,
            slots,
            anchor: 0,
            counts: JointCounts::default(),
            flagged: Vec::new(),
            interpolated: Vec::new(),
            #[cfg(test)]
            writes: (0..source.len()).map(|p| u32::from(p == 0)).collect(),
        }
    }

    fn run(mut self) -> Result<ColumnOutcome> {
        for p in 1..self.source.len() {
            self.step(p)?;
        }
        Ok(self.finish())
    }

    fn label(&self) -> &str {
        &self.source.joint_at(0, self.column).label
    }

    fn raw(&self, pose: usize) -> &'a Joint {
        self.source.joint_at(pose, self.column)
    }

    /// Corrected value at `pose`. Only called for poses at or before the
    /// anchor, which are always filled.
    fn corrected(&self, pose: usize) -> &Joint {
        match &self.slots[pose] {
            Some(joint) => joint,
            None => self.raw(pose),
        }
    }

    fn place(&mut self, pose: usize, joint: Joint) {
        debug_assert!(self.slots[pose].is_none(), "pose {} written twice", pose);
        #[cfg(test)]
        {
            self.writes[pose] += 1;
        }
        self.slots[pose] = Some(joint);
    }

    /// Distance from the corrected anchor value to the raw value at `to`,
    /// divided by `elapsed`.
    fn speed(&self, to: usize, elapsed: f64) -> Result<f64> {
        if elapsed == 0.0 {
            return Err(CorrectionError::ZeroDelay(
                self.source.poses()[to].timestamp(),
            ));
        }
        Ok(distance(self.corrected(self.anchor).position, self.raw(to).position) / elapsed)
    }

    fn elapsed(&self, from: usize, to: usize) -> f64 {
        let poses = self.source.poses();
        delay(&poses[from], &poses[to])
    }

    /// Speed used during the lookahead scan.
    fn lookahead_speed(&self, k: usize) -> Result<f64> {
        let elapsed = match self.strategy {
            VelocityStrategy::Subsequent => self.elapsed(self.anchor, k),
            VelocityStrategy::AnchorDistanceOverAnchorDelay => {
                self.elapsed(self.anchor, self.anchor + 1)
            }
        };
        self.speed(k, elapsed)
    }

    /// Window length in poses, counted from the anchor. Never longer than the
    /// recording.
    fn window_poses(&self, p: usize) -> usize {
        let span = match self.window {
            Window::Poses(n) => return n.min(self.source.len()),
            Window::Seconds(span) => span,
        };

        let last = self.source.len() - 1;
        for k in p..=last {
            let over = self.elapsed(self.anchor, k);
            if over >= span {
                let under = self.elapsed(self.anchor, k - 1);
                // Ties go to the longer window
                return if span - under < over - span {
                    k - 1 - self.anchor
                } else {
                    k - self.anchor
                };
            }
        }
        last - self.anchor
    }

    /// Processes pose `p`. Poses must be stepped in increasing order from 1.
    pub(crate) fn step(&mut self, p: usize) -> Result<Step> {
        let last = self.source.len() - 1;

        if self.slots[p].is_some() {
            self.anchor = self.anchor.max(p);
            return Ok(Step::AlreadyFilled);
        }

        let v = self.speed(p, self.elapsed(self.anchor, p))?;
        if v <= self.threshold || p == last {
            self.accept(p);
            return Ok(Step::Accepted);
        }

        self.flagged.push(p);
        let window = self.window_poses(p);
        debug!(
            "[Jitter] {} pose {}: {:.3} m/s over threshold, window {} pose(s)",
            self.label(),
            p,
            v,
            window
        );

        if window < MIN_INTERPOLATED_WINDOW {
            self.hold(p);
            return Ok(Step::Held);
        }

        let end = (p + window).min(self.source.len());
        for k in p..end {
            let v = self.lookahead_speed(k)?;

            if v < self.threshold {
                let start = self.anchor;
                if !self.correct_twitches {
                    self.counts.skipped_twitches += 1;
                    self.accept(p);
                    return Ok(Step::SkippedTwitch);
                }
                debug!("[Jitter] {} twitch {}..{}", self.label(), start, k);
                self.fill(start, k);
                self.counts.twitches += 1;
                return Ok(Step::Twitch { start, end: k });
            }

            if k == p + window - 1 || k == last {
                let start = self.anchor;
                if !self.correct_jumps {
                    self.counts.skipped_jumps += 1;
                    self.accept(p);
                    return Ok(Step::SkippedJump);
                }
                debug!("[Jitter] {} jump {}..{}", self.label(), start, k);
                self.fill(start, k);
                self.counts.jumps += 1;
                return Ok(Step::Jump { start, end: k });
            }
        }

        // The scan always ends on the window or sequence boundary
        self.accept(p);
        Ok(Step::Accepted)
    }

    fn accept(&mut self, p: usize) {
        let joint = self.raw(p).verbatim();
        self.place(p, joint);
        self.anchor = p;
    }

    /// Copies the corrected anchor value into `p`, uninterpolated. The raw
    /// anchor value is not used: it may be the spike a previous window
    /// replaced.
    fn hold(&mut self, p: usize) {
        let joint = Joint {
            position: self.corrected(self.anchor).position,
            ..self.raw(p).verbatim()
        };
        self.place(p, joint);
        self.anchor = p;
    }

    /// Replaces the poses strictly between `start` and `end` by the line from
    /// the corrected value at `start` to the raw value at `end`. Source cells
    /// already marked corrected are kept as recorded. The anchor moves to the
    /// last pose written.
    fn fill(&mut self, start: usize, end: usize) {
        // A window resolves at the earliest one pose after the flagged pose
        debug_assert!(end > start + 1, "empty window {}..{}", start, end);

        let source = self.source;
        let poses = source.poses();
        let t_start = poses[start].timestamp();
        let span = poses[end].timestamp() - t_start;
        let from = self.corrected(start).position;
        let to = self.raw(end).position;

        for i in start + 1..end {
            if self.slots[i].is_some() {
                continue;
            }
            let raw = self.raw(i);
            if raw.corrected {
                self.place(i, raw.clone());
            } else {
                let t = (poses[i].timestamp() - t_start) / span;
                self.place(i, raw.corrected_to(from.lerp(to, t)));
                self.interpolated.push(i);
                self.counts.realigned_points += 1;
            }
            self.anchor = i;
        }
    }

    fn finish(self) -> ColumnOutcome {
        let source = self.source;
        let column = self.column;
        let mut joints: Vec<Joint> = self
            .slots
            .into_iter()
            .enumerate()
            .map(|(p, slot)| slot.unwrap_or_else(|| source.joint_at(p, column).verbatim()))
            .collect();
        for &p in &self.flagged {
            joints[p].flagged_over_threshold = true;
        }

        ColumnOutcome {
            joints,
            counts: self.counts,
            flagged: self.flagged,
            interpolated: self.interpolated,
        }
    }

    #[cfg(test)]
    pub(crate) fn anchor(&self) -> usize {
        self.anchor
    }
}

/// Detects and corrects twitches and jumps in every joint of `source`.
///
/// Returns a new sequence with the same poses and timestamps. Pose 0 is
/// copied as is. The lookahead velocity depends on `config.method`:
/// - `old` divides the anchor-to-lookahead distance by the anchor-to-lookahead
///   delay ([`VelocityStrategy::Subsequent`])
/// - any other method divides it by the delay between the anchor and the pose
///   right after it ([`VelocityStrategy::AnchorDistanceOverAnchorDelay`]),
///   which makes far lookahead poses look faster than they are
///
/// With a spline-kind method every interpolated cell is reset to the origin
/// and rebuilt by [`correct_zeros`] with that kind.
pub fn correct_jitter(source: &Sequence, config: &JitterConfig) -> Result<(Sequence, JitterReport)> {
    let window = config.resolve_window()?;
    let labels = source.joint_labels();

    let mut report = JitterReport {
        total_points: source.len() * labels.len(),
        ..Default::default()
    };

    if source.len() < 2 {
        return Ok((source.clone(), report));
    }

    info!(
        "[Jitter] Correcting {} joint(s) over {} poses: threshold {} m/s, window {:?}, method {}",
        labels.len(),
        source.len(),
        config.velocity_threshold,
        window,
        config.method
    );

    let outcomes = if config.parallel && labels.len() > 1 {
        correct_columns_parallel(source, config, window)?
    } else {
        (0..labels.len())
            .map(|column| JointCorrector::new(source, column, config, window).run())
            .collect::<Result<Vec<_>>>()?
    };

    let spline = config.method.spline_kind();
    let mut columns = Vec::with_capacity(outcomes.len());
    for (label, mut outcome) in labels.iter().zip(outcomes) {
        report.absorb(outcome.counts);
        report.flags.push(label, outcome.flagged);
        if spline.is_some() {
            for &p in &outcome.interpolated {
                outcome.joints[p].position = Point3D::ORIGIN;
            }
        }
        columns.push(outcome.joints);
    }

    let mut corrected = source.from_columns(columns)?;
    corrected.set_name(source.derived_name("+CJ"));
    corrected.push_processing_step(ProcessingStep::CorrectJitter {
        velocity_threshold: config.velocity_threshold,
        window: config.window,
        window_unit: config.window_unit,
        method: config.method,
        correct_twitches: config.correct_twitches,
        correct_jumps: config.correct_jumps,
    });

    if let Some(kind) = spline {
        info!(
            "[Jitter] {} point(s) reset to (0, 0, 0) for {} interpolation",
            report.realigned_points, kind
        );
        let zero_config = ZeroConfig {
            spline_kind: kind,
            ..Default::default()
        };
        let (rebuilt, zeros) = correct_zeros(&corrected, &zero_config)?;
        let rebuilt = rebuilt.into_owned();
        report.zeros = Some(zeros);
        corrected = rebuilt;
    }

    info!(
        "[Jitter] {} point(s) corrected over {} ({:.1}%), {} jump(s) and {} twitch(es)",
        report.realigned_points,
        report.total_points,
        report.percentage(),
        report.jumps,
        report.twitches
    );

    Ok((corrected, report))
}

/// Splits `columns` into at most `workers` contiguous runs, in order.
fn worker_chunks(columns: usize, workers: usize) -> Vec<Range<usize>> {
    let workers = workers.clamp(1, columns.max(1));
    let size = (columns + workers - 1) / workers;
    (0..columns)
        .step_by(size.max(1))
        .map(|first| first..(first + size).min(columns))
        .collect()
}

/// Spreads the joints over one scoped worker per available core. Columns are
/// independent and only read the shared source; outcomes come back in label
/// order.
fn correct_columns_parallel(
    source: &Sequence,
    config: &JitterConfig,
    window: Window,
) -> Result<Vec<ColumnOutcome>> {
    let workers = std::thread::available_parallelism().map_or(1, |n| n.get());
    let chunks = worker_chunks(source.joint_count(), workers);
    debug!(
        "[Jitter] {} joint(s) over {} worker(s)",
        source.joint_count(),
        chunks.len()
    );

    std::thread::scope(|scope| {
        let handles: Vec<_> = chunks
            .into_iter()
            .map(|columns| {
                scope.spawn(move || {
                    columns
                        .map(|column| JointCorrector::new(source, column, config, window).run())
                        .collect::<Result<Vec<_>>>()
                })
            })
            .collect();

        let mut outcomes = Vec::with_capacity(source.joint_count());
        for handle in handles {
            let chunk = handle.join().unwrap_or_else(|e| std::panic::resume_unwind(e))?;
            outcomes.extend(chunk);
        }
        Ok(outcomes)
    })
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CorrectionMethod, WindowUnit};
    use crate::interpolation::InterpolationKind;
    use crate::model::Pose;

    const EPS: f64 = 1e-9;

    fn sequence(timestamps: &[f64], columns: &[(&str, &[f64])]) -> Sequence {
        let poses = timestamps
            .iter()
            .enumerate()
            .map(|(p, &t)| {
                let mut pose = Pose::new(t);
                for (label, xs) in columns {
                    pose.add_joint(Joint::new(label, Point3D::new(xs[p], 0.0, 0.0)));
                }
                pose
            })
            .collect();
        Sequence::new(poses).unwrap()
    }

    fn evenly(n: usize, dt: f64) -> Vec<f64> {
        (0..n).map(|i| i as f64 * dt).collect()
    }

    fn xs(seq: &Sequence, label: &str) -> Vec<f64> {
        seq.joint_series(label).unwrap().iter().map(|p| p.x).collect()
    }

    /// Runs a single column step by step, checking invariants along the way.
    fn trace(seq: &Sequence, config: &JitterConfig) -> (Vec<Step>, Vec<u32>) {
        let window = config.resolve_window().unwrap();
        let mut corrector = JointCorrector::new(seq, 0, config, window);
        let mut steps = Vec::new();
        let mut anchor = corrector.anchor();
        for p in 1..seq.len() {
            steps.push(corrector.step(p).unwrap());
            assert!(corrector.anchor() >= anchor, "anchor moved back at pose {}", p);
            assert!(corrector.slots[corrector.anchor()].is_some());
            anchor = corrector.anchor();
        }
        (steps, corrector.writes.clone())
    }

    // ========================================================================
    // REFERENCE SCENARIO
    // ========================================================================

    #[test]
    fn test_single_frame_twitch() {
        let _ = env_logger::builder().is_test(true).try_init();
        let seq = sequence(
            &[0.0, 0.1, 0.2, 0.3, 0.4],
            &[("A", &[0.0, 0.01, 5.0, 0.02, 0.03])],
        );
        let config = JitterConfig::new(1.0, 2.0);

        let (out, report) = correct_jitter(&seq, &config).unwrap();

        let x = xs(&out, "A");
        assert!((x[2] - 0.015).abs() < EPS, "got {}", x[2]);
        assert_eq!(x[0], 0.0);
        assert_eq!(x[1], 0.01);
        assert_eq!(x[3], 0.02);
        assert_eq!(x[4], 0.03);
        assert_eq!(report.realigned_points, 1);
        assert_eq!(report.twitches, 1);
        assert_eq!(report.jumps, 0);
        assert!(report.flags.contains("A", 2));
        assert_eq!(report.flags.count(), 1);

        let cell = &out.poses()[2].joints()[0];
        assert!(cell.corrected);
        assert!(cell.flagged_over_threshold);
        assert!(!out.poses()[3].joints()[0].corrected);
    }

    #[test]
    fn test_source_is_left_untouched() {
        let seq = sequence(
            &[0.0, 0.1, 0.2, 0.3, 0.4],
            &[("A", &[0.0, 0.01, 5.0, 0.02, 0.03])],
        );
        let before = seq.clone();
        let _ = correct_jitter(&seq, &JitterConfig::new(1.0, 2.0)).unwrap();
        assert_eq!(seq, before);
        assert!(!seq.poses()[2].joints()[0].flagged_over_threshold);
    }

    // ========================================================================
    // SHAPE AND IDENTITY
    // ========================================================================

    #[test]
    fn test_shape_and_first_pose_preserved() {
        let ts = evenly(8, 0.05);
        let seq = sequence(
            &ts,
            &[
                ("A", &[3.0, 0.0, 0.0, 9.0, 0.0, 0.0, 0.0, 4.0]),
                ("B", &[1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0]),
            ],
        );
        let (out, report) = correct_jitter(&seq, &JitterConfig::new(0.5, 3.0)).unwrap();

        assert_eq!(out.len(), seq.len());
        assert_eq!(out.timestamps(), seq.timestamps());
        assert_eq!(out.poses()[0], seq.poses()[0]);
        assert_eq!(report.total_points, 16);
        assert_eq!(out.joint_labels(), vec!["A", "B"]);
    }

    #[test]
    fn test_single_pose_is_returned_unchanged() {
        let seq = sequence(&[2.0], &[("A", &[7.0])]);
        let (out, report) = correct_jitter(&seq, &JitterConfig::new(1.0, 3.0)).unwrap();
        assert_eq!(out, seq);
        assert_eq!(report.realigned_points, 0);
        assert_eq!(report.jumps + report.twitches, 0);
    }

    #[test]
    fn test_noise_free_input_is_identity() {
        let ts = evenly(50, 1.0 / 30.0);
        let a: Vec<f64> = ts.iter().map(|t| 0.2 * (t * 3.0).sin()).collect();
        let b: Vec<f64> = ts.iter().map(|t| 0.1 * t).collect();
        let seq = sequence(&ts, &[("A", &a), ("B", &b)]);

        for method in [CorrectionMethod::Default, CorrectionMethod::Old] {
            let config = JitterConfig::new(1.0, 4.0).with_method(method);
            let (out, report) = correct_jitter(&seq, &config).unwrap();
            assert_eq!(xs(&out, "A"), a);
            assert_eq!(xs(&out, "B"), b);
            assert_eq!(report.realigned_points, 0);
            assert_eq!(report.jumps, 0);
            assert_eq!(report.twitches, 0);
            assert_eq!(report.flags.count(), 0);
        }
    }

    #[test]
    fn test_invalid_configuration_rejected_before_processing() {
        let seq = sequence(&[0.0, 0.1], &[("A", &[0.0, 0.0])]);
        let err = correct_jitter(&seq, &JitterConfig::new(-1.0, 3.0)).unwrap_err();
        assert!(err.is_configuration());
        let err = correct_jitter(&seq, &JitterConfig::new(1.0, 0.0)).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_tied_timestamps_are_fatal() {
        let seq = sequence(&[0.0, 0.1, 0.1], &[("A", &[0.0, 0.0, 1.0])]);
        let err = correct_jitter(&seq, &JitterConfig::new(1.0, 3.0)).unwrap_err();
        assert!(matches!(err, CorrectionError::ZeroDelay(_)));
    }

    // ========================================================================
    // TWITCH / JUMP CLASSIFICATION
    // ========================================================================

    #[test]
    fn test_multi_frame_twitch_is_linear_in_time() {
        // Irregular timestamps: interpolation follows time, not pose index
        let ts = [0.0, 0.1, 0.15, 0.3, 0.32, 0.5];
        let seq = sequence(&ts, &[("A", &[0.0, 0.0, 2.0, 2.1, 0.03, 0.035])]);
        let (out, report) = correct_jitter(&seq, &JitterConfig::new(1.0, 4.0)).unwrap();

        let x = xs(&out, "A");
        // Line from pose 1 (0.0 at 0.1s) to pose 4 (0.03 at 0.32s)
        for i in 2..4 {
            let t = (ts[i] - 0.1) / (0.32 - 0.1);
            assert!((x[i] - 0.03 * t).abs() < EPS, "pose {}: {}", i, x[i]);
        }
        assert_eq!(x[4], 0.03);
        assert_eq!(report.twitches, 1);
        assert_eq!(report.realigned_points, 2);
    }

    #[test]
    fn test_jump_interpolates_to_window_end() {
        let ts = evenly(8, 0.1);
        let seq = sequence(&ts, &[("A", &[0.0, 0.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0])]);
        // The ramp left by the fill (3.3 m/s) stays under the threshold
        let (out, report) = correct_jitter(&seq, &JitterConfig::new(5.0, 3.0)).unwrap();

        // Window from pose 2 covers poses 2..=4, pose 4 ends the jump
        let x = xs(&out, "A");
        assert!((x[2] - 1.0 / 3.0).abs() < EPS);
        assert!((x[3] - 2.0 / 3.0).abs() < EPS);
        assert_eq!(x[4], 1.0);
        assert_eq!(&x[5..], &[1.0, 1.0, 1.0]);
        assert_eq!(report.jumps, 1);
        assert_eq!(report.twitches, 0);
        assert_eq!(report.realigned_points, 2);
    }

    #[test]
    fn test_jump_at_end_of_sequence() {
        let ts = evenly(5, 0.1);
        let seq = sequence(&ts, &[("A", &[0.0, 0.0, 0.0, 5.0, 5.0])]);
        let (out, report) = correct_jitter(&seq, &JitterConfig::new(1.0, 10.0)).unwrap();

        let x = xs(&out, "A");
        assert!((x[3] - 2.5).abs() < EPS);
        assert_eq!(x[4], 5.0);
        assert_eq!(report.jumps, 1);
    }

    #[test]
    fn test_last_pose_is_always_accepted() {
        let ts = evenly(4, 0.1);
        let seq = sequence(&ts, &[("A", &[0.0, 0.0, 0.0, 9.0])]);
        let (out, report) = correct_jitter(&seq, &JitterConfig::new(1.0, 3.0)).unwrap();
        assert_eq!(xs(&out, "A")[3], 9.0);
        assert_eq!(report.flags.count(), 0);
    }

    #[test]
    fn test_window_of_one_holds_previous_value() {
        let ts = evenly(5, 0.1);
        let seq = sequence(&ts, &[("A", &[0.0, 0.0, 4.0, 0.0, 0.0])]);
        let (out, report) = correct_jitter(&seq, &JitterConfig::new(1.0, 1.0)).unwrap();

        let x = xs(&out, "A");
        assert_eq!(x, vec![0.0, 0.0, 0.0, 0.0, 0.0]);
        assert_eq!(report.realigned_points, 0);
        assert_eq!(report.jumps + report.twitches, 0);
        assert!(out.poses()[2].joints()[0].flagged_over_threshold);
        assert!(!out.poses()[2].joints()[0].corrected);
    }

    #[test]
    fn test_huge_pose_window_behaves_like_whole_sequence() {
        let seq = sequence(
            &[0.0, 0.1, 0.2, 0.3, 0.4],
            &[("A", &[0.0, 0.01, 5.0, 0.02, 0.03])],
        );
        let (whole, whole_report) = correct_jitter(&seq, &JitterConfig::new(1.0, 100.0)).unwrap();
        let (huge, huge_report) = correct_jitter(&seq, &JitterConfig::new(1.0, 1e20)).unwrap();

        let x = xs(&huge, "A");
        assert!((x[2] - 0.015).abs() < EPS, "got {}", x[2]);
        assert_eq!(huge_report.twitches, 1);
        assert_eq!(x, xs(&whole, "A"));
        assert_eq!(huge_report.realigned_points, whole_report.realigned_points);
    }

    #[test]
    fn test_hold_copies_corrected_anchor() {
        // 0.3s window: two poses from pose 1, a single pose from pose 2
        let ts = [0.0, 0.1, 0.15, 0.5, 0.6];
        let seq = sequence(&ts, &[("A", &[0.0, 0.0, 5.0, 1.0, 1.0])]);
        let config = JitterConfig::new(1.0, 0.3).with_unit(WindowUnit::Seconds);

        let (steps, _) = trace(&seq, &config);
        assert_eq!(
            steps,
            vec![
                Step::Accepted,
                Step::Jump { start: 1, end: 3 },
                Step::Held,
                Step::Accepted,
            ]
        );

        // Pose 3 takes the interpolated value at pose 2, not the 5.0 spike
        let (out, report) = correct_jitter(&seq, &config).unwrap();
        let x = xs(&out, "A");
        assert!((x[2] - 0.125).abs() < EPS, "got {}", x[2]);
        assert_eq!(x[3], x[2]);
        assert_eq!(x[4], 1.0);
        assert_eq!(report.jumps, 1);
        assert_eq!(report.realigned_points, 1);
        let held = &out.poses()[3].joints()[0];
        assert!(held.flagged_over_threshold);
        assert!(!held.corrected);
    }

    #[test]
    fn test_strategies_diverge_on_slow_drift_back() {
        // Spike at pose 2, then drifts back slowly. Measured against the
        // anchor delay (0.1s) the return at pose 4 is still too fast; measured
        // against the real elapsed time (0.3s) it is not.
        let ts = evenly(7, 0.1);
        let seq = sequence(&ts, &[("A", &[0.0, 0.0, 3.0, 1.0, 0.25, 0.25, 0.25])]);

        let old = JitterConfig::new(1.0, 4.0).with_method(CorrectionMethod::Old);
        let (_, old_report) = correct_jitter(&seq, &old).unwrap();
        assert_eq!(old_report.twitches, 1);
        assert_eq!(old_report.jumps, 0);

        let default = JitterConfig::new(1.0, 4.0);
        let (_, default_report) = correct_jitter(&seq, &default).unwrap();
        assert_eq!(default_report.twitches, 0);
        assert_eq!(default_report.jumps, 1);
    }

    // ========================================================================
    // NO-OVERCORRECTION AND ANCHOR
    // ========================================================================

    #[test]
    fn test_each_cell_written_once() {
        let ts = evenly(20, 0.1);
        let a = [
            0.0, 0.0, 3.0, 0.0, 0.0, 2.0, 2.0, 2.0, 2.0, 2.0, 2.0, 0.0, 5.0, 0.0, 6.0, 0.0, 0.0,
            0.0, 4.0, 4.0,
        ];
        let seq = sequence(&ts, &[("A", &a)]);

        for method in [CorrectionMethod::Default, CorrectionMethod::Old] {
            let config = JitterConfig::new(1.0, 3.0).with_method(method);
            let (steps, writes) = trace(&seq, &config);
            assert!(writes.iter().all(|&w| w == 1), "{:?} {:?}", method, writes);
            assert!(steps.iter().any(|s| *s == Step::AlreadyFilled));
        }
    }

    #[test]
    fn test_filled_poses_are_skipped() {
        let ts = evenly(6, 0.1);
        let seq = sequence(&ts, &[("A", &[0.0, 0.0, 5.0, 5.0, 0.0, 0.0])]);
        let (steps, _) = trace(&seq, &JitterConfig::new(1.0, 4.0));
        assert_eq!(
            steps,
            vec![
                Step::Accepted,
                Step::Twitch { start: 1, end: 4 },
                Step::AlreadyFilled,
                Step::Accepted,
                Step::Accepted,
            ]
        );
    }

    #[test]
    fn test_anchor_never_moves_back_over_corrected_source() {
        // Pose 3 was corrected by an earlier pass and sits inside the window
        let ts = evenly(7, 0.1);
        let a = [0.0, 0.0, 5.0, 5.0, 5.0, 0.0, 0.0];
        let poses = ts
            .iter()
            .zip(a)
            .enumerate()
            .map(|(p, (&t, x))| {
                let mut joint = Joint::new("A", Point3D::new(x, 0.0, 0.0));
                joint.corrected = p == 3;
                let mut pose = Pose::new(t);
                pose.add_joint(joint);
                pose
            })
            .collect();
        let seq = Sequence::new(poses).unwrap();
        let config = JitterConfig::new(1.0, 5.0);

        let (steps, writes) = trace(&seq, &config);
        assert_eq!(
            steps,
            vec![
                Step::Accepted,
                Step::Twitch { start: 1, end: 5 },
                Step::AlreadyFilled,
                Step::AlreadyFilled,
                Step::Accepted,
                Step::Accepted,
            ]
        );
        assert!(writes.iter().all(|&w| w == 1), "{:?}", writes);

        let (out, report) = correct_jitter(&seq, &config).unwrap();
        let x = xs(&out, "A");
        assert_eq!(x, vec![0.0, 0.0, 0.0, 5.0, 0.0, 0.0, 0.0]);
        assert!(out.poses()[3].joints()[0].corrected);
        assert_eq!(report.realigned_points, 2);
    }

    #[test]
    fn test_boundaries_hold_anchor_and_source() {
        let ts = [0.0, 0.1, 0.2, 0.35, 0.4, 0.55, 0.6];
        let seq = sequence(&ts, &[("A", &[0.5, 0.5, 9.0, 9.0, 9.0, 0.6, 0.6])]);
        let config = JitterConfig::new(1.0, 5.0).with_method(CorrectionMethod::Old);
        let (out, _) = correct_jitter(&seq, &config).unwrap();
        let x = xs(&out, "A");

        // Window [1, 5]: start keeps the anchor, end keeps the raw value
        assert_eq!(x[1], 0.5);
        assert_eq!(x[5], 0.6);
        for i in 2..5 {
            let t = (ts[i] - ts[1]) / (ts[5] - ts[1]);
            assert!((x[i] - (0.5 + t * 0.1)).abs() < EPS);
        }
    }

    // ========================================================================
    // TIME WINDOWS
    // ========================================================================

    #[test]
    fn test_window_in_seconds_matches_poses() {
        let ts = evenly(10, 0.1);
        let a = [0.0, 0.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0];
        let seq = sequence(&ts, &[("A", &a)]);

        let poses = JitterConfig::new(0.5, 3.0);
        let secs = JitterConfig::new(0.5, 0.3).with_unit(WindowUnit::Seconds);
        let millis = JitterConfig::new(0.5, 300.0).with_unit(WindowUnit::Milliseconds);

        let (by_poses, _) = correct_jitter(&seq, &poses).unwrap();
        let (by_secs, _) = correct_jitter(&seq, &secs).unwrap();
        let (by_millis, _) = correct_jitter(&seq, &millis).unwrap();
        assert_eq!(xs(&by_poses, "A"), xs(&by_secs, "A"));
        assert_eq!(xs(&by_secs, "A"), xs(&by_millis, "A"));
    }

    #[test]
    fn test_time_window_picks_closest_boundary() {
        let ts = [0.0, 0.25, 0.5, 0.75, 1.25, 1.5, 1.75];
        let seq = sequence(&ts, &[("A", &[0.0; 7])]);
        let window_at = |span: f64, accepted: usize| {
            let config = JitterConfig::new(1.0, span).with_unit(WindowUnit::Seconds);
            let window = config.resolve_window().unwrap();
            let mut corrector = JointCorrector::new(&seq, 0, &config, window);
            for p in 1..=accepted {
                assert_eq!(corrector.step(p).unwrap(), Step::Accepted);
            }
            corrector.window_poses(accepted + 1)
        };

        // 0.8s from pose 0: pose 3 (0.75s) is closer than pose 4 (1.25s)
        assert_eq!(window_at(0.8, 0), 3);
        // 1.0s from pose 0: tie between 0.75s and 1.25s goes to the longer window
        assert_eq!(window_at(1.0, 0), 4);
        // 1.0s from pose 1 (0.25s): pose 4 sits exactly on the boundary
        assert_eq!(window_at(1.0, 1), 3);
        // Longer than the recording: runs to the last pose
        assert_eq!(window_at(5.0, 0), 6);
    }

    // ========================================================================
    // OPTIONS
    // ========================================================================

    #[test]
    fn test_disabled_twitch_correction_keeps_raw() {
        let seq = sequence(
            &[0.0, 0.1, 0.2, 0.3, 0.4],
            &[("A", &[0.0, 0.01, 5.0, 0.02, 0.03])],
        );
        let mut config = JitterConfig::new(1.0, 2.0);
        config.correct_twitches = false;
        let (out, report) = correct_jitter(&seq, &config).unwrap();

        assert_eq!(xs(&out, "A")[2], 5.0);
        assert_eq!(report.twitches, 0);
        assert_eq!(report.skipped_twitches, 1);
        assert!(report.flags.contains("A", 2));
    }

    #[test]
    fn test_disabled_jump_correction_keeps_raw() {
        let ts = evenly(8, 0.1);
        let seq = sequence(&ts, &[("A", &[0.0, 0.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0])]);
        let mut config = JitterConfig::new(5.0, 3.0);
        config.correct_jumps = false;
        let (out, report) = correct_jitter(&seq, &config).unwrap();

        assert_eq!(xs(&out, "A"), xs(&seq, "A"));
        assert_eq!(report.skipped_jumps, 1);
        assert_eq!(report.jumps, 0);
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let ts = evenly(30, 0.05);
        let a: Vec<f64> = (0..30).map(|i| if i % 7 == 3 { 2.0 } else { 0.01 * i as f64 }).collect();
        let b: Vec<f64> = (0..30).map(|i| if i >= 12 { 1.5 } else { 0.0 }).collect();
        let c: Vec<f64> = (0..30).map(|i| 0.02 * i as f64).collect();
        let seq = sequence(&ts, &[("A", &a), ("B", &b), ("C", &c)]);

        let sequential = JitterConfig::new(1.0, 3.0);
        let mut parallel = sequential.clone();
        parallel.parallel = true;

        let (s_out, s_report) = correct_jitter(&seq, &sequential).unwrap();
        let (p_out, p_report) = correct_jitter(&seq, &parallel).unwrap();
        assert_eq!(s_out, p_out);
        assert_eq!(s_report, p_report);
    }

    #[test]
    fn test_parallel_matches_sequential_with_many_joints() {
        let ts = evenly(40, 1.0 / 30.0);
        let labels: Vec<String> = (0..64).map(|j| format!("J{:02}", j)).collect();
        let series: Vec<Vec<f64>> = (0..64)
            .map(|j| {
                (0..40)
                    .map(|i| match (i + j) % 11 {
                        5 => 1.0 + 0.01 * j as f64,
                        _ => 0.0001 * (i * j) as f64,
                    })
                    .collect()
            })
            .collect();
        let columns: Vec<(&str, &[f64])> = labels
            .iter()
            .zip(&series)
            .map(|(l, s)| (l.as_str(), s.as_slice()))
            .collect();
        let seq = sequence(&ts, &columns);

        let sequential = JitterConfig::new(1.0, 4.0);
        let mut parallel = sequential.clone();
        parallel.parallel = true;

        let (s_out, s_report) = correct_jitter(&seq, &sequential).unwrap();
        let (p_out, p_report) = correct_jitter(&seq, &parallel).unwrap();
        assert!(s_report.twitches > 0);
        assert_eq!(s_out, p_out);
        assert_eq!(s_report, p_report);
    }

    #[test]
    fn test_worker_chunks_cover_columns_in_order() {
        for (columns, workers) in [(64, 8), (64, 7), (3, 16), (1, 4), (10, 1)] {
            let chunks = worker_chunks(columns, workers);
            assert!(chunks.len() <= workers);
            assert_eq!(chunks.first().map(|c| c.start), Some(0));
            assert_eq!(chunks.last().map(|c| c.end), Some(columns));
            assert!(chunks.windows(2).all(|w| w[0].end == w[1].start));
            assert!(chunks.iter().all(|c| !c.is_empty()));
        }
        assert!(worker_chunks(0, 4).is_empty());
    }

    #[test]
    fn test_spline_method_rebuilds_corrected_cells() {
        let ts = evenly(8, 0.1);
        let seq = sequence(
            &ts,
            &[("A", &[0.1, 0.11, 0.12, 4.0, 0.14, 0.15, 0.16, 0.17])],
        );
        let config = JitterConfig::new(1.0, 3.0)
            .with_method(CorrectionMethod::Spline(InterpolationKind::Cubic));
        let (out, report) = correct_jitter(&seq, &config).unwrap();

        let zeros = report.zeros.as_ref().expect("gap-fill report");
        assert_eq!(zeros.origin_cells, 1);
        assert!(zeros.rebuilt);
        // Linear data stays linear through the cubic rebuild
        assert!((xs(&out, "A")[3] - 0.13).abs() < 1e-9);
        assert_eq!(out.name(), Some("+CJ +CZ"));
        assert_eq!(out.processing_steps().len(), 2);
    }

    #[test]
    fn test_output_named_after_source() {
        let mut seq = sequence(&[0.0, 0.1], &[("A", &[0.0, 0.0])]);
        seq.set_name("subject01");
        let (out, _) = correct_jitter(&seq, &JitterConfig::new(1.0, 3.0)).unwrap();
        assert_eq!(out.name(), Some("subject01 +CJ"));
        assert!(matches!(
            out.processing_steps()[0],
            ProcessingStep::CorrectJitter { correct_jumps: true, .. }
        ));
    }
}
