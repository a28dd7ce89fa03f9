//! Global gap-fill for joints reported at the origin.
//!
//! Sensors report a lost joint as `(0, 0, 0)`. For every joint the valid
//! (non-origin) samples are collected and the whole series is rebuilt by
//! evaluating an interpolant at every pose timestamp.
//!
//! ## Edges
//! - Leading origin run: the first valid sample is repeated at the first pose
//!   timestamp so the interpolant has a left bound.
//! - Trailing origin run: the last valid sample is repeated at the last pose
//!   timestamp.
//! - A joint that is never valid stays at the origin.

use crate::config::ZeroConfig;
use crate::error::Result;
use crate::geometry::Point3D;
use crate::interpolation::interpolate;
use crate::model::{Joint, Sequence};
use crate::report::{ProcessingStep, ZeroReport};
use log::{debug, info, warn};
use std::borrow::Cow;

/// Rebuilds the full series of every joint as soon as one origin cell exists
/// anywhere in the sequence. Returns the source itself when there is nothing
/// to repair.
pub fn correct_zeros<'a>(
    source: &'a Sequence,
    config: &ZeroConfig,
) -> Result<(Cow<'a, Sequence>, ZeroReport)> {
    let labels = source.joint_labels();
    let timestamps = source.timestamps();
    let mut report = ZeroReport {
        total_points: source.len() * labels.len(),
        ..Default::default()
    };

    let mut columns = Vec::with_capacity(labels.len());
    for (column, label) in labels.iter().enumerate() {
        let joints: Vec<&Joint> = (0..source.len())
            .map(|p| source.joint_at(p, column))
            .collect();

        let origin = joints.iter().filter(|j| j.position.is_origin()).count();
        if origin > 0 {
            report.origin_cells += origin;
            report.joints_affected += 1;
            for run in origin_runs(&joints, &timestamps) {
                if run.duration >= config.min_duration_warning {
                    warn!(
                        "[Zeros] {}: (0, 0, 0) for {:.3}s from pose {}",
                        label, run.duration, run.first
                    );
                }
                report.longest_run_s = report.longest_run_s.max(run.duration);
            }
        }

        columns.push(rebuild_column(label, &joints, &timestamps, config)?);
    }

    info!(
        "[Zeros] {} origin point(s) over {} ({:.2}%) in {} joint(s), longest gap {:.3}s",
        report.origin_cells,
        report.total_points,
        report.percentage(),
        report.joints_affected,
        report.longest_run_s
    );

    if report.origin_cells == 0 {
        return Ok((Cow::Borrowed(source), report));
    }

    let mut rebuilt = source.from_columns(columns)?;
    rebuilt.set_name(source.derived_name("+CZ"));
    rebuilt.push_processing_step(ProcessingStep::CorrectZeros {
        spline_kind: config.spline_kind,
    });
    report.rebuilt = true;

    Ok((Cow::Owned(rebuilt), report))
}

struct OriginRun {
    first: usize,
    duration: f64,
}

/// Contiguous origin runs. A run's duration spans from the last valid pose
/// before it to the first valid pose after it, or to the run's own end pose
/// at the sequence edges.
fn origin_runs(joints: &[&Joint], timestamps: &[f64]) -> Vec<OriginRun> {
    let mut runs = Vec::new();
    let mut p = 0;
    while p < joints.len() {
        if !joints[p].position.is_origin() {
            p += 1;
            continue;
        }
        let first = p;
        while p < joints.len() && joints[p].position.is_origin() {
            p += 1;
        }
        let last = p - 1;
        let before = if first > 0 { first - 1 } else { first };
        let after = if p < joints.len() { p } else { last };
        runs.push(OriginRun {
            first,
            duration: timestamps[after] - timestamps[before],
        });
    }
    runs
}

fn rebuild_column(
    label: &str,
    joints: &[&Joint],
    timestamps: &[f64],
    config: &ZeroConfig,
) -> Result<Vec<Joint>> {
    let n = joints.len();
    let mut times: Vec<f64> = Vec::with_capacity(n + 2);
    let mut points: Vec<Point3D> = Vec::with_capacity(n + 2);

    for (p, joint) in joints.iter().enumerate() {
        if joint.position.is_origin() {
            continue;
        }
        if times.last() == Some(&timestamps[p]) {
            debug!("[Zeros] {}: dropping tied sample at pose {}", label, p);
            continue;
        }
        times.push(timestamps[p]);
        points.push(joint.position);
    }

    let (Some(&first), Some(&last)) = (points.first(), points.last()) else {
        warn!("[Zeros] {}: no valid sample, joint stays at (0, 0, 0)", label);
        return Ok(joints.iter().map(|j| (*j).clone()).collect());
    };

    if times[0] > timestamps[0] {
        times.insert(0, timestamps[0]);
        points.insert(0, first);
    }
    if times[times.len() - 1] < timestamps[n - 1] {
        times.push(timestamps[n - 1]);
        points.push(last);
    }

    if times.len() < 2 {
        return Ok(joints.iter().map(|j| j.corrected_to(first)).collect());
    }

    let xs: Vec<f64> = points.iter().map(|p| p.x).collect();
    let ys: Vec<f64> = points.iter().map(|p| p.y).collect();
    let zs: Vec<f64> = points.iter().map(|p| p.z).collect();
    let new_x = interpolate(&xs, &times, timestamps, config.spline_kind)?;
    let new_y = interpolate(&ys, &times, timestamps, config.spline_kind)?;
    let new_z = interpolate(&zs, &times, timestamps, config.spline_kind)?;

    Ok(joints
        .iter()
        .enumerate()
        .map(|(p, joint)| {
            let position = Point3D::new(new_x[p], new_y[p], new_z[p]);
            if joint.position.is_origin() {
                joint.corrected_to(position)
            } else {
                Joint {
                    position,
                    ..(*joint).clone()
                }
            }
        })
        .collect())
}
