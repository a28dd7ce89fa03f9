//! Resampling of irregularly sampled series.
//!
//! [`interpolate`] evaluates a series known at `sample_times` on arbitrary
//! `target_times`. Every blending kind is stored as one Hermite polynomial per
//! segment (`y_i + b*dx + c*dx^2 + d*dx^3`), so a constant or linear input is
//! reproduced without rounding drift at the knots. Step kinds copy a sample.
//!
//! | Kind       | Slopes at knots                         | Extrapolates |
//! |------------|-----------------------------------------|--------------|
//! | linear     | secant (alias `slinear`)                | no           |
//! | quadratic  | C1 quadratic, first two segments shared | no           |
//! | cubic      | C2 spline, not-a-knot ends              | yes          |
//! | pchip      | Fritsch-Carlson, shape preserving       | yes          |
//! | akima      | Akima weighted slopes, local            | no           |
//! | nearest    | step, ties to the earlier sample        | no           |
//! | nearest-up | step, ties to the later sample          | no           |
//! | previous   | step, last sample at or before (`zero`) | no           |
//! | next       | step, first sample at or after          | no           |
//! | take       | nearest sample, no blending             | no           |

use crate::error::{CorrectionError, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Minimum number of samples for the cubic family before falling back to linear.
const CUBIC_MIN_SAMPLES: usize = 4;
/// Same for the quadratic spline.
const QUADRATIC_MIN_SAMPLES: usize = 3;

/// Alternative names accepted when parsing.
const ALIASES: [(&str, InterpolationKind); 2] = [
    ("slinear", InterpolationKind::Linear),
    ("zero", InterpolationKind::Previous),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterpolationKind {
    #[serde(alias = "slinear")]
    Linear,
    Quadratic,
    Cubic,
    /// Monotonic cubic that flattens at local extrema
    Pchip,
    /// Monotonic-leaning cubic with locally weighted slopes
    Akima,
    Nearest,
    #[serde(rename = "nearest-up")]
    NearestUp,
    /// Zero-order hold
    #[serde(alias = "zero")]
    Previous,
    Next,
    /// Nearest-sample decimation
    Take,
}

impl InterpolationKind {
    pub const ALL: [InterpolationKind; 10] = [
        InterpolationKind::Linear,
        InterpolationKind::Quadratic,
        InterpolationKind::Cubic,
        InterpolationKind::Pchip,
        InterpolationKind::Akima,
        InterpolationKind::Nearest,
        InterpolationKind::NearestUp,
        InterpolationKind::Previous,
        InterpolationKind::Next,
        InterpolationKind::Take,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            InterpolationKind::Linear => "linear",
            InterpolationKind::Quadratic => "quadratic",
            InterpolationKind::Cubic => "cubic",
            InterpolationKind::Pchip => "pchip",
            InterpolationKind::Akima => "akima",
            InterpolationKind::Nearest => "nearest",
            InterpolationKind::NearestUp => "nearest-up",
            InterpolationKind::Previous => "previous",
            InterpolationKind::Next => "next",
            InterpolationKind::Take => "take",
        }
    }

    pub fn is_cubic_family(&self) -> bool {
        matches!(
            self,
            InterpolationKind::Cubic | InterpolationKind::Pchip | InterpolationKind::Akima
        )
    }

    /// Kinds that copy a sample value instead of blending neighbours.
    pub fn is_step(&self) -> bool {
        matches!(
            self,
            InterpolationKind::Nearest
                | InterpolationKind::NearestUp
                | InterpolationKind::Previous
                | InterpolationKind::Next
                | InterpolationKind::Take
        )
    }

    /// Samples needed before falling back to linear.
    pub fn min_samples(&self) -> usize {
        match self {
            InterpolationKind::Quadratic => QUADRATIC_MIN_SAMPLES,
            k if k.is_cubic_family() => CUBIC_MIN_SAMPLES,
            _ => 2,
        }
    }

    pub fn allows_extrapolation(&self) -> bool {
        matches!(self, InterpolationKind::Cubic | InterpolationKind::Pchip)
    }
}

impl fmt::Display for InterpolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InterpolationKind {
    type Err = CorrectionError;

    fn from_str(s: &str) -> Result<Self> {
        let name = s.trim();
        InterpolationKind::ALL
            .into_iter()
            .map(|k| (k.as_str(), k))
            .chain(ALIASES)
            .find(|(known, _)| known.eq_ignore_ascii_case(name))
            .map(|(_, k)| k)
            .ok_or_else(|| CorrectionError::UnknownSplineKind(s.to_string()))
    }
}

/// Interpolates `values` sampled at `sample_times` onto `target_times`.
///
/// `sample_times` must be strictly increasing with at least two points. The
/// cubic family needs four points and the quadratic spline three; both fall
/// back to linear below that. Targets outside the sampled range are rejected
/// unless `kind` extrapolates.
pub fn interpolate(
    values: &[f64],
    sample_times: &[f64],
    target_times: &[f64],
    kind: InterpolationKind,
) -> Result<Vec<f64>> {
    if values.len() != sample_times.len() {
        return Err(CorrectionError::LengthMismatch {
            values: values.len(),
            times: sample_times.len(),
        });
    }
    if sample_times.len() < 2 {
        return Err(CorrectionError::TooFewSamples {
            kind: kind.as_str(),
            needed: 2,
            got: sample_times.len(),
        });
    }
    if let Some(i) = (1..sample_times.len()).find(|&i| sample_times[i] <= sample_times[i - 1]) {
        return Err(CorrectionError::NotStrictlyIncreasing(i));
    }

    let kind = if sample_times.len() < kind.min_samples() {
        warn!(
            "[Interp] {} needs {} samples, got {}: falling back to linear",
            kind,
            kind.min_samples(),
            sample_times.len()
        );
        InterpolationKind::Linear
    } else {
        kind
    };

    let start = sample_times[0];
    let end = sample_times[sample_times.len() - 1];
    if !kind.allows_extrapolation() {
        if let Some(&time) = target_times.iter().find(|&&t| t < start || t > end) {
            return Err(CorrectionError::OutOfRange { time, start, end });
        }
    }

    if kind.is_step() {
        return Ok(target_times
            .iter()
            .map(|&t| values[step_index(sample_times, t, kind)])
            .collect());
    }

    let slopes = match kind {
        InterpolationKind::Quadratic => quadratic_slopes(values, sample_times),
        InterpolationKind::Cubic => spline_slopes(values, sample_times),
        InterpolationKind::Pchip => pchip_slopes(values, sample_times),
        InterpolationKind::Akima => akima_slopes(values, sample_times),
        _ => linear_slopes(values, sample_times),
    };
    let curve = HermiteCurve::new(values, sample_times, &slopes, kind == InterpolationKind::Linear);

    Ok(target_times.iter().map(|&t| curve.eval(t)).collect())
}

/// Index of the segment `[x_i, x_i+1]` holding `t`, clamped to the end segments.
fn segment_index(xs: &[f64], t: f64) -> usize {
    xs.partition_point(|&x| x <= t)
        .saturating_sub(1)
        .min(xs.len() - 2)
}

/// Sample copied by a step kind at `t`, which lies inside the sampled range.
fn step_index(xs: &[f64], t: f64, kind: InterpolationKind) -> usize {
    let last = xs.len() - 1;
    match kind {
        InterpolationKind::Previous => xs.partition_point(|&x| x <= t).saturating_sub(1),
        InterpolationKind::Next => xs.partition_point(|&x| x < t).min(last),
        _ => {
            let i = segment_index(xs, t);
            let (before, after) = (t - xs[i], xs[i + 1] - t);
            let earlier = match kind {
                InterpolationKind::NearestUp => before < after,
                _ => before <= after,
            };
            if earlier {
                i
            } else {
                i + 1
            }
        }
    }
}

fn secants(ys: &[f64], xs: &[f64]) -> Vec<f64> {
    xs.windows(2)
        .zip(ys.windows(2))
        .map(|(x, y)| (y[1] - y[0]) / (x[1] - x[0]))
        .collect()
}

// ============================================================================
// PIECEWISE HERMITE EVALUATION
// ============================================================================

struct HermiteCurve<'a> {
    xs: &'a [f64],
    ys: &'a [f64],
    /// Per segment: (b, c, d)
    coeffs: Vec<(f64, f64, f64)>,
}

impl<'a> HermiteCurve<'a> {
    fn new(ys: &'a [f64], xs: &'a [f64], slopes: &[f64], linear: bool) -> Self {
        let coeffs = (0..xs.len() - 1)
            .map(|i| {
                let h = xs[i + 1] - xs[i];
                let m = (ys[i + 1] - ys[i]) / h;
                if linear {
                    (m, 0.0, 0.0)
                } else {
                    let c = (3.0 * m - 2.0 * slopes[i] - slopes[i + 1]) / h;
                    let d = (slopes[i] + slopes[i + 1] - 2.0 * m) / (h * h);
                    (slopes[i], c, d)
                }
            })
            .collect();
        HermiteCurve { xs, ys, coeffs }
    }

    fn eval(&self, t: f64) -> f64 {
        let i = segment_index(self.xs, t);
        let dx = t - self.xs[i];
        let (b, c, d) = self.coeffs[i];
        self.ys[i] + dx * (b + dx * (c + dx * d))
    }
}

// ============================================================================
// KNOT SLOPES
// ============================================================================

fn linear_slopes(ys: &[f64], xs: &[f64]) -> Vec<f64> {
    let mut slopes = secants(ys, xs);
    slopes.push(0.0);
    slopes
}

/// Knot slopes of the C1 quadratic spline through every sample. Each segment
/// is a parabola, so consecutive slopes average to the segment secant; the
/// first two segments share one parabola, which fixes the first slope.
fn quadratic_slopes(ys: &[f64], xs: &[f64]) -> Vec<f64> {
    let h: Vec<f64> = xs.windows(2).map(|w| w[1] - w[0]).collect();
    let m = secants(ys, xs);

    let mut slopes = Vec::with_capacity(xs.len());
    slopes.push(((2.0 * h[0] + h[1]) * m[0] - h[0] * m[1]) / (h[0] + h[1]));
    for (i, &secant) in m.iter().enumerate() {
        slopes.push(2.0 * secant - slopes[i]);
    }
    slopes
}

/// First derivatives of the C2 cubic spline with not-a-knot end conditions.
///
/// Solves for second derivatives `M` with the end rows folded into the first
/// and last interior equations, which keeps the system tridiagonal.
fn spline_slopes(ys: &[f64], xs: &[f64]) -> Vec<f64> {
    let n = xs.len();
    let h: Vec<f64> = xs.windows(2).map(|w| w[1] - w[0]).collect();
    let m = secants(ys, xs);

    // Unknowns M_1..M_{n-2}
    let size = n - 2;
    let mut lower = vec![0.0; size];
    let mut diag = vec![0.0; size];
    let mut upper = vec![0.0; size];
    let mut rhs = vec![0.0; size];
    for row in 0..size {
        let i = row + 1;
        lower[row] = h[i - 1];
        diag[row] = 2.0 * (h[i - 1] + h[i]);
        upper[row] = h[i];
        rhs[row] = 6.0 * (m[i] - m[i - 1]);
    }

    // M_0 = ((h0 + h1) M_1 - h0 M_2) / h1
    let (h0, h1) = (h[0], h[1]);
    diag[0] += h0 * (h0 + h1) / h1;
    upper[0] -= h0 * h0 / h1;

    // M_{n-1} = ((a + b) M_{n-2} - b M_{n-3}) / a
    let (a, b) = (h[n - 3], h[n - 2]);
    diag[size - 1] += b * (a + b) / a;
    lower[size - 1] -= b * b / a;

    let inner = solve_tridiagonal(&lower, &diag, &upper, &rhs);

    let mut second = Vec::with_capacity(n);
    second.push(((h0 + h1) * inner[0] - h0 * inner[1]) / h1);
    second.extend_from_slice(&inner);
    second.push(((a + b) * inner[size - 1] - b * inner[size - 2]) / a);

    let mut slopes: Vec<f64> = (0..n - 1)
        .map(|i| m[i] - h[i] * (2.0 * second[i] + second[i + 1]) / 6.0)
        .collect();
    slopes.push(m[n - 2] + h[n - 2] * (second[n - 2] + 2.0 * second[n - 1]) / 6.0);
    slopes
}

/// Thomas algorithm. `lower[0]` and `upper[last]` are ignored.
fn solve_tridiagonal(lower: &[f64], diag: &[f64], upper: &[f64], rhs: &[f64]) -> Vec<f64> {
    let n = diag.len();
    let mut c = vec![0.0; n];
    let mut d = vec![0.0; n];

    c[0] = upper[0] / diag[0];
    d[0] = rhs[0] / diag[0];
    for i in 1..n {
        let denom = diag[i] - lower[i] * c[i - 1];
        c[i] = if i + 1 < n { upper[i] / denom } else { 0.0 };
        d[i] = (rhs[i] - lower[i] * d[i - 1]) / denom;
    }

    let mut x = vec![0.0; n];
    x[n - 1] = d[n - 1];
    for i in (0..n - 1).rev() {
        x[i] = d[i] - c[i] * x[i + 1];
    }
    x
}

fn pchip_slopes(ys: &[f64], xs: &[f64]) -> Vec<f64> {
    let n = xs.len();
    let h: Vec<f64> = xs.windows(2).map(|w| w[1] - w[0]).collect();
    let m = secants(ys, xs);

    let mut slopes = vec![0.0; n];
    for k in 1..n - 1 {
        let (m0, m1) = (m[k - 1], m[k]);
        if m0 == 0.0 || m1 == 0.0 || m0.signum() != m1.signum() {
            continue;
        }
        let w1 = 2.0 * h[k] + h[k - 1];
        let w2 = h[k] + 2.0 * h[k - 1];
        slopes[k] = (w1 + w2) / (w1 / m0 + w2 / m1);
    }
    slopes[0] = pchip_edge(h[0], h[1], m[0], m[1]);
    slopes[n - 1] = pchip_edge(h[n - 2], h[n - 3], m[n - 2], m[n - 3]);
    slopes
}

/// One-sided three-point end slope, limited to keep the end segment monotone.
fn pchip_edge(h0: f64, h1: f64, m0: f64, m1: f64) -> f64 {
    let d = ((2.0 * h0 + h1) * m0 - h0 * m1) / (h0 + h1);
    if d.signum() != m0.signum() || m0 == 0.0 {
        0.0
    } else if m0.signum() != m1.signum() && d.abs() > 3.0 * m0.abs() {
        3.0 * m0
    } else {
        d
    }
}

fn akima_slopes(ys: &[f64], xs: &[f64]) -> Vec<f64> {
    let n = xs.len();
    let m = secants(ys, xs);

    // Two ghost secants on each side, extrapolated linearly
    let mut ext = Vec::with_capacity(n + 3);
    let left1 = 2.0 * m[0] - m[1];
    let left2 = 2.0 * left1 - m[0];
    ext.push(left2);
    ext.push(left1);
    ext.extend_from_slice(&m);
    let right1 = 2.0 * m[n - 2] - m[n - 3];
    let right2 = 2.0 * right1 - m[n - 2];
    ext.push(right1);
    ext.push(right2);

    (0..n)
        .map(|i| {
            let w1 = (ext[i + 3] - ext[i + 2]).abs();
            let w2 = (ext[i + 1] - ext[i]).abs();
            if w1 + w2 == 0.0 {
                0.5 * (ext[i + 1] + ext[i + 2])
            } else {
                (w1 * ext[i + 1] + w2 * ext[i + 2]) / (w1 + w2)
            }
        })
        .collect()
}
