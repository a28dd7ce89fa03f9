use crate::error::{CorrectionError, Result};
use crate::interpolation::InterpolationKind;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CorrectionConfig {
    pub jitter: JitterConfig,
    pub zeros: ZeroConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JitterConfig {
    pub velocity_threshold: f64, // m/s
    pub window: f64,
    pub window_unit: WindowUnit,
    pub method: CorrectionMethod,
    pub correct_twitches: bool,
    pub correct_jumps: bool,
    pub parallel: bool, // one scoped thread per joint
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZeroConfig {
    pub enabled: bool, // run as a separate pass in the pipeline
    pub spline_kind: InterpolationKind,
    pub min_duration_warning: f64, // seconds
}

impl Default for JitterConfig {
    fn default() -> Self {
        JitterConfig {
            velocity_threshold: 0.5, // Kinect-class recordings: 0.1 to 1 m/s
            window: 3.0,             // 3-5 poses at 10-15 fps
            window_unit: WindowUnit::Poses,
            method: CorrectionMethod::Default,
            correct_twitches: true,
            correct_jumps: true,
            parallel: false,
        }
    }
}

impl Default for ZeroConfig {
    fn default() -> Self {
        ZeroConfig {
            enabled: false,
            spline_kind: InterpolationKind::Cubic,
            min_duration_warning: 0.1,
        }
    }
}

impl CorrectionConfig {
    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: CorrectionConfig = serde_json::from_str(&text)
            .with_context(|| format!("Invalid config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks every parameter before any pose is processed.
    pub fn validate(&self) -> Result<()> {
        self.jitter.resolve_window()?;
        Ok(())
    }
}

impl JitterConfig {
    pub fn new(velocity_threshold: f64, window: f64) -> Self {
        JitterConfig {
            velocity_threshold,
            window,
            ..Default::default()
        }
    }

    pub fn with_unit(mut self, unit: WindowUnit) -> Self {
        self.window_unit = unit;
        self
    }

    pub fn with_method(mut self, method: CorrectionMethod) -> Self {
        self.method = method;
        self
    }

    /// Validates the parameters and converts the window to poses or seconds.
    pub fn resolve_window(&self) -> Result<Window> {
        if !(self.velocity_threshold > 0.0) || !self.velocity_threshold.is_finite() {
            return Err(CorrectionError::InvalidThreshold(self.velocity_threshold));
        }
        if !(self.window > 0.0) || !self.window.is_finite() {
            return Err(CorrectionError::InvalidWindow(self.window));
        }
        match self.window_unit {
            WindowUnit::Poses => {
                if self.window.fract() != 0.0 {
                    return Err(CorrectionError::FractionalPoseWindow(self.window));
                }
                Ok(Window::Poses(self.window as usize))
            }
            WindowUnit::Milliseconds => Ok(Window::Seconds(self.window / 1000.0)),
            WindowUnit::Seconds => Ok(Window::Seconds(self.window)),
        }
    }
}

/// Lookahead window after unit conversion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Window {
    Poses(usize),
    Seconds(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WindowUnit {
    #[serde(rename = "poses", alias = "pose")]
    Poses,
    #[serde(rename = "ms")]
    Milliseconds,
    #[serde(rename = "s")]
    Seconds,
}

impl FromStr for WindowUnit {
    type Err = CorrectionError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "poses" | "pose" => Ok(WindowUnit::Poses),
            "ms" => Ok(WindowUnit::Milliseconds),
            "s" => Ok(WindowUnit::Seconds),
            _ => Err(CorrectionError::UnknownWindowUnit(s.to_string())),
        }
    }
}

/// How the lookahead scan re-estimates velocity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VelocityStrategy {
    /// Anchor to lookahead distance over anchor to lookahead delay.
    Subsequent,
    /// Anchor to lookahead distance over the delay between the anchor and the
    /// pose right after it, whatever the lookahead distance in time.
    AnchorDistanceOverAnchorDelay,
}

/// Correction method: `old`, `default`, or a spline kind. A spline kind
/// resets every interpolated cell to the origin and rebuilds it with a
/// global gap-fill pass using that kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum CorrectionMethod {
    Old,
    Default,
    Spline(InterpolationKind),
}

impl CorrectionMethod {
    pub fn velocity_strategy(&self) -> VelocityStrategy {
        match self {
            CorrectionMethod::Old => VelocityStrategy::Subsequent,
            _ => VelocityStrategy::AnchorDistanceOverAnchorDelay,
        }
    }

    pub fn spline_kind(&self) -> Option<InterpolationKind> {
        match self {
            CorrectionMethod::Spline(kind) => Some(*kind),
            _ => None,
        }
    }
}

impl FromStr for CorrectionMethod {
    type Err = CorrectionError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "old" => Ok(CorrectionMethod::Old),
            "default" => Ok(CorrectionMethod::Default),
            other => other
                .parse::<InterpolationKind>()
                .map(CorrectionMethod::Spline)
                .map_err(|_| CorrectionError::UnknownMethod(s.to_string())),
        }
    }
}

impl TryFrom<String> for CorrectionMethod {
    type Error = CorrectionError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<CorrectionMethod> for String {
    fn from(method: CorrectionMethod) -> String {
        method.to_string()
    }
}

impl fmt::Display for CorrectionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CorrectionMethod::Old => f.write_str("old"),
            CorrectionMethod::Default => f.write_str("default"),
            CorrectionMethod::Spline(kind) => write!(f, "{}", kind),
        }
    }
}
