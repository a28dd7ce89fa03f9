pub mod error;
pub mod geometry;
pub mod model;
pub mod interpolation;
pub mod jitter;
pub mod zeros;
pub mod report;
pub mod config;
pub mod traits;
pub mod storage;
pub mod pipeline;

pub use config::{CorrectionConfig, CorrectionMethod, JitterConfig, WindowUnit, ZeroConfig};
pub use error::CorrectionError;
pub use geometry::{delay, distance, velocity, Point3D};
pub use interpolation::{interpolate, InterpolationKind};
pub use jitter::correct_jitter;
pub use model::{Joint, Pose, Sequence};
pub use report::{JitterReport, ZeroReport};
pub use zeros::correct_zeros;
