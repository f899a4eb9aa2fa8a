//! Raw-bearing conditioning: Gaussian smoothing followed by edge-bias
//! calibration.
//!
//! The conditioned bearing is both the monitor-callback payload and the
//! tracker input.

pub mod calibration;
pub mod smoother;

pub use calibration::calibrate;
pub use smoother::GaussianSmoother;

use tracing::trace;

/// Smooths and calibrates the raw per-frame bearings from the kernel.
#[derive(Debug, Clone, Default)]
pub struct RawAngleConditioner {
    smoother: GaussianSmoother,
}

impl RawAngleConditioner {
    pub fn new() -> Self {
        Self {
            smoother: GaussianSmoother::new(),
        }
    }

    /// Condition one raw kernel bearing.
    ///
    /// Non-finite kernel output collapses to 0.0 before entering the
    /// smoothing history; finite output is clamped to [0, 180] at the same
    /// point, so a misbehaving kernel cannot poison the window.
    pub fn condition(&mut self, raw: f32) -> f32 {
        let sanitized = sanitize_angle(raw);
        let filtered = self.smoother.push(sanitized);
        let calibrated = calibrate(filtered);
        trace!(raw, filtered, calibrated, "conditioned bearing");
        calibrated
    }
}

fn sanitize_angle(angle: f32) -> f32 {
    if angle.is_finite() {
        angle.clamp(0.0, 180.0)
    } else {
        0.0
    }
}
