//! Development and test kernels that bypass real signal processing.
//!
//! Useful for exercising the full dispatch → conditioning → tracking path
//! end-to-end before a production estimator is wired in.

use tracing::debug;

use super::{DoaKernel, KernelSpec};
use crate::error::Result;

/// Returns the same bearing for every frame.
pub struct FixedKernel {
    angle: f32,
}

impl FixedKernel {
    pub fn new(angle: f32) -> Self {
        Self { angle }
    }
}

impl DoaKernel for FixedKernel {
    fn configure(&mut self, spec: &KernelSpec) -> Result<()> {
        debug!(
            mic_distance_m = spec.mic_distance_m,
            "FixedKernel::configure — no-op"
        );
        Ok(())
    }

    fn estimate(&mut self, _left: &[i16], _right: &[i16]) -> f32 {
        self.angle
    }
}

/// Plays back a scripted sequence of bearings, repeating the last entry once
/// the script runs out.
pub struct ScriptedKernel {
    script: Vec<f32>,
    idx: usize,
}

impl ScriptedKernel {
    pub fn new(script: Vec<f32>) -> Self {
        Self { script, idx: 0 }
    }
}

impl DoaKernel for ScriptedKernel {
    fn configure(&mut self, _spec: &KernelSpec) -> Result<()> {
        Ok(())
    }

    fn estimate(&mut self, _left: &[i16], _right: &[i16]) -> f32 {
        let angle = self
            .script
            .get(self.idx)
            .or_else(|| self.script.last())
            .copied()
            .unwrap_or(0.0);
        if self.idx < self.script.len() {
            self.idx += 1;
        }
        angle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_kernel_is_constant() {
        let mut kernel = FixedKernel::new(135.0);
        assert_eq!(kernel.estimate(&[], &[]), 135.0);
        assert_eq!(kernel.estimate(&[1, 2], &[3, 4]), 135.0);
    }

    #[test]
    fn scripted_kernel_plays_then_repeats_last() {
        let mut kernel = ScriptedKernel::new(vec![10.0, 20.0, 30.0]);
        assert_eq!(kernel.estimate(&[], &[]), 10.0);
        assert_eq!(kernel.estimate(&[], &[]), 20.0);
        assert_eq!(kernel.estimate(&[], &[]), 30.0);
        assert_eq!(kernel.estimate(&[], &[]), 30.0);
        assert_eq!(kernel.estimate(&[], &[]), 30.0);
    }

    #[test]
    fn empty_script_yields_zero() {
        let mut kernel = ScriptedKernel::new(vec![]);
        assert_eq!(kernel.estimate(&[], &[]), 0.0);
    }
}
