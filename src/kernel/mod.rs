//! DOA kernel abstraction.
//!
//! The per-frame estimator is a black box behind the `DoaKernel` trait: given
//! the two de-interleaved channels of one frame it returns one bearing. The
//! crate never looks inside — it conditions and tracks whatever comes out.
//!
//! `&mut self` on `estimate` intentionally expresses that kernels are
//! stateful — phase-difference histories, internal filters. All mutation is
//! serialised through `KernelHandle`'s `parking_lot::Mutex`.

pub mod stub;

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Inter-microphone distance assumed when the caller leaves it unset (m).
pub const DEFAULT_MIC_DISTANCE_M: f32 = 0.046;

/// Geometry and rate parameters handed to the kernel before processing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KernelSpec {
    /// Capture rate of the incoming PCM (Hz).
    pub sample_rate_hz: u32,
    /// Propagation-model constant the kernel expects. Opaque to this crate.
    pub sound_speed: f32,
    /// Distance between the two microphones (m).
    pub mic_distance_m: f32,
    /// Per-channel samples per processed frame.
    pub samples_per_frame: usize,
}

impl Default for KernelSpec {
    fn default() -> Self {
        Self {
            sample_rate_hz: 16_000,
            sound_speed: 10.0,
            mic_distance_m: DEFAULT_MIC_DISTANCE_M,
            samples_per_frame: 512,
        }
    }
}

/// Contract for per-frame DOA estimation backends.
pub trait DoaKernel: Send + 'static {
    /// One-time setup with the resolved array geometry. Called once at engine
    /// construction, before any `estimate`.
    ///
    /// # Errors
    /// Returns an error if the kernel cannot operate with this geometry;
    /// engine construction is aborted in that case.
    fn configure(&mut self, spec: &KernelSpec) -> Result<()>;

    /// Estimate the bearing of the dominant source for one frame.
    ///
    /// Expected to return degrees on [0, 180]. Out-of-range or non-finite
    /// values are tolerated: the conditioner clamps them downstream.
    fn estimate(&mut self, left: &[i16], right: &[i16]) -> f32;
}

/// Thread-safe reference-counted handle to any `DoaKernel` implementor.
///
/// Uses `parking_lot::Mutex` for non-poisoning behaviour on panic and a
/// cheaper uncontended lock than `std::sync::Mutex`.
#[derive(Clone)]
pub struct KernelHandle(pub Arc<Mutex<dyn DoaKernel>>);

impl KernelHandle {
    /// Wrap any `DoaKernel` in a `KernelHandle`.
    pub fn new<K: DoaKernel>(kernel: K) -> Self {
        Self(Arc::new(Mutex::new(kernel)))
    }
}

impl std::fmt::Debug for KernelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KernelHandle").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kernel_spec_defaults_match_the_contract() {
        let spec = KernelSpec::default();
        assert_eq!(spec.sample_rate_hz, 16_000);
        assert_eq!(spec.samples_per_frame, 512);
        assert!((spec.mic_distance_m - 0.046).abs() < 1e-6);
    }

    #[test]
    fn kernel_spec_round_trips_through_serde() {
        let spec = KernelSpec {
            mic_distance_m: 0.08,
            ..KernelSpec::default()
        };
        let json = serde_json::to_string(&spec).expect("serialize spec");
        let back: KernelSpec = serde_json::from_str(&json).expect("deserialize spec");
        assert!((back.mic_distance_m - 0.08).abs() < 1e-6);
        assert_eq!(back.sample_rate_hz, spec.sample_rate_hz);
    }
}
