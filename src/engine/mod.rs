//! `DoaEngine` — top-level lifecycle controller and façade.
//!
//! ## Lifecycle
//!
//! ```text
//! DoaEngine::new()          → kernel configured, ring allocated,
//!                             worker spawned in stopped state
//!     └─► start()           → started flag raised, tracker enabled
//!         └─► data_write()  → PCM admitted while the VAD gate is open
//!         └─► stop()        → started flag lowered, tracker disabled + reset
//! Drop                      → running flag lowered, worker joined
//! ```
//!
//! `start()`/`stop()` are idempotent flag flips; neither tears down
//! resources. All allocation happens in `new()` — the write path and the
//! worker loop run allocation-free.

pub mod worker;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::buffering::{create_frame_ring, FrameProducer, Observer, Producer};
use crate::conditioning::RawAngleConditioner;
use crate::error::{DoaError, Result};
use crate::kernel::{KernelHandle, KernelSpec, DEFAULT_MIC_DISTANCE_M};
use crate::tracker::{DoaTracker, TrackerConfig};

pub use worker::{AngleCallback, DiagnosticsSnapshot, WorkerDiagnostics};

/// Configuration for `DoaEngine`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoaConfig {
    /// Distance between the two microphones (m). Values ≤ 0 fall back to the
    /// default geometry (0.046 m). Default: 0.046.
    pub mic_distance_m: f32,
    /// Tracker emission spacing (ms); 0 emits on every accepted bearing once
    /// its history is full. Default: 1000.
    pub output_interval_ms: u64,
    /// Minimum change against the previous emission before a new one fires
    /// (degrees); 0 disables the filter. Default: 15.0.
    pub min_angle_change_threshold: f32,
    /// Continuous broadside observation promoting front-facing mode (ms).
    /// Default: 1000.
    pub continuous_90_ms: u64,
}

impl Default for DoaConfig {
    fn default() -> Self {
        Self {
            mic_distance_m: DEFAULT_MIC_DISTANCE_M,
            output_interval_ms: 1000,
            min_angle_change_threshold: 15.0,
            continuous_90_ms: 1000,
        }
    }
}

/// The two caller-supplied observers. Context travels as closure captures.
pub struct DoaCallbacks {
    /// Invoked with every calibrated per-frame bearing.
    pub monitor: Option<AngleCallback>,
    /// Invoked with each stabilized bearing the tracker emits.
    pub result: AngleCallback,
}

/// The top-level engine handle.
///
/// `DoaEngine` is `Send + Sync` — all fields use interior mutability. The
/// caller appends PCM via `data_write` and flips flags; everything else
/// happens on the worker thread.
pub struct DoaEngine {
    /// Producer half of the frame ring. The mutex serialises writers so the
    /// ring sees a single producer.
    producer: Mutex<FrameProducer>,
    /// `false` tells the worker to exit.
    running: Arc<AtomicBool>,
    /// The started event: the worker only drains frames while this is set.
    started: Arc<AtomicBool>,
    /// Write gate. Relaxed ordering is fine: at worst one frame is admitted
    /// or dropped at a mode boundary.
    vad_detect: AtomicBool,
    /// Tracker enable request, applied by the worker.
    tracker_enable: Arc<AtomicBool>,
    diagnostics: Arc<WorkerDiagnostics>,
    worker: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for DoaEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DoaEngine")
            .field("running", &self.running)
            .field("started", &self.started)
            .field("vad_detect", &self.vad_detect)
            .field("tracker_enable", &self.tracker_enable)
            .field("diagnostics", &self.diagnostics)
            .finish_non_exhaustive()
    }
}

impl DoaEngine {
    /// Create a new engine: configure the kernel, allocate the ring and all
    /// scratch buffers, and spawn the worker thread in stopped state.
    ///
    /// Construction is all-or-nothing: a kernel that rejects the geometry or
    /// a failed thread spawn returns an error and nothing is left behind.
    ///
    /// # Errors
    /// - `DoaError::InvalidInput` on a non-finite config value.
    /// - Kernel `configure` errors are passed through.
    /// - `DoaError::Io` if the worker thread cannot be spawned.
    pub fn new(config: DoaConfig, kernel: KernelHandle, callbacks: DoaCallbacks) -> Result<Self> {
        validate_config(&config)?;

        let spec = KernelSpec {
            mic_distance_m: if config.mic_distance_m > 0.0 {
                config.mic_distance_m
            } else {
                DEFAULT_MIC_DISTANCE_M
            },
            ..KernelSpec::default()
        };
        kernel.0.lock().configure(&spec)?;

        let (producer, consumer) = create_frame_ring();
        let running = Arc::new(AtomicBool::new(true));
        let started = Arc::new(AtomicBool::new(false));
        let tracker_enable = Arc::new(AtomicBool::new(false));
        let diagnostics = Arc::new(WorkerDiagnostics::default());

        let tracker = DoaTracker::new(TrackerConfig {
            output_interval_ms: config.output_interval_ms,
            min_angle_change_threshold: config.min_angle_change_threshold,
            continuous_90_ms: config.continuous_90_ms,
        });

        let ctx = worker::WorkerContext {
            consumer,
            kernel,
            conditioner: RawAngleConditioner::new(),
            tracker,
            monitor_callback: callbacks.monitor,
            result_callback: callbacks.result,
            running: Arc::clone(&running),
            started: Arc::clone(&started),
            tracker_enable: Arc::clone(&tracker_enable),
            diagnostics: Arc::clone(&diagnostics),
        };

        let worker = std::thread::Builder::new()
            .name("doa-worker".into())
            .spawn(move || worker::run(ctx))?;

        info!(mic_distance_m = spec.mic_distance_m, "DOA engine created");

        Ok(Self {
            producer: Mutex::new(producer),
            running,
            started,
            vad_detect: AtomicBool::new(false),
            tracker_enable,
            diagnostics,
            worker: Some(worker),
        })
    }

    /// Raise the started event and arm the tracker. Idempotent.
    pub fn start(&self) {
        self.tracker_enable.store(true, Ordering::SeqCst);
        self.started.store(true, Ordering::SeqCst);
        info!("DOA engine started");
    }

    /// Lower the started event and disarm the tracker (resetting its state).
    /// Idempotent; frames already buffered are not drained.
    pub fn stop(&self) {
        self.started.store(false, Ordering::SeqCst);
        self.tracker_enable.store(false, Ordering::SeqCst);
        info!("DOA engine stopped");
    }

    /// Append interleaved stereo PCM to the frame ring.
    ///
    /// Any positive length is accepted; the worker only consumes whole
    /// frames. While the VAD gate is closed this returns `Ok` without
    /// enqueueing. Enqueueing is all-or-nothing so the byte stream stays
    /// frame-aligned.
    ///
    /// # Errors
    /// - `DoaError::InvalidInput` on an empty slice.
    /// - `DoaError::RingBufferFull` when space is still short after one
    ///   bounded wait.
    pub fn data_write(&self, data: &[u8]) -> Result<()> {
        if data.is_empty() {
            return Err(DoaError::InvalidInput("empty PCM write".into()));
        }
        if !self.vad_detect.load(Ordering::Relaxed) {
            self.diagnostics.writes_gated.fetch_add(1, Ordering::Relaxed);
            return Ok(());
        }

        let mut producer = self.producer.lock();
        if producer.vacant_len() < data.len() {
            // Give the worker one poll interval to drain, then give up.
            drop(producer);
            std::thread::sleep(worker::POLL_INTERVAL);
            producer = self.producer.lock();
            if producer.vacant_len() < data.len() {
                self.diagnostics
                    .writes_rejected
                    .fetch_add(1, Ordering::Relaxed);
                warn!(len = data.len(), "frame ring full — write rejected");
                return Err(DoaError::RingBufferFull);
            }
        }
        let written = producer.push_slice(data);
        debug_assert_eq!(written, data.len());
        Ok(())
    }

    /// Open or close the VAD write gate.
    pub fn set_vad_detect(&self, vad_detect: bool) {
        self.vad_detect.store(vad_detect, Ordering::Relaxed);
    }

    /// Whether the started event is currently raised.
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Whether the VAD write gate is currently open.
    pub fn vad_detect(&self) -> bool {
        self.vad_detect.load(Ordering::Relaxed)
    }

    /// Snapshot of the pipeline counters for observability.
    pub fn diagnostics(&self) -> DiagnosticsSnapshot {
        self.diagnostics.snapshot()
    }
}

impl Drop for DoaEngine {
    fn drop(&mut self) {
        self.started.store(false, Ordering::SeqCst);
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.worker.take() {
            // The worker observes `running` at least once per poll interval.
            if handle.join().is_err() {
                warn!("DOA worker panicked before shutdown");
            }
        }
    }
}

fn validate_config(config: &DoaConfig) -> Result<()> {
    if !config.mic_distance_m.is_finite() {
        return Err(DoaError::InvalidInput(
            "mic_distance_m must be finite".into(),
        ));
    }
    if !config.min_angle_change_threshold.is_finite() || config.min_angle_change_threshold < 0.0 {
        return Err(DoaError::InvalidInput(
            "min_angle_change_threshold must be finite and non-negative".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::stub::FixedKernel;

    fn noop_callbacks() -> DoaCallbacks {
        DoaCallbacks {
            monitor: None,
            result: Box::new(|_| {}),
        }
    }

    #[test]
    fn config_defaults_match_the_contract() {
        let config = DoaConfig::default();
        assert!((config.mic_distance_m - 0.046).abs() < 1e-6);
        assert_eq!(config.output_interval_ms, 1000);
        assert!((config.min_angle_change_threshold - 15.0).abs() < 1e-6);
    }

    #[test]
    fn config_round_trips_through_serde() {
        let config = DoaConfig {
            output_interval_ms: 250,
            ..DoaConfig::default()
        };
        let json = serde_json::to_string(&config).expect("serialize config");
        let back: DoaConfig = serde_json::from_str(&json).expect("deserialize config");
        assert_eq!(back.output_interval_ms, 250);
        assert!((back.mic_distance_m - config.mic_distance_m).abs() < 1e-6);
    }

    #[test]
    fn non_finite_config_is_rejected() {
        let config = DoaConfig {
            mic_distance_m: f32::NAN,
            ..DoaConfig::default()
        };
        let kernel = KernelHandle::new(FixedKernel::new(90.0));
        let err = DoaEngine::new(config, kernel, noop_callbacks()).unwrap_err();
        assert!(matches!(err, DoaError::InvalidInput(_)));
    }

    #[test]
    fn kernel_configure_failure_aborts_construction() {
        struct RejectingKernel;
        impl crate::kernel::DoaKernel for RejectingKernel {
            fn configure(&mut self, _spec: &KernelSpec) -> Result<()> {
                Err(DoaError::Kernel("unsupported geometry".into()))
            }
            fn estimate(&mut self, _left: &[i16], _right: &[i16]) -> f32 {
                90.0
            }
        }

        let kernel = KernelHandle::new(RejectingKernel);
        let err = DoaEngine::new(DoaConfig::default(), kernel, noop_callbacks()).unwrap_err();
        assert!(matches!(err, DoaError::Kernel(_)));
    }

    #[test]
    fn zero_mic_distance_falls_back_to_default() {
        struct SpecCapturingKernel {
            seen: std::sync::Arc<Mutex<Option<KernelSpec>>>,
        }
        impl crate::kernel::DoaKernel for SpecCapturingKernel {
            fn configure(&mut self, spec: &KernelSpec) -> Result<()> {
                *self.seen.lock() = Some(spec.clone());
                Ok(())
            }
            fn estimate(&mut self, _left: &[i16], _right: &[i16]) -> f32 {
                90.0
            }
        }

        let seen = std::sync::Arc::new(Mutex::new(None));
        let kernel = KernelHandle::new(SpecCapturingKernel {
            seen: std::sync::Arc::clone(&seen),
        });
        let config = DoaConfig {
            mic_distance_m: 0.0,
            ..DoaConfig::default()
        };
        let engine = DoaEngine::new(config, kernel, noop_callbacks()).expect("engine");
        let spec = seen.lock().clone().expect("configure was called");
        assert!((spec.mic_distance_m - DEFAULT_MIC_DISTANCE_M).abs() < 1e-6);
        drop(engine);
    }

    #[test]
    fn empty_write_is_rejected() {
        let kernel = KernelHandle::new(FixedKernel::new(90.0));
        let engine =
            DoaEngine::new(DoaConfig::default(), kernel, noop_callbacks()).expect("engine");
        let err = engine.data_write(&[]).unwrap_err();
        assert!(matches!(err, DoaError::InvalidInput(_)));
    }

    #[test]
    fn start_and_stop_are_idempotent_toggles() {
        let kernel = KernelHandle::new(FixedKernel::new(90.0));
        let engine =
            DoaEngine::new(DoaConfig::default(), kernel, noop_callbacks()).expect("engine");
        assert!(!engine.is_started());

        engine.start();
        engine.start();
        assert!(engine.is_started());

        engine.stop();
        engine.stop();
        assert!(!engine.is_started());
    }
}
