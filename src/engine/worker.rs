//! Worker loop: drains whole frames from the ring, runs the kernel, and
//! drives the conditioner, the callbacks, and the tracker.
//!
//! ## Loop (per iteration)
//!
//! ```text
//! 1. Apply any pending tracker enable/disable request
//! 2. Started flag down → timed wait, retry
//! 3. Ring holds less than one frame → timed wait, retry
//! 4. Pop exactly one 2048-byte frame; de-interleave into the channel buffers
//! 5. Kernel estimate → conditioner → monitor callback
//! 6. Tracker feed → result callback on emission
//! ```
//!
//! The loop never blocks indefinitely: both waits are short and the running
//! flag is observed every iteration, so shutdown is bounded.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::buffering::frame::{frame_rms, ChannelBuffers, FRAME_BYTES};
use crate::buffering::{Consumer, FrameConsumer, Observer};
use crate::conditioning::RawAngleConditioner;
use crate::kernel::KernelHandle;
use crate::tracker::DoaTracker;

/// Timed wait used for both the started-event poll and the frame receive.
pub(crate) const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Callback invoked with a bearing on the worker thread.
///
/// Must be short and non-blocking: a stalled callback stalls the pipeline.
pub type AngleCallback = Box<dyn FnMut(f32) + Send>;

/// Shared pipeline counters, written by the worker (and the write path for
/// the two write counters), read from the façade.
#[derive(Debug, Default)]
pub struct WorkerDiagnostics {
    pub frames_in: AtomicUsize,
    pub kernel_calls: AtomicUsize,
    pub monitor_emitted: AtomicUsize,
    pub results_emitted: AtomicUsize,
    pub writes_gated: AtomicUsize,
    pub writes_rejected: AtomicUsize,
}

impl WorkerDiagnostics {
    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            frames_in: self.frames_in.load(Ordering::Relaxed),
            kernel_calls: self.kernel_calls.load(Ordering::Relaxed),
            monitor_emitted: self.monitor_emitted.load(Ordering::Relaxed),
            results_emitted: self.results_emitted.load(Ordering::Relaxed),
            writes_gated: self.writes_gated.load(Ordering::Relaxed),
            writes_rejected: self.writes_rejected.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the pipeline counters.
#[derive(Debug, Clone, Copy)]
pub struct DiagnosticsSnapshot {
    pub frames_in: usize,
    pub kernel_calls: usize,
    pub monitor_emitted: usize,
    pub results_emitted: usize,
    pub writes_gated: usize,
    pub writes_rejected: usize,
}

/// All state the worker owns, passed as one struct so the spawn stays tidy.
pub(crate) struct WorkerContext {
    pub consumer: FrameConsumer,
    pub kernel: KernelHandle,
    pub conditioner: RawAngleConditioner,
    pub tracker: DoaTracker,
    pub monitor_callback: Option<AngleCallback>,
    pub result_callback: AngleCallback,
    pub running: Arc<AtomicBool>,
    pub started: Arc<AtomicBool>,
    pub tracker_enable: Arc<AtomicBool>,
    pub diagnostics: Arc<WorkerDiagnostics>,
}

/// Run the worker until `ctx.running` goes false.
pub(crate) fn run(mut ctx: WorkerContext) {
    info!("DOA worker started");

    let mut frame = vec![0u8; FRAME_BYTES];
    let mut channels = ChannelBuffers::new();

    while ctx.running.load(Ordering::Relaxed) {
        // Apply enable/disable requests here so only this thread ever
        // touches tracker state.
        let want_enabled = ctx.tracker_enable.load(Ordering::Relaxed);
        if want_enabled != ctx.tracker.is_enabled() {
            ctx.tracker.set_enabled(want_enabled);
        }

        if !ctx.started.load(Ordering::Relaxed) {
            std::thread::sleep(POLL_INTERVAL);
            continue;
        }

        if ctx.consumer.occupied_len() < FRAME_BYTES {
            // Transient underrun — yield and re-enter the wait.
            std::thread::sleep(POLL_INTERVAL);
            continue;
        }

        let received = ctx.consumer.pop_slice(&mut frame);
        // Single consumer: the occupancy check guarantees a whole frame.
        debug_assert_eq!(received, FRAME_BYTES);
        ctx.diagnostics.frames_in.fetch_add(1, Ordering::Relaxed);

        channels.fill_from_interleaved(&frame);
        let rms = frame_rms(&frame);

        let raw = {
            let mut kernel = ctx.kernel.0.lock();
            kernel.estimate(channels.left(), channels.right())
        };
        ctx.diagnostics.kernel_calls.fetch_add(1, Ordering::Relaxed);

        let calibrated = ctx.conditioner.condition(raw);
        debug!(rms, raw, calibrated, "frame processed");

        if let Some(cb) = ctx.monitor_callback.as_mut() {
            cb(calibrated);
            ctx.diagnostics
                .monitor_emitted
                .fetch_add(1, Ordering::Relaxed);
        }

        if let Some(output) = ctx.tracker.feed(calibrated) {
            (ctx.result_callback)(output);
            ctx.diagnostics
                .results_emitted
                .fetch_add(1, Ordering::Relaxed);
        }
    }

    let snapshot = ctx.diagnostics.snapshot();
    info!(
        frames_in = snapshot.frames_in,
        results_emitted = snapshot.results_emitted,
        "DOA worker stopped"
    );
}
