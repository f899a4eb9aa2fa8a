//! Temporal DOA tracking: validation, quantization, front-facing detection,
//! and rate-limited output over the conditioned bearing stream.
//!
//! ## Modes
//!
//! A two-microphone array cannot distinguish a genuine broadside (90°)
//! source from the 90° artifact the kernel produces on near-silence. The
//! tracker therefore runs in one of two modes:
//!
//! - **Front-facing** — the source was observed stably near 90° during the
//!   initial samples, or continuously for `continuous_90_ms`; broadside
//!   readings are trusted.
//! - **Non-front-facing** — the initial samples were elsewhere; broadside
//!   readings need corroboration from the history buffer before they are
//!   trusted, which suppresses the silence artifact.
//!
//! Accepted bearings are quantized to 20°-bin centres and averaged over a
//! six-entry circular history, with extra weight on the newest entry and an
//! edge bias that counters the mean's pull toward the centre near the
//! endpoints.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// History length.
const BUFFER_SIZE: usize = 6;
/// Weight on the newest entry in the running average.
const RECENT_WEIGHT_FACTOR: f32 = 3.0;
/// Maximum plausible step between consecutive outputs.
const REASONABLE_CHANGE_THRESHOLD: f32 = 40.0;
/// Broadside bearing.
const SILENT_ANGLE: f32 = 90.0;
/// Half-width of the "near 90°" band: (84°, 96°).
const SILENT_ANGLE_THRESHOLD: f32 = 6.0;
/// Bearings examined by the front-facing probe.
const INITIAL_SAMPLES_TO_CHECK: usize = 3;
/// Per-sample change still considered gradual.
const GRADUAL_CHANGE_THRESHOLD: f32 = 20.0;
/// Quantization bin width.
const ANGLE_QUANTIZATION_STEP: f32 = 20.0;
const ANGLE_MIN: f32 = 0.0;
const ANGLE_MAX: f32 = 180.0;
/// Jump against the running average that resets the history.
const MAJOR_ANGLE_CHANGE_THRESHOLD: f32 = 30.0;

/// Tracker tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Minimum spacing between emissions (ms). 0 emits on every accepted
    /// bearing once the history is full. Default: 1000.
    pub output_interval_ms: u64,
    /// Minimum change against the previous emission before a new one fires
    /// (degrees). 0 disables the filter. Default: 15.0.
    pub min_angle_change_threshold: f32,
    /// Continuous near-90° observation required to promote to front-facing
    /// mode (ms). Default: 1000.
    pub continuous_90_ms: u64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            output_interval_ms: 1000,
            min_angle_change_threshold: 15.0,
            continuous_90_ms: 1000,
        }
    }
}

/// DOA tracker state machine.
///
/// Owned by the worker thread; `feed` returns the emitted bearing, at most
/// one per call. Constructed disabled — `set_enabled(true)` arms it.
#[derive(Debug)]
pub struct DoaTracker {
    config: TrackerConfig,
    enabled: bool,
    /// Quantized accepted bearings.
    buffer: [f32; BUFFER_SIZE],
    /// The same bearings before quantization, used by the broadside checks.
    original_buffer: [f32; BUFFER_SIZE],
    valid_mask: [bool; BUFFER_SIZE],
    write_index: usize,
    valid_count: usize,
    is_front_facing_mode: bool,
    is_not_front_facing_detected: bool,
    initial_samples_count: usize,
    last_valid_angle: Option<f32>,
    last_output_angle: Option<f32>,
    first_near_90_at: Option<Instant>,
    last_output_at: Option<Instant>,
}

impl DoaTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            enabled: false,
            buffer: [0.0; BUFFER_SIZE],
            original_buffer: [0.0; BUFFER_SIZE],
            valid_mask: [false; BUFFER_SIZE],
            write_index: 0,
            valid_count: 0,
            is_front_facing_mode: false,
            is_not_front_facing_detected: false,
            initial_samples_count: 0,
            last_valid_angle: None,
            last_output_angle: None,
            first_near_90_at: None,
            last_output_at: None,
        }
    }

    /// Enable or disable the tracker. Both directions reset all state, so a
    /// re-enabled tracker starts from its post-construction form.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.reset_state();
        self.enabled = enabled;
        if enabled {
            info!("DOA tracker enabled");
        } else {
            info!("DOA tracker disabled");
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn valid_count(&self) -> usize {
        self.valid_count
    }

    pub fn is_front_facing(&self) -> bool {
        self.is_front_facing_mode
    }

    /// The most recently emitted bearing, if any.
    pub fn last_output(&self) -> Option<f32> {
        self.last_output_angle
    }

    /// Feed one conditioned bearing. Returns the stabilized bearing when the
    /// tracker decides to emit, `None` otherwise. No-op while disabled.
    pub fn feed(&mut self, angle: f32) -> Option<f32> {
        if !self.enabled {
            return None;
        }
        let now = Instant::now();

        // Running average before this sample lands — used by the major-jump
        // check against the incoming bearing.
        let current_avg = self.weighted_average();
        let buffer_was_full = self.valid_count >= BUFFER_SIZE;

        if !self.is_angle_valid(angle, now) {
            return None;
        }

        let quantized = quantize_angle(angle);

        if buffer_was_full && (angle - current_avg).abs() > MAJOR_ANGLE_CHANGE_THRESHOLD {
            debug!(angle, current_avg, "major bearing change — resetting history");
            self.reset_state();
        }

        if !self.valid_mask[self.write_index] {
            self.valid_count += 1;
        }
        self.buffer[self.write_index] = quantized;
        self.original_buffer[self.write_index] = angle;
        self.valid_mask[self.write_index] = true;
        self.write_index = (self.write_index + 1) % BUFFER_SIZE;

        self.last_valid_angle = Some(quantized);

        self.check_initial_samples();

        self.decide_output(now)
    }

    // ── Validity policy ──────────────────────────────────────────────────

    fn is_angle_valid(&mut self, angle: f32, now: Instant) -> bool {
        // Bearings away from broadside are always trusted.
        if !is_near_90(angle) {
            self.reset_90_tracking();
            return true;
        }

        if self.is_front_facing_mode {
            return true;
        }

        self.start_90_tracking(now);
        if self.check_continuous_90(now) {
            return true;
        }

        // During initial collection, accept so the probe can run.
        if self.valid_count < INITIAL_SAMPLES_TO_CHECK {
            return true;
        }

        let Some(last_valid) = self.last_valid_angle else {
            // No history — require corroboration.
            return self.buffer_mostly_90();
        };

        if is_near_90(last_valid) {
            // Stable around broadside.
            return (angle - last_valid).abs() < GRADUAL_CHANGE_THRESHOLD;
        }

        // Transition from non-broadside to broadside.
        self.reset_90_tracking();

        if self.check_gradual_change_to_90(angle, last_valid) {
            return true;
        }

        // Strict when the initial samples ruled out front-facing; either way
        // the history must corroborate.
        self.buffer_mostly_90()
    }

    fn check_gradual_change_to_90(&self, angle: f32, last_valid: f32) -> bool {
        if self.valid_count < 3 {
            return false;
        }
        if (angle - last_valid).abs() >= GRADUAL_CHANGE_THRESHOLD {
            return false;
        }
        // Must be approaching broadside.
        if (angle - SILENT_ANGLE).abs() >= (last_valid - SILENT_ANGLE).abs() {
            return false;
        }

        // Walk the history backwards from the entry before the most recent,
        // counting steps whose distance to broadside shrinks.
        let mut moving_towards_90 = 0;
        let mut last_checked = last_valid;
        for i in 0..BUFFER_SIZE {
            if moving_towards_90 >= 3 {
                break;
            }
            let idx = (self.write_index + 2 * BUFFER_SIZE - 2 - i) % BUFFER_SIZE;
            if self.valid_mask[idx] {
                let checked_diff = (self.buffer[idx] - SILENT_ANGLE).abs();
                let last_diff = (last_checked - SILENT_ANGLE).abs();
                if checked_diff < last_diff {
                    moving_towards_90 += 1;
                }
                last_checked = self.buffer[idx];
            }
        }
        moving_towards_90 >= 3
    }

    // ── Broadside timer ──────────────────────────────────────────────────

    fn start_90_tracking(&mut self, now: Instant) {
        if self.first_near_90_at.is_none() {
            self.first_near_90_at = Some(now);
        }
    }

    fn reset_90_tracking(&mut self) {
        self.first_near_90_at = None;
    }

    fn check_continuous_90(&mut self, now: Instant) -> bool {
        let Some(started_at) = self.first_near_90_at else {
            return false;
        };
        if now.duration_since(started_at) >= Duration::from_millis(self.config.continuous_90_ms) {
            self.is_front_facing_mode = true;
            info!(
                window_ms = self.config.continuous_90_ms,
                "front-facing speech detected (continuous broadside)"
            );
            return true;
        }
        false
    }

    // ── Buffer corroboration ─────────────────────────────────────────────

    fn count_near_90(&self) -> usize {
        (0..BUFFER_SIZE)
            .filter(|&i| self.valid_mask[i] && is_near_90(self.original_buffer[i]))
            .count()
    }

    /// At least two thirds of the valid entries sit near broadside,
    /// judged on the pre-quantization values.
    fn buffer_mostly_90(&self) -> bool {
        if self.valid_count == 0 {
            return false;
        }
        self.count_near_90() * 3 >= self.valid_count * 2
    }

    // ── Front-facing probe ───────────────────────────────────────────────

    fn check_initial_samples(&mut self) {
        if self.initial_samples_count >= INITIAL_SAMPLES_TO_CHECK
            || self.valid_count < INITIAL_SAMPLES_TO_CHECK
        {
            return;
        }

        // Low-to-high index walk; only reachable in states where this equals
        // insertion order, since a full reset zeroes `write_index`.
        let mut near_90_count = 0;
        let mut checked = 0;
        for i in 0..BUFFER_SIZE {
            if checked >= INITIAL_SAMPLES_TO_CHECK {
                break;
            }
            if self.valid_mask[i] {
                if is_near_90(self.original_buffer[i]) {
                    near_90_count += 1;
                }
                checked += 1;
            }
        }

        if checked >= INITIAL_SAMPLES_TO_CHECK {
            if near_90_count >= INITIAL_SAMPLES_TO_CHECK {
                self.is_front_facing_mode = true;
                info!("front-facing mode detected from initial samples");
            } else {
                self.is_not_front_facing_detected = true;
                debug!(near_90_count, "initial samples away from broadside");
            }
            self.initial_samples_count = INITIAL_SAMPLES_TO_CHECK;
        }
    }

    // ── Output decision ──────────────────────────────────────────────────

    fn decide_output(&mut self, now: Instant) -> Option<f32> {
        if self.valid_count < BUFFER_SIZE {
            return None;
        }

        let avg = if self.last_output_angle.is_none() {
            // First output: plain mean over the freshly filled history.
            self.first_average()
        } else {
            if self.config.output_interval_ms != 0 {
                let interval = Duration::from_millis(self.config.output_interval_ms);
                if let Some(last_at) = self.last_output_at {
                    if now.duration_since(last_at) < interval {
                        return None;
                    }
                }
            }

            let avg = self.weighted_average();

            if (avg - SILENT_ANGLE).abs() < 5.0 && !self.should_allow_90_output(now) {
                return None;
            }

            if let Some(last) = self.last_output_angle {
                let change = (avg - last).abs();
                if change > REASONABLE_CHANGE_THRESHOLD {
                    debug!(last, avg, change, "bearing change too large — suppressed");
                    return None;
                }
                if self.config.min_angle_change_threshold > 0.0
                    && change < self.config.min_angle_change_threshold
                {
                    debug!(last, avg, change, "bearing change below threshold — suppressed");
                    return None;
                }
            }
            avg
        };

        self.last_output_angle = Some(avg);
        self.last_output_at = Some(now);
        Some(avg)
    }

    fn should_allow_90_output(&self, now: Instant) -> bool {
        if !self.buffer_mostly_90() {
            debug!(
                near_90 = self.count_near_90(),
                valid = self.valid_count,
                "average near broadside without corroborating history"
            );
            return false;
        }
        if self.is_front_facing_mode {
            return true;
        }
        match self.first_near_90_at {
            Some(started_at) => {
                now.duration_since(started_at)
                    >= Duration::from_millis(self.config.continuous_90_ms)
            }
            None => false,
        }
    }

    fn first_average(&self) -> f32 {
        let mut sum = 0.0f32;
        let mut min_angle = ANGLE_MAX;
        let mut max_angle = ANGLE_MIN;
        let mut count = 0usize;
        for i in 0..BUFFER_SIZE {
            if self.valid_mask[i] {
                let val = self.buffer[i];
                sum += val;
                min_angle = min_angle.min(val);
                max_angle = max_angle.max(val);
                count += 1;
            }
        }
        if count == 0 {
            return 0.0;
        }
        apply_edge_bias(sum / count as f32, min_angle, max_angle)
    }

    fn weighted_average(&self) -> f32 {
        if self.valid_count == 0 {
            return 0.0;
        }
        let latest = (self.write_index + BUFFER_SIZE - 1) % BUFFER_SIZE;
        let mut weighted_sum = 0.0f32;
        let mut total_weight = 0.0f32;
        let mut min_angle = ANGLE_MAX;
        let mut max_angle = ANGLE_MIN;
        for i in 0..BUFFER_SIZE {
            if self.valid_mask[i] {
                let weight = if i == latest { RECENT_WEIGHT_FACTOR } else { 1.0 };
                let val = self.buffer[i];
                weighted_sum += val * weight;
                total_weight += weight;
                min_angle = min_angle.min(val);
                max_angle = max_angle.max(val);
            }
        }
        if total_weight == 0.0 {
            return 0.0;
        }
        apply_edge_bias(weighted_sum / total_weight, min_angle, max_angle)
    }

    fn reset_state(&mut self) {
        self.buffer = [0.0; BUFFER_SIZE];
        self.original_buffer = [0.0; BUFFER_SIZE];
        self.valid_mask = [false; BUFFER_SIZE];
        self.write_index = 0;
        self.valid_count = 0;
        self.is_front_facing_mode = false;
        self.is_not_front_facing_detected = false;
        self.initial_samples_count = 0;
        self.last_valid_angle = None;
        self.last_output_angle = None;
        self.first_near_90_at = None;
        self.last_output_at = None;
    }
}

fn is_near_90(angle: f32) -> bool {
    (angle - SILENT_ANGLE).abs() < SILENT_ANGLE_THRESHOLD
}

/// Quantize a bearing to the centre of its 20°-wide bin. 180° shares the top
/// bin, mapping to 170°.
fn quantize_angle(angle: f32) -> f32 {
    let clamped = angle.clamp(ANGLE_MIN, ANGLE_MAX);
    let interval = ((clamped / ANGLE_QUANTIZATION_STEP) as usize).min(8);
    interval as f32 * ANGLE_QUANTIZATION_STEP + ANGLE_QUANTIZATION_STEP / 2.0
}

/// Pull averages sitting toward an endpoint further toward the extreme seen
/// in the history, countering the mean's pull back to centre.
fn apply_edge_bias(avg: f32, min_angle: f32, max_angle: f32) -> f32 {
    if (110.0..=180.0).contains(&avg) {
        avg * 0.3 + max_angle * 0.7
    } else if (0.0..=40.0).contains(&avg) {
        avg * 0.3 + min_angle * 0.7
    } else {
        avg
    }
}
