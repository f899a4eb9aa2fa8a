//! # doa-core
//!
//! Real-time direction-of-arrival (DOA) estimation core for a two-microphone
//! array.
//!
//! ## Architecture
//!
//! ```text
//! data_write (VAD gate) → SPSC byte ring → worker thread
//!                                              │
//!                                  de-interleave 512-pair frame
//!                                              │
//!                                     DoaKernel::estimate
//!                                              │
//!                        Gaussian smoothing → edge-bias calibration
//!                                              │──► monitor callback
//!                                         DoaTracker
//!                                              │──► result callback (rate-limited)
//! ```
//!
//! The caller's write path is bounded-wait and allocation-free; every buffer
//! is sized at construction. After the worker thread spawns, it is the only
//! owner of pipeline state — the caller merely appends PCM and flips flags.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod buffering;
pub mod conditioning;
pub mod engine;
pub mod error;
pub mod kernel;
pub mod tracker;

// Convenience re-exports for downstream crates
pub use engine::{AngleCallback, DiagnosticsSnapshot, DoaCallbacks, DoaConfig, DoaEngine};
pub use error::DoaError;
pub use kernel::{DoaKernel, KernelHandle, KernelSpec};
pub use tracker::{DoaTracker, TrackerConfig};
