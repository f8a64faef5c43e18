//! Display pacing over a resolved frame or timeline sequence.

/// Timer-driven playback controller.
pub mod controller;
/// Probe, preload, and controller start-up for one source.
pub mod session;
