//! Shared primitives: error taxonomy, clock injection and core data types.

/// Injectable wall clock.
pub mod clock;
/// Frame and resolution types.
pub mod core;
/// Crate-wide error type.
pub mod error;
