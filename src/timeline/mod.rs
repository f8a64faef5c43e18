//! Cross-source alignment by wall-clock time.

/// Nearest-match timeline construction.
pub mod builder;
