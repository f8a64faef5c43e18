//! Image decoding shared by verification and export.

/// Byte → RGBA8 decoding.
pub mod decode;
