//! The externally supplied feed catalog.

/// Source descriptors and catalog loading.
pub mod model;
