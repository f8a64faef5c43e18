//! Filename → timestamp recovery, one grammar per feed naming convention.

/// Grammar variants and the per-source grammar table.
pub mod grammar;
