//! Image verification and prefetching.

/// Batch preloader and latest-image health probe.
pub mod preloader;
/// Bounded set of verified URLs.
pub mod verified;
