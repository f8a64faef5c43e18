//! HTTP boundary: the fetcher trait and clients for the external collaborators.

/// `Fetcher` trait and its `reqwest` implementation.
pub mod fetch;
/// Cached frame-list service and image proxy contracts.
pub mod service;
