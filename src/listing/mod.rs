//! Frame-list acquisition: directory scanning, timestamp filtering and the listing cache.

/// Anchor scanning over HTML directory listings.
pub mod anchors;
/// Time-boxed LRU cache.
pub mod cache;
/// `FrameLister` and the pure listing parser.
pub mod lister;
