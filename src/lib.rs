//! Skyloop turns periodically published space-weather image feeds into synchronized animations.
//!
//! The pipeline is:
//!
//! - List frames per source with a [`FrameLister`] (directory scan or frame-list service),
//!   recovering timestamps from filenames via [`Grammar`]s
//! - Verify images with the [`FramePreloader`], falling back to latest-only display when too few
//!   survive
//! - Align several sources with [`build_timeline`]
//! - Play the result with a [`PlaybackController`] or export it through an [`ExportEncoder`]
#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Image decoding.
pub mod assets;
/// Feed catalog.
pub mod catalog;
/// Layered runtime settings.
pub mod config;
/// Animation export.
pub mod export;
/// Shared primitives.
pub mod foundation;
/// Frame-list acquisition.
pub mod listing;
/// HTTP boundary.
pub mod net;
/// Display pacing.
pub mod playback;
/// Image verification.
pub mod preload;
/// Cross-source alignment.
pub mod timeline;
/// Filename timestamp grammars.
pub mod timestamp;

pub use crate::catalog::model::{Catalog, SourceDescriptor};
pub use crate::config::Settings;
pub use crate::export::{
    ExportEncoder, ExportFormat, ExportJob, ExportOutcome, ExportSequence, ExportState,
    SequenceResolver, export_sequence,
};
pub use crate::foundation::clock::{Clock, SystemClock};
pub use crate::foundation::core::{Frame, Resolution};
pub use crate::foundation::error::{SkyloopError, SkyloopResult};
pub use crate::listing::lister::{FrameLister, ListingBackend};
pub use crate::net::fetch::{Fetcher, HttpFetcher};
pub use crate::net::service::{FrameServiceClient, ImageProxy};
pub use crate::playback::controller::{PlaybackController, PlaybackEvent, PlaybackMode};
pub use crate::playback::session::{PlaybackSession, start_playback};
pub use crate::preload::preloader::{FramePreloader, PreloadOptions, PreloadReport};
pub use crate::preload::verified::VerifiedImageSet;
pub use crate::timeline::builder::{Timeline, TimelineEntry, TimelinePolicy, build_timeline};
pub use crate::timestamp::grammar::{Grammar, GrammarTable, extract_timestamp};
