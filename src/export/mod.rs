//! Turning resolved frame sequences into downloadable animation artifacts.
//!
//! Flow: [`resolve`] decodes the inputs, [`compose`] draws each output frame, and
//! [`encoder::ExportEncoder`] drives an [`backend::EncoderBackend`] through the
//! [`job::ExportState`] lifecycle.

/// Encoder backend contract and selection.
pub mod backend;
/// Caption rasterization.
pub mod caption;
/// Single-view and grid frame composition.
pub mod compose;
/// Driving loop and one-call export entry point.
pub mod encoder;
/// Export lifecycle, progress and artifact naming.
pub mod job;
/// Grid and letterbox geometry.
pub mod layout;
/// `ffmpeg` live-capture backend.
pub mod live;
/// Input fetching and decoding.
pub mod resolve;
/// Background GIF encoder.
pub mod worker;

pub use encoder::{ExportEncoder, ExportOutcome, export_sequence};
pub use job::{ExportFormat, ExportJob, ExportState};
pub use resolve::{ExportSequence, SequenceResolver};
