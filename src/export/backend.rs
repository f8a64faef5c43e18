use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use image::RgbaImage;

use crate::export::job::ExportFormat;
use crate::export::live::{LiveCaptureBackend, is_ffmpeg_on_path};
use crate::export::worker::GifWorkerBackend;
use crate::foundation::core::Resolution;
use crate::foundation::error::{SkyloopError, SkyloopResult};

/// Configuration handed to a backend at [`EncoderBackend::begin`].
#[derive(Clone, Debug)]
pub struct EncodeConfig {
    /// Canvas size of every pushed frame.
    pub resolution: Resolution,
    /// How long each frame is shown.
    pub frame_delay: Duration,
    /// Final artifact path; written only on successful finalize.
    pub out_path: PathBuf,
}

impl EncodeConfig {
    /// Check dimensions and delay.
    pub fn validate(&self) -> SkyloopResult<()> {
        if self.resolution.width == 0 || self.resolution.height == 0 {
            return Err(SkyloopError::validation(
                "encode width/height must be non-zero",
            ));
        }
        if self.frame_delay.is_zero() {
            return Err(SkyloopError::validation("frame delay must be non-zero"));
        }
        Ok(())
    }

    /// Frame delay in whole milliseconds, at least 1.
    pub fn frame_delay_ms(&self) -> u64 {
        (self.frame_delay.as_millis() as u64).max(1)
    }
}

/// Which backend family encodes a format.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendKind {
    /// Real-time paced `ffmpeg` capture stream.
    LiveCapture,
    /// Background incremental GIF encoder.
    Worker,
}

/// Backend family for `format` given whether `ffmpeg` is available.
pub fn select_backend(format: ExportFormat, ffmpeg_available: bool) -> SkyloopResult<BackendKind> {
    match format {
        ExportFormat::Gif => Ok(BackendKind::Worker),
        ExportFormat::Webm | ExportFormat::Mp4 if ffmpeg_available => Ok(BackendKind::LiveCapture),
        ExportFormat::Webm | ExportFormat::Mp4 => Err(SkyloopError::encoding(format!(
            "{format} export needs ffmpeg on PATH; use gif instead"
        ))),
    }
}

/// Instantiate the backend for `format`, probing for `ffmpeg` when needed.
pub fn backend_for(format: ExportFormat) -> SkyloopResult<Box<dyn EncoderBackend>> {
    let ffmpeg = matches!(format, ExportFormat::Webm | ExportFormat::Mp4) && is_ffmpeg_on_path();
    let backend: Box<dyn EncoderBackend> = match select_backend(format, ffmpeg)? {
        BackendKind::LiveCapture => Box::new(LiveCaptureBackend::new(format)?),
        BackendKind::Worker => Box::new(GifWorkerBackend::new()),
    };
    Ok(backend)
}

/// Encoder contract driven by [`crate::export::encoder::ExportEncoder`].
///
/// Call order is `begin`, `push_frame`*, `drain`, `finalize`; `abort` may be called at any point
/// after `begin` and must leave no artifact behind.
///
/// `push_frame` and `drain` wait without blocking the runtime and may be dropped mid-await; the
/// driving loop races them against cancellation and calls `abort` afterwards.
#[async_trait]
pub trait EncoderBackend: Send {
    /// Backend name for logs.
    fn name(&self) -> &'static str;
    /// Return `true` when the driving loop must wait `frame_delay` after each frame.
    fn paced(&self) -> bool;
    /// Open the encoder.
    fn begin(&mut self, cfg: &EncodeConfig) -> SkyloopResult<()>;
    /// Submit one composed frame, waiting while the encoder is saturated.
    async fn push_frame(&mut self, index: usize, frame: &RgbaImage) -> SkyloopResult<()>;
    /// Frames the encoder has fully consumed, when it reports asynchronously.
    fn encoded(&mut self) -> Option<usize> {
        None
    }
    /// Flush buffered output and wait for the encoder to finish.
    async fn drain(&mut self) -> SkyloopResult<()>;
    /// Deliver the artifact and return its path.
    fn finalize(&mut self) -> SkyloopResult<PathBuf>;
    /// Stop and discard partial output.
    fn abort(&mut self);
}

/// Ensure the parent directory of `path` exists.
pub fn ensure_parent_dir(path: &Path) -> SkyloopResult<()> {
    if let Some(parent) = path.parent() {
        use anyhow::Context as _;
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create output directory '{}'", parent.display()))?;
    }
    Ok(())
}

/// Sibling path partial output is written to before the final rename.
pub fn partial_path(out_path: &Path) -> PathBuf {
    let mut name = out_path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".part");
    out_path.with_file_name(name)
}

#[cfg(test)]
#[path = "../../tests/unit/export/backend.rs"]
mod tests;
