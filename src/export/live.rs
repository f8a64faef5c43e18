use std::io::Read;
use std::path::PathBuf;
use std::process::{Child, ChildStdin, Command, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use image::RgbaImage;
use tracing::{debug, warn};

use crate::export::backend::{EncodeConfig, EncoderBackend, ensure_parent_dir, partial_path};
use crate::export::job::ExportFormat;
use crate::foundation::error::{SkyloopError, SkyloopResult};

/// Interval between exit checks while waiting for `ffmpeg` to finish.
const EXIT_POLL: Duration = Duration::from_millis(20);

/// Frame-paced capture stream that pipes raw RGBA frames into the system `ffmpeg`.
///
/// Output goes to a `.part` file that is renamed into place by `finalize`; `abort` deletes it.
pub struct LiveCaptureBackend {
    format: ExportFormat,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    stderr_drain: Option<std::thread::JoinHandle<std::io::Result<Vec<u8>>>>,
    cfg: Option<EncodeConfig>,
    last_index: Option<usize>,
    drained: bool,
}

impl LiveCaptureBackend {
    /// Backend for a video `format`.
    pub fn new(format: ExportFormat) -> SkyloopResult<Self> {
        if format == ExportFormat::Gif {
            return Err(SkyloopError::validation(
                "gif is encoded by the worker backend, not ffmpeg",
            ));
        }
        Ok(Self {
            format,
            child: None,
            stdin: None,
            stderr_drain: None,
            cfg: None,
            last_index: None,
            drained: false,
        })
    }

    async fn reap(&mut self) -> SkyloopResult<()> {
        let child = self
            .child
            .as_mut()
            .ok_or_else(|| SkyloopError::encoding("capture stream not started"))?;
        // The child stays owned here until it exits so `abort` can still kill it.
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => tokio::time::sleep(EXIT_POLL).await,
                Err(e) => {
                    return Err(SkyloopError::encoding(format!(
                        "failed to wait for ffmpeg: {e}"
                    )));
                }
            }
        };
        self.child = None;
        let stderr_bytes = match self.stderr_drain.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| SkyloopError::encoding("ffmpeg stderr drain thread panicked"))?
                .map_err(|e| SkyloopError::encoding(format!("ffmpeg stderr read failed: {e}")))?,
            None => Vec::new(),
        };
        if !status.success() {
            let stderr = String::from_utf8_lossy(&stderr_bytes);
            return Err(SkyloopError::encoding(format!(
                "ffmpeg exited with status {status}: {}",
                stderr.trim()
            )));
        }
        Ok(())
    }
}

/// Full `ffmpeg` argument list for `format`, writing to `target`.
pub fn ffmpeg_args(
    format: ExportFormat,
    cfg: &EncodeConfig,
    target: &std::path::Path,
) -> Vec<String> {
    let mut args: Vec<String> = [
        "-y",
        "-loglevel",
        "error",
        "-f",
        "rawvideo",
        "-pix_fmt",
        "rgba",
        "-s",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    args.push(format!("{}x{}", cfg.resolution.width, cfg.resolution.height));
    // Input rate as a rational so any whole-millisecond delay is exact.
    args.push("-r".to_string());
    args.push(format!("1000/{}", cfg.frame_delay_ms()));
    args.extend(["-i", "pipe:0", "-an"].map(String::from));

    let codec: &[&str] = match format {
        ExportFormat::Webm => &[
            "-c:v",
            "libvpx-vp9",
            "-pix_fmt",
            "yuv420p",
            "-b:v",
            "0",
            "-crf",
            "32",
            "-f",
            "webm",
        ],
        ExportFormat::Mp4 | ExportFormat::Gif => &[
            "-c:v",
            "libx264",
            "-pix_fmt",
            "yuv420p",
            "-movflags",
            "+faststart",
            "-f",
            "mp4",
        ],
    };
    args.extend(codec.iter().map(|s| s.to_string()));
    args.push(target.to_string_lossy().into_owned());
    args
}

/// Return `true` when `ffmpeg` can be invoked from `PATH`.
pub fn is_ffmpeg_on_path() -> bool {
    Command::new("ffmpeg")
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

#[async_trait]
impl EncoderBackend for LiveCaptureBackend {
    fn name(&self) -> &'static str {
        "live-capture"
    }

    fn paced(&self) -> bool {
        true
    }

    fn begin(&mut self, cfg: &EncodeConfig) -> SkyloopResult<()> {
        cfg.validate()?;
        let (w, h) = (cfg.resolution.width, cfg.resolution.height);
        if !w.is_multiple_of(2) || !h.is_multiple_of(2) {
            return Err(SkyloopError::validation(
                "capture width/height must be even (required for yuv420p output)",
            ));
        }
        ensure_parent_dir(&cfg.out_path)?;
        let target = partial_path(&cfg.out_path);

        let mut child = Command::new("ffmpeg")
            .args(ffmpeg_args(self.format, cfg, &target))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                SkyloopError::encoding(format!(
                    "failed to spawn ffmpeg (is it installed and on PATH?): {e}"
                ))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| SkyloopError::encoding("failed to open ffmpeg stdin (unexpected)"))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| SkyloopError::encoding("failed to open ffmpeg stderr (unexpected)"))?;
        let stderr_drain = std::thread::spawn(move || {
            let mut bytes = Vec::new();
            stderr.read_to_end(&mut bytes)?;
            Ok(bytes)
        });

        debug!(format = %self.format, width = w, height = h, "capture stream opened");
        self.child = Some(child);
        self.stdin = Some(stdin);
        self.stderr_drain = Some(stderr_drain);
        self.cfg = Some(cfg.clone());
        self.last_index = None;
        self.drained = false;
        Ok(())
    }

    async fn push_frame(&mut self, index: usize, frame: &RgbaImage) -> SkyloopResult<()> {
        let cfg = self
            .cfg
            .as_ref()
            .ok_or_else(|| SkyloopError::encoding("capture stream not started"))?;
        if let Some(last) = self.last_index
            && index <= last
        {
            return Err(SkyloopError::encoding(
                "capture stream received out-of-order frame",
            ));
        }
        self.last_index = Some(index);

        if frame.dimensions() != (cfg.resolution.width, cfg.resolution.height) {
            return Err(SkyloopError::validation(format!(
                "frame size mismatch: got {}x{}, expected {}x{}",
                frame.width(),
                frame.height(),
                cfg.resolution.width,
                cfg.resolution.height
            )));
        }

        let Some(stdin) = self.stdin.as_mut() else {
            return Err(SkyloopError::encoding("capture stream is already drained"));
        };
        use std::io::Write as _;
        stdin.write_all(frame.as_raw()).map_err(|e| {
            SkyloopError::encoding(format!("failed to write frame to ffmpeg stdin: {e}"))
        })?;
        Ok(())
    }

    async fn drain(&mut self) -> SkyloopResult<()> {
        if let Some(mut stdin) = self.stdin.take() {
            use std::io::Write as _;
            stdin.flush().map_err(|e| {
                SkyloopError::encoding(format!("failed to flush ffmpeg stdin: {e}"))
            })?;
        }
        self.reap().await?;
        self.drained = true;
        Ok(())
    }

    fn finalize(&mut self) -> SkyloopResult<PathBuf> {
        if !self.drained {
            return Err(SkyloopError::encoding("capture stream finalized before drain"));
        }
        let cfg = self
            .cfg
            .take()
            .ok_or_else(|| SkyloopError::encoding("capture stream not started"))?;
        std::fs::rename(partial_path(&cfg.out_path), &cfg.out_path).map_err(|e| {
            SkyloopError::encoding(format!(
                "failed to move artifact into '{}': {e}",
                cfg.out_path.display()
            ))
        })?;
        Ok(cfg.out_path)
    }

    fn abort(&mut self) {
        drop(self.stdin.take());
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
        if let Some(handle) = self.stderr_drain.take() {
            let _ = handle.join();
        }
        if let Some(cfg) = self.cfg.take() {
            let partial = partial_path(&cfg.out_path);
            if partial.exists()
                && let Err(err) = std::fs::remove_file(&partial)
            {
                warn!(path = %partial.display(), error = %err, "failed to remove partial output");
            }
        }
    }
}

impl Drop for LiveCaptureBackend {
    fn drop(&mut self) {
        if self.child.is_some() {
            self.abort();
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/export/live.rs"]
mod tests;
