use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::ExportSettings;
use crate::export::backend::{EncodeConfig, EncoderBackend, backend_for};
use crate::export::caption::CaptionPainter;
use crate::export::compose::Compositor;
use crate::export::job::{ExportEvent, ExportFormat, ExportJob, ExportState, Stage, artifact_name};
use crate::export::resolve::ExportSequence;
use crate::foundation::error::{SkyloopError, SkyloopResult};

/// How an export ended. Exactly one is produced per job.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExportOutcome {
    /// The artifact was written.
    Complete {
        /// Artifact path.
        artifact: PathBuf,
        /// Frames encoded.
        frames: usize,
    },
    /// The user cancelled; nothing was written.
    Cancelled,
    /// Composition or encoding failed; nothing was written.
    Failed(String),
}

/// Sequential driving loop: compose frame `i`, hand it to the backend, pace, repeat.
pub struct ExportEncoder {
    compositor: Compositor,
    frame_delay: Duration,
}

impl ExportEncoder {
    /// Loop composing with `compositor` and showing each frame for `frame_delay`.
    pub fn new(compositor: Compositor, frame_delay: Duration) -> Self {
        Self {
            compositor,
            frame_delay,
        }
    }

    /// The compositor, e.g. to inspect how many frames were composed.
    pub fn compositor(&self) -> &Compositor {
        &self.compositor
    }

    /// Run `job` over `sequence` into `backend`, delivering to `out_path` on success.
    ///
    /// Cancellation is checked at every frame boundary and interrupts a push or drain that is
    /// waiting on the backend. On cancellation or failure the backend is aborted and no artifact
    /// is left behind.
    #[tracing::instrument(skip_all, fields(format = %job.format(), frames = sequence.len(), backend = backend.name()))]
    pub async fn run(
        &mut self,
        job: &mut ExportJob,
        sequence: &ExportSequence,
        backend: &mut dyn EncoderBackend,
        out_path: PathBuf,
        cancel: &CancellationToken,
    ) -> ExportOutcome {
        match self.drive(job, sequence, backend, out_path, cancel).await {
            Ok(artifact) => {
                info!(artifact = %artifact.display(), "export complete");
                ExportOutcome::Complete {
                    artifact,
                    frames: sequence.len(),
                }
            }
            Err(SkyloopError::Cancelled) => {
                backend.abort();
                if let Err(err) = job.transition(ExportState::Cancelled) {
                    warn!(error = %err, "cancel arrived in a non-cancellable state");
                }
                info!("export cancelled");
                ExportOutcome::Cancelled
            }
            Err(err) => {
                backend.abort();
                let cause = err.to_string();
                if let Err(fsm) = job.transition(ExportState::Error(cause.clone())) {
                    warn!(error = %fsm, "failure reported in a terminal state");
                }
                warn!(cause = %cause, "export failed");
                ExportOutcome::Failed(cause)
            }
        }
    }

    async fn drive(
        &mut self,
        job: &mut ExportJob,
        sequence: &ExportSequence,
        backend: &mut dyn EncoderBackend,
        out_path: PathBuf,
        cancel: &CancellationToken,
    ) -> SkyloopResult<PathBuf> {
        if sequence.is_empty() {
            return Err(SkyloopError::validation("nothing to export"));
        }
        if cancel.is_cancelled() {
            return Err(SkyloopError::Cancelled);
        }
        let cfg = EncodeConfig {
            resolution: self.compositor.resolution(),
            frame_delay: self.frame_delay,
            out_path,
        };
        job.transition(ExportState::Running)?;
        backend.begin(&cfg)?;

        let total = sequence.len();
        for index in 0..total {
            if cancel.is_cancelled() {
                return Err(SkyloopError::Cancelled);
            }
            let frame = self.compositor.compose(sequence, index)?;
            tokio::select! {
                _ = cancel.cancelled() => return Err(SkyloopError::Cancelled),
                pushed = backend.push_frame(index, &frame) => pushed?,
            }
            job.report(index + 1, total, Stage::Rendering)?;
            if let Some(encoded) = backend.encoded() {
                job.report(encoded, total, Stage::Encoding)?;
            }
            if backend.paced() {
                tokio::select! {
                    _ = cancel.cancelled() => return Err(SkyloopError::Cancelled),
                    _ = tokio::time::sleep(self.frame_delay) => {}
                }
            } else {
                // Let Ctrl-C and progress listeners run between frames.
                tokio::task::yield_now().await;
            }
        }
        if cancel.is_cancelled() {
            return Err(SkyloopError::Cancelled);
        }

        job.transition(ExportState::Draining)?;
        tokio::select! {
            _ = cancel.cancelled() => return Err(SkyloopError::Cancelled),
            drained = backend.drain() => drained?,
        }
        if let Some(encoded) = backend.encoded() {
            job.report(encoded, total, Stage::Encoding)?;
        }

        job.transition(ExportState::Finalizing)?;
        job.report(0, 1, Stage::Finalizing)?;
        let artifact = backend.finalize()?;
        job.report(1, 1, Stage::Finalizing)?;
        job.transition(ExportState::Complete)?;
        Ok(artifact)
    }
}

/// Export `sequence` as `format` into `out_dir`, picking the backend and caption font from
/// `settings`.
pub async fn export_sequence(
    sequence: &ExportSequence,
    format: ExportFormat,
    settings: &ExportSettings,
    out_dir: &Path,
    created_at: DateTime<Utc>,
    cancel: &CancellationToken,
    listener: Option<UnboundedSender<ExportEvent>>,
) -> SkyloopResult<ExportOutcome> {
    let resolution = match format {
        ExportFormat::Gif => settings.resolution()?,
        ExportFormat::Webm | ExportFormat::Mp4 => settings.resolution()?.even(),
    };
    let mut backend = backend_for(format)?;
    let captions = CaptionPainter::discover(settings.caption_font.as_deref());
    let name = artifact_name(
        &settings.artifact_prefix,
        sequence.subject_key(),
        format,
        created_at,
    );

    let mut job = ExportJob::new(format, sequence.len());
    if let Some(tx) = listener {
        job = job.with_listener(tx);
    }
    let mut encoder = ExportEncoder::new(
        Compositor::new(resolution, captions),
        Duration::from_millis(settings.frame_delay_ms.max(1)),
    );
    Ok(encoder
        .run(
            &mut job,
            sequence,
            backend.as_mut(),
            out_dir.join(name),
            cancel,
        )
        .await)
}

#[cfg(test)]
#[path = "../../tests/unit/export/encoder.rs"]
mod tests;
