use std::path::PathBuf;
use std::thread::JoinHandle;

use async_trait::async_trait;
use image::codecs::gif::{GifEncoder, Repeat};
use image::{Delay, RgbaImage};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::export::backend::{EncodeConfig, EncoderBackend, ensure_parent_dir, partial_path};
use crate::foundation::error::{SkyloopError, SkyloopResult};

/// NeuQuant sampling factor: 1 is best quality, 30 fastest.
const GIF_SPEED: i32 = 10;

/// Frames queued ahead of the encoder thread before `push_frame` waits.
pub const FRAME_QUEUE: usize = 2;

enum WorkerCommand {
    Frame(RgbaImage),
    Finish,
}

/// Messages from the background encoder thread.
#[derive(Debug)]
pub enum WorkerEvent {
    /// Frames fully quantized and written so far.
    Progress {
        /// Running count.
        encoded: usize,
    },
    /// Encoding finished; the complete GIF.
    Done(Vec<u8>),
    /// Encoding failed.
    Failed(String),
}

/// Incremental GIF encoder on a background thread, fed over a bounded channel.
///
/// At most [`FRAME_QUEUE`] frames wait ahead of the encoder; `abort` stops the thread before
/// its next frame.
#[derive(Default)]
pub struct GifWorkerBackend {
    commands: Option<mpsc::Sender<WorkerCommand>>,
    events: Option<mpsc::UnboundedReceiver<WorkerEvent>>,
    thread: Option<JoinHandle<()>>,
    stop: CancellationToken,
    cfg: Option<EncodeConfig>,
    encoded: usize,
    blob: Option<Vec<u8>>,
    failure: Option<String>,
}

impl GifWorkerBackend {
    /// Idle worker backend; the thread starts in `begin`.
    pub fn new() -> Self {
        Self::default()
    }

    fn apply(&mut self, event: WorkerEvent) {
        match event {
            WorkerEvent::Progress { encoded } => self.encoded = self.encoded.max(encoded),
            WorkerEvent::Done(blob) => self.blob = Some(blob),
            WorkerEvent::Failed(cause) => self.failure = Some(cause),
        }
    }

    fn poll(&mut self) {
        let mut pending = Vec::new();
        if let Some(rx) = self.events.as_mut() {
            while let Ok(event) = rx.try_recv() {
                pending.push(event);
            }
        }
        for event in pending {
            self.apply(event);
        }
    }

    fn check_failure(&self) -> SkyloopResult<()> {
        match &self.failure {
            Some(cause) => Err(SkyloopError::encoding(format!("gif worker failed: {cause}"))),
            None => Ok(()),
        }
    }

    fn join(&mut self) {
        if let Some(handle) = self.thread.take()
            && handle.join().is_err()
        {
            warn!("gif worker thread panicked");
        }
    }
}

fn encode_frames(
    blob: &mut Vec<u8>,
    delay: Delay,
    commands: &mut mpsc::Receiver<WorkerCommand>,
    events: &mpsc::UnboundedSender<WorkerEvent>,
    stop: &CancellationToken,
) -> Result<bool, String> {
    let mut encoder = GifEncoder::new_with_speed(blob, GIF_SPEED);
    encoder
        .set_repeat(Repeat::Infinite)
        .map_err(|e| e.to_string())?;
    let mut encoded = 0;
    while let Some(command) = commands.blocking_recv() {
        if stop.is_cancelled() {
            return Ok(false);
        }
        match command {
            WorkerCommand::Frame(image) => {
                encoder
                    .encode_frame(image::Frame::from_parts(image, 0, 0, delay))
                    .map_err(|e| e.to_string())?;
                encoded += 1;
                let _ = events.send(WorkerEvent::Progress { encoded });
            }
            WorkerCommand::Finish => return Ok(true),
        }
    }
    Ok(false)
}

fn run_worker(
    delay: Delay,
    mut commands: mpsc::Receiver<WorkerCommand>,
    events: mpsc::UnboundedSender<WorkerEvent>,
    stop: CancellationToken,
) {
    let mut blob = Vec::new();
    // The encoder writes the GIF trailer when dropped at the end of `encode_frames`.
    let event = match encode_frames(&mut blob, delay, &mut commands, &events, &stop) {
        Ok(true) => WorkerEvent::Done(blob),
        Ok(false) => {
            debug!("gif worker stopped");
            return;
        }
        Err(cause) => WorkerEvent::Failed(cause),
    };
    let _ = events.send(event);
}

#[async_trait]
impl EncoderBackend for GifWorkerBackend {
    fn name(&self) -> &'static str {
        "gif-worker"
    }

    fn paced(&self) -> bool {
        false
    }

    fn begin(&mut self, cfg: &EncodeConfig) -> SkyloopResult<()> {
        cfg.validate()?;
        if self.thread.is_some() {
            return Err(SkyloopError::encoding("gif worker already started"));
        }
        let delay_ms = u32::try_from(cfg.frame_delay_ms()).unwrap_or(u32::MAX);
        let delay = Delay::from_numer_denom_ms(delay_ms, 1);
        let (cmd_tx, cmd_rx) = mpsc::channel(FRAME_QUEUE);
        let (ev_tx, ev_rx) = mpsc::unbounded_channel();
        let stop = CancellationToken::new();
        let worker_stop = stop.clone();
        let thread = std::thread::Builder::new()
            .name("skyloop-gif".to_string())
            .spawn(move || run_worker(delay, cmd_rx, ev_tx, worker_stop))
            .map_err(|e| SkyloopError::encoding(format!("failed to start gif worker: {e}")))?;

        debug!(delay_ms, "gif worker started");
        self.commands = Some(cmd_tx);
        self.events = Some(ev_rx);
        self.thread = Some(thread);
        self.stop = stop;
        self.cfg = Some(cfg.clone());
        self.encoded = 0;
        self.blob = None;
        self.failure = None;
        Ok(())
    }

    async fn push_frame(&mut self, _index: usize, frame: &RgbaImage) -> SkyloopResult<()> {
        self.poll();
        self.check_failure()?;
        let cfg = self
            .cfg
            .as_ref()
            .ok_or_else(|| SkyloopError::encoding("gif worker not started"))?;
        if frame.dimensions() != (cfg.resolution.width, cfg.resolution.height) {
            return Err(SkyloopError::validation(format!(
                "frame size mismatch: got {}x{}, expected {}x{}",
                frame.width(),
                frame.height(),
                cfg.resolution.width,
                cfg.resolution.height
            )));
        }
        let sender = self
            .commands
            .as_ref()
            .ok_or_else(|| SkyloopError::encoding("gif worker already drained"))?;
        if sender.send(WorkerCommand::Frame(frame.clone())).await.is_err() {
            self.poll();
            self.check_failure()?;
            return Err(SkyloopError::encoding("gif worker exited unexpectedly"));
        }
        Ok(())
    }

    fn encoded(&mut self) -> Option<usize> {
        self.poll();
        Some(self.encoded)
    }

    async fn drain(&mut self) -> SkyloopResult<()> {
        if let Some(sender) = self.commands.take() {
            let _ = sender.send(WorkerCommand::Finish).await;
        } else if self.thread.is_none() {
            return Err(SkyloopError::encoding("gif worker not started"));
        }

        while self.blob.is_none() && self.failure.is_none() {
            let next = match self.events.as_mut() {
                Some(rx) => rx.recv().await,
                None => None,
            };
            match next {
                Some(event) => self.apply(event),
                None => {
                    self.failure = Some("worker exited without a result".to_string());
                }
            }
        }
        // The worker has sent its last event, so the join does not wait on encoding.
        self.join();
        self.check_failure()
    }

    fn finalize(&mut self) -> SkyloopResult<PathBuf> {
        let blob = self
            .blob
            .take()
            .ok_or_else(|| SkyloopError::encoding("gif worker finalized before drain"))?;
        let cfg = self
            .cfg
            .take()
            .ok_or_else(|| SkyloopError::encoding("gif worker not started"))?;
        ensure_parent_dir(&cfg.out_path)?;
        let partial = partial_path(&cfg.out_path);
        std::fs::write(&partial, &blob)
            .and_then(|()| std::fs::rename(&partial, &cfg.out_path))
            .map_err(|e| {
                let _ = std::fs::remove_file(&partial);
                SkyloopError::encoding(format!(
                    "failed to write artifact '{}': {e}",
                    cfg.out_path.display()
                ))
            })?;
        debug!(bytes = blob.len(), path = %cfg.out_path.display(), "gif written");
        Ok(cfg.out_path)
    }

    fn abort(&mut self) {
        self.stop.cancel();
        drop(self.commands.take());
        self.join();
        self.events = None;
        self.blob = None;
        self.cfg = None;
    }
}

impl Drop for GifWorkerBackend {
    fn drop(&mut self) {
        if self.thread.is_some() {
            self.abort();
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/export/worker.rs"]
mod tests;
