use std::sync::Arc;

use async_trait::async_trait;
use chrono::TimeZone;
use image::RgbaImage;
use tokio::sync::mpsc;

use super::*;
use crate::export::backend::partial_path;
use crate::export::resolve::ResolvedFrame;
use crate::export::worker::{FRAME_QUEUE, GifWorkerBackend};
use crate::foundation::core::Resolution;

#[derive(Default)]
struct RecordingBackend {
    paced: bool,
    pushes: usize,
    pushes_at_drain: Option<usize>,
    finalized: bool,
    aborted: bool,
    cancel_after: Option<(usize, CancellationToken)>,
    fail_at: Option<usize>,
    out_path: Option<PathBuf>,
}

#[async_trait]
impl EncoderBackend for RecordingBackend {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn paced(&self) -> bool {
        self.paced
    }

    fn begin(&mut self, cfg: &EncodeConfig) -> SkyloopResult<()> {
        self.out_path = Some(cfg.out_path.clone());
        Ok(())
    }

    async fn push_frame(&mut self, index: usize, _frame: &RgbaImage) -> SkyloopResult<()> {
        if self.fail_at == Some(index) {
            return Err(SkyloopError::encoding("encoder ran out of memory"));
        }
        self.pushes += 1;
        if let Some((after, token)) = &self.cancel_after
            && self.pushes == *after
        {
            token.cancel();
        }
        Ok(())
    }

    async fn drain(&mut self) -> SkyloopResult<()> {
        self.pushes_at_drain = Some(self.pushes);
        Ok(())
    }

    fn finalize(&mut self) -> SkyloopResult<PathBuf> {
        self.finalized = true;
        self.out_path
            .clone()
            .ok_or_else(|| SkyloopError::encoding("not started"))
    }

    fn abort(&mut self) {
        self.aborted = true;
    }
}

fn sequence(n: usize) -> ExportSequence {
    let base = Utc.with_ymd_and_hms(2026, 1, 19, 18, 0, 0).unwrap();
    ExportSequence::Single {
        source_key: "enlil".to_string(),
        label: Some("Enlil".to_string()),
        frames: (0..n)
            .map(|i| ResolvedFrame {
                timestamp: base + chrono::Duration::minutes(i as i64 * 10),
                image: Arc::new(RgbaImage::from_pixel(4, 4, image::Rgba([200, 0, 0, 255]))),
            })
            .collect(),
    }
}

fn encoder() -> ExportEncoder {
    ExportEncoder::new(
        Compositor::new(Resolution::new(16, 8).unwrap(), None),
        Duration::from_millis(200),
    )
}

#[tokio::test]
async fn completes_with_n_compositions_before_draining() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut job = ExportJob::new(ExportFormat::Gif, 5).with_listener(tx);
    let mut backend = RecordingBackend::default();
    let mut enc = encoder();

    let outcome = enc
        .run(
            &mut job,
            &sequence(5),
            &mut backend,
            PathBuf::from("/out/a.gif"),
            &CancellationToken::new(),
        )
        .await;

    assert_eq!(
        outcome,
        ExportOutcome::Complete {
            artifact: PathBuf::from("/out/a.gif"),
            frames: 5
        }
    );
    assert_eq!(backend.pushes_at_drain, Some(5));
    assert_eq!(enc.compositor().compositions(), 5);
    assert!(backend.finalized && !backend.aborted);
    assert_eq!(job.state(), &ExportState::Complete);

    let mut rendered_before_drain = 0;
    let mut states = Vec::new();
    while let Ok(event) = rx.try_recv() {
        match event {
            ExportEvent::State(s) => states.push(s),
            ExportEvent::Progress(p) if p.stage == Stage::Rendering => {
                if !states.contains(&ExportState::Draining) {
                    rendered_before_drain += 1;
                }
            }
            ExportEvent::Progress(_) => {}
        }
    }
    assert_eq!(rendered_before_drain, 5);
    assert_eq!(
        states,
        vec![
            ExportState::Running,
            ExportState::Draining,
            ExportState::Finalizing,
            ExportState::Complete
        ]
    );
}

#[tokio::test]
async fn cancellation_mid_job_delivers_nothing() {
    let cancel = CancellationToken::new();
    let mut job = ExportJob::new(ExportFormat::Gif, 6);
    let mut backend = RecordingBackend {
        cancel_after: Some((2, cancel.clone())),
        ..Default::default()
    };
    let mut enc = encoder();

    let outcome = enc
        .run(
            &mut job,
            &sequence(6),
            &mut backend,
            PathBuf::from("/out/a.gif"),
            &cancel,
        )
        .await;

    assert_eq!(outcome, ExportOutcome::Cancelled);
    assert_eq!(job.state(), &ExportState::Cancelled);
    assert_eq!(backend.pushes, 2);
    assert!(backend.aborted);
    assert!(!backend.finalized);
    assert_eq!(backend.pushes_at_drain, None);
}

#[tokio::test]
async fn backend_failure_ends_in_error_without_artifact() {
    let mut job = ExportJob::new(ExportFormat::Webm, 4);
    let mut backend = RecordingBackend {
        fail_at: Some(1),
        ..Default::default()
    };
    let outcome = encoder()
        .run(
            &mut job,
            &sequence(4),
            &mut backend,
            PathBuf::from("/out/a.webm"),
            &CancellationToken::new(),
        )
        .await;

    let ExportOutcome::Failed(cause) = outcome else {
        panic!("expected failure, got {outcome:?}");
    };
    assert!(cause.contains("out of memory"));
    assert!(matches!(job.state(), ExportState::Error(_)));
    assert!(backend.aborted && !backend.finalized);
}

#[tokio::test]
async fn already_cancelled_job_never_starts() {
    let cancel = CancellationToken::new();
    cancel.cancel();
    let mut job = ExportJob::new(ExportFormat::Gif, 2);
    let mut backend = RecordingBackend::default();
    let outcome = encoder()
        .run(&mut job, &sequence(2), &mut backend, PathBuf::from("/out/a.gif"), &cancel)
        .await;
    assert_eq!(outcome, ExportOutcome::Cancelled);
    assert_eq!(backend.pushes, 0);
    assert_eq!(backend.out_path, None);
}

#[tokio::test]
async fn empty_sequence_fails() {
    let mut job = ExportJob::new(ExportFormat::Gif, 0);
    let outcome = encoder()
        .run(
            &mut job,
            &sequence(0),
            &mut RecordingBackend::default(),
            PathBuf::from("/out/a.gif"),
            &CancellationToken::new(),
        )
        .await;
    assert!(matches!(outcome, ExportOutcome::Failed(_)));
}

#[tokio::test(start_paused = true)]
async fn paced_backends_wait_frame_delay_per_frame() {
    let mut job = ExportJob::new(ExportFormat::Mp4, 3);
    let mut backend = RecordingBackend {
        paced: true,
        ..Default::default()
    };
    let started = tokio::time::Instant::now();
    let outcome = encoder()
        .run(
            &mut job,
            &sequence(3),
            &mut backend,
            PathBuf::from("/out/a.mp4"),
            &CancellationToken::new(),
        )
        .await;
    assert!(matches!(outcome, ExportOutcome::Complete { .. }));
    assert!(started.elapsed() >= Duration::from_millis(600));
}

#[tokio::test]
async fn gif_export_writes_named_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let settings = ExportSettings {
        width: 32,
        height: 16,
        frame_delay_ms: 100,
        caption_font: Some(dir.path().join("no-such-font.ttf")),
        ..ExportSettings::default()
    };
    let created = Utc.with_ymd_and_hms(2026, 1, 19, 19, 0, 0).unwrap();
    let outcome = export_sequence(
        &sequence(3),
        ExportFormat::Gif,
        &settings,
        dir.path(),
        created,
        &CancellationToken::new(),
        None,
    )
    .await
    .unwrap();

    let expected = dir.path().join("skyloop-enlil-20260119T190000Z.gif");
    assert_eq!(
        outcome,
        ExportOutcome::Complete {
            artifact: expected.clone(),
            frames: 3
        }
    );
    assert!(std::fs::read(&expected).unwrap().starts_with(b"GIF89a"));
}

#[tokio::test]
async fn gif_export_cancelled_after_first_frame_stops_promptly() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("loop.gif");
    let cancel = CancellationToken::new();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut job = ExportJob::new(ExportFormat::Gif, 40).with_listener(tx);
    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if let ExportEvent::Progress(p) = event
                    && p.stage == Stage::Rendering
                {
                    cancel.cancel();
                    break;
                }
            }
        })
    };

    let mut backend = GifWorkerBackend::new();
    let mut enc = ExportEncoder::new(
        Compositor::new(Resolution::new(320, 240).unwrap(), None),
        Duration::from_millis(100),
    );
    let started = std::time::Instant::now();
    let outcome = enc
        .run(&mut job, &sequence(40), &mut backend, out.clone(), &cancel)
        .await;
    watcher.await.unwrap();

    assert_eq!(outcome, ExportOutcome::Cancelled);
    assert_eq!(job.state(), &ExportState::Cancelled);
    assert!(enc.compositor().compositions() <= 1 + FRAME_QUEUE);
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(!out.exists());
    assert!(!partial_path(&out).exists());
}

#[tokio::test]
async fn cancel_during_drain_ends_cancelled() {
    struct StuckDrain(RecordingBackend);

    #[async_trait]
    impl EncoderBackend for StuckDrain {
        fn name(&self) -> &'static str {
            "stuck"
        }
        fn paced(&self) -> bool {
            false
        }
        fn begin(&mut self, cfg: &EncodeConfig) -> SkyloopResult<()> {
            self.0.begin(cfg)
        }
        async fn push_frame(&mut self, index: usize, frame: &RgbaImage) -> SkyloopResult<()> {
            self.0.push_frame(index, frame).await
        }
        async fn drain(&mut self) -> SkyloopResult<()> {
            std::future::pending().await
        }
        fn finalize(&mut self) -> SkyloopResult<PathBuf> {
            self.0.finalize()
        }
        fn abort(&mut self) {
            self.0.abort();
        }
    }

    let cancel = CancellationToken::new();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut job = ExportJob::new(ExportFormat::Gif, 2).with_listener(tx);
    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if event == ExportEvent::State(ExportState::Draining) {
                    cancel.cancel();
                    break;
                }
            }
        })
    };
    let mut backend = StuckDrain(RecordingBackend::default());
    let outcome = encoder()
        .run(&mut job, &sequence(2), &mut backend, PathBuf::from("/out/a.gif"), &cancel)
        .await;
    watcher.await.unwrap();

    assert_eq!(outcome, ExportOutcome::Cancelled);
    assert_eq!(job.state(), &ExportState::Cancelled);
    assert!(backend.0.aborted && !backend.0.finalized);
}
