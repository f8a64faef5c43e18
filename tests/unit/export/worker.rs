use std::time::Duration;

use super::*;
use crate::foundation::core::Resolution;

fn cfg(out: PathBuf) -> EncodeConfig {
    sized_cfg(out, 8, 6)
}

fn sized_cfg(out: PathBuf, width: u32, height: u32) -> EncodeConfig {
    EncodeConfig {
        resolution: Resolution::new(width, height).unwrap(),
        frame_delay: Duration::from_millis(150),
        out_path: out,
    }
}

fn frame(shade: u8) -> RgbaImage {
    RgbaImage::from_pixel(8, 6, image::Rgba([shade, 255 - shade, 0, 255]))
}

#[tokio::test]
async fn encodes_all_frames_into_a_gif() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("nested/loop.gif");
    let mut backend = GifWorkerBackend::new();
    backend.begin(&cfg(out.clone())).unwrap();
    for i in 0..4u8 {
        backend.push_frame(i as usize, &frame(i * 60)).await.unwrap();
    }
    backend.drain().await.unwrap();
    assert_eq!(backend.encoded(), Some(4));

    assert_eq!(backend.finalize().unwrap(), out);
    let bytes = std::fs::read(&out).unwrap();
    assert!(bytes.starts_with(b"GIF89a"));
    assert_eq!(bytes.last(), Some(&0x3b));
    assert!(!partial_path(&out).exists());
}

#[tokio::test]
async fn abort_leaves_no_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("loop.gif");
    let mut backend = GifWorkerBackend::new();
    backend.begin(&cfg(out.clone())).unwrap();
    backend.push_frame(0, &frame(0)).await.unwrap();
    backend.abort();

    assert!(backend.finalize().is_err());
    assert!(!out.exists());
    assert!(!partial_path(&out).exists());
}

#[tokio::test]
async fn abort_skips_frames_still_queued() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("big.gif");
    let mut backend = GifWorkerBackend::new();
    backend.begin(&sized_cfg(out.clone(), 640, 360)).unwrap();
    let big = RgbaImage::from_fn(640, 360, |x, y| {
        image::Rgba([(x % 251) as u8, (y % 241) as u8, ((x + y) % 239) as u8, 255])
    });
    for i in 0..=FRAME_QUEUE {
        backend.push_frame(i, &big).await.unwrap();
    }
    backend.abort();

    assert!(backend.encoded().unwrap() <= FRAME_QUEUE + 1);
    assert!(backend.drain().await.is_err());
    assert!(!out.exists());
    assert!(!partial_path(&out).exists());
}

#[tokio::test]
async fn wrong_frame_size_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let mut backend = GifWorkerBackend::new();
    backend.begin(&cfg(dir.path().join("a.gif"))).unwrap();
    let err = backend.push_frame(0, &RgbaImage::new(4, 4)).await.unwrap_err();
    assert!(matches!(err, SkyloopError::Validation(_)));
}

#[test]
fn finalize_before_drain_fails() {
    let dir = tempfile::tempdir().unwrap();
    let mut backend = GifWorkerBackend::new();
    backend.begin(&cfg(dir.path().join("a.gif"))).unwrap();
    assert!(backend.finalize().is_err());
    assert!(!backend.paced());
}
