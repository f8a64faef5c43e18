use super::*;

#[test]
fn gif_always_uses_the_worker() {
    assert_eq!(
        select_backend(ExportFormat::Gif, false).unwrap(),
        BackendKind::Worker
    );
    assert_eq!(
        select_backend(ExportFormat::Gif, true).unwrap(),
        BackendKind::Worker
    );
}

#[test]
fn video_formats_need_ffmpeg() {
    assert_eq!(
        select_backend(ExportFormat::Webm, true).unwrap(),
        BackendKind::LiveCapture
    );
    let err = select_backend(ExportFormat::Mp4, false).unwrap_err();
    assert!(matches!(err, SkyloopError::Encoding(_)));
}

#[test]
fn config_validation_catches_bad_values() {
    let cfg = EncodeConfig {
        resolution: Resolution::default(),
        frame_delay: Duration::from_millis(200),
        out_path: PathBuf::from("out/a.gif"),
    };
    cfg.validate().unwrap();
    assert_eq!(cfg.frame_delay_ms(), 200);

    let zero = EncodeConfig {
        frame_delay: Duration::ZERO,
        ..cfg.clone()
    };
    assert!(zero.validate().is_err());
}

#[test]
fn partial_path_sits_next_to_the_artifact() {
    assert_eq!(
        partial_path(Path::new("/tmp/out/skyloop-a.webm")),
        PathBuf::from("/tmp/out/skyloop-a.webm.part")
    );
}
