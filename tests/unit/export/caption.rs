use super::*;

#[test]
fn blend_pixel_mixes_by_alpha() {
    let mut px = image::Rgba([0, 0, 0, 255]);
    blend_pixel(&mut px, [255, 255, 255, 128]);
    assert_eq!(px.0, [128, 128, 128, 255]);

    let mut untouched = image::Rgba([10, 20, 30, 255]);
    blend_pixel(&mut untouched, [255, 0, 0, 0]);
    assert_eq!(untouched.0, [10, 20, 30, 255]);
}

#[test]
fn garbage_font_bytes_are_rejected() {
    let err = CaptionPainter::from_bytes(vec![0u8; 64]).unwrap_err();
    assert!(matches!(err, SkyloopError::Decode(_)));
}

#[test]
fn missing_configured_font_yields_none() {
    let dir = tempfile::tempdir().unwrap();
    assert!(CaptionPainter::discover(Some(&dir.path().join("absent.ttf"))).is_none());
}

#[test]
fn glyphs_clip_at_canvas_edges() {
    let glyph = GlyphBitmap {
        width: 3,
        height: 3,
        coverage: vec![255; 9],
    };
    let mut canvas = RgbaImage::from_pixel(2, 2, image::Rgba([0, 0, 0, 255]));
    blend_glyph(&mut canvas, -1, -1, &glyph, [255, 255, 255, 255]);
    assert!(canvas.pixels().all(|p| p.0 == [255, 255, 255, 255]));
}

#[test]
fn system_font_renders_visible_pixels_when_present() {
    let Some(mut painter) = CaptionPainter::discover(None) else {
        return;
    };
    let (w, h) = painter.measure("2026-01-19 18:30 UTC", 18.0);
    assert!(w > 0.0 && h > 0.0);

    let mut canvas = RgbaImage::from_pixel(300, 40, image::Rgba([0, 0, 0, 255]));
    painter.draw(&mut canvas, "18:30", 18.0, 4.0, 4.0, [255, 255, 255, 255]);
    assert!(canvas.pixels().any(|p| p.0[0] > 0));
}
