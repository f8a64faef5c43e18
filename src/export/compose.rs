use chrono::{DateTime, Utc};
use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};
use kurbo::{Rect, Size};

use crate::export::caption::{CaptionPainter, blend_pixel};
use crate::export::layout::{grid_layout, letterbox, pixel_bounds};
use crate::export::resolve::{ExportSequence, ResolvedEntry, TileSource};
use crate::foundation::core::Resolution;
use crate::foundation::error::{SkyloopError, SkyloopResult};

const BACKGROUND: [u8; 4] = [0, 0, 0, 255];
const HEADER_FILL: [u8; 4] = [16, 20, 24, 255];
const TILE_FILL: [u8; 4] = [22, 22, 28, 255];
const CAPTION_BACKING: [u8; 4] = [0, 0, 0, 160];
const CAPTION_TEXT: [u8; 4] = [255, 255, 255, 255];
const TILE_GAP: f64 = 4.0;

/// Caption text for a frame instant.
pub fn timestamp_caption(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M UTC").to_string()
}

/// Draws export frames onto a fixed-size canvas.
///
/// Every call returns a fresh opaque RGBA canvas; only one is in flight per driving loop.
#[derive(Debug)]
pub struct Compositor {
    resolution: Resolution,
    captions: Option<CaptionPainter>,
    compositions: usize,
}

impl Compositor {
    /// Compositor for `resolution`; without a painter frames carry no captions.
    pub fn new(resolution: Resolution, captions: Option<CaptionPainter>) -> Self {
        Self {
            resolution,
            captions,
            compositions: 0,
        }
    }

    /// Canvas size.
    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    /// Return `true` when captions are rendered.
    pub fn has_captions(&self) -> bool {
        self.captions.is_some()
    }

    /// Number of frames composed so far.
    pub fn compositions(&self) -> usize {
        self.compositions
    }

    /// Compose output frame `index` of `sequence`.
    pub fn compose(&mut self, sequence: &ExportSequence, index: usize) -> SkyloopResult<RgbaImage> {
        let out_of_range = || {
            SkyloopError::validation(format!(
                "frame {index} out of range for a {}-frame sequence",
                sequence.len()
            ))
        };
        match sequence {
            ExportSequence::Single { label, frames, .. } => {
                let frame = frames.get(index).ok_or_else(out_of_range)?;
                Ok(self.single(&frame.image, frame.timestamp, label.as_deref()))
            }
            ExportSequence::Grid { sources, entries } => {
                let entry = entries.get(index).ok_or_else(out_of_range)?;
                Ok(self.grid(sources, entry))
            }
        }
    }

    /// Letterbox `image` full-canvas with a bottom-center timestamp and optional top-left label.
    pub fn single(
        &mut self,
        image: &RgbaImage,
        timestamp: DateTime<Utc>,
        label: Option<&str>,
    ) -> RgbaImage {
        let res = self.resolution;
        let mut canvas = RgbaImage::from_pixel(res.width, res.height, Rgba(BACKGROUND));
        let full = Rect::new(0.0, 0.0, f64::from(res.width), f64::from(res.height));
        draw_fitted(&mut canvas, image, full, res);

        let px = caption_px(res.height);
        let margin = (px * 0.6).round();
        if let Some(painter) = self.captions.as_mut() {
            let text = timestamp_caption(timestamp);
            let (tw, th) = painter.measure(&text, px);
            let x = ((res.width as f32 - tw) / 2.0).max(0.0);
            let y = (res.height as f32 - th - margin).max(0.0);
            draw_caption(painter, &mut canvas, &text, px, x, y, res);

            if let Some(label) = label.filter(|l| !l.is_empty()) {
                draw_caption(painter, &mut canvas, label, px, margin, margin, res);
            }
        }
        self.compositions += 1;
        canvas
    }

    /// Tile `entry` across a grid sized for `sources`, with the shared timestamp in the header.
    pub fn grid(&mut self, sources: &[TileSource], entry: &ResolvedEntry) -> RgbaImage {
        let res = self.resolution;
        let mut canvas = RgbaImage::from_pixel(res.width, res.height, Rgba(BACKGROUND));
        let layout = grid_layout(sources.len(), res, TILE_GAP);
        fill_rect(&mut canvas, layout.header, HEADER_FILL, res);

        let header_px = (layout.header.height() as f32 * 0.5).max(10.0);
        let label_px = (header_px * 0.7).max(10.0);
        for (source, tile) in sources.iter().zip(&layout.tiles) {
            fill_rect(&mut canvas, *tile, TILE_FILL, res);
            if let Some(image) = entry.images.get(&source.key) {
                draw_fitted(&mut canvas, image, *tile, res);
            }
            if let Some(painter) = self.captions.as_mut() {
                let pad = (label_px * 0.4).round();
                let (x, y) = (tile.x0 as f32 + pad, tile.y0 as f32 + pad);
                draw_caption(painter, &mut canvas, &source.label, label_px, x, y, res);
                if !entry.images.contains_key(&source.key) {
                    let (tw, th) = painter.measure("no data", label_px);
                    let c = tile.center();
                    let (x, y) = (c.x as f32 - tw / 2.0, c.y as f32 - th / 2.0);
                    draw_caption(painter, &mut canvas, "no data", label_px, x, y, res);
                }
            }
        }

        if let Some(painter) = self.captions.as_mut() {
            let text = timestamp_caption(entry.timestamp);
            let (tw, th) = painter.measure(&text, header_px);
            let c = layout.header.center();
            let (x, y) = (c.x as f32 - tw / 2.0, c.y as f32 - th / 2.0);
            painter.draw(&mut canvas, &text, header_px, x, y, CAPTION_TEXT);
        }
        self.compositions += 1;
        canvas
    }
}

fn caption_px(canvas_height: u32) -> f32 {
    (canvas_height as f32 / 24.0).round().max(12.0)
}

fn draw_caption(
    painter: &mut CaptionPainter,
    canvas: &mut RgbaImage,
    text: &str,
    px: f32,
    x: f32,
    y: f32,
    res: Resolution,
) {
    let (tw, th) = painter.measure(text, px);
    let pad = f64::from(px) * 0.25;
    let backing = Rect::new(
        f64::from(x) - pad,
        f64::from(y) - pad,
        f64::from(x + tw) + pad,
        f64::from(y + th) + pad,
    );
    fill_rect(canvas, backing, CAPTION_BACKING, res);
    painter.draw(canvas, text, px, x, y, CAPTION_TEXT);
}

/// Scale `image` to fit `cell` preserving aspect ratio and paste it centered.
fn draw_fitted(canvas: &mut RgbaImage, image: &RgbaImage, cell: Rect, res: Resolution) {
    let (iw, ih) = image.dimensions();
    let fit = letterbox(Size::new(f64::from(iw), f64::from(ih)), cell);
    let (x, y, w, h) = pixel_bounds(fit, res);
    if w == 0 || h == 0 {
        return;
    }
    if (w, h) == (iw, ih) {
        imageops::overlay(canvas, image, i64::from(x), i64::from(y));
    } else {
        let scaled = imageops::resize(image, w, h, FilterType::Triangle);
        imageops::overlay(canvas, &scaled, i64::from(x), i64::from(y));
    }
}

fn fill_rect(canvas: &mut RgbaImage, rect: Rect, color: [u8; 4], res: Resolution) {
    let (x0, y0, w, h) = pixel_bounds(rect, res);
    for y in y0..y0 + h {
        for x in x0..x0 + w {
            let px = canvas.get_pixel_mut(x, y);
            if color[3] == 255 {
                *px = Rgba(color);
            } else {
                blend_pixel(px, color);
            }
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/export/compose.rs"]
mod tests;
