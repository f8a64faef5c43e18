use std::collections::HashMap;
use std::path::{Path, PathBuf};

use fontdue::layout::{
    CoordinateSystem, GlyphRasterConfig, HorizontalAlign, Layout, LayoutSettings, TextStyle,
    VerticalAlign, WrapStyle,
};
use fontdue::{Font, FontSettings};
use image::RgbaImage;
use tracing::{debug, warn};

use crate::foundation::error::{SkyloopError, SkyloopResult};

/// Fonts tried when no caption font is configured.
pub const SYSTEM_FONT_CANDIDATES: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/usr/share/fonts/liberation/LiberationSans-Regular.ttf",
    "/Library/Fonts/Arial.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

struct GlyphBitmap {
    width: usize,
    height: usize,
    coverage: Vec<u8>,
}

/// Rasterizes caption text onto RGBA canvases.
pub struct CaptionPainter {
    font: Font,
    glyphs: HashMap<GlyphRasterConfig, GlyphBitmap>,
}

impl std::fmt::Debug for CaptionPainter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptionPainter")
            .field("cached_glyphs", &self.glyphs.len())
            .finish()
    }
}

impl CaptionPainter {
    /// Parse a TTF/OTF font from memory.
    pub fn from_bytes(bytes: Vec<u8>) -> SkyloopResult<Self> {
        let font = Font::from_bytes(bytes, FontSettings::default())
            .map_err(|e| SkyloopError::decode(format!("failed to parse caption font: {e}")))?;
        Ok(Self {
            font,
            glyphs: HashMap::new(),
        })
    }

    /// Load a font file.
    pub fn from_path(path: &Path) -> SkyloopResult<Self> {
        use anyhow::Context as _;
        let bytes = std::fs::read(path)
            .with_context(|| format!("failed to read caption font '{}'", path.display()))?;
        Self::from_bytes(bytes)
    }

    /// Load `configured` if given, otherwise the first readable system font.
    ///
    /// Returns `None` (and logs a warning) when nothing loads; exports then carry no captions.
    pub fn discover(configured: Option<&Path>) -> Option<Self> {
        let candidates: Vec<PathBuf> = match configured {
            Some(path) => vec![path.to_path_buf()],
            None => SYSTEM_FONT_CANDIDATES.iter().map(PathBuf::from).collect(),
        };
        for path in &candidates {
            if !path.is_file() {
                continue;
            }
            match Self::from_path(path) {
                Ok(painter) => {
                    debug!(font = %path.display(), "caption font loaded");
                    return Some(painter);
                }
                Err(err) => warn!(font = %path.display(), error = %err, "caption font rejected"),
            }
        }
        warn!("no caption font available; exporting without captions");
        None
    }

    fn layout(&self, text: &str, px: f32, x: f32, y: f32) -> Layout {
        let mut layout = Layout::new(CoordinateSystem::PositiveYDown);
        layout.reset(&LayoutSettings {
            x,
            y,
            max_width: None,
            max_height: None,
            horizontal_align: HorizontalAlign::Left,
            vertical_align: VerticalAlign::Top,
            line_height: 1.0,
            wrap_style: WrapStyle::Letter,
            wrap_hard_breaks: true,
        });
        layout.append(&[&self.font], &TextStyle::new(text, px, 0));
        layout
    }

    /// Width and height in pixels of `text` set at `px`.
    pub fn measure(&self, text: &str, px: f32) -> (f32, f32) {
        let layout = self.layout(text, px, 0.0, 0.0);
        let width = layout
            .glyphs()
            .iter()
            .map(|g| g.x + g.width as f32)
            .fold(0.0_f32, f32::max);
        (width, layout.height())
    }

    /// Draw `text` with its top-left corner at `(x, y)`.
    pub fn draw(
        &mut self,
        canvas: &mut RgbaImage,
        text: &str,
        px: f32,
        x: f32,
        y: f32,
        color: [u8; 4],
    ) {
        let layout = self.layout(text, px, x, y);
        for glyph in layout.glyphs() {
            if glyph.width == 0 || glyph.height == 0 {
                continue;
            }
            let font = &self.font;
            let bitmap = self.glyphs.entry(glyph.key).or_insert_with(|| {
                let (_, coverage) = font.rasterize_config(glyph.key);
                GlyphBitmap {
                    width: glyph.width,
                    height: glyph.height,
                    coverage,
                }
            });
            blend_glyph(
                canvas,
                glyph.x.round() as i32,
                glyph.y.round() as i32,
                bitmap,
                color,
            );
        }
    }
}

fn blend_glyph(canvas: &mut RgbaImage, x: i32, y: i32, glyph: &GlyphBitmap, color: [u8; 4]) {
    let (w, h) = canvas.dimensions();
    for row in 0..glyph.height {
        let py = y + row as i32;
        if py < 0 || py >= h as i32 {
            continue;
        }
        for col in 0..glyph.width {
            let px = x + col as i32;
            if px < 0 || px >= w as i32 {
                continue;
            }
            let mask = glyph.coverage[row * glyph.width + col];
            if mask == 0 {
                continue;
            }
            let alpha = ((u16::from(mask) * u16::from(color[3])) / 255) as u8;
            blend_pixel(
                canvas.get_pixel_mut(px as u32, py as u32),
                [color[0], color[1], color[2], alpha],
            );
        }
    }
}

/// Source-over blend of straight-alpha `src` onto an opaque pixel.
pub(crate) fn blend_pixel(dst: &mut image::Rgba<u8>, src: [u8; 4]) {
    let alpha = u16::from(src[3]);
    if alpha == 0 {
        return;
    }
    let inv = 255 - alpha;
    for c in 0..3 {
        let d = u16::from(dst.0[c]);
        let s = u16::from(src[c]);
        dst.0[c] = ((s * alpha + d * inv + 127) / 255) as u8;
    }
    dst.0[3] = 255;
}

#[cfg(test)]
#[path = "../../tests/unit/export/caption.rs"]
mod tests;
