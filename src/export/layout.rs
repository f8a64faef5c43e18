use kurbo::{Rect, Size};

use crate::foundation::core::Resolution;

/// Column/row split of a multi-source grid.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GridDims {
    /// Tiles per row.
    pub cols: u32,
    /// Number of rows.
    pub rows: u32,
}

impl GridDims {
    /// Number of tile slots.
    pub fn slots(self) -> u32 {
        self.cols * self.rows
    }
}

/// Grid shape for `sources` tiles.
///
/// Shapes are columns×rows. Up to two sources sit side by side in one row (n×1, not a single
/// stacked column), three or four form a 2×2, five or six a 3×2, and anything larger uses four
/// columns with as many rows as needed.
pub fn grid_dims(sources: usize) -> GridDims {
    let n = sources.max(1) as u32;
    let cols = match n {
        1..=2 => n,
        3..=4 => 2,
        5..=6 => 3,
        _ => 4,
    };
    GridDims {
        cols,
        rows: n.div_ceil(cols),
    }
}

/// Largest rect with `src`'s aspect ratio that fits inside `dst`, centered.
pub fn letterbox(src: Size, dst: Rect) -> Rect {
    if src.width <= 0.0 || src.height <= 0.0 || dst.width() <= 0.0 || dst.height() <= 0.0 {
        return Rect::from_center_size(dst.center(), Size::ZERO);
    }
    let scale = (dst.width() / src.width).min(dst.height() / src.height);
    Rect::from_center_size(dst.center(), Size::new(src.width * scale, src.height * scale))
}

/// Pixel placement of a multi-source composition.
#[derive(Clone, Debug, PartialEq)]
pub struct GridLayout {
    /// Grid shape.
    pub dims: GridDims,
    /// Band across the top reserved for the shared timestamp.
    pub header: Rect,
    /// One cell per source, row-major.
    pub tiles: Vec<Rect>,
}

/// Header band height for a canvas of the given height.
pub fn header_height(canvas_height: u32) -> f64 {
    (f64::from(canvas_height) / 12.0).round().max(24.0)
}

/// Lay `sources` tiles out on `canvas`, leaving `gap` pixels between cells.
pub fn grid_layout(sources: usize, canvas: Resolution, gap: f64) -> GridLayout {
    let dims = grid_dims(sources);
    let width = f64::from(canvas.width);
    let height = f64::from(canvas.height);
    let header = Rect::new(0.0, 0.0, width, header_height(canvas.height).min(height));

    let cols = f64::from(dims.cols);
    let rows = f64::from(dims.rows);
    let cell_w = ((width - gap * (cols + 1.0)) / cols).max(0.0);
    let cell_h = ((height - header.y1 - gap * (rows + 1.0)) / rows).max(0.0);

    let tiles = (0..sources)
        .map(|i| {
            let col = (i as u32 % dims.cols) as f64;
            let row = (i as u32 / dims.cols) as f64;
            let x0 = gap + col * (cell_w + gap);
            let y0 = header.y1 + gap + row * (cell_h + gap);
            Rect::new(x0, y0, x0 + cell_w, y0 + cell_h)
        })
        .collect();

    GridLayout {
        dims,
        header,
        tiles,
    }
}

/// Integer pixel bounds of `rect`, clipped to the canvas.
pub fn pixel_bounds(rect: Rect, canvas: Resolution) -> (u32, u32, u32, u32) {
    let r = rect.round();
    let x0 = r.x0.clamp(0.0, f64::from(canvas.width)) as u32;
    let y0 = r.y0.clamp(0.0, f64::from(canvas.height)) as u32;
    let x1 = r.x1.clamp(0.0, f64::from(canvas.width)) as u32;
    let y1 = r.y1.clamp(0.0, f64::from(canvas.height)) as u32;
    (x0, y0, x1.saturating_sub(x0), y1.saturating_sub(y0))
}

#[cfg(test)]
#[path = "../../tests/unit/export/layout.rs"]
mod tests;
