use super::*;

#[test]
fn grid_shapes_follow_source_count() {
    let shape = |n| {
        let d = grid_dims(n);
        (d.cols, d.rows)
    };
    assert_eq!(shape(1), (1, 1));
    assert_eq!(shape(2), (2, 1));
    assert_eq!(shape(3), (2, 2));
    assert_eq!(shape(4), (2, 2));
    assert_eq!(shape(5), (3, 2));
    assert_eq!(shape(6), (3, 2));
    assert_eq!(shape(7), (4, 2));
    assert_eq!(shape(9), (4, 3));
    assert_eq!(shape(0), (1, 1));
}

#[test]
fn letterbox_pads_the_short_axis() {
    let dst = Rect::new(0.0, 0.0, 1280.0, 720.0);

    let square = letterbox(Size::new(512.0, 512.0), dst);
    assert_eq!(square.height(), 720.0);
    assert_eq!(square.width(), 720.0);
    assert_eq!(square.x0, 280.0);

    let wide = letterbox(Size::new(2000.0, 500.0), dst);
    assert!((wide.width() - 1280.0).abs() < 1e-6);
    assert!((wide.height() - 320.0).abs() < 1e-6);
    assert!((wide.y0 - 200.0).abs() < 1e-6);

    assert_eq!(letterbox(Size::ZERO, dst).area(), 0.0);
}

#[test]
fn grid_layout_reserves_header_and_fills_row_major() {
    let layout = grid_layout(5, Resolution::new(1280, 720).unwrap(), 4.0);
    assert_eq!(layout.dims, GridDims { cols: 3, rows: 2 });
    assert_eq!(layout.header.height(), 60.0);
    assert_eq!(layout.tiles.len(), 5);

    for tile in &layout.tiles {
        assert!(tile.y0 >= layout.header.y1);
        assert!(tile.x1 <= 1280.0 && tile.y1 <= 720.0);
    }
    assert!(layout.tiles[1].x0 > layout.tiles[0].x1);
    assert!(layout.tiles[3].y0 > layout.tiles[0].y1);
    assert_eq!(layout.tiles[3].x0, layout.tiles[0].x0);
}

#[test]
fn pixel_bounds_clip_to_canvas() {
    let canvas = Resolution::new(100, 50).unwrap();
    assert_eq!(
        pixel_bounds(Rect::new(-10.0, 10.0, 60.4, 80.0), canvas),
        (0, 10, 60, 40)
    );
}
