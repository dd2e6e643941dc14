use std::fs;

use super::*;

fn identity_points() -> Vec<ControlPoint> {
    [(0, 0), (30, 0), (0, 20), (30, 20), (15, 10), (7, 13)]
        .iter()
        .map(|&(x, y)| ControlPoint { x_visible: x, y_visible: y, x_base: x, y_base: y })
        .collect()
}

/// Planar I420 frame with a deterministic Y gradient and flat chroma.
fn yuv_frame(dims: FrameDimensions, u: u8, v: u8) -> Vec<u8> {
    let n = dims.pixel_count();
    let mut frame = vec![0u8; dims.yuv420_len()];
    for y in 0..dims.height {
        for x in 0..dims.width {
            frame[y * dims.width + x] = ((x * 5 + y * 11) % 256) as u8;
        }
    }
    frame[n..n + n / 4].fill(u);
    frame[n + n / 4..].fill(v);
    frame
}

#[test]
fn test_identity_warp_preserves_interior() {
    let dims = FrameDimensions::new(32, 24);
    let registration = Registration::new(dims, dims, &identity_points()).unwrap();

    let src = yuv_frame(dims, 90, 160);
    let mut dst = vec![0u8; dims.yuv420_len()];
    registration.warp(&src, &mut dst);

    // The last row/column has no bilinear neighborhood and stays zero;
    // every interior pixel must survive exactly.
    for y in 0..dims.height - 1 {
        for x in 0..dims.width - 1 {
            assert_eq!(
                dst[y * dims.width + x],
                src[y * dims.width + x],
                "Y mismatch at ({x},{y})"
            );
        }
    }
}

#[test]
fn test_identity_warp_copies_chroma() {
    let dims = FrameDimensions::new(32, 24);
    let registration = Registration::new(dims, dims, &identity_points()).unwrap();

    let src = yuv_frame(dims, 77, 201);
    let mut dst = vec![0u8; dims.yuv420_len()];
    registration.warp(&src, &mut dst);

    let n = dims.pixel_count();
    // Chroma cells reachable from even destination pixels carry the source
    // values; the rest keep the neutral fill.
    let dst_u = &dst[n..n + n / 4];
    let dst_v = &dst[n + n / 4..];
    assert_eq!(dst_u[0], 77);
    assert_eq!(dst_v[0], 201);
}

#[test]
fn test_out_of_bounds_pixels_stay_untouched() {
    // A translation pushes part of the sampling grid outside the source;
    // those destination pixels keep zero Y and neutral chroma.
    let dims = FrameDimensions::new(32, 24);
    let points: Vec<ControlPoint> = identity_points()
        .into_iter()
        .map(|p| ControlPoint { x_base: p.x_visible + 20, ..p })
        .collect();
    let registration = Registration::new(dims, dims, &points).unwrap();

    let src = yuv_frame(dims, 10, 10);
    let mut dst = vec![0u8; dims.yuv420_len()];
    registration.warp(&src, &mut dst);

    // Base pixel x samples source x + 20; for x >= 11 the neighborhood is
    // out of bounds.
    for y in 0..dims.height - 1 {
        for x in 0..dims.width {
            let expected = if x + 20 + 1 < dims.width {
                src[y * dims.width + x + 20]
            } else {
                0
            };
            assert_eq!(dst[y * dims.width + x], expected, "at ({x},{y})");
        }
    }
}

#[test]
fn test_half_pixel_left_edge_still_sampled() {
    // Duplicate observations at x_base and x_base - 1 fit an exact
    // x_base = x_visible - 0.5, sending destination column 0 to source
    // coordinate -0.5. Truncation toward zero anchors it at column 0 and
    // interpolates with a negative fraction instead of dropping the pixel.
    let dims = FrameDimensions::new(32, 24);
    let mut points = Vec::new();
    for &(x, y) in &[(0, 0), (10, 0), (0, 8), (10, 8)] {
        points.push(ControlPoint { x_visible: x, y_visible: y, x_base: x, y_base: y });
        points.push(ControlPoint { x_visible: x, y_visible: y, x_base: x - 1, y_base: y });
    }
    let registration = Registration::new(dims, dims, &points).unwrap();

    let n = dims.pixel_count();
    let mut src = vec![100u8; dims.yuv420_len()];
    src[n..].fill(0x80);
    let mut dst = vec![0u8; dims.yuv420_len()];
    registration.warp(&src, &mut dst);

    for y in 0..dims.height - 1 {
        assert_eq!(dst[y * dims.width], 100, "row {y}");
    }
}

#[test]
fn test_too_few_control_points_rejected() {
    let dims = FrameDimensions::new(32, 24);
    let points = identity_points()[..2].to_vec();
    assert!(matches!(
        Registration::new(dims, dims, &points),
        Err(RegistrationError::TooFewControlPoints { minimum: 3, found: 2 })
    ));
}

#[test]
fn test_load_control_points_parses_pairs() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("control_points.txt");
    fs::write(&path, "10 20 5 8\n\n100 200 50 80\n").unwrap();

    let points = load_control_points(&path).unwrap();
    assert_eq!(points.len(), 2);
    assert_eq!(
        points[0],
        ControlPoint { x_visible: 10, y_visible: 20, x_base: 5, y_base: 8 }
    );
    assert_eq!(points[1].y_base, 80);
}

#[test]
fn test_load_control_points_rejects_short_line() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("control_points.txt");
    fs::write(&path, "10 20 5\n").unwrap();

    assert!(matches!(
        load_control_points(&path),
        Err(RegistrationError::MalformedControlPoint { line: 1, .. })
    ));
}

#[test]
fn test_with_cache_creates_tables_and_sidecar() {
    let dir = tempfile::tempdir().unwrap();
    let row_path = dir.path().join("interpY.txt");
    let col_path = dir.path().join("interpX.txt");
    let dims = FrameDimensions::new(32, 24);

    Registration::with_cache(dims, dims, &identity_points(), &row_path, &col_path).unwrap();

    assert!(row_path.exists());
    assert!(col_path.exists());
    assert!(table::sidecar_path(&row_path).exists());
}

#[test]
fn test_with_cache_reuses_matching_tables() {
    let dir = tempfile::tempdir().unwrap();
    let row_path = dir.path().join("interpY.txt");
    let col_path = dir.path().join("interpX.txt");
    let dims = FrameDimensions::new(8, 6);
    let points = identity_points();

    Registration::with_cache(dims, dims, &points, &row_path, &col_path).unwrap();

    // Doctor the cached row table; a matching key must make the second call
    // trust the file instead of recomputing.
    let doctored = vec!["7.5"; dims.pixel_count()].join(" ");
    fs::write(&row_path, doctored).unwrap();

    let reg = Registration::with_cache(dims, dims, &points, &row_path, &col_path).unwrap();
    assert_eq!(reg.table().source(0, 0).1, 7.5);
}

#[test]
fn test_with_cache_refuses_mismatched_fingerprint() {
    let dir = tempfile::tempdir().unwrap();
    let row_path = dir.path().join("interpY.txt");
    let col_path = dir.path().join("interpX.txt");
    let dims = FrameDimensions::new(8, 6);

    Registration::with_cache(dims, dims, &identity_points(), &row_path, &col_path).unwrap();

    // Same files, different control points: the cache must be refused and
    // the tables recomputed from the new fit.
    let shifted: Vec<ControlPoint> = identity_points()
        .into_iter()
        .map(|p| ControlPoint { x_base: p.x_visible + 2, ..p })
        .collect();
    let reg = Registration::with_cache(dims, dims, &shifted, &row_path, &col_path).unwrap();
    assert!((reg.table().source(0, 0).0 - 2.0).abs() < 1e-3);
}
