//! Bicubic Bézier surface synthesis over quadtree blobs.
//!
//! Each blob gets a 4x4 control grid sampled from the min-filtered image and
//! is rebuilt as `U * M * P * Mᵀ * VT`, where `M` is the cubic Bernstein
//! matrix and `U`/`VT` hold the per-row / per-column parameter powers.

use crate::quadtree::{Blob, Quadrant};

/// Cubic Bernstein coefficient matrix, row-major 4x4.
#[rustfmt::skip]
const BERNSTEIN: [f32; 16] = [
     1.0,  0.0,  0.0, 0.0,
    -3.0,  3.0,  0.0, 0.0,
     3.0, -6.0,  3.0, 0.0,
    -1.0,  3.0, -3.0, 1.0,
];

/// Transpose of [`BERNSTEIN`].
#[rustfmt::skip]
const BERNSTEIN_T: [f32; 16] = [
    1.0, -3.0,  3.0, -1.0,
    0.0,  3.0, -6.0,  3.0,
    0.0,  0.0,  3.0, -3.0,
    0.0,  0.0,  0.0,  1.0,
];

/// Fill `coeff` (dim x 4, row-major) with rows `[1, t, t², t³]` for
/// `t = i / (dim - 1)`.
fn interp_coeff(coeff: &mut Vec<f32>, dim: usize) {
    coeff.clear();
    let denom = (dim.max(2) - 1) as f32;
    for i in 0..dim {
        let t = i as f32 / denom;
        coeff.extend_from_slice(&[1.0, t, t * t, t * t * t]);
    }
}

/// `out = a * b` for row-major `a` (rows x inner) and `b` (inner x cols).
fn mat_mul(a: &[f32], rows: usize, inner: usize, b: &[f32], cols: usize, out: &mut Vec<f32>) {
    assert_eq!(a.len(), rows * inner);
    assert_eq!(b.len(), inner * cols);

    out.clear();
    out.resize(rows * cols, 0.0);
    for y in 0..rows {
        for x in 0..cols {
            let mut sum = 0.0;
            for i in 0..inner {
                sum += a[y * inner + i] * b[i * cols + x];
            }
            out[y * cols + x] = sum;
        }
    }
}

fn transpose(a: &[f32], rows: usize, cols: usize, out: &mut Vec<f32>) {
    assert_eq!(a.len(), rows * cols);
    out.clear();
    out.resize(rows * cols, 0.0);
    for y in 0..rows {
        for x in 0..cols {
            out[x * rows + y] = a[y * cols + x];
        }
    }
}

/// Sample the 4x4 control grid for a blob from the min-filtered image at
/// `(left + ⌊x·bw/4⌋, top + ⌊y·bh/4⌋)`.
fn control_grid(image: &[u8], width: usize, rect: Quadrant) -> [f32; 16] {
    let bw = rect.width();
    let bh = rect.height();
    let mut grid = [0.0f32; 16];
    for y in 0..4 {
        let sy = rect.top + y * bh / 4;
        for x in 0..4 {
            let sx = rect.left + x * bw / 4;
            grid[y * 4 + x] = image[sy * width + sx] as f32;
        }
    }
    grid
}

/// Synthesize one Bézier patch per blob into `out`. Blobs tile the image, so
/// every output pixel is written. Surface values truncate to u8.
pub fn reconstruct(minf: &[u8], width: usize, height: usize, blobs: &[Blob], out: &mut [u8]) {
    assert_eq!(minf.len(), width * height, "Pixel count mismatch");
    assert_eq!(out.len(), width * height, "Output size mismatch");

    let mut u = Vec::new();
    let mut vt = Vec::new();
    let mut coeff = Vec::new();
    let mut t1 = Vec::new();
    let mut t2 = Vec::new();

    for blob in blobs {
        let rect = blob.rect;
        let bw = rect.width();
        let bh = rect.height();
        if bw == 0 || bh == 0 {
            continue;
        }

        interp_coeff(&mut u, bh);
        interp_coeff(&mut coeff, bw);
        transpose(&coeff, bw, 4, &mut vt);

        let grid = control_grid(minf, width, rect);

        mat_mul(&u, bh, 4, &BERNSTEIN, 4, &mut t1); // U·M
        mat_mul(&t1, bh, 4, &grid, 4, &mut t2); // U·M·P
        mat_mul(&t2, bh, 4, &BERNSTEIN_T, 4, &mut t1); // U·M·P·Mᵀ
        mat_mul(&t1, bh, 4, &vt, bw, &mut t2); // U·M·P·Mᵀ·VT

        for (dy, row) in t2.chunks_exact(bw).enumerate() {
            let base = (rect.top + dy) * width + rect.left;
            for (dx, &v) in row.iter().enumerate() {
                out[base + dx] = v as u8;
            }
        }
    }
}
