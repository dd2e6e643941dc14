//! Separable 5x5 Gaussian blur used to smooth the reconstructed background
//! mosaic. Borders replicate the first valid row/column, matching the min
//! filter.

use rayon::prelude::*;

const KERNEL_SIZE: usize = 5;
const RADIUS: usize = KERNEL_SIZE / 2;

/// Normalized 1D Gaussian kernel; the separable outer product equals the
/// normalized 2D kernel.
fn gaussian_kernel_1d(sigma: f32) -> [f32; KERNEL_SIZE] {
    assert!(sigma > 0.0, "Sigma must be positive");

    let mut kernel = [0.0f32; KERNEL_SIZE];
    let two_sigma_sq = 2.0 * sigma * sigma;
    let mut sum = 0.0f32;

    for (i, k) in kernel.iter_mut().enumerate() {
        let x = i as f32 - RADIUS as f32;
        let value = (-x * x / two_sigma_sq).exp();
        *k = value;
        sum += value;
    }
    for k in &mut kernel {
        *k /= sum;
    }
    kernel
}

/// Blur the interior with a separable 5x5 Gaussian, then replicate borders.
pub fn gaussian_blur(image: &[u8], width: usize, height: usize, sigma: f32, out: &mut [u8]) {
    assert_eq!(image.len(), width * height, "Pixel count mismatch");
    assert_eq!(out.len(), width * height, "Output size mismatch");
    assert!(KERNEL_SIZE < width && KERNEL_SIZE < height, "Kernel larger than image");

    let kernel = gaussian_kernel_1d(sigma);

    // Horizontal pass over every row; the vertical pass needs all rows for
    // interior columns.
    let mut temp = vec![0.0f32; width * height];
    temp.par_chunks_mut(width)
        .enumerate()
        .for_each(|(y, temp_row)| {
            let row = &image[y * width..(y + 1) * width];
            for x in RADIUS..width - RADIUS {
                let mut sum = 0.0f32;
                for (i, &k) in kernel.iter().enumerate() {
                    sum += k * row[x - RADIUS + i] as f32;
                }
                temp_row[x] = sum;
            }
        });

    // Vertical pass over interior rows only.
    let temp = &temp;
    out[RADIUS * width..(height - RADIUS) * width]
        .par_chunks_mut(width)
        .enumerate()
        .for_each(|(i, out_row)| {
            let y = RADIUS + i;
            for (x, o) in out_row.iter_mut().enumerate().take(width - RADIUS).skip(RADIUS) {
                let mut sum = 0.0f32;
                for (j, &k) in kernel.iter().enumerate() {
                    sum += k * temp[(y - RADIUS + j) * width + x];
                }
                *o = sum as u8;
            }
        });

    super::replicate_borders(out, width, height, RADIUS);
}
