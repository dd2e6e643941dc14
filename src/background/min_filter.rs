//! Sliding-window minimum filter with replicated borders.

/// Replace each interior pixel with the minimum of its `ksize x ksize`
/// neighborhood, then replicate the first valid row/column into the margins.
/// `ksize` must be odd and smaller than both image dimensions.
pub fn min_filter(image: &[u8], width: usize, height: usize, ksize: usize, out: &mut [u8]) {
    assert_eq!(image.len(), width * height, "Pixel count mismatch");
    assert_eq!(out.len(), width * height, "Output size mismatch");
    assert!(ksize % 2 == 1, "Kernel size must be odd");
    assert!(ksize < width && ksize < height, "Kernel larger than image");

    let krad = ksize / 2;

    for y in krad..height - krad {
        for x in krad..width - krad {
            let mut min = u8::MAX;
            for ky in y - krad..=y + krad {
                let row = &image[ky * width + x - krad..=ky * width + x + krad];
                for &v in row {
                    min = min.min(v);
                }
            }
            out[y * width + x] = min;
        }
    }

    super::replicate_borders(out, width, height, krad);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_image_unchanged() {
        let image = vec![77u8; 20 * 15];
        let mut out = vec![0u8; 20 * 15];
        min_filter(&image, 20, 15, 5, &mut out);
        assert_eq!(image, out);
    }

    #[test]
    fn test_dark_pixel_spreads_to_kernel_extent() {
        let width = 21;
        let height = 21;
        let mut image = vec![200u8; width * height];
        image[10 * width + 10] = 5;

        let mut out = vec![0u8; width * height];
        min_filter(&image, width, height, 3, &mut out);

        // Every pixel within the kernel radius of the dark pixel takes it.
        for y in 9..=11 {
            for x in 9..=11 {
                assert_eq!(out[y * width + x], 5);
            }
        }
        assert_eq!(out[5 * width + 5], 200);
    }

    #[test]
    fn test_borders_replicate_first_valid_row() {
        let width = 16;
        let height = 16;
        // Row gradient so the replicated margin is distinguishable.
        let image: Vec<u8> = (0..height)
            .flat_map(|y| std::iter::repeat_n((y * 10) as u8, width))
            .collect();

        let mut out = vec![0u8; width * height];
        min_filter(&image, width, height, 5, &mut out);

        let krad = 2;
        for y in 0..krad {
            assert_eq!(
                &out[y * width..(y + 1) * width],
                &out[krad * width..(krad + 1) * width]
            );
        }
        for y in height - krad..height {
            assert_eq!(
                &out[y * width..(y + 1) * width],
                &out[(height - krad - 1) * width..(height - krad) * width]
            );
        }
    }
}
