use super::*;

/// Pack a 14-bit sample into its two-byte wire form.
fn pack_sample(value: u16) -> [u8; 2] {
    [(value & 0xFF) as u8, ((value >> 8) & 0x7F) as u8]
}

fn raw_frame_of_samples(dims: FrameDimensions, f: impl Fn(usize) -> u16) -> Vec<u8> {
    let mut raw = Vec::with_capacity(dims.raw_ir_len());
    for i in 0..dims.pixel_count() {
        raw.extend_from_slice(&pack_sample(f(i)));
    }
    raw
}

#[test]
fn test_recombine_masks_reserved_bit() {
    let src = [0x34, 0x12, 0x00, 0xFF, 0xFF, 0x7F];
    let mut dst = [0u16; 3];
    recombine_raw_frame(&src, &mut dst);
    assert_eq!(dst, [0x1234, 0x7F00, 0x7FFF]);
}

#[test]
fn test_histogram_counts() {
    let samples = [0u16, 0, 5, 16383];
    let mut hist = vec![0u64; N_BINS];
    compute_histogram(&samples, &mut hist);
    assert_eq!(hist[0], 2);
    assert_eq!(hist[5], 1);
    assert_eq!(hist[16383], 1);
    assert_eq!(hist.iter().sum::<u64>(), 4);
}

#[test]
fn test_rearrange_drops_sparse_bins() {
    let mut hist = vec![0u64; N_BINS];
    hist[10] = 100;
    hist[11] = 3; // below the threshold of 4
    hist[20] = 50;

    let mut rearranged = vec![0u64; N_BINS];
    let mut map = vec![0u16; N_BINS];
    let (n_bins, n_pixels) = rearrange_histogram(&hist, 4, &mut rearranged, &mut map);

    assert_eq!(n_bins, 2);
    assert_eq!(n_pixels, 150);
    assert_eq!(&rearranged[..2], &[100, 50]);

    // Valid bins map to their compact index.
    assert_eq!(map[10], 0);
    assert_eq!(map[20], 1);
    // A dropped bin maps to the next compact bin.
    assert_eq!(map[11], 1);
    // Bins below the first valid level map to the first compact bin.
    assert_eq!(map[0], 0);
    // Everything above the highest valid level maps to the last compact bin.
    assert_eq!(map[21], 1);
    assert_eq!(map[16383], 1);
}

#[test]
fn test_clip_preserves_total_mass() {
    let mut hist = vec![10u64, 200, 10, 10, 10];
    let total: u64 = hist.iter().sum();
    clip_histogram(&mut hist, 60);
    assert_eq!(hist.iter().sum::<u64>(), total);
    assert!(hist.iter().all(|&h| h <= 60));
}

#[test]
fn test_clip_noop_below_level() {
    let mut hist = vec![5u64, 6, 7];
    let before = hist.clone();
    clip_histogram(&mut hist, 100);
    assert_eq!(hist, before);
}

#[test]
fn test_stretch_is_monotone_and_tops_out() {
    let hist = [25u64, 25, 25, 25];
    let mut map = vec![0u8; N_BINS];
    stretch_histogram(&hist, 100, &mut map);

    assert_eq!(&map[..4], &[63, 127, 191, 255]);
    for pair in map[..4].windows(2) {
        assert!(pair[0] <= pair[1]);
    }
}

#[test]
fn test_convert_two_level_frame() {
    let resolution = Resolution::Qvga384;
    let dims = resolution.dimensions();
    let mut converter = RawConverter::new(PixelFormat::Yuv420, resolution);

    // Half the pixels at one raw level, half at another: equalization puts
    // the low level at mid-gray and the high level at white.
    let raw = raw_frame_of_samples(dims, |i| if i % 2 == 0 { 1000 } else { 9000 });
    let mut out = vec![0u8; converter.output_len()];
    converter.convert(&raw, &mut out);

    let n = dims.pixel_count();
    assert_eq!(out[0], 127);
    assert_eq!(out[1], 255);
    for px in out[..n].chunks_exact(2) {
        assert_eq!(px[0], 127);
        assert_eq!(px[1], 255);
    }
    // Chroma is neutral.
    assert!(out[n..].iter().all(|&v| v == CHROMA_NEUTRAL));
}

#[test]
fn test_convert_constant_frame_is_white() {
    let resolution = Resolution::Qvga384;
    let dims = resolution.dimensions();
    let mut converter = RawConverter::new(PixelFormat::Yuv420, resolution);

    let raw = raw_frame_of_samples(dims, |_| 5000);
    let mut out = vec![0u8; converter.output_len()];
    converter.convert(&raw, &mut out);

    // One valid bin holding every pixel: the cumulative map saturates.
    assert!(out[..dims.pixel_count()].iter().all(|&v| v == 255));
}

#[test]
fn test_convert_yuv422_chroma_extent() {
    let resolution = Resolution::Qvga384;
    let dims = resolution.dimensions();
    let mut converter = RawConverter::new(PixelFormat::Yuv422, resolution);

    let raw = raw_frame_of_samples(dims, |i| (i % 8192) as u16);
    let mut out = vec![0u8; converter.output_len()];
    converter.convert(&raw, &mut out);

    let n = dims.pixel_count();
    assert_eq!(out.len(), n * 2);
    assert!(out[n..].iter().all(|&v| v == CHROMA_NEUTRAL));
}

#[test]
fn test_convert_rgb_triplicates_gray() {
    let resolution = Resolution::Qvga384;
    let dims = resolution.dimensions();
    let mut converter = RawConverter::new(PixelFormat::Rgb, resolution);

    let raw = raw_frame_of_samples(dims, |i| if i < dims.pixel_count() / 2 { 100 } else { 8000 });
    let mut out = vec![0u8; converter.output_len()];
    converter.convert(&raw, &mut out);

    for px in out.chunks_exact(3) {
        assert_eq!(px[0], px[1]);
        assert_eq!(px[1], px[2]);
    }
}

#[test]
fn test_convert_rgba_alpha_is_zero() {
    let resolution = Resolution::Qvga384;
    let dims = resolution.dimensions();
    let mut converter = RawConverter::new(PixelFormat::Rgba, resolution);

    let raw = raw_frame_of_samples(dims, |i| (i % 4096) as u16);
    let mut out = vec![0u8; converter.output_len()];
    converter.convert(&raw, &mut out);

    for px in out.chunks_exact(4) {
        assert_eq!(px[0], px[1]);
        assert_eq!(px[1], px[2]);
        assert_eq!(px[3], 0);
    }
}

#[test]
fn test_equalization_is_monotone_in_raw_level() {
    let resolution = Resolution::Qvga384;
    let dims = resolution.dimensions();
    let mut converter = RawConverter::new(PixelFormat::Yuv420, resolution);

    // A ramp over a few hundred raw levels.
    let raw = raw_frame_of_samples(dims, |i| 2000 + (i % 300) as u16);
    let mut out = vec![0u8; converter.output_len()];
    converter.convert(&raw, &mut out);

    // Along one ramp period the output must be non-decreasing.
    for i in 0..299 {
        assert!(out[i] <= out[i + 1], "not monotone at {i}");
    }
}
