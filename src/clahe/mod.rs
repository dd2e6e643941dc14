//! Raw 14-bit infrared to 8-bit grayscale conversion.
//!
//! Contrast-limited adaptive histogram equalization over the full frame:
//! recombine the packed 14-bit samples, drop sparse histogram bins, clip and
//! redistribute the remaining mass, then stretch the cumulative histogram to
//! the 8-bit range. The converter owns all of its tables and scratch frames;
//! one instance serves one (format, resolution) configuration.

#[cfg(test)]
mod tests;

use crate::frame::{CHROMA_NEUTRAL, FrameDimensions, PixelFormat, Resolution};

/// Histogram bins for 14-bit raw samples.
pub const N_BINS: usize = 0x3FFF + 1;

/// Owned raw-to-grayscale converter. Callers must not interleave frames of a
/// different geometry or format through one instance.
#[derive(Debug)]
pub struct RawConverter {
    format: PixelFormat,
    dims: FrameDimensions,
    cut_thresh: u64,
    clip_limit: f32,
    recombined: Vec<u16>,
    histogram: Vec<u64>,
    rearranged: Vec<u64>,
    rearrange_map: Vec<u16>,
    stretch_map: Vec<u8>,
    stretched: Vec<u8>,
}

impl RawConverter {
    /// Converter with the default bin-drop threshold (4) and clip limit (1.0).
    pub fn new(format: PixelFormat, resolution: Resolution) -> Self {
        Self::with_thresholds(format, resolution, 4, 1.0)
    }

    pub fn with_thresholds(
        format: PixelFormat,
        resolution: Resolution,
        cut_thresh: u64,
        clip_limit: f32,
    ) -> Self {
        assert!(clip_limit > 0.0, "Clip limit must be positive");
        let dims = resolution.dimensions();
        Self {
            format,
            dims,
            cut_thresh,
            clip_limit,
            recombined: vec![0; dims.pixel_count()],
            histogram: vec![0; N_BINS],
            rearranged: vec![0; N_BINS],
            rearrange_map: vec![0; N_BINS],
            stretch_map: vec![0; N_BINS],
            stretched: vec![0; dims.pixel_count()],
        }
    }

    #[inline]
    pub fn dimensions(&self) -> FrameDimensions {
        self.dims
    }

    /// Byte length of one converted output frame.
    #[inline]
    pub fn output_len(&self) -> usize {
        self.format.frame_len(self.dims)
    }

    /// Convert one raw frame (`2 * width * height` bytes) into `out`
    /// (`output_len()` bytes).
    pub fn convert(&mut self, raw: &[u8], out: &mut [u8]) {
        assert_eq!(raw.len(), self.dims.raw_ir_len(), "raw frame size mismatch");
        assert_eq!(out.len(), self.output_len(), "output frame size mismatch");

        recombine_raw_frame(raw, &mut self.recombined);

        compute_histogram(&self.recombined, &mut self.histogram);
        let (n_valid_bins, n_valid_pixels) = rearrange_histogram(
            &self.histogram,
            self.cut_thresh,
            &mut self.rearranged,
            &mut self.rearrange_map,
        );
        debug_assert!(n_valid_bins > 0, "no histogram bin above the cut threshold");

        let clip_level =
            (self.clip_limit * self.dims.pixel_count() as f32 / n_valid_bins as f32) as u64;
        clip_histogram(&mut self.rearranged[..n_valid_bins], clip_level);

        stretch_histogram(
            &self.rearranged[..n_valid_bins],
            n_valid_pixels,
            &mut self.stretch_map,
        );

        for (&s, d) in self.recombined.iter().zip(&mut self.stretched) {
            *d = self.stretch_map[self.rearrange_map[s as usize] as usize];
        }

        let (width, height) = (self.dims.width, self.dims.height);
        match self.format {
            PixelFormat::Yuv422 => pack_yuv(&self.stretched, width * height, out),
            PixelFormat::Yuv420 => pack_yuv(&self.stretched, width * height / 2, out),
            PixelFormat::Rgb => pack_gray_channels::<3>(&self.stretched, out),
            PixelFormat::Rgba => pack_gray_channels::<4>(&self.stretched, out),
        }
    }
}

/// `u16 = ((hi & 0x7F) << 8) | lo` per little-endian byte pair; the high bit
/// of the second byte is reserved.
fn recombine_raw_frame(src: &[u8], dst: &mut [u16]) {
    debug_assert_eq!(src.len(), dst.len() * 2);
    for (pair, d) in src.chunks_exact(2).zip(dst) {
        *d = (((pair[1] & 0x7F) as u16) << 8) | pair[0] as u16;
    }
}

fn compute_histogram(samples: &[u16], histogram: &mut [u64]) {
    histogram.fill(0);
    for &s in samples {
        histogram[s as usize] += 1;
    }
}

/// Drop bins with fewer than `thresh` counts and compact the rest. Dropped
/// bins map to the next compact bin; everything above the highest valid
/// level maps to the last. Returns (valid bins, valid pixels).
fn rearrange_histogram(
    histogram: &[u64],
    thresh: u64,
    rearranged: &mut [u64],
    map: &mut [u16],
) -> (usize, u64) {
    rearranged.fill(0);

    let mut n_valid_bins = 0usize;
    let mut n_valid_pixels = 0u64;
    let mut max_valid_level = 0usize;

    for (i, &count) in histogram.iter().enumerate() {
        if count < thresh {
            map[i] = n_valid_bins as u16;
            continue;
        }
        rearranged[n_valid_bins] = count;
        map[i] = n_valid_bins as u16;
        n_valid_bins += 1;
        n_valid_pixels += count;
        max_valid_level = i;
    }

    let last = n_valid_bins.saturating_sub(1) as u16;
    for m in &mut map[max_valid_level + 1..] {
        *m = last;
    }

    (n_valid_bins, n_valid_pixels)
}

/// Two-phase clip-and-redistribute. Bins above `clip_level` are saturated
/// and their excess spread uniformly; any remainder is walked across
/// still-unsaturated bins until nothing is left or the walk stalls.
fn clip_histogram(histogram: &mut [u64], clip_level: u64) {
    let n_bins = histogram.len();

    let mut excess: i64 = histogram
        .iter()
        .map(|&h| h.saturating_sub(clip_level) as i64)
        .sum();
    if excess == 0 {
        return;
    }

    let redist = (excess as u64) / n_bins as u64;
    let upper = clip_level.saturating_sub(redist);

    for h in histogram.iter_mut() {
        if *h > clip_level {
            *h = clip_level;
        } else if *h > upper {
            excess -= (clip_level - *h) as i64;
            *h = clip_level;
        } else {
            excess -= redist as i64;
            *h += redist;
        }
    }

    loop {
        let prev = excess;
        let mut i = 0;
        while i < n_bins && excess > 0 {
            let step = (excess as usize / n_bins).max(1);
            let mut j = i;
            while j < n_bins && excess > 0 {
                if histogram[j] < clip_level {
                    excess -= 1;
                    histogram[j] += 1;
                }
                j += step;
            }
            i += 1;
        }
        if excess <= 0 || excess >= prev {
            break;
        }
    }
}

/// `map[i] = min(255, ⌊(255 / n_valid_pixels) · accum[i]⌋)`.
fn stretch_histogram(histogram: &[u64], n_valid_pixels: u64, map: &mut [u8]) {
    let scale = 255.0f32 / n_valid_pixels as f32;
    let mut accum = 0u64;
    for (&h, m) in histogram.iter().zip(map.iter_mut()) {
        accum += h;
        *m = (scale * accum as f32) as u8;
    }
}

/// Y plane followed by `chroma_len` bytes of neutral chroma.
fn pack_yuv(gray: &[u8], chroma_len: usize, out: &mut [u8]) {
    let n = gray.len();
    out[..n].copy_from_slice(gray);
    out[n..n + chroma_len].fill(CHROMA_NEUTRAL);
}

/// Triplicated gray; the fourth channel (alpha), when present, is zero.
fn pack_gray_channels<const CHANNELS: usize>(gray: &[u8], out: &mut [u8]) {
    for (&g, px) in gray.iter().zip(out.chunks_exact_mut(CHANNELS)) {
        px[0] = g;
        px[1] = g;
        px[2] = g;
        if CHANNELS == 4 {
            px[3] = 0;
        }
    }
}
