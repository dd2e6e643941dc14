//! Bright-feature extraction, adaptive suppression and overlay.

use crate::frame::{CHROMA_NEUTRAL, FrameDimensions, FusionStyle};
use crate::math;

/// Per-frame compositing state. All scratch planes are allocated once and
/// reused for every frame.
#[derive(Debug)]
pub(crate) struct Compositor {
    npixels: usize,
    ngls: usize,
    ssr: f32,
    bpr: f32,
    style: FusionStyle,
    bright: Vec<u8>,
    etbk: Vec<u8>,
    refined: Vec<u8>,
    suppressed: Vec<u8>,
    usfn: Vec<u16>,
    hist: Vec<u64>,
}

impl Compositor {
    pub(crate) fn new(
        dims: FrameDimensions,
        ngls: usize,
        ssr: f32,
        bpr: f32,
        style: FusionStyle,
    ) -> Self {
        let npixels = dims.pixel_count();
        Self {
            npixels,
            ngls,
            ssr,
            bpr,
            style,
            bright: vec![0; npixels],
            etbk: vec![0; npixels],
            refined: vec![0; npixels],
            suppressed: vec![0; npixels],
            usfn: vec![0; npixels],
            hist: vec![0; ngls],
        }
    }

    /// Fuse one synchronized triple of frames. `gsci` and `regt` are full
    /// YUV 4:2:0 frames, `bkg` a grayscale plane; `fused` receives a full
    /// YUV 4:2:0 frame.
    pub(crate) fn compose(&mut self, gsci: &[u8], regt: &[u8], bkg: &[u8], fused: &mut [u8]) {
        let n = self.npixels;
        assert_eq!(bkg.len(), n, "background plane size mismatch");
        assert_eq!(gsci.len(), fused.len(), "frame size mismatch");
        assert_eq!(regt.len(), fused.len(), "frame size mismatch");

        let gsci_y = &gsci[..n];
        let regt_y = &regt[..n];

        // Pixels hotter than the reconstructed background.
        math::subtract_saturating(gsci_y, bkg, &mut self.bright);
        // Where the visible camera already sees brightness.
        math::subtract_saturating(regt_y, gsci_y, &mut self.etbk);
        math::subtract_saturating(&self.bright, &self.etbk, &mut self.refined);

        math::add_widening(regt_y, &self.refined, &mut self.usfn);
        let sr = suppression_ratio(&self.usfn, &mut self.hist, self.bpr, self.ssr);

        math::multiply_scalar_saturating(&self.refined, sr, &mut self.suppressed);
        math::add_saturating(regt_y, &self.suppressed, &mut fused[..n]);

        match self.style {
            FusionStyle::Color => fused[n..].copy_from_slice(&regt[n..]),
            FusionStyle::Gray => fused[n..].fill(CHROMA_NEUTRAL),
        }
    }

    /// The suppressed bright feature of the last composed frame.
    pub(crate) fn suppressed(&self) -> &[u8] {
        &self.suppressed
    }
}

/// Adaptive gain for the refined bright feature: walk the unsuppressed
/// fusion histogram from the brightest bin down until the accumulated count
/// exceeds `bpr` of the frame, then scale so the mean of those pixels lands
/// at 255, capped by `ssr`.
pub(crate) fn suppression_ratio(usfn: &[u16], hist: &mut [u64], bpr: f32, ssr: f32) -> f32 {
    let npixels = usfn.len();
    let top = hist.len() - 1;
    let threshold = (bpr * npixels as f32) as u64;

    hist.fill(0);
    for &v in usfn {
        hist[(v as usize).min(top)] += 1;
    }

    let mut count = 0u64;
    let mut weighted_sum = 0f64;
    for bin in (0..hist.len()).rev() {
        let h = hist[bin];
        if h == 0 {
            continue;
        }
        count += h;
        weighted_sum += (h * bin as u64) as f64;
        if count > threshold {
            break;
        }
    }

    let mean = weighted_sum / count as f64;
    (255.0 / mean as f32).min(ssr)
}
