//! Fusion pipeline configuration.

use crate::background::BackgroundConfig;
use crate::fifo::Backpressure;
use crate::frame::{FusionStyle, PixelFormat, Resolution};

/// Fusion pipeline configuration.
#[derive(Debug, Clone)]
pub struct FusionConfig {
    /// Thermal sensor geometry; also the geometry of every fused frame.
    pub resolution: Resolution,

    /// Gray levels in the suppression histogram.
    pub ngls: usize,
    /// Maximum bright-feature suppression ratio.
    pub ssr: f32,
    /// Fraction of brightest pixels driving the adaptive gain.
    pub bpr: f32,

    /// Background reconstruction parameters.
    pub background: BackgroundConfig,

    /// CLAHE histogram bin-drop threshold.
    pub cut_thresh: u64,
    /// CLAHE clip limit.
    pub clip_limit: f32,

    /// Chroma source for the fused frame.
    pub style: FusionStyle,
    /// Output pixel layout of the raw converter.
    pub raw_format: PixelFormat,

    /// What to do when a frame is offered to a full ring.
    pub backpressure: Backpressure,
    /// Frames of capacity per pipeline ring.
    pub caches: usize,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            resolution: Resolution::Vga640,
            ngls: 0xFFFF + 1,
            ssr: 0.8,
            bpr: 0.001,
            background: BackgroundConfig::default(),
            cut_thresh: 4,
            clip_limit: 1.0,
            style: FusionStyle::Color,
            raw_format: PixelFormat::Yuv420,
            backpressure: Backpressure::Drop,
            caches: 4,
        }
    }
}

impl FusionConfig {
    /// Validate configuration parameters.
    pub fn validate(&self) {
        assert!(self.ngls > u8::MAX as usize, "Suppression histogram too small");
        assert!(self.ssr > 0.0, "Suppression ratio must be positive");
        assert!(
            self.bpr > 0.0 && self.bpr < 1.0,
            "Brightest-pixel fraction must be in (0, 1)"
        );
        assert!(self.clip_limit > 0.0, "Clip limit must be positive");
        assert!(self.caches > 0, "Ring capacity must be at least one frame");
        self.background.validate();
    }
}
