//! Calor - infrared / visible-light image fusion.
//!
//! This library fuses a low-resolution thermal frame with a high-resolution
//! visible frame into a single enhanced image that emphasizes hot targets
//! against the visible background:
//! - CLAHE raw-to-grayscale conversion of packed 14-bit IR frames
//! - Quadtree + Bézier background reconstruction
//! - Affine registration of the visible frame with cached warp tables
//! - Bright-feature extraction with histogram-driven adaptive suppression
//! - A concurrent, ring-buffered five-stage pipeline tying it together
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use calor::{ControlPoint, Fusion, FusionConfig};
//!
//! let points = calor::load_control_points("control_points.txt".as_ref())?;
//! let mut fusion = Fusion::new(FusionConfig::default(), visible_dims, &points)?;
//! fusion.start()?;
//!
//! fusion.put_frames(&raw_ir, &raw_visible)?;
//! let mut fused = vec![0u8; fusion.base_dimensions().yuv420_len()];
//! while !fusion.get_fused(&mut fused) { /* retry */ }
//! ```

pub(crate) mod background;
pub(crate) mod clahe;
pub(crate) mod fifo;
pub(crate) mod frame;
pub mod math;
pub(crate) mod quadtree;
pub(crate) mod registration;

mod fusion;

pub mod prelude;

// ============================================================================
// Frame geometry and formats
// ============================================================================

pub use frame::{CHROMA_NEUTRAL, FrameDimensions, FusionStyle, PixelFormat, Resolution};

// ============================================================================
// Pipeline plumbing
// ============================================================================

pub use fifo::{Backpressure, Fifo};

// ============================================================================
// Algorithmic kernels
// ============================================================================

pub use background::{
    BackgroundConfig, BackgroundReconstructor, bezier_reconstruct, gaussian_blur, min_filter,
};
pub use clahe::{N_BINS, RawConverter};
pub use quadtree::{Blob, QuadTree, Quadrant};

// ============================================================================
// Registration
// ============================================================================

pub use registration::{
    ControlPoint, MIN_CONTROL_PAIRS, Registration, RegistrationError, WarpTable,
    load_control_points,
};

// ============================================================================
// Fusion pipeline
// ============================================================================

pub use fusion::{Fusion, FusionConfig, FusionError};
