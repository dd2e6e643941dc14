//! Prelude module for convenient imports.
//!
//! ```rust,ignore
//! use calor::prelude::*;
//! ```

pub use crate::{FrameDimensions, FusionStyle, PixelFormat, Resolution};

pub use crate::{Backpressure, Fifo};

pub use crate::{BackgroundConfig, BackgroundReconstructor, QuadTree, RawConverter};

pub use crate::{ControlPoint, Registration, RegistrationError, load_control_points};

pub use crate::{Fusion, FusionConfig, FusionError};
