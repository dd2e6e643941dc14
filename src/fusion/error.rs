//! Error types for pipeline construction and frame submission.

use std::io;

use thiserror::Error;

use crate::frame::PixelFormat;
use crate::registration::RegistrationError;

/// Errors that can occur while building or feeding the fusion pipeline.
#[derive(Debug, Error)]
pub enum FusionError {
    #[error("Unsupported pipeline format {format:?}; the fusion pipeline carries YUV 4:2:0")]
    UnsupportedFormat { format: PixelFormat },

    #[error("Registration setup failed: {0}")]
    Registration(#[from] RegistrationError),

    #[error("Failed to spawn pipeline worker: {source}")]
    WorkerSpawn {
        #[source]
        source: io::Error,
    },

    #[error("Pipeline ring full, frame not accepted")]
    PipelineFull,
}
