//! Error types for registration setup.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while building the registration tables. All are
/// fatal at initialization; the warp itself cannot fail.
#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("Too few control points: need at least {minimum}, got {found}")]
    TooFewControlPoints { minimum: usize, found: usize },

    #[error("Degenerate control points: the affine system is singular")]
    DegenerateControlPoints,

    #[error("Failed to read control points '{path}': {source}")]
    ReadControlPoints {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Malformed control point at {path}:{line}")]
    MalformedControlPoint { path: PathBuf, line: usize },

    #[error("Failed to read interpolation table '{path}': {source}")]
    ReadTable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Malformed interpolation table '{path}' at cell {cell}")]
    MalformedTable { path: PathBuf, cell: usize },

    #[error("Interpolation table '{path}' has {found} cells, expected {expected}")]
    TableShape {
        path: PathBuf,
        found: usize,
        expected: usize,
    },

    #[error("Failed to write interpolation table '{path}': {source}")]
    WriteTable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}
