//! Per-pixel warp lookup tables and their disk cache.
//!
//! The tables are a pure function of the affine matrix, so they are cached
//! as plain text (one float per cell, space-separated, row-major). A sidecar
//! key file records the geometry and a control-point fingerprint; a cache
//! whose key does not match the current configuration is refused.

use std::ffi::OsString;
use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use super::ControlPoint;
use super::error::RegistrationError;
use crate::frame::FrameDimensions;

/// For each destination pixel, the source coordinate in the unregistered
/// frame: `cols` holds x, `rows` holds y.
#[derive(Debug, Clone)]
pub struct WarpTable {
    pub(crate) cols: Vec<f32>,
    pub(crate) rows: Vec<f32>,
    pub(crate) dims: FrameDimensions,
}

impl WarpTable {
    /// Evaluate `(a·x + b·y + c, d·x + e·y + f)` for every destination pixel.
    pub fn from_affine(matrix: &[f64; 6], dims: FrameDimensions) -> Self {
        let mut cols = vec![0.0f32; dims.pixel_count()];
        let mut rows = vec![0.0f32; dims.pixel_count()];
        for y in 0..dims.height {
            for x in 0..dims.width {
                let i = y * dims.width + x;
                cols[i] = (matrix[0] * x as f64 + matrix[1] * y as f64 + matrix[2]) as f32;
                rows[i] = (matrix[3] * x as f64 + matrix[4] * y as f64 + matrix[5]) as f32;
            }
        }
        Self { cols, rows, dims }
    }

    /// Source coordinate for a destination pixel.
    #[inline]
    pub fn source(&self, x: usize, y: usize) -> (f32, f32) {
        let i = y * self.dims.width + x;
        (self.cols[i], self.rows[i])
    }

    pub fn save(&self, row_path: &Path, col_path: &Path) -> Result<(), RegistrationError> {
        save_table(&self.rows, self.dims, row_path)?;
        save_table(&self.cols, self.dims, col_path)?;
        Ok(())
    }

    /// Load both tables. `None` when either file is absent; `Err` when a
    /// present file cannot be parsed or has the wrong shape.
    pub fn load(
        row_path: &Path,
        col_path: &Path,
        dims: FrameDimensions,
    ) -> Result<Option<Self>, RegistrationError> {
        let Some(rows) = load_table(row_path, dims)? else {
            return Ok(None);
        };
        let Some(cols) = load_table(col_path, dims)? else {
            return Ok(None);
        };
        Ok(Some(Self { cols, rows, dims }))
    }
}

/// Cache key: both geometries plus an FNV-1a fingerprint of the control
/// points. Stored beside the row table as `<row_table>.key`.
pub(crate) fn cache_key(
    base: FrameDimensions,
    unreg: FrameDimensions,
    points: &[ControlPoint],
) -> String {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    let mut eat = |v: i64| {
        for byte in v.to_le_bytes() {
            hash ^= byte as u64;
            hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
        }
    };
    for p in points {
        eat(p.x_visible as i64);
        eat(p.y_visible as i64);
        eat(p.x_base as i64);
        eat(p.y_base as i64);
    }
    format!(
        "{} {} {} {} {:016x}",
        base.width, base.height, unreg.width, unreg.height, hash
    )
}

pub(crate) fn sidecar_path(row_path: &Path) -> PathBuf {
    let mut name = OsString::from(row_path.as_os_str());
    name.push(".key");
    PathBuf::from(name)
}

pub(crate) fn sidecar_matches(row_path: &Path, key: &str) -> bool {
    match fs::read_to_string(sidecar_path(row_path)) {
        Ok(contents) => contents.trim() == key,
        Err(_) => false,
    }
}

pub(crate) fn write_sidecar(row_path: &Path, key: &str) -> io::Result<()> {
    fs::write(sidecar_path(row_path), format!("{key}\n"))
}

fn save_table(
    table: &[f32],
    dims: FrameDimensions,
    path: &Path,
) -> Result<(), RegistrationError> {
    let write = || -> io::Result<()> {
        let mut out = BufWriter::new(fs::File::create(path)?);
        for row in table.chunks_exact(dims.width) {
            for v in row {
                write!(out, "{v} ")?;
            }
            writeln!(out)?;
        }
        out.flush()
    };
    write().map_err(|source| RegistrationError::WriteTable { path: path.into(), source })
}

fn load_table(
    path: &Path,
    dims: FrameDimensions,
) -> Result<Option<Vec<f32>>, RegistrationError> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "interpolation table absent, will recompute");
            return Ok(None);
        }
        Err(source) => return Err(RegistrationError::ReadTable { path: path.into(), source }),
    };

    let expected = dims.pixel_count();
    let mut table = Vec::with_capacity(expected);
    for (cell, token) in contents.split_whitespace().enumerate() {
        let value: f32 = token
            .parse()
            .map_err(|_| RegistrationError::MalformedTable { path: path.into(), cell })?;
        table.push(value);
    }

    if table.len() != expected {
        return Err(RegistrationError::TableShape {
            path: path.into(),
            found: table.len(),
            expected,
        });
    }
    Ok(Some(table))
}
