//! Visible-to-base image registration.
//!
//! An affine map fitted from control-point pairs resamples the visible frame
//! into the thermal sensor's geometry. The per-pixel source coordinates are
//! precomputed into a lookup table (optionally disk-cached) and the warp
//! itself is a table-driven bilinear sample of the Y plane with
//! nearest-neighbor chroma.

mod affine;
mod error;
mod table;

#[cfg(test)]
mod tests;

pub use error::RegistrationError;
pub use table::WarpTable;

use std::fs;
use std::path::Path;

use rayon::prelude::*;
use tracing::{debug, info};

use crate::frame::{CHROMA_NEUTRAL, FrameDimensions};

/// Fewest control-point pairs accepted: an affine fit needs three
/// non-collinear correspondences.
pub const MIN_CONTROL_PAIRS: usize = 3;

/// One visible → base correspondence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlPoint {
    pub x_visible: i32,
    pub y_visible: i32,
    pub x_base: i32,
    pub y_base: i32,
}

/// Parse a control-point file: one pair per line, four whitespace-separated
/// integers `x_visible y_visible x_base y_base`. Blank lines are ignored.
pub fn load_control_points(path: &Path) -> Result<Vec<ControlPoint>, RegistrationError> {
    let contents = fs::read_to_string(path)
        .map_err(|source| RegistrationError::ReadControlPoints { path: path.into(), source })?;

    let mut points = Vec::new();
    for (idx, line) in contents.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let mut fields = line.split_whitespace().map(str::parse::<i32>);
        let mut next = || {
            fields
                .next()
                .and_then(Result::ok)
                .ok_or(RegistrationError::MalformedControlPoint {
                    path: path.into(),
                    line: idx + 1,
                })
        };
        points.push(ControlPoint {
            x_visible: next()?,
            y_visible: next()?,
            x_base: next()?,
            y_base: next()?,
        });
    }
    Ok(points)
}

/// Registration instance: geometry plus the precomputed warp table.
#[derive(Debug)]
pub struct Registration {
    base: FrameDimensions,
    unreg: FrameDimensions,
    table: WarpTable,
}

impl Registration {
    /// Fit the affine map and compute the warp table directly.
    pub fn new(
        base: FrameDimensions,
        unreg: FrameDimensions,
        points: &[ControlPoint],
    ) -> Result<Self, RegistrationError> {
        check_chroma_geometry(base, unreg);
        let matrix = Self::fit(points)?;
        Ok(Self { base, unreg, table: WarpTable::from_affine(&matrix, base) })
    }

    /// As [`Registration::new`], but reuse on-disk tables when both files
    /// exist and their cache key matches the current geometry and control
    /// points; otherwise recompute and rewrite the cache.
    pub fn with_cache(
        base: FrameDimensions,
        unreg: FrameDimensions,
        points: &[ControlPoint],
        row_table_path: &Path,
        col_table_path: &Path,
    ) -> Result<Self, RegistrationError> {
        check_chroma_geometry(base, unreg);
        let key = table::cache_key(base, unreg, points);

        if table::sidecar_matches(row_table_path, &key) {
            if let Some(table) = WarpTable::load(row_table_path, col_table_path, base)? {
                debug!(row = %row_table_path.display(), "reusing cached interpolation tables");
                return Ok(Self { base, unreg, table });
            }
        } else {
            debug!(
                row = %row_table_path.display(),
                "interpolation table cache key mismatch, recomputing"
            );
        }

        let registration = Self::new(base, unreg, points)?;
        registration.table.save(row_table_path, col_table_path)?;
        table::write_sidecar(row_table_path, &key)
            .map_err(|source| RegistrationError::WriteTable {
                path: table::sidecar_path(row_table_path),
                source,
            })?;
        info!(
            row = %row_table_path.display(),
            col = %col_table_path.display(),
            "interpolation tables computed and cached"
        );
        Ok(registration)
    }

    fn fit(points: &[ControlPoint]) -> Result<[f64; 6], RegistrationError> {
        if points.len() < MIN_CONTROL_PAIRS {
            return Err(RegistrationError::TooFewControlPoints {
                minimum: MIN_CONTROL_PAIRS,
                found: points.len(),
            });
        }
        affine::solve_affine(points)
    }

    #[inline]
    pub fn base_dimensions(&self) -> FrameDimensions {
        self.base
    }

    #[inline]
    pub fn unreg_dimensions(&self) -> FrameDimensions {
        self.unreg
    }

    pub fn table(&self) -> &WarpTable {
        &self.table
    }

    /// Warp a planar YUV 4:2:0 visible frame into base geometry.
    ///
    /// The Y plane is sampled bilinearly; chroma is nearest-neighbor copied
    /// for destination pixels with both coordinates even. Destination pixels
    /// whose source lands outside the visible frame keep their zero/neutral
    /// initialization.
    pub fn warp(&self, src: &[u8], dst: &mut [u8]) {
        assert_eq!(src.len(), self.unreg.yuv420_len(), "source frame size mismatch");
        assert_eq!(dst.len(), self.base.yuv420_len(), "destination frame size mismatch");

        let (bw, bh) = (self.base.width, self.base.height);
        let (uw, uh) = (self.unreg.width, self.unreg.height);

        let (src_y, src_uv) = src.split_at(uw * uh);
        let (src_u, src_v) = src_uv.split_at(uw * uh / 4);

        let (dst_y, dst_uv) = dst.split_at_mut(bw * bh);
        dst_y.fill(0);
        dst_uv.fill(CHROMA_NEUTRAL);

        let table = &self.table;
        dst_y.par_chunks_mut(bw).enumerate().for_each(|(y, dst_row)| {
            for (x, out) in dst_row.iter_mut().enumerate() {
                let (rx, ry) = table.source(x, y);
                let Some((x0, y0)) = bilinear_anchor(rx, ry, uw, uh) else {
                    continue;
                };

                let nw = src_y[y0 * uw + x0] as f32;
                let ne = src_y[y0 * uw + x0 + 1] as f32;
                let sw = src_y[(y0 + 1) * uw + x0] as f32;
                let se = src_y[(y0 + 1) * uw + x0 + 1] as f32;

                let fx = rx - x0 as f32;
                let fy = ry - y0 as f32;
                let north = fx * ne + (1.0 - fx) * nw;
                let south = fx * se + (1.0 - fx) * sw;
                let value = (1.0 - fy) * north + fy * south;

                *out = (value as i32).clamp(0, 255) as u8;
            }
        });

        let (dst_u, dst_v) = dst_uv.split_at_mut(bw * bh / 4);
        let src_uv_width = uw / 2;
        let dst_uv_width = bw / 2;
        for y in (0..bh).step_by(2) {
            for x in (0..bw).step_by(2) {
                let (rx, ry) = table.source(x, y);
                let Some((x0, y0)) = bilinear_anchor(rx, ry, uw, uh) else {
                    continue;
                };
                let src_i = (y0 / 2) * src_uv_width + x0 / 2;
                let dst_i = (y / 2) * dst_uv_width + x / 2;
                dst_u[dst_i] = src_u[src_i];
                dst_v[dst_i] = src_v[src_i];
            }
        }
    }
}

/// 4:2:0 chroma planes subsample by two in both directions.
fn check_chroma_geometry(base: FrameDimensions, unreg: FrameDimensions) {
    assert!(
        base.width % 2 == 0 && base.height % 2 == 0,
        "Base dimensions must be even"
    );
    assert!(
        unreg.width % 2 == 0 && unreg.height % 2 == 0,
        "Visible dimensions must be even"
    );
}

/// Top-left corner of the 2x2 sampling neighborhood, or `None` when any of
/// its four pixels would fall outside the source frame. Coordinates truncate
/// toward zero, so a fractional coordinate just above -1 anchors at the
/// first row/column and interpolates with a negative fraction.
#[inline]
fn bilinear_anchor(rx: f32, ry: f32, width: usize, height: usize) -> Option<(usize, usize)> {
    let x0 = rx as i64;
    let y0 = ry as i64;
    if x0 < 0 || y0 < 0 || x0 + 1 > width as i64 - 1 || y0 + 1 > height as i64 - 1 {
        return None;
    }
    Some((x0 as usize, y0 as usize))
}
