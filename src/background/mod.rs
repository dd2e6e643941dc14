//! Infrared background reconstruction.
//!
//! The reconstructor is itself a small pipeline: a min-filter stage and a
//! quadtree-decomposition stage run in parallel on copies of the same input
//! frame, and a Bézier stage joins their outputs, smooths the patched mosaic
//! with a Gaussian, and publishes the reconstructed background.
//!
//! ```text
//!            ┌──► [min filter]  ──► minf ─┐
//!  gsci Y ───┤                            ├──► [Bézier + Gaussian] ──► bkg
//!            └──► [decompose]   ──► blobs ┘
//! ```

mod bezier;
mod gaussian;
mod min_filter;


pub use bezier::reconstruct as bezier_reconstruct;
pub use gaussian::gaussian_blur;
pub use min_filter::min_filter;

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use tracing::warn;

use crate::fifo::{Backpressure, Fifo, POLL_INTERVAL, get_frame, put_frame};
use crate::frame::FrameDimensions;
use crate::quadtree::{Blob, QuadTree, Quadrant};

/// Frames of input cached per internal ring.
const CACHES: usize = 8;

/// Bytes per serialized blob: four rect coordinates plus the gray range.
const BLOB_ENCODED_LEN: usize = 20;

/// Background reconstruction parameters.
#[derive(Debug, Clone, Copy)]
pub struct BackgroundConfig {
    /// Quadtree minimum blob width
    pub min_bw: usize,
    /// Quadtree minimum blob height
    pub min_bh: usize,
    /// Quadtree minimum gray range for a split
    pub min_range: u8,
    /// Min-filter kernel size (odd)
    pub mf_size: usize,
    /// Gaussian sigma for mosaic smoothing
    pub gf_sigma: f32,
}

impl Default for BackgroundConfig {
    fn default() -> Self {
        Self {
            min_bw: 12,
            min_bh: 9,
            min_range: 78,
            mf_size: 11,
            gf_sigma: 4.5,
        }
    }
}

impl BackgroundConfig {
    pub fn validate(&self) {
        assert!(self.min_bw > 0 && self.min_bh > 0, "Minimum blob size must be positive");
        assert!(self.mf_size % 2 == 1, "Min-filter kernel size must be odd");
        assert!(self.gf_sigma > 0.0, "Gaussian sigma must be positive");
    }
}

/// Concurrent background reconstructor. Two-phase: `new` allocates rings,
/// `start` spawns the three stage workers.
#[derive(Debug)]
pub struct BackgroundReconstructor {
    dims: FrameDimensions,
    config: BackgroundConfig,
    image_len: usize,
    blob_frame_len: usize,
    max_blobs: usize,
    infd_ring: Arc<Fifo>,
    infm_ring: Arc<Fifo>,
    blob_ring: Arc<Fifo>,
    minf_ring: Arc<Fifo>,
    gfbr_ring: Arc<Fifo>,
    backpressure: Backpressure,
    stop: Arc<AtomicBool>,
    workers: Vec<JoinHandle<()>>,
}

impl BackgroundReconstructor {
    pub fn new(dims: FrameDimensions, config: BackgroundConfig, backpressure: Backpressure) -> Self {
        config.validate();

        let image_len = dims.pixel_count();

        // Splitting stops at widths > min_bw, so the narrowest possible leaf
        // is the floor half of (min_bw + 1); same for the height. That grid
        // bounds the serialized blob list.
        let min_leaf_w = ((config.min_bw + 1) / 2).max(1);
        let min_leaf_h = ((config.min_bh + 1) / 2).max(1);
        let max_blobs = dims.width.div_ceil(min_leaf_w) * dims.height.div_ceil(min_leaf_h);
        let blob_frame_len = 4 + max_blobs * BLOB_ENCODED_LEN;

        Self {
            dims,
            config,
            image_len,
            blob_frame_len,
            max_blobs,
            infd_ring: Arc::new(Fifo::new(CACHES * image_len)),
            infm_ring: Arc::new(Fifo::new(CACHES * image_len)),
            blob_ring: Arc::new(Fifo::new(CACHES * blob_frame_len)),
            minf_ring: Arc::new(Fifo::new(CACHES * image_len)),
            gfbr_ring: Arc::new(Fifo::new(CACHES * image_len)),
            backpressure,
            stop: Arc::new(AtomicBool::new(false)),
            workers: Vec::new(),
        }
    }

    /// Spawn the min-filter, decomposition and Bézier workers.
    pub fn start(&mut self) -> io::Result<()> {
        assert!(self.workers.is_empty(), "reconstructor already started");
        self.stop.store(false, Ordering::Relaxed);

        let h = self.spawn_min_filter()?;
        self.workers.push(h);
        let h = self.spawn_decompose()?;
        self.workers.push(h);
        let h = self.spawn_bezier()?;
        self.workers.push(h);

        Ok(())
    }

    /// Request every worker to exit and join them. Each worker observes the
    /// flag within one iteration.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }

    /// Offer one grayscale frame (the gsci Y plane) to the reconstructor.
    pub fn put(&self, image: &[u8]) -> bool {
        self.input().put(image)
    }

    /// Fetch one reconstructed background frame if ready.
    pub fn get(&self, out: &mut [u8]) -> bool {
        self.output().get(out)
    }

    pub(crate) fn input(&self) -> BackgroundInput {
        BackgroundInput {
            infd_ring: Arc::clone(&self.infd_ring),
            infm_ring: Arc::clone(&self.infm_ring),
            image_len: self.image_len,
            backpressure: self.backpressure,
            stop: Arc::clone(&self.stop),
        }
    }

    pub(crate) fn output(&self) -> BackgroundOutput {
        BackgroundOutput {
            gfbr_ring: Arc::clone(&self.gfbr_ring),
            image_len: self.image_len,
        }
    }

    fn spawn_min_filter(&self) -> io::Result<JoinHandle<()>> {
        let input = Arc::clone(&self.infm_ring);
        let output = Arc::clone(&self.minf_ring);
        let stop = Arc::clone(&self.stop);
        let dims = self.dims;
        let mf_size = self.config.mf_size;
        let image_len = self.image_len;
        let backpressure = self.backpressure;

        thread::Builder::new()
            .name("bkg-minfilter".into())
            .spawn(move || {
                let mut frame = vec![0u8; image_len];
                let mut filtered = vec![0u8; image_len];
                while !stop.load(Ordering::Relaxed) {
                    if !get_frame(&input, &mut frame) {
                        thread::sleep(POLL_INTERVAL);
                        continue;
                    }
                    min_filter(&frame, dims.width, dims.height, mf_size, &mut filtered);
                    if !put_frame(&output, &filtered, backpressure, &stop) {
                        warn!("min-filter output ring full, frame dropped");
                    }
                }
            })
    }

    fn spawn_decompose(&self) -> io::Result<JoinHandle<()>> {
        let input = Arc::clone(&self.infd_ring);
        let output = Arc::clone(&self.blob_ring);
        let stop = Arc::clone(&self.stop);
        let dims = self.dims;
        let config = self.config;
        let image_len = self.image_len;
        let blob_frame_len = self.blob_frame_len;
        let max_blobs = self.max_blobs;
        let backpressure = self.backpressure;

        thread::Builder::new()
            .name("bkg-decompose".into())
            .spawn(move || {
                let mut frame = vec![0u8; image_len];
                let mut encoded = vec![0u8; blob_frame_len];
                let mut tree = QuadTree::new(config.min_bw, config.min_bh, config.min_range);
                while !stop.load(Ordering::Relaxed) {
                    if !get_frame(&input, &mut frame) {
                        thread::sleep(POLL_INTERVAL);
                        continue;
                    }
                    tree.decompose(&frame, dims.width, dims.height);
                    let blobs = tree.leaves();
                    tree.reset();

                    encode_blobs(&blobs, max_blobs, &mut encoded);
                    if !put_frame(&output, &encoded, backpressure, &stop) {
                        warn!("blob ring full, decomposition dropped");
                    }
                }
            })
    }

    fn spawn_bezier(&self) -> io::Result<JoinHandle<()>> {
        let minf_input = Arc::clone(&self.minf_ring);
        let blob_input = Arc::clone(&self.blob_ring);
        let output = Arc::clone(&self.gfbr_ring);
        let stop = Arc::clone(&self.stop);
        let dims = self.dims;
        let gf_sigma = self.config.gf_sigma;
        let image_len = self.image_len;
        let blob_frame_len = self.blob_frame_len;
        let backpressure = self.backpressure;

        thread::Builder::new()
            .name("bkg-bezier".into())
            .spawn(move || {
                let mut minf = vec![0u8; image_len];
                let mut encoded = vec![0u8; blob_frame_len];
                let mut blobs = Vec::new();
                let mut mosaic = vec![0u8; image_len];
                let mut smoothed = vec![0u8; image_len];

                'run: while !stop.load(Ordering::Relaxed) {
                    if !get_frame(&minf_input, &mut minf) {
                        thread::sleep(POLL_INTERVAL);
                        continue;
                    }

                    // The matching blob list lags the min-filtered frame by
                    // however long the decomposition takes; wait for it.
                    loop {
                        if stop.load(Ordering::Relaxed) {
                            break 'run;
                        }
                        if get_frame(&blob_input, &mut encoded) {
                            break;
                        }
                        thread::sleep(POLL_INTERVAL);
                    }

                    decode_blobs(&encoded, &mut blobs);
                    bezier::reconstruct(&minf, dims.width, dims.height, &blobs, &mut mosaic);
                    gaussian::gaussian_blur(&mosaic, dims.width, dims.height, gf_sigma, &mut smoothed);

                    if !put_frame(&output, &smoothed, backpressure, &stop) {
                        warn!("background output ring full, frame dropped");
                    }
                }
            })
    }
}

impl Drop for BackgroundReconstructor {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Cloneable producer handle onto the reconstructor's input rings.
#[derive(Debug, Clone)]
pub(crate) struct BackgroundInput {
    infd_ring: Arc<Fifo>,
    infm_ring: Arc<Fifo>,
    image_len: usize,
    backpressure: Backpressure,
    stop: Arc<AtomicBool>,
}

impl BackgroundInput {
    pub(crate) fn put(&self, image: &[u8]) -> bool {
        assert_eq!(image.len(), self.image_len, "frame size mismatch");

        let mut ok = put_frame(&self.infd_ring, image, self.backpressure, &self.stop);
        ok &= put_frame(&self.infm_ring, image, self.backpressure, &self.stop);
        if !ok {
            warn!("background input ring full, frame dropped");
        }
        ok
    }
}

/// Cloneable consumer handle onto the reconstructed-background ring.
#[derive(Debug, Clone)]
pub(crate) struct BackgroundOutput {
    gfbr_ring: Arc<Fifo>,
    image_len: usize,
}

impl BackgroundOutput {
    pub(crate) fn get(&self, out: &mut [u8]) -> bool {
        assert_eq!(out.len(), self.image_len, "frame size mismatch");
        get_frame(&self.gfbr_ring, out)
    }
}

/// Replicate the first valid row/column into a `radius`-wide margin. Shared
/// border policy of the min and Gaussian filters.
pub(crate) fn replicate_borders(out: &mut [u8], width: usize, height: usize, radius: usize) {
    for y in 0..radius {
        out.copy_within(radius * width..(radius + 1) * width, y * width);
    }
    for y in height - radius..height {
        out.copy_within((height - radius - 1) * width..(height - radius) * width, y * width);
    }
    for y in 0..height {
        let row = &mut out[y * width..(y + 1) * width];
        let left = row[radius];
        row[..radius].fill(left);
        let right = row[width - radius - 1];
        row[width - radius..].fill(right);
    }
}

/// Serialize a blob list into a fixed-size ring frame: little-endian count,
/// then per blob top/left/bottom/right/range as u32 each.
fn encode_blobs(blobs: &[Blob], max_blobs: usize, out: &mut [u8]) {
    let count = blobs.len().min(max_blobs);
    if count < blobs.len() {
        warn!(dropped = blobs.len() - count, "blob list exceeds frame capacity");
    }

    out.fill(0);
    out[..4].copy_from_slice(&(count as u32).to_le_bytes());
    for (i, blob) in blobs[..count].iter().enumerate() {
        let at = 4 + i * BLOB_ENCODED_LEN;
        let fields = [
            blob.rect.top as u32,
            blob.rect.left as u32,
            blob.rect.bottom as u32,
            blob.rect.right as u32,
            blob.range as u32,
        ];
        for (j, field) in fields.into_iter().enumerate() {
            out[at + j * 4..at + j * 4 + 4].copy_from_slice(&field.to_le_bytes());
        }
    }
}

fn decode_blobs(frame: &[u8], out: &mut Vec<Blob>) {
    let count = u32::from_le_bytes(frame[..4].try_into().unwrap()) as usize;
    out.clear();
    for i in 0..count {
        let at = 4 + i * BLOB_ENCODED_LEN;
        let field = |j: usize| {
            u32::from_le_bytes(frame[at + j * 4..at + j * 4 + 4].try_into().unwrap()) as usize
        };
        out.push(Blob {
            rect: Quadrant {
                top: field(0),
                left: field(1),
                bottom: field(2),
                right: field(3),
            },
            range: field(4) as u8,
        });
    }
}
