//! The fusion pipeline orchestrator.
//!
//! Owns every ring and worker of the five-stage graph:
//!
//! ```text
//!   raw IR ──► [IR preprocess] ──► gsci ──► [compositor] ──► fused
//!                    │                           ▲
//!                    ├──► [bkg reconstructor] ───┤
//!                    │                           │
//!   raw visible ──► [visible preprocess] ──► regt┘
//! ```
//!
//! Lifecycle is two-phase: [`Fusion::new`] allocates and validates without
//! spawning anything; [`Fusion::start`] brings the workers up in dependency
//! order and fails fast; [`Fusion::stop`] flips the shared stop flag and
//! joins. Frames move by value through the rings, so producers reuse their
//! buffers immediately.

mod compositor;
mod config;
mod error;


pub use config::FusionConfig;
pub use error::FusionError;

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use tracing::{debug, info, warn};

use crate::background::BackgroundReconstructor;
use crate::clahe::RawConverter;
use crate::fifo::{Backpressure, Fifo, POLL_INTERVAL, get_frame, put_frame};
use crate::frame::{FrameDimensions, PixelFormat};
use crate::registration::{ControlPoint, Registration};

use compositor::Compositor;

/// Concurrent IR / visible fusion pipeline.
#[derive(Debug)]
pub struct Fusion {
    config: FusionConfig,
    base: FrameDimensions,
    unreg: FrameDimensions,
    rawi_len: usize,
    rawv_len: usize,
    yuv_len: usize,
    gray_len: usize,
    rawi_ring: Arc<Fifo>,
    rawv_ring: Arc<Fifo>,
    gsci_ring: Arc<Fifo>,
    regt_ring: Arc<Fifo>,
    fusn_ring: Arc<Fifo>,
    iout_ring: Arc<Fifo>,
    vout_ring: Arc<Fifo>,
    brft_ring: Arc<Fifo>,
    registration: Arc<Registration>,
    reconstructor: BackgroundReconstructor,
    converter: Option<RawConverter>,
    stop: Arc<AtomicBool>,
    workers: Vec<JoinHandle<()>>,
}

impl Fusion {
    /// Build a pipeline for the given visible geometry and control points.
    /// No threads are spawned until [`Fusion::start`].
    pub fn new(
        config: FusionConfig,
        unreg: FrameDimensions,
        points: &[ControlPoint],
    ) -> Result<Self, FusionError> {
        let base = config.resolution.dimensions();
        let registration = Registration::new(base, unreg, points)?;
        Self::build(config, unreg, registration)
    }

    /// As [`Fusion::new`], reusing disk-cached interpolation tables when
    /// their fingerprint matches the configuration.
    pub fn with_cached_registration(
        config: FusionConfig,
        unreg: FrameDimensions,
        points: &[ControlPoint],
        row_table_path: &Path,
        col_table_path: &Path,
    ) -> Result<Self, FusionError> {
        let base = config.resolution.dimensions();
        let registration =
            Registration::with_cache(base, unreg, points, row_table_path, col_table_path)?;
        Self::build(config, unreg, registration)
    }

    fn build(
        config: FusionConfig,
        unreg: FrameDimensions,
        registration: Registration,
    ) -> Result<Self, FusionError> {
        config.validate();
        if config.raw_format != PixelFormat::Yuv420 {
            return Err(FusionError::UnsupportedFormat { format: config.raw_format });
        }

        let base = config.resolution.dimensions();
        let rawi_len = base.raw_ir_len();
        let rawv_len = unreg.yuv420_len();
        let yuv_len = base.yuv420_len();
        let gray_len = base.pixel_count();

        let converter = RawConverter::with_thresholds(
            config.raw_format,
            config.resolution,
            config.cut_thresh,
            config.clip_limit,
        );
        let reconstructor =
            BackgroundReconstructor::new(base, config.background, config.backpressure);

        let caches = config.caches;
        Ok(Self {
            base,
            unreg,
            rawi_len,
            rawv_len,
            yuv_len,
            gray_len,
            rawi_ring: Arc::new(Fifo::new(caches * rawi_len)),
            rawv_ring: Arc::new(Fifo::new(caches * rawv_len)),
            gsci_ring: Arc::new(Fifo::new(caches * yuv_len)),
            regt_ring: Arc::new(Fifo::new(caches * yuv_len)),
            fusn_ring: Arc::new(Fifo::new(caches * yuv_len)),
            iout_ring: Arc::new(Fifo::new(caches * yuv_len)),
            vout_ring: Arc::new(Fifo::new(caches * yuv_len)),
            brft_ring: Arc::new(Fifo::new(caches * gray_len)),
            registration: Arc::new(registration),
            reconstructor,
            converter: Some(converter),
            stop: Arc::new(AtomicBool::new(false)),
            workers: Vec::new(),
            config,
        })
    }

    #[inline]
    pub fn base_dimensions(&self) -> FrameDimensions {
        self.base
    }

    #[inline]
    pub fn unreg_dimensions(&self) -> FrameDimensions {
        self.unreg
    }

    /// Spawn the compositor, IR preprocessor and visible preprocessor, then
    /// start the background reconstructor. Fails fast: on any spawn error
    /// the already-running workers are stopped before returning.
    pub fn start(&mut self) -> Result<(), FusionError> {
        assert!(self.workers.is_empty(), "pipeline already started");
        assert!(self.converter.is_some(), "pipeline cannot be restarted");
        self.stop.store(false, Ordering::Relaxed);

        let spawned = self.spawn_all();
        match spawned {
            Ok(()) => {
                info!(
                    base_width = self.base.width,
                    base_height = self.base.height,
                    "fusion pipeline running"
                );
                Ok(())
            }
            Err(source) => {
                self.stop();
                Err(FusionError::WorkerSpawn { source })
            }
        }
    }

    fn spawn_all(&mut self) -> std::io::Result<()> {
        let handle = self.spawn_compositor()?;
        self.workers.push(handle);
        let handle = self.spawn_ir_preprocess()?;
        self.workers.push(handle);
        let handle = self.spawn_visible_preprocess()?;
        self.workers.push(handle);
        self.reconstructor.start()
    }

    /// Ask every worker to exit and join them; each observes the flag within
    /// one iteration.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        self.reconstructor.stop();
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }

    /// Enqueue one raw IR frame (2 bytes per pixel).
    pub fn put_infrared(&self, raw: &[u8]) -> Result<(), FusionError> {
        assert_eq!(raw.len(), self.rawi_len, "raw IR frame size mismatch");
        if put_frame(&self.rawi_ring, raw, self.config.backpressure, &self.stop) {
            Ok(())
        } else {
            warn!("raw IR ring full, frame dropped");
            Err(FusionError::PipelineFull)
        }
    }

    /// Enqueue one raw visible YUV 4:2:0 frame.
    pub fn put_visible(&self, raw: &[u8]) -> Result<(), FusionError> {
        assert_eq!(raw.len(), self.rawv_len, "raw visible frame size mismatch");
        if put_frame(&self.rawv_ring, raw, self.config.backpressure, &self.stop) {
            Ok(())
        } else {
            warn!("raw visible ring full, frame dropped");
            Err(FusionError::PipelineFull)
        }
    }

    /// Enqueue one frame on each input stream.
    pub fn put_frames(&self, ir: &[u8], visible: &[u8]) -> Result<(), FusionError> {
        self.put_infrared(ir)?;
        self.put_visible(visible)
    }

    /// Non-blocking: fetch one fused YUV frame if ready.
    pub fn get_fused(&self, out: &mut [u8]) -> bool {
        assert_eq!(out.len(), self.yuv_len, "fused frame size mismatch");
        get_frame(&self.fusn_ring, out)
    }

    /// Non-blocking tap: the latest grayscale-compressed IR frame.
    pub fn get_infrared_gsci(&self, out: &mut [u8]) -> bool {
        assert_eq!(out.len(), self.yuv_len, "gsci frame size mismatch");
        get_frame(&self.iout_ring, out)
    }

    /// Non-blocking tap: the latest registered visible frame.
    pub fn get_registered_visible(&self, out: &mut [u8]) -> bool {
        assert_eq!(out.len(), self.yuv_len, "registered frame size mismatch");
        get_frame(&self.vout_ring, out)
    }

    /// Non-blocking tap: the latest suppressed bright feature (grayscale).
    pub fn get_bright_feature(&self, out: &mut [u8]) -> bool {
        assert_eq!(out.len(), self.gray_len, "bright feature size mismatch");
        get_frame(&self.brft_ring, out)
    }

    fn spawn_ir_preprocess(&mut self) -> std::io::Result<JoinHandle<()>> {
        let input = Arc::clone(&self.rawi_ring);
        let gsci_out = Arc::clone(&self.gsci_ring);
        let tap_out = Arc::clone(&self.iout_ring);
        let stop = Arc::clone(&self.stop);
        let background = self.reconstructor.input();
        let mut converter = self.converter.take().expect("converter present before start");
        let rawi_len = self.rawi_len;
        let gray_len = self.gray_len;
        let backpressure = self.config.backpressure;

        thread::Builder::new().name("fusion-ir".into()).spawn(move || {
            let mut raw = vec![0u8; rawi_len];
            let mut gsci = vec![0u8; converter.output_len()];
            while !stop.load(Ordering::Relaxed) {
                if !get_frame(&input, &mut raw) {
                    thread::sleep(POLL_INTERVAL);
                    continue;
                }
                converter.convert(&raw, &mut gsci);

                background.put(&gsci[..gray_len]);
                if !put_frame(&gsci_out, &gsci, backpressure, &stop) {
                    warn!("gsci ring full, frame dropped");
                }
                if !put_frame(&tap_out, &gsci, Backpressure::Drop, &stop) {
                    debug!("gsci tap not drained, frame dropped");
                }
            }
        })
    }

    fn spawn_visible_preprocess(&self) -> std::io::Result<JoinHandle<()>> {
        let input = Arc::clone(&self.rawv_ring);
        let regt_out = Arc::clone(&self.regt_ring);
        let tap_out = Arc::clone(&self.vout_ring);
        let stop = Arc::clone(&self.stop);
        let registration = Arc::clone(&self.registration);
        let rawv_len = self.rawv_len;
        let yuv_len = self.yuv_len;
        let backpressure = self.config.backpressure;

        thread::Builder::new().name("fusion-visible".into()).spawn(move || {
            let mut raw = vec![0u8; rawv_len];
            let mut regt = vec![0u8; yuv_len];
            while !stop.load(Ordering::Relaxed) {
                if !get_frame(&input, &mut raw) {
                    thread::sleep(POLL_INTERVAL);
                    continue;
                }
                registration.warp(&raw, &mut regt);

                if !put_frame(&regt_out, &regt, backpressure, &stop) {
                    warn!("registered ring full, frame dropped");
                }
                if !put_frame(&tap_out, &regt, Backpressure::Drop, &stop) {
                    debug!("registered tap not drained, frame dropped");
                }
            }
        })
    }

    fn spawn_compositor(&self) -> std::io::Result<JoinHandle<()>> {
        let gsci_in = Arc::clone(&self.gsci_ring);
        let regt_in = Arc::clone(&self.regt_ring);
        let fused_out = Arc::clone(&self.fusn_ring);
        let bright_out = Arc::clone(&self.brft_ring);
        let stop = Arc::clone(&self.stop);
        let background = self.reconstructor.output();
        let yuv_len = self.yuv_len;
        let gray_len = self.gray_len;
        let backpressure = self.config.backpressure;
        let mut compositor = Compositor::new(
            self.base,
            self.config.ngls,
            self.config.ssr,
            self.config.bpr,
            self.config.style,
        );

        thread::Builder::new().name("fusion-compositor".into()).spawn(move || {
            let mut gsci = vec![0u8; yuv_len];
            let mut regt = vec![0u8; yuv_len];
            let mut bkg = vec![0u8; gray_len];
            let mut fused = vec![0u8; yuv_len];

            while !stop.load(Ordering::Relaxed) {
                // One frame from every upstream per iteration; a missing
                // input abandons the others for this round, favoring
                // liveness over lockstep under backpressure.
                if !get_frame(&gsci_in, &mut gsci) {
                    thread::sleep(POLL_INTERVAL);
                    continue;
                }
                if !get_frame(&regt_in, &mut regt) {
                    thread::sleep(POLL_INTERVAL);
                    continue;
                }
                if !background.get(&mut bkg) {
                    thread::sleep(POLL_INTERVAL);
                    continue;
                }

                compositor.compose(&gsci, &regt, &bkg, &mut fused);

                if !put_frame(&fused_out, &fused, backpressure, &stop) {
                    warn!("fused ring full, frame dropped");
                }
                if !put_frame(&bright_out, compositor.suppressed(), Backpressure::Drop, &stop) {
                    debug!("bright-feature tap not drained, frame dropped");
                }
            }
        })
    }
}

impl Drop for Fusion {
    fn drop(&mut self) {
        self.stop();
    }
}
