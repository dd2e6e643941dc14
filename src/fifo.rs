//! Byte-granular bounded ring buffer used to hand frames between pipeline
//! stages.
//!
//! One producer and one consumer per ring. There is no signalling primitive:
//! a consumer that reads short simply retries. The whole put/get runs under
//! the ring's mutex, so `in`/`out` are always observed consistently.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// How long a worker sleeps after finding nothing ready on its input ring.
pub(crate) const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Policy applied when a frame is offered to a full ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backpressure {
    /// Discard the offered frame and log; the pipeline stays fresh.
    #[default]
    Drop,
    /// Retry with a short sleep until space is available (test mode).
    Block,
}

#[derive(Debug)]
struct FifoInner {
    buffer: Vec<u8>,
    /// Total bytes ever written. `wr - rd` is the readable length.
    wr: u64,
    /// Total bytes ever read.
    rd: u64,
}

/// Thread-safe bounded byte queue with power-of-two capacity.
#[derive(Debug)]
pub struct Fifo {
    inner: Mutex<FifoInner>,
    size: usize,
}

impl Fifo {
    /// Create a ring of at least `size` bytes, rounded up to a power of two
    /// so that index masking is a bitwise AND.
    pub fn new(size: usize) -> Self {
        assert!(size > 0, "Ring size must be positive");
        let size = size.next_power_of_two();
        Self {
            inner: Mutex::new(FifoInner {
                buffer: vec![0u8; size],
                wr: 0,
                rd: 0,
            }),
            size,
        }
    }

    /// Ring capacity in bytes (always a power of two).
    #[inline]
    pub fn capacity(&self) -> usize {
        self.size
    }

    /// Number of readable bytes currently in the ring.
    pub fn len(&self) -> usize {
        let inner = self.inner.lock().unwrap();
        (inner.wr - inner.rd) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append up to `data.len()` bytes, wrapping at the buffer end.
    /// Returns the number of bytes actually written; a short write means the
    /// ring is full.
    pub fn put(&self, data: &[u8]) -> usize {
        let mut inner = self.inner.lock().unwrap();
        let mask = self.size - 1;

        let avail = self.size - (inner.wr - inner.rd) as usize;
        let n = data.len().min(avail);

        // First copy from the write index to the buffer end, then wrap the
        // remainder to offset 0.
        let at = (inner.wr as usize) & mask;
        let first = n.min(self.size - at);
        inner.buffer[at..at + first].copy_from_slice(&data[..first]);
        inner.buffer[..n - first].copy_from_slice(&data[first..n]);
        inner.wr += n as u64;

        n
    }

    /// Read up to `buf.len()` bytes into `buf`, mirroring the wrap-split of
    /// `put`. Returns the number of bytes actually read; a short read means
    /// nothing (or not enough) is ready.
    pub fn get(&self, buf: &mut [u8]) -> usize {
        let mut inner = self.inner.lock().unwrap();
        let mask = self.size - 1;

        let readable = (inner.wr - inner.rd) as usize;
        let n = buf.len().min(readable);

        let at = (inner.rd as usize) & mask;
        let first = n.min(self.size - at);
        buf[..first].copy_from_slice(&inner.buffer[at..at + first]);
        buf[first..n].copy_from_slice(&inner.buffer[..n - first]);
        inner.rd += n as u64;

        // Harmless re-basing once drained.
        if inner.wr == inner.rd {
            inner.wr = 0;
            inner.rd = 0;
        }

        n
    }
}

/// Put one whole frame or nothing. The ring has a single producer, so a
/// headroom check followed by a put cannot be interleaved with another
/// write; frames never straddle a drop.
pub(crate) fn put_frame(ring: &Fifo, frame: &[u8], mode: Backpressure, stop: &AtomicBool) -> bool {
    loop {
        if ring.capacity() - ring.len() >= frame.len() {
            let n = ring.put(frame);
            debug_assert_eq!(n, frame.len());
            return true;
        }
        match mode {
            Backpressure::Drop => return false,
            Backpressure::Block => {
                if stop.load(Ordering::Relaxed) {
                    return false;
                }
                std::thread::sleep(POLL_INTERVAL);
            }
        }
    }
}

/// Get one whole frame or nothing (the single consumer sees a stable length).
pub(crate) fn get_frame(ring: &Fifo, frame: &mut [u8]) -> bool {
    if ring.len() < frame.len() {
        return false;
    }
    let n = ring.get(frame);
    debug_assert_eq!(n, frame.len());
    true
}
