use parking_lot::Mutex;
use std::sync::Arc;

use crate::format::VideoFormat;

/// Metadata associated with a frame.
///
/// # Example
/// ```rust
/// use lumen_core::prelude::*;
///
/// let fmt = VideoFormat::new(
///     codes::GRAY8,
///     Resolution::new(640, 480).unwrap(),
///     FrameRate::from_fps(30).unwrap(),
/// );
/// let meta = FrameMeta::new(fmt, 7, 123);
/// assert_eq!(meta.sequence, 7);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct FrameMeta {
    /// Format describing layout and resolution.
    pub format: VideoFormat,
    /// Monotonic capture sequence number.
    pub sequence: u64,
    /// Timestamp in nanoseconds (caller-defined epoch).
    pub timestamp: u64,
}

impl FrameMeta {
    /// Create metadata with the given format, sequence, and timestamp.
    pub fn new(format: VideoFormat, sequence: u64, timestamp: u64) -> Self {
        Self {
            format,
            sequence,
            timestamp,
        }
    }
}

/// Handle to a pooled buffer.
///
/// When dropped, the buffer is returned to the originating pool so downstream
/// stages can reuse memory without reallocations.
///
/// # Example
/// ```rust
/// use lumen_core::prelude::BufferPool;
///
/// let pool = BufferPool::with_capacity(2, 1024);
/// let mut lease = pool.lease();
/// lease.resize(16);
/// assert_eq!(lease.len(), 16);
/// ```
pub struct BufferLease {
    pool: Arc<PoolInner>,
    buf: Option<Vec<u8>>,
}

impl BufferLease {
    /// Borrow as an immutable slice.
    pub fn as_slice(&self) -> &[u8] {
        self.buf.as_deref().unwrap_or(&[])
    }

    /// Borrow as a mutable slice.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        self.buf.as_deref_mut().unwrap_or(&mut [])
    }

    /// Current length of the buffer.
    pub fn len(&self) -> usize {
        self.buf.as_ref().map(|b| b.len()).unwrap_or(0)
    }

    /// Whether the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ensure the buffer capacity fits `len` bytes and set its length.
    pub fn resize(&mut self, len: usize) {
        if let Some(buf) = self.buf.as_mut() {
            if buf.capacity() < len {
                buf.reserve(len - buf.capacity());
            }
            buf.resize(len, 0);
        }
    }

    /// Copy `src` into the buffer, resizing to fit.
    pub fn fill_from(&mut self, src: &[u8]) {
        self.resize(src.len());
        if let Some(buf) = self.buf.as_mut() {
            buf.copy_from_slice(src);
        }
    }
}

impl Drop for BufferLease {
    fn drop(&mut self) {
        if let Some(buf) = self.buf.take() {
            self.pool.recycle(buf);
        }
    }
}

/// Simple buffer pool that hands out reusable owned buffers.
///
/// A sink exposes one of these at pipeline-creation time; frames captured by
/// the device are written into leased buffers and recycled when the consumer
/// drops them.
///
/// # Example
/// ```rust
/// use lumen_core::prelude::BufferPool;
///
/// let pool = BufferPool::with_limits(4, 1 << 20, 8);
/// let _lease = pool.lease();
/// ```
#[derive(Clone)]
pub struct BufferPool {
    inner: Arc<PoolInner>,
}

impl BufferPool {
    /// Create a pool with `capacity` preallocated buffers of `chunk_size` bytes.
    pub fn with_capacity(capacity: usize, chunk_size: usize) -> Self {
        Self::with_limits(capacity, chunk_size, capacity)
    }

    /// Create a pool with `capacity` preallocated buffers and a maximum retained free list.
    pub fn with_limits(capacity: usize, chunk_size: usize, max_free: usize) -> Self {
        let mut free = Vec::with_capacity(capacity);
        for _ in 0..capacity {
            free.push(vec![0; chunk_size]);
        }
        Self {
            inner: Arc::new(PoolInner {
                free: Mutex::new(free),
                chunk_size,
                max_free,
            }),
        }
    }

    /// Acquire a buffer, allocating if the pool is empty.
    pub fn lease(&self) -> BufferLease {
        let buf = self
            .inner
            .free
            .lock()
            .pop()
            .unwrap_or_else(|| vec![0; self.inner.chunk_size]);
        BufferLease {
            pool: self.inner.clone(),
            buf: Some(buf),
        }
    }
}

struct PoolInner {
    free: Mutex<Vec<Vec<u8>>>,
    chunk_size: usize,
    max_free: usize,
}

impl PoolInner {
    fn recycle(&self, mut buf: Vec<u8>) {
        buf.clear();
        let mut free = self.free.lock();
        if free.len() < self.max_free {
            free.push(buf);
        }
    }
}

/// A captured frame: one contiguous plane plus metadata.
///
/// Frames flow from the device through the pipeline queue to the sink; the
/// payload travels by ownership transfer, never by copy.
///
/// # Example
/// ```rust
/// use lumen_core::prelude::*;
///
/// let pool = BufferPool::with_capacity(1, 256);
/// let fmt = VideoFormat::new(
///     codes::GRAY8,
///     Resolution::new(8, 8).unwrap(),
///     FrameRate::from_fps(30).unwrap(),
/// );
/// let mut lease = pool.lease();
/// lease.resize(64);
/// let frame = ImageBuffer::new(FrameMeta::new(fmt, 0, 0), lease);
/// assert_eq!(frame.data().len(), 64);
/// ```
pub struct ImageBuffer {
    meta: FrameMeta,
    data: BufferLease,
}

impl ImageBuffer {
    /// Wrap a leased buffer with its metadata.
    pub fn new(meta: FrameMeta, data: BufferLease) -> Self {
        Self { meta, data }
    }

    /// Metadata describing this frame.
    pub fn meta(&self) -> &FrameMeta {
        &self.meta
    }

    /// Mutable metadata, for filters that rewrite the format in place.
    pub fn meta_mut(&mut self) -> &mut FrameMeta {
        &mut self.meta
    }

    /// Frame payload.
    pub fn data(&self) -> &[u8] {
        self.data.as_slice()
    }

    /// Mutable payload, for in-place filters.
    pub fn data_mut(&mut self) -> &mut [u8] {
        self.data.as_mut_slice()
    }
}
