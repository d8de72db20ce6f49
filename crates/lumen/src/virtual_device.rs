//! Synthetic device and sink used by tests and examples.

use lumen_core::prelude::{
    BufferPool, FrameMeta, FrameRate, ImageBuffer, Resolution, VideoFormat,
    VideoFormatDescription,
};
use parking_lot::Mutex;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use crate::{
    device::{Device, DeviceLostCallback, Sink},
    manager::{FrameConsumer, PipelineBackref, PipelineStatus},
    tunables,
};

struct VirtualInner {
    formats: Vec<VideoFormatDescription>,
    active: Mutex<Option<VideoFormat>>,
    consumer: Mutex<Option<FrameConsumer>>,
    lost_callback: Mutex<Option<DeviceLostCallback>>,
    sequence: AtomicU64,
}

/// In-memory device delivering synthetic frames on demand.
///
/// Delivery is driven explicitly through the paired [`VirtualHandle`], so
/// tests control exactly when and how many frames arrive.
pub struct VirtualDevice {
    inner: Arc<VirtualInner>,
}

/// Test-side controls for a [`VirtualDevice`].
#[derive(Clone)]
pub struct VirtualHandle {
    inner: Arc<VirtualInner>,
}

impl VirtualDevice {
    pub fn new(formats: Vec<VideoFormatDescription>) -> (Self, VirtualHandle) {
        let inner = Arc::new(VirtualInner {
            formats,
            active: Mutex::new(None),
            consumer: Mutex::new(None),
            lost_callback: Mutex::new(None),
            sequence: AtomicU64::new(0),
        });
        (
            Self {
                inner: inner.clone(),
            },
            VirtualHandle { inner },
        )
    }

    /// A device offering 8-bit bayer and gray at 640x480.
    pub fn with_default_formats() -> (Self, VirtualHandle) {
        use lumen_core::prelude::codes;
        use lumen_core::prelude::ResolutionSpan;
        use smallvec::smallvec;

        let span = || ResolutionSpan::Fixed {
            resolution: Resolution::new(640, 480).expect("nonzero"),
            rates: smallvec![
                FrameRate::from_fps(15).expect("nonzero"),
                FrameRate::from_fps(30).expect("nonzero"),
            ],
        };
        Self::new(vec![
            VideoFormatDescription {
                code: codes::BAYER_RGGB8,
                spans: vec![span()],
            },
            VideoFormatDescription {
                code: codes::GRAY8,
                spans: vec![span()],
            },
        ])
    }
}

impl Device for VirtualDevice {
    fn available_formats(&self) -> Vec<VideoFormatDescription> {
        self.inner.formats.clone()
    }

    fn set_video_format(&mut self, format: &VideoFormat) -> bool {
        if !self.inner.formats.iter().any(|d| d.supports(format)) {
            return false;
        }
        *self.inner.active.lock() = Some(*format);
        true
    }

    fn active_video_format(&self) -> Option<VideoFormat> {
        *self.inner.active.lock()
    }

    fn start_stream(&mut self, consumer: FrameConsumer) -> bool {
        if self.inner.active.lock().is_none() {
            return false;
        }
        *self.inner.consumer.lock() = Some(consumer);
        true
    }

    fn stop_stream(&mut self) {
        *self.inner.consumer.lock() = None;
    }

    fn register_device_lost_callback(&mut self, callback: DeviceLostCallback) {
        *self.inner.lost_callback.lock() = Some(callback);
    }
}

impl VirtualHandle {
    /// Whether the device is currently delivering.
    pub fn is_streaming(&self) -> bool {
        self.inner.consumer.lock().is_some()
    }

    /// Deliver one synthetic frame tagged with the next sequence number.
    ///
    /// Returns `false` when the device is not streaming.
    pub fn deliver_frame(&self) -> bool {
        self.deliver_frame_with(|_| {})
    }

    /// Deliver one frame after letting `fill` write the payload.
    pub fn deliver_frame_with(&self, fill: impl FnOnce(&mut [u8])) -> bool {
        let consumer = self.inner.consumer.lock().clone();
        let Some(consumer) = consumer else {
            return false;
        };
        let Some(format) = *self.inner.active.lock() else {
            return false;
        };
        let sequence = self.inner.sequence.fetch_add(1, Ordering::Relaxed);

        let len = format.resolution.area() as usize;
        let mut lease = consumer.lease();
        lease.resize(len);
        fill(lease.as_mut_slice());

        consumer.push_image(ImageBuffer::new(
            FrameMeta::new(format, sequence, sequence * 1_000),
            lease,
        ));
        true
    }

    /// Deliver `count` frames back to back.
    pub fn deliver_frames(&self, count: usize) {
        for _ in 0..count {
            if !self.deliver_frame() {
                break;
            }
        }
    }

    /// Fire the lost-device callback, as the backend would on unplug.
    /// Callable repeatedly; de-duplication is the pipeline's job.
    pub fn trip_device_lost(&self) {
        if let Some(callback) = self.inner.lost_callback.lock().as_ref() {
            callback();
        }
    }
}

struct SinkState {
    requested: VideoFormat,
    pool: BufferPool,
    negotiated: Mutex<Option<VideoFormat>>,
    status: Mutex<PipelineStatus>,
    backref: Mutex<Option<PipelineBackref>>,
    sequences: Mutex<Vec<u64>>,
}

/// Collecting sink: records the sequence number of every frame it receives
/// and recycles the payload.
pub struct BufferSink {
    state: Arc<SinkState>,
}

/// Observer half of a [`BufferSink`].
#[derive(Clone)]
pub struct SinkProbe {
    state: Arc<SinkState>,
}

impl BufferSink {
    pub fn new(requested: VideoFormat) -> (Self, SinkProbe) {
        let (pool_min, pool_bytes, pool_spare) = tunables::pool_limits();
        let state = Arc::new(SinkState {
            requested,
            pool: BufferPool::with_limits(pool_min, pool_bytes, pool_min + pool_spare),
            negotiated: Mutex::new(None),
            status: Mutex::new(PipelineStatus::Undefined),
            backref: Mutex::new(None),
            sequences: Mutex::new(Vec::new()),
        });
        (
            Self {
                state: state.clone(),
            },
            SinkProbe { state },
        )
    }
}

impl Sink for BufferSink {
    fn requested_format(&self) -> Option<VideoFormat> {
        Some(self.state.requested)
    }

    fn set_source(&mut self, pipeline: PipelineBackref) {
        *self.state.backref.lock() = Some(pipeline);
    }

    fn set_video_format(&mut self, format: &VideoFormat) -> bool {
        if *format != self.state.requested {
            return false;
        }
        *self.state.negotiated.lock() = Some(*format);
        true
    }

    fn set_status(&mut self, status: PipelineStatus) -> bool {
        *self.state.status.lock() = status;
        true
    }

    fn push_image(&mut self, frame: ImageBuffer) {
        self.state.sequences.lock().push(frame.meta().sequence);
    }

    fn buffer_pool(&self) -> BufferPool {
        self.state.pool.clone()
    }
}

impl SinkProbe {
    /// Sequence numbers received so far, in arrival order.
    pub fn sequences(&self) -> Vec<u64> {
        self.state.sequences.lock().clone()
    }

    /// Number of frames received.
    pub fn count(&self) -> usize {
        self.state.sequences.lock().len()
    }

    /// Last status the pipeline propagated to the sink.
    pub fn status(&self) -> PipelineStatus {
        *self.state.status.lock()
    }

    /// Format accepted at negotiation time.
    pub fn negotiated_format(&self) -> Option<VideoFormat> {
        *self.state.negotiated.lock()
    }

    /// Pipeline status as seen through the sink's back-reference.
    pub fn pipeline_status(&self) -> Option<PipelineStatus> {
        self.state.backref.lock().as_ref().map(|b| b.status())
    }
}
