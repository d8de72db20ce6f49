use lumen_core::prelude::{
    BufferPool, ImageBuffer, Property, VideoFormat, VideoFormatDescription,
};

use crate::manager::{FrameConsumer, PipelineBackref, PipelineStatus};

/// Invoked when the device disappears while streaming. May fire from any
/// thread, possibly more than once; the pipeline de-duplicates.
pub type DeviceLostCallback = Box<dyn Fn() + Send + Sync>;

/// Contract a camera backend must fulfil to act as a pipeline source.
///
/// The device owns its delivery thread; frames arrive asynchronously through
/// the `FrameConsumer` handed to `start_stream`.
pub trait Device: Send {
    /// Every format the device can be configured to produce.
    fn available_formats(&self) -> Vec<VideoFormatDescription>;

    /// Configure the capture format. Returns `false` if the device refuses.
    fn set_video_format(&mut self, format: &VideoFormat) -> bool;

    /// The currently configured format, if any.
    fn active_video_format(&self) -> Option<VideoFormat>;

    /// Begin asynchronous delivery into `consumer`. Returns `false` on failure.
    fn start_stream(&mut self, consumer: FrameConsumer) -> bool;

    /// Stop asynchronous delivery. Must be safe to call when not streaming.
    fn stop_stream(&mut self);

    /// Register the lost-device notification.
    fn register_device_lost_callback(&mut self, callback: DeviceLostCallback);

    /// Adjustable parameters the hardware exposes.
    fn properties(&self) -> Vec<Property> {
        Vec::new()
    }
}

/// Contract a downstream consumer must fulfil to act as a pipeline sink.
pub trait Sink: Send {
    /// The output format this sink wants to receive.
    fn requested_format(&self) -> Option<VideoFormat>;

    /// Non-owning back-reference to the pipeline, set once at wiring time.
    fn set_source(&mut self, pipeline: PipelineBackref);

    /// Accept the negotiated output format. Returns `false` to refuse.
    fn set_video_format(&mut self, format: &VideoFormat) -> bool;

    /// Follow a pipeline status transition. Failures during teardown are
    /// tolerated by the pipeline; failures during startup are fatal.
    fn set_status(&mut self, status: PipelineStatus) -> bool;

    /// Receive one processed frame, called from the pipeline worker thread.
    fn push_image(&mut self, frame: ImageBuffer);

    /// The memory pool the source should fill. Ownership of buffer memory is
    /// negotiated once at pipeline-creation time, not per frame.
    fn buffer_pool(&self) -> BufferPool;
}
