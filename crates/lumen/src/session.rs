use lumen_core::prelude::{Property, VideoFormat, VideoFormatDescription};
use lumen_filter::Filter;
use thiserror::Error;
use tracing::info;

use crate::{
    device::{Device, Sink},
    manager::{PipelineError, PipelineEvent, PipelineManager, PipelineStatus},
    negotiate::CapabilityTable,
};

/// The one unrecoverable construction-time failure: the device cannot be
/// opened at all. Everything after open reports through `PipelineError`.
#[derive(Debug, Error)]
pub enum DeviceOpenError {
    #[error("device advertises no video formats")]
    NoFormats,
    #[error("device backend unavailable: {0}")]
    Unavailable(String),
}

/// Owns one device and its pipeline for the device's whole lifetime.
///
/// Thin session wrapper over [`PipelineManager`]: opening validates the
/// device, streaming wires a sink and transitions to Playing, closing
/// destroys the pipeline and releases the device.
///
/// # Example
/// ```rust
/// use lumen::prelude::*;
/// use lumen::virtual_device::VirtualDevice;
///
/// let (device, _handle) = VirtualDevice::with_default_formats();
/// let session = CaptureSession::open(Box::new(device)).unwrap();
/// assert!(!session.available_formats().is_empty());
/// ```
pub struct CaptureSession {
    manager: PipelineManager,
}

impl CaptureSession {
    /// Open a session over `device` with an empty capability table.
    pub fn open(device: Box<dyn Device>) -> Result<Self, DeviceOpenError> {
        Self::open_with_capabilities(device, CapabilityTable::new())
    }

    /// Open a session, supplying the external-stage capability table the
    /// negotiator consults.
    pub fn open_with_capabilities(
        device: Box<dyn Device>,
        capabilities: CapabilityTable,
    ) -> Result<Self, DeviceOpenError> {
        if device.available_formats().is_empty() {
            return Err(DeviceOpenError::NoFormats);
        }
        let mut manager = PipelineManager::new(capabilities);
        manager
            .set_source(device)
            .map_err(|err| DeviceOpenError::Unavailable(err.to_string()))?;
        info!("capture session opened");
        Ok(Self { manager })
    }

    /// Formats the device offers.
    pub fn available_formats(&self) -> &[VideoFormatDescription] {
        self.manager.available_formats()
    }

    /// Configure the capture format while stopped.
    pub fn set_video_format(&mut self, format: &VideoFormat) -> Result<(), PipelineError> {
        self.manager.set_video_format(format)
    }

    /// The device's currently configured format.
    pub fn active_video_format(&self) -> Option<VideoFormat> {
        self.manager.active_video_format()
    }

    /// Adjustable parameters: device properties plus filter-contributed ones.
    pub fn properties(&self) -> Vec<Property> {
        self.manager.get_properties()
    }

    /// Register a filter for the negotiator to place.
    pub fn register_filter(&mut self, filter: Box<dyn Filter>) -> Result<(), PipelineError> {
        self.manager.register_filter(filter)
    }

    /// Receive device-lost and end-of-stream notifications.
    pub fn set_event_callback(
        &mut self,
        callback: impl Fn(PipelineEvent) + Send + Sync + 'static,
    ) {
        self.manager.set_event_callback(callback);
    }

    /// Wire `sink` and start streaming into it.
    pub fn start_stream(&mut self, sink: Box<dyn Sink>) -> Result<(), PipelineError> {
        self.manager.set_sink(sink)?;
        self.manager.set_status(PipelineStatus::Playing)
    }

    /// Stop streaming; the sink stays wired for a later restart.
    pub fn stop_stream(&mut self) -> Result<(), PipelineError> {
        self.manager.set_status(PipelineStatus::Stopped)
    }

    /// Current pipeline status.
    pub fn status(&self) -> PipelineStatus {
        self.manager.status()
    }

    /// Whether a streaming run is active.
    pub fn is_running(&self) -> bool {
        self.manager.is_running()
    }

    /// Direct access to the pipeline manager.
    pub fn manager(&mut self) -> &mut PipelineManager {
        &mut self.manager
    }

    /// Destroy the pipeline and release the device.
    pub fn close(mut self) {
        self.manager.destroy_pipeline();
        info!("capture session closed");
    }
}
