use lumen_core::prelude::{
    BufferLease, BufferPool, FrameQueue, ImageBuffer, Property, VideoFormat,
    VideoFormatDescription,
};
use lumen_filter::{Filter, FilterState};
use parking_lot::Mutex;
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Weak,
    },
    thread,
};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::{
    device::{Device, Sink},
    negotiate::{build_chain, CapabilityTable, NegotiationError},
    tunables,
};

/// Lifecycle of the pipeline. Single authoritative field on the manager;
/// every sub-component must follow a transition before it counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStatus {
    Undefined,
    Stopped,
    Paused,
    Playing,
    Error,
}

/// Out-of-band notifications surfaced through the registered callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineEvent {
    /// The device disappeared while streaming. The pipeline does not
    /// reconnect; the caller must reopen.
    DeviceLost,
    /// No further frames will be delivered. Emitted exactly once per
    /// streaming run.
    EndOfStream,
}

/// Structural pipeline failures.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("operation requires a stopped pipeline (status is {0:?})")]
    NotStopped(PipelineStatus),
    #[error("no source device set")]
    NoSource,
    #[error("no sink set")]
    NoSink,
    #[error("sink did not provide a requested format")]
    NoRequestedFormat,
    #[error(transparent)]
    Negotiation(#[from] NegotiationError),
    #[error("device refused format {0}")]
    SourceRejectedFormat(VideoFormat),
    #[error("sink refused format {0}")]
    SinkRejectedFormat(VideoFormat),
    #[error("'{stage}' refused transition to {status:?}")]
    StageRefusedStatus {
        stage: String,
        status: PipelineStatus,
    },
    #[error("device failed to start streaming")]
    StreamStartFailed,
}

impl PipelineError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            PipelineError::NotStopped(_) => "not_stopped",
            PipelineError::NoSource => "no_source",
            PipelineError::NoSink => "no_sink",
            PipelineError::NoRequestedFormat => "no_requested_format",
            PipelineError::Negotiation(_) => "negotiation",
            PipelineError::SourceRejectedFormat(_) => "source_rejected_format",
            PipelineError::SinkRejectedFormat(_) => "sink_rejected_format",
            PipelineError::StageRefusedStatus { .. } => "stage_refused_status",
            PipelineError::StreamStartFailed => "stream_start_failed",
        }
    }

    /// Whether retrying the same call can succeed without caller changes.
    pub fn retryable(&self) -> bool {
        matches!(
            self,
            PipelineError::NotStopped(_) | PipelineError::StreamStartFailed
        )
    }
}

type EventCallback = Box<dyn Fn(PipelineEvent) + Send + Sync>;

/// State shared between the manager, the worker thread, and the producer.
///
/// The device is owned exclusively by the manager; the filter pool and chain
/// live here because the worker walks them per frame. The manager only
/// mutates them while the worker is guaranteed not to run.
///
/// Lock order where both are taken: `chain` before `filters`.
pub(crate) struct PipelineShared {
    status: Mutex<PipelineStatus>,
    queue: FrameQueue<ImageBuffer>,
    filters: Mutex<Vec<Box<dyn Filter>>>,
    chain: Mutex<Vec<usize>>,
    property_filter: Mutex<Option<Box<dyn Filter>>>,
    sink: Mutex<Option<Box<dyn Sink>>>,
    running: AtomicBool,
    event_callback: Mutex<Option<EventCallback>>,
}

impl PipelineShared {
    fn status(&self) -> PipelineStatus {
        *self.status.lock()
    }

    fn set_status(&self, status: PipelineStatus) {
        *self.status.lock() = status;
    }

    fn emit(&self, event: PipelineEvent) {
        if let Some(callback) = self.event_callback.lock().as_ref() {
            callback(event);
        }
    }
}

/// Producer-side handle handed to the device for frame delivery.
///
/// Invoked from the device's own delivery thread. Carries the sink's buffer
/// pool so the device can lease destination memory without allocating.
#[derive(Clone)]
pub struct FrameConsumer {
    shared: Arc<PipelineShared>,
    pool: BufferPool,
}

impl FrameConsumer {
    /// Lease a destination buffer from the sink's pool.
    pub fn lease(&self) -> BufferLease {
        self.pool.lease()
    }

    /// Offer a captured frame to the pipeline.
    ///
    /// No-ops while the pipeline is stopped; the dropped lease recycles the
    /// buffer back to the pool. Otherwise the frame is enqueued in arrival
    /// order and the worker is woken.
    pub fn push_image(&self, frame: ImageBuffer) {
        match self.shared.status() {
            PipelineStatus::Stopped | PipelineStatus::Undefined | PipelineStatus::Error => {
                // Dropping the frame returns its buffer to the pool.
            }
            _ => self.shared.queue.push(frame),
        }
    }
}

/// Non-owning back-reference from a sink to its pipeline.
#[derive(Clone)]
pub struct PipelineBackref {
    shared: Weak<PipelineShared>,
}

impl PipelineBackref {
    /// Current pipeline status; `Undefined` once the pipeline is gone.
    pub fn status(&self) -> PipelineStatus {
        self.shared
            .upgrade()
            .map(|shared| shared.status())
            .unwrap_or(PipelineStatus::Undefined)
    }
}

/// Owns source, sink, and filter chain; drives the status state machine and
/// the worker thread.
///
/// # Example
/// ```rust
/// use lumen::prelude::*;
///
/// let mut manager = PipelineManager::new(CapabilityTable::new());
/// assert_eq!(manager.status(), PipelineStatus::Stopped);
/// assert!(matches!(
///     manager.set_status(PipelineStatus::Playing),
///     Err(PipelineError::NoSource)
/// ));
/// ```
pub struct PipelineManager {
    shared: Arc<PipelineShared>,
    device: Option<Box<dyn Device>>,
    required_stages: Vec<String>,
    available_formats: Vec<VideoFormatDescription>,
    input_format: Option<VideoFormat>,
    capabilities: CapabilityTable,
    worker: Option<thread::JoinHandle<()>>,
}

impl PipelineManager {
    pub fn new(capabilities: CapabilityTable) -> Self {
        Self {
            shared: Arc::new(PipelineShared {
                status: Mutex::new(PipelineStatus::Stopped),
                queue: FrameQueue::new(),
                filters: Mutex::new(Vec::new()),
                chain: Mutex::new(Vec::new()),
                property_filter: Mutex::new(None),
                sink: Mutex::new(None),
                running: AtomicBool::new(false),
                event_callback: Mutex::new(None),
            }),
            device: None,
            required_stages: Vec::new(),
            available_formats: Vec::new(),
            input_format: None,
            capabilities,
            worker: None,
        }
    }

    /// Current authoritative status.
    pub fn status(&self) -> PipelineStatus {
        self.shared.status()
    }

    /// Whether a streaming run is active (flips false on device loss).
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// Register a filter into the available pool. The negotiator decides
    /// placement at the next Playing transition.
    pub fn register_filter(&mut self, filter: Box<dyn Filter>) -> Result<(), PipelineError> {
        self.ensure_stopped()?;
        self.shared.filters.lock().push(filter);
        Ok(())
    }

    /// External stages the last negotiation deferred conversion to.
    pub fn required_stages(&self) -> &[String] {
        &self.required_stages
    }

    /// Negotiated device-side input format of the active pipeline.
    pub fn input_format(&self) -> Option<VideoFormat> {
        self.input_format
    }

    /// Register the out-of-band event callback.
    pub fn set_event_callback(&mut self, callback: impl Fn(PipelineEvent) + Send + Sync + 'static) {
        *self.shared.event_callback.lock() = Some(Box::new(callback));
    }

    /// Install the source device.
    ///
    /// Captures the device's format set, installs the property post-filter,
    /// and wires the lost-device latch. Fails while Playing or Paused.
    pub fn set_source(&mut self, mut device: Box<dyn Device>) -> Result<(), PipelineError> {
        self.ensure_stopped()?;

        self.available_formats = device.available_formats();

        let shared = self.shared.clone();
        device.register_device_lost_callback(Box::new(move || {
            // Latch: repeated callback invocations emit exactly one pair.
            if shared.running.swap(false, Ordering::AcqRel) {
                warn!("device lost while streaming");
                shared.emit(PipelineEvent::DeviceLost);
                shared.emit(PipelineEvent::EndOfStream);
            }
        }));

        *self.shared.property_filter.lock() =
            Some(Box::new(lumen_filter::whitebalance::WhiteBalance::new()));

        self.device = Some(device);
        self.input_format = None;
        debug!(formats = self.available_formats.len(), "source installed");
        Ok(())
    }

    /// Install the sink. Fails while Playing or Paused.
    pub fn set_sink(&mut self, mut sink: Box<dyn Sink>) -> Result<(), PipelineError> {
        self.ensure_stopped()?;
        sink.set_source(PipelineBackref {
            shared: Arc::downgrade(&self.shared),
        });
        *self.shared.sink.lock() = Some(sink);
        Ok(())
    }

    /// Format set captured from the source at `set_source` time.
    pub fn available_formats(&self) -> &[VideoFormatDescription] {
        &self.available_formats
    }

    /// Configure the device format directly, outside a Playing transition.
    pub fn set_video_format(&mut self, format: &VideoFormat) -> Result<(), PipelineError> {
        self.ensure_stopped()?;
        let device = self.device.as_mut().ok_or(PipelineError::NoSource)?;
        if !device.set_video_format(format) {
            return Err(PipelineError::SourceRejectedFormat(*format));
        }
        Ok(())
    }

    /// The device's currently configured format.
    pub fn active_video_format(&self) -> Option<VideoFormat> {
        self.device.as_ref().and_then(|d| d.active_video_format())
    }

    /// Live property set: device properties merged with those the property
    /// filter introduces.
    pub fn get_properties(&self) -> Vec<Property> {
        let mut properties = self
            .device
            .as_ref()
            .map(|d| d.properties())
            .unwrap_or_default();
        if let Some(filter) = self.shared.property_filter.lock().as_ref() {
            properties.extend(filter.properties());
        }
        properties
    }

    /// Drive the status state machine. Idempotent when already at `target`.
    pub fn set_status(&mut self, target: PipelineStatus) -> Result<(), PipelineError> {
        if self.status() == target {
            return Ok(());
        }
        match target {
            PipelineStatus::Playing => self.start_playing(),
            PipelineStatus::Stopped => {
                self.stop_playing();
                Ok(())
            }
            PipelineStatus::Paused => {
                // Paused is "not yet playing": stages stay stopped.
                if self.status() == PipelineStatus::Playing {
                    self.stop_playing();
                }
                self.shared.set_status(PipelineStatus::Paused);
                Ok(())
            }
            other => {
                self.shared.set_status(other);
                Ok(())
            }
        }
    }

    /// Force Stopped, then release source and sink ownership.
    pub fn destroy_pipeline(&mut self) {
        self.stop_playing();
        self.device = None;
        *self.shared.sink.lock() = None;
        *self.shared.property_filter.lock() = None;
        self.shared.chain.lock().clear();
        self.input_format = None;
        info!("pipeline destroyed");
    }

    fn ensure_stopped(&self) -> Result<(), PipelineError> {
        match self.status() {
            PipelineStatus::Playing | PipelineStatus::Paused => {
                Err(PipelineError::NotStopped(self.status()))
            }
            _ => Ok(()),
        }
    }

    /// Negotiate the chain and configure source and sink formats.
    fn create_pipeline(&mut self) -> Result<(), PipelineError> {
        let device = self.device.as_mut().ok_or(PipelineError::NoSource)?;

        let requested = {
            let sink = self.shared.sink.lock();
            let sink = sink.as_ref().ok_or(PipelineError::NoSink)?;
            sink.requested_format()
                .ok_or(PipelineError::NoRequestedFormat)?
        };

        let plan = {
            let mut filters = self.shared.filters.lock();
            build_chain(
                &self.available_formats,
                &mut filters,
                requested,
                &self.capabilities,
            )?
        };

        if !device.set_video_format(&plan.input_format) {
            return Err(PipelineError::SourceRejectedFormat(plan.input_format));
        }

        {
            let mut sink = self.shared.sink.lock();
            let sink = sink.as_mut().ok_or(PipelineError::NoSink)?;
            if !sink.set_video_format(&requested) {
                return Err(PipelineError::SinkRejectedFormat(requested));
            }
        }

        // The property filter rides along on the input format when it can;
        // an incompatible encoding just leaves it inert.
        if let Some(filter) = self.shared.property_filter.lock().as_mut() {
            if !filter.set_format(plan.input_format, plan.input_format) {
                debug!(
                    format = %plan.input_format,
                    "property filter inactive for this input format"
                );
            }
        }

        info!(
            input = %plan.input_format,
            output = %requested,
            chain_len = plan.chain.len(),
            "pipeline negotiated"
        );
        self.input_format = Some(plan.input_format);
        *self.shared.chain.lock() = plan.chain;
        self.required_stages = plan.required_stages;
        Ok(())
    }

    /// Playing transition: negotiate, propagate status (sink, source,
    /// filters, property filter), then start the worker.
    fn start_playing(&mut self) -> Result<(), PipelineError> {
        if let Err(err) = self.try_start_playing() {
            error!(code = err.code(), "playing transition failed: {err}");
            // Unwind through the normal stop path so no stage is left
            // half-playing, then record the failure.
            self.stop_playing();
            self.shared.set_status(PipelineStatus::Error);
            return Err(err);
        }
        Ok(())
    }

    fn try_start_playing(&mut self) -> Result<(), PipelineError> {
        self.create_pipeline()?;

        {
            let mut sink = self.shared.sink.lock();
            let sink = sink.as_mut().ok_or(PipelineError::NoSink)?;
            if !sink.set_status(PipelineStatus::Playing) {
                return Err(PipelineError::StageRefusedStatus {
                    stage: "sink".into(),
                    status: PipelineStatus::Playing,
                });
            }
        }

        // Producer-side pushes must pass the status gate before the device
        // starts delivering.
        self.shared.set_status(PipelineStatus::Playing);
        self.shared.running.store(true, Ordering::Release);

        let pool = {
            let sink = self.shared.sink.lock();
            sink.as_ref().ok_or(PipelineError::NoSink)?.buffer_pool()
        };
        let consumer = FrameConsumer {
            shared: self.shared.clone(),
            pool,
        };
        let device = self.device.as_mut().ok_or(PipelineError::NoSource)?;
        if !device.start_stream(consumer) {
            return Err(PipelineError::StreamStartFailed);
        }

        {
            let chain = self.shared.chain.lock();
            let mut filters = self.shared.filters.lock();
            for &idx in chain.iter() {
                let filter = &mut filters[idx];
                if !filter.set_state(FilterState::Playing) {
                    return Err(PipelineError::StageRefusedStatus {
                        stage: filter.description().name.clone(),
                        status: PipelineStatus::Playing,
                    });
                }
            }
        }
        if let Some(filter) = self.shared.property_filter.lock().as_mut() {
            if filter.format().is_some() && !filter.set_state(FilterState::Playing) {
                return Err(PipelineError::StageRefusedStatus {
                    stage: filter.description().name.clone(),
                    status: PipelineStatus::Playing,
                });
            }
        }

        // A worker thread is single-use; each Playing transition gets a
        // fresh one.
        let shared = self.shared.clone();
        self.worker = Some(
            thread::Builder::new()
                .name("lumen-pipeline".into())
                .spawn(move || run_pipeline(shared))
                .map_err(|_| PipelineError::StreamStartFailed)?,
        );
        info!("pipeline playing");
        Ok(())
    }

    /// Stopped transition: flip status, wake the worker, stop source then
    /// filters then sink, join the worker, drain the queue.
    fn stop_playing(&mut self) {
        self.shared.set_status(PipelineStatus::Stopped);
        self.shared.running.store(false, Ordering::Release);
        self.shared.queue.notify_all();

        if let Some(device) = self.device.as_mut() {
            device.stop_stream();
        }
        {
            let chain = self.shared.chain.lock();
            let mut filters = self.shared.filters.lock();
            for &idx in chain.iter() {
                let filter = &mut filters[idx];
                if !filter.set_state(FilterState::Stopped) {
                    warn!(filter = %filter.description().name, "filter refused stop");
                }
            }
        }
        if let Some(filter) = self.shared.property_filter.lock().as_mut() {
            if filter.state() == FilterState::Playing {
                filter.set_state(FilterState::Stopped);
            }
        }
        {
            let mut sink = self.shared.sink.lock();
            if let Some(sink) = sink.as_mut() {
                // A sink mid-teardown may legitimately refuse; log and move on.
                if !sink.set_status(PipelineStatus::Stopped) {
                    warn!("sink refused stop, continuing teardown");
                }
            }
        }

        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("pipeline worker panicked");
            }
        }
        self.shared.queue.clear();
        debug!("pipeline stopped");
    }
}

impl Drop for PipelineManager {
    fn drop(&mut self) {
        // Best-effort shutdown if the caller forgot to stop.
        if self.worker.is_some() {
            self.stop_playing();
        }
    }
}

/// Worker loop: pop one frame at a time, apply the property filter (it is
/// configured on the device-side encoding, so it runs first), walk the
/// negotiated chain, forward to the sink. Exits permanently once status
/// leaves Playing.
fn run_pipeline(shared: Arc<PipelineShared>) {
    let wait = tunables::queue_wait();
    debug!(wait_ms = wait.as_millis() as u64, "pipeline worker started");
    loop {
        if shared.status() != PipelineStatus::Playing {
            break;
        }
        let Some(mut frame) = shared.queue.wait_pop(wait) else {
            // Timeout or shutdown wake; loop to re-check status.
            continue;
        };
        if let Some(filter) = shared.property_filter.lock().as_mut() {
            filter.apply(&mut frame);
        }
        {
            let chain = shared.chain.lock();
            let mut filters = shared.filters.lock();
            for &idx in chain.iter() {
                filters[idx].apply(&mut frame);
            }
        }
        if let Some(sink) = shared.sink.lock().as_mut() {
            sink.push_image(frame);
        }
    }
    debug!("pipeline worker exited");
}
