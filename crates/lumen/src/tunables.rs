use parking_lot::Mutex;
use std::{sync::OnceLock, time::Duration};

/// Default worker wait timeout on the frame queue (milliseconds).
///
/// Status is the only cancellation signal; the worker re-checks it at least
/// this often even without a wake.
pub const DEFAULT_QUEUE_WAIT_MS: u64 = 500;
/// Default buffer pool minimum count.
pub const DEFAULT_POOL_MIN: usize = 4;
/// Default buffer pool bytes per buffer.
pub const DEFAULT_POOL_BYTES: usize = 1 << 20;
/// Default extra spare buffers beyond the minimum.
pub const DEFAULT_POOL_SPARE: usize = 8;

/// Tunables for the pipeline worker and buffer pools.
///
/// # Example
/// ```rust
/// use lumen::prelude::*;
///
/// set_pipeline_tunables(PipelineTunables {
///     queue_wait_ms: 100,
///     pool_min: 6,
///     pool_bytes: 2 << 20,
///     pool_spare: 8,
/// });
/// ```
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PipelineTunables {
    pub queue_wait_ms: u64,
    pub pool_min: usize,
    pub pool_bytes: usize,
    pub pool_spare: usize,
}

impl Default for PipelineTunables {
    fn default() -> Self {
        Self {
            queue_wait_ms: DEFAULT_QUEUE_WAIT_MS,
            pool_min: DEFAULT_POOL_MIN,
            pool_bytes: DEFAULT_POOL_BYTES,
            pool_spare: DEFAULT_POOL_SPARE,
        }
    }
}

impl PipelineTunables {
    fn sanitized(self) -> Self {
        Self {
            queue_wait_ms: self.queue_wait_ms.max(1),
            pool_min: self.pool_min.max(1),
            pool_bytes: self.pool_bytes.max(1),
            pool_spare: self.pool_spare,
        }
    }
}

static PIPELINE_TUNABLES: OnceLock<Mutex<PipelineTunables>> = OnceLock::new();

/// Override pipeline tunables process-wide.
pub fn set_pipeline_tunables(tunables: PipelineTunables) {
    let lock = PIPELINE_TUNABLES.get_or_init(|| Mutex::new(PipelineTunables::default()));
    *lock.lock() = tunables.sanitized();
}

pub(crate) fn queue_wait() -> Duration {
    let ms = PIPELINE_TUNABLES
        .get()
        .map(|t| t.lock().queue_wait_ms)
        .unwrap_or(DEFAULT_QUEUE_WAIT_MS);
    Duration::from_millis(ms)
}

pub(crate) fn pool_limits() -> (usize, usize, usize) {
    PIPELINE_TUNABLES
        .get()
        .map(|t| {
            let t = t.lock();
            (t.pool_min, t.pool_bytes, t.pool_spare)
        })
        .unwrap_or((DEFAULT_POOL_MIN, DEFAULT_POOL_BYTES, DEFAULT_POOL_SPARE))
}

/// Builder for process-wide engine tunables.
///
/// # Example
/// ```rust
/// use lumen::prelude::*;
///
/// EngineConfig::new()
///     .queue_wait_ms(250)
///     .buffer_pool(4, 1 << 20, 8)
///     .apply();
/// ```
#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct EngineConfig {
    pipeline: PipelineTunables,
}

impl EngineConfig {
    /// Start building a new configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the worker wait timeout on the frame queue.
    pub fn queue_wait_ms(mut self, ms: u64) -> Self {
        self.pipeline.queue_wait_ms = ms;
        self
    }

    /// Override buffer pool sizing.
    pub fn buffer_pool(mut self, min: usize, bytes: usize, spare: usize) -> Self {
        self.pipeline.pool_min = min;
        self.pipeline.pool_bytes = bytes;
        self.pipeline.pool_spare = spare;
        self
    }

    /// Apply the configuration to global tunables.
    pub fn apply(self) {
        set_pipeline_tunables(self.pipeline);
    }
}
