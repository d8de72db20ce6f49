#![doc = include_str!("../README.md")]

pub mod device;
pub mod manager;
pub mod negotiate;
pub mod session;
pub mod tunables;
pub mod virtual_device;

pub mod prelude {
    pub use crate::{
        device::{Device, DeviceLostCallback, Sink},
        manager::{
            FrameConsumer, PipelineBackref, PipelineError, PipelineEvent, PipelineManager,
            PipelineStatus,
        },
        negotiate::{build_chain, CapabilityTable, ChainPlan, NegotiationError},
        session::{CaptureSession, DeviceOpenError},
        tunables::{set_pipeline_tunables, EngineConfig, PipelineTunables},
    };
    pub use lumen_core::prelude::*;
    pub use lumen_filter::{Filter, FilterDescription, FilterKind, FilterState};
}
