#![doc = include_str!("../README.md")]

pub mod buffer;
pub mod format;
pub mod properties;
pub mod queue;

pub mod prelude {
    pub use crate::{
        buffer::{BufferLease, BufferPool, FrameMeta, ImageBuffer},
        format::{
            codes, fourcc_from_media, largest_format, media_descriptor, preferred_code,
            FormatFamily, FourCc, FrameRate, MediaDescriptor, Resolution, ResolutionSpan,
            VideoFormat, VideoFormatDescription,
        },
        properties::{
            Access, Property, PropertyBackend, PropertyError, PropertyKind, PropertyMeta,
            PropertyValue,
        },
        queue::FrameQueue,
    };
}
