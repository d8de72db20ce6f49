#![doc = include_str!("../README.md")]

pub mod conversion;
pub mod whitebalance;

use lumen_core::prelude::{FourCc, ImageBuffer, Property, VideoFormat};
use smallvec::SmallVec;

/// What a filter does to the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    /// Changes pixel encoding.
    Conversion,
    /// Analyzes or annotates frames without changing encoding.
    Interpretation,
}

/// Lifecycle state of a filter. There is no paused state at this level;
/// a paused pipeline simply never started its filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterState {
    Stopped,
    Playing,
}

/// Static capability declaration for one filter instance.
#[derive(Debug, Clone)]
pub struct FilterDescription {
    /// Human-readable name, used in diagnostics.
    pub name: String,
    /// Capability kind.
    pub kind: FilterKind,
    /// Acceptable input encodings. A single wildcard entry means "any".
    pub input_codes: SmallVec<[FourCc; 8]>,
    /// Producible output encodings.
    pub output_codes: SmallVec<[FourCc; 8]>,
}

impl FilterDescription {
    /// Whether the input set is the wildcard (a single zero-value code).
    pub fn accepts_any_input(&self) -> bool {
        self.input_codes.len() == 1 && self.input_codes[0].is_any()
    }

    /// Whether `code` is an acceptable input encoding.
    pub fn accepts_input(&self, code: FourCc) -> bool {
        self.accepts_any_input() || self.input_codes.contains(&code)
    }

    /// Whether `code` is a producible output encoding.
    pub fn produces(&self, code: FourCc) -> bool {
        self.output_codes.contains(&code)
    }
}

/// A pipeline stage between source and sink.
///
/// Filters are owned exclusively by the pipeline manager. The format
/// handshake (`set_format`) may refuse a structurally matching pair for
/// reasons internal to the filter; refusal is not fatal to negotiation,
/// the next candidate is tried.
pub trait Filter: Send {
    /// Static capability declaration.
    fn description(&self) -> &FilterDescription;

    /// Attempt to configure the (input, output) format pair.
    ///
    /// Returns `false` to refuse; the filter keeps its previous formats.
    fn set_format(&mut self, input: VideoFormat, output: VideoFormat) -> bool;

    /// The negotiated format pair, once configured.
    fn format(&self) -> Option<(VideoFormat, VideoFormat)>;

    /// Transition the lifecycle state. Refusal propagates as pipeline failure.
    fn set_state(&mut self, state: FilterState) -> bool;

    /// Current lifecycle state.
    fn state(&self) -> FilterState;

    /// Process one frame in place during playback.
    fn apply(&mut self, frame: &mut ImageBuffer);

    /// Adjustable parameters this filter contributes to the pipeline.
    fn properties(&self) -> Vec<Property> {
        Vec::new()
    }
}
