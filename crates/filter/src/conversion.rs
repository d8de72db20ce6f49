use lumen_core::prelude::{FourCc, ImageBuffer, Resolution, VideoFormat};
use smallvec::SmallVec;
use tracing::debug;

use crate::{Filter, FilterDescription, FilterKind, FilterState};

/// Declarative conversion filter.
///
/// Converts between the encodings named in its description. The actual pixel
/// kernel lives with the consumer; inside the pipeline the converter's job is
/// the format handshake and retagging frames with the negotiated output
/// encoding.
///
/// # Example
/// ```rust
/// use lumen_core::prelude::*;
/// use lumen_filter::conversion::FormatConverter;
/// use lumen_filter::Filter;
///
/// let mut debayer = FormatConverter::new(
///     "debayer",
///     &[codes::BAYER_RGGB8, codes::BAYER_BGGR8],
///     &[codes::RGB24, codes::BGR24],
/// );
/// let input = VideoFormat::new(
///     codes::BAYER_RGGB8,
///     Resolution::new(640, 480).unwrap(),
///     FrameRate::from_fps(30).unwrap(),
/// );
/// assert!(debayer.set_format(input, input.with_code(codes::RGB24)));
/// ```
pub struct FormatConverter {
    description: FilterDescription,
    format: Option<(VideoFormat, VideoFormat)>,
    state: FilterState,
    max_resolution: Option<Resolution>,
}

impl FormatConverter {
    pub fn new(name: &str, inputs: &[FourCc], outputs: &[FourCc]) -> Self {
        Self {
            description: FilterDescription {
                name: name.into(),
                kind: FilterKind::Conversion,
                input_codes: SmallVec::from_slice(inputs),
                output_codes: SmallVec::from_slice(outputs),
            },
            format: None,
            state: FilterState::Stopped,
            max_resolution: None,
        }
    }

    /// Limit the resolutions this converter will accept. A structurally
    /// matching pair beyond the limit is refused at `set_format` time.
    pub fn with_max_resolution(mut self, max: Resolution) -> Self {
        self.max_resolution = Some(max);
        self
    }
}

impl Filter for FormatConverter {
    fn description(&self) -> &FilterDescription {
        &self.description
    }

    fn set_format(&mut self, input: VideoFormat, output: VideoFormat) -> bool {
        if !self.description.accepts_input(input.code) || !self.description.produces(output.code) {
            return false;
        }
        if input.resolution != output.resolution || input.rate != output.rate {
            return false;
        }
        if let Some(max) = self.max_resolution {
            if input.resolution.width > max.width || input.resolution.height > max.height {
                debug!(
                    filter = %self.description.name,
                    resolution = %input.resolution,
                    "refusing format pair beyond resolution limit"
                );
                return false;
            }
        }
        self.format = Some((input, output));
        true
    }

    fn format(&self) -> Option<(VideoFormat, VideoFormat)> {
        self.format
    }

    fn set_state(&mut self, state: FilterState) -> bool {
        // A converter cannot play before the handshake succeeded.
        if state == FilterState::Playing && self.format.is_none() {
            return false;
        }
        self.state = state;
        true
    }

    fn state(&self) -> FilterState {
        self.state
    }

    fn apply(&mut self, frame: &mut ImageBuffer) {
        if let Some((_, output)) = self.format {
            frame.meta_mut().format = output;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_core::prelude::{codes, FrameRate};

    fn fmt(code: FourCc, w: u32, h: u32) -> VideoFormat {
        VideoFormat::new(
            code,
            Resolution::new(w, h).unwrap(),
            FrameRate::from_fps(30).unwrap(),
        )
    }

    #[test]
    fn refuses_unknown_codes() {
        let mut conv = FormatConverter::new("debayer", &[codes::BAYER_RGGB8], &[codes::RGB24]);
        assert!(!conv.set_format(fmt(codes::MJPEG, 640, 480), fmt(codes::RGB24, 640, 480)));
        assert!(!conv.set_format(fmt(codes::BAYER_RGGB8, 640, 480), fmt(codes::YUYV, 640, 480)));
        assert!(conv.format().is_none());
    }

    #[test]
    fn refuses_geometry_mismatch() {
        let mut conv = FormatConverter::new("debayer", &[codes::BAYER_RGGB8], &[codes::RGB24]);
        assert!(!conv.set_format(fmt(codes::BAYER_RGGB8, 640, 480), fmt(codes::RGB24, 320, 240)));
    }

    #[test]
    fn refuses_resolution_beyond_limit() {
        let mut conv = FormatConverter::new("debayer", &[codes::BAYER_RGGB8], &[codes::RGB24])
            .with_max_resolution(Resolution::new(1280, 720).unwrap());
        assert!(!conv.set_format(
            fmt(codes::BAYER_RGGB8, 1920, 1080),
            fmt(codes::RGB24, 1920, 1080)
        ));
        assert!(conv.set_format(
            fmt(codes::BAYER_RGGB8, 1280, 720),
            fmt(codes::RGB24, 1280, 720)
        ));
    }

    #[test]
    fn cannot_play_unconfigured() {
        let mut conv = FormatConverter::new("debayer", &[codes::BAYER_RGGB8], &[codes::RGB24]);
        assert!(!conv.set_state(FilterState::Playing));
        assert!(conv.set_format(fmt(codes::BAYER_RGGB8, 640, 480), fmt(codes::RGB24, 640, 480)));
        assert!(conv.set_state(FilterState::Playing));
        assert_eq!(conv.state(), FilterState::Playing);
    }
}
