use lumen_core::prelude::{FourCc, VideoFormat, VideoFormatDescription};
use lumen_filter::{Filter, FilterKind};
use thiserror::Error;
use tracing::{debug, trace};

/// Why chain construction failed.
#[derive(Debug, Error)]
pub enum NegotiationError {
    #[error("device advertises no video formats")]
    NoDeviceFormats,
    #[error("no conversion path to {requested}")]
    NoConversionPath { requested: VideoFormat },
    #[error("filter '{stage}' placed in chain without a negotiated format")]
    Unconfigured { stage: String },
    #[error("chain validation failed at '{stage}': expected {expected}, found {found}")]
    ChainMismatch {
        stage: String,
        expected: VideoFormat,
        found: VideoFormat,
    },
}

impl NegotiationError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            NegotiationError::NoDeviceFormats => "no_device_formats",
            NegotiationError::NoConversionPath { .. } => "no_conversion_path",
            NegotiationError::Unconfigured { .. } => "unconfigured_stage",
            NegotiationError::ChainMismatch { .. } => "chain_mismatch",
        }
    }
}

type FormatPredicate = Box<dyn Fn(FourCc) -> bool + Send + Sync>;

/// Named downstream stages outside the pipeline that can convert encodings
/// the registered filters cannot.
///
/// Supplied to the negotiator at construction so it stays a pure function
/// over explicit inputs; when the table resolves a conversion, the stage
/// name is recorded in the plan instead of placing a filter.
#[derive(Default)]
pub struct CapabilityTable {
    stages: Vec<(String, FormatPredicate)>,
}

impl CapabilityTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a named external stage with its accepted-input predicate.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        accepts: impl Fn(FourCc) -> bool + Send + Sync + 'static,
    ) {
        self.stages.push((name.into(), Box::new(accepts)));
    }

    /// First registered stage accepting `code`.
    pub fn matching_stage(&self, code: FourCc) -> Option<&str> {
        self.stages
            .iter()
            .find(|(_, accepts)| accepts(code))
            .map(|(name, _)| name.as_str())
    }
}

/// Outcome of a successful negotiation.
///
/// `chain` holds indices into the filter pool passed to [`build_chain`], in
/// processing order. `required_stages` names external stages (from the
/// capability table) that must handle conversion downstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainPlan {
    /// Format the device must be configured to produce.
    pub input_format: VideoFormat,
    /// Ordered active chain, as indices into the filter pool.
    pub chain: Vec<usize>,
    /// External stages the caller must provide downstream.
    pub required_stages: Vec<String>,
}

/// Compute the device-side input format and the ordered filter chain for a
/// requested output format.
///
/// Conversion filters are tried first; the first device encoding accepted by
/// a filter that also passes the filter-level handshake wins. Interpretation
/// filters are then prepended for the chosen input encoding. The finished
/// chain is validated end-to-end before being returned; a chain that fails
/// validation is never returned partially.
pub fn build_chain(
    available: &[VideoFormatDescription],
    filters: &mut [Box<dyn Filter>],
    requested: VideoFormat,
    capabilities: &CapabilityTable,
) -> Result<ChainPlan, NegotiationError> {
    if available.is_empty() {
        return Err(NegotiationError::NoDeviceFormats);
    }

    let mut chain: Vec<usize> = Vec::new();
    let mut required_stages: Vec<String> = Vec::new();
    let mut input_format = requested;
    let mut converted = false;

    // Conversion selection: first matching (filter, device encoding) pair
    // that survives the filter-level handshake wins. Deliberately not a
    // global optimum; keeps negotiation latency flat.
    'conversion: for (idx, filter) in filters.iter_mut().enumerate() {
        let desc = filter.description();
        if desc.kind != FilterKind::Conversion || !desc.produces(requested.code) {
            continue;
        }
        for device_format in available {
            if !filter.description().accepts_input(device_format.code) {
                continue;
            }
            let candidate = requested.with_code(device_format.code);
            if filter.set_format(candidate, requested) {
                debug!(
                    filter = %filter.description().name,
                    input = %candidate,
                    output = %requested,
                    "conversion filter selected"
                );
                input_format = candidate;
                chain.push(idx);
                converted = true;
                break 'conversion;
            }
            // A structurally matching pair the filter refuses is skipped,
            // not fatal; the search continues.
            debug!(
                filter = %filter.description().name,
                input = %candidate,
                "filter refused format pair, skipping"
            );
        }
    }

    if !converted {
        let native = available.iter().any(|d| d.code == requested.code);
        if !native {
            // No registered filter converts; an external stage may.
            let external = available.iter().find_map(|d| {
                capabilities
                    .matching_stage(d.code)
                    .map(|stage| (d.code, stage.to_string()))
            });
            match external {
                Some((code, stage)) => {
                    debug!(stage = %stage, code = %code, "conversion deferred to external stage");
                    input_format = requested.with_code(code);
                    required_stages.push(stage);
                }
                None => {
                    return Err(NegotiationError::NoConversionPath { requested });
                }
            }
        }
    }

    // Interpretation filters run as early as possible, on the input
    // encoding, and never change it.
    for (idx, filter) in filters.iter_mut().enumerate() {
        let desc = filter.description();
        if desc.kind != FilterKind::Interpretation || !desc.accepts_input(input_format.code) {
            continue;
        }
        if filter.set_format(input_format, input_format) {
            trace!(filter = %filter.description().name, "interpretation filter prepended");
            chain.insert(0, idx);
        } else {
            debug!(
                filter = %filter.description().name,
                format = %input_format,
                "interpretation filter refused format, skipping"
            );
        }
    }

    validate_chain(filters, &chain, input_format, requested, &required_stages)?;

    Ok(ChainPlan {
        input_format,
        chain,
        required_stages,
    })
}

/// Walk the chain confirming every boundary lines up.
///
/// The running format starts at the negotiated input, must match each
/// filter's recorded input, and must end equal to the requested output
/// (unless an external stage completes the conversion downstream).
pub fn validate_chain(
    filters: &[Box<dyn Filter>],
    chain: &[usize],
    input_format: VideoFormat,
    requested: VideoFormat,
    required_stages: &[String],
) -> Result<(), NegotiationError> {
    let mut running = input_format;
    for &idx in chain {
        let filter = &filters[idx];
        let name = filter.description().name.clone();
        let Some((fin, fout)) = filter.format() else {
            return Err(NegotiationError::Unconfigured { stage: name });
        };
        if fin != running {
            return Err(NegotiationError::ChainMismatch {
                stage: name,
                expected: running,
                found: fin,
            });
        }
        running = fout;
    }

    if running != requested && required_stages.is_empty() {
        return Err(NegotiationError::ChainMismatch {
            stage: "sink".into(),
            expected: requested,
            found: running,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_core::prelude::{codes, FrameRate, Resolution, ResolutionSpan};
    use lumen_filter::conversion::FormatConverter;
    use lumen_filter::whitebalance::WhiteBalance;
    use smallvec::smallvec;

    fn device_format(code: FourCc) -> VideoFormatDescription {
        VideoFormatDescription {
            code,
            spans: vec![ResolutionSpan::Fixed {
                resolution: Resolution::new(640, 480).unwrap(),
                rates: smallvec![FrameRate::from_fps(30).unwrap()],
            }],
        }
    }

    fn fmt(code: FourCc) -> VideoFormat {
        VideoFormat::new(
            code,
            Resolution::new(640, 480).unwrap(),
            FrameRate::from_fps(30).unwrap(),
        )
    }

    fn debayer() -> Box<dyn Filter> {
        Box::new(FormatConverter::new(
            "debayer",
            &[codes::BAYER_RGGB8, codes::BAYER_BGGR8],
            &[codes::RGB24, codes::BGR24],
        ))
    }

    #[test]
    fn conversion_yields_one_filter_chain() {
        let available = vec![device_format(codes::BAYER_RGGB8)];
        let mut filters = vec![debayer()];
        let plan = build_chain(&available, &mut filters, fmt(codes::RGB24), &CapabilityTable::new())
            .unwrap();
        assert_eq!(plan.input_format, fmt(codes::BAYER_RGGB8));
        assert_eq!(plan.chain, vec![0]);
        assert!(plan.required_stages.is_empty());
    }

    #[test]
    fn native_output_yields_empty_chain() {
        let available = vec![
            device_format(codes::BAYER_RGGB8),
            device_format(codes::RGB24),
        ];
        let mut filters: Vec<Box<dyn Filter>> = Vec::new();
        let plan = build_chain(&available, &mut filters, fmt(codes::RGB24), &CapabilityTable::new())
            .unwrap();
        assert_eq!(plan.input_format, fmt(codes::RGB24));
        assert!(plan.chain.is_empty());
    }

    #[test]
    fn no_device_formats_fails_immediately() {
        let mut filters = vec![debayer()];
        let err = build_chain(&[], &mut filters, fmt(codes::RGB24), &CapabilityTable::new())
            .unwrap_err();
        assert!(matches!(err, NegotiationError::NoDeviceFormats));
    }

    #[test]
    fn unreachable_output_fails() {
        let available = vec![device_format(codes::MJPEG)];
        let mut filters = vec![debayer()];
        let err = build_chain(&available, &mut filters, fmt(codes::RGB24), &CapabilityTable::new())
            .unwrap_err();
        assert_eq!(err.code(), "no_conversion_path");
    }

    #[test]
    fn capability_table_records_external_stage() {
        let available = vec![device_format(codes::MJPEG)];
        let mut filters: Vec<Box<dyn Filter>> = Vec::new();
        let mut capabilities = CapabilityTable::new();
        capabilities.register("jpegdec", |code| code == codes::MJPEG);

        let plan = build_chain(&available, &mut filters, fmt(codes::RGB24), &capabilities).unwrap();
        assert_eq!(plan.input_format, fmt(codes::MJPEG));
        assert!(plan.chain.is_empty());
        assert_eq!(plan.required_stages, vec!["jpegdec".to_string()]);
    }

    #[test]
    fn refusing_filter_is_skipped_not_fatal() {
        // First converter refuses everything above 320x240; the second accepts.
        let strict = Box::new(
            FormatConverter::new("debayer-small", &[codes::BAYER_RGGB8], &[codes::RGB24])
                .with_max_resolution(Resolution::new(320, 240).unwrap()),
        );
        let available = vec![device_format(codes::BAYER_RGGB8)];
        let mut filters: Vec<Box<dyn Filter>> = vec![strict, debayer()];
        let plan = build_chain(&available, &mut filters, fmt(codes::RGB24), &CapabilityTable::new())
            .unwrap();
        assert_eq!(plan.chain, vec![1]);
    }

    #[test]
    fn interpretation_filter_prepends_before_conversion() {
        let available = vec![device_format(codes::BAYER_RGGB8)];
        let mut filters: Vec<Box<dyn Filter>> = vec![debayer(), Box::new(WhiteBalance::new())];
        let plan = build_chain(&available, &mut filters, fmt(codes::RGB24), &CapabilityTable::new())
            .unwrap();
        // White balance (idx 1) sits in front of the converter (idx 0).
        assert_eq!(plan.chain, vec![1, 0]);
        let (wb_in, wb_out) = filters[1].format().unwrap();
        assert_eq!(wb_in, fmt(codes::BAYER_RGGB8));
        assert_eq!(wb_out, fmt(codes::BAYER_RGGB8));
    }

    #[test]
    fn interpretation_filter_skipped_for_foreign_encoding() {
        let available = vec![device_format(codes::GRAY8)];
        let mut filters: Vec<Box<dyn Filter>> = vec![Box::new(WhiteBalance::new())];
        let plan = build_chain(&available, &mut filters, fmt(codes::GRAY8), &CapabilityTable::new())
            .unwrap();
        assert!(plan.chain.is_empty());
    }

    #[test]
    fn validation_rejects_tampered_chain() {
        let available = vec![device_format(codes::BAYER_RGGB8)];
        let mut filters = vec![debayer()];
        let plan = build_chain(&available, &mut filters, fmt(codes::RGB24), &CapabilityTable::new())
            .unwrap();
        // Re-validate against a different requested output: must fail.
        let err = validate_chain(
            &filters,
            &plan.chain,
            plan.input_format,
            fmt(codes::BGR24),
            &[],
        )
        .unwrap_err();
        assert_eq!(err.code(), "chain_mismatch");
    }
}
