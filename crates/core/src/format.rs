use smallvec::SmallVec;
use std::{fmt, num::NonZeroU32, str::FromStr};

/// Four-character code describing a pixel encoding.
///
/// # Example
/// ```rust
/// use lumen_core::prelude::FourCc;
///
/// let fcc = FourCc::new(*b"MJPG");
/// assert_eq!(fcc.to_string(), "MJPG");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FourCc([u8; 4]);

impl FourCc {
    /// Wildcard code: a filter advertising this as its only input accepts
    /// any encoding.
    pub const ANY: FourCc = FourCc([0; 4]);

    /// Construct from raw bytes.
    pub const fn new(bytes: [u8; 4]) -> Self {
        Self(bytes)
    }

    /// Little-endian u32 encoding.
    pub fn to_u32(self) -> u32 {
        u32::from_le_bytes(self.0)
    }

    /// Try to convert to a printable string.
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.0).ok()
    }

    /// Whether this is the wildcard code.
    pub fn is_any(self) -> bool {
        self == Self::ANY
    }

    /// Encoding family used for preference ranking.
    pub fn family(self) -> FormatFamily {
        FormatFamily::of(self)
    }
}

impl From<u32> for FourCc {
    fn from(value: u32) -> Self {
        Self(value.to_le_bytes())
    }
}

impl fmt::Display for FourCc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(s) = self.as_str() {
            write!(f, "{s}")
        } else {
            write!(f, "0x{:08x}", self.to_u32())
        }
    }
}

impl FromStr for FourCc {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = s.as_bytes();
        if bytes.len() != 4 {
            return Err("fourcc must be four ASCII bytes".into());
        }
        let mut arr = [0u8; 4];
        arr.copy_from_slice(bytes);
        Ok(FourCc(arr))
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for FourCc {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        // Prefer string encoding so decoding does not rely on `deserialize_any`.
        let encoded = self.as_str().unwrap_or("FFFF");
        serializer.serialize_str(encoded)
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for FourCc {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct FourCcVisitor;

        impl<'de> serde::de::Visitor<'de> for FourCcVisitor {
            type Value = FourCc;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a 4-character FourCc string")
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                FourCc::from_str(v).map_err(E::custom)
            }
        }

        deserializer.deserialize_str(FourCcVisitor)
    }
}

/// Well-known encoding codes.
pub mod codes {
    use super::FourCc;

    pub const BAYER_RGGB8: FourCc = FourCc::new(*b"RGGB");
    pub const BAYER_GRBG8: FourCc = FourCc::new(*b"GRBG");
    pub const BAYER_GBRG8: FourCc = FourCc::new(*b"GBRG");
    pub const BAYER_BGGR8: FourCc = FourCc::new(*b"BGGR");

    pub const BAYER_RGGB10: FourCc = FourCc::new(*b"RG10");
    pub const BAYER_BGGR10: FourCc = FourCc::new(*b"BG10");
    pub const BAYER_RGGB12: FourCc = FourCc::new(*b"RG12");
    pub const BAYER_BGGR12: FourCc = FourCc::new(*b"BG12");
    pub const BAYER_RGGB16: FourCc = FourCc::new(*b"RG16");
    pub const BAYER_BGGR16: FourCc = FourCc::new(*b"BG16");

    /// Companded (piecewise-linear) 12-bit bayer.
    pub const BAYER_PWL12: FourCc = FourCc::new(*b"PWL2");
    /// Companded 16-bit container holding 12 significant bits.
    pub const BAYER_PWL16H12: FourCc = FourCc::new(*b"PWLH");

    pub const RGB24: FourCc = FourCc::new(*b"RG24");
    pub const BGR24: FourCc = FourCc::new(*b"BG24");
    pub const RGBA32: FourCc = FourCc::new(*b"RGBA");
    pub const BGRA32: FourCc = FourCc::new(*b"BGRA");

    pub const YUYV: FourCc = FourCc::new(*b"YUYV");
    pub const UYVY: FourCc = FourCc::new(*b"UYVY");
    pub const NV12: FourCc = FourCc::new(*b"NV12");
    pub const I420: FourCc = FourCc::new(*b"I420");

    pub const MJPEG: FourCc = FourCc::new(*b"MJPG");

    pub const GRAY8: FourCc = FourCc::new(*b"GREY");
    pub const GRAY16: FourCc = FourCc::new(*b"Y16 ");

    pub const POLARIZED_BAYER8: FourCc = FourCc::new(*b"PB08");
    pub const POLARIZED_BAYER16: FourCc = FourCc::new(*b"PB16");
    pub const POLARIZED_MONO8: FourCc = FourCc::new(*b"PM08");
    pub const POLARIZED_MONO16: FourCc = FourCc::new(*b"PM16");
}

/// Encoding family, ordered by negotiation preference.
///
/// When several candidate encodings are equally valid the negotiator picks
/// the family with the lowest rank: 8-bit bayer first, then RGB, YUV,
/// MJPEG, 16-bit gray, 8-bit gray, companded bayer, deeper bayer, and
/// polarization-encoded variants last.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FormatFamily {
    Bayer8,
    Rgb,
    Yuv,
    Mjpeg,
    Gray16,
    Gray8,
    BayerPwl,
    Bayer10,
    Bayer12,
    Bayer16,
    PolarizedBayer,
    PolarizedMono,
    Unknown,
}

impl FormatFamily {
    fn of(code: FourCc) -> FormatFamily {
        use codes::*;
        match code {
            BAYER_RGGB8 | BAYER_GRBG8 | BAYER_GBRG8 | BAYER_BGGR8 => FormatFamily::Bayer8,
            RGB24 | BGR24 | RGBA32 | BGRA32 => FormatFamily::Rgb,
            YUYV | UYVY | NV12 | I420 => FormatFamily::Yuv,
            MJPEG => FormatFamily::Mjpeg,
            GRAY16 => FormatFamily::Gray16,
            GRAY8 => FormatFamily::Gray8,
            BAYER_PWL12 | BAYER_PWL16H12 => FormatFamily::BayerPwl,
            BAYER_RGGB10 | BAYER_BGGR10 => FormatFamily::Bayer10,
            BAYER_RGGB12 | BAYER_BGGR12 => FormatFamily::Bayer12,
            BAYER_RGGB16 | BAYER_BGGR16 => FormatFamily::Bayer16,
            POLARIZED_BAYER8 | POLARIZED_BAYER16 => FormatFamily::PolarizedBayer,
            POLARIZED_MONO8 | POLARIZED_MONO16 => FormatFamily::PolarizedMono,
            _ => FormatFamily::Unknown,
        }
    }

    /// Preference rank; lower wins. `None` for unranked encodings.
    pub fn rank(self) -> Option<u32> {
        match self {
            FormatFamily::Bayer8 => Some(0),
            FormatFamily::Rgb => Some(10),
            FormatFamily::Yuv => Some(20),
            FormatFamily::Mjpeg => Some(30),
            FormatFamily::Gray16 => Some(40),
            FormatFamily::Gray8 => Some(50),
            FormatFamily::BayerPwl => Some(60),
            FormatFamily::Bayer10 => Some(65),
            FormatFamily::Bayer12 => Some(70),
            FormatFamily::Bayer16 => Some(80),
            FormatFamily::PolarizedBayer => Some(90),
            FormatFamily::PolarizedMono => Some(100),
            FormatFamily::Unknown => None,
        }
    }
}

/// Pick the most preferred encoding from a candidate set.
///
/// # Example
/// ```rust
/// use lumen_core::format::{codes, preferred_code};
///
/// let picked = preferred_code(&[codes::MJPEG, codes::BAYER_RGGB8, codes::YUYV]);
/// assert_eq!(picked, Some(codes::BAYER_RGGB8));
/// ```
pub fn preferred_code(candidates: &[FourCc]) -> Option<FourCc> {
    candidates
        .iter()
        .filter_map(|code| code.family().rank().map(|rank| (rank, *code)))
        .min_by_key(|(rank, _)| *rank)
        .map(|(_, code)| code)
}

/// Resolution of a frame.
///
/// # Example
/// ```rust
/// use lumen_core::prelude::Resolution;
///
/// let res = Resolution::new(640, 480).unwrap();
/// assert_eq!(res.area(), 640 * 480);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Resolution {
    /// Width in pixels (non-zero).
    pub width: NonZeroU32,
    /// Height in pixels (non-zero).
    pub height: NonZeroU32,
}

impl Resolution {
    /// Create a resolution, returning `None` if width or height are zero.
    pub fn new(width: u32, height: u32) -> Option<Self> {
        Some(Self {
            width: NonZeroU32::new(width)?,
            height: NonZeroU32::new(height)?,
        })
    }

    /// Pixel count, for largest-mode comparisons.
    pub fn area(&self) -> u64 {
        self.width.get() as u64 * self.height.get() as u64
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Frame rate expressed as a rational (frames per second).
///
/// # Example
/// ```rust
/// use lumen_core::prelude::FrameRate;
///
/// let rate = FrameRate::from_fps(30).unwrap();
/// assert!(FrameRate::from_fps(60).unwrap() > rate);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FrameRate {
    /// Numerator of the fps rational.
    pub numerator: NonZeroU32,
    /// Denominator of the fps rational.
    pub denominator: NonZeroU32,
}

impl FrameRate {
    /// Construct from whole frames per second.
    pub fn from_fps(fps: u32) -> Option<Self> {
        Some(Self {
            numerator: NonZeroU32::new(fps)?,
            denominator: NonZeroU32::new(1)?,
        })
    }

    /// Frames per second as floating point.
    pub fn fps(&self) -> f64 {
        self.numerator.get() as f64 / self.denominator.get() as f64
    }
}

impl PartialOrd for FrameRate {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FrameRate {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Compare as rationals to avoid float rounding.
        let lhs = self.numerator.get() as u64 * other.denominator.get() as u64;
        let rhs = other.numerator.get() as u64 * self.denominator.get() as u64;
        lhs.cmp(&rhs)
    }
}

impl fmt::Display for FrameRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

/// Fully specified video format: encoding, geometry, and rate.
///
/// Immutable value type; two formats are equal when every field matches.
///
/// # Example
/// ```rust
/// use lumen_core::prelude::*;
///
/// let fmt = VideoFormat::new(
///     codes::RGB24,
///     Resolution::new(1920, 1080).unwrap(),
///     FrameRate::from_fps(30).unwrap(),
/// );
/// assert_eq!(fmt.code.to_string(), "RG24");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VideoFormat {
    /// FourCc code describing pixel layout.
    pub code: FourCc,
    /// Resolution of the frame.
    pub resolution: Resolution,
    /// Frame rate.
    pub rate: FrameRate,
}

impl VideoFormat {
    /// Build a new format.
    pub fn new(code: FourCc, resolution: Resolution, rate: FrameRate) -> Self {
        Self {
            code,
            resolution,
            rate,
        }
    }

    /// Same format with a different encoding code.
    pub fn with_code(&self, code: FourCc) -> Self {
        Self { code, ..*self }
    }
}

impl fmt::Display for VideoFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}@{}", self.code, self.resolution, self.rate)
    }
}

/// Resolutions a device offers for one encoding: either a fixed size or a
/// stepwise range, each with its own frame-rate set.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ResolutionSpan {
    Fixed {
        resolution: Resolution,
        rates: SmallVec<[FrameRate; 4]>,
    },
    Stepwise {
        min: Resolution,
        max: Resolution,
        step_width: u32,
        step_height: u32,
        rates: SmallVec<[FrameRate; 4]>,
    },
}

impl ResolutionSpan {
    /// Whether `res` lies inside this span.
    pub fn contains(&self, res: Resolution) -> bool {
        match self {
            ResolutionSpan::Fixed { resolution, .. } => *resolution == res,
            ResolutionSpan::Stepwise {
                min,
                max,
                step_width,
                step_height,
                ..
            } => {
                let w = res.width.get();
                let h = res.height.get();
                if w < min.width.get() || w > max.width.get() {
                    return false;
                }
                if h < min.height.get() || h > max.height.get() {
                    return false;
                }
                let step_w = (*step_width).max(1);
                let step_h = (*step_height).max(1);
                (w - min.width.get()) % step_w == 0 && (h - min.height.get()) % step_h == 0
            }
        }
    }

    /// Largest resolution expressible in this span.
    pub fn max_resolution(&self) -> Resolution {
        match self {
            ResolutionSpan::Fixed { resolution, .. } => *resolution,
            ResolutionSpan::Stepwise { max, .. } => *max,
        }
    }

    /// Rates advertised for this span.
    pub fn rates(&self) -> &[FrameRate] {
        match self {
            ResolutionSpan::Fixed { rates, .. } => rates,
            ResolutionSpan::Stepwise { rates, .. } => rates,
        }
    }
}

/// Everything a device advertises for one encoding.
///
/// # Example
/// ```rust
/// use lumen_core::prelude::*;
/// use smallvec::smallvec;
///
/// let desc = VideoFormatDescription {
///     code: codes::BAYER_RGGB8,
///     spans: vec![ResolutionSpan::Fixed {
///         resolution: Resolution::new(640, 480).unwrap(),
///         rates: smallvec![FrameRate::from_fps(30).unwrap()],
///     }],
/// };
/// assert!(desc.supports(&VideoFormat::new(
///     codes::BAYER_RGGB8,
///     Resolution::new(640, 480).unwrap(),
///     FrameRate::from_fps(30).unwrap(),
/// )));
/// ```
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VideoFormatDescription {
    /// Encoding this description covers.
    pub code: FourCc,
    /// Supported resolutions with their frame rates.
    pub spans: Vec<ResolutionSpan>,
}

impl VideoFormatDescription {
    /// Whether the description covers the given concrete format.
    pub fn supports(&self, format: &VideoFormat) -> bool {
        if self.code != format.code {
            return false;
        }
        self.spans.iter().any(|span| {
            span.contains(format.resolution) && span.rates().iter().any(|r| *r == format.rate)
        })
    }
}

/// Select the preferred fully-fixed format from a set of descriptions.
///
/// Rules: pick the preferred encoding family first, then the largest area
/// (strictly greater wins; equal areas keep the first seen), then the
/// highest frame rate offered at that resolution.
pub fn largest_format(descriptions: &[VideoFormatDescription]) -> Option<VideoFormat> {
    let all_codes: Vec<FourCc> = descriptions.iter().map(|d| d.code).collect();
    let preferred = preferred_code(&all_codes)?;

    let mut best: Option<(Resolution, FrameRate)> = None;
    for desc in descriptions.iter().filter(|d| d.code == preferred) {
        for span in &desc.spans {
            let res = span.max_resolution();
            let Some(rate) = span.rates().iter().max().copied() else {
                continue;
            };
            match best {
                None => best = Some((res, rate)),
                Some((best_res, best_rate)) => {
                    if res.area() > best_res.area()
                        || (res == best_res && rate > best_rate)
                    {
                        best = Some((res, rate));
                    }
                }
            }
        }
    }

    best.map(|(resolution, rate)| VideoFormat::new(preferred, resolution, rate))
}

/// Structured wire descriptor equivalent to a FourCc.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaDescriptor {
    /// Media-type name, e.g. `video/x-bayer`.
    pub media_type: &'static str,
    /// Pixel-layout string within the media type; empty when implied.
    pub layout: &'static str,
}

const fn md(media_type: &'static str, layout: &'static str) -> MediaDescriptor {
    MediaDescriptor { media_type, layout }
}

static MEDIA_TABLE: &[(FourCc, MediaDescriptor)] = &[
    (codes::BAYER_RGGB8, md("video/x-bayer", "rggb")),
    (codes::BAYER_GRBG8, md("video/x-bayer", "grbg")),
    (codes::BAYER_GBRG8, md("video/x-bayer", "gbrg")),
    (codes::BAYER_BGGR8, md("video/x-bayer", "bggr")),
    (codes::BAYER_RGGB10, md("video/x-bayer", "rggb10")),
    (codes::BAYER_BGGR10, md("video/x-bayer", "bggr10")),
    (codes::BAYER_RGGB12, md("video/x-bayer", "rggb12")),
    (codes::BAYER_BGGR12, md("video/x-bayer", "bggr12")),
    (codes::BAYER_RGGB16, md("video/x-bayer", "rggb16")),
    (codes::BAYER_BGGR16, md("video/x-bayer", "bggr16")),
    (codes::BAYER_PWL12, md("video/x-bayer", "rggb12-pwl")),
    (codes::BAYER_PWL16H12, md("video/x-bayer", "rggb16h12-pwl")),
    (codes::RGB24, md("video/x-raw", "RGB")),
    (codes::BGR24, md("video/x-raw", "BGR")),
    (codes::RGBA32, md("video/x-raw", "RGBA")),
    (codes::BGRA32, md("video/x-raw", "BGRA")),
    (codes::YUYV, md("video/x-raw", "YUY2")),
    (codes::UYVY, md("video/x-raw", "UYVY")),
    (codes::NV12, md("video/x-raw", "NV12")),
    (codes::I420, md("video/x-raw", "I420")),
    (codes::MJPEG, md("image/jpeg", "")),
    (codes::GRAY8, md("video/x-raw", "GRAY8")),
    (codes::GRAY16, md("video/x-raw", "GRAY16_LE")),
    (codes::POLARIZED_BAYER8, md("video/x-bayer", "polarized-bggr8")),
    (codes::POLARIZED_BAYER16, md("video/x-bayer", "polarized-bggr16")),
    (codes::POLARIZED_MONO8, md("video/x-raw", "polarized-mono8")),
    (codes::POLARIZED_MONO16, md("video/x-raw", "polarized-mono16")),
];

/// Map a FourCc to its structured descriptor.
pub fn media_descriptor(code: FourCc) -> Option<MediaDescriptor> {
    MEDIA_TABLE
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, desc)| *desc)
}

/// Inverse mapping from a structured descriptor to a FourCc.
///
/// # Example
/// ```rust
/// use lumen_core::format::{codes, fourcc_from_media};
///
/// assert_eq!(fourcc_from_media("image/jpeg", ""), Some(codes::MJPEG));
/// ```
pub fn fourcc_from_media(media_type: &str, layout: &str) -> Option<FourCc> {
    MEDIA_TABLE
        .iter()
        .find(|(_, desc)| desc.media_type == media_type && desc.layout == layout)
        .map(|(code, _)| *code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::smallvec;

    fn fixed(code: FourCc, w: u32, h: u32, fps: &[u32]) -> VideoFormatDescription {
        VideoFormatDescription {
            code,
            spans: vec![ResolutionSpan::Fixed {
                resolution: Resolution::new(w, h).unwrap(),
                rates: fps
                    .iter()
                    .map(|f| FrameRate::from_fps(*f).unwrap())
                    .collect(),
            }],
        }
    }

    #[test]
    fn preferred_code_ranks_bayer8_first() {
        let picked = preferred_code(&[codes::GRAY8, codes::MJPEG, codes::BAYER_BGGR8]);
        assert_eq!(picked, Some(codes::BAYER_BGGR8));
    }

    #[test]
    fn preferred_code_prefers_gray16_over_gray8() {
        let picked = preferred_code(&[codes::GRAY8, codes::GRAY16]);
        assert_eq!(picked, Some(codes::GRAY16));
    }

    #[test]
    fn preferred_code_skips_unranked() {
        assert_eq!(preferred_code(&[FourCc::new(*b"????")]), None);
    }

    #[test]
    fn largest_format_takes_biggest_area() {
        let descs = vec![
            fixed(codes::BAYER_RGGB8, 640, 480, &[30]),
            fixed(codes::BAYER_RGGB8, 1920, 1080, &[15, 30]),
        ];
        let fmt = largest_format(&descs).unwrap();
        assert_eq!(fmt.resolution, Resolution::new(1920, 1080).unwrap());
        assert_eq!(fmt.rate, FrameRate::from_fps(30).unwrap());
    }

    #[test]
    fn largest_format_equal_area_keeps_first_seen() {
        // 800x600 and 960x500 have the same area; the first one wins.
        let descs = vec![
            fixed(codes::GRAY8, 800, 600, &[30]),
            fixed(codes::GRAY8, 960, 500, &[60]),
        ];
        let fmt = largest_format(&descs).unwrap();
        assert_eq!(fmt.resolution, Resolution::new(800, 600).unwrap());
    }

    #[test]
    fn largest_format_tie_breaks_on_frame_rate() {
        let descs = vec![VideoFormatDescription {
            code: codes::GRAY8,
            spans: vec![
                ResolutionSpan::Fixed {
                    resolution: Resolution::new(640, 480).unwrap(),
                    rates: smallvec![
                        FrameRate::from_fps(15).unwrap(),
                        FrameRate::from_fps(60).unwrap(),
                    ],
                },
                ResolutionSpan::Fixed {
                    resolution: Resolution::new(640, 480).unwrap(),
                    rates: smallvec![FrameRate::from_fps(30).unwrap()],
                },
            ],
        }];
        let fmt = largest_format(&descs).unwrap();
        assert_eq!(fmt.rate, FrameRate::from_fps(60).unwrap());
    }

    #[test]
    fn largest_format_ignores_less_preferred_codes() {
        let descs = vec![
            fixed(codes::MJPEG, 3840, 2160, &[30]),
            fixed(codes::BAYER_RGGB8, 1280, 720, &[60]),
        ];
        let fmt = largest_format(&descs).unwrap();
        assert_eq!(fmt.code, codes::BAYER_RGGB8);
        assert_eq!(fmt.resolution, Resolution::new(1280, 720).unwrap());
    }

    #[test]
    fn stepwise_span_checks_steps() {
        let span = ResolutionSpan::Stepwise {
            min: Resolution::new(320, 240).unwrap(),
            max: Resolution::new(1280, 960).unwrap(),
            step_width: 160,
            step_height: 120,
            rates: smallvec![FrameRate::from_fps(30).unwrap()],
        };
        assert!(span.contains(Resolution::new(640, 480).unwrap()));
        assert!(!span.contains(Resolution::new(650, 480).unwrap()));
        assert!(!span.contains(Resolution::new(1440, 960).unwrap()));
    }

    #[test]
    fn media_mapping_round_trips() {
        for (code, desc) in MEDIA_TABLE {
            assert_eq!(fourcc_from_media(desc.media_type, desc.layout), Some(*code));
            assert_eq!(media_descriptor(*code), Some(*desc));
        }
    }
}
