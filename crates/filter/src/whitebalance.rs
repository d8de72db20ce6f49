use lumen_core::prelude::{
    codes, FourCc, ImageBuffer, Property, PropertyBackend, PropertyError, PropertyMeta,
    PropertyValue, VideoFormat,
};
use parking_lot::Mutex;
use smallvec::smallvec;
use std::sync::Arc;
use tracing::{debug, trace};

use crate::{Filter, FilterDescription, FilterKind, FilterState};

/// Neutral per-channel gain; values above brighten, below is never used.
const WB_IDENTITY: u32 = 64;
const WB_MAX: u32 = 255;

/// Auto-stepper tuning.
const BREAK_DIFF: i32 = 2;
const MAX_STEPS: u32 = 20;
const NEARGRAY_MIN_BRIGHTNESS: u32 = 10;
const NEARGRAY_MAX_BRIGHTNESS: u32 = 253;
const NEARGRAY_MAX_COLOR_DEVIATION: f32 = 0.25;
const NEARGRAY_REQUIRED_AMOUNT: f32 = 0.08;

/// Rec.601 luma factors scaled by 1 << 8.
const R_FACTOR: u32 = (0.299 * 256.0) as u32;
const G_FACTOR: u32 = (0.587 * 256.0) as u32;
const B_FACTOR: u32 = (0.114 * 256.0) as u32;

/// Cap on auto-mode sample cells per frame.
const MAX_SAMPLE_CELLS: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BayerPattern {
    Rggb,
    Grbg,
    Gbrg,
    Bggr,
}

impl BayerPattern {
    fn from_code(code: FourCc) -> Option<Self> {
        match code {
            codes::BAYER_RGGB8 => Some(BayerPattern::Rggb),
            codes::BAYER_GRBG8 => Some(BayerPattern::Grbg),
            codes::BAYER_GBRG8 => Some(BayerPattern::Gbrg),
            codes::BAYER_BGGR8 => Some(BayerPattern::Bggr),
            _ => None,
        }
    }

    /// Color channel at pixel parity (x % 2, y % 2) inside the 2x2 cell.
    fn channel(self, x: usize, y: usize) -> Channel {
        let cell = match self {
            BayerPattern::Rggb => [
                [Channel::R, Channel::G],
                [Channel::G, Channel::B],
            ],
            BayerPattern::Grbg => [
                [Channel::G, Channel::R],
                [Channel::B, Channel::G],
            ],
            BayerPattern::Gbrg => [
                [Channel::G, Channel::B],
                [Channel::R, Channel::G],
            ],
            BayerPattern::Bggr => [
                [Channel::B, Channel::G],
                [Channel::G, Channel::R],
            ],
        };
        cell[y & 1][x & 1]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Channel {
    R,
    G,
    B,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Gains {
    r: u32,
    g: u32,
    b: u32,
}

impl Gains {
    const IDENTITY: Gains = Gains {
        r: WB_IDENTITY,
        g: WB_IDENTITY,
        b: WB_IDENTITY,
    };
}

#[derive(Debug, Clone, Copy)]
struct RgbSample {
    r: u32,
    g: u32,
    b: u32,
}

fn clip(x: u32, max: u32) -> u32 {
    x.min(max)
}

fn brightness(r: u32, g: u32, b: u32) -> u32 {
    (r * R_FACTOR + g * G_FACTOR + b * B_FACTOR) >> 8
}

fn is_near_gray(r: u32, g: u32, b: u32) -> bool {
    let bright = brightness(r, g, b);
    if !(NEARGRAY_MIN_BRIGHTNESS..=NEARGRAY_MAX_BRIGHTNESS).contains(&bright) {
        return false;
    }
    let dev = |v: u32| (v as i64 - bright as i64).unsigned_abs() as f32 / bright as f32;
    dev(r) < NEARGRAY_MAX_COLOR_DEVIATION
        && dev(g) < NEARGRAY_MAX_COLOR_DEVIATION
        && dev(b) < NEARGRAY_MAX_COLOR_DEVIATION
}

/// Average color the sample set would have under the candidate gains.
///
/// Prefers near-gray samples when enough of the image qualifies; otherwise
/// averages everything.
fn simulate(samples: &[RgbSample], gains: Gains, prefer_near_gray: bool) -> RgbSample {
    let mut all = RgbSample { r: 0, g: 0, b: 0 };
    let mut near = RgbSample { r: 0, g: 0, b: 0 };
    let mut near_count = 0u32;

    for s in samples {
        let r = clip(s.r * gains.r / WB_IDENTITY, WB_MAX);
        let g = clip(s.g * gains.g / WB_IDENTITY, WB_MAX);
        let b = clip(s.b * gains.b / WB_IDENTITY, WB_MAX);
        all.r += r;
        all.g += g;
        all.b += b;
        if is_near_gray(r, g, b) {
            near.r += r;
            near.g += g;
            near.b += b;
            near_count += 1;
        }
    }

    let count = samples.len() as u32;
    let near_amount = near_count as f32 / count as f32;
    if prefer_near_gray && near_amount >= NEARGRAY_REQUIRED_AMOUNT {
        RgbSample {
            r: near.r / near_count,
            g: near.g / near_count,
            b: near.b / near_count,
        }
    } else {
        RgbSample {
            r: all.r / count,
            g: all.g / count,
            b: all.b / count,
        }
    }
}

/// One gray-world step toward balanced channel averages.
///
/// Returns `true` once the channel averages agree within `BREAK_DIFF`.
fn auto_step(color: RgbSample, gains: &mut Gains) -> bool {
    let avg = (color.r + color.g + color.b) / 3;
    let dr = avg as i32 - color.r as i32;
    let dg = avg as i32 - color.g as i32;
    let db = avg as i32 - color.b as i32;

    if dr.abs() < BREAK_DIFF && dg.abs() < BREAK_DIFF && db.abs() < BREAK_DIFF {
        gains.r = clip(gains.r, WB_MAX);
        gains.g = clip(gains.g, WB_MAX);
        gains.b = clip(gains.b, WB_MAX);
        return true;
    }

    if color.r > avg && gains.r > WB_IDENTITY {
        gains.r -= 1;
    }
    if color.g > avg && gains.g > WB_IDENTITY {
        gains.g -= 1;
    }
    if color.b > avg && gains.b > WB_IDENTITY {
        gains.b -= 1;
    }
    if color.r < avg && gains.r < WB_MAX {
        gains.r += 1;
    }
    if color.g < avg && gains.g < WB_MAX {
        gains.g += 1;
    }
    if color.b < avg && gains.b < WB_MAX {
        gains.b += 1;
    }

    // Gains are relative; shed common excess to stay near identity.
    if gains.r > WB_IDENTITY && gains.g > WB_IDENTITY && gains.b > WB_IDENTITY {
        gains.r -= 1;
        gains.g -= 1;
        gains.b -= 1;
    }

    false
}

/// Iterate the auto stepper on one frame's samples.
///
/// Returns `true` when the gains converged this frame.
fn auto_whitebalance(samples: &[RgbSample], gains: &mut Gains) -> bool {
    if samples.is_empty() {
        return false;
    }

    let before = *gains;
    gains.r = gains.r.max(WB_IDENTITY);
    gains.g = gains.g.max(WB_IDENTITY);
    gains.b = gains.b.max(WB_IDENTITY);
    if before != *gains {
        return false;
    }

    while gains.r > WB_IDENTITY && gains.g > WB_IDENTITY && gains.b > WB_IDENTITY {
        gains.r -= 1;
        gains.g -= 1;
        gains.b -= 1;
    }

    for _ in 0..MAX_STEPS {
        let color = simulate(samples, *gains, true);
        if auto_step(color, gains) {
            return true;
        }
    }

    gains.r = clip(gains.r, WB_MAX);
    gains.g = clip(gains.g, WB_MAX);
    gains.b = clip(gains.b, WB_MAX);
    false
}

/// Collect averaged 2x2 bayer cells on a coarse grid.
fn sample_cells(data: &[u8], width: usize, height: usize, pattern: BayerPattern) -> Vec<RgbSample> {
    if width < 2 || height < 2 || data.len() < width * height {
        return Vec::new();
    }

    let cells_x = width / 2;
    let cells_y = height / 2;
    let mut step = 1usize;
    while (cells_x / step) * (cells_y / step) > MAX_SAMPLE_CELLS {
        step += 1;
    }

    let mut samples = Vec::with_capacity(MAX_SAMPLE_CELLS);
    let mut cy = 0;
    while cy < cells_y {
        let mut cx = 0;
        while cx < cells_x {
            let x0 = cx * 2;
            let y0 = cy * 2;
            let mut r = 0u32;
            let mut g = 0u32;
            let mut g_count = 0u32;
            let mut b = 0u32;
            for dy in 0..2 {
                for dx in 0..2 {
                    let v = data[(y0 + dy) * width + x0 + dx] as u32;
                    match pattern.channel(x0 + dx, y0 + dy) {
                        Channel::R => r = v,
                        Channel::B => b = v,
                        Channel::G => {
                            g += v;
                            g_count += 1;
                        }
                    }
                }
            }
            samples.push(RgbSample {
                r,
                g: g / g_count.max(1),
                b,
            });
            cx += step;
        }
        cy += step;
    }
    samples
}

fn apply_gains(data: &mut [u8], width: usize, height: usize, pattern: BayerPattern, gains: Gains) {
    for y in 0..height {
        let row = &mut data[y * width..(y + 1) * width];
        for (x, px) in row.iter_mut().enumerate() {
            let gain = match pattern.channel(x, y) {
                Channel::R => gains.r,
                Channel::G => gains.g,
                Channel::B => gains.b,
            };
            *px = clip(*px as u32 * gain / WB_IDENTITY, WB_MAX) as u8;
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct WbState {
    enabled: bool,
    auto: bool,
    gains: Gains,
}

struct WbShared {
    state: Mutex<WbState>,
}

impl PropertyBackend for WbShared {
    fn read(&self, name: &str) -> Result<PropertyValue, PropertyError> {
        let state = self.state.lock();
        match name {
            "whitebalance.enabled" => Ok(PropertyValue::Bool(state.enabled)),
            "whitebalance.auto" => Ok(PropertyValue::Bool(state.auto)),
            "whitebalance.red" => Ok(PropertyValue::Int(state.gains.r as i64)),
            "whitebalance.green" => Ok(PropertyValue::Int(state.gains.g as i64)),
            "whitebalance.blue" => Ok(PropertyValue::Int(state.gains.b as i64)),
            _ => Err(PropertyError::NotAvailable(name.into())),
        }
    }

    fn write(&self, name: &str, value: PropertyValue) -> Result<(), PropertyError> {
        let mut state = self.state.lock();
        match (name, value) {
            ("whitebalance.enabled", PropertyValue::Bool(v)) => state.enabled = v,
            ("whitebalance.auto", PropertyValue::Bool(v)) => state.auto = v,
            ("whitebalance.red", PropertyValue::Int(v)) => state.gains.r = v as u32,
            ("whitebalance.green", PropertyValue::Int(v)) => state.gains.g = v as u32,
            ("whitebalance.blue", PropertyValue::Int(v)) => state.gains.b = v as u32,
            (name, _) => return Err(PropertyError::WrongKind(name.into())),
        }
        Ok(())
    }
}

/// White-balance filter for 8-bit bayer frames.
///
/// Interpretation-style: never changes encoding, multiplies each sample by
/// its channel gain around an identity of 64. In auto mode the gains are
/// re-estimated every frame with an iterative gray-world stepper before
/// being applied.
///
/// # Example
/// ```rust
/// use lumen_core::prelude::*;
/// use lumen_filter::whitebalance::WhiteBalance;
/// use lumen_filter::Filter;
///
/// let wb = WhiteBalance::new();
/// let names: Vec<_> = wb.properties().iter().map(|p| p.name().to_string()).collect();
/// assert!(names.contains(&"whitebalance.red".to_string()));
/// ```
pub struct WhiteBalance {
    description: FilterDescription,
    format: Option<(VideoFormat, VideoFormat)>,
    state: FilterState,
    pattern: Option<BayerPattern>,
    shared: Arc<WbShared>,
}

impl Default for WhiteBalance {
    fn default() -> Self {
        Self::new()
    }
}

impl WhiteBalance {
    pub fn new() -> Self {
        let bayer8 = smallvec![
            codes::BAYER_RGGB8,
            codes::BAYER_GRBG8,
            codes::BAYER_GBRG8,
            codes::BAYER_BGGR8,
        ];
        Self {
            description: FilterDescription {
                name: "whitebalance".into(),
                kind: FilterKind::Interpretation,
                input_codes: bayer8.clone(),
                output_codes: bayer8,
            },
            format: None,
            state: FilterState::Stopped,
            pattern: None,
            shared: Arc::new(WbShared {
                state: Mutex::new(WbState {
                    enabled: true,
                    auto: true,
                    gains: Gains::IDENTITY,
                }),
            }),
        }
    }
}

impl Filter for WhiteBalance {
    fn description(&self) -> &FilterDescription {
        &self.description
    }

    fn set_format(&mut self, input: VideoFormat, output: VideoFormat) -> bool {
        if input != output {
            return false;
        }
        let Some(pattern) = BayerPattern::from_code(input.code) else {
            return false;
        };
        self.pattern = Some(pattern);
        self.format = Some((input, output));
        true
    }

    fn format(&self) -> Option<(VideoFormat, VideoFormat)> {
        self.format
    }

    fn set_state(&mut self, state: FilterState) -> bool {
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
        let Some(pattern) = self.pattern else {
            return;
        };
        let state = *self.shared.state.lock();
        if !state.enabled {
            return;
        }

        let res = frame.meta().format.resolution;
        let width = res.width.get() as usize;
        let height = res.height.get() as usize;
        if frame.data().len() < width * height {
            trace!(len = frame.data().len(), width, height, "short frame, skipping");
            return;
        }

        let gains = if state.auto {
            let samples = sample_cells(frame.data(), width, height, pattern);
            let mut gains = state.gains;
            let converged = auto_whitebalance(&samples, &mut gains);
            debug!(
                r = gains.r,
                g = gains.g,
                b = gains.b,
                converged,
                "auto white balance step"
            );
            self.shared.state.lock().gains = gains;
            gains
        } else {
            state.gains
        };

        if gains != Gains::IDENTITY {
            apply_gains(frame.data_mut(), width, height, pattern, gains);
        }
    }

    fn properties(&self) -> Vec<Property> {
        let backend = Arc::downgrade(&self.shared) as std::sync::Weak<dyn PropertyBackend>;
        vec![
            Property::new(
                PropertyMeta::boolean("whitebalance.enabled", true),
                backend.clone(),
            ),
            Property::new(
                PropertyMeta::boolean("whitebalance.auto", true),
                backend.clone(),
            ),
            Property::new(
                PropertyMeta::int_range("whitebalance.red", 0, 255, WB_IDENTITY as i64),
                backend.clone(),
            ),
            Property::new(
                PropertyMeta::int_range("whitebalance.green", 0, 255, WB_IDENTITY as i64),
                backend.clone(),
            ),
            Property::new(
                PropertyMeta::int_range("whitebalance.blue", 0, 255, WB_IDENTITY as i64),
                backend,
            ),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_core::prelude::{BufferPool, FrameMeta, FrameRate, Resolution};

    fn bayer_frame(code: FourCc, w: u32, h: u32, fill: impl Fn(usize, usize) -> u8) -> ImageBuffer {
        let format = VideoFormat::new(
            code,
            Resolution::new(w, h).unwrap(),
            FrameRate::from_fps(30).unwrap(),
        );
        let pool = BufferPool::with_capacity(1, (w * h) as usize);
        let mut lease = pool.lease();
        lease.resize((w * h) as usize);
        for y in 0..h as usize {
            for x in 0..w as usize {
                lease.as_mut_slice()[y * w as usize + x] = fill(x, y);
            }
        }
        ImageBuffer::new(FrameMeta::new(format, 0, 0), lease)
    }

    fn configured(code: FourCc) -> WhiteBalance {
        let mut wb = WhiteBalance::new();
        let format = VideoFormat::new(
            code,
            Resolution::new(8, 8).unwrap(),
            FrameRate::from_fps(30).unwrap(),
        );
        assert!(wb.set_format(format, format));
        wb
    }

    fn set(wb: &WhiteBalance, name: &str, value: PropertyValue) {
        wb.properties()
            .iter()
            .find(|p| p.name() == name)
            .unwrap()
            .set(value)
            .unwrap();
    }

    #[test]
    fn refuses_non_bayer_and_code_changes() {
        let mut wb = WhiteBalance::new();
        let rggb = VideoFormat::new(
            codes::BAYER_RGGB8,
            Resolution::new(8, 8).unwrap(),
            FrameRate::from_fps(30).unwrap(),
        );
        assert!(!wb.set_format(rggb.with_code(codes::GRAY8), rggb.with_code(codes::GRAY8)));
        assert!(!wb.set_format(rggb, rggb.with_code(codes::BAYER_BGGR8)));
        assert!(wb.set_format(rggb, rggb));
    }

    #[test]
    fn manual_gain_doubles_red_sites_only() {
        let wb = configured(codes::BAYER_RGGB8);
        set(&wb, "whitebalance.auto", PropertyValue::Bool(false));
        set(&wb, "whitebalance.red", PropertyValue::Int(128));

        let mut wb = wb;
        let mut frame = bayer_frame(codes::BAYER_RGGB8, 8, 8, |_, _| 50);
        wb.apply(&mut frame);

        // RGGB: red sites at even x, even y.
        assert_eq!(frame.data()[0], 100);
        assert_eq!(frame.data()[1], 50);
        assert_eq!(frame.data()[8], 50);
        assert_eq!(frame.data()[9], 50);
    }

    #[test]
    fn manual_gain_clips_at_255() {
        let wb = configured(codes::BAYER_BGGR8);
        set(&wb, "whitebalance.auto", PropertyValue::Bool(false));
        set(&wb, "whitebalance.blue", PropertyValue::Int(255));

        let mut wb = wb;
        let mut frame = bayer_frame(codes::BAYER_BGGR8, 8, 8, |_, _| 200);
        wb.apply(&mut frame);

        // BGGR: blue sites at even x, even y.
        assert_eq!(frame.data()[0], 255);
        assert_eq!(frame.data()[1], 200);
    }

    #[test]
    fn disabled_filter_leaves_frame_untouched() {
        let wb = configured(codes::BAYER_RGGB8);
        set(&wb, "whitebalance.enabled", PropertyValue::Bool(false));
        set(&wb, "whitebalance.red", PropertyValue::Int(255));
        set(&wb, "whitebalance.auto", PropertyValue::Bool(false));

        let mut wb = wb;
        let mut frame = bayer_frame(codes::BAYER_RGGB8, 8, 8, |_, _| 50);
        wb.apply(&mut frame);
        assert!(frame.data().iter().all(|&v| v == 50));
    }

    #[test]
    fn auto_raises_weak_channel() {
        // Strong red, weak blue: the stepper should push the blue gain up.
        let mut wb = configured(codes::BAYER_RGGB8);
        let mut frame = bayer_frame(codes::BAYER_RGGB8, 64, 64, |x, y| {
            match BayerPattern::Rggb.channel(x, y) {
                Channel::R => 180,
                Channel::G => 120,
                Channel::B => 60,
            }
        });
        wb.apply(&mut frame);

        let props = wb.properties();
        let get = |name: &str| {
            props
                .iter()
                .find(|p| p.name() == name)
                .unwrap()
                .get()
                .unwrap()
        };
        let PropertyValue::Int(blue) = get("whitebalance.blue") else {
            panic!("blue gain is an int");
        };
        let PropertyValue::Int(red) = get("whitebalance.red") else {
            panic!("red gain is an int");
        };
        assert!(blue > red, "blue gain {blue} should exceed red gain {red}");
    }

    #[test]
    fn auto_converges_on_gray_input() {
        let mut gains = Gains::IDENTITY;
        let samples = vec![RgbSample { r: 128, g: 128, b: 128 }; 64];
        assert!(auto_whitebalance(&samples, &mut gains));
        assert_eq!(gains, Gains::IDENTITY);
    }

    #[test]
    fn pattern_channels_match_layout() {
        assert_eq!(BayerPattern::Rggb.channel(0, 0), Channel::R);
        assert_eq!(BayerPattern::Rggb.channel(1, 1), Channel::B);
        assert_eq!(BayerPattern::Grbg.channel(1, 0), Channel::R);
        assert_eq!(BayerPattern::Gbrg.channel(0, 1), Channel::R);
        assert_eq!(BayerPattern::Bggr.channel(1, 1), Channel::R);
    }
}
