//! Video filter-graph construction.
//!
//! A [`FilterChain`] is a list of typed stages rather than a string, so the
//! scale stage can be located and replaced structurally. Rendering joins the
//! stages with `,` into the value passed to ffmpeg's `-vf`.
//!
//! Three base chains exist per encoder family:
//!
//! - **HDR**: linearize → tone-map → re-normalize to BT.709 → pixel format →
//!   even padding. Output primaries and transfer are fixed regardless of what
//!   the source metadata claims.
//! - **High bit depth SDR**: a single `zscale` that rescales, pins BT.709 and
//!   dithers down in one pass, then pixel format and padding.
//! - **SDR**: `scale` → pixel format → padding.

use std::fmt;

use crate::catalog::EncoderProfile;

/// Pixel format every software chain converges on.
pub const SOFTWARE_PIXEL_FORMAT: &str = "yuv420p";

/// Pixel format hardware (VA-API) uploads expect.
pub const HARDWARE_PIXEL_FORMAT: &str = "nv12";

/// One dimension of a scale stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dim {
    /// Keep the incoming size (`iw` / `ih`).
    Source,
    /// An explicit pixel count.
    Px(u32),
    /// Derive from the other dimension preserving aspect, rounded to even.
    /// Rendered as `-2`, which ffmpeg interprets specially.
    Auto,
}

/// Which filter performs the scaling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleFilter {
    /// Plain `scale`.
    Scale,
    /// `zscale` that also pins BT.709 and dithers down to 8 bits.
    ZscaleDither,
}

/// One stage of a filter chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterStage {
    /// The (single, replaceable) scale stage.
    Scale {
        /// Filter implementing the scale.
        filter: ScaleFilter,
        /// Output width.
        width: Dim,
        /// Output height.
        height: Dim,
    },
    /// An arbitrary `name=args` filter.
    Filter {
        /// Filter name.
        name: &'static str,
        /// Filter arguments.
        args: &'static str,
    },
    /// `format=<pix_fmt>`.
    Format(&'static str),
    /// Pad up to even width and height.
    PadEven,
    /// Upload frames to the hardware device.
    HwUpload,
}

impl FilterStage {
    fn scale(width: Dim, height: Dim) -> Self {
        Self::Scale {
            filter: ScaleFilter::Scale,
            width,
            height,
        }
    }
}

fn render_dim(dim: Dim, source: &str) -> String {
    match dim {
        Dim::Source => source.to_string(),
        Dim::Px(n) => n.to_string(),
        Dim::Auto => "-2".to_string(),
    }
}

impl fmt::Display for FilterStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterStage::Scale {
                filter: ScaleFilter::Scale,
                width,
                height,
            } => write!(
                f,
                "scale={}:{}",
                render_dim(*width, "iw"),
                render_dim(*height, "ih")
            ),
            FilterStage::Scale {
                filter: ScaleFilter::ZscaleDither,
                width,
                height,
            } => write!(
                f,
                "zscale=w={}:h={}:p=bt709:t=bt709:m=bt709:d=error_diffusion",
                render_dim(*width, "iw"),
                render_dim(*height, "ih")
            ),
            FilterStage::Filter { name, args } if args.is_empty() => write!(f, "{name}"),
            FilterStage::Filter { name, args } => write!(f, "{name}={args}"),
            FilterStage::Format(pix_fmt) => write!(f, "format={pix_fmt}"),
            FilterStage::PadEven => write!(f, "pad=ceil(iw/2)*2:ceil(ih/2)*2"),
            FilterStage::HwUpload => write!(f, "hwupload"),
        }
    }
}

/// Explicit output size requested by a quality profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScaleOverride {
    /// Output width in pixels.
    pub width: u32,
    /// Output height.
    pub height: ScaleHeight,
}

/// Height of a [`ScaleOverride`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleHeight {
    /// An explicit pixel count.
    Px(u32),
    /// Preserve aspect ratio, rounded to even (`-2`).
    Auto,
}

impl ScaleOverride {
    /// Fixed width, aspect-preserving height.
    pub const fn width(width: u32) -> Self {
        Self {
            width,
            height: ScaleHeight::Auto,
        }
    }

    fn dims(self) -> (Dim, Dim) {
        let height = match self.height {
            ScaleHeight::Px(h) => Dim::Px(h),
            ScaleHeight::Auto => Dim::Auto,
        };
        (Dim::Px(self.width), height)
    }
}

/// An ordered list of filter stages.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterChain {
    stages: Vec<FilterStage>,
}

impl FilterChain {
    /// Build a chain from stages.
    pub fn new(stages: Vec<FilterStage>) -> Self {
        Self { stages }
    }

    /// The stages in order.
    pub fn stages(&self) -> &[FilterStage] {
        &self.stages
    }

    /// Whether the chain has no stages.
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Apply an explicit output size.
    ///
    /// An existing scale stage keeps its filter but takes the new dimensions;
    /// if the chain has none, a plain `scale` stage is prepended.
    pub fn apply_scale(&mut self, scale: ScaleOverride) {
        let (new_w, new_h) = scale.dims();
        let existing = self
            .stages
            .iter_mut()
            .find(|s| matches!(s, FilterStage::Scale { .. }));

        match existing {
            Some(FilterStage::Scale { width, height, .. }) => {
                *width = new_w;
                *height = new_h;
            }
            _ => self.stages.insert(0, FilterStage::scale(new_w, new_h)),
        }
    }

    /// Render to an ffmpeg filter-graph string.
    pub fn render(&self) -> String {
        self.stages
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Frame size this chain produces for an input of `input` pixels.
    ///
    /// Evaluates scale and pad stages the way ffmpeg does; other stages keep
    /// the size unchanged.
    pub fn output_dimensions(&self, input: (u32, u32)) -> (u32, u32) {
        let (mut w, mut h) = input;
        for stage in &self.stages {
            match stage {
                FilterStage::Scale { width, height, .. } => {
                    (w, h) = eval_scale(*width, *height, w, h);
                }
                FilterStage::PadEven => {
                    w = w.div_ceil(2) * 2;
                    h = h.div_ceil(2) * 2;
                }
                _ => {}
            }
        }
        (w, h)
    }
}

impl fmt::Display for FilterChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

fn eval_scale(width: Dim, height: Dim, in_w: u32, in_h: u32) -> (u32, u32) {
    let fixed = |d: Dim, source: u32| match d {
        Dim::Source => Some(source),
        Dim::Px(n) => Some(n),
        Dim::Auto => None,
    };

    match (fixed(width, in_w), fixed(height, in_h)) {
        (Some(w), Some(h)) => (w, h),
        (Some(w), None) => (w, rescale_even(w, in_h, in_w)),
        (None, Some(h)) => (rescale_even(h, in_w, in_h), h),
        (None, None) => (in_w, in_h),
    }
}

/// `value * num / den` rounded to the nearest multiple of two, at least 2.
fn rescale_even(value: u32, num: u32, den: u32) -> u32 {
    if den == 0 {
        return 2;
    }
    let exact = u64::from(value) * u64::from(num);
    let halves = (exact + u64::from(den)) / (2 * u64::from(den));
    (halves * 2).max(2) as u32
}

/// Whether a pixel format carries more than 8 bits per component.
///
/// ```
/// use reelcache_av::filters::is_high_bit_depth;
///
/// assert!(is_high_bit_depth("yuv420p10le"));
/// assert!(is_high_bit_depth("p010le"));
/// assert!(!is_high_bit_depth("yuv420p"));
/// assert!(!is_high_bit_depth("nv12"));
/// ```
pub fn is_high_bit_depth(pixel_format: &str) -> bool {
    let fmt = pixel_format.to_ascii_lowercase();
    let depth_digits = |tail: &str| -> Option<u32> {
        let digits: String = tail.chars().take_while(|c| c.is_ascii_digit()).collect();
        digits.parse().ok()
    };

    let depth = if let Some(tail) = fmt.strip_prefix("gray") {
        depth_digits(tail)
    } else {
        fmt.rsplit_once('p').and_then(|(_, tail)| depth_digits(tail))
    };

    depth.is_some_and(|d| d > 8)
}

/// SDR chain for software encoders.
pub fn software_sdr_chain(high_bit_depth: bool) -> FilterChain {
    let scale = if high_bit_depth {
        FilterStage::Scale {
            filter: ScaleFilter::ZscaleDither,
            width: Dim::Source,
            height: Dim::Source,
        }
    } else {
        FilterStage::scale(Dim::Source, Dim::Source)
    };
    FilterChain::new(vec![
        scale,
        FilterStage::Format(SOFTWARE_PIXEL_FORMAT),
        FilterStage::PadEven,
    ])
}

fn tone_map_stages() -> [FilterStage; 3] {
    [
        FilterStage::Filter {
            name: "zscale",
            args: "t=linear:npl=100",
        },
        FilterStage::Filter {
            name: "tonemap",
            args: "tonemap=hable:desat=0",
        },
        FilterStage::Filter {
            name: "zscale",
            args: "p=bt709:t=bt709:m=bt709:r=tv",
        },
    ]
}

/// HDR chain for software encoders.
pub fn software_hdr_chain() -> FilterChain {
    let mut stages = tone_map_stages().to_vec();
    stages.push(FilterStage::Format(SOFTWARE_PIXEL_FORMAT));
    stages.push(FilterStage::PadEven);
    FilterChain::new(stages)
}

/// SDR chain for VA-API encoders: software conversion, then upload.
pub fn vaapi_sdr_chain(high_bit_depth: bool) -> FilterChain {
    let mut chain = software_sdr_chain(high_bit_depth);
    for stage in &mut chain.stages {
        if let FilterStage::Format(fmt) = stage {
            *fmt = HARDWARE_PIXEL_FORMAT;
        }
    }
    chain.stages.push(FilterStage::HwUpload);
    chain
}

/// HDR chain for VA-API encoders: tone-map in software, then upload.
pub fn vaapi_hdr_chain() -> FilterChain {
    let mut stages = tone_map_stages().to_vec();
    stages.push(FilterStage::Format(HARDWARE_PIXEL_FORMAT));
    stages.push(FilterStage::PadEven);
    stages.push(FilterStage::HwUpload);
    FilterChain::new(stages)
}

/// Compute the filter chain for one encode.
///
/// Picks the profile's HDR or SDR chain (the SDR chain is told whether the
/// input is high bit depth), then applies the quality profile's explicit
/// scale, if any.
pub fn build_filter_chain(
    profile: &EncoderProfile,
    hdr: bool,
    pixel_format: &str,
    scale: Option<ScaleOverride>,
) -> FilterChain {
    let mut chain = if hdr {
        (profile.hdr_filters)()
    } else {
        (profile.sdr_filters)(is_high_bit_depth(pixel_format))
    };

    if let Some(scale) = scale {
        chain.apply_scale(scale);
    }

    chain
}
