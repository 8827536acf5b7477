use std::fmt;
use std::num::NonZeroU64;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::delegate::PixelTransform;

/// Largest width or height an input surface may be created with.
pub const MAX_SURFACE_DIMENSION: u32 = 16_384;

static NEXT_SURFACE: AtomicU64 = AtomicU64::new(1);
static NEXT_TRANSFORM: AtomicU64 = AtomicU64::new(1);

/// Opaque handle to a platform drawing target frames are written into or read from.
///
/// Raw values are non-zero and never exceed [`Surface::MAX_RAW`], so a handle
/// always fits the signed payload of a [`RawMessage`](crate::RawMessage).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub struct Surface(NonZeroU64);

impl Surface {
    pub const MAX_RAW: u64 = i64::MAX as u64;

    /// Hands out a handle that is unique for the lifetime of the process.
    pub fn allocate() -> Self {
        let raw = NEXT_SURFACE.fetch_add(1, Ordering::Relaxed);
        Self(NonZeroU64::new(raw).unwrap_or(NonZeroU64::MIN))
    }

    /// Rebuilds a handle from its raw value. Zero is the null surface; values
    /// above [`Surface::MAX_RAW`] are not handles.
    pub fn from_raw(raw: u64) -> Option<Self> {
        if raw > Self::MAX_RAW {
            return None;
        }
        NonZeroU64::new(raw).map(Self)
    }

    pub fn raw(self) -> u64 {
        self.0.get()
    }

    pub(crate) fn signed(self) -> i64 {
        // MAX_RAW bounds every constructed handle.
        self.0.get() as i64
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("surface handle {0} is zero or larger than {max}", max = Surface::MAX_RAW)]
pub struct InvalidSurface(pub u64);

impl TryFrom<u64> for Surface {
    type Error = InvalidSurface;

    fn try_from(raw: u64) -> Result<Self, Self::Error> {
        Self::from_raw(raw).ok_or(InvalidSurface(raw))
    }
}

impl From<Surface> for u64 {
    fn from(surface: Surface) -> Self {
        surface.raw()
    }
}

impl fmt::Display for Surface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "surface#{}", self.0)
    }
}

/// Identity of a pixel transform instance, reported as the source of
/// lifecycle notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransformId(u64);

impl TransformId {
    pub fn next() -> Self {
        Self(NEXT_TRANSFORM.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TransformId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "transform#{}", self.0)
    }
}

/// Output size in physical pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Extent {
    pub width: u32,
    pub height: u32,
}

impl Extent {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub(crate) fn pack(self) -> u64 {
        (u64::from(self.width) << 32) | u64::from(self.height)
    }

    pub(crate) fn unpack(packed: u64) -> Self {
        Self::new((packed >> 32) as u32, packed as u32)
    }
}

impl fmt::Display for Extent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for Extent {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (width, height) = value
            .trim()
            .split_once(['x', 'X'])
            .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{value}'"))?;
        let width = width
            .trim()
            .parse::<u32>()
            .map_err(|err| format!("invalid width in '{value}': {err}"))?;
        let height = height
            .trim()
            .parse::<u32>()
            .map_err(|err| format!("invalid height in '{value}': {err}"))?;
        Ok(Self::new(width, height))
    }
}

/// Orientation of the incoming image relative to the output surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageOrientation {
    #[default]
    Up,
    Down,
    Left,
    Right,
    UpMirrored,
    DownMirrored,
    LeftMirrored,
    RightMirrored,
}

impl ImageOrientation {
    const ALL: [Self; 8] = [
        Self::Up,
        Self::Down,
        Self::Left,
        Self::Right,
        Self::UpMirrored,
        Self::DownMirrored,
        Self::LeftMirrored,
        Self::RightMirrored,
    ];

    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.get(usize::from(code)).copied()
    }

    pub fn is_mirrored(self) -> bool {
        matches!(
            self,
            Self::UpMirrored | Self::DownMirrored | Self::LeftMirrored | Self::RightMirrored
        )
    }
}

/// How the processed image is fitted into the output extent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoGravity {
    /// Preserve aspect ratio and letterbox inside the extent.
    #[default]
    ResizeAspect,
    /// Preserve aspect ratio and crop to cover the extent.
    ResizeAspectFill,
    /// Stretch to the extent.
    Resize,
}

impl VideoGravity {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::ResizeAspect),
            1 => Some(Self::ResizeAspectFill),
            2 => Some(Self::Resize),
            _ => None,
        }
    }
}

/// Sampling filter used when the image is scaled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResampleFilter {
    Nearest,
    #[default]
    Linear,
    Cubic,
    Lanczos,
}

impl ResampleFilter {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Nearest),
            1 => Some(Self::Linear),
            2 => Some(Self::Cubic),
            3 => Some(Self::Lanczos),
            _ => None,
        }
    }
}

/// Pixel layout requested for an input surface.
///
/// Raw codes follow the platform image-format constants so foreign callers can
/// pass them through unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PixelFormat {
    Rgba8888,
    #[serde(rename = "yuv420_888")]
    Yuv420_888,
    Private,
}

impl PixelFormat {
    pub fn raw(self) -> i32 {
        match self {
            Self::Rgba8888 => 0x1,
            Self::Yuv420_888 => 0x23,
            Self::Private => 0x22,
        }
    }

    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            0x1 => Some(Self::Rgba8888),
            0x23 => Some(Self::Yuv420_888),
            0x22 => Some(Self::Private),
            _ => None,
        }
    }

    /// Planar YUV images need one image per plane on the GPU side.
    pub fn is_multi_planar(self) -> bool {
        matches!(self, Self::Yuv420_888)
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rgba8888 => f.write_str("rgba8888"),
            Self::Yuv420_888 => f.write_str("yuv420_888"),
            Self::Private => f.write_str("private"),
        }
    }
}

/// Observable properties of a pixel transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PipelineState {
    pub surface: Option<Surface>,
    pub orientation: ImageOrientation,
    pub rotation: i32,
    pub video_gravity: VideoGravity,
    pub extent: Extent,
    pub resample_filter: ResampleFilter,
}

impl PipelineState {
    /// Reads every property from `transform`.
    pub fn capture(transform: &dyn PixelTransform) -> Self {
        Self {
            surface: transform.surface(),
            orientation: transform.image_orientation(),
            rotation: transform.surface_rotation(),
            video_gravity: transform.video_gravity(),
            extent: transform.extent(),
            resample_filter: transform.resample_filter(),
        }
    }
}
