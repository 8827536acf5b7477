//! Deferred units of work posted to the worker thread.
//!
//! [`Message`] is the only form the worker ever sees. [`RawMessage`] exists for
//! callers that speak the opcode-plus-integers encoding; it must be decoded
//! before it can be posted, so a mismatched payload never reaches the queue.

use serde::{Deserialize, Serialize};

use crate::delegate::{PixelTransform, TransformError};
use crate::types::{
    Extent, ImageOrientation, PixelFormat, ResampleFilter, Surface, VideoGravity,
};

pub const OP_SET_SURFACE: u32 = 0;
pub const OP_CREATE_INPUT_SURFACE: u32 = 1;
pub const OP_SET_IMAGE_ORIENTATION: u32 = 2;
pub const OP_SET_SURFACE_ROTATION: u32 = 3;
pub const OP_SET_VIDEO_GRAVITY: u32 = 4;
pub const OP_SET_EXTENT: u32 = 5;
pub const OP_SET_RESAMPLE_FILTER: u32 = 6;

/// One mutation or surface-creation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Message {
    SetSurface {
        #[serde(default)]
        surface: Option<Surface>,
    },
    SetImageOrientation {
        orientation: ImageOrientation,
    },
    SetSurfaceRotation {
        degrees: i32,
    },
    SetVideoGravity {
        gravity: VideoGravity,
    },
    SetExtent {
        width: u32,
        height: u32,
    },
    CreateInputSurface {
        width: u32,
        height: u32,
        format: PixelFormat,
    },
    SetResampleFilter {
        filter: ResampleFilter,
    },
}

impl Message {
    pub fn opcode(&self) -> u32 {
        match self {
            Self::SetSurface { .. } => OP_SET_SURFACE,
            Self::CreateInputSurface { .. } => OP_CREATE_INPUT_SURFACE,
            Self::SetImageOrientation { .. } => OP_SET_IMAGE_ORIENTATION,
            Self::SetSurfaceRotation { .. } => OP_SET_SURFACE_ROTATION,
            Self::SetVideoGravity { .. } => OP_SET_VIDEO_GRAVITY,
            Self::SetExtent { .. } => OP_SET_EXTENT,
            Self::SetResampleFilter { .. } => OP_SET_RESAMPLE_FILTER,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::SetSurface { .. } => "set_surface",
            Self::CreateInputSurface { .. } => "create_input_surface",
            Self::SetImageOrientation { .. } => "set_image_orientation",
            Self::SetSurfaceRotation { .. } => "set_surface_rotation",
            Self::SetVideoGravity { .. } => "set_video_gravity",
            Self::SetExtent { .. } => "set_extent",
            Self::SetResampleFilter { .. } => "set_resample_filter",
        }
    }

    /// Performs the single delegate operation this message stands for.
    pub fn apply(self, transform: &mut dyn PixelTransform) -> Result<(), TransformError> {
        match self {
            Self::SetSurface { surface } => transform.set_surface(surface),
            Self::SetImageOrientation { orientation } => {
                transform.set_image_orientation(orientation)
            }
            Self::SetSurfaceRotation { degrees } => transform.set_surface_rotation(degrees),
            Self::SetVideoGravity { gravity } => transform.set_video_gravity(gravity),
            Self::SetExtent { width, height } => transform.set_extent(Extent::new(width, height)),
            Self::CreateInputSurface {
                width,
                height,
                format,
            } => return transform.create_input_surface(width, height, format),
            Self::SetResampleFilter { filter } => transform.set_resample_filter(filter),
        }
        Ok(())
    }

    pub fn to_raw(&self) -> RawMessage {
        let (arg1, arg2, arg3) = match *self {
            Self::SetSurface { surface } => (surface.map_or(0, Surface::signed), 0, 0),
            Self::SetImageOrientation { orientation } => (i64::from(orientation.code()), 0, 0),
            Self::SetSurfaceRotation { degrees } => (i64::from(degrees), 0, 0),
            Self::SetVideoGravity { gravity } => (i64::from(gravity.code()), 0, 0),
            Self::SetExtent { width, height } => (i64::from(width), i64::from(height), 0),
            Self::CreateInputSurface {
                width,
                height,
                format,
            } => (i64::from(width), i64::from(height), i64::from(format.raw())),
            Self::SetResampleFilter { filter } => (i64::from(filter.code()), 0, 0),
        };
        RawMessage {
            what: self.opcode(),
            arg1,
            arg2,
            arg3,
        }
    }
}

/// Opcode plus loosely typed integer arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RawMessage {
    pub what: u32,
    pub arg1: i64,
    pub arg2: i64,
    pub arg3: i64,
}

impl RawMessage {
    pub fn new(what: u32, arg1: i64, arg2: i64, arg3: i64) -> Self {
        Self {
            what,
            arg1,
            arg2,
            arg3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolViolation {
    #[error("unhandled message what={0}")]
    UnknownOpcode(u32),
    #[error("unhandled message what={what}: invalid {field} payload {value}")]
    InvalidPayload {
        what: u32,
        field: &'static str,
        value: i64,
    },
}

impl TryFrom<RawMessage> for Message {
    type Error = ProtocolViolation;

    fn try_from(raw: RawMessage) -> Result<Self, Self::Error> {
        let what = raw.what;
        let invalid = |field: &'static str, value: i64| ProtocolViolation::InvalidPayload {
            what,
            field,
            value,
        };
        let code = |field: &'static str, value: i64| {
            u8::try_from(value).map_err(|_| invalid(field, value))
        };
        let dimension = |field: &'static str, value: i64| {
            u32::try_from(value).map_err(|_| invalid(field, value))
        };

        let message = match what {
            OP_SET_SURFACE => {
                let raw_surface =
                    u64::try_from(raw.arg1).map_err(|_| invalid("surface", raw.arg1))?;
                Self::SetSurface {
                    surface: Surface::from_raw(raw_surface),
                }
            }
            OP_CREATE_INPUT_SURFACE => {
                let format = i32::try_from(raw.arg3)
                    .ok()
                    .and_then(PixelFormat::from_raw)
                    .ok_or_else(|| invalid("format", raw.arg3))?;
                Self::CreateInputSurface {
                    width: dimension("width", raw.arg1)?,
                    height: dimension("height", raw.arg2)?,
                    format,
                }
            }
            OP_SET_IMAGE_ORIENTATION => Self::SetImageOrientation {
                orientation: ImageOrientation::from_code(code("orientation", raw.arg1)?)
                    .ok_or_else(|| invalid("orientation", raw.arg1))?,
            },
            OP_SET_SURFACE_ROTATION => Self::SetSurfaceRotation {
                degrees: i32::try_from(raw.arg1).map_err(|_| invalid("rotation", raw.arg1))?,
            },
            OP_SET_VIDEO_GRAVITY => Self::SetVideoGravity {
                gravity: VideoGravity::from_code(code("gravity", raw.arg1)?)
                    .ok_or_else(|| invalid("gravity", raw.arg1))?,
            },
            OP_SET_EXTENT => Self::SetExtent {
                width: dimension("width", raw.arg1)?,
                height: dimension("height", raw.arg2)?,
            },
            OP_SET_RESAMPLE_FILTER => Self::SetResampleFilter {
                filter: ResampleFilter::from_code(code("filter", raw.arg1)?)
                    .ok_or_else(|| invalid("filter", raw.arg1))?,
            },
            other => return Err(ProtocolViolation::UnknownOpcode(other)),
        };
        Ok(message)
    }
}
