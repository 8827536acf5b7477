//! Threaded dispatch for GPU-bound pixel transforms.
//!
//! A pixel transform (the delegate) owns a native rendering surface and must
//! only ever be touched from one thread. [`ThreadedPixelTransform`] wraps it
//! and turns every mutation into a [`Message`] for a dedicated worker thread,
//! so callers on any thread return immediately. The overall flow is:
//!
//! ```text
//!   caller threads
//!          │ set_extent / set_surface / create_input_surface ...
//!          ▼
//!   ThreadedPixelTransform::post ──▶ Dispatcher ──▶ worker FIFO ──▶ delegate
//!          ▲                                                          │
//!          │ getters                                                  ├─▶ StateSnapshot::publish
//!   StateSnapshot::load ◀──────────────────────────────────────────────┘
//!                                                                     │
//!   external listener ◀── Relay (proxy id as source) ◀── lifecycle ◀──┘
//! ```
//!
//! The worker holds only a weak reference to the delegate. Dropping the proxy
//! releases the delegate at once; messages still in the queue are skipped
//! rather than applied to a destroyed pipeline.
//!
//! `HeadlessPixelTransform` is an in-memory delegate with the same capability
//! surface, used by the replay harness and the tests.

mod delegate;
mod headless;
mod message;
mod proxy;
mod relay;
mod snapshot;
mod types;
mod worker;

pub use delegate::{PixelTransform, PixelTransformListener, TransformError};
pub use headless::HeadlessPixelTransform;
pub use message::{
    Message, ProtocolViolation, RawMessage, OP_CREATE_INPUT_SURFACE, OP_SET_EXTENT,
    OP_SET_IMAGE_ORIENTATION, OP_SET_RESAMPLE_FILTER, OP_SET_SURFACE, OP_SET_SURFACE_ROTATION,
    OP_SET_VIDEO_GRAVITY,
};
pub use proxy::ThreadedPixelTransform;
pub use snapshot::StateSnapshot;
pub use types::{
    Extent, ImageOrientation, InvalidSurface, PipelineState, PixelFormat, ResampleFilter, Surface,
    TransformId, VideoGravity, MAX_SURFACE_DIMENSION,
};
pub use worker::{
    DispatchError, Dispatcher, WorkerHandle, WorkerOptions, WorkerState, DEFAULT_JOIN_TIMEOUT,
    DEFAULT_THREAD_NAME,
};
