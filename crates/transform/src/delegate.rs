use std::sync::Arc;

use crate::types::{
    Extent, ImageOrientation, PixelFormat, ResampleFilter, Surface, TransformId, VideoGravity,
};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransformError {
    #[error("input surface extent {0} is empty or exceeds the supported maximum")]
    InvalidExtent(Extent),
    #[error("pixel format {0} is not supported by this pipeline")]
    UnsupportedFormat(PixelFormat),
    #[error("pipeline refused to allocate another input surface")]
    SurfaceLimit,
}

/// Capability surface of an image-processing pipeline.
///
/// Implementations are not required to be thread-safe; the threaded proxy
/// guarantees every mutation runs on its single worker thread.
pub trait PixelTransform: Send {
    fn id(&self) -> TransformId;

    fn surface(&self) -> Option<Surface>;
    fn set_surface(&mut self, surface: Option<Surface>);

    fn image_orientation(&self) -> ImageOrientation;
    fn set_image_orientation(&mut self, orientation: ImageOrientation);

    /// Rotation of the output surface in degrees.
    fn surface_rotation(&self) -> i32;
    fn set_surface_rotation(&mut self, degrees: i32);

    fn video_gravity(&self) -> VideoGravity;
    fn set_video_gravity(&mut self, gravity: VideoGravity);

    fn extent(&self) -> Extent;
    fn set_extent(&mut self, extent: Extent);

    fn resample_filter(&self) -> ResampleFilter;
    fn set_resample_filter(&mut self, filter: ResampleFilter);

    /// Requests a new input surface. The surface itself is delivered through
    /// [`PixelTransformListener::on_input_surface_created`].
    fn create_input_surface(
        &mut self,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> Result<(), TransformError>;

    fn set_listener(&mut self, listener: Option<Arc<dyn PixelTransformListener>>);

    /// Binds the pipeline to the calling thread. Invoked on the worker thread
    /// before it processes any message.
    fn attach(&mut self) {}
}

/// Receives pipeline lifecycle notifications.
pub trait PixelTransformListener: Send + Sync {
    fn on_set_up(&self, source: TransformId);
    fn on_input_surface_created(&self, source: TransformId, surface: Surface);
}
