use std::sync::Arc;
use std::thread::{self, ThreadId};

use tracing::debug;

use crate::delegate::{PixelTransform, PixelTransformListener, TransformError};
use crate::types::{
    Extent, ImageOrientation, PipelineState, PixelFormat, ResampleFilter, Surface, TransformId,
    VideoGravity, MAX_SURFACE_DIMENSION,
};

/// In-memory pipeline that tracks state and hands out input surfaces without
/// touching a GPU.
///
/// Used by the replay harness and by tests that need a delegate whose
/// behaviour is fully observable.
pub struct HeadlessPixelTransform {
    id: TransformId,
    state: PipelineState,
    input_surface: Option<Surface>,
    input_format: Option<PixelFormat>,
    listener: Option<Arc<dyn PixelTransformListener>>,
    attached_thread: Option<ThreadId>,
    formats: Vec<PixelFormat>,
    surface_budget: Option<usize>,
    surfaces_created: usize,
}

impl HeadlessPixelTransform {
    pub fn new() -> Self {
        Self::with_state(PipelineState::default())
    }

    pub fn with_state(state: PipelineState) -> Self {
        Self {
            id: TransformId::next(),
            state,
            input_surface: None,
            input_format: None,
            listener: None,
            attached_thread: None,
            formats: vec![
                PixelFormat::Rgba8888,
                PixelFormat::Yuv420_888,
                PixelFormat::Private,
            ],
            surface_budget: None,
            surfaces_created: 0,
        }
    }

    /// Restricts the pixel formats input surfaces may be created with.
    pub fn with_formats(mut self, formats: &[PixelFormat]) -> Self {
        self.formats = formats.to_vec();
        self
    }

    /// Caps how many input surfaces may be created over the pipeline's life.
    pub fn with_surface_budget(mut self, budget: usize) -> Self {
        self.surface_budget = Some(budget);
        self
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn input_surface(&self) -> Option<Surface> {
        self.input_surface
    }

    pub fn input_format(&self) -> Option<PixelFormat> {
        self.input_format
    }

    /// Thread that most recently attached the pipeline.
    pub fn attached_thread(&self) -> Option<ThreadId> {
        self.attached_thread
    }

    /// Frames can flow once both ends of the pipeline have a surface.
    pub fn is_ready(&self) -> bool {
        self.state.surface.is_some() && self.input_surface.is_some()
    }
}

impl Default for HeadlessPixelTransform {
    fn default() -> Self {
        Self::new()
    }
}

impl PixelTransform for HeadlessPixelTransform {
    fn id(&self) -> TransformId {
        self.id
    }

    fn surface(&self) -> Option<Surface> {
        self.state.surface
    }

    fn set_surface(&mut self, surface: Option<Surface>) {
        self.state.surface = surface;
    }

    fn image_orientation(&self) -> ImageOrientation {
        self.state.orientation
    }

    fn set_image_orientation(&mut self, orientation: ImageOrientation) {
        self.state.orientation = orientation;
    }

    fn surface_rotation(&self) -> i32 {
        self.state.rotation
    }

    fn set_surface_rotation(&mut self, degrees: i32) {
        self.state.rotation = degrees;
    }

    fn video_gravity(&self) -> VideoGravity {
        self.state.video_gravity
    }

    fn set_video_gravity(&mut self, gravity: VideoGravity) {
        self.state.video_gravity = gravity;
    }

    fn extent(&self) -> Extent {
        self.state.extent
    }

    fn set_extent(&mut self, extent: Extent) {
        self.state.extent = extent;
    }

    fn resample_filter(&self) -> ResampleFilter {
        self.state.resample_filter
    }

    fn set_resample_filter(&mut self, filter: ResampleFilter) {
        self.state.resample_filter = filter;
    }

    fn create_input_surface(
        &mut self,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> Result<(), TransformError> {
        let extent = Extent::new(width, height);
        if extent.is_empty() || width > MAX_SURFACE_DIMENSION || height > MAX_SURFACE_DIMENSION {
            return Err(TransformError::InvalidExtent(extent));
        }
        if !self.formats.contains(&format) {
            return Err(TransformError::UnsupportedFormat(format));
        }
        if let Some(budget) = self.surface_budget {
            if self.surfaces_created >= budget {
                return Err(TransformError::SurfaceLimit);
            }
        }

        let surface = Surface::allocate();
        if let Some(previous) = self.input_surface.replace(surface) {
            debug!(%previous, replacement = %surface, "replacing input surface");
        }
        self.input_format = Some(format);
        self.surfaces_created += 1;

        if let Some(listener) = self.listener.as_ref() {
            listener.on_input_surface_created(self.id, surface);
        }
        Ok(())
    }

    fn set_listener(&mut self, listener: Option<Arc<dyn PixelTransformListener>>) {
        self.listener = listener;
    }

    fn attach(&mut self) {
        let current = thread::current();
        debug!(
            transform = %self.id,
            thread = current.name().unwrap_or("<unnamed>"),
            "headless pipeline attached"
        );
        self.attached_thread = Some(current.id());
        if let Some(listener) = self.listener.as_ref() {
            listener.on_set_up(self.id);
        }
    }
}
