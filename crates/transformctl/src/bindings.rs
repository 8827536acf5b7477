use transform::{
    Extent, ImageOrientation, PipelineState, ResampleFilter, VideoGravity, WorkerOptions,
};
use transformconfig::{Defaults, FilterSetting, GravitySetting, OrientationSetting, TransformConfig};

pub fn map_orientation(setting: OrientationSetting) -> ImageOrientation {
    match setting {
        OrientationSetting::Up => ImageOrientation::Up,
        OrientationSetting::Down => ImageOrientation::Down,
        OrientationSetting::Left => ImageOrientation::Left,
        OrientationSetting::Right => ImageOrientation::Right,
        OrientationSetting::UpMirrored => ImageOrientation::UpMirrored,
        OrientationSetting::DownMirrored => ImageOrientation::DownMirrored,
        OrientationSetting::LeftMirrored => ImageOrientation::LeftMirrored,
        OrientationSetting::RightMirrored => ImageOrientation::RightMirrored,
    }
}

pub fn map_gravity(setting: GravitySetting) -> VideoGravity {
    match setting {
        GravitySetting::ResizeAspect => VideoGravity::ResizeAspect,
        GravitySetting::ResizeAspectFill => VideoGravity::ResizeAspectFill,
        GravitySetting::Resize => VideoGravity::Resize,
    }
}

pub fn map_filter(setting: FilterSetting) -> ResampleFilter {
    match setting {
        FilterSetting::Nearest => ResampleFilter::Nearest,
        FilterSetting::Linear => ResampleFilter::Linear,
        FilterSetting::Cubic => ResampleFilter::Cubic,
        FilterSetting::Lanczos => ResampleFilter::Lanczos,
    }
}

/// State the headless pipeline starts from, before any scripted step.
pub fn initial_state(defaults: &Defaults) -> PipelineState {
    let (width, height) = defaults.extent;
    PipelineState {
        surface: None,
        orientation: map_orientation(defaults.orientation),
        rotation: defaults.rotation,
        video_gravity: map_gravity(defaults.video_gravity),
        extent: Extent::new(width, height),
        resample_filter: map_filter(defaults.resample_filter),
    }
}

pub fn worker_options(config: &TransformConfig) -> WorkerOptions {
    WorkerOptions {
        thread_name: config.worker.thread_name.clone(),
        join_timeout: config.worker.join_timeout,
    }
}
