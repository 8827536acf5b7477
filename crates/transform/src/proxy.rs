use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, error, warn};

use crate::delegate::{PixelTransform, PixelTransformListener, TransformError};
use crate::message::Message;
use crate::relay::{ListenerSlot, Relay};
use crate::snapshot::StateSnapshot;
use crate::types::{
    Extent, ImageOrientation, PipelineState, PixelFormat, ResampleFilter, Surface, TransformId,
    VideoGravity,
};
use crate::worker::{DispatchError, Dispatcher, WorkerHandle, WorkerOptions, WorkerState};

/// Pixel transform whose every mutation runs on one dedicated worker thread.
///
/// Setters and [`create_input_surface`](Self::create_input_surface) never
/// block: they enqueue a [`Message`] and return. The first enqueue on an idle
/// proxy starts the worker. Getters read the state the worker last published,
/// so a value written by a still-queued message is not visible yet.
///
/// Lifecycle notifications from the delegate reach the listener on the worker
/// thread, with this proxy's [`TransformId`] as their source.
///
/// Dropping the proxy releases the delegate immediately and asks the worker to
/// quit. Messages still queued at that point are skipped.
pub struct ThreadedPixelTransform<D: PixelTransform + 'static> {
    id: TransformId,
    delegate: Arc<Mutex<D>>,
    worker: Mutex<Option<WorkerHandle>>,
    snapshot: Arc<StateSnapshot>,
    listeners: Arc<ListenerSlot>,
    options: WorkerOptions,
}

impl<D: PixelTransform + 'static> ThreadedPixelTransform<D> {
    pub fn new(delegate: D) -> Self {
        Self::with_options(delegate, WorkerOptions::default())
    }

    /// Wraps `delegate` without starting a thread. The proxy becomes the
    /// delegate's only listener.
    pub fn with_options(mut delegate: D, options: WorkerOptions) -> Self {
        let id = TransformId::next();
        let listeners = Arc::new(ListenerSlot::default());
        delegate.set_listener(Some(Arc::new(Relay::new(id, listeners.clone()))));
        let snapshot = Arc::new(StateSnapshot::new(PipelineState::capture(&delegate)));
        debug!(proxy = %id, delegate = %delegate.id(), "threaded pixel transform created");

        Self {
            id,
            delegate: Arc::new(Mutex::new(delegate)),
            worker: Mutex::new(None),
            snapshot,
            listeners,
            options,
        }
    }

    pub fn id(&self) -> TransformId {
        self.id
    }

    pub fn options(&self) -> &WorkerOptions {
        &self.options
    }

    /// Last state the worker published.
    pub fn state(&self) -> PipelineState {
        self.snapshot.load()
    }

    /// Number of states the worker has published so far.
    pub fn snapshot_version(&self) -> u64 {
        self.snapshot.version()
    }

    pub fn surface(&self) -> Option<Surface> {
        self.snapshot.load().surface
    }

    pub fn set_surface(&self, surface: Option<Surface>) {
        self.post(Message::SetSurface { surface });
    }

    pub fn image_orientation(&self) -> ImageOrientation {
        self.snapshot.load().orientation
    }

    pub fn set_image_orientation(&self, orientation: ImageOrientation) {
        self.post(Message::SetImageOrientation { orientation });
    }

    pub fn surface_rotation(&self) -> i32 {
        self.snapshot.load().rotation
    }

    pub fn set_surface_rotation(&self, degrees: i32) {
        self.post(Message::SetSurfaceRotation { degrees });
    }

    pub fn video_gravity(&self) -> VideoGravity {
        self.snapshot.load().video_gravity
    }

    pub fn set_video_gravity(&self, gravity: VideoGravity) {
        self.post(Message::SetVideoGravity { gravity });
    }

    pub fn extent(&self) -> Extent {
        self.snapshot.load().extent
    }

    pub fn set_extent(&self, extent: Extent) {
        self.post(Message::SetExtent {
            width: extent.width,
            height: extent.height,
        });
    }

    pub fn resample_filter(&self) -> ResampleFilter {
        self.snapshot.load().resample_filter
    }

    pub fn set_resample_filter(&self, filter: ResampleFilter) {
        self.post(Message::SetResampleFilter { filter });
    }

    /// Requests an input surface. The result arrives through
    /// [`PixelTransformListener::on_input_surface_created`]; failures are only
    /// logged by the worker.
    pub fn create_input_surface(&self, width: u32, height: u32, format: PixelFormat) {
        self.post(Message::CreateInputSurface {
            width,
            height,
            format,
        });
    }

    /// Installs or clears the external listener. Returns the previous one.
    pub fn set_listener(
        &self,
        listener: Option<Arc<dyn PixelTransformListener>>,
    ) -> Option<Arc<dyn PixelTransformListener>> {
        self.listeners.replace(listener)
    }

    /// Enqueues `message`, starting a worker if none is running.
    pub fn post(&self, message: Message) {
        let mut worker = self.worker.lock();
        let running = matches!(
            worker.as_ref().map(WorkerHandle::state),
            Some(WorkerState::Running)
        );
        if !running {
            if let Some(stale) = worker.take() {
                warn!(proxy = %self.id, state = ?stale.state(), "replacing worker that stopped");
            }
            match self.spawn_worker() {
                Ok(handle) => *worker = Some(handle),
                Err(err) => {
                    error!(
                        proxy = %self.id,
                        message = message.name(),
                        error = %err,
                        "failed to start worker; message dropped"
                    );
                    return;
                }
            }
        }

        if let Some(handle) = worker.as_ref() {
            if let Err(err) = handle.post(message) {
                warn!(proxy = %self.id, message = message.name(), error = %err, "message dropped");
            }
        }
    }

    /// Starts a worker now, quitting the current one first if there is one.
    pub fn attach(&self) -> Result<(), DispatchError> {
        self.restart_worker()
    }

    fn restart_worker(&self) -> Result<(), DispatchError> {
        let mut worker = self.worker.lock();
        if let Some(previous) = worker.take() {
            previous.quit_safely();
        }
        *worker = Some(self.spawn_worker()?);
        Ok(())
    }

    /// Clears the worker reference, letting the worker drain and stop.
    /// Returns false if there was no worker.
    pub fn detach(&self) -> bool {
        match self.worker.lock().take() {
            Some(previous) => {
                previous.quit_safely();
                debug!(proxy = %self.id, thread = previous.name(), "worker detached");
                true
            }
            None => false,
        }
    }

    /// Detaches the worker and waits up to the configured join timeout for it
    /// to drain. From the worker thread itself this only detaches.
    pub fn shutdown(&self) -> Result<(), DispatchError> {
        let Some(worker) = self.worker.lock().take() else {
            return Ok(());
        };
        if worker.is_current_thread() {
            worker.quit_safely();
            return Ok(());
        }
        worker.wait(self.options.join_timeout)
    }

    /// Dispatch path of the current worker, if one is attached.
    pub fn dispatcher(&self) -> Option<Dispatcher> {
        self.worker
            .lock()
            .as_ref()
            .map(|handle| handle.dispatcher().clone())
    }

    pub fn worker_state(&self) -> WorkerState {
        self.worker
            .lock()
            .as_ref()
            .map_or(WorkerState::Uninitialized, WorkerHandle::state)
    }

    fn spawn_worker(&self) -> Result<WorkerHandle, DispatchError> {
        WorkerHandle::spawn(
            &self.options,
            Arc::downgrade(&self.delegate),
            self.snapshot.clone(),
        )
    }
}

impl<D: PixelTransform + 'static> Drop for ThreadedPixelTransform<D> {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.get_mut().take() {
            worker.quit_safely();
            debug!(proxy = %self.id, "proxy dropped; worker quitting");
        }
    }
}

impl<D: PixelTransform + 'static> PixelTransform for ThreadedPixelTransform<D> {
    fn id(&self) -> TransformId {
        self.id
    }

    fn surface(&self) -> Option<Surface> {
        self.snapshot.load().surface
    }

    fn set_surface(&mut self, surface: Option<Surface>) {
        self.post(Message::SetSurface { surface });
    }

    fn image_orientation(&self) -> ImageOrientation {
        self.snapshot.load().orientation
    }

    fn set_image_orientation(&mut self, orientation: ImageOrientation) {
        self.post(Message::SetImageOrientation { orientation });
    }

    fn surface_rotation(&self) -> i32 {
        self.snapshot.load().rotation
    }

    fn set_surface_rotation(&mut self, degrees: i32) {
        self.post(Message::SetSurfaceRotation { degrees });
    }

    fn video_gravity(&self) -> VideoGravity {
        self.snapshot.load().video_gravity
    }

    fn set_video_gravity(&mut self, gravity: VideoGravity) {
        self.post(Message::SetVideoGravity { gravity });
    }

    fn extent(&self) -> Extent {
        self.snapshot.load().extent
    }

    fn set_extent(&mut self, extent: Extent) {
        self.post(Message::SetExtent {
            width: extent.width,
            height: extent.height,
        });
    }

    fn resample_filter(&self) -> ResampleFilter {
        self.snapshot.load().resample_filter
    }

    fn set_resample_filter(&mut self, filter: ResampleFilter) {
        self.post(Message::SetResampleFilter { filter });
    }

    fn create_input_surface(
        &mut self,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> Result<(), TransformError> {
        self.post(Message::CreateInputSurface {
            width,
            height,
            format,
        });
        Ok(())
    }

    fn set_listener(&mut self, listener: Option<Arc<dyn PixelTransformListener>>) {
        self.listeners.replace(listener);
    }

    fn attach(&mut self) {
        if let Err(err) = self.restart_worker() {
            warn!(proxy = %self.id, error = %err, "failed to attach worker");
        }
    }
}
