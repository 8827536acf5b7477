use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver};
use parking_lot::Mutex;
use transform::{
    DispatchError, Extent, HeadlessPixelTransform, ImageOrientation, Message, PipelineState,
    PixelFormat, PixelTransform, PixelTransformListener, RawMessage, ResampleFilter, Surface,
    ThreadedPixelTransform, TransformError, TransformId, VideoGravity, WorkerOptions,
    WorkerState, OP_SET_EXTENT,
};

#[derive(Debug, Clone, PartialEq)]
enum Event {
    Applied {
        message: Message,
        thread: Option<String>,
    },
    SetUp(TransformId),
    InputSurface(TransformId, Surface),
}

type Log = Arc<Mutex<Vec<Event>>>;

/// Headless pipeline that records every operation it receives.
struct Recording {
    inner: HeadlessPixelTransform,
    log: Log,
    attach_gate: Option<Receiver<()>>,
    panic_on_rotation: Option<i32>,
    dropped: Arc<AtomicBool>,
}

impl Recording {
    fn new(log: Log) -> Self {
        Self {
            inner: HeadlessPixelTransform::new(),
            log,
            attach_gate: None,
            panic_on_rotation: None,
            dropped: Arc::new(AtomicBool::new(false)),
        }
    }

    fn record(&self, message: Message) {
        self.log.lock().push(Event::Applied {
            message,
            thread: thread::current().name().map(str::to_owned),
        });
    }
}

impl Drop for Recording {
    fn drop(&mut self) {
        self.dropped.store(true, Ordering::SeqCst);
    }
}

impl PixelTransform for Recording {
    fn id(&self) -> TransformId {
        self.inner.id()
    }

    fn surface(&self) -> Option<Surface> {
        self.inner.surface()
    }

    fn set_surface(&mut self, surface: Option<Surface>) {
        self.record(Message::SetSurface { surface });
        self.inner.set_surface(surface);
    }

    fn image_orientation(&self) -> ImageOrientation {
        self.inner.image_orientation()
    }

    fn set_image_orientation(&mut self, orientation: ImageOrientation) {
        self.record(Message::SetImageOrientation { orientation });
        self.inner.set_image_orientation(orientation);
    }

    fn surface_rotation(&self) -> i32 {
        self.inner.surface_rotation()
    }

    fn set_surface_rotation(&mut self, degrees: i32) {
        if self.panic_on_rotation == Some(degrees) {
            panic!("pipeline cannot rotate by {degrees}");
        }
        self.record(Message::SetSurfaceRotation { degrees });
        self.inner.set_surface_rotation(degrees);
    }

    fn video_gravity(&self) -> VideoGravity {
        self.inner.video_gravity()
    }

    fn set_video_gravity(&mut self, gravity: VideoGravity) {
        self.record(Message::SetVideoGravity { gravity });
        self.inner.set_video_gravity(gravity);
    }

    fn extent(&self) -> Extent {
        self.inner.extent()
    }

    fn set_extent(&mut self, extent: Extent) {
        self.record(Message::SetExtent {
            width: extent.width,
            height: extent.height,
        });
        self.inner.set_extent(extent);
    }

    fn resample_filter(&self) -> ResampleFilter {
        self.inner.resample_filter()
    }

    fn set_resample_filter(&mut self, filter: ResampleFilter) {
        self.record(Message::SetResampleFilter { filter });
        self.inner.set_resample_filter(filter);
    }

    fn create_input_surface(
        &mut self,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> Result<(), TransformError> {
        self.record(Message::CreateInputSurface {
            width,
            height,
            format,
        });
        self.inner.create_input_surface(width, height, format)
    }

    fn set_listener(&mut self, listener: Option<Arc<dyn PixelTransformListener>>) {
        self.inner.set_listener(listener);
    }

    fn attach(&mut self) {
        if let Some(gate) = self.attach_gate.take() {
            let _ = gate.recv_timeout(Duration::from_secs(5));
        }
        self.inner.attach();
    }
}

/// Listener that appends notifications to the same log as the delegate.
struct LogListener {
    log: Log,
}

impl PixelTransformListener for LogListener {
    fn on_set_up(&self, source: TransformId) {
        self.log.lock().push(Event::SetUp(source));
    }

    fn on_input_surface_created(&self, source: TransformId, surface: Surface) {
        self.log.lock().push(Event::InputSurface(source, surface));
    }
}

fn applied(log: &Log) -> Vec<Message> {
    log.lock()
        .iter()
        .filter_map(|event| match event {
            Event::Applied { message, .. } => Some(*message),
            _ => None,
        })
        .collect()
}

fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    condition()
}

#[test]
fn final_state_matches_queue_order_across_threads() {
    let log = Log::default();
    let proxy = Arc::new(ThreadedPixelTransform::new(Recording::new(log.clone())));

    let callers: Vec<_> = (0..4u32)
        .map(|caller| {
            let proxy = proxy.clone();
            thread::spawn(move || {
                for step in 0..250u32 {
                    proxy.set_extent(Extent::new(caller * 1_000 + step, caller));
                    if step % 50 == 0 {
                        proxy.set_surface_rotation((step / 50) as i32 * 90);
                    }
                }
            })
        })
        .collect();
    for caller in callers {
        caller.join().unwrap();
    }
    proxy.shutdown().unwrap();

    let messages = applied(&log);
    assert_eq!(messages.len(), 4 * (250 + 5));

    // Each caller's own messages keep their issue order.
    for caller in 0..4u32 {
        let widths: Vec<u32> = messages
            .iter()
            .filter_map(|message| match *message {
                Message::SetExtent { width, height } if height == caller => Some(width),
                _ => None,
            })
            .collect();
        assert_eq!(widths.len(), 250);
        assert!(widths.windows(2).all(|pair| pair[0] < pair[1]));
    }

    // Replaying the queue order on a fresh pipeline reproduces the final state.
    let mut replay = HeadlessPixelTransform::new();
    for message in &messages {
        message.apply(&mut replay).unwrap();
    }
    assert_eq!(proxy.state(), replay.state());
}

#[test]
fn every_mutation_runs_on_the_named_worker_thread() {
    let log = Log::default();
    let options = WorkerOptions {
        thread_name: "transform-worker".into(),
        ..WorkerOptions::default()
    };
    let proxy = ThreadedPixelTransform::with_options(Recording::new(log.clone()), options);

    proxy.set_video_gravity(VideoGravity::Resize);
    proxy.set_image_orientation(ImageOrientation::DownMirrored);
    thread::scope(|scope| {
        scope.spawn(|| proxy.set_resample_filter(ResampleFilter::Nearest));
        scope.spawn(|| proxy.set_surface(Some(Surface::allocate())));
    });
    proxy.shutdown().unwrap();

    let events = log.lock();
    let threads: Vec<_> = events
        .iter()
        .filter_map(|event| match event {
            Event::Applied { thread, .. } => Some(thread.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(threads.len(), 4);
    assert!(threads
        .iter()
        .all(|name| name.as_deref() == Some("transform-worker")));
}

#[test]
fn old_dispatch_path_is_dead_after_teardown() {
    let log = Log::default();
    let proxy = ThreadedPixelTransform::new(Recording::new(log.clone()));
    proxy.set_surface_rotation(90);
    let old = proxy.dispatcher().expect("worker attached");

    proxy.shutdown().unwrap();
    assert_eq!(old.state(), WorkerState::Terminated);
    assert!(old.post(Message::SetSurfaceRotation { degrees: 270 }).is_err());

    thread::sleep(Duration::from_millis(20));
    assert_eq!(applied(&log), vec![Message::SetSurfaceRotation { degrees: 90 }]);
    assert_eq!(proxy.surface_rotation(), 90);
}

#[test]
fn messages_posted_before_detach_are_drained() {
    let log = Log::default();
    let proxy = ThreadedPixelTransform::new(Recording::new(log.clone()));
    for degrees in [0, 90, 180, 270] {
        proxy.set_surface_rotation(degrees);
    }
    let old = proxy.dispatcher().expect("worker attached");
    assert!(proxy.detach());
    assert_eq!(proxy.worker_state(), WorkerState::Uninitialized);

    assert!(wait_until(Duration::from_secs(5), || {
        old.state() == WorkerState::Terminated
    }));
    assert_eq!(old.applied(), 4);
    assert_eq!(proxy.surface_rotation(), 270);
}

#[test]
fn worker_is_not_created_until_first_mutation() {
    let log = Log::default();
    let proxy = ThreadedPixelTransform::new(Recording::new(log.clone()));
    proxy.set_listener(Some(Arc::new(LogListener { log: log.clone() })));

    let _ = proxy.surface();
    let _ = proxy.image_orientation();
    let _ = proxy.surface_rotation();
    let _ = proxy.video_gravity();
    let _ = proxy.extent();
    let _ = proxy.resample_filter();
    thread::sleep(Duration::from_millis(20));

    assert_eq!(proxy.worker_state(), WorkerState::Uninitialized);
    assert!(log.lock().is_empty(), "no set-up without a worker");

    proxy.set_extent(Extent::new(2, 2));
    assert_eq!(proxy.worker_state(), WorkerState::Running);
    proxy.shutdown().unwrap();
    assert_eq!(log.lock().first(), Some(&Event::SetUp(proxy.id())));
}

#[test]
fn input_surface_notification_is_ordered_in_the_queue() {
    let log = Log::default();
    let delegate = Recording::new(log.clone());
    let delegate_id = delegate.id();
    let proxy = ThreadedPixelTransform::new(delegate);
    proxy.set_listener(Some(Arc::new(LogListener { log: log.clone() })));

    proxy.set_extent(Extent::new(1920, 1080));
    proxy.create_input_surface(1280, 720, PixelFormat::Yuv420_888);
    proxy.set_extent(Extent::new(1280, 720));
    proxy.shutdown().unwrap();

    let events = log.lock().clone();
    let without_threads: Vec<Event> = events
        .into_iter()
        .map(|event| match event {
            Event::Applied { message, .. } => Event::Applied {
                message,
                thread: None,
            },
            other => other,
        })
        .collect();

    assert_eq!(without_threads.len(), 5);
    assert_eq!(without_threads[0], Event::SetUp(proxy.id()));
    assert_eq!(
        without_threads[1],
        Event::Applied {
            message: Message::SetExtent {
                width: 1920,
                height: 1080
            },
            thread: None,
        }
    );
    assert_eq!(
        without_threads[2],
        Event::Applied {
            message: Message::CreateInputSurface {
                width: 1280,
                height: 720,
                format: PixelFormat::Yuv420_888,
            },
            thread: None,
        }
    );
    match without_threads[3] {
        Event::InputSurface(source, _) => {
            assert_eq!(source, proxy.id());
            assert_ne!(source, delegate_id);
        }
        ref other => panic!("expected input surface notification, got {other:?}"),
    }
    assert_eq!(
        without_threads[4],
        Event::Applied {
            message: Message::SetExtent {
                width: 1280,
                height: 720
            },
            thread: None,
        }
    );
}

#[test]
fn rejected_surface_request_emits_nothing_and_work_continues() {
    let log = Log::default();
    let proxy = ThreadedPixelTransform::new(Recording::new(log.clone()));
    proxy.set_listener(Some(Arc::new(LogListener { log: log.clone() })));

    proxy.create_input_surface(0, 720, PixelFormat::Rgba8888);
    proxy.set_surface_rotation(180);
    proxy.shutdown().unwrap();

    let surfaces = log
        .lock()
        .iter()
        .filter(|event| matches!(event, Event::InputSurface(..)))
        .count();
    assert_eq!(surfaces, 0);
    assert_eq!(proxy.surface_rotation(), 180);
}

#[test]
fn last_arrival_wins_between_two_callers() {
    let proxy = Arc::new(ThreadedPixelTransform::new(HeadlessPixelTransform::new()));

    let first = {
        let proxy = proxy.clone();
        thread::spawn(move || proxy.set_extent(Extent::new(1920, 1080)))
    };
    first.join().unwrap();
    let second = {
        let proxy = proxy.clone();
        thread::spawn(move || proxy.set_extent(Extent::new(1280, 720)))
    };
    second.join().unwrap();

    proxy.shutdown().unwrap();
    assert_eq!(proxy.extent(), Extent::new(1280, 720));
}

#[test]
fn dropping_the_proxy_turns_queued_messages_into_no_ops() {
    let log = Log::default();
    let (open_gate, gate) = bounded(1);
    let mut delegate = Recording::new(log.clone());
    delegate.attach_gate = Some(gate);
    let dropped = delegate.dropped.clone();

    let proxy = ThreadedPixelTransform::new(delegate);
    proxy.set_surface_rotation(90);
    let dispatcher = proxy.dispatcher().expect("worker attached");
    drop(proxy);
    open_gate.send(()).unwrap();

    assert!(wait_until(Duration::from_secs(5), || {
        dispatcher.state() == WorkerState::Terminated
    }));
    assert!(dropped.load(Ordering::SeqCst));
    assert_eq!(dispatcher.skipped(), 1);
    assert_eq!(dispatcher.applied(), 0);
    assert!(applied(&log).is_empty());
}

#[test]
fn replacing_the_listener_redirects_later_notifications() {
    let first_log = Log::default();
    let second_log = Log::default();
    let proxy = ThreadedPixelTransform::new(HeadlessPixelTransform::new());

    proxy.set_listener(Some(Arc::new(LogListener {
        log: first_log.clone(),
    })));
    proxy.attach().unwrap();
    assert!(wait_until(Duration::from_secs(5), || !first_log.lock().is_empty()));

    let previous = proxy.set_listener(Some(Arc::new(LogListener {
        log: second_log.clone(),
    })));
    assert!(previous.is_some());
    proxy.create_input_surface(64, 64, PixelFormat::Rgba8888);
    proxy.shutdown().unwrap();

    assert_eq!(first_log.lock().as_slice(), &[Event::SetUp(proxy.id())]);
    let second = second_log.lock();
    assert_eq!(second.len(), 1);
    assert!(matches!(second[0], Event::InputSurface(source, _) if source == proxy.id()));
}

#[test]
fn raw_messages_decode_before_reaching_the_queue() {
    let proxy = ThreadedPixelTransform::new(HeadlessPixelTransform::with_state(PipelineState {
        extent: Extent::new(1, 1),
        ..PipelineState::default()
    }));
    proxy.attach().unwrap();
    let dispatcher = proxy.dispatcher().expect("worker attached");
    dispatcher
        .post_raw(RawMessage::new(OP_SET_EXTENT, 800, 600, 0))
        .unwrap();
    proxy.shutdown().unwrap();
    assert_eq!(proxy.extent(), Extent::new(800, 600));
}

#[test]
#[should_panic(expected = "unhandled message what=99")]
fn unknown_opcode_is_fatal() {
    let proxy = ThreadedPixelTransform::new(HeadlessPixelTransform::new());
    proxy.attach().unwrap();
    let dispatcher = proxy.dispatcher().expect("worker attached");
    let _ = dispatcher.post_raw(RawMessage::new(99, 0, 0, 0));
}

fn panicking_proxy(log: &Log) -> ThreadedPixelTransform<Recording> {
    let mut delegate = Recording::new(log.clone());
    delegate.panic_on_rotation = Some(13);
    let proxy = ThreadedPixelTransform::new(delegate);
    proxy.set_surface_rotation(13);
    assert!(wait_until(Duration::from_secs(5), || {
        proxy.worker_state() == WorkerState::Terminated
    }));
    proxy
}

#[test]
fn shutdown_reports_a_panicked_worker() {
    let log = Log::default();
    let proxy = panicking_proxy(&log);

    assert!(matches!(proxy.shutdown(), Err(DispatchError::WorkerPanicked)));
    assert_eq!(proxy.worker_state(), WorkerState::Uninitialized);
    assert!(applied(&log).is_empty());
}

#[test]
fn next_mutation_replaces_a_dead_worker() {
    let log = Log::default();
    let proxy = panicking_proxy(&log);
    let dead = proxy.dispatcher().expect("dead worker still referenced");

    proxy.set_surface_rotation(90);
    assert_eq!(proxy.worker_state(), WorkerState::Running);
    proxy.shutdown().unwrap();

    assert_eq!(dead.state(), WorkerState::Terminated);
    assert_eq!(proxy.surface_rotation(), 90);
    assert_eq!(applied(&log), vec![Message::SetSurfaceRotation { degrees: 90 }]);
}

#[test]
fn shutdown_gives_up_after_join_timeout() {
    let log = Log::default();
    let (open_gate, gate) = bounded(1);
    let mut delegate = Recording::new(log.clone());
    delegate.attach_gate = Some(gate);
    let options = WorkerOptions {
        join_timeout: Duration::from_millis(50),
        ..WorkerOptions::default()
    };

    let proxy = ThreadedPixelTransform::with_options(delegate, options);
    proxy.set_surface_rotation(90);
    let dispatcher = proxy.dispatcher().expect("worker attached");

    match proxy.shutdown() {
        Err(DispatchError::JoinTimeout(timeout)) => {
            assert_eq!(timeout, Duration::from_millis(50))
        }
        other => panic!("expected join timeout, got {other:?}"),
    }
    assert_eq!(dispatcher.state(), WorkerState::Quitting);

    open_gate.send(()).unwrap();
    assert!(wait_until(Duration::from_secs(5), || {
        dispatcher.state() == WorkerState::Terminated
    }));
    assert_eq!(proxy.surface_rotation(), 90);
}
