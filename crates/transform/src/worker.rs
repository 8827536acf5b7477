//! Dedicated worker thread that owns every mutation of a pipeline.
//!
//! ```text
//!   Dispatcher::post (any thread)
//!          │ Envelope::Message
//!          ▼
//!   unbounded FIFO ──▶ worker loop ──▶ Weak::upgrade ──▶ Message::apply ──▶ StateSnapshot::publish
//!          ▲                               │
//!   quit_safely ─ Envelope::Quit           └─▶ delegate gone: message skipped
//! ```
//!
//! A quit request is queued behind everything already posted, so the worker
//! drains its queue before it stops. Anything that lands after the quit marker
//! is never applied.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;

use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::delegate::PixelTransform;
use crate::message::{Message, RawMessage};
use crate::snapshot::StateSnapshot;
use crate::types::PipelineState;

pub const DEFAULT_THREAD_NAME: &str = "pixel-transform";
pub const DEFAULT_JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Lifecycle of the worker serving a proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerState {
    /// No worker has been started, or the previous one was cleared.
    Uninitialized,
    Running,
    /// Draining messages queued before the quit request.
    Quitting,
    Terminated,
}

impl WorkerState {
    fn code(self) -> u8 {
        self as u8
    }

    fn from_code(code: u8) -> Self {
        match code {
            1 => Self::Running,
            2 => Self::Quitting,
            3 => Self::Terminated,
            _ => Self::Uninitialized,
        }
    }
}

/// Options applied whenever a worker thread is started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerOptions {
    /// Name given to the spawned thread.
    pub thread_name: String,
    /// How long a shutdown waits for the queue to drain.
    pub join_timeout: Duration,
}

impl WorkerOptions {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            thread_name: DEFAULT_THREAD_NAME.to_string(),
            join_timeout: DEFAULT_JOIN_TIMEOUT,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("worker thread name {0:?} contains a NUL byte")]
    InvalidThreadName(String),
    #[error("failed to spawn worker thread '{name}': {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },
    #[error("worker is quitting and no longer accepts messages")]
    Quitting,
    #[error("worker has terminated")]
    Terminated,
    #[error("worker did not terminate within {0:?}")]
    JoinTimeout(Duration),
    #[error("worker thread panicked")]
    WorkerPanicked,
}

enum Envelope {
    Message(Message),
    Quit,
}

struct WorkerShared {
    state: AtomicU8,
    applied: AtomicU64,
    skipped: AtomicU64,
}

impl WorkerShared {
    fn state(&self) -> WorkerState {
        WorkerState::from_code(self.state.load(Ordering::Acquire))
    }

    fn transition(&self, from: WorkerState, to: WorkerState) -> bool {
        self.state
            .compare_exchange(from.code(), to.code(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// Cloneable path for posting messages to one worker.
#[derive(Clone)]
pub struct Dispatcher {
    sender: Sender<Envelope>,
    shared: Arc<WorkerShared>,
}

impl Dispatcher {
    /// Enqueues `message` without waiting for it to be processed.
    pub fn post(&self, message: Message) -> Result<(), DispatchError> {
        match self.shared.state() {
            WorkerState::Running => {}
            WorkerState::Quitting => return Err(DispatchError::Quitting),
            WorkerState::Uninitialized | WorkerState::Terminated => {
                return Err(DispatchError::Terminated)
            }
        }
        trace!(message = message.name(), "posting message");
        self.sender
            .send(Envelope::Message(message))
            .map_err(|_| DispatchError::Terminated)
    }

    /// Decodes and posts an opcode-encoded message.
    ///
    /// # Panics
    ///
    /// Panics if `raw` does not decode to a [`Message`]. An unknown opcode or a
    /// payload of the wrong shape is a protocol contract violation.
    pub fn post_raw(&self, raw: RawMessage) -> Result<(), DispatchError> {
        let message = match Message::try_from(raw) {
            Ok(message) => message,
            Err(violation) => panic!("{violation}"),
        };
        self.post(message)
    }

    pub fn state(&self) -> WorkerState {
        self.shared.state()
    }

    /// Messages applied to a live delegate.
    pub fn applied(&self) -> u64 {
        self.shared.applied.load(Ordering::Relaxed)
    }

    /// Messages dropped because the delegate was already released.
    pub fn skipped(&self) -> u64 {
        self.shared.skipped.load(Ordering::Relaxed)
    }
}

/// Owned handle to a running worker thread.
///
/// Dropping the handle requests a safe quit but does not wait for the thread.
pub struct WorkerHandle {
    dispatcher: Dispatcher,
    finished: Receiver<()>,
    join_handle: Option<JoinHandle<()>>,
    thread_id: ThreadId,
    name: String,
}

impl WorkerHandle {
    /// Starts a worker that applies messages to whatever `target` still points to.
    pub fn spawn<D>(
        options: &WorkerOptions,
        target: Weak<Mutex<D>>,
        snapshot: Arc<StateSnapshot>,
    ) -> Result<Self, DispatchError>
    where
        D: PixelTransform + 'static,
    {
        let name = options.thread_name.clone();
        if name.contains('\0') {
            return Err(DispatchError::InvalidThreadName(name));
        }

        let (sender, receiver) = unbounded();
        let (finished_tx, finished_rx) = bounded(1);
        let shared = Arc::new(WorkerShared {
            state: AtomicU8::new(WorkerState::Running.code()),
            applied: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
        });

        let thread_shared = shared.clone();
        let join_handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                let exit = ExitSignal {
                    shared: thread_shared,
                    finished: finished_tx,
                };
                run_worker(target, receiver, snapshot, &exit.shared);
            })
            .map_err(|source| DispatchError::Spawn {
                name: name.clone(),
                source,
            })?;

        let thread_id = join_handle.thread().id();
        debug!(thread = %name, "worker thread started");

        Ok(Self {
            dispatcher: Dispatcher { sender, shared },
            finished: finished_rx,
            join_handle: Some(join_handle),
            thread_id,
            name,
        })
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn post(&self, message: Message) -> Result<(), DispatchError> {
        self.dispatcher.post(message)
    }

    pub fn state(&self) -> WorkerState {
        self.dispatcher.state()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn thread_id(&self) -> ThreadId {
        self.thread_id
    }

    /// True when called from the worker thread itself.
    pub fn is_current_thread(&self) -> bool {
        thread::current().id() == self.thread_id
    }

    /// Stops accepting messages and lets the queue drain. Returns false if the
    /// worker was not running.
    pub fn quit_safely(&self) -> bool {
        if !self
            .dispatcher
            .shared
            .transition(WorkerState::Running, WorkerState::Quitting)
        {
            return false;
        }
        let _ = self.dispatcher.sender.send(Envelope::Quit);
        debug!(thread = %self.name, "worker quitting after queued messages drain");
        true
    }

    /// Quits safely and waits up to `timeout` for the thread to finish.
    pub fn wait(mut self, timeout: Duration) -> Result<(), DispatchError> {
        self.quit_safely();
        match self.finished.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {}
            Err(RecvTimeoutError::Timeout) => return Err(DispatchError::JoinTimeout(timeout)),
        }
        match self.join_handle.take() {
            Some(handle) => handle.join().map_err(|_| DispatchError::WorkerPanicked),
            None => Ok(()),
        }
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        self.quit_safely();
    }
}

/// Marks the worker terminated however the loop exits, unwinding included.
struct ExitSignal {
    shared: Arc<WorkerShared>,
    finished: Sender<()>,
}

impl Drop for ExitSignal {
    fn drop(&mut self) {
        self.shared
            .state
            .store(WorkerState::Terminated.code(), Ordering::Release);
        let _ = self.finished.try_send(());
        debug!(
            applied = self.shared.applied.load(Ordering::Relaxed),
            skipped = self.shared.skipped.load(Ordering::Relaxed),
            "worker thread terminated"
        );
    }
}

fn run_worker<D>(
    target: Weak<Mutex<D>>,
    receiver: Receiver<Envelope>,
    snapshot: Arc<StateSnapshot>,
    shared: &WorkerShared,
) where
    D: PixelTransform,
{
    match target.upgrade() {
        Some(delegate) => delegate.lock().attach(),
        None => debug!("delegate released before the worker attached"),
    }

    for envelope in receiver.iter() {
        let message = match envelope {
            Envelope::Message(message) => message,
            Envelope::Quit => break,
        };

        let Some(delegate) = target.upgrade() else {
            shared.skipped.fetch_add(1, Ordering::Relaxed);
            trace!(message = message.name(), "delegate released; message skipped");
            continue;
        };

        let mut delegate = delegate.lock();
        trace!(message = message.name(), "applying message");
        if let Err(err) = message.apply(&mut *delegate) {
            warn!(message = message.name(), error = %err, "pipeline rejected message");
        }
        snapshot.publish(&PipelineState::capture(&*delegate));
        shared.applied.fetch_add(1, Ordering::Relaxed);
    }
}
