//! Command dispatch.
//!
//! Every operation funnels through one worker thread so the driver never sees
//! overlapping calls. Callers hand a request over a single-slot channel and
//! block on a per-call reply channel. Calls made on the worker itself, and the
//! two operations bound to the caller's window thread, run in place.

mod engine;
mod worker;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, SyncSender};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::debug;

pub(crate) use engine::Engine;
pub use engine::{DeviceEventCallback, ScanCallback};

use crate::protocol::{Identity, Message, OperationRequest, OperationResult, WindowHandle};
use crate::rollback;
use crate::session::SessionError;
use crate::state::SessionPhase;

/// The cross-thread parcel: one request and where to send its result.
pub(crate) struct PendingWork {
    request: OperationRequest,
    reply: SyncSender<OperationResult>,
}

pub(crate) enum Command {
    Execute(PendingWork),
    Rollback {
        target: SessionPhase,
        done: SyncSender<SessionPhase>,
    },
    Wake,
    Shutdown,
}

/// Cloneable front end of the worker.
#[derive(Clone)]
pub struct Dispatcher {
    engine: Arc<Engine>,
    /// Held from hand-off until the reply arrives.
    gate: Arc<Mutex<()>>,
    queue: SyncSender<Command>,
    stopped: Arc<AtomicBool>,
}

impl Dispatcher {
    /// Start the worker for `engine`.
    pub(crate) fn start(engine: Engine, poll: Duration) -> Result<(Self, JoinHandle<()>), SessionError> {
        let engine = Arc::new(engine);
        let (queue, inbox) = mpsc::sync_channel(1);
        let stopped = Arc::new(AtomicBool::new(false));
        let worker = worker::spawn(&engine, inbox, stopped.clone(), poll)
            .map_err(SessionError::WorkerSpawn)?;
        let dispatcher = Self {
            engine,
            gate: Arc::new(Mutex::new(())),
            queue,
            stopped,
        };
        Ok((dispatcher, worker))
    }

    pub(crate) fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Run `request` and wait for its result.
    pub fn execute(&self, request: OperationRequest) -> Result<OperationResult, SessionError> {
        if !request.payload.fits(request.category) {
            return Err(SessionError::PayloadMismatch {
                category: request.category,
                shape: request.payload.shape(),
            });
        }

        if self.engine.on_worker_thread() {
            return Ok(self.engine.run(request).0);
        }
        if self.stopped.load(Ordering::Acquire) {
            return Err(SessionError::WorkerStopped);
        }

        let _gate = engine::lock(&self.gate);
        if request.runs_on_caller_thread() {
            let (result, wake) = self.engine.run(request);
            if wake {
                self.wake();
            }
            return Ok(result);
        }

        let (reply, done) = mpsc::sync_channel(1);
        self.queue
            .send(Command::Execute(PendingWork { request, reply }))
            .map_err(|_| SessionError::WorkerStopped)?;
        done.recv().map_err(|_| SessionError::WorkerStopped)
    }

    /// Drive the session down to `target`. Returns the phase reached.
    pub fn rollback(&self, target: SessionPhase) -> Result<SessionPhase, SessionError> {
        if self.engine.on_worker_thread() {
            return Ok(rollback::run(&self.engine, target));
        }
        if self.stopped.load(Ordering::Acquire) {
            return Err(SessionError::WorkerStopped);
        }

        let _gate = engine::lock(&self.gate);
        let (done, reached) = mpsc::sync_channel(1);
        self.queue
            .send(Command::Rollback { target, done })
            .map_err(|_| SessionError::WorkerStopped)?;
        reached.recv().map_err(|_| SessionError::WorkerStopped)
    }

    /// Lock-free read of the current phase.
    pub fn phase(&self) -> SessionPhase {
        self.engine.phase()
    }

    pub fn app_identity(&self) -> Identity {
        self.engine.origin()
    }

    pub fn driver_identity(&self) -> Option<Identity> {
        self.engine.driver()
    }

    pub fn parent(&self) -> WindowHandle {
        self.engine.parent()
    }

    /// Feed a message the driver sent through its callback.
    pub fn deliver_message(&self, message: Message) {
        if self.engine.deliver(message) {
            self.wake();
        }
    }

    /// Nudge the worker without blocking. A full queue already guarantees
    /// another iteration.
    pub fn wake(&self) {
        let _ = self.queue.try_send(Command::Wake);
    }

    pub fn set_device_event_callback(&self, callback: Option<DeviceEventCallback>) {
        self.engine.set_device_event_callback(callback);
    }

    pub fn set_scan_callback(&self, callback: Option<ScanCallback>) {
        self.engine.set_scan_callback(callback);
        self.wake();
    }

    /// Ask the worker to stop. The worker checks the stop flag on every
    /// iteration, so the queued command only wakes it. With `wait`, blocks
    /// until the command is queued; otherwise a full queue already holds a
    /// wake-up.
    pub(crate) fn stop(&self, wait: bool) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        let sent = if wait {
            self.queue.send(Command::Shutdown).is_ok()
        } else {
            self.queue.try_send(Command::Shutdown).is_ok()
        };
        debug!(sent, "shutdown requested");
    }

    pub(crate) fn clear_callbacks(&self) {
        self.engine.clear_callbacks();
    }
}
