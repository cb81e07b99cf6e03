//! The session worker thread.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError, TryRecvError};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info};

use super::Command;
use super::engine::Engine;
use crate::rollback;

pub(crate) fn spawn(
    engine: &Arc<Engine>,
    queue: Receiver<Command>,
    stopped: Arc<AtomicBool>,
    poll: Duration,
) -> io::Result<JoinHandle<()>> {
    let weak = Arc::downgrade(engine);
    let handle = thread::Builder::new()
        .name("twain-worker".into())
        .spawn(move || run(weak, queue, &stopped, poll))?;
    engine.set_worker(handle.thread().id());
    Ok(handle)
}

/// Wait for the next command. Returns `None` when the worker should move on
/// without one.
fn next(queue: &Receiver<Command>, busy: bool, poll: Duration) -> Option<Command> {
    if !busy {
        return Some(queue.recv().unwrap_or(Command::Shutdown));
    }
    if poll.is_zero() {
        match queue.try_recv() {
            Ok(command) => Some(command),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Command::Shutdown),
        }
    } else {
        match queue.recv_timeout(poll) {
            Ok(command) => Some(command),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(Command::Shutdown),
        }
    }
}

fn run(engine: Weak<Engine>, queue: Receiver<Command>, stopped: &AtomicBool, poll: Duration) {
    debug!("worker started");
    loop {
        // The flag outlives a shutdown command lost to a full queue.
        if stopped.load(Ordering::Acquire) {
            if let Some(engine) = engine.upgrade() {
                engine.run_scan(true);
            }
            break;
        }
        // Never hold a strong reference while blocked.
        let busy = match engine.upgrade() {
            Some(engine) => engine.pending_device_events() > 0 || engine.scan_due(),
            None => break,
        };
        let command = next(&queue, busy, poll);

        let Some(engine) = engine.upgrade() else {
            break;
        };
        engine.drain_device_event();

        match command {
            Some(Command::Execute(work)) => {
                let (result, _) = engine.run(work.request);
                // The caller may have gone away; nothing to do then.
                let _ = work.reply.send(result);
            }
            Some(Command::Rollback { target, done }) => {
                let reached = rollback::run(&engine, target);
                let _ = done.send(reached);
            }
            Some(Command::Wake) | None => {
                if engine.scan_due() {
                    engine.run_scan(false);
                }
            }
            Some(Command::Shutdown) => {
                engine.run_scan(true);
                break;
            }
        }
    }
    info!("worker stopped");
}
