//! Rollback controller.
//!
//! Walks the session down one protocol step at a time, issuing the single
//! undo operation for each step. A sequence error restarts the whole walk
//! from the top phase; individual steps are never retried.

use tracing::{debug, info, instrument, warn};

use crate::dispatch::Engine;
use crate::events::SessionEvent;
use crate::protocol::{
    Category, Message, OperationRequest, Payload, PendingXfers, Status, UserInterface,
};
use crate::state::SessionPhase;

/// Full walks attempted before the phase is forced.
const CYCLES: u32 = 2;

/// The undo operation that leaves `phase`, or `None` when leaving it needs no
/// driver call.
fn undo_request(engine: &Engine, phase: SessionPhase) -> Option<OperationRequest> {
    let request = match phase {
        SessionPhase::Transferring => OperationRequest::control(
            Category::PendingXfers,
            Message::EndXfer,
            Payload::PendingXfers(PendingXfers::default()),
        ),
        SessionPhase::TransferReady => OperationRequest::control(
            Category::PendingXfers,
            Message::Reset,
            Payload::PendingXfers(PendingXfers::default()),
        ),
        SessionPhase::Enabled => OperationRequest::control(
            Category::UserInterface,
            Message::DisableDs,
            Payload::UserInterface(UserInterface {
                parent: engine.parent(),
                ..UserInterface::default()
            }),
        ),
        SessionPhase::DriverOpen => OperationRequest::control(
            Category::Identity,
            Message::CloseDs,
            Payload::Identity(engine.driver().unwrap_or_default()),
        ),
        SessionPhase::ManagerOpen => OperationRequest::control(
            Category::Parent,
            Message::CloseDsm,
            Payload::Parent(engine.parent()),
        ),
        SessionPhase::ManagerLoaded | SessionPhase::Unloaded => return None,
    };
    Some(request)
}

/// Run one undo step, returning its status.
fn step(engine: &Engine, phase: SessionPhase) -> Status {
    let status = match undo_request(engine, phase) {
        Some(request) => engine.run_checked(request).0.status,
        None => Status::Success,
    };
    if phase <= SessionPhase::ManagerOpen {
        engine.release_event_buffer();
    }
    status
}

/// Roll the session back to `target` and return the phase reached, which is
/// never above `target` unless `target` was already at or above the current
/// phase.
#[instrument(level = "info", skip(engine), fields(from = %engine.phase()))]
pub(crate) fn run(engine: &Engine, target: SessionPhase) -> SessionPhase {
    let start = engine.phase();
    if target >= start {
        debug!("nothing to undo");
        return start;
    }

    let mut phase = start;
    for cycle in 1..=CYCLES {
        let mut restart = false;
        while phase > target {
            let status = step(engine, phase);
            if status == Status::SequenceError {
                restart = true;
                if cycle < CYCLES {
                    info!(cycle, at = %phase, "sequence error, restarting walk");
                    engine.emit(SessionEvent::RollbackRestarted {
                        cycle,
                        failed_at: phase,
                    });
                }
                phase = SessionPhase::Transferring;
                break;
            }
            if !status.is_success() {
                debug!(at = %phase, status = %status, "undo step failed, moving on");
            }
            // Trust the tracker when it already fell further than one step.
            phase = engine.phase().min(phase.below());
            if engine.phase() != phase {
                engine.force_phase(phase);
            }
        }
        if !restart {
            info!(reached = %phase, "rollback complete");
            return phase;
        }
    }

    warn!(target = %target, "rollback exhausted its cycles, forcing phase");
    engine.force_phase(target);
    engine.emit(SessionEvent::RollbackForced { target });
    target
}
