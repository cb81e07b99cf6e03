//! Session phase tracking.
//!
//! [`transition`] is the pure transition table. [`PhaseTracker`] owns the
//! current phase and the transfer-ready latch used while an enable call is
//! still in flight on another thread.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Mutex, PoisonError};

use tracing::debug;

use crate::protocol::{Category, Message, OperationRequest, OperationResult, Payload, Status};

/// Where the protocol dialogue currently stands (S1..S7).
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SessionPhase {
    /// S1: driver manager library not loaded.
    Unloaded = 1,
    /// S2: manager loaded, not open.
    ManagerLoaded = 2,
    /// S3: manager open.
    ManagerOpen = 3,
    /// S4: driver open, capabilities negotiable.
    DriverOpen = 4,
    /// S5: driver enabled, UI (if any) is up.
    Enabled = 5,
    /// S6: driver announced a transfer.
    TransferReady = 6,
    /// S7: a transfer is under way.
    Transferring = 7,
}

impl SessionPhase {
    pub const ALL: [SessionPhase; 7] = [
        SessionPhase::Unloaded,
        SessionPhase::ManagerLoaded,
        SessionPhase::ManagerOpen,
        SessionPhase::DriverOpen,
        SessionPhase::Enabled,
        SessionPhase::TransferReady,
        SessionPhase::Transferring,
    ];

    /// Phase number, 1 through 7.
    pub const fn number(self) -> u8 {
        self as u8
    }

    pub fn from_number(n: u8) -> Option<Self> {
        Self::ALL.get(usize::from(n).checked_sub(1)?).copied()
    }

    /// One protocol step down, saturating at S1.
    pub fn below(self) -> Self {
        Self::from_number(self.number() - 1).unwrap_or(SessionPhase::Unloaded)
    }

    fn label(self) -> &'static str {
        match self {
            SessionPhase::Unloaded => "unloaded",
            SessionPhase::ManagerLoaded => "manager loaded",
            SessionPhase::ManagerOpen => "manager open",
            SessionPhase::DriverOpen => "driver open",
            SessionPhase::Enabled => "enabled",
            SessionPhase::TransferReady => "transfer ready",
            SessionPhase::Transferring => "transferring",
        }
    }
}

impl Default for SessionPhase {
    fn default() -> Self {
        Self::ManagerLoaded
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S{} ({})", self.number(), self.label())
    }
}

/// Compute the phase after `request` finished with `result`.
///
/// Only successful outcomes move the phase; everything else leaves it alone.
pub fn transition(
    phase: SessionPhase,
    request: &OperationRequest,
    result: &OperationResult,
) -> SessionPhase {
    use SessionPhase::*;

    let ok = result.status.is_success();
    match (request.category, request.message) {
        (Category::Parent, Message::OpenDsm) if ok && phase <= ManagerLoaded => ManagerOpen,
        (Category::Parent, Message::CloseDsm) if ok && phase == ManagerOpen => ManagerLoaded,
        (Category::Identity, Message::OpenDs) if ok && phase == ManagerOpen => DriverOpen,
        (Category::Identity, Message::CloseDs) if ok && phase == DriverOpen => ManagerOpen,
        (Category::UserInterface, Message::EnableDs | Message::EnableDsUiOnly)
            if ok && phase == DriverOpen =>
        {
            Enabled
        }
        (Category::UserInterface, Message::DisableDs) if ok && phase == Enabled => DriverOpen,
        (Category::Event, Message::ProcessEvent)
            if result.status == Status::EventConsumed
                && phase == Enabled
                && carries_transfer_ready(&result.payload) =>
        {
            TransferReady
        }
        (Category::PendingXfers, Message::EndXfer)
            if ok && matches!(phase, TransferReady | Transferring) =>
        {
            match result.payload.as_pending_xfers() {
                Some(pending) if pending.count > 0 => TransferReady,
                _ => Enabled,
            }
        }
        (Category::PendingXfers, Message::Reset)
            if ok && matches!(phase, TransferReady | Transferring) =>
        {
            Enabled
        }
        (category, _)
            if category.is_transfer()
                && phase == TransferReady
                && matches!(result.status, Status::Success | Status::TransferComplete) =>
        {
            Transferring
        }
        _ => phase,
    }
}

fn carries_transfer_ready(payload: &Payload) -> bool {
    matches!(payload, Payload::Event(probe) if probe.message == Some(Message::XferReady))
}

/// A phase change, plus whether the worker must be woken afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: SessionPhase,
    pub to: SessionPhase,
    pub wake: bool,
}

impl Transition {
    pub fn changed(&self) -> bool {
        self.from != self.to
    }
}

/// What happened to a transfer-ready notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadySignal {
    /// An enable call is in flight; the advance is deferred until it returns.
    Latched,
    /// The phase moved straight to S6.
    Applied(Transition),
    /// Not meaningful in the current phase.
    Ignored(SessionPhase),
}

#[derive(Debug, Default)]
struct Latch {
    enable_in_flight: bool,
    transfer_ready: bool,
}

/// Current phase plus the transfer-ready latch.
///
/// Reads of the phase are lock-free; updates go through the latch mutex so a
/// transfer-ready notification can never slip between an enable call and its
/// own transition.
#[derive(Debug)]
pub struct PhaseTracker {
    phase: AtomicU8,
    latch: Mutex<Latch>,
}

impl PhaseTracker {
    pub fn new(initial: SessionPhase) -> Self {
        Self {
            phase: AtomicU8::new(initial.number()),
            latch: Mutex::new(Latch::default()),
        }
    }

    pub fn current(&self) -> SessionPhase {
        SessionPhase::from_number(self.phase.load(Ordering::Acquire))
            .unwrap_or(SessionPhase::Unloaded)
    }

    fn store(&self, phase: SessionPhase) {
        self.phase.store(phase.number(), Ordering::Release);
    }

    /// Set the phase unconditionally and drop any latched notification.
    pub fn force(&self, phase: SessionPhase) -> Transition {
        let mut latch = self.latch.lock().unwrap_or_else(PoisonError::into_inner);
        latch.transfer_ready = false;
        let from = self.current();
        self.store(phase);
        Transition {
            from,
            to: phase,
            wake: false,
        }
    }

    /// Called before `request` reaches the transport.
    pub fn begin(&self, request: &OperationRequest) {
        if request.is_enable() {
            let mut latch = self.latch.lock().unwrap_or_else(PoisonError::into_inner);
            latch.enable_in_flight = true;
            latch.transfer_ready = false;
        }
    }

    /// Route a finished operation through the transition table.
    pub fn apply(&self, request: &OperationRequest, result: &OperationResult) -> Transition {
        let mut latch = self.latch.lock().unwrap_or_else(PoisonError::into_inner);
        let from = self.current();
        let mut to = transition(from, request, result);
        let mut wake = false;

        if request.is_enable() {
            latch.enable_in_flight = false;
            let latched = std::mem::take(&mut latch.transfer_ready);
            if latched && to == SessionPhase::Enabled {
                debug!("applying transfer-ready latched during enable");
                to = SessionPhase::TransferReady;
                wake = true;
            }
        }

        self.store(to);
        Transition { from, to, wake }
    }

    /// The driver announced a transfer outside any request.
    pub fn observe_transfer_ready(&self) -> ReadySignal {
        let mut latch = self.latch.lock().unwrap_or_else(PoisonError::into_inner);
        if latch.enable_in_flight {
            latch.transfer_ready = true;
            return ReadySignal::Latched;
        }
        let from = self.current();
        if from != SessionPhase::Enabled {
            return ReadySignal::Ignored(from);
        }
        self.store(SessionPhase::TransferReady);
        ReadySignal::Applied(Transition {
            from,
            to: SessionPhase::TransferReady,
            wake: true,
        })
    }
}

impl Default for PhaseTracker {
    fn default() -> Self {
        Self::new(SessionPhase::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{EventProbe, PendingXfers, UserInterface};
    use SessionPhase::*;

    fn req(category: Category, message: Message) -> OperationRequest {
        OperationRequest::control(category, message, Payload::None)
    }

    fn ok() -> OperationResult {
        OperationResult::new(Status::Success, Payload::None)
    }

    fn end_xfer(count: u16) -> OperationResult {
        OperationResult::new(
            Status::Success,
            Payload::PendingXfers(PendingXfers {
                count,
                end_of_job: 0,
            }),
        )
    }

    #[test]
    fn test_forward_path() {
        let steps = [
            (ManagerLoaded, req(Category::Parent, Message::OpenDsm), ManagerOpen),
            (ManagerOpen, req(Category::Identity, Message::OpenDs), DriverOpen),
            (DriverOpen, req(Category::UserInterface, Message::EnableDs), Enabled),
            (DriverOpen, req(Category::UserInterface, Message::EnableDsUiOnly), Enabled),
            (Enabled, req(Category::UserInterface, Message::DisableDs), DriverOpen),
            (DriverOpen, req(Category::Identity, Message::CloseDs), ManagerOpen),
            (ManagerOpen, req(Category::Parent, Message::CloseDsm), ManagerLoaded),
            (Unloaded, req(Category::Parent, Message::OpenDsm), ManagerOpen),
        ];
        for (from, request, to) in steps {
            assert_eq!(transition(from, &request, &ok()), to, "{request} from {from}");
        }
    }

    #[test]
    fn test_failures_leave_phase() {
        let enable = req(Category::UserInterface, Message::EnableDs);
        for status in [
            Status::Failure(None),
            Status::SequenceError,
            Status::Crash,
            Status::Cancel,
        ] {
            let result = OperationResult::new(status, Payload::None);
            assert_eq!(transition(DriverOpen, &enable, &result), DriverOpen);
        }
    }

    #[test]
    fn test_out_of_order_success_is_ignored() {
        let close = req(Category::Identity, Message::CloseDs);
        assert_eq!(transition(Enabled, &close, &ok()), Enabled);
        let open = req(Category::Parent, Message::OpenDsm);
        assert_eq!(transition(DriverOpen, &open, &ok()), DriverOpen);
    }

    #[test]
    fn test_transfer_and_end_transfer() {
        let native = OperationRequest::image(Category::ImageNativeXfer, Message::Get, Payload::None);
        let done = OperationResult::new(Status::TransferComplete, Payload::None);
        assert_eq!(transition(TransferReady, &native, &done), Transferring);
        assert_eq!(transition(Enabled, &native, &done), Enabled);

        let info = OperationRequest::image(Category::ImageInfo, Message::Get, Payload::None);
        assert_eq!(transition(TransferReady, &info, &ok()), TransferReady);

        let end = req(Category::PendingXfers, Message::EndXfer);
        assert_eq!(transition(Transferring, &end, &end_xfer(0)), Enabled);
        assert_eq!(transition(Transferring, &end, &end_xfer(2)), TransferReady);
        assert_eq!(transition(Transferring, &end, &end_xfer(0xFFFF)), TransferReady);

        let reset = req(Category::PendingXfers, Message::Reset);
        assert_eq!(transition(TransferReady, &reset, &ok()), Enabled);
        assert_eq!(transition(Transferring, &reset, &ok()), Enabled);
    }

    #[test]
    fn test_process_event_transfer_ready() {
        let probe = req(Category::Event, Message::ProcessEvent);
        let consumed = OperationResult::new(
            Status::EventConsumed,
            Payload::Event(EventProbe {
                os_event: vec![],
                message: Some(Message::XferReady),
            }),
        );
        assert_eq!(transition(Enabled, &probe, &consumed), TransferReady);

        let not_ours = OperationResult::new(Status::EventNotConsumed, consumed.payload.clone());
        assert_eq!(transition(Enabled, &probe, &not_ours), Enabled);
    }

    #[test]
    fn test_transitions_stay_in_range() {
        let requests: Vec<OperationRequest> = [
            (Category::Parent, Message::OpenDsm),
            (Category::Parent, Message::CloseDsm),
            (Category::Identity, Message::OpenDs),
            (Category::Identity, Message::CloseDs),
            (Category::UserInterface, Message::EnableDs),
            (Category::UserInterface, Message::DisableDs),
            (Category::PendingXfers, Message::EndXfer),
            (Category::PendingXfers, Message::Reset),
            (Category::ImageMemXfer, Message::Get),
        ]
        .into_iter()
        .map(|(c, m)| req(c, m))
        .collect();
        for phase in SessionPhase::ALL {
            for request in &requests {
                let next = transition(phase, request, &end_xfer(1));
                assert!(SessionPhase::from_number(next.number()).is_some());
            }
        }
    }

    #[test]
    fn test_enable_applies_latched_transfer_ready() {
        let tracker = PhaseTracker::new(DriverOpen);
        let enable = OperationRequest::control(
            Category::UserInterface,
            Message::EnableDs,
            Payload::UserInterface(UserInterface::default()),
        );

        tracker.begin(&enable);
        assert_eq!(tracker.observe_transfer_ready(), ReadySignal::Latched);
        assert_eq!(tracker.current(), DriverOpen);

        let step = tracker.apply(&enable, &ok());
        assert_eq!(step.from, DriverOpen);
        assert_eq!(step.to, TransferReady);
        assert!(step.wake);
        assert_eq!(tracker.current(), TransferReady);
    }

    #[test]
    fn test_enable_without_latch() {
        let tracker = PhaseTracker::new(DriverOpen);
        let enable = req(Category::UserInterface, Message::EnableDs);
        tracker.begin(&enable);
        let step = tracker.apply(&enable, &ok());
        assert_eq!(step.to, Enabled);
        assert!(!step.wake);
    }

    #[test]
    fn test_failed_enable_drops_latch() {
        let tracker = PhaseTracker::new(DriverOpen);
        let enable = req(Category::UserInterface, Message::EnableDs);
        tracker.begin(&enable);
        tracker.observe_transfer_ready();
        let failed = OperationResult::new(Status::Failure(None), Payload::None);
        assert_eq!(tracker.apply(&enable, &failed).to, DriverOpen);

        tracker.begin(&enable);
        assert_eq!(tracker.apply(&enable, &ok()).to, Enabled);
    }

    #[test]
    fn test_transfer_ready_outside_enable() {
        let tracker = PhaseTracker::new(Enabled);
        match tracker.observe_transfer_ready() {
            ReadySignal::Applied(step) => {
                assert_eq!(step.to, TransferReady);
                assert!(step.wake);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(tracker.observe_transfer_ready(), ReadySignal::Ignored(TransferReady));
    }

    #[test]
    fn test_phase_numbers() {
        assert_eq!(SessionPhase::from_number(0), None);
        assert_eq!(SessionPhase::from_number(7), Some(Transferring));
        assert_eq!(Transferring.below(), TransferReady);
        assert_eq!(Unloaded.below(), Unloaded);
        assert_eq!(Enabled.to_string(), "S5 (enabled)");
        assert_eq!(SessionPhase::default(), ManagerLoaded);
    }
}
