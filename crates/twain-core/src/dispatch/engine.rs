//! Runs single operations against the transport and keeps session state.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::thread::{self, ThreadId};

use tracing::{debug, instrument, warn};

use crate::events::{LogLevel, SessionEvent, SessionObserver};
use crate::protocol::{
    Category, ConditionCode, Identity, Message, OperationRequest, OperationResult, Payload,
    ReturnCode, Status, StatusInfo, WindowHandle,
};
use crate::state::{PhaseTracker, ReadySignal, SessionPhase, Transition};
use crate::transport::{Transport, TransportError};

/// Invoked from the worker once per latched device event.
pub type DeviceEventCallback = Box<dyn FnMut() -> Status + Send>;

/// Invoked from the worker on idle iterations while enabled, and once with
/// `closing = true` at shutdown.
pub type ScanCallback = Box<dyn FnMut(bool) -> Status + Send>;

/// Initial capacity of the event-probe buffer.
const EVENT_BUFFER_SIZE: usize = 256;

#[derive(Default)]
struct Callbacks {
    device_event: Option<DeviceEventCallback>,
    scan: Option<ScanCallback>,
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Shared session state. Owned by the session handles; the worker only holds
/// a weak reference.
pub(crate) struct Engine {
    transport: Box<dyn Transport>,
    auto_status: bool,
    phase: PhaseTracker,
    /// Application identity. Held for the duration of every native call, so
    /// two calls can never overlap whichever thread they come from.
    origin: Mutex<Identity>,
    driver: Mutex<Option<Identity>>,
    parent: AtomicUsize,
    device_events: AtomicUsize,
    callbacks: Mutex<Callbacks>,
    event_buffer: Mutex<Option<Vec<u8>>>,
    observer: Arc<dyn SessionObserver>,
    worker: OnceLock<ThreadId>,
}

impl Engine {
    pub(crate) fn new(
        transport: Box<dyn Transport>,
        origin: Identity,
        auto_status: bool,
        observer: Arc<dyn SessionObserver>,
    ) -> Self {
        Self {
            transport,
            auto_status,
            phase: PhaseTracker::default(),
            origin: Mutex::new(origin),
            driver: Mutex::new(None),
            parent: AtomicUsize::new(0),
            device_events: AtomicUsize::new(0),
            callbacks: Mutex::new(Callbacks::default()),
            event_buffer: Mutex::new(None),
            observer,
            worker: OnceLock::new(),
        }
    }

    pub(crate) fn set_worker(&self, id: ThreadId) {
        // Only the first worker counts.
        let _ = self.worker.set(id);
    }

    pub(crate) fn on_worker_thread(&self) -> bool {
        self.worker.get() == Some(&thread::current().id())
    }

    pub(crate) fn phase(&self) -> SessionPhase {
        self.phase.current()
    }

    /// Set the phase without a driver call. Identities that only live above
    /// the new phase are dropped with it.
    pub(crate) fn force_phase(&self, phase: SessionPhase) {
        let step = self.phase.force(phase);
        if phase < SessionPhase::DriverOpen && lock(&self.driver).take().is_some() {
            debug!(%phase, "driver identity cleared");
        }
        if phase < SessionPhase::ManagerOpen {
            self.parent.store(0, Ordering::Release);
        }
        self.note(step);
    }

    pub(crate) fn origin(&self) -> Identity {
        lock(&self.origin).clone()
    }

    pub(crate) fn driver(&self) -> Option<Identity> {
        lock(&self.driver).clone()
    }

    pub(crate) fn parent(&self) -> WindowHandle {
        self.parent.load(Ordering::Acquire)
    }

    pub(crate) fn emit(&self, event: SessionEvent) {
        self.observer.on_event(&event);
    }

    fn note(&self, step: Transition) {
        if step.changed() {
            self.emit(SessionEvent::PhaseChanged {
                from: step.from,
                to: step.to,
            });
        }
    }

    /// Run one operation, fetching a condition code after a generic failure
    /// when auto-status is on. Returns the result and whether the worker
    /// needs a wake-up.
    pub(crate) fn run(&self, request: OperationRequest) -> (OperationResult, bool) {
        self.dispatch(request, self.auto_status)
    }

    /// Like [`Engine::run`] but always fetches the condition code.
    pub(crate) fn run_checked(&self, request: OperationRequest) -> (OperationResult, bool) {
        self.dispatch(request, true)
    }

    #[instrument(level = "debug", skip_all, fields(request = %request))]
    fn dispatch(&self, mut request: OperationRequest, fetch_status: bool) -> (OperationResult, bool) {
        self.phase.begin(&request);

        let mut status = match self.call(&mut request) {
            Ok(code) => Status::from_return_code(code),
            Err(TransportError::Unsupported(platform)) => {
                warn!(?platform, "transport has no binding for this platform");
                Status::UnsupportedPlatform
            }
            Err(fault) => {
                warn!(error = %fault, "transport fault, reporting crash");
                self.emit(SessionEvent::TransportFault {
                    request: request.to_string(),
                    message: fault.to_string(),
                });
                Status::Crash
            }
        };

        if status == Status::Failure(None) && fetch_status && request.category != Category::Status {
            if let Some(condition) = self.fetch_condition() {
                status = Status::from_condition(condition);
            }
        }

        let result = OperationResult::new(status, std::mem::take(&mut request.payload));
        let step = self.phase.apply(&request, &result);
        self.note(step);
        // Entering the enabled phases makes the scan callback due.
        let entered_scan = step.changed() && step.to >= SessionPhase::Enabled;
        let wake = step.wake | entered_scan | self.absorb(&request, &result);

        self.emit(SessionEvent::Operation {
            request: request.to_string(),
            status,
        });
        (result, wake)
    }

    fn call(&self, request: &mut OperationRequest) -> Result<u16, TransportError> {
        let destination = if request.targets_manager() {
            None
        } else {
            self.driver()
        };
        let mut origin = lock(&self.origin);
        let mut scratch = origin.clone();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            self.transport
                .invoke(&mut scratch, destination.as_ref(), request)
        }))
        .unwrap_or_else(|panic| Err(TransportError::Fault(panic_message(panic.as_ref()))));

        // The manager assigns the application identity once, on open.
        let opened = matches!(&outcome, Ok(code) if *code == ReturnCode::Success.code())
            && request.category == Category::Parent
            && request.message == Message::OpenDsm;
        if opened {
            *origin = scratch;
        } else if scratch != *origin {
            debug!("ignoring application identity change outside open");
        }
        outcome
    }

    /// Best effort: any failure here leaves the caller's status alone.
    fn fetch_condition(&self) -> Option<ConditionCode> {
        let mut query = OperationRequest::control(
            Category::Status,
            Message::Get,
            Payload::Status(StatusInfo::default()),
        );
        match self.call(&mut query) {
            Ok(code) if code == ReturnCode::Success.code() => match query.payload {
                Payload::Status(info) => {
                    let condition = ConditionCode::from_code(info.condition_code);
                    debug!(condition = ?condition, "fetched condition code");
                    condition
                }
                _ => None,
            },
            _ => None,
        }
    }

    /// Side effects of a finished operation beyond the phase change.
    fn absorb(&self, request: &OperationRequest, result: &OperationResult) -> bool {
        let ok = result.status.is_success();
        match (request.category, request.message) {
            (Category::Parent, Message::OpenDsm) if ok => {
                if let Payload::Parent(handle) = result.payload {
                    self.parent.store(handle, Ordering::Release);
                }
                false
            }
            (Category::Identity, Message::OpenDs) if ok => {
                let mut driver = lock(&self.driver);
                match (&*driver, result.payload.as_identity()) {
                    (None, Some(identity)) => *driver = Some(identity.clone()),
                    (Some(_), _) => warn!("driver identity already set, keeping it"),
                    (None, None) => warn!("open returned no driver identity"),
                }
                false
            }
            (Category::Parent, Message::CloseDsm) if ok => {
                self.parent.store(0, Ordering::Release);
                false
            }
            (Category::Identity, Message::CloseDs) if ok => {
                lock(&self.driver).take();
                false
            }
            (Category::Event, Message::ProcessEvent) if result.status == Status::EventConsumed => {
                match &result.payload {
                    // Transfer-ready is handled by the transition table.
                    Payload::Event(probe) => match probe.message {
                        Some(Message::XferReady) | None => false,
                        Some(message) => self.deliver(message),
                    },
                    _ => false,
                }
            }
            _ => false,
        }
    }

    /// Route a message the driver sent outside any request.
    pub(crate) fn deliver(&self, message: Message) -> bool {
        match message {
            Message::XferReady => match self.phase.observe_transfer_ready() {
                ReadySignal::Latched => {
                    self.emit(SessionEvent::TransferReadyLatched);
                    false
                }
                ReadySignal::Applied(step) => {
                    self.note(step);
                    step.wake
                }
                ReadySignal::Ignored(phase) => {
                    self.emit(SessionEvent::Log {
                        level: LogLevel::Debug,
                        message: format!("transfer ready ignored in {phase}"),
                    });
                    false
                }
            },
            Message::DeviceEvent => {
                self.device_events.fetch_add(1, Ordering::AcqRel);
                true
            }
            Message::CloseDsReq | Message::CloseDsOk => {
                self.emit(SessionEvent::CloseRequested { message });
                false
            }
            other => {
                debug!(message = %other, "ignoring driver message");
                false
            }
        }
    }

    pub(crate) fn pending_device_events(&self) -> usize {
        self.device_events.load(Ordering::Acquire)
    }

    /// Hand one latched device event to the callback. Each event is consumed
    /// exactly once, even with no callback registered.
    pub(crate) fn drain_device_event(&self) {
        let taken = self
            .device_events
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
        let Ok(before) = taken else {
            return;
        };

        let callback = lock(&self.callbacks).device_event.take();
        let status = match callback {
            Some(mut callback) => {
                let status = callback();
                lock(&self.callbacks).device_event.get_or_insert(callback);
                status
            }
            None => Status::Success,
        };
        self.emit(SessionEvent::DeviceEvent {
            status,
            remaining: before - 1,
        });
    }

    pub(crate) fn scan_due(&self) -> bool {
        self.phase() >= SessionPhase::Enabled && lock(&self.callbacks).scan.is_some()
    }

    pub(crate) fn run_scan(&self, closing: bool) {
        let Some(mut callback) = lock(&self.callbacks).scan.take() else {
            return;
        };
        let status = callback(closing);
        if !status.is_success() {
            debug!(status = %status, closing, "scan callback");
        }
        lock(&self.callbacks).scan.get_or_insert(callback);
    }

    pub(crate) fn set_device_event_callback(&self, callback: Option<DeviceEventCallback>) {
        lock(&self.callbacks).device_event = callback;
    }

    pub(crate) fn set_scan_callback(&self, callback: Option<ScanCallback>) {
        lock(&self.callbacks).scan = callback;
    }

    pub(crate) fn clear_callbacks(&self) {
        *lock(&self.callbacks) = Callbacks::default();
    }

    /// Copy `os_event` into the probe buffer, allocating it on first use.
    pub(crate) fn stage_event(&self, os_event: &[u8]) -> Vec<u8> {
        let mut buffer = lock(&self.event_buffer);
        let buffer = buffer.get_or_insert_with(|| Vec::with_capacity(EVENT_BUFFER_SIZE));
        buffer.clear();
        buffer.extend_from_slice(os_event);
        buffer.clone()
    }

    pub(crate) fn release_event_buffer(&self) {
        if lock(&self.event_buffer).take().is_some() {
            debug!("event-probe buffer released");
        }
    }

    pub(crate) fn has_event_buffer(&self) -> bool {
        lock(&self.event_buffer).is_some()
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(text) = panic.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = panic.downcast_ref::<String>() {
        text.clone()
    } else {
        "native call panicked".to_string()
    }
}
