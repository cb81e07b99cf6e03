//! Session - the public face of the engine.
//!
//! A [`Session`] owns the worker thread. [`SessionHandle`] is the cloneable,
//! thread-safe way to talk to it; `Session` derefs to its handle so the verbs
//! are available on both.

use std::ops::Deref;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::capability::{Capability, CapabilityCodec, CapabilityId, CodecError, TextCodec};
use crate::dispatch::{DeviceEventCallback, Dispatcher, Engine, ScanCallback};
use crate::events::{SessionObserver, TracingObserver};
use crate::protocol::{
    Category, DataGroup, EventProbe, Identity, Message, NativeTransfer, OperationRequest,
    OperationResult, Payload, PendingXfers, Platform, Status, StatusInfo, UserInterface, Version,
    WindowHandle,
};
use crate::state::SessionPhase;
use crate::transport::Transport;

/// Construction-time and lifecycle failures. Protocol outcomes are never
/// reported here; they come back as a [`Status`].
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Transport does not support platform {0}")]
    UnsupportedPlatform(Platform),

    #[error("Session worker has stopped")]
    WorkerStopped,

    #[error("Failed to spawn session worker: {0}")]
    WorkerSpawn(#[source] std::io::Error),

    #[error("Session worker panicked")]
    WorkerPanicked,

    #[error("Payload '{shape}' does not fit {category}")]
    PayloadMismatch {
        category: Category,
        shape: &'static str,
    },

    #[error("Capability codec error: {0}")]
    Codec(#[from] CodecError),
}

/// Caller identity as written in the configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationInfo {
    pub manufacturer: String,
    pub product_family: String,
    pub product_name: String,
    pub protocol_major: u16,
    pub protocol_minor: u16,
    /// DG_* bits plus feature flags.
    pub supported_groups: u32,
    pub version: Version,
}

impl Default for ApplicationInfo {
    fn default() -> Self {
        Self {
            manufacturer: "twain-rs".into(),
            product_family: "Acquisition".into(),
            product_name: "twain-rs session".into(),
            protocol_major: 2,
            protocol_minor: 4,
            supported_groups: DataGroup::Control.code() | DataGroup::Image.code(),
            version: Version {
                major: 1,
                minor: 0,
                language: 2,
                country: 1,
                info: env!("CARGO_PKG_VERSION").into(),
            },
        }
    }
}

/// Configuration for a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Identity layout and platform the transport is checked against.
    pub platform: Platform,
    /// Fetch a condition code after a generic failure.
    pub auto_status: bool,
    /// Queue poll timeout of the worker while the scan callback is due.
    pub scan_poll_interval_ms: u64,
    pub application: ApplicationInfo,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            platform: Platform::host().unwrap_or(Platform::Windows),
            auto_status: true,
            scan_poll_interval_ms: 10,
            application: ApplicationInfo::default(),
        }
    }
}

impl SessionConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: SessionConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<std::path::Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// The identity the session presents to the driver manager.
    pub fn app_identity(&self) -> Identity {
        let app = &self.application;
        Identity {
            id: 0,
            version: app.version.clone(),
            protocol_major: app.protocol_major,
            protocol_minor: app.protocol_minor,
            supported_groups: app.supported_groups,
            manufacturer: app.manufacturer.clone(),
            product_family: app.product_family.clone(),
            product_name: app.product_name.clone(),
        }
    }
}

/// Cloneable handle to a running session.
#[derive(Clone)]
pub struct SessionHandle {
    dispatcher: Dispatcher,
    codec: Arc<dyn CapabilityCodec>,
}

/// A protocol session with its worker thread.
pub struct Session {
    handle: SessionHandle,
    worker: Option<JoinHandle<()>>,
}

impl Session {
    /// Create a session logging its events through tracing.
    pub fn new<T: Transport + 'static>(config: SessionConfig, transport: T) -> Result<Self, SessionError> {
        Self::with_observer(config, transport, Arc::new(TracingObserver))
    }

    /// Create a session with a custom observer.
    #[instrument(skip_all, fields(platform = %config.platform))]
    pub fn with_observer<T, O>(
        config: SessionConfig,
        transport: T,
        observer: Arc<O>,
    ) -> Result<Self, SessionError>
    where
        T: Transport + 'static,
        O: SessionObserver + 'static,
    {
        if !transport.supports(config.platform) {
            return Err(SessionError::UnsupportedPlatform(config.platform));
        }
        let engine = Engine::new(
            Box::new(transport),
            config.app_identity(),
            config.auto_status,
            observer,
        );
        let poll = Duration::from_millis(config.scan_poll_interval_ms);
        let (dispatcher, worker) = Dispatcher::start(engine, poll)?;
        info!("session started");
        Ok(Self {
            handle: SessionHandle {
                dispatcher,
                codec: Arc::new(TextCodec),
            },
            worker: Some(worker),
        })
    }

    /// Replace the capability text codec.
    pub fn with_codec<C: CapabilityCodec + 'static>(mut self, codec: C) -> Self {
        self.handle.codec = Arc::new(codec);
        self
    }

    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    /// Stop the worker and wait for it. The scan callback sees one last
    /// `closing = true` call; registered callbacks are dropped afterwards.
    pub fn shutdown(&mut self) -> Result<(), SessionError> {
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };
        self.handle.dispatcher.stop(true);
        let joined = worker.join();
        self.handle.dispatcher.clear_callbacks();
        joined.map_err(|_| SessionError::WorkerPanicked)?;
        info!("session shut down");
        Ok(())
    }
}

impl Deref for Session {
    type Target = SessionHandle;

    fn deref(&self) -> &SessionHandle {
        &self.handle
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.worker.is_some() {
            // Signal only; the worker exits on its own.
            self.handle.dispatcher.stop(false);
        }
    }
}

impl SessionHandle {
    /// Run any operation.
    pub fn execute(&self, request: OperationRequest) -> Result<OperationResult, SessionError> {
        self.dispatcher.execute(request)
    }

    /// Drive the session down to `target`; returns the phase reached.
    pub fn rollback(&self, target: SessionPhase) -> Result<SessionPhase, SessionError> {
        self.dispatcher.rollback(target)
    }

    /// Current phase, lock-free.
    pub fn phase(&self) -> SessionPhase {
        self.dispatcher.phase()
    }

    pub fn app_identity(&self) -> Identity {
        self.dispatcher.app_identity()
    }

    /// Identity of the open driver, if any.
    pub fn driver_identity(&self) -> Option<Identity> {
        self.dispatcher.driver_identity()
    }

    pub fn set_device_event_callback<F>(&self, callback: F)
    where
        F: FnMut() -> Status + Send + 'static,
    {
        self.dispatcher
            .set_device_event_callback(Some(Box::new(callback) as DeviceEventCallback));
    }

    pub fn set_scan_callback<F>(&self, callback: F)
    where
        F: FnMut(bool) -> Status + Send + 'static,
    {
        self.dispatcher
            .set_scan_callback(Some(Box::new(callback) as ScanCallback));
    }

    pub fn clear_callbacks(&self) {
        self.dispatcher.clear_callbacks();
    }

    /// Feed a message the driver sent through its callback
    /// (MSG_XFERREADY, MSG_DEVICEEVENT, MSG_CLOSEDSREQ, MSG_CLOSEDSOK).
    pub fn deliver_message(&self, message: Message) {
        self.dispatcher.deliver_message(message);
    }

    /// Latch one device event for the worker to deliver.
    pub fn signal_device_event(&self) {
        self.dispatcher.deliver_message(Message::DeviceEvent);
    }

    /// Offer an OS event to the driver. Runs on the calling thread.
    pub fn process_event(&self, os_event: &[u8]) -> Result<OperationResult, SessionError> {
        let os_event = self.dispatcher.engine().stage_event(os_event);
        self.execute(OperationRequest::control(
            Category::Event,
            Message::ProcessEvent,
            Payload::Event(EventProbe {
                os_event,
                message: None,
            }),
        ))
    }

    pub fn open_manager(&self, parent: WindowHandle) -> Result<OperationResult, SessionError> {
        self.execute(OperationRequest::control(
            Category::Parent,
            Message::OpenDsm,
            Payload::Parent(parent),
        ))
    }

    pub fn close_manager(&self) -> Result<OperationResult, SessionError> {
        self.execute(OperationRequest::control(
            Category::Parent,
            Message::CloseDsm,
            Payload::Parent(self.dispatcher.parent()),
        ))
    }

    /// Open a driver; `None` asks the manager for its default.
    pub fn open_driver(&self, driver: Option<Identity>) -> Result<OperationResult, SessionError> {
        self.execute(OperationRequest::control(
            Category::Identity,
            Message::OpenDs,
            Payload::Identity(driver.unwrap_or_default()),
        ))
    }

    pub fn close_driver(&self) -> Result<OperationResult, SessionError> {
        let driver = self.driver_identity().unwrap_or_else(|| {
            warn!("closing driver without a known identity");
            Identity::default()
        });
        self.execute(OperationRequest::control(
            Category::Identity,
            Message::CloseDs,
            Payload::Identity(driver),
        ))
    }

    /// Enable the driver, with or without its own UI. Runs on the calling
    /// thread.
    pub fn enable(&self, show_ui: bool) -> Result<OperationResult, SessionError> {
        self.user_interface(Message::EnableDs, show_ui)
    }

    /// Show the driver's settings UI only.
    pub fn enable_ui_only(&self) -> Result<OperationResult, SessionError> {
        self.user_interface(Message::EnableDsUiOnly, true)
    }

    pub fn disable(&self) -> Result<OperationResult, SessionError> {
        self.user_interface(Message::DisableDs, false)
    }

    fn user_interface(&self, message: Message, show_ui: bool) -> Result<OperationResult, SessionError> {
        self.execute(OperationRequest::control(
            Category::UserInterface,
            message,
            Payload::UserInterface(UserInterface {
                show_ui,
                modal_ui: false,
                parent: self.dispatcher.parent(),
            }),
        ))
    }

    /// Pull one image through the native transfer.
    pub fn transfer_native(&self) -> Result<OperationResult, SessionError> {
        self.execute(OperationRequest::image(
            Category::ImageNativeXfer,
            Message::Get,
            Payload::NativeTransfer(NativeTransfer::default()),
        ))
    }

    pub fn end_transfer(&self) -> Result<OperationResult, SessionError> {
        self.pending_xfers(Message::EndXfer)
    }

    pub fn reset_transfers(&self) -> Result<OperationResult, SessionError> {
        self.pending_xfers(Message::Reset)
    }

    fn pending_xfers(&self, message: Message) -> Result<OperationResult, SessionError> {
        self.execute(OperationRequest::control(
            Category::PendingXfers,
            message,
            Payload::PendingXfers(PendingXfers::default()),
        ))
    }

    /// Query a capability with MSG_GET, MSG_GETCURRENT, MSG_GETDEFAULT or
    /// MSG_RESET.
    pub fn get_capability(&self, id: CapabilityId, message: Message) -> Result<OperationResult, SessionError> {
        self.execute(OperationRequest::control(
            Category::Capability,
            message,
            Payload::CapabilityQuery(id),
        ))
    }

    pub fn set_capability(&self, capability: Capability) -> Result<OperationResult, SessionError> {
        self.execute(OperationRequest::control(
            Category::Capability,
            Message::Set,
            Payload::Capability(capability),
        ))
    }

    /// MSG_GET of a capability, returned in text form when the driver
    /// answered with one.
    pub fn get_capability_text(&self, id: CapabilityId) -> Result<(Status, Option<String>), SessionError> {
        let result = self.get_capability(id, Message::Get)?;
        let text = match result.payload.as_capability() {
            Some(capability) => Some(self.codec.encode(capability)?),
            None => None,
        };
        Ok((result.status, text))
    }

    /// Decode `text` and send it with MSG_SET.
    pub fn set_capability_text(&self, text: &str) -> Result<OperationResult, SessionError> {
        let capability = self.codec.decode(text)?;
        self.set_capability(capability)
    }

    /// Ask for the condition code of the last failure.
    pub fn status(&self) -> Result<OperationResult, SessionError> {
        self.execute(OperationRequest::control(
            Category::Status,
            Message::Get,
            Payload::Status(StatusInfo::default()),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Mutex, mpsc};
    use std::thread;

    use crate::events::{NullObserver, SessionEvent};
    use crate::protocol::{ConditionCode, ReturnCode};
    use crate::transport::{MockTransport, Reply, TransportError};

    fn config() -> SessionConfig {
        SessionConfig {
            platform: Platform::Windows,
            scan_poll_interval_ms: 1,
            ..SessionConfig::default()
        }
    }

    fn session(mock: &MockTransport) -> Session {
        Session::with_observer(config(), mock.clone(), Arc::new(NullObserver)).unwrap()
    }

    fn open_to(session: &Session, phase: SessionPhase) {
        assert!(session.open_manager(0).unwrap().status.is_success());
        if phase >= SessionPhase::DriverOpen {
            assert!(session.open_driver(None).unwrap().status.is_success());
        }
        if phase >= SessionPhase::Enabled {
            assert!(session.enable(false).unwrap().status.is_success());
        }
        assert_eq!(session.phase(), phase);
    }

    /// Fails the test if two calls are ever inside the transport at once.
    struct OverlapTransport {
        inside: AtomicBool,
        calls: AtomicUsize,
        overlaps: AtomicUsize,
    }

    impl Transport for OverlapTransport {
        fn invoke(
            &self,
            _origin: &mut Identity,
            _destination: Option<&Identity>,
            _request: &mut OperationRequest,
        ) -> Result<u16, TransportError> {
            if self.inside.swap(true, Ordering::SeqCst) {
                self.overlaps.fetch_add(1, Ordering::SeqCst);
            }
            thread::sleep(Duration::from_micros(200));
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inside.store(false, Ordering::SeqCst);
            Ok(ReturnCode::Success.code())
        }
    }

    #[test]
    fn test_session_lifecycle() {
        let mock = MockTransport::with_standard_capabilities(Platform::Windows).unwrap();
        let mut session = session(&mock);
        assert_eq!(session.phase(), SessionPhase::ManagerLoaded);

        open_to(&session, SessionPhase::Enabled);
        assert_eq!(session.app_identity().id, 1);
        assert_eq!(session.driver_identity().map(|d| d.id), Some(7));

        session.disable().unwrap();
        session.close_driver().unwrap();
        assert_eq!(session.driver_identity(), None);
        session.close_manager().unwrap();
        assert_eq!(session.phase(), SessionPhase::ManagerLoaded);
        session.shutdown().unwrap();
    }

    #[test]
    fn test_unsupported_platform_is_rejected() {
        let mock = MockTransport::new(Platform::Linux);
        let err = Session::new(config(), mock).err();
        assert!(matches!(err, Some(SessionError::UnsupportedPlatform(Platform::Windows))));
    }

    #[test]
    fn test_payload_mismatch_is_rejected() {
        let mock = MockTransport::new(Platform::Windows);
        let session = session(&mock);
        let err = session
            .execute(OperationRequest::control(Category::Parent, Message::OpenDsm, Payload::Status(StatusInfo::default())))
            .unwrap_err();
        assert!(matches!(err, SessionError::PayloadMismatch { category: Category::Parent, .. }));
        assert!(mock.calls().is_empty());
    }

    #[test]
    fn test_execute_runs_on_worker_thread() {
        let mock = MockTransport::new(Platform::Windows);
        let session = session(&mock);
        session.open_manager(0).unwrap();
        session.process_event(&[1, 2]).unwrap();
        let calls = mock.invocations();
        assert_ne!(calls[0].thread, thread::current().id());
        // The event probe stays on the caller's thread.
        assert_eq!(calls[1].thread, thread::current().id());
    }

    #[test]
    fn test_concurrent_execute_is_serialized() {
        let overlap = Arc::new(OverlapTransport {
            inside: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
            overlaps: AtomicUsize::new(0),
        });

        let session = Session::with_observer(config(), overlap.clone(), Arc::new(NullObserver)).unwrap();
        thread::scope(|scope| {
            for i in 0..8 {
                let session = &session;
                scope.spawn(move || {
                    for _ in 0..10 {
                        let request = if i % 2 == 0 {
                            OperationRequest::control(Category::Status, Message::Get, Payload::None)
                        } else {
                            // Caller-thread operation mixed in.
                            OperationRequest::control(Category::Event, Message::ProcessEvent, Payload::None)
                        };
                        session.execute(request).unwrap();
                    }
                });
            }
        });
        assert_eq!(overlap.calls.load(Ordering::SeqCst), 80);
        assert_eq!(overlap.overlaps.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_enable_with_latched_transfer_ready() {
        struct LatchingTransport {
            session: Mutex<Option<SessionHandle>>,
            inner: MockTransport,
        }
        impl Transport for LatchingTransport {
            fn invoke(
                &self,
                origin: &mut Identity,
                destination: Option<&Identity>,
                request: &mut OperationRequest,
            ) -> Result<u16, TransportError> {
                if request.is_enable() {
                    // The driver announces a transfer before enable returns.
                    if let Some(handle) = self.session.lock().unwrap().as_ref() {
                        handle.deliver_message(Message::XferReady);
                    }
                }
                self.inner.invoke(origin, destination, request)
            }
        }

        let transport = Arc::new(LatchingTransport {
            session: Mutex::new(None),
            inner: MockTransport::new(Platform::Windows),
        });
        let mut session = Session::with_observer(config(), transport.clone(), Arc::new(NullObserver)).unwrap();
        *transport.session.lock().unwrap() = Some(session.handle());

        open_to(&session, SessionPhase::DriverOpen);
        assert!(session.enable(false).unwrap().status.is_success());
        assert_eq!(session.phase(), SessionPhase::TransferReady);

        transport.session.lock().unwrap().take();
        session.shutdown().unwrap();
    }

    #[test]
    fn test_transfer_loop() {
        let mock = MockTransport::new(Platform::Windows);
        mock.set_pending_transfers(2);
        let session = session(&mock);
        open_to(&session, SessionPhase::Enabled);

        // Enable queued a transfer-ready message for the event probe.
        let polled = session.process_event(&[0]).unwrap();
        assert_eq!(polled.status, Status::EventConsumed);
        assert_eq!(session.phase(), SessionPhase::TransferReady);

        let image = session.transfer_native().unwrap();
        assert_eq!(image.status, Status::TransferComplete);
        assert_eq!(session.phase(), SessionPhase::Transferring);

        let end = session.end_transfer().unwrap();
        assert_eq!(end.payload.as_pending_xfers().map(|p| p.count), Some(1));
        assert_eq!(session.phase(), SessionPhase::TransferReady);

        session.transfer_native().unwrap();
        session.end_transfer().unwrap();
        assert_eq!(session.phase(), SessionPhase::Enabled);
    }

    #[test]
    fn test_device_event_delivered_once() {
        let mock = MockTransport::new(Platform::Windows);
        let session = session(&mock);
        let (tx, rx) = mpsc::channel();
        session.set_device_event_callback(move || {
            tx.send(()).unwrap();
            Status::Success
        });

        session.signal_device_event();
        session.signal_device_event();
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        rx.recv_timeout(Duration::from_secs(5)).unwrap();

        // Let the worker spin a few more iterations.
        for _ in 0..5 {
            session.status().unwrap();
        }
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
    }

    #[test]
    fn test_scan_callback_runs_while_enabled() {
        let mock = MockTransport::new(Platform::Windows);
        let mut session = session(&mock);
        let (tx, rx) = mpsc::channel();
        session.set_scan_callback(move |closing| {
            let _ = tx.send(closing);
            Status::Success
        });

        open_to(&session, SessionPhase::Enabled);
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)), Ok(false));

        session.shutdown().unwrap();
        assert!(rx.try_iter().any(|closing| closing));
        assert!(matches!(session.status(), Err(SessionError::WorkerStopped)));
    }

    #[test]
    fn test_drop_stops_worker_while_handles_live() {
        let mock = MockTransport::new(Platform::Windows);
        let session = session(&mock);
        open_to(&session, SessionPhase::Enabled);
        let (tx, rx) = mpsc::channel();
        session.set_scan_callback(move |closing| {
            let _ = tx.send(closing);
            Status::Success
        });

        let handle = session.handle();
        // Keep the queue slot busy around teardown.
        handle.deliver_message(Message::DeviceEvent);
        drop(session);
        handle.deliver_message(Message::DeviceEvent);

        let closed = loop {
            match rx.recv_timeout(Duration::from_secs(5)) {
                Ok(true) => break true,
                Ok(false) => continue,
                Err(_) => break false,
            }
        };
        assert!(closed);
        // The closing call is the last one.
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
        assert!(matches!(handle.status(), Err(SessionError::WorkerStopped)));
    }

    #[test]
    fn test_scan_callback_can_reenter() {
        let mock = MockTransport::new(Platform::Windows);
        mock.set_pending_transfers(1);
        let mut session = session(&mock);
        open_to(&session, SessionPhase::Enabled);

        let handle = session.handle();
        let (tx, rx) = mpsc::channel();
        session.set_scan_callback(move |closing| {
            if !closing && handle.phase() == SessionPhase::Enabled {
                let polled = handle.process_event(&[]);
                let _ = tx.send(polled.map(|r| r.status).ok());
            }
            Status::Success
        });
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), Some(Status::EventConsumed));
        assert_eq!(session.phase(), SessionPhase::TransferReady);
        session.shutdown().unwrap();
    }

    #[test]
    fn test_rollback_through_session() {
        let mock = MockTransport::new(Platform::Windows);
        mock.set_pending_transfers(1);
        let session = session(&mock);
        open_to(&session, SessionPhase::Enabled);
        session.process_event(&[0]).unwrap();
        session.transfer_native().unwrap();
        assert_eq!(session.phase(), SessionPhase::Transferring);

        mock.script(Category::UserInterface, Message::DisableDs, Reply::Fail(ConditionCode::SeqError));
        assert_eq!(session.rollback(SessionPhase::ManagerLoaded).unwrap(), SessionPhase::ManagerLoaded);
        assert_eq!(session.phase(), SessionPhase::ManagerLoaded);
        assert_eq!(session.driver_identity(), None);
    }

    #[test]
    fn test_rollback_past_failed_close_clears_driver() {
        let mock = MockTransport::new(Platform::Windows);
        let session = session(&mock);
        open_to(&session, SessionPhase::DriverOpen);
        mock.script(Category::Identity, Message::CloseDs, Reply::Fail(ConditionCode::Bummer));

        assert_eq!(session.rollback(SessionPhase::ManagerLoaded).unwrap(), SessionPhase::ManagerLoaded);
        assert_eq!(session.driver_identity(), None);

        // Reopening picks up the identity the driver hands out now.
        mock.set_driver_identity(Identity {
            id: 8,
            product_name: "Second Scanner".into(),
            ..Identity::default()
        });
        open_to(&session, SessionPhase::DriverOpen);
        assert_eq!(session.driver_identity().map(|d| d.id), Some(8));
    }

    #[test]
    fn test_capability_text_round_trip() {
        let mock = MockTransport::with_standard_capabilities(Platform::Windows).unwrap();
        let session = session(&mock);
        open_to(&session, SessionPhase::DriverOpen);

        let result = session.set_capability_text("ICAP_XFERMECH,TWON_ONEVALUE,TWTY_UINT16,2").unwrap();
        assert!(result.status.is_success());
        let (status, text) = session.get_capability_text(CapabilityId::XFERMECH).unwrap();
        assert!(status.is_success());
        assert_eq!(text.as_deref(), Some("ICAP_XFERMECH,TWON_ONEVALUE,TWTY_UINT16,2"));

        let (status, text) = session.get_capability_text(CapabilityId(0x8001)).unwrap();
        assert_eq!(status, Status::Failure(Some(ConditionCode::CapUnsupported)));
        assert_eq!(text, None);

        assert!(matches!(
            session.set_capability_text("ICAP_XFERMECH,TWON_ARRAY"),
            Err(SessionError::Codec(_))
        ));
    }

    #[test]
    fn test_close_request_is_reported() {
        #[derive(Default)]
        struct Recorder(Mutex<Vec<SessionEvent>>);
        impl SessionObserver for Recorder {
            fn on_event(&self, event: &SessionEvent) {
                self.0.lock().unwrap().push(event.clone());
            }
        }

        let recorder = Arc::new(Recorder::default());
        let mock = MockTransport::new(Platform::Windows);
        let session = Session::with_observer(config(), mock, recorder.clone()).unwrap();
        session.deliver_message(Message::CloseDsReq);
        assert!(recorder.0.lock().unwrap().contains(&SessionEvent::CloseRequested {
            message: Message::CloseDsReq
        }));
    }

    #[test]
    fn test_config_toml_round_trip() {
        let path = std::env::temp_dir().join(format!("twain-session-{}.toml", std::process::id()));
        let config = SessionConfig {
            platform: Platform::Macosx,
            auto_status: false,
            application: ApplicationInfo {
                product_name: "Scan Tool".into(),
                ..ApplicationInfo::default()
            },
            ..SessionConfig::default()
        };
        config.save_to_file(&path).unwrap();

        let loaded = SessionConfig::load_from_file(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(loaded.platform, Platform::Macosx);
        assert!(!loaded.auto_status);
        assert_eq!(loaded.app_identity().product_name, "Scan Tool");

        let partial: SessionConfig = toml::from_str("auto_status = false").unwrap();
        assert_eq!(partial.scan_poll_interval_ms, 10);
    }
}
