//! twain-core: application-side engine for the TWAIN acquisition protocol.
//!
//! Keeps every exchange with the driver manager in protocol order, serializes
//! the single logical session across threads and converts capabilities
//! between their typed, binary and text forms.
//!
//! # Architecture
//!
//! The crate is organized into layers:
//!
//! - **Capability**: container shapes, item types, binary layout, text codec
//! - **Protocol**: code tables, identities, payloads, requests and statuses
//! - **Transport**: native call abstraction (per-platform bindings, mock)
//! - **State**: session phases and the transition table
//! - **Dispatch**: the worker thread every operation funnels through
//! - **Rollback**: drives the session back down to a target phase
//! - **Events**: Observer pattern for UI decoupling
//! - **Session**: configuration and the public API
//!
//! # Example
//!
//! ```no_run
//! use twain_core::capability::CapabilityId;
//! use twain_core::session::{Session, SessionConfig};
//! use twain_core::state::SessionPhase;
//! use twain_core::transport::MockTransport;
//!
//! let config = SessionConfig::default();
//! let transport = MockTransport::with_standard_capabilities(config.platform).unwrap();
//! let mut session = Session::new(config, transport).unwrap();
//!
//! session.open_manager(0).unwrap();
//! session.open_driver(None).unwrap();
//! let (status, text) = session.get_capability_text(CapabilityId::XRESOLUTION).unwrap();
//! println!("{status}: {text:?}");
//!
//! session.rollback(SessionPhase::ManagerLoaded).unwrap();
//! session.shutdown().unwrap();
//! ```

pub mod capability;
pub mod dispatch;
pub mod events;
pub mod protocol;
pub(crate) mod rollback;
pub mod session;
pub mod state;
pub mod transport;

// Re-exports for convenience
pub use capability::{Capability, CapabilityCodec, CapabilityId, CodecError, Container, TextCodec};
pub use events::{LogLevel, NullObserver, SessionEvent, SessionObserver, TracingObserver};
pub use protocol::{Identity, Message, OperationRequest, OperationResult, Payload, Platform, Status};
pub use session::{Session, SessionConfig, SessionError, SessionHandle};
pub use state::SessionPhase;
pub use transport::{MockTransport, Transport, TransportError};
