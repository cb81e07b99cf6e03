//! Event system for front-end decoupling.
//!
//! Allows a CLI or GUI to follow protocol happenings without tight coupling
//! to the session internals.

use crate::protocol::{Message, Status};
use crate::state::SessionPhase;

/// Log level for events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

/// Events emitted by a session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Phase changed.
    PhaseChanged { from: SessionPhase, to: SessionPhase },
    /// An operation completed.
    Operation { request: String, status: Status },
    /// The native call faulted and was turned into a crash status.
    TransportFault { request: String, message: String },
    /// Transfer-ready arrived during an enable call and was deferred.
    TransferReadyLatched,
    /// A latched device event was handed to the callback.
    DeviceEvent { status: Status, remaining: usize },
    /// The driver asked to be closed.
    CloseRequested { message: Message },
    /// Rollback hit a sequence error and restarted from the top.
    RollbackRestarted { cycle: u32, failed_at: SessionPhase },
    /// Rollback ran out of cycles and forced the phase.
    RollbackForced { target: SessionPhase },
    /// Log message.
    Log { level: LogLevel, message: String },
}

/// Observer trait for receiving session events.
///
/// Implement this trait in your UI layer to receive updates. Events may be
/// emitted from the worker thread or from a caller's thread.
pub trait SessionObserver: Send + Sync {
    /// Called when an event occurs.
    fn on_event(&self, event: &SessionEvent);
}

/// No-op observer that discards all events.
pub struct NullObserver;

impl SessionObserver for NullObserver {
    fn on_event(&self, _event: &SessionEvent) {}
}

/// Observer that logs events using tracing.
pub struct TracingObserver;

impl SessionObserver for TracingObserver {
    fn on_event(&self, event: &SessionEvent) {
        match event {
            SessionEvent::PhaseChanged { from, to } => {
                tracing::info!(from = %from, to = %to, "Phase changed");
            }
            SessionEvent::Operation { request, status } => {
                tracing::debug!(request = %request, status = %status, "Operation");
            }
            SessionEvent::TransportFault { request, message } => {
                tracing::error!(request = %request, "Native call faulted: {}", message);
            }
            SessionEvent::TransferReadyLatched => {
                tracing::debug!("Transfer ready latched during enable");
            }
            SessionEvent::DeviceEvent { status, remaining } => {
                tracing::info!(status = %status, remaining = remaining, "Device event delivered");
            }
            SessionEvent::CloseRequested { message } => {
                tracing::info!(message = %message, "Driver requested close");
            }
            SessionEvent::RollbackRestarted { cycle, failed_at } => {
                tracing::warn!(cycle = cycle, failed_at = %failed_at, "Rollback restarted after sequence error");
            }
            SessionEvent::RollbackForced { target } => {
                tracing::warn!(target = %target, "Rollback exhausted, phase forced");
            }
            SessionEvent::Log { level, message } => match level {
                LogLevel::Trace => tracing::trace!("{}", message),
                LogLevel::Debug => tracing::debug!("{}", message),
                LogLevel::Info => tracing::info!("{}", message),
                LogLevel::Warn => tracing::warn!("{}", message),
                LogLevel::Error => tracing::error!("{}", message),
            },
        }
    }
}
