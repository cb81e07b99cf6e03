//! Native call boundary.
//!
//! Defines the `Transport` trait that carries one protocol operation to the
//! driver manager, allowing different bindings (per platform ABI, mock, etc.).

use std::sync::Arc;

use thiserror::Error;

use crate::protocol::{Identity, IdentityError, OperationRequest, Platform};

#[derive(Error, Debug)]
pub enum TransportError {
    /// The binding cannot make native calls for this platform's ABI.
    #[error("No native binding for {0:?}")]
    Unsupported(Platform),

    #[error("Native call faulted: {0}")]
    Fault(String),

    #[error("Failed to marshal identity: {0}")]
    Marshal(#[from] IdentityError),
}

/// Abstract driver manager entry point.
///
/// Implementations marshal the request into the platform's native layout,
/// make the call and write whatever the driver returned back into
/// `request.payload`.
pub trait Transport: Send + Sync {
    /// Run one operation and return the raw return code (TWRC_*).
    ///
    /// `origin` is the application identity; the manager may assign its id
    /// during open. `destination` is the driver identity, or `None` for
    /// operations addressed to the manager itself.
    fn invoke(
        &self,
        origin: &mut Identity,
        destination: Option<&Identity>,
        request: &mut OperationRequest,
    ) -> Result<u16, TransportError>;

    /// Whether this binding can run on `platform`.
    fn supports(&self, _platform: Platform) -> bool {
        true
    }
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn invoke(
        &self,
        origin: &mut Identity,
        destination: Option<&Identity>,
        request: &mut OperationRequest,
    ) -> Result<u16, TransportError> {
        (**self).invoke(origin, destination, request)
    }

    fn supports(&self, platform: Platform) -> bool {
        (**self).supports(platform)
    }
}
