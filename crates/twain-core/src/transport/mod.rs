//! Transport layer module.

pub mod mock;
pub mod traits;

pub use mock::{Invocation, MockTransport, Reply};
pub use traits::{Transport, TransportError};
