//! Capability containers and their codecs.
//!
//! A capability is a negotiable device setting. Its value travels in one of
//! four container shapes; this module converts between the typed form, the
//! native binary layout and the flat comma-separated text form.

pub mod container;
pub mod names;
pub mod text;
pub mod types;

use thiserror::Error;

pub use container::{Capability, Container, Range};
pub use names::CapabilityId;
pub use text::{CapabilityCodec, TextCodec};
pub use types::{ContainerKind, Fix32, Frame, Item, ItemType};

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Empty capability record")]
    Empty,

    #[error("Unknown capability '{0}'")]
    UnknownCapability(String),

    #[error("Unknown container kind '{0}'")]
    UnknownContainer(String),

    #[error("Unknown item type '{0}'")]
    UnknownItemType(String),

    #[error("Capability record needs at least {expected} fields, got {actual}")]
    ShortRecord { expected: usize, actual: usize },

    #[error("Insufficient number of fields for {kind}: expected {expected}, got {actual}")]
    MissingFields {
        kind: ContainerKind,
        expected: usize,
        actual: usize,
    },

    #[error("Too many fields for {kind}: expected {expected}, got {actual}")]
    TrailingFields {
        kind: ContainerKind,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid {field} '{text}'")]
    InvalidField { field: &'static str, text: String },

    #[error("Invalid {item_type} value '{text}'")]
    InvalidValue { item_type: ItemType, text: String },

    #[error("Item of type {actual} in a {expected} container")]
    ItemTypeMismatch { expected: ItemType, actual: ItemType },

    #[error("{0} cannot be carried by a range")]
    NotRangeable(ItemType),

    #[error("{item_type} text is {len} bytes, limit is {max}")]
    StringTooLong {
        item_type: ItemType,
        len: usize,
        max: usize,
    },

    #[error("Enumeration index {index} out of range for {count} items")]
    IndexOutOfRange { index: u32, count: usize },

    #[error("Container buffer too small: expected {expected}, got {actual}")]
    BufferTooSmall { expected: usize, actual: usize },

    #[error("Unterminated quoted field")]
    UnterminatedQuote,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
