//! Typed payload shapes carried by operation requests.

use crate::capability::{Capability, CapabilityId, Fix32, Frame};

use super::codes::{Category, Message};
use super::identity::Identity;

/// Opaque OS window handle (0 where the platform has none).
pub type WindowHandle = usize;

/// Condition block returned by a status query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusInfo {
    pub condition_code: u16,
    pub data: u16,
}

/// Count of transfers the driver still holds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PendingXfers {
    /// Remaining transfers; `0xFFFF` means "unknown, but more".
    pub count: u16,
    pub end_of_job: u32,
}

/// Parameters of enable/disable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UserInterface {
    pub show_ui: bool,
    pub modal_ui: bool,
    pub parent: WindowHandle,
}

/// Event probe: the OS event to inspect and the driver message it carried.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventProbe {
    pub os_event: Vec<u8>,
    pub message: Option<Message>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SetupMemXfer {
    pub min_buffer_size: u32,
    pub max_buffer_size: u32,
    pub preferred: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetupFileXfer {
    pub file_name: String,
    /// File format code (TWFF_*).
    pub format: u16,
}

/// One strip of a buffered memory transfer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageMemXfer {
    pub compression: u16,
    pub bytes_per_row: u32,
    pub columns: u32,
    pub rows: u32,
    pub x_offset: u32,
    pub y_offset: u32,
    pub bytes_written: u32,
    pub memory: Vec<u8>,
}

/// Native transfer: the raw bitmap/TIFF blob handed over by the driver.
/// Decoding it is the caller's business.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NativeTransfer {
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageInfo {
    pub x_resolution: Fix32,
    pub y_resolution: Fix32,
    pub image_width: i32,
    pub image_length: i32,
    pub samples_per_pixel: i16,
    pub bits_per_sample: [i16; 8],
    pub bits_per_pixel: i16,
    pub planar: bool,
    pub pixel_type: i16,
    pub compression: u16,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImageLayout {
    pub frame: Frame,
    pub document_number: u32,
    pub page_number: u32,
    pub frame_number: u32,
}

/// Device event details read back after a device-event notification.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceEvent {
    /// Event code (TWDE_*).
    pub event: u32,
    pub device_name: String,
    pub battery_minutes: u32,
    pub battery_percentage: i16,
    pub power_supply: i32,
}

/// Callback registration block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallbackRegistration {
    pub ref_con: u64,
    pub message: u16,
}

/// Payload of an operation, one shape per category.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Payload {
    #[default]
    None,
    Identity(Identity),
    Parent(WindowHandle),
    CapabilityQuery(CapabilityId),
    Capability(Capability),
    Status(StatusInfo),
    PendingXfers(PendingXfers),
    UserInterface(UserInterface),
    Event(EventProbe),
    SetupMemXfer(SetupMemXfer),
    SetupFileXfer(SetupFileXfer),
    ImageMemXfer(ImageMemXfer),
    NativeTransfer(NativeTransfer),
    ImageInfo(ImageInfo),
    ImageLayout(ImageLayout),
    DeviceEvent(DeviceEvent),
    Callback(CallbackRegistration),
    /// Opaque bytes for categories without a typed shape.
    Raw(Vec<u8>),
}

impl Payload {
    /// Short name of the shape, for logs and errors.
    pub fn shape(&self) -> &'static str {
        match self {
            Payload::None => "none",
            Payload::Identity(_) => "identity",
            Payload::Parent(_) => "parent",
            Payload::CapabilityQuery(_) => "capability-query",
            Payload::Capability(_) => "capability",
            Payload::Status(_) => "status",
            Payload::PendingXfers(_) => "pending-transfers",
            Payload::UserInterface(_) => "user-interface",
            Payload::Event(_) => "event",
            Payload::SetupMemXfer(_) => "setup-memory-transfer",
            Payload::SetupFileXfer(_) => "setup-file-transfer",
            Payload::ImageMemXfer(_) => "image-memory-transfer",
            Payload::NativeTransfer(_) => "native-transfer",
            Payload::ImageInfo(_) => "image-info",
            Payload::ImageLayout(_) => "image-layout",
            Payload::DeviceEvent(_) => "device-event",
            Payload::Callback(_) => "callback",
            Payload::Raw(_) => "raw",
        }
    }

    /// Whether this shape may accompany `category`.
    ///
    /// `None` and `Raw` fit anything; typed shapes only fit their category.
    pub fn fits(&self, category: Category) -> bool {
        match self {
            Payload::None | Payload::Raw(_) => true,
            Payload::Identity(_) => category == Category::Identity,
            Payload::Parent(_) => category == Category::Parent,
            Payload::CapabilityQuery(_) | Payload::Capability(_) => category == Category::Capability,
            Payload::Status(_) => category == Category::Status,
            Payload::PendingXfers(_) => category == Category::PendingXfers,
            Payload::UserInterface(_) => category == Category::UserInterface,
            Payload::Event(_) => category == Category::Event,
            Payload::SetupMemXfer(_) => category == Category::SetupMemXfer,
            Payload::SetupFileXfer(_) => {
                matches!(category, Category::SetupFileXfer | Category::ImageFileXfer)
            }
            Payload::ImageMemXfer(_) => {
                matches!(category, Category::ImageMemXfer | Category::ImageMemFileXfer)
            }
            Payload::NativeTransfer(_) => {
                matches!(category, Category::ImageNativeXfer | Category::AudioNativeXfer)
            }
            Payload::ImageInfo(_) => category == Category::ImageInfo,
            Payload::ImageLayout(_) => category == Category::ImageLayout,
            Payload::DeviceEvent(_) => category == Category::DeviceEvent,
            Payload::Callback(_) => matches!(category, Category::Callback | Category::Callback2),
        }
    }

    pub fn as_capability(&self) -> Option<&Capability> {
        match self {
            Payload::Capability(cap) => Some(cap),
            _ => None,
        }
    }

    pub fn as_identity(&self) -> Option<&Identity> {
        match self {
            Payload::Identity(identity) => Some(identity),
            _ => None,
        }
    }

    pub fn as_pending_xfers(&self) -> Option<&PendingXfers> {
        match self {
            Payload::PendingXfers(pending) => Some(pending),
            _ => None,
        }
    }
}
