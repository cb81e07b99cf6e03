//! Protocol module - codes, identities, payloads and requests.

pub mod codes;
pub mod identity;
pub mod payload;
pub mod request;
pub(crate) mod wire;

pub use codes::{Category, ConditionCode, DataGroup, Message, ReturnCode};
pub use identity::{Identity, IdentityError, Platform, Version};
pub use payload::{
    CallbackRegistration, DeviceEvent, EventProbe, ImageInfo, ImageLayout, ImageMemXfer,
    NativeTransfer, Payload, PendingXfers, SetupFileXfer, SetupMemXfer, StatusInfo, UserInterface,
    WindowHandle,
};
pub use request::{OperationRequest, OperationResult, Status};
