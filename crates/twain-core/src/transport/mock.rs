//! Mock driver manager for testing.
//!
//! Emulates a single driver: a capability store kept as raw binary containers,
//! a pending-transfer counter and a queue of driver messages surfaced through
//! the event probe. Replies can be scripted per (category, message).

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};

use tracing::debug;

use super::traits::{Transport, TransportError};
use crate::capability::{Capability, CapabilityId, CodecError, Container, Fix32, Item, ItemType, Range};
use crate::protocol::{
    Category, ConditionCode, EventProbe, Identity, Message, NativeTransfer, OperationRequest,
    Payload, PendingXfers, Platform, ReturnCode, StatusInfo, Version,
};

/// A scripted answer that replaces the emulated behaviour for one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Return this code and leave the payload untouched.
    Code(ReturnCode),
    /// Fail and report this condition on the next status query.
    Fail(ConditionCode),
    /// The native call itself faults.
    Fault(String),
    /// The native call panics.
    Panic,
    /// The binding refuses the call for its platform.
    Unsupported,
}

/// One recorded call.
#[derive(Debug, Clone)]
pub struct Invocation {
    /// The request as it arrived.
    pub request: OperationRequest,
    /// Driver id, if the call was addressed to the driver.
    pub destination: Option<u64>,
    /// Application identity in the configured platform layout.
    pub origin_wire: Vec<u8>,
    pub thread: ThreadId,
}

#[derive(Debug)]
struct MockState {
    scripted: HashMap<(Category, Message), VecDeque<Reply>>,
    invocations: Vec<Invocation>,
    current: BTreeMap<CapabilityId, Vec<u8>>,
    defaults: BTreeMap<CapabilityId, Vec<u8>>,
    last_condition: ConditionCode,
    pending: u16,
    events: VecDeque<Message>,
    image: Vec<u8>,
    driver: Identity,
}

/// Mock transport for unit testing session logic.
///
/// Clones share state, so a test can keep one handle while the session owns
/// the other.
#[derive(Debug, Clone)]
pub struct MockTransport {
    platform: Platform,
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            state: Arc::new(Mutex::new(MockState {
                scripted: HashMap::new(),
                invocations: Vec::new(),
                current: BTreeMap::new(),
                defaults: BTreeMap::new(),
                last_condition: ConditionCode::Success,
                pending: 0,
                events: VecDeque::new(),
                image: vec![0x42, 0x4D, 0x00, 0x00],
                driver: default_driver(),
            })),
        }
    }

    /// A mock preloaded with a handful of common capabilities.
    pub fn with_standard_capabilities(platform: Platform) -> Result<Self, CodecError> {
        let mock = Self::new(platform);
        for cap in standard_capabilities()? {
            mock.add_capability(&cap)?;
        }
        Ok(mock)
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue a scripted reply for the next matching call.
    pub fn script(&self, category: Category, message: Message, reply: Reply) {
        self.state()
            .scripted
            .entry((category, message))
            .or_default()
            .push_back(reply);
    }

    /// Install a capability; its value also becomes the default.
    pub fn add_capability(&self, capability: &Capability) -> Result<(), CodecError> {
        let bytes = capability.to_bytes()?;
        let mut state = self.state();
        state.defaults.insert(capability.id, bytes.clone());
        state.current.insert(capability.id, bytes);
        Ok(())
    }

    /// Current value as the driver holds it.
    pub fn capability(&self, id: CapabilityId) -> Option<Capability> {
        let bytes = self.state().current.get(&id).cloned()?;
        Capability::from_bytes(&bytes).ok()
    }

    /// Number of transfers the driver will announce once enabled.
    pub fn set_pending_transfers(&self, count: u16) {
        self.state().pending = count;
    }

    pub fn pending_transfers(&self) -> u16 {
        self.state().pending
    }

    /// Queue a driver message for the event probe.
    pub fn queue_event(&self, message: Message) {
        self.state().events.push_back(message);
    }

    /// Payload handed out by native transfers.
    pub fn set_image(&self, data: Vec<u8>) {
        self.state().image = data;
    }

    pub fn set_driver_identity(&self, identity: Identity) {
        self.state().driver = identity;
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.state().invocations.clone()
    }

    /// (category, message) of every call so far.
    pub fn calls(&self) -> Vec<(Category, Message)> {
        self.state()
            .invocations
            .iter()
            .map(|inv| (inv.request.category, inv.request.message))
            .collect()
    }

    pub fn clear_invocations(&self) {
        self.state().invocations.clear();
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new(Platform::host().unwrap_or(Platform::Windows))
    }
}

impl Transport for MockTransport {
    fn invoke(
        &self,
        origin: &mut Identity,
        destination: Option<&Identity>,
        request: &mut OperationRequest,
    ) -> Result<u16, TransportError> {
        let origin_wire = origin.to_bytes(self.platform)?;
        let scripted = {
            let mut state = self.state();
            state.invocations.push(Invocation {
                request: request.clone(),
                destination: destination.map(|d| d.id),
                origin_wire,
                thread: thread::current().id(),
            });
            state
                .scripted
                .get_mut(&(request.category, request.message))
                .and_then(VecDeque::pop_front)
        };

        let code = match scripted {
            Some(Reply::Code(code)) => code,
            Some(Reply::Fail(condition)) => {
                self.state().last_condition = condition;
                ReturnCode::Failure
            }
            Some(Reply::Fault(message)) => return Err(TransportError::Fault(message)),
            Some(Reply::Panic) => panic!("scripted panic in {request}"),
            Some(Reply::Unsupported) => return Err(TransportError::Unsupported(self.platform)),
            None => {
                let mut state = self.state();
                let code = state.emulate(origin, request);
                debug!(%request, rc = %code, "mock driver");
                code
            }
        };
        Ok(code.code())
    }

    fn supports(&self, platform: Platform) -> bool {
        platform == self.platform
    }
}

impl MockState {
    fn fail(&mut self, condition: ConditionCode) -> ReturnCode {
        self.last_condition = condition;
        ReturnCode::Failure
    }

    fn emulate(&mut self, origin: &mut Identity, request: &mut OperationRequest) -> ReturnCode {
        match (request.category, request.message) {
            (Category::Parent, Message::OpenDsm) => {
                if origin.id == 0 {
                    origin.id = 1;
                }
                ReturnCode::Success
            }
            (Category::Parent, Message::CloseDsm) => ReturnCode::Success,
            (Category::Identity, Message::OpenDs | Message::GetFirst | Message::GetDefault) => {
                request.payload = Payload::Identity(self.driver.clone());
                ReturnCode::Success
            }
            (Category::Identity, Message::GetNext) => ReturnCode::EndOfList,
            (Category::Identity, Message::CloseDs) => ReturnCode::Success,
            (Category::Status, Message::Get) => {
                let condition = std::mem::replace(&mut self.last_condition, ConditionCode::Success);
                request.payload = Payload::Status(StatusInfo {
                    condition_code: condition.code(),
                    data: 0,
                });
                ReturnCode::Success
            }
            (Category::Capability, message) => self.capability(message, &mut request.payload),
            (Category::UserInterface, Message::EnableDs | Message::EnableDsUiOnly) => {
                if self.pending > 0 {
                    self.events.push_back(Message::XferReady);
                }
                ReturnCode::Success
            }
            (Category::UserInterface, Message::DisableDs) => ReturnCode::Success,
            (Category::Event, Message::ProcessEvent) => {
                let os_event = match &request.payload {
                    Payload::Event(probe) => probe.os_event.clone(),
                    _ => Vec::new(),
                };
                let message = self.events.pop_front();
                request.payload = Payload::Event(EventProbe { os_event, message });
                if message.is_some() {
                    ReturnCode::DsEvent
                } else {
                    ReturnCode::NotDsEvent
                }
            }
            (Category::PendingXfers, message) => {
                match message {
                    Message::EndXfer => self.pending = self.pending.saturating_sub(1),
                    Message::Reset => self.pending = 0,
                    Message::Get => {}
                    _ => return self.fail(ConditionCode::BadProtocol),
                }
                request.payload = Payload::PendingXfers(PendingXfers {
                    count: self.pending,
                    end_of_job: 0,
                });
                ReturnCode::Success
            }
            (Category::ImageNativeXfer, Message::Get) => {
                request.payload = Payload::NativeTransfer(NativeTransfer {
                    data: self.image.clone(),
                });
                ReturnCode::XferDone
            }
            _ => self.fail(ConditionCode::BadProtocol),
        }
    }

    fn capability(&mut self, message: Message, payload: &mut Payload) -> ReturnCode {
        let id = match payload {
            Payload::CapabilityQuery(id) => *id,
            Payload::Capability(cap) => cap.id,
            _ => return self.fail(ConditionCode::BadValue),
        };

        let bytes = match message {
            Message::Get | Message::GetCurrent => self.current.get(&id).cloned(),
            Message::GetDefault => self.defaults.get(&id).cloned(),
            Message::Reset => {
                let default = self.defaults.get(&id).cloned();
                if let Some(bytes) = &default {
                    self.current.insert(id, bytes.clone());
                }
                default
            }
            Message::Set => {
                let Payload::Capability(cap) = payload else {
                    return self.fail(ConditionCode::BadValue);
                };
                if !self.current.contains_key(&id) {
                    return self.fail(ConditionCode::CapUnsupported);
                }
                match cap.to_bytes() {
                    Ok(bytes) => {
                        self.current.insert(id, bytes);
                        return ReturnCode::Success;
                    }
                    Err(_) => return self.fail(ConditionCode::BadValue),
                }
            }
            _ => return self.fail(ConditionCode::CapBadOperation),
        };

        let Some(bytes) = bytes else {
            return self.fail(ConditionCode::CapUnsupported);
        };
        let Ok(mut cap) = Capability::from_bytes(&bytes) else {
            return self.fail(ConditionCode::Bummer);
        };
        if message == Message::GetCurrent {
            if let Some(current) = cap.container.current().cloned() {
                cap.container = Container::OneValue(current);
            }
        }
        *payload = Payload::Capability(cap);
        ReturnCode::Success
    }
}

fn default_driver() -> Identity {
    Identity {
        id: 7,
        version: Version {
            major: 1,
            minor: 0,
            language: 2,
            country: 1,
            info: "Mock 1.0".into(),
        },
        protocol_major: 2,
        protocol_minor: 4,
        supported_groups: 0x0003,
        manufacturer: "Mock".into(),
        product_family: "Virtual".into(),
        product_name: "Mock Scanner".into(),
    }
}

fn standard_capabilities() -> Result<Vec<Capability>, CodecError> {
    let dpi = |v: i16| Item::Fix32(Fix32::from(v));
    let resolution = |id| {
        Capability::new(
            id,
            Container::Enumeration {
                item_type: ItemType::Fix32,
                current_index: 1,
                default_index: 1,
                items: vec![dpi(100), dpi(200), dpi(300), dpi(600)],
            },
        )
    };
    let brightness = Range::new(
        ItemType::Fix32,
        dpi(-1000),
        dpi(1000),
        dpi(1),
        dpi(0),
        dpi(0),
    )?;

    Ok(vec![
        Capability::one_value(CapabilityId::XFERCOUNT, Item::Int16(-1))?,
        Capability::new(
            CapabilityId::PIXELTYPE,
            Container::Enumeration {
                item_type: ItemType::UInt16,
                current_index: 0,
                default_index: 0,
                items: vec![Item::UInt16(0), Item::UInt16(1), Item::UInt16(2)],
            },
        )?,
        Capability::one_value(CapabilityId::XFERMECH, Item::UInt16(0))?,
        resolution(CapabilityId::XRESOLUTION)?,
        resolution(CapabilityId::YRESOLUTION)?,
        Capability::new(CapabilityId::BRIGHTNESS, Container::Range(brightness))?,
        Capability::new(
            CapabilityId::SUPPORTEDCAPS,
            Container::Array {
                item_type: ItemType::UInt16,
                items: [
                    CapabilityId::XFERCOUNT,
                    CapabilityId::PIXELTYPE,
                    CapabilityId::XFERMECH,
                    CapabilityId::XRESOLUTION,
                    CapabilityId::YRESOLUTION,
                    CapabilityId::BRIGHTNESS,
                ]
                .iter()
                .map(|id| Item::UInt16(id.0))
                .collect(),
            },
        )?,
    ])
}
