//! Operation requests, results and statuses.

use std::fmt;

use super::codes::{Category, ConditionCode, DataGroup, Message, ReturnCode};
use super::payload::Payload;

/// Outcome of an operation as seen by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Success,
    /// Generic failure, with the condition code when one was fetched.
    Failure(Option<ConditionCode>),
    /// The driver rejected the operation as out of protocol order.
    SequenceError,
    /// The native call itself faulted.
    Crash,
    UnsupportedPlatform,
    CheckStatus,
    Cancel,
    /// The event probe consumed the OS event.
    EventConsumed,
    /// The OS event did not belong to the driver.
    EventNotConsumed,
    TransferComplete,
    EndOfList,
    /// Any other return code.
    Other(u16),
}

impl Status {
    /// Map a raw return code. Failures carry no condition yet.
    pub fn from_return_code(code: u16) -> Self {
        match ReturnCode::from_code(code) {
            Some(ReturnCode::Success) => Status::Success,
            Some(ReturnCode::Failure) => Status::Failure(None),
            Some(ReturnCode::CheckStatus) => Status::CheckStatus,
            Some(ReturnCode::Cancel) => Status::Cancel,
            Some(ReturnCode::DsEvent) => Status::EventConsumed,
            Some(ReturnCode::NotDsEvent) => Status::EventNotConsumed,
            Some(ReturnCode::XferDone) => Status::TransferComplete,
            Some(ReturnCode::EndOfList) => Status::EndOfList,
            _ => Status::Other(code),
        }
    }

    /// Fold a condition code into a failure.
    pub fn from_condition(condition: ConditionCode) -> Self {
        match condition {
            ConditionCode::SeqError => Status::SequenceError,
            ConditionCode::Bummer => Status::Crash,
            other => Status::Failure(Some(other)),
        }
    }

    pub fn is_success(self) -> bool {
        matches!(self, Status::Success)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Success => write!(f, "success"),
            Status::Failure(Some(cc)) => write!(f, "failure ({cc})"),
            Status::Failure(None) => write!(f, "failure"),
            Status::SequenceError => write!(f, "sequence error"),
            Status::Crash => write!(f, "crash (bummer)"),
            Status::UnsupportedPlatform => write!(f, "unsupported platform"),
            Status::CheckStatus => write!(f, "check status"),
            Status::Cancel => write!(f, "cancel"),
            Status::EventConsumed => write!(f, "event consumed"),
            Status::EventNotConsumed => write!(f, "event not consumed"),
            Status::TransferComplete => write!(f, "transfer complete"),
            Status::EndOfList => write!(f, "end of list"),
            Status::Other(code) => write!(f, "return code {code}"),
        }
    }
}

/// One protocol operation.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationRequest {
    pub group: DataGroup,
    pub category: Category,
    pub message: Message,
    pub payload: Payload,
}

impl OperationRequest {
    pub fn new(group: DataGroup, category: Category, message: Message, payload: Payload) -> Self {
        Self {
            group,
            category,
            message,
            payload,
        }
    }

    pub fn control(category: Category, message: Message, payload: Payload) -> Self {
        Self::new(DataGroup::Control, category, message, payload)
    }

    pub fn image(category: Category, message: Message, payload: Payload) -> Self {
        Self::new(DataGroup::Image, category, message, payload)
    }

    /// Enable with or without UI.
    pub fn is_enable(&self) -> bool {
        self.category == Category::UserInterface
            && matches!(self.message, Message::EnableDs | Message::EnableDsUiOnly)
    }

    /// Operations bound to the OS window thread: the enable/disable UI and
    /// the event probe. They never leave the caller's thread.
    pub fn runs_on_caller_thread(&self) -> bool {
        self.category == Category::UserInterface
            || (self.category == Category::Event && self.message == Message::ProcessEvent)
    }

    /// Operations addressed to the driver manager rather than the driver.
    pub fn targets_manager(&self) -> bool {
        matches!(
            self.category,
            Category::Parent | Category::Identity | Category::EntryPoint
        )
    }
}

impl fmt::Display for OperationRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.group, self.category, self.message)
    }
}

/// Status plus the payload as the driver left it.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationResult {
    pub status: Status,
    pub payload: Payload,
}

impl OperationResult {
    pub fn new(status: Status, payload: Payload) -> Self {
        Self { status, payload }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::payload::UserInterface;

    #[test]
    fn test_status_mapping() {
        assert_eq!(Status::from_return_code(0), Status::Success);
        assert_eq!(Status::from_return_code(1), Status::Failure(None));
        assert_eq!(Status::from_return_code(4), Status::EventConsumed);
        assert_eq!(Status::from_return_code(6), Status::TransferComplete);
        assert_eq!(Status::from_return_code(10), Status::Other(10));
        assert_eq!(Status::from_return_code(0x8001), Status::Other(0x8001));
    }

    #[test]
    fn test_condition_folding() {
        assert_eq!(Status::from_condition(ConditionCode::SeqError), Status::SequenceError);
        assert_eq!(Status::from_condition(ConditionCode::Bummer), Status::Crash);
        assert_eq!(
            Status::from_condition(ConditionCode::PaperJam),
            Status::Failure(Some(ConditionCode::PaperJam))
        );
    }

    #[test]
    fn test_thread_affinity() {
        let enable = OperationRequest::control(
            Category::UserInterface,
            Message::EnableDs,
            Payload::UserInterface(UserInterface::default()),
        );
        assert!(enable.is_enable());
        assert!(enable.runs_on_caller_thread());

        let probe = OperationRequest::control(Category::Event, Message::ProcessEvent, Payload::None);
        assert!(probe.runs_on_caller_thread());

        let get = OperationRequest::control(Category::Capability, Message::Get, Payload::None);
        assert!(!get.runs_on_caller_thread());
        assert!(!get.targets_manager());
        assert_eq!(get.to_string(), "DG_CONTROL/DAT_CAPABILITY/MSG_GET");
    }
}
