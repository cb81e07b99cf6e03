//! State machine module.

pub mod machine;

pub use machine::{PhaseTracker, ReadySignal, SessionPhase, Transition, transition};
