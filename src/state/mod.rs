//! Election State Module
//!
//! The in-process election service and the registrations contenders
//! and listeners use to take part in it.

pub mod election;
mod membership;

pub use election::EmbeddedLeaderService;
pub use membership::{ArbiterSummary, ContenderHandle, ListenerHandle};
