//! WolfLeader - Embedded Leader Election
//!
//! An in-process arbiter that selects exactly one leader among a dynamic set
//! of contenders and tells a dynamic set of listeners who the leader is and
//! under which fencing token. It stands in for an external coordination
//! service in single-process deployments and in tests of leader-dependent
//! logic.
//!
//! # Architecture
//!
//! A single [`EmbeddedLeaderService`] owns all election state behind one
//! lock. Contenders and listeners take part through handles, and every
//! callback into them runs on a caller-supplied [`executor::Executor`],
//! never under the lock.
//!
//! # Features
//!
//! - Proposal/confirmation handshake guarded by random 128-bit fencing tokens
//! - Stale confirmations detected and ignored
//! - Lock-free, best-effort "do I still lead" checks
//! - Catch-up notification for listeners that join late
//! - Crash-stop on protocol violations: the whole service shuts down
//! - Parallel (tokio) and serial callback executors

pub mod config;
pub mod error;
pub mod executor;
pub mod leader;
pub mod logging;
pub mod state;
pub mod token;

#[cfg(test)]
mod testing;

pub use config::WolfLeaderConfig;
pub use error::{Error, Result};
pub use state::EmbeddedLeaderService;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::WolfLeaderConfig;
    pub use crate::error::{Error, Result};
    pub use crate::executor::{Completion, Executor, SerialExecutor, TokioExecutor};
    pub use crate::leader::{LeaderContender, LeaderInfo, LeaderListener};
    pub use crate::state::{ArbiterSummary, ContenderHandle, EmbeddedLeaderService, ListenerHandle};
    pub use crate::token::FencingToken;
}
