//! Contender and Listener Contracts
//!
//! These traits are implemented by the parties that take part in an
//! election. The service never calls them while holding its own lock;
//! every call is dispatched through the configured [`Executor`](crate::executor::Executor).

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::token::FencingToken;

/// Address and fencing token of a confirmed leader
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LeaderInfo {
    /// Externally reachable address of the leader
    pub address: String,
    /// Token the leader confirmed with
    pub token: FencingToken,
}

impl LeaderInfo {
    pub fn new(address: impl Into<String>, token: FencingToken) -> Self {
        Self {
            address: address.into(),
            token,
        }
    }
}

/// A party competing for leadership
#[async_trait::async_trait]
pub trait LeaderContender: Send + Sync {
    /// Called when this contender is proposed as leader.
    ///
    /// The contender is expected to eventually confirm through its
    /// [`ContenderHandle`](crate::state::ContenderHandle) using `token`.
    async fn grant_leadership(&self, token: FencingToken) -> anyhow::Result<()>;

    /// Called when this contender is deposed, removed, or the service shuts down
    async fn revoke_leadership(&self) -> anyhow::Result<()>;

    /// Called when one of this contender's callbacks failed, or with the
    /// shutdown cause when the service goes away
    fn handle_error(&self, error: &Error);
}

/// A party observing who the leader is
#[async_trait::async_trait]
pub trait LeaderListener: Send + Sync {
    /// Called on every leadership change. `None` means there is no leader.
    async fn notify_leader_address(&self, leader: Option<LeaderInfo>) -> anyhow::Result<()>;

    /// Called when a notification failed, or with the shutdown cause when the
    /// service goes away
    fn handle_error(&self, error: &Error);
}
