//! Fencing Tokens
//!
//! Every leadership proposal gets a fresh 128-bit random token. Contenders
//! confirm with it and guard privileged work with it, so a leader that was
//! replaced can recognise that its token is no longer current.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Fencing token wrapper type
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FencingToken(Uuid);

impl FencingToken {
    /// Mint a new random token
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the underlying UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Get the raw 128-bit value
    pub fn as_u128(&self) -> u128 {
        self.0.as_u128()
    }
}

impl std::fmt::Display for FencingToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for FencingToken {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl From<FencingToken> for Uuid {
    fn from(token: FencingToken) -> Self {
        token.0
    }
}
