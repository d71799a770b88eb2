//! Flow identity
//!
//! A [`FlowId`] is the externally supplied, 128-bit opaque identity that ties
//! all rows of one workflow run together across restarts. It carries no
//! meaning to the engine beyond equality and ordering for primary-key lookups.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Externally supplied identity for one workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FlowId(u128);

impl FlowId {
    /// Wrap a raw 128-bit value.
    pub const fn from_u128(value: u128) -> Self {
        Self(value)
    }

    /// The raw 128-bit value.
    pub const fn as_u128(&self) -> u128 {
        self.0
    }
}

impl From<Uuid> for FlowId {
    fn from(id: Uuid) -> Self {
        Self(id.as_u128())
    }
}

impl From<u128> for FlowId {
    fn from(value: u128) -> Self {
        Self(value)
    }
}

impl From<FlowId> for Uuid {
    fn from(id: FlowId) -> Self {
        Uuid::from_u128(id.0)
    }
}

impl fmt::Display for FlowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Uuid::from_u128(self.0))
    }
}
