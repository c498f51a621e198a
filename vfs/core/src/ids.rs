//! Core identifier types.

use core::fmt;
use core::num::NonZeroU32;

use serde::{Deserialize, Serialize};

/// Identity of a cached file node.
///
/// `0` is reserved for "unset/invalid". Ids are handed out by the persistent
/// records so the same path keeps the same id across process restarts.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[repr(transparent)]
pub struct NodeId(NonZeroU32);

impl NodeId {
    /// Create a node id from a raw value (must be non-zero).
    #[inline]
    pub fn new(raw: u32) -> Option<Self> {
        NonZeroU32::new(raw).map(Self)
    }

    /// Get the raw node id value.
    #[inline]
    pub fn get(self) -> u32 {
        self.0.get()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identifier of a refresh session, unique per process.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct SessionId(pub u64);
