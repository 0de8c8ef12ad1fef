//! Core type definitions for the shadow graph
//!
//! Identifiers used to address events and their creators, plus the
//! generation number that the expiry window is expressed in.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::CoreError;

/// Generation of an event, assigned externally by consensus.
///
/// Non-decreasing along every parent -> child edge.
pub type Generation = u64;

/// EventHash - Unique identifier for events computed from BLAKE3 hash
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct EventHash {
    /// 256-bit BLAKE3 hash
    hash: [u8; 32],
}

impl EventHash {
    /// Create a new EventHash from raw bytes
    pub fn new(hash: [u8; 32]) -> Self {
        Self { hash }
    }

    /// Create EventHash from content using BLAKE3
    pub fn from_content(content: &[u8]) -> Self {
        let hash = blake3::hash(content);
        Self {
            hash: *hash.as_bytes(),
        }
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.hash
    }

    /// Convert to hex string
    pub fn to_hex(&self) -> String {
        hex::encode(self.hash)
    }

    /// Parse from hex string
    pub fn from_hex(s: &str) -> Result<Self, CoreError> {
        let bytes = hex::decode(s)?;
        let hash: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| CoreError::InvalidLength {
                expected: 32,
                actual: bytes.len(),
            })?;
        Ok(Self { hash })
    }

    /// Zero hash, never produced by BLAKE3 in practice
    pub const ZERO: Self = Self { hash: [0u8; 32] };
}

impl fmt::Debug for EventHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventHash({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for EventHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.to_hex()[..16])
    }
}

/// CreatorId - Identifier of the network node that created an event
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CreatorId {
    /// Derived from public key hash
    id: [u8; 32],
}

impl CreatorId {
    pub fn new(id: [u8; 32]) -> Self {
        Self { id }
    }

    /// Small integer ids are convenient for simulations and tests
    pub fn from_index(index: u64) -> Self {
        let mut id = [0u8; 32];
        id[..8].copy_from_slice(&index.to_be_bytes());
        Self { id }
    }

    pub fn from_public_key(public_key: &[u8]) -> Self {
        let hash = blake3::hash(public_key);
        Self {
            id: *hash.as_bytes(),
        }
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.id
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.id)
    }
}

impl fmt::Debug for CreatorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CreatorId({})", &self.to_hex()[..12])
    }
}

impl fmt::Display for CreatorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.to_hex()[..12])
    }
}

/// How an event refers to one of its parents.
///
/// The parent's generation travels with the hash so a receiver can decide
/// whether a parent it has never seen is missing or simply already expired.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventDescriptor {
    pub hash: EventHash,
    pub generation: Generation,
}

impl EventDescriptor {
    pub fn new(hash: EventHash, generation: Generation) -> Self {
        Self { hash, generation }
    }
}

impl fmt::Display for EventDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.hash, self.generation)
    }
}

/// System constants
pub mod constants {
    use super::Generation;

    /// The generation value for the first event created by a node
    pub const FIRST_GENERATION: Generation = 0;

    /// Default number of nodes assumed when sizing the tip set
    pub const DEFAULT_NETWORK_SIZE: usize = 0;
}
