//! # Gossip Events
//!
//! The shadow graph treats an event as an opaque, immutable record with a
//! stable hash, a generation and up to two parent references. [`DagEvent`]
//! is that boundary; [`GossipEvent`] is the concrete record used by the
//! simulator and tests.
//!
//! ```text
//!   creator A          creator B
//!
//!   a2 ◄──────────┐
//!   │ self-parent  │ other-parent
//!   a1             b1
//! ```

use serde::{Deserialize, Serialize};

use crate::types::{constants, CreatorId, EventDescriptor, EventHash, Generation};

/// An event as seen by the shadow graph
pub trait DagEvent: Send + Sync + 'static {
    /// Stable hash identifying the event
    fn hash(&self) -> EventHash;

    /// Generation assigned by consensus
    fn generation(&self) -> Generation;

    /// Previous event by the same creator
    fn self_parent(&self) -> Option<EventDescriptor>;

    /// Event from another creator that triggered this one
    fn other_parent(&self) -> Option<EventDescriptor>;

    /// Node that created the event
    fn creator(&self) -> CreatorId;

    /// Hash and generation in one value
    fn descriptor(&self) -> EventDescriptor {
        EventDescriptor::new(self.hash(), self.generation())
    }
}

/// A gossip event in the DAG
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GossipEvent {
    /// Unique event hash (hash of content)
    hash: EventHash,

    /// Node that created this event
    creator: CreatorId,

    /// 1 + max(parent generations), or FIRST_GENERATION with no parents
    generation: Generation,

    /// Self-parent (previous event from same creator)
    self_parent: Option<EventDescriptor>,

    /// Other-parent (event from another node that triggered this gossip)
    other_parent: Option<EventDescriptor>,

    /// Application payload, opaque here
    payload: Vec<u8>,

    /// Creation timestamp (unix millis)
    timestamp: i64,
}

impl GossipEvent {
    /// Create a genesis event with no parents
    pub fn genesis(creator: CreatorId, payload: Vec<u8>) -> Self {
        Self::build(creator, constants::FIRST_GENERATION, None, None, payload)
    }

    /// Create a new event from its parents
    pub fn child(
        creator: CreatorId,
        self_parent: Option<EventDescriptor>,
        other_parent: Option<EventDescriptor>,
        payload: Vec<u8>,
    ) -> Self {
        let generation = self_parent
            .iter()
            .chain(other_parent.iter())
            .map(|p| p.generation + 1)
            .max()
            .unwrap_or(constants::FIRST_GENERATION);
        Self::build(creator, generation, self_parent, other_parent, payload)
    }

    /// Create an event with an explicit generation.
    ///
    /// Generations normally come from consensus; this lets a caller replay
    /// exactly what consensus assigned.
    pub fn with_generation(
        creator: CreatorId,
        generation: Generation,
        self_parent: Option<EventDescriptor>,
        other_parent: Option<EventDescriptor>,
        payload: Vec<u8>,
    ) -> Self {
        Self::build(creator, generation, self_parent, other_parent, payload)
    }

    fn build(
        creator: CreatorId,
        generation: Generation,
        self_parent: Option<EventDescriptor>,
        other_parent: Option<EventDescriptor>,
        payload: Vec<u8>,
    ) -> Self {
        let timestamp = chrono::Utc::now().timestamp_millis();
        let hash = Self::compute_hash(
            &creator,
            generation,
            self_parent.as_ref(),
            other_parent.as_ref(),
            &payload,
            timestamp,
        );

        Self {
            hash,
            creator,
            generation,
            self_parent,
            other_parent,
            payload,
            timestamp,
        }
    }

    /// Compute event hash
    fn compute_hash(
        creator: &CreatorId,
        generation: Generation,
        self_parent: Option<&EventDescriptor>,
        other_parent: Option<&EventDescriptor>,
        payload: &[u8],
        timestamp: i64,
    ) -> EventHash {
        let mut hasher = blake3::Hasher::new();
        hasher.update(creator.as_bytes());
        hasher.update(&generation.to_le_bytes());
        for parent in [self_parent, other_parent] {
            match parent {
                Some(p) => {
                    hasher.update(&[1]);
                    hasher.update(p.hash.as_bytes());
                    hasher.update(&p.generation.to_le_bytes());
                }
                None => {
                    hasher.update(&[0]);
                }
            }
        }
        hasher.update(&(payload.len() as u64).to_le_bytes());
        hasher.update(payload);
        hasher.update(&timestamp.to_le_bytes());
        EventHash::new(*hasher.finalize().as_bytes())
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    /// Short human readable form for logs
    pub fn to_short_string(&self) -> String {
        format!("({}, g{}) {}", self.creator, self.generation, self.hash)
    }
}

impl DagEvent for GossipEvent {
    fn hash(&self) -> EventHash {
        self.hash
    }

    fn generation(&self) -> Generation {
        self.generation
    }

    fn self_parent(&self) -> Option<EventDescriptor> {
        self.self_parent
    }

    fn other_parent(&self) -> Option<EventDescriptor> {
        self.other_parent
    }

    fn creator(&self) -> CreatorId {
        self.creator
    }
}
