//! # Shadow Graph Core
//!
//! Leaf types shared by the gossip shadow graph and its collaborators:
//! - `EventHash` - stable identity of an event
//! - `Generation` - the expiry granularity assigned by consensus
//! - `EventDescriptor` - a parent reference (hash + generation)
//! - `DagEvent` - the opaque event boundary
//! - `GossipEvent` - a concrete immutable event record

pub mod error;
pub mod event;
pub mod types;

pub use error::*;
pub use event::*;
pub use types::*;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::error::{CoreError, Result};
    pub use crate::event::{DagEvent, GossipEvent};
    pub use crate::types::*;
}
