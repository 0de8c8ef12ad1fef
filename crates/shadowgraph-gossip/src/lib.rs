//! # Gossip Shadow Graph
//!
//! A concurrent, in-memory replica of the causal event DAG. Gossip uses it to
//! negotiate which events two peers already know; consensus drives its
//! expiry window.
//!
//! ## Components
//!
//! 1. `ShadowNode` - one event plus non-owning links to its parents
//! 2. `ShadowGraph` - hash and generation indices, tips, the expiry
//!    watermark and outstanding reservations
//! 3. `GenerationReservation` - RAII pin on a generation during a sync
//!
//! ## Typical use
//!
//! ```text
//!  gossip thread            consensus thread
//!  ─────────────            ────────────────
//!  add_event(e)             expire_below(g)
//!  r = reserve()
//!  tips = get_tips()
//!  find_ancestors(tips)
//!  drop(r)
//! ```

pub mod config;
pub mod error;
pub mod graph;
pub mod metrics;
pub mod node;
pub mod reservation;

pub use config::ShadowGraphConfig;
pub use error::{Anomaly, ParentKind, Result, ShadowGraphError};
pub use graph::{ShadowGraph, ShadowGraphStats};
pub use metrics::ShadowGraphMetrics;
pub use node::ShadowNode;
pub use reservation::GenerationReservation;

/// Log targets, one per concern
pub mod targets {
    pub const STARTUP: &str = "shadowgraph::startup";
    pub const SYNC: &str = "shadowgraph::sync";
    pub const EXPIRY: &str = "shadowgraph::expiry";
}

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::ShadowGraphConfig;
    pub use crate::error::{Result, ShadowGraphError};
    pub use crate::graph::ShadowGraph;
    pub use crate::node::ShadowNode;
    pub use crate::reservation::GenerationReservation;
    pub use shadowgraph_core::prelude::{DagEvent, EventDescriptor, EventHash, Generation, GossipEvent};
}
