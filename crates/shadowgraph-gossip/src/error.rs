//! Error and anomaly types for the shadow graph
//!
//! Errors are returned to the caller. Anomalies are conditions the graph
//! tolerates: they are logged and counted, never returned.

use shadowgraph_core::{EventDescriptor, EventHash, Generation};
use std::fmt;
use thiserror::Error;

/// Result type alias for shadow graph operations
pub type Result<T> = std::result::Result<T, ShadowGraphError>;

/// Errors surfaced by shadow graph operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ShadowGraphError {
    /// No event was supplied
    #[error("Cannot insert a null event")]
    NullEvent,

    /// An event with this hash is already indexed
    #[error("Event already in shadow graph: {0}")]
    DuplicateShadowEvent(EventHash),

    /// The event's generation has already been pruned
    #[error("Event {hash} has generation {generation}, below oldest generation {oldest_generation}")]
    ExpiredEvent {
        hash: EventHash,
        generation: Generation,
        oldest_generation: Generation,
    },

    /// `init_from_events` was given nothing to load
    #[error("Cannot initialise shadow graph from an empty event batch")]
    EmptyEventBatch,
}

impl ShadowGraphError {
    /// Numeric code for diagnostics
    pub fn code(&self) -> u32 {
        match self {
            Self::NullEvent => 2001,
            Self::DuplicateShadowEvent(_) => 2002,
            Self::ExpiredEvent { .. } => 2003,
            Self::EmptyEventBatch => 2004,
        }
    }

    /// Stable label used for the rejection counter
    pub fn label(&self) -> &'static str {
        match self {
            Self::NullEvent => "null_event",
            Self::DuplicateShadowEvent(_) => "duplicate_shadow_event",
            Self::ExpiredEvent { .. } => "expired_event",
            Self::EmptyEventBatch => "empty_event_batch",
        }
    }

    /// Whether the caller can drop the event and carry on.
    ///
    /// Duplicates are already known and expired events are too late to
    /// matter; neither should be retried.
    pub fn is_benign(&self) -> bool {
        matches!(
            self,
            Self::DuplicateShadowEvent(_) | Self::ExpiredEvent { .. }
        )
    }
}

/// Which parent link an anomaly refers to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ParentKind {
    SelfParent,
    OtherParent,
}

impl fmt::Display for ParentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SelfParent => write!(f, "self parent"),
            Self::OtherParent => write!(f, "other parent"),
        }
    }
}

/// Conditions the graph records for observability but never fails on
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Anomaly {
    /// A new event names a parent that is neither indexed nor expired.
    /// Expected in gossip when parents arrive out of order.
    #[error("Missing non-expired {kind} {parent} for event {event}")]
    MissingParent {
        event: EventHash,
        parent: EventDescriptor,
        kind: ParentKind,
    },

    /// The tip set grew beyond the number of nodes in the network.
    /// Possible without a fork, but worth a look.
    #[error("Tip set size {tips} exceeds network size {network_size}")]
    TipOverflow { tips: usize, network_size: usize },

    /// Expiry expected generation buckets that do not exist. One report
    /// covers a whole run of consecutive missing generations.
    #[error("There were no events in generations {first}..={last} to expire")]
    MissingGenerationBucket { first: Generation, last: Generation },

    /// Caller asked to move the expiry watermark backwards
    #[error("Request to expire generations below {requested} is less than current {current}, ignoring")]
    ExpiryRegression {
        requested: Generation,
        current: Generation,
    },
}

impl Anomaly {
    /// Stable label used for the anomaly counter
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MissingParent { .. } => "missing_parent",
            Self::TipOverflow { .. } => "tip_overflow",
            Self::MissingGenerationBucket { .. } => "missing_generation_bucket",
            Self::ExpiryRegression { .. } => "expiry_regression",
        }
    }
}
