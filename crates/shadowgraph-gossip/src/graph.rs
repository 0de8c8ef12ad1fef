//! # Shadow Graph
//!
//! A lightweight replica of the hashgraph used during gossip to work out
//! which events a peer already has. It supports:
//!
//! - insertion of a shadow node for each new event
//! - lookup of shadow nodes and events by hash
//! - ancestor search from a set of nodes
//! - the current tips (nodes with no self-child)
//! - expiry of whole generations once consensus no longer needs them
//! - reservation of a generation so an in-flight sync keeps what it walks
//!
//! ## Expiry window
//!
//! ```text
//!  generation:   0   1   2   3   4   5   6
//!               ─┼───┼───┼───┼───┼───┼───┼─
//!  removed       ███████                       < oldest_generation
//!  reserved              ░░░░░                 held by a reservation
//!  live                      ▒▒▒▒▒▒▒▒▒▒▒▒▒     >= expire_below
//!                        ▲       ▲
//!          oldest_generation   expire_below
//! ```
//!
//! Raising the watermark and physically removing generations are separate
//! steps. Removal always proceeds upwards from `oldest_generation` one bucket
//! at a time and stops at the oldest reserved generation.
//!
//! ## Locking
//!
//! All state sits behind one `RwLock`. Mutations take the write guard;
//! lookups, tips and ancestor search take the read guard. Releasing a
//! reservation touches only the reservation's own counter.

use hashbrown::{HashMap, HashSet};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use shadowgraph_core::{constants, DagEvent, EventDescriptor, EventHash, Generation};
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::config::ShadowGraphConfig;
use crate::error::{Anomaly, ParentKind, Result, ShadowGraphError};
use crate::metrics::ShadowGraphMetrics;
use crate::node::ShadowNode;
use crate::reservation::{GenerationReservation, ReservationSlot};
use crate::targets;

/// Everything guarded by the graph lock
struct GraphState<E> {
    /// Authoritative index; presence here means not expired
    by_hash: HashMap<EventHash, Arc<ShadowNode<E>>>,

    /// Live nodes partitioned by generation
    by_generation: BTreeMap<Generation, Vec<Arc<ShadowNode<E>>>>,

    /// Nodes with no indexed self-child
    tips: HashMap<EventHash, Arc<ShadowNode<E>>>,

    /// Number of indexed nodes naming each hash as their self-parent.
    /// Lets a parent that arrives after its child stay out of the tips.
    self_child_counts: HashMap<EventHash, usize>,

    /// Generations below this should be expired when possible
    expire_below: Generation,

    /// Smallest generation not yet removed
    oldest_generation: Generation,

    /// Reserved generations, ascending
    reservations: VecDeque<Arc<ReservationSlot>>,
}

impl<E: DagEvent> GraphState<E> {
    fn new() -> Self {
        Self {
            by_hash: HashMap::new(),
            by_generation: BTreeMap::new(),
            tips: HashMap::new(),
            self_child_counts: HashMap::new(),
            expire_below: constants::FIRST_GENERATION,
            oldest_generation: constants::FIRST_GENERATION,
            reservations: VecDeque::new(),
        }
    }

    fn is_expired(&self, generation: Generation) -> bool {
        generation < self.oldest_generation
    }

    /// Drop zero-count reservations that are due to go, oldest first.
    ///
    /// Returns the oldest generation that still has an outstanding
    /// reservation, if any.
    fn prune_reservations(&mut self) -> Option<Generation> {
        while let Some(front) = self.reservations.front() {
            if front.count() > 0 {
                return Some(front.generation());
            }
            if front.generation() < self.expire_below {
                self.reservations.pop_front();
            } else {
                break;
            }
        }
        None
    }

    fn oldest_reserved_generation(&self) -> Option<Generation> {
        self.reservations
            .iter()
            .find(|slot| slot.count() > 0)
            .map(|slot| slot.generation())
    }

    /// Remove a single node from every index
    fn expire(&mut self, node: &Arc<ShadowNode<E>>) {
        let hash = node.hash();
        self.by_hash.remove(&hash);
        self.tips.remove(&hash);

        if let Some(self_parent) = node.event().self_parent() {
            self.forget_self_child(self_parent.hash);
        }

        node.disconnect();
    }

    fn forget_self_child(&mut self, parent: EventHash) {
        let Some(count) = self.self_child_counts.get_mut(&parent) else {
            return;
        };
        *count -= 1;
        if *count > 0 {
            return;
        }
        self.self_child_counts.remove(&parent);

        // Only reachable when a child was expired before its self-parent,
        // which consensus should never produce. Keep the tips exact anyway.
        if let Some(parent_node) = self.by_hash.get(&parent) {
            self.tips.insert(parent, parent_node.clone());
        }
    }
}

/// Point-in-time counters for diagnostics
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShadowGraphStats {
    pub events: usize,
    pub tips: usize,
    pub generations: usize,
    pub expire_below: Generation,
    pub oldest_generation: Generation,
    pub oldest_reserved_generation: Option<Generation>,
    pub generations_awaiting_expiry: u64,
    pub reservation_slots: usize,
}

/// Concurrent in-memory replica of the event DAG used by gossip
pub struct ShadowGraph<E> {
    state: RwLock<GraphState<E>>,
    config: ShadowGraphConfig,
    metrics: Option<ShadowGraphMetrics>,
}

impl<E: DagEvent> ShadowGraph<E> {
    /// Create an empty graph without metrics
    pub fn new(config: ShadowGraphConfig) -> Self {
        Self {
            state: RwLock::new(GraphState::new()),
            config,
            metrics: None,
        }
    }

    /// Create an empty graph publishing metrics to `registry`
    pub fn with_registry(
        config: ShadowGraphConfig,
        registry: &prometheus::Registry,
    ) -> prometheus::Result<Self> {
        let metrics = ShadowGraphMetrics::new(registry)?;
        Ok(Self::with_metrics(config, metrics))
    }

    /// Create an empty graph publishing to already registered metrics
    pub fn with_metrics(config: ShadowGraphConfig, metrics: ShadowGraphMetrics) -> Self {
        Self {
            state: RwLock::new(GraphState::new()),
            config,
            metrics: Some(metrics),
        }
    }

    pub fn config(&self) -> &ShadowGraphConfig {
        &self.config
    }

    pub fn metrics(&self) -> Option<&ShadowGraphMetrics> {
        self.metrics.as_ref()
    }

    // ========================================================================
    // INSERTION
    // ========================================================================

    /// Insert a shadow node for `event` and update the tip set.
    ///
    /// Parents that are already indexed are linked. A parent that is neither
    /// indexed nor expired is reported as an anomaly and left unlinked;
    /// gossip may deliver parents after their children.
    pub fn add_event(&self, event: Option<Arc<E>>) -> Result<Arc<ShadowNode<E>>> {
        let Some(event) = event else {
            self.record_rejection(&ShadowGraphError::NullEvent);
            return Err(ShadowGraphError::NullEvent);
        };

        let mut state = self.state.write();
        let result = self.insert_locked(&mut state, event);
        if let Err(err) = &result {
            self.record_rejection(err);
        }
        self.publish_sizes(&state);
        result
    }

    fn insert_locked(
        &self,
        state: &mut GraphState<E>,
        event: Arc<E>,
    ) -> Result<Arc<ShadowNode<E>>> {
        let hash = event.hash();
        let generation = event.generation();

        if state.by_hash.contains_key(&hash) {
            return Err(ShadowGraphError::DuplicateShadowEvent(hash));
        }
        if state.is_expired(generation) {
            return Err(ShadowGraphError::ExpiredEvent {
                hash,
                generation,
                oldest_generation: state.oldest_generation,
            });
        }

        let self_parent = event.self_parent();
        let other_parent = event.other_parent();
        let self_parent_node = self.resolve_parent(state, hash, self_parent, ParentKind::SelfParent);
        let other_parent_node =
            self.resolve_parent(state, hash, other_parent, ParentKind::OtherParent);

        let node = Arc::new(ShadowNode::new(
            event,
            self_parent_node.as_ref(),
            other_parent_node.as_ref(),
        ));

        state.by_hash.insert(hash, node.clone());
        state
            .by_generation
            .entry(generation)
            .or_default()
            .push(node.clone());

        let tips_before = state.tips.len();
        if !state.self_child_counts.contains_key(&hash) {
            state.tips.insert(hash, node.clone());
        }
        if let Some(parent) = self_parent {
            *state.self_child_counts.entry(parent.hash).or_insert(0) += 1;
            state.tips.remove(&parent.hash);
        }

        if let Some(limit) = self.config.tip_limit() {
            let tips = state.tips.len();
            // More tips than nodes is possible without a fork, so only report it
            if tips > limit && tips > tips_before {
                self.report(Anomaly::TipOverflow {
                    tips,
                    network_size: limit,
                });
                debug!(
                    target: targets::SYNC,
                    event = %hash,
                    self_parent_linked = self_parent_node.is_some(),
                    expire_below = state.expire_below,
                    oldest_generation = state.oldest_generation,
                    "tip set after overflow: {:?}",
                    state.tips.keys().collect::<Vec<_>>()
                );
            }
        }

        if let Some(metrics) = &self.metrics {
            metrics.events_inserted.inc();
        }

        Ok(node)
    }

    /// Look up an indexed parent, reporting it if it should be there but isn't
    fn resolve_parent(
        &self,
        state: &GraphState<E>,
        child: EventHash,
        parent: Option<EventDescriptor>,
        kind: ParentKind,
    ) -> Option<Arc<ShadowNode<E>>> {
        let parent = parent?;
        let node = state.by_hash.get(&parent.hash).cloned();
        if node.is_none() && !state.is_expired(parent.generation) {
            self.report(Anomaly::MissingParent {
                event: child,
                parent,
                kind,
            });
        }
        node
    }

    // ========================================================================
    // LOOKUP
    // ========================================================================

    /// The shadow node for `hash`, if indexed
    pub fn shadow(&self, hash: &EventHash) -> Option<Arc<ShadowNode<E>>> {
        self.state.read().by_hash.get(hash).cloned()
    }

    /// The shadow node for `event`, if indexed
    pub fn shadow_of(&self, event: &E) -> Option<Arc<ShadowNode<E>>> {
        self.shadow(&event.hash())
    }

    /// Shadow nodes for each hash, `None` where unknown
    pub fn shadows(&self, hashes: &[EventHash]) -> Vec<Option<Arc<ShadowNode<E>>>> {
        let state = self.state.read();
        hashes
            .iter()
            .map(|hash| state.by_hash.get(hash).cloned())
            .collect()
    }

    /// Shadow nodes for the hashes that are indexed, skipping the rest.
    ///
    /// A peer may refer to events this graph has since expired.
    pub fn shadows_if_present(&self, hashes: &[EventHash]) -> Vec<Arc<ShadowNode<E>>> {
        let state = self.state.read();
        hashes
            .iter()
            .filter_map(|hash| state.by_hash.get(hash).cloned())
            .collect()
    }

    /// The event with `hash`, if indexed
    pub fn get_event(&self, hash: &EventHash) -> Option<Arc<E>> {
        self.state
            .read()
            .by_hash
            .get(hash)
            .map(|node| node.event().clone())
    }

    pub fn is_hash_in_graph(&self, hash: &EventHash) -> bool {
        self.state.read().by_hash.contains_key(hash)
    }

    /// Snapshot of every indexed event
    pub fn get_all_events(&self) -> Vec<Arc<E>> {
        self.state
            .read()
            .by_hash
            .values()
            .map(|node| node.event().clone())
            .collect()
    }

    /// Number of indexed events
    pub fn len(&self) -> usize {
        self.state.read().by_hash.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().by_hash.is_empty()
    }

    // ========================================================================
    // ANCESTOR SEARCH
    // ========================================================================

    /// Ancestors of `roots` that pass `predicate`, found depth-first.
    ///
    /// The roots themselves are not included. A branch stops at a node that
    /// is expired, fails the predicate, or was already found from an earlier
    /// root. The graph's read guard is held for the whole search, so
    /// `predicate` must not call back into this graph.
    pub fn find_ancestors<'a, I, P>(&self, roots: I, predicate: P) -> HashSet<Arc<ShadowNode<E>>>
    where
        I: IntoIterator<Item = &'a Arc<ShadowNode<E>>>,
        P: Fn(&ShadowNode<E>) -> bool,
        E: 'a,
    {
        let state = self.state.read();
        let mut ancestors = HashSet::new();
        // ancestor chains can be arbitrarily deep, so no recursion
        let mut stack: Vec<Arc<ShadowNode<E>>> = Vec::new();

        for root in roots {
            stack.extend(root.parents());

            while let Some(candidate) = stack.pop() {
                if state.is_expired(candidate.generation())
                    || ancestors.contains(&candidate)
                    || !predicate(candidate.as_ref())
                {
                    continue;
                }
                stack.extend(candidate.parents());
                ancestors.insert(candidate);
            }
        }

        ancestors
    }

    // ========================================================================
    // TIPS AND BULK QUERIES
    // ========================================================================

    /// Copy of the current tips; not updated by later changes
    pub fn get_tips(&self) -> Vec<Arc<ShadowNode<E>>> {
        self.state.read().tips.values().cloned().collect()
    }

    pub fn tip_count(&self) -> usize {
        self.state.read().tips.len()
    }

    /// Events with generation in `[start, end)` that pass `predicate`
    pub fn find_by_generation<P>(&self, start: Generation, end: Generation, predicate: P) -> Vec<Arc<E>>
    where
        P: Fn(&E) -> bool,
    {
        if start >= end {
            return Vec::new();
        }
        let state = self.state.read();
        state
            .by_generation
            .range(start..end)
            .flat_map(|(_, nodes)| nodes.iter())
            .filter(|node| predicate(node.event().as_ref()))
            .map(|node| node.event().clone())
            .collect()
    }

    /// Load events after a restart or reconnect.
    ///
    /// Anything already in the graph is discarded first, as by [`clear`](Self::clear).
    /// `events` must be ordered by generation, smallest first. Empty
    /// generation buckets are created down to `min_generation` so expiry
    /// driven by consensus never finds a gap between its watermark and
    /// ours. Individual insertion failures are logged and skipped.
    pub fn init_from_events(&self, events: &[Arc<E>], min_generation: Generation) -> Result<()> {
        let first = events.first().ok_or(ShadowGraphError::EmptyEventBatch)?;

        let mut state = self.state.write();
        self.reset_locked(&mut state);

        // Start at the batch's oldest generation so parents older than the
        // batch count as expired and do not block insertion.
        state.oldest_generation = first.generation();
        state.expire_below = first.generation();

        for event in events {
            if let Err(err) = self.insert_locked(&mut state, event.clone()) {
                self.record_rejection(&err);
                error!(target: targets::STARTUP, error = %err, "unable to insert event");
            }
        }

        while state.expire_below > min_generation {
            state.expire_below -= 1;
            let generation = state.expire_below;
            state.by_generation.entry(generation).or_default();
        }
        state.oldest_generation = state.expire_below;

        self.publish_sizes(&state);
        info!(
            target: targets::STARTUP,
            min_generation,
            oldest_generation = state.oldest_generation,
            events = state.by_hash.len(),
            "shadow graph initialized from events"
        );
        Ok(())
    }

    /// Discard the graph's contents and start over at `generation`; nothing
    /// older will be accepted
    pub fn start_from_generation(&self, generation: Generation) {
        let mut state = self.state.write();
        self.reset_locked(&mut state);
        state.expire_below = generation;
        state.oldest_generation = generation;
        info!(target: targets::STARTUP, generation, "shadow graph starting from generation");
    }

    /// Reset to the constructed state.
    ///
    /// Outstanding reservation handles stay valid but no longer hold
    /// anything back.
    pub fn clear(&self) {
        let mut state = self.state.write();
        self.reset_locked(&mut state);
    }

    fn reset_locked(&self, state: &mut GraphState<E>) {
        if !state.by_hash.is_empty() || !state.reservations.is_empty() {
            warn!(
                target: targets::STARTUP,
                events = state.by_hash.len(),
                reservations = state.reservations.len(),
                "discarding shadow graph contents"
            );
        }
        for node in state.by_hash.values() {
            node.disconnect();
        }
        *state = GraphState::new();
        self.publish_sizes(state);
        if let Some(metrics) = &self.metrics {
            metrics.generations_awaiting_expiry.set(0);
        }
    }

    // ========================================================================
    // RESERVATION AND EXPIRY
    // ========================================================================

    /// Reserve the current `expire_below` generation.
    ///
    /// Nothing at or above the reserved generation is removed until the
    /// returned handle is released or dropped.
    pub fn reserve(&self) -> GenerationReservation {
        let mut state = self.state.write();
        let expire_below = state.expire_below;

        if let Some(last) = state.reservations.back() {
            if last.generation() == expire_below {
                last.acquire();
                return GenerationReservation::new(last.clone());
            }
        }

        let slot = Arc::new(ReservationSlot::new(expire_below));
        state.reservations.push_back(slot.clone());
        GenerationReservation::new(slot)
    }

    /// Raise the expiry watermark to `generation` and remove every
    /// generation that is both below it and unreserved.
    ///
    /// The watermark never decreases: a lower `generation` is logged and
    /// ignored.
    pub fn expire_below(&self, generation: Generation) {
        let mut state = self.state.write();

        if generation < state.expire_below {
            self.report(Anomaly::ExpiryRegression {
                requested: generation,
                current: state.expire_below,
            });
            return;
        }

        state.expire_below = generation;

        let oldest_reserved = state
            .prune_reservations()
            .unwrap_or(state.expire_below);
        if let Some(metrics) = &self.metrics {
            metrics
                .generations_awaiting_expiry
                .set(state.expire_below.saturating_sub(oldest_reserved) as i64);
        }

        let min_generation_to_keep = state.expire_below.min(oldest_reserved);
        let mut expired = 0u64;

        if state.oldest_generation < min_generation_to_keep {
            let kept = state.by_generation.split_off(&min_generation_to_keep);
            let removed = std::mem::replace(&mut state.by_generation, kept);

            // next generation a bucket is expected for
            let mut expected = state.oldest_generation;
            for (generation, nodes) in removed {
                if generation > expected {
                    self.report(Anomaly::MissingGenerationBucket {
                        first: expected,
                        last: generation - 1,
                    });
                }
                for node in &nodes {
                    state.expire(node);
                }
                expired += nodes.len() as u64;
                expected = generation + 1;
            }
            if expected < min_generation_to_keep {
                self.report(Anomaly::MissingGenerationBucket {
                    first: expected,
                    last: min_generation_to_keep - 1,
                });
            }
            state.oldest_generation = min_generation_to_keep;
        }

        if let Some(metrics) = &self.metrics {
            metrics.events_expired.inc_by(expired);
        }
        self.publish_sizes(&state);

        debug!(
            target: targets::EXPIRY,
            expire_below = state.expire_below,
            oldest_generation = state.oldest_generation,
            expired,
            "expired generations"
        );
    }

    /// Current expiry watermark
    pub fn expire_below_generation(&self) -> Generation {
        self.state.read().expire_below
    }

    /// Smallest generation not yet removed
    pub fn oldest_generation(&self) -> Generation {
        self.state.read().oldest_generation
    }

    /// Oldest generation with an outstanding reservation
    pub fn oldest_reserved_generation(&self) -> Option<Generation> {
        self.state.read().oldest_reserved_generation()
    }

    /// Generations below the watermark that reservations are keeping alive
    pub fn generations_awaiting_expiry(&self) -> u64 {
        let state = self.state.read();
        let oldest_reserved = state
            .oldest_reserved_generation()
            .unwrap_or(state.expire_below);
        state.expire_below.saturating_sub(oldest_reserved)
    }

    /// Reservation slots still tracked by the graph, released or not
    pub fn reservation_count(&self) -> usize {
        self.state.read().reservations.len()
    }

    /// Generations that currently have a bucket, ascending
    pub fn generations(&self) -> Vec<Generation> {
        self.state.read().by_generation.keys().copied().collect()
    }

    pub fn stats(&self) -> ShadowGraphStats {
        let state = self.state.read();
        let oldest_reserved_generation = state.oldest_reserved_generation();
        ShadowGraphStats {
            events: state.by_hash.len(),
            tips: state.tips.len(),
            generations: state.by_generation.len(),
            expire_below: state.expire_below,
            oldest_generation: state.oldest_generation,
            oldest_reserved_generation,
            generations_awaiting_expiry: state
                .expire_below
                .saturating_sub(oldest_reserved_generation.unwrap_or(state.expire_below)),
            reservation_slots: state.reservations.len(),
        }
    }

    // ========================================================================
    // DIAGNOSTICS
    // ========================================================================

    fn report(&self, anomaly: Anomaly) {
        match &anomaly {
            Anomaly::MissingParent { .. } => {
                warn!(target: targets::SYNC, kind = anomaly.kind(), "{}", anomaly)
            }
            Anomaly::TipOverflow { .. } => {
                info!(target: targets::SYNC, kind = anomaly.kind(), "{}", anomaly)
            }
            Anomaly::MissingGenerationBucket { .. } | Anomaly::ExpiryRegression { .. } => {
                error!(target: targets::EXPIRY, kind = anomaly.kind(), "{}", anomaly)
            }
        }
        if let Some(metrics) = &self.metrics {
            metrics.anomalies.with_label_values(&[anomaly.kind()]).inc();
        }
    }

    fn record_rejection(&self, err: &ShadowGraphError) {
        debug!(target: targets::SYNC, code = err.code(), "{}", err);
        if let Some(metrics) = &self.metrics {
            metrics
                .insertions_rejected
                .with_label_values(&[err.label()])
                .inc();
        }
    }

    fn publish_sizes(&self, state: &GraphState<E>) {
        if let Some(metrics) = &self.metrics {
            metrics.tips.set(state.tips.len() as i64);
            metrics.events.set(state.by_hash.len() as i64);
        }
    }
}

impl<E: DagEvent> Default for ShadowGraph<E> {
    fn default() -> Self {
        Self::new(ShadowGraphConfig::default())
    }
}
