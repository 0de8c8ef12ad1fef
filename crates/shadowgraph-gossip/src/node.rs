//! Shadow node - one event's place in the shadow graph
//!
//! Parent links are `Weak`: the graph's indices are the only owners of a
//! node, so removing a node from the indices is enough to free it even while
//! its children still point at it. `disconnect` additionally severs the links
//! so a caller still holding an expired node cannot walk into older history.

use parking_lot::Mutex;
use shadowgraph_core::{DagEvent, EventHash, Generation};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Weak};

/// Non-owning links to the parents of a shadow node
struct ParentLinks<E> {
    self_parent: Option<Weak<ShadowNode<E>>>,
    other_parent: Option<Weak<ShadowNode<E>>>,
}

/// A lightweight stand-in for a hashgraph event inside the shadow graph
pub struct ShadowNode<E> {
    event: Arc<E>,
    hash: EventHash,
    generation: Generation,
    links: Mutex<ParentLinks<E>>,
}

impl<E: DagEvent> ShadowNode<E> {
    /// Wrap `event`, linking to whichever parents are already indexed
    pub fn new(
        event: Arc<E>,
        self_parent: Option<&Arc<ShadowNode<E>>>,
        other_parent: Option<&Arc<ShadowNode<E>>>,
    ) -> Self {
        Self {
            hash: event.hash(),
            generation: event.generation(),
            event,
            links: Mutex::new(ParentLinks {
                self_parent: self_parent.map(Arc::downgrade),
                other_parent: other_parent.map(Arc::downgrade),
            }),
        }
    }
}

impl<E> ShadowNode<E> {
    /// The underlying event
    pub fn event(&self) -> &Arc<E> {
        &self.event
    }

    pub fn hash(&self) -> EventHash {
        self.hash
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Self-parent, if linked and still alive
    pub fn self_parent(&self) -> Option<Arc<ShadowNode<E>>> {
        self.links
            .lock()
            .self_parent
            .as_ref()
            .and_then(Weak::upgrade)
    }

    /// Other-parent, if linked and still alive
    pub fn other_parent(&self) -> Option<Arc<ShadowNode<E>>> {
        self.links
            .lock()
            .other_parent
            .as_ref()
            .and_then(Weak::upgrade)
    }

    /// Both parents that are still reachable, self-parent first
    pub fn parents(&self) -> impl Iterator<Item = Arc<ShadowNode<E>>> {
        let links = self.links.lock();
        let self_parent = links.self_parent.as_ref().and_then(Weak::upgrade);
        let other_parent = links.other_parent.as_ref().and_then(Weak::upgrade);
        [self_parent, other_parent].into_iter().flatten()
    }

    /// Whether any parent link is still in place
    pub fn is_connected(&self) -> bool {
        let links = self.links.lock();
        links.self_parent.is_some() || links.other_parent.is_some()
    }

    /// Sever both parent links
    pub fn disconnect(&self) {
        let mut links = self.links.lock();
        links.self_parent = None;
        links.other_parent = None;
    }
}

impl<E> PartialEq for ShadowNode<E> {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash
    }
}

impl<E> Eq for ShadowNode<E> {}

impl<E> Hash for ShadowNode<E> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.hash.hash(state);
    }
}

impl<E> fmt::Debug for ShadowNode<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShadowNode")
            .field("hash", &self.hash)
            .field("generation", &self.generation)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shadowgraph_core::{CreatorId, GossipEvent};

    fn genesis(label: &str) -> Arc<GossipEvent> {
        Arc::new(GossipEvent::genesis(
            CreatorId::from_index(0),
            label.as_bytes().to_vec(),
        ))
    }

    #[test]
    fn test_node_mirrors_event() {
        let event = genesis("a");
        let node = ShadowNode::new(event.clone(), None, None);

        assert_eq!(node.hash(), event.hash());
        assert_eq!(node.generation(), event.generation());
        assert!(!node.is_connected());
    }

    #[test]
    fn test_parent_links_upgrade() {
        let parent = Arc::new(ShadowNode::new(genesis("p"), None, None));
        let other = Arc::new(ShadowNode::new(genesis("o"), None, None));
        let child = ShadowNode::new(genesis("c"), Some(&parent), Some(&other));

        assert_eq!(child.self_parent(), Some(parent.clone()));
        assert_eq!(child.other_parent(), Some(other.clone()));
        assert_eq!(child.parents().count(), 2);
    }

    #[test]
    fn test_links_do_not_keep_parent_alive() {
        let parent = Arc::new(ShadowNode::new(genesis("p"), None, None));
        let child = ShadowNode::new(genesis("c"), Some(&parent), None);

        drop(parent);

        assert!(child.self_parent().is_none());
        assert_eq!(child.parents().count(), 0);
        // the link slot is still set until disconnect
        assert!(child.is_connected());
    }

    #[test]
    fn test_disconnect_severs_links() {
        let parent = Arc::new(ShadowNode::new(genesis("p"), None, None));
        let child = ShadowNode::new(genesis("c"), Some(&parent), Some(&parent));

        child.disconnect();

        assert!(!child.is_connected());
        assert!(child.self_parent().is_none());
        assert!(child.other_parent().is_none());
    }

    #[test]
    fn test_equality_is_by_hash() {
        let event = genesis("same");
        let a = ShadowNode::new(event.clone(), None, None);
        let b = ShadowNode::new(event, None, None);
        assert_eq!(a, b);
    }
}
