/// Warm graph store: the context tier.
///
/// A persistent graph of entities, topics, and summary nodes with
/// relationship edges, queried by shortest-path traversal. The warm tier
/// also holds the live copies of warm-resident memory items; nodes act as
/// the index into them via weak back-references.
///
/// ## Structure
///
/// - Entity/topic nodes are one per distinct string per owner: a
///   re-mention increments the node's weight instead of duplicating it.
/// - Summary nodes aggregate multiple related items, never one-to-one.
/// - Edges and node weights are append/update only. Nodes are never hard
///   deleted; when the sole referencing item is purged from all tiers the
///   node is marked orphaned, keeping the graph valid for historical
///   queries.
///
/// ## Retrieval
///
/// `query_context` runs a breadth-first shortest-path traversal from an
/// anchor node (one matching the topic hint, else the most recently
/// updated summary node) out to `max_hops`, ranking reached nodes by
/// weight discounted by path distance, ties broken by most recent update.
use crate::types::{ItemId, MemoryItem, NodeId};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use uuid::Uuid;

/// What a warm-graph node represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    /// A named entity (person, place, product)
    Entity,
    /// A conversational topic
    Topic,
    /// An aggregate of several related items
    Summary,
}

/// The relation carried by a graph edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelationKind {
    /// A turn mentioned both endpoints
    Mentions,
    /// General association
    RelatedTo,
    /// Topic is condensed by a summary node
    SummarizedBy,
    /// Endpoints appeared in the same turn
    CoOccurs,
}

/// A node in the warm context graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    /// Unique node id
    pub node_id: NodeId,
    /// Owning user; traversal never crosses owners
    pub owner_id: String,
    /// Entity, topic, or summary
    pub kind: NodeKind,
    /// Normalized display label (entity/topic string, summary title)
    pub label: String,
    /// Node payload (summary text, entity detail)
    pub payload: String,
    /// Accrued from linked items' importance
    pub weight: f64,
    /// Weak back-reference to the originating item, lookup-only
    pub item_ref: Option<ItemId>,
    /// Last time the node's weight or payload changed
    pub updated_at: DateTime<Utc>,
    /// Set when the sole referencing item was purged from all tiers
    pub orphaned: bool,
}

/// A directed relation between two nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    /// Source node
    pub from: NodeId,
    /// Target node
    pub to: NodeId,
    /// Relation kind
    pub relation: RelationKind,
    /// Relation strength, accrued on re-linking
    pub strength: f64,
}

/// A node returned by `query_context`, with its traversal ranking.
#[derive(Debug, Clone)]
pub struct RankedNode {
    /// The reached node
    pub node: GraphNode,
    /// Hop distance from the anchor (anchor itself is 0)
    pub distance: usize,
    /// Weight discounted by distance; the sort key
    pub score: f64,
}

/// Serializable dump of the warm tier, used by persistence.
#[derive(Debug, Serialize, Deserialize)]
pub struct WarmSnapshot {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
    pub items: Vec<MemoryItem>,
}

/// Warm tier statistics.
#[derive(Debug, Clone)]
pub struct WarmStats {
    pub node_count: usize,
    pub edge_count: usize,
    pub item_count: usize,
    pub orphaned_count: usize,
}

/// The warm graph store.
///
/// Thread-safe via `DashMap`; all mutation is append/update only.
#[derive(Debug, Default)]
pub struct WarmGraph {
    /// All nodes by id
    nodes: DashMap<NodeId, GraphNode>,

    /// Dedup index: (owner, kind, normalized label) → node id
    labels: DashMap<(String, NodeKind, String), NodeId>,

    /// Adjacency: outgoing edges per node
    edges: DashMap<NodeId, Vec<GraphEdge>>,

    /// Reverse adjacency for undirected context traversal
    incoming: DashMap<NodeId, Vec<NodeId>>,

    /// Node ids per owner, in creation order
    owner_nodes: DashMap<String, Vec<NodeId>>,

    /// Live copies of warm-resident items
    items: DashMap<ItemId, MemoryItem>,
}

impl WarmGraph {
    /// Create an empty warm graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a node, or fold into the existing one for the same
    /// (owner, kind, label).
    ///
    /// On dedup the existing node gains `weight` and a fresh `updated_at`;
    /// summary payloads are replaced (a summary is always rebuilt whole).
    pub fn create_node(
        &self,
        owner_id: &str,
        kind: NodeKind,
        label: &str,
        payload: impl Into<String>,
        weight: f64,
        item_ref: Option<ItemId>,
    ) -> NodeId {
        let normalized = normalize(label);
        let index_key = (owner_id.to_string(), kind, normalized.clone());

        if let Some(existing) = self.labels.get(&index_key) {
            let node_id = *existing;
            if let Some(mut node) = self.nodes.get_mut(&node_id) {
                node.weight += weight;
                node.updated_at = Utc::now();
                node.orphaned = false;
                if kind == NodeKind::Summary {
                    node.payload = payload.into();
                }
            }
            return node_id;
        }

        let node_id = Uuid::new_v4();
        let node = GraphNode {
            node_id,
            owner_id: owner_id.to_string(),
            kind,
            label: normalized.clone(),
            payload: payload.into(),
            weight,
            item_ref,
            updated_at: Utc::now(),
            orphaned: false,
        };

        self.nodes.insert(node_id, node);
        self.labels.insert(index_key, node_id);
        self.owner_nodes
            .entry(owner_id.to_string())
            .or_default()
            .push(node_id);

        node_id
    }

    /// Link two nodes. Re-linking the same `(from, to, relation)` adds
    /// `strength` to the existing edge instead of duplicating it.
    pub fn link(&self, from: NodeId, to: NodeId, relation: RelationKind, strength: f64) {
        let mut out = self.edges.entry(from).or_default();

        if let Some(edge) = out
            .iter_mut()
            .find(|e| e.to == to && e.relation == relation)
        {
            edge.strength += strength;
            return;
        }

        out.push(GraphEdge {
            from,
            to,
            relation,
            strength,
        });
        drop(out);

        self.incoming.entry(to).or_default().push(from);
    }

    /// Shortest-path context retrieval.
    ///
    /// Anchors at a node matching `topic_hint` (any kind, label match),
    /// falling back to the owner's most recently updated summary node,
    /// then to the owner's heaviest node. Unknown owners yield an empty
    /// result, not an error.
    pub fn query_context(
        &self,
        owner_id: &str,
        topic_hint: Option<&str>,
        max_hops: usize,
    ) -> Vec<RankedNode> {
        let Some(anchor) = self.find_anchor(owner_id, topic_hint) else {
            return Vec::new();
        };

        // BFS over the undirected view: context flows both ways along an
        // edge even though relations are stored directed.
        let mut distances: HashMap<NodeId, usize> = HashMap::new();
        let mut queue = VecDeque::new();
        distances.insert(anchor, 0);
        queue.push_back(anchor);

        while let Some(current) = queue.pop_front() {
            let hops = distances[&current];
            if hops == max_hops {
                continue;
            }
            for neighbor in self.neighbors(current) {
                if let std::collections::hash_map::Entry::Vacant(slot) =
                    distances.entry(neighbor)
                {
                    slot.insert(hops + 1);
                    queue.push_back(neighbor);
                }
            }
        }

        let mut ranked: Vec<RankedNode> = distances
            .into_iter()
            .filter_map(|(node_id, distance)| {
                let node = self.nodes.get(&node_id)?.clone();
                if node.owner_id != owner_id {
                    return None;
                }
                let score = node.weight / (1.0 + distance as f64);
                Some(RankedNode {
                    node,
                    distance,
                    score,
                })
            })
            .collect();

        ranked.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.node.updated_at.cmp(&a.node.updated_at))
        });

        ranked
    }

    /// Store a warm-resident live item copy.
    pub fn insert_item(&self, item: MemoryItem) {
        self.items.insert(item.id, item);
    }

    /// Remove and return a live item copy (for demotion to Cold).
    pub fn take_item(&self, id: ItemId) -> Option<MemoryItem> {
        self.items.remove(&id).map(|(_, item)| item)
    }

    /// Fetch one live item.
    pub fn get_item(&self, id: ItemId) -> Option<MemoryItem> {
        self.items.get(&id).map(|i| i.clone())
    }

    /// Whether an item's live copy resides in the warm tier.
    pub fn contains_item(&self, id: ItemId) -> bool {
        self.items.contains_key(&id)
    }

    /// Touch one live item and return the touched copy.
    ///
    /// Touch happens in the stored copy before cloning so the update is
    /// observable to later reads (read-triggers-touch semantics).
    pub fn touch_item(&self, id: ItemId, now: DateTime<Utc>) -> Option<MemoryItem> {
        let mut item = self.items.get_mut(&id)?;
        item.touch(now);
        Some(item.clone())
    }

    /// All live items for an owner, untouched (maintenance reads).
    pub fn owner_items(&self, owner_id: &str) -> Vec<MemoryItem> {
        self.items
            .iter()
            .filter(|entry| entry.owner_id == owner_id)
            .map(|entry| entry.clone())
            .collect()
    }

    /// Live items of an owner created before `cutoff` (demotion sweeps).
    pub fn items_older_than(&self, owner_id: &str, cutoff: DateTime<Utc>) -> Vec<MemoryItem> {
        self.items
            .iter()
            .filter(|entry| entry.owner_id == owner_id && entry.created_at < cutoff)
            .map(|entry| entry.clone())
            .collect()
    }

    /// Mark every node whose back-reference is `item_id` as orphaned.
    ///
    /// Called when the item is purged from all tiers. The node itself
    /// survives for historical queries.
    pub fn mark_orphaned(&self, item_id: ItemId) {
        for mut node in self.nodes.iter_mut() {
            if node.item_ref == Some(item_id) {
                node.orphaned = true;
            }
        }
    }

    /// Fetch a node by id.
    pub fn node(&self, id: NodeId) -> Option<GraphNode> {
        self.nodes.get(&id).map(|n| n.clone())
    }

    /// Look up a node id by owner, kind, and label.
    pub fn find_node(&self, owner_id: &str, kind: NodeKind, label: &str) -> Option<NodeId> {
        self.labels
            .get(&(owner_id.to_string(), kind, normalize(label)))
            .map(|id| *id)
    }

    /// Warm tier statistics.
    pub fn stats(&self) -> WarmStats {
        WarmStats {
            node_count: self.nodes.len(),
            edge_count: self.edges.iter().map(|e| e.value().len()).sum(),
            item_count: self.items.len(),
            orphaned_count: self.nodes.iter().filter(|n| n.orphaned).count(),
        }
    }

    /// Dump the warm tier for snapshotting.
    pub(crate) fn export(&self) -> WarmSnapshot {
        WarmSnapshot {
            nodes: self.nodes.iter().map(|n| n.clone()).collect(),
            edges: self
                .edges
                .iter()
                .flat_map(|e| e.value().clone())
                .collect(),
            items: self.items.iter().map(|i| i.clone()).collect(),
        }
    }

    /// Restore the warm tier from a snapshot dump.
    pub(crate) fn import(&self, snapshot: WarmSnapshot) {
        for node in snapshot.nodes {
            let key = (node.owner_id.clone(), node.kind, node.label.clone());
            self.labels.insert(key, node.node_id);
            self.owner_nodes
                .entry(node.owner_id.clone())
                .or_default()
                .push(node.node_id);
            self.nodes.insert(node.node_id, node);
        }
        for edge in snapshot.edges {
            self.incoming.entry(edge.to).or_default().push(edge.from);
            self.edges.entry(edge.from).or_default().push(edge);
        }
        for item in snapshot.items {
            self.items.insert(item.id, item);
        }
    }

    fn neighbors(&self, id: NodeId) -> Vec<NodeId> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();

        if let Some(edges) = self.edges.get(&id) {
            for edge in edges.iter() {
                if seen.insert(edge.to) {
                    out.push(edge.to);
                }
            }
        }
        if let Some(sources) = self.incoming.get(&id) {
            for source in sources.iter() {
                if seen.insert(*source) {
                    out.push(*source);
                }
            }
        }

        out
    }

    fn find_anchor(&self, owner_id: &str, topic_hint: Option<&str>) -> Option<NodeId> {
        if let Some(hint) = topic_hint {
            let normalized = normalize(hint);
            for kind in [NodeKind::Topic, NodeKind::Entity, NodeKind::Summary] {
                if let Some(id) =
                    self.labels
                        .get(&(owner_id.to_string(), kind, normalized.clone()))
                {
                    return Some(*id);
                }
            }
        }

        let ids = self.owner_nodes.get(owner_id)?;

        // No hint (or no match): most recent summary wins, else the
        // heaviest node of any kind.
        let mut best_summary: Option<(DateTime<Utc>, NodeId)> = None;
        let mut heaviest: Option<(f64, NodeId)> = None;

        for id in ids.iter() {
            let Some(node) = self.nodes.get(id) else {
                continue;
            };
            if node.kind == NodeKind::Summary
                && best_summary.map(|(t, _)| node.updated_at > t).unwrap_or(true)
            {
                best_summary = Some((node.updated_at, *id));
            }
            if heaviest.map(|(w, _)| node.weight > w).unwrap_or(true) {
                heaviest = Some((node.weight, *id));
            }
        }

        best_summary.map(|(_, id)| id).or(heaviest.map(|(_, id)| id))
    }
}

fn normalize(label: &str) -> String {
    label.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{TurnContent, TurnSignals};

    fn graph_with_chain() -> (WarmGraph, NodeId, NodeId, NodeId) {
        // career -> resume -> interview, all for alice
        let graph = WarmGraph::new();
        let career = graph.create_node("alice", NodeKind::Topic, "career", "", 6.0, None);
        let resume = graph.create_node("alice", NodeKind::Topic, "resume", "", 4.0, None);
        let interview = graph.create_node("alice", NodeKind::Topic, "interview", "", 8.0, None);
        graph.link(career, resume, RelationKind::RelatedTo, 1.0);
        graph.link(resume, interview, RelationKind::RelatedTo, 1.0);
        (graph, career, resume, interview)
    }

    #[test]
    fn test_create_node_deduplicates_per_owner() {
        let graph = WarmGraph::new();
        let first = graph.create_node("alice", NodeKind::Entity, "Rust", "", 2.0, None);
        let second = graph.create_node("alice", NodeKind::Entity, "  rust ", "", 3.0, None);

        assert_eq!(first, second, "re-mention must not create a duplicate");
        let node = graph.node(first).unwrap();
        assert_eq!(node.weight, 5.0);

        // Different owner gets a fresh node.
        let bobs = graph.create_node("bob", NodeKind::Entity, "Rust", "", 1.0, None);
        assert_ne!(first, bobs);
    }

    #[test]
    fn test_link_accrues_strength() {
        let graph = WarmGraph::new();
        let a = graph.create_node("alice", NodeKind::Topic, "a", "", 1.0, None);
        let b = graph.create_node("alice", NodeKind::Topic, "b", "", 1.0, None);

        graph.link(a, b, RelationKind::RelatedTo, 1.0);
        graph.link(a, b, RelationKind::RelatedTo, 0.5);

        let stats = graph.stats();
        assert_eq!(stats.edge_count, 1, "same relation must merge, not duplicate");
    }

    #[test]
    fn test_query_context_ranks_by_distance_and_weight() {
        let (graph, career, resume, interview) = graph_with_chain();

        let ranked = graph.query_context("alice", Some("career"), 2);
        assert_eq!(ranked.len(), 3);

        // Anchor at distance 0: weight 6.0 / 1 = 6.0 beats
        // interview at distance 2: 8.0 / 3 ≈ 2.67 and resume 4.0 / 2 = 2.0.
        assert_eq!(ranked[0].node.node_id, career);
        assert_eq!(ranked[1].node.node_id, interview);
        assert_eq!(ranked[2].node.node_id, resume);
    }

    #[test]
    fn test_query_context_respects_max_hops() {
        let (graph, _, _, interview) = graph_with_chain();

        let ranked = graph.query_context("alice", Some("career"), 1);
        assert_eq!(ranked.len(), 2);
        assert!(ranked.iter().all(|r| r.node.node_id != interview));
    }

    #[test]
    fn test_query_context_unknown_owner_is_empty() {
        let graph = WarmGraph::new();
        assert!(graph.query_context("nobody", Some("career"), 3).is_empty());
    }

    #[test]
    fn test_anchor_falls_back_to_latest_summary() {
        let graph = WarmGraph::new();
        graph.create_node("alice", NodeKind::Topic, "noise", "", 9.0, None);
        let summary =
            graph.create_node("alice", NodeKind::Summary, "week 12", "career recap", 2.0, None);

        let ranked = graph.query_context("alice", None, 2);
        assert_eq!(ranked[0].node.node_id, summary);
        assert_eq!(ranked[0].distance, 0);
    }

    #[test]
    fn test_traversal_never_crosses_owners() {
        let graph = WarmGraph::new();
        let alice = graph.create_node("alice", NodeKind::Topic, "shared", "", 1.0, None);
        let bob = graph.create_node("bob", NodeKind::Topic, "shared", "", 1.0, None);
        graph.link(alice, bob, RelationKind::RelatedTo, 1.0);

        // Even with a stray structural edge, results are scoped to the
        // querying owner.
        let ranked = graph.query_context("alice", Some("shared"), 3);
        assert_eq!(ranked.len(), 1);
        assert!(ranked.iter().all(|r| r.node.owner_id == "alice"));
    }

    #[test]
    fn test_mark_orphaned_keeps_node() {
        let graph = WarmGraph::new();
        let item = MemoryItem::new(
            "alice",
            "s1",
            TurnContent::text_only("hello"),
            TurnSignals::neutral(),
            5.0,
            Utc::now(),
        );
        let node = graph.create_node(
            "alice",
            NodeKind::Entity,
            "Rust",
            "",
            5.0,
            Some(item.id),
        );

        graph.mark_orphaned(item.id);

        let node = graph.node(node).unwrap();
        assert!(node.orphaned);
        assert_eq!(graph.stats().orphaned_count, 1);
    }

    #[test]
    fn test_touch_item_updates_stored_copy() {
        let graph = WarmGraph::new();
        let mut item = MemoryItem::new(
            "alice",
            "s1",
            TurnContent::text_only("hello"),
            TurnSignals::neutral(),
            5.0,
            Utc::now() - chrono::Duration::hours(2),
        );
        item.last_referenced_at = Utc::now() - chrono::Duration::hours(2);
        let id = item.id;
        graph.insert_item(item);

        let now = Utc::now();
        let touched = graph.touch_item(id, now).unwrap();
        assert_eq!(touched.last_referenced_at, now);
        assert_eq!(graph.get_item(id).unwrap().last_referenced_at, now);
    }

    #[test]
    fn test_items_older_than_filters_by_creation() {
        let graph = WarmGraph::new();
        let now = Utc::now();

        let mut old = MemoryItem::new(
            "alice",
            "s1",
            TurnContent::text_only("old"),
            TurnSignals::neutral(),
            5.0,
            now - chrono::Duration::days(40),
        );
        old.last_referenced_at = now; // recently read, but still old
        let fresh = MemoryItem::new(
            "alice",
            "s1",
            TurnContent::text_only("fresh"),
            TurnSignals::neutral(),
            5.0,
            now,
        );
        graph.insert_item(old);
        graph.insert_item(fresh);

        let cutoff = now - chrono::Duration::days(30);
        let expired = graph.items_older_than("alice", cutoff);
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].content.text, "old");
        assert_eq!(graph.owner_items("alice").len(), 2);
    }

    #[test]
    fn test_export_import_round_trip() {
        let (graph, career, ..) = graph_with_chain();
        let snapshot = graph.export();

        let restored = WarmGraph::new();
        restored.import(snapshot);

        assert_eq!(restored.stats().node_count, 3);
        assert_eq!(restored.stats().edge_count, 2);
        assert_eq!(restored.node(career).unwrap().label, "career");
        assert_eq!(restored.query_context("alice", Some("career"), 2).len(), 3);
    }
}
