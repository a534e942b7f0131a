//! Memory graph: durable facts linked by parent/child relations
//!
//! Links are stored on both ends (`parent_ids` on the child, `child_ids` on
//! the parent) and every mutation keeps the two sides in agreement. The data
//! model does not forbid cycles, so traversals carry a visited set and an
//! explicit stack instead of recursing.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::Error;
use crate::storage::SnapshotStore;
use crate::Metadata;

/// A durable fact or concept
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryNode {
    pub id: String,

    pub content: String,

    /// Free-form tag ("fact", "preference", "turn", ...)
    pub node_type: String,

    #[serde(default)]
    pub metadata: Metadata,

    #[serde(default)]
    pub parent_ids: BTreeSet<String>,

    #[serde(default)]
    pub child_ids: BTreeSet<String>,

    pub created_at: DateTime<Utc>,

    pub last_accessed: DateTime<Utc>,

    #[serde(default)]
    pub access_count: u32,
}

impl MemoryNode {
    fn new(id: String, content: String, node_type: String, metadata: Metadata) -> Self {
        let now = Utc::now();
        Self {
            id,
            content,
            node_type,
            metadata,
            parent_ids: BTreeSet::new(),
            child_ids: BTreeSet::new(),
            created_at: now,
            last_accessed: now,
            access_count: 0,
        }
    }

    /// Record an access, incrementing the counter and updating the timestamp
    pub fn record_access(&mut self) {
        self.access_count = self.access_count.saturating_add(1);
        self.last_accessed = Utc::now();
    }
}

/// Result of a best-effort insertion
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddNodeOutcome {
    /// Id of the created node
    pub id: String,

    /// Requested parents that do not exist and were not linked
    pub skipped_parents: Vec<String>,
}

impl AddNodeOutcome {
    /// Whether every requested parent was linked
    pub fn fully_linked(&self) -> bool {
        self.skipped_parents.is_empty()
    }
}

/// Which side of a link is broken
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkSide {
    Parent,
    Child,
}

/// A link recorded on `from` without its reciprocal on `to`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkViolation {
    pub from: String,
    pub to: String,
    /// How `to` is listed on `from`
    pub side: LinkSide,
}

#[derive(Debug, Clone, Copy)]
enum Direction {
    Up,
    Down,
}

/// Node graph with bidirectional links and optional snapshot persistence
pub struct MemoryGraph {
    nodes: HashMap<String, MemoryNode>,
    store: Option<Box<dyn SnapshotStore>>,
}

impl Default for MemoryGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryGraph {
    /// Create an empty, process-lifetime graph
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            store: None,
        }
    }

    /// Create a graph backed by `store`, loading every node verbatim
    pub fn open(store: Box<dyn SnapshotStore>) -> Self {
        let mut graph = Self::new();
        match store.load() {
            Ok(Some(document)) => {
                match serde_json::from_str::<HashMap<String, MemoryNode>>(&document) {
                    Ok(nodes) => {
                        graph.nodes = nodes;
                        let broken = graph.dangling_links();
                        if !broken.is_empty() {
                            warn!(
                                location = %store.describe(),
                                violations = broken.len(),
                                "Loaded memory graph with one-sided links"
                            );
                        }
                        debug!(
                            location = %store.describe(),
                            count = graph.nodes.len(),
                            "Loaded memory graph snapshot"
                        );
                    }
                    Err(e) => warn!(
                        location = %store.describe(),
                        error = %e,
                        "Discarding malformed memory graph snapshot"
                    ),
                }
            }
            Ok(None) => {}
            Err(e) => warn!(
                location = %store.describe(),
                error = %e,
                "Failed to read memory graph snapshot, starting empty"
            ),
        }
        graph.store = Some(store);
        graph
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All nodes, unordered
    pub fn nodes(&self) -> impl Iterator<Item = &MemoryNode> {
        self.nodes.values()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    fn generate_id(&self, node_type: &str) -> String {
        let stamp = Utc::now().timestamp_micros();
        let mut seq = self.nodes.len();
        loop {
            let candidate = format!("{}_{}_{}", node_type, stamp, seq);
            if !self.nodes.contains_key(&candidate) {
                return candidate;
            }
            seq += 1;
        }
    }

    /// Insert a node, linking it under every parent that exists
    ///
    /// Unknown parents are logged and reported in the outcome; they never
    /// fail the insertion.
    pub fn add_node(
        &mut self,
        content: impl Into<String>,
        node_type: impl Into<String>,
        parent_ids: &[String],
        metadata: Metadata,
    ) -> AddNodeOutcome {
        let node_type = node_type.into();
        let id = self.generate_id(&node_type);
        let mut node = MemoryNode::new(id.clone(), content.into(), node_type, metadata);

        let mut skipped_parents = Vec::new();
        for parent_id in parent_ids {
            match self.nodes.get_mut(parent_id) {
                Some(parent) => {
                    parent.child_ids.insert(id.clone());
                    node.parent_ids.insert(parent_id.clone());
                }
                None => {
                    warn!(node_id = %id, parent_id = %parent_id, "Parent not found, skipping link");
                    skipped_parents.push(parent_id.clone());
                }
            }
        }

        debug!(node_id = %id, node_type = %node.node_type, parents = node.parent_ids.len(), "Added node");
        self.nodes.insert(id.clone(), node);
        self.persist();

        AddNodeOutcome {
            id,
            skipped_parents,
        }
    }

    /// Look up a node, recording and persisting the access
    pub fn get_node(&mut self, id: &str) -> Option<&MemoryNode> {
        let Some(node) = self.nodes.get_mut(id) else {
            warn!(node_id = %id, "Node not found");
            return None;
        };
        node.record_access();
        self.persist();
        self.nodes.get(id)
    }

    /// Look up a node without touching its access statistics
    pub fn peek_node(&self, id: &str) -> Option<&MemoryNode> {
        self.nodes.get(id)
    }

    fn neighbours(&self, id: &str, direction: Direction) -> Vec<&MemoryNode> {
        let Some(node) = self.nodes.get(id) else {
            return Vec::new();
        };
        let ids = match direction {
            Direction::Up => &node.parent_ids,
            Direction::Down => &node.child_ids,
        };
        ids.iter().filter_map(|id| self.nodes.get(id)).collect()
    }

    /// Direct children; empty for an unknown id
    pub fn get_children(&self, id: &str) -> Vec<&MemoryNode> {
        self.neighbours(id, Direction::Down)
    }

    /// Direct parents; empty for an unknown id
    pub fn get_parents(&self, id: &str) -> Vec<&MemoryNode> {
        self.neighbours(id, Direction::Up)
    }

    /// Ancestors up to `max_depth` levels, in depth-first order
    pub fn get_ancestors(&self, id: &str, max_depth: usize) -> Vec<&MemoryNode> {
        self.traverse(id, max_depth, Direction::Up)
    }

    /// Descendants down to `max_depth` levels, in depth-first order
    pub fn get_descendants(&self, id: &str, max_depth: usize) -> Vec<&MemoryNode> {
        self.traverse(id, max_depth, Direction::Down)
    }

    /// Depth-first walk with one visited set for the whole traversal.
    ///
    /// The start node counts as visited, so it is never reported as its own
    /// ancestor or descendant even when a cycle leads back to it.
    fn traverse(&self, id: &str, max_depth: usize, direction: Direction) -> Vec<&MemoryNode> {
        let Some(start) = self.nodes.get(id) else {
            return Vec::new();
        };

        let next_ids = |node: &MemoryNode| -> Vec<String> {
            let ids = match direction {
                Direction::Up => &node.parent_ids,
                Direction::Down => &node.child_ids,
            };
            // Reversed so the stack pops them in sorted order
            ids.iter().rev().cloned().collect()
        };

        let mut visited: HashSet<String> = HashSet::new();
        visited.insert(start.id.clone());

        let mut stack: Vec<(String, usize)> =
            next_ids(start).into_iter().map(|next| (next, 1)).collect();
        let mut found = Vec::new();

        while let Some((current, depth)) = stack.pop() {
            if depth > max_depth || visited.contains(&current) {
                continue;
            }
            let Some(node) = self.nodes.get(&current) else {
                debug!(node_id = %current, "Skipping dangling link during traversal");
                continue;
            };
            visited.insert(current);
            found.push(node);

            for next in next_ids(node) {
                if !visited.contains(&next) {
                    stack.push((next, depth + 1));
                }
            }
        }

        found
    }

    /// Every node carrying `node_type`, unordered
    pub fn search_by_type(&self, node_type: &str) -> Vec<&MemoryNode> {
        self.nodes
            .values()
            .filter(|node| node.node_type == node_type)
            .collect()
    }

    /// Case-insensitive substring search scored by match density
    ///
    /// Score is `occurrences / content length` in characters. Nodes without a
    /// match are excluded; ties fall back to creation time, then id.
    pub fn search_by_content(&self, query: &str, limit: usize) -> Vec<(&MemoryNode, f64)> {
        let needle = query.to_lowercase();
        if needle.is_empty() || limit == 0 {
            return Vec::new();
        }

        let mut matches: Vec<(&MemoryNode, f64)> = self
            .nodes
            .values()
            .filter_map(|node| {
                let occurrences = node.content.to_lowercase().matches(&needle).count();
                if occurrences == 0 {
                    return None;
                }
                let length = node.content.chars().count().max(1);
                Some((node, occurrences as f64 / length as f64))
            })
            .collect();

        matches.sort_by(|(a, score_a), (b, score_b)| {
            score_b
                .total_cmp(score_a)
                .then_with(|| a.created_at.cmp(&b.created_at))
                .then_with(|| a.id.cmp(&b.id))
        });
        matches.truncate(limit);
        matches
    }

    /// Replace content and merge metadata keys; `false` for an unknown id
    pub fn update_node(
        &mut self,
        id: &str,
        content: Option<String>,
        metadata: Option<Metadata>,
    ) -> bool {
        let Some(node) = self.nodes.get_mut(id) else {
            warn!(node_id = %id, "Cannot update missing node");
            return false;
        };
        if let Some(content) = content {
            node.content = content;
        }
        if let Some(metadata) = metadata {
            node.metadata.extend(metadata);
        }
        self.persist();
        true
    }

    /// Link `parent_id` → `child_id`; `false` if either end is missing
    pub fn link(&mut self, parent_id: &str, child_id: &str) -> bool {
        if !self.nodes.contains_key(parent_id) || !self.nodes.contains_key(child_id) {
            warn!(parent_id = %parent_id, child_id = %child_id, "Cannot link missing node");
            return false;
        }
        if let Some(parent) = self.nodes.get_mut(parent_id) {
            parent.child_ids.insert(child_id.to_string());
        }
        if let Some(child) = self.nodes.get_mut(child_id) {
            child.parent_ids.insert(parent_id.to_string());
        }
        self.persist();
        true
    }

    /// Remove the `parent_id` → `child_id` link; `false` if it did not exist
    pub fn unlink(&mut self, parent_id: &str, child_id: &str) -> bool {
        let removed_child = self
            .nodes
            .get_mut(parent_id)
            .map(|parent| parent.child_ids.remove(child_id))
            .unwrap_or(false);
        let removed_parent = self
            .nodes
            .get_mut(child_id)
            .map(|child| child.parent_ids.remove(parent_id))
            .unwrap_or(false);

        if removed_child || removed_parent {
            self.persist();
            true
        } else {
            false
        }
    }

    /// Delete a node, optionally with all of its descendants
    ///
    /// Reciprocal links on surviving neighbours are pruned first, so no
    /// dangling reference remains. Returns `false` for an unknown id.
    pub fn delete_node(&mut self, id: &str, recursive: bool) -> bool {
        if !self.nodes.contains_key(id) {
            debug!(node_id = %id, "Delete of unknown node ignored");
            return false;
        }

        if recursive {
            let descendants: Vec<String> = self
                .get_descendants(id, usize::MAX)
                .into_iter()
                .map(|node| node.id.clone())
                .collect();
            for descendant in &descendants {
                self.detach(descendant);
            }
            debug!(node_id = %id, descendants = descendants.len(), "Deleted descendants");
        }

        self.detach(id);
        self.persist();
        true
    }

    fn detach(&mut self, id: &str) {
        let Some(node) = self.nodes.remove(id) else {
            return;
        };
        for parent_id in &node.parent_ids {
            if let Some(parent) = self.nodes.get_mut(parent_id) {
                parent.child_ids.remove(id);
            }
        }
        for child_id in &node.child_ids {
            if let Some(child) = self.nodes.get_mut(child_id) {
                child.parent_ids.remove(id);
            }
        }
    }

    /// Every link whose reciprocal is missing
    pub fn dangling_links(&self) -> Vec<LinkViolation> {
        let mut violations = Vec::new();
        for node in self.nodes.values() {
            for child_id in &node.child_ids {
                let reciprocal = self
                    .nodes
                    .get(child_id)
                    .map(|child| child.parent_ids.contains(&node.id))
                    .unwrap_or(false);
                if !reciprocal {
                    violations.push(LinkViolation {
                        from: node.id.clone(),
                        to: child_id.clone(),
                        side: LinkSide::Child,
                    });
                }
            }
            for parent_id in &node.parent_ids {
                let reciprocal = self
                    .nodes
                    .get(parent_id)
                    .map(|parent| parent.child_ids.contains(&node.id))
                    .unwrap_or(false);
                if !reciprocal {
                    violations.push(LinkViolation {
                        from: node.id.clone(),
                        to: parent_id.clone(),
                        side: LinkSide::Parent,
                    });
                }
            }
        }
        violations
    }

    fn persist(&self) {
        let Some(store) = &self.store else {
            return;
        };
        let ordered: BTreeMap<&String, &MemoryNode> = self.nodes.iter().collect();
        let result = serde_json::to_string(&ordered)
            .map_err(Error::from)
            .and_then(|document| store.save(&document));
        if let Err(e) = result {
            warn!(
                location = %store.describe(),
                error = %e,
                "Failed to persist memory graph, continuing in memory"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{FailingStore, JsonFileStore, SqliteStore};
    use serde_json::json;
    use tempfile::TempDir;

    fn add(graph: &mut MemoryGraph, content: &str, parents: &[&str]) -> String {
        let parents: Vec<String> = parents.iter().map(|p| p.to_string()).collect();
        graph
            .add_node(content, "fact", &parents, Metadata::new())
            .id
    }

    fn ids(nodes: &[&MemoryNode]) -> Vec<String> {
        nodes.iter().map(|n| n.id.clone()).collect()
    }

    #[test]
    fn test_add_links_both_sides() {
        let mut graph = MemoryGraph::new();
        let root = add(&mut graph, "root", &[]);
        let child = add(&mut graph, "child", &[&root]);

        assert!(graph.peek_node(&root).unwrap().child_ids.contains(&child));
        assert!(graph.peek_node(&child).unwrap().parent_ids.contains(&root));
        assert!(graph.dangling_links().is_empty());
    }

    #[test]
    fn test_missing_parent_is_skipped() {
        let mut graph = MemoryGraph::new();
        let root = add(&mut graph, "root", &[]);

        let outcome = graph.add_node(
            "orphan-ish",
            "fact",
            &[root.clone(), "ghost".to_string()],
            Metadata::new(),
        );

        assert!(!outcome.fully_linked());
        assert_eq!(outcome.skipped_parents, vec!["ghost".to_string()]);
        let node = graph.peek_node(&outcome.id).unwrap();
        assert_eq!(node.parent_ids.len(), 1);
        assert!(node.parent_ids.contains(&root));
    }

    #[test]
    fn test_ids_are_unique_and_typed() {
        let mut graph = MemoryGraph::new();
        let a = graph.add_node("a", "preference", &[], Metadata::new()).id;
        let b = graph.add_node("b", "preference", &[], Metadata::new()).id;
        assert_ne!(a, b);
        assert!(a.starts_with("preference_"));
    }

    #[test]
    fn test_get_node_records_access() {
        let mut graph = MemoryGraph::new();
        let id = add(&mut graph, "x", &[]);
        let before = graph.peek_node(&id).unwrap().last_accessed;

        graph.get_node(&id);
        let node = graph.get_node(&id).unwrap();
        assert_eq!(node.access_count, 2);
        assert!(node.last_accessed >= before);

        assert!(graph.get_node("missing").is_none());
    }

    #[test]
    fn test_neighbours_of_unknown_id_are_empty() {
        let graph = MemoryGraph::new();
        assert!(graph.get_children("nope").is_empty());
        assert!(graph.get_parents("nope").is_empty());
        assert!(graph.get_ancestors("nope", 3).is_empty());
    }

    #[test]
    fn test_traversal_respects_depth() {
        let mut graph = MemoryGraph::new();
        let a = add(&mut graph, "a", &[]);
        let b = add(&mut graph, "b", &[&a]);
        let c = add(&mut graph, "c", &[&b]);
        let d = add(&mut graph, "d", &[&c]);

        assert_eq!(ids(&graph.get_descendants(&a, 2)), vec![b.clone(), c.clone()]);
        assert_eq!(ids(&graph.get_descendants(&a, 10)), vec![b.clone(), c.clone(), d.clone()]);
        assert_eq!(ids(&graph.get_ancestors(&d, 1)), vec![c.clone()]);
        assert_eq!(ids(&graph.get_ancestors(&d, 3)), vec![c, b, a.clone()]);
        assert!(graph.get_descendants(&a, 0).is_empty());
    }

    #[test]
    fn test_traversal_survives_cycle() {
        let mut graph = MemoryGraph::new();
        let a = add(&mut graph, "a", &[]);
        let b = add(&mut graph, "b", &[&a]);
        assert!(graph.link(&b, &a));

        let descendants = graph.get_descendants(&a, 5);
        assert_eq!(ids(&descendants), vec![b.clone()]);

        let ancestors = graph.get_ancestors(&a, 5);
        assert_eq!(ids(&ancestors), vec![b]);
    }

    #[test]
    fn test_diamond_visits_shared_node_once() {
        let mut graph = MemoryGraph::new();
        let top = add(&mut graph, "top", &[]);
        let left = add(&mut graph, "left", &[&top]);
        let right = add(&mut graph, "right", &[&top]);
        let bottom = add(&mut graph, "bottom", &[&left, &right]);

        let found = ids(&graph.get_descendants(&top, 5));
        assert_eq!(found.len(), 3);
        assert_eq!(found.iter().filter(|id| **id == bottom).count(), 1);
    }

    #[test]
    fn test_search_by_type() {
        let mut graph = MemoryGraph::new();
        graph.add_node("likes tea", "preference", &[], Metadata::new());
        graph.add_node("lives in Oslo", "fact", &[], Metadata::new());
        graph.add_node("likes rain", "preference", &[], Metadata::new());

        assert_eq!(graph.search_by_type("preference").len(), 2);
        assert!(graph.search_by_type("workflow").is_empty());
    }

    #[test]
    fn test_search_by_content_scores_density() {
        let mut graph = MemoryGraph::new();
        let dense = add(&mut graph, "Rust rust", &[]);
        let sparse = add(&mut graph, "I have been learning Rust lately", &[]);
        add(&mut graph, "Python only", &[]);

        let hits = graph.search_by_content("RUST", 10);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].0.id, dense);
        assert!((hits[0].1 - 2.0 / 9.0).abs() < 1e-9);
        assert_eq!(hits[1].0.id, sparse);

        assert_eq!(graph.search_by_content("rust", 1).len(), 1);
        assert!(graph.search_by_content("", 10).is_empty());
    }

    #[test]
    fn test_update_merges_metadata() {
        let mut graph = MemoryGraph::new();
        let mut metadata = Metadata::new();
        metadata.insert("source".into(), json!("chat"));
        let id = graph.add_node("old", "fact", &[], metadata).id;

        let mut patch = Metadata::new();
        patch.insert("confidence".into(), json!(0.9));
        assert!(graph.update_node(&id, Some("new".into()), Some(patch)));

        let node = graph.peek_node(&id).unwrap();
        assert_eq!(node.content, "new");
        assert_eq!(node.metadata.len(), 2);
        assert!(!graph.update_node("missing", None, None));
    }

    #[test]
    fn test_unlink() {
        let mut graph = MemoryGraph::new();
        let a = add(&mut graph, "a", &[]);
        let b = add(&mut graph, "b", &[&a]);

        assert!(graph.unlink(&a, &b));
        assert!(!graph.unlink(&a, &b));
        assert!(graph.get_children(&a).is_empty());
        assert!(graph.get_parents(&b).is_empty());
        assert!(!graph.link(&a, "missing"));
    }

    #[test]
    fn test_delete_prunes_links() {
        let mut graph = MemoryGraph::new();
        let a = add(&mut graph, "a", &[]);
        let b = add(&mut graph, "b", &[&a]);
        let c = add(&mut graph, "c", &[&b]);

        assert!(graph.delete_node(&b, false));
        assert!(graph.peek_node(&a).unwrap().child_ids.is_empty());
        assert!(graph.peek_node(&c).unwrap().parent_ids.is_empty());
        assert!(graph.dangling_links().is_empty());
        assert!(!graph.delete_node(&b, false));
    }

    #[test]
    fn test_recursive_delete() {
        let mut graph = MemoryGraph::new();
        let root = add(&mut graph, "root", &[]);
        let a = add(&mut graph, "a", &[&root]);
        let b = add(&mut graph, "b", &[&a]);
        let other = add(&mut graph, "other", &[]);
        let shared = add(&mut graph, "shared", &[&b, &other]);
        // cycle back into the subtree must not hang the delete
        graph.link(&b, &a);

        assert!(graph.delete_node(&a, true));
        assert!(!graph.contains(&a));
        assert!(!graph.contains(&b));
        assert!(!graph.contains(&shared));
        assert!(graph.contains(&root));
        assert!(graph.peek_node(&other).unwrap().child_ids.is_empty());
        assert!(graph.peek_node(&root).unwrap().child_ids.is_empty());
        assert!(graph.dangling_links().is_empty());
    }

    #[test]
    fn test_dangling_links_detected() {
        let mut graph = MemoryGraph::new();
        let a = add(&mut graph, "a", &[]);
        graph
            .nodes
            .get_mut(&a)
            .unwrap()
            .child_ids
            .insert("ghost".into());

        let violations = graph.dangling_links();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].side, LinkSide::Child);
        assert_eq!(violations[0].to, "ghost");
    }

    #[test]
    fn test_json_snapshot_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("graph.json");
        let (a, b) = {
            let mut graph = MemoryGraph::open(Box::new(JsonFileStore::new(&path).unwrap()));
            let a = add(&mut graph, "a", &[]);
            let b = add(&mut graph, "b", &[&a]);
            graph.get_node(&b);
            graph.update_node(&a, None, None);
            (a, b)
        };

        let graph = MemoryGraph::open(Box::new(JsonFileStore::new(&path).unwrap()));
        assert_eq!(graph.len(), 2);
        assert!(graph.peek_node(&a).unwrap().child_ids.contains(&b));
        assert_eq!(graph.peek_node(&b).unwrap().access_count, 1);

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw[&b]["parent_ids"], json!([a]));
    }

    #[test]
    fn test_access_is_persisted_on_read() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("graph.json");
        let id = {
            let mut graph = MemoryGraph::open(Box::new(JsonFileStore::new(&path).unwrap()));
            let id = add(&mut graph, "read me", &[]);
            graph.get_node(&id);
            graph.get_node(&id);
            id
        };

        let graph = MemoryGraph::open(Box::new(JsonFileStore::new(&path).unwrap()));
        assert_eq!(graph.peek_node(&id).unwrap().access_count, 2);
    }

    #[test]
    fn test_malformed_snapshot_starts_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("graph.json");
        std::fs::write(&path, "{\"broken\": [").unwrap();

        let mut graph = MemoryGraph::open(Box::new(JsonFileStore::new(&path).unwrap()));
        assert!(graph.is_empty());
        let id = add(&mut graph, "fresh", &[]);
        assert!(graph.contains(&id));

        let reopened = MemoryGraph::open(Box::new(JsonFileStore::new(&path).unwrap()));
        assert_eq!(reopened.len(), 1);
    }

    #[test]
    fn test_failed_writes_keep_working_in_memory() {
        let mut graph = MemoryGraph::open(Box::new(FailingStore::default()));
        let a = add(&mut graph, "a", &[]);
        let b = add(&mut graph, "b", &[&a]);
        assert_eq!(graph.len(), 2);

        assert!(graph.update_node(&b, Some("b2".into()), None));
        assert_eq!(graph.get_node(&b).unwrap().content, "b2");
        assert!(graph.unlink(&a, &b));
        assert!(graph.link(&a, &b));

        assert!(graph.delete_node(&a, true));
        assert!(graph.is_empty());
        assert!(!graph.delete_node(&a, true));
    }

    #[test]
    fn test_sqlite_snapshot_roundtrip() {
        let store = SqliteStore::open_in_memory("graph").unwrap();
        let reader = store.sibling("graph");
        let id = {
            let mut graph = MemoryGraph::open(Box::new(store));
            add(&mut graph, "kept in sqlite", &[])
        };

        let graph = MemoryGraph::open(Box::new(reader));
        assert_eq!(graph.peek_node(&id).unwrap().content, "kept in sqlite");
    }
}
