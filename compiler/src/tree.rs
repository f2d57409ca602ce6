// tree.rs — Arena IR for annotated bidding decision trees
//
// The input to the compiler: a rooted, acyclic decision graph with feature
// tests on its edges and bid payloads on its leaves. Nodes and edges live in
// indexed vectors with vacancy slots (slicing vacates, nothing else removes);
// parent/child relationships are edge indices, and each node's outgoing edges
// are an explicitly ordered list that the orderer pass rearranges in place.
//
// Preconditions: none (container types; invariants are checked by `root()`
//                and by the input surface, not by construction).
// Postconditions: none.
// Failure modes: `root()` fails on rootless or multi-root graphs.
// Side effects: none.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::StructuralError;

// ── Identifiers ─────────────────────────────────────────────────────────────

/// Unique identifier for a node within a tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

/// Unique identifier for an edge within a tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

// ── Feature values ──────────────────────────────────────────────────────────

/// A feature value as it appears in node states and edge tests.
///
/// `Range` bounds are half-open `[lower, upper)`; either bound may be absent
/// (unbounded on that side). `Many` is a discrete collection, used by
/// membership tests and multi-valued state entries.
#[derive(Debug, Clone, PartialEq)]
pub enum FeatureValue {
    Int(i64),
    Float(f64),
    Text(String),
    Range(Option<f64>, Option<f64>),
    Many(Vec<FeatureValue>),
}

impl FeatureValue {
    pub fn is_numeric(&self) -> bool {
        matches!(self, FeatureValue::Int(_) | FeatureValue::Float(_))
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FeatureValue::Int(v) => Some(*v as f64),
            FeatureValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Canonical key string, used where values index rank tables.
    /// Integral floats collapse onto their integer spelling so that `10` and
    /// `10.0` occupy one rank.
    pub fn key(&self) -> String {
        match self {
            FeatureValue::Int(v) => v.to_string(),
            FeatureValue::Float(v) => fmt_num(*v),
            FeatureValue::Text(s) => s.clone(),
            FeatureValue::Range(lo, hi) => format!(
                "{}..{}",
                lo.map(fmt_num).unwrap_or_default(),
                hi.map(fmt_num).unwrap_or_default()
            ),
            FeatureValue::Many(vs) => {
                let keys: Vec<String> = vs.iter().map(FeatureValue::key).collect();
                keys.join("|")
            }
        }
    }
}

/// Format a float without a trailing `.0` when it is integral.
pub fn fmt_num(v: f64) -> String {
    if v.fract() == 0.0 && v.is_finite() && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        format!("{}", v)
    }
}

// ── Feature state ───────────────────────────────────────────────────────────

/// The conjunction of all ancestor edge tests that must hold to reach a node,
/// as an insertion-ordered feature → value list. Order is semantic: the
/// orderer flattens it into sibling sort keys.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureState {
    entries: Vec<(String, FeatureValue)>,
}

impl FeatureState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs(entries: Vec<(String, FeatureValue)>) -> Self {
        FeatureState { entries }
    }

    pub fn get(&self, feature: &str) -> Option<&FeatureValue> {
        self.entries
            .iter()
            .find(|(f, _)| f == feature)
            .map(|(_, v)| v)
    }

    /// Insert or replace, preserving the position of an existing entry.
    pub fn set(&mut self, feature: &str, value: FeatureValue) {
        match self.entries.iter_mut().find(|(f, _)| f == feature) {
            Some((_, slot)) => *slot = value,
            None => self.entries.push((feature.to_string(), value)),
        }
    }

    pub fn remove(&mut self, feature: &str) -> Option<FeatureValue> {
        let idx = self.entries.iter().position(|(f, _)| f == feature)?;
        Some(self.entries.remove(idx).1)
    }

    pub fn contains(&self, feature: &str) -> bool {
        self.entries.iter().any(|(f, _)| f == feature)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FeatureValue)> {
        self.entries.iter().map(|(f, v)| (f.as_str(), v))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&str, &mut FeatureValue)> {
        self.entries.iter_mut().map(|(f, v)| (f.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ── Node roles ──────────────────────────────────────────────────────────────

/// Which feature each child's edge branches on.
///
/// Graph builders usually mark a decision node with the single feature it
/// splits on; the normalizer pass rewrites that into the per-child mapping so
/// downstream passes can treat multi-feature splits uniformly.
#[derive(Debug, Clone, PartialEq)]
pub enum Split {
    Feature(String),
    ByChild(BTreeMap<NodeId, String>),
}

/// Payload of a leaf whose output is a compute expression (or a named,
/// explicitly bounded bid) rather than a bare constant.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SmartLeaf {
    pub leaf_name: Option<String>,
    pub value: Option<f64>,
    pub input_field: Option<String>,
    pub multiplier: Option<f64>,
    pub offset: Option<f64>,
    pub min_value: Option<f64>,
    pub max_value: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// Routes to children based on feature tests.
    Decision { split: Split },
    /// Outputs a constant bid.
    Leaf { output: f64 },
    /// Outputs a compute expression or named bid.
    Smart(SmartLeaf),
}

// ── Pass annotations ────────────────────────────────────────────────────────

/// Conditional keyword assigned to a node's clause by the orderer.
/// The default clause is always `else` — the DSL's `default:` spelling is
/// never emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conditional {
    If,
    Elif,
    Else,
}

/// Decorations populated progressively by the passes. Everything here is
/// derived data; the slicer resets nothing because it runs first.
///
/// `switch_header` holds the resolved feature reference of a synthesized
/// `switch <feature>:` header. The header line textually precedes the node's
/// case clauses and sits one tab above the node's widened depth.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Annotations {
    pub indent: u16,
    pub conditional: Option<Conditional>,
    pub switch_header: Option<String>,
}

// ── Nodes and edges ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: NodeId,
    pub kind: NodeKind,
    pub state: FeatureState,
    /// Catch-all branch taken when no sibling test matches.
    pub is_default: bool,
    pub notes: Annotations,
}

impl Node {
    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, NodeKind::Leaf { .. } | NodeKind::Smart(_))
    }

    pub fn is_default_leaf(&self) -> bool {
        self.is_default && self.is_leaf()
    }

    pub fn is_default_node(&self) -> bool {
        self.is_default && !self.is_leaf()
    }

    pub fn is_smart(&self) -> bool {
        matches!(self.kind, NodeKind::Smart(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestKind {
    Range,
    Membership,
    Assignment,
    Association,
}

/// Quantifier joining the terms of a compound test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Join {
    Any,
    Every,
}

/// One component of a multi-dimensional compound test.
#[derive(Debug, Clone, PartialEq)]
pub struct CompoundTerm {
    pub feature: String,
    pub kind: TestKind,
    pub value: FeatureValue,
    pub negated: bool,
}

/// The test carried by a non-default edge. The tested feature is not stored
/// here for simple tests — it comes from the parent's split mapping.
#[derive(Debug, Clone, PartialEq)]
pub enum EdgeTest {
    Simple {
        kind: TestKind,
        value: FeatureValue,
        negated: bool,
    },
    Compound {
        terms: Vec<CompoundTerm>,
        join: Option<Join>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    pub id: EdgeId,
    pub source: NodeId,
    pub target: NodeId,
    /// `None` marks the default branch.
    pub test: Option<EdgeTest>,
}

// ── The tree ────────────────────────────────────────────────────────────────

/// Arena-backed decision tree. Node and edge slots are vacated on removal and
/// never reused, so ids stay stable across surgery.
#[derive(Debug, Default)]
pub struct BidTree {
    nodes: Vec<Option<Node>>,
    edges: Vec<Option<Edge>>,
    incoming: Vec<Option<EdgeId>>,
    outgoing: Vec<Vec<EdgeId>>,
}

impl BidTree {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Construction ────────────────────────────────────────────────────

    pub fn add_node(&mut self, kind: NodeKind, state: FeatureState, is_default: bool) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Some(Node {
            id,
            kind,
            state,
            is_default,
            notes: Annotations::default(),
        }));
        self.incoming.push(None);
        self.outgoing.push(Vec::new());
        id
    }

    pub fn add_edge(
        &mut self,
        source: NodeId,
        target: NodeId,
        test: Option<EdgeTest>,
    ) -> Result<EdgeId, StructuralError> {
        if self.get_node(source).is_none() {
            return Err(StructuralError::UnknownNode(source.0));
        }
        if self.get_node(target).is_none() {
            return Err(StructuralError::UnknownNode(target.0));
        }
        if self.incoming[target.0 as usize].is_some() {
            return Err(StructuralError::DuplicateParent(target.0));
        }
        let id = EdgeId(self.edges.len() as u32);
        self.edges.push(Some(Edge {
            id,
            source,
            target,
            test,
        }));
        self.incoming[target.0 as usize] = Some(id);
        self.outgoing[source.0 as usize].push(id);
        Ok(id)
    }

    // ── Access ──────────────────────────────────────────────────────────

    pub fn node(&self, id: NodeId) -> &Node {
        self.nodes[id.0 as usize].as_ref().expect("vacant node slot")
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        self.nodes[id.0 as usize].as_mut().expect("vacant node slot")
    }

    pub fn get_node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0 as usize).and_then(Option::as_ref)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.get_node(id).is_some()
    }

    pub fn edge(&self, id: EdgeId) -> &Edge {
        self.edges[id.0 as usize].as_ref().expect("vacant edge slot")
    }

    pub fn edge_mut(&mut self, id: EdgeId) -> &mut Edge {
        self.edges[id.0 as usize].as_mut().expect("vacant edge slot")
    }

    /// The single node with no incoming edge.
    pub fn root(&self) -> Result<NodeId, StructuralError> {
        let roots: Vec<NodeId> = self
            .nodes
            .iter()
            .flatten()
            .map(|n| n.id)
            .filter(|id| self.incoming[id.0 as usize].is_none())
            .collect();
        match roots.as_slice() {
            [root] => Ok(*root),
            [] => Err(StructuralError::NoRoot),
            _ => Err(StructuralError::MultipleRoots(roots.len())),
        }
    }

    pub fn parent_edge(&self, id: NodeId) -> Option<EdgeId> {
        self.incoming[id.0 as usize]
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.parent_edge(id).map(|e| self.edge(e).source)
    }

    /// Outgoing edges in their current sibling order.
    pub fn out_edges(&self, id: NodeId) -> &[EdgeId] {
        &self.outgoing[id.0 as usize]
    }

    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        self.out_edges(id)
            .iter()
            .map(|&e| self.edge(e).target)
            .collect()
    }

    pub fn default_child(&self, id: NodeId) -> Option<NodeId> {
        self.children(id)
            .into_iter()
            .find(|&c| self.node(c).is_default)
    }

    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes.iter().flatten().map(|n| n.id).collect()
    }

    pub fn edge_ids(&self) -> Vec<EdgeId> {
        self.edges.iter().flatten().map(|e| e.id).collect()
    }

    /// The feature a non-default child's edge branches on, from the parent's
    /// split marker (either form).
    pub fn split_feature(&self, parent: NodeId, child: NodeId) -> Option<&str> {
        if self.node(child).is_default {
            return None;
        }
        match &self.node(parent).kind {
            NodeKind::Decision {
                split: Split::Feature(feature),
            } => Some(feature.as_str()),
            NodeKind::Decision {
                split: Split::ByChild(map),
            } => map.get(&child).map(String::as_str),
            _ => None,
        }
    }

    /// Distinct features a decision node splits on, over its non-default
    /// children.
    pub fn split_features(&self, id: NodeId) -> Vec<&str> {
        let mut features: Vec<&str> = self
            .children(id)
            .into_iter()
            .filter_map(|child| self.split_feature(id, child))
            .collect();
        features.sort_unstable();
        features.dedup();
        features
    }

    pub fn node_count(&self) -> usize {
        self.nodes.iter().flatten().count()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.iter().flatten().count()
    }

    // ── Surgery ─────────────────────────────────────────────────────────

    /// Detach and vacate an edge.
    pub fn remove_edge(&mut self, id: EdgeId) {
        if let Some(edge) = self.edges[id.0 as usize].take() {
            self.incoming[edge.target.0 as usize] = None;
            self.outgoing[edge.source.0 as usize].retain(|&e| e != id);
        }
    }

    /// Vacate a node, detaching its incoming edge. The node must have no
    /// remaining children; use `remove_subtree` otherwise.
    pub fn remove_node(&mut self, id: NodeId) {
        if let Some(edge) = self.incoming[id.0 as usize] {
            self.remove_edge(edge);
        }
        self.nodes[id.0 as usize] = None;
    }

    /// Remove a node and every descendant, breadth-first.
    pub fn remove_subtree(&mut self, id: NodeId) {
        let mut queue = vec![id];
        let mut doomed = Vec::new();
        while let Some(node) = queue.pop() {
            if !self.contains(node) {
                continue;
            }
            queue.extend(self.children(node));
            doomed.push(node);
        }
        for node in doomed {
            let edges: Vec<EdgeId> = self.outgoing[node.0 as usize].clone();
            for edge in edges {
                self.remove_edge(edge);
            }
            self.remove_node(node);
        }
    }

    /// Re-home an edge under a new source node, appended after the new
    /// source's existing children.
    pub fn set_edge_source(&mut self, id: EdgeId, new_source: NodeId) {
        let old_source = self.edge(id).source;
        if old_source == new_source {
            return;
        }
        self.outgoing[old_source.0 as usize].retain(|&e| e != id);
        self.outgoing[new_source.0 as usize].push(id);
        self.edge_mut(id).source = new_source;
    }

    /// Replace a node's sibling order. The new order must be a permutation of
    /// the current one; used by the orderer.
    pub fn reorder_out_edges(&mut self, id: NodeId, order: Vec<EdgeId>) {
        debug_assert_eq!(order.len(), self.outgoing[id.0 as usize].len());
        self.outgoing[id.0 as usize] = order;
    }

    /// Drop every node not reachable from the root. Returns the number of
    /// nodes removed.
    pub fn sweep_unreachable(&mut self) -> usize {
        let root = match self.root() {
            Ok(r) => r,
            Err(_) => return 0,
        };
        let mut reachable = vec![false; self.nodes.len()];
        let mut queue = vec![root];
        while let Some(node) = queue.pop() {
            if reachable[node.0 as usize] {
                continue;
            }
            reachable[node.0 as usize] = true;
            queue.extend(self.children(node));
        }
        let doomed: Vec<NodeId> = self
            .node_ids()
            .into_iter()
            .filter(|id| !reachable[id.0 as usize])
            .collect();
        let removed = doomed.len();
        for node in &doomed {
            let edges: Vec<EdgeId> = self.outgoing[node.0 as usize].clone();
            for edge in edges {
                self.remove_edge(edge);
            }
        }
        for node in doomed {
            self.remove_node(node);
        }
        removed
    }
}

impl fmt::Display for BidTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let leaves = self
            .nodes
            .iter()
            .flatten()
            .filter(|n| n.is_leaf())
            .count();
        writeln!(
            f,
            "BidTree ({} nodes, {} edges, {} leaves)",
            self.node_count(),
            self.edge_count(),
            leaves
        )
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
