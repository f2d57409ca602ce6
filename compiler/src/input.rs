// input.rs — External tree document loading
//
// The graph builder hands the compiler a fully formed tree as a JSON
// document; this module deserializes it and builds the arena, checking the
// structural invariants a conversion relies on: exactly one root, one parent
// per node, exactly one default branch under every decision node. Semantic
// invariants (exhaustive, mutually exclusive tests) remain the builder's
// responsibility.
//
// `state` is an array of `[feature, value]` pairs, not an object — JSON
// object key order is not semantic, state order is. A range value is an
// object `{"lower": .., "upper": ..}` with either bound omissible; an array
// is a discrete collection.
//
// Preconditions: none.
// Postconditions: the returned tree satisfies invariants 1 and the
//                single-default part of 2.
// Failure modes: `InputError` on malformed JSON, unknown node references,
//                duplicate parents, or missing payloads.
// Side effects: none.

use std::collections::BTreeMap;
use std::fmt;

use serde::de::Deserializer;
use serde::Deserialize;

use crate::error::InputError;
use crate::tree::{
    BidTree, CompoundTerm, EdgeTest, FeatureState, FeatureValue, Join, NodeId, NodeKind, SmartLeaf,
    Split, TestKind,
};

// ── Document model ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct TreeDoc {
    pub nodes: Vec<NodeDoc>,
    pub edges: Vec<EdgeDoc>,
}

#[derive(Debug, Deserialize)]
pub struct NodeDoc {
    pub id: u32,
    #[serde(default)]
    pub split: Option<SplitDoc>,
    #[serde(default)]
    pub state: Vec<(String, FeatureValue)>,
    #[serde(default)]
    pub is_leaf: bool,
    #[serde(default)]
    pub is_default_leaf: bool,
    #[serde(default)]
    pub is_default_node: bool,
    #[serde(default)]
    pub is_smart: bool,
    #[serde(default)]
    pub output: Option<f64>,
    #[serde(default)]
    pub leaf_name: Option<String>,
    #[serde(default)]
    pub value: Option<f64>,
    #[serde(default)]
    pub input_field: Option<String>,
    #[serde(default)]
    pub multiplier: Option<f64>,
    #[serde(default)]
    pub offset: Option<f64>,
    #[serde(default)]
    pub min_value: Option<f64>,
    #[serde(default)]
    pub max_value: Option<f64>,
}

/// A split marker: the single feature the node branches on, or an explicit
/// per-child mapping keyed by document node id.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum SplitDoc {
    Feature(String),
    ByChild(BTreeMap<String, String>),
}

#[derive(Debug, Deserialize)]
pub struct EdgeDoc {
    pub source: u32,
    pub target: u32,
    #[serde(default)]
    pub value: Option<FeatureValue>,
    #[serde(rename = "type", default)]
    pub kind: Option<TestKindDoc>,
    #[serde(default)]
    pub is_negated: Option<NegationDoc>,
    #[serde(default)]
    pub join_statement: Option<JoinDoc>,
    #[serde(default)]
    pub compound: Option<Vec<TermDoc>>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestKindDoc {
    Range,
    Membership,
    Assignment,
    Association,
}

impl From<TestKindDoc> for TestKind {
    fn from(kind: TestKindDoc) -> TestKind {
        match kind {
            TestKindDoc::Range => TestKind::Range,
            TestKindDoc::Membership => TestKind::Membership,
            TestKindDoc::Assignment => TestKind::Assignment,
            TestKindDoc::Association => TestKind::Association,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum NegationDoc {
    One(bool),
    Per(Vec<bool>),
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinDoc {
    Any,
    Every,
    All,
}

impl From<JoinDoc> for Join {
    fn from(join: JoinDoc) -> Join {
        match join {
            JoinDoc::Any => Join::Any,
            JoinDoc::Every | JoinDoc::All => Join::Every,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct TermDoc {
    pub feature: String,
    #[serde(rename = "type")]
    pub kind: TestKindDoc,
    pub value: FeatureValue,
    #[serde(default)]
    pub negated: bool,
}

// ── FeatureValue deserialization ───────────────────────────────────────────

impl<'de> Deserialize<'de> for FeatureValue {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Int(i64),
            Float(f64),
            Text(String),
            Range {
                #[serde(default)]
                lower: Option<f64>,
                #[serde(default)]
                upper: Option<f64>,
            },
            Many(Vec<FeatureValue>),
        }
        Ok(match Raw::deserialize(deserializer)? {
            Raw::Int(v) => FeatureValue::Int(v),
            Raw::Float(v) => FeatureValue::Float(v),
            Raw::Text(s) => FeatureValue::Text(s),
            Raw::Range { lower, upper } => FeatureValue::Range(lower, upper),
            Raw::Many(items) => FeatureValue::Many(items),
        })
    }
}

// ── Building ───────────────────────────────────────────────────────────────

/// Parse a JSON tree document and build the arena.
pub fn from_json(text: &str) -> Result<BidTree, InputError> {
    let doc: TreeDoc = serde_json::from_str(text)?;
    build(doc)
}

/// Build the arena from an already-parsed document.
pub fn build(doc: TreeDoc) -> Result<BidTree, InputError> {
    let mut tree = BidTree::new();
    let mut ids: BTreeMap<u32, NodeId> = BTreeMap::new();

    for node in &doc.nodes {
        if ids.contains_key(&node.id) {
            return Err(InputError::BadNode {
                node: node.id,
                reason: "duplicate node id".to_string(),
            });
        }
        let kind = node_kind(node)?;
        let state = FeatureState::from_pairs(node.state.clone());
        let is_default = node.is_default_leaf || node.is_default_node;
        let id = tree.add_node(kind, state, is_default);
        ids.insert(node.id, id);
    }

    // Split mappings reference document ids; remap them onto arena ids.
    for node in &doc.nodes {
        if let Some(SplitDoc::ByChild(map)) = &node.split {
            let mut remapped = BTreeMap::new();
            for (child, feature) in map {
                let child_id = child.parse::<u32>().ok().and_then(|c| ids.get(&c).copied());
                let Some(child_id) = child_id else {
                    return Err(InputError::BadNode {
                        node: node.id,
                        reason: format!("split references unknown child `{child}`"),
                    });
                };
                remapped.insert(child_id, feature.clone());
            }
            let arena_id = ids[&node.id];
            if let NodeKind::Decision { split } = &mut tree.node_mut(arena_id).kind {
                *split = Split::ByChild(remapped);
            }
        }
    }

    for edge in &doc.edges {
        let source = lookup(&ids, edge.source, edge)?;
        let target = lookup(&ids, edge.target, edge)?;
        let test = edge_test(edge)?;
        tree.add_edge(source, target, test)
            .map_err(InputError::Structural)?;
    }

    tree.root().map_err(InputError::Structural)?;
    check_defaults(&tree)?;
    Ok(tree)
}

fn lookup(ids: &BTreeMap<u32, NodeId>, id: u32, edge: &EdgeDoc) -> Result<NodeId, InputError> {
    ids.get(&id).copied().ok_or_else(|| InputError::BadEdge {
        src: edge.source,
        target: edge.target,
        reason: format!("unknown node {id}"),
    })
}

fn node_kind(node: &NodeDoc) -> Result<NodeKind, InputError> {
    let leafish = node.is_leaf || node.is_default_leaf;
    if node.is_smart {
        return Ok(NodeKind::Smart(SmartLeaf {
            leaf_name: node.leaf_name.clone(),
            value: node.value,
            input_field: node.input_field.clone(),
            multiplier: node.multiplier,
            offset: node.offset,
            min_value: node.min_value,
            max_value: node.max_value,
        }));
    }
    if leafish {
        let Some(output) = node.output else {
            return Err(InputError::BadNode {
                node: node.id,
                reason: "leaf without an output bid".to_string(),
            });
        };
        return Ok(NodeKind::Leaf { output });
    }
    let split = match &node.split {
        Some(SplitDoc::Feature(feature)) => Split::Feature(feature.clone()),
        // Remapped in a second pass once all ids are known.
        Some(SplitDoc::ByChild(_)) | None => Split::ByChild(BTreeMap::new()),
    };
    Ok(NodeKind::Decision { split })
}

fn edge_test(edge: &EdgeDoc) -> Result<Option<EdgeTest>, InputError> {
    if let Some(terms) = &edge.compound {
        let negations = match &edge.is_negated {
            Some(NegationDoc::Per(flags)) if flags.len() == terms.len() => Some(flags.clone()),
            Some(NegationDoc::Per(_)) => {
                return Err(InputError::BadEdge {
                    src: edge.source,
                    target: edge.target,
                    reason: "negation tuple length does not match compound terms".to_string(),
                })
            }
            _ => None,
        };
        let terms = terms
            .iter()
            .enumerate()
            .map(|(i, term)| CompoundTerm {
                feature: term.feature.clone(),
                kind: term.kind.into(),
                value: term.value.clone(),
                negated: negations
                    .as_ref()
                    .map(|flags| flags[i])
                    .unwrap_or(term.negated),
            })
            .collect();
        return Ok(Some(EdgeTest::Compound {
            terms,
            join: edge.join_statement.map(Into::into),
        }));
    }

    let Some(value) = &edge.value else {
        return Ok(None); // default branch
    };
    let Some(kind) = edge.kind else {
        return Err(InputError::BadEdge {
            src: edge.source,
            target: edge.target,
            reason: "edge value without a test type".to_string(),
        });
    };
    let negated = match &edge.is_negated {
        Some(NegationDoc::One(flag)) => *flag,
        Some(NegationDoc::Per(_)) => {
            return Err(InputError::BadEdge {
                src: edge.source,
                target: edge.target,
                reason: "per-term negation on a simple test".to_string(),
            })
        }
        None => false,
    };
    Ok(Some(EdgeTest::Simple {
        kind: kind.into(),
        value: value.clone(),
        negated,
    }))
}

/// Every decision node with children must carry exactly one default branch.
fn check_defaults(tree: &BidTree) -> Result<(), InputError> {
    use crate::error::StructuralError;
    for id in tree.node_ids() {
        if tree.node(id).is_leaf() || tree.out_edges(id).is_empty() {
            continue;
        }
        let defaults = tree
            .children(id)
            .into_iter()
            .filter(|&c| tree.node(c).is_default)
            .count();
        match defaults {
            1 => {}
            0 => return Err(InputError::Structural(StructuralError::MissingDefault(id.0))),
            n => {
                return Err(InputError::BadNode {
                    node: id.0,
                    reason: format!("{n} default branches; expected one"),
                })
            }
        }
    }
    Ok(())
}

impl fmt::Display for TreeDoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "TreeDoc ({} nodes, {} edges)",
            self.nodes.len(),
            self.edges.len()
        )
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────
