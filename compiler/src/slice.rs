// slice.rs — Branch slicer/pruner pass
//
// Eliminates a feature from the decision tree, retaining only the subtrees
// consistent with one fixed value. Non-matching branches are deleted, the
// surviving branch is collapsed or spliced into its parent, and default
// branches are reconciled so the pruned tree stays total: every retained
// input still reaches exactly one leaf, through the same payload it would
// have reached before.
//
// All surgery is driven by node-id snapshots taken up front; no container is
// mutated while it is being iterated.
//
// Preconditions: splits are normalized (`Split::ByChild`).
// Postconditions: no remaining node tests or carries the sliced feature;
//                 invariants 2 and 5 hold.
// Failure modes: `StructuralError` when a retained value is unmatched with no
//                default branch to substitute, or when several sibling
//                branches match it (exclusivity violation).
// Side effects: removes nodes and edges; rewires surviving edges.

use std::collections::BTreeSet;

use tracing::debug;

use crate::config::ConversionConfig;
use crate::error::StructuralError;
use crate::tree::{BidTree, EdgeTest, FeatureValue, NodeId, NodeKind, Split};

/// Apply the configured slice plan in order, then clean up the tree.
pub fn apply_slices(tree: &mut BidTree, config: &ConversionConfig) -> Result<(), StructuralError> {
    for feature in &config.slice_features {
        let Some(keep) = config.slice_feature_values.get(feature) else {
            debug!(feature = %feature, "slice feature has no retained value; skipped");
            continue;
        };
        slice(tree, feature, keep)?;
    }
    if !config.slice_features.is_empty() {
        cleanup(tree);
    }
    Ok(())
}

/// Slice one feature out of the tree, keeping only branches consistent with
/// `keep`.
pub fn slice(tree: &mut BidTree, feature: &str, keep: &FeatureValue) -> Result<(), StructuralError> {
    let candidates = decision_nodes_splitting_on(tree, feature)?;
    debug!(feature, candidates = candidates.len(), "slicing");

    for node in candidates {
        // Earlier surgery may have deleted this candidate with its subtree.
        if !tree.contains(node) {
            continue;
        }
        slice_node(tree, node, feature, keep)?;
    }

    // The retained value is now implied everywhere; scrub it from every state.
    for id in tree.node_ids() {
        tree.node_mut(id).state.remove(feature);
    }
    Ok(())
}

/// Post-slice cleanup: drop nodes orphaned by splicing, then repeatedly
/// collapse default leaves left as only children into their parents.
pub fn cleanup(tree: &mut BidTree) {
    let swept = tree.sweep_unreachable();
    if swept > 0 {
        debug!(swept, "removed unreachable nodes");
    }

    loop {
        let mut collapsed = false;
        for id in tree.node_ids() {
            if !tree.contains(id) {
                continue;
            }
            if !tree.node(id).is_default_leaf() {
                continue;
            }
            let Some(parent) = tree.parent(id) else {
                continue;
            };
            if tree.out_edges(parent).len() != 1 {
                continue;
            }
            // Parent absorbs the leaf's payload and becomes a leaf itself.
            let payload = tree.node(id).kind.clone();
            tree.node_mut(parent).kind = payload;
            tree.remove_node(id);
            collapsed = true;
        }
        if !collapsed {
            break;
        }
    }
}

// ── Per-node surgery ────────────────────────────────────────────────────────

/// Decision nodes whose split set contains `feature`, in breadth-first order
/// from the root so parents are handled before anything they dominate.
fn decision_nodes_splitting_on(
    tree: &BidTree,
    feature: &str,
) -> Result<Vec<NodeId>, StructuralError> {
    let root = tree.root()?;
    let mut queue = std::collections::VecDeque::from([root]);
    let mut found = Vec::new();
    while let Some(node) = queue.pop_front() {
        if tree.split_features(node).contains(&feature) {
            found.push(node);
        }
        queue.extend(tree.children(node));
    }
    Ok(found)
}

fn slice_node(
    tree: &mut BidTree,
    node: NodeId,
    feature: &str,
    keep: &FeatureValue,
) -> Result<(), StructuralError> {
    let feature_children: Vec<NodeId> = tree
        .children(node)
        .into_iter()
        .filter(|&child| tree.split_feature(node, child) == Some(feature))
        .collect();

    let matching: Vec<NodeId> = feature_children
        .iter()
        .copied()
        .filter(|&child| edge_tests_value(tree, child, keep))
        .collect();
    if matching.len() > 1 {
        return Err(StructuralError::AmbiguousRetainedMatch {
            feature: feature.to_string(),
            node: node.0,
            count: matching.len(),
        });
    }

    for child in &feature_children {
        if !matching.contains(child) {
            tree.remove_subtree(*child);
        }
    }
    prune_split_map(tree, node);

    let default = tree.default_child(node);
    let survivor = matching.first().copied();

    match survivor {
        Some(survivor) if tree.node(survivor).is_leaf() => {
            let others_remain = tree
                .children(node)
                .into_iter()
                .any(|c| c != survivor && !tree.node(c).is_default);
            if others_remain {
                let Some(default) = default else {
                    return Err(StructuralError::MissingDefault(node.0));
                };
                collapse_leaf_onto_default(tree, survivor, default);
            } else {
                collapse_leaf_onto_parent(tree, survivor, node, default);
            }
            prune_split_map(tree, node);
        }
        Some(survivor) => {
            splice_out(tree, node, survivor)?;
        }
        None => {
            let Some(default) = default else {
                return Err(StructuralError::NoDefaultFallback {
                    feature: feature.to_string(),
                    node: node.0,
                });
            };
            let others_remain = tree
                .children(node)
                .into_iter()
                .any(|c| !tree.node(c).is_default);
            // With other-feature branches still routing, the node keeps its
            // shape; failures already fall through to the default.
            if !others_remain {
                replace_with_default(tree, node, default);
            }
        }
    }
    Ok(())
}

/// Whether the child's incoming edge carries a simple test equal to `keep`.
fn edge_tests_value(tree: &BidTree, child: NodeId, keep: &FeatureValue) -> bool {
    let Some(edge) = tree.parent_edge(child) else {
        return false;
    };
    match &tree.edge(edge).test {
        Some(EdgeTest::Simple { value, .. }) => value == keep,
        _ => false,
    }
}

/// The surviving leaf's payload becomes the default branch's payload; the
/// default turns into the new default leaf and the survivor disappears.
fn collapse_leaf_onto_default(tree: &mut BidTree, survivor: NodeId, default: NodeId) {
    for child in tree.children(default) {
        tree.remove_subtree(child);
    }
    let payload = tree.node(survivor).kind.clone();
    tree.node_mut(default).kind = payload;
    tree.remove_subtree(survivor);
}

/// The survivor was the parent's only remaining branch: the parent absorbs
/// its payload and becomes a leaf, dropping the now-redundant default.
fn collapse_leaf_onto_parent(
    tree: &mut BidTree,
    survivor: NodeId,
    parent: NodeId,
    default: Option<NodeId>,
) {
    let payload = tree.node(survivor).kind.clone();
    tree.remove_subtree(survivor);
    if let Some(default) = default {
        tree.remove_subtree(default);
    }
    tree.node_mut(parent).kind = payload;
}

/// Splice an internal survivor out: its children re-home to the parent, its
/// default branch supersedes the parent's, and the parent's split map takes
/// over the survivor's entries.
fn splice_out(tree: &mut BidTree, parent: NodeId, survivor: NodeId) -> Result<(), StructuralError> {
    let survivor_map = match &tree.node(survivor).kind {
        NodeKind::Decision {
            split: Split::ByChild(map),
        } => map.clone(),
        _ => Default::default(),
    };

    // Retained inputs all routed through the survivor, so the survivor's
    // default is the one that remains authoritative.
    if tree.default_child(survivor).is_some() {
        if let Some(old_default) = tree.default_child(parent) {
            tree.remove_subtree(old_default);
        }
    }

    for edge in tree.out_edges(survivor).to_vec() {
        tree.set_edge_source(edge, parent);
    }

    let merged: Vec<(NodeId, String)> = survivor_map.into_iter().collect();
    if let NodeKind::Decision {
        split: Split::ByChild(map),
    } = &mut tree.node_mut(parent).kind
    {
        for (child, feature) in merged {
            map.insert(child, feature);
        }
    }

    tree.remove_node(survivor);
    prune_split_map(tree, parent);
    Ok(())
}

/// The node becomes whatever its default child was: payload and children move
/// up, the default node disappears.
fn replace_with_default(tree: &mut BidTree, node: NodeId, default: NodeId) {
    let payload = tree.node(default).kind.clone();
    for edge in tree.out_edges(default).to_vec() {
        tree.set_edge_source(edge, node);
    }
    tree.remove_node(default);
    tree.node_mut(node).kind = payload;
    prune_split_map(tree, node);
}

/// Drop split-map entries whose child is gone or re-homed elsewhere.
fn prune_split_map(tree: &mut BidTree, node: NodeId) {
    let live: BTreeSet<NodeId> = tree.children(node).into_iter().collect();
    if let NodeKind::Decision {
        split: Split::ByChild(map),
    } = &mut tree.node_mut(node).kind
    {
        map.retain(|child, _| live.contains(child));
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
