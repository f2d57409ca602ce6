// normalize.rs — Split normalizer pass
//
// Rewrites each decision node's single-feature split marker into the uniform
// per-child mapping `{child-id: feature}` over all non-default children, so
// downstream passes (slicer, orderer, switch synthesizer, emitter) always see
// a dict-shaped split, regardless of how many distinct features a node
// branches on. No structural change.
//
// Preconditions: none.
// Postconditions: every decision node's split is `Split::ByChild`.
// Failure modes: none (already-normalized nodes are left alone).
// Side effects: mutates split markers in place.

use std::collections::BTreeMap;

use crate::tree::{BidTree, NodeId, NodeKind, Split};

/// Normalize every decision node's split marker to the per-child mapping.
pub fn normalize_splits(tree: &mut BidTree) {
    for id in tree.node_ids() {
        let feature = match &tree.node(id).kind {
            NodeKind::Decision {
                split: Split::Feature(feature),
            } => feature.clone(),
            _ => continue,
        };

        let mut map: BTreeMap<NodeId, String> = BTreeMap::new();
        for child in tree.children(id) {
            if !tree.node(child).is_default {
                map.insert(child, feature.clone());
            }
        }

        tree.node_mut(id).kind = NodeKind::Decision {
            split: Split::ByChild(map),
        };
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
