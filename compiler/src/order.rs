// order.rs — Deterministic sibling ordering and conditional assignment
//
// Computes a total order over every decision node's outgoing edges and
// rewrites the arena's adjacency lists to match, so all later passes and the
// emitter see one fixed if/elif/else sequence. The sort key per child is
// `[is_default_leaf, is_default_node, (feature_rank, value_rank)*]`
// flattened over the child's full state; default branches therefore always
// sort last. Full ties keep their prior order (stable sort), which makes the
// output deterministic for identical input without promising any particular
// order between tied siblings.
//
// Preconditions: tree has a single root.
// Postconditions: adjacency lists are sorted; every child of a decision node
//                 carries a `conditional` annotation, the last one `Else`.
// Failure modes: none beyond a rootless tree.
// Side effects: reorders adjacency lists; writes annotations.

use std::collections::{HashMap, VecDeque};

use crate::config::{ConversionConfig, RankTable};
use crate::error::StructuralError;
use crate::tree::{BidTree, Conditional, EdgeId, Node};

/// Sort every node's children into emission order and assign conditionals.
pub fn order_siblings(
    tree: &mut BidTree,
    config: &ConversionConfig,
) -> Result<(), StructuralError> {
    let mut feature_ranks = config.feature_ranks();
    let mut value_ranks: HashMap<String, RankTable> = HashMap::new();

    let root = tree.root()?;
    let mut queue = VecDeque::from([root]);
    while let Some(node) = queue.pop_front() {
        let edges = tree.out_edges(node).to_vec();
        if edges.is_empty() {
            continue;
        }

        let mut keyed: Vec<(Vec<u64>, EdgeId)> = edges
            .iter()
            .map(|&edge| {
                let child = tree.edge(edge).target;
                let key = sort_key(tree.node(child), &mut feature_ranks, &mut value_ranks, config);
                (key, edge)
            })
            .collect();
        keyed.sort_by(|a, b| a.0.cmp(&b.0));

        let order: Vec<EdgeId> = keyed.into_iter().map(|(_, edge)| edge).collect();
        let last = order.len() - 1;
        for (i, &edge) in order.iter().enumerate() {
            let child = tree.edge(edge).target;
            let conditional = if i == 0 {
                Conditional::If
            } else if i == last {
                Conditional::Else
            } else {
                Conditional::Elif
            };
            tree.node_mut(child).notes.conditional = Some(conditional);
            queue.push_back(child);
        }
        tree.reorder_out_edges(node, order);
    }
    Ok(())
}

/// Comparison vector for one child: default flags first, then the child's
/// state flattened into (feature_rank, value_rank) pairs. Unlisted features
/// and values take the append-fallback rank, in encounter order.
fn sort_key(
    node: &Node,
    feature_ranks: &mut RankTable,
    value_ranks: &mut HashMap<String, RankTable>,
    config: &ConversionConfig,
) -> Vec<u64> {
    let mut key = vec![
        u64::from(node.is_default_leaf()),
        u64::from(node.is_default_node()),
    ];
    for (feature, value) in node.state.iter() {
        key.push(feature_ranks.rank(feature) as u64);
        let table = value_ranks
            .entry(feature.to_string())
            .or_insert_with(|| config.value_ranks(feature));
        key.push(table.rank(&value.key()) as u64);
    }
    key
}

// ── Tests ───────────────────────────────────────────────────────────────────
