// layout.rs — Indentation assignment and switch-header synthesis
//
// Two coupled passes. Indentation is breadth-first from the root: child depth
// is parent depth plus one tab. Switch synthesis then promotes qualifying
// decision nodes — single split feature, every non-default edge a simple
// range — from a chained-conditional style to a `switch <feature>:` header
// with case clauses, and widens each promoted node's subtree by one extra
// tab, since case clauses nest one level deeper than a plain chain. The
// header itself is not a node; it renders one tab above the promoted node's
// widened depth, i.e. at the depth the node had before its own widening.
//
// Preconditions: splits normalized, siblings ordered.
// Postconditions: every node carries `indent`; qualifying nodes carry a
//                 resolved `switch_header` feature reference.
// Failure modes: none beyond a rootless tree.
// Side effects: writes annotations.

use std::collections::VecDeque;

use tracing::trace;

use crate::error::StructuralError;
use crate::tree::{BidTree, EdgeTest, FeatureState, FeatureValue, NodeId, TestKind};

/// Assign tab depth to every node, breadth-first from the root.
pub fn assign_indent(tree: &mut BidTree) -> Result<(), StructuralError> {
    let root = tree.root()?;
    tree.node_mut(root).notes.indent = 0;
    let mut queue = VecDeque::from([root]);
    while let Some(node) = queue.pop_front() {
        let depth = tree.node(node).notes.indent;
        for child in tree.children(node) {
            tree.node_mut(child).notes.indent = depth + 1;
            queue.push_back(child);
        }
    }
    Ok(())
}

/// Promote qualifying decision nodes to switch headers and widen their
/// subtrees. Runs after `assign_indent`; nested promoted subtrees widen
/// additively.
pub fn synthesize_switches(tree: &mut BidTree) -> Result<(), StructuralError> {
    let root = tree.root()?;

    let mut headers = Vec::new();
    let mut queue = VecDeque::from([root]);
    while let Some(node) = queue.pop_front() {
        queue.extend(tree.children(node));
        if let Some(feature) = qualifying_feature(tree, node) {
            let reference = resolve_feature_ref(&feature, &tree.node(node).state);
            trace!(node = %node, feature = %reference, "switch header synthesized");
            headers.push((node, reference));
        }
    }

    for (node, reference) in headers {
        tree.node_mut(node).notes.switch_header = Some(reference);
        widen_subtree(tree, node);
    }
    Ok(())
}

/// The single feature a node's switch header would test, if the node
/// qualifies: exactly one distinct split feature and every non-default
/// outgoing edge a simple range test.
fn qualifying_feature(tree: &BidTree, node: NodeId) -> Option<String> {
    let features = tree.split_features(node);
    let [feature] = features.as_slice() else {
        return None;
    };

    let all_ranges = tree.out_edges(node).iter().all(|&edge| {
        let edge = tree.edge(edge);
        if tree.node(edge.target).is_default {
            return true;
        }
        matches!(
            edge.test,
            Some(EdgeTest::Simple {
                kind: TestKind::Range,
                ..
            })
        )
    });
    all_ranges.then(|| feature.to_string())
}

fn widen_subtree(tree: &mut BidTree, node: NodeId) {
    let mut queue = VecDeque::from([node]);
    while let Some(node) = queue.pop_front() {
        tree.node_mut(node).notes.indent += 1;
        queue.extend(tree.children(node));
    }
}

/// Resolve a feature name for emission. A compound `object.attribute` name is
/// rewritten with the object's concrete value from the enclosing state:
/// `object[<value>].attribute`. A missing object value leaves the name bare.
pub fn resolve_feature_ref(feature: &str, state: &FeatureState) -> String {
    match feature.split_once('.') {
        Some((object, attribute)) => match state.get(object) {
            Some(FeatureValue::Int(v)) => format!("{object}[{v}].{attribute}"),
            Some(FeatureValue::Float(v)) => {
                format!("{object}[{}].{attribute}", crate::tree::fmt_num(*v))
            }
            Some(FeatureValue::Text(v)) => format!("{object}[{v}].{attribute}"),
            _ => feature.to_string(),
        },
        None => feature.to_string(),
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::normalize_splits;
    use crate::order::order_siblings;
    use crate::tree::{FeatureState, NodeKind, Split};

    fn range(lo: f64, hi: f64) -> Option<EdgeTest> {
        Some(EdgeTest::Simple {
            kind: TestKind::Range,
            value: FeatureValue::Range(Some(lo), Some(hi)),
            negated: false,
        })
    }

    fn assignment(value: i64) -> Option<EdgeTest> {
        Some(EdgeTest::Simple {
            kind: TestKind::Assignment,
            value: FeatureValue::Int(value),
            negated: false,
        })
    }

    /// segment split at the root, a range split over a compound age feature
    /// below it.
    fn switch_tree() -> (BidTree, NodeId, NodeId, Vec<NodeId>) {
        let mut tree = BidTree::new();
        let root = tree.add_node(
            NodeKind::Decision {
                split: Split::Feature("segment".to_string()),
            },
            FeatureState::new(),
            false,
        );
        let mut seg_state = FeatureState::new();
        seg_state.set("segment", FeatureValue::Int(12345));
        let seg = tree.add_node(
            NodeKind::Decision {
                split: Split::Feature("segment.age".to_string()),
            },
            seg_state.clone(),
            false,
        );
        let mut leaves = Vec::new();
        for (lo, hi, bid) in [(0.0, 10.0, 0.1), (10.0, 20.0, 0.2)] {
            let mut state = seg_state.clone();
            state.set("segment.age", FeatureValue::Range(Some(lo), Some(hi)));
            let leaf = tree.add_node(NodeKind::Leaf { output: bid }, state, false);
            tree.add_edge(seg, leaf, range(lo, hi)).unwrap();
            leaves.push(leaf);
        }
        let seg_default =
            tree.add_node(NodeKind::Leaf { output: 0.05 }, seg_state, true);
        tree.add_edge(seg, seg_default, None).unwrap();
        leaves.push(seg_default);
        let root_default =
            tree.add_node(NodeKind::Leaf { output: 0.05 }, FeatureState::new(), true);
        tree.add_edge(root, seg, assignment(12345)).unwrap();
        tree.add_edge(root, root_default, None).unwrap();
        normalize_splits(&mut tree);
        order_siblings(&mut tree, &Default::default()).unwrap();
        (tree, root, seg, leaves)
    }

    #[test]
    fn qualifying_node_gets_a_resolved_header_and_widened_subtree() {
        let (mut tree, root, seg, leaves) = switch_tree();
        assign_indent(&mut tree).unwrap();
        synthesize_switches(&mut tree).unwrap();

        assert_eq!(tree.node(root).notes.indent, 0);
        assert_eq!(
            tree.node(seg).notes.switch_header.as_deref(),
            Some("segment[12345].age")
        );
        // Pre-widening depth 1, widened to 2; header renders at 1.
        assert_eq!(tree.node(seg).notes.indent, 2);
        for leaf in leaves {
            assert_eq!(tree.node(leaf).notes.indent, 3);
        }
    }

    #[test]
    fn two_distinct_range_features_do_not_qualify() {
        let mut tree = BidTree::new();
        let root = tree.add_node(
            NodeKind::Decision {
                split: Split::ByChild(Default::default()),
            },
            FeatureState::new(),
            false,
        );
        let age = tree.add_node(NodeKind::Leaf { output: 0.1 }, FeatureState::new(), false);
        let hour = tree.add_node(NodeKind::Leaf { output: 0.2 }, FeatureState::new(), false);
        let fallback =
            tree.add_node(NodeKind::Leaf { output: 0.05 }, FeatureState::new(), true);
        tree.add_edge(root, age, range(0.0, 10.0)).unwrap();
        tree.add_edge(root, hour, range(0.0, 12.0)).unwrap();
        tree.add_edge(root, fallback, None).unwrap();
        if let NodeKind::Decision {
            split: Split::ByChild(map),
        } = &mut tree.node_mut(root).kind
        {
            map.insert(age, "age".to_string());
            map.insert(hour, "user_hour".to_string());
        }
        order_siblings(&mut tree, &Default::default()).unwrap();
        assign_indent(&mut tree).unwrap();
        synthesize_switches(&mut tree).unwrap();

        assert_eq!(tree.node(root).notes.switch_header, None);
        assert_eq!(tree.node(age).notes.indent, 1);
    }

    #[test]
    fn non_range_edge_disqualifies_the_node() {
        let mut tree = BidTree::new();
        let root = tree.add_node(
            NodeKind::Decision {
                split: Split::Feature("age".to_string()),
            },
            FeatureState::new(),
            false,
        );
        let a = tree.add_node(NodeKind::Leaf { output: 0.1 }, FeatureState::new(), false);
        let b = tree.add_node(NodeKind::Leaf { output: 0.2 }, FeatureState::new(), false);
        let fallback =
            tree.add_node(NodeKind::Leaf { output: 0.05 }, FeatureState::new(), true);
        tree.add_edge(root, a, range(0.0, 10.0)).unwrap();
        tree.add_edge(root, b, assignment(99)).unwrap();
        tree.add_edge(root, fallback, None).unwrap();
        normalize_splits(&mut tree);
        order_siblings(&mut tree, &Default::default()).unwrap();
        assign_indent(&mut tree).unwrap();
        synthesize_switches(&mut tree).unwrap();

        assert_eq!(tree.node(root).notes.switch_header, None);
    }

    #[test]
    fn compound_reference_without_object_value_stays_bare() {
        let state = FeatureState::new();
        assert_eq!(resolve_feature_ref("segment.age", &state), "segment.age");
        assert_eq!(resolve_feature_ref("geo", &state), "geo");
    }
}
