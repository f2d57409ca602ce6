// validate.rs — Feature-value validation pass
//
// Clamps and casts every feature value in the tree — node-state entries and
// edge-test values — against the pluggable rule table. Values of features
// with no rule pass through untouched.
//
// Preconditions: none (runs first; tolerates both split forms).
// Postconditions: every value is within its feature's declared bounds and
//                 carries the declared representation.
// Failure modes: `ValidationError` when a declared cast cannot convert a
//                value — fatal, surfaced with feature/value context.
// Side effects: mutates the tree in place.

use crate::error::ValidationError;
use crate::rules::FeatureRules;
use crate::tree::{BidTree, EdgeTest};

/// Validate all node states and edge tests in place.
pub fn validate(tree: &mut BidTree, rules: &FeatureRules) -> Result<(), ValidationError> {
    for id in tree.node_ids() {
        let node = tree.node_mut(id);
        for (feature, value) in node.state.iter_mut() {
            *value = rules.validated(feature, &*value)?;
        }
    }

    // An edge's tested feature comes from its parent's split marker; resolve
    // before mutating so the arena is not borrowed both ways. Compound terms
    // carry their own features.
    let mut edits: Vec<(crate::tree::EdgeId, Option<String>)> = Vec::new();
    for edge_id in tree.edge_ids() {
        let edge = tree.edge(edge_id);
        match &edge.test {
            Some(EdgeTest::Simple { .. }) => {
                let feature = tree
                    .split_feature(edge.source, edge.target)
                    .map(str::to_string);
                edits.push((edge_id, feature));
            }
            Some(EdgeTest::Compound { .. }) => edits.push((edge_id, None)),
            None => {}
        }
    }

    for (edge_id, feature) in edits {
        match &mut tree.edge_mut(edge_id).test {
            Some(EdgeTest::Simple { value, .. }) => {
                if let Some(feature) = feature {
                    *value = rules.validated(&feature, &*value)?;
                }
            }
            Some(EdgeTest::Compound { terms, .. }) => {
                for term in terms.iter_mut() {
                    term.value = rules.validated(&term.feature, &term.value)?;
                }
            }
            None => {}
        }
    }

    Ok(())
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::CastRule;
    use crate::tree::{FeatureState, FeatureValue, NodeKind, Split, TestKind};

    fn rules() -> FeatureRules {
        FeatureRules::new()
            .with_floor("age", 0.0)
            .with_cast("age", CastRule::Int)
            .with_ceiling("user_hour", 23.0)
    }

    #[test]
    fn states_and_edge_values_are_clamped() {
        let mut tree = BidTree::new();
        let mut state = FeatureState::new();
        state.set("age", FeatureValue::Int(-5));
        let root = tree.add_node(
            NodeKind::Decision {
                split: Split::Feature("age".to_string()),
            },
            FeatureState::new(),
            false,
        );
        let child = tree.add_node(NodeKind::Leaf { output: 0.1 }, state, false);
        let fallback = tree.add_node(NodeKind::Leaf { output: 0.05 }, FeatureState::new(), true);
        let edge = tree
            .add_edge(
                root,
                child,
                Some(EdgeTest::Simple {
                    kind: TestKind::Range,
                    value: FeatureValue::Range(Some(-5.0), Some(10.0)),
                    negated: false,
                }),
            )
            .unwrap();
        tree.add_edge(root, fallback, None).unwrap();

        validate(&mut tree, &rules()).unwrap();

        assert_eq!(tree.node(child).state.get("age"), Some(&FeatureValue::Int(0)));
        match &tree.edge(edge).test {
            Some(EdgeTest::Simple { value, .. }) => {
                assert_eq!(*value, FeatureValue::Range(Some(0.0), Some(10.0)));
            }
            other => panic!("unexpected test: {other:?}"),
        }
    }

    #[test]
    fn uncastable_state_value_is_fatal() {
        let mut tree = BidTree::new();
        let mut state = FeatureState::new();
        state.set("age", FeatureValue::Text("young".to_string()));
        tree.add_node(NodeKind::Leaf { output: 0.1 }, state, false);

        let err = validate(&mut tree, &rules()).unwrap_err();
        assert_eq!(err.feature, "age");
    }
}
