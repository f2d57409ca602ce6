// End-to-end conversion tests over the public API.
//
// The fixture mirrors the canonical bidding tree: a segment split at the
// root, an object-scoped age range split per segment, and a geo membership
// split per age band, with default leaves bidding 0.05 at every level.
//
// Positive cases assert on the emitted DSL text; negative cases must be
// rejected with the documented error.

use bonsaic::config::ConversionConfig;
use bonsaic::error::{ConfigError, ConvertError};
use bonsaic::pipeline::convert;
use bonsaic::rules::{CastRule, FeatureRules};
use bonsaic::tree::{
    BidTree, CompoundTerm, EdgeTest, FeatureState, FeatureValue, Join, NodeKind, SmartLeaf, Split,
    TestKind,
};

// ── Fixtures ────────────────────────────────────────────────────────────────

fn decision(feature: &str) -> NodeKind {
    NodeKind::Decision {
        split: Split::Feature(feature.to_string()),
    }
}

fn assignment(value: i64) -> Option<EdgeTest> {
    Some(EdgeTest::Simple {
        kind: TestKind::Assignment,
        value: FeatureValue::Int(value),
        negated: false,
    })
}

fn range(lo: f64, hi: f64) -> Option<EdgeTest> {
    Some(EdgeTest::Simple {
        kind: TestKind::Range,
        value: FeatureValue::Range(Some(lo), Some(hi)),
        negated: false,
    })
}

fn membership(values: &[&str]) -> Option<EdgeTest> {
    Some(EdgeTest::Simple {
        kind: TestKind::Membership,
        value: FeatureValue::Many(
            values
                .iter()
                .map(|v| FeatureValue::Text(v.to_string()))
                .collect(),
        ),
        negated: false,
    })
}

/// segment → segment.age ranges → geo membership, defaults everywhere.
fn scenario_tree() -> BidTree {
    let mut tree = BidTree::new();
    let root = tree.add_node(decision("segment"), FeatureState::new(), false);
    let bands: [(i64, [(f64, f64); 2]); 2] = [
        (12345, [(0.0, 10.0), (10.0, 20.0)]),
        (67890, [(0.0, 20.0), (20.0, 40.0)]),
    ];
    for (segment, age_bands) in bands {
        let mut seg_state = FeatureState::new();
        seg_state.set("segment", FeatureValue::Int(segment));
        let seg_node = tree.add_node(decision("segment.age"), seg_state.clone(), false);
        tree.add_edge(root, seg_node, assignment(segment)).unwrap();
        for (lo, hi) in age_bands {
            let mut age_state = seg_state.clone();
            age_state.set("segment.age", FeatureValue::Range(Some(lo), Some(hi)));
            let age_node = tree.add_node(decision("geo"), age_state.clone(), false);
            tree.add_edge(seg_node, age_node, range(lo, hi)).unwrap();
            for (geos, bid) in [(["UK", "DE"], 0.10), (["US", "BR"], 0.20)] {
                let mut leaf_state = age_state.clone();
                leaf_state.set(
                    "geo",
                    FeatureValue::Many(
                        geos.iter()
                            .map(|g| FeatureValue::Text(g.to_string()))
                            .collect(),
                    ),
                );
                let leaf = tree.add_node(NodeKind::Leaf { output: bid }, leaf_state, false);
                tree.add_edge(age_node, leaf, membership(&geos)).unwrap();
            }
            let age_default =
                tree.add_node(NodeKind::Leaf { output: 0.05 }, age_state.clone(), true);
            tree.add_edge(age_node, age_default, None).unwrap();
        }
        let seg_default =
            tree.add_node(NodeKind::Leaf { output: 0.05 }, seg_state.clone(), true);
        tree.add_edge(seg_node, seg_default, None).unwrap();
    }
    let root_default = tree.add_node(NodeKind::Leaf { output: 0.05 }, FeatureState::new(), true);
    tree.add_edge(root, root_default, None).unwrap();
    tree
}

/// A single decision node routing on two distinct range-tested features —
/// the shape that must NOT synthesize a switch header.
fn two_range_feature_tree() -> BidTree {
    let mut tree = BidTree::new();
    let root = tree.add_node(
        NodeKind::Decision {
            split: Split::ByChild(Default::default()),
        },
        FeatureState::new(),
        false,
    );
    let mut age_state = FeatureState::new();
    age_state.set("age", FeatureValue::Range(Some(0.0), Some(10.0)));
    let age_child = tree.add_node(NodeKind::Leaf { output: 0.10 }, age_state, false);
    let mut hour_state = FeatureState::new();
    hour_state.set("user_hour", FeatureValue::Range(Some(0.0), Some(12.0)));
    let hour_child = tree.add_node(NodeKind::Leaf { output: 0.20 }, hour_state, false);
    let fallback = tree.add_node(NodeKind::Leaf { output: 0.05 }, FeatureState::new(), true);
    tree.add_edge(root, age_child, range(0.0, 10.0)).unwrap();
    tree.add_edge(root, hour_child, range(0.0, 12.0)).unwrap();
    tree.add_edge(root, fallback, None).unwrap();
    if let NodeKind::Decision {
        split: Split::ByChild(map),
    } = &mut tree.node_mut(root).kind
    {
        map.insert(age_child, "age".to_string());
        map.insert(hour_child, "user_hour".to_string());
    }
    tree
}

fn scenario_config() -> ConversionConfig {
    ConversionConfig::new()
        .with_feature_order(["segment", "segment.age", "geo"])
        .with_indexed_feature("segment")
}

fn scenario_rules() -> FeatureRules {
    FeatureRules::new()
        .with_floor("segment.age", 0.0)
        .with_floor("user_hour", 0.0)
        .with_ceiling("user_hour", 23.0)
        .with_cast("segment", CastRule::Int)
}

fn bonsai_text(tree: BidTree) -> String {
    convert(tree, &scenario_config(), &scenario_rules())
        .unwrap()
        .text
}

/// `0.1000`-shaped bid line, after indentation is stripped.
fn is_bid_line(line: &str) -> bool {
    let bytes = line.as_bytes();
    bytes.len() == 6
        && bytes[0].is_ascii_digit()
        && bytes[1] == b'.'
        && bytes[2..].iter().all(u8::is_ascii_digit)
}

// ── Switch synthesis ────────────────────────────────────────────────────────

#[test]
fn age_splits_become_switch_headers() {
    let text = bonsai_text(scenario_tree());
    let rows: Vec<&str> = text.lines().map(|l| l.trim_start_matches('\t')).collect();

    let headers: Vec<&&str> = rows.iter().filter(|r| r.starts_with("switch")).collect();
    assert_eq!(headers.len(), 2);
    for row in &rows {
        if row.contains("age") {
            assert!(
                *row == "switch segment[12345].age:" || *row == "switch segment[67890].age:",
                "unexpected age row: {row}"
            );
        }
    }
    assert!(text.contains("switch segment[12345].age:"));
    assert!(text.contains("case (0 .. 10):"));
    assert!(text.contains("case (20 .. 40):"));
}

#[test]
fn switch_headers_sit_one_tab_above_their_case_clauses() {
    let text = bonsai_text(scenario_tree());
    let lines: Vec<&str> = text.lines().collect();

    for (i, line) in lines.iter().enumerate() {
        if line.trim_start_matches('\t').starts_with("switch") {
            let header_tabs = line.len() - line.trim_start_matches('\t').len();
            let case = lines[i + 1];
            assert!(case.trim_start_matches('\t').starts_with("case ("));
            let case_tabs = case.len() - case.trim_start_matches('\t').len();
            assert_eq!(case_tabs, header_tabs + 1);
        }
    }
}

#[test]
fn two_distinct_range_features_emit_no_switch() {
    let text = bonsai_text(two_range_feature_tree());

    assert!(!text.contains("switch"));
    assert!(!text.contains("case ("));
    assert!(text.contains("if age range (0, 10):"));
    assert!(text.contains("elif user_hour range (0, 12):"));
}

// ── Compound features and leaf formatting ───────────────────────────────────

#[test]
fn segment_rows_carry_the_object_index() {
    let text = bonsai_text(scenario_tree());

    for row in text.lines().map(|l| l.trim_start_matches('\t')) {
        if row.contains("segment") && !row.contains("age") {
            assert!(
                row.contains("segment[12345]") || row.contains("segment[67890]"),
                "unindexed segment row: {row}"
            );
        }
    }
}

#[test]
fn every_leaf_line_is_a_four_decimal_bid() {
    let text = bonsai_text(scenario_tree());
    let mut bids = 0;

    for row in text.lines().map(|l| l.trim_start_matches('\t')) {
        if !row.ends_with(':') {
            assert!(is_bid_line(row), "malformed leaf line: {row}");
            bids += 1;
        }
    }
    // 8 geo leaves + 4 age defaults + 2 segment defaults + root default.
    assert_eq!(bids, 15);
}

#[test]
fn default_clause_is_always_last_among_siblings() {
    let text = bonsai_text(scenario_tree());
    let lines: Vec<&str> = text.lines().collect();

    // An `else:` clause is never followed by a sibling clause at the same
    // depth: the next line at that depth belongs to an enclosing level.
    for (i, line) in lines.iter().enumerate() {
        let depth = line.len() - line.trim_start_matches('\t').len();
        if line.trim_start_matches('\t') != "else:" {
            continue;
        }
        for later in &lines[i + 1..] {
            let later_depth = later.len() - later.trim_start_matches('\t').len();
            if later_depth < depth {
                break;
            }
            assert_ne!(
                later_depth, depth,
                "clause follows else: at the same depth: {later}"
            );
        }
    }
    assert!(text.ends_with("else:\n\t0.0500\n"));
}

// ── Smart leaves ────────────────────────────────────────────────────────────

#[test]
fn smart_leaves_emit_named_compute_expressions() {
    let mut tree = BidTree::new();
    let root = tree.add_node(
        decision("segment"),
        FeatureState::new(),
        false,
    );
    let smart = tree.add_node(
        NodeKind::Smart(SmartLeaf {
            leaf_name: Some("retarget".to_string()),
            input_field: Some("recall_bid".to_string()),
            multiplier: Some(1.5),
            offset: Some(0.01),
            ..Default::default()
        }),
        FeatureState::new(),
        false,
    );
    let fallback = tree.add_node(
        NodeKind::Smart(SmartLeaf {
            value: Some(-1.0),
            ..Default::default()
        }),
        FeatureState::new(),
        true,
    );
    tree.add_edge(root, smart, assignment(12345)).unwrap();
    tree.add_edge(root, fallback, None).unwrap();

    let text = bonsai_text(tree);

    assert!(text.contains("\tleaf_name: \"retarget\"\n"));
    assert!(text.contains("\tvalue: compute(recall_bid, 1.5, 0.01, _, _)\n"));
    assert!(text.contains("\tvalue: no_bid\n"));
}

// ── Error taxonomy ──────────────────────────────────────────────────────────

#[test]
fn unbounded_range_test_is_a_config_error() {
    let mut tree = BidTree::new();
    let root = tree.add_node(
        decision("age"),
        FeatureState::new(),
        false,
    );
    let child = tree.add_node(NodeKind::Leaf { output: 0.1 }, FeatureState::new(), false);
    let fallback = tree.add_node(NodeKind::Leaf { output: 0.05 }, FeatureState::new(), true);
    tree.add_edge(
        root,
        child,
        Some(EdgeTest::Simple {
            kind: TestKind::Range,
            value: FeatureValue::Range(None, None),
            negated: false,
        }),
    )
    .unwrap();
    tree.add_edge(root, fallback, None).unwrap();

    let err = convert(tree, &scenario_config(), &scenario_rules()).unwrap_err();
    assert!(matches!(
        err,
        ConvertError::Config(ConfigError::UnboundedRange { .. })
    ));
}

#[test]
fn range_term_under_any_join_is_a_config_error() {
    let mut tree = BidTree::new();
    let root = tree.add_node(
        decision("segment"),
        FeatureState::new(),
        false,
    );
    let child = tree.add_node(NodeKind::Leaf { output: 0.1 }, FeatureState::new(), false);
    let fallback = tree.add_node(NodeKind::Leaf { output: 0.05 }, FeatureState::new(), true);
    tree.add_edge(
        root,
        child,
        Some(EdgeTest::Compound {
            terms: vec![CompoundTerm {
                feature: "age".to_string(),
                kind: TestKind::Range,
                value: FeatureValue::Range(Some(0.0), Some(10.0)),
                negated: false,
            }],
            join: Some(Join::Any),
        }),
    )
    .unwrap();
    tree.add_edge(root, fallback, None).unwrap();

    let err = convert(tree, &scenario_config(), &scenario_rules()).unwrap_err();
    assert!(matches!(
        err,
        ConvertError::Config(ConfigError::RangeUnderAnyJoin { .. })
    ));
}

#[test]
fn uncastable_feature_value_is_a_validation_error() {
    let mut tree = BidTree::new();
    let root = tree.add_node(
        decision("segment"),
        FeatureState::new(),
        false,
    );
    let mut bad_state = FeatureState::new();
    bad_state.set("segment", FeatureValue::Text("premium".to_string()));
    let child = tree.add_node(NodeKind::Leaf { output: 0.1 }, bad_state, false);
    let fallback = tree.add_node(NodeKind::Leaf { output: 0.05 }, FeatureState::new(), true);
    tree.add_edge(root, child, assignment(1)).unwrap();
    tree.add_edge(root, fallback, None).unwrap();

    let err = convert(tree, &scenario_config(), &scenario_rules()).unwrap_err();
    assert!(matches!(err, ConvertError::Validation(_)));
}

// ── Validation scenarios ────────────────────────────────────────────────────

#[test]
fn out_of_range_values_validate_to_the_nearest_bound() {
    let rules = scenario_rules().with_cast("age", CastRule::Int).with_floor("age", 0.0);

    assert_eq!(
        rules.validated("age", &FeatureValue::Int(-5)).unwrap(),
        FeatureValue::Int(0)
    );
    assert_eq!(
        rules.validated("user_hour", &FeatureValue::Float(30.0)).unwrap(),
        FeatureValue::Float(23.0)
    );
}
