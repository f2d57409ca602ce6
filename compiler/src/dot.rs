// dot.rs — Graphviz DOT output for bidding trees
//
// Transforms a BidTree into DOT format suitable for rendering with `dot`,
// `neato`, or other Graphviz layout engines. Decision nodes show their split
// features, leaves their bids; default branches draw dashed.
//
// Preconditions: `tree` is a constructed BidTree (any pipeline stage).
// Postconditions: returns a valid DOT string representing the tree.
// Failure modes: none (pure string formatting).
// Side effects: none.

use std::fmt::Write;

use crate::tree::{BidTree, EdgeTest, FeatureValue, Join, NodeKind, TestKind};

/// Emit the tree as a Graphviz DOT string. Node order follows arena ids, so
/// output is deterministic for identical trees.
pub fn emit_dot(tree: &BidTree) -> String {
    let mut buf = String::new();
    writeln!(buf, "digraph bonsai {{").unwrap();
    writeln!(buf, "    rankdir=TB;").unwrap();
    writeln!(buf, "    node [fontname=\"Helvetica\", fontsize=10];").unwrap();
    writeln!(buf, "    edge [fontname=\"Helvetica\", fontsize=9];").unwrap();
    writeln!(buf).unwrap();

    for id in tree.node_ids() {
        let node = tree.node(id);
        writeln!(buf, "    n{} [{}];", id.0, node_attrs(tree, id)).unwrap();
    }

    writeln!(buf).unwrap();
    for edge_id in tree.edge_ids() {
        let edge = tree.edge(edge_id);
        let style = if tree.node(edge.target).is_default {
            ", style=dashed, color=gray50"
        } else {
            ""
        };
        writeln!(
            buf,
            "    n{} -> n{} [label=\"{}\"{}];",
            edge.source.0,
            edge.target.0,
            escape(&edge_label(&edge.test)),
            style,
        )
        .unwrap();
    }

    writeln!(buf, "}}").unwrap();
    buf
}

// ── Helpers ─────────────────────────────────────────────────────────────────

fn node_attrs(tree: &BidTree, id: crate::tree::NodeId) -> String {
    let node = tree.node(id);
    let (shape, color, label) = match &node.kind {
        NodeKind::Decision { .. } => {
            let features = tree.split_features(id).join(" / ");
            ("box", "lightblue", features)
        }
        NodeKind::Leaf { output } => ("ellipse", "lightgreen", format!("{output:.4}")),
        NodeKind::Smart(smart) => {
            let label = smart
                .leaf_name
                .clone()
                .unwrap_or_else(|| "compute".to_string());
            ("diamond", "lightyellow", label)
        }
    };
    let style = if node.is_default {
        "filled,dashed"
    } else {
        "filled"
    };
    format!(
        "shape={shape}, style=\"{style}\", fillcolor={color}, label=\"{}\"",
        escape(&label)
    )
}

fn edge_label(test: &Option<EdgeTest>) -> String {
    match test {
        None => "else".to_string(),
        Some(EdgeTest::Simple {
            kind,
            value,
            negated,
        }) => {
            let mut label = String::new();
            if *negated {
                label.push_str("not ");
            }
            label.push_str(&value_label(value));
            if *kind == TestKind::Membership {
                label.insert_str(0, "in ");
            }
            label
        }
        Some(EdgeTest::Compound { terms, join }) => {
            let quantifier = match join.unwrap_or(Join::Any) {
                Join::Any => "any",
                Join::Every => "every",
            };
            format!("{quantifier} ({} terms)", terms.len())
        }
    }
}

fn value_label(value: &FeatureValue) -> String {
    match value {
        FeatureValue::Range(lo, hi) => format!(
            "[{}, {})",
            lo.map(crate::tree::fmt_num).unwrap_or_else(|| "..".to_string()),
            hi.map(crate::tree::fmt_num).unwrap_or_else(|| "..".to_string()),
        ),
        other => other.key(),
    }
}

fn escape(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}

// ── Tests ───────────────────────────────────────────────────────────────────
