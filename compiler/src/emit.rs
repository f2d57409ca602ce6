// emit.rs — Bonsai DSL text emission
//
// Walks the fully decorated tree in orderer-determined sibling order and
// produces the DSL text: switch headers, conditional and case clauses,
// else clauses, and leaf output statements. The traversal is an explicit
// stack that pushes each node's out-edges in reverse so they pop in emission
// order; output is the plain concatenation of the emitted fragments.
//
// Preconditions: all upstream passes completed (validated values, normalized
//                splits, ordered siblings, indent and switch annotations).
// Postconditions: returns syntactically valid, tab-indented DSL text; one
//                 statement per line, bids formatted to four decimals.
// Failure modes: `ConfigError` on unbounded range tests or a range term
//                under an `any` quantifier; `StructuralError` on a split
//                mapping with no entry for an emitted child.
// Side effects: none (pure string formatting).

use std::fmt::Write as _;

use crate::config::ConversionConfig;
use crate::error::{ConfigError, ConvertError, StructuralError};
use crate::layout::resolve_feature_ref;
use crate::tree::{
    BidTree, CompoundTerm, Conditional, Edge, EdgeTest, FeatureValue, Join, NodeKind, SmartLeaf,
    TestKind, fmt_num,
};

/// Render the decorated tree as Bonsai DSL text.
pub fn emit(tree: &BidTree, config: &ConversionConfig) -> Result<String, ConvertError> {
    let root = tree.root().map_err(ConvertError::Structural)?;
    let mut ctx = EmitCtx {
        tree,
        config,
        out: String::with_capacity(1024),
    };

    // A tree sliced all the way down to one leaf has no edges to carry the
    // output statement; emit the bid directly.
    if tree.node(root).is_leaf() {
        ctx.emit_output(root)?;
        return Ok(ctx.out);
    }

    let mut stack: Vec<crate::tree::EdgeId> = Vec::new();
    for &edge in tree.out_edges(root).iter().rev() {
        stack.push(edge);
    }
    while let Some(edge_id) = stack.pop() {
        let edge = tree.edge(edge_id);
        for &next in tree.out_edges(edge.target).iter().rev() {
            stack.push(next);
        }
        ctx.emit_edge(edge)?;
    }
    Ok(ctx.out)
}

// ── Internal context ────────────────────────────────────────────────────────

struct EmitCtx<'a> {
    tree: &'a BidTree,
    config: &'a ConversionConfig,
    out: String,
}

impl<'a> EmitCtx<'a> {
    fn emit_edge(&mut self, edge: &Edge) -> Result<(), ConvertError> {
        let parent = self.tree.node(edge.source);
        let child = self.tree.node(edge.target);
        let indent = tabs(parent.notes.indent);

        // A pending switch header precedes its first case clause; the header
        // sits one tab above the widened body.
        if child.notes.conditional == Some(Conditional::If) {
            if let Some(header) = &parent.notes.switch_header {
                let _ = writeln!(
                    self.out,
                    "{}switch {}:",
                    tabs(parent.notes.indent.saturating_sub(1)),
                    header
                );
            }
        }

        if child.is_default {
            let _ = writeln!(self.out, "{indent}else:");
        } else if parent.notes.switch_header.is_some() {
            self.emit_case_clause(edge, &indent)?;
        } else {
            self.emit_conditional_clause(edge, &indent)?;
        }

        self.emit_output(edge.target)?;
        Ok(())
    }

    fn emit_case_clause(&mut self, edge: &Edge, indent: &str) -> Result<(), ConvertError> {
        let feature = self.edge_feature(edge)?;
        let (lo, hi) = match &edge.test {
            Some(EdgeTest::Simple {
                value: FeatureValue::Range(lo, hi),
                ..
            }) => (*lo, *hi),
            _ => (None, None),
        };
        let clause = match (lo, hi) {
            (Some(lo), Some(hi)) => format!("case ({} .. {}):", fmt_num(lo), fmt_num(hi)),
            (Some(lo), None) => format!("case ({}):", fmt_num(lo)),
            (None, Some(hi)) => format!("case ({}):", fmt_num(hi)),
            (None, None) => {
                return Err(ConvertError::Config(ConfigError::UnboundedRange {
                    feature,
                }))
            }
        };
        let _ = writeln!(self.out, "{indent}{clause}");
        Ok(())
    }

    fn emit_conditional_clause(&mut self, edge: &Edge, indent: &str) -> Result<(), ConvertError> {
        let child = self.tree.node(edge.target);
        let keyword = match child.notes.conditional {
            Some(Conditional::If) | None => "if",
            Some(Conditional::Elif) => "elif",
            Some(Conditional::Else) => "else",
        };
        let clause = match &edge.test {
            Some(EdgeTest::Simple {
                kind,
                value,
                negated,
            }) => {
                let feature = self.edge_feature(edge)?;
                self.simple_clause(&feature, *kind, value, *negated, child)?
            }
            Some(EdgeTest::Compound { terms, join }) => self.compound_clause(terms, *join, child)?,
            None => {
                // A test-less edge on a non-default child is a builder bug;
                // treat it as a bare else so output stays parseable.
                let _ = writeln!(self.out, "{indent}else:");
                return Ok(());
            }
        };
        let _ = writeln!(self.out, "{indent}{keyword} {clause}:");
        Ok(())
    }

    /// Render one simple test as clause text, without keyword or colon.
    fn simple_clause(
        &self,
        feature: &str,
        kind: TestKind,
        value: &FeatureValue,
        negated: bool,
        child: &crate::tree::Node,
    ) -> Result<String, ConvertError> {
        let prefix = if negated { "not " } else { "" };

        if self.config.is_absent(feature, value) {
            return Ok(format!("{prefix}{feature} absent"));
        }

        let reference = resolve_feature_ref(feature, &child.state);
        let clause = match kind {
            TestKind::Range => {
                let (lo, hi) = match value {
                    FeatureValue::Range(lo, hi) => (*lo, *hi),
                    scalar => {
                        let bound = scalar.as_f64();
                        (bound, bound)
                    }
                };
                self.range_clause(feature, &reference, lo, hi)?
            }
            TestKind::Membership => format!("{reference} in {}", member_list(value)),
            TestKind::Assignment => match feature.split_once('.') {
                Some((object, attribute)) => {
                    format!("{object}[{}].{attribute}", bare_value(value))
                }
                None if self.config.is_indexed(feature) => {
                    format!("{feature}[{}]", bare_value(value))
                }
                None => format!("{feature} = {}", quoted_value(value)),
            },
            TestKind::Association => format!("{feature}: {}", quoted_value(value)),
        };
        Ok(format!("{prefix}{clause}"))
    }

    /// `feature range (lo, hi)` for doubly-bounded tests, one-sided
    /// comparisons otherwise. Aggregation-style features take no `range`
    /// keyword; their bounded tests render as an every-joined pair.
    fn range_clause(
        &self,
        feature: &str,
        reference: &str,
        lo: Option<f64>,
        hi: Option<f64>,
    ) -> Result<String, ConvertError> {
        match (lo, hi) {
            (Some(lo), Some(hi)) if self.config.is_aggregate(feature) => Ok(format!(
                "every {reference} >= {}, {reference} <= {}",
                fmt_num(lo),
                fmt_num(hi)
            )),
            (Some(lo), Some(hi)) => Ok(format!(
                "{reference} range ({}, {})",
                fmt_num(lo),
                fmt_num(hi)
            )),
            (Some(lo), None) => Ok(format!("{reference} >= {}", fmt_num(lo))),
            (None, Some(hi)) => Ok(format!("{reference} <= {}", fmt_num(hi))),
            (None, None) => Err(ConvertError::Config(ConfigError::UnboundedRange {
                feature: feature.to_string(),
            })),
        }
    }

    /// Multi-dimensional compound test: quantifier plus comma-joined term
    /// clauses. Range terms are conjunctions of their bounds and cannot sit
    /// under an `any` quantifier.
    fn compound_clause(
        &self,
        terms: &[CompoundTerm],
        join: Option<Join>,
        child: &crate::tree::Node,
    ) -> Result<String, ConvertError> {
        let join = join.unwrap_or(Join::Any);
        if join == Join::Any {
            if let Some(term) = terms.iter().find(|t| t.kind == TestKind::Range) {
                return Err(ConvertError::Config(ConfigError::RangeUnderAnyJoin {
                    feature: term.feature.clone(),
                }));
            }
        }
        let quantifier = match join {
            Join::Any => "any",
            Join::Every => "every",
        };
        let rendered: Result<Vec<String>, ConvertError> = terms
            .iter()
            .map(|term| {
                self.simple_clause(&term.feature, term.kind, &term.value, term.negated, child)
            })
            .collect();
        Ok(format!("{quantifier} {}", rendered?.join(", ")))
    }

    fn emit_output(&mut self, node: crate::tree::NodeId) -> Result<(), ConvertError> {
        let child = self.tree.node(node);
        let indent = tabs(child.notes.indent);
        match &child.kind {
            NodeKind::Leaf { output } => {
                let _ = writeln!(self.out, "{indent}{output:.4}");
            }
            NodeKind::Smart(smart) => self.emit_smart_output(smart, &indent),
            NodeKind::Decision { .. } => {}
        }
        Ok(())
    }

    fn emit_smart_output(&mut self, smart: &SmartLeaf, indent: &str) {
        if let Some(name) = &smart.leaf_name {
            let _ = writeln!(self.out, "{indent}leaf_name: \"{name}\"");
        }
        match smart.value {
            Some(bid) if bid <= 0.0 => {
                let _ = writeln!(self.out, "{indent}value: no_bid");
            }
            Some(bid) => {
                let _ = writeln!(self.out, "{indent}value: {bid:.4}");
            }
            None => {
                let _ = writeln!(
                    self.out,
                    "{indent}value: compute({}, {}, {}, {}, {})",
                    smart.input_field.as_deref().unwrap_or(PLACEHOLDER),
                    param(smart.multiplier),
                    param(smart.offset),
                    param(smart.min_value),
                    param(smart.max_value),
                );
            }
        }
    }

    fn edge_feature(&self, edge: &Edge) -> Result<String, ConvertError> {
        self.tree
            .split_feature(edge.source, edge.target)
            .map(str::to_string)
            .ok_or(ConvertError::Structural(StructuralError::MissingSplitEntry(
                edge.source.0,
                edge.target.0,
            )))
    }
}

// ── Rendering helpers ───────────────────────────────────────────────────────

const PLACEHOLDER: &str = "_";

fn tabs(depth: u16) -> String {
    "\t".repeat(depth as usize)
}

fn param(value: Option<f64>) -> String {
    value.map(fmt_num).unwrap_or_else(|| PLACEHOLDER.to_string())
}

/// Value spelling inside index brackets: never quoted.
fn bare_value(value: &FeatureValue) -> String {
    match value {
        FeatureValue::Int(v) => v.to_string(),
        FeatureValue::Float(v) => fmt_num(*v),
        FeatureValue::Text(s) => s.clone(),
        other => other.key(),
    }
}

/// Value spelling in comparisons: text quoted, numbers bare.
fn quoted_value(value: &FeatureValue) -> String {
    match value {
        FeatureValue::Text(s) => format!("\"{s}\""),
        other => bare_value(other),
    }
}

/// Membership list: text collections quote each member and join tightly,
/// numeric collections join with a spaced comma.
fn member_list(value: &FeatureValue) -> String {
    let items: Vec<&FeatureValue> = match value {
        FeatureValue::Many(items) => items.iter().collect(),
        single => vec![single],
    };
    let text_style = matches!(items.first(), Some(FeatureValue::Text(_)));
    if text_style {
        let joined: Vec<String> = items.iter().map(|v| bare_value(v)).collect();
        format!("(\"{}\")", joined.join("\",\""))
    } else {
        let joined: Vec<String> = items.iter().map(|v| bare_value(v)).collect();
        format!("({})", joined.join(", "))
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
