// pass.rs — Pass descriptor module: metadata, dependency resolution, artifacts
//
// Declares the compiler's 7 tree-transformation passes, their dependency
// edges, and the artifacts they produce. The pipeline runner uses this to
// compute the minimal pass subset for a terminal pass, which keeps partial
// conversions (e.g. slicing without emission) honest about what they ran.

use std::collections::HashSet;

// ── Pass and Artifact identifiers ──────────────────────────────────────────

/// Identifies each compiler pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassId {
    Validate,
    NormalizeSplits,
    Slice,
    Order,
    AssignIndent,
    SynthesizeSwitches,
    Emit,
}

/// Machine-readable artifact identifiers. Each names a decoration or
/// guarantee the tree carries after the producing pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactId {
    Validated,  // values clamped and cast
    Normalized, // splits in per-child mapping form
    Sliced,     // slice plan applied, tree total
    Ordered,    // adjacency sorted, conditionals assigned
    Indented,   // tab depths assigned
    Headers,    // switch headers synthesized, subtrees widened
    Text,       // emitted DSL source
}

// ── Pass descriptor ────────────────────────────────────────────────────────

/// Static metadata about a compiler pass.
pub struct PassDescriptor {
    /// Human-readable name for logging.
    pub name: &'static str,
    /// Pass dependencies (passes whose decorations this pass consumes).
    pub inputs: &'static [PassId],
    /// Artifacts this pass produces.
    pub outputs: &'static [ArtifactId],
    /// Pre/post conditions (documentation only).
    pub invariants: &'static str,
}

/// Return the static descriptor for a given pass.
pub fn descriptor(id: PassId) -> PassDescriptor {
    match id {
        PassId::Validate => PassDescriptor {
            name: "validate",
            inputs: &[],
            outputs: &[ArtifactId::Validated],
            invariants: "every value within declared bounds, cast applied",
        },
        PassId::NormalizeSplits => PassDescriptor {
            name: "normalize_splits",
            inputs: &[PassId::Validate],
            outputs: &[ArtifactId::Normalized],
            invariants: "every decision split is a per-child mapping",
        },
        PassId::Slice => PassDescriptor {
            name: "slice",
            inputs: &[PassId::NormalizeSplits],
            outputs: &[ArtifactId::Sliced],
            invariants: "sliced features absent everywhere, tree still total",
        },
        PassId::Order => PassDescriptor {
            name: "order",
            inputs: &[PassId::Slice],
            outputs: &[ArtifactId::Ordered],
            invariants: "sibling order total and stable, default last",
        },
        PassId::AssignIndent => PassDescriptor {
            name: "assign_indent",
            inputs: &[PassId::Order],
            outputs: &[ArtifactId::Indented],
            invariants: "child depth = parent depth + 1",
        },
        PassId::SynthesizeSwitches => PassDescriptor {
            name: "synthesize_switches",
            inputs: &[PassId::AssignIndent],
            outputs: &[ArtifactId::Headers],
            invariants: "headers iff single-feature all-range splits",
        },
        PassId::Emit => PassDescriptor {
            name: "emit",
            inputs: &[PassId::SynthesizeSwitches],
            outputs: &[ArtifactId::Text],
            invariants: "valid DSL text emitted",
        },
    }
}

// ── Dependency resolution ──────────────────────────────────────────────────

/// All 7 pass IDs in declaration order (used for iteration).
pub const ALL_PASSES: [PassId; 7] = [
    PassId::Validate,
    PassId::NormalizeSplits,
    PassId::Slice,
    PassId::Order,
    PassId::AssignIndent,
    PassId::SynthesizeSwitches,
    PassId::Emit,
];

/// Compute the minimal ordered set of passes needed to produce `terminal`.
/// Returns passes in topological (execution) order.
pub fn required_passes(terminal: PassId) -> Vec<PassId> {
    let mut visited = HashSet::new();
    let mut order = Vec::new();
    visit(terminal, &mut visited, &mut order);
    order
}

fn visit(id: PassId, visited: &mut HashSet<PassId>, order: &mut Vec<PassId>) {
    if !visited.insert(id) {
        return;
    }
    for &dep in descriptor(id).inputs {
        visit(dep, visited, order);
    }
    order.push(id);
}

// ── Tests ──────────────────────────────────────────────────────────────────
