// pipeline.rs — Conversion state and pass orchestration
//
// Owns the tree for the duration of one conversion and runs the minimal set
// of passes for a given terminal PassId. The tree is exclusively owned by the
// conversion — nothing is shared across concurrent conversions, and no state
// survives a run beyond the returned text.
//
// Preconditions: the tree satisfies the input invariants (single root, one
//                default branch per decision node).
// Postconditions: all passes up to the terminal completed, or the first
//                error was returned with nothing emitted.
// Failure modes: any pass error; all are fatal and deterministic.
// Side effects: mutates the owned tree; logs pass boundaries via `tracing`.

use std::time::Instant;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use tracing::debug;

use crate::config::ConversionConfig;
use crate::emit::emit;
use crate::error::ConvertError;
use crate::layout::{assign_indent, synthesize_switches};
use crate::normalize::normalize_splits;
use crate::order::order_siblings;
use crate::pass::{descriptor, required_passes, PassId};
use crate::rules::FeatureRules;
use crate::slice::apply_slices;
use crate::tree::BidTree;
use crate::validate::validate;

// ── Output record ──────────────────────────────────────────────────────────

/// A finished conversion: the DSL text plus its transport and provenance
/// forms. The fingerprint is the SHA-256 of the text — two conversions of
/// identical input produce identical fingerprints.
#[derive(Debug, Clone)]
pub struct Bonsai {
    pub text: String,
    fingerprint: [u8; 32],
}

impl Bonsai {
    fn new(text: String) -> Self {
        let fingerprint = fingerprint_of(&text);
        Bonsai { text, fingerprint }
    }

    /// Base64 form of the text, for transports that forbid raw control
    /// characters (the text is tab- and newline-heavy by design).
    pub fn encoded(&self) -> String {
        STANDARD.encode(self.text.as_bytes())
    }

    pub fn fingerprint(&self) -> [u8; 32] {
        self.fingerprint
    }

    /// Hex string of the fingerprint (64 characters).
    pub fn fingerprint_hex(&self) -> String {
        let mut s = String::with_capacity(64);
        for b in &self.fingerprint {
            use std::fmt::Write;
            let _ = write!(s, "{:02x}", b);
        }
        s
    }
}

fn fingerprint_of(text: &str) -> [u8; 32] {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let result = hasher.finalize();
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&result);
    hash
}

// ── Conversion state ───────────────────────────────────────────────────────

/// Holds the tree being converted and the text once emitted.
pub struct ConversionState {
    pub tree: BidTree,
    pub text: Option<String>,
}

impl ConversionState {
    pub fn new(tree: BidTree) -> Self {
        ConversionState { tree, text: None }
    }
}

// ── Public entry points ────────────────────────────────────────────────────

/// Run the full pipeline and return the emitted script.
pub fn convert(
    tree: BidTree,
    config: &ConversionConfig,
    rules: &FeatureRules,
) -> Result<Bonsai, ConvertError> {
    let mut state = ConversionState::new(tree);
    run_passes(&mut state, PassId::Emit, config, rules)?;
    // Emit is the terminal pass, so the text is always present here.
    let text = state.text.take().unwrap_or_default();
    Ok(Bonsai::new(text))
}

/// Run all passes up to and including `terminal`, in topological order.
pub fn run_passes(
    state: &mut ConversionState,
    terminal: PassId,
    config: &ConversionConfig,
    rules: &FeatureRules,
) -> Result<(), ConvertError> {
    for pass in required_passes(terminal) {
        let start = Instant::now();
        run_pass(state, pass, config, rules)?;
        debug!(
            pass = descriptor(pass).name,
            elapsed_us = start.elapsed().as_micros() as u64,
            "pass complete"
        );
    }
    Ok(())
}

fn run_pass(
    state: &mut ConversionState,
    pass: PassId,
    config: &ConversionConfig,
    rules: &FeatureRules,
) -> Result<(), ConvertError> {
    match pass {
        PassId::Validate => validate(&mut state.tree, rules)?,
        PassId::NormalizeSplits => normalize_splits(&mut state.tree),
        PassId::Slice => apply_slices(&mut state.tree, config)?,
        PassId::Order => order_siblings(&mut state.tree, config)?,
        PassId::AssignIndent => assign_indent(&mut state.tree)?,
        PassId::SynthesizeSwitches => synthesize_switches(&mut state.tree)?,
        PassId::Emit => {
            state.text = Some(emit(&state.tree, config)?);
        }
    }
    Ok(())
}

// ── Tests ──────────────────────────────────────────────────────────────────
