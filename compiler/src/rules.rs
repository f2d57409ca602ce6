// rules.rs — Pluggable feature validation table
//
// Maps feature names to the floor, ceiling, and cast rule their values must
// satisfy. The table contents come from the host system; the compiler only
// defines the lookup and the clamp-then-cast operation the validation pass
// applies element-wise to every state entry and edge-test value.
//
// Preconditions: none.
// Postconditions: `validated` output is within [floor, ceiling] and carries
//                 the declared representation.
// Failure modes: `ValidationError` when a declared cast cannot convert the
//                value (malformed input, non-recoverable).
// Side effects: none.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::error::ValidationError;
use crate::tree::{fmt_num, FeatureValue};

/// Declared representation for a feature's values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CastRule {
    Int,
    Float,
    Text,
}

impl CastRule {
    fn name(self) -> &'static str {
        match self {
            CastRule::Int => "int",
            CastRule::Float => "float",
            CastRule::Text => "text",
        }
    }
}

/// Feature-keyed clamp and cast rules. Features absent from every map pass
/// through validation unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FeatureRules {
    pub floors: BTreeMap<String, f64>,
    pub ceilings: BTreeMap<String, f64>,
    pub casts: BTreeMap<String, CastRule>,
}

impl FeatureRules {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_floor(mut self, feature: &str, floor: f64) -> Self {
        self.floors.insert(feature.to_string(), floor);
        self
    }

    pub fn with_ceiling(mut self, feature: &str, ceiling: f64) -> Self {
        self.ceilings.insert(feature.to_string(), ceiling);
        self
    }

    pub fn with_cast(mut self, feature: &str, cast: CastRule) -> Self {
        self.casts.insert(feature.to_string(), cast);
        self
    }

    /// Clamp a value into the feature's declared bounds and cast it to the
    /// declared representation. Collections and range bounds validate
    /// element-wise; the result has the dimensionality of the input.
    pub fn validated(
        &self,
        feature: &str,
        value: &FeatureValue,
    ) -> Result<FeatureValue, ValidationError> {
        match value {
            FeatureValue::Many(items) => {
                let validated: Result<Vec<FeatureValue>, ValidationError> = items
                    .iter()
                    .map(|item| self.validated(feature, item))
                    .collect();
                Ok(FeatureValue::Many(validated?))
            }
            FeatureValue::Range(lo, hi) => Ok(FeatureValue::Range(
                lo.map(|b| self.clamp(feature, b)),
                hi.map(|b| self.clamp(feature, b)),
            )),
            scalar => self.validated_scalar(feature, scalar),
        }
    }

    fn validated_scalar(
        &self,
        feature: &str,
        value: &FeatureValue,
    ) -> Result<FeatureValue, ValidationError> {
        let clamped = match value {
            FeatureValue::Int(v) => FeatureValue::Int(self.clamp(feature, *v as f64) as i64),
            FeatureValue::Float(v) => FeatureValue::Float(self.clamp(feature, *v)),
            other => other.clone(),
        };
        self.cast(feature, clamped)
    }

    fn clamp(&self, feature: &str, value: f64) -> f64 {
        let mut value = value;
        if let Some(ceiling) = self.ceilings.get(feature) {
            value = value.min(*ceiling);
        }
        if let Some(floor) = self.floors.get(feature) {
            value = value.max(*floor);
        }
        value
    }

    fn cast(&self, feature: &str, value: FeatureValue) -> Result<FeatureValue, ValidationError> {
        let Some(rule) = self.casts.get(feature) else {
            return Ok(value);
        };
        let fail = |shown: String| ValidationError {
            feature: feature.to_string(),
            value: shown,
            wanted: rule.name(),
        };
        match (rule, value) {
            (CastRule::Int, FeatureValue::Int(v)) => Ok(FeatureValue::Int(v)),
            (CastRule::Int, FeatureValue::Float(v)) => Ok(FeatureValue::Int(v as i64)),
            (CastRule::Int, FeatureValue::Text(s)) => s
                .trim()
                .parse::<f64>()
                .map(|v| FeatureValue::Int(v as i64))
                .map_err(|_| fail(s)),
            (CastRule::Float, FeatureValue::Int(v)) => Ok(FeatureValue::Float(v as f64)),
            (CastRule::Float, FeatureValue::Float(v)) => Ok(FeatureValue::Float(v)),
            (CastRule::Float, FeatureValue::Text(s)) => s
                .trim()
                .parse::<f64>()
                .map(FeatureValue::Float)
                .map_err(|_| fail(s)),
            (CastRule::Text, FeatureValue::Int(v)) => Ok(FeatureValue::Text(v.to_string())),
            (CastRule::Text, FeatureValue::Float(v)) => Ok(FeatureValue::Text(fmt_num(v))),
            (CastRule::Text, FeatureValue::Text(s)) => Ok(FeatureValue::Text(s)),
            (_, other) => Ok(other),
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
