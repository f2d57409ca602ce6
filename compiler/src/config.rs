// config.rs — Conversion configuration and priority rank tables
//
// Everything the caller can tune: feature and value emission priorities, the
// values that mean "feature absent", the slice plan, and the feature sets
// that change clause rendering (object-scoped indexing, aggregation-style
// ranges). Deserializable so host systems can ship it alongside the tree
// document.
//
// Preconditions: none.
// Postconditions: rank tables hand out one rank per distinct key.
// Failure modes: none (unknown keys are appended, never rejected).
// Side effects: none.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::Deserialize;

use crate::tree::FeatureValue;

// ── Rank table ──────────────────────────────────────────────────────────────

/// Ordered priority lookup with a defined fallback: a key not seeded from the
/// configuration gets the highest existing rank + 1 the first time it is
/// seen, so unlisted keys order after all listed ones, by encounter order.
#[derive(Debug, Clone, Default)]
pub struct RankTable {
    ranks: HashMap<String, usize>,
    next: usize,
}

impl RankTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed with consecutive ranks, one per key.
    pub fn seeded<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut table = RankTable::new();
        for key in keys {
            let rank = table.next;
            table.ranks.entry(key.into()).or_insert(rank);
            table.next = table.ranks.len();
        }
        table
    }

    /// Seed with one rank per group; a group's members tie.
    pub fn seeded_grouped<'a, I, G>(groups: I) -> Self
    where
        I: IntoIterator<Item = G>,
        G: IntoIterator<Item = &'a String>,
    {
        let mut table = RankTable::new();
        let mut rank = 0;
        for group in groups {
            let mut used = false;
            for key in group {
                table.ranks.entry(key.clone()).or_insert(rank);
                used = true;
            }
            if used {
                rank += 1;
            }
        }
        table.next = rank;
        table
    }

    /// Rank for a key, appending it past every existing rank when unseen.
    pub fn rank(&mut self, key: &str) -> usize {
        if let Some(&rank) = self.ranks.get(key) {
            return rank;
        }
        let rank = self.next;
        self.next += 1;
        self.ranks.insert(key.to_string(), rank);
        rank
    }

    /// Rank without the append fallback.
    pub fn peek(&self, key: &str) -> Option<usize> {
        self.ranks.get(key).copied()
    }
}

// ── Conversion configuration ────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ConversionConfig {
    /// Feature priority groups for sibling ordering; a group's members share
    /// one rank (multi-feature tuples order together).
    pub feature_order: Vec<Vec<String>>,

    /// Per-feature value priority for sibling ordering.
    pub feature_value_order: BTreeMap<String, Vec<FeatureValue>>,

    /// Values that mean "feature absent"; such tests render as
    /// `feature absent` instead of a comparison.
    pub absence_values: BTreeMap<String, Vec<FeatureValue>>,

    /// Features to slice away, in application order.
    pub slice_features: Vec<String>,

    /// The single value retained for each slice feature.
    pub slice_feature_values: BTreeMap<String, FeatureValue>,

    /// Object-scoped features: assignment tests render as `feature[value]`.
    pub indexed_features: BTreeSet<String>,

    /// Aggregation-style features: the DSL has no `range` keyword for these,
    /// so a doubly-bounded range renders as an every-joined comparison pair.
    pub aggregate_features: BTreeSet<String>,
}

impl ConversionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append features as singleton priority groups.
    pub fn with_feature_order<I, S>(mut self, features: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for feature in features {
            self.feature_order.push(vec![feature.into()]);
        }
        self
    }

    /// Append one priority group whose members share a rank.
    pub fn with_feature_group<I, S>(mut self, features: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.feature_order
            .push(features.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_value_order<I>(mut self, feature: &str, values: I) -> Self
    where
        I: IntoIterator<Item = FeatureValue>,
    {
        self.feature_value_order
            .insert(feature.to_string(), values.into_iter().collect());
        self
    }

    pub fn with_slice(mut self, feature: &str, keep: FeatureValue) -> Self {
        self.slice_features.push(feature.to_string());
        self.slice_feature_values.insert(feature.to_string(), keep);
        self
    }

    pub fn with_indexed_feature(mut self, feature: &str) -> Self {
        self.indexed_features.insert(feature.to_string());
        self
    }

    pub fn with_aggregate_feature(mut self, feature: &str) -> Self {
        self.aggregate_features.insert(feature.to_string());
        self
    }

    pub fn with_absence_values<I>(mut self, feature: &str, values: I) -> Self
    where
        I: IntoIterator<Item = FeatureValue>,
    {
        self.absence_values
            .insert(feature.to_string(), values.into_iter().collect());
        self
    }

    /// Fresh feature rank table seeded from `feature_order`.
    pub fn feature_ranks(&self) -> RankTable {
        RankTable::seeded_grouped(self.feature_order.iter())
    }

    /// Fresh value rank table for one feature.
    pub fn value_ranks(&self, feature: &str) -> RankTable {
        match self.feature_value_order.get(feature) {
            Some(values) => RankTable::seeded(values.iter().map(FeatureValue::key)),
            None => RankTable::new(),
        }
    }

    pub fn is_absent(&self, feature: &str, value: &FeatureValue) -> bool {
        self.absence_values
            .get(feature)
            .is_some_and(|values| values.contains(value))
    }

    pub fn is_indexed(&self, feature: &str) -> bool {
        self.indexed_features.contains(feature)
    }

    pub fn is_aggregate(&self, feature: &str) -> bool {
        self.aggregate_features.contains(feature)
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
