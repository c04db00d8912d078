use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A mapping from signal-source name to its weight for one analysis run.
///
/// Weights are qualitative hints embedded into the consolidated prompt;
/// the pipeline never computes a weighted average with them, so they are
/// not required to sum to 1. Values must be finite and keys non-empty.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(transparent)]
pub struct WeightSet(BTreeMap<String, f64>);

impl WeightSet {
    /// Build a WeightSet, rejecting empty keys and non-finite values.
    pub fn new(weights: BTreeMap<String, f64>) -> Result<Self, String> {
        for (source, weight) in &weights {
            if source.trim().is_empty() {
                return Err("weight key must be a non-empty source name".to_string());
            }
            if !weight.is_finite() {
                return Err(format!("weight for '{source}' is not a finite number"));
            }
        }
        Ok(Self(weights))
    }

    pub fn get(&self, source: &str) -> Option<f64> {
        self.0.get(source).copied()
    }

    pub fn sources(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Serialize to the JSON object form stored in `weights_json`.
    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.0).unwrap_or_else(|_| "{}".to_string())
    }
}

impl FromIterator<(String, f64)> for WeightSet {
    /// Infallible construction for literals; callers building from
    /// untrusted input should go through `WeightSet::new`.
    fn from_iter<T: IntoIterator<Item = (String, f64)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}
