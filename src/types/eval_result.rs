//! Per-task evaluation results.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

/// Score for one task: a single number or a set of named metrics.
///
/// A benchmark always produces the same shape for every task; aggregation
/// rejects mixed shapes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Score {
    Scalar(f64),
    Keyed(BTreeMap<String, f64>),
}

impl Score {
    /// Builds a keyed score from `(name, value)` pairs.
    pub fn keyed<K: Into<String>>(entries: impl IntoIterator<Item = (K, f64)>) -> Self {
        Score::Keyed(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            Score::Scalar(v) => Some(*v),
            Score::Keyed(_) => None,
        }
    }

    pub fn as_keyed(&self) -> Option<&BTreeMap<String, f64>> {
        match self {
            Score::Keyed(map) => Some(map),
            Score::Scalar(_) => None,
        }
    }
}

/// Outcome of scoring one candidate against its task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalResult {
    pub score: Score,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, serde_json::Value>>,
}

impl EvalResult {
    pub fn scalar(score: f64) -> Self {
        Self {
            score: Score::Scalar(score),
            metadata: None,
        }
    }

    pub fn keyed<K: Into<String>>(entries: impl IntoIterator<Item = (K, f64)>) -> Self {
        Self {
            score: Score::keyed(entries),
            metadata: None,
        }
    }

    /// Adds a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), value);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scalar_score_is_bare_number() {
        let value = serde_json::to_value(EvalResult::scalar(1.0)).unwrap();
        assert_eq!(value, json!({"score": 1.0}));
    }

    #[test]
    fn test_keyed_score_is_object() {
        let result = EvalResult::keyed([("a", 1.0), ("b", 0.0)]);
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value, json!({"score": {"a": 1.0, "b": 0.0}}));

        let back: EvalResult = serde_json::from_value(value).unwrap();
        assert_eq!(back, result);
    }

    #[test]
    fn test_integer_score_reads_as_scalar() {
        let result: EvalResult = serde_json::from_str(r#"{"score": 1}"#).unwrap();
        assert_eq!(result.score.as_scalar(), Some(1.0));
        assert!(result.score.as_keyed().is_none());
    }

    #[test]
    fn test_metadata_round_trip() {
        let result = EvalResult::scalar(0.0).with_metadata("reason", json!("mismatch"));
        let text = serde_json::to_string(&result).unwrap();
        let back: EvalResult = serde_json::from_str(&text).unwrap();
        assert_eq!(
            back.metadata.unwrap().get("reason"),
            Some(&json!("mismatch"))
        );
    }
}
