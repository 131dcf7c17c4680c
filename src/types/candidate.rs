//! Candidate answers produced by systems.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// A system's answer to one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// The final answer text.
    pub answer: String,
    /// Benchmark-specific extras.
    #[serde(default)]
    pub details: CandidateDetails,
}

/// Extra fields a candidate carries, one variant per kind of benchmark.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CandidateDetails {
    /// Plain question answering: nothing beyond the answer.
    #[default]
    Text,
    /// Web browsing: the trace of pages the agent went through.
    Browsing(BrowsingTrace),
}

/// Record of an agent's browsing session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BrowsingTrace {
    /// URLs in visit order.
    #[serde(default)]
    pub visited_urls: Vec<String>,
    /// Screenshot files, relative to the task output directory.
    #[serde(default)]
    pub screenshots: Vec<PathBuf>,
    /// Page the agent ended on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_url: Option<String>,
}

impl Candidate {
    /// Creates a plain text candidate.
    pub fn text(answer: impl Into<String>) -> Self {
        Self {
            answer: answer.into(),
            details: CandidateDetails::Text,
        }
    }

    /// Creates a browsing candidate.
    pub fn browsing(answer: impl Into<String>, trace: BrowsingTrace) -> Self {
        Self {
            answer: answer.into(),
            details: CandidateDetails::Browsing(trace),
        }
    }

    /// Visited URLs, empty for non-browsing candidates.
    pub fn visited_urls(&self) -> &[String] {
        match &self.details {
            CandidateDetails::Browsing(trace) => &trace.visited_urls,
            CandidateDetails::Text => &[],
        }
    }
}

impl TryFrom<serde_json::Value> for Candidate {
    type Error = serde_json::Error;

    fn try_from(value: serde_json::Value) -> Result<Self, Self::Error> {
        serde_json::from_value(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_text_candidate_json_shape() {
        let value = serde_json::to_value(Candidate::text("42")).unwrap();
        assert_eq!(value, json!({"answer": "42", "details": {"type": "text"}}));
    }

    #[test]
    fn test_details_default_when_missing() {
        let candidate: Candidate = serde_json::from_str(r#"{"answer":"Paris"}"#).unwrap();
        assert_eq!(candidate.details, CandidateDetails::Text);
        assert!(candidate.visited_urls().is_empty());
    }

    #[test]
    fn test_browsing_candidate_from_raw() {
        let raw = json!({
            "answer": "done",
            "details": {
                "type": "browsing",
                "visited_urls": ["https://a.example", "https://b.example"],
                "screenshots": ["step_0.png"]
            },
            "extra_field": true
        });
        let candidate = Candidate::try_from(raw).unwrap();
        assert_eq!(candidate.visited_urls().len(), 2);
        match &candidate.details {
            CandidateDetails::Browsing(trace) => {
                assert_eq!(trace.screenshots, vec![PathBuf::from("step_0.png")]);
                assert!(trace.final_url.is_none());
            }
            other => panic!("unexpected details: {:?}", other),
        }
    }

    #[test]
    fn test_missing_answer_rejected() {
        assert!(Candidate::try_from(json!({"details": {"type": "text"}})).is_err());
    }
}
