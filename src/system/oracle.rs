//! Oracle system: answers every task with its ground truth.
//!
//! Useful as a smoke test of a benchmark and of the harness plumbing; any
//! benchmark should score it at the top of its range.

use std::path::Path;

use async_trait::async_trait;

use super::System;
use crate::error::SystemError;
use crate::types::{BrowsingTrace, Candidate, Task};

pub struct OracleSystem {
    name: String,
}

impl OracleSystem {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Default for OracleSystem {
    fn default() -> Self {
        Self::new("oracle")
    }
}

#[async_trait]
impl System for OracleSystem {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get_answer(
        &self,
        task_id: &str,
        task: &Task,
        output_dir: &Path,
    ) -> Result<Candidate, SystemError> {
        let candidate = match &task.url_path {
            Some(url) => Candidate::browsing(
                task.ground_truth.clone(),
                BrowsingTrace {
                    visited_urls: vec![url.clone()],
                    screenshots: Vec::new(),
                    final_url: Some(url.clone()),
                },
            ),
            None => Candidate::text(task.ground_truth.clone()),
        };
        self.save_answer_to_disk(task_id, &candidate, output_dir).await?;
        Ok(candidate)
    }
}
