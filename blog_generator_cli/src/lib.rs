pub mod ai;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod prompt;
pub mod remote;
pub mod retry;
pub mod scraper;
pub mod submission;
pub mod utils;

pub use error::{Error, ErrorKind, Result};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroU32;
use url::Url;

/// One (source, selector set) unit of work.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Job {
    pub source: Url,
    pub selectors: Vec<usize>,
    pub ordinal: usize,
}

impl Job {
    pub fn new(ordinal: usize, source: Url, selectors: Vec<usize>) -> Self {
        Self {
            source,
            selectors,
            ordinal,
        }
    }
}

/// Jobs submitted together, sharing one target length.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Batch {
    pub jobs: Vec<Job>,
    pub target_word_count: NonZeroU32,
}

impl Batch {
    pub fn new(jobs: Vec<Job>, target_word_count: NonZeroU32) -> Self {
        Self {
            jobs,
            target_word_count,
        }
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ExtractionResult {
    pub job_ordinal: usize,
    /// One entry per requested selector, in selector order
    pub segments: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub text: String,
    pub target_word_count: NonZeroU32,
}

impl Prompt {
    /// Rough token allowance for the requested length, about 4 tokens per 3 words.
    pub fn token_budget(&self) -> u32 {
        let words = self.target_word_count.get();
        words.saturating_mul(4).div_ceil(3)
    }
}

/// Lifecycle stage of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Pending,
    Extracting,
    Prompting,
    Generating,
    Succeeded,
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Pending => "pending",
            Stage::Extracting => "extraction",
            Stage::Prompting => "prompting",
            Stage::Generating => "generation",
            Stage::Succeeded => "succeeded",
            Stage::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobOutcome {
    Success {
        job_ordinal: usize,
        source: String,
        text: String,
    },
    Failure {
        job_ordinal: usize,
        source: String,
        /// Stage the job was in when it failed
        stage: Stage,
        error_kind: ErrorKind,
        message: String,
    },
}

impl JobOutcome {
    pub fn failure(job: &Job, stage: Stage, error: &Error) -> Self {
        JobOutcome::Failure {
            job_ordinal: job.ordinal,
            source: job.source.to_string(),
            stage,
            error_kind: error.kind(),
            message: error.to_string(),
        }
    }

    pub fn job_ordinal(&self) -> usize {
        match self {
            JobOutcome::Success { job_ordinal, .. } | JobOutcome::Failure { job_ordinal, .. } => {
                *job_ordinal
            }
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, JobOutcome::Success { .. })
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            JobOutcome::Success { text, .. } => Some(text),
            JobOutcome::Failure { .. } => None,
        }
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            JobOutcome::Success { .. } => None,
            JobOutcome::Failure { error_kind, .. } => Some(*error_kind),
        }
    }
}

/// Outcomes of a finished batch, sorted by job ordinal.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BatchResult {
    pub outcomes: Vec<JobOutcome>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub cancelled: bool,
}

impl BatchResult {
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &JobOutcome> {
        self.outcomes.iter()
    }

    pub fn success_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failure_count(&self) -> usize {
        self.len() - self.success_count()
    }

    /// Generated texts in ordinal order; failed jobs map to an empty string.
    pub fn blogs(&self) -> Vec<String> {
        self.outcomes
            .iter()
            .map(|o| o.text().unwrap_or_default().to_string())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_budget_rounds_up() {
        let prompt = Prompt {
            text: String::new(),
            target_word_count: NonZeroU32::new(400).unwrap(),
        };
        assert_eq!(prompt.token_budget(), 534);

        let tiny = Prompt {
            text: String::new(),
            target_word_count: NonZeroU32::new(1).unwrap(),
        };
        assert_eq!(tiny.token_budget(), 2);
    }

    #[test]
    fn outcome_serializes_with_status_tag() {
        let job = Job::new(3, Url::parse("https://example.com/a").unwrap(), vec![0]);
        let outcome = JobOutcome::failure(&job, Stage::Extracting, &Error::Cancelled);
        let value = serde_json::to_value(&outcome).unwrap();
        assert_eq!(value["status"], "failure");
        assert_eq!(value["job_ordinal"], 3);
        assert_eq!(value["stage"], "extracting");
        assert_eq!(value["error_kind"], "cancelled");
    }
}
