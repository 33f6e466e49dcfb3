//! Wire format of `POST /generate_blog` and a client for it.

use crate::error::{Error, Result};
use crate::{Batch, BatchResult, Job, JobOutcome, Stage};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GenerateBlogRequest {
    /// `[[url, [indices...]], ...]`
    pub urls_and_indices: Vec<(String, Vec<usize>)>,
    pub no_words: u32,
}

impl From<&Batch> for GenerateBlogRequest {
    fn from(batch: &Batch) -> Self {
        Self {
            urls_and_indices: batch
                .jobs
                .iter()
                .map(|job| (job.source.to_string(), job.selectors.clone()))
                .collect(),
            no_words: batch.target_word_count.get(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GenerateBlogResponse {
    /// One entry per job in request order; empty for failed jobs
    pub blogs: Vec<String>,
    #[serde(default)]
    pub outcomes: Vec<JobOutcome>,
}

impl From<&BatchResult> for GenerateBlogResponse {
    fn from(result: &BatchResult) -> Self {
        Self {
            blogs: result.blogs(),
            outcomes: result.outcomes.clone(),
        }
    }
}

/// Calls a blog generation server instead of running the pipeline locally.
pub struct RemoteBlogClient {
    client: reqwest::Client,
    endpoint: String,
}

impl RemoteBlogClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Internal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint: format!("{}/generate_blog", base_url.trim_end_matches('/')),
        })
    }

    pub async fn generate(&self, batch: &Batch) -> Result<BatchResult> {
        let started_at = Utc::now();
        let request = GenerateBlogRequest::from(batch);
        tracing::info!(endpoint = %self.endpoint, jobs = batch.len(), "submitting batch to remote generator");

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::generation(format!("request to {} failed: {e}", self.endpoint)))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Generation {
                message: format!("Error: {} - {}", status.as_u16(), body),
                status: Some(status.as_u16()),
            });
        }

        let body: GenerateBlogResponse = response
            .json()
            .await
            .map_err(|e| Error::generation(format!("malformed response: {e}")))?;

        let outcomes = if body.outcomes.len() == batch.len() {
            body.outcomes
        } else if body.blogs.len() == batch.len() {
            batch
                .jobs
                .iter()
                .zip(body.blogs)
                .map(|(job, text)| blog_outcome(job, text))
                .collect()
        } else {
            return Err(Error::generation(format!(
                "remote server returned {} blogs for {} jobs",
                body.blogs.len(),
                batch.len()
            )));
        };

        Ok(BatchResult {
            outcomes,
            started_at,
            finished_at: Utc::now(),
            cancelled: false,
        })
    }
}

/// Plain `blogs` entries carry no error detail; an empty one marks a failed job.
fn blog_outcome(job: &Job, text: String) -> JobOutcome {
    if text.is_empty() {
        JobOutcome::failure(
            job,
            Stage::Failed,
            &Error::generation("remote server returned no text for this job"),
        )
    } else {
        JobOutcome::Success {
            job_ordinal: job.ordinal,
            source: job.source.to_string(),
            text,
        }
    }
}
