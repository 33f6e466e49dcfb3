//! Batch orchestration.
//!
//! Every job runs extract -> prompt -> generate in its own tokio task. At most
//! `workers_for(batch.len())` tasks are in flight; a task is only spawned when
//! a slot frees up. Each task records its outcome in a shared ordinal-keyed
//! map, which is read once every task has finished.
//!
//! Stage calls race the batch's cancellation token, so a cancelled batch does
//! not wait for in-flight fetches or generation calls.

use crate::ai::GenerationService;
use crate::config::PipelineConfig;
use crate::error::{Error, Result};
use crate::prompt::PromptBuilder;
use crate::retry::{maybe_retry_extractor, maybe_retry_generator, timed};
use crate::scraper::{ContentExtractor, HtmlExtractor};
use crate::{Batch, BatchResult, Job, JobOutcome, Stage};
use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::collections::{BTreeMap, HashSet};
use std::future::Future;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

pub struct BatchPipeline {
    extractor: Arc<dyn ContentExtractor>,
    generator: Arc<dyn GenerationService>,
    prompts: PromptBuilder,
    config: PipelineConfig,
}

/// Everything a single job task needs, shared by all tasks of one batch.
struct JobContext {
    extractor: Arc<dyn ContentExtractor>,
    generator: Arc<dyn GenerationService>,
    prompts: PromptBuilder,
    /// Whole-stage budgets, retries included
    fetch_budget: Duration,
    generation_budget: Duration,
    target_word_count: NonZeroU32,
}

impl BatchPipeline {
    /// Both stages are wrapped in the configured retry policy, with the stage
    /// timeouts applied to each attempt.
    pub fn new(
        extractor: Arc<dyn ContentExtractor>,
        generator: Arc<dyn GenerationService>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            extractor: maybe_retry_extractor(extractor, &config.retry, config.fetch_timeout),
            generator: maybe_retry_generator(generator, &config.retry, config.generation_timeout),
            prompts: PromptBuilder::new(config.max_content_chars),
            config,
        }
    }

    /// HTML extractor plus the given generator.
    pub fn from_config(config: PipelineConfig, generator: Arc<dyn GenerationService>) -> Result<Self> {
        config.validate()?;
        let extractor = Arc::new(HtmlExtractor::new(config.fetch_timeout, &config.paragraph_selector)?);
        Ok(Self::new(extractor, generator, config))
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub async fn run(&self, batch: Batch) -> Result<BatchResult> {
        self.run_with_cancel(batch, CancellationToken::new()).await
    }

    /// Runs every job of `batch` to a terminal outcome.
    ///
    /// Cancelling `cancel` stops the batch at the next stage boundary of each
    /// job; jobs that had not finished are reported as `Cancelled`. Only a
    /// malformed batch is returned as `Err`.
    pub async fn run_with_cancel(&self, batch: Batch, cancel: CancellationToken) -> Result<BatchResult> {
        validate(&batch)?;

        let started_at = Utc::now();
        let cancel = cancel.child_token();
        let workers = self.config.workers_for(batch.len());
        tracing::info!(jobs = batch.len(), workers, "starting batch");

        let deadline = self.config.batch_timeout.map(|after| {
            let token = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(after).await;
                if !token.is_cancelled() {
                    tracing::warn!(?after, "batch deadline reached, cancelling unfinished jobs");
                    token.cancel();
                }
            })
        });

        let ctx = Arc::new(JobContext {
            extractor: self.extractor.clone(),
            generator: self.generator.clone(),
            prompts: self.prompts.clone(),
            fetch_budget: self.config.retry.stage_budget(self.config.fetch_timeout),
            generation_budget: self.config.retry.stage_budget(self.config.generation_timeout),
            target_word_count: batch.target_word_count,
        });
        let results: Arc<Mutex<BTreeMap<usize, JobOutcome>>> = Arc::new(Mutex::new(BTreeMap::new()));

        stream::iter(batch.jobs)
            .map(|job| {
                let ctx = ctx.clone();
                let cancel = cancel.clone();
                let results = results.clone();
                let task_job = job.clone();
                let handle = tokio::spawn(async move {
                    let outcome = ctx.run_job(&task_job, &cancel).await;
                    results.lock().await.insert(task_job.ordinal, outcome);
                });
                async move { (job, handle.await) }
            })
            .buffer_unordered(workers)
            .for_each(|(job, joined)| {
                let results = results.clone();
                async move {
                    if let Err(e) = joined {
                        let err = if e.is_cancelled() {
                            Error::Cancelled
                        } else {
                            Error::Internal(format!("worker task panicked: {e}"))
                        };
                        tracing::error!(ordinal = job.ordinal, error = %err, "job task did not complete");
                        results
                            .lock()
                            .await
                            .insert(job.ordinal, JobOutcome::failure(&job, Stage::Failed, &err));
                    }
                }
            })
            .await;

        if let Some(handle) = deadline {
            handle.abort();
        }

        let outcomes: Vec<JobOutcome> = std::mem::take(&mut *results.lock().await)
            .into_values()
            .collect();
        let result = BatchResult {
            outcomes,
            started_at,
            finished_at: Utc::now(),
            cancelled: cancel.is_cancelled(),
        };
        tracing::info!(
            succeeded = result.success_count(),
            failed = result.failure_count(),
            cancelled = result.cancelled,
            "batch finished"
        );
        Ok(result)
    }
}

fn validate(batch: &Batch) -> Result<()> {
    let mut seen = HashSet::with_capacity(batch.len());
    for job in &batch.jobs {
        if job.selectors.is_empty() {
            return Err(Error::validation(format!(
                "job {} ({}) has an empty selector set",
                job.ordinal, job.source
            )));
        }
        if !seen.insert(job.ordinal) {
            return Err(Error::validation(format!("duplicate job ordinal {}", job.ordinal)));
        }
    }
    Ok(())
}

fn checkpoint(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        Err(Error::Cancelled)
    } else {
        Ok(())
    }
}

async fn until_cancelled<T>(cancel: &CancellationToken, fut: impl Future<Output = Result<T>>) -> Result<T> {
    tokio::select! {
        _ = cancel.cancelled() => Err(Error::Cancelled),
        res = fut => res,
    }
}

impl JobContext {
    async fn run_job(&self, job: &Job, cancel: &CancellationToken) -> JobOutcome {
        let mut stage = Stage::Pending;
        match self.run_stages(job, cancel, &mut stage).await {
            Ok(text) => {
                tracing::debug!(ordinal = job.ordinal, stage = %Stage::Succeeded, "job finished");
                JobOutcome::Success {
                    job_ordinal: job.ordinal,
                    source: job.source.to_string(),
                    text,
                }
            }
            Err(e) => {
                if matches!(e, Error::Cancelled) {
                    tracing::debug!(ordinal = job.ordinal, %stage, "job cancelled");
                } else {
                    tracing::warn!(ordinal = job.ordinal, url = %job.source, %stage, error = %e, "job failed");
                }
                JobOutcome::failure(job, stage, &e)
            }
        }
    }

    /// Stages run strictly in order; `stage` is left at the one that failed.
    async fn run_stages(&self, job: &Job, cancel: &CancellationToken, stage: &mut Stage) -> Result<String> {
        checkpoint(cancel)?;
        self.enter(job, stage, Stage::Extracting);
        let extraction = until_cancelled(
            cancel,
            timed("fetch", self.fetch_budget, self.extractor.extract(job)),
        )
        .await?;

        checkpoint(cancel)?;
        self.enter(job, stage, Stage::Prompting);
        let prompt = self.prompts.build(&extraction.segments, self.target_word_count);

        checkpoint(cancel)?;
        self.enter(job, stage, Stage::Generating);
        let text = until_cancelled(
            cancel,
            timed("generation", self.generation_budget, self.generator.generate(&prompt)),
        )
        .await?;

        // text from a call that straddled cancellation is dropped
        checkpoint(cancel)?;
        Ok(text)
    }

    fn enter(&self, job: &Job, stage: &mut Stage, next: Stage) {
        tracing::debug!(ordinal = job.ordinal, from = %stage, to = %next, "job stage");
        *stage = next;
    }
}
