//! Bounded retry for stage calls.
//!
//! [`RetryingExtractor`] and [`RetryingGenerator`] wrap any stage
//! implementation and present the same trait, so the pipeline does not know
//! whether retries are in play. Each attempt gets its own time budget; a
//! timed-out attempt is retried like any other transient failure.

use crate::ai::GenerationService;
use crate::config::RetryConfig;
use crate::error::{Error, Result};
use crate::scraper::ContentExtractor;
use crate::{ExtractionResult, Job, Prompt};
use async_trait::async_trait;
use backoff::future::retry;
use backoff::ExponentialBackoffBuilder;
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Bounds `fut` to `after`; running out of time is a `Timeout` for `stage`.
pub async fn timed<T>(stage: &str, after: Duration, fut: impl Future<Output = Result<T>>) -> Result<T> {
    tokio::time::timeout(after, fut).await.map_err(|_| Error::Timeout {
        stage: stage.to_string(),
        after,
    })?
}

/// Runs `operation` until it succeeds, fails permanently, or
/// `config.max_attempts` attempts have been made.
pub async fn with_retry<T, F, Fut>(config: &RetryConfig, label: &str, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let policy = ExponentialBackoffBuilder::new()
        .with_initial_interval(config.initial_delay)
        .with_max_interval(config.max_delay)
        .with_multiplier(config.multiplier)
        .with_max_elapsed_time(None)
        .build();

    let attempts = AtomicU32::new(0);
    let attempts = &attempts;
    let max_attempts = config.max_attempts.max(1);

    retry(policy, || {
        let fut = operation();
        async move {
            let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
            match fut.await {
                Ok(value) => Ok(value),
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    tracing::warn!(label, attempt, max_attempts, error = %e, "retrying after transient failure");
                    Err(backoff::Error::transient(e))
                }
                Err(e) => Err(backoff::Error::permanent(e)),
            }
        }
    })
    .await
}

pub struct RetryingExtractor {
    inner: Arc<dyn ContentExtractor>,
    config: RetryConfig,
    attempt_timeout: Duration,
}

impl RetryingExtractor {
    pub fn new(inner: Arc<dyn ContentExtractor>, config: RetryConfig, attempt_timeout: Duration) -> Self {
        Self {
            inner,
            config,
            attempt_timeout,
        }
    }
}

#[async_trait]
impl ContentExtractor for RetryingExtractor {
    async fn extract(&self, job: &Job) -> Result<ExtractionResult> {
        let inner = &self.inner;
        let after = self.attempt_timeout;
        with_retry(&self.config, "extract", move || timed("fetch", after, inner.extract(job))).await
    }
}

pub struct RetryingGenerator {
    inner: Arc<dyn GenerationService>,
    config: RetryConfig,
    attempt_timeout: Duration,
}

impl RetryingGenerator {
    pub fn new(inner: Arc<dyn GenerationService>, config: RetryConfig, attempt_timeout: Duration) -> Self {
        Self {
            inner,
            config,
            attempt_timeout,
        }
    }
}

#[async_trait]
impl GenerationService for RetryingGenerator {
    async fn generate(&self, prompt: &Prompt) -> Result<String> {
        let inner = &self.inner;
        let after = self.attempt_timeout;
        with_retry(&self.config, "generate", move || {
            timed("generation", after, inner.generate(prompt))
        })
        .await
    }
}

/// Wraps the extractor only when more than one attempt is configured.
pub fn maybe_retry_extractor(
    inner: Arc<dyn ContentExtractor>,
    config: &RetryConfig,
    attempt_timeout: Duration,
) -> Arc<dyn ContentExtractor> {
    if config.max_attempts > 1 {
        Arc::new(RetryingExtractor::new(inner, config.clone(), attempt_timeout))
    } else {
        inner
    }
}

pub fn maybe_retry_generator(
    inner: Arc<dyn GenerationService>,
    config: &RetryConfig,
    attempt_timeout: Duration,
) -> Arc<dyn GenerationService> {
    if config.max_attempts > 1 {
        Arc::new(RetryingGenerator::new(inner, config.clone(), attempt_timeout))
    } else {
        inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    fn fast(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            multiplier: 2.0,
        }
    }

    struct FlakyExtractor {
        failures_left: AtomicU32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl ContentExtractor for FlakyExtractor {
        async fn extract(&self, job: &Job) -> Result<ExtractionResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.failures_left.load(Ordering::SeqCst) > 0 {
                self.failures_left.fetch_sub(1, Ordering::SeqCst);
                return Err(Error::Fetch {
                    url: job.source.to_string(),
                    message: "connection reset".into(),
                });
            }
            Ok(ExtractionResult {
                job_ordinal: job.ordinal,
                segments: vec!["ok".into()],
            })
        }
    }

    fn job() -> Job {
        Job::new(0, Url::parse("https://example.com").unwrap(), vec![0])
    }

    #[tokio::test]
    async fn recovers_from_transient_fetch_errors() {
        let flaky = Arc::new(FlakyExtractor {
            failures_left: AtomicU32::new(2),
            calls: AtomicU32::new(0),
        });
        let extractor = RetryingExtractor::new(flaky.clone(), fast(3), Duration::from_secs(5));
        let result = extractor.extract(&job()).await.unwrap();
        assert_eq!(result.segments, vec!["ok"]);
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let flaky = Arc::new(FlakyExtractor {
            failures_left: AtomicU32::new(10),
            calls: AtomicU32::new(0),
        });
        let extractor = RetryingExtractor::new(flaky.clone(), fast(2), Duration::from_secs(5));
        let err = extractor.extract(&job()).await.unwrap_err();
        assert!(matches!(err, Error::Fetch { .. }));
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn permanent_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let err = with_retry(&fast(5), "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(Error::generation("bad prompt")) }
        })
        .await
        .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Generation);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    struct StallOnceGenerator {
        calls: AtomicU32,
    }

    #[async_trait]
    impl GenerationService for StallOnceGenerator {
        async fn generate(&self, _prompt: &Prompt) -> Result<String> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
            Ok("written".into())
        }
    }

    #[tokio::test]
    async fn stalled_attempt_is_cut_off_and_retried() {
        let stalling = Arc::new(StallOnceGenerator {
            calls: AtomicU32::new(0),
        });
        let generator = RetryingGenerator::new(stalling.clone(), fast(2), Duration::from_millis(50));
        let prompt = Prompt {
            text: "write".into(),
            target_word_count: std::num::NonZeroU32::new(10).unwrap(),
        };
        assert_eq!(generator.generate(&prompt).await.unwrap(), "written");
        assert_eq!(stalling.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn stage_budget_covers_every_attempt() {
        let config = fast(3);
        let budget = config.stage_budget(Duration::from_millis(100));
        assert!(budget >= Duration::from_millis(300) + Duration::from_millis(10));
        assert_eq!(fast(1).stage_budget(Duration::from_millis(100)), Duration::from_millis(100));
    }
}
