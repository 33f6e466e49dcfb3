//! Configuration for the pipeline and the generation backends.
//!
//! Values come from the environment (a `.env` file is honoured by the
//! binaries) and can be overridden field by field from the command line.

use crate::ai::{ChatCompletionGenerator, GenerationService, HuggingFaceGenerator};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::sync::Arc;
use std::time::Duration;

/// Fan-out limits and time budgets for a batch run
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Maximum jobs in flight (default: available CPUs x 2)
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Budget for fetching one document
    #[serde(default = "default_fetch_timeout", with = "secs")]
    pub fetch_timeout: Duration,

    /// Budget for one generation call
    #[serde(default = "default_generation_timeout", with = "secs")]
    pub generation_timeout: Duration,

    /// Whole-batch deadline; unfinished jobs are cancelled when it fires
    #[serde(default, with = "opt_secs")]
    pub batch_timeout: Option<Duration>,

    /// CSS selector identifying paragraph blocks
    #[serde(default = "default_paragraph_selector")]
    pub paragraph_selector: String,

    /// Cap on source characters embedded in a prompt (None = unlimited)
    #[serde(default = "default_max_content_chars")]
    pub max_content_chars: Option<usize>,

    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            fetch_timeout: default_fetch_timeout(),
            generation_timeout: default_generation_timeout(),
            batch_timeout: None,
            paragraph_selector: default_paragraph_selector(),
            max_content_chars: default_max_content_chars(),
            retry: RetryConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Some(n) = env_parse::<usize>("BLOG_CONCURRENCY")? {
            config.concurrency = n;
        }
        if let Some(secs) = env_parse::<u64>("BLOG_FETCH_TIMEOUT_SECS")? {
            config.fetch_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = env_parse::<u64>("BLOG_GENERATION_TIMEOUT_SECS")? {
            config.generation_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = env_parse::<u64>("BLOG_BATCH_TIMEOUT_SECS")? {
            config.batch_timeout = Some(Duration::from_secs(secs));
        }
        if let Some(attempts) = env_parse::<u32>("BLOG_RETRY_ATTEMPTS")? {
            config.retry.max_attempts = attempts;
        }
        if let Ok(selector) = env::var("BLOG_PARAGRAPH_SELECTOR") {
            config.paragraph_selector = selector;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(Error::config(
                "concurrency must be at least 1",
                "BLOG_CONCURRENCY",
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(Error::config(
                "retry attempts must be at least 1",
                "BLOG_RETRY_ATTEMPTS",
            ));
        }
        Ok(())
    }

    /// Worker count for a batch of `batch_len` jobs.
    pub fn workers_for(&self, batch_len: usize) -> usize {
        self.concurrency.min(batch_len).max(1)
    }
}

/// Bounded retry with exponential backoff
///
/// `max_attempts = 1` disables retrying.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_delay", with = "millis")]
    pub initial_delay: Duration,

    #[serde(default = "default_max_delay", with = "millis")]
    pub max_delay: Duration,

    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            multiplier: default_multiplier(),
        }
    }
}

impl RetryConfig {
    /// Time a whole stage may take: every attempt at `per_attempt` plus the
    /// waits between them.
    pub fn stage_budget(&self, per_attempt: Duration) -> Duration {
        let attempts = self.max_attempts.max(1);
        // backoff jitter stretches a wait up to 1.5x the capped interval
        per_attempt * attempts + self.max_delay.mul_f64(1.5) * (attempts - 1)
    }
}

/// Sampling settings passed to the model
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SamplingParams {
    #[serde(default = "default_max_new_tokens")]
    pub max_new_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_top_k")]
    pub top_k: u32,
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    #[serde(default = "default_true")]
    pub do_sample: bool,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            max_new_tokens: default_max_new_tokens(),
            temperature: default_temperature(),
            top_k: default_top_k(),
            top_p: default_top_p(),
            do_sample: true,
        }
    }
}

/// Which text-generation backend to talk to
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum GeneratorConfig {
    /// Hosted causal language model behind the Hugging Face inference API
    HuggingFace {
        api_key: String,
        #[serde(default = "default_hf_model")]
        model: String,
        #[serde(default = "default_hf_endpoint")]
        endpoint: String,
        #[serde(default)]
        sampling: SamplingParams,
    },
    /// OpenAI-compatible chat completions endpoint
    OpenAi {
        api_key: String,
        #[serde(default = "default_openai_model")]
        model: String,
        #[serde(default = "default_openai_endpoint")]
        endpoint: String,
        #[serde(default)]
        sampling: SamplingParams,
    },
}

impl GeneratorConfig {
    /// Reads `GENERATOR_BACKEND` and the matching credentials.
    pub fn from_env() -> Result<Self> {
        let backend = env::var("GENERATOR_BACKEND").unwrap_or_else(|_| "huggingface".to_string());
        match backend.to_lowercase().as_str() {
            "huggingface" | "hf" => Ok(GeneratorConfig::HuggingFace {
                api_key: require_env("HUGGINGFACE_API_KEY")?,
                model: env::var("HUGGINGFACE_MODEL").unwrap_or_else(|_| default_hf_model()),
                endpoint: env::var("HUGGINGFACE_ENDPOINT").unwrap_or_else(|_| default_hf_endpoint()),
                sampling: SamplingParams::default(),
            }),
            "openai" => Ok(GeneratorConfig::OpenAi {
                api_key: require_env("OPENAI_API_KEY")?,
                model: env::var("OPENAI_MODEL").unwrap_or_else(|_| default_openai_model()),
                endpoint: env::var("OPENAI_ENDPOINT").unwrap_or_else(|_| default_openai_endpoint()),
                sampling: SamplingParams::default(),
            }),
            other => Err(Error::config(
                format!("unknown generator backend '{other}' (expected huggingface or openai)"),
                "GENERATOR_BACKEND",
            )),
        }
    }

    /// Builds the generator; the caller owns it and hands it to the pipeline.
    pub fn build(&self, timeout: Duration) -> Result<Arc<dyn GenerationService>> {
        let generator: Arc<dyn GenerationService> = match self {
            GeneratorConfig::HuggingFace {
                api_key,
                model,
                endpoint,
                sampling,
            } => Arc::new(HuggingFaceGenerator::new(
                api_key.clone(),
                model.clone(),
                endpoint.clone(),
                sampling.clone(),
                timeout,
            )?),
            GeneratorConfig::OpenAi {
                api_key,
                model,
                endpoint,
                sampling,
            } => Arc::new(ChatCompletionGenerator::new(
                api_key.clone(),
                model.clone(),
                endpoint.clone(),
                sampling.clone(),
                timeout,
            )?),
        };
        Ok(generator)
    }
}

fn require_env(key: &str) -> Result<String> {
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(Error::config(format!("{key} environment variable not set"), key)),
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| Error::config(format!("invalid value '{raw}' for {key}"), key)),
        Err(_) => Ok(None),
    }
}

fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(2)
        .saturating_mul(2)
}

fn default_fetch_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_generation_timeout() -> Duration {
    Duration::from_secs(120)
}

fn default_paragraph_selector() -> String {
    "p".to_string()
}

fn default_max_content_chars() -> Option<usize> {
    Some(6_000)
}

fn default_max_attempts() -> u32 {
    1
}

fn default_initial_delay() -> Duration {
    Duration::from_millis(500)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(10)
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_max_new_tokens() -> u32 {
    700
}

fn default_temperature() -> f32 {
    1.0
}

fn default_top_k() -> u32 {
    50
}

fn default_top_p() -> f32 {
    0.95
}

fn default_true() -> bool {
    true
}

fn default_hf_model() -> String {
    "EleutherAI/gpt-neo-2.7B".to_string()
}

fn default_hf_endpoint() -> String {
    "https://api-inference.huggingface.co/models".to_string()
}

fn default_openai_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_openai_endpoint() -> String {
    "https://api.openai.com/v1/chat/completions".to_string()
}

mod secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

mod opt_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => s.serialize_some(&d.as_secs()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?.map(Duration::from_secs))
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sampling_defaults_follow_gpt_neo_settings() {
        let sampling = SamplingParams::default();
        assert_eq!(sampling.max_new_tokens, 700);
        assert_eq!(sampling.top_k, 50);
        assert!((sampling.top_p - 0.95).abs() < f32::EPSILON);
        assert!(sampling.do_sample);
    }

    #[test]
    fn workers_are_capped_by_batch_size() {
        let config = PipelineConfig {
            concurrency: 8,
            ..Default::default()
        };
        assert_eq!(config.workers_for(3), 3);
        assert_eq!(config.workers_for(20), 8);
        assert_eq!(config.workers_for(0), 1);
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let config = PipelineConfig {
            concurrency: 0,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn deserializes_with_defaults() {
        let config: PipelineConfig =
            serde_json::from_str(r#"{"concurrency": 4, "batch_timeout": 90}"#).unwrap();
        assert_eq!(config.concurrency, 4);
        assert_eq!(config.batch_timeout, Some(Duration::from_secs(90)));
        assert_eq!(config.fetch_timeout, Duration::from_secs(30));
        assert_eq!(config.paragraph_selector, "p");
        assert_eq!(config.retry.max_attempts, 1);
    }

    #[test]
    fn generator_config_uses_backend_tag() {
        let config: GeneratorConfig =
            serde_json::from_str(r#"{"backend": "open_ai", "api_key": "k"}"#).unwrap();
        match config {
            GeneratorConfig::OpenAi { model, endpoint, .. } => {
                assert_eq!(model, "gpt-4o-mini");
                assert!(endpoint.ends_with("/chat/completions"));
            }
            other => panic!("unexpected config: {other:?}"),
        }
    }
}
