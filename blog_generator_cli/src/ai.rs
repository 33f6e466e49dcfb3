use crate::config::SamplingParams;
use crate::error::{Error, Result};
use crate::Prompt;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

/// Opaque text generation capability.
///
/// Implementations must tolerate concurrent calls from independent jobs.
#[async_trait]
pub trait GenerationService: Send + Sync {
    async fn generate(&self, prompt: &Prompt) -> Result<String>;
}

fn auth_headers(api_key: &str) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", api_key))
            .map_err(|_| Error::config("API key contains invalid header characters", "api_key"))?,
    );
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    Ok(headers)
}

fn build_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| Error::Internal(format!("failed to build HTTP client: {e}")))
}

fn send_error(e: reqwest::Error, timeout: Duration) -> Error {
    if e.is_timeout() {
        Error::Timeout {
            stage: "generation".into(),
            after: timeout,
        }
    } else {
        Error::generation(e.to_string())
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let snippet: String = body.chars().take(200).collect();
    Err(Error::Generation {
        message: format!("backend returned HTTP {status}: {snippet}"),
        status: Some(status.as_u16()),
    })
}

/// OpenAI-compatible chat completions backend.
pub struct ChatCompletionGenerator {
    client: reqwest::Client,
    headers: HeaderMap,
    model: String,
    endpoint: String,
    sampling: SamplingParams,
    timeout: Duration,
}

impl ChatCompletionGenerator {
    pub fn new(
        api_key: String,
        model: String,
        endpoint: String,
        sampling: SamplingParams,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            headers: auth_headers(&api_key)?,
            model,
            endpoint,
            sampling,
            timeout,
        })
    }
}

#[async_trait]
impl GenerationService for ChatCompletionGenerator {
    async fn generate(&self, prompt: &Prompt) -> Result<String> {
        let payload = json!({
            "model": self.model,
            "messages": [
                {
                    "role": "system",
                    "content": "You are a blog writer who turns source material into well structured, readable articles."
                },
                {
                    "role": "user",
                    "content": prompt.text
                }
            ],
            "temperature": self.sampling.temperature,
            "top_p": self.sampling.top_p,
            "max_tokens": prompt.token_budget().min(self.sampling.max_new_tokens)
        });

        let response = self
            .client
            .post(&self.endpoint)
            .headers(self.headers.clone())
            .json(&payload)
            .send()
            .await
            .map_err(|e| send_error(e, self.timeout))?;
        let response = check_status(response).await?;

        let result = response
            .json::<serde_json::Value>()
            .await
            .map_err(|e| Error::generation(format!("malformed response: {e}")))?;
        result["choices"][0]["message"]["content"]
            .as_str()
            .map(|s| s.trim().to_string())
            .ok_or_else(|| Error::generation("response did not contain a completion"))
    }
}

/// Hosted causal language model behind the Hugging Face inference API.
pub struct HuggingFaceGenerator {
    client: reqwest::Client,
    headers: HeaderMap,
    url: String,
    sampling: SamplingParams,
    timeout: Duration,
}

#[derive(Deserialize)]
struct GeneratedText {
    generated_text: String,
}

impl HuggingFaceGenerator {
    pub fn new(
        api_key: String,
        model: String,
        endpoint: String,
        sampling: SamplingParams,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            headers: auth_headers(&api_key)?,
            url: format!("{}/{}", endpoint.trim_end_matches('/'), model),
            sampling,
            timeout,
        })
    }
}

#[async_trait]
impl GenerationService for HuggingFaceGenerator {
    async fn generate(&self, prompt: &Prompt) -> Result<String> {
        let payload = json!({
            "inputs": prompt.text,
            "parameters": {
                "max_new_tokens": prompt.token_budget().min(self.sampling.max_new_tokens),
                "temperature": self.sampling.temperature,
                "top_k": self.sampling.top_k,
                "top_p": self.sampling.top_p,
                "do_sample": self.sampling.do_sample,
                "num_return_sequences": 1,
                "return_full_text": false
            },
            "options": { "wait_for_model": true }
        });

        let response = self
            .client
            .post(&self.url)
            .headers(self.headers.clone())
            .json(&payload)
            .send()
            .await
            .map_err(|e| send_error(e, self.timeout))?;
        let response = check_status(response).await?;

        let generated = response
            .json::<Vec<GeneratedText>>()
            .await
            .map_err(|e| Error::generation(format!("malformed response: {e}")))?;
        generated
            .into_iter()
            .next()
            .map(|g| g.generated_text.trim().to_string())
            .ok_or_else(|| Error::generation("model returned no sequences"))
    }
}
