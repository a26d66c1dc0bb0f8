//! Text generation collaborator.
//!
//! `HttpGenerator` talks to any OpenAI-compatible chat completions endpoint.
//! Rate-limit and server errors are retried with exponential backoff
//! (`retry_backoff_ms * 2^(attempt - 1)`); everything else fails immediately.

use async_trait::async_trait;
use reqwest::{Client as HttpClient, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio::time::{sleep, Duration};
use tracing::{debug, warn};

use crate::config::AiConfig;
use crate::error::AiError;
use crate::sanitize::{preview, redact_endpoint};

#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Sends one prompt and returns the raw model output.
    async fn generate(&self, prompt: &str) -> Result<String, AiError>;
}

pub struct HttpGenerator {
    client: HttpClient,
    endpoint: String,
    model: String,
    api_key: SecretString,
    max_retries: u32,
    retry_backoff_ms: u64,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

enum Attempt {
    Done(String),
    Retry(String),
    Fatal(AiError),
}

impl HttpGenerator {
    pub fn new(config: &AiConfig, api_key: SecretString) -> Result<Self, AiError> {
        let client = HttpClient::builder()
            .user_agent(concat!("tallyscan/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AiError::AnalysisFailed(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            api_key,
            max_retries: config.max_retries,
            retry_backoff_ms: config.retry_backoff_ms,
        })
    }

    async fn attempt(&self, prompt: &str) -> Attempt {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: 0.0,
        };

        let response = match self
            .client
            .post(&self.endpoint)
            .bearer_auth(self.api_key.expose_secret())
            .json(&request)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) if e.is_timeout() || e.is_connect() => return Attempt::Retry(e.to_string()),
            Err(e) => return Attempt::Fatal(AiError::AnalysisFailed(e.to_string())),
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = format!("HTTP {}: {}", status.as_u16(), preview(&body, 200));
            return if is_transient(status) {
                Attempt::Retry(message)
            } else {
                Attempt::Fatal(AiError::AnalysisFailed(message))
            };
        }

        match response.json::<ChatResponse>().await {
            Ok(body) => match first_content(body) {
                Some(content) => Attempt::Done(content),
                None => Attempt::Fatal(AiError::AnalysisFailed(
                    "response contained no message content".to_string(),
                )),
            },
            Err(e) => Attempt::Fatal(AiError::AnalysisFailed(format!(
                "malformed completion response: {}",
                e
            ))),
        }
    }
}

#[async_trait]
impl TextGenerator for HttpGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, AiError> {
        let mut last_error = String::new();

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let backoff = backoff_ms(self.retry_backoff_ms, attempt);
                warn!(
                    endpoint = %redact_endpoint(&self.endpoint),
                    "retry {}/{} after {}ms: {}",
                    attempt,
                    self.max_retries,
                    backoff,
                    last_error
                );
                sleep(Duration::from_millis(backoff)).await;
            }

            match self.attempt(prompt).await {
                Attempt::Done(content) => {
                    debug!(chars = content.len(), attempts = attempt + 1, "completion received");
                    return Ok(content);
                }
                Attempt::Retry(message) => last_error = message,
                Attempt::Fatal(e) => return Err(e),
            }
        }

        Err(AiError::AnalysisFailed(format!(
            "gave up after {} attempts: {}",
            self.max_retries + 1,
            last_error
        )))
    }
}

fn is_transient(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn backoff_ms(base: u64, attempt: u32) -> u64 {
    base.saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)))
}

fn first_content(body: ChatResponse) -> Option<String> {
    body.choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .filter(|c| !c.trim().is_empty())
}
