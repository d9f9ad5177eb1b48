//! Thin facade over an OpenAI-compatible chat-completions endpoint.
//!
//! Study tips and essay feedback are optional extras: when the collaborator
//! is not configured or misbehaves, callers get a fixed fallback instead of
//! an error.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::AiError;

pub const FALLBACK_TIP: &str =
    "Link the quote to its theme in one sentence, then say it aloud without looking.";

const TIP_SYSTEM: &str = "You coach HSC English students. Reply with one short, concrete study \
tip (at most two sentences) for memorising and analysing the given quote.";

const ESSAY_SYSTEM: &str = "You mark HSC English essays. Reply with JSON only, shaped as \
{\"band\": 1-6, \"summary\": string, \"strengths\": [string], \"improvements\": [string]}.";

#[derive(Clone)]
pub struct AiConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
}

impl fmt::Debug for AiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AiConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .finish()
    }
}

/// One system+user round trip returning the model's text.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// # Errors
    ///
    /// Returns `AiError` when the request fails or yields no text.
    async fn complete(&self, system: &str, prompt: &str) -> Result<String, AiError>;
}

/// Structured essay feedback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackReport {
    /// HSC band 1-6; `None` when no mark could be given.
    pub band: Option<u8>,
    pub summary: String,
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub improvements: Vec<String>,
}

impl FeedbackReport {
    /// Returned whenever the collaborator cannot produce usable feedback.
    #[must_use]
    pub fn fallback() -> Self {
        Self {
            band: None,
            summary: "Feedback is unavailable right now. Your essay was not marked; try again later."
                .into(),
            strengths: Vec::new(),
            improvements: Vec::new(),
        }
    }

    fn parse(raw: &str) -> Result<Self, AiError> {
        let body = raw
            .trim()
            .trim_start_matches("```json")
            .trim_start_matches("```")
            .trim_end_matches("```")
            .trim();
        let report: Self =
            serde_json::from_str(body).map_err(|e| AiError::Malformed(e.to_string()))?;
        if report.band.is_some_and(|band| !(1..=6).contains(&band)) {
            return Err(AiError::Malformed(format!("band {:?} out of range", report.band)));
        }
        if report.summary.trim().is_empty() {
            return Err(AiError::Malformed("empty summary".into()));
        }
        Ok(report)
    }
}

/// `reqwest` client for `{base_url}/chat/completions`.
#[derive(Clone)]
pub struct ChatCompletionsClient {
    client: Client,
    config: AiConfig,
}

impl ChatCompletionsClient {
    #[must_use]
    pub fn new(config: AiConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }
}

#[async_trait]
impl TextGenerator for ChatCompletionsClient {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String, AiError> {
        let url = format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );
        let payload = ChatRequest {
            model: self.config.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: prompt.to_string(),
                },
            ],
            temperature: 0.2,
        };

        let response = self
            .client
            .post(url)
            .bearer_auth(&self.config.api_key)
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AiError::HttpStatus(response.status()));
        }

        let body: ChatResponse = response.json().await?;
        let content = body
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
            .ok_or(AiError::EmptyResponse)?;

        Ok(content)
    }
}

/// Tips and essay marking with documented fallbacks.
#[derive(Clone)]
pub struct AiService {
    generator: Option<Arc<dyn TextGenerator>>,
}

impl AiService {
    #[must_use]
    pub fn new(config: Option<AiConfig>) -> Self {
        Self {
            generator: config
                .map(|c| Arc::new(ChatCompletionsClient::new(c)) as Arc<dyn TextGenerator>),
        }
    }

    #[must_use]
    pub fn with_generator(generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            generator: Some(generator),
        }
    }

    #[must_use]
    pub fn disabled() -> Self {
        Self { generator: None }
    }

    #[must_use]
    pub fn enabled(&self) -> bool {
        self.generator.is_some()
    }

    async fn complete(&self, system: &str, prompt: &str) -> Result<String, AiError> {
        let generator = self.generator.as_ref().ok_or(AiError::Disabled)?;
        generator.complete(system, prompt).await
    }

    /// # Errors
    ///
    /// Returns `AiError` when disabled or when the request fails.
    pub async fn try_generate_tip(&self, context: &str) -> Result<String, AiError> {
        self.complete(TIP_SYSTEM, context).await
    }

    /// A study tip for `context`, or [`FALLBACK_TIP`].
    pub async fn generate_tip(&self, context: &str) -> String {
        match self.try_generate_tip(context).await {
            Ok(tip) => tip,
            Err(err) => {
                warn!(error = %err, "tip generation failed, using fallback");
                FALLBACK_TIP.to_string()
            }
        }
    }

    /// # Errors
    ///
    /// Returns `AiError::Malformed` when the reply is not a valid report,
    /// or any transport error.
    pub async fn try_grade_essay(&self, content: &str) -> Result<FeedbackReport, AiError> {
        let raw = self.complete(ESSAY_SYSTEM, content).await?;
        FeedbackReport::parse(&raw)
    }

    /// Feedback for an essay, or [`FeedbackReport::fallback`].
    pub async fn grade_essay(&self, content: &str) -> FeedbackReport {
        if content.trim().is_empty() {
            return FeedbackReport::fallback();
        }
        match self.try_grade_essay(content).await {
            Ok(report) => report,
            Err(err) => {
                warn!(error = %err, "essay grading failed, using fallback");
                FeedbackReport::fallback()
            }
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Debug, Deserialize)]
struct ChatMessageResponse {
    content: Option<String>,
}
