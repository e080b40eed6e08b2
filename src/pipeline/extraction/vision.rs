//! Vision model transport: Ollama `/api/chat` with a base64 image.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use super::ExtractionError;

/// Default model for report reading.
pub const DEFAULT_VISION_MODEL: &str = "medgemma:4b";

/// Image → text model call. One image per request.
#[async_trait]
pub trait VisionClient: Send + Sync {
    async fn chat_with_image(
        &self,
        model: &str,
        system: &str,
        prompt: &str,
        image_base64: &str,
    ) -> Result<String, ExtractionError>;
}

// ──────────────────────────────────────────────
// Wire types
// ──────────────────────────────────────────────

/// Chat-based vision request. Chat-template models (MedGemma, LLaVA, Gemma)
/// reject images on `/api/generate`.
#[derive(Debug, Clone, Serialize)]
struct VisionChatRequest<'a> {
    model: &'a str,
    messages: Vec<VisionChatMessage<'a>>,
    stream: bool,
    options: VisionGenerationOptions,
}

#[derive(Debug, Clone, Serialize)]
struct VisionChatMessage<'a> {
    role: &'static str,
    content: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    images: Option<Vec<&'a str>>,
}

/// Deterministic decoding for value extraction.
#[derive(Debug, Clone, Serialize)]
struct VisionGenerationOptions {
    temperature: f32,
    num_predict: i32,
}

#[derive(Debug, Deserialize)]
struct VisionChatResponse {
    message: VisionChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct VisionChatResponseMessage {
    content: String,
}

// ──────────────────────────────────────────────
// OllamaVisionClient
// ──────────────────────────────────────────────

pub struct OllamaVisionClient {
    base_url: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl OllamaVisionClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ExtractionError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(timeout)
            .build()
            .map_err(|e| ExtractionError::Vision(format!("HTTP client setup failed: {e}")))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl VisionClient for OllamaVisionClient {
    async fn chat_with_image(
        &self,
        model: &str,
        system: &str,
        prompt: &str,
        image_base64: &str,
    ) -> Result<String, ExtractionError> {
        let url = format!("{}/api/chat", self.base_url);
        let body = VisionChatRequest {
            model,
            messages: vec![
                VisionChatMessage {
                    role: "system",
                    content: system,
                    images: None,
                },
                VisionChatMessage {
                    role: "user",
                    content: prompt,
                    images: Some(vec![image_base64]),
                },
            ],
            stream: false,
            options: VisionGenerationOptions {
                temperature: 0.0,
                num_predict: 4096,
            },
        };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    ExtractionError::Vision(format!("cannot connect to Ollama at {}", self.base_url))
                } else if e.is_timeout() {
                    ExtractionError::Vision(format!(
                        "request timed out after {}s",
                        self.timeout.as_secs()
                    ))
                } else {
                    ExtractionError::Vision(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ExtractionError::Vision(format!(
                "Ollama returned HTTP {}: {body}",
                status.as_u16()
            )));
        }

        let parsed: VisionChatResponse = response
            .json()
            .await
            .map_err(|e| ExtractionError::Vision(format!("unreadable Ollama response: {e}")))?;

        Ok(parsed.message.content)
    }
}

// ──────────────────────────────────────────────
// MockVisionClient
// ──────────────────────────────────────────────

/// Mock vision client. Replies with a canned response, optionally chosen by
/// a marker found in the decoded image bytes.
pub struct MockVisionClient {
    default_response: String,
    by_marker: Vec<(String, String)>,
    fail: bool,
    calls: AtomicUsize,
}

impl MockVisionClient {
    pub fn new(response: &str) -> Self {
        Self {
            default_response: response.to_string(),
            by_marker: Vec::new(),
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    /// Use `response` for images whose bytes contain `marker`.
    pub fn respond_to(mut self, marker: &str, response: &str) -> Self {
        self.by_marker.push((marker.to_string(), response.to_string()));
        self
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new("")
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VisionClient for MockVisionClient {
    async fn chat_with_image(
        &self,
        _model: &str,
        _system: &str,
        _prompt: &str,
        image_base64: &str,
    ) -> Result<String, ExtractionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(ExtractionError::Vision("cannot connect to Ollama".into()));
        }

        let image = base64::engine::general_purpose::STANDARD
            .decode(image_base64)
            .map(|bytes| String::from_utf8_lossy(&bytes).to_string())
            .unwrap_or_default();

        let response = self
            .by_marker
            .iter()
            .find(|(marker, _)| image.contains(marker.as_str()))
            .map(|(_, response)| response.clone())
            .unwrap_or_else(|| self.default_response.clone());
        Ok(response)
    }
}
