// src/services/gemini.rs
use crate::config::GeminiConfig;
use crate::errors::StylistError;
use crate::models::{ChatTurn, Role};
use async_trait::async_trait;
use log::{debug, info, warn};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::time::Instant;

const SAFETY_THRESHOLD: &str = "BLOCK_MEDIUM_AND_ABOVE";
const SAFETY_CATEGORIES: [&str; 4] = [
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Part {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    pub mime_type: String,
    pub data: String,
}

impl Content {
    pub fn text(role: Role, text: impl Into<String>) -> Self {
        Self {
            role: Some(role.as_str().to_string()),
            parts: vec![Part::Text { text: text.into() }],
        }
    }

    pub fn text_with_image(text: impl Into<String>, mime_type: &str, base64_data: &str) -> Self {
        Self {
            role: None,
            parts: vec![
                Part::Text { text: text.into() },
                Part::InlineData {
                    inline_data: InlineData {
                        mime_type: mime_type.to_string(),
                        data: base64_data.to_string(),
                    },
                },
            ],
        }
    }
}

impl From<&ChatTurn> for Content {
    fn from(turn: &ChatTurn) -> Self {
        Content::text(turn.role, turn.text.clone())
    }
}

/// The external multimodal model. Returns the model's text payload verbatim.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GenerativeProvider: Send + Sync {
    async fn generate(&self, contents: Vec<Content>) -> Result<String, StylistError>;

    async fn list_models(&self) -> Result<Value, StylistError>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    candidates: Option<Vec<GeminiCandidate>>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiContent {
    parts: Option<Vec<GeminiPart>>,
}

#[derive(Debug, Deserialize)]
struct GeminiPart {
    text: Option<String>,
}

pub struct GeminiClient {
    config: GeminiConfig,
    client: Client,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> Result<Self, StylistError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| StylistError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    fn api_key(&self) -> Result<&str, StylistError> {
        self.config
            .api_key
            .as_deref()
            .ok_or_else(|| StylistError::Config("Gemini API key not configured".to_string()))
    }

    fn generate_url(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.config.api_base, self.config.model
        )
    }

    fn build_payload(&self, contents: &[Content]) -> Value {
        json!({
            "contents": contents,
            "generationConfig": {
                "temperature": self.config.temperature,
                "topK": self.config.top_k,
                "topP": self.config.top_p,
                "maxOutputTokens": self.config.max_output_tokens,
            },
            "safetySettings": safety_settings(),
        })
    }

    fn map_transport_error(&self, e: reqwest::Error) -> StylistError {
        if e.is_timeout() {
            StylistError::provider(format!(
                "Gemini request timed out after {}s",
                self.config.timeout.as_secs()
            ))
        } else if e.is_connect() || e.is_request() {
            StylistError::provider(format!("Network error - no response received: {}", e))
        } else {
            StylistError::provider(format!("Gemini request failed: {}", e))
        }
    }
}

#[async_trait]
impl GenerativeProvider for GeminiClient {
    async fn generate(&self, contents: Vec<Content>) -> Result<String, StylistError> {
        let api_key = self.api_key()?;
        let url = self.generate_url();
        let payload = self.build_payload(&contents);
        let start = Instant::now();

        info!(
            "Calling Gemini {} with {} content block(s)",
            self.config.model,
            contents.len()
        );
        debug!("Gemini payload summary: {}", summarize_contents(&contents));

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        if !status.is_success() {
            warn!("Gemini returned {}: {}", status, truncate_for_log(&body, 500));
            return Err(StylistError::Provider {
                status: Some(status.as_u16()),
                details: body,
            });
        }

        info!(
            "Gemini responded {} in {}ms",
            status,
            start.elapsed().as_millis()
        );

        let parsed: GeminiResponse = serde_json::from_str(&body).map_err(|e| {
            StylistError::provider(format!("Failed to parse Gemini response: {}", e))
        })?;

        extract_text(parsed).ok_or_else(|| {
            StylistError::provider(format!(
                "No candidates in Gemini response: {}",
                truncate_for_log(&body, 500)
            ))
        })
    }

    async fn list_models(&self) -> Result<Value, StylistError> {
        let api_key = self.api_key()?;
        let url = format!("{}/models", self.config.api_base);

        let response = self
            .client
            .get(&url)
            .header("x-goog-api-key", api_key)
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(StylistError::Provider {
                status: Some(status.as_u16()),
                details: error_text,
            });
        }

        let result: Value = response.json().await.map_err(|e| {
            StylistError::provider(format!("Failed to parse model listing: {}", e))
        })?;

        Ok(result.get("models").cloned().unwrap_or_else(|| json!([])))
    }
}

fn safety_settings() -> Vec<Value> {
    SAFETY_CATEGORIES
        .iter()
        .map(|category| json!({ "category": category, "threshold": SAFETY_THRESHOLD }))
        .collect()
}

/// Text of the first candidate that carries any, with its parts concatenated.
fn extract_text(response: GeminiResponse) -> Option<String> {
    response
        .candidates
        .unwrap_or_default()
        .into_iter()
        .filter_map(|candidate| candidate.content?.parts)
        .map(|parts| {
            parts
                .into_iter()
                .filter_map(|part| part.text)
                .collect::<String>()
        })
        .find(|text| !text.is_empty())
}

fn truncate_for_log(value: &str, limit: usize) -> String {
    if value.chars().count() <= limit {
        return value.to_string();
    }
    let truncated: String = value.chars().take(limit).collect();
    format!("{}... (truncated)", truncated)
}

fn summarize_contents(contents: &[Content]) -> Value {
    let summary: Vec<Value> = contents
        .iter()
        .map(|content| {
            let parts: Vec<Value> = content
                .parts
                .iter()
                .map(|part| match part {
                    Part::Text { text } => json!({ "text": truncate_for_log(text, 120) }),
                    Part::InlineData { inline_data } => json!({
                        "inlineData": {
                            "mimeType": inline_data.mime_type,
                            "dataLen": inline_data.data.len(),
                        }
                    }),
                })
                .collect();
            json!({ "role": content.role, "parts": parts })
        })
        .collect();
    Value::Array(summary)
}
