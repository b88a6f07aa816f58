//! OpenAI-compatible HTTP provider.
//!
//! Speech goes through `POST {base}/audio/speech` with a WAV response format;
//! voice decisions go through `POST {base}/chat/completions`. Talking to the
//! REST API with `reqwest` directly keeps any compatible gateway usable.

use crate::defaults;
use crate::error::{NarrateError, Result};
use crate::synth::{SpeechSynthesizer, VoiceAdvisor, VoiceChunk, VoiceOption, format_options};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::debug;

/// Connection and model settings.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub base_url: String,
    pub api_key: String,
    pub speech_model: String,
    pub classifier_model: String,
    pub splitter_model: String,
    pub timeout: Duration,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::API_BASE_URL.to_string(),
            api_key: String::new(),
            speech_model: defaults::SPEECH_MODEL.to_string(),
            classifier_model: defaults::CLASSIFIER_MODEL.to_string(),
            splitter_model: defaults::SPLITTER_MODEL.to_string(),
            timeout: Duration::from_secs(defaults::REQUEST_TIMEOUT_SECS),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SplitResponse {
    chunks: Vec<VoiceChunk>,
}

/// Client for one provider account. Cheap to clone.
#[derive(Clone)]
pub struct OpenAiClient {
    cfg: OpenAiConfig,
    http: reqwest::Client,
}

impl OpenAiClient {
    /// Build a client.
    ///
    /// # Errors
    /// `ConfigInvalidValue` for an empty base URL, key or model name;
    /// `Provider` if the HTTP client cannot be built.
    pub fn new(cfg: OpenAiConfig) -> Result<Self> {
        let required = [
            ("provider.base_url", &cfg.base_url),
            ("provider.api_key", &cfg.api_key),
            ("provider.speech_model", &cfg.speech_model),
            ("provider.classifier_model", &cfg.classifier_model),
            ("provider.splitter_model", &cfg.splitter_model),
        ];
        for (key, value) in required {
            if value.trim().is_empty() {
                return Err(NarrateError::ConfigInvalidValue {
                    key: key.to_string(),
                    message: "must not be empty".to_string(),
                });
            }
        }

        let http = reqwest::Client::builder()
            .timeout(cfg.timeout.max(Duration::from_millis(1)))
            .build()
            .map_err(|e| NarrateError::Provider {
                message: format!("cannot build HTTP client: {e}"),
            })?;

        Ok(Self { cfg, http })
    }

    pub fn config(&self) -> &OpenAiConfig {
        &self.cfg
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.cfg.base_url.trim_end_matches('/'), path)
    }

    async fn post(&self, path: &str, body: &Value) -> Result<reqwest::Response> {
        self.http
            .post(self.url(path))
            .bearer_auth(self.cfg.api_key.trim())
            .json(body)
            .send()
            .await
            .map_err(|e| NarrateError::Provider {
                message: format!("{path}: {e}"),
            })
    }

    /// Send a chat completion and return the first choice's message.
    async fn chat(&self, body: Value) -> Result<Value> {
        let resp = self.post("chat/completions", &body).await?;
        let status = resp.status();
        let raw: Value = resp.json().await.map_err(|e| NarrateError::Provider {
            message: format!("chat/completions: unreadable response ({status}): {e}"),
        })?;

        if !status.is_success() {
            return Err(NarrateError::Provider {
                message: format!("chat/completions: {status}: {}", provider_message(&raw)),
            });
        }

        raw.pointer("/choices/0/message")
            .cloned()
            .ok_or_else(|| NarrateError::Classification {
                message: "response has no choices".to_string(),
            })
    }
}

/// OpenAI-style `{"error": {"message": ...}}`, if present.
fn provider_message(raw: &Value) -> &str {
    raw.get("error")
        .and_then(|e| e.get("message"))
        .and_then(|m| m.as_str())
        .unwrap_or("request failed")
}

/// JSON schema the split answer must satisfy.
fn split_schema(options: &[VoiceOption]) -> Value {
    let min = options.iter().map(|o| o.number).min().unwrap_or(1);
    let max = options.iter().map(|o| o.number).max().unwrap_or(1);
    json!({
        "type": "object",
        "properties": {
            "chunks": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "text": {
                            "type": "string",
                            "description": "The text chunk to be spoken"
                        },
                        "voice": {
                            "type": "integer",
                            "minimum": min,
                            "maximum": max,
                            "description": format!("The voice number ({min}-{max}) that should speak this chunk")
                        }
                    },
                    "required": ["text", "voice"],
                    "additionalProperties": false
                }
            }
        },
        "required": ["chunks"],
        "additionalProperties": false
    })
}

/// Option number at the start of a reply such as `"3"`, `"3."` or `"3. shimmer"`.
fn leading_number(reply: &str) -> Option<u32> {
    let reply = reply.trim_start();
    let reply = reply.strip_prefix('+').unwrap_or(reply);
    let end = reply
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(reply.len());
    reply[..end].parse().ok()
}

fn classify_prompt(options: &[VoiceOption]) -> String {
    format!(
        "You are helping select the most appropriate AI voice for the given content. \
         You will be given several voice options, each with a number. \
         Respond with ONLY the number of the most appropriate voice option.\n\n\
         Voice options:\n{}\n\n\
         Consider the tone, mood, and content type when selecting the voice.",
        format_options(options)
    )
}

fn split_prompt(options: &[VoiceOption]) -> String {
    format!(
        "You are helping break up content into chunks with different AI voices. \
         You will be given several voice options, each with a number.\n\n\
         Voice options:\n{}\n\n\
         You can choose to:\n\
         1. Use the same voice for all text (single chunk)\n\
         2. Split the text into multiple chunks with different voices for variety or emphasis\n\
         3. Change voices based on content, tone, or dramatic effect\n\n\
         Make sure all the original text is included across all chunks.",
        format_options(options)
    )
}

#[async_trait]
impl SpeechSynthesizer for OpenAiClient {
    async fn synthesize(&self, text: &str, voice: &str) -> Result<Vec<u8>> {
        let body = json!({
            "model": self.cfg.speech_model,
            "voice": voice,
            "input": text,
            "response_format": "wav",
        });

        let resp = self.post("audio/speech", &body).await.map_err(|e| {
            NarrateError::Synthesis {
                message: e.to_string(),
            }
        })?;
        let status = resp.status();

        if !status.is_success() {
            let raw: Value = resp.json().await.unwrap_or(Value::Null);
            return Err(NarrateError::Synthesis {
                message: format!("{status}: {}", provider_message(&raw)),
            });
        }

        let bytes = resp.bytes().await.map_err(|e| NarrateError::Synthesis {
            message: format!("failed to read audio body: {e}"),
        })?;
        debug!("synthesized {} bytes with voice {voice}", bytes.len());
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl VoiceAdvisor for OpenAiClient {
    async fn classify_voice(&self, text: &str, options: &[VoiceOption]) -> Result<u32> {
        let body = json!({
            "model": self.cfg.classifier_model,
            "messages": [
                { "role": "system", "content": classify_prompt(options) },
                { "role": "user", "content": text },
            ],
            "max_tokens": defaults::CLASSIFY_MAX_TOKENS,
            "temperature": defaults::DECISION_TEMPERATURE,
        });

        let message = self.chat(body).await?;
        let content = message
            .get("content")
            .and_then(|c| c.as_str())
            .unwrap_or("")
            .trim();

        leading_number(content).ok_or_else(|| NarrateError::Classification {
            message: format!("expected an option number, got {content:?}"),
        })
    }

    async fn split_into_chunks(
        &self,
        text: &str,
        options: &[VoiceOption],
    ) -> Result<Vec<VoiceChunk>> {
        let body = json!({
            "model": self.cfg.splitter_model,
            "messages": [
                { "role": "system", "content": split_prompt(options) },
                { "role": "user", "content": text },
            ],
            "response_format": {
                "type": "json_schema",
                "json_schema": {
                    "name": "voice_chunks",
                    "schema": split_schema(options),
                    "strict": true,
                }
            },
            "max_tokens": defaults::SPLIT_MAX_TOKENS,
            "temperature": defaults::DECISION_TEMPERATURE,
        });

        let message = self.chat(body).await?;
        if let Some(refusal) = message.get("refusal").and_then(|r| r.as_str()) {
            return Err(NarrateError::Classification {
                message: format!("model refused: {refusal}"),
            });
        }

        let content = message
            .get("content")
            .and_then(|c| c.as_str())
            .ok_or_else(|| NarrateError::Classification {
                message: "response content is empty".to_string(),
            })?;

        let parsed: SplitResponse =
            serde_json::from_str(content).map_err(|e| NarrateError::Classification {
                message: format!("unparseable chunk list: {e}"),
            })?;
        Ok(parsed.chunks)
    }
}
