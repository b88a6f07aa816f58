//! Boundary to the external speech and decision providers.
//!
//! The pipeline only needs two capabilities: turning (text, voice) into WAV
//! bytes, and asking a chat model to pick or split voices. Both are traits so
//! the HTTP client can be swapped for the scripted mocks in tests.

pub mod mock;
pub mod openai;

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One selectable voice for Artificial Mind sections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceOption {
    /// 1-based number the decision model answers with.
    pub number: u32,
    /// Provider voice identifier.
    pub voice: String,
    /// Short style hint shown to the decision model.
    pub description: String,
}

impl VoiceOption {
    pub fn new(number: u32, voice: &str, description: &str) -> Self {
        Self {
            number,
            voice: voice.to_string(),
            description: description.to_string(),
        }
    }
}

/// Render options as the numbered list used in decision prompts.
pub fn format_options(options: &[VoiceOption]) -> String {
    options
        .iter()
        .map(|o| format!("{}. {} - {}", o.number, o.voice, o.description))
        .collect::<Vec<_>>()
        .join("\n")
}

/// One piece of a split decision, as returned by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceChunk {
    pub text: String,
    /// Option number, expected to be one of the offered options.
    pub voice: u32,
}

/// Text-to-speech.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Synthesize `text` with `voice`, returning a complete WAV file.
    async fn synthesize(&self, text: &str, voice: &str) -> Result<Vec<u8>>;
}

/// Voice decisions for Artificial Mind sections.
///
/// Implementations report transport failures as `Provider` errors and
/// unusable answers as `Classification` errors; callers fall back to a
/// default voice only for the latter.
#[async_trait]
pub trait VoiceAdvisor: Send + Sync {
    /// Pick one option number for the whole text.
    async fn classify_voice(&self, text: &str, options: &[VoiceOption]) -> Result<u32>;

    /// Partition the text into ordered chunks, each with an option number.
    async fn split_into_chunks(
        &self,
        text: &str,
        options: &[VoiceOption],
    ) -> Result<Vec<VoiceChunk>>;
}

#[async_trait]
impl<T: SpeechSynthesizer + ?Sized> SpeechSynthesizer for Arc<T> {
    async fn synthesize(&self, text: &str, voice: &str) -> Result<Vec<u8>> {
        (**self).synthesize(text, voice).await
    }
}

#[async_trait]
impl<T: VoiceAdvisor + ?Sized> VoiceAdvisor for Arc<T> {
    async fn classify_voice(&self, text: &str, options: &[VoiceOption]) -> Result<u32> {
        (**self).classify_voice(text, options).await
    }

    async fn split_into_chunks(
        &self,
        text: &str,
        options: &[VoiceOption],
    ) -> Result<Vec<VoiceChunk>> {
        (**self).split_into_chunks(text, options).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_options_lists_every_option() {
        let options = vec![
            VoiceOption::new(1, "onyx", "low, gravely."),
            VoiceOption::new(2, "fable", "matter of fact, explanatory"),
        ];
        assert_eq!(
            format_options(&options),
            "1. onyx - low, gravely.\n2. fable - matter of fact, explanatory"
        );
    }

    #[test]
    fn test_voice_chunk_deserializes_provider_shape() {
        let chunk: VoiceChunk = serde_json::from_str(r#"{"text":"Hi.","voice":3}"#).unwrap();
        assert_eq!(chunk.text, "Hi.");
        assert_eq!(chunk.voice, 3);
    }
}
