//! Voice selection per dialogue item.
//!
//! Narrator and Human turns always use their fixed voices. Artificial Mind
//! turns ask the decision model, either for one voice or for a split into
//! several voiced chunks. An unusable answer never fails the item: it falls
//! back to a documented default.

use crate::defaults;
use crate::error::{NarrateError, Result};
use crate::script::{DialogueItem, Speaker, preview};
use crate::synth::{VoiceAdvisor, VoiceChunk, VoiceOption};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// How Artificial Mind turns are voiced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionStrategy {
    /// One classified voice for the whole text.
    Classify,
    /// Provider-chosen split into voiced chunks.
    Split,
}

/// Voice assignment table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceTable {
    pub narrator: String,
    pub human: String,
    /// Used when a classification answer is unusable.
    pub default_ai: String,
    /// Option number used when a split answer is unusable.
    pub split_fallback: u32,
    pub ai_options: Vec<VoiceOption>,
}

impl Default for VoiceTable {
    fn default() -> Self {
        Self {
            narrator: defaults::NARRATOR_VOICE.to_string(),
            human: defaults::HUMAN_VOICE.to_string(),
            default_ai: defaults::DEFAULT_AI_VOICE.to_string(),
            split_fallback: defaults::SPLIT_FALLBACK_OPTION,
            ai_options: default_ai_options(),
        }
    }
}

impl VoiceTable {
    /// Provider voice for option `number`.
    pub fn option_voice(&self, number: u32) -> Option<&str> {
        self.ai_options
            .iter()
            .find(|o| o.number == number)
            .map(|o| o.voice.as_str())
    }

    /// Fixed voice for a speaker, `None` for Artificial Mind.
    pub fn fixed_voice(&self, speaker: Speaker) -> Option<&str> {
        match speaker {
            Speaker::Narrator => Some(self.narrator.as_str()),
            Speaker::Human => Some(self.human.as_str()),
            Speaker::ArtificialMind => None,
        }
    }
}

/// Stock Artificial Mind options.
pub fn default_ai_options() -> Vec<VoiceOption> {
    vec![
        VoiceOption::new(1, "onyx", "low, gravely."),
        VoiceOption::new(2, "fable", "matter of fact, explanatory"),
        VoiceOption::new(3, "shimmer", "soft and steady"),
        VoiceOption::new(4, "nova", "lightly playful"),
    ]
}

/// One resolved chunk: text and provider voice identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedChunk {
    pub text: String,
    pub voice: String,
}

/// Resolved voice assignment for one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoicePlan {
    /// One voice over the whole content.
    Single { voice: String },
    /// Ordered chunks whose texts together make up the content.
    Chunks(Vec<PlannedChunk>),
}

impl VoicePlan {
    /// Flatten into `(text, voice)` pairs against the item's content.
    pub fn into_chunks(self, content: &str) -> Vec<PlannedChunk> {
        match self {
            VoicePlan::Single { voice } => vec![PlannedChunk {
                text: content.to_string(),
                voice,
            }],
            VoicePlan::Chunks(chunks) => chunks,
        }
    }

    pub fn chunk_count(&self) -> usize {
        match self {
            VoicePlan::Single { .. } => 1,
            VoicePlan::Chunks(chunks) => chunks.len(),
        }
    }
}

/// Maps dialogue items to voice plans.
pub struct VoiceSelector {
    table: VoiceTable,
    advisor: Arc<dyn VoiceAdvisor>,
}

impl VoiceSelector {
    pub fn new(table: VoiceTable, advisor: Arc<dyn VoiceAdvisor>) -> Self {
        Self { table, advisor }
    }

    pub fn table(&self) -> &VoiceTable {
        &self.table
    }

    /// Plan the voices for one item.
    ///
    /// # Errors
    /// Only transport failures (`Provider`) propagate; unusable answers fall
    /// back to the default voice.
    pub async fn plan_for(
        &self,
        item: &DialogueItem,
        strategy: SelectionStrategy,
    ) -> Result<VoicePlan> {
        if let Some(voice) = self.table.fixed_voice(item.speaker) {
            return Ok(VoicePlan::Single {
                voice: voice.to_string(),
            });
        }

        match strategy {
            SelectionStrategy::Classify => self.classify(&item.content).await,
            SelectionStrategy::Split => self.split(&item.content).await,
        }
    }

    async fn classify(&self, content: &str) -> Result<VoicePlan> {
        let answer = self
            .advisor
            .classify_voice(content, &self.table.ai_options)
            .await;

        let voice = match answer {
            Ok(number) => match self.table.option_voice(number) {
                Some(voice) => {
                    debug!("classified as option {number} ({voice})");
                    voice.to_string()
                }
                None => {
                    warn!(
                        "Invalid voice selection {number}, using default voice {}",
                        self.table.default_ai
                    );
                    self.table.default_ai.clone()
                }
            },
            Err(NarrateError::Classification { message }) => {
                warn!(
                    "Voice classification unusable ({message}), using default voice {}",
                    self.table.default_ai
                );
                self.table.default_ai.clone()
            }
            Err(e) => return Err(e),
        };

        Ok(VoicePlan::Single { voice })
    }

    async fn split(&self, content: &str) -> Result<VoicePlan> {
        let answer = self
            .advisor
            .split_into_chunks(content, &self.table.ai_options)
            .await;

        let chunks = match answer {
            Ok(chunks) => match self.resolve_chunks(&chunks) {
                Ok(resolved) => resolved,
                Err(reason) => {
                    warn!("Unusable chunk split ({reason}), using a single chunk");
                    self.fallback_chunks(content)?
                }
            },
            Err(NarrateError::Classification { message }) => {
                warn!("Chunk split failed ({message}), using a single chunk");
                self.fallback_chunks(content)?
            }
            Err(e) => return Err(e),
        };

        info!(
            "Split into {} chunk(s): {}",
            chunks.len(),
            preview(content, 50)
        );
        Ok(VoicePlan::Chunks(chunks))
    }

    /// Map option numbers to voices, rejecting empty or out-of-table answers.
    fn resolve_chunks(
        &self,
        chunks: &[VoiceChunk],
    ) -> std::result::Result<Vec<PlannedChunk>, String> {
        if chunks.is_empty() {
            return Err("no chunks".to_string());
        }
        chunks
            .iter()
            .enumerate()
            .map(|(i, chunk)| {
                if chunk.text.trim().is_empty() {
                    return Err(format!("chunk {i} has no text"));
                }
                let voice = self
                    .table
                    .option_voice(chunk.voice)
                    .ok_or_else(|| format!("chunk {i} uses unknown voice {}", chunk.voice))?;
                Ok(PlannedChunk {
                    text: chunk.text.clone(),
                    voice: voice.to_string(),
                })
            })
            .collect()
    }

    fn fallback_chunks(&self, content: &str) -> Result<Vec<PlannedChunk>> {
        let voice = self
            .table
            .option_voice(self.table.split_fallback)
            .ok_or_else(|| NarrateError::ConfigInvalidValue {
                key: "voices.split_fallback".to_string(),
                message: format!("option {} does not exist", self.table.split_fallback),
            })?;
        Ok(vec![PlannedChunk {
            text: content.to_string(),
            voice: voice.to_string(),
        }])
    }
}
