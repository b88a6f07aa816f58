//! The dialogue script: ordered speaker turns plus the table of contents.
//!
//! The stock script is embedded from `assets/script.toml`. A section's
//! zero-based position is its identity for output naming, so the order of
//! `[[section]]` tables must never change between runs.

use crate::error::{NarrateError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

const EMBEDDED_SCRIPT: &str = include_str!("../assets/script.toml");

/// Who speaks a section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Speaker {
    Narrator,
    Human,
    #[serde(rename = "Artificial Mind")]
    ArtificialMind,
}

impl fmt::Display for Speaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Speaker::Narrator => write!(f, "Narrator"),
            Speaker::Human => write!(f, "Human"),
            Speaker::ArtificialMind => write!(f, "Artificial Mind"),
        }
    }
}

/// One speaker turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialogueItem {
    pub speaker: Speaker,
    pub content: String,
    /// Placeholder duration shown by the site before audio exists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_ms: Option<u64>,
}

impl DialogueItem {
    pub fn new(speaker: Speaker, content: impl Into<String>) -> Self {
        Self {
            speaker,
            content: content.into(),
            estimated_ms: None,
        }
    }

    /// First `max_chars` characters of the content, for log lines.
    pub fn preview(&self, max_chars: usize) -> String {
        preview(&self.content, max_chars)
    }
}

/// Table-of-contents entry pointing at the section that opens a chapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MenuEntry {
    pub title: String,
    pub sentence: String,
    pub index: usize,
}

/// The complete script.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Script {
    #[serde(rename = "section", default)]
    pub sections: Vec<DialogueItem>,
    #[serde(default)]
    pub menu: Vec<MenuEntry>,
}

impl Script {
    /// The script compiled into the binary.
    pub fn embedded() -> Result<Self> {
        Self::from_toml_str(EMBEDDED_SCRIPT)
    }

    /// Parse a script from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| NarrateError::Script {
            message: e.to_string(),
        })
    }

    /// Load a script from an external TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| NarrateError::Script {
            message: format!("cannot read {}: {}", path.display(), e),
        })?;
        Self::from_toml_str(&text)
    }

    /// Load from `path`, or the embedded script when no path is given.
    pub fn load_or_embedded(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load(p),
            None => Self::embedded(),
        }
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// Sum of the placeholder durations, in milliseconds.
    pub fn estimated_total_ms(&self) -> u64 {
        self.sections.iter().filter_map(|s| s.estimated_ms).sum()
    }

    /// Check structural consistency.
    ///
    /// Hard errors: no sections, an empty section, or a menu that does not
    /// start at 0, is not strictly ascending, or points past the last section.
    /// A menu sentence that does not occur verbatim in its section is only a
    /// warning; the returned list holds those warnings.
    pub fn validate(&self) -> Result<Vec<String>> {
        if self.sections.is_empty() {
            return Err(NarrateError::Script {
                message: "script has no sections".to_string(),
            });
        }

        if let Some(pos) = self.sections.iter().position(|s| s.content.trim().is_empty()) {
            return Err(NarrateError::Script {
                message: format!("section {pos} has empty content"),
            });
        }

        let mut warnings = Vec::new();
        let mut previous: Option<usize> = None;

        for (i, entry) in self.menu.iter().enumerate() {
            if i == 0 && entry.index != 0 {
                return Err(NarrateError::Script {
                    message: format!("menu must start at section 0, got {}", entry.index),
                });
            }
            if entry.index >= self.sections.len() {
                return Err(NarrateError::Script {
                    message: format!(
                        "menu entry '{}' points at section {} but the script has {} sections",
                        entry.title,
                        entry.index,
                        self.sections.len()
                    ),
                });
            }
            if let Some(prev) = previous
                && entry.index <= prev
            {
                return Err(NarrateError::Script {
                    message: format!(
                        "menu entry '{}' (section {}) is not after section {}",
                        entry.title, entry.index, prev
                    ),
                });
            }
            previous = Some(entry.index);

            if !self.sections[entry.index].content.contains(entry.sentence.trim()) {
                warnings.push(format!(
                    "menu entry '{}': sentence not found verbatim in section {}",
                    entry.title, entry.index
                ));
            }
        }

        Ok(warnings)
    }
}

/// Char-boundary-safe prefix of `text`.
pub fn preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => format!("{}...", &text[..end]),
        None => text.to_string(),
    }
}
