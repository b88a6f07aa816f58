//! The duration index written next to the generated audio.
//!
//! A flat JSON object mapping output keys to milliseconds. Keys are either a
//! bare section index (`"3"`) or a section/chunk pair (`"3/1"`) when chunk
//! files are kept.

use crate::error::{NarrateError, Result};
use crate::pipeline::output::write_atomic;
use serde::de::{self, Deserializer, MapAccess, Visitor};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Identity of one output file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OutputKey {
    pub section: usize,
    pub chunk: Option<usize>,
}

impl OutputKey {
    pub fn section(section: usize) -> Self {
        Self {
            section,
            chunk: None,
        }
    }

    pub fn chunk(section: usize, chunk: usize) -> Self {
        Self {
            section,
            chunk: Some(chunk),
        }
    }
}

impl fmt::Display for OutputKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.chunk {
            Some(chunk) => write!(f, "{}/{}", self.section, chunk),
            None => write!(f, "{}", self.section),
        }
    }
}

impl FromStr for OutputKey {
    type Err = NarrateError;

    fn from_str(s: &str) -> Result<Self> {
        let bad = || NarrateError::InvalidArgument {
            message: format!("invalid output key '{s}'"),
        };
        match s.split_once('/') {
            Some((section, chunk)) => Ok(Self::chunk(
                section.parse().map_err(|_| bad())?,
                chunk.parse().map_err(|_| bad())?,
            )),
            None => Ok(Self::section(s.parse().map_err(|_| bad())?)),
        }
    }
}

/// Output key to duration in milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DurationIndex {
    entries: BTreeMap<OutputKey, u64>,
}

impl DurationIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a duration, returning the previous value for the key.
    pub fn insert(&mut self, key: OutputKey, duration_ms: u64) -> Option<u64> {
        self.entries.insert(key, duration_ms)
    }

    pub fn get(&self, key: &OutputKey) -> Option<u64> {
        self.entries.get(key).copied()
    }

    pub fn contains_section(&self, section: usize) -> bool {
        self.entries.keys().any(|k| k.section == section)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in key order (sections ascending, chunks ascending within).
    pub fn iter(&self) -> impl Iterator<Item = (&OutputKey, &u64)> {
        self.entries.iter()
    }

    pub fn total_ms(&self) -> u64 {
        self.entries.values().sum()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Persist as pretty-printed JSON, replacing any previous file atomically.
    pub async fn write(&self, path: &Path) -> Result<()> {
        let mut json = self.to_json()?;
        json.push('\n');
        write_atomic(path, json.as_bytes()).await
    }

    pub async fn read(path: &Path) -> Result<Self> {
        let text = tokio::fs::read_to_string(path).await?;
        Ok(serde_json::from_str(&text)?)
    }
}

impl Extend<(OutputKey, u64)> for DurationIndex {
    fn extend<I: IntoIterator<Item = (OutputKey, u64)>>(&mut self, iter: I) {
        self.entries.extend(iter);
    }
}

impl FromIterator<(OutputKey, u64)> for DurationIndex {
    fn from_iter<I: IntoIterator<Item = (OutputKey, u64)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl Serialize for DurationIndex {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, ms) in &self.entries {
            map.serialize_entry(&key.to_string(), ms)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for DurationIndex {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct IndexVisitor;

        impl<'de> Visitor<'de> for IndexVisitor {
            type Value = DurationIndex;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of output keys to milliseconds")
            }

            fn visit_map<M: MapAccess<'de>>(
                self,
                mut access: M,
            ) -> std::result::Result<Self::Value, M::Error> {
                let mut index = DurationIndex::new();
                while let Some((key, ms)) = access.next_entry::<String, u64>()? {
                    let key = key.parse::<OutputKey>().map_err(de::Error::custom)?;
                    index.insert(key, ms);
                }
                Ok(index)
            }
        }

        deserializer.deserialize_map(IndexVisitor)
    }
}
