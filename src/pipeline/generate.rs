//! One generation run over the whole script.
//!
//! Preparing clears the output location and, in stitch mode, opens the
//! scratch area. Processing plans voices and synthesizes every section under
//! the concurrency limit; a failing section is recorded and skipped. Finalizing
//! stitches scratch chunks, writes the duration index and removes the scratch
//! area.

use crate::audio::{measure_or_zero, stitch, stitch_files};
use crate::config::{Config, RunMode};
use crate::defaults;
use crate::error::{NarrateError, Result};
use crate::pipeline::index::{DurationIndex, OutputKey};
use crate::pipeline::limiter::run_batched;
use crate::pipeline::output::{self, OutputLayout, ScratchDir, write_atomic};
use crate::script::DialogueItem;
use crate::synth::SpeechSynthesizer;
use crate::voice::{PlannedChunk, SelectionStrategy, VoicePlan, VoiceSelector};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Knobs for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub mode: RunMode,
    /// Sections processed per batch.
    pub concurrency: usize,
    /// Extra attempts per synthesis call.
    pub max_retries: u32,
    /// First retry delay, doubled on every further attempt.
    pub retry_backoff: Duration,
    /// Pause after every synthesis call.
    pub request_delay: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            mode: RunMode::default(),
            concurrency: defaults::CONCURRENCY_LIMIT,
            max_retries: 0,
            retry_backoff: Duration::from_millis(defaults::RETRY_BACKOFF_MS),
            request_delay: Duration::ZERO,
        }
    }
}

impl PipelineConfig {
    pub fn from_config(config: &Config) -> Self {
        let generation = &config.generation;
        Self {
            mode: generation.mode,
            concurrency: generation.concurrency,
            max_retries: generation.max_retries,
            retry_backoff: Duration::from_millis(generation.retry_backoff_ms),
            request_delay: Duration::from_millis(generation.request_delay_ms),
        }
    }

    pub fn with_mode(mut self, mode: RunMode) -> Self {
        self.mode = mode;
        self
    }
}

/// One audio file written while processing a section.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkAudio {
    pub key: OutputKey,
    pub path: PathBuf,
    pub duration_ms: u64,
}

/// Everything written for one section.
#[derive(Debug, Clone, PartialEq)]
pub struct SectionAudio {
    pub index: usize,
    pub chunks: Vec<ChunkAudio>,
}

impl SectionAudio {
    pub fn duration_ms(&self) -> u64 {
        self.chunks.iter().map(|c| c.duration_ms).sum()
    }
}

/// Result of processing one section.
#[derive(Debug)]
pub struct SectionOutcome {
    pub index: usize,
    pub result: Result<SectionAudio>,
}

/// A section with no output in this run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingSection {
    pub index: usize,
    pub reason: String,
}

/// What a finished run produced.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub mode: RunMode,
    /// Sections in the script.
    pub sections: usize,
    /// Entries removed while preparing the output location.
    pub cleared: usize,
    pub index: DurationIndex,
    /// Sections without output, in index order.
    pub missing: Vec<MissingSection>,
    /// Sum of the script's placeholder durations.
    pub estimated_ms: u64,
}

impl RunReport {
    pub fn produced(&self) -> usize {
        self.sections - self.missing.len()
    }

    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

/// Drives one run from an empty output location to a written duration index.
pub struct GenerationPipeline {
    config: PipelineConfig,
    layout: OutputLayout,
    selector: VoiceSelector,
    synth: Arc<dyn SpeechSynthesizer>,
}

impl GenerationPipeline {
    pub fn new(
        config: PipelineConfig,
        layout: OutputLayout,
        selector: VoiceSelector,
        synth: Arc<dyn SpeechSynthesizer>,
    ) -> Self {
        Self {
            config,
            layout,
            selector,
            synth,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn layout(&self) -> &OutputLayout {
        &self.layout
    }

    /// Generate audio for every item.
    ///
    /// Sections that fail are listed in the report instead of failing the
    /// run. Dropping the returned future removes the scratch area.
    ///
    /// # Errors
    /// `OutputSetup` when the output location cannot be prepared, or an I/O
    /// error when the duration index cannot be written.
    pub async fn run(&self, items: &[DialogueItem]) -> Result<RunReport> {
        let cleared = output::prepare(&self.layout).await?;
        let scratch = match self.config.mode {
            RunMode::Stitch => Some(ScratchDir::create(self.layout.scratch_path()).await?),
            RunMode::Whole | RunMode::Chunks => None,
        };

        info!(
            "Processing {} sections in {} mode with concurrency limit {}",
            items.len(),
            self.config.mode,
            self.config.concurrency.max(1)
        );

        let work: Vec<(usize, &DialogueItem)> = items.iter().enumerate().collect();
        let outcomes = run_batched(work, self.config.concurrency, |(index, item)| async move {
            let result = self.process_section(index, item).await;
            if let Err(e) = &result {
                error!("Error processing section {index}: {e}");
            }
            SectionOutcome { index, result }
        })
        .await;

        let (index, missing) = self.finalize(outcomes).await;
        let durations_path = self.layout.durations_path();
        index.write(&durations_path).await?;
        info!(
            "Saved {} durations to {}",
            index.len(),
            durations_path.display()
        );

        if let Some(scratch) = scratch {
            scratch.cleanup().await;
        }

        let report = RunReport {
            mode: self.config.mode,
            sections: items.len(),
            cleared,
            index,
            missing,
            estimated_ms: items.iter().filter_map(|i| i.estimated_ms).sum(),
        };
        info!(
            "Generated {} of {} sections",
            report.produced(),
            report.sections
        );
        Ok(report)
    }

    /// Plan, synthesize and write one section.
    pub async fn process_section(
        &self,
        index: usize,
        item: &DialogueItem,
    ) -> Result<SectionAudio> {
        let strategy = match self.config.mode {
            RunMode::Whole => SelectionStrategy::Classify,
            RunMode::Stitch | RunMode::Chunks => SelectionStrategy::Split,
        };
        let plan = self.selector.plan_for(item, strategy).await?;
        let single = matches!(plan, VoicePlan::Single { .. });
        let chunks = plan.into_chunks(&item.content);

        info!(
            section = index,
            speaker = %item.speaker,
            chunks = chunks.len(),
            "Processing section {index}: {}",
            item.preview(50)
        );

        match self.config.mode {
            RunMode::Whole => self.write_whole(index, &chunks).await,
            RunMode::Stitch => self.write_scratch(index, &chunks, single).await,
            RunMode::Chunks => self.write_chunk_dir(index, &chunks).await,
        }
    }

    /// Whole mode: one file per section, chunks joined in memory.
    async fn write_whole(&self, index: usize, chunks: &[PlannedChunk]) -> Result<SectionAudio> {
        let mut segments = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            segments.push(self.synthesize(&chunk.text, &chunk.voice).await?);
        }
        let audio = stitch(&segments)?;

        let path = self.layout.section_path(index);
        write_atomic(&path, &audio).await?;
        let duration_ms = measure_or_zero(&audio, &format!("section {index}"));
        info!("Generated audio for section {index} ({duration_ms} ms)");

        Ok(SectionAudio {
            index,
            chunks: vec![ChunkAudio {
                key: OutputKey::section(index),
                path,
                duration_ms,
            }],
        })
    }

    /// Stitch mode: chunks go to the scratch area until finalizing.
    async fn write_scratch(
        &self,
        index: usize,
        chunks: &[PlannedChunk],
        single: bool,
    ) -> Result<SectionAudio> {
        let mut written = Vec::with_capacity(chunks.len());
        for (c, chunk) in chunks.iter().enumerate() {
            let bytes = self.synthesize(&chunk.text, &chunk.voice).await?;
            let path = self
                .layout
                .scratch_chunk_path(index, (!single).then_some(c));
            write_atomic(&path, &bytes).await?;
            written.push(ChunkAudio {
                key: OutputKey::chunk(index, c),
                path,
                duration_ms: measure_or_zero(&bytes, &format!("section {index} chunk {c}")),
            });
        }
        Ok(SectionAudio {
            index,
            chunks: written,
        })
    }

    /// Chunks mode: every chunk kept as `<index>/<chunk>.wav`.
    ///
    /// A section that fails partway leaves no directory behind.
    async fn write_chunk_dir(
        &self,
        index: usize,
        chunks: &[PlannedChunk],
    ) -> Result<SectionAudio> {
        let dir = self.layout.section_dir(index);
        tokio::fs::create_dir_all(&dir).await?;

        match self.write_chunk_files(index, chunks).await {
            Ok(written) => Ok(SectionAudio {
                index,
                chunks: written,
            }),
            Err(e) => {
                if let Err(rm) = tokio::fs::remove_dir_all(&dir).await {
                    warn!("Could not remove {}: {rm}", dir.display());
                }
                Err(e)
            }
        }
    }

    async fn write_chunk_files(
        &self,
        index: usize,
        chunks: &[PlannedChunk],
    ) -> Result<Vec<ChunkAudio>> {
        let mut written = Vec::with_capacity(chunks.len());
        for (c, chunk) in chunks.iter().enumerate() {
            let bytes = self.synthesize(&chunk.text, &chunk.voice).await?;
            let path = self.layout.chunk_path(index, c);
            write_atomic(&path, &bytes).await?;
            let duration_ms = measure_or_zero(&bytes, &format!("section {index} chunk {c}"));
            info!("Generated audio for section {index} chunk {c} ({duration_ms} ms)");
            written.push(ChunkAudio {
                key: OutputKey::chunk(index, c),
                path,
                duration_ms,
            });
        }
        Ok(written)
    }

    /// Synthesize with bounded retry and optional pacing.
    async fn synthesize(&self, text: &str, voice: &str) -> Result<Vec<u8>> {
        let mut attempt = 0;
        loop {
            let result = self.synth.synthesize(text, voice).await;
            if !self.config.request_delay.is_zero() {
                tokio::time::sleep(self.config.request_delay).await;
            }

            match result {
                Ok(bytes) => return Ok(bytes),
                Err(e) if attempt < self.config.max_retries => {
                    let backoff = self
                        .config
                        .retry_backoff
                        .saturating_mul(2u32.saturating_pow(attempt));
                    attempt += 1;
                    warn!(
                        "Synthesis failed ({e}), retry {attempt}/{} in {backoff:?}",
                        self.config.max_retries
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Turn outcomes into index entries, stitching scratch chunks if needed.
    async fn finalize(
        &self,
        outcomes: Vec<SectionOutcome>,
    ) -> (DurationIndex, Vec<MissingSection>) {
        let mut index = DurationIndex::new();
        let mut missing = Vec::new();

        for outcome in outcomes {
            let section = match outcome.result {
                Ok(section) => section,
                Err(e) => {
                    missing.push(MissingSection {
                        index: outcome.index,
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            match self.config.mode {
                RunMode::Stitch => match self.stitch_section(&section).await {
                    Ok(duration_ms) => {
                        index.insert(OutputKey::section(section.index), duration_ms);
                    }
                    Err(e) => {
                        error!("{e}");
                        missing.push(MissingSection {
                            index: section.index,
                            reason: e.to_string(),
                        });
                    }
                },
                RunMode::Whole | RunMode::Chunks => {
                    index.extend(section.chunks.iter().map(|c| (c.key, c.duration_ms)));
                }
            }
        }

        (index, missing)
    }

    /// Join a section's scratch chunks into its final file and re-measure it.
    async fn stitch_section(&self, section: &SectionAudio) -> Result<u64> {
        let stitch_err = |e: NarrateError| NarrateError::Stitch {
            index: section.index,
            message: e.to_string(),
        };

        let paths: Vec<PathBuf> = section.chunks.iter().map(|c| c.path.clone()).collect();
        let output = self.layout.section_path(section.index);
        stitch_files(&paths, &output).await.map_err(stitch_err)?;

        let bytes = tokio::fs::read(&output).await.map_err(|e| stitch_err(e.into()))?;
        let duration_ms = measure_or_zero(&bytes, &format!("section {}", section.index));
        info!(
            "Stitched {} chunk(s) into section {} ({duration_ms} ms, chunks sum to {} ms)",
            paths.len(),
            section.index,
            section.duration_ms()
        );
        Ok(duration_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::Speaker;
    use crate::synth::VoiceChunk;
    use crate::synth::mock::{MockAdvisor, MockSynthesizer};
    use crate::voice::VoiceTable;
    use tempfile::TempDir;

    fn pipeline(
        mode: RunMode,
        root: &std::path::Path,
        synth: Arc<MockSynthesizer>,
        advisor: MockAdvisor,
    ) -> GenerationPipeline {
        let config = PipelineConfig {
            retry_backoff: Duration::from_millis(1),
            ..PipelineConfig::default()
        }
        .with_mode(mode);
        GenerationPipeline::new(
            config,
            OutputLayout::with_defaults(root),
            VoiceSelector::new(VoiceTable::default(), Arc::new(advisor)),
            synth,
        )
    }

    fn script() -> Vec<DialogueItem> {
        vec![
            DialogueItem::new(Speaker::Narrator, "Narration."),
            DialogueItem::new(Speaker::Human, "Hi there."),
            DialogueItem::new(Speaker::ArtificialMind, "Hello. I am here."),
        ]
    }

    fn split_answer() -> MockAdvisor {
        MockAdvisor::new().with_split(vec![
            VoiceChunk {
                text: "Hello.".to_string(),
                voice: 1,
            },
            VoiceChunk {
                text: " I am here.".to_string(),
                voice: 4,
            },
        ])
    }

    #[tokio::test]
    async fn whole_mode_writes_one_file_per_section() {
        let dir = TempDir::new().unwrap();
        let synth = Arc::new(MockSynthesizer::new());
        let pipeline = pipeline(
            RunMode::Whole,
            dir.path(),
            synth.clone(),
            MockAdvisor::new().with_classification(3),
        );

        let report = pipeline.run(&script()).await.unwrap();

        assert!(report.is_complete());
        assert_eq!(report.index.len(), 3);
        assert_eq!(
            report.index.get(&OutputKey::section(2)),
            Some(synth.expected_ms("Hello. I am here."))
        );
        for i in 0..3 {
            assert!(dir.path().join(format!("{i}.wav")).is_file());
        }
        assert!(!dir.path().join("temp").exists());

        let mut voices: Vec<String> = synth.calls().into_iter().map(|(_, v)| v).collect();
        voices.sort();
        assert_eq!(voices, vec!["ash", "echo", "shimmer"]);

        let saved = DurationIndex::read(&dir.path().join("durations.json"))
            .await
            .unwrap();
        assert_eq!(saved, report.index);
    }

    #[tokio::test]
    async fn stitch_mode_joins_chunks_and_removes_scratch() {
        let dir = TempDir::new().unwrap();
        let synth = Arc::new(MockSynthesizer::new());
        let pipeline = pipeline(RunMode::Stitch, dir.path(), synth.clone(), split_answer());

        let report = pipeline.run(&script()).await.unwrap();

        assert!(report.is_complete());
        let expected = synth.expected_ms("Hello.") + synth.expected_ms(" I am here.");
        assert_eq!(report.index.get(&OutputKey::section(2)), Some(expected));
        assert_eq!(report.index.get(&OutputKey::chunk(2, 0)), None);

        let stitched = std::fs::read(dir.path().join("2.wav")).unwrap();
        assert_eq!(crate::audio::measure(&stitched).unwrap(), expected);
        assert!(!dir.path().join("temp").exists());
        assert_eq!(synth.calls().len(), 4);
    }

    #[tokio::test]
    async fn stitch_failure_drops_only_that_section() {
        let dir = TempDir::new().unwrap();
        let synth = Arc::new(MockSynthesizer::new().with_invalid_audio());
        let pipeline = pipeline(RunMode::Stitch, dir.path(), synth, split_answer());

        let report = pipeline.run(&script()).await.unwrap();

        // Single-chunk sections pass through unmeasurable audio with duration 0
        assert_eq!(report.index.get(&OutputKey::section(0)), Some(0));
        assert_eq!(report.index.get(&OutputKey::section(1)), Some(0));
        assert_eq!(report.missing.len(), 1);
        assert_eq!(report.missing[0].index, 2);
        assert!(report.missing[0].reason.contains("section 2"));
        assert!(!dir.path().join("2.wav").exists());
        assert!(!dir.path().join("temp").exists());
    }

    #[tokio::test]
    async fn chunks_mode_failure_leaves_no_section_dir() {
        let dir = TempDir::new().unwrap();
        let synth = Arc::new(MockSynthesizer::new().with_failure_on("I am here"));
        let pipeline = pipeline(RunMode::Chunks, dir.path(), synth, split_answer());

        let report = pipeline.run(&script()).await.unwrap();

        assert_eq!(report.produced(), 2);
        assert!(dir.path().join("0").join("0.wav").is_file());
        assert!(!dir.path().join("2").exists());
        assert!(!report.index.contains_section(2));
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let dir = TempDir::new().unwrap();
        let synth = Arc::new(MockSynthesizer::new().with_transient_failures(2));
        let mut pipeline = pipeline(RunMode::Whole, dir.path(), synth.clone(), MockAdvisor::new());
        pipeline.config.concurrency = 1;
        pipeline.config.max_retries = 2;

        let item = DialogueItem::new(Speaker::Narrator, "Retry me.");
        let report = pipeline.run(&[item]).await.unwrap();

        assert!(report.is_complete());
        assert_eq!(synth.attempts(), 3);
    }

    #[tokio::test]
    async fn retries_are_bounded() {
        let dir = TempDir::new().unwrap();
        let synth = Arc::new(MockSynthesizer::new().with_failure_on("never"));
        let mut pipeline = pipeline(RunMode::Whole, dir.path(), synth.clone(), MockAdvisor::new());
        pipeline.config.max_retries = 1;

        let item = DialogueItem::new(Speaker::Human, "never works");
        let report = pipeline.run(&[item]).await.unwrap();

        assert_eq!(report.missing.len(), 1);
        assert_eq!(synth.attempts(), 2);
        assert!(report.index.is_empty());
    }

    #[tokio::test]
    async fn report_sums_estimates() {
        let dir = TempDir::new().unwrap();
        let pipeline = pipeline(
            RunMode::Whole,
            dir.path(),
            Arc::new(MockSynthesizer::new()),
            MockAdvisor::new(),
        );
        let mut items = script();
        items[0].estimated_ms = Some(1500);
        items[2].estimated_ms = Some(2500);

        let report = pipeline.run(&items).await.unwrap();
        assert_eq!(report.estimated_ms, 4000);
    }
}
