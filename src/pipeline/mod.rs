//! Batch narration pipeline.
//!
//! Sections fan out over the providers in bounded batches; each produces
//! audio files and durations, which are collected into one index after all
//! batches settle.

pub mod generate;
pub mod index;
pub mod limiter;
pub mod output;

pub use generate::{
    ChunkAudio, GenerationPipeline, MissingSection, PipelineConfig, RunReport, SectionAudio,
    SectionOutcome,
};
pub use index::{DurationIndex, OutputKey};
pub use limiter::run_batched;
pub use output::{OutputLayout, ScratchDir, prepare, write_atomic};
