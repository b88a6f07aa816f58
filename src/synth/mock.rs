//! Scripted in-memory providers for tests and dry runs.

use crate::audio::wav::{WavFormat, canonical_header};
use crate::error::{NarrateError, Result};
use crate::synth::{SpeechSynthesizer, VoiceAdvisor, VoiceChunk, VoiceOption};
use async_trait::async_trait;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Payload bytes generated per character of input text (10 ms at 24 kHz mono 16-bit).
pub const MOCK_BYTES_PER_CHAR: usize = 480;

/// Format of the audio the mock returns unless overridden.
pub const MOCK_FORMAT: WavFormat = WavFormat {
    channels: 1,
    sample_rate: 24000,
    bits_per_sample: 16,
};

/// Decrements the in-flight counter even when the call is cancelled.
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Mock speech synthesizer.
///
/// Returns a canonical WAV whose payload length is proportional to the text
/// length, so durations are predictable: `10 ms * chars`.
#[derive(Debug)]
pub struct MockSynthesizer {
    format: WavFormat,
    fail_on: Vec<String>,
    transient_failures: usize,
    invalid_audio: bool,
    delay: Duration,
    calls: Mutex<Vec<(String, String)>>,
    attempts: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl Default for MockSynthesizer {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSynthesizer {
    pub fn new() -> Self {
        Self {
            format: MOCK_FORMAT,
            fail_on: Vec::new(),
            transient_failures: 0,
            invalid_audio: false,
            delay: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
            attempts: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Fail every request whose text contains `needle`.
    pub fn with_failure_on(mut self, needle: &str) -> Self {
        self.fail_on.push(needle.to_string());
        self
    }

    /// Fail the first `count` requests, then succeed.
    pub fn with_transient_failures(mut self, count: usize) -> Self {
        self.transient_failures = count;
        self
    }

    /// Return bytes that are not a WAV container.
    pub fn with_invalid_audio(mut self) -> Self {
        self.invalid_audio = true;
        self
    }

    /// Sleep before answering, to keep calls overlapping.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_format(mut self, format: WavFormat) -> Self {
        self.format = format;
        self
    }

    /// Successful `(text, voice)` requests in completion order.
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Every request made, including failed ones.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Highest number of requests that were pending at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Expected duration of the audio generated for `text`.
    pub fn expected_ms(&self, text: &str) -> u64 {
        self.format
            .duration_ms(text.chars().count() * MOCK_BYTES_PER_CHAR)
    }

    fn render(&self, text: &str) -> Result<Vec<u8>> {
        if self.invalid_audio {
            return Ok(format!("not audio: {text}").into_bytes());
        }
        let payload_len = text.chars().count() * MOCK_BYTES_PER_CHAR;
        let mut bytes = canonical_header(self.format, payload_len)?;
        bytes.resize(bytes.len() + payload_len, 0);
        Ok(bytes)
    }
}

#[async_trait]
impl SpeechSynthesizer for MockSynthesizer {
    async fn synthesize(&self, text: &str, voice: &str) -> Result<Vec<u8>> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = InFlight(&self.in_flight);
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        if attempt < self.transient_failures {
            return Err(NarrateError::Synthesis {
                message: format!("mock transient failure #{}", attempt + 1),
            });
        }
        if let Some(needle) = self.fail_on.iter().find(|n| text.contains(n.as_str())) {
            return Err(NarrateError::Synthesis {
                message: format!("mock synthesis failure on {needle:?}"),
            });
        }

        let bytes = self.render(text)?;
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((text.to_string(), voice.to_string()));
        Ok(bytes)
    }
}

#[derive(Debug, Clone)]
enum Answer<T> {
    Reply(T),
    Unusable,
    Unreachable,
}

/// Mock decision model.
///
/// By default it classifies every text as option 1 and splits every text into
/// a single chunk spoken by option 1.
#[derive(Debug)]
pub struct MockAdvisor {
    classification: Answer<u32>,
    split: Option<Answer<Vec<VoiceChunk>>>,
    classify_calls: AtomicUsize,
    split_calls: AtomicUsize,
}

impl Default for MockAdvisor {
    fn default() -> Self {
        Self::new()
    }
}

impl MockAdvisor {
    pub fn new() -> Self {
        Self {
            classification: Answer::Reply(1),
            split: None,
            classify_calls: AtomicUsize::new(0),
            split_calls: AtomicUsize::new(0),
        }
    }

    /// Answer every classification with `number`, valid or not.
    pub fn with_classification(mut self, number: u32) -> Self {
        self.classification = Answer::Reply(number);
        self
    }

    /// Answer classifications with something that is not a number.
    pub fn with_classification_error(mut self) -> Self {
        self.classification = Answer::Unusable;
        self
    }

    /// Answer every split request with `chunks`.
    pub fn with_split(mut self, chunks: Vec<VoiceChunk>) -> Self {
        self.split = Some(Answer::Reply(chunks));
        self
    }

    /// Answer split requests with an unparseable response.
    pub fn with_split_error(mut self) -> Self {
        self.split = Some(Answer::Unusable);
        self
    }

    /// Fail every request at the transport level.
    pub fn with_provider_failure(mut self) -> Self {
        self.classification = Answer::Unreachable;
        self.split = Some(Answer::Unreachable);
        self
    }

    pub fn classify_calls(&self) -> usize {
        self.classify_calls.load(Ordering::SeqCst)
    }

    pub fn split_calls(&self) -> usize {
        self.split_calls.load(Ordering::SeqCst)
    }
}

fn unreachable_provider() -> NarrateError {
    NarrateError::Provider {
        message: "mock provider unreachable".to_string(),
    }
}

#[async_trait]
impl VoiceAdvisor for MockAdvisor {
    async fn classify_voice(&self, _text: &str, _options: &[VoiceOption]) -> Result<u32> {
        self.classify_calls.fetch_add(1, Ordering::SeqCst);
        match &self.classification {
            Answer::Reply(number) => Ok(*number),
            Answer::Unusable => Err(NarrateError::Classification {
                message: "mock answer is not a number".to_string(),
            }),
            Answer::Unreachable => Err(unreachable_provider()),
        }
    }

    async fn split_into_chunks(
        &self,
        text: &str,
        options: &[VoiceOption],
    ) -> Result<Vec<VoiceChunk>> {
        self.split_calls.fetch_add(1, Ordering::SeqCst);
        match &self.split {
            None => Ok(vec![VoiceChunk {
                text: text.to_string(),
                voice: options.first().map(|o| o.number).unwrap_or(1),
            }]),
            Some(Answer::Reply(chunks)) => Ok(chunks.clone()),
            Some(Answer::Unusable) => Err(NarrateError::Classification {
                message: "mock chunk list is malformed".to_string(),
            }),
            Some(Answer::Unreachable) => Err(unreachable_provider()),
        }
    }
}
