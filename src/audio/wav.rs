//! RIFF/WAVE header inspection.
//!
//! Recovers the PCM format and payload size of a synthesized segment and
//! derives its playback duration. The chunk list is walked to find `fmt `
//! and `data` by tag; when the walk cannot find both, the fixed offsets of
//! the canonical 44-byte header are used instead.

use crate::defaults::CANONICAL_HEADER_LEN;
use crate::error::{NarrateError, Result};
use std::fmt;
use tracing::warn;

const RIFF_TAG: &[u8; 4] = b"RIFF";
const WAVE_TAG: &[u8; 4] = b"WAVE";
const FMT_TAG: &[u8; 4] = b"fmt ";
const DATA_TAG: &[u8; 4] = b"data";

/// Deepest sample format a PCM or float WAV carries.
const MAX_BITS_PER_SAMPLE: u16 = 64;

/// Size placeholder written by streaming encoders that do not know the length up front.
const STREAMING_SIZE: u32 = u32::MAX;

/// PCM format parameters shared by every segment of one stitched file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavFormat {
    pub channels: u16,
    pub sample_rate: u32,
    pub bits_per_sample: u16,
}

impl WavFormat {
    /// Bytes per sample for a single channel.
    pub fn bytes_per_sample(&self) -> u32 {
        (u32::from(self.bits_per_sample)).div_ceil(8)
    }

    /// Bytes per frame (one sample for every channel).
    pub fn block_align(&self) -> u32 {
        u32::from(self.channels) * self.bytes_per_sample()
    }

    /// Duration of `data_len` payload bytes in milliseconds.
    pub fn duration_ms(&self, data_len: usize) -> u64 {
        let frames = data_len as f64 / f64::from(self.block_align());
        let seconds = frames / f64::from(self.sample_rate);
        (seconds * 1000.0).round() as u64
    }

    /// `(byte_rate, block_align)` as stored in a `fmt ` chunk.
    ///
    /// # Errors
    /// `AudioFormat` when either value does not fit its header field.
    pub fn header_fields(&self) -> Result<(u32, u16)> {
        let block_align = u16::try_from(self.block_align());
        let byte_rate = self.sample_rate.checked_mul(self.block_align());
        match (byte_rate, block_align) {
            (Some(byte_rate), Ok(block_align)) => Ok((byte_rate, block_align)),
            _ => Err(NarrateError::AudioFormat {
                message: format!("byte rate of {self} does not fit a WAV header"),
            }),
        }
    }

    fn validate(self) -> Result<Self> {
        if self.channels == 0 || self.sample_rate == 0 || self.bits_per_sample == 0 {
            return Err(NarrateError::AudioFormat {
                message: format!("degenerate format ({self})"),
            });
        }
        if self.bits_per_sample > MAX_BITS_PER_SAMPLE {
            return Err(NarrateError::AudioFormat {
                message: format!("unsupported sample depth ({self})"),
            });
        }
        self.header_fields()?;
        Ok(self)
    }
}

impl fmt::Display for WavFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} Hz, {} ch, {} bit",
            self.sample_rate, self.channels, self.bits_per_sample
        )
    }
}

/// Result of inspecting one segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavInfo {
    pub format: WavFormat,
    /// Offset of the first payload byte.
    pub data_offset: usize,
    /// Payload length in bytes.
    pub data_len: usize,
    /// Total segment length in bytes.
    pub byte_len: usize,
}

impl WavInfo {
    pub fn duration_ms(&self) -> u64 {
        self.format.duration_ms(self.data_len)
    }

    /// Payload slice of the inspected buffer.
    pub fn payload<'a>(&self, bytes: &'a [u8]) -> &'a [u8] {
        &bytes[self.data_offset..self.data_offset + self.data_len]
    }
}

/// Parse the container header of `bytes`.
///
/// # Errors
/// `AudioFormat` when the `RIFF`/`WAVE` tags are missing at offsets 0 and 8,
/// the header is truncated, or the format fields are zero.
pub fn inspect(bytes: &[u8]) -> Result<WavInfo> {
    if bytes.len() < 12 {
        return Err(NarrateError::AudioFormat {
            message: format!("{} bytes is too short for a RIFF header", bytes.len()),
        });
    }
    if &bytes[0..4] != RIFF_TAG || &bytes[8..12] != WAVE_TAG {
        return Err(NarrateError::AudioFormat {
            message: "missing RIFF/WAVE tags".to_string(),
        });
    }

    let info = match walk_chunks(bytes) {
        Some(info) => info,
        None => fixed_layout(bytes)?,
    };
    info.format.validate()?;
    Ok(info)
}

/// Duration in milliseconds of a complete segment.
pub fn measure(bytes: &[u8]) -> Result<u64> {
    inspect(bytes).map(|info| info.duration_ms())
}

/// Duration in milliseconds, or 0 with a warning when the header is unusable.
pub fn measure_or_zero(bytes: &[u8], label: &str) -> u64 {
    match measure(bytes) {
        Ok(ms) => ms,
        Err(e) => {
            warn!("cannot read duration of {label}: {e}; recording 0ms");
            0
        }
    }
}

/// Canonical 44-byte PCM header for `data_len` payload bytes.
pub fn canonical_header(format: WavFormat, data_len: usize) -> Result<Vec<u8>> {
    let data_len = u32::try_from(data_len)
        .ok()
        .filter(|len| len.checked_add(36).is_some())
        .ok_or_else(|| NarrateError::AudioFormat {
            message: format!("{data_len} payload bytes exceed the RIFF size limit"),
        })?;
    let (byte_rate, block_align) = format.header_fields()?;

    let mut header = Vec::with_capacity(CANONICAL_HEADER_LEN);
    header.extend_from_slice(RIFF_TAG);
    header.extend_from_slice(&(36 + data_len).to_le_bytes());
    header.extend_from_slice(WAVE_TAG);
    header.extend_from_slice(FMT_TAG);
    header.extend_from_slice(&16u32.to_le_bytes());
    header.extend_from_slice(&1u16.to_le_bytes()); // integer PCM
    header.extend_from_slice(&format.channels.to_le_bytes());
    header.extend_from_slice(&format.sample_rate.to_le_bytes());
    header.extend_from_slice(&byte_rate.to_le_bytes());
    header.extend_from_slice(&block_align.to_le_bytes());
    header.extend_from_slice(&format.bits_per_sample.to_le_bytes());
    header.extend_from_slice(DATA_TAG);
    header.extend_from_slice(&data_len.to_le_bytes());
    Ok(header)
}

fn read_u16(bytes: &[u8], offset: usize) -> Option<u16> {
    let raw = bytes.get(offset..offset + 2)?;
    Some(u16::from_le_bytes([raw[0], raw[1]]))
}

fn read_u32(bytes: &[u8], offset: usize) -> Option<u32> {
    let raw = bytes.get(offset..offset + 4)?;
    Some(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
}

/// Locate `fmt ` and `data` by tag. Returns `None` if either is missing.
fn walk_chunks(bytes: &[u8]) -> Option<WavInfo> {
    let mut pos = 12usize;
    let mut format: Option<WavFormat> = None;

    while pos + 8 <= bytes.len() {
        let tag = &bytes[pos..pos + 4];
        let size = read_u32(bytes, pos + 4)?;
        let body = pos + 8;

        if tag == FMT_TAG {
            if size < 16 {
                return None;
            }
            format = Some(WavFormat {
                channels: read_u16(bytes, body + 2)?,
                sample_rate: read_u32(bytes, body + 4)?,
                bits_per_sample: read_u16(bytes, body + 14)?,
            });
        } else if tag == DATA_TAG {
            let remaining = bytes.len() - body;
            // Streamed output may carry a placeholder size; take the rest of the buffer
            let data_len = if size == STREAMING_SIZE || size as usize > remaining {
                remaining
            } else {
                size as usize
            };
            return format.map(|format| WavInfo {
                format,
                data_offset: body,
                data_len,
                byte_len: bytes.len(),
            });
        }

        let padded = size as usize + (size as usize & 1);
        pos = body.checked_add(padded)?;
    }

    None
}

/// Read the canonical layout: format fields at 22/24/34, payload from byte 44.
fn fixed_layout(bytes: &[u8]) -> Result<WavInfo> {
    if bytes.len() < CANONICAL_HEADER_LEN {
        return Err(NarrateError::AudioFormat {
            message: format!(
                "{} bytes is shorter than the {CANONICAL_HEADER_LEN}-byte header",
                bytes.len()
            ),
        });
    }

    let truncated = || NarrateError::AudioFormat {
        message: "truncated header".to_string(),
    };
    let format = WavFormat {
        channels: read_u16(bytes, 22).ok_or_else(truncated)?,
        sample_rate: read_u32(bytes, 24).ok_or_else(truncated)?,
        bits_per_sample: read_u16(bytes, 34).ok_or_else(truncated)?,
    };

    Ok(WavInfo {
        format,
        data_offset: CANONICAL_HEADER_LEN,
        data_len: bytes.len() - CANONICAL_HEADER_LEN,
        byte_len: bytes.len(),
    })
}
