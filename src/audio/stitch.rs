//! Lossless concatenation of WAV segments.
//!
//! Segments are joined at the container level: payloads are copied in
//! order behind a fresh canonical header. No samples are re-encoded, so all
//! segments must share one PCM format.

use crate::audio::wav::{self, WavInfo};
use crate::error::{NarrateError, Result};
use crate::pipeline::output::write_atomic;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Join `segments` in order into one WAV buffer.
///
/// A single segment is returned byte-for-byte.
///
/// # Errors
/// - `InvalidArgument` when `segments` is empty
/// - `AudioFormat` when a segment has no usable header
/// - `AudioFormatMismatch` when segments disagree on rate, channels or depth
pub fn stitch<S: AsRef<[u8]>>(segments: &[S]) -> Result<Vec<u8>> {
    match segments {
        [] => Err(NarrateError::InvalidArgument {
            message: "no segments to stitch".to_string(),
        }),
        [only] => Ok(only.as_ref().to_vec()),
        [first, rest @ ..] => {
            let first_info = wav::inspect(first.as_ref())?;
            let mut infos: Vec<WavInfo> = Vec::with_capacity(segments.len());
            infos.push(first_info);

            for (i, segment) in rest.iter().enumerate() {
                let info = wav::inspect(segment.as_ref())?;
                if info.format != first_info.format {
                    return Err(NarrateError::AudioFormatMismatch {
                        expected: first_info.format.to_string(),
                        actual: format!("{} in segment {}", info.format, i + 1),
                    });
                }
                infos.push(info);
            }

            let data_len: usize = infos.iter().map(|info| info.data_len).sum();
            let mut out = wav::canonical_header(first_info.format, data_len)?;
            out.reserve(data_len);
            for (segment, info) in segments.iter().zip(&infos) {
                out.extend_from_slice(info.payload(segment.as_ref()));
            }
            Ok(out)
        }
    }
}

/// Stitch the files at `paths` into `output`.
///
/// The result is written to a temporary sibling and renamed into place, so a
/// failed stitch never leaves a partial file at `output`. Returns the number
/// of bytes written.
pub async fn stitch_files(paths: &[PathBuf], output: &Path) -> Result<usize> {
    if paths.is_empty() {
        return Err(NarrateError::InvalidArgument {
            message: format!("no segments to stitch into {}", output.display()),
        });
    }

    let mut segments = Vec::with_capacity(paths.len());
    for path in paths {
        segments.push(tokio::fs::read(path).await?);
    }

    let joined = stitch(&segments)?;
    write_atomic(output, &joined).await?;

    debug!(
        "stitched {} segment(s) into {} ({} bytes)",
        paths.len(),
        output.display(),
        joined.len()
    );
    Ok(joined.len())
}
