//! WAV container handling: header inspection and segment stitching.

pub mod stitch;
pub mod wav;

pub use stitch::{stitch, stitch_files};
pub use wav::{WavFormat, WavInfo, inspect, measure, measure_or_zero};
