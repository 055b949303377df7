//! Audio buffer types shared by every processing stage.
//!
//! Samples are stored planar (one `Vec<f64>` per channel). Estimation stages
//! work on mono mixdowns while output stages keep the full channel layout.

mod buffer;
mod pcm;

pub use buffer::{AudioBuffer, AudioError};
pub use pcm::{int_to_float, u8_to_float};
