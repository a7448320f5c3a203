//! Adaptive level control for streamed PCM audio.
//!
//! Two cascaded, independently configured gain stages process interleaved
//! `f32` blocks in place:
//!
//! - [`Normalizer`] walks a stepped gain toward a peak target, driven by a
//!   small prediction table so isolated transients cannot move it.
//! - [`AutoVolume`] tracks windowed per-channel RMS loudness and steers a
//!   capped continuous gain, with optional soft amplitude compression.
//!
//! [`LevelerChain`] composes both for a single stream and publishes
//! [`Meters`] for observers. Processing is single-threaded and
//! allocation-free after construction; the caller owns the buffers and
//! serializes calls per instance.

pub mod dsp;
pub mod meters;
pub mod presets;

pub use dsp::{
    AutoVolume, AutoVolumeConfig, LevelerChain, LevelerConfig, Normalizer, NormalizerConfig,
    SmoothingWindow, MAX_CHANNELS,
};
pub use meters::Meters;
pub use presets::LevelerPreset;
