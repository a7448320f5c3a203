//! Thread-safe metering for the level-control chain.
//!
//! Atomic float storage so an observer (UI, logging, tests) can read
//! levels while the audio thread writes them, without locks. Values are
//! instantaneous per-block measurements, not smoothed.

use std::sync::atomic::{AtomicU32, Ordering};

/// Peaks around the chain and the per-stage gains of the last block.
#[derive(Default)]
pub struct Meters {
    input_peak: AtomicU32,
    output_peak: AtomicU32,
    normalizer_gain: AtomicU32,
    auto_volume_gain: AtomicU32,
}

impl Meters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_input_peak(&self, val: f32) {
        self.input_peak.store(val.to_bits(), Ordering::Relaxed);
    }

    pub fn set_output_peak(&self, val: f32) {
        self.output_peak.store(val.to_bits(), Ordering::Relaxed);
    }

    pub fn set_normalizer_gain(&self, val: f32) {
        self.normalizer_gain.store(val.to_bits(), Ordering::Relaxed);
    }

    pub fn set_auto_volume_gain(&self, val: f32) {
        self.auto_volume_gain.store(val.to_bits(), Ordering::Relaxed);
    }

    pub fn get_input_peak(&self) -> f32 {
        f32::from_bits(self.input_peak.load(Ordering::Relaxed))
    }

    pub fn get_output_peak(&self) -> f32 {
        f32::from_bits(self.output_peak.load(Ordering::Relaxed))
    }

    pub fn get_normalizer_gain(&self) -> f32 {
        f32::from_bits(self.normalizer_gain.load(Ordering::Relaxed))
    }

    pub fn get_auto_volume_gain(&self) -> f32 {
        f32::from_bits(self.auto_volume_gain.load(Ordering::Relaxed))
    }
}
