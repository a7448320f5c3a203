pub mod auto_volume;
pub mod normalizer;
pub mod smooth;
pub mod utils;

pub use auto_volume::{AutoVolume, AutoVolumeConfig, MAX_CHANNELS};
pub use normalizer::{Normalizer, NormalizerConfig};
pub use smooth::SmoothingWindow;

use std::sync::Arc;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::meters::Meters;
use utils::frame_peak;

/// Whole-chain configuration: per-stage tunables plus independent enables.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LevelerConfig {
    pub normalizer: NormalizerConfig,
    pub auto_volume: AutoVolumeConfig,
    pub normalizer_enabled: bool,
    pub auto_volume_enabled: bool,
}

impl Default for LevelerConfig {
    fn default() -> Self {
        Self {
            normalizer: NormalizerConfig::default(),
            auto_volume: AutoVolumeConfig::default(),
            normalizer_enabled: true,
            auto_volume_enabled: false,
        }
    }
}

/// Level-control chain for one interleaved stream: stepped normalizer
/// first, RMS auto-volume second. A disabled stage is skipped, not
/// dropped, so toggling mid-stream costs nothing and loses no state.
pub struct LevelerChain {
    pub normalizer: Normalizer,
    pub auto_volume: AutoVolume,
    normalizer_enabled: bool,
    auto_volume_enabled: bool,
    meters: Arc<Meters>,
    layout_logged: bool,
}

impl LevelerChain {
    pub fn new(config: &LevelerConfig) -> Self {
        Self {
            normalizer: Normalizer::new(config.normalizer),
            auto_volume: AutoVolume::new(config.auto_volume),
            normalizer_enabled: config.normalizer_enabled,
            auto_volume_enabled: config.auto_volume_enabled,
            meters: Arc::new(Meters::new()),
            layout_logged: false,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(&LevelerConfig::default())
    }

    /// Run the enabled stages over `frames` interleaved frames in place.
    /// Returns the number of frames processed; a block no enabled stage
    /// can handle is rejected whole (return 0, samples untouched).
    pub fn process(&mut self, samples: &mut [f32], frames: usize, channels: usize) -> usize {
        if frames == 0 || channels == 0 {
            return 0;
        }
        // All-or-nothing: if the auto-volume stage would reject this
        // layout, skip the normalizer too, so no block is half processed.
        if self.auto_volume_enabled && channels > MAX_CHANNELS {
            if !self.layout_logged {
                self.layout_logged = true;
                warn!(
                    "leveler chain with auto-volume handles 1..={} channels, got {}; passing audio through",
                    MAX_CHANNELS, channels
                );
            }
            return 0;
        }
        let frames = frames.min(samples.len() / channels);
        if frames == 0 {
            return 0;
        }
        let block = &mut samples[..frames * channels];

        self.meters.set_input_peak(frame_peak(block));

        let mut done = frames;
        if self.normalizer_enabled {
            done = self.normalizer.process(block, frames, channels);
        }
        if self.auto_volume_enabled {
            done = self.auto_volume.process(block, frames, channels);
        }

        self.meters.set_output_peak(frame_peak(block));
        self.meters.set_normalizer_gain(self.normalizer.gain_factor() as f32);
        self.meters.set_auto_volume_gain(self.auto_volume.current_gain() as f32);
        done
    }

    pub fn set_config(&mut self, config: &LevelerConfig) {
        self.normalizer.set_config(&config.normalizer);
        self.auto_volume.set_config(&config.auto_volume);
        self.normalizer_enabled = config.normalizer_enabled;
        self.auto_volume_enabled = config.auto_volume_enabled;
    }

    pub fn set_normalizer_enabled(&mut self, enabled: bool) {
        self.normalizer_enabled = enabled;
    }

    pub fn normalizer_enabled(&self) -> bool {
        self.normalizer_enabled
    }

    pub fn set_auto_volume_enabled(&mut self, enabled: bool) {
        self.auto_volume_enabled = enabled;
    }

    pub fn auto_volume_enabled(&self) -> bool {
        self.auto_volume_enabled
    }

    /// Shared handle for observers; written once per processed block.
    pub fn meters(&self) -> Arc<Meters> {
        Arc::clone(&self.meters)
    }

    /// Reset both stages to their cold-start state.
    pub fn reset(&mut self) {
        self.normalizer.reset();
        self.auto_volume.reset();
    }
}

// ============================================================================
// TESTS
// ============================================================================
