use serde::{Deserialize, Serialize};

use crate::dsp::{AutoVolumeConfig, LevelerConfig, NormalizerConfig};

// =============================================================================
// LEVELER FACTORY PRESETS
// =============================================================================

/// Factory presets for common listening scenarios.
/// Values anchored to the long-standing player defaults (level 75, boost,
/// stepping 8) with variants tilted toward their material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LevelerPreset {
    #[serde(rename = "Manual")]
    Manual,
    #[serde(rename = "Movie")]
    Movie,
    #[serde(rename = "Music")]
    Music,
    #[serde(rename = "Night Mode")]
    NightMode,
}

impl LevelerPreset {
    pub fn all_presets() -> [LevelerPreset; 4] {
        [
            LevelerPreset::Manual,
            LevelerPreset::Movie,
            LevelerPreset::Music,
            LevelerPreset::NightMode,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            LevelerPreset::Manual => "Manual",
            LevelerPreset::Movie => "Movie",
            LevelerPreset::Music => "Music",
            LevelerPreset::NightMode => "Night Mode",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            LevelerPreset::Manual => "Custom settings - no preset applied",
            LevelerPreset::Movie => "Boost quiet dialogue toward a comfortable level",
            LevelerPreset::Music => "Gentle attenuation only - never amplifies the mix",
            LevelerPreset::NightMode => "Flatten loudness swings and tame peaks for low-volume listening",
        }
    }

    /// Chain configuration for the preset; `Manual` has none.
    pub fn config(&self) -> Option<LevelerConfig> {
        match self {
            LevelerPreset::Manual => None,
            LevelerPreset::Movie => Some(LevelerConfig {
                normalizer: NormalizerConfig {
                    level: 75,
                    boost: true,
                    stepping: 8,
                },
                auto_volume: AutoVolumeConfig::default(),
                normalizer_enabled: true,
                auto_volume_enabled: false,
            }),
            LevelerPreset::Music => Some(LevelerConfig {
                // Finer steps and a higher target; boost off keeps dynamics.
                normalizer: NormalizerConfig {
                    level: 90,
                    boost: false,
                    stepping: 6,
                },
                auto_volume: AutoVolumeConfig::default(),
                normalizer_enabled: true,
                auto_volume_enabled: false,
            }),
            LevelerPreset::NightMode => Some(LevelerConfig {
                normalizer: NormalizerConfig {
                    level: 60,
                    boost: true,
                    stepping: 8,
                },
                // Both stages on, with the RMS stage compressing peaks so
                // late-night playback stays inside a narrow band.
                auto_volume: AutoVolumeConfig {
                    normalize_level: 0.2,
                    do_compress: true,
                    ..AutoVolumeConfig::default()
                },
                normalizer_enabled: true,
                auto_volume_enabled: true,
            }),
        }
    }

    /// Case-insensitive lookup by display name.
    pub fn from_name(name: &str) -> Option<LevelerPreset> {
        Self::all_presets()
            .into_iter()
            .find(|p| p.name().eq_ignore_ascii_case(name))
    }
}

impl Default for LevelerPreset {
    fn default() -> Self {
        LevelerPreset::Manual
    }
}
