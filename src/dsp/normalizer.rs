//! Stepped Peak Normalizer
//!
//! # Perceptual Contract
//! - **Target Source**: Program material with a consistent but wrong
//!   overall level (quiet movie dialogue, low-mastered tracks).
//! - **Intended Effect**: Walk the playback gain toward a target peak
//!   level in small discrete steps, slowly enough to stay inaudible.
//! - **Failure Modes**:
//!   - Audible stepping when the step granularity is too coarse for the
//!     material.
//!   - Slow ramp from a cold start (gain builds from the bottom step).
//! - **Will Not Do**:
//!   - Per-channel balancing (the peak is global across all channels).
//!   - Brickwall limiting (the overload guard pulls gain down between
//!     decisions; it does not clip samples).
//!
//! # Decision Machine
//! Each block of at most 512 frames contributes one loud/quiet decision
//! against the configured level. Decisions feed a two-level adaptive
//! predictor: a 4-bit history of recent outcomes indexes a table of
//! saturating counters, so an isolated transient cannot move the gain;
//! only a consistent trend does. Ramp-down is a single volume unit per
//! block, while ramp-up accelerates to a full step per block after 128
//! consecutive quiet blocks, so long quiet passages recover quickly.
//!
//! Measurement is 16-bit-equivalent: peaks are scaled by 32768, and the
//! overload limit (30000), silence floor (10) and level threshold
//! (`level << 15 / 100`) are all tuned to that scale.

use log::warn;
use serde::{Deserialize, Serialize};

use crate::dsp::utils::frame_peak;

// ============================================================================
// CONSTANTS
// ============================================================================

// Frames per internal decision block. The public entry point splits larger
// blocks so the adaptive state is refreshed at a bounded interval.
// Must not change: the thresholds below are tuned against this block size.
const CHUNK_FRAMES: usize = 512;

// 16-bit-equivalent scale applied to the measured peak.
// Must not change: every threshold below assumes this scale.
const PEAK_SCALE: f64 = 32768.0;

// Scaled peak above which the overload guard engages.
// Increasing: hotter blocks tolerated before forced gain cuts; decreasing:
// earlier cuts and less headroom use.
const OVERLOAD_LIMIT: f64 = 30000.0;

// Scaled peak at or below which a block counts as silence and the adaptive
// state is left untouched.
// Increasing: more blocks ignored; decreasing: adapts on quieter blocks.
const SILENCE_FLOOR: f64 = 10.0;

// Overload-guard iteration bound. Past this the block is processed with
// the last factor reached instead of spinning.
// Must not change: callers rely on a bounded worst case per block.
const GUARD_MAX_TRIES: u32 = 1024;

// Prediction table geometry: 16 saturating counters addressed by a 4-bit
// history of recent loud/quiet outcomes.
const PREDICTION_SIZE: usize = 16;
// History bit set when a block was quiet.
const PREDICTOR_TOP_BIT: usize = 0x8;
// Counters run 0..=15 and start dead center; values at or above
// PREDICT_RISE_MIN vote for more gain, values below for less.
const PREDICT_MAX: u8 = 15;
const PREDICT_INIT: u8 = 7;
const PREDICT_RISE_MIN: u8 = 8;

// Consecutive quiet blocks after which ramp-up switches from one volume
// unit to a full step per block.
// Increasing: slower recovery after long quiet passages; decreasing:
// faster but more audible recovery.
const RISING_FAST_RAMP: u32 = 128;

// Valid range for the level percentage.
const LEVEL_MIN: i32 = 0;
const LEVEL_MAX: i32 = 100;

// Valid range for the step exponent. The upper bound keeps `1 << stepping`
// small enough that the volume arithmetic stays comfortably inside i32.
const STEPPING_MIN: i32 = 1;
const STEPPING_MAX: i32 = 16;

// ============================================================================
// CONFIG
// ============================================================================

/// Tunables for the stepped normalizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizerConfig {
    /// Target level as a percentage of full scale (0-100).
    pub level: i32,
    /// Allow gain above unity. When false the volume is clamped back to
    /// the neutral step after every block.
    pub boost: bool,
    /// Step exponent; the neutral volume is `1 << stepping`.
    pub stepping: i32,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            level: 75,
            boost: true,
            stepping: 8,
        }
    }
}

// ============================================================================
// PROCESSOR
// ============================================================================

/// Stepped peak normalizer driven by a prediction table.
///
/// Gain is the rational `volume / (1 << stepping)`; `volume` is the only
/// continuously adapted quantity and never drops below 1.
pub struct Normalizer {
    level: i32,
    boost: bool,
    stepping: i32,
    stepping_vol: i32,
    volume: i32,
    prediction: [u8; PREDICTION_SIZE],
    predictor: usize,
    rising: u32,
    guard_cap_logged: bool,
}

impl Normalizer {
    pub fn new(config: NormalizerConfig) -> Self {
        let stepping = config.stepping.clamp(STEPPING_MIN, STEPPING_MAX);
        Self {
            level: config.level.clamp(LEVEL_MIN, LEVEL_MAX),
            boost: config.boost,
            stepping,
            stepping_vol: 1 << stepping,
            volume: 1,
            prediction: [PREDICT_INIT; PREDICTION_SIZE],
            predictor: 0,
            rising: 0,
            guard_cap_logged: false,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(NormalizerConfig::default())
    }

    /// Process `frames` interleaved frames in place. Returns the number of
    /// frames actually processed; `frames` is clamped to what the slice
    /// holds, so a short slice is never read past.
    pub fn process(&mut self, samples: &mut [f32], frames: usize, channels: usize) -> usize {
        if frames == 0 || channels == 0 {
            return 0;
        }
        let frames = frames.min(samples.len() / channels);

        let mut done = 0usize;
        while done < frames {
            let take = (frames - done).min(CHUNK_FRAMES);
            let start = done * channels;
            let end = start + take * channels;
            done += self.process_block(&mut samples[start..end], take);
        }
        done
    }

    /// One decision block: measure, guard, decide, apply.
    fn process_block(&mut self, samples: &mut [f32], frames: usize) -> usize {
        if self.volume <= 0 {
            self.volume = 1;
        }

        let max_peak = frame_peak(samples) as f64;

        let mut factor = self.factor();
        let mut highest = max_peak * factor * PEAK_SCALE;

        // Overload guard: walk the volume down one step at a time until the
        // scaled peak is back under the limit. Bounded so pathological
        // input degrades softly; past the cap the block is still processed
        // with the last factor reached.
        if highest > OVERLOAD_LIMIT {
            let mut tries = 0u32;
            while highest > OVERLOAD_LIMIT && tries < GUARD_MAX_TRIES {
                if self.volume > self.stepping {
                    self.volume -= self.stepping;
                } else {
                    self.volume = 1;
                }
                factor = self.factor();
                highest = max_peak * factor * PEAK_SCALE;
                tries += 1;
            }
            if highest > OVERLOAD_LIMIT && !self.guard_cap_logged {
                self.guard_cap_logged = true;
                warn!(
                    "overload guard hit its iteration cap; block passed with scaled peak {:.0}",
                    highest
                );
            }
        }

        if highest > SILENCE_FLOOR {
            let threshold = ((self.level as i64) << 15) as f64 / 100.0;
            if highest > threshold {
                // Too loud: vote this history pattern down, clear the quiet
                // streak, and step back once the counter has tipped.
                let entry = &mut self.prediction[self.predictor];
                *entry = entry.saturating_sub(1);
                let predict = *entry;
                self.predictor >>= 1;
                self.rising = 0;
                if predict < PREDICT_RISE_MIN && self.volume > 1 {
                    self.volume -= 1;
                }
            } else {
                // Quiet: vote up and ramp, a full step per block once the
                // streak is long enough.
                let entry = &mut self.prediction[self.predictor];
                if *entry < PREDICT_MAX {
                    *entry += 1;
                }
                let predict = *entry;
                self.predictor = (self.predictor >> 1) | PREDICTOR_TOP_BIT;
                if predict >= PREDICT_RISE_MIN {
                    self.rising = self.rising.saturating_add(1);
                    self.volume += if self.rising < RISING_FAST_RAMP {
                        1
                    } else {
                        self.stepping
                    };
                }
            }
        }

        // The factor predates this block's decision; the new volume is
        // heard one block later.
        if factor != 1.0 {
            for s in samples.iter_mut() {
                *s = (*s as f64 * factor) as f32;
            }
        }

        if !self.boost && self.volume > self.stepping_vol {
            self.volume = self.stepping_vol;
        }

        frames
    }

    #[inline]
    fn factor(&self) -> f64 {
        if self.volume != self.stepping_vol {
            self.volume as f64 / self.stepping_vol as f64
        } else {
            1.0
        }
    }

    /// Apply new tunables mid-stream. A stepping change rescales the
    /// current volume so the effective gain ratio carries over.
    pub fn set_config(&mut self, config: &NormalizerConfig) {
        self.level = config.level.clamp(LEVEL_MIN, LEVEL_MAX);
        self.boost = config.boost;

        let stepping = config.stepping.clamp(STEPPING_MIN, STEPPING_MAX);
        if stepping != self.stepping {
            let rescaled = ((self.volume as i64) << stepping) / (1i64 << self.stepping);
            self.volume = rescaled.max(1) as i32;
            self.stepping = stepping;
            self.stepping_vol = 1 << stepping;
        }
    }

    pub fn config(&self) -> NormalizerConfig {
        NormalizerConfig {
            level: self.level,
            boost: self.boost,
            stepping: self.stepping,
        }
    }

    /// Current gain as applied to the next block.
    pub fn gain_factor(&self) -> f64 {
        self.factor()
    }

    #[allow(dead_code)]
    pub fn volume(&self) -> i32 {
        self.volume
    }

    /// Return to the cold-start state: bottom volume, neutral predictor.
    pub fn reset(&mut self) {
        self.volume = 1;
        self.prediction = [PREDICT_INIT; PREDICTION_SIZE];
        self.predictor = 0;
        self.rising = 0;
    }
}

// ============================================================================
// TESTS
// ============================================================================
