//! RMS Auto-Volume
//!
//! # Perceptual Contract
//! - **Target Source**: Program material whose loudness drifts over
//!   minutes (films mixing whisper scenes against action, uneven
//!   playlists).
//! - **Intended Effect**: Track per-channel RMS loudness over a long
//!   window and steer a single capped gain toward a target, reacting
//!   quickly to new loud material and slowly to quiet.
//! - **Failure Modes**:
//!   - Pumping if the smoothing window is far too short.
//!   - Cold-start gain drift while the window fills (estimates lean on
//!     the configured target until real history exists).
//! - **Will Not Do**:
//!   - Per-channel gain (the loudest channel sets one gain for all).
//!   - Look-ahead limiting; overshoot is hard-clamped to the 16-bit
//!     range instead.
//!
//! # Estimator
//! Each block contributes one RMS power sample per channel to that
//! channel's [`SmoothingWindow`]; the loudest channel's smoothed estimate
//! drives the gain. Because full windows ratchet a sticky maximum, gain
//! rises cautiously and falls fast. An optional soft knee compresses
//! amplitudes above a cutoff before both the measurement and the gain
//! pass, taming isolated peaks without touching the body of the signal.
//!
//! The math runs 16-bit-equivalent (samples scaled by 32767) and the gain
//! pass clamps to that range, matching the normalizer's measurement
//! domain.

use log::warn;
use serde::{Deserialize, Serialize};

use crate::dsp::smooth::{SmoothingWindow, INVALID_LEVEL};

// ============================================================================
// CONSTANTS
// ============================================================================

/// Most interleaved channels the estimator tracks; blocks with more are
/// rejected whole.
pub const MAX_CHANNELS: usize = 8;

// 16-bit-equivalent scale for the power math and the gain pass.
// Must not change: thresholds and the clamp below assume this scale.
const SAMPLE_SCALE: f64 = i16::MAX as f64;

// Representable range after gain, 16-bit-equivalent.
const CLAMP_MIN: f64 = i16::MIN as f64;
const CLAMP_MAX: f64 = i16::MAX as f64;

// Undoes the 16-bit scale inside the accumulated power sum.
const NORMAL_SQUARED: f64 = (1.0 / SAMPLE_SCALE) * (1.0 / SAMPLE_SCALE);

// Half-width of the unity band inside which the gain pass is skipped and
// the block stays bit-exact.
// Increasing: more blocks pass untouched; decreasing: tighter tracking.
const NO_GAIN: f64 = 0.01;

// ============================================================================
// CONFIG
// ============================================================================

/// Tunables for the auto-volume stage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AutoVolumeConfig {
    /// Loudness target the gain steers toward (normalized RMS, 0..1).
    pub normalize_level: f64,
    /// Estimates at or below this count as silence; the gain path stays
    /// off and the last gain is forgotten.
    pub silence_level: f64,
    /// Upper bound on the gain multiplier.
    pub max_mult: f64,
    /// Soft-compress amplitudes above `cutoff` before measurement and
    /// before the gain pass.
    pub do_compress: bool,
    /// Compression knee, 16-bit-equivalent scale.
    pub cutoff: f64,
    /// Divisor applied to the overshoot above the knee.
    pub degree: f64,
    /// Smoothing window length in blocks. Fixed at construction; later
    /// `set_config` calls leave the windows alone.
    pub window_len: usize,
}

impl Default for AutoVolumeConfig {
    fn default() -> Self {
        Self {
            normalize_level: 0.25,
            silence_level: 0.01,
            max_mult: 5.0,
            do_compress: false,
            cutoff: 20000.0,
            degree: 2.0,
            window_len: 100,
        }
    }
}

// ============================================================================
// PROCESSOR
// ============================================================================

/// Windowed-RMS gain control over up to [`MAX_CHANNELS`] channels.
pub struct AutoVolume {
    smooth: Vec<SmoothingWindow>,
    normalize_level: f64,
    silence_level: f64,
    max_mult: f64,
    do_compress: bool,
    cutoff: f64,
    degree: f64,
    last_level: f64,
    last_gain: f64,
    layout_logged: bool,
}

impl AutoVolume {
    pub fn new(config: AutoVolumeConfig) -> Self {
        let mut av = Self {
            smooth: (0..MAX_CHANNELS)
                .map(|_| SmoothingWindow::new(config.window_len))
                .collect(),
            normalize_level: 0.0,
            silence_level: 0.0,
            max_mult: 0.0,
            do_compress: false,
            cutoff: 0.0,
            degree: 1.0,
            last_level: INVALID_LEVEL,
            last_gain: 1.0,
            layout_logged: false,
        };
        av.set_config(&config);
        av
    }

    pub fn with_defaults() -> Self {
        Self::new(AutoVolumeConfig::default())
    }

    /// Process `frames` interleaved frames in place. Returns the number of
    /// frames processed; an unsupported channel count rejects the whole
    /// block (return 0, samples untouched).
    pub fn process(&mut self, samples: &mut [f32], frames: usize, channels: usize) -> usize {
        if frames == 0 {
            return 0;
        }
        if channels == 0 || channels > MAX_CHANNELS {
            if !self.layout_logged {
                self.layout_logged = true;
                warn!(
                    "auto-volume handles 1..={} interleaved channels, got {}; block rejected",
                    MAX_CHANNELS, channels
                );
            }
            return 0;
        }
        let frames = frames.min(samples.len() / channels);
        if frames == 0 {
            return 0;
        }
        let samples = &mut samples[..frames * channels];

        self.accumulate_power(samples, frames, channels);

        // The loudest channel wins: one hot channel ducks the whole block.
        let mut level = INVALID_LEVEL;
        for window in self.smooth.iter_mut().take(channels) {
            let channel_level = window.smoothed_max(self.normalize_level);
            if channel_level > level {
                level = channel_level;
            }
        }
        self.last_level = level;

        if level > self.silence_level {
            let gain = (self.normalize_level / level).min(self.max_mult);
            self.last_gain = gain;
            self.apply_gain(samples, gain);
        } else {
            self.last_gain = 1.0;
        }

        frames
    }

    /// One RMS power sample per channel into its smoothing window.
    fn accumulate_power(&mut self, samples: &[f32], frames: usize, channels: usize) {
        let mut sum = [0.0f64; MAX_CHANNELS];

        let mut channel = 0usize;
        for &s in samples {
            let scaled = self.soft_clip(s as f64 * SAMPLE_SCALE);
            sum[channel] += scaled * scaled;
            channel += 1;
            if channel == channels {
                channel = 0;
            }
        }

        // Power normalization keeps the historical 2/(frames*channels)
        // form: exact for stereo, proportionally biased for other layouts.
        // The default thresholds are tuned against it.
        let channel_length = 2.0 / (frames * channels) as f64;
        for (channel, window) in self.smooth.iter_mut().take(channels).enumerate() {
            let power = sum[channel] * channel_length * NORMAL_SQUARED;
            window.push(power.sqrt());
        }
    }

    // Soft knee above the cutoff: the overshoot is divided down, sign
    // preserved. Runs identically in the measurement and the gain pass so
    // the estimate matches what the gain is applied to.
    #[inline]
    fn soft_clip(&self, sample: f64) -> f64 {
        if !self.do_compress {
            return sample;
        }
        let magnitude = sample.abs();
        if magnitude > self.cutoff {
            (self.cutoff + (magnitude - self.cutoff) / self.degree).copysign(sample)
        } else {
            sample
        }
    }

    fn apply_gain(&self, samples: &mut [f32], gain: f64) {
        // Unity band: skip the pass entirely so an idle stage is bit-exact.
        if gain >= 1.0 - NO_GAIN && gain <= 1.0 + NO_GAIN {
            return;
        }
        for s in samples.iter_mut() {
            let scaled = self.soft_clip(*s as f64 * SAMPLE_SCALE) * gain;
            *s = (scaled.clamp(CLAMP_MIN, CLAMP_MAX) / SAMPLE_SCALE) as f32;
        }
    }

    /// Apply new tunables mid-stream. `window_len` is construction-only;
    /// the remaining fields are sanity-bounded rather than rejected.
    pub fn set_config(&mut self, config: &AutoVolumeConfig) {
        self.normalize_level = config.normalize_level.max(0.0);
        self.silence_level = config.silence_level.max(0.0);
        self.max_mult = config.max_mult.max(0.0);
        self.do_compress = config.do_compress;
        self.cutoff = config.cutoff.max(0.0);
        // degree below 1 would expand the overshoot instead of taming it.
        self.degree = config.degree.max(1.0);
    }

    pub fn config(&self) -> AutoVolumeConfig {
        AutoVolumeConfig {
            normalize_level: self.normalize_level,
            silence_level: self.silence_level,
            max_mult: self.max_mult,
            do_compress: self.do_compress,
            cutoff: self.cutoff,
            degree: self.degree,
            window_len: self.smooth.first().map_or(0, SmoothingWindow::capacity),
        }
    }

    /// Gain chosen by the most recent block (1.0 during silence).
    pub fn current_gain(&self) -> f64 {
        self.last_gain
    }

    /// Level estimate behind that gain ([`INVALID_LEVEL`] before any block
    /// or with zero-length windows).
    #[allow(dead_code)]
    pub fn current_level(&self) -> f64 {
        self.last_level
    }

    /// Forget all loudness history and return the gain to unity.
    pub fn reset(&mut self) {
        for window in &mut self.smooth {
            window.reset();
        }
        self.last_level = INVALID_LEVEL;
        self.last_gain = 1.0;
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn block(frames: usize, channels: usize, value: f32) -> Vec<f32> {
        vec![value; frames * channels]
    }

    fn config(window_len: usize) -> AutoVolumeConfig {
        AutoVolumeConfig {
            window_len,
            ..AutoVolumeConfig::default()
        }
    }

    // For constant-amplitude stereo input the 2/(frames*channels)
    // normalization cancels exactly and the per-channel estimate equals
    // the amplitude itself.
    fn feed_constant(av: &mut AutoVolume, amplitude: f32, calls: usize) {
        for _ in 0..calls {
            let mut buf = block(100, 2, amplitude);
            av.process(&mut buf, 100, 2);
        }
    }

    #[test]
    fn test_silence_stays_untouched_once_window_is_full() {
        let mut av = AutoVolume::new(config(4));
        feed_constant(&mut av, 0.001, 4);

        for _ in 0..10 {
            let src = block(100, 2, 0.001);
            let mut buf = src.clone();
            let done = av.process(&mut buf, 100, 2);
            assert_eq!(done, 100);
            assert!(av.current_level() <= 0.01, "level {} should read as silence", av.current_level());
            assert_eq!(av.current_gain(), 1.0);
            assert!(
                buf.iter().zip(&src).all(|(a, b)| a.to_bits() == b.to_bits()),
                "silent input must pass through bit-exact"
            );
        }
    }

    #[test]
    fn test_boost_is_capped_at_max_mult() {
        let mut av = AutoVolume::new(config(4));
        feed_constant(&mut av, 0.04, 4);

        let mut buf = block(100, 2, 0.04);
        av.process(&mut buf, 100, 2);
        // 0.25 / 0.04 would be 6.25; the cap holds it at 5.
        assert_eq!(av.current_gain(), 5.0);
        assert!((buf[0] - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_loud_onset_ducks_within_one_block() {
        let mut av = AutoVolume::new(config(4));
        feed_constant(&mut av, 0.04, 5);
        let quiet_level = av.current_level();
        let quiet_gain = av.current_gain();

        feed_constant(&mut av, 0.4, 1);
        assert!(
            av.current_level() > quiet_level,
            "one loud block must already raise the estimate"
        );
        assert!(av.current_gain() < quiet_gain);
    }

    #[test]
    fn test_quiet_after_loud_keeps_the_held_maximum() {
        let mut av = AutoVolume::new(config(4));
        feed_constant(&mut av, 0.4, 4);
        let loud_level = av.current_level();
        let loud_gain = av.current_gain();
        assert!((loud_level - 0.4).abs() < 1e-6);

        // Churn the whole window with quiet material; the sticky maximum
        // keeps both estimate and gain where the loud passage left them.
        feed_constant(&mut av, 0.04, 8);
        assert_eq!(av.current_level(), loud_level);
        assert_eq!(av.current_gain(), loud_gain);
    }

    #[test]
    fn test_gain_formula_and_clamp_match_the_scaled_domain() {
        let mut av = AutoVolume::new(AutoVolumeConfig {
            normalize_level: 0.2,
            max_mult: 4.0,
            window_len: 1,
            ..AutoVolumeConfig::default()
        });

        let mut buf = block(100, 2, 0.05);
        let done = av.process(&mut buf, 100, 2);
        assert_eq!(done, 100);
        assert!((av.current_level() - 0.05).abs() < 1e-6);

        // target/level sits right at the cap; the f32 amplitude rounding
        // leaves it a hair under, so the division side of min() binds.
        let gain = av.current_gain();
        assert!((gain - 4.0).abs() < 1e-6);
        assert!(gain <= 4.0);

        let expected = ((0.05f32 as f64 * SAMPLE_SCALE * gain).clamp(CLAMP_MIN, CLAMP_MAX)
            / SAMPLE_SCALE) as f32;
        assert!(buf.iter().all(|&s| s == expected));
    }

    #[test]
    fn test_overshoot_is_clamped_to_the_16_bit_range() {
        let mut av = AutoVolume::new(config(1));

        // Mostly quiet with one hot sample: the RMS stays low, the gain
        // comes out well above 1, and the hot sample must pin at full scale.
        let mut buf = block(100, 2, 0.02);
        buf[7] = 0.9;
        av.process(&mut buf, 100, 2);

        let gain = av.current_gain();
        assert!(gain > 1.5, "spiky block should still read as quiet, got gain {}", gain);
        assert_eq!(buf[7], 1.0, "hot sample must clamp to full scale");
        let expected_quiet = ((0.02f32 as f64 * SAMPLE_SCALE * gain).clamp(CLAMP_MIN, CLAMP_MAX)
            / SAMPLE_SCALE) as f32;
        assert_eq!(buf[0], expected_quiet);
    }

    #[test]
    fn test_unity_band_passes_bits_through() {
        let mut av = AutoVolume::new(AutoVolumeConfig {
            normalize_level: 0.2,
            window_len: 4,
            ..AutoVolumeConfig::default()
        });

        // Input level equals the target, so the computed gain is exactly
        // 1.0 from the first call through a full window.
        for _ in 0..10 {
            let src = block(100, 2, 0.2);
            let mut buf = src.clone();
            av.process(&mut buf, 100, 2);
            assert!((av.current_gain() - 1.0).abs() < NO_GAIN);
            assert!(buf.iter().zip(&src).all(|(a, b)| a.to_bits() == b.to_bits()));
        }
    }

    #[test]
    fn test_soft_clip_is_symmetric_in_sign() {
        let cfg = AutoVolumeConfig {
            do_compress: true,
            cutoff: 10000.0,
            degree: 2.0,
            window_len: 1,
            ..AutoVolumeConfig::default()
        };

        let mut pos = AutoVolume::new(cfg);
        let mut pos_buf = block(100, 2, 0.5);
        pos.process(&mut pos_buf, 100, 2);

        let mut neg = AutoVolume::new(cfg);
        let mut neg_buf = block(100, 2, -0.5);
        neg.process(&mut neg_buf, 100, 2);

        assert_eq!(pos.current_level(), neg.current_level());
        assert_eq!(pos.current_gain(), neg.current_gain());
        for (p, n) in pos_buf.iter().zip(&neg_buf) {
            assert_eq!(*p, -*n, "compression must mirror across zero");
        }
    }

    #[test]
    fn test_soft_clip_lowers_the_measured_level() {
        let mut plain = AutoVolume::new(config(1));
        let mut buf = block(100, 2, 0.5);
        plain.process(&mut buf, 100, 2);

        let mut clipped = AutoVolume::new(AutoVolumeConfig {
            do_compress: true,
            cutoff: 10000.0,
            degree: 2.0,
            window_len: 1,
            ..AutoVolumeConfig::default()
        });
        let mut buf = block(100, 2, 0.5);
        clipped.process(&mut buf, 100, 2);

        assert!(clipped.current_level() < plain.current_level());
    }

    #[test]
    fn test_unsupported_layout_rejects_the_whole_block() {
        let mut av = AutoVolume::with_defaults();

        let src = block(40, MAX_CHANNELS + 1, 0.5);
        let mut buf = src.clone();
        assert_eq!(av.process(&mut buf, 40, MAX_CHANNELS + 1), 0);
        assert!(buf.iter().zip(&src).all(|(a, b)| a.to_bits() == b.to_bits()));

        let mut buf = block(40, 2, 0.5);
        assert_eq!(av.process(&mut buf, 40, 0), 0);
        assert_eq!(av.process(&mut buf, 0, 2), 0);
    }

    #[test]
    fn test_zero_length_windows_degrade_to_passthrough() {
        let mut av = AutoVolume::new(config(0));
        for _ in 0..5 {
            let src = block(100, 2, 0.5);
            let mut buf = src.clone();
            let done = av.process(&mut buf, 100, 2);
            assert_eq!(done, 100);
            assert_eq!(av.current_level(), INVALID_LEVEL);
            assert_eq!(av.current_gain(), 1.0);
            assert!(buf.iter().zip(&src).all(|(a, b)| a.to_bits() == b.to_bits()));
        }
    }

    #[test]
    fn test_set_config_bounds_degree_and_keeps_windows() {
        let mut av = AutoVolume::new(config(16));
        av.set_config(&AutoVolumeConfig {
            degree: 0.0,
            window_len: 999,
            ..AutoVolumeConfig::default()
        });
        let cfg = av.config();
        assert_eq!(cfg.degree, 1.0);
        assert_eq!(cfg.window_len, 16, "window length is fixed at construction");
    }

    #[test]
    fn test_reset_forgets_the_held_maximum() {
        let mut av = AutoVolume::new(config(4));
        feed_constant(&mut av, 0.4, 4);
        assert!((av.current_level() - 0.4).abs() < 1e-6);

        av.reset();
        assert_eq!(av.current_gain(), 1.0);
        assert_eq!(av.current_level(), INVALID_LEVEL);

        // Quiet material after the reset must be able to reach full boost
        // again, which the pre-reset maximum would have blocked.
        feed_constant(&mut av, 0.04, 4);
        feed_constant(&mut av, 0.04, 1);
        assert_eq!(av.current_gain(), 5.0);
    }
}
