//! Smoothing window for loudness estimation.
//!
//! A fixed-capacity circular buffer of recent per-block power samples with
//! two read behaviors:
//! - while filling, reads blend the partial average with a caller-supplied
//!   fill level, so the first seconds of a stream lean on the configured
//!   target instead of a noisy short average;
//! - once full, reads ratchet a sticky maximum that never decreases until
//!   [`SmoothingWindow::reset`], keeping gain recovery conservative after
//!   the loudest passage seen so far.
//!
//! Capacity is fixed at construction and never reallocates. A zero-capacity
//! window degrades to a no-op whose reads return [`INVALID_LEVEL`], which
//! callers treat as "no estimate".

/// Sentinel returned by reads on a zero-capacity window.
pub const INVALID_LEVEL: f64 = -1.0;

/// Circular window of recent power samples with a sticky maximum.
#[derive(Clone, Debug)]
pub struct SmoothingWindow {
    data: Vec<f64>,
    used: usize,
    current: usize,
    held_max: f64,
}

impl SmoothingWindow {
    pub fn new(window_len: usize) -> Self {
        Self {
            data: vec![0.0; window_len],
            used: 0,
            current: 0,
            held_max: 0.0,
        }
    }

    /// Append one sample, overwriting the oldest once the window is full.
    pub fn push(&mut self, sample: f64) {
        if self.data.is_empty() {
            return;
        }
        self.data[self.current] = sample;
        self.current += 1;
        if self.current > self.used {
            self.used = self.current;
        }
        if self.current >= self.data.len() {
            self.current = 0;
        }
    }

    /// Current smoothed estimate.
    ///
    /// `fill_level` stands in for the missing history while the window is
    /// still filling. Once the window has filled once, the result is the
    /// sticky maximum of the running average and never decreases.
    pub fn smoothed_max(&mut self, fill_level: f64) -> f64 {
        let size = self.data.len();
        if size == 0 {
            return INVALID_LEVEL;
        }
        if self.used == 0 {
            return fill_level;
        }

        let mut sum = 0.0;
        for &v in &self.data[..self.used] {
            sum += v;
        }
        let avg = sum / self.used as f64;

        if self.used < size {
            return (avg * self.used as f64 + fill_level * (size - self.used) as f64) / size as f64;
        }
        if self.held_max < avg {
            self.held_max = avg;
        }
        self.held_max
    }

    /// Forget all history, including the held maximum.
    pub fn reset(&mut self) {
        self.data.fill(0.0);
        self.used = 0;
        self.current = 0;
        self.held_max = 0.0;
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn used(&self) -> usize {
        self.used
    }

    pub fn is_full(&self) -> bool {
        !self.data.is_empty() && self.used == self.data.len()
    }
}

// ============================================================================
// TESTS
// ============================================================================
