// src/recorder/analyzer.rs

use rustfft::{Fft, FftPlanner, num_complex::Complex};
use std::collections::VecDeque;
use std::f32::consts::PI;
use std::sync::Arc;

const SMOOTHING_TIME_CONSTANT: f32 = 0.8;
const MIN_DECIBELS: f32 = -100.0;
const MAX_DECIBELS: f32 = -30.0;

/// Non-destructive read point on the live signal. Keeps the most recent
/// `fft_size` mono samples and exposes byte-scaled frequency magnitudes the
/// way a browser analyser node does (Blackman window, temporal smoothing,
/// decibel range mapped onto 0..=255).
pub struct AnalysisTap {
    fft_size: usize,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    history: VecDeque<f32>,
    smoothed: Vec<f32>,
    scratch: Vec<Complex<f32>>,
}

impl AnalysisTap {
    pub fn new(fft_size: usize) -> Self {
        let fft_size = fft_size.max(32).next_power_of_two();
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(fft_size);
        let window = (0..fft_size)
            .map(|i| {
                let x = i as f32 / fft_size as f32;
                0.42 - 0.5 * (2.0 * PI * x).cos() + 0.08 * (4.0 * PI * x).cos()
            })
            .collect();

        Self {
            fft_size,
            fft,
            window,
            history: VecDeque::from(vec![0.0; fft_size]),
            smoothed: vec![0.0; fft_size / 2],
            scratch: vec![Complex { re: 0.0, im: 0.0 }; fft_size],
        }
    }

    /// Mixes interleaved input down to mono and appends it.
    pub fn push(&mut self, interleaved: &[f32], channels: usize) {
        if channels == 0 {
            return;
        }
        for frame in interleaved.chunks_exact(channels) {
            let mono = frame.iter().sum::<f32>() / channels as f32;
            if self.history.len() == self.fft_size {
                self.history.pop_front();
            }
            self.history.push_back(mono);
        }
    }

    /// Forgets the signal so stale audio does not show after a gap.
    pub fn reset(&mut self) {
        self.history.iter_mut().for_each(|s| *s = 0.0);
        self.smoothed.iter_mut().for_each(|s| *s = 0.0);
    }

    pub fn byte_frequency_data(&mut self) -> Vec<u8> {
        for (i, (slot, &s)) in self.scratch.iter_mut().zip(self.history.iter()).enumerate() {
            *slot = Complex {
                re: s * self.window[i],
                im: 0.0,
            };
        }
        self.fft.process(&mut self.scratch);

        let scale = 1.0 / self.fft_size as f32;
        let range = MAX_DECIBELS - MIN_DECIBELS;
        self.smoothed
            .iter_mut()
            .zip(self.scratch.iter())
            .map(|(smoothed, bin)| {
                let magnitude = bin.norm() * scale;
                *smoothed = SMOOTHING_TIME_CONSTANT * *smoothed
                    + (1.0 - SMOOTHING_TIME_CONSTANT) * magnitude;
                let db = 20.0 * smoothed.max(1e-12).log10();
                let scaled = 255.0 * (db - MIN_DECIBELS) / range;
                scaled.clamp(0.0, 255.0) as u8
            })
            .collect()
    }
}

/// Mean bin magnitude over a fixed reference ceiling, clamped to [0, 1].
pub fn level_from_bins(bins: &[u8], reference_ceiling: f32) -> f32 {
    if bins.is_empty() || reference_ceiling <= 0.0 {
        return 0.0;
    }
    let mean = bins.iter().map(|&b| b as f32).sum::<f32>() / bins.len() as f32;
    (mean / reference_ceiling).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f32, amp: f32, sr: f32, n: usize) -> Vec<f32> {
        (0..n).map(|i| amp * (2.0 * PI * freq * i as f32 / sr).sin()).collect()
    }

    #[test]
    fn silence_reads_zero() {
        let mut tap = AnalysisTap::new(256);
        tap.push(&[0.0; 512], 1);
        let bins = tap.byte_frequency_data();
        assert_eq!(bins.len(), 128);
        assert_eq!(level_from_bins(&bins, 128.0), 0.0);
    }

    #[test]
    fn louder_input_reads_higher() {
        let mut quiet = AnalysisTap::new(256);
        let mut loud = AnalysisTap::new(256);
        quiet.push(&sine(1000.0, 0.01, 48_000.0, 256), 1);
        loud.push(&sine(1000.0, 0.9, 48_000.0, 256), 1);

        let mut q = 0.0;
        let mut l = 0.0;
        for _ in 0..10 {
            q = level_from_bins(&quiet.byte_frequency_data(), 128.0);
            l = level_from_bins(&loud.byte_frequency_data(), 128.0);
        }
        assert!(l > q, "loud {l} should exceed quiet {q}");
        assert!(l <= 1.0);
    }

    #[test]
    fn reset_drops_the_old_signal() {
        let mut tap = AnalysisTap::new(256);
        tap.push(&sine(1000.0, 0.9, 48_000.0, 256), 1);
        assert!(level_from_bins(&tap.byte_frequency_data(), 128.0) > 0.0);
        tap.reset();
        assert_eq!(level_from_bins(&tap.byte_frequency_data(), 128.0), 0.0);
    }

    #[test]
    fn level_is_clamped() {
        assert_eq!(level_from_bins(&[255; 16], 128.0), 1.0);
        assert_eq!(level_from_bins(&[64; 16], 128.0), 0.5);
        assert_eq!(level_from_bins(&[], 128.0), 0.0);
    }

    #[test]
    fn stereo_is_mixed_to_mono() {
        let mut tap = AnalysisTap::new(64);
        // Opposite-phase channels cancel out.
        let frames: Vec<f32> = (0..128).flat_map(|i| {
            let s = (i as f32 * 0.3).sin();
            [s, -s]
        }).collect();
        tap.push(&frames, 2);
        let bins = tap.byte_frequency_data();
        assert!(bins.iter().all(|&b| b == 0));
    }
}
