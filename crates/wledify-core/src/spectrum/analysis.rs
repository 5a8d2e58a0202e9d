//! Frequency analysis
//!
//! Produces byte magnitudes the way a browser `AnalyserNode` does for
//! `getByteFrequencyData`: Blackman window, FFT of `2 * bins` samples,
//! magnitude scaled by `1/N`, exponential smoothing over time, then a linear
//! map of `[min_db, max_db]` onto `0..=255`.

use std::collections::VecDeque;
use std::f32::consts::PI;
use std::sync::Arc;

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

use crate::constants::spectrum::{MAX_DECIBELS, MIN_DECIBELS, SMOOTHING_TIME_CONSTANT};

/// Fixed-capacity window of the most recent mono samples
#[derive(Debug, Clone)]
pub struct SampleRing {
    samples: VecDeque<f32>,
    capacity: usize,
}

impl SampleRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, sample: f32) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    /// Push interleaved frames, averaging channels down to mono
    pub fn push_interleaved(&mut self, data: &[f32], channels: usize) {
        let channels = channels.max(1);
        for frame in data.chunks(channels) {
            let sum: f32 = frame.iter().sum();
            self.push(sum / frame.len() as f32);
        }
    }

    /// Copy the newest samples into `out`, zero-filling the front if short
    pub fn copy_latest(&self, out: &mut [f32]) {
        let available = self.samples.len().min(out.len());
        let pad = out.len() - available;
        out[..pad].fill(0.0);
        let start = self.samples.len() - available;
        for (dst, src) in out[pad..].iter_mut().zip(self.samples.range(start..)) {
            *dst = *src;
        }
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// `AnalyserNode`-compatible magnitude computation for a fixed bin count
pub struct FrequencyAnalyser {
    bins: usize,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    buffer: Vec<Complex<f32>>,
    smoothed: Vec<f32>,
    smoothing: f32,
    min_db: f32,
    max_db: f32,
}

impl FrequencyAnalyser {
    pub fn new(bins: usize) -> Self {
        let fft_size = bins * 2;
        let mut planner = FftPlanner::new();
        Self {
            bins,
            fft: planner.plan_fft_forward(fft_size),
            window: blackman_window(fft_size),
            buffer: vec![Complex::new(0.0, 0.0); fft_size],
            smoothed: vec![0.0; bins],
            smoothing: SMOOTHING_TIME_CONSTANT,
            min_db: MIN_DECIBELS,
            max_db: MAX_DECIBELS,
        }
    }

    pub fn bins(&self) -> usize {
        self.bins
    }

    /// Number of time-domain samples consumed per analysis
    pub fn fft_size(&self) -> usize {
        self.bins * 2
    }

    /// Analyse `samples` (exactly `fft_size` long) into `out` (`bins` long)
    pub fn process(&mut self, samples: &[f32], out: &mut [u8]) {
        let n = self.fft_size();
        for (i, slot) in self.buffer.iter_mut().enumerate() {
            let sample = samples.get(i).copied().unwrap_or(0.0);
            *slot = Complex::new(sample * self.window[i], 0.0);
        }
        self.fft.process(&mut self.buffer);

        let scale = 1.0 / n as f32;
        let range = self.max_db - self.min_db;
        for (k, out) in out.iter_mut().enumerate().take(self.bins) {
            let magnitude = self.buffer[k].norm() * scale;
            let value = self.smoothing * self.smoothed[k] + (1.0 - self.smoothing) * magnitude;
            self.smoothed[k] = if value.is_finite() { value } else { 0.0 };

            let db = 20.0 * self.smoothed[k].max(f32::MIN_POSITIVE).log10();
            let scaled = 255.0 * (db - self.min_db) / range;
            *out = scaled.clamp(0.0, 255.0) as u8;
        }
    }

    /// Forget smoothing history
    pub fn reset(&mut self) {
        self.smoothed.fill(0.0);
    }
}

fn blackman_window(n: usize) -> Vec<f32> {
    const A0: f32 = 0.42;
    const A1: f32 = 0.5;
    const A2: f32 = 0.08;
    (0..n)
        .map(|i| {
            let x = i as f32 / n as f32;
            A0 - A1 * (2.0 * PI * x).cos() + A2 * (4.0 * PI * x).cos()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(n: usize, cycles: f32, amplitude: f32) -> Vec<f32> {
        (0..n)
            .map(|i| amplitude * (2.0 * PI * cycles * i as f32 / n as f32).sin())
            .collect()
    }

    #[test]
    fn test_silence_maps_to_zero() {
        let mut analyser = FrequencyAnalyser::new(64);
        let mut out = vec![1u8; 64];
        analyser.process(&vec![0.0; 128], &mut out);
        assert!(out.iter().all(|&m| m == 0));
    }

    #[test]
    fn test_tone_peaks_in_its_bin() {
        let mut analyser = FrequencyAnalyser::new(128);
        // Quiet enough that neighbouring bins stay below saturation
        let samples = sine(256, 20.0, 0.085);
        let mut out = vec![0u8; 128];
        // Let smoothing settle
        for _ in 0..40 {
            analyser.process(&samples, &mut out);
        }
        let peak = out
            .iter()
            .enumerate()
            .max_by_key(|(_, m)| **m)
            .map(|(i, _)| i)
            .unwrap();
        assert_eq!(peak, 20);
        assert!(out[20] > 200, "peak magnitude {}", out[20]);
        assert!(out[100] < out[20]);
    }

    #[test]
    fn test_ring_keeps_latest_and_pads() {
        let mut ring = SampleRing::new(4);
        ring.push_interleaved(&[1.0, 3.0, 5.0, 7.0], 2);
        let mut out = [9.0; 4];
        ring.copy_latest(&mut out);
        assert_eq!(out, [0.0, 0.0, 2.0, 6.0]);

        for s in [1.0, 2.0, 3.0, 4.0, 5.0] {
            ring.push(s);
        }
        ring.copy_latest(&mut out);
        assert_eq!(out, [2.0, 3.0, 4.0, 5.0]);
        assert_eq!(ring.len(), 4);
    }
}
