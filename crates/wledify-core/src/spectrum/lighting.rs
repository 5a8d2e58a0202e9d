//! Spectrum to lighting mapping
//!
//! Deterministic and deliberately simple: a bass scalar for whole-segment
//! brightness, or a per-LED sequence of averaged bin ranges.

use std::time::{Duration, Instant};

use crate::config::ReactiveMode;
use crate::wled::LightCommand;

/// Average magnitude over the lowest eighth of the bins, 0-255
pub fn bass_intensity(magnitudes: &[u8]) -> u8 {
    let count = magnitudes.len() / 8;
    if count == 0 {
        return 0;
    }
    let sum: u32 = magnitudes[..count].iter().map(|&m| u32::from(m)).sum();
    (sum as f32 / count as f32).round() as u8
}

/// `led_count` intensities in percent (0-100), each the mean of an equal
/// share of the bins. With fewer bins than LEDs, bins are repeated.
pub fn led_levels(magnitudes: &[u8], led_count: usize) -> Vec<u8> {
    let bins = magnitudes.len();
    if bins == 0 || led_count == 0 {
        return vec![0; led_count];
    }

    (0..led_count)
        .map(|led| {
            let start = led * bins / led_count;
            let end = ((led + 1) * bins / led_count).max(start + 1);
            let slice = &magnitudes[start..end];
            let sum: u32 = slice.iter().map(|&m| u32::from(m)).sum();
            (sum as f32 / slice.len() as f32 / 255.0 * 100.0).round() as u8
        })
        .collect()
}

/// Grey level (0-255) for a percent intensity
pub fn percent_to_grey(percent: u8) -> u8 {
    (f32::from(percent.min(100)) * 2.55).round() as u8
}

/// Command for one reactive tick
pub fn reactive_command(magnitudes: &[u8], mode: ReactiveMode, led_count: usize) -> LightCommand {
    match mode {
        ReactiveMode::Bass => LightCommand::segment_brightness(bass_intensity(magnitudes)),
        ReactiveMode::Leds => LightCommand::individual_leds(
            led_levels(magnitudes, led_count)
                .into_iter()
                .map(|p| {
                    let grey = percent_to_grey(p);
                    [grey, grey, grey]
                })
                .collect(),
        ),
    }
}

/// Allows at most one dispatch per interval
#[derive(Debug, Clone)]
pub struct ReactiveThrottle {
    min_interval: Duration,
    last: Option<Instant>,
}

impl ReactiveThrottle {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last: None,
        }
    }

    /// True (and records `now`) if a dispatch is allowed at `now`
    pub fn ready(&mut self, now: Instant) -> bool {
        match self.last {
            Some(last) if now.saturating_duration_since(last) < self.min_interval => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }

    pub fn reset(&mut self) {
        self.last = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bass_is_lowest_eighth_average() {
        let mut frame = vec![0u8; 128];
        for m in frame.iter_mut().take(16) {
            *m = 200;
        }
        frame[15] = 40;
        // (15 * 200 + 40) / 16 = 190
        assert_eq!(bass_intensity(&frame), 190);
        assert_eq!(bass_intensity(&[255; 7]), 0);
    }

    #[test]
    fn test_led_levels_match_even_split() {
        let frame: Vec<u8> = (0..128).map(|i| if i < 64 { 255 } else { 0 }).collect();
        let levels = led_levels(&frame, 16);
        assert_eq!(levels.len(), 16);
        assert!(levels[..8].iter().all(|&l| l == 100));
        assert!(levels[8..].iter().all(|&l| l == 0));
    }

    #[test]
    fn test_led_levels_with_more_leds_than_bins() {
        let levels = led_levels(&[255, 0], 4);
        assert_eq!(levels, vec![100, 100, 0, 0]);
    }

    #[test]
    fn test_reactive_commands() {
        let frame = vec![255u8; 16];
        assert_eq!(
            reactive_command(&frame, ReactiveMode::Bass, 4),
            LightCommand::segment_brightness(255)
        );
        assert_eq!(
            reactive_command(&frame, ReactiveMode::Leds, 2),
            LightCommand::individual_leds(vec![[255, 255, 255], [255, 255, 255]])
        );
    }

    #[test]
    fn test_throttle() {
        let mut throttle = ReactiveThrottle::new(Duration::from_millis(100));
        let t0 = Instant::now();
        assert!(throttle.ready(t0));
        assert!(!throttle.ready(t0 + Duration::from_millis(50)));
        assert!(throttle.ready(t0 + Duration::from_millis(100)));

        let mut unthrottled = ReactiveThrottle::new(Duration::ZERO);
        assert!(unthrottled.ready(t0));
        assert!(unthrottled.ready(t0));
    }
}
