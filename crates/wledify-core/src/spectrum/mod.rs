//! Microphone spectrum analysis
//!
//! `Stopped -> Starting -> Running -> Stopped`, with `Starting -> Stopped`
//! when the microphone cannot be acquired.
//!
//! The analyzer does not own a timer. The display calls [`SpectrumAnalyzer::tick`]
//! once per paint; a stopped analyzer answers `None`, which is the loop's
//! stop signal. [`SpectrumAnalyzer::stop`] releases the tap on every path,
//! including drop.

mod analysis;
mod canvas;
mod capture;
mod lighting;

pub use analysis::{FrequencyAnalyser, SampleRing};
pub use canvas::{bar_color, Bar, SpectrumCanvas};
pub use capture::{AudioInput, AudioTap, CpalInput};
pub use lighting::{
    bass_intensity, led_levels, percent_to_grey, reactive_command, ReactiveThrottle,
};

use crate::error::MediaAccessError;

/// Analyzer lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalyzerState {
    Stopped,
    Starting,
    Running,
}

/// Byte magnitudes for one tick, one per bin
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpectrumFrame {
    magnitudes: Vec<u8>,
}

impl SpectrumFrame {
    pub fn new(magnitudes: Vec<u8>) -> Self {
        Self { magnitudes }
    }

    pub fn magnitudes(&self) -> &[u8] {
        &self.magnitudes
    }

    pub fn len(&self) -> usize {
        self.magnitudes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.magnitudes.is_empty()
    }

    /// Average of the lowest eighth of the bins
    pub fn bass(&self) -> u8 {
        bass_intensity(&self.magnitudes)
    }

    /// Per-LED intensities in percent
    pub fn led_levels(&self, led_count: usize) -> Vec<u8> {
        led_levels(&self.magnitudes, led_count)
    }
}

pub struct SpectrumAnalyzer {
    input: Box<dyn AudioInput>,
    bins: usize,
    state: AnalyzerState,
    tap: Option<Box<dyn AudioTap>>,
    canvas: SpectrumCanvas,
    buffer: Vec<u8>,
}

impl SpectrumAnalyzer {
    /// `bins` must be a power of two; config normalization guarantees it
    pub fn new(input: Box<dyn AudioInput>, bins: usize) -> Self {
        Self {
            input,
            bins,
            state: AnalyzerState::Stopped,
            tap: None,
            canvas: SpectrumCanvas::new(0, 0),
            buffer: vec![0; bins],
        }
    }

    pub fn state(&self) -> AnalyzerState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == AnalyzerState::Running
    }

    pub fn bins(&self) -> usize {
        self.bins
    }

    pub fn canvas(&self) -> &SpectrumCanvas {
        &self.canvas
    }

    pub fn resize_canvas(&mut self, width: u16, height: u16) {
        self.canvas.resize(width, height);
    }

    /// Acquire the microphone. A no-op while already running.
    pub fn start(&mut self) -> Result<(), MediaAccessError> {
        if self.state == AnalyzerState::Running {
            return Ok(());
        }

        self.state = AnalyzerState::Starting;
        match self.input.open(self.bins) {
            Ok(tap) => {
                self.tap = Some(tap);
                self.state = AnalyzerState::Running;
                tracing::info!(bins = self.bins, "Spectrum analysis started");
                Ok(())
            }
            Err(e) => {
                tracing::warn!("Could not access microphone: {}", e);
                self.state = AnalyzerState::Stopped;
                Err(e)
            }
        }
    }

    /// Start if stopped, stop if running. Returns whether it is now running.
    pub fn toggle(&mut self) -> Result<bool, MediaAccessError> {
        if self.is_running() {
            self.stop();
            Ok(false)
        } else {
            self.start()?;
            Ok(true)
        }
    }

    /// Read and render one frame. `None` once stopped.
    pub fn tick(&mut self) -> Option<SpectrumFrame> {
        if self.state != AnalyzerState::Running {
            return None;
        }
        let tap = self.tap.as_mut()?;
        tap.read_frequency_data(&mut self.buffer);
        self.canvas.render(&self.buffer);
        Some(SpectrumFrame::new(self.buffer.clone()))
    }

    /// Stop the loop, disconnect the tap, release the stream and blank the canvas
    pub fn stop(&mut self) {
        let was_running = self.state != AnalyzerState::Stopped;
        self.state = AnalyzerState::Stopped;
        if let Some(mut tap) = self.tap.take() {
            tap.disconnect();
            tap.stop();
        }
        self.canvas.clear();
        self.buffer.fill(0);
        if was_running {
            tracing::info!("Spectrum analysis stopped");
        }
    }
}

impl Drop for SpectrumAnalyzer {
    fn drop(&mut self) {
        self.stop();
    }
}
