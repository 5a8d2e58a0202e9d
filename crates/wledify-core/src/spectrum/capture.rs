//! Microphone capture
//!
//! [`AudioInput`] acquires the device; the returned [`AudioTap`] feeds an
//! analyser and must be disconnected and stopped on every exit path. The
//! production implementation uses cpal's default input device.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use parking_lot::Mutex;

use super::analysis::{FrequencyAnalyser, SampleRing};
use crate::error::MediaAccessError;

/// Source of microphone taps
pub trait AudioInput {
    /// Acquire the input and start capturing, analysing into `bins` bins
    fn open(&self, bins: usize) -> Result<Box<dyn AudioTap>, MediaAccessError>;
}

/// A live capture connected to an analyser
pub trait AudioTap {
    /// Fill `out` with the current byte magnitudes, one per bin
    fn read_frequency_data(&mut self, out: &mut [u8]);

    /// Detach the analyser from the source; later reads see silence
    fn disconnect(&mut self);

    /// Release the hardware stream
    fn stop(&mut self);
}

/// Default input device via cpal
#[derive(Debug, Default, Clone, Copy)]
pub struct CpalInput;

impl CpalInput {
    pub fn new() -> Self {
        Self
    }
}

fn stream_error(message: String) -> MediaAccessError {
    let lower = message.to_lowercase();
    if lower.contains("permission") || lower.contains("denied") || lower.contains("not authorized")
    {
        MediaAccessError::PermissionDenied(message)
    } else {
        MediaAccessError::StreamFailed(message)
    }
}

fn build_stream<T, F>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    ring: Arc<Mutex<SampleRing>>,
    connected: Arc<AtomicBool>,
    convert: F,
) -> Result<cpal::Stream, cpal::BuildStreamError>
where
    T: cpal::SizedSample,
    F: Fn(T) -> f32 + Send + 'static,
{
    let channels = usize::from(config.channels.max(1));
    let mut scratch: Vec<f32> = Vec::new();
    device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            if !connected.load(Ordering::Relaxed) {
                return;
            }
            scratch.clear();
            scratch.extend(data.iter().map(|&s| convert(s)));
            ring.lock().push_interleaved(&scratch, channels);
        },
        |err| tracing::warn!("Audio stream error: {}", err),
        None,
    )
}

impl AudioInput for CpalInput {
    fn open(&self, bins: usize) -> Result<Box<dyn AudioTap>, MediaAccessError> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or(MediaAccessError::NoInputDevice)?;
        let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());

        let supported = device.default_input_config().map_err(|e| match e {
            cpal::DefaultStreamConfigError::DeviceNotAvailable => MediaAccessError::NoInputDevice,
            other => stream_error(other.to_string()),
        })?;
        let sample_format = supported.sample_format();
        let config = supported.config();
        tracing::info!(
            device = %device_name,
            sample_rate = config.sample_rate.0,
            channels = config.channels,
            "Opening microphone"
        );

        let analyser = FrequencyAnalyser::new(bins);
        let ring = Arc::new(Mutex::new(SampleRing::new(analyser.fft_size())));
        let connected = Arc::new(AtomicBool::new(true));

        let stream = match sample_format {
            cpal::SampleFormat::F32 => {
                build_stream::<f32, _>(&device, &config, ring.clone(), connected.clone(), |s| s)
            }
            cpal::SampleFormat::I16 => build_stream::<i16, _>(
                &device,
                &config,
                ring.clone(),
                connected.clone(),
                |s| f32::from(s) / 32768.0,
            ),
            cpal::SampleFormat::U16 => build_stream::<u16, _>(
                &device,
                &config,
                ring.clone(),
                connected.clone(),
                |s| (f32::from(s) - 32768.0) / 32768.0,
            ),
            other => return Err(MediaAccessError::UnsupportedFormat(format!("{:?}", other))),
        }
        .map_err(|e| match e {
            cpal::BuildStreamError::DeviceNotAvailable => MediaAccessError::NoInputDevice,
            other => stream_error(other.to_string()),
        })?;

        stream
            .play()
            .map_err(|e| stream_error(format!("failed to start capture: {}", e)))?;

        Ok(Box::new(CpalTap {
            stream: Some(stream),
            samples: vec![0.0; analyser.fft_size()],
            analyser,
            ring,
            connected,
        }))
    }
}

struct CpalTap {
    stream: Option<cpal::Stream>,
    analyser: FrequencyAnalyser,
    ring: Arc<Mutex<SampleRing>>,
    connected: Arc<AtomicBool>,
    samples: Vec<f32>,
}

impl AudioTap for CpalTap {
    fn read_frequency_data(&mut self, out: &mut [u8]) {
        self.ring.lock().copy_latest(&mut self.samples);
        self.analyser.process(&self.samples, out);
    }

    fn disconnect(&mut self) {
        self.connected.store(false, Ordering::Relaxed);
        self.ring.lock().clear();
        self.analyser.reset();
    }

    fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            if let Err(e) = stream.pause() {
                tracing::debug!("Failed to pause audio stream: {}", e);
            }
            drop(stream);
            tracing::info!("Microphone released");
        }
    }
}

impl Drop for CpalTap {
    fn drop(&mut self) {
        self.disconnect();
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_errors_are_classified() {
        assert!(matches!(
            stream_error("Access denied by the system".to_string()),
            MediaAccessError::PermissionDenied(_)
        ));
        assert!(matches!(
            stream_error("buffer underrun".to_string()),
            MediaAccessError::StreamFailed(_)
        ));
    }
}
