//! Microphone capture using CPAL.
//!
//! Delivers fixed-size frames on an unbounded channel. The capture callback
//! only accumulates samples and sends; everything downstream (VAD, resampling,
//! uplink) runs off the audio thread.

use crate::config::CaptureConfig;
use crate::error::{MirrorError, MirrorResult};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Stream, StreamConfig};
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// A fixed-length frame of captured samples. Immutable once produced.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Samples in [-1.0, 1.0].
    pub samples: Vec<f32>,

    /// Rate the device actually captured at.
    pub sample_rate: u32,

    /// When the frame was completed.
    pub captured_at: Instant,
}

impl AudioFrame {
    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Microphone capture. Acquisition failures here are fatal to session start.
pub struct MicCapture {
    config: CaptureConfig,
    device: Device,
    stream_config: StreamConfig,
}

impl MicCapture {
    /// Acquire the default input device. Fails if no device is available or
    /// access is denied; the session moves straight to closed, no retry.
    pub fn new(config: CaptureConfig) -> MirrorResult<Self> {
        let device = cpal::default_host()
            .default_input_device()
            .ok_or_else(|| MirrorError::AudioDevice("no input device available".to_string()))?;

        info!(
            "🎤 mic acquired: {} ({}Hz, {} ch, {} samples/frame)",
            device.name().unwrap_or_else(|_| "unknown".to_string()),
            config.sample_rate,
            config.channels,
            config.frame_size
        );

        if config.echo_cancellation {
            // cpal has no portable AEC control; the request is honored where
            // the platform input path provides it (macOS voice processing,
            // PipeWire echo-cancel module).
            info!("echo cancellation requested from platform input path");
        }

        // Probing the default config surfaces permission errors early,
        // before the stream is built.
        device.default_input_config()?;

        let stream_config = StreamConfig {
            channels: config.channels,
            sample_rate: cpal::SampleRate(config.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        Ok(Self {
            config,
            device,
            stream_config,
        })
    }

    /// Start capturing. Frames are sent as soon as `frame_size` samples have
    /// accumulated (~128ms at the defaults). The returned handle keeps the
    /// stream alive; dropping it releases the microphone.
    pub fn start(self, frame_tx: mpsc::UnboundedSender<AudioFrame>) -> MirrorResult<CaptureHandle> {
        let frame_size = self.config.frame_size;
        let sample_rate = self.config.sample_rate;
        let mut pending = Vec::with_capacity(frame_size);

        let stream = self.device.build_input_stream(
            &self.stream_config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                for &sample in data {
                    pending.push(sample);
                    if pending.len() >= frame_size {
                        let frame = AudioFrame {
                            samples: std::mem::replace(
                                &mut pending,
                                Vec::with_capacity(frame_size),
                            ),
                            sample_rate,
                            captured_at: Instant::now(),
                        };
                        if frame_tx.send(frame).is_err() {
                            // Session is gone; the handle will be dropped shortly.
                            return;
                        }
                    }
                }
            },
            move |err| {
                warn!("capture stream error: {}", err);
            },
            None,
        )?;

        stream.play()?;
        info!("▶️ capture started");

        Ok(CaptureHandle { _stream: stream })
    }

    /// List available input devices (diagnostics).
    pub fn list_input_devices() -> MirrorResult<Vec<String>> {
        let host = cpal::default_host();
        let mut names = Vec::new();
        for device in host.input_devices()? {
            if let Ok(name) = device.name() {
                names.push(name);
            }
        }
        Ok(names)
    }
}

/// Keeps the capture stream alive. Dropping it releases the microphone.
pub struct CaptureHandle {
    _stream: Stream,
}
