//! Energy-based voice activity detection.
//!
//! Classifies each captured frame by mean absolute amplitude. The result feeds
//! the mic indicator only: the remote endpoint's own detector is authoritative
//! for turn-taking, and letting a local false negative mute the uplink would
//! break barge-in. Never use this to gate transmission.

use crate::config::VadConfig;

/// Per-frame VAD output: a classification plus a display level.
#[derive(Debug, Clone, Copy)]
pub struct VadReport {
    /// Whether the frame's energy exceeds the configured threshold.
    pub is_speech: bool,

    /// Mean absolute amplitude of the frame.
    pub mean_amplitude: f32,

    /// Gained amplitude clamped to [0, 1] for display.
    pub level: f32,
}

/// Energy classifier over capture frames.
#[derive(Debug, Clone)]
pub struct EnergyVad {
    config: VadConfig,
}

impl EnergyVad {
    pub fn new(config: VadConfig) -> Self {
        Self { config }
    }

    /// Classify one frame. Runs on the capture path, so it is a single pass
    /// with no allocation.
    pub fn process_frame(&self, samples: &[f32]) -> VadReport {
        if samples.is_empty() {
            return VadReport {
                is_speech: false,
                mean_amplitude: 0.0,
                level: 0.0,
            };
        }

        let sum: f32 = samples.iter().map(|s| s.abs()).sum();
        let mean = sum / samples.len() as f32;

        VadReport {
            is_speech: mean > self.config.threshold,
            mean_amplitude: mean,
            level: (mean * self.config.display_gain).min(1.0),
        }
    }
}
