//! Display-facing volume metrics.
//!
//! Two independent signals: local mic energy and remote playback energy.
//! Published through `tokio::sync::watch` so UI readers always see the latest
//! value without ever blocking the audio path. These carry no correctness
//! obligation.

use crate::vad::VadReport;
use tokio::sync::watch;

/// Latest mic-side reading: display level plus the advisory VAD flag.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MicLevel {
    pub level: f32,
    pub speaking: bool,
}

/// Publisher for both volume metrics. One per session.
pub struct LevelMeters {
    mic_tx: watch::Sender<MicLevel>,
    playback_tx: watch::Sender<f32>,
}

impl LevelMeters {
    pub fn new() -> Self {
        let (mic_tx, _) = watch::channel(MicLevel::default());
        let (playback_tx, _) = watch::channel(0.0);
        Self { mic_tx, playback_tx }
    }

    /// Update the mic metric from a VAD report. Called once per capture frame.
    pub fn set_mic(&self, report: &VadReport) {
        let _ = self.mic_tx.send(MicLevel {
            level: report.level,
            speaking: report.is_speech,
        });
    }

    /// Update the playback metric. Called once per scheduled unit.
    pub fn set_playback(&self, level: f32) {
        let _ = self.playback_tx.send(level.min(1.0));
    }

    /// Zero the playback metric (queue emptied or interruption).
    pub fn zero_playback(&self) {
        let _ = self.playback_tx.send(0.0);
    }

    /// Zero everything (session teardown).
    pub fn zero_all(&self) {
        let _ = self.mic_tx.send(MicLevel::default());
        let _ = self.playback_tx.send(0.0);
    }

    pub fn subscribe_mic(&self) -> watch::Receiver<MicLevel> {
        self.mic_tx.subscribe()
    }

    pub fn subscribe_playback(&self) -> watch::Receiver<f32> {
        self.playback_tx.subscribe()
    }
}

impl Default for LevelMeters {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publishes_latest_mic_reading() {
        let meters = LevelMeters::new();
        let rx = meters.subscribe_mic();

        meters.set_mic(&VadReport {
            is_speech: true,
            mean_amplitude: 0.05,
            level: 0.75,
        });

        let latest = *rx.borrow();
        assert!(latest.speaking);
        assert!((latest.level - 0.75).abs() < 1e-6);
    }

    #[test]
    fn zero_all_resets_both_signals() {
        let meters = LevelMeters::new();
        let mic_rx = meters.subscribe_mic();
        let playback_rx = meters.subscribe_playback();

        meters.set_playback(0.9);
        meters.set_mic(&VadReport {
            is_speech: true,
            mean_amplitude: 0.1,
            level: 1.0,
        });
        meters.zero_all();

        assert_eq!(*mic_rx.borrow(), MicLevel::default());
        assert_eq!(*playback_rx.borrow(), 0.0);
    }

    #[test]
    fn playback_level_clamped_to_one() {
        let meters = LevelMeters::new();
        let rx = meters.subscribe_playback();
        meters.set_playback(2.4);
        assert_eq!(*rx.borrow(), 1.0);
    }
}
