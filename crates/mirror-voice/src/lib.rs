//! # Mirror Voice — realtime reflective voice sessions
//!
//! Full-duplex voice pipeline for the "Socratic Mirror" experience: the user
//! speaks, the remote endpoint reflects, and either side can interrupt the
//! other at any moment.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                        Voice Session                           │
//! │  ┌────────────┐  ┌─────────────┐  ┌──────────────────────┐    │
//! │  │  Mic In    │→ │ Energy VAD  │→ │  Uplink (PCM16 16kHz │    │
//! │  │  (cpal)    │  │ (advisory)  │  │   base64 → WebSocket)│    │
//! │  └────────────┘  └─────────────┘  └──────────────────────┘    │
//! │        ↓                                     ↕                 │
//! │  ┌────────────┐  ┌─────────────┐  ┌──────────────────────┐    │
//! │  │ Audio Out  │← │  Playback   │← │  Downlink (24kHz     │    │
//! │  │  (rodio)   │  │  Scheduler  │  │   PCM16 events)      │    │
//! │  └────────────┘  └─────────────┘  └──────────────────────┘    │
//! │        ↑               ↑                     │                 │
//! │        └── flush ──────┴──── barge-in ───────┘                 │
//! └────────────────────────────────────────────────────────────────┘
//! ```

pub mod capture;
pub mod config;
pub mod error;
pub mod levels;
pub mod output;
pub mod playback;
pub mod resample;
pub mod session;
pub mod transport;
pub mod uplink;
pub mod vad;

pub use capture::{AudioFrame, CaptureHandle, MicCapture};
pub use config::{
    api_key_from_env, CaptureConfig, MirrorConfig, PacingPolicy, PlaybackConfig, SessionConfig,
    VadConfig, DOWNLINK_SAMPLE_RATE, UPLINK_SAMPLE_RATE,
};
pub use error::{MirrorError, MirrorResult};
pub use levels::{LevelMeters, MicLevel};
pub use output::{OutputHandle, PlaybackDriver, RodioDriver};
pub use playback::{ManualClock, MonotonicClock, OutputClock, PlaybackScheduler, PlaybackUnit};
pub use resample::{decode_pcm16_le, resample_to_pcm16, EncodedChunk};
pub use session::{SessionState, VoiceSession};
pub use transport::{LiveSpeechSession, ServerEvent, SpeechTransport};
pub use uplink::Uplink;
pub use vad::{EnergyVad, VadReport};
