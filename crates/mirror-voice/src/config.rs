//! Tunable configuration for the voice pipeline.
//!
//! The VAD threshold and the display gains are presentation parameters, not
//! correctness-critical; they are named here so they can be adjusted without
//! touching the pipeline code.

use crate::error::{MirrorError, MirrorResult};
use std::time::Duration;

/// Sample rate the remote endpoint expects for uplink audio.
pub const UPLINK_SAMPLE_RATE: u32 = 16_000;

/// Sample rate of synthesized speech coming back from the endpoint.
pub const DOWNLINK_SAMPLE_RATE: u32 = 24_000;

/// Microphone capture configuration
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Requested capture sample rate in Hz (default: 16000)
    pub sample_rate: u32,

    /// Number of channels (default: 1 for mono)
    pub channels: u16,

    /// Frame size in samples (default: 2048 ≈ 128ms at 16kHz).
    /// Smaller frames lower latency but risk glitches on slow devices.
    pub frame_size: usize,

    /// Request echo cancellation from the device where supported.
    /// Essential for full duplex so the endpoint does not hear itself.
    pub echo_cancellation: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: UPLINK_SAMPLE_RATE,
            channels: 1,
            frame_size: 2048,
            echo_cancellation: true,
        }
    }
}

/// Energy VAD configuration. Advisory only: drives the mic indicator,
/// never gates transmission.
#[derive(Debug, Clone)]
pub struct VadConfig {
    /// Mean absolute amplitude above this counts as speech (default: 0.01,
    /// a low noise floor).
    pub threshold: f32,

    /// Visual gain applied to the mic level before clamping to 1.0 (default: 15).
    pub display_gain: f32,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            threshold: 0.01,
            display_gain: 15.0,
        }
    }
}

/// Policy for scheduling a unit that arrives after the virtual cursor has
/// fallen behind the output clock (a gap in the downlink).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacingPolicy {
    /// Play immediately and reset the cursor to "now". Prioritizes perceived
    /// responsiveness over strict pacing fidelity. This is the default and
    /// the behavior the product shipped with.
    ResetToNow,

    /// Keep the drifted cursor and let late audio queue behind it.
    CatchUp,
}

/// Playback scheduling configuration
#[derive(Debug, Clone)]
pub struct PlaybackConfig {
    /// Sample rate of decoded downlink audio (default: 24000)
    pub sample_rate: u32,

    /// Gap handling policy (default: ResetToNow)
    pub pacing: PacingPolicy,

    /// Stride used when estimating a unit's amplitude for display (default: 10)
    pub level_stride: usize,

    /// Visual gain applied to the playback level (default: 3).
    pub level_gain: f32,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            sample_rate: DOWNLINK_SAMPLE_RATE,
            pacing: PacingPolicy::ResetToNow,
            level_stride: 10,
            level_gain: 3.0,
        }
    }
}

/// Default persona instruction sent with the session setup.
const DEFAULT_SYSTEM_INSTRUCTION: &str = "Você é o \"Espelho Socrático\". \
Leve o usuário à autodescoberta através da reflexão profunda. \
Fale devagar, com pausas naturais entre as frases; o silêncio é permitido. \
Tom sereno, empático e acolhedor. Faça apenas UMA pergunta aberta por vez. \
Evite dar conselhos: apenas reflita o que o usuário disse. \
Se o usuário interromper, pare imediatamente. Idioma: Português Brasileiro.";

const DEFAULT_MODEL: &str = "models/gemini-2.5-flash-native-audio-preview-09-2025";

const DEFAULT_ENDPOINT: &str = "wss://generativelanguage.googleapis.com/ws/\
google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

/// Remote session configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// WebSocket endpoint of the realtime speech service.
    pub endpoint: String,

    /// Model served by the endpoint.
    pub model: String,

    /// Prebuilt voice name for synthesis (default: "Kore").
    pub voice_name: String,

    /// System instruction establishing the mirror persona.
    pub system_instruction: String,

    /// How long to stay in the interrupted state before returning to
    /// listening, absent further events (default: 500ms).
    pub interruption_grace: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: DEFAULT_MODEL.to_string(),
            voice_name: "Kore".to_string(),
            system_instruction: DEFAULT_SYSTEM_INSTRUCTION.to_string(),
            interruption_grace: Duration::from_millis(500),
        }
    }
}

/// Aggregate configuration for a full voice session.
#[derive(Debug, Clone, Default)]
pub struct MirrorConfig {
    pub capture: CaptureConfig,
    pub vad: VadConfig,
    pub playback: PlaybackConfig,
    pub session: SessionConfig,
}

/// Read the API key from the environment (`MIRROR_API_KEY` or `GEMINI_API_KEY`).
pub fn api_key_from_env() -> MirrorResult<String> {
    std::env::var("MIRROR_API_KEY")
        .or_else(|_| std::env::var("GEMINI_API_KEY"))
        .map_err(|_| MirrorError::Config("set MIRROR_API_KEY or GEMINI_API_KEY".to_string()))
}
