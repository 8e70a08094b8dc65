//! Uplink streaming: capture frames → VAD → resample/encode → remote session.
//!
//! Every captured frame is encoded and submitted in capture order, regardless
//! of what the local VAD thinks; the endpoint's own detector owns turn-taking.
//! Submission failures are reported to the session state machine, which
//! decides whether to close.

use crate::capture::AudioFrame;
use crate::levels::LevelMeters;
use crate::resample::EncodedChunk;
use crate::transport::{ServerEvent, SpeechTransport};
use crate::vad::EnergyVad;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Drains capture frames into the remote session.
pub struct Uplink {
    vad: EnergyVad,
    meters: Arc<LevelMeters>,
    transport: Arc<dyn SpeechTransport>,
    target_rate: u32,
    session_tx: mpsc::UnboundedSender<ServerEvent>,
}

impl Uplink {
    pub fn new(
        vad: EnergyVad,
        meters: Arc<LevelMeters>,
        transport: Arc<dyn SpeechTransport>,
        target_rate: u32,
        session_tx: mpsc::UnboundedSender<ServerEvent>,
    ) -> Self {
        Self {
            vad,
            meters,
            transport,
            target_rate,
            session_tx,
        }
    }

    /// Run until the capture channel closes or a submit fails. Each frame is
    /// processed synchronously: classify, publish the mic metric, encode,
    /// submit. The transport queues the actual network send.
    pub async fn run(self, mut frames_rx: mpsc::UnboundedReceiver<AudioFrame>) {
        while let Some(frame) = frames_rx.recv().await {
            let report = self.vad.process_frame(&frame.samples);
            self.meters.set_mic(&report);

            // Advisory only: silent frames still go up.
            let chunk =
                EncodedChunk::from_frame(&frame.samples, frame.sample_rate, self.target_rate);

            if let Err(e) = self.transport.submit_chunk(&chunk) {
                warn!("uplink submit failed: {}", e);
                let _ = self
                    .session_tx
                    .send(ServerEvent::Error(format!("uplink submit failed: {}", e)));
                break;
            }
        }
        debug!("uplink drained");
    }
}
