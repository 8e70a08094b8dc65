//! Remote speech session transport.
//!
//! The endpoint is a full-duplex WebSocket: we push base64 PCM16 chunks up and
//! receive an asynchronous event stream back (connection open, synthesized
//! audio payloads, turn-complete, interruption, close, error). Events are
//! delivered over a channel feeding the session state machine rather than
//! nested callbacks.

use crate::config::SessionConfig;
use crate::error::{MirrorError, MirrorResult};
use crate::resample::EncodedChunk;
use base64::Engine as _;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use tracing::{debug, error, info, warn};

/// Events emitted by the remote session, in arrival order.
#[derive(Debug, Clone)]
pub enum ServerEvent {
    /// Transport handshake confirmed; the session is live.
    Opened,

    /// Decoded (de-base64'd) PCM16-LE bytes of synthesized speech.
    Audio(Vec<u8>),

    /// The model finished its turn.
    TurnComplete,

    /// The server detected the user barging in; flush playback now.
    Interrupted,

    /// The server closed the connection.
    Closed,

    /// Transport-level failure. Fatal to the current session.
    Error(String),
}

/// Uplink half of the remote session. Submission is fire-and-forget relative
/// to the capture callback: implementations must never block the caller on
/// network I/O.
pub trait SpeechTransport: Send + Sync {
    /// Queue a chunk for transmission. Chunks captured before the session is
    /// established may be dropped. Returns an error only when the session is
    /// already closed or the send queue is gone.
    fn submit_chunk(&self, chunk: &EncodedChunk) -> MirrorResult<()>;

    /// Close the session. Idempotent.
    fn close(&self);
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IncomingMessage {
    setup_complete: Option<serde_json::Value>,
    server_content: Option<ServerContent>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServerContent {
    #[serde(default)]
    interrupted: bool,
    #[serde(default)]
    turn_complete: bool,
    model_turn: Option<ModelTurn>,
}

#[derive(Debug, Deserialize)]
struct ModelTurn {
    #[serde(default)]
    parts: Vec<TurnPart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TurnPart {
    inline_data: Option<InlineBlob>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineBlob {
    mime_type: String,
    data: String,
}

/// Parse one server message into events. A malformed audio payload is dropped
/// here (logged, not fatal); the rest of the message still applies.
fn parse_incoming(text: &str) -> Vec<ServerEvent> {
    let msg: IncomingMessage = match serde_json::from_str(text) {
        Ok(m) => m,
        Err(e) => {
            warn!("unparseable server message dropped: {}", e);
            return Vec::new();
        }
    };

    let mut events = Vec::new();

    if msg.setup_complete.is_some() {
        events.push(ServerEvent::Opened);
        return events;
    }

    let content = match msg.server_content {
        Some(c) => c,
        None => return events,
    };

    // Barge-in preempts everything else in the message.
    if content.interrupted {
        events.push(ServerEvent::Interrupted);
        return events;
    }

    if content.turn_complete {
        events.push(ServerEvent::TurnComplete);
    }

    if let Some(turn) = content.model_turn {
        for part in turn.parts {
            let blob = match part.inline_data {
                Some(b) => b,
                None => continue,
            };
            if !blob.mime_type.starts_with("audio/pcm") {
                continue;
            }
            match base64::engine::general_purpose::STANDARD.decode(&blob.data) {
                Ok(bytes) => events.push(ServerEvent::Audio(bytes)),
                Err(e) => warn!("audio payload with bad base64 dropped: {}", e),
            }
        }
    }

    events
}

/// Live WebSocket session against the realtime speech endpoint.
pub struct LiveSpeechSession {
    outgoing_tx: mpsc::UnboundedSender<Message>,
    opened: Arc<AtomicBool>,
    closed: AtomicBool,
}

impl LiveSpeechSession {
    /// Open the WebSocket, send the setup message, and spawn the reader and
    /// writer tasks. This is the only awaited suspension point of session
    /// establishment besides mic acquisition.
    pub async fn connect(
        config: &SessionConfig,
        api_key: &str,
        events: mpsc::UnboundedSender<ServerEvent>,
    ) -> MirrorResult<Arc<Self>> {
        let url = format!("{}?key={}", config.endpoint, api_key);
        let (ws, _) = connect_async(&url)
            .await
            .map_err(|e| MirrorError::Transport(format!("connect failed: {}", e)))?;
        info!("transport connected to {}", config.endpoint);

        let (mut write, mut read) = ws.split();

        let setup = json!({
            "setup": {
                "model": config.model,
                "generationConfig": {
                    "responseModalities": ["AUDIO"],
                    "speechConfig": {
                        "voiceConfig": {
                            "prebuiltVoiceConfig": { "voiceName": config.voice_name }
                        }
                    }
                },
                "systemInstruction": {
                    "parts": [ { "text": config.system_instruction } ]
                }
            }
        });
        write
            .send(Message::Text(setup.to_string()))
            .await
            .map_err(|e| MirrorError::Transport(format!("setup send failed: {}", e)))?;

        let (outgoing_tx, mut outgoing_rx) = mpsc::unbounded_channel::<Message>();
        let opened = Arc::new(AtomicBool::new(false));

        // Writer: drains the outgoing queue so submit_chunk never blocks.
        let writer_events = events.clone();
        tokio::spawn(async move {
            while let Some(msg) = outgoing_rx.recv().await {
                if let Err(e) = write.send(msg).await {
                    let _ = writer_events.send(ServerEvent::Error(format!("send failed: {}", e)));
                    return;
                }
            }
            let _ = write.close().await;
        });

        // Reader: translates wire messages into ServerEvents.
        let reader_events = events;
        let reader_opened = opened.clone();
        tokio::spawn(async move {
            while let Some(msg) = read.next().await {
                match msg {
                    Ok(Message::Text(text)) => {
                        for event in parse_incoming(&text) {
                            if matches!(event, ServerEvent::Opened) {
                                reader_opened.store(true, Ordering::SeqCst);
                            }
                            if reader_events.send(event).is_err() {
                                return;
                            }
                        }
                    }
                    Ok(Message::Binary(bytes)) => {
                        // The endpoint also frames JSON as binary.
                        if let Ok(text) = String::from_utf8(bytes) {
                            for event in parse_incoming(&text) {
                                if matches!(event, ServerEvent::Opened) {
                                    reader_opened.store(true, Ordering::SeqCst);
                                }
                                if reader_events.send(event).is_err() {
                                    return;
                                }
                            }
                        }
                    }
                    Ok(Message::Close(_)) => {
                        let _ = reader_events.send(ServerEvent::Closed);
                        return;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        error!("transport read error: {}", e);
                        let _ = reader_events.send(ServerEvent::Error(e.to_string()));
                        return;
                    }
                }
            }
            let _ = reader_events.send(ServerEvent::Closed);
        });

        Ok(Arc::new(Self {
            outgoing_tx,
            opened,
            closed: AtomicBool::new(false),
        }))
    }
}

impl SpeechTransport for LiveSpeechSession {
    fn submit_chunk(&self, chunk: &EncodedChunk) -> MirrorResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(MirrorError::TransportClosed);
        }
        if !self.opened.load(Ordering::SeqCst) {
            // No buffering-for-later: frames captured before the handshake
            // completes are dropped.
            debug!("dropping {}-byte chunk, session not yet open", chunk.data.len());
            return Ok(());
        }

        let msg = json!({
            "realtimeInput": {
                "mediaChunks": [
                    { "mimeType": chunk.mime_type, "data": chunk.to_base64() }
                ]
            }
        });
        self.outgoing_tx
            .send(Message::Text(msg.to_string()))
            .map_err(|e| MirrorError::ChannelSend(e.to_string()))
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.outgoing_tx.send(Message::Close(None));
        info!("transport close requested");
    }
}
