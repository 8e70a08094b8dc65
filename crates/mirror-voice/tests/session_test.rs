//! Integration tests for the voice session pipeline.
//!
//! The deterministic tests drive a session through the public API with an
//! in-memory transport and driver. The hardware tests at the bottom need a
//! real microphone and speakers and are ignored by default.

use mirror_voice::{
    EncodedChunk, LevelMeters, ManualClock, MicCapture, MirrorError, MirrorResult, PacingPolicy,
    PlaybackConfig, PlaybackDriver, PlaybackScheduler, PlaybackUnit, ServerEvent, SessionConfig,
    SessionState, SpeechTransport, VoiceSession,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

struct RecordingTransport {
    closed: AtomicBool,
    sent: Mutex<Vec<EncodedChunk>>,
}

impl RecordingTransport {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            closed: AtomicBool::new(false),
            sent: Mutex::new(Vec::new()),
        })
    }
}

impl SpeechTransport for RecordingTransport {
    fn submit_chunk(&self, chunk: &EncodedChunk) -> MirrorResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(MirrorError::TransportClosed);
        }
        self.sent.lock().unwrap().push(chunk.clone());
        Ok(())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Driver that completes each unit immediately through the done channel.
struct InstantDriver {
    done_tx: mpsc::UnboundedSender<u64>,
    played: Mutex<Vec<u64>>,
    stopped: AtomicBool,
}

impl PlaybackDriver for InstantDriver {
    fn play(&self, unit: &PlaybackUnit) {
        self.played.lock().unwrap().push(unit.id);
        let _ = self.done_tx.send(unit.id);
    }

    fn stop_all(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}

fn pcm16_silence(sample_count: usize) -> Vec<u8> {
    vec![0u8; sample_count * 2]
}

fn build_session() -> (
    VoiceSession,
    Arc<RecordingTransport>,
    Arc<InstantDriver>,
    Arc<PlaybackScheduler>,
    mpsc::UnboundedSender<ServerEvent>,
) {
    let clock = ManualClock::new();
    let meters = Arc::new(LevelMeters::new());
    let scheduler = Arc::new(PlaybackScheduler::new(
        clock,
        PlaybackConfig {
            pacing: PacingPolicy::ResetToNow,
            ..Default::default()
        },
        meters.clone(),
    ));
    let transport = RecordingTransport::new();
    let (done_tx, done_rx) = mpsc::unbounded_channel();
    let driver = Arc::new(InstantDriver {
        done_tx,
        played: Mutex::new(Vec::new()),
        stopped: AtomicBool::new(false),
    });
    let (server_tx, server_rx) = mpsc::unbounded_channel();

    let session = VoiceSession::new(
        SessionConfig::default(),
        transport.clone(),
        scheduler.clone(),
        driver.clone(),
        meters,
        server_rx,
        done_rx,
    );
    (session, transport, driver, scheduler, server_tx)
}

#[tokio::test]
async fn full_turn_lifecycle_through_the_event_loop() {
    let (mut session, _transport, driver, scheduler, server_tx) = build_session();
    session.begin_connecting();

    let state_rx = session.subscribe_state();

    server_tx.send(ServerEvent::Opened).unwrap();
    server_tx
        .send(ServerEvent::Audio(pcm16_silence(2400)))
        .unwrap();
    server_tx
        .send(ServerEvent::Audio(pcm16_silence(2400)))
        .unwrap();
    server_tx.send(ServerEvent::TurnComplete).unwrap();
    server_tx.send(ServerEvent::Closed).unwrap();

    session.run().await;

    assert_eq!(*state_rx.borrow(), SessionState::Closed);
    assert_eq!(driver.played.lock().unwrap().len(), 2);
    // Completions delivered by the driver drained the queue.
    assert_eq!(scheduler.active_len(), 0);
}

#[tokio::test]
async fn barge_in_mid_turn_flushes_and_session_recovers() {
    let (mut session, _transport, driver, scheduler, server_tx) = build_session();
    session.begin_connecting();
    session.process(ServerEvent::Opened);

    session.process(ServerEvent::Audio(pcm16_silence(12000)));
    assert_eq!(session.state(), SessionState::Speaking);

    session.process(ServerEvent::Interrupted);
    assert_eq!(session.state(), SessionState::Interrupted);
    assert!(driver.stopped.load(Ordering::SeqCst));
    assert_eq!(scheduler.active_len(), 0);

    // The mirror resumes with fresh audio after the barge-in.
    session.process(ServerEvent::Audio(pcm16_silence(2400)));
    assert_eq!(session.state(), SessionState::Speaking);

    session.stop();
    assert_eq!(session.state(), SessionState::Closed);
}

#[tokio::test(start_paused = true)]
async fn silence_after_barge_in_returns_to_listening() {
    let (mut session, _transport, _driver, _scheduler, _server_tx) = build_session();
    session.begin_connecting();
    session.process(ServerEvent::Opened);
    session.process(ServerEvent::Audio(pcm16_silence(2400)));

    session.process(ServerEvent::Interrupted);
    tokio::time::sleep(Duration::from_millis(600)).await;
    session.drain_timers();

    assert_eq!(session.state(), SessionState::Listening);
}

#[tokio::test]
async fn closing_releases_transport() {
    let (mut session, transport, _driver, _scheduler, _server_tx) = build_session();
    session.begin_connecting();
    session.process(ServerEvent::Opened);

    session.stop();
    assert!(transport.closed.load(Ordering::SeqCst));

    // Uplink submits after close are rejected, not silently accepted.
    let chunk = EncodedChunk::from_pcm16(&[0i16; 160], 16000);
    assert!(transport.submit_chunk(&chunk).is_err());
}

// ---------------------------------------------------------------------------
// Hardware tests. These require real audio devices; run with
// `cargo test -- --ignored` on a machine with a microphone and speakers.
// ---------------------------------------------------------------------------

#[tokio::test]
#[ignore] // Requires a microphone
async fn mic_capture_produces_frames() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let mic = MicCapture::new(Default::default()).expect("no input device");
    let (tx, mut rx) = mpsc::unbounded_channel();
    let _handle = mic.start(tx).expect("capture failed to start");

    let frame = tokio::time::timeout(Duration::from_secs(3), rx.recv())
        .await
        .expect("no frame within 3s")
        .expect("capture channel closed");

    assert_eq!(frame.samples.len(), 2048);
    assert_eq!(frame.sample_rate, 16000);
}

#[tokio::test]
#[ignore] // Requires speakers and MIRROR_API_KEY
async fn live_session_connects_and_listens() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let _ = dotenvy::dotenv();

    let api_key = mirror_voice::api_key_from_env().expect("MIRROR_API_KEY not set");
    let mut session = VoiceSession::connect(Default::default(), &api_key)
        .await
        .expect("session failed to connect");

    let mut state_rx = session.subscribe_state();
    let result = tokio::time::timeout(Duration::from_secs(5), async {
        while *state_rx.borrow() != SessionState::Listening {
            if state_rx.changed().await.is_err() {
                panic!("state channel closed before listening");
            }
        }
    });

    tokio::select! {
        r = result => r.expect("did not reach listening within 5s"),
        _ = session.run() => panic!("session closed during handshake"),
    }

    session.stop();
    assert_eq!(session.state(), SessionState::Closed);
}
