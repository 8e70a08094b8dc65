//! Session lifecycle and the state machine tying the pipeline together.
//!
//! One session owns the whole full-duplex path: mic capture feeding the
//! uplink, the transport event stream, the playback scheduler and driver, and
//! the interruption controller. All transitions run on the session's task;
//! the transport, the driver, and the grace timer talk to it over channels.
//!
//! ```text
//! idle → connecting → listening ⇄ speaking
//!                        ↑            │ (server interruption)
//!                        └─ grace ── interrupted
//!                any state ──────────→ closed (terminal)
//! ```

use crate::capture::{CaptureHandle, MicCapture};
use crate::config::{MirrorConfig, SessionConfig, UPLINK_SAMPLE_RATE};
use crate::error::MirrorResult;
use crate::levels::LevelMeters;
use crate::output::{OutputHandle, PlaybackDriver, RodioDriver};
use crate::playback::{MonotonicClock, OutputClock, PlaybackScheduler};
use crate::resample::decode_pcm16_le;
use crate::transport::{LiveSpeechSession, ServerEvent, SpeechTransport};
use crate::uplink::Uplink;
use crate::vad::EnergyVad;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

/// Observable session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No session resources held.
    Idle,

    /// Acquiring the microphone and establishing the transport.
    Connecting,

    /// Session live, nothing queued for playback.
    Listening,

    /// Synthesized speech is playing or queued.
    Speaking,

    /// The user barged in; playback was flushed, awaiting the grace timer.
    Interrupted,

    /// Terminal. Resources released; the session cannot be restarted.
    Closed,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Connecting => "connecting",
            SessionState::Listening => "listening",
            SessionState::Speaking => "speaking",
            SessionState::Interrupted => "interrupted",
            SessionState::Closed => "closed",
        }
    }
}

/// A running voice session.
///
/// Holds the capture and output device handles, which are not `Send`; the
/// session therefore lives on the task that created it and is driven by
/// [`VoiceSession::run`].
pub struct VoiceSession {
    config: SessionConfig,
    state: SessionState,
    /// Bumped on every transition. A grace timer carries the epoch it was
    /// armed in; a revert whose epoch is stale is ignored.
    epoch: u64,
    transport: Arc<dyn SpeechTransport>,
    scheduler: Arc<PlaybackScheduler>,
    driver: Arc<dyn PlaybackDriver>,
    meters: Arc<LevelMeters>,
    capture: Option<CaptureHandle>,
    output: Option<OutputHandle>,
    server_rx: mpsc::UnboundedReceiver<ServerEvent>,
    done_rx: mpsc::UnboundedReceiver<u64>,
    grace_tx: mpsc::UnboundedSender<u64>,
    grace_rx: mpsc::UnboundedReceiver<u64>,
    state_tx: watch::Sender<SessionState>,
    resources_released: bool,
}

impl VoiceSession {
    pub fn new(
        config: SessionConfig,
        transport: Arc<dyn SpeechTransport>,
        scheduler: Arc<PlaybackScheduler>,
        driver: Arc<dyn PlaybackDriver>,
        meters: Arc<LevelMeters>,
        server_rx: mpsc::UnboundedReceiver<ServerEvent>,
        done_rx: mpsc::UnboundedReceiver<u64>,
    ) -> Self {
        let (grace_tx, grace_rx) = mpsc::unbounded_channel();
        let (state_tx, _) = watch::channel(SessionState::Idle);
        Self {
            config,
            state: SessionState::Idle,
            epoch: 0,
            transport,
            scheduler,
            driver,
            meters,
            capture: None,
            output: None,
            server_rx,
            done_rx,
            grace_tx,
            grace_rx,
            state_tx,
            resources_released: false,
        }
    }

    /// Establish a full session: acquire the microphone, open the output
    /// device, connect the transport, and spawn the uplink. Any failure here
    /// leaves nothing running; the caller surfaces the error and no session
    /// object exists.
    pub async fn connect(config: MirrorConfig, api_key: &str) -> MirrorResult<Self> {
        let meters = Arc::new(LevelMeters::new());
        let clock: Arc<dyn OutputClock> = Arc::new(MonotonicClock::new());
        let scheduler = Arc::new(PlaybackScheduler::new(
            clock.clone(),
            config.playback.clone(),
            meters.clone(),
        ));

        let (done_tx, done_rx) = mpsc::unbounded_channel();
        let (driver, output) = RodioDriver::new(clock, done_tx)?;

        // Mic first: a permission failure should not leave a half-open
        // transport behind.
        let mic = MicCapture::new(config.capture.clone())?;
        let (frame_tx, frame_rx) = mpsc::unbounded_channel();

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let transport =
            LiveSpeechSession::connect(&config.session, api_key, server_tx.clone()).await?;

        let uplink = Uplink::new(
            EnergyVad::new(config.vad.clone()),
            meters.clone(),
            transport.clone(),
            UPLINK_SAMPLE_RATE,
            server_tx,
        );
        tokio::spawn(uplink.run(frame_rx));

        let capture = mic.start(frame_tx)?;

        let mut session = Self::new(
            config.session,
            transport,
            scheduler,
            driver,
            meters,
            server_rx,
            done_rx,
        );
        session.capture = Some(capture);
        session.output = Some(output);
        session.begin_connecting();
        Ok(session)
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Watch channel reflecting every transition, for UIs.
    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    /// Mic and playback level meters for display.
    pub fn meters(&self) -> Arc<LevelMeters> {
        self.meters.clone()
    }

    /// idle → connecting. Resources are being acquired; audio events are not
    /// accepted yet.
    pub fn begin_connecting(&mut self) {
        if self.state == SessionState::Idle {
            self.set_state(SessionState::Connecting);
        }
    }

    /// Drive the session until it reaches the closed state.
    pub async fn run(&mut self) {
        while self.state != SessionState::Closed {
            tokio::select! {
                event = self.server_rx.recv() => match event {
                    Some(event) => self.process(event),
                    None => {
                        warn!("server event channel dropped");
                        self.teardown();
                    }
                },
                Some(id) = self.done_rx.recv() => {
                    self.scheduler.on_unit_ended(id);
                }
                Some(epoch) = self.grace_rx.recv() => {
                    self.grace_elapsed(epoch);
                }
            }
        }
        debug!("session loop finished");
    }

    /// Apply one server event. This is the state machine's transition
    /// function; `run` feeds it, tests may call it directly.
    pub fn process(&mut self, event: ServerEvent) {
        if self.state == SessionState::Closed {
            debug!("event after close ignored");
            return;
        }
        match event {
            ServerEvent::Opened => {
                if self.state == SessionState::Connecting {
                    info!("session open, listening");
                    self.set_state(SessionState::Listening);
                }
            }
            ServerEvent::Audio(bytes) => self.on_audio(&bytes),
            ServerEvent::TurnComplete => {
                if self.state == SessionState::Speaking {
                    self.set_state(SessionState::Listening);
                }
            }
            ServerEvent::Interrupted => self.on_interrupted(),
            ServerEvent::Closed => {
                info!("server closed the session");
                self.teardown();
            }
            ServerEvent::Error(msg) => {
                error!("session error: {}", msg);
                self.teardown();
            }
        }
    }

    fn on_audio(&mut self, bytes: &[u8]) {
        if matches!(self.state, SessionState::Idle | SessionState::Connecting) {
            debug!("audio before session open dropped");
            return;
        }
        let samples = match decode_pcm16_le(bytes) {
            Ok(s) => s,
            Err(e) => {
                // Malformed payload: drop it, keep the session alive.
                warn!("undecodable audio payload dropped: {}", e);
                return;
            }
        };
        let unit = self.scheduler.schedule(samples);
        self.driver.play(&unit);
        if self.state != SessionState::Speaking {
            self.set_state(SessionState::Speaking);
        }
    }

    /// Barge-in. Flushing the queue and stopping the device happen before the
    /// state change so no stale unit can slip in between.
    fn on_interrupted(&mut self) {
        if self.state == SessionState::Connecting {
            return;
        }
        info!("🖐️ barge-in: flushing playback");
        self.driver.stop_all();
        self.scheduler.flush();
        self.set_state(SessionState::Interrupted);

        let armed_in = self.epoch;
        let grace_tx = self.grace_tx.clone();
        let grace = self.config.interruption_grace;
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            let _ = grace_tx.send(armed_in);
        });
    }

    /// Grace timer fired. Reverts to listening only if no transition happened
    /// since the timer was armed.
    pub fn grace_elapsed(&mut self, armed_in: u64) {
        if self.state == SessionState::Interrupted && armed_in == self.epoch {
            self.set_state(SessionState::Listening);
        }
    }

    /// Drain any already-fired grace timers. `run` handles these itself; this
    /// is for callers driving the session manually.
    pub fn drain_timers(&mut self) {
        while let Ok(armed_in) = self.grace_rx.try_recv() {
            self.grace_elapsed(armed_in);
        }
    }

    /// User-initiated stop. Idempotent: calling on an already-closed session
    /// does nothing.
    pub fn stop(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        info!("⏹️ user stop");
        self.teardown();
    }

    fn set_state(&mut self, state: SessionState) {
        if self.state == state {
            return;
        }
        debug!("{} → {}", self.state.as_str(), state.as_str());
        self.state = state;
        self.epoch += 1;
        let _ = self.state_tx.send(state);
    }

    /// Release everything exactly once: microphone, playback, transport,
    /// meters. Reached from user stop, server close, and transport error.
    fn teardown(&mut self) {
        if !self.resources_released {
            self.resources_released = true;
            self.capture.take(); // releases the microphone
            self.driver.stop_all();
            self.scheduler.flush();
            self.output.take();
            self.transport.close();
            self.meters.zero_all();
        }
        self.set_state(SessionState::Closed);
    }
}

impl Drop for VoiceSession {
    fn drop(&mut self) {
        self.teardown();
    }
}
