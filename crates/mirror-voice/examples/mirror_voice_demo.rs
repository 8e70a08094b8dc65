//! Mirror Voice Demo — live reflective session against the realtime endpoint.
//!
//! Requires a microphone, speakers, and `MIRROR_API_KEY` (or `GEMINI_API_KEY`)
//! in the environment or `.env`. Speak; the mirror reflects; interrupt it
//! whenever you like. Press Ctrl+C to stop.

use mirror_voice::{api_key_from_env, MirrorConfig, SessionState, VoiceSession};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = dotenvy::dotenv();
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Mirror Voice Demo — full-duplex reflective session");
    info!("Speak naturally; barge in to interrupt the mirror mid-sentence.");
    info!("Press Ctrl+C to stop.\n");

    let api_key = api_key_from_env()?;
    let config = MirrorConfig::default();

    let mut session = VoiceSession::connect(config, &api_key).await?;
    let mut state_rx = session.subscribe_state();

    tokio::spawn(async move {
        while state_rx.changed().await.is_ok() {
            let state = *state_rx.borrow();
            info!("session: {}", match state {
                SessionState::Listening => "👂 listening",
                SessionState::Speaking => "💬 speaking",
                SessionState::Interrupted => "🖐️ interrupted",
                other => other.as_str(),
            });
        }
    });

    tokio::select! {
        _ = session.run() => info!("session ended"),
        _ = tokio::signal::ctrl_c() => info!("stopping"),
    }
    session.stop();

    Ok(())
}
