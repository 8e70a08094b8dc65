//! Output device layer: plays scheduled units through rodio.
//!
//! The scheduler decides *when* a unit starts; this driver waits for that time
//! on the real clock, hands the buffer to the sink, and reports completion so
//! the scheduler can release the unit. `stop_all` cuts everything instantly
//! for interruptions.

use crate::error::{MirrorError, MirrorResult};
use crate::playback::{OutputClock, PlaybackUnit};
use rodio::buffer::SamplesBuffer;
use rodio::{OutputStream, Sink};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::info;

/// Device-side playback of scheduled units.
pub trait PlaybackDriver: Send + Sync {
    /// Begin playback of a unit at its scheduled start time.
    fn play(&self, unit: &PlaybackUnit);

    /// Stop every playing or pending unit immediately. Stopping a unit that
    /// already finished is a no-op.
    fn stop_all(&self);
}

/// Keeps the output device open. Dropping it closes the audio context.
pub struct OutputHandle {
    _stream: OutputStream,
}

/// rodio-backed driver. The sink plays appended buffers back-to-back, so
/// honoring each unit's start time reduces to waiting out the lead-in delay.
pub struct RodioDriver {
    sink: Arc<Sink>,
    clock: Arc<dyn OutputClock>,
    done_tx: mpsc::UnboundedSender<u64>,
    /// Bumped by `stop_all`; pending lead-in waits from an older generation
    /// abandon their unit instead of appending it after a flush.
    generation: Arc<AtomicU64>,
}

impl RodioDriver {
    /// Open the default output device. The returned handle must be kept alive
    /// for the lifetime of the session (it is not `Send`; keep it on the
    /// session's task, as with the capture handle).
    pub fn new(
        clock: Arc<dyn OutputClock>,
        done_tx: mpsc::UnboundedSender<u64>,
    ) -> MirrorResult<(Arc<Self>, OutputHandle)> {
        let (stream, stream_handle) = OutputStream::try_default()
            .map_err(|e| MirrorError::Playback(e.to_string()))?;
        let sink = Sink::try_new(&stream_handle)
            .map_err(|e| MirrorError::Playback(e.to_string()))?;
        info!("🔊 output device ready");

        let driver = Arc::new(Self {
            sink: Arc::new(sink),
            clock,
            done_tx,
            generation: Arc::new(AtomicU64::new(0)),
        });
        Ok((driver, OutputHandle { _stream: stream }))
    }

    pub fn is_playing(&self) -> bool {
        !self.sink.empty()
    }
}

impl PlaybackDriver for RodioDriver {
    fn play(&self, unit: &PlaybackUnit) {
        let delay = (unit.start - self.clock.now()).max(0.0);
        let sink = self.sink.clone();
        let done_tx = self.done_tx.clone();
        let generation = self.generation.clone();
        let born_in = generation.load(Ordering::SeqCst);
        let id = unit.id;
        let sample_rate = unit.sample_rate;
        let duration = unit.duration;
        let samples: Vec<f32> = unit.samples.as_ref().clone();

        tokio::spawn(async move {
            if delay > 0.0 {
                tokio::time::sleep(Duration::from_secs_f64(delay)).await;
            }
            if generation.load(Ordering::SeqCst) != born_in {
                // Flushed while waiting for its start time; never play it.
                return;
            }
            sink.append(SamplesBuffer::new(1, sample_rate, samples));
            tokio::time::sleep(Duration::from_secs_f64(duration)).await;
            // Receiver may be gone during teardown; that is fine.
            let _ = done_tx.send(id);
        });
    }

    fn stop_all(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.sink.stop();
        info!("⏹️ playback stopped");
    }
}
