//! Gapless playback scheduling on a virtual timeline.
//!
//! Decoded downlink audio arrives in bursts that have no relation to real-time
//! pace. The scheduler keeps a virtual cursor `next_start` on the output clock:
//! each unit starts at `max(now, next_start)` and advances the cursor by its
//! duration, so bursts queue back-to-back and late arrivals restart at "now"
//! instead of chasing a drifted schedule (see `PacingPolicy`).
//!
//! The active set and the cursor are shared between scheduling and the
//! interruption path; a single mutex with O(1) hold time serializes them.

use crate::config::{PacingPolicy, PlaybackConfig};
use crate::levels::LevelMeters;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::debug;

/// Clock of the output device, in seconds. Monotonic.
pub trait OutputClock: Send + Sync {
    fn now(&self) -> f64;
}

/// Production clock backed by `Instant`.
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputClock for MonotonicClock {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

/// Manually advanced clock for tests and simulation.
pub struct ManualClock {
    now: Mutex<f64>,
}

impl ManualClock {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            now: Mutex::new(0.0),
        })
    }

    pub fn advance(&self, secs: f64) {
        *self.now.lock().unwrap() += secs;
    }

    pub fn set(&self, secs: f64) {
        *self.now.lock().unwrap() = secs;
    }
}

impl OutputClock for ManualClock {
    fn now(&self) -> f64 {
        *self.now.lock().unwrap()
    }
}

/// A decoded buffer with its scheduled start time. Owned by the scheduler
/// from creation until its completion notification.
#[derive(Debug, Clone)]
pub struct PlaybackUnit {
    pub id: u64,
    pub samples: Arc<Vec<f32>>,
    pub sample_rate: u32,
    /// Start time on the output clock, seconds.
    pub start: f64,
    /// Duration in seconds.
    pub duration: f64,
}

struct Inner {
    next_start: f64,
    active: Vec<PlaybackUnit>,
    next_id: u64,
}

/// Schedules decoded downlink audio for gapless, non-overlapping playback.
pub struct PlaybackScheduler {
    clock: Arc<dyn OutputClock>,
    config: PlaybackConfig,
    meters: Arc<LevelMeters>,
    inner: Mutex<Inner>,
}

impl PlaybackScheduler {
    pub fn new(
        clock: Arc<dyn OutputClock>,
        config: PlaybackConfig,
        meters: Arc<LevelMeters>,
    ) -> Self {
        Self {
            clock,
            config,
            meters,
            inner: Mutex::new(Inner {
                next_start: 0.0,
                active: Vec::new(),
                next_id: 0,
            }),
        }
    }

    /// Schedule a decoded buffer. Returns the unit with its assigned start
    /// time; the caller hands it to the playback driver.
    pub fn schedule(&self, samples: Vec<f32>) -> PlaybackUnit {
        let duration = samples.len() as f64 / self.config.sample_rate as f64;
        let level = estimate_level(&samples, self.config.level_stride, self.config.level_gain);

        let unit = {
            let mut inner = self.inner.lock().unwrap();
            let now = self.clock.now();
            let start = match self.config.pacing {
                PacingPolicy::ResetToNow => now.max(inner.next_start),
                PacingPolicy::CatchUp => inner.next_start,
            };
            let unit = PlaybackUnit {
                id: inner.next_id,
                samples: Arc::new(samples),
                sample_rate: self.config.sample_rate,
                start,
                duration,
            };
            inner.next_id += 1;
            inner.next_start = start + duration;
            inner.active.push(unit.clone());
            unit
        };

        self.meters.set_playback(level);
        debug!(
            "scheduled unit {} at {:.3}s ({:.3}s long, {} queued)",
            unit.id,
            unit.start,
            unit.duration,
            self.active_len()
        );
        unit
    }

    /// Completion notification from the driver. Removing a unit that was
    /// already flushed is a benign no-op, not an error.
    pub fn on_unit_ended(&self, id: u64) {
        let empty = {
            let mut inner = self.inner.lock().unwrap();
            inner.active.retain(|u| u.id != id);
            inner.active.is_empty()
        };
        if empty {
            // Queue drained naturally; the orb goes quiet.
            self.meters.zero_playback();
        }
    }

    /// Drop every scheduled-but-unplayed unit, reset the cursor to the current
    /// time, and zero the displayed playback level. Used on interruption and
    /// on session teardown; the driver stops the device side.
    pub fn flush(&self) -> Vec<PlaybackUnit> {
        let drained = {
            let mut inner = self.inner.lock().unwrap();
            inner.next_start = self.clock.now();
            std::mem::take(&mut inner.active)
        };
        self.meters.zero_playback();
        debug!("flushed {} playback units", drained.len());
        drained
    }

    pub fn active_len(&self) -> usize {
        self.inner.lock().unwrap().active.len()
    }

    /// Current virtual cursor (seconds on the output clock).
    pub fn next_start(&self) -> f64 {
        self.inner.lock().unwrap().next_start
    }
}

/// Downsampled mean-absolute amplitude for display. Walks every `stride`-th
/// sample only; this runs once per received unit, not per sample.
fn estimate_level(samples: &[f32], stride: usize, gain: f32) -> f32 {
    let stride = stride.max(1);
    let mut sum = 0.0f32;
    let mut count = 0usize;
    let mut i = 0;
    while i < samples.len() {
        sum += samples[i].abs();
        count += 1;
        i += stride;
    }
    if count == 0 {
        return 0.0;
    }
    (sum / count as f32) * gain
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PacingPolicy;

    fn scheduler_with_clock(pacing: PacingPolicy) -> (PlaybackScheduler, Arc<ManualClock>) {
        let clock = ManualClock::new();
        let config = PlaybackConfig {
            pacing,
            ..Default::default()
        };
        let scheduler = PlaybackScheduler::new(
            clock.clone(),
            config,
            Arc::new(LevelMeters::new()),
        );
        (scheduler, clock)
    }

    fn half_second_at_24k() -> Vec<f32> {
        vec![0.1f32; 12000]
    }

    #[test]
    fn simultaneous_units_play_back_to_back() {
        let (scheduler, _clock) = scheduler_with_clock(PacingPolicy::ResetToNow);

        let a = scheduler.schedule(half_second_at_24k());
        let b = scheduler.schedule(half_second_at_24k());
        let c = scheduler.schedule(half_second_at_24k());

        assert!((a.start - 0.0).abs() < 1e-9);
        assert!((b.start - 0.5).abs() < 1e-9);
        assert!((c.start - 1.0).abs() < 1e-9);
        assert!((scheduler.next_start() - 1.5).abs() < 1e-9);
    }

    #[test]
    fn starts_are_non_decreasing_and_never_overlap() {
        let (scheduler, clock) = scheduler_with_clock(PacingPolicy::ResetToNow);

        let mut units = Vec::new();
        for i in 0..8 {
            // Irregular arrival times, including late ones.
            clock.advance(if i % 3 == 0 { 0.7 } else { 0.05 });
            units.push(scheduler.schedule(vec![0.0f32; 2400 * (i + 1)]));
        }

        for pair in units.windows(2) {
            assert!(pair[1].start >= pair[0].start);
            assert!(pair[1].start >= pair[0].start + pair[0].duration - 1e-9);
        }
    }

    #[test]
    fn late_arrival_resets_cursor_to_now() {
        let (scheduler, clock) = scheduler_with_clock(PacingPolicy::ResetToNow);

        let first = scheduler.schedule(half_second_at_24k());
        assert!((first.start - 0.0).abs() < 1e-9);

        // The queue has long since drained when the next unit arrives.
        clock.set(3.0);
        let late = scheduler.schedule(half_second_at_24k());
        assert!((late.start - 3.0).abs() < 1e-9);
        assert!((scheduler.next_start() - 3.5).abs() < 1e-9);
    }

    #[test]
    fn catch_up_policy_keeps_the_drifted_cursor() {
        let (scheduler, clock) = scheduler_with_clock(PacingPolicy::CatchUp);

        scheduler.schedule(half_second_at_24k());
        clock.set(3.0);
        let late = scheduler.schedule(half_second_at_24k());
        assert!((late.start - 0.5).abs() < 1e-9);
    }

    #[test]
    fn flush_empties_active_set_and_resets_cursor_to_now() {
        let (scheduler, clock) = scheduler_with_clock(PacingPolicy::ResetToNow);
        let meters = Arc::new(LevelMeters::new());
        let scheduler = PlaybackScheduler::new(
            clock.clone(),
            PlaybackConfig::default(),
            meters.clone(),
        );
        let playback_rx = meters.subscribe_playback();

        scheduler.schedule(half_second_at_24k());
        scheduler.schedule(half_second_at_24k());
        assert_eq!(scheduler.active_len(), 2);

        clock.set(0.7);
        let drained = scheduler.flush();

        assert_eq!(drained.len(), 2);
        assert_eq!(scheduler.active_len(), 0);
        assert!((scheduler.next_start() - 0.7).abs() < 1e-9);
        assert_eq!(*playback_rx.borrow(), 0.0);

        // Next normal payload starts at "now".
        let next = scheduler.schedule(half_second_at_24k());
        assert!((next.start - 0.7).abs() < 1e-9);
    }

    #[test]
    fn ended_units_are_released_and_unknown_ids_are_no_ops() {
        let (scheduler, _clock) = scheduler_with_clock(PacingPolicy::ResetToNow);

        let a = scheduler.schedule(half_second_at_24k());
        let b = scheduler.schedule(half_second_at_24k());

        scheduler.on_unit_ended(a.id);
        assert_eq!(scheduler.active_len(), 1);

        // Already removed (or flushed): benign.
        scheduler.on_unit_ended(a.id);
        scheduler.on_unit_ended(9999);
        assert_eq!(scheduler.active_len(), 1);

        scheduler.on_unit_ended(b.id);
        assert_eq!(scheduler.active_len(), 0);
    }

    #[test]
    fn scheduling_publishes_a_playback_level() {
        let clock = ManualClock::new();
        let meters = Arc::new(LevelMeters::new());
        let scheduler =
            PlaybackScheduler::new(clock, PlaybackConfig::default(), meters.clone());
        let rx = meters.subscribe_playback();

        scheduler.schedule(vec![0.2f32; 2400]);
        assert!(*rx.borrow() > 0.0);
    }
}
