// src/transport/element.rs

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// One independently clocked playback handle, one per track. Mirrors what a
/// media element exposes: its own position, paused flag and gain.
pub trait PlaybackElement: Send {
    /// `None` until the element knows its length.
    fn duration(&self) -> Option<f64>;

    fn current_time(&self) -> f64;

    fn set_current_time(&mut self, secs: f64);

    /// True when stopped by the caller or after reaching the end.
    fn is_paused(&self) -> bool;

    fn play(&mut self) -> Result<(), String>;

    fn pause(&mut self);

    fn set_volume(&mut self, volume: f32);

    fn set_pan(&mut self, pan: f32);

    /// Asynchronous load or decode failure reported since the last call.
    fn take_error(&mut self) -> Option<String> {
        None
    }
}

/// Monotonic seconds.
pub trait Clock: Send + Sync {
    fn now(&self) -> f64;
}

pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

/// Hand-advanced clock. Clones share the same time.
#[derive(Clone, Default)]
pub struct ManualClock {
    bits: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, secs: f64) {
        let now = self.now() + secs;
        self.bits.store(now.to_bits(), Ordering::Relaxed);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Relaxed))
    }
}

/// A playback element whose position is derived from a clock. Stands in for
/// [`OutputElement`](super::OutputElement) when no output device is open or a
/// track cannot be decoded.
pub struct ClockedElement {
    clock: Arc<dyn Clock>,
    duration: Option<f64>,
    position: f64,
    started_at: Option<f64>,
    volume: f32,
    pan: f32,
    play_failure: Option<String>,
    pending_error: Option<String>,
}

impl ClockedElement {
    pub fn new(clock: Arc<dyn Clock>, duration: f64) -> Self {
        Self {
            clock,
            duration: (duration.is_finite() && duration > 0.0).then_some(duration),
            position: 0.0,
            started_at: None,
            volume: 1.0,
            pan: 0.0,
            play_failure: None,
            pending_error: None,
        }
    }

    /// Every later `play` fails with `reason`.
    pub fn failing_play(mut self, reason: impl Into<String>) -> Self {
        self.play_failure = Some(reason.into());
        self
    }

    /// Reports a load failure on the next `take_error`.
    pub fn failing_load(mut self, reason: impl Into<String>) -> Self {
        self.pending_error = Some(reason.into());
        self
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn pan(&self) -> f32 {
        self.pan
    }

    fn raw_position(&self) -> f64 {
        match self.started_at {
            Some(start) => self.position + (self.clock.now() - start),
            None => self.position,
        }
    }

    fn ended(&self) -> bool {
        self.duration.is_some_and(|d| self.raw_position() >= d)
    }
}

impl PlaybackElement for ClockedElement {
    fn duration(&self) -> Option<f64> {
        self.duration
    }

    fn current_time(&self) -> f64 {
        let pos = self.raw_position();
        match self.duration {
            Some(d) => pos.min(d),
            None => pos,
        }
    }

    fn set_current_time(&mut self, secs: f64) {
        let secs = match self.duration {
            Some(d) => secs.clamp(0.0, d),
            None => secs.max(0.0),
        };
        self.position = secs;
        if self.started_at.is_some() {
            self.started_at = Some(self.clock.now());
        }
    }

    fn is_paused(&self) -> bool {
        self.started_at.is_none() || self.ended()
    }

    fn play(&mut self) -> Result<(), String> {
        if let Some(reason) = &self.play_failure {
            return Err(reason.clone());
        }
        if self.ended() {
            // Finished elements stay put until seeked.
            self.position = self.current_time();
            self.started_at = None;
            return Ok(());
        }
        if self.started_at.is_none() {
            self.started_at = Some(self.clock.now());
        }
        Ok(())
    }

    fn pause(&mut self) {
        self.position = self.current_time();
        self.started_at = None;
    }

    fn set_volume(&mut self, volume: f32) {
        self.volume = volume;
    }

    fn set_pan(&mut self, pan: f32) {
        self.pan = pan;
    }

    fn take_error(&mut self) -> Option<String> {
        self.pending_error.take()
    }
}
