// src/transport/mod.rs

pub mod element;
pub mod output;

pub use element::{Clock, ClockedElement, ManualClock, PlaybackElement, SystemClock};
pub use output::{AudioOutput, OutputElement, OutputMixer};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::TransportError;
use crate::project::{Track, TrackId};

/// Elements further than this from the logical playhead are re-seeked on
/// the next tick.
pub const DRIFT_TOLERANCE_SECS: f64 = 0.1;

/// Per-track mixer state, mirrored from the persisted track.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackMix {
    pub volume: f32,
    pub pan: f32,
    pub muted: bool,
    pub solo: bool,
}

impl Default for TrackMix {
    fn default() -> Self {
        Self {
            volume: 1.0,
            pan: 0.0,
            muted: false,
            solo: false,
        }
    }
}

impl From<&Track> for TrackMix {
    fn from(t: &Track) -> Self {
        Self {
            volume: t.volume,
            pan: t.pan,
            muted: t.is_muted,
            solo: t.is_solo,
        }
    }
}

struct TransportTrack {
    id: TrackId,
    element: Box<dyn PlaybackElement>,
    mix: TrackMix,
    /// Set once the element failed to load or play; the track then stays
    /// silent and is ignored for playhead detection.
    failure: Option<TransportError>,
}

/// What the transport bar renders after each tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportSnapshot {
    pub current_time: f64,
    pub duration: f64,
    pub is_playing: bool,
}

/// One logical playhead over many independently clocked elements.
///
/// Synchronisation is best effort: every [`tick`](Self::tick) reads the
/// position from the first element that is actually progressing and pulls
/// any element that drifted back in line.
pub struct MultiTrackTransport {
    tracks: Vec<TransportTrack>,
    master_volume: f32,
    current_time: f64,
    is_playing: bool,
}

impl Default for MultiTrackTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MultiTrackTransport {
    pub fn new() -> Self {
        Self {
            tracks: Vec::new(),
            master_volume: 1.0,
            current_time: 0.0,
            is_playing: false,
        }
    }

    pub fn add_track(&mut self, id: TrackId, element: Box<dyn PlaybackElement>, mix: TrackMix) {
        self.tracks.retain(|t| t.id != id);
        self.tracks.push(TransportTrack {
            id,
            element,
            mix,
            failure: None,
        });
        self.apply_gains();
    }

    pub fn remove_track(&mut self, id: TrackId) -> Result<(), TransportError> {
        let index = self.index_of(id)?;
        let mut track = self.tracks.remove(index);
        track.element.pause();
        Ok(())
    }

    pub fn track_ids(&self) -> Vec<TrackId> {
        self.tracks.iter().map(|t| t.id).collect()
    }

    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    fn index_of(&self, id: TrackId) -> Result<usize, TransportError> {
        self.tracks
            .iter()
            .position(|t| t.id == id)
            .ok_or(TransportError::UnknownTrack(id))
    }

    fn mix_mut(&mut self, id: TrackId) -> Result<&mut TrackMix, TransportError> {
        let index = self.index_of(id)?;
        Ok(&mut self.tracks[index].mix)
    }

    /// Longest known track; failed tracks do not count.
    pub fn duration(&self) -> f64 {
        self.tracks
            .iter()
            .filter(|t| t.failure.is_none())
            .filter_map(|t| t.element.duration())
            .fold(0.0, f64::max)
    }

    pub fn current_time(&self) -> f64 {
        self.current_time
    }

    pub fn is_playing(&self) -> bool {
        self.is_playing
    }

    pub fn master_volume(&self) -> f32 {
        self.master_volume
    }

    pub fn set_master_volume(&mut self, volume: f32) {
        self.master_volume = volume.clamp(0.0, 1.0);
    }

    pub fn set_volume(&mut self, id: TrackId, volume: f32) -> Result<(), TransportError> {
        self.mix_mut(id)?.volume = volume.clamp(0.0, 1.0);
        Ok(())
    }

    pub fn set_pan(&mut self, id: TrackId, pan: f32) -> Result<(), TransportError> {
        self.mix_mut(id)?.pan = pan.clamp(-1.0, 1.0);
        Ok(())
    }

    pub fn set_muted(&mut self, id: TrackId, muted: bool) -> Result<(), TransportError> {
        self.mix_mut(id)?.muted = muted;
        Ok(())
    }

    pub fn set_solo(&mut self, id: TrackId, solo: bool) -> Result<(), TransportError> {
        self.mix_mut(id)?.solo = solo;
        Ok(())
    }

    pub fn mix(&self, id: TrackId) -> Option<TrackMix> {
        self.tracks.iter().find(|t| t.id == id).map(|t| t.mix)
    }

    pub fn failure(&self, id: TrackId) -> Option<&TransportError> {
        self.tracks
            .iter()
            .find(|t| t.id == id)
            .and_then(|t| t.failure.as_ref())
    }

    /// Solo wins over mute: while any track is soloed, exactly the soloed
    /// tracks are heard.
    pub fn is_audible(&self, id: TrackId) -> bool {
        let any_solo = self.tracks.iter().any(|t| t.mix.solo);
        self.tracks
            .iter()
            .find(|t| t.id == id)
            .is_some_and(|t| Self::audible(&t.mix, any_solo))
    }

    fn audible(mix: &TrackMix, any_solo: bool) -> bool {
        if any_solo { mix.solo } else { !mix.muted }
    }

    pub fn effective_gain(&self, id: TrackId) -> f32 {
        let any_solo = self.tracks.iter().any(|t| t.mix.solo);
        self.tracks
            .iter()
            .find(|t| t.id == id)
            .map_or(0.0, |t| self.gain_for(t, any_solo))
    }

    fn gain_for(&self, track: &TransportTrack, any_solo: bool) -> f32 {
        if track.failure.is_some() || !Self::audible(&track.mix, any_solo) {
            return 0.0;
        }
        track.mix.volume * self.master_volume
    }

    fn apply_gains(&mut self) {
        let any_solo = self.tracks.iter().any(|t| t.mix.solo);
        let gains: Vec<f32> = self.tracks.iter().map(|t| self.gain_for(t, any_solo)).collect();
        for (track, gain) in self.tracks.iter_mut().zip(gains) {
            track.element.set_volume(gain);
            track.element.set_pan(track.mix.pan);
        }
    }

    fn mark_failed(track: &mut TransportTrack, error: TransportError) {
        warn!(track = %track.id, error = %error, "track excluded from playback");
        track.element.pause();
        track.element.set_volume(0.0);
        track.failure = Some(error);
    }

    /// Starts every paused element from the logical playhead. Elements that
    /// are already running are left alone.
    pub fn play(&mut self) {
        self.poll_failures();
        self.apply_gains();
        let at = self.current_time;
        for track in self.tracks.iter_mut().filter(|t| t.failure.is_none()) {
            if !track.element.is_paused() {
                continue;
            }
            track.element.set_current_time(at);
            if let Err(reason) = track.element.play() {
                let error = TransportError::Play(track.id, reason);
                Self::mark_failed(track, error);
            }
        }
        self.is_playing = true;
        debug!(at, tracks = self.tracks.len(), "transport play");
    }

    pub fn pause(&mut self) {
        for track in self.tracks.iter_mut() {
            if !track.element.is_paused() {
                track.element.pause();
            }
        }
        self.is_playing = false;
        debug!(at = self.current_time, "transport pause");
    }

    /// Writes the new position to every element in one pass, playing or not.
    pub fn seek(&mut self, secs: f64) {
        let secs = if secs.is_finite() { secs } else { 0.0 };
        let target = secs.clamp(0.0, self.duration());
        for track in self.tracks.iter_mut().filter(|t| t.failure.is_none()) {
            track.element.set_current_time(target);
        }
        self.current_time = target;
    }

    /// Relative seek, clamped into `[0, duration]`.
    pub fn skip(&mut self, delta_secs: f64) {
        self.seek(self.current_time + delta_secs);
    }

    pub fn snapshot(&self) -> TransportSnapshot {
        TransportSnapshot {
            current_time: self.current_time,
            duration: self.duration(),
            is_playing: self.is_playing,
        }
    }

    fn poll_failures(&mut self) {
        for track in self.tracks.iter_mut().filter(|t| t.failure.is_none()) {
            if let Some(reason) = track.element.take_error() {
                let error = TransportError::Load(track.id, reason);
                Self::mark_failed(track, error);
            }
        }
    }

    /// One display refresh: mixer changes, playhead, drift correction and
    /// end-of-song handling.
    pub fn tick(&mut self) -> TransportSnapshot {
        self.poll_failures();
        self.apply_gains();

        if self.is_playing {
            let duration = self.duration();
            let progressing = self
                .live_tracks()
                .find(|t| !t.element.is_paused())
                .map(|t| t.element.current_time());

            match progressing {
                Some(at) => self.current_time = at,
                None => {
                    // Every element stopped by itself: the song is over.
                    let any_live = self.live_tracks().next().is_some();
                    let all_ended = self.live_tracks().all(|t| {
                        t.element
                            .duration()
                            .is_none_or(|d| t.element.current_time() >= d)
                    });
                    if any_live && all_ended {
                        self.current_time = duration;
                    }
                }
            }

            if duration > 0.0 && self.current_time >= duration {
                self.stop_and_rewind();
            } else if progressing.is_some() {
                self.correct_drift();
            }
        }

        self.snapshot()
    }

    fn live_tracks(&self) -> impl Iterator<Item = &TransportTrack> {
        self.tracks.iter().filter(|t| t.failure.is_none())
    }

    fn correct_drift(&mut self) {
        let at = self.current_time;
        for track in self.tracks.iter_mut().filter(|t| t.failure.is_none()) {
            if track.element.is_paused() {
                continue;
            }
            let drift = track.element.current_time() - at;
            if drift.abs() > DRIFT_TOLERANCE_SECS {
                debug!(track = %track.id, drift, "re-seeking drifted track");
                track.element.set_current_time(at);
            }
        }
    }

    fn stop_and_rewind(&mut self) {
        for track in self.tracks.iter_mut() {
            track.element.pause();
            track.element.set_current_time(0.0);
        }
        self.current_time = 0.0;
        self.is_playing = false;
        info!("transport reached the end; rewound");
    }
}
