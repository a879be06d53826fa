// src/session.rs

use std::collections::HashMap;
use std::fmt;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::blob::RawAudioBlob;
use crate::project::TrackId;
use crate::waveform::WaveformData;

/// Process-local handle into a blob. Only valid until revoked.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PlayableUrl(String);

impl PlayableUrl {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlayableUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Issues and revokes playable URLs. Each URL is released exactly once;
/// a second revoke is reported and ignored.
#[derive(Debug, Default)]
pub struct UrlRegistry {
    live: HashMap<PlayableUrl, RawAudioBlob>,
    revoked: usize,
}

impl UrlRegistry {
    pub fn create_object_url(&mut self, blob: &RawAudioBlob) -> PlayableUrl {
        let url = PlayableUrl(format!("blob:studio/{}", Uuid::new_v4()));
        self.live.insert(url.clone(), blob.clone());
        url
    }

    pub fn revoke(&mut self, url: &PlayableUrl) -> bool {
        if self.live.remove(url).is_some() {
            self.revoked += 1;
            true
        } else {
            warn!(%url, "revoking an unknown or already revoked url");
            false
        }
    }

    pub fn resolve(&self, url: &PlayableUrl) -> Option<&RawAudioBlob> {
        self.live.get(url)
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    pub fn revoked_count(&self) -> usize {
        self.revoked
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionKey {
    /// The recording in progress.
    Current,
    Track(TrackId),
}

/// AudioSession (for `SessionKey::Current`) or TrackSession.
#[derive(Debug, Clone)]
pub struct PlaybackSession {
    pub key: SessionKey,
    pub blob: RawAudioBlob,
    pub url: PlayableUrl,
    pub waveform: Option<WaveformData>,
    pub is_playing: bool,
    pub current_time: f64,
    pub duration: f64,
    generation: u64,
}

/// Proof that a waveform job was started for one particular incarnation of a
/// session. Completing with a stale ticket is a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaveformTicket {
    key: SessionKey,
    generation: u64,
}

impl WaveformTicket {
    pub fn key(&self) -> SessionKey {
        self.key
    }
}

/// Keyed session store. Each key is written only by its owner's lifecycle
/// calls; replacing or removing a session releases its URL first.
#[derive(Debug, Default)]
pub struct SessionStore {
    urls: UrlRegistry,
    sessions: HashMap<SessionKey, PlaybackSession>,
    next_generation: u64,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates (or replaces) the session for `key` and returns a ticket for
    /// attaching its waveform later.
    pub fn create(&mut self, key: SessionKey, blob: RawAudioBlob, duration: f64) -> WaveformTicket {
        if let Some(old) = self.sessions.remove(&key) {
            self.urls.revoke(&old.url);
            debug!(?key, "superseded session released");
        }
        self.next_generation += 1;
        let generation = self.next_generation;
        let url = self.urls.create_object_url(&blob);
        self.sessions.insert(
            key,
            PlaybackSession {
                key,
                blob,
                url,
                waveform: None,
                is_playing: false,
                current_time: 0.0,
                duration,
                generation,
            },
        );
        WaveformTicket { key, generation }
    }

    /// Returns false when the session was replaced or removed since the
    /// ticket was issued.
    pub fn attach_waveform(&mut self, ticket: WaveformTicket, waveform: WaveformData) -> bool {
        match self.sessions.get_mut(&ticket.key) {
            Some(s) if s.generation == ticket.generation => {
                s.waveform = Some(waveform);
                true
            }
            _ => {
                debug!(key = ?ticket.key, "dropping stale waveform");
                false
            }
        }
    }

    pub fn get(&self, key: SessionKey) -> Option<&PlaybackSession> {
        self.sessions.get(&key)
    }

    pub fn set_playing(&mut self, key: SessionKey, playing: bool) {
        if let Some(s) = self.sessions.get_mut(&key) {
            s.is_playing = playing;
        }
    }

    pub fn set_current_time(&mut self, key: SessionKey, secs: f64) {
        if let Some(s) = self.sessions.get_mut(&key) {
            s.current_time = secs.clamp(0.0, s.duration.max(0.0));
        }
    }

    /// Track deletion or explicit clear.
    pub fn remove(&mut self, key: SessionKey) -> Option<PlaybackSession> {
        let session = self.sessions.remove(&key)?;
        self.urls.revoke(&session.url);
        Some(session)
    }

    pub fn clear(&mut self) {
        for (_, session) in self.sessions.drain() {
            self.urls.revoke(&session.url);
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn urls(&self) -> &UrlRegistry {
        &self.urls
    }
}
