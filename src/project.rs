// src/project.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, info};
use uuid::Uuid;

use crate::blob::RawAudioBlob;
use crate::error::ProjectError;

macro_rules! id_type {
    ($name:ident) => {
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }
    };
}

id_type!(TrackId);
id_type!(ProjectId);
id_type!(UserId);
id_type!(SessionId);

/// The persisted track record, reduced to what playback needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: TrackId,
    pub project_id: ProjectId,
    pub user_id: UserId,
    pub name: String,
    /// 0..=1
    pub volume: f32,
    /// -1..=1
    pub pan: f32,
    pub is_muted: bool,
    pub is_solo: bool,
    pub duration_seconds: f64,
    pub sample_rate: Option<u32>,
    pub track_order: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// What the client sends when creating a track; the store assigns id and
/// timestamps.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTrack {
    pub project_id: ProjectId,
    pub user_id: UserId,
    pub name: String,
    pub duration_seconds: f64,
    pub sample_rate: Option<u32>,
    pub track_order: u32,
    pub audio: RawAudioBlob,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewSession {
    pub user_id: UserId,
    pub audio: RawAudioBlob,
    pub duration_seconds: f64,
    pub sample_rate: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedSession {
    pub id: SessionId,
    pub user_id: UserId,
    pub duration_seconds: f64,
    pub sample_rate: Option<u32>,
    pub created_at: DateTime<Utc>,
}

/// Persistence seam. The store owns ids, timestamps and the per-project track
/// limit; the studio never assumes a storage format.
pub trait TrackRepository {
    fn tracks_for(&self, project: ProjectId, user: UserId) -> Result<Vec<Track>, ProjectError>;

    fn insert_track(&mut self, track: NewTrack) -> Result<Track, ProjectError>;

    fn delete_track(&mut self, id: TrackId) -> Result<Track, ProjectError>;

    fn save_session(&mut self, session: NewSession) -> Result<SavedSession, ProjectError>;
}

/// `max(existing) + 1`, or 0 for an empty project.
pub fn next_track_order(tracks: &[Track]) -> u32 {
    tracks
        .iter()
        .map(|t| t.track_order)
        .max()
        .map_or(0, |m| m.saturating_add(1))
}

/// Process-local store used by the CLI and tests.
#[derive(Debug)]
pub struct InMemoryRepository {
    max_tracks: usize,
    tracks: HashMap<TrackId, (Track, RawAudioBlob)>,
    sessions: Vec<(SavedSession, RawAudioBlob)>,
}

impl InMemoryRepository {
    pub fn new(max_tracks: usize) -> Self {
        Self {
            max_tracks,
            tracks: HashMap::new(),
            sessions: Vec::new(),
        }
    }

    pub fn audio_for(&self, id: TrackId) -> Option<&RawAudioBlob> {
        self.tracks.get(&id).map(|(_, blob)| blob)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}

impl TrackRepository for InMemoryRepository {
    fn tracks_for(&self, project: ProjectId, user: UserId) -> Result<Vec<Track>, ProjectError> {
        let mut tracks: Vec<Track> = self
            .tracks
            .values()
            .filter(|(t, _)| t.project_id == project && t.user_id == user)
            .map(|(t, _)| t.clone())
            .collect();
        tracks.sort_by_key(|t| t.track_order);
        Ok(tracks)
    }

    fn insert_track(&mut self, new: NewTrack) -> Result<Track, ProjectError> {
        let existing = self
            .tracks
            .values()
            .filter(|(t, _)| t.project_id == new.project_id && t.user_id == new.user_id)
            .count();
        if existing >= self.max_tracks {
            return Err(ProjectError::TrackLimitReached {
                limit: self.max_tracks,
            });
        }

        let now = Utc::now();
        let track = Track {
            id: TrackId::new(),
            project_id: new.project_id,
            user_id: new.user_id,
            name: new.name,
            volume: 1.0,
            pan: 0.0,
            is_muted: false,
            is_solo: false,
            duration_seconds: new.duration_seconds,
            sample_rate: new.sample_rate,
            track_order: new.track_order,
            created_at: now,
            updated_at: now,
        };
        debug!(id = %track.id, order = track.track_order, "track stored");
        self.tracks.insert(track.id, (track.clone(), new.audio));
        Ok(track)
    }

    fn delete_track(&mut self, id: TrackId) -> Result<Track, ProjectError> {
        self.tracks
            .remove(&id)
            .map(|(t, _)| t)
            .ok_or(ProjectError::TrackNotFound(id))
    }

    fn save_session(&mut self, new: NewSession) -> Result<SavedSession, ProjectError> {
        let saved = SavedSession {
            id: SessionId::new(),
            user_id: new.user_id,
            duration_seconds: new.duration_seconds,
            sample_rate: new.sample_rate,
            created_at: Utc::now(),
        };
        info!(id = %saved.id, secs = saved.duration_seconds, "session stored");
        self.sessions.push((saved.clone(), new.audio));
        Ok(saved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_track(project: ProjectId, user: UserId, order: u32) -> NewTrack {
        NewTrack {
            project_id: project,
            user_id: user,
            name: format!("Take {order}"),
            duration_seconds: 1.0,
            sample_rate: Some(48_000),
            track_order: order,
            audio: RawAudioBlob::new(vec![0u8; 4], "audio/wav"),
        }
    }

    #[test]
    fn order_is_max_plus_one() {
        let mut repo = InMemoryRepository::new(10);
        let (p, u) = (ProjectId::new(), UserId::new());
        assert_eq!(next_track_order(&repo.tracks_for(p, u).unwrap()), 0);
        repo.insert_track(new_track(p, u, 0)).unwrap();
        repo.insert_track(new_track(p, u, 7)).unwrap();
        assert_eq!(next_track_order(&repo.tracks_for(p, u).unwrap()), 8);
    }

    #[test]
    fn limit_is_per_project_and_user() {
        let mut repo = InMemoryRepository::new(2);
        let (p, u) = (ProjectId::new(), UserId::new());
        repo.insert_track(new_track(p, u, 0)).unwrap();
        repo.insert_track(new_track(p, u, 1)).unwrap();
        assert_eq!(
            repo.insert_track(new_track(p, u, 2)).unwrap_err(),
            ProjectError::TrackLimitReached { limit: 2 }
        );
        // Another user on the same project has their own allowance.
        repo.insert_track(new_track(p, UserId::new(), 0)).unwrap();
    }

    #[test]
    fn delete_missing_track_is_an_error() {
        let mut repo = InMemoryRepository::new(10);
        let id = TrackId::new();
        assert_eq!(repo.delete_track(id).unwrap_err(), ProjectError::TrackNotFound(id));
    }

    #[test]
    fn track_serializes_with_snake_case_fields() {
        let mut repo = InMemoryRepository::new(10);
        let t = repo
            .insert_track(new_track(ProjectId::new(), UserId::new(), 3))
            .unwrap();
        let json = serde_json::to_value(&t).unwrap();
        assert_eq!(json["track_order"], 3);
        assert_eq!(json["is_muted"], false);
    }
}
