// src/studio.rs

use std::sync::Arc;
use tracing::{info, warn};

use crate::blob::RawAudioBlob;
use crate::capture::CaptureBackend;
use crate::config::StudioConfig;
use crate::decoder;
use crate::duration::DurationResolver;
use crate::effects::{EffectChain, EffectKind, EffectParameters, EffectsProcessor};
use crate::encode::EncoderFactory;
use crate::error::{ProjectError, Result};
use crate::project::{
    NewSession, NewTrack, ProjectId, SavedSession, Track, TrackId, TrackRepository, UserId,
    next_track_order,
};
use crate::recorder::Recorder;
use crate::session::{SessionKey, SessionStore, WaveformTicket};
use crate::transform::{TransformClip, prepare_transform_clip};
use crate::transport::{
    Clock, ClockedElement, MultiTrackTransport, OutputMixer, PlaybackElement, TrackMix,
    TransportSnapshot,
};
use crate::waveform::WaveformData;

/// A finished take: the blob and the duration it resolved to.
#[derive(Debug, Clone, PartialEq)]
pub struct FinishedTake {
    pub blob: RawAudioBlob,
    pub duration: f64,
}

/// Application context for one open project. Owns every stateful component;
/// nothing in the crate lives in a global.
pub struct Studio<R: TrackRepository> {
    config: StudioConfig,
    project_id: ProjectId,
    user_id: UserId,
    recorder: Recorder,
    sessions: SessionStore,
    transport: MultiTrackTransport,
    resolver: DurationResolver,
    effects: EffectsProcessor,
    effect_chain: EffectChain,
    effect_params: EffectParameters,
    repository: R,
    clock: Arc<dyn Clock>,
    output: Option<OutputMixer>,
}

impl<R: TrackRepository> Studio<R> {
    pub fn new(
        config: StudioConfig,
        project_id: ProjectId,
        user_id: UserId,
        capture: Box<dyn CaptureBackend>,
        encoders: Box<dyn EncoderFactory>,
        repository: R,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            recorder: Recorder::new(&config, capture, encoders),
            resolver: DurationResolver::from_config(&config),
            project_id,
            user_id,
            sessions: SessionStore::new(),
            transport: MultiTrackTransport::new(),
            effects: EffectsProcessor::new(),
            effect_chain: EffectChain::new(),
            effect_params: EffectParameters::default(),
            repository,
            clock,
            output: None,
            config,
        }
    }

    pub fn config(&self) -> &StudioConfig {
        &self.config
    }

    pub fn recorder(&self) -> &Recorder {
        &self.recorder
    }

    pub fn recorder_mut(&mut self) -> &mut Recorder {
        &mut self.recorder
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn transport(&self) -> &MultiTrackTransport {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut MultiTrackTransport {
        &mut self.transport
    }

    /// Tracks loaded from now on play through `mixer` instead of following
    /// the studio clock silently.
    pub fn set_output(&mut self, mixer: OutputMixer) {
        self.output = Some(mixer);
    }

    pub fn play(&mut self) -> TransportSnapshot {
        self.transport.play();
        self.tick()
    }

    pub fn pause(&mut self) -> TransportSnapshot {
        self.transport.pause();
        self.tick()
    }

    pub fn seek(&mut self, secs: f64) -> TransportSnapshot {
        self.transport.seek(secs);
        self.tick()
    }

    pub fn skip(&mut self, delta_secs: f64) -> TransportSnapshot {
        self.transport.skip(delta_secs);
        self.tick()
    }

    /// Advances the transport and mirrors the playhead into every track
    /// session.
    pub fn tick(&mut self) -> TransportSnapshot {
        let snap = self.transport.tick();
        for id in self.transport.track_ids() {
            let key = SessionKey::Track(id);
            let live = self.transport.failure(id).is_none();
            self.sessions.set_playing(key, live && snap.is_playing);
            self.sessions.set_current_time(key, snap.current_time);
        }
        snap
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    pub fn effect_chain(&self) -> &EffectChain {
        &self.effect_chain
    }

    pub fn toggle_effect(&mut self, kind: EffectKind) -> bool {
        self.effect_chain.toggle(kind)
    }

    pub fn set_effect_chain(&mut self, chain: EffectChain) {
        self.effect_chain = chain;
    }

    pub fn set_effect_parameters(&mut self, params: EffectParameters) {
        self.effect_params = params;
    }

    /// Resolves a duration the callers can always use: the resolver's result,
    /// or the raw size estimate once every strategy has failed.
    pub async fn resolve_duration(&self, blob: &RawAudioBlob) -> f64 {
        self.resolver
            .resolve_or_estimate(blob, self.config.nominal_bitrate_bps)
            .await
    }

    /// Stops the recorder and turns the take into the current session.
    /// `Ok(None)` when nothing was recording.
    pub async fn finish_recording(&mut self) -> Result<Option<FinishedTake>> {
        let Some(blob) = self.recorder.stop()? else {
            return Ok(None);
        };
        let duration = self.resolve_duration(&blob).await;
        let ticket = self
            .sessions
            .create(SessionKey::Current, blob.clone(), duration);
        self.generate_waveform(ticket, blob.clone()).await;
        info!(duration, bytes = blob.len(), "take ready");
        Ok(Some(FinishedTake { blob, duration }))
    }

    /// Decodes peaks off the async thread and attaches them unless the session
    /// was replaced meanwhile.
    pub async fn generate_waveform(&mut self, ticket: WaveformTicket, blob: RawAudioBlob) {
        let buckets = self.config.waveform_peak_count;
        let job =
            tokio::task::spawn_blocking(move || WaveformData::from_blob(&blob, buckets)).await;
        match job {
            Ok(Ok(waveform)) => {
                self.sessions.attach_waveform(ticket, waveform);
            }
            Ok(Err(e)) => warn!(key = ?ticket.key(), error = %e, "waveform unavailable"),
            Err(e) => warn!(key = ?ticket.key(), error = %e, "waveform task failed"),
        }
    }

    /// Persists a new track, then registers its session and transport lane.
    pub async fn create_track_from_blob(
        &mut self,
        blob: RawAudioBlob,
        name: impl Into<String>,
    ) -> Result<Track> {
        let duration = self.resolve_duration(&blob).await;
        let sample_rate = decoder::probe_sample_rate(&blob).ok().flatten();
        let existing = self.repository.tracks_for(self.project_id, self.user_id)?;
        let track = self.repository.insert_track(NewTrack {
            project_id: self.project_id,
            user_id: self.user_id,
            name: name.into(),
            duration_seconds: duration,
            sample_rate,
            track_order: next_track_order(&existing),
            audio: blob.clone(),
        })?;
        self.load_track(&track, blob).await;
        Ok(track)
    }

    /// Session and transport lane for an already persisted track.
    pub async fn load_track(&mut self, track: &Track, blob: RawAudioBlob) {
        let key = SessionKey::Track(track.id);
        let ticket = self
            .sessions
            .create(key, blob.clone(), track.duration_seconds);
        let element = self.playback_element(track, &blob).await;
        self.transport
            .add_track(track.id, element, TrackMix::from(track));
        self.generate_waveform(ticket, blob).await;
    }

    async fn playback_element(
        &self,
        track: &Track,
        blob: &RawAudioBlob,
    ) -> Box<dyn PlaybackElement> {
        let clocked = || ClockedElement::new(self.clock.clone(), track.duration_seconds);
        let Some(mixer) = &self.output else {
            return Box::new(clocked());
        };
        let source = blob.clone();
        match tokio::task::spawn_blocking(move || decoder::decode_blob(&source)).await {
            Ok(Ok(pcm)) => Box::new(mixer.voice(pcm)),
            Ok(Err(e)) => {
                warn!(track = %track.id, error = %e, "track could not be decoded for playback");
                Box::new(clocked().failing_load(e.to_string()))
            }
            Err(e) => Box::new(clocked().failing_load(e.to_string())),
        }
    }

    pub fn delete_track(&mut self, id: TrackId) -> Result<Track> {
        let track = self.repository.delete_track(id)?;
        self.sessions.remove(SessionKey::Track(id));
        if let Err(e) = self.transport.remove_track(id) {
            warn!(error = %e, "deleted track had no transport lane");
        }
        Ok(track)
    }

    pub fn tracks(&self) -> Result<Vec<Track>> {
        Ok(self.repository.tracks_for(self.project_id, self.user_id)?)
    }

    /// Hands the current take to the persistence seam.
    pub async fn save_current_session(&mut self) -> Result<SavedSession> {
        let session = self
            .sessions
            .get(SessionKey::Current)
            .ok_or(ProjectError::NothingToSave)?;
        let blob = session.blob.clone();
        let duration = session.duration;
        let sample_rate = decoder::probe_sample_rate(&blob).ok().flatten();
        let saved = self.repository.save_session(NewSession {
            user_id: self.user_id,
            audio: blob,
            duration_seconds: duration,
            sample_rate,
        })?;
        Ok(saved)
    }

    /// Drops the current take and its playable handle.
    pub fn clear_current_session(&mut self) {
        self.sessions.remove(SessionKey::Current);
    }

    /// Renders the active chain over `blob` on the blocking pool.
    pub async fn render_effects(&self, blob: &RawAudioBlob) -> Result<RawAudioBlob> {
        let rendered = self
            .effects
            .render_async(blob.clone(), self.effect_chain.clone(), self.effect_params)
            .await?;
        Ok(rendered)
    }

    pub fn prepare_transform(&self, blob: &RawAudioBlob, duration: f64) -> Result<TransformClip> {
        Ok(prepare_transform_clip(blob, duration, &self.config)?)
    }
}
