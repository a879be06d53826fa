use std::io::Cursor;
use std::sync::Arc;

use voice_studio::capture::SimulatedMicrophone;
use voice_studio::encode::PcmEncoderFactory;
use voice_studio::error::ProjectError;
use voice_studio::project::{InMemoryRepository, ProjectId, TrackRepository, UserId};
use voice_studio::session::SessionKey;
use voice_studio::transport::{ManualClock, OutputMixer};
use voice_studio::{EffectKind, RawAudioBlob, RecorderState, Studio, StudioConfig, StudioError};

fn studio(mic: &SimulatedMicrophone) -> Studio<InMemoryRepository> {
    studio_with_clock(mic, &ManualClock::new())
}

fn studio_with_clock(mic: &SimulatedMicrophone, clock: &ManualClock) -> Studio<InMemoryRepository> {
    let config = StudioConfig::default();
    let repo = InMemoryRepository::new(config.max_tracks_per_project);
    Studio::new(
        config,
        ProjectId::new(),
        UserId::new(),
        Box::new(mic.clone()),
        Box::new(PcmEncoderFactory),
        repo,
        Arc::new(clock.clone()),
    )
}

/// Records `secs` of tone in 100 ms slices, the way the chunk timer would.
fn record(studio: &mut Studio<InMemoryRepository>, mic: &SimulatedMicrophone, secs: f64) {
    let slices = (secs * 10.0).round() as usize;
    for _ in 0..slices {
        mic.feed_tone(330.0, 0.5, 0.1);
        studio.recorder_mut().on_chunk_interval().unwrap();
    }
}

#[tokio::test]
async fn two_second_take_resolves_to_two_seconds() {
    let mic = SimulatedMicrophone::new(48_000, 1);
    let mut studio = studio(&mic);

    studio.recorder_mut().start().unwrap();
    record(&mut studio, &mic, 2.0);
    let take = studio.finish_recording().await.unwrap().unwrap();

    assert!((1.9..=2.2).contains(&take.duration), "got {}", take.duration);
    assert_eq!(take.blob.mime(), "audio/wav");
    assert_eq!(studio.recorder().state(), RecorderState::Idle);
    assert_eq!(mic.open_streams(), 0);

    let current = studio.sessions().get(SessionKey::Current).unwrap();
    assert_eq!(current.duration, take.duration);
    assert!(current.waveform.is_some());
}

#[tokio::test]
async fn paused_time_is_not_recorded() {
    let mic = SimulatedMicrophone::new(48_000, 1);
    let mut studio = studio(&mic);

    studio.recorder_mut().start().unwrap();
    record(&mut studio, &mic, 1.0);
    studio.recorder_mut().pause().unwrap();
    mic.feed_tone(330.0, 0.5, 1.0);
    studio.recorder_mut().resume().unwrap();
    record(&mut studio, &mic, 0.5);
    let take = studio.finish_recording().await.unwrap().unwrap();

    assert!((take.duration - 1.5).abs() < 0.05, "got {}", take.duration);
}

#[tokio::test]
async fn stopping_while_idle_yields_nothing() {
    let mic = SimulatedMicrophone::new(48_000, 1);
    let mut studio = studio(&mic);
    assert!(studio.finish_recording().await.unwrap().is_none());
    assert!(studio.sessions().is_empty());
}

#[tokio::test]
async fn track_order_grows_and_limit_is_enforced() {
    let mic = SimulatedMicrophone::new(16_000, 1);
    let mut studio = studio(&mic);

    studio.recorder_mut().start().unwrap();
    record(&mut studio, &mic, 0.5);
    let take = studio.finish_recording().await.unwrap().unwrap();

    for n in 0..10u32 {
        let track = studio
            .create_track_from_blob(take.blob.clone(), format!("Take {n}"))
            .await
            .unwrap();
        assert_eq!(track.track_order, n);
        assert_eq!(track.sample_rate, Some(16_000));
    }
    assert_eq!(studio.transport().track_count(), 10);

    let err = studio
        .create_track_from_blob(take.blob.clone(), "one too many")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        StudioError::Project(ProjectError::TrackLimitReached { limit: 10 })
    ));
    assert_eq!(studio.tracks().unwrap().len(), 10);
    assert_eq!(studio.transport().track_count(), 10);
}

#[tokio::test]
async fn order_continues_after_the_highest_not_the_count() {
    let mic = SimulatedMicrophone::new(16_000, 1);
    let mut studio = studio(&mic);
    studio.recorder_mut().start().unwrap();
    record(&mut studio, &mic, 0.3);
    let take = studio.finish_recording().await.unwrap().unwrap();

    let first = studio.create_track_from_blob(take.blob.clone(), "a").await.unwrap();
    studio.create_track_from_blob(take.blob.clone(), "b").await.unwrap();
    studio.delete_track(first.id).unwrap();
    let third = studio.create_track_from_blob(take.blob.clone(), "c").await.unwrap();
    assert_eq!(third.track_order, 2);
}

#[tokio::test]
async fn deleting_a_track_releases_its_playable_url() {
    let mic = SimulatedMicrophone::new(16_000, 1);
    let mut studio = studio(&mic);
    studio.recorder_mut().start().unwrap();
    record(&mut studio, &mic, 0.3);
    let take = studio.finish_recording().await.unwrap().unwrap();

    let track = studio.create_track_from_blob(take.blob, "vox").await.unwrap();
    let url = studio
        .sessions()
        .get(SessionKey::Track(track.id))
        .unwrap()
        .url
        .clone();
    assert!(studio.sessions().urls().resolve(&url).is_some());
    let live = studio.sessions().urls().live_count();

    studio.delete_track(track.id).unwrap();
    assert!(studio.sessions().get(SessionKey::Track(track.id)).is_none());
    assert!(studio.sessions().urls().resolve(&url).is_none());
    assert_eq!(studio.sessions().urls().live_count(), live - 1);
    assert_eq!(studio.transport().track_count(), 0);
    assert!(matches!(
        studio.delete_track(track.id),
        Err(StudioError::Project(ProjectError::TrackNotFound(_)))
    ));
}

#[tokio::test]
async fn current_take_can_be_saved_once_recorded() {
    let mic = SimulatedMicrophone::new(22_050, 1);
    let mut studio = studio(&mic);
    assert!(matches!(
        studio.save_current_session().await,
        Err(StudioError::Project(ProjectError::NothingToSave))
    ));

    studio.recorder_mut().start().unwrap();
    record(&mut studio, &mic, 1.0);
    let take = studio.finish_recording().await.unwrap().unwrap();

    let saved = studio.save_current_session().await.unwrap();
    assert_eq!(saved.duration_seconds, take.duration);
    assert_eq!(saved.sample_rate, Some(22_050));
    assert_eq!(studio.repository().session_count(), 1);

    studio.clear_current_session();
    assert!(studio.sessions().get(SessionKey::Current).is_none());
}

#[tokio::test]
async fn rendered_take_is_a_valid_wav_of_the_same_shape() {
    let mic = SimulatedMicrophone::new(44_100, 2);
    let mut studio = studio(&mic);
    studio.recorder_mut().start().unwrap();
    record(&mut studio, &mic, 0.5);
    let take = studio.finish_recording().await.unwrap().unwrap();

    studio.toggle_effect(EffectKind::Equalizer);
    studio.toggle_effect(EffectKind::Delay);
    let rendered = studio.render_effects(&take.blob).await.unwrap();
    assert_eq!(rendered.mime(), "audio/wav");

    let source = hound::WavReader::new(Cursor::new(take.blob.bytes().to_vec())).unwrap();
    let out = hound::WavReader::new(Cursor::new(rendered.bytes().to_vec())).unwrap();
    let spec = out.spec();
    assert_eq!(spec.sample_rate, 44_100);
    assert_eq!(spec.channels, 2);
    assert_eq!(spec.bits_per_sample, 16);
    assert_eq!(spec.sample_format, hound::SampleFormat::Int);
    assert_eq!(out.duration(), source.duration());
}

#[tokio::test]
async fn undecodable_input_fails_the_render_without_output() {
    let mic = SimulatedMicrophone::new(16_000, 1);
    let mut studio = studio(&mic);
    studio.toggle_effect(EffectKind::Reverb);
    let garbage = RawAudioBlob::new(vec![3u8; 2048], "audio/webm;codecs=opus");
    let err = studio.render_effects(&garbage).await.unwrap_err();
    assert!(matches!(err, StudioError::Render(_)));
    assert!(!err.user_message().is_empty());
}

#[tokio::test]
async fn transform_clip_respects_length_bounds() {
    let mic = SimulatedMicrophone::new(16_000, 1);
    let mut studio = studio(&mic);
    studio.recorder_mut().start().unwrap();
    record(&mut studio, &mic, 1.0);
    let take = studio.finish_recording().await.unwrap().unwrap();

    let clip = studio.prepare_transform(&take.blob, take.duration).unwrap();
    assert_eq!(clip.mime, "audio/wav");
    assert!(!clip.audio_base64.is_empty());
    assert!(studio.prepare_transform(&take.blob, 0.2).is_err());
    assert!(studio.prepare_transform(&take.blob, 12.0).is_err());
}

#[test]
fn repository_is_scoped_per_project_and_user() {
    let mut repo = InMemoryRepository::new(1);
    let blob = RawAudioBlob::new(vec![0u8; 8], "audio/wav");
    let user = UserId::new();
    for project in [ProjectId::new(), ProjectId::new()] {
        repo.insert_track(voice_studio::project::NewTrack {
            project_id: project,
            user_id: user,
            name: "t".into(),
            duration_seconds: 1.0,
            sample_rate: None,
            track_order: 0,
            audio: blob.clone(),
        })
        .unwrap();
    }
}

#[tokio::test]
async fn immediate_stop_resolves_to_a_positive_duration() {
    let mic = SimulatedMicrophone::new(48_000, 1);
    let mut studio = studio(&mic);

    studio.recorder_mut().start().unwrap();
    let take = studio.finish_recording().await.unwrap().unwrap();

    assert!(!take.blob.is_empty());
    assert!(take.duration > 0.0, "got {}", take.duration);
    assert_eq!(mic.open_streams(), 0);
}

#[tokio::test]
async fn track_sessions_follow_the_transport() {
    let mic = SimulatedMicrophone::new(16_000, 1);
    let clock = ManualClock::new();
    let mut studio = studio_with_clock(&mic, &clock);

    studio.recorder_mut().start().unwrap();
    record(&mut studio, &mic, 2.0);
    let take = studio.finish_recording().await.unwrap().unwrap();
    let track = studio.create_track_from_blob(take.blob, "Take 1").await.unwrap();
    let key = SessionKey::Track(track.id);
    assert!(!studio.sessions().get(key).unwrap().is_playing);

    studio.play();
    clock.advance(0.5);
    studio.tick();
    let session = studio.sessions().get(key).unwrap();
    assert!(session.is_playing);
    assert!((session.current_time - 0.5).abs() < 1e-9);

    studio.pause();
    clock.advance(1.0);
    studio.tick();
    let session = studio.sessions().get(key).unwrap();
    assert!(!session.is_playing);
    assert!((session.current_time - 0.5).abs() < 1e-9);

    studio.seek(1.25);
    assert!((studio.sessions().get(key).unwrap().current_time - 1.25).abs() < 1e-9);
}

#[tokio::test]
async fn decoded_tracks_play_through_the_output_mixer() {
    let mic = SimulatedMicrophone::new(16_000, 1);
    let mut studio = studio(&mic);
    let mixer = OutputMixer::new(16_000, 2);
    studio.set_output(mixer.clone());

    studio.recorder_mut().start().unwrap();
    record(&mut studio, &mic, 1.0);
    let take = studio.finish_recording().await.unwrap().unwrap();
    let good = studio.create_track_from_blob(take.blob, "Take 1").await.unwrap();
    let bad = studio
        .create_track_from_blob(RawAudioBlob::new(vec![0x5au8; 16_000], "audio/webm"), "Broken")
        .await
        .unwrap();
    assert_eq!(mixer.live_voices(), 1);

    let mut out = vec![0.0f32; 16_000];
    mixer.render(&mut out);
    assert!(out.iter().all(|&s| s == 0.0), "paused tracks must be silent");

    studio.play();
    assert!(studio.transport().failure(bad.id).is_some());
    assert!(studio.transport().failure(good.id).is_none());

    // Half a second of stereo at the device rate.
    mixer.render(&mut out);
    assert!(out.iter().any(|s| s.abs() > 0.01));
    let snap = studio.tick();
    assert!(snap.is_playing);
    assert!((snap.current_time - 0.5).abs() < 1e-3, "got {}", snap.current_time);

    studio.transport_mut().set_muted(good.id, true).unwrap();
    studio.tick();
    mixer.render(&mut out);
    assert!(out.iter().all(|&s| s == 0.0));

    studio.delete_track(good.id).unwrap();
    assert_eq!(mixer.live_voices(), 0);
}
