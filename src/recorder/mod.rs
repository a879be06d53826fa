// src/recorder/mod.rs

pub mod analyzer;
pub mod live_waveform;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::blob::RawAudioBlob;
use crate::capture::{
    CaptureBackend, CaptureConstraints, CaptureGate, CaptureStream, PermissionStatus,
};
use crate::config::StudioConfig;
use crate::encode::{ContainerFormat, EncoderFactory, EncoderSink, select_container};
use crate::error::{CaptureError, EncoderError, RecorderError};
use analyzer::{AnalysisTap, level_from_bins};
use live_waveform::LiveWaveform;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecorderState {
    Idle,
    Recording,
    Paused,
    /// The encoder or device failed mid-take; only `reset` leaves this state.
    Faulted,
}

impl RecorderState {
    fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Recording => "recording",
            Self::Paused => "paused",
            Self::Faulted => "faulted",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderEvent {
    Start,
    Pause,
    Resume,
    Stop,
    Reset,
    Fault,
}

impl RecorderEvent {
    fn name(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::Stop => "stop",
            Self::Reset => "reset",
            Self::Fault => "fault",
        }
    }
}

/// The recorder's transition table. `None` means the event is not legal in
/// `state`.
pub fn transition(state: RecorderState, event: RecorderEvent) -> Option<RecorderState> {
    use RecorderEvent as E;
    use RecorderState as S;
    match (state, event) {
        (S::Idle, E::Start) => Some(S::Recording),
        (S::Recording, E::Pause) => Some(S::Paused),
        (S::Paused, E::Resume) => Some(S::Recording),
        (S::Recording | S::Paused, E::Stop) => Some(S::Idle),
        (S::Recording | S::Paused, E::Fault) => Some(S::Faulted),
        (_, E::Reset) => Some(S::Idle),
        _ => None,
    }
}

/// What the recording UI renders. Mutated only by the recorder's own
/// transitions.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureSession {
    pub is_recording: bool,
    pub is_paused: bool,
    pub elapsed_seconds: u64,
    pub input_level: f32,
    pub permission: PermissionStatus,
    pub last_error: Option<String>,
}

impl CaptureSession {
    fn new(permission: PermissionStatus) -> Self {
        Self {
            is_recording: false,
            is_paused: false,
            elapsed_seconds: 0,
            input_level: 0.0,
            permission,
            last_error: None,
        }
    }
}

/// Resources owned for the lifetime of one take. Dropping this releases the
/// hardware stream.
struct ActiveCapture {
    stream: Box<dyn CaptureStream>,
    encoder: Box<dyn EncoderSink>,
    tap: AnalysisTap,
    chunks: Vec<Vec<u8>>,
    channels: usize,
    sample_rate: u32,
    frames_captured: u64,
    scratch: Vec<f32>,
}

impl ActiveCapture {
    /// Moves captured audio into both the encoder and the analysis tap.
    fn pump(&mut self) -> Result<usize, EncoderError> {
        self.scratch.clear();
        let n = self.stream.drain(&mut self.scratch);
        if n == 0 {
            return Ok(0);
        }
        self.encoder.write(&self.scratch)?;
        self.tap.push(&self.scratch, self.channels);
        self.frames_captured += (n / self.channels) as u64;
        Ok(n)
    }

    fn discard_pending(&mut self) {
        self.scratch.clear();
        self.stream.drain(&mut self.scratch);
        self.scratch.clear();
    }
}

/// Record / pause / resume / stop lifecycle over a single capture stream.
///
/// The recorder is clock-agnostic: the host calls [`Recorder::on_frame`] on
/// every display refresh, [`Recorder::on_chunk_interval`] every
/// `chunk_interval_ms`, and [`Recorder::on_second`] every `elapsed_tick_ms`.
pub struct Recorder {
    gate: CaptureGate,
    encoders: Box<dyn EncoderFactory>,
    constraints: CaptureConstraints,
    fft_size: usize,
    level_ceiling: f32,
    state: RecorderState,
    session: CaptureSession,
    active: Option<ActiveCapture>,
    live_waveform: LiveWaveform,
    format: Option<ContainerFormat>,
}

impl Recorder {
    pub fn new(
        config: &StudioConfig,
        backend: Box<dyn CaptureBackend>,
        encoders: Box<dyn EncoderFactory>,
    ) -> Self {
        Self {
            gate: CaptureGate::new(backend),
            encoders,
            constraints: CaptureConstraints::recording(),
            fft_size: config.analyser_fft_size,
            level_ceiling: config.level_reference_ceiling,
            state: RecorderState::Idle,
            session: CaptureSession::new(PermissionStatus::Unknown),
            active: None,
            live_waveform: LiveWaveform::new(config.live_waveform_capacity),
            format: None,
        }
    }

    pub fn with_constraints(mut self, constraints: CaptureConstraints) -> Self {
        self.constraints = constraints;
        self
    }

    pub fn state(&self) -> RecorderState {
        self.state
    }

    pub fn session(&self) -> &CaptureSession {
        &self.session
    }

    /// Container committed to for the current (or last) take.
    pub fn format(&self) -> Option<ContainerFormat> {
        self.format
    }

    pub fn live_waveform(&self) -> Vec<f32> {
        self.live_waveform.snapshot()
    }

    /// Continuous length of the audio captured so far in this take.
    pub fn captured_secs(&self) -> f64 {
        match &self.active {
            Some(a) if a.sample_rate > 0 => a.frames_captured as f64 / a.sample_rate as f64,
            _ => 0.0,
        }
    }

    /// While a take owns the device the answer is already known; asking again
    /// would open a second stream on it.
    pub fn check_permissions(&mut self) -> PermissionStatus {
        if self.active.is_some() {
            self.session.permission = PermissionStatus::Granted;
            return PermissionStatus::Granted;
        }
        let status = self.gate.check_permissions();
        self.session.permission = status;
        status
    }

    pub fn request_permissions(&mut self) -> Result<PermissionStatus, CaptureError> {
        if self.active.is_some() {
            self.session.permission = PermissionStatus::Granted;
            return Ok(PermissionStatus::Granted);
        }
        let result = self.gate.request_permissions();
        self.session.permission = self.gate.status();
        match &result {
            Ok(_) => self.session.last_error = None,
            Err(e) => self.session.last_error = Some(e.user_message()),
        }
        result
    }

    fn advance(&mut self, event: RecorderEvent) -> Result<RecorderState, RecorderError> {
        let next = transition(self.state, event).ok_or(RecorderError::InvalidTransition {
            state: self.state.name(),
            event: event.name(),
        })?;
        debug!(from = self.state.name(), to = next.name(), event = event.name(), "recorder transition");
        Ok(next)
    }

    pub fn start(&mut self) -> Result<(), RecorderError> {
        let next = self.advance(RecorderEvent::Start)?;

        if self.gate.status() != PermissionStatus::Granted {
            self.request_permissions()?;
        }

        let format = select_container(self.encoders.as_ref()).ok_or_else(|| {
            let err = RecorderError::Encoder(EncoderError::NoSupportedContainer);
            self.session.last_error = Some(err.user_message());
            err
        })?;

        let stream = self.gate.open_stream(&self.constraints).map_err(|e| {
            self.session.permission = self.gate.status();
            self.session.last_error = Some(e.user_message());
            RecorderError::Capture(e)
        })?;
        let sample_rate = stream.sample_rate();
        let channels = stream.channels().max(1);
        let encoder = self
            .encoders
            .create(format, sample_rate, channels)
            .map_err(|e| {
                self.session.last_error = Some(e.to_string());
                RecorderError::Encoder(e)
            })?;

        self.active = Some(ActiveCapture {
            stream,
            encoder,
            tap: AnalysisTap::new(self.fft_size),
            chunks: Vec::new(),
            channels: channels as usize,
            sample_rate,
            frames_captured: 0,
            scratch: Vec::with_capacity(8192),
        });
        self.format = Some(format);
        self.live_waveform.clear();
        self.state = next;
        self.session = CaptureSession {
            is_recording: true,
            permission: PermissionStatus::Granted,
            ..CaptureSession::new(PermissionStatus::Granted)
        };
        info!(mime = format.mime(), sample_rate, channels, "recording started");
        Ok(())
    }

    /// Suspends the encoder and the analysis tap together.
    pub fn pause(&mut self) -> Result<(), RecorderError> {
        let next = self.advance(RecorderEvent::Pause)?;
        self.pump_or_fault()?;
        if let Some(active) = self.active.as_mut() {
            if let Err(e) = active.stream.pause() {
                return Err(self.fault(e.to_string()));
            }
        }
        self.state = next;
        self.session.is_paused = true;
        self.session.input_level = 0.0;
        Ok(())
    }

    pub fn resume(&mut self) -> Result<(), RecorderError> {
        let next = self.advance(RecorderEvent::Resume)?;
        if let Some(active) = self.active.as_mut() {
            if let Err(e) = active.stream.resume() {
                return Err(self.fault(e.to_string()));
            }
            active.discard_pending();
            active.tap.reset();
        }
        self.state = next;
        self.session.is_paused = false;
        Ok(())
    }

    /// Finalises the encoder and hands back the take. `Ok(None)` when no
    /// recording was active.
    pub fn stop(&mut self) -> Result<Option<RawAudioBlob>, RecorderError> {
        match self.state {
            RecorderState::Idle => return Ok(None),
            RecorderState::Faulted => {
                return Err(RecorderError::Faulted(
                    self.session.last_error.clone().unwrap_or_default(),
                ));
            }
            _ => {}
        }
        let next = self.advance(RecorderEvent::Stop)?;
        if self.state == RecorderState::Recording {
            self.flush_chunk()?;
        }

        let Some(active) = self.active.take() else {
            self.state = next;
            return Ok(None);
        };
        let ActiveCapture {
            stream,
            encoder,
            mut chunks,
            frames_captured,
            sample_rate,
            ..
        } = active;
        // Release the device before assembling the blob.
        drop(stream);

        let mime = encoder.format().mime();
        if let Err(e) = encoder.finish(&mut chunks) {
            return Err(self.fault(e.to_string()));
        }

        let blob = RawAudioBlob::new(chunks.concat(), mime);
        self.state = next;
        self.session.is_recording = false;
        self.session.is_paused = false;
        self.session.input_level = 0.0;
        info!(
            bytes = blob.len(),
            chunks = chunks.len(),
            secs = frames_captured as f64 / sample_rate.max(1) as f64,
            "recording stopped"
        );
        Ok(Some(blob))
    }

    /// Back to `Idle` from anywhere, discarding buffered audio.
    pub fn reset(&mut self) {
        if self.active.take().is_some() {
            info!("recording discarded");
        }
        self.state = RecorderState::Idle;
        self.session = CaptureSession::new(self.gate.status());
        self.live_waveform.clear();
        self.format = None;
    }

    /// Display refresh. Returns the new input level, or `None` once the
    /// recorder is not actively recording, at which point the host stops
    /// scheduling frames.
    pub fn on_frame(&mut self) -> Option<f32> {
        if self.state != RecorderState::Recording {
            return None;
        }
        if self.pump_or_fault().is_err() {
            return None;
        }
        let active = self.active.as_mut()?;
        let bins = active.tap.byte_frequency_data();
        let level = level_from_bins(&bins, self.level_ceiling);
        self.session.input_level = level;
        self.live_waveform.push(level);
        Some(level)
    }

    /// Chunk timer: everything captured so far becomes an encoded chunk.
    pub fn on_chunk_interval(&mut self) -> Result<(), RecorderError> {
        if self.state != RecorderState::Recording {
            return Ok(());
        }
        self.flush_chunk()
    }

    /// One-second wall-clock tick for the recording timer display.
    pub fn on_second(&mut self) {
        if self.state == RecorderState::Recording {
            self.session.elapsed_seconds += 1;
        }
    }

    fn flush_chunk(&mut self) -> Result<(), RecorderError> {
        self.pump_or_fault()?;
        let Some(active) = self.active.as_mut() else {
            return Ok(());
        };
        match active.encoder.flush_chunk() {
            Ok(Some(chunk)) => {
                active.chunks.push(chunk);
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(e) => Err(self.fault(e.to_string())),
        }
    }

    fn pump_or_fault(&mut self) -> Result<(), RecorderError> {
        let Some(active) = self.active.as_mut() else {
            return Ok(());
        };
        if let Some(msg) = active.stream.take_fault() {
            return Err(self.fault(msg));
        }
        match active.pump() {
            Ok(_) => Ok(()),
            Err(e) => Err(self.fault(e.to_string())),
        }
    }

    /// Mid-take failure: the take is unrecoverable and the device is released
    /// immediately.
    fn fault(&mut self, msg: String) -> RecorderError {
        error!(error = %msg, "recording fault");
        if let Some(next) = transition(self.state, RecorderEvent::Fault) {
            self.state = next;
        } else {
            warn!(state = self.state.name(), "fault outside an active take");
        }
        self.active = None;
        let err = RecorderError::Faulted(msg);
        self.session.is_recording = false;
        self.session.is_paused = false;
        self.session.input_level = 0.0;
        self.session.last_error = Some(err.user_message());
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::SimulatedMicrophone;
    use crate::encode::PcmEncoderFactory;
    use std::io::Cursor;

    fn recorder(mic: &SimulatedMicrophone) -> Recorder {
        Recorder::new(
            &StudioConfig::default(),
            Box::new(mic.clone()),
            Box::new(PcmEncoderFactory),
        )
    }

    fn frames_in(blob: &RawAudioBlob) -> u32 {
        hound::WavReader::new(Cursor::new(blob.bytes().to_vec()))
            .unwrap()
            .duration()
    }

    #[test]
    fn transition_table() {
        use RecorderEvent as E;
        use RecorderState as S;
        assert_eq!(transition(S::Idle, E::Start), Some(S::Recording));
        assert_eq!(transition(S::Recording, E::Start), None);
        assert_eq!(transition(S::Paused, E::Pause), None);
        assert_eq!(transition(S::Idle, E::Resume), None);
        assert_eq!(transition(S::Paused, E::Stop), Some(S::Idle));
        assert_eq!(transition(S::Faulted, E::Stop), None);
        assert_eq!(transition(S::Faulted, E::Reset), Some(S::Idle));
        assert_eq!(transition(S::Idle, E::Fault), None);
    }

    #[test]
    fn start_checks_permission_then_owns_one_stream() {
        let mic = SimulatedMicrophone::new(8000, 1);
        let mut rec = recorder(&mic);

        rec.start().unwrap();
        assert_eq!(rec.state(), RecorderState::Recording);
        assert_eq!(rec.session().permission, PermissionStatus::Granted);
        // One permission check (opened and released) plus the take itself.
        assert_eq!(mic.acquisitions(), 2);
        assert_eq!(mic.open_streams(), 1);

        let err = rec.start().unwrap_err();
        assert!(matches!(err, RecorderError::InvalidTransition { .. }));
        assert_eq!(mic.acquisitions(), 2);
    }

    #[test]
    fn stop_without_take_yields_nothing() {
        let mic = SimulatedMicrophone::new(8000, 1);
        let mut rec = recorder(&mic);
        assert_eq!(rec.stop().unwrap(), None);
    }

    #[test]
    fn chunks_are_flushed_before_the_blob_is_assembled() {
        let mic = SimulatedMicrophone::new(8000, 1);
        let mut rec = recorder(&mic);
        rec.start().unwrap();

        for _ in 0..5 {
            mic.feed_tone(440.0, 0.5, 0.1);
            rec.on_chunk_interval().unwrap();
        }
        mic.feed_tone(440.0, 0.5, 0.05);

        let blob = rec.stop().unwrap().unwrap();
        assert_eq!(blob.mime(), "audio/wav");
        assert_eq!(frames_in(&blob), 8000 / 2 + 400);
        assert_eq!(mic.open_streams(), 0);
        assert_eq!(rec.state(), RecorderState::Idle);
    }

    #[test]
    fn pause_suspends_capture_without_losing_chunks() {
        let mic = SimulatedMicrophone::new(8000, 1);
        let mut rec = recorder(&mic);
        rec.start().unwrap();

        mic.feed_tone(440.0, 0.5, 0.3);
        rec.on_chunk_interval().unwrap();
        rec.pause().unwrap();
        assert!(rec.session().is_paused);

        mic.feed_tone(440.0, 0.5, 1.0);
        assert_eq!(rec.on_frame(), None);
        rec.on_second();
        assert_eq!(rec.session().elapsed_seconds, 0);

        rec.resume().unwrap();
        mic.feed_tone(440.0, 0.5, 0.2);
        let blob = rec.stop().unwrap().unwrap();
        assert_eq!(frames_in(&blob), 2400 + 1600);
    }

    #[test]
    fn frame_loop_reports_level_only_while_recording() {
        let mic = SimulatedMicrophone::new(8000, 1);
        let mut rec = recorder(&mic);
        assert_eq!(rec.on_frame(), None);

        rec.start().unwrap();
        mic.feed_tone(440.0, 0.8, 0.05);
        let level = rec.on_frame().unwrap();
        assert!(level > 0.0 && level <= 1.0);
        assert_eq!(rec.session().input_level, level);
        assert_eq!(rec.live_waveform().len(), 1);

        rec.stop().unwrap();
        assert_eq!(rec.on_frame(), None);
    }

    #[test]
    fn elapsed_ticks_in_whole_seconds() {
        let mic = SimulatedMicrophone::new(8000, 1);
        let mut rec = recorder(&mic);
        rec.on_second();
        rec.start().unwrap();
        rec.on_second();
        rec.on_second();
        assert_eq!(rec.session().elapsed_seconds, 2);
    }

    #[test]
    fn denied_permission_is_reported_not_fatal() {
        let mic = SimulatedMicrophone::new(8000, 1);
        mic.fail_with(Some(CaptureError::AccessDenied));
        let mut rec = recorder(&mic);

        let err = rec.start().unwrap_err();
        assert_eq!(err, RecorderError::Capture(CaptureError::AccessDenied));
        assert_eq!(rec.state(), RecorderState::Idle);
        assert_eq!(rec.session().permission, PermissionStatus::Denied);
        let msg = rec.session().last_error.clone().unwrap();
        assert!(msg.contains("privacy settings"));
        assert_eq!(mic.open_streams(), 0);
    }

    #[test]
    fn device_fault_releases_stream_and_requires_reset() {
        let mic = SimulatedMicrophone::new(8000, 1);
        let mut rec = recorder(&mic);
        rec.start().unwrap();
        mic.feed_tone(440.0, 0.5, 0.1);
        mic.inject_fault("device unplugged");

        assert!(rec.on_chunk_interval().is_err());
        assert_eq!(rec.state(), RecorderState::Faulted);
        assert_eq!(mic.open_streams(), 0);
        assert!(rec.session().last_error.as_deref().unwrap().contains("device unplugged"));
        assert!(matches!(rec.stop(), Err(RecorderError::Faulted(_))));
        assert!(rec.start().is_err());

        rec.reset();
        assert_eq!(rec.state(), RecorderState::Idle);
        rec.start().unwrap();
        assert_eq!(mic.open_streams(), 1);
    }

    #[test]
    fn reset_discards_take_and_releases_device() {
        let mic = SimulatedMicrophone::new(8000, 1);
        let mut rec = recorder(&mic);
        rec.start().unwrap();
        mic.feed_tone(440.0, 0.5, 0.5);
        rec.on_chunk_interval().unwrap();
        rec.on_second();

        rec.reset();
        assert_eq!(mic.open_streams(), 0);
        assert_eq!(mic.acquisitions(), mic.releases());
        assert_eq!(rec.session().elapsed_seconds, 0);
        assert_eq!(rec.stop().unwrap(), None);
    }

    #[test]
    fn permission_queries_mid_take_leave_the_device_alone() {
        let mic = SimulatedMicrophone::new(8000, 1);
        let mut rec = recorder(&mic);
        rec.start().unwrap();
        let acquired = mic.acquisitions();

        assert_eq!(rec.request_permissions(), Ok(PermissionStatus::Granted));
        assert_eq!(rec.check_permissions(), PermissionStatus::Granted);
        rec.pause().unwrap();
        assert_eq!(rec.check_permissions(), PermissionStatus::Granted);

        assert_eq!(mic.acquisitions(), acquired);
        assert_eq!(mic.open_streams(), 1);
        assert_eq!(rec.state(), RecorderState::Paused);
        assert_eq!(rec.session().permission, PermissionStatus::Granted);
        assert_eq!(rec.session().last_error, None);
    }

    #[test]
    fn immediate_stop_still_yields_a_playable_blob() {
        let mic = SimulatedMicrophone::new(8000, 1);
        let mut rec = recorder(&mic);
        rec.start().unwrap();
        let blob = rec.stop().unwrap().unwrap();
        assert!(!blob.is_empty());
        assert_eq!(blob.mime(), "audio/wav");
        assert_eq!(frames_in(&blob), 0);
        assert_eq!(rec.format(), Some(crate::encode::ContainerFormat::Wav));
    }
}
