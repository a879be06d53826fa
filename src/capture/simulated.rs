// src/capture/simulated.rs

use std::collections::VecDeque;
use std::f32::consts::PI;
use std::sync::{Arc, Mutex, MutexGuard};

use super::{CaptureBackend, CaptureConstraints, CaptureStream, PermissionStatus};
use crate::error::CaptureError;

/// A microphone fed programmatically. Used for headless runs (`studio --simulate`)
/// and for driving the recorder by event injection.
///
/// Clones share state, so a test can keep a handle while the recorder owns
/// the backend.
#[derive(Clone)]
pub struct SimulatedMicrophone {
    inner: Arc<Mutex<SimState>>,
}

struct SimState {
    sample_rate: u32,
    channels: u16,
    permission_query: Option<PermissionStatus>,
    open_failure: Option<CaptureError>,
    pending: VecDeque<f32>,
    paused: bool,
    fault: Option<String>,
    acquisitions: usize,
    releases: usize,
    phase: f32,
}

impl SimulatedMicrophone {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SimState {
                sample_rate,
                channels: channels.max(1),
                permission_query: None,
                open_failure: None,
                pending: VecDeque::new(),
                paused: false,
                fault: None,
                acquisitions: 0,
                releases: 0,
                phase: 0.0,
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn sample_rate(&self) -> u32 {
        self.state().sample_rate
    }

    pub fn set_permission_query(&self, status: Option<PermissionStatus>) {
        self.state().permission_query = status;
    }

    /// Every subsequent `open` fails with `failure` until cleared with `None`.
    pub fn fail_with(&self, failure: Option<CaptureError>) {
        self.state().open_failure = failure;
    }

    /// Delivers interleaved samples as if the hardware had captured them.
    /// Dropped when no stream is open or the stream is paused.
    pub fn feed(&self, interleaved: &[f32]) {
        let mut st = self.state();
        if st.acquisitions == st.releases || st.paused {
            return;
        }
        st.pending.extend(interleaved.iter().copied());
    }

    /// Feeds `secs` of a sine tone on every channel.
    pub fn feed_tone(&self, freq_hz: f32, amplitude: f32, secs: f64) {
        let (frames, channels, sample_rate, mut phase) = {
            let st = self.state();
            (
                (secs * st.sample_rate as f64).round() as usize,
                st.channels as usize,
                st.sample_rate,
                st.phase,
            )
        };
        let step = 2.0 * PI * freq_hz / sample_rate as f32;
        let mut samples = Vec::with_capacity(frames * channels);
        for _ in 0..frames {
            let s = amplitude * phase.sin();
            for _ in 0..channels {
                samples.push(s);
            }
            phase = (phase + step) % (2.0 * PI);
        }
        self.state().phase = phase;
        self.feed(&samples);
    }

    pub fn inject_fault(&self, message: impl Into<String>) {
        self.state().fault = Some(message.into());
    }

    pub fn acquisitions(&self) -> usize {
        self.state().acquisitions
    }

    pub fn releases(&self) -> usize {
        self.state().releases
    }

    pub fn open_streams(&self) -> usize {
        let st = self.state();
        st.acquisitions - st.releases
    }
}

impl CaptureBackend for SimulatedMicrophone {
    fn query_permission(&self) -> Option<PermissionStatus> {
        self.state().permission_query
    }

    fn open(
        &mut self,
        _constraints: &CaptureConstraints,
    ) -> Result<Box<dyn CaptureStream>, CaptureError> {
        let mut st = self.state();
        if let Some(failure) = st.open_failure {
            return Err(failure);
        }
        if st.acquisitions != st.releases {
            return Err(CaptureError::DeviceBusy);
        }
        st.acquisitions += 1;
        st.paused = false;
        st.pending.clear();
        st.fault = None;
        let (sample_rate, channels) = (st.sample_rate, st.channels);
        drop(st);

        Ok(Box::new(SimulatedStream {
            mic: self.clone(),
            sample_rate,
            channels,
        }))
    }
}

struct SimulatedStream {
    mic: SimulatedMicrophone,
    sample_rate: u32,
    channels: u16,
}

impl CaptureStream for SimulatedStream {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn drain(&mut self, out: &mut Vec<f32>) -> usize {
        let mut st = self.mic.state();
        let n = st.pending.len();
        out.extend(st.pending.drain(..));
        n
    }

    fn pause(&mut self) -> Result<(), CaptureError> {
        self.mic.state().paused = true;
        Ok(())
    }

    fn resume(&mut self) -> Result<(), CaptureError> {
        self.mic.state().paused = false;
        Ok(())
    }

    fn take_fault(&mut self) -> Option<String> {
        self.mic.state().fault.take()
    }
}

impl Drop for SimulatedStream {
    fn drop(&mut self) {
        let mut st = self.mic.state();
        st.releases += 1;
        st.pending.clear();
        st.paused = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn samples_only_arrive_while_open_and_running() {
        let mut mic = SimulatedMicrophone::new(1000, 1);
        mic.feed(&[0.5; 10]);

        let mut stream = mic.open(&CaptureConstraints::minimal()).unwrap();
        mic.feed(&[0.5; 10]);
        stream.pause().unwrap();
        mic.feed(&[0.5; 10]);
        stream.resume().unwrap();
        mic.feed_tone(100.0, 0.5, 0.005);

        let mut out = Vec::new();
        assert_eq!(stream.drain(&mut out), 15);
        drop(stream);
        assert_eq!(mic.open_streams(), 0);
    }

    #[test]
    fn second_open_while_held_reports_busy() {
        let mut mic = SimulatedMicrophone::new(1000, 1);
        let _held = mic.open(&CaptureConstraints::minimal()).unwrap();
        let err = mic.open(&CaptureConstraints::minimal()).err();
        assert_eq!(err, Some(CaptureError::DeviceBusy));
        assert_eq!(mic.acquisitions(), 1);
    }
}
