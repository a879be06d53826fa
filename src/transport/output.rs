// src/transport/output.rs

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SampleFormat, SizedSample, Stream, StreamConfig};
use std::f32::consts::PI;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tracing::{info, warn};

use super::PlaybackElement;
use crate::blob::PcmBuffer;
use crate::error::TransportError;

/// Decoded track audio plus the playback state the output callback reads.
struct Voice {
    pcm: Arc<PcmBuffer>,
    /// Source frames, fractional while resampling.
    position: f64,
    playing: bool,
    gain: f32,
    pan: f32,
}

impl Voice {
    fn frames(&self) -> f64 {
        self.pcm.frames() as f64
    }

    fn ended(&self) -> bool {
        self.position >= self.frames()
    }

    /// Adds this voice into an interleaved device buffer, advancing its
    /// position by however much source audio that consumed.
    fn mix_into(&mut self, out: &mut [f32], channels: usize, device_rate: u32) {
        if !self.playing || channels == 0 || device_rate == 0 || self.pcm.sample_rate == 0 {
            return;
        }
        let pcm = Arc::clone(&self.pcm);
        let Some(first) = pcm.channels.first() else {
            return;
        };
        let second = pcm.channels.get(1).unwrap_or(first);
        let step = pcm.sample_rate as f64 / device_rate as f64;
        let (pan_l, pan_r) = pan_gains(self.pan);

        for frame in out.chunks_exact_mut(channels) {
            if self.ended() {
                break;
            }
            let left = sample_at(first, self.position) * self.gain;
            let right = sample_at(second, self.position) * self.gain;
            if channels >= 2 {
                frame[0] += left * pan_l;
                frame[1] += right * pan_r;
            } else {
                frame[0] += 0.5 * (left + right);
            }
            self.position += step;
        }
    }
}

/// Equal-power pan law. `pan` runs from -1 (hard left) to 1 (hard right).
fn pan_gains(pan: f32) -> (f32, f32) {
    let angle = (pan.clamp(-1.0, 1.0) + 1.0) * 0.25 * PI;
    (angle.cos(), angle.sin())
}

/// Linear interpolation between neighbouring frames.
fn sample_at(channel: &[f32], position: f64) -> f32 {
    let index = position.floor() as usize;
    let frac = (position - index as f64) as f32;
    let a = channel.get(index).copied().unwrap_or(0.0);
    let b = channel.get(index + 1).copied().unwrap_or(a);
    a + (b - a) * frac
}

/// Sums every live voice into the device buffer. Cloning shares the voice
/// list, so a studio can hand out elements while the stream callback renders.
#[derive(Clone)]
pub struct OutputMixer {
    voices: Arc<Mutex<Vec<Weak<Mutex<Voice>>>>>,
    sample_rate: u32,
    channels: usize,
}

impl OutputMixer {
    pub fn new(sample_rate: u32, channels: usize) -> Self {
        Self {
            voices: Arc::new(Mutex::new(Vec::new())),
            sample_rate,
            channels,
        }
    }

    /// A playback element for `pcm`. Dropping the element removes its voice
    /// from the mix.
    pub fn voice(&self, pcm: PcmBuffer) -> OutputElement {
        let voice = Arc::new(Mutex::new(Voice {
            pcm: Arc::new(pcm),
            position: 0.0,
            playing: false,
            gain: 1.0,
            pan: 0.0,
        }));
        self.voices
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Arc::downgrade(&voice));
        OutputElement { voice }
    }

    pub fn live_voices(&self) -> usize {
        let mut voices = self.voices.lock().unwrap_or_else(|e| e.into_inner());
        voices.retain(|v| v.strong_count() > 0);
        voices.len()
    }

    /// Fills one interleaved device buffer.
    pub fn render(&self, out: &mut [f32]) {
        out.fill(0.0);
        let Ok(mut voices) = self.voices.lock() else {
            return;
        };
        voices.retain(|v| v.strong_count() > 0);
        for voice in voices.iter().filter_map(Weak::upgrade) {
            if let Ok(mut voice) = voice.lock() {
                voice.mix_into(out, self.channels, self.sample_rate);
            }
        }
        for sample in out.iter_mut() {
            // Soft clip
            *sample = sample.tanh();
            if sample.abs() < 1e-10 {
                *sample = 0.0;
            }
        }
    }
}

/// One track's lane on the output device.
pub struct OutputElement {
    voice: Arc<Mutex<Voice>>,
}

impl OutputElement {
    fn voice(&self) -> MutexGuard<'_, Voice> {
        self.voice.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl PlaybackElement for OutputElement {
    fn duration(&self) -> Option<f64> {
        let secs = self.voice().pcm.duration_secs();
        (secs.is_finite() && secs > 0.0).then_some(secs)
    }

    fn current_time(&self) -> f64 {
        let voice = self.voice();
        if voice.pcm.sample_rate == 0 {
            return 0.0;
        }
        voice.position.min(voice.frames()) / voice.pcm.sample_rate as f64
    }

    fn set_current_time(&mut self, secs: f64) {
        let mut voice = self.voice();
        let secs = if secs.is_finite() { secs.max(0.0) } else { 0.0 };
        voice.position = (secs * voice.pcm.sample_rate as f64).min(voice.frames());
    }

    fn is_paused(&self) -> bool {
        let voice = self.voice();
        !voice.playing || voice.ended()
    }

    fn play(&mut self) -> Result<(), String> {
        let mut voice = self.voice();
        if voice.pcm.frames() == 0 {
            return Err("track has no decoded audio".to_string());
        }
        // Finished voices stay put until seeked.
        voice.playing = !voice.ended();
        Ok(())
    }

    fn pause(&mut self) {
        self.voice().playing = false;
    }

    fn set_volume(&mut self, volume: f32) {
        self.voice().gain = volume;
    }

    fn set_pan(&mut self, pan: f32) {
        self.voice().pan = pan;
    }
}

/// The default output device, rendering an [`OutputMixer`]. The stream
/// stops when this is dropped.
pub struct AudioOutput {
    _stream: Stream,
    mixer: OutputMixer,
}

impl AudioOutput {
    pub fn open_default() -> Result<Self, TransportError> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| TransportError::Output("no output device available".to_string()))?;
        let supported = device
            .default_output_config()
            .map_err(|e| TransportError::Output(e.to_string()))?;
        let config: StreamConfig = supported.config();
        let mixer = OutputMixer::new(config.sample_rate.0, config.channels as usize);

        let stream = match supported.sample_format() {
            SampleFormat::F32 => build_stream::<f32>(&device, &config, mixer.clone())?,
            SampleFormat::I16 => build_stream::<i16>(&device, &config, mixer.clone())?,
            SampleFormat::U16 => build_stream::<u16>(&device, &config, mixer.clone())?,
            other => {
                return Err(TransportError::Output(format!(
                    "unsupported output sample format {other:?}"
                )));
            }
        };
        stream
            .play()
            .map_err(|e| TransportError::Output(e.to_string()))?;

        info!(
            sample_rate = config.sample_rate.0,
            channels = config.channels,
            "audio output opened"
        );
        Ok(Self {
            _stream: stream,
            mixer,
        })
    }

    pub fn mixer(&self) -> OutputMixer {
        self.mixer.clone()
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    mixer: OutputMixer,
) -> Result<Stream, TransportError>
where
    T: SizedSample + FromSample<f32>,
{
    let mut scratch: Vec<f32> = Vec::with_capacity(4096);
    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                scratch.resize(data.len(), 0.0);
                mixer.render(&mut scratch);
                for (dst, &src) in data.iter_mut().zip(&scratch) {
                    *dst = T::from_sample(src);
                }
            },
            |err| warn!(error = %err, "output stream error"),
            None,
        )
        .map_err(|e| TransportError::Output(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn constant(sample_rate: u32, value: f32, frames: usize) -> PcmBuffer {
        PcmBuffer {
            sample_rate,
            channels: vec![vec![value; frames]],
        }
    }

    #[test]
    fn paused_voices_are_silent() {
        let mixer = OutputMixer::new(8_000, 2);
        let _el = mixer.voice(constant(8_000, 0.5, 100));
        let mut out = vec![1.0; 32];
        mixer.render(&mut out);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn centre_pan_is_equal_power() {
        let mixer = OutputMixer::new(8_000, 2);
        let mut el = mixer.voice(constant(8_000, 0.5, 100));
        el.play().unwrap();
        let mut out = vec![0.0; 8];
        mixer.render(&mut out);
        let expected = (0.5 * std::f32::consts::FRAC_1_SQRT_2).tanh();
        assert!((out[0] - expected).abs() < 1e-5);
        assert!((out[1] - expected).abs() < 1e-5);
    }

    #[test]
    fn gain_and_hard_pan_reach_the_device() {
        let mixer = OutputMixer::new(8_000, 2);
        let mut el = mixer.voice(constant(8_000, 0.5, 100));
        el.set_volume(0.5);
        el.set_pan(-1.0);
        el.play().unwrap();
        let mut out = vec![0.0; 8];
        mixer.render(&mut out);
        assert!((out[0] - 0.25f32.tanh()).abs() < 1e-5);
        assert!(out[1].abs() < 1e-6);

        el.set_volume(0.0);
        mixer.render(&mut out);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn position_advances_at_the_source_rate() {
        let mixer = OutputMixer::new(16_000, 2);
        let mut el = mixer.voice(constant(8_000, 0.1, 8_000));
        el.play().unwrap();
        let mut out = vec![0.0; 160 * 2];
        mixer.render(&mut out);
        assert!((el.current_time() - 0.01).abs() < 1e-9);

        el.set_current_time(0.5);
        assert!((el.current_time() - 0.5).abs() < 1e-9);
        el.pause();
        mixer.render(&mut out);
        assert!((el.current_time() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn reaching_the_end_reports_paused() {
        let mixer = OutputMixer::new(8_000, 1);
        let mut el = mixer.voice(constant(8_000, 0.2, 10));
        assert_eq!(el.duration(), Some(10.0 / 8_000.0));
        el.play().unwrap();
        let mut out = vec![0.0; 32];
        mixer.render(&mut out);
        assert!(el.is_paused());
        assert!(out[9] != 0.0);
        assert_eq!(out[10], 0.0);

        el.play().unwrap();
        assert!(el.is_paused());
        el.set_current_time(0.0);
        el.play().unwrap();
        assert!(!el.is_paused());
    }

    #[test]
    fn dropped_elements_leave_the_mix() {
        let mixer = OutputMixer::new(8_000, 2);
        let a = mixer.voice(constant(8_000, 0.1, 10));
        let b = mixer.voice(constant(8_000, 0.1, 10));
        assert_eq!(mixer.live_voices(), 2);
        drop(a);
        assert_eq!(mixer.live_voices(), 1);
        drop(b);
        assert_eq!(mixer.live_voices(), 0);
    }

    #[test]
    fn empty_audio_refuses_to_play() {
        let mixer = OutputMixer::new(8_000, 2);
        let mut el = mixer.voice(PcmBuffer::silent(8_000, 1, 0));
        assert!(el.play().is_err());
        assert_eq!(el.duration(), None);
    }
}
