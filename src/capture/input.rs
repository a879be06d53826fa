// src/capture/input.rs

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{
    BuildStreamError, DefaultStreamConfigError, FromSample, PlayStreamError, Sample, SampleFormat,
    SampleRate, SizedSample, Stream, StreamConfig,
};
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use super::{CaptureBackend, CaptureConstraints, CaptureStream};
use crate::error::CaptureError;

/// Ten seconds of stereo at 48 kHz; the recorder drains every chunk interval.
const RING_CAPACITY: usize = 960_000;

/// Default input device through cpal.
#[derive(Debug, Default, Clone, Copy)]
pub struct CpalBackend;

impl CaptureBackend for CpalBackend {
    fn open(
        &mut self,
        constraints: &CaptureConstraints,
    ) -> Result<Box<dyn CaptureStream>, CaptureError> {
        let host = cpal::default_host();
        let device = host.default_input_device().ok_or(CaptureError::NoDevice)?;
        let (config, sample_format) = choose_config(&device, constraints)?;
        let sample_rate = config.sample_rate.0;
        let channels = config.channels;

        let (producer, consumer) = HeapRb::<f32>::new(RING_CAPACITY).split();
        let paused = Arc::new(AtomicBool::new(false));
        let dropped = Arc::new(AtomicUsize::new(0));
        let fault = Arc::new(Mutex::new(None));

        let stream = match sample_format {
            SampleFormat::F32 => build_stream::<f32>(&device, &config, producer, &paused, &dropped, &fault)?,
            SampleFormat::I16 => build_stream::<i16>(&device, &config, producer, &paused, &dropped, &fault)?,
            SampleFormat::U16 => build_stream::<u16>(&device, &config, producer, &paused, &dropped, &fault)?,
            other => {
                warn!(format = ?other, "unsupported input sample format");
                return Err(CaptureError::UnsupportedConstraints);
            }
        };
        stream.play().map_err(map_play_error)?;

        info!(sample_rate, channels, "microphone stream opened");
        Ok(Box::new(CpalStream {
            stream,
            consumer,
            sample_rate,
            channels,
            paused,
            dropped,
            fault,
        }))
    }
}

fn choose_config(
    device: &cpal::Device,
    constraints: &CaptureConstraints,
) -> Result<(StreamConfig, SampleFormat), CaptureError> {
    let default = device
        .default_input_config()
        .map_err(map_default_config_error)?;

    let wanted_rate = constraints.sample_rate;
    let wanted_channels = constraints.channels;
    if wanted_rate.is_none() && wanted_channels.is_none() {
        return Ok((default.config(), default.sample_format()));
    }

    if let Ok(ranges) = device.supported_input_configs() {
        for range in ranges {
            let rate = wanted_rate.unwrap_or(default.sample_rate().0);
            let channels_ok = wanted_channels.is_none_or(|c| c == range.channels());
            let rate_ok = range.min_sample_rate().0 <= rate && rate <= range.max_sample_rate().0;
            if channels_ok && rate_ok {
                let supported = range.with_sample_rate(SampleRate(rate));
                return Ok((supported.config(), supported.sample_format()));
            }
        }
    }

    if constraints.exact {
        return Err(CaptureError::UnsupportedConstraints);
    }
    debug!("requested capture format unavailable, using device default");
    Ok((default.config(), default.sample_format()))
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    mut producer: HeapProd<f32>,
    paused: &Arc<AtomicBool>,
    dropped: &Arc<AtomicUsize>,
    fault: &Arc<Mutex<Option<String>>>,
) -> Result<Stream, CaptureError>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    let paused = paused.clone();
    let dropped = dropped.clone();
    let fault = fault.clone();
    let mut scratch: Vec<f32> = Vec::with_capacity(4096);

    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                if paused.load(Ordering::Relaxed) {
                    return;
                }
                scratch.clear();
                scratch.extend(data.iter().map(|&s| f32::from_sample(s)));
                push_or_count(&mut producer, &scratch, &dropped);
            },
            move |err| {
                warn!(error = %err, "input stream error");
                if let Ok(mut slot) = fault.lock() {
                    slot.get_or_insert_with(|| err.to_string());
                }
            },
            None,
        )
        .map_err(map_build_error)
}

/// A full ring means the recorder stalled. The overflow is counted here and
/// reported on the next drain.
fn push_or_count(producer: &mut HeapProd<f32>, samples: &[f32], dropped: &AtomicUsize) {
    let pushed = producer.push_slice(samples);
    if pushed < samples.len() {
        dropped.fetch_add(samples.len() - pushed, Ordering::Relaxed);
    }
}

fn map_default_config_error(err: DefaultStreamConfigError) -> CaptureError {
    match err {
        DefaultStreamConfigError::DeviceNotAvailable => CaptureError::NoDevice,
        DefaultStreamConfigError::StreamTypeNotSupported => CaptureError::NotSupported,
        DefaultStreamConfigError::BackendSpecific { err } => {
            warn!(error = %err, "default input config failed");
            CaptureError::DeviceBusy
        }
    }
}

fn map_build_error(err: BuildStreamError) -> CaptureError {
    match err {
        BuildStreamError::DeviceNotAvailable => CaptureError::NoDevice,
        BuildStreamError::StreamConfigNotSupported | BuildStreamError::InvalidArgument => {
            CaptureError::UnsupportedConstraints
        }
        BuildStreamError::StreamIdOverflow => CaptureError::DeviceBusy,
        BuildStreamError::BackendSpecific { err } => {
            warn!(error = %err, "building input stream failed");
            CaptureError::DeviceBusy
        }
    }
}

fn map_play_error(err: PlayStreamError) -> CaptureError {
    match err {
        PlayStreamError::DeviceNotAvailable => CaptureError::NoDevice,
        PlayStreamError::BackendSpecific { err } => {
            warn!(error = %err, "starting input stream failed");
            CaptureError::DeviceBusy
        }
    }
}

struct CpalStream {
    stream: Stream,
    consumer: HeapCons<f32>,
    sample_rate: u32,
    channels: u16,
    paused: Arc<AtomicBool>,
    dropped: Arc<AtomicUsize>,
    fault: Arc<Mutex<Option<String>>>,
}

impl CaptureStream for CpalStream {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn drain(&mut self, out: &mut Vec<f32>) -> usize {
        let mut tmp = [0.0f32; 4096];
        let mut total = 0;
        loop {
            let popped = self.consumer.pop_slice(&mut tmp);
            if popped == 0 {
                break;
            }
            out.extend_from_slice(&tmp[..popped]);
            total += popped;
        }
        let lost = self.dropped.swap(0, Ordering::Relaxed);
        if lost > 0 {
            warn!(samples = lost, "capture ring overflowed; samples dropped");
        }
        total
    }

    fn pause(&mut self) -> Result<(), CaptureError> {
        self.paused.store(true, Ordering::Relaxed);
        if let Err(e) = self.stream.pause() {
            // Not every host can pause; the callback gate still drops samples.
            debug!(error = %e, "host could not pause input stream");
        }
        Ok(())
    }

    fn resume(&mut self) -> Result<(), CaptureError> {
        self.stream.play().map_err(map_play_error)?;
        self.paused.store(false, Ordering::Relaxed);
        Ok(())
    }

    fn take_fault(&mut self) -> Option<String> {
        self.fault.lock().ok().and_then(|mut slot| slot.take())
    }
}

impl Drop for CpalStream {
    fn drop(&mut self) {
        self.paused.store(true, Ordering::Relaxed);
        let _ = self.stream.pause();
        info!("microphone stream released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overflow_is_counted_not_silently_lost() {
        let (mut producer, mut consumer) = HeapRb::<f32>::new(4).split();
        let dropped = AtomicUsize::new(0);

        push_or_count(&mut producer, &[0.1, 0.2, 0.3], &dropped);
        assert_eq!(dropped.load(Ordering::Relaxed), 0);
        push_or_count(&mut producer, &[0.4, 0.5, 0.6], &dropped);
        assert_eq!(dropped.load(Ordering::Relaxed), 2);

        let mut out = [0.0f32; 8];
        assert_eq!(consumer.pop_slice(&mut out), 4);
        assert_eq!(&out[..4], &[0.1, 0.2, 0.3, 0.4]);
    }

    #[test]
    fn build_errors_map_to_capture_failures() {
        assert_eq!(
            map_build_error(BuildStreamError::DeviceNotAvailable),
            CaptureError::NoDevice
        );
        assert_eq!(
            map_build_error(BuildStreamError::StreamConfigNotSupported),
            CaptureError::UnsupportedConstraints
        );
        assert_eq!(
            map_play_error(PlayStreamError::DeviceNotAvailable),
            CaptureError::NoDevice
        );
    }
}
