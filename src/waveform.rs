// src/waveform.rs

use serde::{Deserialize, Serialize};

use crate::blob::{PcmBuffer, RawAudioBlob};
use crate::decoder;
use crate::error::DecodeError;

/// Overview peaks for a saved recording: one value per bucket in `[0, 1]`,
/// normalised to the loudest sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaveformData {
    pub peaks: Vec<f32>,
    pub duration: f64,
}

impl WaveformData {
    pub fn from_pcm(pcm: &PcmBuffer, buckets: usize) -> Self {
        let frames = pcm.frames();
        let duration = pcm.duration_secs();
        if frames == 0 || buckets == 0 {
            return Self {
                peaks: Vec::new(),
                duration,
            };
        }

        let buckets = buckets.min(frames);
        let mut peaks = vec![0.0f32; buckets];
        let mut global_peak = 0.0f32;

        for channel in &pcm.channels {
            for (i, &sample) in channel.iter().take(frames).enumerate() {
                let bucket = i * buckets / frames;
                let a = sample.abs();
                if a > peaks[bucket] {
                    peaks[bucket] = a;
                }
                if a > global_peak {
                    global_peak = a;
                }
            }
        }

        // Normalize
        if global_peak > 0.0 {
            let scale = 1.0 / global_peak;
            for v in &mut peaks {
                *v *= scale;
            }
        }

        Self { peaks, duration }
    }

    pub fn from_blob(blob: &RawAudioBlob, buckets: usize) -> Result<Self, DecodeError> {
        let pcm = decoder::decode_blob(blob)?;
        Ok(Self::from_pcm(&pcm, buckets))
    }
}
