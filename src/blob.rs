// src/blob.rs

use std::fmt;
use std::sync::Arc;

/// Encoded audio bytes plus a MIME hint. Immutable once produced; clones
/// share the same allocation.
#[derive(Clone, PartialEq, Eq)]
pub struct RawAudioBlob {
    bytes: Arc<[u8]>,
    mime: String,
}

impl RawAudioBlob {
    pub fn new(bytes: impl Into<Arc<[u8]>>, mime: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            mime: mime.into(),
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn shared_bytes(&self) -> Arc<[u8]> {
        self.bytes.clone()
    }

    pub fn mime(&self) -> &str {
        &self.mime
    }

    /// MIME without codec parameters, e.g. `audio/webm` for `audio/webm;codecs=opus`.
    pub fn essence(&self) -> &str {
        self.mime.split(';').next().unwrap_or("").trim()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for RawAudioBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawAudioBlob")
            .field("mime", &self.mime)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Decoded planar audio. Every channel holds the same number of frames.
#[derive(Debug, Clone, PartialEq)]
pub struct PcmBuffer {
    pub sample_rate: u32,
    pub channels: Vec<Vec<f32>>,
}

impl PcmBuffer {
    pub fn silent(sample_rate: u32, channels: usize, frames: usize) -> Self {
        Self {
            sample_rate,
            channels: vec![vec![0.0; frames]; channels],
        }
    }

    pub fn from_interleaved(interleaved: &[f32], channels: usize, sample_rate: u32) -> Self {
        let channels = channels.max(1);
        let frames = interleaved.len() / channels;
        let mut planar = vec![Vec::with_capacity(frames); channels];
        for frame in interleaved.chunks_exact(channels) {
            for (ch, &s) in frame.iter().enumerate() {
                planar[ch].push(s);
            }
        }
        Self {
            sample_rate,
            channels: planar,
        }
    }

    pub fn interleave(&self) -> Vec<f32> {
        let channels = self.num_channels();
        let frames = self.frames();
        let mut out = vec![0.0f32; frames * channels];
        for f in 0..frames {
            for ch in 0..channels {
                out[f * channels + ch] = self.channels[ch][f];
            }
        }
        out
    }

    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    pub fn frames(&self) -> usize {
        self.channels.iter().map(Vec::len).min().unwrap_or(0)
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }

    pub fn rms(&self) -> f32 {
        let total: usize = self.channels.iter().map(Vec::len).sum();
        if total == 0 {
            return 0.0;
        }
        let sum_sq: f64 = self
            .channels
            .iter()
            .flatten()
            .map(|&s| (s as f64) * (s as f64))
            .sum();
        (sum_sq / total as f64).sqrt() as f32
    }

    pub fn is_finite(&self) -> bool {
        self.channels.iter().flatten().all(|s| s.is_finite())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interleave_restores_frame_order() {
        let interleaved = [0.1, -0.1, 0.2, -0.2, 0.3, -0.3];
        let pcm = PcmBuffer::from_interleaved(&interleaved, 2, 8000);
        assert_eq!(pcm.frames(), 3);
        assert_eq!(pcm.channels[1], vec![-0.1, -0.2, -0.3]);
        assert_eq!(pcm.interleave(), interleaved.to_vec());
    }

    #[test]
    fn essence_drops_codec_parameters() {
        let blob = RawAudioBlob::new(vec![1u8, 2, 3], "audio/webm;codecs=opus");
        assert_eq!(blob.essence(), "audio/webm");
        assert_eq!(blob.len(), 3);
    }

    #[test]
    fn rms_of_full_scale_square_is_one() {
        let pcm = PcmBuffer {
            sample_rate: 100,
            channels: vec![vec![1.0, -1.0, 1.0, -1.0]],
        };
        assert!((pcm.rms() - 1.0).abs() < 1e-6);
        assert!((pcm.duration_secs() - 0.04).abs() < 1e-9);
    }
}
