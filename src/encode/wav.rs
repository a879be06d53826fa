// src/encode/wav.rs

//! Linear PCM 16-bit little-endian RIFF/WAVE writer.
//!
//! Header layout (44 bytes):
//! `RIFF <riff size> WAVE fmt  <16> <1> <channels> <rate> <byte rate> <block align> <16> data <data size>`

use crate::blob::{PcmBuffer, RawAudioBlob};

pub const WAV_MIME: &str = "audio/wav";
pub const WAV_HEADER_LEN: usize = 44;
const BITS_PER_SAMPLE: u16 = 16;
const BYTES_PER_SAMPLE: u16 = BITS_PER_SAMPLE / 8;
const FORMAT_PCM: u16 = 1;

/// Builds the canonical 44-byte header for `frames` frames of 16-bit PCM.
pub fn header(sample_rate: u32, channels: u16, frames: u32) -> [u8; WAV_HEADER_LEN] {
    let block_align = channels * BYTES_PER_SAMPLE;
    let byte_rate = sample_rate * block_align as u32;
    let data_size = frames.saturating_mul(block_align as u32);

    let mut h = [0u8; WAV_HEADER_LEN];
    h[0..4].copy_from_slice(b"RIFF");
    h[4..8].copy_from_slice(&data_size.saturating_add(36).to_le_bytes());
    h[8..12].copy_from_slice(b"WAVE");
    h[12..16].copy_from_slice(b"fmt ");
    h[16..20].copy_from_slice(&16u32.to_le_bytes());
    h[20..22].copy_from_slice(&FORMAT_PCM.to_le_bytes());
    h[22..24].copy_from_slice(&channels.to_le_bytes());
    h[24..28].copy_from_slice(&sample_rate.to_le_bytes());
    h[28..32].copy_from_slice(&byte_rate.to_le_bytes());
    h[32..34].copy_from_slice(&block_align.to_le_bytes());
    h[34..36].copy_from_slice(&BITS_PER_SAMPLE.to_le_bytes());
    h[36..40].copy_from_slice(b"data");
    h[40..44].copy_from_slice(&data_size.to_le_bytes());
    h
}

/// Clamp to [-1, 1] before scaling so loud samples saturate instead of wrapping.
#[inline]
pub fn quantize(sample: f32) -> i16 {
    if !sample.is_finite() {
        return 0;
    }
    let s = sample.clamp(-1.0, 1.0);
    if s < 0.0 {
        (s * 32768.0) as i16
    } else {
        (s * 32767.0) as i16
    }
}

/// Appends interleaved samples as 16-bit little-endian PCM.
pub fn push_samples(out: &mut Vec<u8>, interleaved: &[f32]) {
    out.reserve(interleaved.len() * BYTES_PER_SAMPLE as usize);
    for &s in interleaved {
        out.extend_from_slice(&quantize(s).to_le_bytes());
    }
}

pub fn encode(buffer: &PcmBuffer) -> Vec<u8> {
    let channels = buffer.num_channels().max(1) as u16;
    let frames = buffer.frames();
    let mut out = Vec::with_capacity(WAV_HEADER_LEN + frames * channels as usize * 2);
    out.extend_from_slice(&header(buffer.sample_rate, channels, frames as u32));
    push_samples(&mut out, &buffer.interleave());
    out
}

pub fn encode_blob(buffer: &PcmBuffer) -> RawAudioBlob {
    RawAudioBlob::new(encode(buffer), WAV_MIME)
}
