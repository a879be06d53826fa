// src/decoder.rs

use std::io::Cursor;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CODEC_TYPE_NULL, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::default::{get_codecs, get_probe};
use tracing::{debug, warn};

use crate::blob::{PcmBuffer, RawAudioBlob};
use crate::error::DecodeError;

fn open_format(blob: &RawAudioBlob) -> Result<Box<dyn FormatReader>, DecodeError> {
    if blob.is_empty() {
        return Err(DecodeError::Empty);
    }
    let source = Cursor::new(blob.shared_bytes());
    let mss = MediaSourceStream::new(Box::new(source), Default::default());

    let mut hint = Hint::new();
    hint.mime_type(blob.essence());
    if let Some(ext) = extension_for(blob.essence()) {
        hint.with_extension(ext);
    }

    let probed = get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| DecodeError::Probe(e.to_string()))?;
    Ok(probed.format)
}

fn extension_for(essence: &str) -> Option<&'static str> {
    match essence {
        "audio/wav" | "audio/wave" | "audio/x-wav" => Some("wav"),
        "audio/mpeg" | "audio/mp3" => Some("mp3"),
        "audio/ogg" => Some("ogg"),
        "audio/flac" => Some("flac"),
        "audio/mp4" | "audio/aac" => Some("m4a"),
        _ => None,
    }
}

/// Reads the container's declared length without decoding any packets.
pub fn probe_duration(blob: &RawAudioBlob) -> Result<f64, DecodeError> {
    let format = open_format(blob)?;
    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or(DecodeError::NoTrack)?;
    let params = &track.codec_params;

    let secs = match (params.n_frames, params.time_base, params.sample_rate) {
        (Some(frames), Some(tb), _) => {
            let t = tb.calc_time(frames);
            t.seconds as f64 + t.frac
        }
        (Some(frames), None, Some(rate)) if rate > 0 => frames as f64 / rate as f64,
        _ => return Err(DecodeError::MissingMetadata),
    };
    if !secs.is_finite() || secs <= 0.0 {
        return Err(DecodeError::MissingMetadata);
    }
    Ok(secs)
}

/// Sample rate declared by the container, if any.
pub fn probe_sample_rate(blob: &RawAudioBlob) -> Result<Option<u32>, DecodeError> {
    let format = open_format(blob)?;
    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or(DecodeError::NoTrack)?;
    Ok(track.codec_params.sample_rate)
}

/// Decodes the whole blob to planar f32.
pub fn decode_blob(blob: &RawAudioBlob) -> Result<PcmBuffer, DecodeError> {
    let mut format = open_format(blob)?;
    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or(DecodeError::NoTrack)?;
    let track_id = track.id;
    let mut decoder = get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| DecodeError::Codec(e.to_string()))?;

    let mut sample_buf: Option<SampleBuffer<f32>> = None;
    let mut interleaved = Vec::<f32>::new();
    let mut locked: Option<(u32, usize)> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(DecodeError::Codec(e.to_string())),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(SymphoniaError::DecodeError(e)) => {
                warn!(error = e, "skipping undecodable packet");
                continue;
            }
            Err(e) => return Err(DecodeError::Codec(e.to_string())),
        };
        if decoded.frames() == 0 {
            continue;
        }

        let spec = *decoded.spec();
        let channels = spec.channels.count();
        let (_, locked_channels) = *locked.get_or_insert((spec.rate, channels));

        let needed = decoded.capacity() * channels;
        if sample_buf.as_ref().is_none_or(|b| b.capacity() < needed) {
            sample_buf = Some(SampleBuffer::<f32>::new(decoded.capacity() as u64, spec));
        }
        let Some(buf) = sample_buf.as_mut() else {
            continue;
        };
        buf.copy_interleaved_ref(decoded);
        let samples = buf.samples();

        if channels == locked_channels {
            interleaved.extend_from_slice(samples);
        } else if channels == 1 {
            for &s in samples {
                interleaved.extend(std::iter::repeat_n(s, locked_channels));
            }
        } else {
            // Mixed layouts: fold to mono and spread across the locked layout.
            for frame in samples.chunks_exact(channels) {
                let mono = frame.iter().sum::<f32>() / channels as f32;
                interleaved.extend(std::iter::repeat_n(mono, locked_channels));
            }
        }
    }

    let (sample_rate, channels) = locked.ok_or(DecodeError::NoFrames)?;
    let pcm = PcmBuffer::from_interleaved(&interleaved, channels, sample_rate);
    debug!(
        frames = pcm.frames(),
        sample_rate,
        channels,
        mime = blob.mime(),
        "decoded blob"
    );
    Ok(pcm)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encode::wav;

    fn tone(sr: u32, secs: f32) -> PcmBuffer {
        let frames = (sr as f32 * secs) as usize;
        let ch: Vec<f32> = (0..frames)
            .map(|i| 0.5 * (i as f32 * 0.05).sin())
            .collect();
        PcmBuffer {
            sample_rate: sr,
            channels: vec![ch.clone(), ch],
        }
    }

    #[test]
    fn decodes_wav_written_by_encoder() {
        let src = tone(8000, 0.5);
        let blob = wav::encode_blob(&src);
        let out = decode_blob(&blob).unwrap();
        assert_eq!(out.sample_rate, 8000);
        assert_eq!(out.num_channels(), 2);
        assert_eq!(out.frames(), 4000);
        let err = (out.channels[0][100] - src.channels[0][100]).abs();
        assert!(err < 1e-3);
    }

    #[test]
    fn metadata_matches_decode() {
        let blob = wav::encode_blob(&tone(22_050, 1.25));
        let meta = probe_duration(&blob).unwrap();
        let decoded = decode_blob(&blob).unwrap().duration_secs();
        assert!((meta - decoded).abs() < 1e-6);
        assert!((meta - 1.25).abs() < 1e-3);
        assert_eq!(probe_sample_rate(&blob).unwrap(), Some(22_050));
    }

    #[test]
    fn garbage_fails_to_probe() {
        let blob = RawAudioBlob::new(vec![7u8; 4096], "audio/webm;codecs=opus");
        assert!(matches!(decode_blob(&blob), Err(DecodeError::Probe(_))));
        assert!(probe_duration(&blob).is_err());
    }

    #[test]
    fn empty_blob_is_rejected() {
        let blob = RawAudioBlob::new(Vec::new(), "audio/wav");
        assert_eq!(decode_blob(&blob).err(), Some(DecodeError::Empty));
    }
}
