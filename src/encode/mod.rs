// src/encode/mod.rs

pub mod wav;

use crate::error::EncoderError;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Recording containers, most compressed first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContainerFormat {
    WebmOpus,
    Webm,
    OggOpus,
    Mp4,
    Wav,
}

pub const CONTAINER_PREFERENCE: [ContainerFormat; 5] = [
    ContainerFormat::WebmOpus,
    ContainerFormat::Webm,
    ContainerFormat::OggOpus,
    ContainerFormat::Mp4,
    ContainerFormat::Wav,
];

impl ContainerFormat {
    pub fn mime(&self) -> &'static str {
        match self {
            Self::WebmOpus => "audio/webm;codecs=opus",
            Self::Webm => "audio/webm",
            Self::OggOpus => "audio/ogg;codecs=opus",
            Self::Mp4 => "audio/mp4",
            Self::Wav => wav::WAV_MIME,
        }
    }
}

/// Accumulates captured samples and hands back encoded chunks.
pub trait EncoderSink {
    fn format(&self) -> ContainerFormat;

    fn write(&mut self, interleaved: &[f32]) -> Result<(), EncoderError>;

    /// Everything encoded since the previous flush, if anything.
    fn flush_chunk(&mut self) -> Result<Option<Vec<u8>>, EncoderError>;

    /// Emits the trailing data and patches any container fields that depend
    /// on the final length. `chunks` holds every chunk flushed so far.
    fn finish(self: Box<Self>, chunks: &mut Vec<Vec<u8>>) -> Result<(), EncoderError>;
}

/// Platform-declared encoder support.
pub trait EncoderFactory {
    fn is_type_supported(&self, mime: &str) -> bool;

    fn create(
        &self,
        format: ContainerFormat,
        sample_rate: u32,
        channels: u16,
    ) -> Result<Box<dyn EncoderSink>, EncoderError>;
}

/// First supported container in preference order. The caller commits to it
/// for the whole session.
pub fn select_container(factory: &dyn EncoderFactory) -> Option<ContainerFormat> {
    let chosen = CONTAINER_PREFERENCE
        .iter()
        .copied()
        .find(|f| factory.is_type_supported(f.mime()));
    debug!(?chosen, "selected recording container");
    chosen
}

/// Uncompressed fallback that is always available.
#[derive(Debug, Default, Clone, Copy)]
pub struct PcmEncoderFactory;

impl EncoderFactory for PcmEncoderFactory {
    fn is_type_supported(&self, mime: &str) -> bool {
        mime == wav::WAV_MIME
    }

    fn create(
        &self,
        format: ContainerFormat,
        sample_rate: u32,
        channels: u16,
    ) -> Result<Box<dyn EncoderSink>, EncoderError> {
        if format != ContainerFormat::Wav {
            return Err(EncoderError::Unsupported(format.mime().to_string()));
        }
        Ok(Box::new(PcmChunkEncoder::new(sample_rate, channels)))
    }
}

/// Streams 16-bit PCM. The first chunk carries a header with zero lengths,
/// which `finish` rewrites once the frame count is known.
pub struct PcmChunkEncoder {
    sample_rate: u32,
    channels: u16,
    pending: Vec<u8>,
    header_emitted: bool,
    samples_written: u64,
}

impl PcmChunkEncoder {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels: channels.max(1),
            pending: Vec::new(),
            header_emitted: false,
            samples_written: 0,
        }
    }
}

impl EncoderSink for PcmChunkEncoder {
    fn format(&self) -> ContainerFormat {
        ContainerFormat::Wav
    }

    fn write(&mut self, interleaved: &[f32]) -> Result<(), EncoderError> {
        if !self.header_emitted {
            self.pending
                .extend_from_slice(&wav::header(self.sample_rate, self.channels, 0));
            self.header_emitted = true;
        }
        wav::push_samples(&mut self.pending, interleaved);
        self.samples_written += interleaved.len() as u64;
        Ok(())
    }

    fn flush_chunk(&mut self) -> Result<Option<Vec<u8>>, EncoderError> {
        if self.pending.is_empty() {
            return Ok(None);
        }
        Ok(Some(std::mem::take(&mut self.pending)))
    }

    fn finish(mut self: Box<Self>, chunks: &mut Vec<Vec<u8>>) -> Result<(), EncoderError> {
        if !self.header_emitted {
            self.write(&[])?;
        }
        if let Some(tail) = self.flush_chunk()? {
            chunks.push(tail);
        }

        let frames = self.samples_written / self.channels as u64;
        let frames = u32::try_from(frames)
            .map_err(|_| EncoderError::Fault("recording exceeds the WAV size limit".into()))?;
        let header = wav::header(self.sample_rate, self.channels, frames);
        match chunks.first_mut() {
            Some(first) if first.len() >= wav::WAV_HEADER_LEN => {
                first[..wav::WAV_HEADER_LEN].copy_from_slice(&header);
                Ok(())
            }
            _ => Err(EncoderError::Fault("missing header chunk".into())),
        }
    }
}
