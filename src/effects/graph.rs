// src/effects/graph.rs

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};

use super::chorus::Chorus;
use super::compressor::Compressor;
use super::delay::FeedbackDelay;
use super::equalizer::ThreeBandEq;
use super::params::EffectParameters;
use super::reverb::ConvolutionReverb;
use crate::blob::{PcmBuffer, RawAudioBlob};
use crate::decoder;
use crate::encode::wav;
use crate::error::RenderError;

/// One offline processing stage. Nodes are built per render and never reused.
pub trait EffectNode {
    fn process(&mut self, buffer: &mut PcmBuffer);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EffectKind {
    Equalizer,
    Compressor,
    Reverb,
    Delay,
    Chorus,
}

impl EffectKind {
    pub const ALL: [EffectKind; 5] = [
        Self::Equalizer,
        Self::Compressor,
        Self::Reverb,
        Self::Delay,
        Self::Chorus,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Equalizer => "equalizer",
            Self::Compressor => "compressor",
            Self::Reverb => "reverb",
            Self::Delay => "delay",
            Self::Chorus => "chorus",
        }
    }

    fn build(&self, sample_rate: u32, channels: usize, p: &EffectParameters) -> Box<dyn EffectNode> {
        match self {
            Self::Equalizer => Box::new(ThreeBandEq::new(sample_rate, channels, &p.equalizer)),
            Self::Compressor => Box::new(Compressor::new(sample_rate, &p.compressor)),
            Self::Reverb => Box::new(ConvolutionReverb::new(sample_rate, channels, &p.reverb)),
            Self::Delay => Box::new(FeedbackDelay::new(sample_rate, &p.delay)),
            Self::Chorus => Box::new(Chorus::new(sample_rate, &p.chorus)),
        }
    }
}

impl fmt::Display for EffectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EffectKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "eq" | "equalizer" => Ok(Self::Equalizer),
            "comp" | "compressor" => Ok(Self::Compressor),
            "reverb" => Ok(Self::Reverb),
            "delay" => Ok(Self::Delay),
            "chorus" => Ok(Self::Chorus),
            other => Err(format!("unknown effect {other:?}")),
        }
    }
}

/// Active effects in the order the user switched them on. Re-activating an
/// effect that is already on leaves its position unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectChain {
    order: Vec<EffectKind>,
}

impl EffectChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if the effect was already active.
    pub fn activate(&mut self, kind: EffectKind) -> bool {
        if self.order.contains(&kind) {
            return false;
        }
        self.order.push(kind);
        true
    }

    pub fn deactivate(&mut self, kind: EffectKind) -> bool {
        let before = self.order.len();
        self.order.retain(|k| *k != kind);
        before != self.order.len()
    }

    /// Returns whether the effect is active afterwards.
    pub fn toggle(&mut self, kind: EffectKind) -> bool {
        if self.deactivate(kind) {
            false
        } else {
            self.activate(kind)
        }
    }

    pub fn contains(&self, kind: EffectKind) -> bool {
        self.order.contains(&kind)
    }

    pub fn kinds(&self) -> &[EffectKind] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl FromIterator<EffectKind> for EffectChain {
    fn from_iter<I: IntoIterator<Item = EffectKind>>(iter: I) -> Self {
        let mut chain = Self::new();
        for kind in iter {
            chain.activate(kind);
        }
        chain
    }
}

impl FromStr for EffectChain {
    type Err = String;

    /// Comma separated, e.g. `eq,comp,reverb`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.split(',')
            .filter(|part| !part.trim().is_empty())
            .map(EffectKind::from_str)
            .collect()
    }
}

/// Offline renderer. Every call is an independent pure computation over its
/// inputs, so concurrent renders never share state.
#[derive(Debug, Default, Clone, Copy)]
pub struct EffectsProcessor;

impl EffectsProcessor {
    pub fn new() -> Self {
        Self
    }

    /// Runs `source` through the chain. Output has the source's length,
    /// channel count and sample rate.
    pub fn render_buffer(
        &self,
        source: &PcmBuffer,
        chain: &EffectChain,
        params: &EffectParameters,
    ) -> Result<PcmBuffer, RenderError> {
        if source.sample_rate == 0 {
            return Err(RenderError::UnsupportedSampleRate(source.sample_rate));
        }
        params.validate()?;
        let params = params.clamped();
        let mut buffer = source.clone();
        let channels = buffer.num_channels();

        for kind in chain.kinds() {
            debug!(effect = %kind, frames = buffer.frames(), "applying effect");
            kind.build(buffer.sample_rate, channels, &params)
                .process(&mut buffer);
        }

        if !buffer.is_finite() {
            return Err(RenderError::NonFiniteOutput);
        }
        Ok(buffer)
    }

    /// Decode, render, and re-encode as 16-bit WAV. All or nothing.
    pub fn render(
        &self,
        source: &RawAudioBlob,
        chain: &EffectChain,
        params: &EffectParameters,
    ) -> Result<RawAudioBlob, RenderError> {
        let decoded = decoder::decode_blob(source).inspect_err(|e| {
            warn!(error = %e, mime = source.mime(), "effects source could not be decoded");
        })?;
        let rendered = self.render_buffer(&decoded, chain, params).inspect_err(|e| {
            warn!(error = %e, "effects render failed");
        })?;
        Ok(wav::encode_blob(&rendered))
    }

    /// `render` on tokio's blocking pool. Dropping the future abandons the
    /// result without affecting other renders.
    pub async fn render_async(
        &self,
        source: RawAudioBlob,
        chain: EffectChain,
        params: EffectParameters,
    ) -> Result<RawAudioBlob, RenderError> {
        let processor = *self;
        tokio::task::spawn_blocking(move || processor.render(&source, &chain, &params))
            .await
            .map_err(|e| RenderError::Abandoned(e.to_string()))?
    }
}
