// src/effects/params.rs

use serde::{Deserialize, Serialize};

use crate::error::RenderError;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReverbParams {
    /// 0..=1, impulse length is `room_size * 4` seconds.
    pub room_size: f32,
    /// 0..=1, higher decays faster.
    pub damping: f32,
    pub wet_level: f32,
    pub dry_level: f32,
}

impl Default for ReverbParams {
    fn default() -> Self {
        Self {
            room_size: 0.5,
            damping: 0.5,
            wet_level: 0.3,
            dry_level: 0.7,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DelayParams {
    /// Seconds, 0..=2.
    pub delay_time: f32,
    /// 0..=0.95, kept below unity so the loop always decays.
    pub feedback: f32,
    pub wet_level: f32,
    pub dry_level: f32,
}

impl Default for DelayParams {
    fn default() -> Self {
        Self {
            delay_time: 0.3,
            feedback: 0.3,
            wet_level: 0.3,
            dry_level: 0.7,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChorusParams {
    /// LFO rate in Hz, 0.1..=10.
    pub rate: f32,
    /// 0..=1 of the maximum sweep.
    pub depth: f32,
    pub wet_level: f32,
    pub dry_level: f32,
}

impl Default for ChorusParams {
    fn default() -> Self {
        Self {
            rate: 1.5,
            depth: 0.3,
            wet_level: 0.5,
            dry_level: 0.5,
        }
    }
}

/// Band gains in dB, -24..=24.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EqualizerParams {
    pub low_gain: f32,
    pub mid_gain: f32,
    pub high_gain: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CompressorParams {
    /// dB, -100..=0.
    pub threshold: f32,
    /// 1..=20.
    pub ratio: f32,
    /// Seconds, 0..=1.
    pub attack: f32,
    /// Seconds, 0..=1.
    pub release: f32,
}

impl Default for CompressorParams {
    fn default() -> Self {
        Self {
            threshold: -24.0,
            ratio: 4.0,
            attack: 0.003,
            release: 0.25,
        }
    }
}

/// One sub-record per effect kind, whether or not the effect is active.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EffectParameters {
    pub reverb: ReverbParams,
    pub delay: DelayParams,
    pub chorus: ChorusParams,
    pub equalizer: EqualizerParams,
    pub compressor: CompressorParams,
}

impl EffectParameters {
    fn fields(&self) -> [(&'static str, f32); 19] {
        [
            ("reverb.roomSize", self.reverb.room_size),
            ("reverb.damping", self.reverb.damping),
            ("reverb.wetLevel", self.reverb.wet_level),
            ("reverb.dryLevel", self.reverb.dry_level),
            ("delay.delayTime", self.delay.delay_time),
            ("delay.feedback", self.delay.feedback),
            ("delay.wetLevel", self.delay.wet_level),
            ("delay.dryLevel", self.delay.dry_level),
            ("chorus.rate", self.chorus.rate),
            ("chorus.depth", self.chorus.depth),
            ("chorus.wetLevel", self.chorus.wet_level),
            ("chorus.dryLevel", self.chorus.dry_level),
            ("equalizer.lowGain", self.equalizer.low_gain),
            ("equalizer.midGain", self.equalizer.mid_gain),
            ("equalizer.highGain", self.equalizer.high_gain),
            ("compressor.threshold", self.compressor.threshold),
            ("compressor.ratio", self.compressor.ratio),
            ("compressor.attack", self.compressor.attack),
            ("compressor.release", self.compressor.release),
        ]
    }

    /// Rejects NaN and infinities; those cannot be clamped meaningfully.
    pub fn validate(&self) -> Result<(), RenderError> {
        match self.fields().into_iter().find(|(_, v)| !v.is_finite()) {
            Some((name, value)) => Err(RenderError::InvalidParameter { name, value }),
            None => Ok(()),
        }
    }

    /// Every field pulled into its documented range.
    pub fn clamped(&self) -> Self {
        let r = self.reverb;
        let d = self.delay;
        let c = self.chorus;
        let e = self.equalizer;
        let k = self.compressor;
        Self {
            reverb: ReverbParams {
                room_size: r.room_size.clamp(0.0, 1.0),
                damping: r.damping.clamp(0.0, 1.0),
                wet_level: r.wet_level.clamp(0.0, 1.0),
                dry_level: r.dry_level.clamp(0.0, 1.0),
            },
            delay: DelayParams {
                delay_time: d.delay_time.clamp(0.0, 2.0),
                feedback: d.feedback.clamp(0.0, 0.95),
                wet_level: d.wet_level.clamp(0.0, 1.0),
                dry_level: d.dry_level.clamp(0.0, 1.0),
            },
            chorus: ChorusParams {
                rate: c.rate.clamp(0.1, 10.0),
                depth: c.depth.clamp(0.0, 1.0),
                wet_level: c.wet_level.clamp(0.0, 1.0),
                dry_level: c.dry_level.clamp(0.0, 1.0),
            },
            equalizer: EqualizerParams {
                low_gain: e.low_gain.clamp(-24.0, 24.0),
                mid_gain: e.mid_gain.clamp(-24.0, 24.0),
                high_gain: e.high_gain.clamp(-24.0, 24.0),
            },
            compressor: CompressorParams {
                threshold: k.threshold.clamp(-100.0, 0.0),
                ratio: k.ratio.clamp(1.0, 20.0),
                attack: k.attack.clamp(0.0, 1.0),
                release: k.release.clamp(0.0, 1.0),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamps_out_of_range_values() {
        let mut p = EffectParameters::default();
        p.delay.feedback = 3.0;
        p.equalizer.high_gain = -80.0;
        p.compressor.ratio = 0.0;
        let c = p.clamped();
        assert_eq!(c.delay.feedback, 0.95);
        assert_eq!(c.equalizer.high_gain, -24.0);
        assert_eq!(c.compressor.ratio, 1.0);
        assert_eq!(c.reverb, p.reverb);
    }

    #[test]
    fn nan_is_rejected_by_name() {
        let mut p = EffectParameters::default();
        p.chorus.depth = f32::NAN;
        match p.validate() {
            Err(RenderError::InvalidParameter { name, .. }) => assert_eq!(name, "chorus.depth"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn deserializes_camel_case_with_defaults() {
        let p: EffectParameters =
            serde_json::from_str(r#"{"reverb":{"roomSize":0.9},"delay":{"delayTime":0.5}}"#)
                .unwrap();
        assert_eq!(p.reverb.room_size, 0.9);
        assert_eq!(p.reverb.damping, 0.5);
        assert_eq!(p.delay.delay_time, 0.5);
        assert_eq!(p.compressor, CompressorParams::default());
    }
}
