// src/effects/compressor.rs

use super::graph::EffectNode;
use super::params::CompressorParams;
use crate::blob::PcmBuffer;

/// Feed-forward peak compressor with a shared envelope across channels, so
/// stereo images do not shift under gain reduction.
pub struct Compressor {
    threshold_db: f32,
    ratio: f32,
    attack_coef: f32,
    release_coef: f32,
    envelope: f32,
}

fn time_coefficient(secs: f32, sample_rate: f32) -> f32 {
    if secs <= 0.0 || sample_rate <= 0.0 {
        return 0.0;
    }
    (-1.0 / (secs * sample_rate)).exp()
}

impl Compressor {
    pub fn new(sample_rate: u32, params: &CompressorParams) -> Self {
        let sr = sample_rate as f32;
        Self {
            threshold_db: params.threshold,
            ratio: params.ratio.max(1.0),
            attack_coef: time_coefficient(params.attack, sr),
            release_coef: time_coefficient(params.release, sr),
            envelope: 0.0,
        }
    }

    #[inline]
    fn gain_for(&mut self, input_level: f32) -> f32 {
        let coef = if input_level > self.envelope {
            self.attack_coef
        } else {
            self.release_coef
        };
        self.envelope = coef * (self.envelope - input_level) + input_level;

        let env_db = 20.0 * self.envelope.max(1e-5).log10();
        if env_db <= self.threshold_db {
            return 1.0;
        }
        let reduction_db = (env_db - self.threshold_db) * (1.0 - 1.0 / self.ratio);
        10.0_f32.powf(-reduction_db / 20.0)
    }
}

impl EffectNode for Compressor {
    fn process(&mut self, buffer: &mut PcmBuffer) {
        let frames = buffer.frames();
        for i in 0..frames {
            let peak = buffer
                .channels
                .iter()
                .map(|ch| ch[i].abs())
                .fold(0.0, f32::max);
            let gain = self.gain_for(peak);
            for ch in buffer.channels.iter_mut() {
                ch[i] *= gain;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn constant(level: f32, n: usize) -> PcmBuffer {
        PcmBuffer {
            sample_rate: 48_000,
            channels: vec![vec![level; n]],
        }
    }

    #[test]
    fn quiet_signal_is_untouched() {
        let mut buf = constant(0.01, 4800);
        Compressor::new(48_000, &CompressorParams::default()).process(&mut buf);
        assert!(buf.channels[0].iter().all(|&s| s == 0.01));
    }

    #[test]
    fn loud_signal_settles_to_ratio() {
        // 0 dBFS into -20 dB threshold at 4:1 leaves -15 dB of reduction.
        let params = CompressorParams {
            threshold: -20.0,
            ratio: 4.0,
            attack: 0.0,
            release: 0.1,
        };
        let mut buf = constant(1.0, 4800);
        Compressor::new(48_000, &params).process(&mut buf);
        let settled = *buf.channels[0].last().unwrap();
        let expected = 10.0_f32.powf(-15.0 / 20.0);
        assert!((settled - expected).abs() < 1e-3, "{settled} vs {expected}");
    }

    #[test]
    fn unity_ratio_is_transparent() {
        let params = CompressorParams {
            ratio: 1.0,
            ..Default::default()
        };
        let mut buf = constant(0.9, 480);
        Compressor::new(48_000, &params).process(&mut buf);
        assert!(buf.channels[0].iter().all(|&s| (s - 0.9).abs() < 1e-6));
    }
}
