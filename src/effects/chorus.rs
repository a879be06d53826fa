// src/effects/chorus.rs

use std::f32::consts::PI;

use super::graph::EffectNode;
use super::params::ChorusParams;
use crate::blob::PcmBuffer;

const BASE_DELAY_SECS: f32 = 0.025;
const MAX_SWEEP_SECS: f32 = 0.010;

/// Short delay line swept by a sine LFO, mixed with the dry signal.
pub struct Chorus {
    sample_rate: f32,
    params: ChorusParams,
}

impl Chorus {
    pub fn new(sample_rate: u32, params: &ChorusParams) -> Self {
        Self {
            sample_rate: sample_rate as f32,
            params: *params,
        }
    }

    fn delay_at(&self, n: usize) -> f32 {
        let t = n as f32 / self.sample_rate;
        let sweep = self.params.depth * MAX_SWEEP_SECS;
        (BASE_DELAY_SECS + sweep * (2.0 * PI * self.params.rate * t).sin()) * self.sample_rate
    }
}

/// Linear interpolation; silence before the start of the signal.
#[inline]
fn read_fractional(samples: &[f32], pos: f32) -> f32 {
    let floor = pos.floor();
    let frac = pos - floor;
    let at = |i: f32| -> f32 {
        if i < 0.0 {
            0.0
        } else {
            samples.get(i as usize).copied().unwrap_or(0.0)
        }
    };
    let a = at(floor);
    let b = at(floor + 1.0);
    a + (b - a) * frac
}

impl EffectNode for Chorus {
    fn process(&mut self, buffer: &mut PcmBuffer) {
        if self.sample_rate <= 0.0 {
            return;
        }
        let ChorusParams {
            wet_level,
            dry_level,
            ..
        } = self.params;
        let delays: Vec<f32> = (0..buffer.frames()).map(|n| self.delay_at(n)).collect();

        for samples in buffer.channels.iter_mut() {
            let source = samples.clone();
            for (n, s) in samples.iter_mut().enumerate() {
                let wet = read_fractional(&source, n as f32 - delays[n]);
                *s = dry_level * source[n] + wet_level * wet;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interpolates_between_samples() {
        let s = [0.0, 1.0, 0.0];
        assert_eq!(read_fractional(&s, 0.5), 0.5);
        assert_eq!(read_fractional(&s, -1.0), 0.0);
        assert_eq!(read_fractional(&s, 5.0), 0.0);
    }

    #[test]
    fn zero_depth_is_a_fixed_delay() {
        let params = ChorusParams {
            rate: 2.0,
            depth: 0.0,
            wet_level: 1.0,
            dry_level: 0.0,
        };
        let mut buf = PcmBuffer::silent(1000, 1, 60);
        buf.channels[0][0] = 1.0;
        Chorus::new(1000, &params).process(&mut buf);
        // 25 ms at 1 kHz
        let out = &buf.channels[0];
        assert!((out[25] - 1.0).abs() < 1e-3);
        assert!(out[..24].iter().all(|&s| s == 0.0));
        assert!((out.iter().sum::<f32>() - 1.0).abs() < 1e-3);
    }
}
