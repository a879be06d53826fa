// src/effects/delay.rs

use super::graph::EffectNode;
use super::params::DelayParams;
use crate::blob::PcmBuffer;

/// Single-tap feedback delay: `echo[n] = x[n-D] + feedback * echo[n-D]`,
/// output `dry * x + wet * echo`.
pub struct FeedbackDelay {
    delay_samples: usize,
    feedback: f32,
    wet: f32,
    dry: f32,
}

impl FeedbackDelay {
    pub fn new(sample_rate: u32, params: &DelayParams) -> Self {
        // A zero-length loop has no meaning; one sample is the shortest delay.
        let delay_samples = ((params.delay_time * sample_rate as f32).round() as usize).max(1);
        Self {
            delay_samples,
            feedback: params.feedback,
            wet: params.wet_level,
            dry: params.dry_level,
        }
    }
}

impl EffectNode for FeedbackDelay {
    fn process(&mut self, buffer: &mut PcmBuffer) {
        let d = self.delay_samples;
        for samples in buffer.channels.iter_mut() {
            let mut echo = vec![0.0f32; samples.len()];
            for n in d..samples.len() {
                echo[n] = samples[n - d] + self.feedback * echo[n - d];
            }
            for (s, e) in samples.iter_mut().zip(&echo) {
                *s = self.dry * *s + self.wet * e;
            }
        }
    }
}
