// src/effects/reverb.rs

use rand::Rng;
use rustfft::{FftPlanner, num_complex::Complex};

use super::graph::EffectNode;
use super::params::ReverbParams;
use crate::blob::PcmBuffer;

/// Longest impulse response, reached at `room_size == 1`.
pub const MAX_IR_SECS: f32 = 4.0;

/// Convolution reverb over a synthetic impulse response. The response is
/// fresh noise on every construction, so two renders with the same settings
/// match in energy but not sample for sample.
pub struct ConvolutionReverb {
    params: ReverbParams,
    impulse: Vec<Vec<f32>>,
}

impl ConvolutionReverb {
    pub fn new(sample_rate: u32, channels: usize, params: &ReverbParams) -> Self {
        let len = ((params.room_size * MAX_IR_SECS * sample_rate as f32) as usize).max(1);
        let impulse = (0..channels.max(1))
            .map(|_| synth_impulse(len, params.damping))
            .collect();
        Self {
            params: *params,
            impulse,
        }
    }

    pub fn impulse_len(&self) -> usize {
        self.impulse.first().map_or(0, Vec::len)
    }
}

/// Exponentially decaying white noise, scaled to unit energy. `damping`
/// sets how many time constants fit into the response.
fn synth_impulse(len: usize, damping: f32) -> Vec<f32> {
    let mut rng = rand::rng();
    let decay = 1.0 + 9.0 * damping;
    let mut ir: Vec<f32> = (0..len)
        .map(|n| {
            let t = n as f32 / len as f32;
            rng.random_range(-1.0f32..1.0) * (-decay * t).exp()
        })
        .collect();

    let energy: f32 = ir.iter().map(|s| s * s).sum();
    if energy > 0.0 {
        let scale = energy.sqrt().recip();
        ir.iter_mut().for_each(|s| *s *= scale);
    }
    ir
}

/// Linear convolution via FFT, truncated to `signal.len()`.
fn convolve(signal: &[f32], ir: &[f32], planner: &mut FftPlanner<f32>) -> Vec<f32> {
    if signal.is_empty() || ir.is_empty() {
        return vec![0.0; signal.len()];
    }
    let ir = &ir[..ir.len().min(signal.len())];
    let n = (signal.len() + ir.len() - 1).next_power_of_two();
    let fft = planner.plan_fft_forward(n);
    let ifft = planner.plan_fft_inverse(n);

    let to_complex = |src: &[f32]| -> Vec<Complex<f32>> {
        let mut v: Vec<Complex<f32>> = src.iter().map(|&re| Complex { re, im: 0.0 }).collect();
        v.resize(n, Complex { re: 0.0, im: 0.0 });
        v
    };
    let mut a = to_complex(signal);
    let mut b = to_complex(ir);
    fft.process(&mut a);
    fft.process(&mut b);
    for (x, y) in a.iter_mut().zip(b.iter()) {
        *x *= *y;
    }
    ifft.process(&mut a);

    let scale = 1.0 / n as f32;
    a.iter().take(signal.len()).map(|c| c.re * scale).collect()
}

impl EffectNode for ConvolutionReverb {
    fn process(&mut self, buffer: &mut PcmBuffer) {
        let mut planner = FftPlanner::new();
        let ReverbParams {
            wet_level,
            dry_level,
            ..
        } = self.params;

        for (ch, samples) in buffer.channels.iter_mut().enumerate() {
            let ir = &self.impulse[ch.min(self.impulse.len() - 1)];
            let wet = convolve(samples, ir, &mut planner);
            for (s, w) in samples.iter_mut().zip(wet) {
                *s = dry_level * *s + wet_level * w;
            }
        }
    }
}
