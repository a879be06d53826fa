// src/effects/equalizer.rs

use biquad::*;
use tracing::warn;

use super::graph::EffectNode;
use super::params::EqualizerParams;
use crate::blob::PcmBuffer;

pub const LOW_SHELF_HZ: f32 = 320.0;
pub const MID_PEAK_HZ: f32 = 1000.0;
pub const MID_PEAK_Q: f32 = 0.5;
pub const HIGH_SHELF_HZ: f32 = 3200.0;
const MIN_BAND_HZ: f32 = 20.0;

#[derive(Debug, Clone, Copy, PartialEq)]
enum BandShape {
    LowShelf,
    Peaking,
    HighShelf,
}

/// One biquad per channel sharing a single coefficient set.
struct EqBand {
    filters: Vec<DirectForm2Transposed<f32>>,
}

impl EqBand {
    fn new(sr: u32, channels: usize, shape: BandShape, freq: f32, q: f32, gain_db: f32) -> Option<Self> {
        // Freq must stay below Nyquist
        let ceiling = (sr as f32 / 2.0) - 1.0;
        if ceiling <= MIN_BAND_HZ {
            warn!(?shape, sr, "sample rate too low for eq band; skipped");
            return None;
        }
        let safe_freq = freq.clamp(MIN_BAND_HZ, ceiling);
        let safe_q = q.max(0.1);
        let kind = match shape {
            BandShape::LowShelf => Type::LowShelf(gain_db),
            BandShape::Peaking => Type::PeakingEQ(gain_db),
            BandShape::HighShelf => Type::HighShelf(gain_db),
        };

        match Coefficients::<f32>::from_params(kind, sr.hz(), safe_freq.hz(), safe_q) {
            Ok(coeffs) => Some(Self {
                filters: (0..channels)
                    .map(|_| DirectForm2Transposed::<f32>::new(coeffs))
                    .collect(),
            }),
            Err(e) => {
                warn!(?shape, freq = safe_freq, sr, error = ?e, "eq band skipped");
                None
            }
        }
    }

    #[inline]
    fn process(&mut self, sample: f32, channel: usize) -> f32 {
        match self.filters.get_mut(channel) {
            Some(filter) => {
                let out = filter.run(sample);
                // Denormal protection
                if out.abs() < 1e-20 { 0.0 } else { out }
            }
            None => sample,
        }
    }
}

/// Low shelf, mid peak and high shelf in series.
pub struct ThreeBandEq {
    bands: Vec<EqBand>,
}

impl ThreeBandEq {
    pub fn new(sr: u32, channels: usize, params: &EqualizerParams) -> Self {
        let bands = [
            (BandShape::LowShelf, LOW_SHELF_HZ, Q_BUTTERWORTH_F32, params.low_gain),
            (BandShape::Peaking, MID_PEAK_HZ, MID_PEAK_Q, params.mid_gain),
            (BandShape::HighShelf, HIGH_SHELF_HZ, Q_BUTTERWORTH_F32, params.high_gain),
        ]
        .into_iter()
        .filter_map(|(shape, freq, q, gain)| EqBand::new(sr, channels, shape, freq, q, gain))
        .collect();
        Self { bands }
    }
}

impl EffectNode for ThreeBandEq {
    fn process(&mut self, buffer: &mut PcmBuffer) {
        for (ch, samples) in buffer.channels.iter_mut().enumerate() {
            for sample in samples.iter_mut() {
                let mut s = *sample;
                for band in &mut self.bands {
                    s = band.process(s, ch);
                }
                *sample = s;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn sine(freq: f32, sr: u32, secs: f32) -> PcmBuffer {
        let n = (sr as f32 * secs) as usize;
        PcmBuffer {
            sample_rate: sr,
            channels: vec![(0..n)
                .map(|i| 0.25 * (2.0 * PI * freq * i as f32 / sr as f32).sin())
                .collect()],
        }
    }

    #[test]
    fn flat_settings_pass_signal_through() {
        let mut buf = sine(440.0, 44_100, 0.2);
        let original = buf.clone();
        ThreeBandEq::new(44_100, 1, &EqualizerParams::default()).process(&mut buf);
        let diff: f32 = buf.channels[0]
            .iter()
            .zip(&original.channels[0])
            .map(|(a, b)| (a - b).abs())
            .fold(0.0, f32::max);
        assert!(diff < 1e-3, "max deviation {diff}");
    }

    #[test]
    fn high_shelf_boost_raises_treble_not_bass() {
        let params = EqualizerParams {
            high_gain: 12.0,
            ..Default::default()
        };
        let mut treble = sine(8000.0, 44_100, 0.2);
        let mut bass = sine(100.0, 44_100, 0.2);
        let (t0, b0) = (treble.rms(), bass.rms());
        ThreeBandEq::new(44_100, 1, &params).process(&mut treble);
        ThreeBandEq::new(44_100, 1, &params).process(&mut bass);
        assert!(treble.rms() > t0 * 2.5);
        assert!((bass.rms() - b0).abs() < b0 * 0.1);
    }

    #[test]
    fn rates_below_the_band_floor_pass_through() {
        let params = EqualizerParams {
            low_gain: 12.0,
            mid_gain: 12.0,
            high_gain: 12.0,
        };
        let mut eq = ThreeBandEq::new(30, 1, &params);
        assert!(eq.bands.is_empty());
        let mut buf = sine(5.0, 30, 2.0);
        let original = buf.clone();
        eq.process(&mut buf);
        assert_eq!(buf, original);
    }
}
