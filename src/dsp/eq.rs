//! Parametric equalizer — three peaking bands (bass / mid / treble).
//!
//! The CPU path cascades RBJ peaking biquads per channel. The spectral
//! path (used by compute devices) applies the same gain shaping in the
//! frequency domain: each FFT bin is scaled by the product of the three
//! band magnitude responses.

use super::biquad::{BiquadFilter, BiquadKind};
use super::fft::{FftPair, complex_from_real};
use crate::config::EqualizerConfig;

/// One peaking band of the equalizer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EqBand {
    pub freq: f64,
    pub gain_db: f64,
    pub q: f64,
}

/// Three cascaded peaking biquads per channel.
#[derive(Debug, Clone)]
pub struct Equalizer {
    left: Vec<BiquadFilter>,
    right: Vec<BiquadFilter>,
}

impl Equalizer {
    pub fn new(config: &EqualizerConfig, sample_rate: f64) -> Self {
        let make = |band: &EqBand| {
            BiquadFilter::new(BiquadKind::Peaking, band.freq, band.q, band.gain_db, sample_rate)
        };
        let bands = Self::bands(config);
        Self {
            left: bands.iter().map(make).collect(),
            right: bands.iter().map(make).collect(),
        }
    }

    /// The three bands described by a config.
    pub fn bands(config: &EqualizerConfig) -> [EqBand; 3] {
        [
            EqBand {
                freq: config.bass_freq,
                gain_db: config.bass_gain_db,
                q: config.q,
            },
            EqBand {
                freq: config.mid_freq,
                gain_db: config.mid_gain_db,
                q: config.q,
            },
            EqBand {
                freq: config.treble_freq,
                gain_db: config.treble_gain_db,
                q: config.q,
            },
        ]
    }

    /// Process an interleaved stereo buffer in-place.
    pub fn process_buffer(&mut self, buffer: &mut [f32]) {
        for frame in buffer.chunks_exact_mut(2) {
            let mut l = frame[0] as f64;
            let mut r = frame[1] as f64;
            for band in self.left.iter_mut() {
                l = band.process(l);
            }
            for band in self.right.iter_mut() {
                r = band.process(r);
            }
            frame[0] = l as f32;
            frame[1] = r as f32;
        }
    }

    pub fn clear(&mut self) {
        for band in self.left.iter_mut().chain(self.right.iter_mut()) {
            band.reset();
        }
    }
}

/// Frequency-domain EQ over a whole interleaved buffer.
///
/// Each channel is zero-padded to a power of two, transformed, scaled per
/// bin by the product of the three band magnitudes, and transformed back.
/// This is the math a compute-device `SpectralEq` kernel performs.
pub fn spectral_equalize(input: &[f32], output: &mut [f32], bands: &[EqBand; 3], sample_rate: f64) {
    let frames = input.len() / 2;
    if frames == 0 {
        return;
    }
    let fft_size = frames.next_power_of_two();
    let mut fft = FftPair::new(fft_size);

    // Per-bin gains up to Nyquist; upper bins mirror
    let filters: Vec<BiquadFilter> = bands
        .iter()
        .map(|b| BiquadFilter::new(BiquadKind::Peaking, b.freq, b.q, b.gain_db, sample_rate))
        .collect();
    let half = fft_size / 2;
    let gains: Vec<f64> = (0..=half)
        .map(|k| {
            let freq = k as f64 * sample_rate / fft_size as f64;
            filters.iter().map(|f| f.magnitude_at(freq)).product()
        })
        .collect();

    for channel in 0..2 {
        let mono: Vec<f32> = input.iter().skip(channel).step_by(2).copied().collect();
        let mut spectrum = complex_from_real(&mono, fft_size);
        fft.forward(&mut spectrum);
        for (k, bin) in spectrum.iter_mut().enumerate() {
            let idx = if k <= half { k } else { fft_size - k };
            *bin *= gains[idx];
        }
        fft.inverse(&mut spectrum);
        for (i, c) in spectrum.iter().take(frames).enumerate() {
            output[2 * i + channel] = c.re as f32;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn config(bass: f64, mid: f64, treble: f64) -> EqualizerConfig {
        EqualizerConfig {
            enabled: true,
            bass_gain_db: bass,
            mid_gain_db: mid,
            treble_gain_db: treble,
            ..Default::default()
        }
    }

    fn sine_buffer(freq: f64, frames: usize, sample_rate: f64) -> Vec<f32> {
        (0..frames)
            .flat_map(|i| {
                let s = (2.0 * PI * freq * i as f64 / sample_rate).sin() as f32;
                [s, s]
            })
            .collect()
    }

    fn steady_peak(buffer: &[f32]) -> f32 {
        // Skip the first quarter to let the filters settle
        buffer[buffer.len() / 4..]
            .iter()
            .fold(0.0_f32, |m, &s| m.max(s.abs()))
    }

    #[test]
    fn flat_eq_is_transparent() {
        let mut eq = Equalizer::new(&config(0.0, 0.0, 0.0), 44100.0);
        let mut buffer = sine_buffer(440.0, 4096, 44100.0);
        let original = buffer.clone();
        eq.process_buffer(&mut buffer);
        for (a, b) in original.iter().zip(buffer.iter()) {
            assert!((a - b).abs() < 1e-5, "0 dB EQ should be transparent");
        }
    }

    #[test]
    fn mid_boost_raises_mid_band() {
        let sample_rate = 44100.0;
        let mut eq = Equalizer::new(&config(0.0, 6.0, 0.0), sample_rate);
        let mut buffer = sine_buffer(1000.0, 44100, sample_rate);
        eq.process_buffer(&mut buffer);
        let peak = steady_peak(&buffer);
        let expected = (10.0_f32).powf(6.0 / 20.0);
        assert!(
            (peak - expected).abs() < 0.1,
            "+6 dB mid band should lift 1 kHz to ~{expected:.2}, got {peak:.2}"
        );
    }

    #[test]
    fn bass_cut_leaves_treble_untouched() {
        let sample_rate = 44100.0;
        let mut eq = Equalizer::new(&config(-12.0, 0.0, 0.0), sample_rate);
        let mut buffer = sine_buffer(6000.0, 44100, sample_rate);
        eq.process_buffer(&mut buffer);
        let peak = steady_peak(&buffer);
        assert!(
            (peak - 1.0).abs() < 0.05,
            "Bass cut should not touch 6 kHz, got {peak:.3}"
        );
    }

    #[test]
    fn spectral_flat_is_identity() {
        let bands = Equalizer::bands(&config(0.0, 0.0, 0.0));
        let input = sine_buffer(440.0, 2048, 44100.0);
        let mut output = vec![0.0_f32; input.len()];
        spectral_equalize(&input, &mut output, &bands, 44100.0);
        for (i, (a, b)) in input.iter().zip(output.iter()).enumerate() {
            assert!((a - b).abs() < 1e-4, "Flat spectral EQ should be identity at {i}");
        }
    }

    #[test]
    fn spectral_gain_matches_biquad_gain_at_band_center() {
        let sample_rate = 44100.0;
        let cfg = config(0.0, 9.0, 0.0);
        let bands = Equalizer::bands(&cfg);

        // A long steady sine at the mid center frequency
        let input = sine_buffer(1000.0, 32768, sample_rate);
        let mut output = vec![0.0_f32; input.len()];
        spectral_equalize(&input, &mut output, &bands, sample_rate);
        let spectral_peak = steady_peak(&output);

        let mut eq = Equalizer::new(&cfg, sample_rate);
        let mut cpu = input.clone();
        eq.process_buffer(&mut cpu);
        let cpu_peak = steady_peak(&cpu);

        assert!(
            (spectral_peak - cpu_peak).abs() < 0.15,
            "Spectral ({spectral_peak:.3}) and biquad ({cpu_peak:.3}) gains should agree at band center"
        );
    }
}
