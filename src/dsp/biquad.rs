//! Biquad filter — second-order IIR building block.
//!
//! Used by the equalizer (peaking bands) and the loudness meter's
//! perceptual weighting stage (high-pass + high-shelf). Coefficient
//! formulas from the Audio EQ Cookbook (Robert Bristow-Johnson).

use std::f64::consts::PI;

/// Filter response type.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BiquadKind {
    Highpass,
    Peaking,
    HighShelf,
}

/// A biquad IIR filter (2nd order, Direct Form II Transposed).
#[derive(Debug, Clone)]
pub struct BiquadFilter {
    pub kind: BiquadKind,
    pub frequency: f64,
    pub q: f64,
    /// Only used for Peaking and HighShelf.
    pub gain_db: f64,

    // Coefficients
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,

    // State
    z1: f64,
    z2: f64,

    sample_rate: f64,
    dirty: bool,
}

impl BiquadFilter {
    pub fn new(kind: BiquadKind, frequency: f64, q: f64, gain_db: f64, sample_rate: f64) -> Self {
        let mut f = BiquadFilter {
            kind,
            frequency,
            q,
            gain_db,
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
            a1: 0.0,
            a2: 0.0,
            z1: 0.0,
            z2: 0.0,
            sample_rate,
            dirty: true,
        };
        f.update_coefficients();
        f
    }

    /// Recompute filter coefficients from current parameters.
    pub fn update_coefficients(&mut self) {
        let w0 = 2.0 * PI * self.frequency / self.sample_rate;
        let cos_w0 = w0.cos();
        let sin_w0 = w0.sin();
        let alpha = sin_w0 / (2.0 * self.q);

        let (b0, b1, b2, a0, a1, a2) = match self.kind {
            BiquadKind::Highpass => {
                let b0 = (1.0 + cos_w0) / 2.0;
                let b1 = -(1.0 + cos_w0);
                let b2 = b0;
                let a0 = 1.0 + alpha;
                let a1 = -2.0 * cos_w0;
                let a2 = 1.0 - alpha;
                (b0, b1, b2, a0, a1, a2)
            }
            BiquadKind::Peaking => {
                let a_lin = (10.0_f64).powf(self.gain_db / 40.0);
                let b0 = 1.0 + alpha * a_lin;
                let b1 = -2.0 * cos_w0;
                let b2 = 1.0 - alpha * a_lin;
                let a0 = 1.0 + alpha / a_lin;
                let a1 = -2.0 * cos_w0;
                let a2 = 1.0 - alpha / a_lin;
                (b0, b1, b2, a0, a1, a2)
            }
            BiquadKind::HighShelf => {
                let a_lin = (10.0_f64).powf(self.gain_db / 40.0);
                let two_sqrt_a_alpha = 2.0 * a_lin.sqrt() * alpha;
                let b0 = a_lin * ((a_lin + 1.0) + (a_lin - 1.0) * cos_w0 + two_sqrt_a_alpha);
                let b1 = -2.0 * a_lin * ((a_lin - 1.0) + (a_lin + 1.0) * cos_w0);
                let b2 = a_lin * ((a_lin + 1.0) + (a_lin - 1.0) * cos_w0 - two_sqrt_a_alpha);
                let a0 = (a_lin + 1.0) - (a_lin - 1.0) * cos_w0 + two_sqrt_a_alpha;
                let a1 = 2.0 * ((a_lin - 1.0) - (a_lin + 1.0) * cos_w0);
                let a2 = (a_lin + 1.0) - (a_lin - 1.0) * cos_w0 - two_sqrt_a_alpha;
                (b0, b1, b2, a0, a1, a2)
            }
        };

        // Normalize by a0
        self.b0 = b0 / a0;
        self.b1 = b1 / a0;
        self.b2 = b2 / a0;
        self.a1 = a1 / a0;
        self.a2 = a2 / a0;
        self.dirty = false;
    }

    /// Process a single sample through the filter.
    pub fn process(&mut self, input: f64) -> f64 {
        if self.dirty {
            self.update_coefficients();
        }

        let output = self.b0 * input + self.z1;
        self.z1 = self.b1 * input - self.a1 * output + self.z2;
        self.z2 = self.b2 * input - self.a2 * output;
        output
    }

    /// Reset filter state.
    pub fn reset(&mut self) {
        self.z1 = 0.0;
        self.z2 = 0.0;
    }

    /// Set peaking/shelf gain and mark coefficients dirty.
    pub fn set_gain_db(&mut self, gain_db: f64) {
        self.gain_db = gain_db;
        self.dirty = true;
    }

    /// Magnitude response at `freq` Hz.
    ///
    /// Used by the spectral equalizer to reproduce this filter's gain
    /// shaping in the frequency domain.
    pub fn magnitude_at(&self, freq: f64) -> f64 {
        use rustfft::num_complex::Complex;
        let w = 2.0 * PI * freq / self.sample_rate;
        let z1 = Complex::new(0.0, -w).exp();
        let z2 = z1 * z1;
        let num = Complex::new(self.b0, 0.0) + z1 * self.b1 + z2 * self.b2;
        let den = Complex::new(1.0, 0.0) + z1 * self.a1 + z2 * self.a2;
        (num / den).norm()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn highpass_blocks_dc() {
        let mut f = BiquadFilter::new(BiquadKind::Highpass, 1000.0, 0.707, 0.0, 44100.0);

        // Feed DC — should converge to 0
        let mut output = 0.0;
        for _ in 0..1000 {
            output = f.process(1.0);
        }
        assert!(output.abs() < 0.001, "Highpass should block DC, got {output}");
    }

    #[test]
    fn peaking_boosts_center_frequency() {
        let mut f = BiquadFilter::new(BiquadKind::Peaking, 1000.0, 1.0, 6.0, 44100.0);

        // Measure steady-state amplitude of a 1 kHz sine
        let mut max_out = 0.0_f64;
        for i in 0..44100 {
            let t = i as f64 / 44100.0;
            let out = f.process((2.0 * PI * 1000.0 * t).sin());
            if i > 4410 {
                max_out = max_out.max(out.abs());
            }
        }
        let expected = (10.0_f64).powf(6.0 / 20.0);
        assert!(
            (max_out - expected).abs() < 0.1,
            "+6 dB peak at center should give ~{expected:.2}, got {max_out:.2}"
        );
    }

    #[test]
    fn peaking_unity_far_from_center() {
        let f = BiquadFilter::new(BiquadKind::Peaking, 1000.0, 1.0, 6.0, 44100.0);
        let mag = f.magnitude_at(20.0);
        assert!((mag - 1.0).abs() < 0.05, "Peaking should be ~unity at 20 Hz, got {mag}");
    }

    #[test]
    fn high_shelf_boosts_treble_only() {
        let f = BiquadFilter::new(BiquadKind::HighShelf, 1500.0, 0.707, 4.0, 48000.0);
        let low = f.magnitude_at(100.0);
        let high = f.magnitude_at(10000.0);
        assert!((low - 1.0).abs() < 0.1, "Shelf should be ~unity at 100 Hz, got {low}");
        let expected = (10.0_f64).powf(4.0 / 20.0);
        assert!(
            (high - expected).abs() < 0.1,
            "Shelf should boost 10 kHz to ~{expected:.2}, got {high:.2}"
        );
    }

    #[test]
    fn magnitude_matches_time_domain() {
        let probe_hz = 3000.0;
        let filter = BiquadFilter::new(BiquadKind::Peaking, 3000.0, 0.9, -9.0, 44100.0);
        let predicted = filter.magnitude_at(probe_hz);

        let mut f = filter.clone();
        let mut max_out = 0.0_f64;
        for i in 0..44100 {
            let t = i as f64 / 44100.0;
            let out = f.process((2.0 * PI * probe_hz * t).sin());
            if i > 4410 {
                max_out = max_out.max(out.abs());
            }
        }
        assert!(
            (max_out - predicted).abs() < 0.05,
            "Analytic magnitude {predicted:.3} should match measured {max_out:.3}"
        );
    }

    #[test]
    fn filter_output_finite() {
        let mut f = BiquadFilter::new(BiquadKind::Highpass, 38.0, 0.5, 0.0, 44100.0);
        for i in 0..10000 {
            let input = if i % 100 == 0 { 1.0 } else { 0.0 };
            let out = f.process(input);
            assert!(out.is_finite(), "Filter output not finite at sample {i}");
        }
    }
}
