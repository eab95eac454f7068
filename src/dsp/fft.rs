//! FFT helpers — shared forward/inverse transform pair for the
//! convolution reverb and the spectral equalizer.
//!
//! Backed by `rustfft`. The inverse is scaled by `1/N` so a
//! forward/inverse round trip is the identity.

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::sync::Arc;

/// A matched forward/inverse FFT of a fixed size.
pub struct FftPair {
    size: usize,
    fft: Arc<dyn Fft<f64>>,
    ifft: Arc<dyn Fft<f64>>,
    scratch: Vec<Complex<f64>>,
}

impl FftPair {
    pub fn new(size: usize) -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(size);
        let ifft = planner.plan_fft_inverse(size);
        let scratch_len = fft
            .get_inplace_scratch_len()
            .max(ifft.get_inplace_scratch_len());
        Self {
            size,
            fft,
            ifft,
            scratch: vec![Complex::new(0.0, 0.0); scratch_len],
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// In-place forward transform.
    pub fn forward(&mut self, buffer: &mut [Complex<f64>]) {
        debug_assert_eq!(buffer.len(), self.size);
        self.fft.process_with_scratch(buffer, &mut self.scratch);
    }

    /// In-place inverse transform, scaled by `1/N`.
    pub fn inverse(&mut self, buffer: &mut [Complex<f64>]) {
        debug_assert_eq!(buffer.len(), self.size);
        self.ifft.process_with_scratch(buffer, &mut self.scratch);
        let scale = 1.0 / self.size as f64;
        for c in buffer.iter_mut() {
            *c *= scale;
        }
    }
}

impl std::fmt::Debug for FftPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FftPair").field("size", &self.size).finish()
    }
}

/// Lift a real signal into a zero-padded complex buffer of length `size`.
pub fn complex_from_real(signal: &[f32], size: usize) -> Vec<Complex<f64>> {
    let mut buffer = vec![Complex::new(0.0, 0.0); size];
    for (slot, &s) in buffer.iter_mut().zip(signal.iter()) {
        slot.re = s as f64;
    }
    buffer
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_is_identity() {
        for &size in &[64usize, 256, 1024] {
            let mut fft = FftPair::new(size);
            let signal: Vec<f32> = (0..size).map(|i| ((i as f32) * 0.37).sin()).collect();
            let mut buffer = complex_from_real(&signal, size);
            fft.forward(&mut buffer);
            fft.inverse(&mut buffer);
            for (i, (&orig, c)) in signal.iter().zip(buffer.iter()).enumerate() {
                assert!(
                    (orig as f64 - c.re).abs() < 1e-9,
                    "Round trip mismatch at {i} (size {size}): {orig} vs {}",
                    c.re
                );
                assert!(c.im.abs() < 1e-9, "Imaginary residue at {i}: {}", c.im);
            }
        }
    }

    #[test]
    fn impulse_has_flat_spectrum() {
        let size = 128;
        let mut fft = FftPair::new(size);
        let mut signal = vec![0.0_f32; size];
        signal[0] = 1.0;
        let mut buffer = complex_from_real(&signal, size);
        fft.forward(&mut buffer);
        for (i, c) in buffer.iter().enumerate() {
            assert!(
                (c.norm() - 1.0).abs() < 1e-9,
                "Delta spectrum should be flat, bin {i} = {}",
                c.norm()
            );
        }
    }
}
