//! Convolution reverb — overlap-add FFT convolution with a fixed
//! impulse response.
//!
//! The impulse response is loaded once from a WAV file; on any load
//! failure a synthetic exponentially-decaying noise impulse is
//! substituted so the effect never goes silently dead. Input is downmixed
//! to mono, convolved in 1024-sample segments, and the tail beyond each
//! segment is carried as overlap into the next block (across calls too).

use std::path::Path;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rustfft::num_complex::Complex;

use super::fft::{FftPair, complex_from_real};

/// Input segment length for overlap-add processing.
pub const SEGMENT: usize = 1024;

/// A mono impulse response and the rate it was recorded at.
#[derive(Debug, Clone)]
pub struct ImpulseResponse {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl ImpulseResponse {
    /// Load an impulse response, absorbing every failure.
    ///
    /// Missing or malformed files fall back to [`ImpulseResponse::synthetic`];
    /// over-long responses are truncated with a warning. A sample-rate
    /// mismatch against the engine rate is warned about but the samples
    /// are used as-is.
    pub fn load(path: &Path, max_seconds: f64, engine_rate: u32) -> Self {
        let mut ir = match Self::read_wav(path) {
            Ok(ir) if !ir.samples.is_empty() => ir,
            Ok(_) => {
                log::warn!("Impulse response {path:?} is empty; using synthetic impulse");
                return Self::synthetic(engine_rate, max_seconds.min(1.5));
            }
            Err(err) => {
                log::warn!("Failed to load impulse response {path:?}: {err}; using synthetic impulse");
                return Self::synthetic(engine_rate, max_seconds.min(1.5));
            }
        };

        let max_len = (max_seconds * ir.sample_rate as f64) as usize;
        if max_len > 0 && ir.samples.len() > max_len {
            log::warn!(
                "Impulse response {path:?} truncated from {} to {max_len} samples",
                ir.samples.len()
            );
            ir.samples.truncate(max_len);
        }
        if ir.sample_rate != engine_rate {
            log::warn!(
                "Impulse response {path:?} is {} Hz but the engine runs at {engine_rate} Hz; using without resampling",
                ir.sample_rate
            );
        }
        ir
    }

    fn read_wav(path: &Path) -> Result<Self, hound::Error> {
        let mut reader = hound::WavReader::open(path)?;
        let spec = reader.spec();
        let channels = spec.channels.max(1) as usize;

        let interleaved: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader.samples::<f32>().collect::<Result<_, _>>()?,
            hound::SampleFormat::Int => {
                let scale = 1.0 / (1_i64 << (spec.bits_per_sample - 1)) as f32;
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|v| v as f32 * scale))
                    .collect::<Result<_, _>>()?
            }
        };

        // Downmix to mono
        let samples = interleaved
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect();

        Ok(Self {
            samples,
            sample_rate: spec.sample_rate,
        })
    }

    /// Exponentially-decaying noise impulse, seeded for reproducibility.
    pub fn synthetic(sample_rate: u32, seconds: f64) -> Self {
        let len = ((seconds * sample_rate as f64) as usize).max(1);
        let mut rng = StdRng::seed_from_u64(0x5EED_1112);
        let decay = 6.9 / len as f64; // ~−60 dB over the tail
        let samples = (0..len)
            .map(|i| {
                let noise: f64 = rng.gen_range(-1.0..1.0);
                (noise * (-decay * i as f64).exp()) as f32
            })
            .collect();
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Streaming overlap-add convolution of a mono downmix.
pub struct ConvolutionReverb {
    fft: FftPair,
    impulse_spectrum: Vec<Complex<f64>>,
    /// Convolution tail carried into the next segment/call.
    tail: Vec<f64>,
    scratch: Vec<Complex<f64>>,

    /// Wet level (0.0 to 1.0).
    pub wet: f64,
    /// Dry level (0.0 to 1.0).
    pub dry: f64,
}

impl ConvolutionReverb {
    pub fn new(impulse: &ImpulseResponse, wet: f64, dry: f64) -> Self {
        let ir_len = impulse.len().max(1);
        let fft_size = (SEGMENT + ir_len - 1).next_power_of_two();
        let mut fft = FftPair::new(fft_size);

        let mut impulse_spectrum = complex_from_real(&impulse.samples, fft_size);
        fft.forward(&mut impulse_spectrum);

        Self {
            fft,
            impulse_spectrum,
            tail: vec![0.0; fft_size],
            scratch: vec![Complex::new(0.0, 0.0); fft_size],
            wet: wet.clamp(0.0, 1.0),
            dry: dry.clamp(0.0, 1.0),
        }
    }

    /// Process an interleaved stereo buffer in-place; the mono wet signal
    /// is mixed equally into both channels.
    pub fn process_buffer(&mut self, buffer: &mut [f32]) {
        let frames = buffer.len() / 2;
        if frames == 0 {
            return;
        }
        let mono: Vec<f64> = buffer
            .chunks_exact(2)
            .map(|f| (f[0] as f64 + f[1] as f64) * 0.5)
            .collect();

        let mut wet_out = vec![0.0_f64; frames];
        let fft_size = self.fft.size();

        let mut seg_start = 0;
        while seg_start < frames {
            let seg_len = SEGMENT.min(frames - seg_start);

            // Transform the zero-padded segment and multiply pointwise
            for slot in self.scratch.iter_mut() {
                *slot = Complex::new(0.0, 0.0);
            }
            for (slot, &s) in self.scratch.iter_mut().zip(&mono[seg_start..seg_start + seg_len]) {
                slot.re = s;
            }
            self.fft.forward(&mut self.scratch);
            for (bin, h) in self.scratch.iter_mut().zip(&self.impulse_spectrum) {
                *bin *= h;
            }
            self.fft.inverse(&mut self.scratch);

            // Emit this segment's output plus the carried tail
            for i in 0..seg_len {
                wet_out[seg_start + i] = self.scratch[i].re + self.tail[i];
            }
            // Slide the tail forward by seg_len and fold in the remainder
            for i in 0..fft_size {
                let carried = if i + seg_len < fft_size { self.tail[i + seg_len] } else { 0.0 };
                let fresh = if i + seg_len < fft_size { self.scratch[i + seg_len].re } else { 0.0 };
                self.tail[i] = carried + fresh;
            }

            seg_start += seg_len;
        }

        let wet = self.wet;
        let dry = self.dry;
        for (frame, &conv) in buffer.chunks_exact_mut(2).zip(&wet_out) {
            frame[0] = (frame[0] as f64 * dry + conv * wet) as f32;
            frame[1] = (frame[1] as f64 * dry + conv * wet) as f32;
        }
    }

    /// Drop the carried tail.
    pub fn clear(&mut self) {
        self.tail.fill(0.0);
    }
}

impl std::fmt::Debug for ConvolutionReverb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConvolutionReverb")
            .field("fft_size", &self.fft.size())
            .field("wet", &self.wet)
            .field("dry", &self.dry)
            .finish()
    }
}
