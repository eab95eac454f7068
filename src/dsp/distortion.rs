//! Distortion stages — waveshaping and bit-crushing.

use crate::config::DistortionShape;

/// Stateless waveshaper: drive-scaled input through a clipping curve,
/// blended with the clean signal.
#[derive(Debug, Clone, Copy)]
pub struct Distortion {
    pub drive: f64,
    /// Clean/shaped blend [0, 1].
    pub mix: f64,
    pub shape: DistortionShape,
}

impl Distortion {
    pub fn new(drive: f64, mix: f64, shape: DistortionShape) -> Self {
        Self {
            drive: drive.max(0.0),
            mix: mix.clamp(0.0, 1.0),
            shape,
        }
    }

    #[inline]
    pub fn shape_sample(&self, input: f64) -> f64 {
        let driven = input * self.drive;
        let shaped = match self.shape {
            DistortionShape::Hard => driven.clamp(-1.0, 1.0),
            DistortionShape::Soft => driven.signum() * (1.0 - (-driven.abs()).exp()),
            DistortionShape::Arctangent => driven.atan() * std::f64::consts::FRAC_2_PI,
        };
        input * (1.0 - self.mix) + shaped * self.mix
    }

    /// Process an interleaved stereo buffer in-place.
    pub fn process_buffer(&self, buffer: &mut [f32]) {
        for sample in buffer.iter_mut() {
            *sample = self.shape_sample(*sample as f64) as f32;
        }
    }
}

/// Sample-and-hold bit reducer.
///
/// Captures a new value every `rate_reduction` samples, quantized to a
/// grid of `step = 0.5^bit_depth`, and holds it in between.
#[derive(Debug, Clone)]
pub struct BitCrusher {
    pub bit_depth: u32,
    pub rate_reduction: u32,

    hold_l: f32,
    hold_r: f32,
    counter: u32,
}

impl BitCrusher {
    pub fn new(bit_depth: u32, rate_reduction: u32) -> Self {
        Self {
            bit_depth: bit_depth.clamp(1, 24),
            rate_reduction: rate_reduction.max(1),
            hold_l: 0.0,
            hold_r: 0.0,
            counter: 0,
        }
    }

    #[inline]
    fn quantize(&self, input: f32) -> f32 {
        let step = (0.5_f64).powi(self.bit_depth as i32);
        ((input as f64 / step).round() * step) as f32
    }

    #[inline]
    pub fn process(&mut self, left: f32, right: f32) -> (f32, f32) {
        if self.counter == 0 {
            self.hold_l = self.quantize(left);
            self.hold_r = self.quantize(right);
        }
        self.counter = (self.counter + 1) % self.rate_reduction;
        (self.hold_l, self.hold_r)
    }

    /// Process an interleaved stereo buffer in-place.
    pub fn process_buffer(&mut self, buffer: &mut [f32]) {
        for frame in buffer.chunks_exact_mut(2) {
            let (l, r) = self.process(frame[0], frame[1]);
            frame[0] = l;
            frame[1] = r;
        }
    }

    pub fn clear(&mut self) {
        self.hold_l = 0.0;
        self.hold_r = 0.0;
        self.counter = 0;
    }
}
