//! Algorithmic reverb — Schroeder design: parallel comb filters feeding
//! series all-pass diffusers.
//!
//! Input is downmixed to mono, run through 8 combs and 4 all-passes, and
//! mixed back with a stereo width term. Comb feedback follows the RT60
//! law `10^(−3·delay / (room_size · sample_rate))`, so `room_size` is the
//! decay time constant in seconds.

/// A comb filter delay line with damped feedback.
#[derive(Debug, Clone)]
struct CombFilter {
    buffer: Vec<f32>,
    index: usize,
    feedback: f32,
    damp1: f32,
    damp2: f32,
    filterstore: f32,
}

impl CombFilter {
    fn new(size: usize, feedback: f32, damp: f32) -> Self {
        Self {
            buffer: vec![0.0; size.max(1)],
            index: 0,
            feedback,
            damp1: damp,
            damp2: 1.0 - damp,
            filterstore: 0.0,
        }
    }

    #[inline]
    fn process(&mut self, input: f32) -> f32 {
        let output = self.buffer[self.index];

        // One-pole lowpass in the feedback path (damping)
        self.filterstore = output * self.damp2 + self.filterstore * self.damp1;

        self.buffer[self.index] = input + self.filterstore * self.feedback;
        self.index = (self.index + 1) % self.buffer.len();

        output
    }

    fn set_damp(&mut self, damp: f32) {
        self.damp1 = damp;
        self.damp2 = 1.0 - damp;
    }

    fn clear(&mut self) {
        self.buffer.fill(0.0);
        self.filterstore = 0.0;
    }
}

/// An all-pass diffusion filter.
#[derive(Debug, Clone)]
struct AllpassFilter {
    buffer: Vec<f32>,
    index: usize,
    feedback: f32,
}

impl AllpassFilter {
    fn new(size: usize) -> Self {
        Self {
            buffer: vec![0.0; size.max(1)],
            index: 0,
            feedback: 0.5,
        }
    }

    #[inline]
    fn process(&mut self, input: f32) -> f32 {
        let bufout = self.buffer[self.index];
        let output = bufout - input;

        self.buffer[self.index] = input + bufout * self.feedback;
        self.index = (self.index + 1) % self.buffer.len();

        output
    }

    fn clear(&mut self) {
        self.buffer.fill(0.0);
    }
}

// Tap lengths in samples at 44100 Hz
const COMB_TUNING: [usize; 8] = [1116, 1188, 1277, 1356, 1422, 1491, 1557, 1617];
const ALLPASS_TUNING: [usize; 4] = [225, 556, 441, 341];

/// Mono-in, width-out Schroeder reverb.
#[derive(Debug, Clone)]
pub struct SchroederReverb {
    combs: Vec<CombFilter>,
    allpasses: Vec<AllpassFilter>,
    comb_delays: Vec<usize>,

    /// Decay time constant in seconds. Longer = longer tail.
    pub room_size: f64,
    /// High-frequency damping (0.0 to 1.0).
    pub damping: f64,
    /// Wet level (0.0 to 1.0).
    pub wet: f64,
    /// Dry level (0.0 to 1.0).
    pub dry: f64,
    /// Stereo width term; left wet is scaled by (1 − width), right by (1 + width).
    pub width: f64,

    sample_rate: f64,
}

impl SchroederReverb {
    pub fn new(sample_rate: f64) -> Self {
        let scale = sample_rate / 44100.0;
        let comb_delays: Vec<usize> = COMB_TUNING
            .iter()
            .map(|&t| ((t as f64) * scale) as usize)
            .collect();

        let combs: Vec<_> = comb_delays
            .iter()
            .map(|&size| CombFilter::new(size, 0.8, 0.2))
            .collect();

        let allpasses: Vec<_> = ALLPASS_TUNING
            .iter()
            .map(|&t| AllpassFilter::new(((t as f64) * scale) as usize))
            .collect();

        let mut reverb = Self {
            combs,
            allpasses,
            comb_delays,
            room_size: 0.5,
            damping: 0.5,
            wet: 0.3,
            dry: 0.7,
            width: 0.5,
            sample_rate,
        };
        reverb.update_parameters();
        reverb
    }

    /// Create a reverb with specific parameters.
    pub fn with_params(sample_rate: f64, room_size: f64, damping: f64, wet: f64, dry: f64, width: f64) -> Self {
        let mut r = Self::new(sample_rate);
        r.room_size = room_size.clamp(0.05, 10.0);
        r.damping = damping.clamp(0.0, 1.0);
        r.wet = wet.clamp(0.0, 1.0);
        r.dry = dry.clamp(0.0, 1.0);
        r.width = width.clamp(0.0, 1.0);
        r.update_parameters();
        r
    }

    /// Update comb feedback and damping after a parameter change.
    pub fn update_parameters(&mut self) {
        let damp = self.damping as f32;
        for (comb, &delay) in self.combs.iter_mut().zip(self.comb_delays.iter()) {
            let exponent = -3.0 * delay as f64 / (self.room_size * self.sample_rate);
            comb.feedback = (10.0_f64).powf(exponent) as f32;
            comb.set_damp(damp);
        }
    }

    /// Process a stereo sample pair.
    #[inline]
    pub fn process(&mut self, left: f32, right: f32) -> (f32, f32) {
        let input = (left + right) * 0.5;

        let mut comb_sum = 0.0f32;
        for comb in &mut self.combs {
            comb_sum += comb.process(input);
        }
        let mut wet_signal = comb_sum / self.combs.len() as f32;

        for allpass in &mut self.allpasses {
            wet_signal = allpass.process(wet_signal);
        }

        let wet = self.wet as f32;
        let dry = self.dry as f32;
        let width = self.width as f32;

        let out_l = left * dry + wet_signal * wet * (1.0 - width);
        let out_r = right * dry + wet_signal * wet * (1.0 + width);

        (out_l, out_r)
    }

    /// Process an interleaved stereo buffer in-place.
    pub fn process_buffer(&mut self, buffer: &mut [f32]) {
        for frame in buffer.chunks_exact_mut(2) {
            let (l, r) = self.process(frame[0], frame[1]);
            frame[0] = l;
            frame[1] = r;
        }
    }

    /// Clear all internal delay lines.
    pub fn clear(&mut self) {
        for comb in &mut self.combs {
            comb.clear();
        }
        for allpass in &mut self.allpasses {
            allpass.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passthrough_when_fully_dry() {
        let mut reverb = SchroederReverb::with_params(44100.0, 0.5, 0.5, 0.0, 1.0, 0.5);

        let (out_l, out_r) = reverb.process(0.5, -0.5);
        assert!((out_l - 0.5).abs() < 1e-6);
        assert!((out_r - (-0.5)).abs() < 1e-6);
    }

    #[test]
    fn impulse_produces_tail() {
        let mut reverb = SchroederReverb::with_params(44100.0, 0.8, 0.5, 1.0, 0.0, 0.0);

        reverb.process(1.0, 1.0);

        let mut found_tail = false;
        for _ in 0..5000 {
            let (out_l, out_r) = reverb.process(0.0, 0.0);
            if out_l.abs() > 0.001 || out_r.abs() > 0.001 {
                found_tail = true;
                break;
            }
        }
        assert!(found_tail, "Reverb should produce a tail after an impulse");
    }

    #[test]
    fn tail_decays_over_time() {
        let mut reverb = SchroederReverb::with_params(44100.0, 0.3, 0.5, 1.0, 0.0, 0.0);

        reverb.process(1.0, 1.0);

        let mut early_max = 0.0f32;
        for _ in 0..22050 {
            let (out_l, out_r) = reverb.process(0.0, 0.0);
            early_max = early_max.max(out_l.abs().max(out_r.abs()));
        }
        assert!(early_max > 0.0, "Reverb should have some output");

        let mut late_max = 0.0f32;
        for _ in 0..88200 {
            let (out_l, out_r) = reverb.process(0.0, 0.0);
            late_max = late_max.max(out_l.abs().max(out_r.abs()));
        }
        assert!(
            late_max < early_max * 0.5,
            "Tail should decay: early {early_max}, late {late_max}"
        );
    }

    #[test]
    fn width_skews_wet_signal_between_channels() {
        let mut reverb = SchroederReverb::with_params(44100.0, 0.5, 0.5, 1.0, 0.0, 1.0);

        reverb.process(1.0, 1.0);
        let mut sum_l = 0.0f64;
        let mut sum_r = 0.0f64;
        for _ in 0..22050 {
            let (out_l, out_r) = reverb.process(0.0, 0.0);
            sum_l += (out_l as f64).abs();
            sum_r += (out_r as f64).abs();
        }
        // With width = 1, the left wet term (1 − width) vanishes
        assert!(sum_l < 1e-9, "Left wet should be silent at width 1, got {sum_l}");
        assert!(sum_r > 0.0, "Right wet should carry the tail");
    }

    #[test]
    fn longer_room_size_decays_slower() {
        let measure = |room_size: f64| {
            let mut reverb = SchroederReverb::with_params(44100.0, room_size, 0.2, 1.0, 0.0, 0.0);
            reverb.process(1.0, 1.0);
            for _ in 0..44100 {
                reverb.process(0.0, 0.0);
            }
            let mut tail = 0.0f32;
            for _ in 0..4410 {
                let (l, r) = reverb.process(0.0, 0.0);
                tail = tail.max(l.abs().max(r.abs()));
            }
            tail
        };
        let short = measure(0.2);
        let long = measure(2.0);
        assert!(
            long > short,
            "Larger room size should sustain the tail longer: short {short}, long {long}"
        );
    }

    #[test]
    fn clear_silences_tail() {
        let mut reverb = SchroederReverb::with_params(44100.0, 0.8, 0.5, 1.0, 0.0, 0.0);
        reverb.process(1.0, 1.0);
        for _ in 0..2000 {
            reverb.process(0.0, 0.0);
        }
        reverb.clear();
        let (out_l, out_r) = reverb.process(0.0, 0.0);
        assert_eq!(out_l, 0.0);
        assert_eq!(out_r, 0.0);
    }
}
