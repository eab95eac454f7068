//! Dynamics stages — DC-offset removal, compression, hard limiting.

/// One-pole DC blocker: `y[n] = x[n] − x[n−1] + α·y[n−1]`, α = 0.999,
/// independent state per channel.
#[derive(Debug, Clone, Default)]
pub struct DcBlocker {
    x1_l: f64,
    y1_l: f64,
    x1_r: f64,
    y1_r: f64,
}

const DC_ALPHA: f64 = 0.999;

impl DcBlocker {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn process(&mut self, left: f32, right: f32) -> (f32, f32) {
        let l = left as f64;
        let r = right as f64;
        let out_l = l - self.x1_l + DC_ALPHA * self.y1_l;
        let out_r = r - self.x1_r + DC_ALPHA * self.y1_r;
        self.x1_l = l;
        self.y1_l = out_l;
        self.x1_r = r;
        self.y1_r = out_r;
        (out_l as f32, out_r as f32)
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
        *self = Self::default();
    }
}

/// Stereo-linked compressor with a linear-domain envelope follower.
///
/// `coeff = 1 − exp(−1/(sample_rate · time))` per side of the follower;
/// above threshold the gain is `(threshold + (env − threshold)/ratio)/env`.
#[derive(Debug, Clone)]
pub struct Compressor {
    sample_rate: f64,

    /// Linear threshold [0, 1].
    pub threshold: f64,
    /// Compression ratio (e.g. 4.0 = 4:1).
    pub ratio: f64,
    /// Attack time in seconds.
    pub attack: f64,
    /// Release time in seconds.
    pub release: f64,

    envelope: f64,
}

impl Compressor {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            sample_rate,
            threshold: 0.5,
            ratio: 4.0,
            attack: 0.005,
            release: 0.1,
            envelope: 0.0,
        }
    }

    pub fn with_params(sample_rate: f64, threshold: f64, ratio: f64, attack: f64, release: f64) -> Self {
        let mut c = Self::new(sample_rate);
        c.threshold = threshold.clamp(0.0, 1.0);
        c.ratio = ratio.clamp(1.0, 20.0);
        c.attack = attack.clamp(0.0001, 1.0);
        c.release = release.clamp(0.001, 5.0);
        c
    }

    #[inline]
    fn follower_coeff(&self, time: f64) -> f64 {
        1.0 - (-1.0 / (self.sample_rate * time)).exp()
    }

    #[inline]
    pub fn process(&mut self, left: f32, right: f32) -> (f32, f32) {
        let level = (left.abs()).max(right.abs()) as f64;

        let coeff = if level > self.envelope {
            self.follower_coeff(self.attack)
        } else {
            self.follower_coeff(self.release)
        };
        self.envelope += coeff * (level - self.envelope);

        let gain = if self.envelope > self.threshold {
            (self.threshold + (self.envelope - self.threshold) / self.ratio) / self.envelope
        } else {
            1.0
        } as f32;

        (left * gain, right * gain)
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
        self.envelope = 0.0;
    }
}

/// Hard limiter: clamps every sample to ±threshold.
#[derive(Debug, Clone, Copy)]
pub struct Limiter {
    pub threshold: f64,
}

impl Limiter {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold: threshold.clamp(0.0, 1.0),
        }
    }

    /// Process an interleaved stereo buffer in-place.
    pub fn process_buffer(&self, buffer: &mut [f32]) {
        let t = self.threshold as f32;
        for sample in buffer.iter_mut() {
            *sample = sample.clamp(-t, t);
        }
    }
}
