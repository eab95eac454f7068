//! Audio meter — peak/RMS/VU levels and gated loudness measurement.
//!
//! Pure analysis: buffers are never mutated. Levels are tracked per
//! channel with an exponential peak and a smoothed dB-domain VU. The
//! loudness meter approximates the standard gated measurement: a
//! perceptual weighting pre-filter (high-pass ≈38 Hz, then a +4 dB
//! high-shelf ≈1500 Hz), 400 ms momentary and 3 s short-term energy
//! windows, an absolute gate at −70, and a second relative gate 10 dB
//! under the absolute-gated mean for the integrated value.

use super::biquad::{BiquadFilter, BiquadKind};

/// Peak decay factor applied once per processed block.
const PEAK_DECAY: f64 = 0.999;
/// Absolute gate threshold in loudness units.
const ABSOLUTE_GATE_LUFS: f64 = -70.0;
/// Relative gate offset below the absolute-gated mean.
const RELATIVE_GATE_LU: f64 = 10.0;
/// Reported floor for silence.
const SILENCE_LUFS: f64 = -70.0;
/// VU floor in dB.
const VU_FLOOR_DB: f64 = -100.0;

/// A point-in-time reading of every level the meter tracks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeterSnapshot {
    pub peak_l: f64,
    pub peak_r: f64,
    pub rms_l: f64,
    pub rms_r: f64,
    /// Smoothed VU in dB.
    pub vu_l: f64,
    pub vu_r: f64,
    pub momentary_lufs: f64,
    pub short_term_lufs: f64,
    pub integrated_lufs: f64,
}

/// Convert a mean weighted energy to loudness units.
#[inline]
fn energy_to_lufs(mean_energy: f64) -> f64 {
    if mean_energy > 0.0 {
        -0.691 + 10.0 * mean_energy.log10()
    } else {
        f64::NEG_INFINITY
    }
}

/// The nested gated-loudness meter.
struct LoudnessMeter {
    weight_hp_l: BiquadFilter,
    weight_hp_r: BiquadFilter,
    weight_shelf_l: BiquadFilter,
    weight_shelf_r: BiquadFilter,

    /// Per-frame weighted energies over the short-term window.
    ring: Vec<f64>,
    pos: usize,
    momentary_len: usize,
    sum_momentary: f64,
    sum_short: f64,
    frames_seen: u64,

    /// Gating hop in frames (100 ms).
    hop_len: usize,
    hop_counter: usize,
    /// Absolute-gated momentary energies for integrated loudness.
    gated_blocks: Vec<f64>,
}

impl LoudnessMeter {
    fn new(sample_rate: f64) -> Self {
        let momentary_len = (0.4 * sample_rate) as usize;
        let short_len = (3.0 * sample_rate) as usize;
        Self {
            weight_hp_l: BiquadFilter::new(BiquadKind::Highpass, 38.0, 0.5, 0.0, sample_rate),
            weight_hp_r: BiquadFilter::new(BiquadKind::Highpass, 38.0, 0.5, 0.0, sample_rate),
            weight_shelf_l: BiquadFilter::new(BiquadKind::HighShelf, 1500.0, 0.707, 4.0, sample_rate),
            weight_shelf_r: BiquadFilter::new(BiquadKind::HighShelf, 1500.0, 0.707, 4.0, sample_rate),
            ring: vec![0.0; short_len.max(1)],
            pos: 0,
            momentary_len: momentary_len.max(1),
            sum_momentary: 0.0,
            sum_short: 0.0,
            frames_seen: 0,
            hop_len: ((0.1 * sample_rate) as usize).max(1),
            hop_counter: 0,
            gated_blocks: Vec::new(),
        }
    }

    /// Push one stereo frame through weighting and the energy windows.
    fn push_frame(&mut self, left: f64, right: f64) {
        let wl = self.weight_shelf_l.process(self.weight_hp_l.process(left));
        let wr = self.weight_shelf_r.process(self.weight_hp_r.process(right));
        let energy = wl * wl + wr * wr;

        let short_len = self.ring.len();
        let leaving_short = self.ring[self.pos];
        self.sum_short += energy - leaving_short;

        let momentary_out = (self.pos + short_len - self.momentary_len.min(short_len)) % short_len;
        self.sum_momentary += energy - self.ring[momentary_out];

        self.ring[self.pos] = energy;
        self.pos = (self.pos + 1) % short_len;
        self.frames_seen += 1;

        self.hop_counter += 1;
        if self.hop_counter >= self.hop_len {
            self.hop_counter = 0;
            let mean = self.momentary_energy();
            if energy_to_lufs(mean) > ABSOLUTE_GATE_LUFS {
                self.gated_blocks.push(mean);
            }
        }
    }

    fn momentary_energy(&self) -> f64 {
        let frames = (self.frames_seen.min(self.momentary_len as u64)).max(1) as f64;
        (self.sum_momentary / frames).max(0.0)
    }

    fn short_term_energy(&self) -> f64 {
        let frames = (self.frames_seen.min(self.ring.len() as u64)).max(1) as f64;
        (self.sum_short / frames).max(0.0)
    }

    fn momentary_lufs(&self) -> f64 {
        energy_to_lufs(self.momentary_energy()).max(SILENCE_LUFS)
    }

    fn short_term_lufs(&self) -> f64 {
        energy_to_lufs(self.short_term_energy()).max(SILENCE_LUFS)
    }

    /// Integrated loudness with the second, relative gate applied.
    fn integrated_lufs(&self) -> f64 {
        if self.gated_blocks.is_empty() {
            return SILENCE_LUFS;
        }
        let gated_mean: f64 =
            self.gated_blocks.iter().sum::<f64>() / self.gated_blocks.len() as f64;
        let relative_gate = energy_to_lufs(gated_mean) - RELATIVE_GATE_LU;

        let mut sum = 0.0;
        let mut count = 0usize;
        for &block in &self.gated_blocks {
            if energy_to_lufs(block) > relative_gate {
                sum += block;
                count += 1;
            }
        }
        if count == 0 {
            return SILENCE_LUFS;
        }
        energy_to_lufs(sum / count as f64).max(SILENCE_LUFS)
    }

    fn reset(&mut self) {
        self.weight_hp_l.reset();
        self.weight_hp_r.reset();
        self.weight_shelf_l.reset();
        self.weight_shelf_r.reset();
        self.ring.fill(0.0);
        self.pos = 0;
        self.sum_momentary = 0.0;
        self.sum_short = 0.0;
        self.frames_seen = 0;
        self.hop_counter = 0;
        self.gated_blocks.clear();
    }
}

/// Non-destructive level and loudness analysis over finished buffers.
pub struct AudioMeter {
    peak_l: f64,
    peak_r: f64,
    rms_l: f64,
    rms_r: f64,
    vu_l: f64,
    vu_r: f64,
    loudness: LoudnessMeter,
}

impl AudioMeter {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            peak_l: 0.0,
            peak_r: 0.0,
            rms_l: 0.0,
            rms_r: 0.0,
            vu_l: VU_FLOOR_DB,
            vu_r: VU_FLOOR_DB,
            loudness: LoudnessMeter::new(sample_rate),
        }
    }

    /// Analyze an interleaved stereo buffer.
    ///
    /// An empty buffer still decays peak and VU and pushes one zero-energy
    /// frame through the loudness pipeline, so silence keeps the meter's
    /// timing consistent.
    pub fn process(&mut self, buffer: &[f32]) {
        self.peak_l *= PEAK_DECAY;
        self.peak_r *= PEAK_DECAY;

        if buffer.len() < 2 {
            self.vu_l = vu_smooth(self.vu_l, VU_FLOOR_DB);
            self.vu_r = vu_smooth(self.vu_r, VU_FLOOR_DB);
            self.loudness.push_frame(0.0, 0.0);
            return;
        }

        let frames = buffer.len() / 2;
        let mut block_peak_l = 0.0_f64;
        let mut block_peak_r = 0.0_f64;
        let mut sum_sq_l = 0.0_f64;
        let mut sum_sq_r = 0.0_f64;

        for frame in buffer.chunks_exact(2) {
            let l = frame[0] as f64;
            let r = frame[1] as f64;
            block_peak_l = block_peak_l.max(l.abs());
            block_peak_r = block_peak_r.max(r.abs());
            sum_sq_l += l * l;
            sum_sq_r += r * r;
            self.loudness.push_frame(l, r);
        }

        self.peak_l = self.peak_l.max(block_peak_l);
        self.peak_r = self.peak_r.max(block_peak_r);
        self.rms_l = (sum_sq_l / frames as f64).sqrt();
        self.rms_r = (sum_sq_r / frames as f64).sqrt();

        self.vu_l = vu_smooth(self.vu_l, amplitude_to_db(self.rms_l));
        self.vu_r = vu_smooth(self.vu_r, amplitude_to_db(self.rms_r));
    }

    /// Current reading of every tracked level.
    pub fn snapshot(&self) -> MeterSnapshot {
        MeterSnapshot {
            peak_l: self.peak_l,
            peak_r: self.peak_r,
            rms_l: self.rms_l,
            rms_r: self.rms_r,
            vu_l: self.vu_l,
            vu_r: self.vu_r,
            momentary_lufs: self.loudness.momentary_lufs(),
            short_term_lufs: self.loudness.short_term_lufs(),
            integrated_lufs: self.loudness.integrated_lufs(),
        }
    }

    /// Clear only the loudness accumulator; levels keep decaying normally.
    pub fn reset_loudness(&mut self) {
        self.loudness.reset();
    }
}

impl std::fmt::Debug for AudioMeter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioMeter")
            .field("peak_l", &self.peak_l)
            .field("peak_r", &self.peak_r)
            .finish()
    }
}

#[inline]
fn amplitude_to_db(amplitude: f64) -> f64 {
    if amplitude > 0.0 {
        (20.0 * amplitude.log10()).max(VU_FLOOR_DB)
    } else {
        VU_FLOOR_DB
    }
}

/// Attack/release smoothing of the dB-domain VU, once per block.
#[inline]
fn vu_smooth(current: f64, target: f64) -> f64 {
    let coeff = if target > current { 0.5 } else { 0.1 };
    current + coeff * (target - current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn sine_frames(amplitude: f64, freq: f64, frames: usize, sample_rate: f64, start: usize) -> Vec<f32> {
        (0..frames)
            .flat_map(|i| {
                let t = (start + i) as f64 / sample_rate;
                let s = (amplitude * (2.0 * PI * freq * t).sin()) as f32;
                [s, s]
            })
            .collect()
    }

    #[test]
    fn peak_and_rms_track_a_sine() {
        let mut meter = AudioMeter::new(44100.0);
        let buffer = sine_frames(0.5, 997.0, 44100, 44100.0, 0);
        meter.process(&buffer);
        let snap = meter.snapshot();
        assert!((snap.peak_l - 0.5).abs() < 0.01, "Peak should be ~0.5, got {}", snap.peak_l);
        // Sine RMS is amplitude / √2
        let expected_rms = 0.5 / (2.0_f64).sqrt();
        assert!(
            (snap.rms_l - expected_rms).abs() < 0.01,
            "RMS should be ~{expected_rms:.3}, got {:.3}",
            snap.rms_l
        );
        assert_eq!(snap.peak_l, snap.peak_r);
    }

    #[test]
    fn peak_decays_on_silence() {
        let mut meter = AudioMeter::new(44100.0);
        meter.process(&sine_frames(0.8, 997.0, 4410, 44100.0, 0));
        let loud = meter.snapshot().peak_l;
        for _ in 0..200 {
            meter.process(&[0.0, 0.0]);
        }
        let quiet = meter.snapshot().peak_l;
        assert!(quiet < loud, "Peak should decay during silence: {loud} -> {quiet}");
    }

    #[test]
    fn empty_blocks_keep_decaying() {
        let mut meter = AudioMeter::new(44100.0);
        meter.process(&sine_frames(0.8, 997.0, 4410, 44100.0, 0));
        let before = meter.snapshot();
        for _ in 0..500 {
            meter.process(&[]);
        }
        let after = meter.snapshot();
        assert!(after.peak_l < before.peak_l);
        assert!(after.vu_l < before.vu_l);
    }

    #[test]
    fn integrated_loudness_is_block_size_invariant() {
        let sample_rate = 44100.0;
        let total = 4 * 44100; // 4 seconds
        let signal = sine_frames(0.25, 997.0, total, sample_rate, 0);

        let mut fine = AudioMeter::new(sample_rate);
        for frame in signal.chunks(2) {
            fine.process(frame);
        }

        let mut coarse = AudioMeter::new(sample_rate);
        for chunk in signal.chunks(2 * 4096) {
            coarse.process(chunk);
        }

        let a = fine.snapshot().integrated_lufs;
        let b = coarse.snapshot().integrated_lufs;
        assert!(
            (a - b).abs() < 1e-9,
            "Integrated loudness must not depend on feed block size: {a} vs {b}"
        );
    }

    #[test]
    fn constant_signal_converges_across_windows() {
        let sample_rate = 44100.0;
        let mut meter = AudioMeter::new(sample_rate);
        meter.process(&sine_frames(0.25, 997.0, 5 * 44100, sample_rate, 0));
        let snap = meter.snapshot();
        // For a steady signal the three tiers agree closely
        assert!(
            (snap.momentary_lufs - snap.short_term_lufs).abs() < 0.5,
            "Momentary {} vs short-term {}",
            snap.momentary_lufs,
            snap.short_term_lufs
        );
        assert!(
            (snap.momentary_lufs - snap.integrated_lufs).abs() < 0.5,
            "Momentary {} vs integrated {}",
            snap.momentary_lufs,
            snap.integrated_lufs
        );
        assert!(snap.integrated_lufs > -35.0 && snap.integrated_lufs < -5.0);
    }

    #[test]
    fn louder_signal_measures_louder() {
        let sample_rate = 44100.0;
        let mut quiet = AudioMeter::new(sample_rate);
        quiet.process(&sine_frames(0.1, 997.0, 4 * 44100, sample_rate, 0));
        let mut loud = AudioMeter::new(sample_rate);
        loud.process(&sine_frames(0.4, 997.0, 4 * 44100, sample_rate, 0));

        let q = quiet.snapshot().integrated_lufs;
        let l = loud.snapshot().integrated_lufs;
        // 4x amplitude = +12 dB
        assert!(
            ((l - q) - 12.0).abs() < 0.5,
            "4x amplitude should read ~12 LU louder: quiet {q}, loud {l}"
        );
    }

    #[test]
    fn silence_is_gated_out_of_integrated() {
        let sample_rate = 44100.0;
        let mut meter = AudioMeter::new(sample_rate);
        meter.process(&sine_frames(0.25, 997.0, 2 * 44100, sample_rate, 0));
        let during = meter.snapshot().integrated_lufs;

        // Feed 6 seconds of silence; gated measurement barely moves
        meter.process(&vec![0.0_f32; 2 * 6 * 44100]);
        let after = meter.snapshot().integrated_lufs;
        assert!(
            (during - after).abs() < 3.0,
            "Silence must be gated out: during {during}, after {after}"
        );
        // Whereas the momentary reading has collapsed to the floor
        assert!(meter.snapshot().momentary_lufs <= -69.0);
    }

    #[test]
    fn reset_loudness_clears_only_loudness() {
        let mut meter = AudioMeter::new(44100.0);
        meter.process(&sine_frames(0.5, 997.0, 44100, 44100.0, 0));
        let peak_before = meter.snapshot().peak_l;
        meter.reset_loudness();
        let snap = meter.snapshot();
        assert_eq!(snap.integrated_lufs, -70.0);
        assert!(snap.peak_l > 0.0);
        assert!((snap.peak_l - peak_before).abs() < 1e-12);
    }
}
