//! Synthesis-engine and envelope collaborator contracts.
//!
//! Waveform generation and envelope evaluation sit outside this core: the
//! renderer only asks a [`Synthesizer`] for frequencies, samples, and LFO
//! values, and asks a [`NoteEnvelope`] for an amplitude multiplier at an
//! elapsed sample position. [`BasicSynthesizer`], [`AdsrEnvelope`], and
//! [`BreakpointEnvelope`] are the built-in reference implementations.

use std::f64::consts::PI;

use crate::model::{InstrumentSettings, LfoSettings, Waveform, WavetableRef};

/// An amplitude envelope evaluated per sample.
///
/// `value` maps an elapsed sample count within a note of `total` samples
/// to a multiplier in [0, 1]. One object is created per note.
pub trait NoteEnvelope: Send {
    fn value(&mut self, elapsed: usize, total: usize) -> f64;
}

/// The external synthesis engine contract.
pub trait Synthesizer: Send + Sync {
    /// Frequency in Hz for a MIDI note with pitch bend, microtonal offset,
    /// and vibrato LFO contribution, all in cents.
    fn frequency(&self, note: u8, bend_cents: f64, cent_offset: f64, lfo_cents: f64) -> f64;

    /// One sample of the full voice: waveform shaped by amplitude and the
    /// instantaneous envelope value. `wavetable` is resolved by the engine
    /// when it supports wavetables; the basic engine ignores it.
    fn generate(
        &self,
        waveform: Waveform,
        freq: f64,
        time: f64,
        amplitude: f64,
        envelope: f64,
        note: u8,
        wavetable: Option<&WavetableRef>,
    ) -> f64;

    /// One raw waveform sample in [−1, 1], unshaped.
    fn basic_waveform(&self, waveform: Waveform, freq: f64, time: f64) -> f64;

    /// LFO output in [−1, 1] at `time` seconds; depth scaling is the
    /// caller's business.
    fn lfo_value(&self, lfo: &LfoSettings, time: f64) -> f64;

    /// Build the per-note envelope object: the instrument's breakpoint
    /// envelope when it defines one, its ADSR otherwise.
    fn make_envelope(
        &self,
        instrument: &InstrumentSettings,
        sample_rate: f64,
    ) -> Box<dyn NoteEnvelope> {
        match &instrument.breakpoints {
            Some(points) => Box::new(BreakpointEnvelope::new(points.clone(), sample_rate)),
            None => Box::new(AdsrEnvelope::new(
                instrument.attack,
                instrument.decay,
                instrument.sustain,
                instrument.release,
                sample_rate,
            )),
        }
    }
}

/// Evaluate an ADSR shape analytically at an elapsed sample position.
///
/// The release ramp occupies the final `release` seconds of the note, so
/// the envelope reaches zero exactly at `total`. Shared by
/// [`AdsrEnvelope`] and the software note-batch kernel, which carries the
/// same four parameters per note.
pub fn adsr_value(
    attack: f64,
    decay: f64,
    sustain: f64,
    release: f64,
    sample_rate: f64,
    elapsed: usize,
    total: usize,
) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let attack_samples = (attack * sample_rate).max(0.0);
    let decay_samples = (decay * sample_rate).max(0.0);
    // The release occupies the end of the note but never eats the attack,
    // so short notes still ramp up before ramping out
    let release_samples = (release * sample_rate)
        .max(0.0)
        .min((total as f64 - attack_samples).max(0.0));
    let release_start = total as f64 - release_samples;

    let t = elapsed as f64;
    let sustained = if t < attack_samples {
        if attack_samples > 0.0 { t / attack_samples } else { 1.0 }
    } else if t < attack_samples + decay_samples {
        let d = (t - attack_samples) / decay_samples;
        1.0 - (1.0 - sustain) * d
    } else {
        sustain
    };

    if t >= release_start {
        let level_at_release = if release_start < attack_samples {
            if attack_samples > 0.0 { release_start / attack_samples } else { 1.0 }
        } else if release_start < attack_samples + decay_samples {
            let d = (release_start - attack_samples) / decay_samples;
            1.0 - (1.0 - sustain) * d
        } else {
            sustain
        };
        if release_samples > 0.0 {
            let r = (t - release_start) / release_samples;
            (level_at_release * (1.0 - r)).max(0.0)
        } else {
            0.0
        }
    } else {
        sustained.clamp(0.0, 1.0)
    }
}

/// ADSR amplitude envelope over a fixed-duration note.
#[derive(Debug, Clone)]
pub struct AdsrEnvelope {
    pub attack: f64,
    pub decay: f64,
    pub sustain: f64,
    pub release: f64,
    sample_rate: f64,
}

impl AdsrEnvelope {
    pub fn new(attack: f64, decay: f64, sustain: f64, release: f64, sample_rate: f64) -> Self {
        Self {
            attack: attack.max(0.0),
            decay: decay.max(0.0),
            sustain: sustain.clamp(0.0, 1.0),
            release: release.max(0.0),
            sample_rate,
        }
    }
}

impl NoteEnvelope for AdsrEnvelope {
    fn value(&mut self, elapsed: usize, total: usize) -> f64 {
        adsr_value(
            self.attack,
            self.decay,
            self.sustain,
            self.release,
            self.sample_rate,
            elapsed,
            total,
        )
    }
}

/// Piecewise-linear amplitude envelope over (time seconds, level) points.
#[derive(Debug, Clone)]
pub struct BreakpointEnvelope {
    points: Vec<(f64, f64)>,
    sample_rate: f64,
}

impl BreakpointEnvelope {
    /// Points are sorted by time on construction; an empty list yields a
    /// constant 1.0 envelope.
    pub fn new(mut points: Vec<(f64, f64)>, sample_rate: f64) -> Self {
        points.sort_by(|a, b| a.0.total_cmp(&b.0));
        Self { points, sample_rate }
    }
}

impl NoteEnvelope for BreakpointEnvelope {
    fn value(&mut self, elapsed: usize, _total: usize) -> f64 {
        if self.points.is_empty() {
            return 1.0;
        }
        let t = elapsed as f64 / self.sample_rate;
        if t <= self.points[0].0 {
            return self.points[0].1.clamp(0.0, 1.0);
        }
        for pair in self.points.windows(2) {
            let (t0, v0) = pair[0];
            let (t1, v1) = pair[1];
            if t <= t1 {
                let span = t1 - t0;
                let frac = if span > 0.0 { (t - t0) / span } else { 1.0 };
                return (v0 + (v1 - v0) * frac).clamp(0.0, 1.0);
            }
        }
        self.points[self.points.len() - 1].1.clamp(0.0, 1.0)
    }
}

/// The built-in reference synthesis engine: equal-temperament pitch and
/// stateless time-based waveforms.
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicSynthesizer;

impl BasicSynthesizer {
    pub fn new() -> Self {
        Self
    }
}

/// Time-based waveform evaluation shared with the software note kernel.
pub fn waveform_sample(waveform: Waveform, freq: f64, time: f64) -> f64 {
    let phase = (freq * time).rem_euclid(1.0);
    match waveform {
        Waveform::Sine => (2.0 * PI * phase).sin(),
        Waveform::Square => {
            if phase < 0.5 { 1.0 } else { -1.0 }
        }
        Waveform::Sawtooth => 2.0 * phase - 1.0,
        Waveform::Triangle => {
            if phase < 0.5 {
                4.0 * phase - 1.0
            } else {
                3.0 - 4.0 * phase
            }
        }
    }
}

impl Synthesizer for BasicSynthesizer {
    fn frequency(&self, note: u8, bend_cents: f64, cent_offset: f64, lfo_cents: f64) -> f64 {
        let cents = bend_cents + cent_offset + lfo_cents;
        440.0 * (2.0_f64).powf((note as f64 - 69.0) / 12.0) * (2.0_f64).powf(cents / 1200.0)
    }

    fn generate(
        &self,
        waveform: Waveform,
        freq: f64,
        time: f64,
        amplitude: f64,
        envelope: f64,
        _note: u8,
        _wavetable: Option<&WavetableRef>,
    ) -> f64 {
        waveform_sample(waveform, freq, time) * amplitude * envelope
    }

    fn basic_waveform(&self, waveform: Waveform, freq: f64, time: f64) -> f64 {
        waveform_sample(waveform, freq, time)
    }

    fn lfo_value(&self, lfo: &LfoSettings, time: f64) -> f64 {
        if !lfo.is_active() {
            return 0.0;
        }
        waveform_sample(lfo.waveform, lfo.rate_hz, time)
    }
}
