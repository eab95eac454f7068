//! Per-voice state-variable filter.
//!
//! A trapezoidal two-pole SVF derives all five modes from one pair of
//! state variables. State is keyed by (channel, program) so repeated
//! notes on the same voice keep filter continuity while different voices
//! never interfere; banks are per-channel so parallel channel workers
//! never contend on the same lock.

use std::f64::consts::PI;

use parking_lot::Mutex;

use crate::model::{CHANNEL_COUNT, ChannelState, FilterKind, FilterSettings};
use crate::synth::Synthesizer;

/// Two-pole filter state.
#[derive(Debug, Clone, Copy, Default)]
pub struct SvfState {
    pub z1: f64,
    pub z2: f64,
}

/// Advance the filter by one sample and return the selected mode output.
///
/// Cutoff is clamped to [20 Hz, sample_rate/2 − 1], resonance to [0, 1].
pub(crate) fn svf_tick(
    state: &mut SvfState,
    kind: FilterKind,
    input: f64,
    cutoff: f64,
    resonance: f64,
    sample_rate: f64,
) -> f64 {
    if kind == FilterKind::None {
        return input;
    }
    let cutoff = cutoff.clamp(20.0, sample_rate / 2.0 - 1.0);
    let resonance = resonance.clamp(0.0, 1.0);

    let g = (PI * cutoff / sample_rate).tan();
    let k = 2.0 - 2.0 * resonance;
    let a1 = 1.0 / (1.0 + g * (g + k));
    let a2 = g * a1;
    let a3 = g * a2;

    let v3 = input - state.z2;
    let v1 = a1 * state.z1 + a2 * v3;
    let v2 = state.z2 + a2 * state.z1 + a3 * v3;

    // Clamp keeps runaway resonance from propagating non-finite state
    state.z1 = (2.0 * v1 - state.z1).clamp(-1e6, 1e6);
    state.z2 = (2.0 * v2 - state.z2).clamp(-1e6, 1e6);

    match kind {
        FilterKind::None => input,
        FilterKind::LowPass => v2,
        FilterKind::BandPass => v1,
        FilterKind::HighPass => input - k * v1 - v2,
        FilterKind::Notch => input - k * v1,
        FilterKind::Peak => v2 - (input - k * v1),
    }
}

/// Filter state arena plus the per-sample modulation logic.
pub struct FilterProcessor {
    sample_rate: f64,
    /// One bank per channel, lazily grown and indexed by program.
    banks: Vec<Mutex<Vec<Option<SvfState>>>>,
}

impl FilterProcessor {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            sample_rate,
            banks: (0..CHANNEL_COUNT).map(|_| Mutex::new(Vec::new())).collect(),
        }
    }

    /// Filter one sample for the voice at (0-based channel, program).
    ///
    /// Cutoff is modulated per sample by the instrument's filter LFO, the
    /// sinusoidal mod_rate/mod_depth term, and the channel cutoff
    /// multiplier; resonance by the channel resonance multiplier. State
    /// lookup is get-or-create under the channel bank's lock.
    pub fn process(
        &self,
        channel: usize,
        program: usize,
        settings: &FilterSettings,
        channel_state: &ChannelState,
        synth: &dyn Synthesizer,
        input: f64,
        time: f64,
    ) -> f64 {
        if settings.kind == FilterKind::None || channel >= self.banks.len() {
            return input;
        }

        let mut cutoff = settings.cutoff * channel_state.cutoff_mult;
        if settings.lfo.is_active() {
            cutoff *= 1.0 + synth.lfo_value(&settings.lfo, time) * settings.lfo.depth;
        }
        if settings.mod_depth != 0.0 && settings.mod_rate > 0.0 {
            cutoff *= 1.0 + settings.mod_depth * (2.0 * PI * settings.mod_rate * time).sin();
        }
        let resonance = settings.resonance * channel_state.resonance_mult;

        let mut bank = self.banks[channel].lock();
        if program >= bank.len() {
            bank.resize(program + 1, None);
        }
        let state = bank[program].get_or_insert_with(SvfState::default);
        svf_tick(state, settings.kind, input, cutoff, resonance, self.sample_rate)
    }

    /// Clear every filter state without touching configuration.
    pub fn reset(&self) {
        for bank in &self.banks {
            bank.lock().clear();
        }
    }
}

impl std::fmt::Debug for FilterProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterProcessor")
            .field("sample_rate", &self.sample_rate)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synth::BasicSynthesizer;

    #[test]
    fn lowpass_passes_dc() {
        let mut state = SvfState::default();
        let mut out = 0.0;
        for _ in 0..2000 {
            out = svf_tick(&mut state, FilterKind::LowPass, 1.0, 1000.0, 0.2, 44100.0);
        }
        assert!((out - 1.0).abs() < 0.001, "Lowpass should pass DC, got {out}");
    }

    #[test]
    fn highpass_blocks_dc() {
        let mut state = SvfState::default();
        let mut out = 1.0;
        for _ in 0..2000 {
            out = svf_tick(&mut state, FilterKind::HighPass, 1.0, 1000.0, 0.2, 44100.0);
        }
        assert!(out.abs() < 0.001, "Highpass should block DC, got {out}");
    }

    #[test]
    fn all_modes_stay_bounded_over_a_million_samples() {
        let sample_rate = 44100.0;
        for &cutoff in &[20.0, 8000.0, sample_rate / 2.0 - 1.0] {
            for &resonance in &[0.0, 1.0] {
                for kind in [
                    FilterKind::LowPass,
                    FilterKind::HighPass,
                    FilterKind::BandPass,
                    FilterKind::Notch,
                    FilterKind::Peak,
                ] {
                    let mut state = SvfState::default();
                    // Bounded deterministic input: sine + square + DC segments
                    for i in 0..1_000_000_usize {
                        let t = i as f64 / sample_rate;
                        let input = if i % 90000 < 30000 {
                            (2.0 * PI * 330.0 * t).sin()
                        } else if i % 90000 < 60000 {
                            if (i / 64) % 2 == 0 { 1.0 } else { -1.0 }
                        } else {
                            1.0
                        };
                        let out = svf_tick(&mut state, kind, input, cutoff, resonance, sample_rate);
                        assert!(
                            out.is_finite() && out.abs() < 1e4,
                            "{kind:?} diverged at sample {i} (cutoff {cutoff}, res {resonance}): {out}"
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn out_of_range_parameters_are_clamped() {
        let mut state = SvfState::default();
        for i in 0..1000 {
            // Cutoff above Nyquist and resonance above 1 must clamp, not blow up
            let out = svf_tick(
                &mut state,
                FilterKind::LowPass,
                ((i as f64) * 0.1).sin(),
                1e9,
                5.0,
                44100.0,
            );
            assert!(out.is_finite());
        }
    }

    #[test]
    fn same_voice_shares_state_across_notes() {
        let processor = FilterProcessor::new(44100.0);
        let synth = BasicSynthesizer::new();
        let settings = FilterSettings {
            kind: FilterKind::LowPass,
            cutoff: 500.0,
            ..Default::default()
        };
        let channel_state = ChannelState::default();

        // Warm the filter with DC on voice (0, 0)
        for _ in 0..2000 {
            processor.process(0, 0, &settings, &channel_state, &synth, 1.0, 0.0);
        }
        // A "new note" on the same voice starts from warm state: first
        // output is already near 1.0 rather than near 0.
        let warm = processor.process(0, 0, &settings, &channel_state, &synth, 1.0, 0.0);
        assert!(warm > 0.9, "Same voice should keep filter state, got {warm}");

        // A different program starts cold
        let cold = processor.process(0, 1, &settings, &channel_state, &synth, 1.0, 0.0);
        assert!(cold < 0.5, "Different program should start cold, got {cold}");
    }

    #[test]
    fn reset_clears_state() {
        let processor = FilterProcessor::new(44100.0);
        let synth = BasicSynthesizer::new();
        let settings = FilterSettings {
            kind: FilterKind::LowPass,
            cutoff: 500.0,
            ..Default::default()
        };
        let channel_state = ChannelState::default();

        for _ in 0..2000 {
            processor.process(2, 3, &settings, &channel_state, &synth, 1.0, 0.0);
        }
        processor.reset();
        let cold = processor.process(2, 3, &settings, &channel_state, &synth, 1.0, 0.0);
        assert!(cold < 0.5, "Reset should clear filter state, got {cold}");
    }

    #[test]
    fn bypassed_filter_is_identity() {
        let processor = FilterProcessor::new(44100.0);
        let synth = BasicSynthesizer::new();
        let settings = FilterSettings::default(); // kind: None
        let channel_state = ChannelState::default();
        let out = processor.process(0, 0, &settings, &channel_state, &synth, 0.42, 0.0);
        assert_eq!(out, 0.42);
    }
}
