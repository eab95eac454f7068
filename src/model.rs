//! Note, channel, and instrument data consumed during a render pass.
//!
//! Everything here is owned by the caller and read-only to the pipeline
//! while rendering: note events are immutable once a pass begins, channel
//! state is the caller's mix automation, and instruments are looked up by
//! program index so per-voice state can be keyed on a stable identity.

use serde::{Deserialize, Serialize};

/// MIDI channels are 1-based; notes on other channels are dropped.
pub const MIN_CHANNEL: u8 = 1;
pub const MAX_CHANNEL: u8 = 16;
pub const CHANNEL_COUNT: usize = 16;

/// Supported waveform shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Waveform {
    Sine,
    Square,
    Sawtooth,
    Triangle,
}

/// A single note to render: channel, pitch, velocity, and an absolute
/// sample span `[start_sample, end_sample)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoteEvent {
    /// MIDI channel (1–16).
    pub channel: u8,
    /// MIDI note number.
    pub note: u8,
    /// MIDI velocity (0–127).
    pub velocity: u8,
    pub start_sample: usize,
    /// Exclusive end.
    pub end_sample: usize,
    /// Microtonal offset in cents (−50..50).
    pub cent_offset: f64,
}

impl NoteEvent {
    pub fn new(channel: u8, note: u8, velocity: u8, start_sample: usize, end_sample: usize) -> Self {
        Self {
            channel,
            note,
            velocity,
            start_sample,
            end_sample,
            cent_offset: 0.0,
        }
    }

    /// Number of samples this note spans.
    pub fn duration(&self) -> usize {
        self.end_sample.saturating_sub(self.start_sample)
    }
}

/// Per-channel mix state, owned by the caller and read-only during a pass.
///
/// The multiplier fields let a host humanize or automate envelope and
/// filter behavior per channel without touching instrument definitions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelState {
    /// Instrument index into the [`InstrumentTable`].
    pub program: usize,
    /// Channel volume [0, 1].
    pub volume: f64,
    /// Expression controller [0, 1].
    pub expression: f64,
    /// Stereo position, −1 (left) .. 1 (right).
    pub pan: f64,
    /// Pitch bend in cents.
    pub pitch_bend_cents: f64,
    /// Sustain pedal held.
    pub sustain: bool,
    pub attack_mult: f64,
    pub decay_mult: f64,
    pub release_mult: f64,
    pub cutoff_mult: f64,
    pub resonance_mult: f64,
}

impl Default for ChannelState {
    fn default() -> Self {
        Self {
            program: 0,
            volume: 1.0,
            expression: 1.0,
            pan: 0.0,
            pitch_bend_cents: 0.0,
            sustain: false,
            attack_mult: 1.0,
            decay_mult: 1.0,
            release_mult: 1.0,
            cutoff_mult: 1.0,
            resonance_mult: 1.0,
        }
    }
}

/// Low-frequency oscillator settings for pitch, amplitude, or filter
/// modulation. `depth == 0.0` disables the LFO.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LfoSettings {
    pub waveform: Waveform,
    pub rate_hz: f64,
    pub depth: f64,
}

impl Default for LfoSettings {
    fn default() -> Self {
        Self {
            waveform: Waveform::Sine,
            rate_hz: 5.0,
            depth: 0.0,
        }
    }
}

impl LfoSettings {
    pub fn is_active(&self) -> bool {
        self.depth != 0.0 && self.rate_hz > 0.0
    }
}

/// Multi-mode filter selection for the per-voice state-variable filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FilterKind {
    /// Filter bypassed.
    #[default]
    None,
    LowPass,
    HighPass,
    BandPass,
    Notch,
    Peak,
}

/// Per-voice filter settings carried by an instrument.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterSettings {
    pub kind: FilterKind,
    /// Base cutoff in Hz.
    pub cutoff: f64,
    /// Resonance [0, 1].
    pub resonance: f64,
    /// Cutoff-modulating LFO.
    pub lfo: LfoSettings,
    /// Additional sinusoidal cutoff modulation rate in Hz.
    pub mod_rate: f64,
    /// Additional sinusoidal cutoff modulation depth [0, 1].
    pub mod_depth: f64,
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self {
            kind: FilterKind::None,
            cutoff: 8000.0,
            resonance: 0.2,
            lfo: LfoSettings::default(),
            mod_rate: 0.0,
            mod_depth: 0.0,
        }
    }
}

/// Reference to an external wavetable; resolution is the synthesis
/// engine's responsibility.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WavetableRef {
    pub name: String,
}

/// An instrument definition: waveform, ADSR defaults, filter, modulation
/// LFOs, and an optional breakpoint amplitude envelope that overrides the
/// ADSR when present. Immutable during a render pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstrumentSettings {
    pub waveform: Waveform,
    /// Attack time in seconds.
    pub attack: f64,
    /// Decay time in seconds.
    pub decay: f64,
    /// Sustain level [0, 1].
    pub sustain: f64,
    /// Release time in seconds.
    pub release: f64,
    pub filter: FilterSettings,
    pub pitch_lfo: LfoSettings,
    pub amplitude_lfo: LfoSettings,
    /// Instrument volume multiplier [0, 1].
    pub volume: f64,
    /// Breakpoint amplitude envelope as (time seconds, level) pairs.
    /// When set, it replaces the ADSR for this instrument's notes.
    pub breakpoints: Option<Vec<(f64, f64)>>,
    pub wavetable: Option<WavetableRef>,
}

impl Default for InstrumentSettings {
    fn default() -> Self {
        Self {
            waveform: Waveform::Sine,
            attack: 0.01,
            decay: 0.1,
            sustain: 0.7,
            release: 0.3,
            filter: FilterSettings::default(),
            pitch_lfo: LfoSettings::default(),
            amplitude_lfo: LfoSettings::default(),
            volume: 1.0,
            breakpoints: None,
            wavetable: None,
        }
    }
}

/// Instrument lookup table indexed by program number.
///
/// The program index is the stable identity used to key per-voice filter
/// state, so two notes on the same (channel, program) share filter
/// continuity while different programs never interfere.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InstrumentTable {
    instruments: Vec<InstrumentSettings>,
}

impl InstrumentTable {
    pub fn new(instruments: Vec<InstrumentSettings>) -> Self {
        Self { instruments }
    }

    /// Look up an instrument by program, falling back to defaults for
    /// programs outside the table.
    pub fn get(&self, program: usize) -> InstrumentSettings {
        self.instruments.get(program).cloned().unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.instruments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instruments.is_empty()
    }
}
