//! resound-core — audio rendering and effects pipeline.
//!
//! Turns note events plus channel/instrument state into interleaved
//! stereo PCM, shapes the result with a fixed-order effects chain, and
//! measures it with a gated loudness meter. Waveform generation, envelope
//! evaluation, and the GPU compute backend are collaborator contracts
//! ([`synth::Synthesizer`], [`synth::NoteEnvelope`],
//! [`gpu::ComputeDevice`]); built-in reference implementations make the
//! crate usable out of the box.
//!
//! ```
//! use resound_core::config::EngineConfig;
//! use resound_core::dsp::effects::EffectsProcessor;
//! use resound_core::dsp::meter::AudioMeter;
//! use resound_core::dsp::renderer::{AudioRenderer, render_with_effects};
//! use resound_core::model::{ChannelState, InstrumentSettings, InstrumentTable, NoteEvent};
//! use resound_core::synth::BasicSynthesizer;
//!
//! let config = EngineConfig::default();
//! let renderer = AudioRenderer::new(&config);
//! let mut effects = EffectsProcessor::new(&config);
//! let mut meter = AudioMeter::new(config.audio.sample_rate as f64);
//!
//! let instruments = InstrumentTable::new(vec![InstrumentSettings::default()]);
//! let channels = vec![ChannelState::default(); 16];
//! let notes = [NoteEvent::new(1, 69, 100, 0, 44100)];
//!
//! let mut buffer = vec![0.0_f32; 2 * 44100];
//! render_with_effects(
//!     &renderer,
//!     &mut effects,
//!     Some(&mut meter),
//!     &mut buffer,
//!     &notes,
//!     &channels,
//!     &instruments,
//!     &BasicSynthesizer::new(),
//!     None,
//! )
//! .expect("render");
//! assert!(meter.snapshot().peak_l > 0.0);
//! ```

pub mod config;
pub mod dsp;
pub mod error;
pub mod gpu;
pub mod model;
pub mod synth;

pub use config::EngineConfig;
pub use dsp::effects::EffectsProcessor;
pub use dsp::meter::{AudioMeter, MeterSnapshot};
pub use dsp::renderer::AudioRenderer;
pub use dsp::svf::FilterProcessor;
pub use error::{ComputeError, RenderError};
pub use model::{ChannelState, InstrumentSettings, InstrumentTable, NoteEvent};
pub use synth::{BasicSynthesizer, NoteEnvelope, Synthesizer};

/// The crate version, read from Cargo.toml at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
