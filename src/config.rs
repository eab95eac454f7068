//! Engine configuration — the read-only settings tree supplied at construction.
//!
//! The tree is deserializable from JSON so a host can persist and restore
//! it wholesale. Every field has a default, and unknown fields are
//! tolerated, so partial configs load cleanly. This crate never mutates a
//! config after construction.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration for the rendering and effects pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub audio: AudioConfig,
    pub performance: PerformanceConfig,
    pub synthesis: SynthesisConfig,
    pub effects: EffectsConfig,
}

/// Core audio parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Master volume applied to every rendered note [0, 1].
    pub master_volume: f64,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            master_volume: 0.8,
        }
    }
}

/// Scheduling and GPU strategy parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceConfig {
    /// Worker threads for per-channel parallel rendering. 0 = one per core.
    pub worker_threads: usize,
    /// Attempt GPU batch rendering before falling back to the CPU path.
    pub prefer_gpu: bool,
    /// Frames per GPU batch dispatch.
    pub gpu_chunk_frames: usize,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            worker_threads: 0,
            prefer_gpu: false,
            gpu_chunk_frames: 4096,
        }
    }
}

/// Note-shaping parameters applied uniformly across all rendering paths.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
    /// Floor attack/release times to the minimums below.
    pub anti_pop: bool,
    /// Minimum attack time in seconds when anti-pop is enabled.
    pub min_attack: f64,
    /// Minimum release time in seconds when anti-pop is enabled.
    pub min_release: f64,
    /// Linear crossfade length at note boundaries, in frames.
    pub edge_fade_frames: usize,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            anti_pop: true,
            min_attack: 0.002,
            min_release: 0.005,
            edge_fade_frames: 64,
        }
    }
}

/// The global effects chain plus the per-voice modulation effects.
///
/// Only stage *presence* is configurable here. The chain order itself is a
/// contract (see `dsp::effects`) and cannot be rearranged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EffectsConfig {
    pub dc_removal: DcRemovalConfig,
    pub compressor: CompressorConfig,
    pub reverb: ReverbConfig,
    pub limiter: LimiterConfig,
    pub delay: DelayConfig,
    pub distortion: DistortionConfig,
    pub bit_crusher: BitCrusherConfig,
    pub convolution: ConvolutionConfig,
    pub equalizer: EqualizerConfig,
    pub chorus: ChorusConfig,
    pub phaser: PhaserConfig,
    pub flanger: FlangerConfig,
    pub normalization: NormalizationConfig,
}

/// DC-offset removal stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DcRemovalConfig {
    pub enabled: bool,
}

impl Default for DcRemovalConfig {
    fn default() -> Self {
        Self { enabled: false }
    }
}

/// Dynamics compression stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressorConfig {
    pub enabled: bool,
    /// Linear threshold [0, 1] above which gain reduction engages.
    pub threshold: f64,
    /// Compression ratio (e.g. 4.0 = 4:1).
    pub ratio: f64,
    /// Attack time in seconds.
    pub attack: f64,
    /// Release time in seconds.
    pub release: f64,
}

impl Default for CompressorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            threshold: 0.5,
            ratio: 4.0,
            attack: 0.005,
            release: 0.1,
        }
    }
}

/// Algorithmic (Schroeder) reverb stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReverbConfig {
    pub enabled: bool,
    /// Room size [0, 1]. Larger = longer decay.
    pub room_size: f64,
    /// High-frequency damping [0, 1].
    pub damping: f64,
    /// Wet level [0, 1].
    pub wet: f64,
    /// Dry level [0, 1].
    pub dry: f64,
    /// Stereo width [0, 1].
    pub width: f64,
}

impl Default for ReverbConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            room_size: 0.5,
            damping: 0.5,
            wet: 0.3,
            dry: 0.7,
            width: 1.0,
        }
    }
}

/// Hard limiter stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimiterConfig {
    pub enabled: bool,
    /// Clamp level; samples are held to ±threshold.
    pub threshold: f64,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            threshold: 0.95,
        }
    }
}

/// Ping-pong stereo delay stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DelayConfig {
    pub enabled: bool,
    /// Delay time in seconds (up to 1 s).
    pub time: f64,
    /// Cross-feedback amount [0, 1).
    pub feedback: f64,
    /// Dry/wet mix [0, 1].
    pub mix: f64,
}

impl Default for DelayConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            time: 0.35,
            feedback: 0.4,
            mix: 0.3,
        }
    }
}

/// Waveshaping curve selection for the distortion stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DistortionShape {
    /// Hard clip to ±1.
    Hard,
    /// Soft exponential clip.
    Soft,
    /// Arctangent saturation.
    Arctangent,
}

/// Distortion stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DistortionConfig {
    pub enabled: bool,
    /// Input drive multiplier.
    pub drive: f64,
    /// Clean/shaped blend [0, 1].
    pub mix: f64,
    pub shape: DistortionShape,
}

impl Default for DistortionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            drive: 1.5,
            mix: 0.5,
            shape: DistortionShape::Soft,
        }
    }
}

/// Bit-crusher stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BitCrusherConfig {
    pub enabled: bool,
    /// Quantization depth; step size is `0.5^bit_depth`.
    pub bit_depth: u32,
    /// Samples held per output value (sample-and-hold rate reduction).
    pub rate_reduction: u32,
}

impl Default for BitCrusherConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bit_depth: 8,
            rate_reduction: 4,
        }
    }
}

/// Convolution reverb stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvolutionConfig {
    pub enabled: bool,
    /// WAV file holding the impulse response. When absent or unreadable a
    /// synthetic exponential-decay impulse is substituted.
    pub impulse_path: Option<PathBuf>,
    /// Impulse responses longer than this are truncated (with a warning).
    pub max_impulse_seconds: f64,
    /// Wet level [0, 1].
    pub wet: f64,
    /// Dry level [0, 1].
    pub dry: f64,
}

impl Default for ConvolutionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            impulse_path: None,
            max_impulse_seconds: 3.0,
            wet: 0.4,
            dry: 0.6,
        }
    }
}

/// Three-band parametric equalizer stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EqualizerConfig {
    pub enabled: bool,
    pub bass_freq: f64,
    pub bass_gain_db: f64,
    pub mid_freq: f64,
    pub mid_gain_db: f64,
    pub treble_freq: f64,
    pub treble_gain_db: f64,
    /// Shared Q for all three peaking bands.
    pub q: f64,
}

impl Default for EqualizerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bass_freq: 150.0,
            bass_gain_db: 0.0,
            mid_freq: 1000.0,
            mid_gain_db: 0.0,
            treble_freq: 6000.0,
            treble_gain_db: 0.0,
            q: 0.9,
        }
    }
}

/// Per-voice chorus (applied inside the renderer, not in the global chain).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChorusConfig {
    pub enabled: bool,
    /// LFO rate in Hz.
    pub rate: f64,
    /// Modulation depth in seconds.
    pub depth: f64,
    /// Base delay time in seconds.
    pub delay: f64,
    /// Dry/wet mix [0, 1].
    pub mix: f64,
}

impl Default for ChorusConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            rate: 1.5,
            depth: 0.002,
            delay: 0.015,
            mix: 0.35,
        }
    }
}

/// Per-voice phaser.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PhaserConfig {
    pub enabled: bool,
    /// LFO rate in Hz.
    pub rate: f64,
    /// Modulation depth [0, 1].
    pub depth: f64,
    /// Number of cascaded smoothing stages.
    pub stages: usize,
    /// Feedback scale [0, 1].
    pub feedback: f64,
}

impl Default for PhaserConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            rate: 0.6,
            depth: 0.7,
            stages: 4,
            feedback: 0.4,
        }
    }
}

/// Per-voice flanger.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FlangerConfig {
    pub enabled: bool,
    /// LFO rate in Hz.
    pub rate: f64,
    /// Modulation depth in seconds.
    pub depth: f64,
    /// Base delay time in seconds.
    pub delay: f64,
    /// Dry/wet mix [0, 1].
    pub mix: f64,
}

impl Default for FlangerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            rate: 0.25,
            depth: 0.002,
            delay: 0.003,
            mix: 0.5,
        }
    }
}

/// Peak-normalization utility parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizationConfig {
    pub enabled: bool,
    /// Normalize only when the buffer peak exceeds this level.
    pub threshold: f64,
    /// Peak level the buffer is scaled to.
    pub target: f64,
}

impl Default for NormalizationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            threshold: 1.0,
            target: 0.98,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_round_trips_through_json() {
        let config = EngineConfig::default();
        let json = serde_json::to_string(&config).expect("serialize");
        let back: EngineConfig = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back.audio.sample_rate, 44100);
        assert_eq!(back.performance.gpu_chunk_frames, 4096);
        assert!(back.synthesis.anti_pop);
    }

    #[test]
    fn partial_config_uses_defaults() {
        let json = r#"{ "audio": { "sample_rate": 48000 } }"#;
        let config: EngineConfig = serde_json::from_str(json).expect("deserialize");
        assert_eq!(config.audio.sample_rate, 48000);
        // Everything else falls back to defaults
        assert!((config.audio.master_volume - 0.8).abs() < 1e-12);
        assert!(!config.effects.reverb.enabled);
        assert!((config.effects.reverb.room_size - 0.5).abs() < 1e-12);
    }

    #[test]
    fn effect_flags_default_off() {
        let fx = EffectsConfig::default();
        assert!(!fx.dc_removal.enabled);
        assert!(!fx.compressor.enabled);
        assert!(!fx.reverb.enabled);
        assert!(!fx.limiter.enabled);
        assert!(!fx.delay.enabled);
        assert!(!fx.distortion.enabled);
        assert!(!fx.bit_crusher.enabled);
        assert!(!fx.convolution.enabled);
        assert!(!fx.equalizer.enabled);
    }
}
