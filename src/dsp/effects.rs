//! Global effects chain — orchestrates every post-render stage.
//!
//! The chain order is a contract: DC removal → compression → algorithmic
//! reverb → limiter → ping-pong delay → distortion → bit-crusher →
//! convolution reverb → equalizer. Configuration toggles stage presence,
//! never stage order, so later stages always see the cumulative result of
//! earlier ones. Convolution and EQ carry GPU strategies: the processor
//! attempts the device first and substitutes the CPU equivalent on any
//! typed failure.

use std::sync::Arc;

use super::convolution::{ConvolutionReverb, ImpulseResponse};
use super::delay::PingPongDelay;
use super::distortion::{BitCrusher, Distortion};
use super::dynamics::{Compressor, DcBlocker, Limiter};
use super::eq::{EqBand, Equalizer};
use super::modulation::VoiceEffects;
use super::reverb::SchroederReverb;
use crate::config::EngineConfig;
use crate::error::ComputeError;
use crate::gpu::{ComputeDevice, KernelCall};

/// Impulse responses longer than this are not dispatched to a device.
pub const GPU_MAX_IMPULSE: usize = 8192;

/// One stage of the global chain: a tag plus its parameters and state.
pub enum EffectStage {
    DcRemoval(DcBlocker),
    Compressor(Compressor),
    Reverb(SchroederReverb),
    Limiter(Limiter),
    Delay(PingPongDelay),
    Distortion(Distortion),
    BitCrusher(BitCrusher),
    Convolution(ConvolutionReverb),
    Equalizer(Equalizer),
}

impl EffectStage {
    /// Apply this stage on the CPU.
    fn apply(&mut self, buffer: &mut [f32]) {
        match self {
            EffectStage::DcRemoval(dc) => dc.process_buffer(buffer),
            EffectStage::Compressor(comp) => comp.process_buffer(buffer),
            EffectStage::Reverb(reverb) => reverb.process_buffer(buffer),
            EffectStage::Limiter(limiter) => limiter.process_buffer(buffer),
            EffectStage::Delay(delay) => delay.process_buffer(buffer),
            EffectStage::Distortion(dist) => dist.process_buffer(buffer),
            EffectStage::BitCrusher(crusher) => crusher.process_buffer(buffer),
            EffectStage::Convolution(conv) => conv.process_buffer(buffer),
            EffectStage::Equalizer(eq) => eq.process_buffer(buffer),
        }
    }

    /// Clear DSP state without touching parameters.
    fn clear(&mut self) {
        match self {
            EffectStage::DcRemoval(dc) => dc.clear(),
            EffectStage::Compressor(comp) => comp.clear(),
            EffectStage::Reverb(reverb) => reverb.clear(),
            EffectStage::Limiter(_) => {}
            EffectStage::Delay(delay) => delay.clear(),
            EffectStage::Distortion(_) => {}
            EffectStage::BitCrusher(crusher) => crusher.clear(),
            EffectStage::Convolution(conv) => conv.clear(),
            EffectStage::Equalizer(eq) => eq.clear(),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            EffectStage::DcRemoval(_) => "dc_removal",
            EffectStage::Compressor(_) => "compressor",
            EffectStage::Reverb(_) => "reverb",
            EffectStage::Limiter(_) => "limiter",
            EffectStage::Delay(_) => "delay",
            EffectStage::Distortion(_) => "distortion",
            EffectStage::BitCrusher(_) => "bit_crusher",
            EffectStage::Convolution(_) => "convolution",
            EffectStage::Equalizer(_) => "equalizer",
        }
    }
}

/// The global effects processor.
///
/// One instance processes one buffer at a time; callers serialize calls.
/// Internal state (delay rings, filter histories, the convolution tail)
/// is therefore not synchronized, and an instance must never be shared
/// across two concurrently-rendering buffers.
pub struct EffectsProcessor {
    config: EngineConfig,
    chain: Vec<EffectStage>,
    impulse: Option<ImpulseResponse>,
    eq_bands: [EqBand; 3],
    device: Option<Arc<dyn ComputeDevice>>,
}

impl EffectsProcessor {
    pub fn new(config: &EngineConfig) -> Self {
        Self::build(config, None)
    }

    /// Create a processor that attempts GPU strategies on `device` before
    /// falling back to the CPU implementations.
    pub fn with_device(config: &EngineConfig, device: Arc<dyn ComputeDevice>) -> Self {
        Self::build(config, Some(device))
    }

    fn build(config: &EngineConfig, device: Option<Arc<dyn ComputeDevice>>) -> Self {
        let sample_rate = config.audio.sample_rate as f64;
        let fx = &config.effects;

        let impulse = fx.convolution.enabled.then(|| match &fx.convolution.impulse_path {
            Some(path) => ImpulseResponse::load(
                path,
                fx.convolution.max_impulse_seconds,
                config.audio.sample_rate,
            ),
            None => ImpulseResponse::synthetic(
                config.audio.sample_rate,
                fx.convolution.max_impulse_seconds.min(1.5),
            ),
        });

        // Contractual order; configuration only controls presence.
        let mut chain = Vec::new();
        if fx.dc_removal.enabled {
            chain.push(EffectStage::DcRemoval(DcBlocker::new()));
        }
        if fx.compressor.enabled {
            chain.push(EffectStage::Compressor(Compressor::with_params(
                sample_rate,
                fx.compressor.threshold,
                fx.compressor.ratio,
                fx.compressor.attack,
                fx.compressor.release,
            )));
        }
        if fx.reverb.enabled {
            chain.push(EffectStage::Reverb(SchroederReverb::with_params(
                sample_rate,
                fx.reverb.room_size,
                fx.reverb.damping,
                fx.reverb.wet,
                fx.reverb.dry,
                fx.reverb.width,
            )));
        }
        if fx.limiter.enabled {
            chain.push(EffectStage::Limiter(Limiter::new(fx.limiter.threshold)));
        }
        if fx.delay.enabled {
            chain.push(EffectStage::Delay(PingPongDelay::with_params(
                sample_rate,
                fx.delay.time,
                fx.delay.feedback,
                fx.delay.mix,
            )));
        }
        if fx.distortion.enabled {
            chain.push(EffectStage::Distortion(Distortion::new(
                fx.distortion.drive,
                fx.distortion.mix,
                fx.distortion.shape,
            )));
        }
        if fx.bit_crusher.enabled {
            chain.push(EffectStage::BitCrusher(BitCrusher::new(
                fx.bit_crusher.bit_depth,
                fx.bit_crusher.rate_reduction,
            )));
        }
        if let Some(ir) = &impulse {
            chain.push(EffectStage::Convolution(ConvolutionReverb::new(
                ir,
                fx.convolution.wet,
                fx.convolution.dry,
            )));
        }
        if fx.equalizer.enabled {
            chain.push(EffectStage::Equalizer(Equalizer::new(&fx.equalizer, sample_rate)));
        }

        Self {
            eq_bands: Equalizer::bands(&fx.equalizer),
            config: config.clone(),
            chain,
            impulse,
            device,
        }
    }

    /// Names of the stages present, in chain order.
    pub fn active_stages(&self) -> Vec<&'static str> {
        self.chain.iter().map(|s| s.name()).collect()
    }

    /// Run the configured chain over an interleaved stereo buffer.
    pub fn apply_enhancements(&mut self, buffer: &mut [f32]) {
        let Self {
            chain,
            impulse,
            eq_bands,
            device,
            config,
        } = self;
        let sample_rate = config.audio.sample_rate as f64;
        let prefer_gpu = config.performance.prefer_gpu;

        for stage in chain.iter_mut() {
            if prefer_gpu {
                if let Some(device) = device.as_deref() {
                    match stage {
                        EffectStage::Convolution(conv) => {
                            match gpu_convolve(device, impulse.as_ref(), conv, buffer) {
                                Ok(()) => continue,
                                Err(err) => {
                                    log::warn!("GPU convolution failed ({err}); using CPU path");
                                }
                            }
                        }
                        EffectStage::Equalizer(_) => {
                            match gpu_equalize(device, eq_bands, sample_rate, buffer) {
                                Ok(()) => continue,
                                Err(err) => {
                                    log::warn!("GPU equalizer failed ({err}); using CPU path");
                                }
                            }
                        }
                        _ => {}
                    }
                }
            }
            stage.apply(buffer);
        }
    }

    /// Peak-normalize per the configured threshold/target. Returns the
    /// applied scale factor, or `None` when the peak was under threshold.
    pub fn normalize(&self, buffer: &mut [f32]) -> Option<f32> {
        let cfg = &self.config.effects.normalization;
        if !cfg.enabled {
            return None;
        }
        normalize_buffer(buffer, cfg.threshold, cfg.target)
    }

    /// Build a fresh per-voice effect stack for one channel worker.
    pub fn voice_effects(&self) -> VoiceEffects {
        VoiceEffects::from_config(&self.config.effects, self.config.audio.sample_rate as f64)
    }

    /// Clear all DSP state (delay lines, filter histories, envelopes)
    /// without discarding configuration.
    pub fn reset(&mut self) {
        for stage in self.chain.iter_mut() {
            stage.clear();
        }
    }
}

impl std::fmt::Debug for EffectsProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectsProcessor")
            .field("stages", &self.active_stages())
            .field("has_device", &self.device.is_some())
            .finish()
    }
}

/// Scale the whole buffer so its peak lands on `target`, when the peak
/// exceeds `threshold`.
pub fn normalize_buffer(buffer: &mut [f32], threshold: f64, target: f64) -> Option<f32> {
    let peak = buffer.iter().fold(0.0_f32, |m, &s| m.max(s.abs()));
    if peak <= threshold as f32 || peak == 0.0 {
        return None;
    }
    let scale = (target as f32 / peak).max(0.0);
    for sample in buffer.iter_mut() {
        *sample *= scale;
    }
    Some(scale)
}

/// Dispatch one `Convolve` kernel over the buffer's mono downmix and mix
/// the wet result back. A single dispatch per call; impulses longer than
/// [`GPU_MAX_IMPULSE`] are refused so the caller takes the CPU path.
fn gpu_convolve(
    device: &dyn ComputeDevice,
    impulse: Option<&ImpulseResponse>,
    conv: &ConvolutionReverb,
    buffer: &mut [f32],
) -> Result<(), ComputeError> {
    let impulse = impulse.ok_or(ComputeError::DeviceUnavailable)?;
    if impulse.len() > GPU_MAX_IMPULSE {
        return Err(ComputeError::UnsupportedSize {
            requested: impulse.len(),
            max: GPU_MAX_IMPULSE,
        });
    }

    let mono: Vec<f32> = buffer
        .chunks_exact(2)
        .map(|f| (f[0] + f[1]) * 0.5)
        .collect();
    let mut wet = vec![0.0_f32; mono.len()];
    device.dispatch(KernelCall::Convolve {
        input: &mono,
        impulse: &impulse.samples,
        output: &mut wet,
    })?;

    let wet_level = conv.wet as f32;
    let dry_level = conv.dry as f32;
    for (frame, &w) in buffer.chunks_exact_mut(2).zip(&wet) {
        frame[0] = frame[0] * dry_level + w * wet_level;
        frame[1] = frame[1] * dry_level + w * wet_level;
    }
    Ok(())
}

/// Dispatch one `SpectralEq` kernel over the whole buffer.
fn gpu_equalize(
    device: &dyn ComputeDevice,
    bands: &[EqBand; 3],
    sample_rate: f64,
    buffer: &mut [f32],
) -> Result<(), ComputeError> {
    let input = buffer.to_vec();
    device.dispatch(KernelCall::SpectralEq {
        input: &input,
        bands: *bands,
        sample_rate,
        output: buffer,
    })
}
