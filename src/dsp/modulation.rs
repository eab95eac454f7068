//! Per-voice modulation effects — chorus, phaser, flanger.
//!
//! These run inside the renderer on each voice's mono signal before
//! panning, not in the global chain, so every channel worker owns its own
//! instances (see `EffectsProcessor::voice_effects`).

use std::f64::consts::PI;

use crate::config::{ChorusConfig, EffectsConfig, FlangerConfig, PhaserConfig};

/// Read from a mono delay ring with linear interpolation.
#[inline]
fn read_interpolated(buffer: &[f64], write_pos: usize, delay_samples: f64) -> f64 {
    let len = buffer.len();
    let delay_int = delay_samples as usize;
    let frac = delay_samples - delay_int as f64;

    let read_0 = (write_pos + len - delay_int % len) % len;
    let read_1 = (read_0 + len - 1) % len;

    let s0 = buffer[read_0];
    let s1 = buffer[read_1];
    s0 + frac * (s1 - s0)
}

/// Mono chorus: the input blended with an LFO-modulated delayed copy.
#[derive(Debug, Clone)]
pub struct Chorus {
    buffer: Vec<f64>,
    write_pos: usize,
    sample_rate: f64,

    pub rate: f64,
    /// Modulation depth in seconds.
    pub depth: f64,
    /// Base delay in seconds.
    pub delay: f64,
    pub mix: f64,
}

impl Chorus {
    pub fn new(sample_rate: f64, config: &ChorusConfig) -> Self {
        let max_delay = (config.delay + config.depth).max(0.001) * 2.0;
        Self {
            buffer: vec![0.0; (sample_rate * max_delay) as usize + 2],
            write_pos: 0,
            sample_rate,
            rate: config.rate.clamp(0.01, 20.0),
            depth: config.depth.max(0.0),
            delay: config.delay.max(0.0),
            mix: config.mix.clamp(0.0, 1.0),
        }
    }

    #[inline]
    pub fn process(&mut self, input: f64, time: f64) -> f64 {
        let len = self.buffer.len();
        self.buffer[self.write_pos] = input;

        let lfo = (2.0 * PI * self.rate * time).sin();
        let delay_samples =
            ((self.delay + self.depth * lfo) * self.sample_rate).clamp(1.0, (len - 1) as f64);
        let wet = read_interpolated(&self.buffer, self.write_pos, delay_samples);

        self.write_pos = (self.write_pos + 1) % len;

        input * (1.0 - self.mix) + wet * self.mix
    }

    pub fn clear(&mut self) {
        self.buffer.fill(0.0);
        self.write_pos = 0;
    }
}

/// Mono phaser: cascaded one-pole smoothing stages swept by an LFO.
#[derive(Debug, Clone)]
pub struct Phaser {
    stages: Vec<f64>,

    pub rate: f64,
    pub depth: f64,
    pub feedback: f64,
}

impl Phaser {
    pub fn new(config: &PhaserConfig) -> Self {
        Self {
            stages: vec![0.0; config.stages.clamp(1, 12)],
            rate: config.rate.clamp(0.01, 10.0),
            depth: config.depth.clamp(0.0, 1.0),
            feedback: config.feedback.clamp(0.0, 1.0),
        }
    }

    #[inline]
    pub fn process(&mut self, input: f64, time: f64) -> f64 {
        // LFO sweeps the smoothing coefficient over [0, depth]
        let lfo = 0.5 + 0.5 * (2.0 * PI * self.rate * time).sin();
        let coeff = (lfo * self.depth).clamp(0.0, 0.99);

        let mut x = input;
        for stage in self.stages.iter_mut() {
            *stage += (1.0 - coeff) * (x - *stage);
            x = *stage;
        }

        input * (1.0 - self.feedback) + x * self.feedback
    }

    pub fn clear(&mut self) {
        self.stages.fill(0.0);
    }
}

/// Mono flanger: a short modulated-delay tap mixed with the input.
#[derive(Debug, Clone)]
pub struct Flanger {
    buffer: Vec<f64>,
    write_pos: usize,
    sample_rate: f64,

    pub rate: f64,
    /// Modulation depth in seconds.
    pub depth: f64,
    /// Base delay in seconds.
    pub delay: f64,
    pub mix: f64,
}

impl Flanger {
    pub fn new(sample_rate: f64, config: &FlangerConfig) -> Self {
        let max_delay = (config.delay + config.depth).max(0.001) * 2.0;
        Self {
            buffer: vec![0.0; (sample_rate * max_delay) as usize + 2],
            write_pos: 0,
            sample_rate,
            rate: config.rate.clamp(0.01, 10.0),
            depth: config.depth.max(0.0),
            delay: config.delay.max(0.0),
            mix: config.mix.clamp(0.0, 1.0),
        }
    }

    #[inline]
    pub fn process(&mut self, input: f64, time: f64) -> f64 {
        let len = self.buffer.len();
        self.buffer[self.write_pos] = input;

        let lfo = (2.0 * PI * self.rate * time).sin();
        let delay_samples =
            ((self.delay + self.depth * lfo) * self.sample_rate).clamp(1.0, (len - 1) as f64);
        let tap = read_interpolated(&self.buffer, self.write_pos, delay_samples);

        self.write_pos = (self.write_pos + 1) % len;

        input * (1.0 - self.mix) + tap * self.mix
    }

    pub fn clear(&mut self) {
        self.buffer.fill(0.0);
        self.write_pos = 0;
    }
}

/// The per-voice effect stack a channel worker owns during rendering.
#[derive(Debug, Clone, Default)]
pub struct VoiceEffects {
    pub chorus: Option<Chorus>,
    pub phaser: Option<Phaser>,
    pub flanger: Option<Flanger>,
}

impl VoiceEffects {
    pub fn from_config(config: &EffectsConfig, sample_rate: f64) -> Self {
        Self {
            chorus: config
                .chorus
                .enabled
                .then(|| Chorus::new(sample_rate, &config.chorus)),
            phaser: config.phaser.enabled.then(|| Phaser::new(&config.phaser)),
            flanger: config
                .flanger
                .enabled
                .then(|| Flanger::new(sample_rate, &config.flanger)),
        }
    }

    /// True when no per-voice effect is configured.
    pub fn is_empty(&self) -> bool {
        self.chorus.is_none() && self.phaser.is_none() && self.flanger.is_none()
    }

    #[inline]
    pub fn process(&mut self, input: f64, time: f64) -> f64 {
        let mut sample = input;
        if let Some(chorus) = &mut self.chorus {
            sample = chorus.process(sample, time);
        }
        if let Some(phaser) = &mut self.phaser {
            sample = phaser.process(sample, time);
        }
        if let Some(flanger) = &mut self.flanger {
            sample = flanger.process(sample, time);
        }
        sample
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chorus_config(mix: f64) -> ChorusConfig {
        ChorusConfig {
            enabled: true,
            rate: 1.5,
            depth: 0.002,
            delay: 0.015,
            mix,
        }
    }

    #[test]
    fn chorus_passthrough_when_dry() {
        let mut chorus = Chorus::new(44100.0, &chorus_config(0.0));
        let out = chorus.process(0.5, 0.0);
        assert!((out - 0.5).abs() < 1e-9);
    }

    #[test]
    fn chorus_reads_a_delayed_sample() {
        // With zero depth the chorus is a fixed delay: an impulse must
        // re-emerge after the base delay time.
        let sample_rate = 1000.0;
        let config = ChorusConfig {
            enabled: true,
            rate: 1.0,
            depth: 0.0,
            delay: 0.01, // 10 samples
            mix: 1.0,
        };
        let mut chorus = Chorus::new(sample_rate, &config);
        let mut outputs = Vec::new();
        for i in 0..30 {
            let input = if i == 0 { 1.0 } else { 0.0 };
            outputs.push(chorus.process(input, i as f64 / sample_rate));
        }
        assert!(outputs[0].abs() < 1e-9, "Wet-only chorus should not leak the dry impulse");
        assert!(
            (outputs[10] - 1.0).abs() < 1e-6,
            "Impulse should re-emerge after the base delay, got {:?}",
            &outputs[8..13]
        );
    }

    #[test]
    fn phaser_bounded_on_sine_input() {
        let config = PhaserConfig {
            enabled: true,
            rate: 0.6,
            depth: 0.7,
            stages: 4,
            feedback: 0.4,
        };
        let mut phaser = Phaser::new(&config);
        for i in 0..44100 {
            let t = i as f64 / 44100.0;
            let out = phaser.process((2.0 * PI * 440.0 * t).sin(), t);
            assert!(out.abs() <= 2.0, "Phaser output out of range: {out}");
        }
    }

    #[test]
    fn phaser_alters_signal_when_active() {
        let config = PhaserConfig {
            enabled: true,
            rate: 0.6,
            depth: 0.9,
            stages: 6,
            feedback: 1.0,
        };
        let mut phaser = Phaser::new(&config);
        let mut differs = false;
        for i in 0..4410 {
            let t = i as f64 / 44100.0;
            let input = (2.0 * PI * 2000.0 * t).sin();
            let out = phaser.process(input, t);
            if (out - input).abs() > 0.01 {
                differs = true;
                break;
            }
        }
        assert!(differs, "Full-feedback phaser should color the signal");
    }

    #[test]
    fn flanger_mixes_delayed_tap() {
        let sample_rate = 1000.0;
        let config = FlangerConfig {
            enabled: true,
            rate: 0.25,
            depth: 0.0,
            delay: 0.005, // 5 samples
            mix: 0.5,
        };
        let mut flanger = Flanger::new(sample_rate, &config);
        let mut outputs = Vec::new();
        for i in 0..20 {
            let input = if i == 0 { 1.0 } else { 0.0 };
            outputs.push(flanger.process(input, i as f64 / sample_rate));
        }
        assert!((outputs[0] - 0.5).abs() < 1e-6, "Half-dry impulse first");
        assert!((outputs[5] - 0.5).abs() < 1e-6, "Delayed tap at half mix after 5 samples");
    }

    #[test]
    fn voice_effects_empty_is_identity() {
        let config = EffectsConfig::default();
        let mut fx = VoiceEffects::from_config(&config, 44100.0);
        assert!(fx.is_empty());
        assert_eq!(fx.process(0.7, 0.1), 0.7);
    }

    #[test]
    fn voice_effects_built_from_flags() {
        let mut config = EffectsConfig::default();
        config.chorus.enabled = true;
        config.flanger.enabled = true;
        let fx = VoiceEffects::from_config(&config, 44100.0);
        assert!(fx.chorus.is_some());
        assert!(fx.phaser.is_none());
        assert!(fx.flanger.is_some());
    }
}
