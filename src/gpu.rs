//! Compute-device contract for the GPU rendering and effects strategies.
//!
//! The pipeline never talks to a GPU API directly: it batches parameters,
//! names a kernel, and hands borrowed buffers to a [`ComputeDevice`]. Any
//! dispatch may fail with a typed [`ComputeError`], and every caller in
//! this crate treats that as "fall back to the CPU equivalent and warn" —
//! never as a reason to abort a render.
//!
//! [`SoftwareDevice`] executes each kernel in plain Rust. It is the
//! executable specification a real backend must match, and the test
//! double used for CPU/GPU equivalence and fallback coverage.

use crate::dsp::eq::EqBand;
use crate::dsp::svf::{SvfState, svf_tick};
use crate::error::ComputeError;
use crate::model::{FilterKind, Waveform};
use crate::synth::{adsr_value, waveform_sample};

/// Flat per-note parameters for the note-batch kernels.
///
/// These carry everything a work item needs to render one note without
/// calling back into the host: analytic ADSR shape, basic waveform, filter
/// parameters, and precomputed equal-power pan gains.
#[derive(Debug, Clone, Copy)]
pub struct NoteKernelParams {
    pub frequency: f64,
    /// Velocity, channel, instrument, and master gain folded together.
    pub amplitude: f64,
    pub waveform: Waveform,
    pub attack: f64,
    pub decay: f64,
    pub sustain: f64,
    pub release: f64,
    pub start_sample: usize,
    /// Exclusive end.
    pub end_sample: usize,
    pub filter_kind: FilterKind,
    pub cutoff: f64,
    pub resonance: f64,
    pub pan_left: f64,
    pub pan_right: f64,
}

/// A named, parametrized kernel over borrowed buffers.
pub enum KernelCall<'a> {
    /// Accumulate `params.len()` notes into an interleaved stereo chunk
    /// starting at absolute sample index `chunk_start`. One work item per
    /// note.
    RenderNotes {
        params: &'a [NoteKernelParams],
        sample_rate: f64,
        chunk_start: usize,
        output: &'a mut [f32],
    },
    /// Convolve a mono signal with an impulse response, truncated to the
    /// input length. One work item per output sample.
    Convolve {
        input: &'a [f32],
        impulse: &'a [f32],
        output: &'a mut [f32],
    },
    /// Frequency-domain three-band EQ over a whole interleaved buffer.
    SpectralEq {
        input: &'a [f32],
        bands: [EqBand; 3],
        sample_rate: f64,
        output: &'a mut [f32],
    },
}

impl KernelCall<'_> {
    /// Work-item count for this call.
    pub fn work_items(&self) -> usize {
        match self {
            KernelCall::RenderNotes { params, .. } => params.len(),
            KernelCall::Convolve { output, .. } => output.len(),
            KernelCall::SpectralEq { output, .. } => output.len() / 2,
        }
    }
}

/// A synchronous compute device.
///
/// Implementations run the named kernel to completion or fail with a
/// typed error; they must never panic across this boundary.
pub trait ComputeDevice: Send + Sync {
    fn dispatch(&self, call: KernelCall<'_>) -> Result<(), ComputeError>;
}

/// Reference device that executes every kernel in software.
#[derive(Debug, Clone, Copy, Default)]
pub struct SoftwareDevice;

impl SoftwareDevice {
    pub fn new() -> Self {
        Self
    }
}

impl ComputeDevice for SoftwareDevice {
    fn dispatch(&self, call: KernelCall<'_>) -> Result<(), ComputeError> {
        match call {
            KernelCall::RenderNotes {
                params,
                sample_rate,
                chunk_start,
                output,
            } => {
                let frames = output.len() / 2;
                for note in params {
                    render_note_work_item(note, sample_rate, chunk_start, frames, output);
                }
                Ok(())
            }
            KernelCall::Convolve {
                input,
                impulse,
                output,
            } => {
                if output.len() != input.len() {
                    return Err(ComputeError::UnsupportedSize {
                        requested: output.len(),
                        max: input.len(),
                    });
                }
                for (n, out) in output.iter_mut().enumerate() {
                    let mut acc = 0.0_f64;
                    let k_max = n.min(impulse.len().saturating_sub(1));
                    for k in 0..=k_max {
                        acc += impulse[k] as f64 * input[n - k] as f64;
                    }
                    *out = acc as f32;
                }
                Ok(())
            }
            KernelCall::SpectralEq {
                input,
                bands,
                sample_rate,
                output,
            } => {
                if output.len() != input.len() {
                    return Err(ComputeError::UnsupportedSize {
                        requested: output.len(),
                        max: input.len(),
                    });
                }
                crate::dsp::eq::spectral_equalize(input, output, &bands, sample_rate);
                Ok(())
            }
        }
    }
}

/// One note-batch work item: render a single note across the chunk.
///
/// Filter state is chunk-local, matching a dispatch-per-chunk backend
/// where no state survives between passes.
fn render_note_work_item(
    note: &NoteKernelParams,
    sample_rate: f64,
    chunk_start: usize,
    frames: usize,
    output: &mut [f32],
) {
    let total = note.end_sample.saturating_sub(note.start_sample);
    if total == 0 {
        return;
    }
    let mut filter = SvfState::default();
    for frame in 0..frames {
        let global = chunk_start + frame;
        if global < note.start_sample || global >= note.end_sample {
            continue;
        }
        let elapsed = global - note.start_sample;
        let t = elapsed as f64 / sample_rate;
        let env = adsr_value(
            note.attack,
            note.decay,
            note.sustain,
            note.release,
            sample_rate,
            elapsed,
            total,
        );
        let mut sample = waveform_sample(note.waveform, note.frequency, t) * note.amplitude * env;
        if note.filter_kind != FilterKind::None {
            sample = svf_tick(
                &mut filter,
                note.filter_kind,
                sample,
                note.cutoff,
                note.resonance,
                sample_rate,
            );
        }
        output[2 * frame] += (sample * note.pan_left) as f32;
        output[2 * frame + 1] += (sample * note.pan_right) as f32;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn convolve_with_unit_impulse_is_identity() {
        let device = SoftwareDevice::new();
        let input: Vec<f32> = (0..64).map(|i| ((i as f32) * 0.1).sin()).collect();
        let impulse = vec![1.0_f32];
        let mut output = vec![0.0_f32; input.len()];
        device
            .dispatch(KernelCall::Convolve {
                input: &input,
                impulse: &impulse,
                output: &mut output,
            })
            .expect("dispatch");
        for (a, b) in input.iter().zip(output.iter()) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn convolve_delays_by_impulse_offset() {
        let device = SoftwareDevice::new();
        let mut input = vec![0.0_f32; 16];
        input[0] = 1.0;
        // Impulse of [0, 0, 0.5] delays by two samples and halves
        let impulse = vec![0.0, 0.0, 0.5_f32];
        let mut output = vec![0.0_f32; 16];
        device
            .dispatch(KernelCall::Convolve {
                input: &input,
                impulse: &impulse,
                output: &mut output,
            })
            .expect("dispatch");
        assert!(output[0].abs() < 1e-9);
        assert!(output[1].abs() < 1e-9);
        assert!((output[2] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn render_notes_outside_chunk_is_silent() {
        let device = SoftwareDevice::new();
        let note = NoteKernelParams {
            frequency: 440.0,
            amplitude: 1.0,
            waveform: Waveform::Sine,
            attack: 0.01,
            decay: 0.1,
            sustain: 0.7,
            release: 0.1,
            start_sample: 10_000,
            end_sample: 20_000,
            filter_kind: FilterKind::None,
            cutoff: 0.0,
            resonance: 0.0,
            pan_left: 0.707,
            pan_right: 0.707,
        };
        let mut output = vec![0.0_f32; 512];
        device
            .dispatch(KernelCall::RenderNotes {
                params: &[note],
                sample_rate: 44100.0,
                chunk_start: 0,
                output: &mut output,
            })
            .expect("dispatch");
        assert!(output.iter().all(|&s| s == 0.0), "Chunk before the note must stay silent");
    }

    #[test]
    fn render_notes_accumulates_into_chunk() {
        let device = SoftwareDevice::new();
        let note = NoteKernelParams {
            frequency: 440.0,
            amplitude: 0.5,
            waveform: Waveform::Sine,
            attack: 0.0,
            decay: 0.0,
            sustain: 1.0,
            release: 0.0,
            start_sample: 0,
            end_sample: 256,
            filter_kind: FilterKind::None,
            cutoff: 0.0,
            resonance: 0.0,
            pan_left: 1.0,
            pan_right: 1.0,
        };
        let mut output = vec![0.0_f32; 512];
        device
            .dispatch(KernelCall::RenderNotes {
                params: &[note],
                sample_rate: 44100.0,
                chunk_start: 0,
                output: &mut output,
            })
            .expect("dispatch");
        let peak = output.iter().fold(0.0_f32, |m, &s| m.max(s.abs()));
        assert!(peak > 0.1, "Note inside the chunk should produce signal, peak={peak}");
    }
}
