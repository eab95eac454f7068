//! Audio renderer — turns note events plus channel/instrument state into
//! a mixed interleaved stereo buffer.
//!
//! Notes are grouped by MIDI channel and each channel is rendered
//! independently on a worker pool into a scratch buffer leased from a
//! per-call arena; the only shared mutable resource is the output buffer,
//! and every write to it happens under one lock as a plain vector sum.
//! Three strategies share the same note semantics: the per-sample CPU
//! path, the chunked GPU batch path, and the single-dispatch GPU
//! realtime path. GPU failures are typed and non-fatal; the orchestrating
//! [`AudioRenderer::render`] substitutes the CPU path and logs a warning.

use std::f64::consts::PI;
use std::ops::{Deref, DerefMut};

use parking_lot::Mutex;

use super::effects::EffectsProcessor;
use super::modulation::VoiceEffects;
use super::svf::FilterProcessor;
use crate::config::EngineConfig;
use crate::error::{ComputeError, RenderError};
use crate::gpu::{ComputeDevice, KernelCall, NoteKernelParams};
use crate::model::{
    CHANNEL_COUNT, ChannelState, InstrumentSettings, InstrumentTable, MAX_CHANNEL, MIN_CHANNEL,
    NoteEvent,
};
use crate::synth::Synthesizer;

/// Lanes per accumulation step; the scalar tail handles the remainder.
const ACCUM_LANES: usize = 8;

/// Scratch-buffer arena owned by a single render call.
///
/// Leases are returned on drop, including during unwinding, so a worker
/// panic can never leak a pooled buffer.
struct BufferArena {
    pool: Mutex<Vec<Vec<f32>>>,
}

impl BufferArena {
    fn new() -> Self {
        Self {
            pool: Mutex::new(Vec::new()),
        }
    }

    /// Lease a zeroed buffer of `len` samples.
    fn lease(&self, len: usize) -> BufferLease<'_> {
        let mut buf = self.pool.lock().pop().unwrap_or_default();
        buf.clear();
        buf.resize(len, 0.0);
        BufferLease { arena: self, buf }
    }
}

struct BufferLease<'a> {
    arena: &'a BufferArena,
    buf: Vec<f32>,
}

impl Deref for BufferLease<'_> {
    type Target = [f32];
    fn deref(&self) -> &[f32] {
        &self.buf
    }
}

impl DerefMut for BufferLease<'_> {
    fn deref_mut(&mut self) -> &mut [f32] {
        &mut self.buf
    }
}

impl Drop for BufferLease<'_> {
    fn drop(&mut self) {
        self.arena.pool.lock().push(std::mem::take(&mut self.buf));
    }
}

/// Wide vector addition: fixed-lane chunks plus a scalar tail.
fn accumulate_wide(dst: &mut [f32], src: &[f32]) {
    let n = dst.len().min(src.len());
    let mut dst_chunks = dst[..n].chunks_exact_mut(ACCUM_LANES);
    let mut src_chunks = src[..n].chunks_exact(ACCUM_LANES);
    for (d, s) in (&mut dst_chunks).zip(&mut src_chunks) {
        for lane in 0..ACCUM_LANES {
            d[lane] += s[lane];
        }
    }
    for (d, s) in dst_chunks
        .into_remainder()
        .iter_mut()
        .zip(src_chunks.remainder())
    {
        *d += *s;
    }
}

/// The note renderer and mixing front end of the pipeline.
pub struct AudioRenderer {
    config: EngineConfig,
    sample_rate: f64,
    filter: FilterProcessor,
    pool: Option<rayon::ThreadPool>,
}

impl AudioRenderer {
    pub fn new(config: &EngineConfig) -> Self {
        let sample_rate = config.audio.sample_rate as f64;
        let pool = match config.performance.worker_threads {
            0 => None, // global pool, one worker per core
            n => match rayon::ThreadPoolBuilder::new().num_threads(n).build() {
                Ok(pool) => Some(pool),
                Err(err) => {
                    log::warn!("Failed to build a {n}-thread pool ({err}); using the global pool");
                    None
                }
            },
        };
        Self {
            config: config.clone(),
            sample_rate,
            filter: FilterProcessor::new(sample_rate),
            pool,
        }
    }

    /// Clear per-voice filter continuity.
    pub fn reset(&self) {
        self.filter.reset();
    }

    /// Render with the preferred strategy: GPU when configured, available,
    /// and the pass only uses batchable features; CPU otherwise. A failed
    /// GPU pass is logged, the buffer re-cleared, and the CPU path run —
    /// the caller always receives a fully rendered buffer.
    pub fn render(
        &self,
        buffer: &mut [f32],
        notes: &[NoteEvent],
        channels: &[ChannelState],
        instruments: &InstrumentTable,
        synth: &dyn Synthesizer,
        device: Option<&dyn ComputeDevice>,
    ) -> Result<(), RenderError> {
        if buffer.len() % 2 != 0 {
            return Err(RenderError::UnalignedBuffer { len: buffer.len() });
        }
        buffer.fill(0.0);
        if self.config.performance.prefer_gpu {
            if let Some(device) = device {
                if self.batchable(notes, channels, instruments) {
                    match self.render_gpu(buffer, notes, channels, instruments, synth, device) {
                        Ok(()) => return Ok(()),
                        Err(err) => {
                            log::warn!("GPU render failed ({err}); falling back to CPU");
                            buffer.fill(0.0);
                        }
                    }
                }
            }
        }
        self.render_high_quality(buffer, notes, channels, instruments, synth)
    }

    /// Per-sample CPU rendering with per-channel parallelism.
    ///
    /// Channel contributions are accumulated into `buffer`; the caller
    /// zeroes it (or accepts summing into existing content). The result
    /// is the sum of all channel renders regardless of thread count.
    pub fn render_high_quality(
        &self,
        buffer: &mut [f32],
        notes: &[NoteEvent],
        channels: &[ChannelState],
        instruments: &InstrumentTable,
        synth: &dyn Synthesizer,
    ) -> Result<(), RenderError> {
        if buffer.len() % 2 != 0 {
            return Err(RenderError::UnalignedBuffer { len: buffer.len() });
        }

        let mut groups: Vec<Vec<NoteEvent>> = vec![Vec::new(); CHANNEL_COUNT];
        for note in notes {
            match note.channel {
                MIN_CHANNEL..=MAX_CHANNEL => groups[(note.channel - 1) as usize].push(*note),
                other => log::debug!("Dropping note on out-of-range channel {other}"),
            }
        }

        let len = buffer.len();
        let arena = BufferArena::new();
        let out = Mutex::new(buffer);
        let default_state = ChannelState::default();

        let render_pass = || {
            rayon::scope(|scope| {
                for (idx, channel_notes) in groups.iter().enumerate() {
                    if channel_notes.is_empty() {
                        continue;
                    }
                    let arena = &arena;
                    let out = &out;
                    let state = channels.get(idx).unwrap_or(&default_state);
                    scope.spawn(move |_| {
                        let mut scratch = arena.lease(len);
                        self.render_channel(
                            &mut scratch,
                            idx,
                            channel_notes,
                            state,
                            instruments,
                            synth,
                        );
                        let mut guard = out.lock();
                        accumulate_wide(&mut guard[..], &scratch[..]);
                    });
                }
            });
        };

        match &self.pool {
            Some(pool) => pool.install(render_pass),
            None => render_pass(),
        }
        Ok(())
    }

    /// Render one channel's notes into its scratch buffer.
    fn render_channel(
        &self,
        scratch: &mut [f32],
        channel_idx: usize,
        notes: &[NoteEvent],
        state: &ChannelState,
        instruments: &InstrumentTable,
        synth: &dyn Synthesizer,
    ) {
        let mut voice_fx = VoiceEffects::from_config(&self.config.effects, self.sample_rate);
        let instrument = self.shaped_instrument(instruments.get(state.program), state);
        for note in notes {
            self.render_note_with_effects(
                scratch,
                note,
                channel_idx,
                state,
                &instrument,
                synth,
                &mut voice_fx,
            );
        }
    }

    /// Apply channel envelope multipliers and the anti-pop floors to an
    /// instrument, uniformly for every rendering path.
    fn shaped_instrument(
        &self,
        mut instrument: InstrumentSettings,
        state: &ChannelState,
    ) -> InstrumentSettings {
        instrument.attack *= state.attack_mult.max(0.0);
        instrument.decay *= state.decay_mult.max(0.0);
        instrument.release *= state.release_mult.max(0.0);
        let synthesis = &self.config.synthesis;
        if synthesis.anti_pop {
            instrument.attack = instrument.attack.max(synthesis.min_attack);
            instrument.release = instrument.release.max(synthesis.min_release);
        }
        instrument
    }

    /// Render one note: LFO-modulated pitch and amplitude, the per-note
    /// envelope with the sustain-pedal floor, an edge crossfade, the
    /// state-variable filter, per-voice modulation, and equal-power pan.
    fn render_note_with_effects(
        &self,
        buffer: &mut [f32],
        note: &NoteEvent,
        channel_idx: usize,
        state: &ChannelState,
        instrument: &InstrumentSettings,
        synth: &dyn Synthesizer,
        voice_fx: &mut VoiceEffects,
    ) {
        let frames = buffer.len() / 2;
        let total = note.duration();
        if total == 0 || note.start_sample >= frames {
            return;
        }

        let mut envelope = synth.make_envelope(instrument, self.sample_rate);
        let attack_samples = (instrument.attack * self.sample_rate) as usize;

        let velocity = note.velocity.min(127) as f64 / 127.0;
        let base_amp = velocity
            * state.volume
            * state.expression
            * instrument.volume
            * self.config.audio.master_volume;

        let angle = (state.pan.clamp(-1.0, 1.0) + 1.0) * PI / 4.0;
        let pan_l = angle.cos();
        let pan_r = angle.sin();

        let fade = self.config.synthesis.edge_fade_frames.min(total / 2);
        let end = note.end_sample.min(frames);

        for s in note.start_sample..end {
            let elapsed = s - note.start_sample;
            let t = elapsed as f64 / self.sample_rate;

            let lfo_cents = if instrument.pitch_lfo.is_active() {
                synth.lfo_value(&instrument.pitch_lfo, t) * instrument.pitch_lfo.depth * 100.0
            } else {
                0.0
            };
            let freq = synth.frequency(note.note, state.pitch_bend_cents, note.cent_offset, lfo_cents);

            let amp = if instrument.amplitude_lfo.is_active() {
                let lfo = synth.lfo_value(&instrument.amplitude_lfo, t);
                (base_amp * (1.0 + lfo * instrument.amplitude_lfo.depth)).max(0.0)
            } else {
                base_amp
            };

            let raw_env = envelope.value(elapsed, total);
            // Sustain pedal: hold the instrument's sustain level once the
            // envelope has decayed below it (never during the attack ramp)
            let env = if state.sustain && elapsed > attack_samples && raw_env < instrument.sustain {
                instrument.sustain
            } else {
                raw_env
            };

            let mut edge = 1.0;
            if fade > 0 {
                if elapsed < fade {
                    edge = elapsed as f64 / fade as f64;
                }
                let remaining = total - elapsed;
                if remaining <= fade {
                    edge = edge.min(remaining as f64 / fade as f64);
                }
            }

            let mut sample = synth.generate(
                instrument.waveform,
                freq,
                t,
                amp,
                env * edge,
                note.note,
                instrument.wavetable.as_ref(),
            );
            sample = self.filter.process(
                channel_idx,
                state.program,
                &instrument.filter,
                state,
                synth,
                sample,
                t,
            );
            sample = voice_fx.process(sample, t);

            buffer[2 * s] += (sample * pan_l) as f32;
            buffer[2 * s + 1] += (sample * pan_r) as f32;
        }
    }

    /// GPU batch strategy: clear the buffer, then one dispatch per
    /// fixed-size chunk over the notes overlapping it.
    ///
    /// Any dispatch failure leaves the caller to re-render on the CPU; the
    /// buffer was cleared up front, so a failed pass never leaks garbage.
    pub fn render_gpu(
        &self,
        buffer: &mut [f32],
        notes: &[NoteEvent],
        channels: &[ChannelState],
        instruments: &InstrumentTable,
        synth: &dyn Synthesizer,
        device: &dyn ComputeDevice,
    ) -> Result<(), ComputeError> {
        buffer.fill(0.0);
        let frames = buffer.len() / 2;
        let chunk = self.config.performance.gpu_chunk_frames.max(1);
        let params = self.note_params(notes, channels, instruments, synth);

        let mut chunk_start = 0;
        while chunk_start < frames {
            let chunk_frames = chunk.min(frames - chunk_start);
            let batch: Vec<NoteKernelParams> = params
                .iter()
                .filter(|p| p.start_sample < chunk_start + chunk_frames && p.end_sample > chunk_start)
                .copied()
                .collect();
            if !batch.is_empty() {
                let span = &mut buffer[2 * chunk_start..2 * (chunk_start + chunk_frames)];
                device.dispatch(KernelCall::RenderNotes {
                    params: &batch,
                    sample_rate: self.sample_rate,
                    chunk_start,
                    output: span,
                })?;
            }
            chunk_start += chunk_frames;
        }
        Ok(())
    }

    /// GPU realtime strategy: one dispatch over the whole buffer with a
    /// caller-supplied absolute sample offset, for low-latency playback
    /// windows.
    pub fn render_gpu_realtime(
        &self,
        buffer: &mut [f32],
        notes: &[NoteEvent],
        channels: &[ChannelState],
        instruments: &InstrumentTable,
        synth: &dyn Synthesizer,
        sample_offset: usize,
        device: &dyn ComputeDevice,
    ) -> Result<(), ComputeError> {
        buffer.fill(0.0);
        let frames = buffer.len() / 2;
        let params: Vec<NoteKernelParams> = self
            .note_params(notes, channels, instruments, synth)
            .into_iter()
            .filter(|p| p.start_sample < sample_offset + frames && p.end_sample > sample_offset)
            .collect();
        if params.is_empty() {
            return Ok(());
        }
        device.dispatch(KernelCall::RenderNotes {
            params: &params,
            sample_rate: self.sample_rate,
            chunk_start: sample_offset,
            output: buffer,
        })
    }

    /// Flatten notes into kernel parameters. Out-of-range channels are
    /// dropped exactly as on the CPU path.
    fn note_params(
        &self,
        notes: &[NoteEvent],
        channels: &[ChannelState],
        instruments: &InstrumentTable,
        synth: &dyn Synthesizer,
    ) -> Vec<NoteKernelParams> {
        let default_state = ChannelState::default();
        notes
            .iter()
            .filter(|n| (MIN_CHANNEL..=MAX_CHANNEL).contains(&n.channel) && n.duration() > 0)
            .map(|note| {
                let idx = (note.channel - 1) as usize;
                let state = channels.get(idx).unwrap_or(&default_state);
                let instrument = self.shaped_instrument(instruments.get(state.program), state);

                let velocity = note.velocity.min(127) as f64 / 127.0;
                let amplitude = velocity
                    * state.volume
                    * state.expression
                    * instrument.volume
                    * self.config.audio.master_volume;
                let angle = (state.pan.clamp(-1.0, 1.0) + 1.0) * PI / 4.0;

                NoteKernelParams {
                    frequency: synth.frequency(note.note, state.pitch_bend_cents, note.cent_offset, 0.0),
                    amplitude,
                    waveform: instrument.waveform,
                    attack: instrument.attack,
                    decay: instrument.decay,
                    sustain: instrument.sustain,
                    release: instrument.release,
                    start_sample: note.start_sample,
                    end_sample: note.end_sample,
                    filter_kind: instrument.filter.kind,
                    cutoff: instrument.filter.cutoff * state.cutoff_mult,
                    resonance: instrument.filter.resonance * state.resonance_mult,
                    pan_left: angle.cos(),
                    pan_right: angle.sin(),
                }
            })
            .collect()
    }

    /// Whether this pass only uses features the note-batch kernels carry:
    /// ADSR envelopes, plain waveforms, and static filter parameters.
    fn batchable(
        &self,
        notes: &[NoteEvent],
        channels: &[ChannelState],
        instruments: &InstrumentTable,
    ) -> bool {
        let fx = &self.config.effects;
        if fx.chorus.enabled || fx.phaser.enabled || fx.flanger.enabled {
            return false;
        }
        if self.config.synthesis.edge_fade_frames > 0 {
            return false;
        }
        let default_state = ChannelState::default();
        notes
            .iter()
            .filter(|n| (MIN_CHANNEL..=MAX_CHANNEL).contains(&n.channel))
            .all(|note| {
                let state = channels
                    .get((note.channel - 1) as usize)
                    .unwrap_or(&default_state);
                if state.sustain {
                    return false;
                }
                let instrument = instruments.get(state.program);
                instrument.breakpoints.is_none()
                    && instrument.wavetable.is_none()
                    && !instrument.pitch_lfo.is_active()
                    && !instrument.amplitude_lfo.is_active()
                    && !instrument.filter.lfo.is_active()
                    && instrument.filter.mod_depth == 0.0
            })
    }
}

impl std::fmt::Debug for AudioRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioRenderer")
            .field("sample_rate", &self.sample_rate)
            .field("worker_threads", &self.config.performance.worker_threads)
            .finish()
    }
}

/// Convenience entry point: render, run the global chain, meter, and
/// normalize in the contractual order.
pub fn render_with_effects(
    renderer: &AudioRenderer,
    effects: &mut EffectsProcessor,
    meter: Option<&mut super::meter::AudioMeter>,
    buffer: &mut [f32],
    notes: &[NoteEvent],
    channels: &[ChannelState],
    instruments: &InstrumentTable,
    synth: &dyn Synthesizer,
    device: Option<&dyn ComputeDevice>,
) -> Result<(), RenderError> {
    renderer.render(buffer, notes, channels, instruments, synth, device)?;
    effects.apply_enhancements(buffer);
    effects.normalize(buffer);
    if let Some(meter) = meter {
        meter.process(buffer);
    }
    Ok(())
}
