//! Real-time mixing engine for an outbound track.
//!
//! The engine is installed as the track's [`AudioCallback`]. Control calls
//! (`start`, `stop`, gain and mode setters) come from arbitrary threads and
//! publish through atomics; `render` runs on the capture thread and never
//! blocks or allocates once started.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::diagnostics::{DiagnosticEvent, Diagnostics};
use super::format::{AudioFormat, BitDepth};
use super::provider::{AudioProvider, BufferProvider, Pull};
use crate::error::MixerError;
use crate::track::{AudioCallback, LocalAudioTrack};

/// How microphone and provider audio combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MixMode {
    /// Sum of both scaled sources, clamped.
    #[default]
    Additive,
    /// Provider audio when it has frames, microphone otherwise. Silence once
    /// a non-looping provider is exhausted.
    Replace,
    /// Provider audio only; silence when it has nothing.
    CustomOnly,
}

impl MixMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            MixMode::Additive => "additive",
            MixMode::Replace => "replace",
            MixMode::CustomOnly => "custom_only",
        }
    }

    fn to_u8(self) -> u8 {
        match self {
            MixMode::Additive => 0,
            MixMode::Replace => 1,
            MixMode::CustomOnly => 2,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => MixMode::Replace,
            2 => MixMode::CustomOnly,
            _ => MixMode::Additive,
        }
    }
}

impl fmt::Display for MixMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MixMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "additive" => Ok(MixMode::Additive),
            "replace" => Ok(MixMode::Replace),
            "custom_only" => Ok(MixMode::CustomOnly),
            other => Err(format!(
                "unknown mix mode '{other}' (expected additive, replace or custom_only)"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MixerState {
    Created,
    Started,
    Stopped,
}

impl MixerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            MixerState::Created => "created",
            MixerState::Started => "started",
            MixerState::Stopped => "stopped",
        }
    }
}

// Internal lifecycle encoding; `Starting` is never observable from outside.
const CREATED: u8 = 0;
const STARTING: u8 = 1;
const STARTED: u8 = 2;
const STOPPED: u8 = 3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MixSettings {
    pub mic_gain: f32,
    pub custom_gain: f32,
    pub mode: MixMode,
    /// Largest block pulled from the provider at once; bigger render
    /// requests are processed in chunks of this size.
    pub max_frames_per_callback: usize,
}

impl Default for MixSettings {
    fn default() -> Self {
        Self {
            mic_gain: 1.0,
            custom_gain: 1.0,
            mode: MixMode::Additive,
            max_frames_per_callback: 4096,
        }
    }
}

/// Per-callback accounting returned by [`Mixer::render`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderStats {
    pub frames: usize,
    pub provider_frames: usize,
    pub clipped: u32,
}

fn validate_gain(name: &'static str, value: f32) -> Result<f32, MixerError> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(MixerError::InvalidGain { name, value })
    }
}

struct Engine<P> {
    provider: P,
    scratch: Vec<i16>,
    exhausted_reported: bool,
}

/// Outcome of one engine pull.
#[derive(Debug, Clone, Copy)]
struct Pulled {
    frames: usize,
    /// The provider has run out for good; nothing more will arrive.
    exhausted: bool,
}

impl<P: BufferProvider> Engine<P> {
    /// Pull up to `frames` frames into the scratch buffer.
    fn pull(&mut self, frames: usize, format: &AudioFormat, diagnostics: &Diagnostics) -> Pulled {
        if self.provider.is_exhausted() {
            self.note_exhausted(diagnostics);
            return Pulled {
                frames: 0,
                exhausted: true,
            };
        }

        let samples = format.samples_for(frames);
        let pulled = match self.provider.pull(frames, format, &mut self.scratch[..samples]) {
            Pull::Frames(n) => n.min(frames),
            Pull::NoData => 0,
        };

        let exhausted = self.provider.is_exhausted();
        if exhausted {
            self.note_exhausted(diagnostics);
        }
        Pulled {
            frames: pulled,
            exhausted,
        }
    }

    fn note_exhausted(&mut self, diagnostics: &Diagnostics) {
        if !self.exhausted_reported {
            self.exhausted_reported = true;
            diagnostics.report(DiagnosticEvent::ProviderExhausted);
        }
    }
}

struct MixerCore<P> {
    format: AudioFormat,
    state: AtomicU8,
    mode: AtomicU8,
    mic_gain: AtomicU32,
    custom_gain: AtomicU32,
    max_frames: usize,
    clipped_total: AtomicU64,
    engine: Mutex<Engine<P>>,
    diagnostics: Diagnostics,
}

impl<P: BufferProvider> MixerCore<P> {
    fn render(&self, requested_frames: usize, microphone: &[i16], out: &mut [i16]) -> RenderStats {
        let channels = self.format.channels as usize;
        let frames = requested_frames.min(out.len() / channels);
        let out = &mut out[..frames * channels];
        let mut stats = RenderStats {
            frames,
            ..RenderStats::default()
        };

        if self.state.load(Ordering::Acquire) != STARTED {
            out.fill(0);
            return stats;
        }

        let Some(mut engine) = self.engine.try_lock() else {
            out.fill(0);
            self.diagnostics.report(DiagnosticEvent::EngineBusy);
            return stats;
        };

        let mode = MixMode::from_u8(self.mode.load(Ordering::Relaxed));
        let mic_gain = match mode {
            MixMode::CustomOnly => 0.0,
            _ => f32::from_bits(self.mic_gain.load(Ordering::Relaxed)),
        };
        let custom_gain = f32::from_bits(self.custom_gain.load(Ordering::Relaxed));

        let chunk_frames = engine.scratch.len() / channels;
        let mut done = 0;
        while done < frames {
            let n = (frames - done).min(chunk_frames);
            let pulled = engine.pull(n, &self.format, &self.diagnostics);
            // An exhausted provider leaves REPLACE with silence, not the microphone
            let block_mode = match mode {
                MixMode::Replace if pulled.exhausted => MixMode::CustomOnly,
                other => other,
            };

            let base = done * channels;
            stats.clipped += mix_block(
                block_mode,
                mic_gain,
                custom_gain,
                microphone.get(base..).unwrap_or(&[]),
                &engine.scratch[..pulled.frames * channels],
                &mut out[base..base + n * channels],
            );
            stats.provider_frames += pulled.frames;
            done += n;
        }

        if stats.clipped > 0 {
            self.clipped_total
                .fetch_add(stats.clipped as u64, Ordering::Relaxed);
            self.diagnostics.report(DiagnosticEvent::Clipped {
                samples: stats.clipped,
            });
        }
        stats
    }
}

impl<P: BufferProvider> AudioCallback for MixerCore<P> {
    fn render(&self, requested_frames: usize, microphone: &[i16], out: &mut [i16]) {
        MixerCore::render(self, requested_frames, microphone, out);
    }
}

/// Mix one block. `provider` may be shorter than `out` when the provider came
/// up short; positions past its end count as "no provider frame".
fn mix_block(
    mode: MixMode,
    mic_gain: f32,
    custom_gain: f32,
    microphone: &[i16],
    provider: &[i16],
    out: &mut [i16],
) -> u32 {
    let mut clipped = 0;
    for (i, slot) in out.iter_mut().enumerate() {
        let mic = microphone.get(i).copied().unwrap_or(0) as f32;
        let custom = provider.get(i).copied();

        let value = match mode {
            MixMode::Additive => mic * mic_gain + custom.unwrap_or(0) as f32 * custom_gain,
            MixMode::Replace => match custom {
                Some(sample) => sample as f32 * custom_gain,
                None => mic * mic_gain,
            },
            MixMode::CustomOnly => custom.map_or(0.0, |sample| sample as f32 * custom_gain),
        };

        let rounded = value.round();
        *slot = if rounded > i16::MAX as f32 {
            clipped += 1;
            i16::MAX
        } else if rounded < i16::MIN as f32 {
            clipped += 1;
            i16::MIN
        } else {
            rounded as i16
        };
    }
    clipped
}

/// Mixes an application [`BufferProvider`] into a local track's microphone
/// signal.
pub struct Mixer<P: BufferProvider + 'static = AudioProvider> {
    core: Arc<MixerCore<P>>,
    callback: Arc<dyn AudioCallback>,
    track: Arc<dyn LocalAudioTrack>,
}

impl<P: BufferProvider + 'static> Mixer<P> {
    pub fn new(
        track: Arc<dyn LocalAudioTrack>,
        provider: P,
        settings: MixSettings,
    ) -> Result<Self, MixerError> {
        Self::with_diagnostics(track, provider, settings, Diagnostics::disabled())
    }

    pub fn with_diagnostics(
        track: Arc<dyn LocalAudioTrack>,
        provider: P,
        settings: MixSettings,
        diagnostics: Diagnostics,
    ) -> Result<Self, MixerError> {
        let format = track.format();
        if format.bit_depth != BitDepth::Sixteen {
            return Err(MixerError::UnsupportedOutputFormat {
                bits: format.bit_depth.bits(),
            });
        }
        let mic_gain = validate_gain("microphone", settings.mic_gain)?;
        let custom_gain = validate_gain("custom", settings.custom_gain)?;
        if settings.max_frames_per_callback == 0 {
            return Err(MixerError::InvalidBufferSize);
        }

        let core = Arc::new(MixerCore {
            format,
            state: AtomicU8::new(CREATED),
            mode: AtomicU8::new(settings.mode.to_u8()),
            mic_gain: AtomicU32::new(mic_gain.to_bits()),
            custom_gain: AtomicU32::new(custom_gain.to_bits()),
            max_frames: settings.max_frames_per_callback,
            clipped_total: AtomicU64::new(0),
            engine: Mutex::new(Engine {
                provider,
                scratch: Vec::new(),
                exhausted_reported: false,
            }),
            diagnostics,
        });
        let callback: Arc<dyn AudioCallback> = core.clone();

        Ok(Self {
            core,
            callback,
            track,
        })
    }

    /// Prime the provider and install this mixer as the track's callback.
    pub fn start(&self) -> Result<(), MixerError> {
        let core = &self.core;
        core.state
            .compare_exchange(CREATED, STARTING, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|state| match state {
                STOPPED => MixerError::Stopped,
                _ => MixerError::AlreadyStarted,
            })?;

        {
            let mut engine = core.engine.lock();
            if let Err(e) = engine.provider.prime(&core.format) {
                core.state.store(CREATED, Ordering::Release);
                warn!("Mixer on '{}' failed to prime provider: {}", self.track.name(), e);
                return Err(e.into());
            }
            let samples = core.format.samples_for(core.max_frames);
            if engine.scratch.len() != samples {
                engine.scratch = vec![0; samples];
            }
            engine.exhausted_reported = false;
            debug!(
                "Mixer scratch buffer: {} frames at {}",
                core.max_frames, core.format
            );
        }

        if self.track.install_callback(self.callback.clone()).is_some() {
            warn!(
                "Mixer replaced an existing audio callback on '{}'",
                self.track.name()
            );
        }

        if core
            .state
            .compare_exchange(STARTING, STARTED, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            // Stopped while we were starting
            self.track.remove_callback(&self.callback);
            return Err(MixerError::Stopped);
        }

        info!(
            "Mixer started on '{}' ({}, mic {:.2}, custom {:.2})",
            self.track.name(),
            self.mode(),
            self.mic_gain(),
            self.custom_gain()
        );
        Ok(())
    }

    /// Stop pulling and uninstall the callback. Returns whether the mixer was
    /// running; stopping twice is a no-op.
    pub fn stop(&self) -> bool {
        let previous = self.core.state.swap(STOPPED, Ordering::AcqRel);
        if previous != STARTED {
            return false;
        }

        self.track.remove_callback(&self.callback);
        info!(
            "Mixer stopped on '{}' ({} samples clipped)",
            self.track.name(),
            self.clipped_samples()
        );
        true
    }

    /// Audio-callback entry point. Writes `requested_frames` frames (bounded
    /// by `out`) in the track format; missing microphone samples count as
    /// silence.
    pub fn render(&self, requested_frames: usize, microphone: &[i16], out: &mut [i16]) -> RenderStats {
        self.core.render(requested_frames, microphone, out)
    }

    pub fn state(&self) -> MixerState {
        match self.core.state.load(Ordering::Acquire) {
            STARTED => MixerState::Started,
            STOPPED => MixerState::Stopped,
            _ => MixerState::Created,
        }
    }

    pub fn format(&self) -> &AudioFormat {
        &self.core.format
    }

    pub fn track(&self) -> &Arc<dyn LocalAudioTrack> {
        &self.track
    }

    pub fn mode(&self) -> MixMode {
        MixMode::from_u8(self.core.mode.load(Ordering::Relaxed))
    }

    pub fn set_mode(&self, mode: MixMode) {
        self.core.mode.store(mode.to_u8(), Ordering::Relaxed);
        debug!("Mix mode set to {}", mode);
    }

    pub fn mic_gain(&self) -> f32 {
        f32::from_bits(self.core.mic_gain.load(Ordering::Relaxed))
    }

    pub fn set_mic_gain(&self, gain: f32) -> Result<(), MixerError> {
        let gain = validate_gain("microphone", gain)?;
        self.core.mic_gain.store(gain.to_bits(), Ordering::Relaxed);
        Ok(())
    }

    pub fn custom_gain(&self) -> f32 {
        f32::from_bits(self.core.custom_gain.load(Ordering::Relaxed))
    }

    pub fn set_custom_gain(&self, gain: f32) -> Result<(), MixerError> {
        let gain = validate_gain("custom", gain)?;
        self.core.custom_gain.store(gain.to_bits(), Ordering::Relaxed);
        Ok(())
    }

    /// Total samples clamped since creation.
    pub fn clipped_samples(&self) -> u64 {
        self.core.clipped_total.load(Ordering::Relaxed)
    }
}

impl<P: BufferProvider + 'static> Drop for Mixer<P> {
    fn drop(&mut self) {
        if self.state() == MixerState::Started {
            debug!("Dropping started mixer, cleaning up");
            self.stop();
        }
    }
}
