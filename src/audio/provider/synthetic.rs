//! Synthetic test signals (sine, noise, beep) generated in the target format.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f64::consts::TAU;
use std::time::Duration;

use super::{BufferProvider, Pull};
use crate::audio::format::AudioFormat;
use crate::error::ProviderError;

/// Formula a [`SyntheticProvider`] generates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Signal {
    Sine {
        frequency: f64,
        amplitude: f64,
    },
    /// Uniform white noise from a seeded generator, so runs are reproducible.
    Noise {
        amplitude: f64,
        seed: u64,
    },
    /// A sine gated on for `on`, then silent for `off`, repeating.
    Beep {
        frequency: f64,
        amplitude: f64,
        on: Duration,
        off: Duration,
    },
}

impl Signal {
    pub fn name(&self) -> &'static str {
        match self {
            Signal::Sine { .. } => "sine",
            Signal::Noise { .. } => "noise",
            Signal::Beep { .. } => "beep",
        }
    }

    fn amplitude(&self) -> f64 {
        match *self {
            Signal::Sine { amplitude, .. }
            | Signal::Noise { amplitude, .. }
            | Signal::Beep { amplitude, .. } => amplitude,
        }
    }

    fn frequency(&self) -> Option<f64> {
        match *self {
            Signal::Sine { frequency, .. } | Signal::Beep { frequency, .. } => Some(frequency),
            Signal::Noise { .. } => None,
        }
    }
}

pub struct SyntheticProvider {
    signal: Signal,
    duration: Option<Duration>,
    looping: bool,
    // Generator state; only `pull` mutates it.
    phase: f64,
    position: u64,
    rng: StdRng,
    // Derived in `prime`.
    phase_step: f64,
    total_frames: Option<u64>,
    beep_on_frames: u64,
    beep_period_frames: u64,
    exhausted: bool,
}

impl SyntheticProvider {
    /// An endless signal.
    pub fn new(signal: Signal) -> Self {
        let seed = match signal {
            Signal::Noise { seed, .. } => seed,
            _ => 0,
        };
        Self {
            signal,
            duration: None,
            looping: false,
            phase: 0.0,
            position: 0,
            rng: StdRng::seed_from_u64(seed),
            phase_step: 0.0,
            total_frames: None,
            beep_on_frames: 0,
            beep_period_frames: 0,
            exhausted: false,
        }
    }

    /// Limit the signal to `duration`; it is exhausted afterwards unless looping.
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    pub fn signal(&self) -> &Signal {
        &self.signal
    }

    fn frames_for(duration: Duration, sample_rate: u32) -> u64 {
        (duration.as_secs_f64() * sample_rate as f64).round() as u64
    }

    fn validate(&self, target: &AudioFormat) -> Result<(), ProviderError> {
        let invalid = |reason: String| Err(ProviderError::InvalidSignal { reason });

        let amplitude = self.signal.amplitude();
        if !amplitude.is_finite() || !(0.0..=1.0).contains(&amplitude) {
            return invalid(format!("amplitude {amplitude} outside [0, 1]"));
        }

        if let Some(frequency) = self.signal.frequency() {
            let nyquist = target.sample_rate as f64 / 2.0;
            if !frequency.is_finite() || frequency <= 0.0 || frequency >= nyquist {
                return invalid(format!(
                    "frequency {frequency}Hz must be in (0, {nyquist}) at {}Hz",
                    target.sample_rate
                ));
            }
        }

        if let Some(duration) = self.duration {
            if Self::frames_for(duration, target.sample_rate) == 0 {
                return invalid("zero-length signal".to_string());
            }
        }

        if let Signal::Beep { on, .. } = self.signal {
            if Self::frames_for(on, target.sample_rate) == 0 {
                return invalid("beep on-time is shorter than one frame".to_string());
            }
        }

        Ok(())
    }

    fn next_value(&mut self) -> f64 {
        let value = match self.signal {
            Signal::Sine { amplitude, .. } => amplitude * (TAU * self.phase).sin(),
            Signal::Noise { amplitude, .. } => amplitude * self.rng.gen_range(-1.0..=1.0),
            Signal::Beep { amplitude, .. } => {
                let in_cycle = self.position % self.beep_period_frames.max(1);
                if in_cycle < self.beep_on_frames {
                    amplitude * (TAU * self.phase).sin()
                } else {
                    0.0
                }
            }
        };

        self.phase += self.phase_step;
        self.phase -= self.phase.floor();
        self.position += 1;
        value
    }

    fn rewind(&mut self) {
        self.phase = 0.0;
        self.position = 0;
        if let Signal::Noise { seed, .. } = self.signal {
            self.rng = StdRng::seed_from_u64(seed);
        }
    }
}

impl BufferProvider for SyntheticProvider {
    fn prime(&mut self, target: &AudioFormat) -> Result<(), ProviderError> {
        self.validate(target)?;

        let rate = target.sample_rate;
        self.phase_step = self.signal.frequency().unwrap_or(0.0) / rate as f64;
        self.total_frames = self.duration.map(|d| Self::frames_for(d, rate));
        if let Signal::Beep { on, off, .. } = self.signal {
            self.beep_on_frames = Self::frames_for(on, rate);
            self.beep_period_frames = self.beep_on_frames + Self::frames_for(off, rate);
        }
        self.exhausted = false;
        self.rewind();
        Ok(())
    }

    fn pull(&mut self, requested_frames: usize, target: &AudioFormat, out: &mut [i16]) -> Pull {
        if self.exhausted {
            return Pull::NoData;
        }

        let channels = target.channels as usize;
        let mut written = 0;

        while written < requested_frames {
            if let Some(total) = self.total_frames {
                if self.position >= total {
                    if self.looping {
                        self.rewind();
                    } else {
                        self.exhausted = true;
                        break;
                    }
                }
            }

            let sample = (self.next_value() * i16::MAX as f64).round() as i16;
            let start = written * channels;
            out[start..start + channels].fill(sample);
            written += 1;
        }

        if written == 0 {
            Pull::NoData
        } else {
            Pull::Frames(written)
        }
    }

    fn is_exhausted(&self) -> bool {
        self.exhausted
    }
}
