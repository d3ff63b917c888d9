use crate::audio::diagnostics::{DiagnosticEvent, Diagnostics};
use crate::audio::format::{AudioFormat, PcmBuffer};
use crate::audio::mixer::MixSettings;
use crate::audio::provider::{AudioProvider, FileProvider, QueueProvider, Signal, SyntheticProvider};
use crate::config::Config;
use anyhow::{bail, Context, Result};
use std::path::Path;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub mod args;
mod config;
mod monitor;
mod render;
mod tap;

pub use args::{Cli, CliCommand};
pub use config::handle_config_command;
pub use monitor::handle_monitor_command;
pub use render::handle_render_command;
pub use tap::handle_tap_command;

use args::{MixCliArgs, SourceArgs, SourceKind};

pub(crate) fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
}

pub(crate) fn apply_mix_overrides(mut settings: MixSettings, args: &MixCliArgs) -> MixSettings {
    if let Some(mode) = args.mode {
        settings.mode = mode;
    }
    if let Some(gain) = args.mic_gain {
        settings.mic_gain = gain;
    }
    if let Some(gain) = args.custom_gain {
        settings.custom_gain = gain;
    }
    settings
}

/// Build the application provider described on the command line.
pub(crate) fn build_provider(args: &SourceArgs, format: &AudioFormat) -> Result<AudioProvider> {
    let signal = match args.source {
        SourceKind::Sine => Signal::Sine {
            frequency: args.frequency,
            amplitude: args.amplitude,
        },
        SourceKind::Noise => Signal::Noise {
            amplitude: args.amplitude,
            seed: args.seed,
        },
        SourceKind::Beep => Signal::Beep {
            frequency: args.frequency,
            amplitude: args.amplitude,
            on: Duration::from_millis(args.beep_on_ms),
            off: Duration::from_millis(args.beep_off_ms),
        },
        SourceKind::File => {
            let path = args
                .file
                .as_deref()
                .context("--file is required for the file source")?;
            let provider = FileProvider::open(path, args.looping)
                .with_context(|| format!("Failed to open {:?}", path))?;
            return Ok(provider.into());
        }
        SourceKind::Silence => {
            // A closed, empty queue: never has data
            let (provider, producer) = QueueProvider::unbounded(*format);
            producer.close();
            return Ok(provider.into());
        }
    };

    let mut provider = SyntheticProvider::new(signal).looping(args.looping);
    if let Some(seconds) = args.source_seconds {
        let duration = Duration::try_from_secs_f64(seconds)
            .with_context(|| format!("Invalid --source-seconds {}", seconds))?;
        provider = provider.with_duration(duration);
    }
    Ok(provider.into())
}

/// A diagnostics sink plus the task logging what arrives on it.
pub(crate) fn start_diagnostics(config: &Config) -> (Diagnostics, Option<JoinHandle<u64>>) {
    if !config.diagnostics.enabled {
        return (Diagnostics::disabled(), None);
    }
    let (diagnostics, rx) = Diagnostics::channel(config.diagnostics.channel_capacity);
    (diagnostics, Some(tokio::spawn(drain_diagnostics(rx))))
}

async fn drain_diagnostics(mut rx: mpsc::Receiver<DiagnosticEvent>) -> u64 {
    let mut received = 0;
    while let Some(event) = rx.recv().await {
        received += 1;
        match event {
            DiagnosticEvent::Clipped { samples } => debug!("Clipped {} samples", samples),
            DiagnosticEvent::ProviderExhausted => debug!("Provider exhausted"),
            other => warn!("Audio path degraded: {:?}", other),
        }
    }
    received
}

/// Wait for the drain task once every sender is gone.
pub(crate) async fn finish_diagnostics(diagnostics: Diagnostics, drain: Option<JoinHandle<u64>>) {
    let dropped = diagnostics.dropped();
    drop(diagnostics);
    if let Some(drain) = drain {
        match drain.await {
            Ok(received) => debug!("Diagnostics: {} received, {} dropped", received, dropped),
            Err(err) => warn!("Diagnostics task failed: {}", err),
        }
    }
}

pub(crate) fn write_wav(path: &Path, buffer: &PcmBuffer) -> Result<()> {
    let format = buffer.format();
    let spec = hound::WavSpec {
        channels: format.channels,
        sample_rate: format.sample_rate,
        bits_per_sample: format.bit_depth.bits(),
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(path, spec)
        .with_context(|| format!("Failed to create {:?}", path))?;
    for sample in buffer.samples() {
        writer.write_sample(sample)?;
    }
    writer.finalize().context("Failed to finalize WAV file")?;
    Ok(())
}

pub(crate) fn seconds_to_frames(seconds: f64, sample_rate: u32) -> Result<usize> {
    if !seconds.is_finite() || seconds <= 0.0 {
        bail!("Duration must be a positive number of seconds, got {}", seconds);
    }
    Ok((seconds * sample_rate as f64).round() as usize)
}
