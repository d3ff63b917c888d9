//! Offline render: the capture thread simulated block by block.

use anyhow::{bail, Context, Result};
use std::path::Path;
use tracing::info;

use super::args::{MicKind, RenderCliArgs};
use super::{
    apply_mix_overrides, build_provider, finish_diagnostics, load_config, seconds_to_frames,
    start_diagnostics, write_wav,
};
use crate::audio::format::{AudioFormat, PcmBuffer};
use crate::audio::provider::{AudioProvider, BufferProvider, FileProvider, Signal, SyntheticProvider};
use crate::binding::create_track_with_settings;
use crate::track::{MemoryTrackFactory, TrackOptions};

pub async fn handle_render_command(args: RenderCliArgs, config_path: Option<&Path>) -> Result<()> {
    if args.block_frames == 0 {
        bail!("--block-frames must be positive");
    }

    let config = load_config(config_path)?;
    let format = config.track.format()?;
    let settings = apply_mix_overrides(config.mixer.settings(), &args.mix);
    let total_frames = seconds_to_frames(args.seconds, format.sample_rate)?;

    let provider = build_provider(&args.source, &format)?;
    let mut microphone = build_microphone(&args, &format)?;

    let (diagnostics, drain) = start_diagnostics(&config);
    let (track, mixer) = create_track_with_settings(
        &MemoryTrackFactory,
        &config.track.name,
        TrackOptions { format },
        provider,
        settings,
        diagnostics.clone(),
    )?;
    mixer.start().context("Failed to start mixer")?;

    info!(
        "Rendering {} frames at {} ({} mode, mic gain {}, custom gain {})",
        total_frames, format, settings.mode, settings.mic_gain, settings.custom_gain
    );

    let channels = format.channels as usize;
    let mut mic_block = vec![0i16; args.block_frames * channels];
    let mut out_block = vec![0i16; args.block_frames * channels];
    let mut rendered = Vec::with_capacity(total_frames * channels);

    let mut remaining = total_frames;
    while remaining > 0 {
        let frames = remaining.min(args.block_frames);
        let samples = frames * channels;

        let mic = &mut mic_block[..samples];
        let captured = match microphone.as_mut() {
            Some(source) => source.pull(frames, &format, mic).frames(),
            None => 0,
        };
        mic[captured * channels..].fill(0);

        track.capture(mic, &mut out_block[..samples]);
        rendered.extend_from_slice(&out_block[..samples]);
        remaining -= frames;
    }

    mixer.stop();
    let clipped = mixer.clipped_samples();
    drop(mixer);

    let output = PcmBuffer::from_i16(format, &rendered)?;
    write_wav(&args.output, &output)?;
    finish_diagnostics(diagnostics, drain).await;

    println!(
        "Wrote {} frames to {} ({} samples clipped)",
        output.frame_count(),
        args.output.display(),
        clipped
    );
    Ok(())
}

/// The simulated microphone, primed for the track format. `None` is silence.
fn build_microphone(args: &RenderCliArgs, format: &AudioFormat) -> Result<Option<AudioProvider>> {
    let mut source: AudioProvider = match args.mic {
        MicKind::Silence => return Ok(None),
        MicKind::Sine => SyntheticProvider::new(Signal::Sine {
            frequency: args.mic_frequency,
            amplitude: 0.5,
        })
        .into(),
        MicKind::File => {
            let path = args
                .mic_file
                .as_deref()
                .context("--mic-file is required for the file microphone")?;
            FileProvider::open(path, true)
                .with_context(|| format!("Failed to open {:?}", path))?
                .into()
        }
    };
    source
        .prime(format)
        .context("Failed to prepare microphone source")?;
    Ok(Some(source))
}
