//! Live monitor: default input device through the mixer to the default output.
//!
//! The input stream feeds a queue that the output callback reads the
//! microphone from, so the output stream plays the role of the capture
//! thread.

use anyhow::{Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::args::MonitorCliArgs;
use super::{apply_mix_overrides, build_provider, finish_diagnostics, load_config, start_diagnostics};
use crate::audio::provider::{BufferProvider, QueueProvider};
use crate::binding::create_track_with_settings;
use crate::track::{MemoryTrackFactory, TrackOptions};

pub async fn handle_monitor_command(args: MonitorCliArgs, config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path)?;
    let format = config.track.format()?;
    let settings = apply_mix_overrides(config.mixer.settings(), &args.mix);
    let provider = build_provider(&args.source, &format)?;

    let host = cpal::default_host();
    let input_device = host
        .default_input_device()
        .context("No input device available")?;
    let output_device = host
        .default_output_device()
        .context("No output device available")?;
    info!(
        "Monitoring {} -> {}",
        input_device.name().unwrap_or_else(|_| "unknown".to_string()),
        output_device.name().unwrap_or_else(|_| "unknown".to_string())
    );

    let stream_config = cpal::StreamConfig {
        channels: format.channels,
        sample_rate: cpal::SampleRate(format.sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    let (diagnostics, drain) = start_diagnostics(&config);
    let (mut microphone, mic_producer) = if config.queue.bounded {
        QueueProvider::bounded(format, config.queue.capacity_frames)
    } else {
        QueueProvider::unbounded(format)
    };
    microphone = microphone.with_diagnostics(diagnostics.clone());
    microphone.prime(&format)?;

    let (track, mixer) = create_track_with_settings(
        &MemoryTrackFactory,
        &config.track.name,
        TrackOptions { format },
        provider,
        settings,
        diagnostics.clone(),
    )?;
    mixer.start().context("Failed to start mixer")?;

    let producer = mic_producer.clone();
    let mut captured: Vec<i16> = Vec::new();
    let input_stream = input_device.build_input_stream(
        &stream_config,
        move |data: &[f32], _: &cpal::InputCallbackInfo| {
            captured.clear();
            captured.extend(data.iter().map(|&s| (s * i16::MAX as f32).round() as i16));
            // Only fails once the queue is closed at shutdown
            let _ = producer.push_samples(&captured);
        },
        |err| error!("Input stream error: {}", err),
        None,
    )?;

    let channels = format.channels as usize;
    let mut mic_block: Vec<i16> = Vec::new();
    let mut out_block: Vec<i16> = Vec::new();
    let output_track = track.clone();
    let output_stream = output_device.build_output_stream(
        &stream_config,
        move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
            // Grows only when the device asks for a bigger block than before
            if out_block.len() < data.len() {
                mic_block.resize(data.len(), 0);
                out_block.resize(data.len(), 0);
            }
            let frames = data.len() / channels;
            let mic = &mut mic_block[..data.len()];
            let got = microphone.pull(frames, &format, mic).frames();
            mic[got * channels..].fill(0);

            let out = &mut out_block[..data.len()];
            output_track.capture(mic, out);
            for (dst, &src) in data.iter_mut().zip(out.iter()) {
                *dst = src as f32 / i16::MAX as f32;
            }
        },
        |err| error!("Output stream error: {}", err),
        None,
    )?;

    input_stream.play()?;
    output_stream.play()?;
    println!("Monitoring for {} seconds...", args.seconds);
    tokio::time::sleep(Duration::from_secs(args.seconds)).await;

    debug!("Stopping monitor streams");
    drop(input_stream);
    drop(output_stream);
    mic_producer.close();

    mixer.stop();
    let clipped = mixer.clipped_samples();
    drop(mixer);
    if mic_producer.dropped_frames() > 0 {
        warn!(
            "Dropped {} microphone frames on queue overflow",
            mic_producer.dropped_frames()
        );
    }
    finish_diagnostics(diagnostics, drain).await;

    println!("Monitor stopped ({} samples clipped)", clipped);
    Ok(())
}
