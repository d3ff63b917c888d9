//! Remote tap: a WAV file stands in for the decoded remote stream.

use anyhow::{bail, Context, Result};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use super::args::TapCliArgs;
use super::{finish_diagnostics, load_config, start_diagnostics, write_wav};
use crate::audio::format::PcmBuffer;
use crate::audio::provider::FileProvider;
use crate::intercept::side_state::SideStateStore;
use crate::intercept::{
    interceptor_fn, InterceptDecision, InterceptionPipeline, Interceptor, MutingInterceptor,
};
use crate::track::{MemoryRemoteTrack, Playout, RemoteAudioTrack, TrackId};

pub async fn handle_tap_command(args: TapCliArgs, config_path: Option<&Path>) -> Result<()> {
    if args.block_ms == 0 {
        bail!("--block-ms must be positive");
    }

    let config = load_config(config_path)?;
    let clip = FileProvider::open(&args.input, false)
        .with_context(|| format!("Failed to open {:?}", args.input))?
        .into_clip();
    let format = *clip.format();
    let frame_bytes = format.frame_bytes();
    let block_frames = (format.sample_rate as usize * args.block_ms as usize / 1000).max(1);

    let (diagnostics, drain) = start_diagnostics(&config);
    let pipeline =
        InterceptionPipeline::new(SideStateStore::global()).with_diagnostics(diagnostics.clone());
    let track = MemoryRemoteTrack::new(TrackId::random(), format);

    let tapped = Arc::new(Mutex::new(Vec::with_capacity(clip.data().len())));
    let sink = tapped.clone();
    let recorder = interceptor_fn(move |frame| {
        sink.lock().extend_from_slice(frame.data);
        InterceptDecision::play()
    });
    let interceptor: Arc<dyn Interceptor> = if args.mute {
        Arc::new(MutingInterceptor::new(recorder))
    } else {
        recorder
    };
    pipeline.attach(&track, interceptor)?;

    let mut speaker = Vec::with_capacity(clip.data().len());
    let mut played_frames = 0;
    for (index, block) in clip.data().chunks(block_frames * frame_bytes).enumerate() {
        let timestamp = Duration::from_millis(index as u64 * args.block_ms as u64);
        let frames = block.len() / frame_bytes;
        match track.deliver(block, timestamp) {
            Playout::Speaker(data) => {
                played_frames += frames;
                speaker.extend_from_slice(&data);
            }
            Playout::Suppressed => {
                speaker.extend_from_slice(PcmBuffer::silence(format, frames).data());
            }
        }
    }

    pipeline.detach(&track);
    info!(
        "Tap finished on {}; track enabled again: {}",
        track.id(),
        track.is_enabled()
    );

    let tapped = std::mem::take(&mut *tapped.lock());
    let tapped = PcmBuffer::new(format, tapped)?;
    write_wav(&args.output, &tapped)?;
    if let Some(path) = &args.speaker_output {
        write_wav(path, &PcmBuffer::new(format, speaker)?)?;
    }
    finish_diagnostics(diagnostics, drain).await;

    println!(
        "Tapped {} frames to {}; {} of {} frames reached the speaker",
        tapped.frame_count(),
        args.output.display(),
        played_frames,
        clip.frame_count()
    );
    Ok(())
}
