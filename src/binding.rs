//! Glue between track factories and mixers.
//!
//! These are the entry points an application uses: create a local track and
//! bind a [`Mixer`] to it in one call, or get a track that simply plays a
//! test signal.

use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::audio::diagnostics::Diagnostics;
use crate::audio::mixer::{MixMode, MixSettings, Mixer};
use crate::audio::provider::{AudioProvider, BufferProvider, Signal, SyntheticProvider};
use crate::error::BindingError;
use crate::track::{LocalAudioTrack, TrackFactory, TrackOptions};

/// Create a local track and a mixer bound to it.
///
/// The mixer is returned in the `Created` state; call
/// [`Mixer::start`] once the provider is ready.
pub fn create_track_with_mixer<F, P>(
    factory: &F,
    name: &str,
    options: TrackOptions,
    provider: P,
    mic_gain: f32,
    custom_gain: f32,
    mode: MixMode,
) -> Result<(Arc<F::Track>, Mixer<P>), BindingError>
where
    F: TrackFactory,
    P: BufferProvider + 'static,
{
    let settings = MixSettings {
        mic_gain,
        custom_gain,
        mode,
        ..MixSettings::default()
    };
    create_track_with_settings(factory, name, options, provider, settings, Diagnostics::disabled())
}

/// Like [`create_track_with_mixer`], with full settings and a diagnostics sink.
pub fn create_track_with_settings<F, P>(
    factory: &F,
    name: &str,
    options: TrackOptions,
    provider: P,
    settings: MixSettings,
    diagnostics: Diagnostics,
) -> Result<(Arc<F::Track>, Mixer<P>), BindingError>
where
    F: TrackFactory,
    P: BufferProvider + 'static,
{
    let track = factory.create_local_audio_track(name, options)?;
    let handle: Arc<dyn LocalAudioTrack> = track.clone();
    let mixer = Mixer::with_diagnostics(handle, provider, settings, diagnostics)?;
    Ok((track, mixer))
}

/// A started track that sends a continuous sine tone instead of the microphone.
pub fn create_sine_track<F: TrackFactory>(
    factory: &F,
    name: &str,
    options: TrackOptions,
    frequency: f64,
    amplitude: f64,
) -> Result<(Arc<F::Track>, Mixer), BindingError> {
    create_signal_track(factory, name, options, Signal::Sine { frequency, amplitude })
}

/// A started track that sends seeded white noise.
pub fn create_noise_track<F: TrackFactory>(
    factory: &F,
    name: &str,
    options: TrackOptions,
    amplitude: f64,
    seed: u64,
) -> Result<(Arc<F::Track>, Mixer), BindingError> {
    create_signal_track(factory, name, options, Signal::Noise { amplitude, seed })
}

/// A started track that sends a repeating beep.
pub fn create_beep_track<F: TrackFactory>(
    factory: &F,
    name: &str,
    options: TrackOptions,
    frequency: f64,
    amplitude: f64,
    on: Duration,
    off: Duration,
) -> Result<(Arc<F::Track>, Mixer), BindingError> {
    create_signal_track(
        factory,
        name,
        options,
        Signal::Beep {
            frequency,
            amplitude,
            on,
            off,
        },
    )
}

fn create_signal_track<F: TrackFactory>(
    factory: &F,
    name: &str,
    options: TrackOptions,
    signal: Signal,
) -> Result<(Arc<F::Track>, Mixer), BindingError> {
    let provider = AudioProvider::from(SyntheticProvider::new(signal));
    let (track, mixer) =
        create_track_with_mixer(factory, name, options, provider, 0.0, 1.0, MixMode::CustomOnly)?;
    mixer.start()?;
    info!("Track '{}' is sending a {} signal", name, signal.name());
    Ok((track, mixer))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::format::AudioFormat;
    use crate::audio::mixer::MixerState;
    use crate::error::{MixerError, ProviderError, TrackError};
    use crate::track::MemoryTrackFactory;

    fn options() -> TrackOptions {
        TrackOptions {
            format: AudioFormat::pcm16(8000, 1).unwrap(),
        }
    }

    #[test]
    fn test_mixer_is_returned_created() {
        let provider = SyntheticProvider::new(Signal::Sine {
            frequency: 440.0,
            amplitude: 0.5,
        });
        let (track, mixer) = create_track_with_mixer(
            &MemoryTrackFactory,
            "music",
            options(),
            provider,
            1.0,
            0.5,
            MixMode::Additive,
        )
        .unwrap();

        assert_eq!(mixer.state(), MixerState::Created);
        assert!(!track.has_callback());
        assert_eq!(track.name(), "music");
        assert_eq!(mixer.custom_gain(), 0.5);
    }

    #[test]
    fn test_sine_track_replaces_microphone() {
        let (track, mixer) =
            create_sine_track(&MemoryTrackFactory, "tone", options(), 1000.0, 0.5).unwrap();
        assert_eq!(mixer.state(), MixerState::Started);
        assert_eq!(mixer.mode(), MixMode::CustomOnly);

        let mic = vec![i16::MAX; 8];
        let mut out = vec![0i16; 8];
        track.capture(&mic, &mut out);

        // Phase starts at zero, then a quarter turn per frame at 1 kHz / 8 kHz
        assert_eq!(out[0], 0);
        assert_eq!(out[2], 16384);
        assert!(out.iter().all(|&s| s.abs() <= 16384));
    }

    #[test]
    fn test_noise_track_is_reproducible() {
        let (a, _mixer_a) =
            create_noise_track(&MemoryTrackFactory, "a", options(), 0.3, 7).unwrap();
        let (b, _mixer_b) =
            create_noise_track(&MemoryTrackFactory, "b", options(), 0.3, 7).unwrap();

        let mic = vec![0i16; 64];
        let mut out_a = vec![0i16; 64];
        let mut out_b = vec![0i16; 64];
        a.capture(&mic, &mut out_a);
        b.capture(&mic, &mut out_b);

        assert_eq!(out_a, out_b);
        assert!(out_a.iter().any(|&s| s != 0));
        assert!(out_a.iter().all(|&s| (s as f64).abs() <= 0.3 * 32767.0 + 1.0));
    }

    #[test]
    fn test_beep_track_goes_quiet_between_beeps() {
        let (track, _mixer) = create_beep_track(
            &MemoryTrackFactory,
            "beep",
            options(),
            1000.0,
            0.5,
            Duration::from_millis(1),
            Duration::from_millis(1),
        )
        .unwrap();

        // 8 frames on, 8 frames off at 8 kHz
        let mic = vec![0i16; 16];
        let mut out = vec![0i16; 16];
        track.capture(&mic, &mut out);
        assert!(out[..8].iter().any(|&s| s != 0));
        assert!(out[8..].iter().all(|&s| s == 0));
    }

    #[test]
    fn test_invalid_signal_fails_at_start() {
        let result = create_sine_track(&MemoryTrackFactory, "bad", options(), 440.0, 2.0);
        assert!(matches!(
            result,
            Err(BindingError::Mixer(MixerError::Provider(
                ProviderError::InvalidSignal { .. }
            )))
        ));
    }

    #[test]
    fn test_empty_name_rejected() {
        let result = create_sine_track(&MemoryTrackFactory, " ", options(), 440.0, 0.5);
        assert!(matches!(result, Err(BindingError::Track(TrackError::EmptyName))));
    }

    #[test]
    fn test_invalid_gain_rejected() {
        let provider = SyntheticProvider::new(Signal::Sine {
            frequency: 440.0,
            amplitude: 0.5,
        });
        let result = create_track_with_mixer(
            &MemoryTrackFactory,
            "music",
            options(),
            provider,
            -1.0,
            1.0,
            MixMode::Additive,
        );
        assert!(matches!(
            result,
            Err(BindingError::Mixer(MixerError::InvalidGain { .. }))
        ));
    }
}
