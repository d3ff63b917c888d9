//! Outbound (published) audio tracks.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

use super::TrackId;
use crate::audio::format::AudioFormat;
use crate::error::TrackError;

/// Producer of the samples a local track sends to the network.
///
/// Called on the capture thread with the microphone block; must fill `out`
/// with `requested_frames` interleaved frames without blocking.
pub trait AudioCallback: Send + Sync {
    fn render(&self, requested_frames: usize, microphone: &[i16], out: &mut [i16]);
}

/// A local track accepting one audio-producing callback.
pub trait LocalAudioTrack: Send + Sync {
    fn id(&self) -> &TrackId;

    fn name(&self) -> &str;

    fn format(&self) -> AudioFormat;

    fn is_enabled(&self) -> bool;

    fn set_enabled(&self, enabled: bool);

    /// Install `callback`, returning whichever callback it replaced.
    fn install_callback(&self, callback: Arc<dyn AudioCallback>) -> Option<Arc<dyn AudioCallback>>;

    /// Remove `callback` if it is still the installed one.
    fn remove_callback(&self, callback: &Arc<dyn AudioCallback>) -> bool;
}

#[derive(Debug, Clone, Copy)]
pub struct TrackOptions {
    pub format: AudioFormat,
}

/// Creates local tracks.
pub trait TrackFactory {
    type Track: LocalAudioTrack + 'static;

    fn create_local_audio_track(
        &self,
        name: &str,
        options: TrackOptions,
    ) -> Result<Arc<Self::Track>, TrackError>;
}

pub struct MemoryLocalTrack {
    id: TrackId,
    name: String,
    format: AudioFormat,
    enabled: AtomicBool,
    callback: Mutex<Option<Arc<dyn AudioCallback>>>,
}

impl MemoryLocalTrack {
    pub fn new(name: &str, format: AudioFormat) -> Result<Self, TrackError> {
        if name.trim().is_empty() {
            return Err(TrackError::EmptyName);
        }
        format.validate()?;
        Ok(Self {
            id: TrackId::random(),
            name: name.to_string(),
            format,
            enabled: AtomicBool::new(true),
            callback: Mutex::new(None),
        })
    }

    pub fn has_callback(&self) -> bool {
        self.callback.lock().is_some()
    }

    /// Run one capture cycle: what the SDK's capture thread does with a
    /// microphone block. Fills `out` with what would be encoded.
    ///
    /// Without a callback the microphone passes through. A disabled track,
    /// or a callback slot busy with an install, sends silence.
    pub fn capture(&self, microphone: &[i16], out: &mut [i16]) {
        let channels = self.format.channels as usize;
        let frames = out.len() / channels;

        if !self.is_enabled() {
            out.fill(0);
            return;
        }

        let callback = match self.callback.try_lock() {
            Some(slot) => slot.clone(),
            None => {
                out.fill(0);
                return;
            }
        };

        match callback {
            Some(callback) => callback.render(frames, microphone, out),
            None => {
                let n = microphone.len().min(out.len());
                out[..n].copy_from_slice(&microphone[..n]);
                out[n..].fill(0);
            }
        }
    }
}

impl LocalAudioTrack for MemoryLocalTrack {
    fn id(&self) -> &TrackId {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn format(&self) -> AudioFormat {
        self.format
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    fn install_callback(&self, callback: Arc<dyn AudioCallback>) -> Option<Arc<dyn AudioCallback>> {
        self.callback.lock().replace(callback)
    }

    fn remove_callback(&self, callback: &Arc<dyn AudioCallback>) -> bool {
        let mut slot = self.callback.lock();
        match slot.as_ref() {
            Some(current) if Arc::ptr_eq(current, callback) => {
                *slot = None;
                true
            }
            _ => false,
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct MemoryTrackFactory;

impl TrackFactory for MemoryTrackFactory {
    type Track = MemoryLocalTrack;

    fn create_local_audio_track(
        &self,
        name: &str,
        options: TrackOptions,
    ) -> Result<Arc<MemoryLocalTrack>, TrackError> {
        let track = MemoryLocalTrack::new(name, options.format)?;
        info!("Created local track '{}' ({}) at {}", name, track.id, options.format);
        Ok(Arc::new(track))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Constant(i16);

    impl AudioCallback for Constant {
        fn render(&self, _requested_frames: usize, _microphone: &[i16], out: &mut [i16]) {
            out.fill(self.0);
        }
    }

    fn track() -> MemoryLocalTrack {
        MemoryLocalTrack::new("mic", AudioFormat::pcm16(8000, 1).unwrap()).unwrap()
    }

    #[test]
    fn test_passthrough_without_callback() {
        let track = track();
        let mut out = [0i16; 3];
        track.capture(&[5, 6], &mut out);
        assert_eq!(out, [5, 6, 0]);
    }

    #[test]
    fn test_callback_replaces_microphone() {
        let track = track();
        assert!(track.install_callback(Arc::new(Constant(42))).is_none());
        let mut out = [0i16; 2];
        track.capture(&[5, 6], &mut out);
        assert_eq!(out, [42, 42]);
    }

    #[test]
    fn test_install_returns_previous() {
        let track = track();
        let first: Arc<dyn AudioCallback> = Arc::new(Constant(1));
        track.install_callback(first.clone());
        let replaced = track.install_callback(Arc::new(Constant(2))).unwrap();
        assert!(Arc::ptr_eq(&replaced, &first));
    }

    #[test]
    fn test_remove_only_matching_callback() {
        let track = track();
        let installed: Arc<dyn AudioCallback> = Arc::new(Constant(1));
        let stranger: Arc<dyn AudioCallback> = Arc::new(Constant(2));
        track.install_callback(installed.clone());

        assert!(!track.remove_callback(&stranger));
        assert!(track.has_callback());
        assert!(track.remove_callback(&installed));
        assert!(!track.has_callback());
    }

    #[test]
    fn test_disabled_track_sends_silence() {
        let track = track();
        track.set_enabled(false);
        let mut out = [7i16; 2];
        track.capture(&[5, 6], &mut out);
        assert_eq!(out, [0, 0]);
    }

    #[test]
    fn test_factory_rejects_empty_name() {
        let options = TrackOptions {
            format: AudioFormat::pcm16(8000, 1).unwrap(),
        };
        assert!(MemoryTrackFactory
            .create_local_audio_track("  ", options)
            .is_err());
    }
}
