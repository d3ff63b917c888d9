//! Inbound (remote) audio tracks and their sinks.

use parking_lot::RwLock;
use std::borrow::Cow;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::TrackId;
use crate::audio::format::{AudioFormat, FrameDescriptor};

/// One decoded block of remote audio, valid only for the duration of a sink
/// call. Sinks that keep the samples must copy them.
#[derive(Debug, Clone, Copy)]
pub struct RemoteFrame<'a> {
    pub track_id: &'a TrackId,
    pub descriptor: FrameDescriptor,
    pub data: &'a [u8],
    pub timestamp: Duration,
}

/// What a sink wants done with a frame on the playback path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkVerdict {
    Pass,
    Replace(Vec<u8>),
    Drop,
}

pub trait RemoteAudioSink: Send + Sync {
    fn on_frame(&self, frame: &RemoteFrame<'_>) -> SinkVerdict;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SinkHandle(u64);

/// A remote track that delivers decoded frames to registered sinks.
pub trait RemoteAudioTrack: Send + Sync {
    fn id(&self) -> &TrackId;

    fn format(&self) -> AudioFormat;

    fn is_enabled(&self) -> bool;

    fn set_enabled(&self, enabled: bool);

    fn add_sink(&self, sink: Arc<dyn RemoteAudioSink>) -> SinkHandle;

    fn remove_sink(&self, handle: SinkHandle) -> bool;

    fn sink_count(&self) -> usize;
}

/// What reaches the speaker for one delivered frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Playout<'a> {
    Speaker(Cow<'a, [u8]>),
    Suppressed,
}

pub struct MemoryRemoteTrack {
    id: TrackId,
    format: AudioFormat,
    enabled: AtomicBool,
    sinks: RwLock<Vec<(SinkHandle, Arc<dyn RemoteAudioSink>)>>,
    next_handle: AtomicU64,
}

impl MemoryRemoteTrack {
    pub fn new(id: impl Into<TrackId>, format: AudioFormat) -> Self {
        Self {
            id: id.into(),
            format,
            enabled: AtomicBool::new(true),
            sinks: RwLock::new(Vec::new()),
            next_handle: AtomicU64::new(1),
        }
    }

    /// Run one decode cycle: hand `data` to every sink and work out what the
    /// speaker plays.
    ///
    /// Every sink sees the original frame. Any `Drop` verdict suppresses
    /// playback; the last `Replace` wins otherwise. A sink list busy with an
    /// attach or detach yields silence for this frame.
    pub fn deliver<'a>(&self, data: &'a [u8], timestamp: Duration) -> Playout<'a> {
        let frame_bytes = self.format.frame_bytes();
        if data.len() % frame_bytes != 0 {
            return Playout::Suppressed;
        }

        let frame = RemoteFrame {
            track_id: &self.id,
            descriptor: FrameDescriptor::new(self.format, data.len() / frame_bytes),
            data,
            timestamp,
        };

        let Some(sinks) = self.sinks.try_read() else {
            return Playout::Suppressed;
        };

        let mut suppressed = false;
        let mut output = Cow::Borrowed(data);
        for (_, sink) in sinks.iter() {
            match sink.on_frame(&frame) {
                SinkVerdict::Pass => {}
                SinkVerdict::Replace(samples) => output = Cow::Owned(samples),
                SinkVerdict::Drop => suppressed = true,
            }
        }

        if suppressed || !self.is_enabled() {
            Playout::Suppressed
        } else {
            Playout::Speaker(output)
        }
    }
}

impl RemoteAudioTrack for MemoryRemoteTrack {
    fn id(&self) -> &TrackId {
        &self.id
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

    fn add_sink(&self, sink: Arc<dyn RemoteAudioSink>) -> SinkHandle {
        let handle = SinkHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        self.sinks.write().push((handle, sink));
        handle
    }

    fn remove_sink(&self, handle: SinkHandle) -> bool {
        let mut sinks = self.sinks.write();
        let before = sinks.len();
        sinks.retain(|(h, _)| *h != handle);
        sinks.len() != before
    }

    fn sink_count(&self) -> usize {
        self.sinks.read().len()
    }
}
