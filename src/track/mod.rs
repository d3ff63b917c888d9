//! Track collaborators the core plugs into.
//!
//! The conferencing SDK owns real tracks; the core only needs the narrow
//! contracts below. The `Memory*` types are in-process implementations used
//! by the CLI and the tests.

mod local;
mod remote;

pub use local::{
    AudioCallback, LocalAudioTrack, MemoryLocalTrack, MemoryTrackFactory, TrackFactory, TrackOptions,
};
pub use remote::{
    MemoryRemoteTrack, Playout, RemoteAudioSink, RemoteAudioTrack, RemoteFrame, SinkHandle,
    SinkVerdict,
};

use std::fmt;
use std::sync::Arc;

/// Stable identity of a track, used as the side-state key.
///
/// Clones share one allocation, so the real-time paths can copy ids into
/// diagnostics without allocating.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TrackId(Arc<str>);

impl TrackId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(Arc::from(id.into()))
    }

    pub fn random() -> Self {
        Self::new(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for TrackId {
    fn from(id: String) -> Self {
        TrackId::new(id)
    }
}

impl From<&str> for TrackId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}
