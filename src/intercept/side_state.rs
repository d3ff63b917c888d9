//! Out-of-band per-track state.
//!
//! Remote tracks belong to the SDK and cannot carry extra fields, so the
//! interception pipeline keeps what it needs here, keyed by track identity.
//! The store does not know when a track dies: entries live until someone
//! clears them. The pipeline clears on detach; [`SideStateStore::orphans`]
//! and [`SideStateStore::purge`] exist for owners that drop tracks while
//! still intercepting.

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

use crate::track::{SinkHandle, TrackId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SideKey {
    ActiveSink,
    PriorEnabled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SideValue {
    ActiveSink(SinkHandle),
    PriorEnabled(bool),
}

impl SideValue {
    pub fn key(&self) -> SideKey {
        match self {
            SideValue::ActiveSink(_) => SideKey::ActiveSink,
            SideValue::PriorEnabled(_) => SideKey::PriorEnabled,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SideEntry {
    pub active_sink: Option<SinkHandle>,
    pub prior_enabled: Option<bool>,
}

impl SideEntry {
    fn is_empty(&self) -> bool {
        self.active_sink.is_none() && self.prior_enabled.is_none()
    }
}

static GLOBAL: Lazy<Arc<SideStateStore>> = Lazy::new(|| Arc::new(SideStateStore::new()));

#[derive(Debug, Default)]
pub struct SideStateStore {
    entries: Mutex<HashMap<TrackId, SideEntry>>,
}

impl SideStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide store.
    pub fn global() -> Arc<SideStateStore> {
        GLOBAL.clone()
    }

    pub fn set(&self, track: &TrackId, value: SideValue) {
        let mut entries = self.entries.lock();
        let entry = entries.entry(track.clone()).or_default();
        match value {
            SideValue::ActiveSink(handle) => entry.active_sink = Some(handle),
            SideValue::PriorEnabled(enabled) => entry.prior_enabled = Some(enabled),
        }
    }

    pub fn get(&self, track: &TrackId, key: SideKey) -> Option<SideValue> {
        let entries = self.entries.lock();
        let entry = entries.get(track)?;
        match key {
            SideKey::ActiveSink => entry.active_sink.map(SideValue::ActiveSink),
            SideKey::PriorEnabled => entry.prior_enabled.map(SideValue::PriorEnabled),
        }
    }

    /// Remove one key, returning its value. The entry goes away with its
    /// last key.
    pub fn clear(&self, track: &TrackId, key: SideKey) -> Option<SideValue> {
        let mut entries = self.entries.lock();
        let entry = entries.get_mut(track)?;
        let previous = match key {
            SideKey::ActiveSink => entry.active_sink.take().map(SideValue::ActiveSink),
            SideKey::PriorEnabled => entry.prior_enabled.take().map(SideValue::PriorEnabled),
        };
        if entry.is_empty() {
            entries.remove(track);
        }
        previous
    }

    pub fn entry(&self, track: &TrackId) -> Option<SideEntry> {
        self.entries.lock().get(track).copied()
    }

    pub fn contains(&self, track: &TrackId) -> bool {
        self.entries.lock().contains_key(track)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Tracks with entries that are not in `live`.
    pub fn orphans(&self, live: &[TrackId]) -> Vec<TrackId> {
        let mut orphans: Vec<TrackId> = self
            .entries
            .lock()
            .keys()
            .filter(|id| !live.contains(*id))
            .cloned()
            .collect();
        orphans.sort();
        orphans
    }

    /// Drop a track's entry without restoring anything.
    pub fn purge(&self, track: &TrackId) -> Option<SideEntry> {
        self.entries.lock().remove(track)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::format::AudioFormat;
    use crate::track::{MemoryRemoteTrack, RemoteAudioSink, RemoteAudioTrack, RemoteFrame, SinkVerdict};

    struct Noop;

    impl RemoteAudioSink for Noop {
        fn on_frame(&self, _frame: &RemoteFrame<'_>) -> SinkVerdict {
            SinkVerdict::Pass
        }
    }

    fn handle() -> SinkHandle {
        let track = MemoryRemoteTrack::new("h", AudioFormat::pcm16(8000, 1).unwrap());
        track.add_sink(Arc::new(Noop))
    }

    #[test]
    fn test_set_get_clear() {
        let store = SideStateStore::new();
        let id = TrackId::from("a");
        let sink = handle();

        store.set(&id, SideValue::ActiveSink(sink));
        store.set(&id, SideValue::PriorEnabled(true));
        assert_eq!(
            store.get(&id, SideKey::ActiveSink),
            Some(SideValue::ActiveSink(sink))
        );
        assert_eq!(
            store.get(&id, SideKey::PriorEnabled),
            Some(SideValue::PriorEnabled(true))
        );

        assert_eq!(
            store.clear(&id, SideKey::PriorEnabled),
            Some(SideValue::PriorEnabled(true))
        );
        assert!(store.contains(&id));
        store.clear(&id, SideKey::ActiveSink);
        assert!(!store.contains(&id));
        assert!(store.is_empty());
    }

    #[test]
    fn test_missing_entries() {
        let store = SideStateStore::new();
        let id = TrackId::from("missing");
        assert_eq!(store.get(&id, SideKey::ActiveSink), None);
        assert_eq!(store.clear(&id, SideKey::ActiveSink), None);
        assert_eq!(store.entry(&id), None);
    }

    #[test]
    fn test_orphans_and_purge() {
        let store = SideStateStore::new();
        let live = TrackId::from("live");
        let gone = TrackId::from("gone");
        store.set(&live, SideValue::PriorEnabled(false));
        store.set(&gone, SideValue::PriorEnabled(true));

        assert_eq!(store.orphans(&[live.clone()]), vec![gone.clone()]);
        assert_eq!(
            store.purge(&gone),
            Some(SideEntry {
                active_sink: None,
                prior_enabled: Some(true)
            })
        );
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_value_keys() {
        assert_eq!(SideValue::PriorEnabled(false).key(), SideKey::PriorEnabled);
    }
}
