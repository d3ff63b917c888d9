//! Remote audio interception.
//!
//! An interceptor sees every decoded frame of a remote track before the
//! speaker does and decides whether it is played. Attach and detach are
//! control-plane calls; the per-frame work runs on the decode thread and
//! never propagates a failure back to it.

pub mod side_state;

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::audio::diagnostics::{DiagnosticEvent, Diagnostics};
use crate::error::InterceptError;
use crate::track::{RemoteAudioSink, RemoteAudioTrack, RemoteFrame, SinkVerdict, TrackId};
use side_state::{SideKey, SideStateStore, SideValue};

/// What an interceptor wants done with one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterceptDecision {
    pub allow_playback: bool,
    /// Replacement bytes for the speaker; must match the frame's byte length.
    pub modified: Option<Vec<u8>>,
}

impl InterceptDecision {
    pub fn play() -> Self {
        Self {
            allow_playback: true,
            modified: None,
        }
    }

    pub fn suppress() -> Self {
        Self {
            allow_playback: false,
            modified: None,
        }
    }

    pub fn replace(samples: Vec<u8>) -> Self {
        Self {
            allow_playback: true,
            modified: Some(samples),
        }
    }
}

/// Application logic run on each decoded remote frame.
///
/// Runs on the decode thread: copy what you need and return quickly. The
/// frame's buffer is not valid after the call.
pub trait Interceptor: Send + Sync {
    fn on_remote_audio(&self, frame: &RemoteFrame<'_>) -> InterceptDecision;

    /// Whether playback is always suppressed. Muting interceptors also get
    /// the track's enabled flag turned off while attached.
    fn mutes_playback(&self) -> bool {
        false
    }
}

impl<F> Interceptor for F
where
    F: Fn(&RemoteFrame<'_>) -> InterceptDecision + Send + Sync,
{
    fn on_remote_audio(&self, frame: &RemoteFrame<'_>) -> InterceptDecision {
        self(frame)
    }
}

/// Box a closure as an interceptor.
pub fn interceptor_fn<F>(f: F) -> Arc<dyn Interceptor>
where
    F: Fn(&RemoteFrame<'_>) -> InterceptDecision + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Wraps an interceptor so the speaker never plays the track.
pub struct MutingInterceptor {
    inner: Arc<dyn Interceptor>,
}

impl MutingInterceptor {
    pub fn new(inner: Arc<dyn Interceptor>) -> Self {
        Self { inner }
    }
}

impl Interceptor for MutingInterceptor {
    fn on_remote_audio(&self, frame: &RemoteFrame<'_>) -> InterceptDecision {
        let mut decision = self.inner.on_remote_audio(frame);
        decision.allow_playback = false;
        decision
    }

    fn mutes_playback(&self) -> bool {
        true
    }
}

/// The sink the pipeline installs on a remote track.
struct InterceptSink {
    track: TrackId,
    interceptor: Arc<dyn Interceptor>,
    diagnostics: Diagnostics,
}

impl RemoteAudioSink for InterceptSink {
    fn on_frame(&self, frame: &RemoteFrame<'_>) -> SinkVerdict {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            self.interceptor.on_remote_audio(frame)
        }));

        let decision = match outcome {
            Ok(decision) => decision,
            Err(_) => {
                self.diagnostics.report(DiagnosticEvent::InterceptorPanicked {
                    track: self.track.clone(),
                });
                return SinkVerdict::Drop;
            }
        };

        if !decision.allow_playback || self.interceptor.mutes_playback() {
            return SinkVerdict::Drop;
        }

        match decision.modified {
            None => SinkVerdict::Pass,
            Some(samples) if samples.len() == frame.data.len() => SinkVerdict::Replace(samples),
            Some(samples) => {
                self.diagnostics.report(DiagnosticEvent::ModifiedLengthMismatch {
                    track: self.track.clone(),
                    expected: frame.data.len(),
                    actual: samples.len(),
                });
                SinkVerdict::Pass
            }
        }
    }
}

static GLOBAL: Lazy<InterceptionPipeline> =
    Lazy::new(|| InterceptionPipeline::new(SideStateStore::global()));

/// Installs and removes interceptors on remote tracks.
pub struct InterceptionPipeline {
    store: Arc<SideStateStore>,
    // Serialises attach/detach so a re-attach cannot interleave with another.
    control: Mutex<()>,
    diagnostics: Diagnostics,
}

impl InterceptionPipeline {
    pub fn new(store: Arc<SideStateStore>) -> Self {
        Self {
            store,
            control: Mutex::new(()),
            diagnostics: Diagnostics::disabled(),
        }
    }

    /// Pipeline over the process-wide side-state store.
    pub fn global() -> &'static InterceptionPipeline {
        &GLOBAL
    }

    pub fn with_diagnostics(mut self, diagnostics: Diagnostics) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    pub fn store(&self) -> &Arc<SideStateStore> {
        &self.store
    }

    /// Start intercepting `track`. An interceptor already attached is fully
    /// detached first.
    pub fn attach(
        &self,
        track: &dyn RemoteAudioTrack,
        interceptor: Arc<dyn Interceptor>,
    ) -> Result<(), InterceptError> {
        let id = track.id().clone();
        track.format().validate().map_err(|source| InterceptError::Format {
            track: id.to_string(),
            source,
        })?;

        let _control = self.control.lock();

        if self.detach_locked(track) {
            debug!("Replaced existing interceptor on remote track {}", id);
        }

        let muting = interceptor.mutes_playback();
        if muting {
            self.store
                .set(&id, SideValue::PriorEnabled(track.is_enabled()));
            track.set_enabled(false);
        }

        let sink = Arc::new(InterceptSink {
            track: id.clone(),
            interceptor,
            diagnostics: self.diagnostics.clone(),
        });
        let handle = track.add_sink(sink);
        self.store.set(&id, SideValue::ActiveSink(handle));

        info!(
            "Intercepting remote track {} (muting: {})",
            id, muting
        );
        Ok(())
    }

    /// Stop intercepting `track`. Returns false if nothing was attached.
    pub fn detach(&self, track: &dyn RemoteAudioTrack) -> bool {
        let _control = self.control.lock();
        let detached = self.detach_locked(track);
        if detached {
            info!("Stopped intercepting remote track {}", track.id());
        }
        detached
    }

    pub fn is_intercepting(&self, track: &TrackId) -> bool {
        matches!(
            self.store.get(track, SideKey::ActiveSink),
            Some(SideValue::ActiveSink(_))
        )
    }

    fn detach_locked(&self, track: &dyn RemoteAudioTrack) -> bool {
        let id = track.id();
        if !self.store.contains(id) {
            return false;
        }

        if let Some(SideValue::ActiveSink(handle)) = self.store.clear(id, SideKey::ActiveSink) {
            if !track.remove_sink(handle) {
                warn!("Interceptor sink on {} was already gone", id);
            }
        }

        if let Some(SideValue::PriorEnabled(enabled)) = self.store.clear(id, SideKey::PriorEnabled)
        {
            track.set_enabled(enabled);
            debug!("Restored enabled={} on remote track {}", enabled, id);
        }

        true
    }
}

/// Attach through the process-wide pipeline.
pub fn attach_interceptor(
    track: &dyn RemoteAudioTrack,
    interceptor: Arc<dyn Interceptor>,
) -> Result<(), InterceptError> {
    InterceptionPipeline::global().attach(track, interceptor)
}

/// Detach through the process-wide pipeline.
pub fn detach_interceptor(track: &dyn RemoteAudioTrack) -> bool {
    InterceptionPipeline::global().detach(track)
}
