//! Out-of-band fault reporting for the real-time paths.
//!
//! Callbacks never log or return errors. They push events into a bounded
//! channel with `try_send`; when the channel is full or nobody listens the
//! event is dropped and only counted.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::track::TrackId;

/// Something the real-time path degraded around.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiagnosticEvent {
    /// Samples clamped to the representable range during one render.
    Clipped { samples: u32 },
    /// Render found the engine locked by the control plane and emitted silence.
    EngineBusy,
    /// A non-looping provider ran dry; further pulls are skipped.
    ProviderExhausted,
    /// A queue provider pull wanted staged frames but a producer held the lock.
    QueueContended,
    /// An interceptor panicked; the frame was dropped.
    InterceptorPanicked { track: TrackId },
    /// An interceptor returned a replacement buffer of the wrong size.
    ModifiedLengthMismatch {
        track: TrackId,
        expected: usize,
        actual: usize,
    },
}

/// Cloneable sender side of the diagnostics channel.
#[derive(Clone, Default)]
pub struct Diagnostics {
    sender: Option<mpsc::Sender<DiagnosticEvent>>,
    dropped: Arc<AtomicU64>,
}

impl Diagnostics {
    /// A sink plus the receiver the application drains.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<DiagnosticEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                sender: Some(tx),
                dropped: Arc::new(AtomicU64::new(0)),
            },
            rx,
        )
    }

    /// Reports go nowhere.
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Non-blocking; safe to call from a real-time callback.
    pub fn report(&self, event: DiagnosticEvent) {
        let Some(sender) = &self.sender else {
            return;
        };
        if sender.try_send(event).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Events lost to a full or closed channel.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
