//! Buffer provider abstraction for feeding application audio into the mixer.

mod file;
mod queue;
mod synthetic;

pub use file::FileProvider;
pub use queue::{QueueProducer, QueueProvider};
pub use synthetic::{Signal, SyntheticProvider};

use crate::audio::format::AudioFormat;
use crate::error::ProviderError;

/// Result of a single pull from a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pull {
    /// This many whole frames were written to the front of the output slice.
    Frames(usize),
    /// Nothing available right now. Not an error.
    NoData,
}

impl Pull {
    pub fn frames(self) -> usize {
        match self {
            Pull::Frames(n) => n,
            Pull::NoData => 0,
        }
    }
}

/// Trait for sources the mixer pulls PCM from (files, app queues, test tones).
///
/// `pull` runs on the real-time audio thread: it must not block and must not
/// allocate. All decoding and format reconciliation happens in `prime`, which
/// the mixer calls from `start()` on the control thread.
pub trait BufferProvider: Send {
    /// Prepare to produce frames in `target` format.
    fn prime(&mut self, target: &AudioFormat) -> Result<(), ProviderError>;

    /// Write up to `requested_frames` interleaved 16-bit frames into `out`.
    ///
    /// `out` holds at least `requested_frames * target.channels` samples.
    fn pull(&mut self, requested_frames: usize, target: &AudioFormat, out: &mut [i16]) -> Pull;

    /// Whether the provider has permanently run out of audio.
    fn is_exhausted(&self) -> bool;
}

/// The known provider variants, dispatched statically.
pub enum AudioProvider {
    File(FileProvider),
    Queue(QueueProvider),
    Synthetic(SyntheticProvider),
}

impl AudioProvider {
    pub fn kind(&self) -> &'static str {
        match self {
            AudioProvider::File(_) => "file",
            AudioProvider::Queue(_) => "queue",
            AudioProvider::Synthetic(_) => "synthetic",
        }
    }
}

impl BufferProvider for AudioProvider {
    fn prime(&mut self, target: &AudioFormat) -> Result<(), ProviderError> {
        match self {
            AudioProvider::File(p) => p.prime(target),
            AudioProvider::Queue(p) => p.prime(target),
            AudioProvider::Synthetic(p) => p.prime(target),
        }
    }

    fn pull(&mut self, requested_frames: usize, target: &AudioFormat, out: &mut [i16]) -> Pull {
        match self {
            AudioProvider::File(p) => p.pull(requested_frames, target, out),
            AudioProvider::Queue(p) => p.pull(requested_frames, target, out),
            AudioProvider::Synthetic(p) => p.pull(requested_frames, target, out),
        }
    }

    fn is_exhausted(&self) -> bool {
        match self {
            AudioProvider::File(p) => p.is_exhausted(),
            AudioProvider::Queue(p) => p.is_exhausted(),
            AudioProvider::Synthetic(p) => p.is_exhausted(),
        }
    }
}

impl From<FileProvider> for AudioProvider {
    fn from(provider: FileProvider) -> Self {
        AudioProvider::File(provider)
    }
}

impl From<QueueProvider> for AudioProvider {
    fn from(provider: QueueProvider) -> Self {
        AudioProvider::Queue(provider)
    }
}

impl From<SyntheticProvider> for AudioProvider {
    fn from(provider: SyntheticProvider) -> Self {
        AudioProvider::Synthetic(provider)
    }
}
