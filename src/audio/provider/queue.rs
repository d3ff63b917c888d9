//! Application-fed provider.
//!
//! Samples travel through a single-producer single-consumer ring. The read
//! half belongs to the provider and is drained lock-free on the real-time
//! thread. Producers serialise on a mutex around the write half and
//! reconcile pushed buffers into the queue format before writing.
//!
//! A bounded queue holds at most its capacity; incoming frames that do not
//! fit are dropped and counted. An unbounded queue parks the excess in a
//! staging area next to the write half. When the ring runs low, `pull`
//! moves staged frames over with a `try_lock`; a busy lock only means the
//! refill waits for the next callback.

use parking_lot::Mutex;
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

use super::{BufferProvider, Pull};
use crate::audio::diagnostics::{DiagnosticEvent, Diagnostics};
use crate::audio::format::{AudioFormat, BitDepth, PcmBuffer};
use crate::audio::reconciler::FormatReconciler;
use crate::error::ProviderError;

/// Write half of the ring plus everything producers need to fill it.
struct ProducerSide {
    ring: HeapProd<i16>,
    /// Ring capacity in samples; always whole frames.
    ring_samples: usize,
    format: AudioFormat,
    staging: VecDeque<i16>,
}

struct QueueShared {
    producer: Mutex<ProducerSide>,
    /// Bound in frames, `None` for unbounded.
    capacity_frames: Option<usize>,
    /// Samples written to the ring and not yet read.
    queued_samples: AtomicUsize,
    staged_samples: AtomicUsize,
    closed: AtomicBool,
    dropped_frames: AtomicU64,
    contended_pulls: AtomicU64,
}

fn ring_samples(format: &AudioFormat, capacity_frames: Option<usize>) -> usize {
    // Unbounded queues keep one second in the ring and stage the rest
    let frames = capacity_frames.unwrap_or(format.sample_rate as usize);
    format.samples_for(frames.max(1))
}

impl QueueShared {
    /// Move staged samples into the ring, as many whole frames as fit.
    fn flush(&self, side: &mut ProducerSide) {
        if side.staging.is_empty() {
            return;
        }
        let channels = side.format.channels as usize;
        let queued = self.queued_samples.load(Ordering::Acquire);
        let room = side.ring_samples.saturating_sub(queued) / channels * channels;
        let n = room.min(side.staging.len());
        if n > 0 {
            let written = side.ring.push_iter(side.staging.drain(..n));
            self.queued_samples.fetch_add(written, Ordering::Release);
        }
        self.staged_samples
            .store(side.staging.len(), Ordering::Release);
    }

    /// Append whole frames in the queue format. Returns frames accepted.
    fn enqueue(&self, side: &mut ProducerSide, samples: &[i16]) -> usize {
        let channels = side.format.channels as usize;
        self.flush(side);

        let mut accepted = 0;
        let mut rest = samples;
        if side.staging.is_empty() {
            let queued = self.queued_samples.load(Ordering::Acquire);
            let room = side.ring_samples.saturating_sub(queued) / channels * channels;
            let n = room.min(rest.len());
            let written = side.ring.push_slice(&rest[..n]);
            self.queued_samples.fetch_add(written, Ordering::Release);
            accepted += written;
            rest = &rest[written..];
        }

        if !rest.is_empty() {
            if self.capacity_frames.is_some() {
                let frames = (rest.len() / channels) as u64;
                self.dropped_frames.fetch_add(frames, Ordering::Relaxed);
                warn!(
                    "Queue provider overflow: dropped {} incoming frames (capacity {} frames)",
                    frames,
                    side.ring_samples / channels
                );
            } else {
                side.staging.extend(rest);
                accepted += rest.len();
                self.staged_samples
                    .store(side.staging.len(), Ordering::Release);
            }
        }

        accepted / channels
    }
}

/// Consumer half, owned by the mixer.
pub struct QueueProvider {
    shared: Arc<QueueShared>,
    ring: HeapCons<i16>,
    format: AudioFormat,
    diagnostics: Diagnostics,
}

/// Producer half, cloneable and shareable with application threads.
#[derive(Clone)]
pub struct QueueProducer {
    shared: Arc<QueueShared>,
}

impl QueueProvider {
    /// Queue holding at most `capacity_frames` frames; frames pushed into a
    /// full queue are dropped.
    pub fn bounded(format: AudioFormat, capacity_frames: usize) -> (Self, QueueProducer) {
        Self::build(format, Some(capacity_frames.max(1)))
    }

    pub fn unbounded(format: AudioFormat) -> (Self, QueueProducer) {
        Self::build(format, None)
    }

    fn build(format: AudioFormat, capacity_frames: Option<usize>) -> (Self, QueueProducer) {
        // Queued samples are always 16-bit
        let format = AudioFormat {
            bit_depth: BitDepth::Sixteen,
            ..format
        };
        let ring_samples = ring_samples(&format, capacity_frames);
        let (ring, consumer) = HeapRb::<i16>::new(ring_samples).split();

        let shared = Arc::new(QueueShared {
            producer: Mutex::new(ProducerSide {
                ring,
                ring_samples,
                format,
                staging: VecDeque::new(),
            }),
            capacity_frames,
            queued_samples: AtomicUsize::new(0),
            staged_samples: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
            dropped_frames: AtomicU64::new(0),
            contended_pulls: AtomicU64::new(0),
        });
        let provider = Self {
            shared: shared.clone(),
            ring: consumer,
            format,
            diagnostics: Diagnostics::disabled(),
        };
        (provider, QueueProducer { shared })
    }

    pub fn with_diagnostics(mut self, diagnostics: Diagnostics) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    /// The format `pull` produces; the track format once primed.
    pub fn format(&self) -> &AudioFormat {
        &self.format
    }

    /// Pulls that wanted staged frames but found a producer holding the lock.
    pub fn contended_pulls(&self) -> u64 {
        self.shared.contended_pulls.load(Ordering::Relaxed)
    }

    fn refill(&mut self) {
        match self.shared.producer.try_lock() {
            Some(mut side) => self.shared.flush(&mut side),
            None => {
                self.shared.contended_pulls.fetch_add(1, Ordering::Relaxed);
                self.diagnostics.report(DiagnosticEvent::QueueContended);
            }
        }
    }
}

impl QueueProducer {
    /// Reconcile `buffer` to the queue format and append it.
    ///
    /// Returns the number of frames accepted.
    pub fn push(&self, buffer: &PcmBuffer) -> Result<usize, ProviderError> {
        if self.is_closed() {
            return Err(ProviderError::Closed);
        }
        let mut side = self.shared.producer.lock();
        let samples = FormatReconciler::convert(buffer, &side.format)?.to_i16()?;
        Ok(self.shared.enqueue(&mut side, &samples))
    }

    /// Append interleaved samples already in the queue's current format
    /// (see [`QueueProducer::format`]).
    pub fn push_samples(&self, samples: &[i16]) -> Result<usize, ProviderError> {
        if self.is_closed() {
            return Err(ProviderError::Closed);
        }

        let mut side = self.shared.producer.lock();
        let channels = side.format.channels as usize;
        let whole = samples.len() - samples.len() % channels;
        if whole != samples.len() {
            warn!(
                "Discarding {} trailing samples that do not form a whole frame",
                samples.len() - whole
            );
        }
        Ok(self.shared.enqueue(&mut side, &samples[..whole]))
    }

    /// Mark the stream finished; the provider exhausts once drained.
    pub fn close(&self) {
        if !self.shared.closed.swap(true, Ordering::AcqRel) {
            debug!("Queue provider closed by producer");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    pub fn queued_frames(&self) -> usize {
        let side = self.shared.producer.lock();
        let samples = self.shared.queued_samples.load(Ordering::Acquire) + side.staging.len();
        samples / side.format.channels as usize
    }

    pub fn dropped_frames(&self) -> u64 {
        self.shared.dropped_frames.load(Ordering::Relaxed)
    }

    /// Format of queued samples; the track format once the mixer has started.
    pub fn format(&self) -> AudioFormat {
        self.shared.producer.lock().format
    }
}

impl BufferProvider for QueueProvider {
    /// Adopt `target` as the queue format, reconciling anything queued so far.
    fn prime(&mut self, target: &AudioFormat) -> Result<(), ProviderError> {
        let mut side = self.shared.producer.lock();
        if side.format == *target {
            self.format = *target;
            return Ok(());
        }
        if target.bit_depth != BitDepth::Sixteen {
            return Err(ProviderError::FormatMismatch {
                provider: side.format.to_string(),
                target: target.to_string(),
            });
        }
        FormatReconciler::check(&side.format, target)?;

        // Producers are locked out, so the ring and staging hold everything
        let mut pending: Vec<i16> = self.ring.pop_iter().collect();
        pending.extend(side.staging.drain(..));
        self.shared.queued_samples.store(0, Ordering::Release);
        self.shared.staged_samples.store(0, Ordering::Release);

        let source = PcmBuffer::from_i16(side.format, &pending)?;
        let converted = FormatReconciler::convert(&source, target)?.to_i16()?;

        let ring_samples = ring_samples(target, self.shared.capacity_frames);
        let (ring, consumer) = HeapRb::<i16>::new(ring_samples).split();
        debug!(
            "Queue provider reformatted {} -> {} ({} frames requeued)",
            side.format,
            target,
            converted.len() / target.channels as usize
        );
        side.ring = ring;
        side.ring_samples = ring_samples;
        side.format = *target;
        self.ring = consumer;
        self.format = *target;

        self.shared.enqueue(&mut side, &converted);
        Ok(())
    }

    fn pull(&mut self, requested_frames: usize, target: &AudioFormat, out: &mut [i16]) -> Pull {
        if *target != self.format {
            return Pull::NoData;
        }

        let channels = self.format.channels as usize;
        let wanted = requested_frames * channels;
        if self.shared.queued_samples.load(Ordering::Acquire) < wanted
            && self.shared.staged_samples.load(Ordering::Acquire) > 0
        {
            self.refill();
        }

        let available = self.shared.queued_samples.load(Ordering::Acquire);
        let frames = requested_frames.min(available / channels);
        if frames == 0 {
            return Pull::NoData;
        }

        let read = self.ring.pop_slice(&mut out[..frames * channels]);
        self.shared.queued_samples.fetch_sub(read, Ordering::Release);
        Pull::Frames(read / channels)
    }

    fn is_exhausted(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
            && self.shared.queued_samples.load(Ordering::Acquire) == 0
            && self.shared.staged_samples.load(Ordering::Acquire) == 0
    }
}
