//! File-backed provider.
//!
//! Decoding happens up front (`open`) and reconciliation to the track format
//! happens in `prime`, both on the control thread. `pull` only copies frames
//! that are already in the target format.

use std::path::Path;
use tracing::{debug, info};

use super::{BufferProvider, Pull};
use crate::audio::format::{AudioFormat, BitDepth, PcmBuffer};
use crate::audio::reconciler::FormatReconciler;
use crate::error::ProviderError;

pub struct FileProvider {
    clip: PcmBuffer,
    looping: bool,
    ready: Vec<i16>,
    ready_channels: usize,
    cursor: usize,
    exhausted: bool,
}

impl FileProvider {
    /// Wrap an already-decoded clip.
    pub fn from_buffer(clip: PcmBuffer, looping: bool) -> Self {
        Self {
            clip,
            looping,
            ready: Vec::new(),
            ready_channels: 1,
            cursor: 0,
            exhausted: false,
        }
    }

    /// Decode a WAV file into memory.
    pub fn open(path: impl AsRef<Path>, looping: bool) -> Result<Self, ProviderError> {
        let path = path.as_ref();
        let clip = decode_wav(path)?;
        info!(
            "Decoded {:?}: {} frames at {}",
            path,
            clip.frame_count(),
            clip.format()
        );
        Ok(Self::from_buffer(clip, looping))
    }

    /// Native format of the decoded clip.
    pub fn source_format(&self) -> &AudioFormat {
        self.clip.format()
    }

    pub fn frame_count(&self) -> usize {
        self.clip.frame_count()
    }

    pub fn is_looping(&self) -> bool {
        self.looping
    }

    /// The decoded clip in its native format.
    pub fn into_clip(self) -> PcmBuffer {
        self.clip
    }
}

/// Read every sample of a WAV file into a [`PcmBuffer`] in its native format.
pub(crate) fn decode_wav(path: &Path) -> Result<PcmBuffer, ProviderError> {
    let reader = hound::WavReader::open(path)?;
    let spec = reader.spec();
    let depth = BitDepth::from_bits(spec.bits_per_sample)?;
    let format = AudioFormat::new(spec.sample_rate, spec.channels, depth)?;

    let samples: Vec<i32> = match spec.sample_format {
        hound::SampleFormat::Int => reader.into_samples::<i32>().collect::<Result<_, _>>()?,
        hound::SampleFormat::Float => {
            // Float WAVs land in the matching integer width
            let max = depth.max_value() as f64;
            reader
                .into_samples::<f32>()
                .map(|s| s.map(|v| (v as f64 * max).round() as i32))
                .collect::<Result<_, _>>()?
        }
    };

    Ok(PcmBuffer::from_samples(format, &samples)?)
}

impl BufferProvider for FileProvider {
    fn prime(&mut self, target: &AudioFormat) -> Result<(), ProviderError> {
        if self.clip.is_empty() {
            return Err(ProviderError::Empty);
        }

        let converted = FormatReconciler::convert(&self.clip, target)?;
        self.ready = converted.to_i16()?;
        if self.ready.is_empty() {
            return Err(ProviderError::Empty);
        }
        self.ready_channels = target.channels as usize;
        self.cursor = 0;
        self.exhausted = false;

        debug!(
            "File provider primed: {} -> {} ({} frames, loop={})",
            self.clip.format(),
            target,
            self.ready.len() / self.ready_channels,
            self.looping
        );
        Ok(())
    }

    fn pull(&mut self, requested_frames: usize, target: &AudioFormat, out: &mut [i16]) -> Pull {
        if self.exhausted || self.ready.is_empty() || target.channels as usize != self.ready_channels
        {
            return Pull::NoData;
        }

        let wanted = target.samples_for(requested_frames);
        let mut written = 0;

        while written < wanted {
            if self.cursor >= self.ready.len() {
                if self.looping {
                    self.cursor = 0;
                } else {
                    self.exhausted = true;
                    break;
                }
            }

            let n = (wanted - written).min(self.ready.len() - self.cursor);
            out[written..written + n].copy_from_slice(&self.ready[self.cursor..self.cursor + n]);
            self.cursor += n;
            written += n;
        }

        // A non-looping clip that ends exactly on this pull is done now
        if !self.looping && self.cursor >= self.ready.len() {
            self.exhausted = true;
        }

        match written / self.ready_channels {
            0 => Pull::NoData,
            frames => Pull::Frames(frames),
        }
    }

    fn is_exhausted(&self) -> bool {
        self.exhausted
    }
}
