//! Format reconciliation between a provider's native PCM and a track's format.
//!
//! Stateless; every conversion is a pure function of its inputs.

use crate::audio::format::{AudioFormat, BitDepth, PcmBuffer};
use crate::error::FormatError;

/// Converts PCM buffers between sample rates, channel layouts and bit depths.
///
/// Handles:
/// - Resampling by linear interpolation, frame count scaled by the rate ratio
/// - Mono to N channels by duplication, N channels to mono by averaging
/// - Bit-depth changes as a linear rescale with rounding
pub struct FormatReconciler;

impl FormatReconciler {
    /// Convert `source` into `target`.
    pub fn convert(source: &PcmBuffer, target: &AudioFormat) -> Result<PcmBuffer, FormatError> {
        target.validate()?;
        let from = *source.format();
        if from == *target {
            return Ok(source.clone());
        }

        let samples: Vec<f64> = source.samples().into_iter().map(f64::from).collect();
        let remapped = Self::remap_channels(&samples, from.channels, target.channels)?;
        let resampled = Self::resample(
            &remapped,
            target.channels as usize,
            from.sample_rate,
            target.sample_rate,
        );
        let rescaled = Self::rescale(&resampled, from.bit_depth, target.bit_depth);

        PcmBuffer::from_samples(*target, &rescaled)
    }

    /// Fails if `from` cannot be converted into `to` at all.
    pub fn check(from: &AudioFormat, to: &AudioFormat) -> Result<(), FormatError> {
        to.validate()?;
        if from.channels == to.channels || from.channels == 1 || to.channels == 1 {
            Ok(())
        } else {
            Err(FormatError::UnsupportedChannelLayout {
                from: from.channels,
                to: to.channels,
            })
        }
    }

    /// Frame count produced by resampling `frames` frames.
    pub fn resampled_frame_count(frames: usize, from_rate: u32, to_rate: u32) -> usize {
        if from_rate == to_rate {
            return frames;
        }
        (frames as f64 * to_rate as f64 / from_rate as f64).round() as usize
    }

    fn remap_channels(samples: &[f64], from: u16, to: u16) -> Result<Vec<f64>, FormatError> {
        if from == to {
            return Ok(samples.to_vec());
        }

        let from_n = from as usize;
        let to_n = to as usize;

        if from == 1 {
            // Duplicate mono into every output channel
            let mut out = Vec::with_capacity(samples.len() * to_n);
            for &s in samples {
                out.extend(std::iter::repeat(s).take(to_n));
            }
            return Ok(out);
        }

        if to == 1 {
            // Average all channels; rounding happens once, at the rescale step
            return Ok(samples
                .chunks_exact(from_n)
                .map(|frame| frame.iter().sum::<f64>() / from_n as f64)
                .collect());
        }

        Err(FormatError::UnsupportedChannelLayout { from, to })
    }

    /// Linear-interpolation resampler over interleaved frames.
    /// Suitable for speech and test tones where perfect quality isn't critical.
    fn resample(samples: &[f64], channels: usize, from_rate: u32, to_rate: u32) -> Vec<f64> {
        if from_rate == to_rate || samples.is_empty() {
            return samples.to_vec();
        }

        let in_frames = samples.len() / channels;
        let out_frames = Self::resampled_frame_count(in_frames, from_rate, to_rate);
        let ratio = from_rate as f64 / to_rate as f64;
        let mut resampled = Vec::with_capacity(out_frames * channels);

        for i in 0..out_frames {
            let src_pos = i as f64 * ratio;
            let src_idx = src_pos as usize;
            let frac = src_pos - src_idx as f64;

            for ch in 0..channels {
                let sample = if src_idx + 1 < in_frames {
                    let a = samples[src_idx * channels + ch];
                    let b = samples[(src_idx + 1) * channels + ch];
                    a * (1.0 - frac) + b * frac
                } else {
                    // Hold the last frame past the end of the input
                    samples[(in_frames - 1) * channels + ch]
                };
                resampled.push(sample);
            }
        }

        resampled
    }

    fn rescale(samples: &[f64], from: BitDepth, to: BitDepth) -> Vec<i32> {
        let shift = to.bits() as i32 - from.bits() as i32;
        let factor = 2f64.powi(shift);
        let (min, max) = (to.min_value() as f64, to.max_value() as f64);
        samples
            .iter()
            .map(|&s| (s * factor).round().clamp(min, max) as i32)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mono16(rate: u32, samples: &[i16]) -> PcmBuffer {
        PcmBuffer::from_i16(AudioFormat::pcm16(rate, 1).unwrap(), samples).unwrap()
    }

    #[test]
    fn test_identity_conversion() {
        let source = mono16(16000, &[1, 2, 3]);
        let result = FormatReconciler::convert(&source, source.format()).unwrap();
        assert_eq!(result, source);
    }

    #[test]
    fn test_mono_to_stereo_duplicates() {
        let source = mono16(16000, &[100, -200]);
        let target = AudioFormat::pcm16(16000, 2).unwrap();
        let result = FormatReconciler::convert(&source, &target).unwrap();
        assert_eq!(result.to_i16().unwrap(), vec![100, 100, -200, -200]);
    }

    #[test]
    fn test_stereo_to_mono_averages() {
        let format = AudioFormat::pcm16(16000, 2).unwrap();
        let source = PcmBuffer::from_i16(format, &[100, 300, -1, -2]).unwrap();
        let target = AudioFormat::pcm16(16000, 1).unwrap();
        let result = FormatReconciler::convert(&source, &target).unwrap();
        // (-1 + -2) / 2 = -1.5 rounds away from zero
        assert_eq!(result.to_i16().unwrap(), vec![200, -2]);
    }

    #[test]
    fn test_unsupported_channel_layout() {
        let format = AudioFormat::pcm16(16000, 2).unwrap();
        let source = PcmBuffer::silence(format, 4);
        let target = AudioFormat::pcm16(16000, 6).unwrap();
        assert_eq!(
            FormatReconciler::convert(&source, &target),
            Err(FormatError::UnsupportedChannelLayout { from: 2, to: 6 })
        );
        assert!(FormatReconciler::check(&format, &target).is_err());
        assert!(FormatReconciler::check(&format, &AudioFormat::pcm16(8000, 1).unwrap()).is_ok());
    }

    #[test]
    fn test_bit_depth_rescale_rounds() {
        let source = mono16(8000, &[1000, -1000, 127, 128]);
        let target = AudioFormat::new(8000, 1, BitDepth::Eight).unwrap();
        let result = FormatReconciler::convert(&source, &target).unwrap();
        // 1000/256 = 3.9 -> 4, 127/256 = 0.496 -> 0, 128/256 = 0.5 -> 1
        assert_eq!(result.samples(), vec![4, -4, 0, 1]);
    }

    #[test]
    fn test_widening_is_exact() {
        let source = mono16(8000, &[i16::MIN, -1, 0, 1, i16::MAX]);
        let target = AudioFormat::new(8000, 1, BitDepth::TwentyFour).unwrap();
        let result = FormatReconciler::convert(&source, &target).unwrap();
        assert_eq!(
            result.samples(),
            vec![-32768 * 256, -256, 0, 256, 32767 * 256]
        );
    }

    #[test]
    fn test_resample_frame_count_rounds() {
        assert_eq!(FormatReconciler::resampled_frame_count(441, 44100, 48000), 480);
        assert_eq!(FormatReconciler::resampled_frame_count(48, 48000, 16000), 16);
        assert_eq!(FormatReconciler::resampled_frame_count(10, 3, 2), 7);
    }

    #[test]
    fn test_resample_downsample() {
        // 48kHz to 16kHz (3:1 ratio)
        let samples: Vec<i16> = (0..48).map(|i| i * 10).collect();
        let source = mono16(48000, &samples);
        let target = AudioFormat::pcm16(16000, 1).unwrap();
        let result = FormatReconciler::convert(&source, &target).unwrap();
        assert_eq!(result.frame_count(), 16);
        assert_eq!(result.to_i16().unwrap()[1], 30);
    }

    #[test]
    fn test_resample_upsample_interpolates() {
        let source = mono16(8000, &[0, 100]);
        let target = AudioFormat::pcm16(16000, 1).unwrap();
        let result = FormatReconciler::convert(&source, &target).unwrap();
        assert_eq!(result.to_i16().unwrap(), vec![0, 50, 100, 100]);
    }

    #[test]
    fn test_resample_empty() {
        let source = mono16(48000, &[]);
        let target = AudioFormat::pcm16(16000, 1).unwrap();
        let result = FormatReconciler::convert(&source, &target).unwrap();
        assert!(result.is_empty());
    }
}
