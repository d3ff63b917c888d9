//! PCM frame description shared by the mixing and interception paths.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::FormatError;

/// Supported sample widths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BitDepth {
    Eight,
    Sixteen,
    TwentyFour,
    ThirtyTwo,
}

impl BitDepth {
    pub fn from_bits(bits: u16) -> Result<Self, FormatError> {
        match bits {
            8 => Ok(Self::Eight),
            16 => Ok(Self::Sixteen),
            24 => Ok(Self::TwentyFour),
            32 => Ok(Self::ThirtyTwo),
            other => Err(FormatError::UnsupportedBitDepth { bits: other }),
        }
    }

    pub fn bits(self) -> u16 {
        match self {
            Self::Eight => 8,
            Self::Sixteen => 16,
            Self::TwentyFour => 24,
            Self::ThirtyTwo => 32,
        }
    }

    pub fn bytes(self) -> usize {
        self.bits() as usize / 8
    }

    /// Largest representable sample value.
    pub fn max_value(self) -> i64 {
        (1i64 << (self.bits() - 1)) - 1
    }

    /// Smallest representable sample value.
    pub fn min_value(self) -> i64 {
        -(1i64 << (self.bits() - 1))
    }
}

impl Serialize for BitDepth {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u16(self.bits())
    }
}

impl<'de> Deserialize<'de> for BitDepth {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bits = u16::deserialize(deserializer)?;
        BitDepth::from_bits(bits).map_err(serde::de::Error::custom)
    }
}

/// Sample rate, channel layout and sample width of a PCM stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub bit_depth: BitDepth,
}

impl AudioFormat {
    pub fn new(sample_rate: u32, channels: u16, bit_depth: BitDepth) -> Result<Self, FormatError> {
        let format = Self {
            sample_rate,
            channels,
            bit_depth,
        };
        format.validate()?;
        Ok(format)
    }

    /// 16-bit format, the width the mixing engine renders in.
    pub fn pcm16(sample_rate: u32, channels: u16) -> Result<Self, FormatError> {
        Self::new(sample_rate, channels, BitDepth::Sixteen)
    }

    pub fn validate(&self) -> Result<(), FormatError> {
        if self.sample_rate == 0 {
            return Err(FormatError::InvalidSampleRate);
        }
        if self.channels == 0 {
            return Err(FormatError::InvalidChannelCount);
        }
        Ok(())
    }

    pub fn frame_bytes(&self) -> usize {
        self.channels as usize * self.bit_depth.bytes()
    }

    pub fn samples_for(&self, frames: usize) -> usize {
        frames * self.channels as usize
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}Hz/{}ch/{}bit",
            self.sample_rate,
            self.channels,
            self.bit_depth.bits()
        )
    }
}

/// A format plus how many frames a buffer holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameDescriptor {
    pub format: AudioFormat,
    pub frame_count: usize,
}

impl FrameDescriptor {
    pub fn new(format: AudioFormat, frame_count: usize) -> Self {
        Self {
            format,
            frame_count,
        }
    }

    /// Byte length every buffer with this descriptor must have.
    pub fn byte_len(&self) -> usize {
        self.frame_count * self.format.frame_bytes()
    }
}

/// Interleaved little-endian PCM.
///
/// 8-bit samples are unsigned with a 128 offset, wider samples are signed.
/// 24-bit samples are packed into three bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PcmBuffer {
    format: AudioFormat,
    data: Vec<u8>,
}

impl PcmBuffer {
    pub fn new(format: AudioFormat, data: Vec<u8>) -> Result<Self, FormatError> {
        format.validate()?;
        let frame_bytes = format.frame_bytes();
        if data.len() % frame_bytes != 0 {
            return Err(FormatError::PartialFrame {
                len: data.len(),
                frame_bytes,
            });
        }
        Ok(Self { format, data })
    }

    pub fn silence(format: AudioFormat, frames: usize) -> Self {
        let fill = if format.bit_depth == BitDepth::Eight { 128 } else { 0 };
        Self {
            format,
            data: vec![fill; frames * format.frame_bytes()],
        }
    }

    /// Build a buffer from signed samples, clamping each to the format's range.
    pub fn from_samples(format: AudioFormat, samples: &[i32]) -> Result<Self, FormatError> {
        format.validate()?;
        let channels = format.channels as usize;
        if samples.len() % channels != 0 {
            return Err(FormatError::PartialFrame {
                len: samples.len() * format.bit_depth.bytes(),
                frame_bytes: format.frame_bytes(),
            });
        }

        let depth = format.bit_depth;
        let mut data = Vec::with_capacity(samples.len() * depth.bytes());
        for &sample in samples {
            let v = (sample as i64).clamp(depth.min_value(), depth.max_value());
            match depth {
                BitDepth::Eight => data.push((v + 128) as u8),
                BitDepth::Sixteen => data.extend_from_slice(&(v as i16).to_le_bytes()),
                BitDepth::TwentyFour => data.extend_from_slice(&(v as i32).to_le_bytes()[..3]),
                BitDepth::ThirtyTwo => data.extend_from_slice(&(v as i32).to_le_bytes()),
            }
        }
        Ok(Self { format, data })
    }

    pub fn from_i16(format: AudioFormat, samples: &[i16]) -> Result<Self, FormatError> {
        if format.bit_depth != BitDepth::Sixteen {
            return Err(FormatError::BitDepthMismatch {
                expected: format.bit_depth.bits(),
                actual: 16,
            });
        }
        let widened: Vec<i32> = samples.iter().map(|&s| s as i32).collect();
        Self::from_samples(format, &widened)
    }

    /// Decode every sample to a signed value at the buffer's own bit depth.
    pub fn samples(&self) -> Vec<i32> {
        let depth = self.format.bit_depth;
        self.data
            .chunks_exact(depth.bytes())
            .map(|b| match depth {
                BitDepth::Eight => b[0] as i32 - 128,
                BitDepth::Sixteen => i16::from_le_bytes([b[0], b[1]]) as i32,
                // Sign-extend by placing the 3 bytes in the top of an i32.
                BitDepth::TwentyFour => i32::from_le_bytes([0, b[0], b[1], b[2]]) >> 8,
                BitDepth::ThirtyTwo => i32::from_le_bytes([b[0], b[1], b[2], b[3]]),
            })
            .collect()
    }

    /// Samples of a 16-bit buffer.
    pub fn to_i16(&self) -> Result<Vec<i16>, FormatError> {
        if self.format.bit_depth != BitDepth::Sixteen {
            return Err(FormatError::BitDepthMismatch {
                expected: 16,
                actual: self.format.bit_depth.bits(),
            });
        }
        Ok(self
            .data
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect())
    }

    pub fn format(&self) -> &AudioFormat {
        &self.format
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    pub fn frame_count(&self) -> usize {
        self.data.len() / self.format.frame_bytes()
    }

    pub fn descriptor(&self) -> FrameDescriptor {
        FrameDescriptor::new(self.format, self.frame_count())
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bit_depth_from_bits() {
        assert_eq!(BitDepth::from_bits(24).unwrap(), BitDepth::TwentyFour);
        assert_eq!(
            BitDepth::from_bits(12),
            Err(FormatError::UnsupportedBitDepth { bits: 12 })
        );
    }

    #[test]
    fn test_bit_depth_ranges() {
        assert_eq!(BitDepth::Sixteen.max_value(), 32767);
        assert_eq!(BitDepth::Sixteen.min_value(), -32768);
        assert_eq!(BitDepth::Eight.max_value(), 127);
        assert_eq!(BitDepth::TwentyFour.min_value(), -8_388_608);
    }

    #[test]
    fn test_format_rejects_zero_rate_and_channels() {
        assert_eq!(
            AudioFormat::pcm16(0, 1),
            Err(FormatError::InvalidSampleRate)
        );
        assert_eq!(
            AudioFormat::pcm16(48000, 0),
            Err(FormatError::InvalidChannelCount)
        );
    }

    #[test]
    fn test_descriptor_byte_len() {
        let format = AudioFormat::new(44100, 2, BitDepth::TwentyFour).unwrap();
        let descriptor = FrameDescriptor::new(format, 10);
        assert_eq!(descriptor.byte_len(), 10 * 2 * 3);
    }

    #[test]
    fn test_buffer_rejects_partial_frame() {
        let format = AudioFormat::pcm16(48000, 2).unwrap();
        let err = PcmBuffer::new(format, vec![0; 6]).unwrap_err();
        assert_eq!(
            err,
            FormatError::PartialFrame {
                len: 6,
                frame_bytes: 4
            }
        );
    }

    #[test]
    fn test_sample_encoding_per_depth() {
        for depth in [
            BitDepth::Eight,
            BitDepth::Sixteen,
            BitDepth::TwentyFour,
            BitDepth::ThirtyTwo,
        ] {
            let format = AudioFormat::new(8000, 1, depth).unwrap();
            let samples = vec![
                depth.min_value() as i32,
                -1,
                0,
                1,
                depth.max_value() as i32,
            ];
            let buffer = PcmBuffer::from_samples(format, &samples).unwrap();
            assert_eq!(buffer.data().len(), 5 * depth.bytes());
            assert_eq!(buffer.samples(), samples, "depth {:?}", depth);
        }
    }

    #[test]
    fn test_eight_bit_is_unsigned_on_the_wire() {
        let format = AudioFormat::new(8000, 1, BitDepth::Eight).unwrap();
        let buffer = PcmBuffer::from_samples(format, &[0, -128, 127]).unwrap();
        assert_eq!(buffer.data(), &[128, 0, 255]);
        assert_eq!(PcmBuffer::silence(format, 2).data(), &[128, 128]);
    }

    #[test]
    fn test_from_samples_clamps() {
        let format = AudioFormat::pcm16(8000, 1).unwrap();
        let buffer = PcmBuffer::from_samples(format, &[40000, -40000]).unwrap();
        assert_eq!(buffer.to_i16().unwrap(), vec![32767, -32768]);
    }

    #[test]
    fn test_i16_helpers_require_sixteen_bit() {
        let format = AudioFormat::new(8000, 1, BitDepth::ThirtyTwo).unwrap();
        assert!(PcmBuffer::from_i16(format, &[1, 2]).is_err());
        let buffer = PcmBuffer::silence(format, 4);
        assert!(buffer.to_i16().is_err());
        assert_eq!(buffer.frame_count(), 4);
    }

    #[test]
    fn test_bit_depth_serializes_as_number() {
        let format = AudioFormat::pcm16(48000, 2).unwrap();
        let json = serde_json::to_string(&format).unwrap();
        assert_eq!(
            json,
            r#"{"sample_rate":48000,"channels":2,"bit_depth":16}"#
        );
        let parsed: AudioFormat = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, format);
        assert!(serde_json::from_str::<BitDepth>("12").is_err());
    }
}
