//! Error types for the mixing and interception core.
//!
//! Everything here is a configuration-time error: the real-time paths never
//! return these, they degrade to silence and report through
//! [`Diagnostics`](crate::audio::Diagnostics) instead.

use thiserror::Error;

/// Errors describing or converting PCM formats.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    #[error("Unsupported bit depth: {bits} (expected 8, 16, 24 or 32)")]
    UnsupportedBitDepth { bits: u16 },

    #[error("Sample rate must be positive")]
    InvalidSampleRate,

    #[error("Channel count must be positive")]
    InvalidChannelCount,

    #[error("Buffer of {len} bytes is not a whole number of {frame_bytes}-byte frames")]
    PartialFrame { len: usize, frame_bytes: usize },

    #[error("Cannot map {from} channels to {to} channels")]
    UnsupportedChannelLayout { from: u16, to: u16 },

    #[error("Expected {expected}-bit samples, buffer holds {actual}-bit samples")]
    BitDepthMismatch { expected: u16, actual: u16 },
}

/// Errors raised while priming or feeding a buffer provider.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Provider has no audio to play")]
    Empty,

    #[error("Invalid synthetic signal: {reason}")]
    InvalidSignal { reason: String },

    #[error("Provider format {provider} does not match track format {target}")]
    FormatMismatch { provider: String, target: String },

    #[error("Queue provider has been closed")]
    Closed,

    #[error(transparent)]
    Format(#[from] FormatError),

    #[error("Failed to decode audio file: {0}")]
    Decode(#[from] hound::Error),
}

/// Errors from the mixing engine control plane.
#[derive(Error, Debug)]
pub enum MixerError {
    #[error("Mixer already started")]
    AlreadyStarted,

    #[error("Mixer was stopped and cannot be restarted")]
    Stopped,

    #[error("Invalid {name} gain {value}: gains must be finite and non-negative")]
    InvalidGain { name: &'static str, value: f32 },

    #[error("Track output must be 16-bit PCM, got {bits}-bit")]
    UnsupportedOutputFormat { bits: u16 },

    #[error("max_frames_per_callback must be positive")]
    InvalidBufferSize,

    #[error("Provider could not be primed: {0}")]
    Provider(#[from] ProviderError),
}

/// Errors from track collaborators.
#[derive(Error, Debug)]
pub enum TrackError {
    #[error("Track name must not be empty")]
    EmptyName,

    #[error(transparent)]
    Format(#[from] FormatError),
}

/// Errors from attaching an interceptor.
#[derive(Error, Debug)]
pub enum InterceptError {
    #[error("Remote track {track} has an unusable format: {source}")]
    Format {
        track: String,
        #[source]
        source: FormatError,
    },
}

/// Errors from the track binding helpers.
#[derive(Error, Debug)]
pub enum BindingError {
    #[error(transparent)]
    Track(#[from] TrackError),

    #[error(transparent)]
    Mixer(#[from] MixerError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let err = FormatError::UnsupportedBitDepth { bits: 12 };
        assert_eq!(
            err.to_string(),
            "Unsupported bit depth: 12 (expected 8, 16, 24 or 32)"
        );

        let err = MixerError::InvalidGain {
            name: "microphone",
            value: -1.0,
        };
        assert!(err.to_string().contains("microphone"));
        assert!(err.to_string().contains("-1"));
    }

    #[test]
    fn provider_error_wraps_format_error() {
        let err: ProviderError = FormatError::InvalidChannelCount.into();
        assert_eq!(err.to_string(), "Channel count must be positive");
    }
}
