//! Microphone/application audio mixing and remote audio interception for
//! conferencing clients.
//!
//! The [`audio`] module holds the real-time mixing engine and its buffer
//! providers, [`intercept`] the remote-audio interception pipeline, and
//! [`track`] the narrow track contracts both plug into.

pub mod audio;
pub mod binding;
pub mod cli;
pub mod config;
pub mod error;
pub mod global;
pub mod intercept;
pub mod track;

pub use binding::{
    create_beep_track, create_noise_track, create_sine_track, create_track_with_mixer,
    create_track_with_settings,
};
pub use intercept::{
    attach_interceptor, detach_interceptor, interceptor_fn, InterceptDecision, InterceptionPipeline,
    Interceptor, MutingInterceptor,
};
