use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::audio::mixer::MixMode;

#[derive(Parser, Debug)]
#[command(name = "confmix")]
#[command(about = "Mix application audio into a microphone track and tap remote audio", long_about = None)]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Read configuration from this file instead of the default location
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Subcommand, Debug)]
pub enum CliCommand {
    /// Mix a provider into a simulated microphone track and write the result as WAV
    Render(RenderCliArgs),
    /// Play a WAV through a simulated remote track with an interceptor attached
    Tap(TapCliArgs),
    /// Mix a provider into the default input device and play it on the default output
    Monitor(MonitorCliArgs),
    /// Inspect or create the configuration file
    Config(ConfigCliArgs),
    /// Print version information
    Version,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Sine,
    Noise,
    Beep,
    File,
    Silence,
}

/// Describes one signal source; used for the application provider.
#[derive(ClapArgs, Debug, Clone)]
pub struct SourceArgs {
    /// Kind of application audio to mix in
    #[arg(long, value_enum, default_value = "sine")]
    pub source: SourceKind,
    /// Tone frequency in Hz (sine, beep)
    #[arg(long, default_value = "440")]
    pub frequency: f64,
    /// Peak amplitude in [0, 1]
    #[arg(long, default_value = "0.5")]
    pub amplitude: f64,
    /// Noise generator seed
    #[arg(long, default_value = "1")]
    pub seed: u64,
    /// Beep on-time in milliseconds
    #[arg(long, default_value = "200")]
    pub beep_on_ms: u64,
    /// Beep off-time in milliseconds
    #[arg(long, default_value = "800")]
    pub beep_off_ms: u64,
    /// WAV file to play (file source)
    #[arg(long)]
    pub file: Option<PathBuf>,
    /// Stop the source after this many seconds instead of running forever
    #[arg(long)]
    pub source_seconds: Option<f64>,
    /// Restart the source when it ends
    #[arg(long = "loop")]
    pub looping: bool,
}

/// Mixer overrides on top of the configuration file.
#[derive(ClapArgs, Debug, Clone)]
pub struct MixCliArgs {
    /// Mix mode: additive, replace or custom-only
    #[arg(long)]
    pub mode: Option<MixMode>,
    /// Microphone gain
    #[arg(long)]
    pub mic_gain: Option<f32>,
    /// Application audio gain
    #[arg(long)]
    pub custom_gain: Option<f32>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MicKind {
    Silence,
    Sine,
    File,
}

#[derive(ClapArgs, Debug)]
pub struct RenderCliArgs {
    #[command(flatten)]
    pub source: SourceArgs,
    #[command(flatten)]
    pub mix: MixCliArgs,
    /// What the simulated microphone captures
    #[arg(long, value_enum, default_value = "silence")]
    pub mic: MicKind,
    /// Microphone tone frequency in Hz (sine microphone)
    #[arg(long, default_value = "220")]
    pub mic_frequency: f64,
    /// WAV file the microphone plays (file microphone)
    #[arg(long)]
    pub mic_file: Option<PathBuf>,
    /// Length of the rendered output
    #[arg(long, default_value = "5")]
    pub seconds: f64,
    /// Frames per capture callback
    #[arg(long, default_value = "480")]
    pub block_frames: usize,
    /// Output WAV path
    #[arg(short, long, default_value = "confmix-render.wav")]
    pub output: PathBuf,
}

#[derive(ClapArgs, Debug)]
pub struct TapCliArgs {
    /// WAV file standing in for the decoded remote stream
    pub input: PathBuf,
    /// Where to write what the interceptor saw
    #[arg(short, long, default_value = "confmix-tap.wav")]
    pub output: PathBuf,
    /// Where to write what reached the speaker
    #[arg(long)]
    pub speaker_output: Option<PathBuf>,
    /// Keep the remote audio off the speaker while tapping
    #[arg(long)]
    pub mute: bool,
    /// Decode block length in milliseconds
    #[arg(long, default_value = "20")]
    pub block_ms: u32,
}

#[derive(ClapArgs, Debug)]
pub struct MonitorCliArgs {
    #[command(flatten)]
    pub source: SourceArgs,
    #[command(flatten)]
    pub mix: MixCliArgs,
    /// How long to run
    #[arg(long, default_value = "10")]
    pub seconds: u64,
}

#[derive(ClapArgs, Debug)]
pub struct ConfigCliArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Print the effective configuration
    Show {
        /// Print as JSON instead of TOML
        #[arg(long)]
        json: bool,
    },
    /// Write the default configuration file if it does not exist
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Print the configuration file path
    Path,
}
