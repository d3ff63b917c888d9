pub mod diagnostics;
pub mod format;
pub mod mixer;
pub mod provider;
pub mod reconciler;

pub use diagnostics::{DiagnosticEvent, Diagnostics};
pub use format::{AudioFormat, BitDepth, FrameDescriptor, PcmBuffer};
pub use mixer::{MixMode, MixSettings, Mixer, MixerState, RenderStats};
pub use provider::{
    AudioProvider, BufferProvider, FileProvider, Pull, QueueProducer, QueueProvider, Signal,
    SyntheticProvider,
};
pub use reconciler::FormatReconciler;
