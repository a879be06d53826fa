// src/lib.rs

pub mod blob;
pub mod capture;
pub mod config;
pub mod decoder;
pub mod duration;
pub mod effects;
pub mod encode;
pub mod error;
pub mod project;
pub mod recorder;
pub mod session;
pub mod studio;
pub mod transform;
pub mod transport;
pub mod waveform;

pub use blob::{PcmBuffer, RawAudioBlob};
pub use config::StudioConfig;
pub use duration::DurationResolver;
pub use effects::{EffectChain, EffectKind, EffectParameters, EffectsProcessor};
pub use error::{Result, StudioError};
pub use recorder::{CaptureSession, Recorder, RecorderState};
pub use studio::Studio;
pub use transport::MultiTrackTransport;
