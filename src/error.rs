// src/error.rs

use thiserror::Error;

use crate::capture::PermissionStatus;
use crate::project::TrackId;

pub type Result<T> = std::result::Result<T, StudioError>;

/// Why the microphone could not be opened. One variant per failure kind the
/// capture gate normalises platform errors into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CaptureError {
    #[error("microphone access was denied")]
    AccessDenied,
    #[error("no microphone was found")]
    NoDevice,
    #[error("the microphone is already in use")]
    DeviceBusy,
    #[error("the microphone does not support the requested settings")]
    UnsupportedConstraints,
    #[error("audio capture is not supported on this platform")]
    NotSupported,
    #[error("the microphone request was cancelled")]
    Cancelled,
    #[error("audio capture requires a secure context")]
    InsecureContext,
}

impl CaptureError {
    /// Remediation hint shown next to the retry action.
    pub fn remediation(&self) -> &'static str {
        match self {
            Self::AccessDenied => {
                "Allow microphone access in your system or browser privacy settings, then try again."
            }
            Self::NoDevice => "Connect a microphone or select an input device, then try again.",
            Self::DeviceBusy => {
                "Close other applications that are using the microphone, then try again."
            }
            Self::UnsupportedConstraints => {
                "Your microphone does not support the requested format. Try a different input device."
            }
            Self::NotSupported => {
                "Audio recording is not available here. Use a supported platform or browser."
            }
            Self::Cancelled => "The permission request was dismissed. Click record to ask again.",
            Self::InsecureContext => {
                "Recording needs a secure connection. Open the studio over HTTPS or from localhost."
            }
        }
    }

    /// The permission status a failed probe implies.
    pub fn implied_status(&self) -> PermissionStatus {
        match self {
            Self::AccessDenied => PermissionStatus::Denied,
            _ => PermissionStatus::Prompt,
        }
    }

    pub fn user_message(&self) -> String {
        format!("{}. {}", capitalize(&self.to_string()), self.remediation())
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EncoderError {
    #[error("no supported recording container")]
    NoSupportedContainer,
    #[error("container {0} is not supported by this encoder")]
    Unsupported(String),
    #[error("encoder fault: {0}")]
    Fault(String),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RecorderError {
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error("cannot {event} while {state}")]
    InvalidTransition {
        state: &'static str,
        event: &'static str,
    },
    #[error(transparent)]
    Encoder(#[from] EncoderError),
    #[error("recording failed: {0}")]
    Faulted(String),
}

impl RecorderError {
    pub fn user_message(&self) -> String {
        match self {
            Self::Capture(e) => e.user_message(),
            Self::InvalidTransition { state, event } => {
                format!("Cannot {event} the recording while it is {state}.")
            }
            Self::Encoder(EncoderError::NoSupportedContainer) => {
                "No supported recording format is available on this device.".to_string()
            }
            Self::Encoder(e) => format!(
                "Recording error: {e}. Discard this take and start a new recording."
            ),
            Self::Faulted(msg) => format!(
                "Recording error: {msg}. Discard this take and start a new recording."
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError {
    #[error("audio blob is empty")]
    Empty,
    #[error("unrecognised audio container: {0}")]
    Probe(String),
    #[error("no decodable audio track")]
    NoTrack,
    #[error("container metadata has no usable duration")]
    MissingMetadata,
    #[error("decoding failed: {0}")]
    Codec(String),
    #[error("decoded audio contains no frames")]
    NoFrames,
}

/// One failed attempt in the duration strategy chain.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{strategy}: {reason}")]
pub struct StrategyFailure {
    pub strategy: &'static str,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DurationError {
    #[error("could not determine audio duration ({})", join_failures(.0))]
    Exhausted(Vec<StrategyFailure>),
}

fn join_failures(failures: &[StrategyFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RenderError {
    #[error("could not decode source audio: {0}")]
    Decode(#[from] DecodeError),
    #[error("invalid effect parameter {name}: {value}")]
    InvalidParameter { name: &'static str, value: f32 },
    #[error("effect chain produced non-finite samples")]
    NonFiniteOutput,
    #[error("cannot render audio at {0} Hz")]
    UnsupportedSampleRate(u32),
    #[error("render task was abandoned: {0}")]
    Abandoned(String),
}

impl RenderError {
    pub fn user_message(&self) -> String {
        match self {
            Self::Decode(e) => format!("Effects could not be applied because the recording could not be read ({e})."),
            Self::InvalidParameter { name, .. } => {
                format!("Effects could not be applied: the {name} setting is out of range.")
            }
            Self::NonFiniteOutput => {
                "Effects could not be applied: processing produced invalid audio. Try gentler settings."
                    .to_string()
            }
            Self::UnsupportedSampleRate(_) => {
                "Effects could not be applied: the recording's sample rate is not supported."
                    .to_string()
            }
            Self::Abandoned(_) => "Effects processing was interrupted. Try again.".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransportError {
    #[error("track {0} could not be loaded: {1}")]
    Load(TrackId, String),
    #[error("track {0} could not start playback: {1}")]
    Play(TrackId, String),
    #[error("track {0} is not part of the transport")]
    UnknownTrack(TrackId),
    #[error("audio output unavailable: {0}")]
    Output(String),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProjectError {
    #[error("a project can hold at most {limit} tracks")]
    TrackLimitReached { limit: usize },
    #[error("track {0} does not exist")]
    TrackNotFound(TrackId),
    #[error("no recording is available to save")]
    NothingToSave,
    #[error("persistence failed: {0}")]
    Storage(String),
}

impl ProjectError {
    pub fn user_message(&self) -> String {
        match self {
            Self::TrackLimitReached { limit } => format!(
                "This project already has {limit} tracks. Delete a track before adding another."
            ),
            Self::TrackNotFound(_) => "That track no longer exists.".to_string(),
            Self::NothingToSave => "Record something before saving.".to_string(),
            Self::Storage(msg) => format!("Your changes could not be saved ({msg})."),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransformError {
    #[error("clip is {actual:.2}s, shorter than the {min:.1}s minimum")]
    ClipTooShort { actual: f64, min: f64 },
    #[error("clip is {actual:.2}s, longer than the {max:.1}s maximum")]
    ClipTooLong { actual: f64, max: f64 },
    #[error("unknown job status {0:?}")]
    UnknownStatus(String),
}

#[derive(Debug, Error)]
pub enum StudioError {
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error(transparent)]
    Recorder(#[from] RecorderError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Duration(#[from] DurationError),
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Project(#[from] ProjectError),
    #[error(transparent)]
    Transform(#[from] TransformError),
}

impl StudioError {
    /// Specific text for the user; never a bare "something went wrong".
    pub fn user_message(&self) -> String {
        match self {
            Self::Capture(e) => e.user_message(),
            Self::Recorder(e) => e.user_message(),
            Self::Decode(e) => format!("The recording could not be read ({e})."),
            Self::Duration(_) => "The length of this recording could not be determined.".to_string(),
            Self::Render(e) => e.user_message(),
            Self::Transport(e) => format!("Playback problem: {e}. The other tracks keep playing."),
            Self::Project(e) => e.user_message(),
            Self::Transform(e) => format!("This clip cannot be transformed: {e}."),
        }
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_capture_failure_has_distinct_remediation() {
        let kinds = [
            CaptureError::AccessDenied,
            CaptureError::NoDevice,
            CaptureError::DeviceBusy,
            CaptureError::UnsupportedConstraints,
            CaptureError::NotSupported,
            CaptureError::Cancelled,
            CaptureError::InsecureContext,
        ];
        let mut hints: Vec<_> = kinds.iter().map(|k| k.remediation()).collect();
        hints.sort();
        hints.dedup();
        assert_eq!(hints.len(), kinds.len());
    }

    #[test]
    fn only_access_denied_implies_denied() {
        assert_eq!(
            CaptureError::AccessDenied.implied_status(),
            PermissionStatus::Denied
        );
        assert_eq!(CaptureError::NoDevice.implied_status(), PermissionStatus::Prompt);
        assert_eq!(CaptureError::Cancelled.implied_status(), PermissionStatus::Prompt);
    }

    #[test]
    fn user_message_starts_with_capital() {
        let msg = CaptureError::DeviceBusy.user_message();
        assert!(msg.starts_with("The microphone is already in use."));
    }

    #[test]
    fn duration_error_lists_every_strategy() {
        let err = DurationError::Exhausted(vec![
            StrategyFailure { strategy: "metadata", reason: "timed out".into() },
            StrategyFailure { strategy: "decode", reason: "bad data".into() },
        ]);
        let text = err.to_string();
        assert!(text.contains("metadata: timed out"));
        assert!(text.contains("decode: bad data"));
    }
}
