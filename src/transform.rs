// src/transform.rs

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::blob::RawAudioBlob;
use crate::config::StudioConfig;
use crate::error::TransformError;

/// Payload handed to the transformation proxy.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformClip {
    pub audio_base64: String,
    pub mime: String,
    pub duration: f64,
}

/// Checks the clip length bounds and encodes the blob.
pub fn prepare_transform_clip(
    blob: &RawAudioBlob,
    duration_secs: f64,
    config: &StudioConfig,
) -> Result<TransformClip, TransformError> {
    let (min, max) = (config.transform_min_clip_secs, config.transform_max_clip_secs);
    if duration_secs.is_nan() || duration_secs < min {
        return Err(TransformError::ClipTooShort {
            actual: duration_secs,
            min,
        });
    }
    if duration_secs > max {
        return Err(TransformError::ClipTooLong {
            actual: duration_secs,
            max,
        });
    }
    Ok(TransformClip {
        audio_base64: STANDARD.encode(blob.bytes()),
        mime: blob.mime().to_string(),
        duration: duration_secs,
    })
}

/// Status vocabulary of the inference provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InferenceStatus {
    Starting,
    Processing,
    Succeeded,
    Failed,
    Canceled,
}

/// Status vocabulary of the persisted job record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl From<InferenceStatus> for JobStatus {
    fn from(status: InferenceStatus) -> Self {
        match status {
            InferenceStatus::Starting => Self::Pending,
            InferenceStatus::Processing => Self::Processing,
            InferenceStatus::Succeeded => Self::Completed,
            InferenceStatus::Failed => Self::Failed,
            InferenceStatus::Canceled => Self::Cancelled,
        }
    }
}

impl FromStr for InferenceStatus {
    type Err = TransformError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "starting" => Ok(Self::Starting),
            "processing" => Ok(Self::Processing),
            "succeeded" => Ok(Self::Succeeded),
            "failed" => Ok(Self::Failed),
            "canceled" => Ok(Self::Canceled),
            other => Err(TransformError::UnknownStatus(other.to_string())),
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        })
    }
}
