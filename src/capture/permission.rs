// src/capture/permission.rs

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};

use super::{CaptureBackend, CaptureConstraints, CaptureStream};
use crate::error::CaptureError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionStatus {
    #[default]
    Unknown,
    Granted,
    Denied,
    Prompt,
}

impl fmt::Display for PermissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => write!(f, "unknown"),
            Self::Granted => write!(f, "granted"),
            Self::Denied => write!(f, "denied"),
            Self::Prompt => write!(f, "prompt"),
        }
    }
}

/// Negotiates microphone access and hands out capture streams.
///
/// Whatever happens, `status()` is always one of the four
/// [`PermissionStatus`] values; failures never escape as panics.
pub struct CaptureGate {
    backend: Box<dyn CaptureBackend>,
    status: PermissionStatus,
    last_error: Option<CaptureError>,
}

impl CaptureGate {
    pub fn new(backend: Box<dyn CaptureBackend>) -> Self {
        Self {
            backend,
            status: PermissionStatus::Unknown,
            last_error: None,
        }
    }

    pub fn status(&self) -> PermissionStatus {
        self.status
    }

    pub fn last_error(&self) -> Option<CaptureError> {
        self.last_error
    }

    /// Uses the platform's permission query when there is one, otherwise
    /// opens and immediately closes a real stream.
    pub fn check_permissions(&mut self) -> PermissionStatus {
        if let Some(status) = self.backend.query_permission() {
            debug!(%status, "permission query");
            self.status = status;
            return status;
        }
        match self.probe() {
            Ok(()) => self.status,
            Err(e) => {
                debug!(error = %e, "permission probe failed");
                self.status
            }
        }
    }

    /// Always probes with minimal constraints.
    pub fn request_permissions(&mut self) -> Result<PermissionStatus, CaptureError> {
        self.probe().map(|_| self.status)
    }

    fn probe(&mut self) -> Result<(), CaptureError> {
        match self.backend.open(&CaptureConstraints::minimal()) {
            Ok(stream) => {
                drop(stream);
                self.status = PermissionStatus::Granted;
                self.last_error = None;
                Ok(())
            }
            Err(e) => {
                warn!(kind = ?e, hint = e.remediation(), "microphone probe failed");
                self.status = e.implied_status();
                self.last_error = Some(e);
                Err(e)
            }
        }
    }

    /// Opens the stream a recording session owns.
    pub(crate) fn open_stream(
        &mut self,
        constraints: &CaptureConstraints,
    ) -> Result<Box<dyn CaptureStream>, CaptureError> {
        match self.backend.open(constraints) {
            Ok(stream) => {
                self.status = PermissionStatus::Granted;
                Ok(stream)
            }
            Err(e) => {
                warn!(kind = ?e, "opening capture stream failed");
                self.status = e.implied_status();
                self.last_error = Some(e);
                Err(e)
            }
        }
    }
}
