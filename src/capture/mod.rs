// src/capture/mod.rs

pub mod input;
pub mod permission;
pub mod simulated;

pub use input::CpalBackend;
pub use permission::{CaptureGate, PermissionStatus};
pub use simulated::SimulatedMicrophone;

use crate::error::CaptureError;

/// Requested capture format. Fields are preferences, not requirements,
/// unless `exact` is set.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CaptureConstraints {
    pub sample_rate: Option<u32>,
    pub channels: Option<u16>,
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub exact: bool,
}

impl CaptureConstraints {
    /// What the permission probe asks for: any device, any format.
    pub fn minimal() -> Self {
        Self::default()
    }

    /// Settings used for a recording take.
    pub fn recording() -> Self {
        Self {
            sample_rate: Some(48_000),
            channels: Some(1),
            echo_cancellation: true,
            noise_suppression: true,
            exact: false,
        }
    }
}

/// Source of live microphone streams.
pub trait CaptureBackend {
    /// Non-intrusive permission query. `None` when the platform has no such
    /// capability and the caller has to probe by opening a stream.
    fn query_permission(&self) -> Option<PermissionStatus> {
        None
    }

    fn open(&mut self, constraints: &CaptureConstraints)
    -> Result<Box<dyn CaptureStream>, CaptureError>;
}

/// A live hardware capture handle. Dropping it releases the device.
pub trait CaptureStream {
    fn sample_rate(&self) -> u32;

    fn channels(&self) -> u16;

    /// Moves every interleaved sample captured since the last call into `out`.
    fn drain(&mut self, out: &mut Vec<f32>) -> usize;

    fn pause(&mut self) -> Result<(), CaptureError>;

    fn resume(&mut self) -> Result<(), CaptureError>;

    /// Asynchronous device error reported since the last call.
    fn take_fault(&mut self) -> Option<String>;
}
