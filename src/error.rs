//! Error taxonomy surfaced by the capture manager.
//!
//! Every failure reaching the HTTP layer is a [`CameraError`]. The
//! [`ErrorClass`] split is what callers use to pick a status code: caller
//! mistakes are [`ErrorClass::Client`], everything touching hardware or
//! disk is [`ErrorClass::Unavailable`].

use thiserror::Error;

/// How a [`CameraError`] should be reported to a remote caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The request named a device that does not exist or was malformed (4xx).
    Client,
    /// Hardware, encoder or disk fault; usually transient (5xx).
    Unavailable,
}

/// Errors returned by capture, streaming and persistence operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CameraError {
    #[error("unknown camera device: {0}")]
    UnknownDevice(u32),
    #[error("invalid camera device selector: {0:?}")]
    InvalidDevice(String),
    #[error("camera {device} unavailable: {reason}")]
    DeviceUnavailable { device: u32, reason: String },
    #[error("camera {device} capture failed: {reason}")]
    CaptureFailed { device: u32, reason: String },
    #[error("failed to encode frame: {0}")]
    EncodeFailed(String),
    #[error("failed to save photo: {0}")]
    PersistenceFailed(String),
}

impl CameraError {
    /// Classifies the error for status-code mapping.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::UnknownDevice(_) | Self::InvalidDevice(_) => ErrorClass::Client,
            Self::DeviceUnavailable { .. }
            | Self::CaptureFailed { .. }
            | Self::EncodeFailed(_)
            | Self::PersistenceFailed(_) => ErrorClass::Unavailable,
        }
    }

    /// Returns true for caller mistakes.
    pub fn is_client_error(&self) -> bool {
        self.class() == ErrorClass::Client
    }

    /// Short stable label, used as a metrics label value.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnknownDevice(_) => "unknown_device",
            Self::InvalidDevice(_) => "invalid_device",
            Self::DeviceUnavailable { .. } => "device_unavailable",
            Self::CaptureFailed { .. } => "capture_failed",
            Self::EncodeFailed(_) => "encode_failed",
            Self::PersistenceFailed(_) => "persistence_failed",
        }
    }

    /// True when the stream or handle that produced this error cannot continue.
    pub fn is_device_loss(&self) -> bool {
        matches!(self, Self::DeviceUnavailable { .. })
    }
}
