//! Camera abstraction for frame capture.
//!
//! This module provides a trait-based abstraction over camera hardware,
//! allowing for both real camera input and mock implementations for testing.
//! Backends are driven from a single capture thread per device, so they do
//! not need to be `Send`.

use super::{CaptureConfig, Frame, PixelFormat};
use crate::device::DeviceDescriptor;
use std::time::Duration;
use thiserror::Error;

/// Errors reported by a camera backend.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DeviceError {
    #[error("camera device not found: {0}")]
    DeviceNotFound(String),
    #[error("failed to open camera: {0}")]
    OpenFailed(String),
    #[error("camera disconnected: {0}")]
    Disconnected(String),
    #[error("failed to capture frame: {0}")]
    CaptureFailed(String),
    #[error("camera not initialized")]
    NotInitialized,
}

/// Trait for camera implementations.
///
/// This abstraction allows swapping between real camera hardware
/// and mock implementations for testing.
pub trait Camera {
    /// Opens and initializes the camera with the given configuration.
    fn open(&mut self, config: &CaptureConfig) -> Result<(), DeviceError>;

    /// Captures a single frame, blocking until the device delivers one.
    fn capture(&mut self) -> Result<Frame, DeviceError>;

    /// Checks if the camera is currently open.
    fn is_open(&self) -> bool;

    /// Closes the camera and releases resources.
    fn close(&mut self);
}

/// Builds the backend for a configured device.
///
/// Called on the device's capture thread each time its handle is opened.
pub trait CameraFactory: Send + Sync {
    fn create(&self, descriptor: &DeviceDescriptor) -> Box<dyn Camera>;
}

impl<F> CameraFactory for F
where
    F: Fn(&DeviceDescriptor) -> Box<dyn Camera> + Send + Sync,
{
    fn create(&self, descriptor: &DeviceDescriptor) -> Box<dyn Camera> {
        self(descriptor)
    }
}

/// Mock camera that generates synthetic gradient frames.
///
/// Fault injection knobs let tests simulate missing devices, slow
/// hardware, flaky reads and unplugged cameras.
#[derive(Debug, Clone, Default)]
pub struct MockCamera {
    config: Option<CaptureConfig>,
    sequence: u64,
    reads: u64,
    fail_open: bool,
    latency: Duration,
    fail_every: Option<u64>,
    disconnect_after: Option<u64>,
}

impl MockCamera {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `open` fail as if the device node were missing.
    pub fn failing_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    /// Sleeps for `latency` inside every capture.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Fails every `n`th read with a transient capture error.
    pub fn with_transient_failures(mut self, every: u64) -> Self {
        self.fail_every = Some(every.max(1));
        self
    }

    /// Reports the device as unplugged once `frames` reads have happened.
    pub fn disconnect_after(mut self, frames: u64) -> Self {
        self.disconnect_after = Some(frames);
        self
    }
}

impl Camera for MockCamera {
    fn open(&mut self, config: &CaptureConfig) -> Result<(), DeviceError> {
        if self.fail_open {
            return Err(DeviceError::DeviceNotFound("mock device absent".into()));
        }
        config
            .validate()
            .map_err(|e| DeviceError::OpenFailed(e.to_string()))?;
        self.config = Some(config.clone());
        self.sequence = 0;
        tracing::debug!(
            width = config.width,
            height = config.height,
            "MockCamera opened"
        );
        Ok(())
    }

    fn capture(&mut self) -> Result<Frame, DeviceError> {
        let config = self.config.as_ref().ok_or(DeviceError::NotInitialized)?;

        if !self.latency.is_zero() {
            std::thread::sleep(self.latency);
        }

        self.reads += 1;
        if let Some(limit) = self.disconnect_after {
            if self.reads > limit {
                return Err(DeviceError::Disconnected("mock device unplugged".into()));
            }
        }
        if let Some(every) = self.fail_every {
            if self.reads % every == 0 {
                return Err(DeviceError::CaptureFailed("mock read returned no data".into()));
            }
        }

        let (format, channels) = if config.grayscale {
            (PixelFormat::Gray8, 1)
        } else {
            (PixelFormat::Rgb8, 3)
        };
        let width = config.width as usize;
        let pixel_count = width * config.height as usize;
        let shift = self.sequence as usize;

        // Diagonal gradient that drifts with the sequence number
        let mut pixels = Vec::with_capacity(pixel_count * channels);
        for i in 0..pixel_count {
            let (x, y) = (i % width, i / width);
            let base = (x + y + shift) as u8;
            for c in 0..channels {
                pixels.push(base.wrapping_add((c * 85) as u8));
            }
        }

        self.sequence += 1;
        Ok(Frame::new(
            pixels,
            config.width,
            config.height,
            format,
            self.sequence,
        ))
    }

    fn is_open(&self) -> bool {
        self.config.is_some()
    }

    fn close(&mut self) {
        self.config = None;
        tracing::debug!("MockCamera closed");
    }
}
