//! Pi Camera Library
//!
//! Exposes local camera devices over HTTP: single-shot snapshots, saved
//! photos and live MJPEG streams to any number of viewers.
//!
//! # Architecture
//!
//! ```text
//! HTTP routes → CaptureManager → DeviceRegistry
//!                     ↓
//!               DeviceHandle (one capture thread per camera)
//!                     ↓
//!               FrameEncoder (JPEG) → photo storage
//! ```
//!
//! # Design Principles
//!
//! - **One read in flight per device**: snapshot callers and stream viewers
//!   share a handle and are serialized on its guard
//! - **Devices are independent**: different cameras never wait on each other
//! - **Failures are classified**: every [`CameraError`] is either a caller
//!   mistake or a hardware/disk fault
//! - **Streams are pull-based**: a viewer that goes away stops the reads
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use pi_camera::{
//!     capture::{default_devices, Camera, MockCamera},
//!     device::{DeviceDescriptor, DeviceRegistry},
//!     manager::{CaptureManager, ManagerConfig},
//! };
//!
//! let factory = |_: &DeviceDescriptor| Box::new(MockCamera::new()) as Box<dyn Camera>;
//! let manager = CaptureManager::new(
//!     DeviceRegistry::new(&default_devices()),
//!     Arc::new(factory),
//!     ManagerConfig::default(),
//! );
//!
//! // One snapshot, not saved
//! let (jpeg, _) = manager.capture(0, None).unwrap();
//! println!("{} bytes", jpeg.len());
//!
//! // A few pulls from a live stream; transient faults come through as `Err`
//! for frame in manager.stream_frames(1).unwrap().take(5).flatten() {
//!     println!("frame of {} bytes", frame.len());
//! }
//! ```

#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod capture;
pub mod device;
pub mod encoding;
pub mod error;
pub mod manager;
pub mod metrics;
#[cfg(feature = "server")]
pub mod server;
pub mod storage;

// Re-export commonly used types at crate root
pub use capture::{Camera, CameraFactory, CaptureConfig, FileConfig, Frame, MockCamera};
pub use device::{DeviceDescriptor, DeviceRegistry};
pub use encoding::{EncodedImage, FrameEncoder};
pub use error::{CameraError, ErrorClass};
pub use manager::{CaptureManager, FrameStream, ManagerConfig};
pub use storage::SavedPhoto;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
