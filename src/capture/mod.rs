//! Camera backends, raw frames and capture configuration.
//!
//! Backends implement [`Camera`] and are created per device by a
//! [`CameraFactory`]. [`MockCamera`] is always available; the native
//! `nokhwa` backend is compiled with the `camera` feature.

mod camera;
mod config;
mod frame;
#[cfg(feature = "camera")]
mod nokhwa_camera;

pub use camera::{Camera, CameraFactory, DeviceError, MockCamera};
pub use config::{
    default_devices, CaptureConfig, ConfigError, DeviceConfig, FileConfig, ServerConfig,
    StreamConfig,
};
pub use frame::{Frame, PixelFormat};
#[cfg(feature = "camera")]
pub use nokhwa_camera::NokhwaCamera;
