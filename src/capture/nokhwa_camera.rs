//! V4L2/native camera backend built on `nokhwa`.

use super::{Camera, CaptureConfig, DeviceError, Frame, PixelFormat};
use crate::device::DeviceDescriptor;
use nokhwa::pixel_format::{LumaFormat, RgbFormat};
use nokhwa::utils::{
    CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType, Resolution,
};

/// Camera backed by a native capture device.
pub struct NokhwaCamera {
    index: CameraIndex,
    camera: Option<nokhwa::Camera>,
    grayscale: bool,
    sequence: u64,
}

impl NokhwaCamera {
    /// Creates an unopened backend for the given device.
    pub fn new(descriptor: &DeviceDescriptor) -> Self {
        Self {
            index: camera_index(&descriptor.path),
            camera: None,
            grayscale: false,
            sequence: 0,
        }
    }
}

/// `/dev/videoN` maps to index N, anything else is passed through by name.
fn camera_index(path: &str) -> CameraIndex {
    path.strip_prefix("/dev/video")
        .and_then(|n| n.parse::<u32>().ok())
        .map(CameraIndex::Index)
        .unwrap_or_else(|| CameraIndex::String(path.to_string()))
}

impl Camera for NokhwaCamera {
    fn open(&mut self, config: &CaptureConfig) -> Result<(), DeviceError> {
        config
            .validate()
            .map_err(|e| DeviceError::OpenFailed(e.to_string()))?;

        let format = CameraFormat::new(
            Resolution::new(config.width, config.height),
            FrameFormat::MJPEG,
            config.fps,
        );
        let requested =
            RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(format));

        let mut camera = nokhwa::Camera::new(self.index.clone(), requested)
            .map_err(|e| DeviceError::DeviceNotFound(e.to_string()))?;
        camera
            .open_stream()
            .map_err(|e| DeviceError::OpenFailed(e.to_string()))?;

        let actual = camera.resolution();
        tracing::info!(
            index = %self.index,
            width = actual.width(),
            height = actual.height(),
            "Camera stream opened"
        );

        self.grayscale = config.grayscale;
        self.sequence = 0;
        self.camera = Some(camera);
        Ok(())
    }

    fn capture(&mut self) -> Result<Frame, DeviceError> {
        let camera = self.camera.as_mut().ok_or(DeviceError::NotInitialized)?;

        let buffer = camera.frame().map_err(|e| {
            if camera.is_stream_open() {
                DeviceError::CaptureFailed(e.to_string())
            } else {
                DeviceError::Disconnected(e.to_string())
            }
        })?;

        self.sequence += 1;
        if self.grayscale {
            let image = buffer
                .decode_image::<LumaFormat>()
                .map_err(|e| DeviceError::CaptureFailed(e.to_string()))?;
            let (width, height) = image.dimensions();
            Ok(Frame::new(
                image.into_raw(),
                width,
                height,
                PixelFormat::Gray8,
                self.sequence,
            ))
        } else {
            let image = buffer
                .decode_image::<RgbFormat>()
                .map_err(|e| DeviceError::CaptureFailed(e.to_string()))?;
            let (width, height) = image.dimensions();
            Ok(Frame::new(
                image.into_raw(),
                width,
                height,
                PixelFormat::Rgb8,
                self.sequence,
            ))
        }
    }

    fn is_open(&self) -> bool {
        self.camera.is_some()
    }

    fn close(&mut self) {
        if let Some(mut camera) = self.camera.take() {
            if let Err(e) = camera.stop_stream() {
                tracing::warn!(index = %self.index, "Failed to stop camera stream: {}", e);
            }
            tracing::info!(index = %self.index, "Camera closed");
        }
    }
}
