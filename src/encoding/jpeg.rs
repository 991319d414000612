//! JPEG compression of raw frames.

use crate::capture::{Frame, PixelFormat};
use crate::error::CameraError;
use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, ImageEncoder};

/// A JPEG-compressed frame.
///
/// Cloning is cheap: the byte buffer is reference counted.
#[derive(Clone, PartialEq, Eq)]
pub struct EncodedImage {
    data: Bytes,
    width: u32,
    height: u32,
    sequence: u64,
}

impl EncodedImage {
    /// The JPEG bytes.
    #[inline]
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Consumes the image, returning its bytes.
    #[inline]
    pub fn into_bytes(self) -> Bytes {
        self.data
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Sequence number of the source frame.
    #[inline]
    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}

impl std::fmt::Debug for EncodedImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncodedImage")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("sequence", &self.sequence)
            .field("bytes", &self.data.len())
            .finish()
    }
}

/// Stateless JPEG encoder with a fixed quality.
#[derive(Debug, Clone, Copy)]
pub struct FrameEncoder {
    quality: u8,
}

impl Default for FrameEncoder {
    fn default() -> Self {
        Self::new(85)
    }
}

impl FrameEncoder {
    /// Creates an encoder; quality is clamped to 1-100.
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
        }
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }

    /// Encodes a frame as baseline JPEG.
    ///
    /// Fails with [`CameraError::EncodeFailed`] for empty or truncated frames.
    pub fn encode(&self, frame: &Frame) -> Result<EncodedImage, CameraError> {
        if !frame.is_valid() {
            return Err(CameraError::EncodeFailed(format!(
                "malformed frame: {}x{} {:?} with {} bytes",
                frame.width(),
                frame.height(),
                frame.format(),
                frame.pixels().len()
            )));
        }

        let color = match frame.format() {
            PixelFormat::Gray8 => ExtendedColorType::L8,
            PixelFormat::Rgb8 => ExtendedColorType::Rgb8,
        };

        // JPEG at typical qualities lands well under 1/4 of the raw size
        let mut buffer = Vec::with_capacity(frame.pixels().len() / 4);
        JpegEncoder::new_with_quality(&mut buffer, self.quality)
            .write_image(frame.pixels(), frame.width(), frame.height(), color)
            .map_err(|e| CameraError::EncodeFailed(e.to_string()))?;

        tracing::trace!(
            sequence = frame.sequence(),
            bytes = buffer.len(),
            "Encoded frame"
        );

        Ok(EncodedImage {
            data: Bytes::from(buffer),
            width: frame.width(),
            height: frame.height(),
            sequence: frame.sequence(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::ImageFormat;

    fn gradient(width: u32, height: u32, format: PixelFormat) -> Frame {
        let len = (width * height) as usize * format.bytes_per_pixel();
        let pixels = (0..len).map(|i| (i % 251) as u8).collect();
        Frame::new(pixels, width, height, format, 7)
    }

    #[test]
    fn test_encode_rgb_decodes() {
        let encoded = FrameEncoder::default()
            .encode(&gradient(64, 48, PixelFormat::Rgb8))
            .unwrap();

        assert!(!encoded.is_empty());
        assert_eq!(&encoded.data()[..2], &[0xFF, 0xD8]);
        assert_eq!(encoded.sequence(), 7);

        let decoded = image::load_from_memory_with_format(encoded.data(), ImageFormat::Jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (64, 48));
    }

    #[test]
    fn test_encode_grayscale() {
        let encoded = FrameEncoder::new(60)
            .encode(&gradient(16, 16, PixelFormat::Gray8))
            .unwrap();
        let decoded = image::load_from_memory(encoded.data()).unwrap();
        assert_eq!(decoded.width(), 16);
    }

    #[test]
    fn test_encode_is_deterministic() {
        let encoder = FrameEncoder::new(75);
        let frame = gradient(32, 32, PixelFormat::Rgb8);
        assert_eq!(encoder.encode(&frame).unwrap(), encoder.encode(&frame).unwrap());
    }

    #[test]
    fn test_malformed_frame_rejected() {
        let frame = Frame::new(vec![1, 2, 3], 64, 48, PixelFormat::Rgb8, 1);
        assert!(matches!(
            FrameEncoder::default().encode(&frame),
            Err(CameraError::EncodeFailed(_))
        ));
    }

    #[test]
    fn test_quality_clamped() {
        assert_eq!(FrameEncoder::new(0).quality(), 1);
        assert_eq!(FrameEncoder::new(200).quality(), 100);
    }
}
