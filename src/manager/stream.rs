//! Pull-based frame streams.

use super::CaptureManager;
use crate::encoding::EncodedImage;
use crate::error::CameraError;

/// An endless sequence of JPEG frames from one device.
///
/// Each call to [`Iterator::next`] makes exactly one read attempt. The
/// device guard is only held inside that call, so a consumer that stops
/// pulling or drops the stream never blocks other callers.
///
/// Transient read or encode faults are logged, counted and yielded as
/// `Err` items without ending the stream; the next pull waits for the
/// retry delay first. The stream ends only after yielding a
/// [`CameraError::DeviceUnavailable`] (or a caller error), which
/// [`FrameStream::is_finished`] reports.
pub struct FrameStream {
    manager: CaptureManager,
    device_id: u32,
    consecutive_failures: u32,
    frames: u64,
    finished: bool,
}

impl FrameStream {
    pub(super) fn new(manager: CaptureManager, device_id: u32) -> Self {
        if let Some(metrics) = manager.metrics() {
            metrics.stream_started(device_id);
        }
        tracing::info!(device = device_id, "Stream started");
        Self {
            manager,
            device_id,
            consecutive_failures: 0,
            frames: 0,
            finished: false,
        }
    }

    /// Device this stream reads from.
    pub fn device_id(&self) -> u32 {
        self.device_id
    }

    /// Frames delivered so far.
    pub fn frames_delivered(&self) -> u64 {
        self.frames
    }

    /// Failed pulls since the last delivered frame.
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// True once the stream has yielded its terminal error.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    fn finish(&mut self, err: CameraError) -> Option<Result<EncodedImage, CameraError>> {
        self.finished = true;
        tracing::warn!(device = self.device_id, error = %err, "Stream terminated");
        Some(Err(err))
    }
}

impl Iterator for FrameStream {
    type Item = Result<EncodedImage, CameraError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        if self.consecutive_failures > 0 {
            std::thread::sleep(self.manager.config().stream.retry_delay());
        }

        match self.manager.grab(self.device_id) {
            Ok(image) => {
                self.consecutive_failures = 0;
                self.frames += 1;
                if let Some(metrics) = self.manager.metrics() {
                    metrics.record_stream_frame(self.device_id);
                }
                Some(Ok(image))
            }
            Err(e) if e.is_device_loss() || e.is_client_error() => self.finish(e),
            Err(e) => {
                self.consecutive_failures = self.consecutive_failures.saturating_add(1);
                if let Some(metrics) = self.manager.metrics() {
                    metrics.record_failure(self.device_id, e.kind());
                }
                tracing::warn!(
                    device = self.device_id,
                    error = %e,
                    failures = self.consecutive_failures,
                    "Skipping stream frame"
                );
                Some(Err(e))
            }
        }
    }
}

impl std::iter::FusedIterator for FrameStream {}

impl Drop for FrameStream {
    fn drop(&mut self) {
        if let Some(metrics) = self.manager.metrics() {
            metrics.stream_ended(self.device_id);
        }
        tracing::info!(
            device = self.device_id,
            frames = self.frames,
            "Stream closed"
        );
    }
}

impl std::fmt::Debug for FrameStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameStream")
            .field("device_id", &self.device_id)
            .field("frames", &self.frames)
            .field("finished", &self.finished)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::manager_with;
    use super::*;
    use crate::capture::{default_devices, Camera, MockCamera};
    use crate::device::{DeviceDescriptor, DeviceRegistry};
    use crate::manager::ManagerConfig;
    use crate::metrics::CaptureMetrics;
    use image::ImageFormat;
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    #[test]
    fn test_stream_yields_independent_frames() {
        let manager = manager_with(MockCamera::new());
        let frames: Vec<EncodedImage> = manager
            .stream_frames(0)
            .unwrap()
            .take(10)
            .map(Result::unwrap)
            .collect();

        assert_eq!(frames.len(), 10);
        for pair in frames.windows(2) {
            assert!(pair[1].sequence() > pair[0].sequence());
        }
        for frame in &frames {
            assert!(!frame.is_empty());
            image::load_from_memory_with_format(frame.data(), ImageFormat::Jpeg).unwrap();
        }
    }

    #[test]
    fn test_stream_unknown_device() {
        let manager = manager_with(MockCamera::new());
        assert_eq!(
            manager.stream_frames(5).unwrap_err(),
            CameraError::UnknownDevice(5)
        );
    }

    #[test]
    fn test_stream_unavailable_device() {
        let manager = manager_with(MockCamera::new().failing_open());
        assert!(matches!(
            manager.stream_frames(1),
            Err(CameraError::DeviceUnavailable { device: 1, .. })
        ));
    }

    #[test]
    fn test_stream_skips_transient_failures() {
        // Every third read fails
        let manager = manager_with(MockCamera::new().with_transient_failures(3));
        let mut stream = manager.stream_frames(0).unwrap();
        let results: Vec<_> = stream.by_ref().take(9).collect();

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 6);
        for result in results.iter().filter_map(|r| r.as_ref().err()) {
            assert!(matches!(result, CameraError::CaptureFailed { device: 0, .. }));
        }
        assert!(!stream.is_finished());
        assert!(stream.next().is_some());
    }

    #[test]
    fn test_stream_ends_on_device_loss() {
        let manager = manager_with(MockCamera::new().disconnect_after(3));
        let mut stream = manager.stream_frames(0).unwrap();

        for _ in 0..3 {
            assert!(stream.next().unwrap().is_ok());
        }
        assert!(matches!(
            stream.next(),
            Some(Err(CameraError::DeviceUnavailable { .. }))
        ));
        assert!(stream.next().is_none());
        assert!(!manager.is_device_open(0));
    }

    #[test]
    fn test_stream_keeps_going_through_repeated_failures() {
        // Every read fails, but the device is never lost
        let manager = manager_with(MockCamera::new().with_transient_failures(1));
        let mut stream = manager.stream_frames(0).unwrap();

        for attempt in 1..=50 {
            assert!(matches!(
                stream.next(),
                Some(Err(CameraError::CaptureFailed { .. }))
            ));
            assert_eq!(stream.consecutive_failures(), attempt);
        }
        assert!(!stream.is_finished());
        assert!(manager.is_device_open(0));
    }

    #[test]
    fn test_each_pull_makes_one_attempt() {
        let mut config = ManagerConfig::default();
        config.capture.width = 16;
        config.capture.height = 16;
        config.capture.read_timeout_ms = 1000;
        config.stream.retry_delay_ms = 50;
        let camera = MockCamera::new().with_transient_failures(1);
        let factory = move |_: &DeviceDescriptor| Box::new(camera.clone()) as Box<dyn Camera>;
        let manager = CaptureManager::new(
            DeviceRegistry::new(&default_devices()),
            Arc::new(factory),
            config,
        );
        let mut stream = manager.stream_frames(0).unwrap();

        // A pull after a failure waits one retry delay, never more
        assert!(stream.next().unwrap().is_err());
        let started = Instant::now();
        assert!(stream.next().unwrap().is_err());
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(50));
        assert!(elapsed < Duration::from_millis(500));
    }

    #[test]
    fn test_snapshots_during_stream_are_valid() {
        let manager = manager_with(MockCamera::new().with_latency(Duration::from_millis(2)));
        let streamer = {
            let manager = manager.clone();
            thread::spawn(move || {
                manager
                    .stream_frames(0)
                    .unwrap()
                    .take(30)
                    .map(Result::unwrap)
                    .collect::<Vec<_>>()
            })
        };
        let snapshotters: Vec<_> = (0..2)
            .map(|_| {
                let manager = manager.clone();
                thread::spawn(move || {
                    (0..10)
                        .map(|_| manager.capture(0, None).unwrap().0)
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut images = streamer.join().unwrap();
        for worker in snapshotters {
            images.extend(worker.join().unwrap());
        }
        assert_eq!(images.len(), 50);

        let mut sequences: Vec<u64> = images.iter().map(EncodedImage::sequence).collect();
        sequences.sort_unstable();
        sequences.dedup();
        assert_eq!(sequences.len(), 50, "each read got its own frame");

        for image in &images {
            let decoded =
                image::load_from_memory_with_format(image.data(), ImageFormat::Jpeg).unwrap();
            assert_eq!((decoded.width(), decoded.height()), (64, 48));
        }
    }

    #[test]
    fn test_abandoned_stream_releases_device() {
        let manager = manager_with(MockCamera::new().with_latency(Duration::from_millis(20)));
        let mut stream = manager.stream_frames(0).unwrap();
        assert!(stream.next().unwrap().is_ok());

        // The consumer stops pulling but keeps the stream alive
        let started = Instant::now();
        assert!(manager.capture(0, None).is_ok());
        assert!(started.elapsed() < Duration::from_millis(500));

        drop(stream);
        let started = Instant::now();
        assert!(manager.capture(0, None).is_ok());
        assert!(started.elapsed() < Duration::from_millis(500));
    }

    #[test]
    fn test_stream_metrics() {
        let metrics = Arc::new(CaptureMetrics::new().unwrap());
        let manager = manager_with(MockCamera::new()).with_metrics(Arc::clone(&metrics));

        let mut stream = manager.stream_frames(1).unwrap();
        assert_eq!(metrics.active_streams(1), 1);
        stream.next().unwrap().unwrap();
        stream.next().unwrap().unwrap();
        assert_eq!(stream.frames_delivered(), 2);

        drop(stream);
        assert_eq!(metrics.active_streams(1), 0);
        assert!(metrics
            .encode()
            .unwrap()
            .contains("camera_stream_frames_total{device=\"1\"} 2"));
    }
}
