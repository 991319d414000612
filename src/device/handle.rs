//! Exclusive, long-lived connection to one camera.
//!
//! Each handle owns a capture thread that constructs and drives the
//! backend. Callers talk to that thread through [`DeviceHandle::read_frame`],
//! which holds the handle's read guard for the whole request/reply cycle,
//! so at most one read is in flight per device.

use super::DeviceDescriptor;
use crate::capture::{Camera, CameraFactory, CaptureConfig, DeviceError, Frame};
use crate::error::CameraError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, SyncSender, TrySendError};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

enum Command {
    Read(SyncSender<Result<Frame, DeviceError>>),
    Close,
}

/// An open camera device.
pub struct DeviceHandle {
    descriptor: DeviceDescriptor,
    /// Read guard; also the only path to the capture thread. Holds at most
    /// one queued command, so reads cannot pile up behind a stalled one.
    commands: Mutex<SyncSender<Command>>,
    /// Shared with the capture thread, which stops once it turns false.
    open: Arc<AtomicBool>,
    read_timeout: Duration,
}

impl DeviceHandle {
    /// Opens the device on a new capture thread.
    ///
    /// Fails with [`CameraError::DeviceUnavailable`] if the backend cannot be
    /// opened or does not answer within the configured read timeout.
    pub fn open(
        descriptor: &DeviceDescriptor,
        factory: Arc<dyn CameraFactory>,
        config: &CaptureConfig,
    ) -> Result<Self, CameraError> {
        let (command_tx, command_rx) = mpsc::sync_channel::<Command>(1);
        let open = Arc::new(AtomicBool::new(true));
        let (ready_tx, ready_rx) = mpsc::sync_channel::<Result<(), DeviceError>>(1);
        let read_timeout = config.read_timeout();

        let thread_descriptor = descriptor.clone();
        let thread_config = config.clone();
        let running = Arc::clone(&open);
        thread::Builder::new()
            .name(format!("camera-{}", descriptor.id))
            .spawn(move || {
                let mut camera = factory.create(&thread_descriptor);
                let opened = camera.open(&thread_config);
                let failed = opened.is_err();
                let _ = ready_tx.send(opened);
                if failed {
                    return;
                }
                run_capture_loop(camera.as_mut(), &command_rx, &running, thread_descriptor.id);
                camera.close();
            })
            .map_err(|e| unavailable(descriptor.id, format!("failed to spawn capture thread: {e}")))?;

        match ready_rx.recv_timeout(read_timeout) {
            Ok(Ok(())) => {
                tracing::info!(device = descriptor.id, path = %descriptor.path, "Camera handle opened");
                Ok(Self {
                    descriptor: descriptor.clone(),
                    commands: Mutex::new(command_tx),
                    open,
                    read_timeout,
                })
            }
            Ok(Err(e)) => Err(map_device_error(descriptor.id, e)),
            Err(RecvTimeoutError::Timeout) => {
                // The capture thread exits as soon as the open completes.
                open.store(false, Ordering::Release);
                let _ = command_tx.try_send(Command::Close);
                Err(unavailable(
                    descriptor.id,
                    format!("open timed out after {:?}", read_timeout),
                ))
            }
            Err(RecvTimeoutError::Disconnected) => Err(unavailable(
                descriptor.id,
                "capture thread exited during open".into(),
            )),
        }
    }

    /// False once the handle was closed or the device went away.
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Reads one frame, waiting at most the configured read timeout.
    ///
    /// Concurrent callers are serialized on the handle's guard.
    pub fn read_frame(&self) -> Result<Frame, CameraError> {
        let device = self.descriptor.id;
        let commands = self
            .commands
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if !self.is_open() {
            return Err(unavailable(device, "handle is closed".into()));
        }

        let (reply_tx, reply_rx) = mpsc::sync_channel(1);
        match commands.try_send(Command::Read(reply_tx)) {
            Ok(()) => {}
            // A timed-out read is still stuck in the backend with another queued behind it
            Err(TrySendError::Full(_)) => {
                return Err(CameraError::CaptureFailed {
                    device,
                    reason: "previous read still in progress".into(),
                })
            }
            Err(TrySendError::Disconnected(_)) => {
                self.open.store(false, Ordering::Release);
                return Err(unavailable(device, "capture thread stopped".into()));
            }
        }

        match reply_rx.recv_timeout(self.read_timeout) {
            Ok(Ok(frame)) => Ok(frame),
            Ok(Err(e)) => {
                let err = map_device_error(device, e);
                if err.is_device_loss() {
                    self.open.store(false, Ordering::Release);
                }
                Err(err)
            }
            Err(RecvTimeoutError::Timeout) => Err(CameraError::CaptureFailed {
                device,
                reason: format!("no frame within {:?}", self.read_timeout),
            }),
            Err(RecvTimeoutError::Disconnected) => {
                self.open.store(false, Ordering::Release);
                Err(unavailable(device, "capture thread stopped".into()))
            }
        }
    }

    /// Releases the device. Safe to call more than once.
    pub fn close(&self) {
        if self.open.swap(false, Ordering::AcqRel) {
            let commands = self
                .commands
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            // A full queue is fine: the thread sees the cleared flag first
            let _ = commands.try_send(Command::Close);
            tracing::info!(device = self.descriptor.id, "Camera handle closed");
        }
    }
}

impl Drop for DeviceHandle {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for DeviceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceHandle")
            .field("descriptor", &self.descriptor)
            .field("open", &self.is_open())
            .finish()
    }
}

fn run_capture_loop(
    camera: &mut dyn Camera,
    commands: &mpsc::Receiver<Command>,
    running: &AtomicBool,
    device: u32,
) {
    while let Ok(command) = commands.recv() {
        if !running.load(Ordering::Acquire) {
            break;
        }
        match command {
            Command::Read(reply) => {
                let result = camera.capture();
                let lost = matches!(
                    result,
                    Err(DeviceError::Disconnected(_)) | Err(DeviceError::NotInitialized)
                );
                // The caller may have timed out and gone away
                let _ = reply.send(result);
                if lost {
                    tracing::warn!(device, "Camera lost, stopping capture thread");
                    break;
                }
            }
            Command::Close => break,
        }
    }
}

fn unavailable(device: u32, reason: String) -> CameraError {
    CameraError::DeviceUnavailable { device, reason }
}

fn map_device_error(device: u32, err: DeviceError) -> CameraError {
    match err {
        DeviceError::CaptureFailed(reason) => CameraError::CaptureFailed { device, reason },
        other => unavailable(device, other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::MockCamera;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
    use std::time::Instant;

    fn descriptor() -> DeviceDescriptor {
        DeviceDescriptor {
            id: 0,
            path: "/dev/video0".into(),
            name: "upper".into(),
        }
    }

    fn config() -> CaptureConfig {
        let mut config = CaptureConfig::with_dimensions(32, 24);
        config.read_timeout_ms = 500;
        config
    }

    fn factory(camera: MockCamera) -> Arc<dyn CameraFactory> {
        Arc::new(move |_: &DeviceDescriptor| Box::new(camera.clone()) as Box<dyn Camera>)
    }

    #[test]
    fn test_open_read_close() {
        let handle = DeviceHandle::open(&descriptor(), factory(MockCamera::new()), &config()).unwrap();
        assert!(handle.is_open());

        let first = handle.read_frame().unwrap();
        let second = handle.read_frame().unwrap();
        assert!(first.is_valid());
        assert_eq!(second.sequence(), first.sequence() + 1);

        handle.close();
        handle.close();
        assert!(!handle.is_open());
        assert!(matches!(
            handle.read_frame(),
            Err(CameraError::DeviceUnavailable { .. })
        ));
    }

    #[test]
    fn test_open_failure_is_unavailable() {
        let result = DeviceHandle::open(
            &descriptor(),
            factory(MockCamera::new().failing_open()),
            &config(),
        );
        assert!(matches!(
            result,
            Err(CameraError::DeviceUnavailable { device: 0, .. })
        ));
    }

    #[test]
    fn test_read_timeout() {
        let camera = MockCamera::new().with_latency(Duration::from_millis(300));
        let mut config = config();
        config.read_timeout_ms = 50;
        // Opening is instant, only reads are slow
        let handle = DeviceHandle::open(&descriptor(), factory(camera), &config).unwrap();

        let started = Instant::now();
        let result = handle.read_frame();
        assert!(matches!(result, Err(CameraError::CaptureFailed { .. })));
        assert!(started.elapsed() < Duration::from_millis(250));
        assert!(handle.is_open());
    }

    /// Stalls on its first read only and counts hardware reads.
    struct StallingCamera {
        inner: MockCamera,
        stall: Duration,
        reads: Arc<AtomicUsize>,
    }

    impl Camera for StallingCamera {
        fn open(&mut self, config: &CaptureConfig) -> Result<(), DeviceError> {
            self.inner.open(config)
        }

        fn capture(&mut self) -> Result<Frame, DeviceError> {
            if self.reads.fetch_add(1, AtomicOrdering::SeqCst) == 0 {
                thread::sleep(self.stall);
            }
            self.inner.capture()
        }

        fn is_open(&self) -> bool {
            self.inner.is_open()
        }

        fn close(&mut self) {
            self.inner.close()
        }
    }

    #[test]
    fn test_reads_do_not_queue_behind_stalled_read() {
        let reads = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&reads);
        let factory: Arc<dyn CameraFactory> = Arc::new(move |_: &DeviceDescriptor| {
            Box::new(StallingCamera {
                inner: MockCamera::new(),
                stall: Duration::from_millis(300),
                reads: Arc::clone(&counter),
            }) as Box<dyn Camera>
        });
        let mut config = config();
        config.read_timeout_ms = 100;
        let handle = DeviceHandle::open(&descriptor(), factory, &config).unwrap();

        // The first read stalls, the second queues behind it and times out
        assert!(handle.read_frame().is_err());
        assert!(handle.read_frame().is_err());

        // Further reads are refused without touching the device
        for _ in 0..8 {
            let started = Instant::now();
            assert!(matches!(
                handle.read_frame(),
                Err(CameraError::CaptureFailed { .. })
            ));
            assert!(started.elapsed() < Duration::from_millis(50));
        }

        thread::sleep(Duration::from_millis(300));
        assert!(handle.read_frame().is_ok());
        assert_eq!(reads.load(AtomicOrdering::SeqCst), 3);
        assert!(handle.is_open());
    }

    #[test]
    fn test_transient_failure_keeps_handle_open() {
        let camera = MockCamera::new().with_transient_failures(1);
        let handle = DeviceHandle::open(&descriptor(), factory(camera), &config()).unwrap();
        assert!(matches!(
            handle.read_frame(),
            Err(CameraError::CaptureFailed { .. })
        ));
        assert!(handle.is_open());
    }

    #[test]
    fn test_disconnect_closes_handle() {
        let camera = MockCamera::new().disconnect_after(1);
        let handle = DeviceHandle::open(&descriptor(), factory(camera), &config()).unwrap();
        assert!(handle.read_frame().is_ok());
        assert!(matches!(
            handle.read_frame(),
            Err(CameraError::DeviceUnavailable { .. })
        ));
        assert!(!handle.is_open());
    }

    #[test]
    fn test_concurrent_reads_are_serialized() {
        let camera = MockCamera::new().with_latency(Duration::from_millis(5));
        let handle = Arc::new(DeviceHandle::open(&descriptor(), factory(camera), &config()).unwrap());

        let workers: Vec<_> = (0..4)
            .map(|_| {
                let handle = Arc::clone(&handle);
                thread::spawn(move || {
                    (0..5)
                        .map(|_| handle.read_frame().unwrap().sequence())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut sequences: Vec<u64> = workers
            .into_iter()
            .flat_map(|w| w.join().unwrap())
            .collect();
        sequences.sort_unstable();
        assert_eq!(sequences, (1..=20).collect::<Vec<_>>());
    }
}
