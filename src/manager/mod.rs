//! Capture orchestration.
//!
//! [`CaptureManager`] owns every open camera. It resolves device ids
//! against the registry, opens handles lazily and keeps them for reuse,
//! encodes frames and optionally persists them. Requests for the same
//! device are serialized at that device's handle; different devices run
//! in parallel.

mod stream;

pub use stream::FrameStream;

use crate::capture::{CameraFactory, CaptureConfig, StreamConfig};
use crate::device::{DeviceDescriptor, DeviceHandle, DeviceRegistry};
use crate::encoding::{EncodedImage, FrameEncoder};
use crate::error::CameraError;
use crate::metrics::CaptureMetrics;
use crate::storage::{save_photo, SavedPhoto};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

/// Settings the manager needs at runtime.
#[derive(Debug, Clone, Default)]
pub struct ManagerConfig {
    pub capture: CaptureConfig,
    pub stream: StreamConfig,
}

/// Lazily opened handle for one configured device.
struct DeviceSlot {
    descriptor: DeviceDescriptor,
    handle: Mutex<Option<Arc<DeviceHandle>>>,
}

struct Inner {
    registry: DeviceRegistry,
    slots: HashMap<u32, DeviceSlot>,
    factory: Arc<dyn CameraFactory>,
    encoder: FrameEncoder,
    config: ManagerConfig,
    metrics: Option<Arc<CaptureMetrics>>,
}

/// Shared entry point for snapshots and streams.
///
/// Cloning is cheap; all clones share the same device handles.
#[derive(Clone)]
pub struct CaptureManager {
    inner: Arc<Inner>,
}

impl CaptureManager {
    /// Creates a manager over the given devices. No device is opened yet.
    pub fn new(
        registry: DeviceRegistry,
        factory: Arc<dyn CameraFactory>,
        config: ManagerConfig,
    ) -> Self {
        let slots = registry
            .list_devices()
            .iter()
            .map(|d| {
                (
                    d.id,
                    DeviceSlot {
                        descriptor: d.clone(),
                        handle: Mutex::new(None),
                    },
                )
            })
            .collect();

        Self {
            inner: Arc::new(Inner {
                registry,
                slots,
                factory,
                encoder: FrameEncoder::new(config.capture.jpeg_quality),
                config,
                metrics: None,
            }),
        }
    }

    /// Attaches a metrics registry. Must be called before the manager is cloned.
    pub fn with_metrics(mut self, metrics: Arc<CaptureMetrics>) -> Self {
        if let Some(inner) = Arc::get_mut(&mut self.inner) {
            inner.metrics = Some(metrics);
        } else {
            tracing::warn!("CaptureManager already shared, metrics not attached");
        }
        self
    }

    /// Configured devices.
    pub fn list_devices(&self) -> &[DeviceDescriptor] {
        self.inner.registry.list_devices()
    }

    /// The registry the manager resolves ids against.
    pub fn registry(&self) -> &DeviceRegistry {
        &self.inner.registry
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.inner.config
    }

    pub(crate) fn metrics(&self) -> Option<&CaptureMetrics> {
        self.inner.metrics.as_deref()
    }

    /// Takes one JPEG snapshot, saving it into `save_dir` when given.
    ///
    /// Never retries: a failed read is reported as-is.
    pub fn capture(
        &self,
        device_id: u32,
        save_dir: Option<&Path>,
    ) -> Result<(EncodedImage, Option<SavedPhoto>), CameraError> {
        let result = self.capture_inner(device_id, save_dir);
        match &result {
            Ok((image, saved)) => {
                tracing::debug!(
                    device = device_id,
                    bytes = image.len(),
                    saved = saved.is_some(),
                    "Captured snapshot"
                );
                if let Some(metrics) = self.metrics() {
                    metrics.record_capture(device_id);
                    if saved.is_some() {
                        metrics.record_photo_saved();
                    }
                }
            }
            Err(e) => {
                tracing::warn!(device = device_id, error = %e, "Capture failed");
                if let Some(metrics) = self.metrics() {
                    metrics.record_failure(device_id, e.kind());
                }
            }
        }
        result
    }

    fn capture_inner(
        &self,
        device_id: u32,
        save_dir: Option<&Path>,
    ) -> Result<(EncodedImage, Option<SavedPhoto>), CameraError> {
        let image = self.grab(device_id)?;
        let saved = match save_dir {
            Some(dir) => Some(save_photo(&image, dir)?),
            None => None,
        };
        Ok((image, saved))
    }

    /// Starts a fresh stream of encoded frames from a device.
    ///
    /// The device is resolved and opened up front, so unknown or missing
    /// cameras fail here rather than on the first pull.
    pub fn stream_frames(&self, device_id: u32) -> Result<FrameStream, CameraError> {
        self.handle(device_id)?;
        Ok(FrameStream::new(self.clone(), device_id))
    }

    /// Reads and encodes one frame. Shared by snapshots and streams.
    pub(crate) fn grab(&self, device_id: u32) -> Result<EncodedImage, CameraError> {
        let handle = self.handle(device_id)?;
        let frame = match handle.read_frame() {
            Ok(frame) => frame,
            Err(e) => {
                if e.is_device_loss() {
                    self.evict(device_id, &handle);
                }
                return Err(e);
            }
        };
        self.inner.encoder.encode(&frame)
    }

    /// Returns the open handle for a device, opening it if needed.
    fn handle(&self, device_id: u32) -> Result<Arc<DeviceHandle>, CameraError> {
        let descriptor = self.inner.registry.resolve(device_id)?;
        let slot = self
            .inner
            .slots
            .get(&descriptor.id)
            .ok_or(CameraError::UnknownDevice(device_id))?;

        let mut cached = slot.handle.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = cached.as_ref() {
            if handle.is_open() {
                return Ok(Arc::clone(handle));
            }
        }
        if cached.take().is_some() {
            self.record_handle_closed();
        }

        let handle = Arc::new(DeviceHandle::open(
            &slot.descriptor,
            Arc::clone(&self.inner.factory),
            &self.inner.config.capture,
        )?);
        *cached = Some(Arc::clone(&handle));
        if let Some(metrics) = self.metrics() {
            metrics.handle_opened();
        }
        Ok(handle)
    }

    /// Drops a handle that reported device loss, unless it was already replaced.
    fn evict(&self, device_id: u32, handle: &Arc<DeviceHandle>) {
        if let Some(slot) = self.inner.slots.get(&device_id) {
            let mut cached = slot.handle.lock().unwrap_or_else(PoisonError::into_inner);
            if cached.as_ref().is_some_and(|h| Arc::ptr_eq(h, handle)) {
                *cached = None;
                self.record_handle_closed();
                tracing::warn!(device = device_id, "Evicted lost camera handle");
            }
        }
        handle.close();
    }

    /// True if the device currently has an open handle.
    pub fn is_device_open(&self, device_id: u32) -> bool {
        self.inner.slots.get(&device_id).is_some_and(|slot| {
            slot.handle
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .as_ref()
                .is_some_and(|h| h.is_open())
        })
    }

    /// Closes every open device. Later requests reopen them.
    pub fn shutdown(&self) {
        for slot in self.inner.slots.values() {
            let handle = slot
                .handle
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take();
            if let Some(handle) = handle {
                handle.close();
                self.record_handle_closed();
            }
        }
    }

    fn record_handle_closed(&self) {
        if let Some(metrics) = self.metrics() {
            metrics.handle_closed();
        }
    }
}

impl std::fmt::Debug for CaptureManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureManager")
            .field("devices", &self.inner.registry.list_devices())
            .field("config", &self.inner.config)
            .finish()
    }
}
