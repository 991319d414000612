//! Metrics collection and registry.

use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder};
use thiserror::Error;

/// Errors that can occur during metrics operations.
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),
}

/// Prometheus metrics for camera activity.
pub struct CaptureMetrics {
    registry: Registry,

    captures_total: IntCounterVec,
    capture_failures_total: IntCounterVec,
    stream_frames_total: IntCounterVec,
    active_streams: IntGaugeVec,
    photos_saved_total: IntCounter,
    open_handles: IntGauge,
}

impl CaptureMetrics {
    /// Creates a new registry with all camera metrics registered.
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let captures_total = IntCounterVec::new(
            Opts::new("camera_captures_total", "Successful single-shot captures"),
            &["device"],
        )?;
        let capture_failures_total = IntCounterVec::new(
            Opts::new(
                "camera_capture_failures_total",
                "Failed captures and skipped stream frames, by error kind",
            ),
            &["device", "kind"],
        )?;
        let stream_frames_total = IntCounterVec::new(
            Opts::new("camera_stream_frames_total", "Frames delivered to stream viewers"),
            &["device"],
        )?;
        let active_streams = IntGaugeVec::new(
            Opts::new("camera_active_streams", "Streams currently open"),
            &["device"],
        )?;
        let photos_saved_total =
            IntCounter::new("camera_photos_saved_total", "Photos written to disk")?;
        let open_handles = IntGauge::new("camera_open_handles", "Camera devices currently open")?;

        registry.register(Box::new(captures_total.clone()))?;
        registry.register(Box::new(capture_failures_total.clone()))?;
        registry.register(Box::new(stream_frames_total.clone()))?;
        registry.register(Box::new(active_streams.clone()))?;
        registry.register(Box::new(photos_saved_total.clone()))?;
        registry.register(Box::new(open_handles.clone()))?;

        Ok(Self {
            registry,
            captures_total,
            capture_failures_total,
            stream_frames_total,
            active_streams,
            photos_saved_total,
            open_handles,
        })
    }

    pub fn record_capture(&self, device: u32) {
        self.captures_total
            .with_label_values(&[&device.to_string()])
            .inc();
    }

    pub fn record_failure(&self, device: u32, kind: &str) {
        self.capture_failures_total
            .with_label_values(&[&device.to_string(), kind])
            .inc();
    }

    pub fn record_stream_frame(&self, device: u32) {
        self.stream_frames_total
            .with_label_values(&[&device.to_string()])
            .inc();
    }

    pub fn stream_started(&self, device: u32) {
        self.active_streams
            .with_label_values(&[&device.to_string()])
            .inc();
    }

    pub fn stream_ended(&self, device: u32) {
        self.active_streams
            .with_label_values(&[&device.to_string()])
            .dec();
    }

    pub fn record_photo_saved(&self) {
        self.photos_saved_total.inc();
    }

    pub fn handle_opened(&self) {
        self.open_handles.inc();
    }

    pub fn handle_closed(&self) {
        self.open_handles.dec();
    }

    /// Number of streams currently open on a device.
    pub fn active_streams(&self, device: u32) -> i64 {
        self.active_streams
            .with_label_values(&[&device.to_string()])
            .get()
    }

    /// Encodes all metrics in Prometheus text format.
    pub fn encode(&self) -> Result<String, MetricsError> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

impl std::fmt::Debug for CaptureMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureMetrics").finish_non_exhaustive()
    }
}
