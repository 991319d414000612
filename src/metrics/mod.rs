//! Prometheus metrics for camera activity.
//!
//! # Metrics Exposed
//!
//! - `camera_captures_total{device}` - Successful single-shot captures
//! - `camera_capture_failures_total{device,kind}` - Failed captures and skipped stream frames
//! - `camera_stream_frames_total{device}` - Frames delivered to stream viewers
//! - `camera_active_streams{device}` - Streams currently open
//! - `camera_photos_saved_total` - Photos written to disk
//! - `camera_open_handles` - Camera devices currently open
//!
//! The HTTP server exposes these at `/metrics`.

mod collector;

pub use collector::{CaptureMetrics, MetricsError};
