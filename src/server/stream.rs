//! MJPEG bridging between a blocking [`FrameStream`] and an HTTP body.
//!
//! A blocking worker pulls frames and pushes multipart parts into a small
//! channel. When the viewer disconnects, axum drops the body and with it
//! the receiver; the worker checks for that before every read and then
//! drops the stream. Server shutdown ends the body the same way.

use crate::error::CameraError;
use crate::manager::FrameStream;
use axum::{
    body::{Body, Bytes},
    http::header,
    response::{IntoResponse, Response},
};
use bytes::BytesMut;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};

const BOUNDARY_HEADER: &[u8] = b"--frame\r\nContent-Type: image/jpeg\r\n\r\n";

/// Frames buffered between the capture worker and the socket.
const CHANNEL_CAPACITY: usize = 2;

/// Wraps one JPEG in its multipart part.
pub(super) fn multipart_part(jpeg: &[u8]) -> Bytes {
    let mut part = BytesMut::with_capacity(BOUNDARY_HEADER.len() + jpeg.len() + 2);
    part.extend_from_slice(BOUNDARY_HEADER);
    part.extend_from_slice(jpeg);
    part.extend_from_slice(b"\r\n");
    part.freeze()
}

/// Drives `frames` until the viewer goes away, the server shuts down or
/// the device is lost.
///
/// Transient faults are not forwarded; the viewer just sees the previous
/// frame for a little longer.
pub(super) fn pump(
    mut frames: FrameStream,
    tx: mpsc::Sender<Result<Bytes, CameraError>>,
    stop: watch::Receiver<bool>,
    interval: Duration,
) {
    let device = frames.device_id();
    let mut next_due = Instant::now();

    while !tx.is_closed() && !*stop.borrow() {
        let part = match frames.next() {
            Some(Ok(image)) => Ok(multipart_part(image.data())),
            Some(Err(e)) if !frames.is_finished() => {
                tracing::trace!(device, error = %e, "Frame skipped");
                continue;
            }
            Some(Err(e)) => Err(e),
            None => break,
        };
        let terminal = part.is_err();
        if tx.blocking_send(part).is_err() || terminal {
            break;
        }

        next_due += interval;
        let now = Instant::now();
        if next_due > now {
            std::thread::sleep(next_due - now);
        } else {
            next_due = now;
        }
    }
    tracing::debug!(device, frames = frames.frames_delivered(), "Stream pump stopped");
}

/// Starts a worker for `frames` and returns the streaming response.
///
/// The body ends when `stop` turns true, so graceful shutdown is not held
/// up by open viewers.
pub(super) fn mjpeg_response(
    frames: FrameStream,
    stop: watch::Receiver<bool>,
    interval: Duration,
) -> Response {
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    let pump_stop = stop.clone();
    tokio::task::spawn_blocking(move || pump(frames, tx, pump_stop, interval));

    let parts = futures::stream::unfold((rx, stop), |(mut rx, mut stop)| async move {
        let next = tokio::select! {
            part = rx.recv() => part,
            _ = stop.wait_for(|stopping| *stopping) => None,
        };
        next.map(|part| (part, (rx, stop)))
    });

    (
        [
            (header::CONTENT_TYPE, "multipart/x-mixed-replace; boundary=frame"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(parts),
    )
        .into_response()
}
