//! Frame encoding for transport and storage.

mod jpeg;

pub use jpeg::{EncodedImage, FrameEncoder};
