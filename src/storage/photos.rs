//! Saved photos on local disk.
//!
//! Photos are written to a temporary file in the target directory and
//! renamed into place, so listers never observe a partially written JPEG.

use crate::encoding::EncodedImage;
use crate::error::CameraError;
use chrono::Local;
use rand_core::{OsRng, RngCore};
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

/// Attempts at finding a free filename before giving up.
const MAX_NAME_ATTEMPTS: usize = 8;

static PHOTO_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A photo that was written to disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SavedPhoto {
    /// Full path of the published file.
    pub path: PathBuf,
    /// File name within the photo directory.
    pub filename: String,
}

/// Errors from listing or looking up saved photos.
#[derive(Debug, Error)]
pub enum PhotoError {
    #[error("invalid photo filename: {0:?}")]
    InvalidFilename(String),
    #[error("photo not found: {0}")]
    NotFound(String),
    #[error("photo directory error: {0}")]
    Io(#[from] std::io::Error),
}

/// Generates `photo_<local time to ms>_<process counter>_<random>.jpg`.
fn photo_filename() -> String {
    let timestamp = Local::now().format("%Y%m%d_%H%M%S_%3f");
    let counter = PHOTO_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!(
        "photo_{}_{:06}_{:08x}.jpg",
        timestamp,
        counter % 1_000_000,
        OsRng.next_u32()
    )
}

/// Writes an encoded image into `dir` under a fresh, unique name.
///
/// `dir` must already exist. The file only becomes visible once fully
/// written, and an existing file is never overwritten.
pub fn save_photo(image: &EncodedImage, dir: &Path) -> Result<SavedPhoto, CameraError> {
    if !dir.is_dir() {
        return Err(CameraError::PersistenceFailed(format!(
            "{} is not a directory",
            dir.display()
        )));
    }

    let persistence = |e: std::io::Error| {
        CameraError::PersistenceFailed(format!("{}: {}", dir.display(), e))
    };

    let mut staged = tempfile::Builder::new()
        .prefix(".photo-")
        .suffix(".part")
        .tempfile_in(dir)
        .map_err(persistence)?;
    staged.write_all(image.data()).map_err(persistence)?;
    staged.as_file().sync_all().map_err(persistence)?;

    for _ in 0..MAX_NAME_ATTEMPTS {
        let filename = photo_filename();
        let path = dir.join(&filename);
        match staged.persist_noclobber(&path) {
            Ok(_) => {
                tracing::info!(path = %path.display(), bytes = image.len(), "Photo saved");
                return Ok(SavedPhoto { path, filename });
            }
            Err(e) if e.error.kind() == std::io::ErrorKind::AlreadyExists => {
                staged = e.file;
            }
            Err(e) => return Err(persistence(e.error)),
        }
    }

    Err(CameraError::PersistenceFailed(format!(
        "no free filename in {} after {} attempts",
        dir.display(),
        MAX_NAME_ATTEMPTS
    )))
}

fn is_jpeg_name(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    lower.ends_with(".jpg") || lower.ends_with(".jpeg")
}

/// Lists saved photo filenames, newest first.
///
/// A missing directory yields an empty list.
pub fn list_photos(dir: &Path) -> Result<Vec<String>, PhotoError> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut names = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            if is_jpeg_name(name) {
                names.push(name.to_string());
            }
        }
    }
    names.sort_unstable_by(|a, b| b.cmp(a));
    Ok(names)
}

/// Validates a client-supplied filename and returns its path inside `dir`.
pub fn photo_path(dir: &Path, filename: &str) -> Result<PathBuf, PhotoError> {
    let invalid = filename.is_empty()
        || filename.contains("..")
        || filename.contains('/')
        || filename.contains('\\')
        || filename.contains('\0');
    if invalid {
        return Err(PhotoError::InvalidFilename(filename.to_string()));
    }

    let path = dir.join(filename);
    if !path.is_file() {
        return Err(PhotoError::NotFound(filename.to_string()));
    }
    Ok(path)
}
