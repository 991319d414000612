//! Photo persistence.

mod photos;

pub use photos::{list_photos, photo_path, save_photo, PhotoError, SavedPhoto};
