use crate::blob::{BlobError, BlobStore};
use crate::config::{PhotoBox, Record};
use crate::template::rgba_to_pixmap;
use log::{error, warn};
use tiny_skia::{Pixmap, PixmapPaint, Transform};

/// Key values written by the upload path when no usable photo exists.
const NO_PHOTO_SENTINELS: [&str; 2] = ["N/A", "Upload Error"];

/// Fetch and prepare the photo for one box, if the record carries a
/// usable key. Every failure degrades to `None`: a missing or broken
/// photo costs that one badge its picture, never the batch.
pub(crate) fn fetch_photo(
    store: &dyn BlobStore,
    bucket: &str,
    record: &Record,
    photo_box: &PhotoBox,
) -> Option<Pixmap> {
    let key = record.get(&photo_box.key_field).map(String::as_str)?;
    if key.is_empty() || NO_PHOTO_SENTINELS.contains(&key) {
        return None;
    }

    let bytes = match store.get(bucket, key) {
        Ok(bytes) => bytes,
        Err(BlobError::NotFound) => {
            warn!("photo not found in bucket '{}': '{}'", bucket, key);
            return None;
        }
        Err(err) => {
            error!("photo fetch failed for '{}': {}", key, err);
            return None;
        }
    };

    let Some(decoded) = image::load_from_memory(&bytes).ok() else {
        error!("photo '{}' could not be decoded", key);
        return None;
    };

    // Exact fit to the configured box, alpha preserved.
    let resized = image::imageops::resize(
        &decoded.to_rgba8(),
        photo_box.width,
        photo_box.height,
        image::imageops::FilterType::Lanczos3,
    );
    rgba_to_pixmap(&resized)
}

/// Composite a prepared photo onto the tile at the box coordinates.
pub(crate) fn paste_photo(tile: &mut Pixmap, photo: &Pixmap, photo_box: &PhotoBox) {
    tile.draw_pixmap(
        photo_box.x,
        photo_box.y,
        photo.as_ref(),
        &PixmapPaint::default(),
        Transform::identity(),
        None,
    );
}
