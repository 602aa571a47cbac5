//! Media conventions shared by every backend: which keys are images, and how
//! Live Photo stills are paired with their motion sidecars.

use regex::Regex;
use std::collections::HashMap;

use crate::keys;
use crate::traits::StorageObject;

pub const SUPPORTED_IMAGE_FORMATS: &[&str] = &[
    "jpg", "jpeg", "png", "webp", "gif", "bmp", "tiff", "tif", "heic", "heif", "hif", "avif",
];

const LIVE_PHOTO_STILL_FORMATS: &[&str] = &["heic", "heif", "hif", "jpg", "jpeg", "png"];
const LIVE_PHOTO_VIDEO_FORMATS: &[&str] = &["mov", "mp4"];

pub fn is_image_key(key: &str) -> bool {
    keys::extension(key).is_some_and(|ext| SUPPORTED_IMAGE_FORMATS.contains(&ext.as_str()))
}

/// Image listing filter built from a backend's `excludeRegex` and `maxFileLimit`.
#[derive(Debug, Clone, Default)]
pub struct ImageFilter {
    exclude: Option<Regex>,
    max_file_limit: Option<u64>,
}

impl ImageFilter {
    /// An invalid exclude pattern is logged and ignored rather than failing the backend.
    pub fn new(exclude_regex: Option<&str>, max_file_limit: Option<u64>) -> Self {
        let exclude = exclude_regex.and_then(|pattern| match Regex::new(pattern) {
            Ok(regex) => Some(regex),
            Err(e) => {
                tracing::warn!(
                    pattern = %pattern,
                    error = %e,
                    "Ignoring invalid excludeRegex"
                );
                None
            }
        });
        Self {
            exclude,
            max_file_limit,
        }
    }

    pub fn apply(&self, objects: Vec<StorageObject>) -> Vec<StorageObject> {
        let images = objects.into_iter().filter(|object| {
            is_image_key(&object.key)
                && !self
                    .exclude
                    .as_ref()
                    .is_some_and(|regex| regex.is_match(&object.key))
        });

        match self.max_file_limit {
            Some(limit) => images.take(limit as usize).collect(),
            None => images.collect(),
        }
    }
}

/// Split a key into (directory, lowercased stem, lowercased extension).
fn live_photo_parts(key: &str) -> Option<(String, String, String)> {
    let ext = keys::extension(key)?;
    let (dir, file_name) = match key.rsplit_once('/') {
        Some((dir, file_name)) => (dir.to_string(), file_name),
        None => (String::new(), key),
    };
    let (stem, _) = file_name.rsplit_once('.')?;
    Some((dir, stem.to_lowercase(), ext))
}

/// Pair each still with the video in the same directory sharing its file stem.
/// The result is keyed by the still's key.
pub fn detect_live_photos(objects: &[StorageObject]) -> HashMap<String, StorageObject> {
    let mut videos: HashMap<(String, String), &StorageObject> = HashMap::new();
    for object in objects {
        if let Some((dir, stem, ext)) = live_photo_parts(&object.key) {
            if LIVE_PHOTO_VIDEO_FORMATS.contains(&ext.as_str()) {
                videos.entry((dir, stem)).or_insert(object);
            }
        }
    }

    let mut pairs = HashMap::new();
    if videos.is_empty() {
        return pairs;
    }

    for object in objects {
        if let Some((dir, stem, ext)) = live_photo_parts(&object.key) {
            if !LIVE_PHOTO_STILL_FORMATS.contains(&ext.as_str()) {
                continue;
            }
            if let Some(video) = videos.get(&(dir, stem)) {
                pairs.insert(object.key.clone(), (*video).clone());
            }
        }
    }

    pairs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn object(key: &str) -> StorageObject {
        StorageObject {
            key: key.to_string(),
            size: 1,
            last_modified: None,
            etag: None,
        }
    }

    #[test]
    fn image_keys_are_detected_by_extension() {
        assert!(is_image_key("a/b/IMG_0001.HEIC"));
        assert!(is_image_key("photo.jpg"));
        assert!(!is_image_key("clip.mov"));
        assert!(!is_image_key("README"));
    }

    #[test]
    fn filter_drops_non_images_and_excluded() {
        let filter = ImageFilter::new(Some("^drafts/"), None);
        let result = filter.apply(vec![
            object("a.jpg"),
            object("drafts/b.jpg"),
            object("c.mov"),
            object("d.png"),
        ]);
        let keys: Vec<_> = result.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, vec!["a.jpg", "d.png"]);
    }

    #[test]
    fn filter_respects_max_file_limit() {
        let filter = ImageFilter::new(None, Some(1));
        let result = filter.apply(vec![object("a.jpg"), object("b.jpg")]);
        assert_eq!(result.len(), 1);
    }

    #[test]
    fn invalid_exclude_regex_is_ignored() {
        let filter = ImageFilter::new(Some("(unclosed"), None);
        assert_eq!(filter.apply(vec![object("a.jpg")]).len(), 1);
    }

    #[test]
    fn pairs_still_with_video_sharing_stem() {
        let objects = vec![
            object("2024/IMG_0001.heic"),
            object("2024/IMG_0001.MOV"),
            object("2024/IMG_0002.jpg"),
            object("other/IMG_0002.mov"),
        ];
        let pairs = detect_live_photos(&objects);
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs["2024/IMG_0001.heic"].key, "2024/IMG_0001.MOV");
    }

    #[test]
    fn no_videos_means_no_pairs() {
        let pairs = detect_live_photos(&[object("a.jpg"), object("b.heic")]);
        assert!(pairs.is_empty());
    }
}
