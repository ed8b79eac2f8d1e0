//! Loaded sample images with operator-assigned target counts.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::GrayImage;

/// Target count given to every newly loaded image.
pub const DEFAULT_TARGET: i64 = 3;

const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

#[derive(Debug, thiserror::Error)]
pub enum ImageSetError {
    #[error("failed to read directory {path}: {source}")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("no readable images in {0}")]
    NoImages(PathBuf),
    #[error("image index {index} out of range ({len} images)")]
    IndexOutOfRange { index: usize, len: usize },
}

/// One sample image.
#[derive(Debug, Clone)]
pub struct ImageRecord {
    pub filename: String,
    /// Source path, when loaded from disk.
    pub path: Option<PathBuf>,
    pixels: Arc<GrayImage>,
    /// Human-labeled expected count. May be negative only through direct
    /// assignment; optimization refuses to start in that case.
    pub target: i64,
    /// Count from the most recent detection run.
    pub last_detected: Option<usize>,
}

impl ImageRecord {
    pub fn new(filename: impl Into<String>, pixels: GrayImage, target: i64) -> Self {
        Self {
            filename: filename.into(),
            path: None,
            pixels: Arc::new(pixels),
            target,
            last_detected: None,
        }
    }

    pub fn pixels(&self) -> &GrayImage {
        &self.pixels
    }

    /// Shared handle to the pixel buffer.
    pub fn shared_pixels(&self) -> Arc<GrayImage> {
        Arc::clone(&self.pixels)
    }
}

/// Ordered image set with a current-image cursor.
#[derive(Debug, Clone, Default)]
pub struct ImageSet {
    records: Vec<ImageRecord>,
    current: usize,
}

/// List `.jpg`/`.jpeg`/`.png` files (any case) in `dir`, deduplicated by
/// canonical path and sorted by file name.
pub fn list_image_files(dir: &Path) -> Result<Vec<PathBuf>, ImageSetError> {
    let entries = std::fs::read_dir(dir).map_err(|source| ImageSetError::ReadDir {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut seen = BTreeSet::new();
    let mut files = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() || !has_image_extension(&path, &IMAGE_EXTENSIONS) {
            continue;
        }
        let canonical = path.canonicalize().unwrap_or_else(|_| path.clone());
        if seen.insert(canonical) {
            files.push(path);
        }
    }
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

pub(crate) fn has_image_extension(path: &Path, allowed: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| allowed.iter().any(|a| a.eq_ignore_ascii_case(e)))
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

impl ImageSet {
    pub fn new(records: Vec<ImageRecord>) -> Self {
        Self {
            records,
            current: 0,
        }
    }

    /// Load every readable image in `dir` as grayscale.
    ///
    /// Unreadable files are skipped with a warning. Fails with
    /// [`ImageSetError::NoImages`] when nothing could be loaded.
    pub fn load_dir(dir: &Path, default_target: i64) -> Result<Self, ImageSetError> {
        let mut records = Vec::new();
        for path in list_image_files(dir)? {
            match image::open(&path) {
                Ok(img) => {
                    let mut rec =
                        ImageRecord::new(file_name_of(&path), img.to_luma8(), default_target);
                    rec.path = Some(path);
                    records.push(rec);
                }
                Err(e) => tracing::warn!("skipping {}: {}", path.display(), e),
            }
        }
        if records.is_empty() {
            return Err(ImageSetError::NoImages(dir.to_path_buf()));
        }
        tracing::info!("loaded {} images from {}", records.len(), dir.display());
        Ok(Self::new(records))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[ImageRecord] {
        &self.records
    }

    pub fn get(&self, index: usize) -> Option<&ImageRecord> {
        self.records.get(index)
    }

    fn check_index(&self, index: usize) -> Result<(), ImageSetError> {
        if index < self.records.len() {
            Ok(())
        } else {
            Err(ImageSetError::IndexOutOfRange {
                index,
                len: self.records.len(),
            })
        }
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn current(&self) -> Option<&ImageRecord> {
        self.records.get(self.current)
    }

    pub fn select(&mut self, index: usize) -> Result<(), ImageSetError> {
        self.check_index(index)?;
        self.current = index;
        Ok(())
    }

    /// Advance the cursor, wrapping to the first image.
    pub fn next(&mut self) -> usize {
        if !self.records.is_empty() {
            self.current = (self.current + 1) % self.records.len();
        }
        self.current
    }

    /// Move the cursor back, wrapping to the last image.
    pub fn prev(&mut self) -> usize {
        if !self.records.is_empty() {
            self.current = (self.current + self.records.len() - 1) % self.records.len();
        }
        self.current
    }

    pub fn set_target(&mut self, index: usize, target: i64) -> Result<(), ImageSetError> {
        self.check_index(index)?;
        self.records[index].target = target;
        Ok(())
    }

    pub fn set_all_targets(&mut self, target: i64) {
        for r in &mut self.records {
            r.target = target;
        }
    }

    /// Set the target of the image whose file name matches `filename`.
    pub fn set_target_by_name(&mut self, filename: &str, target: i64) -> bool {
        match self.records.iter_mut().find(|r| r.filename == filename) {
            Some(r) => {
                r.target = target;
                true
            }
            None => false,
        }
    }

    pub(crate) fn record_detection(&mut self, index: usize, count: usize) {
        if let Some(r) = self.records.get_mut(index) {
            r.last_detected = Some(count);
        }
    }

    pub fn targets(&self) -> Vec<i64> {
        self.records.iter().map(|r| r.target).collect()
    }

    /// First image whose target count is negative, in load order.
    pub fn first_negative_target(&self) -> Option<&ImageRecord> {
        self.records.iter().find(|r| r.target < 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn tiny(v: u8) -> GrayImage {
        GrayImage::from_pixel(4, 3, Luma([v]))
    }

    #[test]
    fn loads_supported_files_sorted_by_name() {
        let dir = tempfile::tempdir().expect("tempdir");
        tiny(10).save(dir.path().join("b.PNG")).expect("save");
        tiny(20).save(dir.path().join("a.png")).expect("save");
        tiny(30).save(dir.path().join("c.jpg")).expect("save");
        std::fs::write(dir.path().join("notes.txt"), "x").expect("write");
        std::fs::write(dir.path().join("broken.jpeg"), "not an image").expect("write");

        let set = ImageSet::load_dir(dir.path(), DEFAULT_TARGET).expect("load");
        let names: Vec<&str> = set.records().iter().map(|r| r.filename.as_str()).collect();
        assert_eq!(names, vec!["a.png", "b.PNG", "c.jpg"]);
        assert!(set.records().iter().all(|r| r.target == 3));
        assert_eq!(set.get(0).unwrap().pixels().get_pixel(0, 0)[0], 20);
    }

    #[test]
    fn empty_directory_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("readme.md"), "x").expect("write");
        assert!(matches!(
            ImageSet::load_dir(dir.path(), DEFAULT_TARGET),
            Err(ImageSetError::NoImages(_))
        ));
    }

    #[test]
    fn navigation_wraps_around() {
        let mut set = ImageSet::new(vec![
            ImageRecord::new("a", tiny(0), 1),
            ImageRecord::new("b", tiny(0), 1),
            ImageRecord::new("c", tiny(0), 1),
        ]);
        assert_eq!(set.prev(), 2);
        assert_eq!(set.next(), 0);
        assert_eq!(set.next(), 1);
        set.select(2).expect("in range");
        assert_eq!(set.next(), 0);
        assert!(matches!(
            set.select(3),
            Err(ImageSetError::IndexOutOfRange { index: 3, len: 3 })
        ));
    }

    #[test]
    fn targets_can_be_set_individually_and_together() {
        let mut set = ImageSet::new(vec![
            ImageRecord::new("a", tiny(0), 3),
            ImageRecord::new("b", tiny(0), 3),
        ]);
        set.set_target(1, 5).expect("in range");
        assert_eq!(set.targets(), vec![3, 5]);
        assert!(set.first_negative_target().is_none());
        set.set_all_targets(-1);
        assert_eq!(set.first_negative_target().map(|r| r.filename.as_str()), Some("a"));
        assert!(set.set_target_by_name("a", 2));
        assert!(!set.set_target_by_name("zzz", 2));
        assert_eq!(set.targets(), vec![2, -1]);
    }
}
