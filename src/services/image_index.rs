//! src/services/image_index.rs
//!
//! ImageIndex: process-wide cache of every image under the content root.
//! A recursive scan is expensive relative to a random pick, so the list is
//! kept for `cache_expiry` and rebuilt lazily. Any mutation of the content
//! root must call [`ImageIndex::invalidate`] before responding.

use crate::models::image::Image;
use parking_lot::Mutex;
use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, Instant},
};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Extensions (lowercase) that the index considers images.
pub const INDEXED_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "gif", "webp"];

struct CachedImages {
    images: Arc<Vec<Image>>,
    built_at: Instant,
}

#[derive(Default)]
struct CacheState {
    cached: Option<CachedImages>,
    /// Bumped on every invalidation so a scan that started before an
    /// invalidation never repopulates the cache with pre-mutation data.
    generation: u64,
}

pub struct ImageIndex {
    root: PathBuf,
    cache_expiry: Duration,
    state: Mutex<CacheState>,
}

impl ImageIndex {
    pub fn new(root: impl Into<PathBuf>, cache_expiry: Duration) -> Self {
        Self {
            root: root.into(),
            cache_expiry,
            state: Mutex::new(CacheState::default()),
        }
    }

    /// Return every indexed image, rescanning when the cache is stale,
    /// empty, or `force_refresh` is set.
    ///
    /// Scan failures degrade to an empty list; they are logged, never returned.
    pub async fn get_all_images(&self, force_refresh: bool) -> Arc<Vec<Image>> {
        let generation = {
            let state = self.state.lock();
            if !force_refresh {
                if let Some(cached) = &state.cached {
                    if cached.built_at.elapsed() < self.cache_expiry {
                        return cached.images.clone();
                    }
                }
            }
            state.generation
        };

        let root = self.root.clone();
        let images = match tokio::task::spawn_blocking(move || scan_images(&root)).await {
            Ok(images) => Arc::new(images),
            Err(err) => {
                warn!("image scan task failed: {}", err);
                Arc::new(Vec::new())
            }
        };

        let mut state = self.state.lock();
        if state.generation == generation {
            state.cached = Some(CachedImages {
                images: images.clone(),
                built_at: Instant::now(),
            });
            info!(count = images.len(), "image index rebuilt");
        } else {
            debug!("image index invalidated during scan; result not cached");
        }
        images
    }

    /// Drop the cached list so the next read rescans the content root.
    pub fn invalidate(&self) {
        let mut state = self.state.lock();
        state.cached = None;
        state.generation = state.generation.wrapping_add(1);
        debug!("image index invalidated");
    }
}

/// True when `name` carries one of the indexed image extensions.
pub fn is_indexed_image(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            INDEXED_EXTENSIONS
                .iter()
                .any(|candidate| candidate.eq_ignore_ascii_case(ext))
        })
        .unwrap_or(false)
}

/// Depth-first walk of `root` collecting image files.
///
/// Unreadable entries are skipped; an unreadable root yields an empty list.
pub fn scan_images(root: &Path) -> Vec<Image> {
    let mut images = Vec::new();
    for entry in WalkDir::new(root).min_depth(1) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!("skipping unreadable entry under {}: {}", root.display(), err);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if name.starts_with('.') || !is_indexed_image(&name) {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };
        if let Some(image) = Image::from_relative(relative) {
            images.push(image);
        }
    }
    images
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"not really an image").unwrap();
    }

    fn ids(images: &[Image]) -> Vec<String> {
        let mut ids: Vec<String> = images.iter().map(|i| i.id.clone()).collect();
        ids.sort();
        ids
    }

    #[test]
    fn scan_keeps_only_allow_listed_extensions() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "family/a.jpg");
        touch(dir.path(), "family/2023/b.JPEG");
        touch(dir.path(), "misc/c.webp");
        touch(dir.path(), "misc/notes.txt");
        touch(dir.path(), "misc/.tmp-upload.jpg");
        touch(dir.path(), "root.gif");

        let images = scan_images(dir.path());
        assert_eq!(
            ids(&images),
            vec!["family/2023/b.JPEG", "family/a.jpg", "misc/c.webp", "root.gif"]
        );
        let nested = images.iter().find(|i| i.id == "family/2023/b.JPEG").unwrap();
        assert_eq!(nested.folder, "family/2023");
    }

    #[test]
    fn missing_root_scans_as_empty() {
        let dir = TempDir::new().unwrap();
        assert!(scan_images(&dir.path().join("nope")).is_empty());
    }

    #[tokio::test]
    async fn cached_list_is_reused_until_invalidated() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "family/a.jpg");
        let index = ImageIndex::new(dir.path(), Duration::from_secs(60));

        assert_eq!(index.get_all_images(false).await.len(), 1);

        touch(dir.path(), "family/b.jpg");
        assert_eq!(index.get_all_images(false).await.len(), 1);

        index.invalidate();
        assert_eq!(index.get_all_images(false).await.len(), 2);
    }

    #[tokio::test]
    async fn force_refresh_and_expiry_rescan() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "a.jpg");

        let index = ImageIndex::new(dir.path(), Duration::from_secs(60));
        assert_eq!(index.get_all_images(false).await.len(), 1);
        touch(dir.path(), "b.jpg");
        assert_eq!(index.get_all_images(true).await.len(), 2);

        let expiring = ImageIndex::new(dir.path(), Duration::ZERO);
        assert_eq!(expiring.get_all_images(false).await.len(), 2);
        touch(dir.path(), "c.jpg");
        assert_eq!(expiring.get_all_images(false).await.len(), 3);
    }

    #[tokio::test]
    async fn deleted_file_disappears_after_invalidation() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "family/a.jpg");
        touch(dir.path(), "family/b.jpg");
        let index = ImageIndex::new(dir.path(), Duration::from_secs(60));
        assert_eq!(index.get_all_images(false).await.len(), 2);

        fs::remove_file(dir.path().join("family/a.jpg")).unwrap();
        index.invalidate();

        let images = index.get_all_images(false).await;
        assert!(images.iter().all(|i| i.id != "family/a.jpg"));
    }
}
