//! Folder management and the slideshow folder tree.

use crate::services::{
    image_index::{ImageIndex, is_indexed_image},
    image_service::{ImageError, render_thumbnail},
    paths::{self, UPLOADS_URL_PREFIX},
};
use parking_lot::Mutex;
use serde::Serialize;
use std::{
    collections::{BTreeMap, HashMap},
    io,
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, Instant},
};
use thiserror::Error;
use tokio::{fs, task};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

const THUMBNAIL_CACHE_TTL: Duration = Duration::from_secs(3600);

#[derive(Debug, Error)]
pub enum FolderError {
    #[error("Folder not found")]
    NotFound(String),
    #[error("Folder already exists")]
    AlreadyExists(String),
    #[error("Invalid folder path")]
    InvalidPath,
    #[error("No thumbnail available for folder")]
    NoThumbnail(String),
    #[error(transparent)]
    Image(#[from] ImageError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type FolderResult<T> = Result<T, FolderError>;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FolderEntry {
    pub name: String,
    pub path: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    pub name: String,
    pub path: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderListing {
    pub current_path: String,
    pub folders: Vec<FolderEntry>,
    pub files: Vec<FileEntry>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FolderSummary {
    pub name: String,
    pub path: String,
    pub parent_path: String,
    /// Images in this folder and all of its descendants.
    pub image_count: usize,
}

#[derive(Clone)]
pub struct FolderService {
    root: PathBuf,
    index: Arc<ImageIndex>,
    thumbnails: Arc<Mutex<HashMap<String, (Instant, Arc<Vec<u8>>)>>>,
}

impl FolderService {
    pub fn new(root: impl Into<PathBuf>, index: Arc<ImageIndex>) -> Self {
        Self {
            root: root.into(),
            index,
            thumbnails: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn resolve_dir(&self, reference: &str) -> FolderResult<(String, PathBuf)> {
        let relative = paths::normalize_reference(reference);
        let path = paths::resolve(&self.root, relative).ok_or(FolderError::InvalidPath)?;
        Ok((relative.to_string(), path))
    }

    /// Create the content root and the given top-level folders.
    pub async fn ensure_folders(&self, folders: &[String]) -> FolderResult<()> {
        fs::create_dir_all(&self.root).await?;
        for folder in folders {
            let (_, path) = self.resolve_dir(folder)?;
            fs::create_dir_all(&path).await?;
        }
        Ok(())
    }

    /// Immediate subfolders and images of `reference`, sorted by name.
    pub async fn list(&self, reference: &str) -> FolderResult<FolderListing> {
        let (relative, dir) = self.resolve_dir(reference)?;
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(FolderError::NotFound(relative));
            }
            Err(err) => return Err(FolderError::Io(err)),
        };

        let mut folders = Vec::new();
        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') {
                continue;
            }
            let path = join_relative(&relative, &name);
            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                folders.push(FolderEntry { name, path });
            } else if file_type.is_file() && is_indexed_image(&name) {
                files.push(FileEntry {
                    url: format!("{}{}", UPLOADS_URL_PREFIX, paths::encode_path(&path)),
                    name,
                    path,
                });
            }
        }
        folders.sort_by(|a, b| a.name.cmp(&b.name));
        files.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(FolderListing {
            current_path: relative,
            folders,
            files,
        })
    }

    pub async fn create(&self, parent: &str, name: &str) -> FolderResult<FolderEntry> {
        let name = name.trim();
        if !paths::is_safe_segment(name) {
            return Err(FolderError::InvalidPath);
        }
        let (parent_relative, parent_dir) = self.resolve_dir(parent)?;
        if !fs::metadata(&parent_dir).await.map(|m| m.is_dir()).unwrap_or(false) {
            return Err(FolderError::NotFound(parent_relative));
        }

        let relative = join_relative(&parent_relative, name);
        let path = parent_dir.join(name);
        match fs::create_dir(&path).await {
            Ok(()) => {
                info!(folder = %relative, "created folder");
                Ok(FolderEntry {
                    name: name.to_string(),
                    path: relative,
                })
            }
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                Err(FolderError::AlreadyExists(relative))
            }
            Err(err) => Err(FolderError::Io(err)),
        }
    }

    /// Remove a folder and everything in it. The content root itself can
    /// not be deleted.
    pub async fn delete(&self, reference: &str) -> FolderResult<String> {
        let (relative, path) = self.resolve_dir(reference)?;
        if relative.is_empty() {
            return Err(FolderError::InvalidPath);
        }
        match fs::metadata(&path).await {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => return Err(FolderError::NotFound(relative)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(FolderError::NotFound(relative));
            }
            Err(err) => return Err(FolderError::Io(err)),
        }

        fs::remove_dir_all(&path).await?;
        self.index.invalidate();
        self.thumbnails
            .lock()
            .retain(|key, _| !crate::services::access_control::folder_in_scope(key, &relative));
        info!(folder = %relative, "deleted folder");
        Ok(relative)
    }

    /// Every folder under the content root with its recursive image count.
    pub async fn structure(&self) -> Vec<FolderSummary> {
        let images = self.index.get_all_images(false).await;
        let root = self.root.clone();
        let dirs = task::spawn_blocking(move || list_directories(&root))
            .await
            .unwrap_or_else(|err| {
                warn!("folder walk task failed: {}", err);
                Vec::new()
            });

        let mut counts: BTreeMap<String, usize> = dirs.into_iter().map(|d| (d, 0)).collect();
        for image in images.iter() {
            let mut folder = image.folder.as_str();
            loop {
                if let Some(count) = counts.get_mut(folder) {
                    *count += 1;
                }
                match folder.rfind('/') {
                    Some(pos) => folder = &folder[..pos],
                    None if !folder.is_empty() => folder = "",
                    None => break,
                }
            }
        }

        counts
            .into_iter()
            .map(|(path, image_count)| {
                let (parent_path, name) = match path.rfind('/') {
                    Some(pos) => (path[..pos].to_string(), path[pos + 1..].to_string()),
                    None => (String::new(), path.clone()),
                };
                FolderSummary {
                    name,
                    path,
                    parent_path,
                    image_count,
                }
            })
            .collect()
    }

    /// Thumbnail of the first image in a folder, cached for an hour.
    pub async fn thumbnail(&self, reference: &str) -> FolderResult<Arc<Vec<u8>>> {
        let (relative, dir) = self.resolve_dir(reference)?;

        if let Some((built, bytes)) = self.thumbnails.lock().get(&relative) {
            if built.elapsed() < THUMBNAIL_CACHE_TTL {
                return Ok(bytes.clone());
            }
        }

        let bytes = task::spawn_blocking(move || -> FolderResult<Option<Vec<u8>>> {
            match first_image(&dir) {
                Some(path) => Ok(Some(render_thumbnail(&path)?)),
                None => Ok(None),
            }
        })
        .await
        .map_err(io::Error::other)??;

        let Some(bytes) = bytes else {
            return Err(FolderError::NoThumbnail(relative));
        };
        let bytes = Arc::new(bytes);
        self.thumbnails
            .lock()
            .insert(relative.clone(), (Instant::now(), bytes.clone()));
        debug!(folder = %relative, "cached folder thumbnail");
        Ok(bytes)
    }
}

fn join_relative(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", parent, name)
    }
}

/// `/`-separated relative paths of the root and every directory below it.
fn list_directories(root: &Path) -> Vec<String> {
    let mut dirs = Vec::new();
    for entry in WalkDir::new(root).into_iter().filter_map(Result::ok) {
        if !entry.file_type().is_dir() {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };
        let parts: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        if parts.iter().any(|p| p.starts_with('.')) {
            continue;
        }
        dirs.push(parts.join("/"));
    }
    dirs
}

/// First image directly in `dir` (by name), else the first found in its
/// subfolders, depth-first.
pub fn first_image(dir: &Path) -> Option<PathBuf> {
    let mut entries: Vec<_> = std::fs::read_dir(dir).ok()?.filter_map(Result::ok).collect();
    entries.sort_by_key(|e| e.file_name());

    for entry in &entries {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if !name.starts_with('.')
            && entry.file_type().map(|t| t.is_file()).unwrap_or(false)
            && is_indexed_image(&name)
        {
            return Some(entry.path());
        }
    }
    entries
        .iter()
        .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .find_map(|e| first_image(&e.path()))
}
