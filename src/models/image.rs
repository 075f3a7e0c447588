//! Represents an image file discovered under the content root.

use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};

/// A single media file under the content root.
///
/// The `id` doubles as the filesystem lookup key and the anti-repeat
/// tracking key, so it is always normalized to `/` separators.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Image {
    /// Path relative to the content root, `/`-separated.
    pub id: String,

    /// Same path with platform-native separators.
    pub relative_path: PathBuf,

    /// Parent directory relative to the content root, `/`-separated.
    /// Images stored directly in the root have an empty folder.
    pub folder: String,
}

impl Image {
    /// Build an image record from a path relative to the content root.
    ///
    /// Returns `None` for paths that are empty or escape the root.
    pub fn from_relative(relative: &Path) -> Option<Self> {
        let mut parts = Vec::new();
        for component in relative.components() {
            match component {
                Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
                Component::CurDir => {}
                _ => return None,
            }
        }
        let (_, parents) = parts.split_last()?;

        Some(Self {
            id: parts.join("/"),
            relative_path: relative.to_path_buf(),
            folder: parents.join("/"),
        })
    }

    /// File name component of the image.
    pub fn filename(&self) -> &str {
        self.id.rsplit('/').next().unwrap_or(&self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_path_splits_into_id_and_folder() {
        let image = Image::from_relative(Path::new("family/2023/b.jpg")).unwrap();
        assert_eq!(image.id, "family/2023/b.jpg");
        assert_eq!(image.folder, "family/2023");
        assert_eq!(image.filename(), "b.jpg");
    }

    #[test]
    fn root_level_image_has_empty_folder() {
        let image = Image::from_relative(Path::new("a.png")).unwrap();
        assert_eq!(image.id, "a.png");
        assert_eq!(image.folder, "");
    }

    #[test]
    fn escaping_paths_are_rejected() {
        assert!(Image::from_relative(Path::new("../x.jpg")).is_none());
        assert!(Image::from_relative(Path::new("")).is_none());
    }
}
