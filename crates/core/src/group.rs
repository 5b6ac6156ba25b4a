//! Image groups and group keys

use crate::error::{Result, StitchError};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::path::{Component, Path, PathBuf};

/// Smallest number of images that can be stitched
pub const MIN_GROUP_SIZE: usize = 2;

/// Largest number of images that fit the grid layouts
pub const MAX_GROUP_SIZE: usize = 6;

/// Extensions accepted as stitchable images (lowercase, no dot)
pub const SUPPORTED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "tiff", "bmp", "webp"];

/// Check whether a path has one of the supported image extensions
pub fn is_supported_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            SUPPORTED_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

/// A set of 2-6 images from one directory, stitched as a unit
///
/// Paths are held in placement order: case-insensitive filename order,
/// with the full path as a tie-breaker so the order is total.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageGroup {
    paths: Vec<PathBuf>,
    directory: PathBuf,
}

impl ImageGroup {
    /// Build a group, sorting the paths into placement order
    ///
    /// Fails with [`StitchError::InvalidGroupSize`] outside 2..=6.
    pub fn new(mut paths: Vec<PathBuf>) -> Result<Self> {
        if !(MIN_GROUP_SIZE..=MAX_GROUP_SIZE).contains(&paths.len()) {
            return Err(StitchError::InvalidGroupSize(paths.len()));
        }

        sort_by_file_name(&mut paths);
        let directory = paths[0]
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();

        Ok(Self { paths, directory })
    }

    /// Paths in placement order
    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// Directory of the alphabetically first image
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn into_paths(self) -> Vec<PathBuf> {
        self.paths
    }
}

/// Sort paths by lowercase file name, then by full path
pub fn sort_by_file_name(paths: &mut [PathBuf]) {
    paths.sort_by(|a, b| compare_file_names(a, b));
}

fn compare_file_names(a: &Path, b: &Path) -> Ordering {
    let name_a = lowercase_file_name(a);
    let name_b = lowercase_file_name(b);
    name_a.cmp(&name_b).then_with(|| a.cmp(b))
}

fn lowercase_file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

/// Canonical identity of a set of files, relative to a watch root
///
/// Relative paths are `/`-separated, sorted and joined with `|`, so the same
/// file set always yields the same key regardless of arrival order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupKey(String);

impl GroupKey {
    pub const SEPARATOR: char = '|';

    /// Derive the key for `paths` under `root`
    pub fn derive<P: AsRef<Path>>(root: &Path, paths: &[P]) -> Self {
        let mut relative: Vec<String> = paths
            .iter()
            .map(|p| relative_key_path(root, p.as_ref()))
            .collect();
        relative.sort();
        Self(relative.join(&Self::SEPARATOR.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Path relative to `root` with `/` separators
///
/// Paths outside the root keep their full form.
pub fn relative_key_path(root: &Path, path: &Path) -> String {
    match path.strip_prefix(root) {
        Ok(rel) => rel
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("/"),
        Err(_) => path.to_string_lossy().into_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supported_extensions_case_insensitive() {
        assert!(is_supported_image(Path::new("/a/b/photo.JPG")));
        assert!(is_supported_image(Path::new("scan.tiff")));
        assert!(is_supported_image(Path::new("x.WebP")));
        assert!(!is_supported_image(Path::new("notes.txt")));
        assert!(!is_supported_image(Path::new("raw.cr2")));
        assert!(!is_supported_image(Path::new("jpg")));
    }

    #[test]
    fn test_group_sorts_case_insensitively() {
        let group = ImageGroup::new(vec![
            PathBuf::from("/w/d/b.jpg"),
            PathBuf::from("/w/d/C.jpg"),
            PathBuf::from("/w/d/a.jpg"),
        ])
        .unwrap();

        let names: Vec<_> = group
            .paths()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.jpg", "b.jpg", "C.jpg"]);
        assert_eq!(group.directory(), Path::new("/w/d"));
        assert_eq!(group.len(), 3);
    }

    #[test]
    fn test_group_rejects_invalid_sizes() {
        let one = vec![PathBuf::from("/w/a.jpg")];
        assert!(matches!(
            ImageGroup::new(one),
            Err(StitchError::InvalidGroupSize(1))
        ));

        let seven: Vec<_> = (0..7).map(|i| PathBuf::from(format!("/w/{i}.jpg"))).collect();
        assert!(matches!(
            ImageGroup::new(seven),
            Err(StitchError::InvalidGroupSize(7))
        ));
    }

    #[test]
    fn test_group_key_is_order_independent() {
        let root = Path::new("/watch");
        let a = GroupKey::derive(root, &[
            PathBuf::from("/watch/trip/2.jpg"),
            PathBuf::from("/watch/trip/1.jpg"),
        ]);
        let b = GroupKey::derive(root, &[
            PathBuf::from("/watch/trip/1.jpg"),
            PathBuf::from("/watch/trip/2.jpg"),
        ]);

        assert_eq!(a, b);
        assert_eq!(a.as_str(), "trip/1.jpg|trip/2.jpg");
    }

    #[test]
    fn test_group_key_outside_root_keeps_full_path() {
        let key = GroupKey::derive(Path::new("/watch"), &[PathBuf::from("/elsewhere/x.png")]);
        assert_eq!(key.as_str(), "/elsewhere/x.png");
    }
}
