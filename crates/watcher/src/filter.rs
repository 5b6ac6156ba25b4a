//! Path eligibility rules for watching and scanning
//!
//! A path is accepted only if it:
//! 1. Lives under the watch root, within the depth limit
//! 2. Has no dotfile/dot-directory component
//! 3. Is not under a `Processed` directory or the configured output folder
//! 4. Is not OS junk or matched by an extra gitignore-style pattern
//! 5. Has a supported image extension

use crate::{Result, WatchConfig};
use gridstitch_core::{is_supported_image, OUTPUT_DIR_NAME};
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use std::path::{Component, Path, PathBuf};

/// Ignore rules for one watch root
#[derive(Debug, Clone)]
pub struct PathFilter {
    /// Watch root directory
    root: PathBuf,

    /// Explicit output folder, excluded when it lies inside the root
    output_folder: Option<PathBuf>,

    /// Maximum directory nesting below the root
    max_depth: usize,

    /// Extra patterns from config (optional)
    extra: Option<Gitignore>,
}

impl PathFilter {
    /// Build the filter for `root`
    pub fn new(root: &Path, config: &WatchConfig) -> Result<Self> {
        let extra = if config.ignore_patterns.is_empty() {
            None
        } else {
            let mut builder = GitignoreBuilder::new(root);
            for pattern in &config.ignore_patterns {
                builder.add_line(None, pattern)?;
            }
            Some(builder.build()?)
        };

        Ok(Self {
            root: root.to_path_buf(),
            output_folder: config.output_folder.clone(),
            max_depth: config.max_depth,
            extra,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// True if a file at `path` may join a group
    pub fn accepts(&self, path: &Path) -> bool {
        if !is_supported_image(path) {
            return false;
        }

        let Ok(rel) = path.strip_prefix(&self.root) else {
            return false;
        };
        let parts = normal_parts(rel);
        if parts.is_empty() || parts.len() - 1 > self.max_depth {
            return false;
        }

        let (file_name, dirs) = match parts.split_last() {
            Some(split) => split,
            None => return false,
        };

        if parts.iter().any(|p| p.starts_with('.')) {
            return false;
        }
        if dirs.iter().any(|d| d.contains(OUTPUT_DIR_NAME)) {
            return false;
        }
        if is_os_junk(file_name) || self.in_output_folder(path) {
            return false;
        }

        !self.extra_ignored(rel, false)
    }

    /// True if a directory and everything under it should be skipped
    pub fn prunes_dir(&self, path: &Path) -> bool {
        if path == self.root {
            return false;
        }
        let Ok(rel) = path.strip_prefix(&self.root) else {
            return true;
        };
        let parts = normal_parts(rel);

        parts.len() > self.max_depth
            || parts
                .iter()
                .any(|p| p.starts_with('.') || p.contains(OUTPUT_DIR_NAME))
            || self.in_output_folder(path)
            || self.extra_ignored(rel, true)
    }

    fn in_output_folder(&self, path: &Path) -> bool {
        self.output_folder
            .as_deref()
            .map(|out| path.starts_with(out))
            .unwrap_or(false)
    }

    fn extra_ignored(&self, rel: &Path, is_dir: bool) -> bool {
        self.extra
            .as_ref()
            .map(|gi| gi.matched_path_or_any_parents(rel, is_dir).is_ignore())
            .unwrap_or(false)
    }
}

fn normal_parts(rel: &Path) -> Vec<String> {
    rel.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect()
}

/// Editor temp files and OS metadata that can carry image extensions
fn is_os_junk(file_name: &str) -> bool {
    file_name == "Thumbs.db"
        || file_name == "desktop.ini"
        || file_name.ends_with('~')
        || (file_name.starts_with('#') && file_name.ends_with('#'))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter(root: &str, config: WatchConfig) -> PathFilter {
        PathFilter::new(Path::new(root), &config).unwrap()
    }

    #[test]
    fn test_accepts_supported_images_under_root() {
        let f = filter("/watch", WatchConfig::default());

        assert!(f.accepts(Path::new("/watch/a.jpg")));
        assert!(f.accepts(Path::new("/watch/trip/day1/B.PNG")));
        assert!(!f.accepts(Path::new("/watch/notes.txt")));
        assert!(!f.accepts(Path::new("/elsewhere/a.jpg")));
    }

    #[test]
    fn test_rejects_dotfiles_and_dot_directories() {
        let f = filter("/watch", WatchConfig::default());

        assert!(!f.accepts(Path::new("/watch/.hidden.jpg")));
        assert!(!f.accepts(Path::new("/watch/._a.jpg")));
        assert!(!f.accepts(Path::new("/watch/.cache/a.jpg")));
        assert!(f.prunes_dir(Path::new("/watch/.git")));
    }

    #[test]
    fn test_rejects_output_marker_directories() {
        let f = filter("/watch", WatchConfig::default());

        assert!(!f.accepts(Path::new("/watch/trip/Processed/out.jpg")));
        assert!(!f.accepts(Path::new("/watch/Processed old/x.jpg")));
        assert!(f.prunes_dir(Path::new("/watch/trip/Processed")));
        // Only directories carry the marker
        assert!(f.accepts(Path::new("/watch/trip/Processed_note.jpg")));
        assert!(!f.prunes_dir(Path::new("/watch")));
    }

    #[test]
    fn test_marker_in_root_path_is_not_an_exclusion() {
        let f = filter("/home/me/Processed Photos", WatchConfig::default());
        assert!(f.accepts(Path::new("/home/me/Processed Photos/a.jpg")));
    }

    #[test]
    fn test_rejects_configured_output_folder() {
        let config = WatchConfig {
            output_folder: Some(PathBuf::from("/watch/composites")),
            ..WatchConfig::default()
        };
        let f = filter("/watch", config);

        assert!(!f.accepts(Path::new("/watch/composites/x_2images.jpg")));
        assert!(f.prunes_dir(Path::new("/watch/composites")));
        assert!(f.accepts(Path::new("/watch/other/a.jpg")));
    }

    #[test]
    fn test_depth_limit() {
        let config = WatchConfig {
            max_depth: 1,
            ..WatchConfig::default()
        };
        let f = filter("/watch", config);

        assert!(f.accepts(Path::new("/watch/a.jpg")));
        assert!(f.accepts(Path::new("/watch/one/a.jpg")));
        assert!(!f.accepts(Path::new("/watch/one/two/a.jpg")));
        assert!(f.prunes_dir(Path::new("/watch/one/two")));
    }

    #[test]
    fn test_extra_patterns() {
        let config = WatchConfig {
            ignore_patterns: vec!["*_thumb.jpg".to_string(), "drafts/".to_string()],
            ..WatchConfig::default()
        };
        let f = filter("/watch", config);

        assert!(!f.accepts(Path::new("/watch/x/a_thumb.jpg")));
        assert!(!f.accepts(Path::new("/watch/drafts/a.jpg")));
        assert!(f.prunes_dir(Path::new("/watch/drafts")));
        assert!(f.accepts(Path::new("/watch/x/a.jpg")));
    }

    #[test]
    fn test_os_junk() {
        let f = filter("/watch", WatchConfig::default());
        assert!(!f.accepts(Path::new("/watch/a.jpg~")));
        assert!(is_os_junk("Thumbs.db"));
        assert!(is_os_junk("#a.jpg#"));
    }
}
