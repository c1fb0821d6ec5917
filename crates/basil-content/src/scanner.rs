//! Page discovery by filesystem walking.

use std::fs;
use std::path::{Path, PathBuf};

/// Reference to a discovered content file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PageRef {
    /// Page id, e.g. `/subdir/foo`.
    pub id: String,
    /// Path to the content file.
    pub path: PathBuf,
}

/// Discovers content files under a directory.
pub(crate) struct Scanner {
    content_dir: PathBuf,
    ext: String,
}

impl Scanner {
    /// Create a scanner for files ending in `ext` (with leading dot).
    pub fn new(content_dir: PathBuf, ext: String) -> Self {
        Self { content_dir, ext }
    }

    /// Walk the content directory.
    ///
    /// Entries are visited in name order so discovery order is stable.
    /// Returns an empty Vec if the directory doesn't exist.
    pub fn scan(&self) -> Vec<PageRef> {
        let mut refs = Vec::new();
        if self.content_dir.exists() {
            self.scan_directory(&self.content_dir, "", &mut refs);
        } else {
            tracing::warn!(dir = %self.content_dir.display(), "content directory does not exist");
        }
        refs
    }

    fn scan_directory(&self, dir_path: &Path, id_prefix: &str, refs: &mut Vec<PageRef>) {
        let Ok(entries) = fs::read_dir(dir_path) else {
            return;
        };

        let mut entries: Vec<_> = entries
            .filter_map(Result::ok)
            .map(|e| {
                let is_dir = e.file_type().is_ok_and(|t| t.is_dir());
                let name = e.file_name().to_string_lossy().into_owned();
                (e.path(), is_dir, name)
            })
            .collect();
        entries.sort_by(|a, b| a.2.cmp(&b.2));

        for (path, is_dir, name) in entries {
            if name.starts_with('.') {
                continue;
            }
            if is_dir {
                self.scan_directory(&path, &format!("{id_prefix}/{name}"), refs);
            } else if let Some(stem) = name.strip_suffix(&self.ext)
                && !stem.is_empty()
            {
                refs.push(PageRef {
                    id: format!("{id_prefix}/{stem}"),
                    path,
                });
            }
        }
    }
}
