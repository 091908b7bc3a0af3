use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info};
use walkdir::{DirEntry, WalkDir};

/// Snapshot of every file and directory under the site root, taken once at
/// startup. Directories are stored with a trailing `/`.
#[derive(Debug, Default)]
pub struct PathIndex {
    entries: HashSet<String>,
}

impl PathIndex {
    pub fn build(root: &Path) -> Self {
        let mut entries = HashSet::new();

        for entry in WalkDir::new(root)
            .min_depth(1)
            .into_iter()
            .filter_entry(|e| !is_hidden(e))
            .filter_map(Result::ok)
        {
            let Ok(rel) = entry.path().strip_prefix(root) else {
                continue;
            };
            let mut key = rel.to_string_lossy().replace('\\', "/");
            if entry.file_type().is_dir() {
                key.push('/');
            } else if !entry.file_type().is_file() {
                continue;
            }
            entries.insert(key);
        }

        info!("indexed {} paths under {}", entries.len(), root.display());
        Self { entries }
    }

    /// A file at `path`, or a directory with or without the trailing slash.
    pub fn exists(&self, path: &str) -> bool {
        let key = normalize(path);
        self.entries.contains(key)
            || (!key.ends_with('/') && self.entries.contains(&format!("{key}/")))
    }

    pub fn is_dir(&self, path: &str) -> bool {
        let key = normalize(path);
        if key.ends_with('/') {
            self.entries.contains(key)
        } else {
            self.entries.contains(&format!("{key}/"))
        }
    }
}

/// Dot entries are private, except `.well-known` at the top of the site.
fn is_hidden(entry: &DirEntry) -> bool {
    if entry.depth() == 0 {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    name.starts_with('.') && !(entry.depth() == 1 && name == ".well-known")
}

/// Same rule as [`is_hidden`], applied to a relative path string.
fn is_hidden_path(path: &str) -> bool {
    path.split('/')
        .enumerate()
        .any(|(i, part)| part.starts_with('.') && !(i == 0 && part == ".well-known"))
}

fn normalize(path: &str) -> &str {
    path.trim_start_matches("./").trim_start_matches('/')
}

/// Existence checks answered from the startup snapshot or from the live
/// filesystem, depending on whether rendering is cached.
#[derive(Debug)]
pub enum PathLookup {
    Indexed(PathIndex),
    Live(PathBuf),
}

impl PathLookup {
    pub fn indexed(root: &Path) -> Self {
        PathLookup::Indexed(PathIndex::build(root))
    }

    pub fn live(root: &Path) -> Self {
        debug!("path lookups go to the filesystem under {}", root.display());
        PathLookup::Live(root.to_path_buf())
    }

    pub fn exists(&self, path: &str) -> bool {
        match self {
            PathLookup::Indexed(index) => index.exists(path),
            PathLookup::Live(root) => {
                let key = normalize(path);
                !is_hidden_path(key) && fs::metadata(root.join(key)).is_ok()
            }
        }
    }

    pub fn is_dir(&self, path: &str) -> bool {
        match self {
            PathLookup::Indexed(index) => index.is_dir(path),
            PathLookup::Live(root) => {
                let key = normalize(path);
                !is_hidden_path(key) && root.join(key).is_dir()
            }
        }
    }
}
