//! Local collaborators for the resolution tiers
//!
//! `StorageRoot` is the host's writable-data directory (read-only from our
//! side); `BundleAccessor` is the set of images shipped with the application.
//! Both are blocking and only ever called off the render thread.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use walkdir::WalkDir;

use super::locator::IMAGE_EXTENSIONS;

/// Read-only view of the host's storage directory
pub trait StorageRoot: Send + Sync {
    /// Directory all relative lookups are resolved against
    fn root(&self) -> &Path;

    /// Read a regular file under the root
    fn read(&self, relative: &Path) -> io::Result<Bytes>;

    /// Walk the root's subdirectories (not the root itself) and return the
    /// relative path of the first file whose name satisfies `matches`.
    ///
    /// At most `max_entries` directory entries are visited, down to
    /// `max_depth` levels below the root.
    fn find_in_subdirectories(
        &self,
        max_depth: usize,
        max_entries: usize,
        matches: &mut dyn FnMut(&str) -> bool,
    ) -> Option<PathBuf>;
}

/// Storage root backed by the local filesystem
#[derive(Debug, Clone)]
pub struct FsStorageRoot {
    root: PathBuf,
}

impl FsStorageRoot {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl StorageRoot for FsStorageRoot {
    fn root(&self) -> &Path {
        &self.root
    }

    fn read(&self, relative: &Path) -> io::Result<Bytes> {
        let path = self.root.join(relative);
        if !fs::metadata(&path)?.is_file() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is not a regular file", path.display()),
            ));
        }
        fs::read(&path).map(Bytes::from)
    }

    fn find_in_subdirectories(
        &self,
        max_depth: usize,
        max_entries: usize,
        matches: &mut dyn FnMut(&str) -> bool,
    ) -> Option<PathBuf> {
        // Depth 1 is the root's own entries; subdirectory contents start at 2
        if max_depth < 2 {
            return None;
        }

        WalkDir::new(&self.root)
            .min_depth(2)
            .max_depth(max_depth)
            .follow_links(false)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .take(max_entries)
            .filter(|entry| entry.file_type().is_file())
            .find(|entry| matches(&entry.file_name().to_string_lossy()))
            .and_then(|entry| {
                entry
                    .path()
                    .strip_prefix(&self.root)
                    .ok()
                    .map(Path::to_path_buf)
            })
    }
}

/// Images shipped with the application, looked up by extension-less name
pub trait BundleAccessor: Send + Sync {
    fn lookup(&self, stem: &str) -> Option<Bytes>;
}

/// Bundle with no assets
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyBundle;

impl BundleAccessor for EmptyBundle {
    fn lookup(&self, _stem: &str) -> Option<Bytes> {
        None
    }
}

/// Bundle stored as a flat directory of images
#[derive(Debug, Clone)]
pub struct DirectoryBundle {
    dir: PathBuf,
}

impl DirectoryBundle {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl BundleAccessor for DirectoryBundle {
    fn lookup(&self, stem: &str) -> Option<Bytes> {
        if stem.is_empty() {
            return None;
        }
        IMAGE_EXTENSIONS
            .iter()
            .flat_map(|ext| [ext.to_string(), ext.to_ascii_uppercase()])
            .map(|ext| self.dir.join(format!("{stem}.{ext}")))
            .find(|path| path.is_file())
            .and_then(|path| fs::read(path).ok())
            .map(Bytes::from)
    }
}

/// Bundle held in memory, keyed case-insensitively by stem
#[derive(Debug, Clone, Default)]
pub struct EmbeddedBundle {
    assets: HashMap<String, Bytes>,
}

impl EmbeddedBundle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_asset(mut self, stem: &str, bytes: impl Into<Bytes>) -> Self {
        self.insert(stem, bytes);
        self
    }

    pub fn insert(&mut self, stem: &str, bytes: impl Into<Bytes>) {
        self.assets.insert(stem.to_ascii_lowercase(), bytes.into());
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }
}

impl BundleAccessor for EmbeddedBundle {
    fn lookup(&self, stem: &str) -> Option<Bytes> {
        self.assets.get(&stem.to_ascii_lowercase()).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fs_read_rejects_directories() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("rooms")).unwrap();
        fs::write(dir.path().join("a.jpg"), b"abc").unwrap();

        let storage = FsStorageRoot::new(dir.path());
        assert_eq!(storage.read(Path::new("a.jpg")).unwrap(), Bytes::from_static(b"abc"));
        assert!(storage.read(Path::new("rooms")).is_err());
        assert!(storage.read(Path::new("missing.jpg")).is_err());
    }

    #[test]
    fn test_scan_skips_root_level_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("kitchen.jpg"), b"root").unwrap();
        fs::create_dir_all(dir.path().join("a/b")).unwrap();
        fs::write(dir.path().join("a/b/kitchen_v2.jpg"), b"nested").unwrap();

        let storage = FsStorageRoot::new(dir.path());
        let found = storage.find_in_subdirectories(6, 100, &mut |name| name.contains("kitchen"));
        assert_eq!(found, Some(PathBuf::from("a/b/kitchen_v2.jpg")));
    }

    #[test]
    fn test_scan_respects_depth_bound() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("a/b/c/d")).unwrap();
        fs::write(dir.path().join("a/b/c/d/deep.jpg"), b"x").unwrap();

        let storage = FsStorageRoot::new(dir.path());
        assert!(storage
            .find_in_subdirectories(3, 100, &mut |name| name == "deep.jpg")
            .is_none());
        assert!(storage
            .find_in_subdirectories(5, 100, &mut |name| name == "deep.jpg")
            .is_some());
    }

    #[test]
    fn test_directory_bundle_probes_known_extensions() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("sample_room.png"), b"png").unwrap();

        let bundle = DirectoryBundle::new(dir.path());
        assert_eq!(bundle.lookup("sample_room"), Some(Bytes::from_static(b"png")));
        assert_eq!(bundle.lookup("other"), None);
        assert_eq!(bundle.lookup(""), None);
    }

    #[test]
    fn test_embedded_bundle_is_case_insensitive() {
        let bundle = EmbeddedBundle::new().with_asset("Lobby", Bytes::from_static(b"x"));
        assert!(bundle.lookup("lobby").is_some());
        assert!(bundle.lookup("LOBBY").is_some());
        assert_eq!(bundle.len(), 1);
    }
}
