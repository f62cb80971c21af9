//! Filesystem-backed resources and collections.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use log::debug;
use tokio::sync::watch;

use super::{CollectionItem, Resource, ResourceCollection, ResourceCursor};
use crate::io::{LocalFileReader, ReadAt};
use crate::tilt::{FN_THUMBNAIL, TiltFile};

/// A sketch container on the local filesystem.
pub struct FileResource {
    path: PathBuf,
    name: String,
    uri: String,
}

impl FileResource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        let uri = format!("file://{}", path.display());
        Self { path, name, uri }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl Resource for FileResource {
    fn name(&self) -> &str {
        &self.name
    }

    fn uri(&self) -> &str {
        &self.uri
    }

    /// Local containers carry their preview inside: the thumbnail
    /// member.
    async fn load_preview(&self) -> Result<Option<Vec<u8>>> {
        let tilt = TiltFile::open(&self.path).await;
        Ok(tilt.read_member(FN_THUMBNAIL).await)
    }

    async fn open(&self) -> Result<Arc<dyn ReadAt>> {
        Ok(Arc::new(LocalFileReader::new(&self.path)?))
    }
}

/// A directory of sketch containers.
///
/// Traversal yields `.tilt` entries (files or container directories) as
/// sketches and other subdirectories as nested collections. Dot-prefixed
/// entries are skipped.
pub struct FileCollection {
    root: PathBuf,
    name: String,
    uri: String,
    changed: watch::Sender<u64>,
}

impl FileCollection {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let name = root
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        let uri = format!("file://{}", root.display());
        Self {
            root,
            name,
            uri,
            changed: watch::Sender::new(0),
        }
    }
}

#[async_trait]
impl ResourceCollection for FileCollection {
    fn name(&self) -> &str {
        &self.name
    }

    fn uri(&self) -> &str {
        &self.uri
    }

    fn contents(&self) -> Box<dyn ResourceCursor> {
        Box::new(FileCursor {
            root: self.root.clone(),
            entries: None,
        })
    }

    fn refresh(&self) {
        // Nothing cached here; cursors snapshot the directory when they
        // start. Tell observers to re-enumerate.
        self.changed.send_modify(|v| *v += 1);
    }

    fn changed(&self) -> watch::Receiver<u64> {
        self.changed.subscribe()
    }
}

struct FileCursor {
    root: PathBuf,
    /// Sorted snapshot, taken on first advance; drained front to back.
    entries: Option<std::vec::IntoIter<PathBuf>>,
}

impl FileCursor {
    async fn snapshot(root: &Path) -> Vec<PathBuf> {
        let mut paths = Vec::new();
        match tokio::fs::read_dir(root).await {
            Ok(mut dir) => {
                while let Ok(Some(item)) = dir.next_entry().await {
                    let file_name = item.file_name();
                    let name = file_name.to_string_lossy();
                    if name.starts_with('.') {
                        continue;
                    }
                    paths.push(item.path());
                }
            }
            Err(e) => debug!("cannot enumerate {}: {}", root.display(), e),
        }
        paths.sort();
        paths
    }
}

#[async_trait]
impl ResourceCursor for FileCursor {
    async fn next(&mut self) -> Option<CollectionItem> {
        if self.entries.is_none() {
            self.entries = Some(Self::snapshot(&self.root).await.into_iter());
        }
        let entries = self.entries.as_mut().unwrap();

        for path in entries.by_ref() {
            let is_tilt = path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("tilt"));
            if is_tilt {
                return Some(CollectionItem::Sketch(Arc::new(FileResource::new(path))));
            }
            if path.is_dir() {
                return Some(CollectionItem::Folder(Arc::new(FileCollection::new(path))));
            }
            // Not a sketch, not a folder: skip and keep going.
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn collect(cursor: &mut dyn ResourceCursor) -> (Vec<String>, usize) {
        let mut sketches = Vec::new();
        let mut folders = 0;
        while let Some(item) = cursor.next().await {
            match item {
                CollectionItem::Sketch(r) => sketches.push(r.name().to_string()),
                CollectionItem::Folder(_) => folders += 1,
            }
        }
        (sketches, folders)
    }

    #[tokio::test]
    async fn yields_sketches_and_folders_skipping_dot_entries() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.tilt"), b"x").unwrap();
        std::fs::write(dir.path().join("a.tilt"), b"x").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"x").unwrap();
        std::fs::write(dir.path().join(".hidden.tilt"), b"x").unwrap();
        std::fs::create_dir(dir.path().join("more")).unwrap();
        std::fs::create_dir(dir.path().join(".git")).unwrap();

        let collection = FileCollection::new(dir.path());
        let mut cursor = collection.contents();
        let (sketches, folders) = collect(cursor.as_mut()).await;

        assert_eq!(sketches, vec!["a", "b"]);
        assert_eq!(folders, 1);
    }

    #[tokio::test]
    async fn independent_traversals() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("one.tilt"), b"x").unwrap();

        let collection = FileCollection::new(dir.path());
        let (first, _) = collect(collection.contents().as_mut()).await;
        let (second, _) = collect(collection.contents().as_mut()).await;
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn missing_directory_is_empty_not_fatal() {
        let collection = FileCollection::new("/no/such/dir");
        let mut cursor = collection.contents();
        assert!(cursor.next().await.is_none());
    }
}
