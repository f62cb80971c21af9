//! Uniform read access to a sketch container.

use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use flate2::read::DeflateDecoder;
use log::{debug, warn};

use super::header;
use super::{FN_METADATA, FN_METADATA_LEGACY, FN_SKETCH, FN_THUMBNAIL};
use crate::io::{LocalFileReader, ReadAt, SubReader, read_all};
use crate::zip::{CompressionMethod, ZipFileEntry, ZipParser};

/// A sketch container opened for reading.
///
/// The representation is decided at construction: a path that has an
/// extension and is not a directory is treated as a single archive file,
/// anything else as a directory of plain member files. An archive's
/// central directory is scanned once, eagerly, into a case-insensitive
/// member map.
///
/// Every accessor degrades to `None` when the container is missing, the
/// member is absent, or the structural header failed validation; callers
/// treat that as "absent", never as fatal. Reasons are logged.
pub struct TiltFile {
    repr: Repr,
}

enum Repr {
    /// Path does not exist.
    Missing,
    /// Members are plain sibling files under this root.
    Directory(PathBuf),
    /// Archive with a validated header.
    Archive(Archive),
    /// File exists but its header or ZIP structure failed validation.
    Invalid,
}

struct Archive {
    /// Window over the source starting at the ZIP payload.
    zip: Arc<SubReader>,
    /// Every entry from the central directory, unscoped.
    all_entries: Arc<Vec<ZipFileEntry>>,
    /// Lowercased member name (relative to `subfolder`) -> entry index.
    entry_map: HashMap<String, usize>,
    /// Normalized prefix, empty or ending in '/'.
    subfolder: String,
}

impl TiltFile {
    /// Open a container at a filesystem path. Never errors; a missing or
    /// structurally invalid container yields an instance whose accessors
    /// all answer "absent".
    pub async fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let is_dir = path.is_dir();
        if !path.exists() {
            return Self { repr: Repr::Missing };
        }
        if path.extension().is_none() || is_dir {
            return Self {
                repr: Repr::Directory(path.to_path_buf()),
            };
        }

        let source: Arc<dyn ReadAt> = match LocalFileReader::new(path) {
            Ok(reader) => Arc::new(reader),
            Err(e) => {
                warn!("cannot open {}: {}", path.display(), e);
                return Self { repr: Repr::Invalid };
            }
        };
        match Self::from_reader(source).await {
            Ok(file) => file,
            Err(e) => {
                debug!("not a valid sketch archive {}: {}", path.display(), e);
                Self { repr: Repr::Invalid }
            }
        }
    }

    /// Open an archive container from any random access source, local or
    /// remote. Validates the header and scans the central directory; for
    /// an HTTP source that costs two small Range requests, no download.
    pub async fn from_reader(source: Arc<dyn ReadAt>) -> Result<Self> {
        let header = header::read_validated(source.as_ref()).await?;
        let zip = Arc::new(SubReader::from_offset(source, header.zip_offset()));

        let parser = ZipParser::new(zip.clone());
        let all_entries = Arc::new(parser.list_files().await?);

        let mut file = Self {
            repr: Repr::Archive(Archive {
                zip,
                all_entries,
                entry_map: HashMap::new(),
                subfolder: String::new(),
            }),
        };
        file.set_root_folder("");
        Ok(file)
    }

    /// True when this is a single-file archive rather than a directory.
    pub fn is_archive(&self) -> bool {
        matches!(self.repr, Repr::Archive(_))
    }

    /// Structural validity. Archives were header-checked at open time; a
    /// directory has no header, so the roughly equivalent check is that
    /// the three mandatory members are present.
    pub fn is_header_valid(&self) -> bool {
        match &self.repr {
            Repr::Archive(_) => true,
            Repr::Directory(root) => {
                root.join(FN_METADATA).is_file()
                    && root.join(FN_SKETCH).is_file()
                    && root.join(FN_THUMBNAIL).is_file()
            }
            _ => false,
        }
    }

    /// Rescope member lookups to entries under a path prefix. Supports
    /// archives that nest several logical sketches under subfolders.
    /// No-op for directory containers.
    pub fn set_root_folder(&mut self, subfolder: &str) {
        let Repr::Archive(archive) = &mut self.repr else {
            return;
        };
        let mut prefix = subfolder.replace('\\', "/");
        if !prefix.is_empty() && !prefix.ends_with('/') {
            prefix.push('/');
        }
        archive.entry_map.clear();
        for (i, entry) in archive.all_entries.iter().enumerate() {
            if let Some(scoped) = entry.file_name.strip_prefix(&prefix) {
                archive.entry_map.insert(scoped.to_lowercase(), i);
            }
        }
        archive.subfolder = prefix;
    }

    /// Whether a member exists, by map lookup or filesystem check.
    pub fn exists(&self, name: &str) -> bool {
        match &self.repr {
            Repr::Archive(archive) => archive.entry_map.contains_key(&name.to_lowercase()),
            Repr::Directory(root) => root.join(name).is_file(),
            _ => false,
        }
    }

    fn entry(&self, name: &str) -> Option<(&Archive, &ZipFileEntry)> {
        let Repr::Archive(archive) = &self.repr else {
            return None;
        };
        let idx = *archive.entry_map.get(&name.to_lowercase())?;
        Some((archive, &archive.all_entries[idx]))
    }

    /// Read a member's bytes, or `None` if the container or member is
    /// absent or unreadable.
    pub async fn read_member(&self, name: &str) -> Option<Vec<u8>> {
        match &self.repr {
            Repr::Archive(_) => {
                let (archive, entry) = self.entry(name)?;
                match self.archive_member_bytes(archive, entry).await {
                    Ok(bytes) => Some(bytes),
                    Err(e) => {
                        warn!("failed to read member {}: {}", name, e);
                        None
                    }
                }
            }
            Repr::Directory(root) => match tokio::fs::read(root.join(name)).await {
                Ok(bytes) => Some(bytes),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
                Err(e) => {
                    warn!("failed to read member {}: {}", name, e);
                    None
                }
            },
            _ => None,
        }
    }

    async fn archive_member_bytes(&self, archive: &Archive, entry: &ZipFileEntry) -> Result<Vec<u8>> {
        let parser = ZipParser::new(archive.zip.clone());
        let data_offset = parser.get_data_offset(entry).await?;
        match entry.compression_method {
            CompressionMethod::Stored => {
                let window = SubReader::new(archive.zip.clone(), data_offset, entry.compressed_size);
                read_all(&window).await
            }
            CompressionMethod::Deflate => {
                let window = SubReader::new(archive.zip.clone(), data_offset, entry.compressed_size);
                let compressed = read_all(&window).await?;
                let mut out = Vec::with_capacity(entry.uncompressed_size as usize);
                DeflateDecoder::new(&compressed[..]).read_to_end(&mut out)?;
                Ok(out)
            }
            CompressionMethod::Unknown(m) => {
                anyhow::bail!("unsupported compression method {}", m)
            }
        }
    }

    /// A random access window scoped to just one member's bytes, without
    /// copying. Stored members only; `None` otherwise, like every other
    /// absence here.
    pub async fn member_reader(&self, name: &str) -> Option<SubReader> {
        let (archive, entry) = self.entry(name)?;
        if entry.compression_method != CompressionMethod::Stored {
            debug!("member {} is compressed, no direct window", name);
            return None;
        }
        let parser = ZipParser::new(archive.zip.clone());
        match parser.get_data_offset(entry).await {
            Ok(offset) => Some(SubReader::new(
                archive.zip.clone(),
                offset,
                entry.compressed_size,
            )),
            Err(e) => {
                warn!("failed to locate member {}: {}", name, e);
                None
            }
        }
    }

    /// The metadata document's bytes: `metadata.json`, falling back to
    /// the pre-release `main.json` name for containers written before
    /// the rename.
    pub async fn metadata_bytes(&self) -> Option<Vec<u8>> {
        if let Some(bytes) = self.read_member(FN_METADATA).await {
            return Some(bytes);
        }
        self.read_member(FN_METADATA_LEGACY).await
    }

    /// Top-level child names under a prefix: derived from entry names for
    /// archives, real directory entries otherwise.
    pub async fn contents_at(&self, path: &str) -> Option<Vec<String>> {
        match &self.repr {
            Repr::Archive(archive) => {
                let mut prefix = path.replace('\\', "/");
                if !prefix.is_empty() && !prefix.ends_with('/') {
                    prefix.push('/');
                }
                let mut children: Vec<String> = Vec::new();
                for entry in archive.all_entries.iter() {
                    let Some(rest) = entry.file_name.strip_prefix(&prefix) else {
                        continue;
                    };
                    let child = rest.split('/').next().unwrap_or("");
                    if !child.is_empty() && !children.iter().any(|c| c == child) {
                        children.push(child.to_string());
                    }
                }
                Some(children)
            }
            Repr::Directory(root) => {
                let mut dir = tokio::fs::read_dir(root.join(path)).await.ok()?;
                let mut children = Vec::new();
                while let Ok(Some(item)) = dir.next_entry().await {
                    children.push(item.file_name().to_string_lossy().to_string());
                }
                Some(children)
            }
            _ => None,
        }
    }

    /// Raw central directory entries, for tooling that wants sizes and
    /// compression details. `None` for directory containers.
    pub fn archive_entries(&self) -> Option<&[ZipFileEntry]> {
        match &self.repr {
            Repr::Archive(archive) => Some(&archive.all_entries),
            _ => None,
        }
    }

    /// All member names visible under the current root folder.
    pub fn member_names(&self) -> Vec<String> {
        match &self.repr {
            Repr::Archive(archive) => {
                let mut names: Vec<String> = archive
                    .all_entries
                    .iter()
                    .filter(|e| !e.is_directory)
                    .filter_map(|e| e.file_name.strip_prefix(&archive.subfolder))
                    .map(|s| s.to_string())
                    .collect();
                names.sort();
                names
            }
            Repr::Directory(root) => {
                let mut names: Vec<String> = std::fs::read_dir(root)
                    .map(|dir| {
                        dir.filter_map(|e| e.ok())
                            .filter(|e| e.path().is_file())
                            .map(|e| e.file_name().to_string_lossy().to_string())
                            .collect()
                    })
                    .unwrap_or_default();
                names.sort();
                names
            }
            _ => Vec::new(),
        }
    }
}
