//! Crash-safe container writing.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use log::warn;

use super::header::TiltHeader;
use crate::error::CommitError;
use crate::zip::ZipWriter;

/// On-disk representation chosen for a new container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SaveFormat {
    /// Single archive file with the 16-byte header.
    #[default]
    Zip,
    /// Plain directory of member files.
    Directory,
    /// Keep the directory form if the destination is already a
    /// directory, otherwise write an archive.
    Inherit,
}

/// Writes a new container version as atomically as the filesystem
/// allows.
///
/// Members are written to `<destination>_part`; `commit()` then swaps it
/// into place through `<destination>_previous`. Both swaps are single
/// renames, so at every instant the destination is either absent, the
/// complete previous container, or the complete new one - never partial.
///
/// Call `commit()` or `rollback()` when done; dropping an unfinished
/// writer rolls back. Both are idempotent after the first call.
///
/// Concurrent writers targeting the same destination are not coordinated
/// here; callers serialize saves to a given path.
pub struct TiltWriter {
    destination: PathBuf,
    temporary: PathBuf,
    zip: Option<ZipWriter<BufWriter<File>>>,
    finished: bool,
}

impl TiltWriter {
    /// Start a new write transaction. Any stale temporary artifact from
    /// a previous crashed run is destroyed first.
    pub fn new(path: impl Into<PathBuf>, format: SaveFormat) -> Result<Self> {
        let destination = path.into();
        let temporary = sibling(&destination, "_part");
        destroy(&temporary)?;

        let use_zip = match format {
            SaveFormat::Directory => false,
            SaveFormat::Inherit => !destination.is_dir(),
            SaveFormat::Zip => true,
        };

        let zip = if use_zip {
            if let Some(parent) = temporary.parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent)?;
                }
            }
            let mut out = BufWriter::new(File::create(&temporary)?);
            out.write_all(&TiltHeader::default().to_bytes())?;
            Some(ZipWriter::new(out))
        } else {
            fs::create_dir_all(&temporary)?;
            None
        };

        Ok(Self {
            destination,
            temporary,
            zip,
            finished: false,
        })
    }

    /// Write one member in full.
    pub fn write_member(&mut self, name: &str, data: &[u8]) -> Result<()> {
        if self.finished {
            bail!("writer already committed or rolled back");
        }
        match &mut self.zip {
            Some(zip) => zip.write_member(name, data),
            None => {
                let path = self.temporary.join(name);
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::write(path, data)?;
                Ok(())
            }
        }
    }

    /// A buffering `Write` handle for one member. The member is appended
    /// when `finish()` is called; a dropped handle writes nothing.
    pub fn member_writer(&mut self, name: &str) -> MemberWriter<'_> {
        MemberWriter {
            writer: self,
            name: name.to_string(),
            buf: Vec::new(),
        }
    }

    /// Publish the new container at the destination path.
    ///
    /// A failure before the destination is touched leaves the previous
    /// container intact and is safe to retry. A failure during the
    /// rename sequence leaves destination state undefined; inspect
    /// before retrying. No-op after the first commit or rollback.
    pub fn commit(&mut self) -> Result<(), CommitError> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;

        // Close the archive: flush the central directory and make the
        // temp file durable before any rename.
        if let Some(zip) = self.zip.take() {
            let closed = zip
                .finish()
                .map_err(|e| self.before(std::io::Error::other(e)))
                .and_then(|out| out.into_inner().map_err(|e| self.before(e.into_error())));
            let file = closed?;
            file.sync_all().map_err(|e| self.before(e))?;
        }

        let backup = sibling(&self.destination, "_previous");
        destroy(&backup).map_err(|e| self.before(e))?;

        // Don't destroy the previous version until the new one is in
        // place. A missing destination just means a first-ever save.
        match fs::rename(&self.destination, &backup) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(self.before(e)),
        }

        fs::rename(&self.temporary, &self.destination).map_err(|e| self.mid(e))?;
        destroy(&backup).map_err(|e| self.mid(e))?;
        Ok(())
    }

    fn before(&self, source: std::io::Error) -> CommitError {
        CommitError::BeforeRename {
            path: self.destination.clone(),
            source,
        }
    }

    fn mid(&self, source: std::io::Error) -> CommitError {
        CommitError::MidRename {
            path: self.destination.clone(),
            source,
        }
    }

    /// Destroy the temporary artifact and leave the destination
    /// untouched. No-op after the first commit or rollback.
    pub fn rollback(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        self.zip = None;
        if let Err(e) = destroy(&self.temporary) {
            warn!(
                "failed to remove temporary {}: {}",
                self.temporary.display(),
                e
            );
        }
    }
}

impl Drop for TiltWriter {
    fn drop(&mut self) {
        self.rollback();
    }
}

/// See [`TiltWriter::member_writer`].
pub struct MemberWriter<'a> {
    writer: &'a mut TiltWriter,
    name: String,
    buf: Vec<u8>,
}

impl MemberWriter<'_> {
    pub fn finish(self) -> Result<()> {
        self.writer.write_member(&self.name, &self.buf)
    }
}

impl Write for MemberWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

/// Delete a file or directory, clearing read-only bits first; saved
/// containers may have been marked read-only by the user. Missing paths
/// are fine.
pub fn destroy(path: &Path) -> std::io::Result<()> {
    let meta = match fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };
    if meta.is_dir() {
        unset_readonly_recursive(path)?;
        fs::remove_dir_all(path)
    } else {
        unset_readonly(path, meta)?;
        fs::remove_file(path)
    }
}

fn unset_readonly(path: &Path, meta: fs::Metadata) -> std::io::Result<()> {
    let mut perms = meta.permissions();
    if perms.readonly() {
        #[allow(clippy::permissions_set_readonly_false)]
        perms.set_readonly(false);
        fs::set_permissions(path, perms)?;
    }
    Ok(())
}

fn unset_readonly_recursive(dir: &Path) -> std::io::Result<()> {
    for item in fs::read_dir(dir)? {
        let item = item?;
        let meta = item.metadata()?;
        if meta.is_dir() {
            unset_readonly_recursive(&item.path())?;
        } else {
            unset_readonly(&item.path(), meta)?;
        }
    }
    Ok(())
}
