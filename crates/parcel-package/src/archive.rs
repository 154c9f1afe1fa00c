//! Archive container access.
//!
//! Opens tar containers (optionally gzip-compressed, detected from the magic
//! bytes), locates entries by name, and materialises nested archive entries
//! into scoped temporary files. Temporary storage is owned by the handle that
//! created it and is removed when that handle is dropped, on every exit path.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use tempfile::TempPath;

use crate::ValidationError;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// An open handle over an archive container.
///
/// For nested archives extracted out of a parent, the handle owns the backing
/// temporary file; dropping the handle deletes it.
#[derive(Debug)]
pub struct ArchiveHandle {
    path: PathBuf,
    /// Archive identity reported in error details: the filesystem path for a
    /// root archive, the entry name inside the parent for a nested one.
    name: String,
    gzip: bool,
    _temp: Option<TempPath>,
}

impl ArchiveHandle {
    /// Opens the archive at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::ArchiveNotFound`] when the path does not
    /// exist or cannot be read.
    pub fn open(path: &Path) -> crate::Result<Self> {
        let name = path.display().to_string();
        let gzip = sniff_gzip(path).map_err(|_| ValidationError::ArchiveNotFound {
            archive: name.clone(),
            target_archive: None,
        })?;
        log::debug!("opened archive '{}' (gzip: {})", name, gzip);

        Ok(ArchiveHandle {
            path: path.to_path_buf(),
            name,
            gzip,
            _temp: None,
        })
    }

    /// Archive identity used in error details.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Location of the container on disk.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Finds an entry by exact name (after `./` prefix normalisation) and
    /// returns its path within the container. Absence is `Ok(None)`, not an
    /// error; callers decide whether it is fatal.
    pub fn find_entry(&self, name: &str) -> crate::Result<Option<String>> {
        let wanted = normalize(name);
        self.scan(|entry_name, _| {
            if normalize(entry_name) == wanted {
                Ok(Some(entry_name.to_string()))
            } else {
                Ok(None)
            }
        })
    }

    /// Reads the named entry's bytes, or `Ok(None)` when absent.
    pub fn extract_bytes(&self, name: &str) -> crate::Result<Option<Vec<u8>>> {
        let wanted = normalize(name);
        self.scan(|entry_name, reader| {
            if normalize(entry_name) != wanted {
                return Ok(None);
            }
            let mut bytes = Vec::new();
            reader.read_to_end(&mut bytes)?;
            Ok(Some(bytes))
        })
    }

    /// Materialises the named entry as an independently openable archive
    /// backed by a temporary file, or `Ok(None)` when absent. The temporary
    /// file lives beside the parent container (keeping extraction on one
    /// filesystem) and is deleted when the returned handle is dropped.
    pub fn extract_nested(&self, name: &str) -> crate::Result<Option<ArchiveHandle>> {
        let scratch_dir = self
            .path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty());
        let wanted = normalize(name);
        let extracted = self.scan(|entry_name, reader| {
            if normalize(entry_name) != wanted {
                return Ok(None);
            }
            let mut file = match scratch_dir {
                Some(dir) => tempfile::NamedTempFile::new_in(dir)?,
                None => tempfile::NamedTempFile::new()?,
            };
            io::copy(reader, &mut file)?;
            Ok(Some(file.into_temp_path()))
        })?;

        let Some(temp) = extracted else {
            return Ok(None);
        };

        let gzip = sniff_gzip(&temp).map_err(|_| self.unreadable())?;
        log::debug!("extracted nested archive '{}' from '{}'", name, self.name);

        Ok(Some(ArchiveHandle {
            path: temp.to_path_buf(),
            name: name.to_string(),
            gzip,
            _temp: Some(temp),
        }))
    }

    /// Lists all entry names in container order.
    pub fn entries(&self) -> crate::Result<Vec<String>> {
        let mut names = Vec::new();
        self.scan::<(), _>(|entry_name, _| {
            names.push(entry_name.to_string());
            Ok(None)
        })?;
        Ok(names)
    }

    /// Walks the container's entries, stopping at the first `Some` the
    /// visitor returns. Container-level failures map to `ArchiveNotFound`:
    /// the archive is not a readable container.
    fn scan<T, F>(&self, mut visit: F) -> crate::Result<Option<T>>
    where
        F: FnMut(&str, &mut dyn Read) -> io::Result<Option<T>>,
    {
        let mut run = || -> io::Result<Option<T>> {
            let file = File::open(&self.path)?;
            let reader: Box<dyn Read> = if self.gzip {
                Box::new(GzDecoder::new(file))
            } else {
                Box::new(file)
            };
            let mut container = tar::Archive::new(reader);
            for entry in container.entries()? {
                let mut entry = entry?;
                let entry_name = entry.path()?.to_string_lossy().into_owned();
                if let Some(found) = visit(&entry_name, &mut entry)? {
                    return Ok(Some(found));
                }
            }
            Ok(None)
        };

        run().map_err(|err| {
            log::debug!("archive '{}' is unreadable: {}", self.name, err);
            self.unreadable()
        })
    }

    fn unreadable(&self) -> ValidationError {
        ValidationError::ArchiveNotFound {
            archive: self.name.clone(),
            target_archive: None,
        }
    }
}

/// Strips the `./` prefix some tar builders put on entry names.
fn normalize(name: &str) -> &str {
    name.strip_prefix("./").unwrap_or(name)
}

/// Reads the leading magic bytes to detect gzip compression.
fn sniff_gzip(path: &Path) -> io::Result<bool> {
    let mut file = File::open(path)?;
    let mut magic = [0u8; 2];
    let read = file.read(&mut magic)?;
    file.seek(SeekFrom::Start(0))?;
    Ok(read == 2 && magic == GZIP_MAGIC)
}
