//! File-based storage backend.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

#[derive(Debug)]
struct FileState {
    file: Option<File>,
    size: u64,
}

/// A storage backend over a single OS file.
///
/// `flush()` pushes buffered bytes to the OS and `sync()` waits for them to
/// reach the disk. After [`FileBackend::close`] the file handle is released
/// and every call fails with [`StorageError::Closed`].
///
/// # Example
///
/// ```no_run
/// use liftlog_storage::{StorageBackend, FileBackend};
/// use std::path::Path;
///
/// let mut backend = FileBackend::open(Path::new("store.log")).unwrap();
/// backend.append(b"frame").unwrap();
/// backend.sync().unwrap();
/// ```
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
    state: Mutex<FileState>,
}

impl FileBackend {
    /// Opens or creates the file at `path` for reading and appending.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or created.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        let size = file.metadata()?.len();

        Ok(Self {
            path: path.to_path_buf(),
            state: Mutex::new(FileState {
                file: Some(file),
                size,
            }),
        })
    }

    /// Opens the file, creating missing parent directories first.
    ///
    /// # Errors
    ///
    /// Returns an error if directories cannot be created or the file cannot
    /// be opened.
    pub fn open_with_create_dirs(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::open(path)
    }

    /// Returns the path of the underlying file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Releases the file handle.
    pub fn close(&self) {
        self.state.lock().file = None;
    }
}

impl StorageBackend for FileBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let mut state = self.state.lock();
        let size = state.size;
        let end = offset.saturating_add(len as u64);
        let file = state.file.as_mut().ok_or(StorageError::Closed)?;

        if end > size {
            return Err(StorageError::ReadPastEnd { offset, len, size });
        }
        if len == 0 {
            return Ok(Vec::new());
        }

        file.seek(SeekFrom::Start(offset))?;
        let mut buffer = vec![0u8; len];
        file.read_exact(&mut buffer)?;
        Ok(buffer)
    }

    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        let mut state = self.state.lock();
        let offset = state.size;
        let file = state.file.as_mut().ok_or(StorageError::Closed)?;
        if data.is_empty() {
            return Ok(offset);
        }

        file.seek(SeekFrom::End(0))?;
        file.write_all(data)?;
        state.size += data.len() as u64;
        Ok(offset)
    }

    fn flush(&mut self) -> StorageResult<()> {
        let mut state = self.state.lock();
        state.file.as_mut().ok_or(StorageError::Closed)?.flush()?;
        Ok(())
    }

    fn size(&self) -> StorageResult<u64> {
        let state = self.state.lock();
        if state.file.is_none() {
            return Err(StorageError::Closed);
        }
        Ok(state.size)
    }

    fn sync(&mut self) -> StorageResult<()> {
        let state = self.state.lock();
        state.file.as_ref().ok_or(StorageError::Closed)?.sync_all()?;
        Ok(())
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        let mut state = self.state.lock();
        let size = state.size;
        let file = state.file.as_mut().ok_or(StorageError::Closed)?;
        if new_size > size {
            return Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("cannot truncate log of {size} bytes to {new_size} bytes"),
            )));
        }

        file.set_len(new_size)?;
        file.sync_all()?;
        state.size = new_size;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn append_then_read_back() {
        let dir = tempdir().unwrap();
        let mut backend = FileBackend::open(&dir.path().join("store.log")).unwrap();

        assert_eq!(backend.append(b"frame-1").unwrap(), 0);
        assert_eq!(backend.append(b"frame-2").unwrap(), 7);
        assert_eq!(backend.read_at(7, 7).unwrap(), b"frame-2");
        assert!(matches!(
            backend.read_at(10, 7),
            Err(StorageError::ReadPastEnd { .. })
        ));
    }

    #[test]
    fn bytes_survive_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.log");
        {
            let mut backend = FileBackend::open(&path).unwrap();
            backend.append(b"kept").unwrap();
            backend.sync().unwrap();
        }
        let backend = FileBackend::open(&path).unwrap();
        assert_eq!(backend.size().unwrap(), 4);
        assert_eq!(backend.read_at(0, 4).unwrap(), b"kept");
    }

    #[test]
    fn nested_directories_are_created() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a").join("b").join("store.log");
        let backend = FileBackend::open_with_create_dirs(&path).unwrap();
        assert_eq!(backend.path(), path);
        assert!(path.exists());
    }

    #[test]
    fn truncate_cuts_torn_tail() {
        let dir = tempdir().unwrap();
        let mut backend = FileBackend::open(&dir.path().join("store.log")).unwrap();
        backend.append(b"wholetorn").unwrap();
        backend.truncate(5).unwrap();
        assert_eq!(backend.size().unwrap(), 5);
        assert_eq!(backend.read_at(0, 5).unwrap(), b"whole");
    }

    #[test]
    fn closed_backend_rejects_calls() {
        let dir = tempdir().unwrap();
        let mut backend = FileBackend::open(&dir.path().join("store.log")).unwrap();
        backend.close();
        assert!(matches!(backend.append(b"x"), Err(StorageError::Closed)));
        assert!(backend.size().unwrap_err().is_closed());
    }
}
