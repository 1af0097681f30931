//! Append-only log writer
//!
//! - The log file is exclusively locked for the lifetime of the writer
//! - Every commit is one `write_all` followed by `fsync`
//! - A failed append is rolled back to the previous length
//! - Acknowledging a commit before fsync is forbidden

use std::fs::{self, File, OpenOptions, TryLockError};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use super::errors::{StoreError, StoreResult};

pub struct LogWriter {
    path: PathBuf,
    file: File,
    len: u64,
    poisoned: bool,
}

impl LogWriter {
    /// Opens or creates the log at `path` and takes the exclusive lock.
    ///
    /// # Errors
    ///
    /// `TRACKDEX_STORE_ALREADY_OPEN` if any other handle (in this process or
    /// another) holds the lock.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| {
                    StoreError::io_error(
                        format!("Failed to create store directory: {}", parent.display()),
                        e,
                    )
                })?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| {
                StoreError::io_error(format!("Failed to open store log: {}", path.display()), e)
            })?;

        lock_exclusive(&file, path)?;

        let len = file
            .metadata()
            .map_err(|e| StoreError::io_error("Failed to read store log metadata", e))?
            .len();

        Ok(Self {
            path: path.to_path_buf(),
            file,
            len,
            poisoned: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// Appends one serialized frame and fsyncs.
    ///
    /// On failure the file is cut back to its previous length. If even that
    /// fails the writer is poisoned and refuses further appends.
    pub fn append(&mut self, frame: &[u8]) -> StoreResult<()> {
        if self.poisoned {
            return Err(StoreError::poisoned(format!(
                "Store log was left in an unknown state: {}",
                self.path.display()
            )));
        }

        let start = self.len;
        let result = self
            .file
            .seek(SeekFrom::Start(start))
            .and_then(|_| self.file.write_all(frame))
            .and_then(|_| self.file.sync_data());

        match result {
            Ok(()) => {
                self.len = start + frame.len() as u64;
                Ok(())
            }
            Err(e) => {
                if self.truncate(start).is_err() {
                    self.poisoned = true;
                }
                Err(StoreError::write_failed(
                    format!("Failed to append commit frame at offset {}", start),
                    e,
                ))
            }
        }
    }

    /// Cuts the log back to `offset` and fsyncs.
    pub fn truncate(&mut self, offset: u64) -> StoreResult<()> {
        self.file
            .set_len(offset)
            .and_then(|_| self.file.sync_all())
            .map_err(|e| {
                StoreError::write_failed(format!("Failed to truncate store log to {}", offset), e)
            })?;
        self.len = offset;
        Ok(())
    }

    /// Atomically replaces the log with `contents`.
    ///
    /// Writes a sibling temp file, fsyncs it, locks it, then renames it
    /// over the log. The old handle (and its lock) is released afterwards.
    pub fn rewrite(&mut self, contents: &[u8]) -> StoreResult<()> {
        let tmp_path = self.path.with_extension("compact");

        let mut tmp = OpenOptions::new()
            .create(true)
            .truncate(true)
            .read(true)
            .write(true)
            .open(&tmp_path)
            .map_err(|e| {
                StoreError::write_failed(
                    format!("Failed to create compaction file: {}", tmp_path.display()),
                    e,
                )
            })?;

        let written = tmp.write_all(contents).and_then(|_| tmp.sync_all());
        if let Err(e) = written {
            let _ = fs::remove_file(&tmp_path);
            return Err(StoreError::write_failed("Failed to write compaction file", e));
        }

        if let Err(e) = lock_exclusive(&tmp, &tmp_path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(e);
        }

        fs::rename(&tmp_path, &self.path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            StoreError::write_failed(
                format!("Failed to replace store log: {}", self.path.display()),
                e,
            )
        })?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if let Ok(dir) = File::open(parent) {
                let _ = dir.sync_all();
            }
        }

        self.file = tmp;
        self.len = contents.len() as u64;
        Ok(())
    }
}

fn lock_exclusive(file: &File, path: &Path) -> StoreResult<()> {
    match file.try_lock() {
        Ok(()) => Ok(()),
        Err(TryLockError::WouldBlock) => Err(StoreError::already_open(path.display())),
        Err(TryLockError::Error(e)) => Err(StoreError::io_error(
            format!("Failed to lock store log: {}", path.display()),
            e,
        )),
    }
}
