// lock.rs - Cross-process locks for the file-backed stores.
//
// Several `notaria` processes can share one `.notaria/` directory (a
// long-running `watch` next to one-shot commands). Writers hold an exclusive
// `flock` on a sidecar lock file for the whole re-read, check and write;
// readers hold a shared one so they never see a half-applied change.
//
// Uses `fs2` so this works on toolchains without `File::lock`.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::error::CaseError;

/// Which kind of lock to take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LockMode {
    Shared,
    Exclusive,
}

/// Held lock on a lock file. Released when dropped (the descriptor closes).
#[derive(Debug)]
pub(crate) struct FileLock {
    _file: File,
}

impl FileLock {
    /// Block until the lock at `path` is held in `mode`.
    pub(crate) fn acquire(path: &Path, mode: LockMode) -> Result<Self, CaseError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_error(parent))?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(io_error(path))?;

        // Fully qualified: newer std has inherent `File::lock_shared` with a
        // different error type.
        let locked = match mode {
            LockMode::Shared => FileExt::lock_shared(&file),
            LockMode::Exclusive => FileExt::lock_exclusive(&file),
        };
        locked.map_err(io_error(path))?;
        Ok(Self { _file: file })
    }
}

/// Write `contents` to `path` through a temp file and a rename, so a reader
/// in another process sees either the old file or the new one.
pub(crate) fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), CaseError> {
    let tmp = temp_path(path);
    let mut file = File::create(&tmp).map_err(io_error(&tmp))?;
    file.write_all(contents).map_err(io_error(&tmp))?;
    file.sync_all().map_err(io_error(&tmp))?;
    fs::rename(&tmp, path).map_err(io_error(path))
}

pub(crate) fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> CaseError {
    let path = path.display().to_string();
    move |source| CaseError::IoError { path, source }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}
