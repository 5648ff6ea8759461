//! Destination-file helpers for writing finished containers to disk.
//!
//! Saving a document never truncates the destination in place. The container is written to a
//! temp file created next to the destination (so the final rename never crosses devices), synced,
//! and then renamed over the destination. When the writer fails, the temp file is removed and any
//! existing destination is left byte-for-byte untouched.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;

use tempfile::NamedTempFile;
use thiserror::Error;

/// Failure while writing a destination file.
///
/// `Writer` carries the error returned by the caller's write closure unchanged so callers can
/// recover their own error type; `Io` covers temp-file creation, syncing and the final rename.
#[derive(Debug, Error)]
pub enum AtomicWriteError<E: std::error::Error + 'static> {
    #[error("io error: {0}")]
    Io(#[source] io::Error),
    #[error(transparent)]
    Writer(E),
}

impl<E: std::error::Error + 'static> AtomicWriteError<E> {
    /// Collapse into the writer's error type when it can represent I/O failures.
    pub fn into_inner(self) -> E
    where
        E: From<io::Error>,
    {
        match self {
            AtomicWriteError::Io(err) => E::from(err),
            AtomicWriteError::Writer(err) => err,
        }
    }
}

fn parent_dir_or_dot(path: &Path) -> &Path {
    // `Path::parent` is `Some("")` for bare file names like `Book1.xlsx`.
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
}

/// Write `dest` through a temp file in the same directory and rename it into place.
///
/// `write_fn` receives the open temp file. The destination handle only exists for the duration of
/// this call and is closed on every exit path.
pub fn atomic_write<T, E>(
    dest: impl AsRef<Path>,
    write_fn: impl FnOnce(&mut File) -> Result<T, E>,
) -> Result<T, AtomicWriteError<E>>
where
    E: std::error::Error + 'static,
{
    let dest = dest.as_ref();
    let dir = parent_dir_or_dot(dest);
    fs::create_dir_all(dir).map_err(AtomicWriteError::Io)?;

    // Dropping `tmp` on an early return deletes the temp file.
    let mut tmp = NamedTempFile::new_in(dir).map_err(AtomicWriteError::Io)?;
    let out = write_fn(tmp.as_file_mut()).map_err(AtomicWriteError::Writer)?;

    tmp.as_file_mut().flush().map_err(AtomicWriteError::Io)?;
    tmp.as_file().sync_all().map_err(AtomicWriteError::Io)?;

    // `persist` renames with replace semantics on every platform.
    tmp.persist(dest)
        .map_err(|err| AtomicWriteError::Io(err.error))?;

    if let Err(err) = sync_parent_dir(dest) {
        // The file is already in place; a failed directory sync is not a write failure.
        log::debug!("skipping directory sync for {}: {err}", dest.display());
    }

    Ok(out)
}

fn sync_parent_dir(path: &Path) -> io::Result<()> {
    // Opening a directory as a file is not supported everywhere (notably Windows).
    File::open(parent_dir_or_dot(path))?.sync_all()
}
