//! Externally produced part contents that bypass the store.
//!
//! A spill registered for a path shadows whatever the store holds for that path when the next
//! write assembles the container. Each write takes every registered spill, and each source is
//! released (dropped) right after it has been copied out or when the write fails.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};

/// Default in-memory size of a [`SpillBuffer`] before it moves to a temp file.
pub const DEFAULT_SPILL_CHUNK: usize = 16 * 1024 * 1024;

/// Readable contents for one spilled part. Dropping the source releases it.
pub trait SpillSource: Send {
    fn reader(&mut self) -> io::Result<Box<dyn Read + '_>>;

    /// Total bytes the reader will yield, when known.
    fn size_hint(&self) -> Option<u64> {
        None
    }
}

impl SpillSource for Vec<u8> {
    fn reader(&mut self) -> io::Result<Box<dyn Read + '_>> {
        Ok(Box::new(self.as_slice()))
    }

    fn size_hint(&self) -> Option<u64> {
        Some(self.len() as u64)
    }
}

/// Pending spills, keyed by part path.
#[derive(Default)]
pub struct SpillManager {
    entries: BTreeMap<String, Box<dyn SpillSource>>,
}

impl SpillManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `source` for `path`, releasing any source previously registered there.
    pub fn register(&mut self, path: impl Into<String>, source: Box<dyn SpillSource>) {
        let path = path.into();
        if self.entries.insert(path.clone(), source).is_some() {
            log::warn!("spill for {path} replaced an earlier spill");
        }
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Move every pending spill out, leaving the manager empty.
    pub fn take_all(&mut self) -> SpillSet {
        SpillSet {
            entries: std::mem::take(&mut self.entries),
        }
    }
}

impl std::fmt::Debug for SpillManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpillManager")
            .field("paths", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Spills taken by one write. Sources not yet drained are released on drop.
#[derive(Default)]
pub struct SpillSet {
    entries: BTreeMap<String, Box<dyn SpillSource>>,
}

impl SpillSet {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Visit each spill once, in path order, releasing each source right after its visit.
    ///
    /// Stops at the first failure; the remaining sources are released before returning.
    pub fn drain_all<E, F>(self, mut visit: F) -> Result<(), E>
    where
        E: From<io::Error>,
        F: FnMut(&str, &mut dyn Read, Option<u64>) -> Result<(), E>,
    {
        for (path, mut source) in self.entries {
            visit_one(&path, source.as_mut(), &mut visit)?;
        }
        Ok(())
    }
}

fn visit_one<E, F>(path: &str, source: &mut dyn SpillSource, visit: &mut F) -> Result<(), E>
where
    E: From<io::Error>,
    F: FnMut(&str, &mut dyn Read, Option<u64>) -> Result<(), E>,
{
    let hint = source.size_hint();
    let mut reader = source.reader()?;
    visit(path, &mut reader, hint)
}

enum Storage {
    Memory(Vec<u8>),
    Disk(BufWriter<File>),
}

/// Write-once buffer that stays in memory up to a chunk size and then moves to an anonymous temp
/// file. The file is deleted by the OS when the buffer is dropped.
pub struct SpillBuffer {
    chunk_size: usize,
    storage: Storage,
    len: u64,
}

impl Default for SpillBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl SpillBuffer {
    pub fn new() -> Self {
        Self::with_chunk_size(DEFAULT_SPILL_CHUNK)
    }

    pub fn with_chunk_size(chunk_size: usize) -> Self {
        Self {
            chunk_size,
            storage: Storage::Memory(Vec::new()),
            len: 0,
        }
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_on_disk(&self) -> bool {
        matches!(self.storage, Storage::Disk(_))
    }

    fn move_to_disk(&mut self) -> io::Result<()> {
        let Storage::Memory(mem) = &self.storage else {
            return Ok(());
        };
        let mut file = BufWriter::new(tempfile::tempfile()?);
        file.write_all(mem)?;
        log::debug!("spill buffer moved {} bytes to a temp file", mem.len());
        self.storage = Storage::Disk(file);
        Ok(())
    }
}

impl Write for SpillBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let overflows = matches!(
            &self.storage,
            Storage::Memory(mem) if mem.len().saturating_add(buf.len()) > self.chunk_size
        );
        if overflows {
            self.move_to_disk()?;
        }
        let written = match &mut self.storage {
            Storage::Memory(mem) => {
                mem.extend_from_slice(buf);
                buf.len()
            }
            Storage::Disk(file) => file.write(buf)?,
        };
        self.len += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut self.storage {
            Storage::Memory(_) => Ok(()),
            Storage::Disk(file) => file.flush(),
        }
    }
}

impl SpillSource for SpillBuffer {
    fn reader(&mut self) -> io::Result<Box<dyn Read + '_>> {
        match &mut self.storage {
            Storage::Memory(mem) => Ok(Box::new(mem.as_slice())),
            Storage::Disk(file) => {
                file.flush()?;
                let file = file.get_mut();
                file.seek(SeekFrom::Start(0))?;
                Ok(Box::new(BufReader::new(file)))
            }
        }
    }

    fn size_hint(&self) -> Option<u64> {
        Some(self.len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Counts how many sources have been dropped.
    struct Tracked {
        bytes: Vec<u8>,
        released: Arc<AtomicUsize>,
        fail: bool,
    }

    impl SpillSource for Tracked {
        fn reader(&mut self) -> io::Result<Box<dyn Read + '_>> {
            if self.fail {
                return Err(io::Error::new(io::ErrorKind::Other, "unreadable"));
            }
            Ok(Box::new(self.bytes.as_slice()))
        }
    }

    impl Drop for Tracked {
        fn drop(&mut self) {
            self.released.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn tracked(bytes: &[u8], released: &Arc<AtomicUsize>, fail: bool) -> Box<dyn SpillSource> {
        Box::new(Tracked {
            bytes: bytes.to_vec(),
            released: Arc::clone(released),
            fail,
        })
    }

    #[test]
    fn drains_in_path_order_and_releases_each_source() {
        let released = Arc::new(AtomicUsize::new(0));
        let mut manager = SpillManager::new();
        manager.register("b", tracked(b"bee", &released, false));
        manager.register("a", tracked(b"ay", &released, false));

        let set = manager.take_all();
        assert!(manager.is_empty());

        let mut seen = Vec::new();
        set.drain_all(|path, reader, _| -> io::Result<()> {
            let mut buf = String::new();
            reader.read_to_string(&mut buf)?;
            seen.push((path.to_string(), buf));
            Ok(())
        })
        .unwrap();

        assert_eq!(
            seen,
            vec![("a".to_string(), "ay".to_string()), ("b".to_string(), "bee".to_string())]
        );
        assert_eq!(released.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn failure_releases_remaining_sources() {
        let released = Arc::new(AtomicUsize::new(0));
        let mut manager = SpillManager::new();
        manager.register("a", tracked(b"1", &released, true));
        manager.register("b", tracked(b"2", &released, false));
        manager.register("c", tracked(b"3", &released, false));

        let mut visits = 0;
        let result = manager.take_all().drain_all(|_, _, _| -> io::Result<()> {
            visits += 1;
            Ok(())
        });
        assert!(result.is_err());
        assert_eq!(visits, 0);
        assert_eq!(released.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn registering_twice_releases_the_first_source() {
        let released = Arc::new(AtomicUsize::new(0));
        let mut manager = SpillManager::new();
        manager.register("a", tracked(b"1", &released, false));
        manager.register("a", tracked(b"2", &released, false));
        assert_eq!(manager.len(), 1);
        assert_eq!(released.load(Ordering::SeqCst), 1);
        drop(manager);
        assert_eq!(released.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn buffer_moves_to_disk_past_the_chunk_size() {
        let mut buffer = SpillBuffer::with_chunk_size(8);
        buffer.write_all(b"0123").unwrap();
        assert!(!buffer.is_on_disk());
        buffer.write_all(b"456789").unwrap();
        assert!(buffer.is_on_disk());
        buffer.write_all(b"abc").unwrap();
        assert_eq!(buffer.len(), 13);
        assert_eq!(buffer.size_hint(), Some(13));

        let mut out = Vec::new();
        buffer.reader().unwrap().read_to_end(&mut out).unwrap();
        assert_eq!(out, b"0123456789abc");
    }

    #[test]
    fn in_memory_buffer_reads_back() {
        let mut buffer = SpillBuffer::new();
        buffer.write_all(b"<row/>").unwrap();
        let mut out = String::new();
        buffer.reader().unwrap().read_to_string(&mut out).unwrap();
        assert_eq!(out, "<row/>");
    }
}
