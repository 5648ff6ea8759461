//! Writes spills and store parts into a zip container, one entry per path.

use std::collections::BTreeSet;
use std::io::{self, Seek, Write};

use zip::write::{FileOptions, SimpleFileOptions};
use zip::{CompressionMethod, ZipWriter};

use crate::error::Result;
use crate::spill::SpillSet;
use crate::store::PackageStore;

/// Entries at or above this size need ZIP64 headers.
const ZIP64_THRESHOLD: u64 = 0xFFFF_FFFF;

/// Entry options shared by every part. The fixed timestamp (1980-01-01) keeps repeated writes of
/// the same document byte-identical.
fn entry_options(compression: CompressionMethod, size_hint: Option<u64>) -> SimpleFileOptions {
    FileOptions::<()>::default()
        .compression_method(compression)
        .last_modified_time(zip::DateTime::default())
        .large_file(size_hint.is_some_and(|size| size >= ZIP64_THRESHOLD))
}

/// Emit every spill, then every store part whose path no spill already covered.
///
/// Spill sources are released as they are copied; on failure the remaining ones are released
/// before the error is returned. Returns the number of entries written.
pub(crate) fn assemble<W: Write + Seek>(
    zip: &mut ZipWriter<W>,
    spills: SpillSet,
    store: &PackageStore,
    compression: CompressionMethod,
) -> Result<usize> {
    let mut emitted: BTreeSet<String> = BTreeSet::new();

    spills.drain_all(|path, reader, size_hint| -> Result<()> {
        zip.start_file(path, entry_options(compression, size_hint))?;
        let copied = io::copy(reader, &mut *zip)?;
        log::trace!("wrote spilled part {path} ({copied} bytes)");
        emitted.insert(path.to_string());
        Ok(())
    })?;

    for (path, bytes) in store.emitted_parts() {
        if emitted.contains(&path) {
            log::trace!("store part {path} shadowed by a spill");
            continue;
        }
        zip.start_file(path.as_str(), entry_options(compression, Some(bytes.len() as u64)))?;
        zip.write_all(&bytes)?;
        log::trace!("wrote part {path} ({} bytes)", bytes.len());
        emitted.insert(path);
    }

    log::debug!("assembled {} zip entries", emitted.len());
    Ok(emitted.len())
}
