use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use sheetpack_fs::{atomic_write, AtomicWriteError};

use crate::cache::load;
use crate::commit::commit;
use crate::error::{PackageError, Result, MAX_FILE_PATH_LENGTH};
use crate::load::load_store;
use crate::options::Options;
use crate::parts::{
    content_type, rel_type, resolve_target, CalcChain, Comments, ContentTypes, Drawing,
    PartHandle, Relationships, SharedStrings, StyleSheet, Theme, VmlDrawing, Workbook, Worksheet,
    CALC_CHAIN_PART, CONTENT_TYPES_PART, SHARED_STRINGS_PART, STYLES_PART, THEME_PART,
    WORKBOOK_PART, WORKBOOK_RELS_PART,
};
use crate::spill::{SpillBuffer, SpillManager, SpillSet, SpillSource};
use crate::store::PackageStore;
use crate::stream::StreamWriter;
use crate::template;
use crate::write::strategy_for;

/// Longest sheet name Excel accepts.
const MAX_SHEET_NAME_CHARS: usize = 31;
const FORBIDDEN_SHEET_NAME_CHARS: [char; 7] = [':', '\\', '/', '?', '*', '[', ']'];

/// An open spreadsheet package.
///
/// Part accessors take `&self` and may be called from several threads. Writing re-encodes every
/// loaded model, so drop any write guard on a part handle before calling a write method.
#[derive(Debug)]
pub struct Document {
    store: PackageStore,
    spills: Mutex<SpillManager>,
    path: Option<PathBuf>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// A new workbook with one empty sheet named `Sheet1`.
    pub fn new() -> Self {
        let store = PackageStore::new();
        template::bootstrap(&store);
        Self::from_store(store)
    }

    fn from_store(store: PackageStore) -> Self {
        Self {
            store,
            spills: Mutex::new(SpillManager::new()),
            path: None,
        }
    }

    /// Load a container from disk; later [`save`](Self::save) calls write back to `path`.
    pub fn open(path: impl AsRef<Path>, options: &Options) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        let mut document = Self::from_bytes(&bytes, options)?;
        document.path = Some(path.to_path_buf());
        Ok(document)
    }

    pub fn from_bytes(bytes: &[u8], options: &Options) -> Result<Self> {
        Ok(Self::from_store(load_store(bytes, options)?))
    }

    pub fn from_reader<R: Read>(mut reader: R, options: &Options) -> Result<Self> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        Self::from_bytes(&bytes, options)
    }

    /// Destination used by [`save`](Self::save).
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn store(&self) -> &PackageStore {
        &self.store
    }

    pub fn workbook(&self) -> Result<PartHandle<Workbook>> {
        load(&self.store, WORKBOOK_PART)
    }

    pub fn styles(&self) -> Result<PartHandle<StyleSheet>> {
        load(&self.store, STYLES_PART)
    }

    pub fn shared_strings(&self) -> Result<PartHandle<SharedStrings>> {
        load(&self.store, SHARED_STRINGS_PART)
    }

    pub fn calc_chain(&self) -> Result<PartHandle<CalcChain>> {
        load(&self.store, CALC_CHAIN_PART)
    }

    pub fn content_types(&self) -> Result<PartHandle<ContentTypes>> {
        load(&self.store, CONTENT_TYPES_PART)
    }

    pub fn theme(&self) -> Result<PartHandle<Theme>> {
        load(&self.store, THEME_PART)
    }

    pub fn relationships(&self, path: &str) -> Result<PartHandle<Relationships>> {
        load(&self.store, path)
    }

    pub fn comments(&self, path: &str) -> Result<PartHandle<Comments>> {
        load(&self.store, path)
    }

    pub fn vml_drawing(&self, path: &str) -> Result<PartHandle<VmlDrawing>> {
        load(&self.store, path)
    }

    pub fn drawing(&self, path: &str) -> Result<PartHandle<Drawing>> {
        load(&self.store, path)
    }

    pub fn worksheet(&self, path: &str) -> Result<PartHandle<Worksheet>> {
        load(&self.store, path)
    }

    pub fn sheet_names(&self) -> Result<Vec<String>> {
        let workbook = self.workbook()?;
        let names = workbook.read().sheet_names();
        Ok(names)
    }

    /// Worksheet part path of sheet `name`, resolved through the workbook relationships.
    pub fn sheet_path(&self, name: &str) -> Result<String> {
        let workbook = self.workbook()?;
        let rel_id = workbook
            .read()
            .sheet(name)
            .map(|sheet| sheet.rel_id.clone())
            .ok_or_else(|| PackageError::UnknownSheet(name.to_string()))?;

        let rels = self.relationships(WORKBOOK_RELS_PART)?;
        let rels = rels.read();
        let rel = rels
            .get(&rel_id)
            .ok_or_else(|| PackageError::UnknownSheet(name.to_string()))?;
        Ok(resolve_target(WORKBOOK_PART, &rel.target))
    }

    pub fn worksheet_by_name(&self, name: &str) -> Result<PartHandle<Worksheet>> {
        let path = self.sheet_path(name)?;
        self.worksheet(&path)
    }

    /// Append an empty sheet and wire it into the workbook, its relationships and the content
    /// types. Returns the new worksheet part path.
    pub fn add_sheet(&self, name: &str) -> Result<String> {
        validate_sheet_name(name)?;
        let workbook = self.workbook()?;
        if workbook.read().sheet(name).is_some() {
            return Err(PackageError::InvalidSheetName {
                name: name.to_string(),
                reason: "a sheet with this name already exists",
            });
        }

        let index = (1..)
            .find(|n| !self.store.contains(&format!("xl/worksheets/sheet{n}.xml")))
            .unwrap_or(1);
        let path = format!("xl/worksheets/sheet{index}.xml");

        let rel_id = self
            .relationships(WORKBOOK_RELS_PART)?
            .write()
            .add(rel_type::WORKSHEET, &format!("worksheets/sheet{index}.xml"));
        workbook.write().add_sheet(name, &rel_id);
        self.content_types()?
            .write()
            .add_override(&path, content_type::WORKSHEET);
        self.worksheet(&path)?;

        log::debug!("added sheet {name:?} at {path}");
        Ok(path)
    }

    /// Intern `text` in the shared string table, adding the table to the package if needed.
    pub fn add_shared_string(&self, text: &str) -> Result<u32> {
        let index = self.shared_strings()?.write().push(text);

        let types = self.content_types()?;
        if types.read().content_type_for(SHARED_STRINGS_PART) != Some(content_type::SHARED_STRINGS)
        {
            types
                .write()
                .add_override(SHARED_STRINGS_PART, content_type::SHARED_STRINGS);
        }
        let rels = self.relationships(WORKBOOK_RELS_PART)?;
        if rels.read().find_by_type(rel_type::SHARED_STRINGS).next().is_none() {
            rels.write()
                .add(rel_type::SHARED_STRINGS, "sharedStrings.xml");
        }
        Ok(index)
    }

    /// Register content for `path` that replaces the stored part on the next write.
    pub fn register_spill(&self, path: impl Into<String>, source: Box<dyn SpillSource>) {
        self.spills().register(path, source);
    }

    pub fn has_spill(&self, path: &str) -> bool {
        self.spills().contains(path)
    }

    /// Stream rows into sheet `name`, replacing its stored rows on the next write.
    pub fn stream_writer(&self, name: &str) -> Result<StreamWriter<'_>> {
        self.stream_writer_with_buffer(name, SpillBuffer::new())
    }

    pub fn stream_writer_with_buffer(
        &self,
        name: &str,
        buffer: SpillBuffer,
    ) -> Result<StreamWriter<'_>> {
        let path = self.sheet_path(name)?;
        let sheet = self.worksheet(&path)?;
        let guard = sheet.read();
        StreamWriter::new(self, path, &guard, buffer)
    }

    /// Write to the path the document was opened from or last saved as.
    pub fn save(&self, options: &Options) -> Result<()> {
        let path = self.path.as_deref().ok_or(PackageError::NoDestination)?;
        self.write_to_path(path, options)
    }

    /// Write to `path` and make it the destination for later [`save`](Self::save) calls.
    ///
    /// The destination is only replaced once the whole container has been written.
    pub fn save_as(&mut self, path: impl AsRef<Path>, options: &Options) -> Result<()> {
        let path = path.as_ref();
        let len = path.as_os_str().len();
        if len > MAX_FILE_PATH_LENGTH {
            return Err(PackageError::NameTooLong {
                len,
                max: MAX_FILE_PATH_LENGTH,
            });
        }
        self.write_to_path(path, options)?;
        self.path = Some(path.to_path_buf());
        Ok(())
    }

    fn write_to_path(&self, path: &Path, options: &Options) -> Result<()> {
        let written = atomic_write(path, |file| self.write(BufWriter::new(file), options))
            .map_err(AtomicWriteError::into_inner)?;
        log::debug!("saved {} ({written} bytes)", path.display());
        Ok(())
    }

    /// Commit every loaded part and write the container (or its encrypted envelope) to `sink`.
    ///
    /// Consumes the registered spills whether or not the write succeeds. Returns the number of
    /// bytes written.
    pub fn write<W: Write>(&self, mut sink: W, options: &Options) -> Result<u64> {
        let spills = self.take_spills();
        commit(&self.store)?;
        let written = strategy_for(options).write_package(&self.store, spills, &mut sink)?;
        log::debug!(
            "wrote {written} bytes{}",
            if options.effective_password().is_some() {
                " (encrypted)"
            } else {
                ""
            }
        );
        Ok(written)
    }

    pub fn write_to_buffer(&self, options: &Options) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.write(&mut out, options)?;
        Ok(out)
    }

    fn spills(&self) -> MutexGuard<'_, SpillManager> {
        self.spills.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn take_spills(&self) -> SpillSet {
        self.spills().take_all()
    }
}

fn validate_sheet_name(name: &str) -> Result<()> {
    let reason = if name.trim().is_empty() {
        Some("sheet names cannot be blank")
    } else if name.chars().count() > MAX_SHEET_NAME_CHARS {
        Some("sheet names are limited to 31 characters")
    } else if name.contains(FORBIDDEN_SHEET_NAME_CHARS) {
        Some("sheet names cannot contain : \\ / ? * [ ]")
    } else if name.starts_with('\'') || name.ends_with('\'') {
        Some("sheet names cannot begin or end with an apostrophe")
    } else {
        None
    };
    match reason {
        Some(reason) => Err(PackageError::InvalidSheetName {
            name: name.to_string(),
            reason,
        }),
        None => Ok(()),
    }
}
