//! Row-at-a-time worksheet writer backed by a [`SpillBuffer`].
//!
//! Rows go straight into the buffer as XML, so a sheet with millions of rows never exists as a
//! decoded model. [`StreamWriter::flush`] registers the finished part as a spill; the next write
//! of the document emits it in place of the stored worksheet.

use std::collections::BTreeMap;
use std::io::Write;

use crate::document::Document;
use crate::error::{PackageError, Result};
use crate::parts::{
    write_row, Cell, CellValue, InvalidCellReference, PartKind, Row, Worksheet, MAX_COLUMNS,
    MAX_ROWS,
};
use crate::spill::SpillBuffer;

pub struct StreamWriter<'a> {
    document: &'a Document,
    path: String,
    prefix: String,
    tail: String,
    buffer: SpillBuffer,
    last_row: Option<u32>,
    scratch: String,
}

impl<'a> StreamWriter<'a> {
    pub(crate) fn new(
        document: &'a Document,
        path: String,
        sheet: &Worksheet,
        buffer: SpillBuffer,
    ) -> Result<Self> {
        let (head, tail) = sheet.stream_envelope();
        let mut writer = Self {
            document,
            path,
            prefix: sheet.prefix().to_string(),
            tail,
            buffer,
            last_row: None,
            scratch: String::new(),
        };
        writer.buffer.write_all(head.as_bytes())?;
        Ok(writer)
    }

    /// Part path the finished sheet will be written to.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Write row `row` (1-based) with `values` starting in column A. Blank values are skipped.
    pub fn write_row(&mut self, row: u32, values: &[CellValue]) -> Result<()> {
        let cells: Vec<Cell> = values.iter().cloned().map(Cell::new).collect();
        self.write_cells(row, &cells)
    }

    /// Like [`write_row`](Self::write_row), keeping each cell's style.
    pub fn write_cells(&mut self, row: u32, cells: &[Cell]) -> Result<()> {
        if row == 0 || row > MAX_ROWS {
            return Err(InvalidCellReference(format!("row {row}")).into());
        }
        if cells.len() > MAX_COLUMNS as usize {
            return Err(InvalidCellReference(format!(
                "{} columns in row {row}",
                cells.len()
            ))
            .into());
        }
        if let Some(last) = self.last_row {
            if row <= last {
                return Err(PackageError::StreamRowOrder { row, last });
            }
        }

        let mut entry = Row {
            attrs: Vec::new(),
            cells: BTreeMap::new(),
        };
        for (idx, cell) in cells.iter().enumerate() {
            if cell.value == CellValue::Blank && cell.style.is_none() {
                continue;
            }
            entry.cells.insert(idx as u32 + 1, cell.clone());
        }

        self.scratch.clear();
        write_row(&mut self.scratch, &self.prefix, row, &entry).map_err(|source| {
            PackageError::EncodePart {
                path: self.path.clone(),
                kind: PartKind::Worksheet,
                source,
            }
        })?;
        self.buffer.write_all(self.scratch.as_bytes())?;
        self.last_row = Some(row);
        Ok(())
    }

    /// Close the sheet and register it for the next write of the document.
    pub fn flush(mut self) -> Result<()> {
        self.buffer.write_all(self.tail.as_bytes())?;
        self.buffer.flush()?;
        log::debug!(
            "streamed {} ({} bytes, on disk: {})",
            self.path,
            self.buffer.len(),
            self.buffer.is_on_disk()
        );
        self.document
            .register_spill(self.path, Box::new(self.buffer));
        Ok(())
    }
}
