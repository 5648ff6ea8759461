//! Package assembly for SpreadsheetML (`.xlsx`) documents.
//!
//! A [`Document`] is a virtual package: a [`PackageStore`] mapping part paths to either raw bytes
//! or decoded part models. Writing a document:
//!
//! 1. re-encodes every decoded model back into store bytes, kind by kind;
//! 2. emits registered stream spills (see [`spill`]) ahead of the store, so a spill shadows the
//!    stored part at the same path;
//! 3. assembles one zip entry per path, in sorted order with a fixed timestamp;
//! 4. with a password, wraps the finished container in an MS-OFFCRYPTO Agile envelope.
//!
//! ```no_run
//! use sheetpack::{CellValue, Document, Options};
//!
//! # fn main() -> sheetpack::Result<()> {
//! let mut doc = Document::new();
//! doc.worksheet_by_name("Sheet1")?
//!     .write()
//!     .set_cell("A1", CellValue::Number(1.0))?;
//! doc.save_as("book.xlsx", &Options::default())?;
//! # Ok(())
//! # }
//! ```

mod assemble;
mod cache;
mod commit;
mod document;
mod error;
mod load;
mod options;
pub mod parts;
pub mod spill;
pub mod store;
pub mod stream;
pub mod template;
mod write;

pub use document::Document;
pub use error::{PackageError, Result, MAX_FILE_PATH_LENGTH};
pub use options::{Options, PackageLimits, MAX_PACKAGE_PART_BYTES, MAX_PACKAGE_TOTAL_BYTES};
pub use parts::{
    Cell, CellValue, PartCodec, PartHandle, PartKind, PartModel, XmlError,
};
pub use spill::{SpillBuffer, SpillManager, SpillSet, SpillSource, DEFAULT_SPILL_CHUNK};
pub use store::{PackageStore, PartContent};
pub use stream::StreamWriter;
pub use write::{OfficeEncryptor, PackageEncryptor};

pub use sheetpack_crypto::{EncryptOptions, HashAlgorithm, OfficeCryptoError};
