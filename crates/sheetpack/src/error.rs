use sheetpack_crypto::OfficeCryptoError;
use thiserror::Error;

use crate::parts::{InvalidCellReference, PartKind, XmlError};

/// Longest destination path (in bytes) accepted by `save_as`.
pub const MAX_FILE_PATH_LENGTH: usize = 207;

#[derive(Debug, Error)]
pub enum PackageError {
    #[error("no destination path: use save_as or open the document from a file first")]
    NoDestination,
    #[error("file path is {len} bytes long (max {max})")]
    NameTooLong { len: usize, max: usize },
    #[error("malformed {kind} part {path}: {source}")]
    MalformedPart {
        path: String,
        kind: PartKind,
        #[source]
        source: XmlError,
    },
    #[error("cannot encode {kind} part {path}: {source}")]
    EncodePart {
        path: String,
        kind: PartKind,
        #[source]
        source: XmlError,
    },
    #[error("part {path} is already loaded as {loaded}, not {requested}")]
    PartKindMismatch {
        path: String,
        loaded: PartKind,
        requested: PartKind,
    },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("encryption error: {0}")]
    Encryption(#[from] OfficeCryptoError),
    #[error("document is password-protected; a password is required to open it")]
    PasswordRequired,
    #[error(
        "package part is too large to load safely: {part} is {size} bytes (max {max} bytes)"
    )]
    PartTooLarge { part: String, size: u64, max: u64 },
    #[error("package is too large to load safely: {total} bytes uncompressed (max {max})")]
    PackageTooLarge { total: u64, max: u64 },
    #[error("no sheet named {0:?}")]
    UnknownSheet(String),
    #[error("invalid sheet name {name:?}: {reason}")]
    InvalidSheetName { name: String, reason: &'static str },
    #[error("row {row} written after row {last}; rows must be strictly ascending")]
    StreamRowOrder { row: u32, last: u32 },
    #[error(transparent)]
    InvalidCellReference(#[from] InvalidCellReference),
}

pub type Result<T, E = PackageError> = std::result::Result<T, E>;
