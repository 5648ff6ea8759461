//! Write strategies: stream the container straight into the sink, or buffer it and wrap it in an
//! encrypted envelope.

use std::io::{self, Cursor, Seek, SeekFrom, Write};
use std::sync::Arc;

use sheetpack_crypto::{encrypt_package_to_ole, EncryptOptions, OfficeCryptoError};
use zip::{CompressionMethod, ZipWriter};

use crate::assemble::assemble;
use crate::error::Result;
use crate::options::Options;
use crate::spill::{SpillSet, DEFAULT_SPILL_CHUNK};
use crate::store::PackageStore;

/// Turns a finished container into a password-protected envelope.
pub trait PackageEncryptor: Send + Sync {
    fn encrypt(&self, package: &[u8], password: &str) -> Result<Vec<u8>, OfficeCryptoError>;
}

/// MS-OFFCRYPTO Agile encryption into an OLE/CFB compound file.
#[derive(Debug, Clone, Default)]
pub struct OfficeEncryptor {
    pub options: EncryptOptions,
}

impl OfficeEncryptor {
    pub fn new(options: EncryptOptions) -> Self {
        Self { options }
    }
}

impl PackageEncryptor for OfficeEncryptor {
    fn encrypt(&self, package: &[u8], password: &str) -> Result<Vec<u8>, OfficeCryptoError> {
        encrypt_package_to_ole(package, password, &self.options)
    }
}

pub(crate) trait WriteStrategy {
    /// Assemble `store` and `spills` into `sink`; returns the bytes written to the sink.
    fn write_package(
        &self,
        store: &PackageStore,
        spills: SpillSet,
        sink: &mut dyn Write,
    ) -> Result<u64>;
}

pub(crate) fn strategy_for(options: &Options) -> Box<dyn WriteStrategy + '_> {
    match options.effective_password() {
        None => Box::new(DirectStream {
            compression: options.compression,
        }),
        Some(password) => {
            let encryptor = match &options.encryptor {
                Some(custom) => Arc::clone(custom),
                None => Arc::new(OfficeEncryptor::new(options.encrypt.clone())),
            };
            Box::new(BufferedEncrypt {
                password,
                encryptor,
                compression: options.compression,
            })
        }
    }
}

/// Assembles into a spool that stays in memory up to one spill chunk and moves to a temp file past
/// it, then copies the finished container into the sink.
///
/// The zip writer seeks back to patch local headers, so a plain `Write` sink can't take entries
/// directly.
struct DirectStream {
    compression: CompressionMethod,
}

impl WriteStrategy for DirectStream {
    fn write_package(
        &self,
        store: &PackageStore,
        spills: SpillSet,
        sink: &mut dyn Write,
    ) -> Result<u64> {
        let mut spool = tempfile::spooled_tempfile(DEFAULT_SPILL_CHUNK);
        {
            let mut zip = ZipWriter::new(&mut spool);
            assemble(&mut zip, spills, store, self.compression)?;
            zip.finish()?;
        }
        spool.seek(SeekFrom::Start(0))?;
        let written = io::copy(&mut spool, sink)?;
        sink.flush()?;
        Ok(written)
    }
}

/// Builds the whole container in memory, then writes the encrypted envelope.
struct BufferedEncrypt<'a> {
    password: &'a str,
    encryptor: Arc<dyn PackageEncryptor>,
    compression: CompressionMethod,
}

impl WriteStrategy for BufferedEncrypt<'_> {
    fn write_package(
        &self,
        store: &PackageStore,
        spills: SpillSet,
        sink: &mut dyn Write,
    ) -> Result<u64> {
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut zip = ZipWriter::new(&mut cursor);
            assemble(&mut zip, spills, store, self.compression)?;
            zip.finish()?;
        }
        let package = cursor.into_inner();
        let envelope = self.encryptor.encrypt(&package, self.password)?;
        log::debug!(
            "encrypted {} byte container into {} byte envelope",
            package.len(),
            envelope.len()
        );
        sink.write_all(&envelope)?;
        sink.flush()?;
        Ok(envelope.len() as u64)
    }
}
