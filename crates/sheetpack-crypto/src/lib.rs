//! Office password encryption for OOXML packages (`EncryptionInfo` + `EncryptedPackage` inside an
//! OLE/CFB container).
//!
//! Only MS-OFFCRYPTO "Agile Encryption" (XML descriptor, Office 2010+) is written and read.
//! The decrypted output is the raw OOXML ZIP/OPC bytes (starts with `PK`).

mod aes_cbc;
mod agile;
mod crypto;
mod error;

use std::io::{Cursor, Read, Write as _};

pub use crate::aes_cbc::AesCbcError;
pub use crate::crypto::{CryptoError, HashAlgorithm};
pub use crate::error::OfficeCryptoError;

const OLE_MAGIC: [u8; 8] = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

const ENCRYPTION_INFO_STREAM: &str = "EncryptionInfo";
const ENCRYPTED_PACKAGE_STREAM: &str = "EncryptedPackage";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptOptions {
    pub key_bits: usize,
    pub hash_algorithm: HashAlgorithm,
    pub spin_count: u32,
}

impl Default for EncryptOptions {
    fn default() -> Self {
        Self {
            key_bits: 256,
            hash_algorithm: HashAlgorithm::Sha512,
            spin_count: 100_000,
        }
    }
}

/// Returns true if `bytes` starts with the OLE/CFB signature.
pub fn has_ole_magic(bytes: &[u8]) -> bool {
    bytes.len() >= OLE_MAGIC.len() && bytes[..OLE_MAGIC.len()] == OLE_MAGIC
}

/// Returns true if the provided bytes look like an OLE/CFB container holding an Office-encrypted
/// OOXML package (streams `EncryptionInfo` and `EncryptedPackage`).
pub fn is_encrypted_ooxml_ole(bytes: &[u8]) -> bool {
    if !has_ole_magic(bytes) {
        return false;
    }

    let Ok(mut ole) = cfb::CompoundFile::open(Cursor::new(bytes)) else {
        return false;
    };

    ole.open_stream(ENCRYPTION_INFO_STREAM).is_ok()
        && ole.open_stream(ENCRYPTED_PACKAGE_STREAM).is_ok()
}

/// Encrypt a raw OOXML ZIP package into an Office `EncryptedPackage` OLE/CFB wrapper.
///
/// The returned bytes are an OLE/CFB container containing:
/// - `EncryptionInfo` stream (Agile XML descriptor)
/// - `EncryptedPackage` stream (8-byte decrypted size prefix + encrypted payload)
pub fn encrypt_package_to_ole(
    zip_bytes: &[u8],
    password: &str,
    opts: &EncryptOptions,
) -> Result<Vec<u8>, OfficeCryptoError> {
    let (encryption_info, encrypted_package) =
        agile::encrypt_agile_encrypted_package(zip_bytes, password, opts)?;

    let mut ole = cfb::CompoundFile::create(Cursor::new(Vec::new()))?;
    ole.create_stream(ENCRYPTION_INFO_STREAM)?
        .write_all(&encryption_info)?;
    ole.create_stream(ENCRYPTED_PACKAGE_STREAM)?
        .write_all(&encrypted_package)?;
    ole.flush()?;

    Ok(ole.into_inner().into_inner())
}

/// Decrypt an Office-encrypted OOXML OLE/CFB wrapper and return the decrypted raw ZIP bytes.
pub fn decrypt_encrypted_package_ole(
    bytes: &[u8],
    password: &str,
) -> Result<Vec<u8>, OfficeCryptoError> {
    let mut ole = cfb::CompoundFile::open(Cursor::new(bytes))?;

    let mut encryption_info = Vec::new();
    ole.open_stream(ENCRYPTION_INFO_STREAM)?
        .read_to_end(&mut encryption_info)?;

    let mut encrypted_package = Vec::new();
    ole.open_stream(ENCRYPTED_PACKAGE_STREAM)?
        .read_to_end(&mut encrypted_package)?;

    let info = agile::parse_agile_encryption_info(&encryption_info)?;
    let out = agile::decrypt_agile_encrypted_package(&info, &encrypted_package, password)?;
    validate_decrypted_package(&out)?;
    Ok(out)
}

fn validate_decrypted_package(bytes: &[u8]) -> Result<(), OfficeCryptoError> {
    if bytes.len() < 2 || &bytes[..2] != b"PK" {
        return Err(OfficeCryptoError::InvalidFormat(
            "decrypted package does not look like a ZIP (missing PK signature)".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_encrypted_ooxml_ole_container() {
        let mut ole = cfb::CompoundFile::create(Cursor::new(Vec::new())).expect("create cfb");
        ole.create_stream("EncryptionInfo")
            .expect("create EncryptionInfo stream");
        ole.create_stream("EncryptedPackage")
            .expect("create EncryptedPackage stream");
        let bytes = ole.into_inner().into_inner();
        assert!(has_ole_magic(&bytes));
        assert!(is_encrypted_ooxml_ole(&bytes));
    }

    #[test]
    fn plain_ole_without_streams_is_not_encrypted_ooxml() {
        let mut ole = cfb::CompoundFile::create(Cursor::new(Vec::new())).expect("create cfb");
        ole.create_stream("Workbook").expect("create stream");
        let bytes = ole.into_inner().into_inner();
        assert!(!is_encrypted_ooxml_ole(&bytes));
        assert!(!is_encrypted_ooxml_ole(b"PK\x03\x04"));
    }

    #[test]
    fn rejects_non_zip_plaintext_after_decrypt() {
        let opts = EncryptOptions {
            spin_count: 1,
            ..Default::default()
        };
        let ole = encrypt_package_to_ole(b"not a zip", "pw", &opts).expect("encrypt");
        let err = decrypt_encrypted_package_ole(&ole, "pw").unwrap_err();
        assert!(matches!(err, OfficeCryptoError::InvalidFormat(_)), "got {err:?}");
    }
}
