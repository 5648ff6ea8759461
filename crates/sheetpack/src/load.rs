//! Populates a store from an existing container.

use std::io::{Cursor, Read, Seek};

use sheetpack_crypto::{decrypt_encrypted_package_ole, is_encrypted_ooxml_ole};
use zip::ZipArchive;

use crate::error::{PackageError, Result};
use crate::options::{Options, PackageLimits};
use crate::store::PackageStore;

/// Shared budget for the inflated size of every entry in one container.
#[derive(Debug, Clone)]
struct InflateBudget {
    max_total_bytes: u64,
    used_bytes: u64,
}

impl InflateBudget {
    fn new(max_total_bytes: u64) -> Self {
        Self {
            max_total_bytes,
            used_bytes: 0,
        }
    }

    fn remaining_bytes(&self) -> u64 {
        self.max_total_bytes.saturating_sub(self.used_bytes)
    }

    fn consume(&mut self, bytes: u64) -> Result<()> {
        self.used_bytes = self.used_bytes.saturating_add(bytes);
        if self.used_bytes > self.max_total_bytes {
            return Err(PackageError::PackageTooLarge {
                total: self.used_bytes,
                max: self.max_total_bytes,
            });
        }
        Ok(())
    }
}

/// Decrypt `bytes` when they are an encrypted envelope, then read every entry into a store.
pub(crate) fn load_store(bytes: &[u8], options: &Options) -> Result<PackageStore> {
    if is_encrypted_ooxml_ole(bytes) {
        let password = options.effective_password().ok_or(PackageError::PasswordRequired)?;
        let decrypted = decrypt_encrypted_package_ole(bytes, password)?;
        log::debug!("decrypted {} byte envelope", bytes.len());
        return read_package(Cursor::new(decrypted.as_slice()), &options.limits);
    }
    read_package(Cursor::new(bytes), &options.limits)
}

pub(crate) fn read_package<R: Read + Seek>(
    reader: R,
    limits: &PackageLimits,
) -> Result<PackageStore> {
    let mut archive = ZipArchive::new(reader)?;
    let store = PackageStore::new();
    let mut budget = InflateBudget::new(limits.max_total_bytes);

    for i in 0..archive.len() {
        let mut file = archive.by_index(i)?;
        if !file.is_file() {
            continue;
        }
        let name = file.name().trim_start_matches('/').to_string();
        let declared = file.size();
        let bytes = read_entry(
            &mut file,
            declared,
            &name,
            limits.max_part_bytes,
            &mut budget,
        )?;
        log::trace!("loaded part {name} ({} bytes)", bytes.len());
        store.put_bytes(name, bytes);
    }

    log::debug!(
        "loaded {} parts ({} bytes inflated)",
        store.len(),
        budget.used_bytes
    );
    Ok(store)
}

/// Read one entry without trusting its declared size.
///
/// The declared size is checked first as a fast path; the read itself is capped at one byte past
/// the effective limit so forged headers are caught too.
fn read_entry<R: Read>(
    file: R,
    declared: u64,
    part: &str,
    max_part_bytes: u64,
    budget: &mut InflateBudget,
) -> Result<Vec<u8>> {
    let remaining = budget.remaining_bytes();
    let effective_max = max_part_bytes.min(remaining);
    let limit_is_total = effective_max < max_part_bytes;

    let too_large = |size: u64| {
        if limit_is_total {
            PackageError::PackageTooLarge {
                total: budget.used_bytes.saturating_add(size),
                max: budget.max_total_bytes,
            }
        } else {
            PackageError::PartTooLarge {
                part: part.to_string(),
                size,
                max: max_part_bytes,
            }
        }
    };

    if declared > effective_max {
        return Err(too_large(declared));
    }

    let mut buf = Vec::new();
    file.take(effective_max.saturating_add(1))
        .read_to_end(&mut buf)?;
    let observed = buf.len() as u64;
    if observed > effective_max {
        return Err(too_large(observed));
    }

    budget.consume(observed)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    fn container(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::new());
        let mut zip = ZipWriter::new(&mut cursor);
        let options =
            SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);
        for (name, bytes) in entries {
            zip.start_file(*name, options).unwrap();
            zip.write_all(bytes).unwrap();
        }
        zip.add_directory("xl/media/", options).unwrap();
        zip.finish().unwrap();
        cursor.into_inner()
    }

    #[test]
    fn reads_every_file_entry_as_raw_bytes() {
        let bytes = container(&[("xl/workbook.xml", b"<workbook/>"), ("/docProps/app.xml", b"app")]);
        let store = load_store(&bytes, &Options::default()).unwrap();
        assert_eq!(store.part_names(), vec!["docProps/app.xml", "xl/workbook.xml"]);
        let content = store.get("xl/workbook.xml").unwrap();
        assert!(content.model().is_none());
        assert_eq!(&content.emitted_bytes().unwrap()[..], b"<workbook/>");
    }

    #[test]
    fn enforces_the_per_part_limit() {
        let bytes = container(&[("xl/big.bin", &[0u8; 64])]);
        let limits = PackageLimits {
            max_part_bytes: 32,
            max_total_bytes: 1024,
        };
        let err = read_package(Cursor::new(bytes), &limits).unwrap_err();
        assert!(matches!(
            err,
            PackageError::PartTooLarge { ref part, size: 64, max: 32 } if part == "xl/big.bin"
        ));
    }

    #[test]
    fn enforces_the_total_limit() {
        let bytes = container(&[("a.bin", &[1u8; 40]), ("b.bin", &[2u8; 40])]);
        let limits = PackageLimits {
            max_part_bytes: 64,
            max_total_bytes: 60,
        };
        let err = read_package(Cursor::new(bytes), &limits).unwrap_err();
        assert!(matches!(err, PackageError::PackageTooLarge { max: 60, .. }));
    }

    #[test]
    fn encrypted_input_needs_a_password() {
        let zip = container(&[("xl/workbook.xml", b"<workbook/>")]);
        let opts = sheetpack_crypto::EncryptOptions {
            key_bits: 128,
            hash_algorithm: sheetpack_crypto::HashAlgorithm::Sha1,
            spin_count: 10,
        };
        let envelope = sheetpack_crypto::encrypt_package_to_ole(&zip, "pw", &opts).unwrap();

        let err = load_store(&envelope, &Options::default()).unwrap_err();
        assert!(matches!(err, PackageError::PasswordRequired));
        let err = load_store(&envelope, &Options::default().with_password("")).unwrap_err();
        assert!(matches!(err, PackageError::PasswordRequired));

        let err = load_store(&envelope, &Options::default().with_password("nope")).unwrap_err();
        assert!(matches!(err, PackageError::Encryption(_)));

        let store = load_store(&envelope, &Options::default().with_password("pw")).unwrap();
        assert!(store.contains("xl/workbook.xml"));
    }

    #[test]
    fn garbage_is_a_zip_error() {
        let err = load_store(b"definitely not a zip", &Options::default()).unwrap_err();
        assert!(matches!(err, PackageError::Zip(_)));
    }
}
