use std::fmt;
use std::sync::Arc;

use sheetpack_crypto::EncryptOptions;
use zip::CompressionMethod;

use crate::write::PackageEncryptor;

/// Maximum allowed *inflated* size of a single part when loading a container.
pub const MAX_PACKAGE_PART_BYTES: u64 = 256 * 1024 * 1024; // 256 MiB

/// Maximum allowed *inflated* bytes across all entries of a container.
pub const MAX_PACKAGE_TOTAL_BYTES: u64 = 512 * 1024 * 1024; // 512 MiB

/// Size limits enforced while loading a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackageLimits {
    /// Maximum allowed uncompressed bytes for any single part.
    pub max_part_bytes: u64,
    /// Maximum allowed uncompressed bytes across the whole package.
    pub max_total_bytes: u64,
}

impl Default for PackageLimits {
    fn default() -> Self {
        Self {
            max_part_bytes: MAX_PACKAGE_PART_BYTES,
            max_total_bytes: MAX_PACKAGE_TOTAL_BYTES,
        }
    }
}

/// Per-call settings for opening and writing documents.
///
/// A non-empty password switches writes from streaming the container straight into the sink to
/// buffering it and wrapping it in an encrypted envelope. An empty password counts as no password.
#[derive(Clone)]
pub struct Options {
    pub password: Option<String>,
    /// Parameters for the default encryptor.
    pub encrypt: EncryptOptions,
    /// Replaces the default MS-OFFCRYPTO encryptor.
    pub encryptor: Option<Arc<dyn PackageEncryptor>>,
    pub compression: CompressionMethod,
    pub limits: PackageLimits,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            password: None,
            encrypt: EncryptOptions::default(),
            encryptor: None,
            compression: CompressionMethod::Deflated,
            limits: PackageLimits::default(),
        }
    }
}

impl Options {
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_encrypt_options(mut self, encrypt: EncryptOptions) -> Self {
        self.encrypt = encrypt;
        self
    }

    pub fn with_encryptor(mut self, encryptor: Arc<dyn PackageEncryptor>) -> Self {
        self.encryptor = Some(encryptor);
        self
    }

    pub fn with_compression(mut self, compression: CompressionMethod) -> Self {
        self.compression = compression;
        self
    }

    pub fn with_limits(mut self, limits: PackageLimits) -> Self {
        self.limits = limits;
        self
    }

    /// The password to encrypt or decrypt with, if any.
    pub fn effective_password(&self) -> Option<&str> {
        self.password.as_deref().filter(|p| !p.is_empty())
    }
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("encrypt", &self.encrypt)
            .field("encryptor", &self.encryptor.as_ref().map(|_| "<custom>"))
            .field("compression", &self.compression)
            .field("limits", &self.limits)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_output_hides_the_password() {
        let options = Options::default().with_password("hunter2");
        let debug = format!("{options:?}");
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn defaults_match_the_documented_limits() {
        let options = Options::default();
        assert_eq!(options.limits.max_part_bytes, 256 * 1024 * 1024);
        assert_eq!(options.limits.max_total_bytes, 512 * 1024 * 1024);
        assert_eq!(options.compression, CompressionMethod::Deflated);
        assert!(options.password.is_none());
    }

    #[test]
    fn empty_password_is_no_password() {
        assert_eq!(Options::default().with_password("").effective_password(), None);
        assert_eq!(
            Options::default().with_password("pw").effective_password(),
            Some("pw")
        );
    }
}
