//! Password hashing and key/IV derivation for MS-OFFCRYPTO "Agile Encryption".
//!
//! References:
//! - MS-OFFCRYPTO: https://learn.microsoft.com/en-us/openspecs/office_file_formats/ms-offcrypto/

use hmac::{Hmac, Mac};

/// Hash algorithms accepted by the Agile descriptor (`hashAlgorithm` attribute).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    Sha1,
    Sha256,
    Sha384,
    Sha512,
}

impl HashAlgorithm {
    /// Parse a descriptor hash name. Names are case-insensitive (`SHA512`, `sha-256`).
    pub fn parse_offcrypto_name(name: &str) -> Result<Self, CryptoError> {
        let normalized = name.trim().to_ascii_lowercase().replace(['-', '_'], "");
        match normalized.as_str() {
            "sha1" => Ok(Self::Sha1),
            "sha256" => Ok(Self::Sha256),
            "sha384" => Ok(Self::Sha384),
            "sha512" => Ok(Self::Sha512),
            other => Err(CryptoError::UnsupportedHashAlgorithm(other.to_string())),
        }
    }

    /// Name written into the descriptor.
    pub fn as_offcrypto_name(self) -> &'static str {
        match self {
            HashAlgorithm::Sha1 => "SHA1",
            HashAlgorithm::Sha256 => "SHA256",
            HashAlgorithm::Sha384 => "SHA384",
            HashAlgorithm::Sha512 => "SHA512",
        }
    }

    pub fn digest_len(self) -> usize {
        match self {
            HashAlgorithm::Sha1 => 20,
            HashAlgorithm::Sha256 => 32,
            HashAlgorithm::Sha384 => 48,
            HashAlgorithm::Sha512 => 64,
        }
    }

    pub(crate) fn hash(self, bytes: &[u8]) -> Vec<u8> {
        self.hash_two(bytes, &[])
    }

    fn hash_two(self, a: &[u8], b: &[u8]) -> Vec<u8> {
        fn run<D: digest::Digest>(a: &[u8], b: &[u8]) -> Vec<u8> {
            let mut h = D::new();
            h.update(a);
            h.update(b);
            h.finalize().to_vec()
        }

        match self {
            HashAlgorithm::Sha1 => run::<sha1::Sha1>(a, b),
            HashAlgorithm::Sha256 => run::<sha2::Sha256>(a, b),
            HashAlgorithm::Sha384 => run::<sha2::Sha384>(a, b),
            HashAlgorithm::Sha512 => run::<sha2::Sha512>(a, b),
        }
    }

    /// HMAC over `data`, used for the `dataIntegrity` element.
    pub(crate) fn hmac(self, key: &[u8], data: &[u8]) -> Result<Vec<u8>, CryptoError> {
        fn run<M: Mac + hmac::digest::KeyInit>(key: &[u8], data: &[u8]) -> Result<Vec<u8>, CryptoError> {
            let mut mac = <M as Mac>::new_from_slice(key)
                .map_err(|_| CryptoError::InvalidParameter("hmac key length"))?;
            mac.update(data);
            Ok(mac.finalize().into_bytes().to_vec())
        }

        match self {
            HashAlgorithm::Sha1 => run::<Hmac<sha1::Sha1>>(key, data),
            HashAlgorithm::Sha256 => run::<Hmac<sha2::Sha256>>(key, data),
            HashAlgorithm::Sha384 => run::<Hmac<sha2::Sha384>>(key, data),
            HashAlgorithm::Sha512 => run::<Hmac<sha2::Sha512>>(key, data),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("unsupported hash algorithm: {0}")]
    UnsupportedHashAlgorithm(String),
    #[error("invalid parameter: {0}")]
    InvalidParameter(&'static str),
}

/// Block key for the `encryptedVerifierHashInput` key.
pub const VERIFIER_HASH_INPUT_BLOCK: [u8; 8] = [0xFE, 0xA7, 0xD2, 0x76, 0x3B, 0x4B, 0x9E, 0x79];
/// Block key for the `encryptedVerifierHashValue` key.
pub const VERIFIER_HASH_VALUE_BLOCK: [u8; 8] = [0xD7, 0xAA, 0x0F, 0x6D, 0x30, 0x61, 0x34, 0x4E];
/// Block key for the `encryptedKeyValue` key.
pub const KEY_VALUE_BLOCK: [u8; 8] = [0x14, 0x6E, 0x0B, 0xE7, 0xAB, 0xAC, 0xD0, 0xD6];
/// Block key for the `encryptedHmacKey` IV.
pub const HMAC_KEY_BLOCK: [u8; 8] = [0x5F, 0xB2, 0xAD, 0x01, 0x0C, 0xB9, 0xE1, 0xF6];
/// Block key for the `encryptedHmacValue` IV.
pub const HMAC_VALUE_BLOCK: [u8; 8] = [0xA0, 0x67, 0x7F, 0x02, 0xB2, 0x2C, 0x84, 0x33];

fn password_utf16le_bytes(password: &str) -> Vec<u8> {
    // UTF-16LE, no BOM, no terminator.
    let mut out = Vec::with_capacity(password.len().saturating_mul(2));
    for ch in password.encode_utf16() {
        out.extend_from_slice(&ch.to_le_bytes());
    }
    out
}

/// `H0 = Hash(salt || UTF16LE(password))`, then `spin` rounds of `H = Hash(LE32(i) || H)`.
pub fn hash_password(
    password: &str,
    salt: &[u8],
    spin: u32,
    hash_alg: HashAlgorithm,
) -> Result<Vec<u8>, CryptoError> {
    if salt.is_empty() {
        return Err(CryptoError::InvalidParameter("salt must be non-empty"));
    }

    let pw = password_utf16le_bytes(password);
    let mut h = hash_alg.hash_two(salt, &pw);
    for i in 0..spin {
        h = hash_alg.hash_two(&i.to_le_bytes(), &h);
    }
    Ok(h)
}

fn fit_len(mut bytes: Vec<u8>, len: usize) -> Vec<u8> {
    // Truncate, or pad with 0x00 when the digest is shorter than requested.
    bytes.resize(len, 0u8);
    bytes
}

/// `K = Hash(H || blockKey)` fitted to `key_len`.
pub fn derive_key(
    h: &[u8],
    block_key: &[u8],
    key_len: usize,
    hash_alg: HashAlgorithm,
) -> Result<Vec<u8>, CryptoError> {
    if h.is_empty() {
        return Err(CryptoError::InvalidParameter("password hash must be non-empty"));
    }
    if block_key.is_empty() {
        return Err(CryptoError::InvalidParameter("block_key must be non-empty"));
    }
    Ok(fit_len(hash_alg.hash_two(h, block_key), key_len))
}

/// `IV = Hash(salt || blockKey)` fitted to `iv_len`.
pub fn derive_iv(
    salt: &[u8],
    block_key: &[u8],
    iv_len: usize,
    hash_alg: HashAlgorithm,
) -> Result<Vec<u8>, CryptoError> {
    if salt.is_empty() {
        return Err(CryptoError::InvalidParameter("salt must be non-empty"));
    }
    if block_key.is_empty() {
        return Err(CryptoError::InvalidParameter("block_key must be non-empty"));
    }
    Ok(fit_len(hash_alg.hash_two(salt, block_key), iv_len))
}

/// IV for `EncryptedPackage` segment `segment_index` (block key `LE32(index)`).
pub fn derive_segment_iv(
    salt: &[u8],
    segment_index: u32,
    iv_len: usize,
    hash_alg: HashAlgorithm,
) -> Result<Vec<u8>, CryptoError> {
    derive_iv(salt, &segment_index.to_le_bytes(), iv_len, hash_alg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_is_utf16le_without_bom_or_terminator() {
        assert_eq!(password_utf16le_bytes("AB"), vec![0x41, 0x00, 0x42, 0x00]);
        assert_eq!(password_utf16le_bytes("😀"), vec![0x3D, 0xD8, 0x00, 0xDE]);
    }

    #[test]
    fn spin_count_changes_password_hash() {
        let salt = [0x11u8; 16];
        let h0 = hash_password("password", &salt, 0, HashAlgorithm::Sha512).unwrap();
        let h1 = hash_password("password", &salt, 1, HashAlgorithm::Sha512).unwrap();
        assert_ne!(h0, h1);
        assert_eq!(h0.len(), 64);
    }

    #[test]
    fn derive_key_truncates_and_zero_pads() {
        let h = vec![0x22u8; 20];
        let full = derive_key(&h, &KEY_VALUE_BLOCK, 20, HashAlgorithm::Sha1).unwrap();
        let short = derive_key(&h, &KEY_VALUE_BLOCK, 16, HashAlgorithm::Sha1).unwrap();
        let long = derive_key(&h, &KEY_VALUE_BLOCK, 32, HashAlgorithm::Sha1).unwrap();
        assert_eq!(&full[..16], short.as_slice());
        assert_eq!(&long[..20], full.as_slice());
        assert_eq!(&long[20..], &[0u8; 12]);
    }

    #[test]
    fn segment_iv_matches_generic_derivation() {
        let salt = [0x44u8; 16];
        let a = derive_segment_iv(&salt, 7, 16, HashAlgorithm::Sha256).unwrap();
        let b = derive_iv(&salt, &7u32.to_le_bytes(), 16, HashAlgorithm::Sha256).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn rejects_empty_salt_or_block_key() {
        assert!(matches!(
            hash_password("pw", &[], 0, HashAlgorithm::Sha1),
            Err(CryptoError::InvalidParameter(_))
        ));
        assert!(matches!(
            derive_iv(&[1], &[], 16, HashAlgorithm::Sha1),
            Err(CryptoError::InvalidParameter(_))
        ));
    }

    #[test]
    fn hash_names_round_trip() {
        for alg in [
            HashAlgorithm::Sha1,
            HashAlgorithm::Sha256,
            HashAlgorithm::Sha384,
            HashAlgorithm::Sha512,
        ] {
            assert_eq!(HashAlgorithm::parse_offcrypto_name(alg.as_offcrypto_name()).unwrap(), alg);
        }
        assert_eq!(
            HashAlgorithm::parse_offcrypto_name("sha-256").unwrap(),
            HashAlgorithm::Sha256
        );
        assert!(HashAlgorithm::parse_offcrypto_name("md5").is_err());
    }

    #[test]
    fn hmac_output_matches_digest_len() {
        let mac = HashAlgorithm::Sha384.hmac(b"key", b"data").unwrap();
        assert_eq!(mac.len(), HashAlgorithm::Sha384.digest_len());
    }
}
