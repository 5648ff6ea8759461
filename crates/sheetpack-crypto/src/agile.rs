//! MS-OFFCRYPTO Agile encryption of a complete OOXML package.
//!
//! Layout produced by [`encrypt_agile_encrypted_package`]:
//! - `EncryptionInfo`: version 4.4, flags `0x40`, then the XML descriptor.
//! - `EncryptedPackage`: `LE64(plaintext_len)` followed by AES-CBC ciphertext in 4096-byte
//!   segments, each with IV `Hash(keyDataSalt || LE32(segment))`.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use rand::RngCore;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use crate::aes_cbc::{self, AES_BLOCK_SIZE};
use crate::crypto::{
    derive_iv, derive_key, derive_segment_iv, hash_password, HashAlgorithm, HMAC_KEY_BLOCK,
    HMAC_VALUE_BLOCK, KEY_VALUE_BLOCK, VERIFIER_HASH_INPUT_BLOCK, VERIFIER_HASH_VALUE_BLOCK,
};
use crate::error::OfficeCryptoError;
use crate::EncryptOptions;

const SEGMENT_LEN: usize = 4096;
const SALT_LEN: usize = 16;
const VERSION_MAJOR: u16 = 4;
const VERSION_MINOR: u16 = 4;
const AGILE_FLAGS: u32 = 0x40;

const ENCRYPTION_NS: &str = "http://schemas.microsoft.com/office/2006/encryption";
const PASSWORD_NS: &str = "http://schemas.microsoft.com/office/2006/keyEncryptor/password";

/// Parameters shared by `keyData` and the password `encryptedKey` element.
#[derive(Debug, Clone)]
pub(crate) struct CipherParams {
    pub(crate) salt: Vec<u8>,
    pub(crate) block_size: usize,
    pub(crate) key_bits: usize,
    pub(crate) hash_size: usize,
    pub(crate) hash_algorithm: HashAlgorithm,
}

impl CipherParams {
    fn key_len(&self) -> usize {
        self.key_bits / 8
    }

    fn iv(&self) -> &[u8] {
        // Password key-encryptor blobs use the salt itself as IV.
        &self.salt[..self.block_size]
    }
}

#[derive(Debug, Clone)]
pub(crate) struct PasswordKeyEncryptor {
    pub(crate) params: CipherParams,
    pub(crate) spin_count: u32,
    pub(crate) encrypted_verifier_hash_input: Vec<u8>,
    pub(crate) encrypted_verifier_hash_value: Vec<u8>,
    pub(crate) encrypted_key_value: Vec<u8>,
}

#[derive(Debug, Clone)]
pub(crate) struct DataIntegrity {
    pub(crate) encrypted_hmac_key: Vec<u8>,
    pub(crate) encrypted_hmac_value: Vec<u8>,
}

#[derive(Debug, Clone)]
pub(crate) struct AgileEncryptionInfo {
    pub(crate) key_data: CipherParams,
    pub(crate) data_integrity: Option<DataIntegrity>,
    pub(crate) password: PasswordKeyEncryptor,
}

fn random_bytes(len: usize) -> Vec<u8> {
    let mut out = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut out);
    out
}

/// Encrypt `package` and return the `(EncryptionInfo, EncryptedPackage)` stream payloads.
pub(crate) fn encrypt_agile_encrypted_package(
    package: &[u8],
    password: &str,
    opts: &EncryptOptions,
) -> Result<(Vec<u8>, Vec<u8>), OfficeCryptoError> {
    if !matches!(opts.key_bits, 128 | 192 | 256) {
        return Err(OfficeCryptoError::InvalidOptions(format!(
            "key_bits must be 128, 192, or 256 (got {})",
            opts.key_bits
        )));
    }

    let hash_algorithm = opts.hash_algorithm;
    let params = |salt: Vec<u8>| CipherParams {
        salt,
        block_size: AES_BLOCK_SIZE,
        key_bits: opts.key_bits,
        hash_size: hash_algorithm.digest_len(),
        hash_algorithm,
    };
    let key_data = params(random_bytes(SALT_LEN));
    let ke_params = params(random_bytes(SALT_LEN));
    let package_key = Zeroizing::new(random_bytes(key_data.key_len()));

    let encrypted_package = encrypt_segments(package, &package_key, &key_data)?;

    // Password verifier + wrapped package key.
    let pw_hash = Zeroizing::new(hash_password(
        password,
        &ke_params.salt,
        opts.spin_count,
        hash_algorithm,
    )?);
    let wrap = |block: &[u8], plaintext: &[u8]| -> Result<Vec<u8>, OfficeCryptoError> {
        let key = Zeroizing::new(derive_key(&pw_hash, block, ke_params.key_len(), hash_algorithm)?);
        Ok(aes_cbc::encrypt_padded(&key, ke_params.iv(), plaintext)?)
    };
    let verifier_input = random_bytes(SALT_LEN);
    let verifier_hash = hash_algorithm.hash(&verifier_input);
    let password_encryptor = PasswordKeyEncryptor {
        encrypted_verifier_hash_input: wrap(&VERIFIER_HASH_INPUT_BLOCK, &verifier_input)?,
        encrypted_verifier_hash_value: wrap(&VERIFIER_HASH_VALUE_BLOCK, &verifier_hash)?,
        encrypted_key_value: wrap(&KEY_VALUE_BLOCK, &package_key)?,
        params: ke_params.clone(),
        spin_count: opts.spin_count,
    };

    // dataIntegrity: HMAC over the whole EncryptedPackage stream.
    let hmac_key = Zeroizing::new(random_bytes(key_data.hash_size));
    let hmac_value = hash_algorithm.hmac(&hmac_key, &encrypted_package)?;
    let data_integrity = DataIntegrity {
        encrypted_hmac_key: encrypt_with_package_key(
            &package_key,
            &key_data,
            &HMAC_KEY_BLOCK,
            &hmac_key,
        )?,
        encrypted_hmac_value: encrypt_with_package_key(
            &package_key,
            &key_data,
            &HMAC_VALUE_BLOCK,
            &hmac_value,
        )?,
    };

    let info = AgileEncryptionInfo {
        key_data,
        data_integrity: Some(data_integrity),
        password: password_encryptor,
    };
    Ok((encryption_info_stream(&info), encrypted_package))
}

fn encrypt_with_package_key(
    package_key: &[u8],
    key_data: &CipherParams,
    block_key: &[u8],
    plaintext: &[u8],
) -> Result<Vec<u8>, OfficeCryptoError> {
    let iv = derive_iv(&key_data.salt, block_key, key_data.block_size, key_data.hash_algorithm)?;
    Ok(aes_cbc::encrypt_padded(package_key, &iv, plaintext)?)
}

fn decrypt_with_package_key(
    package_key: &[u8],
    key_data: &CipherParams,
    block_key: &[u8],
    ciphertext: &[u8],
) -> Result<Vec<u8>, OfficeCryptoError> {
    let iv = derive_iv(&key_data.salt, block_key, key_data.block_size, key_data.hash_algorithm)?;
    Ok(aes_cbc::decrypt(package_key, &iv, ciphertext)?)
}

fn encrypt_segments(
    package: &[u8],
    package_key: &[u8],
    key_data: &CipherParams,
) -> Result<Vec<u8>, OfficeCryptoError> {
    let padded_len = package.len().div_ceil(AES_BLOCK_SIZE) * AES_BLOCK_SIZE;
    let mut out = Vec::with_capacity(8 + padded_len);
    out.extend_from_slice(&(package.len() as u64).to_le_bytes());

    for (index, chunk) in package.chunks(SEGMENT_LEN).enumerate() {
        let segment = u32::try_from(index).map_err(|_| {
            OfficeCryptoError::InvalidFormat("package has too many segments".to_string())
        })?;
        let iv = derive_segment_iv(
            &key_data.salt,
            segment,
            key_data.block_size,
            key_data.hash_algorithm,
        )?;
        out.extend_from_slice(&aes_cbc::encrypt_padded(package_key, &iv, chunk)?);
    }
    Ok(out)
}

fn decrypt_segments(
    encrypted_package: &[u8],
    package_key: &[u8],
    key_data: &CipherParams,
) -> Result<Vec<u8>, OfficeCryptoError> {
    if encrypted_package.len() < 8 {
        return Err(invalid("EncryptedPackage stream too short"));
    }
    let (size_bytes, ciphertext) = encrypted_package.split_at(8);
    let mut size = [0u8; 8];
    size.copy_from_slice(size_bytes);
    let size = u64::from_le_bytes(size);
    if size > ciphertext.len() as u64 {
        return Err(OfficeCryptoError::InvalidFormat(format!(
            "EncryptedPackage declares {size} bytes but only {} are present",
            ciphertext.len()
        )));
    }

    let mut out = Vec::with_capacity(ciphertext.len());
    for (index, chunk) in ciphertext.chunks(SEGMENT_LEN).enumerate() {
        let segment = u32::try_from(index).map_err(|_| {
            OfficeCryptoError::InvalidFormat("package has too many segments".to_string())
        })?;
        let iv = derive_segment_iv(
            &key_data.salt,
            segment,
            key_data.block_size,
            key_data.hash_algorithm,
        )?;
        out.extend_from_slice(&aes_cbc::decrypt(package_key, &iv, chunk)?);
    }
    // `size <= ciphertext.len()` was checked above, so this fits in usize.
    out.truncate(size as usize);
    Ok(out)
}

fn encryption_info_stream(info: &AgileEncryptionInfo) -> Vec<u8> {
    let key_data = &info.key_data;
    let pw = &info.password;
    let integrity = info
        .data_integrity
        .as_ref()
        .map(|d| {
            format!(
                r#"<dataIntegrity encryptedHmacKey="{}" encryptedHmacValue="{}"/>"#,
                BASE64.encode(&d.encrypted_hmac_key),
                BASE64.encode(&d.encrypted_hmac_value)
            )
        })
        .unwrap_or_default();

    let xml = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<encryption xmlns="{ENCRYPTION_NS}" xmlns:p="{PASSWORD_NS}"><keyData saltSize="{kd_salt_size}" blockSize="{kd_block}" keyBits="{kd_bits}" hashSize="{kd_hash_size}" cipherAlgorithm="AES" cipherChaining="ChainingModeCBC" hashAlgorithm="{kd_hash}" saltValue="{kd_salt}"/>{integrity}<keyEncryptors><keyEncryptor uri="{PASSWORD_NS}"><p:encryptedKey spinCount="{spin}" saltSize="{ke_salt_size}" blockSize="{ke_block}" keyBits="{ke_bits}" hashSize="{ke_hash_size}" cipherAlgorithm="AES" cipherChaining="ChainingModeCBC" hashAlgorithm="{ke_hash}" saltValue="{ke_salt}" encryptedVerifierHashInput="{evhi}" encryptedVerifierHashValue="{evhv}" encryptedKeyValue="{ekv}"/></keyEncryptor></keyEncryptors></encryption>"#,
        kd_salt_size = key_data.salt.len(),
        kd_block = key_data.block_size,
        kd_bits = key_data.key_bits,
        kd_hash_size = key_data.hash_size,
        kd_hash = key_data.hash_algorithm.as_offcrypto_name(),
        kd_salt = BASE64.encode(&key_data.salt),
        spin = pw.spin_count,
        ke_salt_size = pw.params.salt.len(),
        ke_block = pw.params.block_size,
        ke_bits = pw.params.key_bits,
        ke_hash_size = pw.params.hash_size,
        ke_hash = pw.params.hash_algorithm.as_offcrypto_name(),
        ke_salt = BASE64.encode(&pw.params.salt),
        evhi = BASE64.encode(&pw.encrypted_verifier_hash_input),
        evhv = BASE64.encode(&pw.encrypted_verifier_hash_value),
        ekv = BASE64.encode(&pw.encrypted_key_value),
    );

    let mut out = Vec::with_capacity(8 + xml.len());
    out.extend_from_slice(&VERSION_MAJOR.to_le_bytes());
    out.extend_from_slice(&VERSION_MINOR.to_le_bytes());
    out.extend_from_slice(&AGILE_FLAGS.to_le_bytes());
    out.extend_from_slice(xml.as_bytes());
    out
}

fn invalid(msg: impl Into<String>) -> OfficeCryptoError {
    OfficeCryptoError::InvalidFormat(msg.into())
}

fn required_attr<'a>(node: roxmltree::Node<'a, '_>, name: &str) -> Result<&'a str, OfficeCryptoError> {
    node.attribute(name).ok_or_else(|| {
        invalid(format!(
            "<{}> is missing the {name} attribute",
            node.tag_name().name()
        ))
    })
}

fn usize_attr(node: roxmltree::Node<'_, '_>, name: &str) -> Result<usize, OfficeCryptoError> {
    let raw = required_attr(node, name)?;
    raw.trim()
        .parse()
        .map_err(|_| invalid(format!("{name}={raw:?} is not a number")))
}

fn b64_attr(node: roxmltree::Node<'_, '_>, name: &str) -> Result<Vec<u8>, OfficeCryptoError> {
    let raw = required_attr(node, name)?;
    let compact: String = raw.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    BASE64
        .decode(compact.as_bytes())
        .map_err(|err| invalid(format!("{name} is not valid base64: {err}")))
}

fn parse_cipher_params(node: roxmltree::Node<'_, '_>) -> Result<CipherParams, OfficeCryptoError> {
    let cipher = required_attr(node, "cipherAlgorithm")?;
    if !cipher.eq_ignore_ascii_case("AES") {
        return Err(OfficeCryptoError::UnsupportedEncryption(format!(
            "cipherAlgorithm {cipher}"
        )));
    }
    let chaining = required_attr(node, "cipherChaining")?;
    if chaining != "ChainingModeCBC" {
        return Err(OfficeCryptoError::UnsupportedEncryption(format!(
            "cipherChaining {chaining}"
        )));
    }

    let params = CipherParams {
        salt: b64_attr(node, "saltValue")?,
        block_size: usize_attr(node, "blockSize")?,
        key_bits: usize_attr(node, "keyBits")?,
        hash_size: usize_attr(node, "hashSize")?,
        hash_algorithm: HashAlgorithm::parse_offcrypto_name(required_attr(node, "hashAlgorithm")?)?,
    };
    if params.block_size != AES_BLOCK_SIZE || params.salt.len() < params.block_size {
        return Err(invalid("blockSize must be 16 and saltValue at least one block"));
    }
    if !matches!(params.key_bits, 128 | 192 | 256) {
        return Err(OfficeCryptoError::UnsupportedEncryption(format!(
            "keyBits {}",
            params.key_bits
        )));
    }
    if params.hash_size != params.hash_algorithm.digest_len() {
        return Err(invalid(format!(
            "hashSize {} does not match {}",
            params.hash_size,
            params.hash_algorithm.as_offcrypto_name()
        )));
    }
    Ok(params)
}

/// Parse an `EncryptionInfo` stream carrying an Agile descriptor.
pub(crate) fn parse_agile_encryption_info(
    stream: &[u8],
) -> Result<AgileEncryptionInfo, OfficeCryptoError> {
    if stream.len() < 8 {
        return Err(invalid("EncryptionInfo stream too short"));
    }
    let major = u16::from_le_bytes([stream[0], stream[1]]);
    let minor = u16::from_le_bytes([stream[2], stream[3]]);
    if (major, minor) != (VERSION_MAJOR, VERSION_MINOR) {
        return Err(OfficeCryptoError::UnsupportedEncryption(format!(
            "EncryptionInfo version {major}.{minor} (only Agile 4.4 is supported)"
        )));
    }

    let xml = std::str::from_utf8(&stream[8..])
        .map_err(|_| invalid("EncryptionInfo descriptor is not UTF-8"))?
        .trim_end_matches('\0');
    let doc = roxmltree::Document::parse(xml)
        .map_err(|err| invalid(format!("EncryptionInfo descriptor is not XML: {err}")))?;

    let find = |ns: &str, name: &str| {
        doc.descendants()
            .find(|n| n.is_element() && n.tag_name().name() == name && n.tag_name().namespace() == Some(ns))
    };
    let key_data = find(ENCRYPTION_NS, "keyData").ok_or_else(|| invalid("missing <keyData>"))?;
    let encrypted_key = find(PASSWORD_NS, "encryptedKey")
        .ok_or_else(|| invalid("missing password <encryptedKey>"))?;

    let data_integrity = match find(ENCRYPTION_NS, "dataIntegrity") {
        Some(node) => Some(DataIntegrity {
            encrypted_hmac_key: b64_attr(node, "encryptedHmacKey")?,
            encrypted_hmac_value: b64_attr(node, "encryptedHmacValue")?,
        }),
        None => None,
    };

    let spin_count = required_attr(encrypted_key, "spinCount")?
        .trim()
        .parse()
        .map_err(|_| invalid("spinCount is not a number"))?;

    Ok(AgileEncryptionInfo {
        key_data: parse_cipher_params(key_data)?,
        data_integrity,
        password: PasswordKeyEncryptor {
            params: parse_cipher_params(encrypted_key)?,
            spin_count,
            encrypted_verifier_hash_input: b64_attr(encrypted_key, "encryptedVerifierHashInput")?,
            encrypted_verifier_hash_value: b64_attr(encrypted_key, "encryptedVerifierHashValue")?,
            encrypted_key_value: b64_attr(encrypted_key, "encryptedKeyValue")?,
        },
    })
}

/// Verify `password`, check the HMAC, and return the decrypted package bytes.
pub(crate) fn decrypt_agile_encrypted_package(
    info: &AgileEncryptionInfo,
    encrypted_package: &[u8],
    password: &str,
) -> Result<Vec<u8>, OfficeCryptoError> {
    let ke = &info.password.params;
    let pw_hash = Zeroizing::new(hash_password(
        password,
        &ke.salt,
        info.password.spin_count,
        ke.hash_algorithm,
    )?);
    let unwrap = |block: &[u8], ciphertext: &[u8]| -> Result<Vec<u8>, OfficeCryptoError> {
        let key = Zeroizing::new(derive_key(&pw_hash, block, ke.key_len(), ke.hash_algorithm)?);
        Ok(aes_cbc::decrypt(&key, ke.iv(), ciphertext)?)
    };

    let mut verifier_input = unwrap(
        &VERIFIER_HASH_INPUT_BLOCK,
        &info.password.encrypted_verifier_hash_input,
    )?;
    verifier_input.truncate(ke.salt.len());
    let mut verifier_hash = unwrap(
        &VERIFIER_HASH_VALUE_BLOCK,
        &info.password.encrypted_verifier_hash_value,
    )?;
    verifier_hash.truncate(ke.hash_size);
    let expected = ke.hash_algorithm.hash(&verifier_input);
    if !bool::from(expected.as_slice().ct_eq(verifier_hash.as_slice())) {
        return Err(OfficeCryptoError::InvalidPassword);
    }

    let mut package_key = Zeroizing::new(unwrap(&KEY_VALUE_BLOCK, &info.password.encrypted_key_value)?);
    let key_len = info.key_data.key_len();
    if package_key.len() < key_len {
        return Err(invalid("encryptedKeyValue is shorter than keyBits"));
    }
    package_key.truncate(key_len);

    if let Some(integrity) = &info.data_integrity {
        let key_data = &info.key_data;
        let mut hmac_key = Zeroizing::new(decrypt_with_package_key(
            &package_key,
            key_data,
            &HMAC_KEY_BLOCK,
            &integrity.encrypted_hmac_key,
        )?);
        hmac_key.truncate(key_data.hash_size);
        let mut stored = decrypt_with_package_key(
            &package_key,
            key_data,
            &HMAC_VALUE_BLOCK,
            &integrity.encrypted_hmac_value,
        )?;
        stored.truncate(key_data.hash_size);
        let actual = key_data.hash_algorithm.hmac(&hmac_key, encrypted_package)?;
        if !bool::from(actual.as_slice().ct_eq(stored.as_slice())) {
            return Err(OfficeCryptoError::IntegrityCheckFailed);
        }
    }

    decrypt_segments(encrypted_package, &package_key, &info.key_data)
}
