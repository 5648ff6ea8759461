use aes::{Aes128, Aes192, Aes256};
use cipher::block_padding::NoPadding;
use cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use thiserror::Error;

pub const AES_BLOCK_SIZE: usize = 16;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AesCbcError {
    #[error("unsupported AES key length: {0} bytes (expected 16, 24, or 32)")]
    UnsupportedKeyLength(usize),
    #[error("invalid AES-CBC IV length: {0} bytes (expected 16)")]
    InvalidIvLength(usize),
    #[error("buffer length is not a multiple of 16 bytes: {0}")]
    InvalidBufferLength(usize),
}

/// Append `0x00` bytes up to the next AES block boundary.
///
/// Agile encryption pre-pads every plaintext this way; the real length is stored elsewhere.
pub fn zero_pad(mut bytes: Vec<u8>) -> Vec<u8> {
    let rem = bytes.len() % AES_BLOCK_SIZE;
    if rem != 0 {
        bytes.resize(bytes.len() + AES_BLOCK_SIZE - rem, 0u8);
    }
    bytes
}

fn check_lengths(iv: &[u8], buf: &[u8]) -> Result<(), AesCbcError> {
    if iv.len() != AES_BLOCK_SIZE {
        return Err(AesCbcError::InvalidIvLength(iv.len()));
    }
    if buf.len() % AES_BLOCK_SIZE != 0 {
        return Err(AesCbcError::InvalidBufferLength(buf.len()));
    }
    Ok(())
}

/// In-place AES-CBC encryption of a block-aligned buffer, no padding added.
pub fn encrypt_aes_cbc_no_padding_in_place(
    key: &[u8],
    iv: &[u8],
    buf: &mut [u8],
) -> Result<(), AesCbcError> {
    check_lengths(iv, buf)?;
    if buf.is_empty() {
        return Ok(());
    }
    let len = buf.len();
    let bad_key = |_| AesCbcError::UnsupportedKeyLength(key.len());
    let bad_len = |_| AesCbcError::InvalidBufferLength(len);
    match key.len() {
        16 => {
            cbc::Encryptor::<Aes128>::new_from_slices(key, iv)
                .map_err(bad_key)?
                .encrypt_padded_mut::<NoPadding>(buf, len)
                .map_err(bad_len)?;
        }
        24 => {
            cbc::Encryptor::<Aes192>::new_from_slices(key, iv)
                .map_err(bad_key)?
                .encrypt_padded_mut::<NoPadding>(buf, len)
                .map_err(bad_len)?;
        }
        32 => {
            cbc::Encryptor::<Aes256>::new_from_slices(key, iv)
                .map_err(bad_key)?
                .encrypt_padded_mut::<NoPadding>(buf, len)
                .map_err(bad_len)?;
        }
        other => return Err(AesCbcError::UnsupportedKeyLength(other)),
    }
    Ok(())
}

/// In-place AES-CBC decryption of a block-aligned buffer, no padding removed.
pub fn decrypt_aes_cbc_no_padding_in_place(
    key: &[u8],
    iv: &[u8],
    buf: &mut [u8],
) -> Result<(), AesCbcError> {
    check_lengths(iv, buf)?;
    if buf.is_empty() {
        return Ok(());
    }
    let len = buf.len();
    let bad_key = |_| AesCbcError::UnsupportedKeyLength(key.len());
    let bad_len = |_| AesCbcError::InvalidBufferLength(len);
    match key.len() {
        16 => {
            cbc::Decryptor::<Aes128>::new_from_slices(key, iv)
                .map_err(bad_key)?
                .decrypt_padded_mut::<NoPadding>(buf)
                .map_err(bad_len)?;
        }
        24 => {
            cbc::Decryptor::<Aes192>::new_from_slices(key, iv)
                .map_err(bad_key)?
                .decrypt_padded_mut::<NoPadding>(buf)
                .map_err(bad_len)?;
        }
        32 => {
            cbc::Decryptor::<Aes256>::new_from_slices(key, iv)
                .map_err(bad_key)?
                .decrypt_padded_mut::<NoPadding>(buf)
                .map_err(bad_len)?;
        }
        other => return Err(AesCbcError::UnsupportedKeyLength(other)),
    }
    Ok(())
}

/// Zero-pad `plaintext` and encrypt it.
pub fn encrypt_padded(key: &[u8], iv: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, AesCbcError> {
    let mut buf = zero_pad(plaintext.to_vec());
    encrypt_aes_cbc_no_padding_in_place(key, iv, &mut buf)?;
    Ok(buf)
}

pub fn decrypt(key: &[u8], iv: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, AesCbcError> {
    let mut buf = ciphertext.to_vec();
    decrypt_aes_cbc_no_padding_in_place(key, iv, &mut buf)?;
    Ok(buf)
}
