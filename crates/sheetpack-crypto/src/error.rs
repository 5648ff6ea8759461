use thiserror::Error;

use crate::aes_cbc::AesCbcError;
use crate::crypto::CryptoError;

#[derive(Debug, Error)]
pub enum OfficeCryptoError {
    #[error("invalid password")]
    InvalidPassword,
    #[error("unsupported encryption: {0}")]
    UnsupportedEncryption(String),
    #[error("invalid encryption options: {0}")]
    InvalidOptions(String),
    #[error("invalid format: {0}")]
    InvalidFormat(String),
    #[error("integrity check failed")]
    IntegrityCheckFailed,
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error(transparent)]
    Cipher(#[from] AesCbcError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
