//! Error types for certificate material handling.

use thiserror::Error;

/// Errors raised while generating, exporting, or re-opening identity material.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// The certificate passphrase does not meet the minimum length.
    #[error("Certificate passphrase must be at least {min} characters (got {actual})")]
    PassphraseTooShort { min: usize, actual: usize },

    /// The certificate subject or artifact name cannot be used.
    #[error("Invalid certificate name: {0}")]
    InvalidName(String),

    /// A certificate field could not be interpreted.
    #[error("Invalid certificate: {0}")]
    InvalidCertificate(String),

    /// A PKCS#12 bundle was opened but lacked a required component.
    #[error("PFX bundle is missing its {0}")]
    MissingComponent(&'static str),

    /// OpenSSL rejected an operation (key generation, signing, PKCS#12 encoding).
    #[error("Cryptographic operation failed: {0}")]
    Crypto(#[from] openssl::error::ErrorStack),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CredentialError>;
