use secrecy::{ExposeSecret, Secret};
use std::fmt;

use crate::error::{CredentialError, Result};

/// Shortest passphrase accepted for the private-key artifact.
pub const MIN_PASSPHRASE_LEN: usize = 8;

/// A validated certificate passphrase.
///
/// The only way to obtain one is [`Passphrase::new`], so holding a
/// `Passphrase` proves the length check already passed. Every private-key
/// export in this crate takes one by reference.
pub struct Passphrase(Secret<String>);

impl Passphrase {
    pub fn new(value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        let actual = value.chars().count();
        if actual < MIN_PASSPHRASE_LEN {
            return Err(CredentialError::PassphraseTooShort {
                min: MIN_PASSPHRASE_LEN,
                actual,
            });
        }
        Ok(Self(Secret::new(value)))
    }

    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}

impl fmt::Debug for Passphrase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Passphrase(<redacted>)")
    }
}
