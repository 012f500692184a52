//! Certificate credentials for the calendar automation service identity.
//!
//! Produces the key pair and self-signed certificate the identity stage
//! attaches to the application registration, writes the public (`.cer`) and
//! passphrase-protected private (`.pfx`) artifacts, and re-opens the private
//! artifact when it is imported into the automation account.

pub mod error;
pub mod material;
pub mod passphrase;

pub use error::{CredentialError, Result};
pub use material::{
    default_artifact_name, CertificateArtifacts, IdentityMaterial, MaterialSpec, KEY_BITS,
    VALIDITY_DAYS,
};
pub use passphrase::{Passphrase, MIN_PASSPHRASE_LEN};
