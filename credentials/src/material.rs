//! Key pair and self-signed certificate generation.
//!
//! The service identity authenticates with a certificate rather than a
//! client secret. This module produces that certificate and its two on-disk
//! encodings:
//!
//! - `<name>.cer`: DER-encoded public certificate, attached to the
//!   application registration as a key credential.
//! - `<name>.pfx`: PKCS#12 bundle holding the private key, always protected
//!   by a [`Passphrase`].

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::{DateTime, Utc};
use openssl::asn1::{Asn1Time, Asn1TimeRef};
use openssl::bn::{BigNum, MsbOption};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkcs12::Pkcs12;
use openssl::pkey::{PKey, Private};
use openssl::rsa::Rsa;
use openssl::x509::extension::{
    BasicConstraints, ExtendedKeyUsage, KeyUsage, SubjectKeyIdentifier,
};
use openssl::x509::{X509NameBuilder, X509};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{CredentialError, Result};
use crate::passphrase::Passphrase;

/// RSA modulus size for generated keys.
pub const KEY_BITS: u32 = 2048;

/// Validity window of generated certificates (two years).
pub const VALIDITY_DAYS: u32 = 730;

/// Parameters for [`IdentityMaterial::generate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaterialSpec {
    /// Common name placed in both subject and issuer (self-signed).
    pub subject: String,
    pub key_bits: u32,
    pub validity_days: u32,
}

impl MaterialSpec {
    /// The standard spec for a service identity: CN=<display name>,
    /// 2048-bit RSA, two-year validity.
    pub fn for_display_name(display_name: &str) -> Self {
        Self {
            subject: display_name.trim().to_string(),
            key_bits: KEY_BITS,
            validity_days: VALIDITY_DAYS,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.subject.is_empty() {
            return Err(CredentialError::InvalidName(
                "certificate subject cannot be empty".to_string(),
            ));
        }
        if self.subject.chars().any(char::is_control) {
            return Err(CredentialError::InvalidName(format!(
                "certificate subject '{}' contains control characters",
                self.subject.escape_debug()
            )));
        }
        Ok(())
    }
}

/// Paths and metadata of the exported certificate files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateArtifacts {
    pub name: String,
    /// Public-only DER certificate (`.cer`).
    pub public_path: PathBuf,
    /// Passphrase-protected PKCS#12 bundle (`.pfx`).
    pub private_path: PathBuf,
    /// Upper-case hex SHA-1 thumbprint.
    pub thumbprint: String,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
}

/// A private key together with the self-signed certificate over it.
pub struct IdentityMaterial {
    subject: String,
    key: PKey<Private>,
    certificate: X509,
}

impl IdentityMaterial {
    /// Generate a fresh RSA key and a SHA-256 signed, self-signed certificate.
    pub fn generate(spec: &MaterialSpec) -> Result<Self> {
        spec.validate()?;
        debug!(subject = %spec.subject, bits = spec.key_bits, "Generating RSA key pair");

        let rsa = Rsa::generate(spec.key_bits)?;
        let key = PKey::from_rsa(rsa)?;

        let mut name = X509NameBuilder::new()?;
        name.append_entry_by_nid(Nid::COMMONNAME, &spec.subject)?;
        let name = name.build();

        let serial = {
            let mut serial = BigNum::new()?;
            serial.rand(159, MsbOption::MAYBE_ZERO, false)?;
            serial.to_asn1_integer()?
        };

        let mut builder = X509::builder()?;
        builder.set_version(2)?;
        builder.set_serial_number(&serial)?;
        builder.set_subject_name(&name)?;
        builder.set_issuer_name(&name)?;
        builder.set_pubkey(&key)?;
        let not_before = Asn1Time::days_from_now(0)?;
        let not_after = Asn1Time::days_from_now(spec.validity_days)?;
        builder.set_not_before(&not_before)?;
        builder.set_not_after(&not_after)?;
        builder.append_extension(BasicConstraints::new().critical().build()?)?;
        builder.append_extension(
            KeyUsage::new()
                .critical()
                .digital_signature()
                .key_encipherment()
                .build()?,
        )?;
        builder.append_extension(ExtendedKeyUsage::new().client_auth().build()?)?;
        let subject_key_id =
            SubjectKeyIdentifier::new().build(&builder.x509v3_context(None, None))?;
        builder.append_extension(subject_key_id)?;
        builder.sign(&key, MessageDigest::sha256())?;

        let material = Self {
            subject: spec.subject.clone(),
            key,
            certificate: builder.build(),
        };
        info!(
            subject = %material.subject,
            thumbprint = %material.thumbprint()?,
            "Generated self-signed certificate"
        );
        Ok(material)
    }

    /// Re-open a PKCS#12 bundle written by [`IdentityMaterial::export`].
    ///
    /// Fails with a crypto error when the passphrase is wrong.
    pub fn from_pfx(path: &Path, passphrase: &Passphrase) -> Result<Self> {
        let der = fs::read(path)?;
        let parsed = Pkcs12::from_der(&der)?.parse2(passphrase.expose())?;
        let key = parsed
            .pkey
            .ok_or(CredentialError::MissingComponent("private key"))?;
        let certificate = parsed
            .cert
            .ok_or(CredentialError::MissingComponent("certificate"))?;
        let subject = certificate
            .subject_name()
            .entries_by_nid(Nid::COMMONNAME)
            .next()
            .and_then(|entry| entry.data().as_utf8().ok())
            .map(|cn| cn.to_string())
            .unwrap_or_default();
        Ok(Self {
            subject,
            key,
            certificate,
        })
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn not_before(&self) -> Result<DateTime<Utc>> {
        asn1_to_utc(self.certificate.not_before())
    }

    pub fn not_after(&self) -> Result<DateTime<Utc>> {
        asn1_to_utc(self.certificate.not_after())
    }

    /// Upper-case hex SHA-1 digest of the DER certificate.
    pub fn thumbprint(&self) -> Result<String> {
        let digest = self.certificate.digest(MessageDigest::sha1())?;
        Ok(hex::encode_upper(&digest[..]))
    }

    /// Base64 of the raw thumbprint bytes, as directory key credentials expect
    /// for `customKeyIdentifier`.
    pub fn custom_key_identifier(&self) -> Result<String> {
        let digest = self.certificate.digest(MessageDigest::sha1())?;
        Ok(BASE64.encode(&digest[..]))
    }

    pub fn public_der(&self) -> Result<Vec<u8>> {
        Ok(self.certificate.to_der()?)
    }

    /// Base64 of the DER certificate, the `key` value of a key credential.
    pub fn public_base64(&self) -> Result<String> {
        Ok(BASE64.encode(self.public_der()?))
    }

    /// Encode key and certificate as a passphrase-protected PKCS#12 bundle.
    pub fn to_pfx(&self, passphrase: &Passphrase) -> Result<Vec<u8>> {
        self.encode_pkcs12(passphrase.expose())
    }

    /// PKCS#12 payload for an in-flight certificate upload.
    ///
    /// The resource manager expects the bundle without a password; the result
    /// is only ever sent over TLS and is never written to disk.
    pub fn to_import_pkcs12(&self) -> Result<Vec<u8>> {
        self.encode_pkcs12("")
    }

    fn encode_pkcs12(&self, password: &str) -> Result<Vec<u8>> {
        let mut builder = Pkcs12::builder();
        builder.name(&self.subject);
        builder.pkey(&self.key);
        builder.cert(&self.certificate);
        let pkcs12 = builder.build2(password)?;
        Ok(pkcs12.to_der()?)
    }

    /// Write `<name>.cer` and `<name>.pfx` into `dir`, creating it if needed.
    pub fn export(
        &self,
        dir: &Path,
        name: &str,
        passphrase: &Passphrase,
    ) -> Result<CertificateArtifacts> {
        validate_artifact_name(name)?;
        fs::create_dir_all(dir)?;

        let public_path = dir.join(format!("{}.cer", name));
        fs::write(&public_path, self.public_der()?)?;

        let private_path = dir.join(format!("{}.pfx", name));
        write_private(&private_path, &self.to_pfx(passphrase)?)?;

        info!(
            public = %public_path.display(),
            private = %private_path.display(),
            "Exported certificate artifacts"
        );

        Ok(CertificateArtifacts {
            name: name.to_string(),
            public_path,
            private_path,
            thumbprint: self.thumbprint()?,
            not_before: self.not_before()?,
            not_after: self.not_after()?,
        })
    }
}

/// Derive a file-system and resource-name safe artifact name from a display
/// name: lower-case, runs of other characters collapsed to `-`, `-cert` suffix.
pub fn default_artifact_name(display_name: &str) -> String {
    let mut slug = String::with_capacity(display_name.len() + 5);
    for ch in display_name.trim().chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let slug = slug.trim_end_matches('-');
    if slug.is_empty() {
        "identity-cert".to_string()
    } else {
        format!("{}-cert", slug)
    }
}

fn validate_artifact_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        && !name.starts_with('.');
    if valid {
        Ok(())
    } else {
        Err(CredentialError::InvalidName(format!(
            "'{}' may only contain letters, digits, '-', '_' and '.'",
            name
        )))
    }
}

#[cfg(unix)]
fn write_private(path: &Path, bytes: &[u8]) -> Result<()> {
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;

    let mut file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(bytes)?;
    Ok(())
}

#[cfg(not(unix))]
fn write_private(path: &Path, bytes: &[u8]) -> Result<()> {
    fs::write(path, bytes)?;
    Ok(())
}

fn asn1_to_utc(time: &Asn1TimeRef) -> Result<DateTime<Utc>> {
    let epoch = Asn1Time::from_unix(0)?;
    let diff = epoch.diff(time)?;
    let secs = i64::from(diff.days) * 86_400 + i64::from(diff.secs);
    DateTime::from_timestamp(secs, 0).ok_or_else(|| {
        CredentialError::InvalidCertificate(format!("validity time {} is out of range", time))
    })
}
