//! Credential archive handed to the developer after certificate issuance.
//!
//! The archive is a ZIP named `credential-{keyId}.zip` holding a plain-text
//! manifest, the PEM private key and the PEM certificate.

use std::io::{Cursor, Write as _};

use chrono::{DateTime, TimeZone};
use zip::CompressionMethod;
use zip::write::SimpleFileOptions;

use crate::error::ArchiveError;
use crate::model::RegisteredCertificate;

pub const MANIFEST_FILE_NAME: &str = "Manifest.txt";

const MISSING: &str = "N/A";

/// Descriptive text file bundled with the keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    pub key_id: String,
    /// Creation time formatted `YYYYMMDD-HHMMSS`.
    pub created: String,
    pub requester_email: Option<String>,
    pub subject_dn: Option<String>,
    pub fingerprint: Option<String>,
    pub not_before: Option<String>,
    pub not_after: Option<String>,
}

impl Manifest {
    /// Manifest for a certificate the backend just signed.
    pub fn for_certificate(
        key_id: &str,
        created: String,
        requester_email: Option<&str>,
        cert: &RegisteredCertificate,
    ) -> Self {
        Self {
            key_id: key_id.to_owned(),
            created,
            requester_email: requester_email.map(str::to_owned),
            subject_dn: cert.subject_dn.clone(),
            fingerprint: cert.fingerprint.clone(),
            not_before: cert.not_before.clone(),
            not_after: cert.not_after.clone(),
        }
    }

    pub fn render(&self) -> String {
        let field = |v: &Option<String>| v.clone().unwrap_or_else(|| MISSING.to_owned());
        let lines = [
            "Partner Connection Credential\n".to_owned(),
            format!("key id: {}", self.key_id),
            format!("created: {}", self.created),
            format!("email of requester: {}\n", field(&self.requester_email)),
            "Certificate information:".to_owned(),
            format!("  Subject DN: {}", field(&self.subject_dn)),
            format!("  SHA256 fingerprint: {}", field(&self.fingerprint)),
            format!("  notBefore: {}", field(&self.not_before)),
            format!("  notAfter: {}", field(&self.not_after)),
        ];
        let mut text = lines.join("\n");
        text.push('\n');
        text
    }
}

/// Manifest timestamp, `YYYYMMDD-HHMMSS` in the given zone.
pub fn manifest_timestamp<Tz: TimeZone>(at: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    at.format("%Y%m%d-%H%M%S").to_string()
}

pub fn archive_file_name(key_id: &str) -> String {
    format!("credential-{key_id}.zip")
}

pub fn private_key_file_name(key_id: &str) -> String {
    format!("client-rsa-private-key-{key_id}.pem")
}

pub fn certificate_file_name(key_id: &str) -> String {
    format!("client-certificate-{key_id}.pem")
}

/// A finished archive ready to be delivered.
#[derive(Clone)]
pub struct CredentialArchive {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl std::fmt::Debug for CredentialArchive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialArchive")
            .field("file_name", &self.file_name)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Build the ZIP for one issued credential.
///
/// # Errors
///
/// Returns `ArchiveError::Write` if the ZIP writer fails.
pub fn build_credential_archive(
    manifest: &Manifest,
    private_key_pem: &str,
    certificate_pem: &str,
) -> Result<CredentialArchive, ArchiveError> {
    let key_id = &manifest.key_id;
    let manifest_text = manifest.render();
    let entries = [
        (MANIFEST_FILE_NAME.to_owned(), manifest_text.as_str()),
        (private_key_file_name(key_id), private_key_pem),
        (certificate_file_name(key_id), certificate_pem),
    ];

    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .unix_permissions(0o600);
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));

    for (name, contents) in &entries {
        let write_err = |reason: String| ArchiveError::Write {
            entry: name.clone(),
            reason,
        };
        writer
            .start_file(name.as_str(), options)
            .map_err(|e| write_err(e.to_string()))?;
        writer
            .write_all(contents.as_bytes())
            .map_err(|e| write_err(e.to_string()))?;
    }

    let cursor = writer.finish().map_err(|e| ArchiveError::Write {
        entry: "central directory".to_owned(),
        reason: e.to_string(),
    })?;

    Ok(CredentialArchive {
        file_name: archive_file_name(key_id),
        bytes: cursor.into_inner(),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::io::Read as _;

    use chrono::Utc;

    use super::*;

    fn manifest() -> Manifest {
        Manifest {
            key_id: "abc-123-xyz".to_owned(),
            created: "20250401-101500".to_owned(),
            requester_email: Some("dev@example.com".to_owned()),
            subject_dn: Some("CN=Dev, O=Partner".to_owned()),
            fingerprint: Some("3q2+7w==".to_owned()),
            not_before: None,
            not_after: Some("2026-04-01".to_owned()),
        }
    }

    #[test]
    fn manifest_layout() {
        let text = manifest().render();
        let expected = "Partner Connection Credential\n\n\
                        key id: abc-123-xyz\n\
                        created: 20250401-101500\n\
                        email of requester: dev@example.com\n\n\
                        Certificate information:\n  \
                        Subject DN: CN=Dev, O=Partner\n  \
                        SHA256 fingerprint: 3q2+7w==\n  \
                        notBefore: N/A\n  \
                        notAfter: 2026-04-01\n";
        assert_eq!(text, expected);
    }

    #[test]
    fn timestamp_format() {
        let at = Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(manifest_timestamp(&at), "20250102-030405");
    }

    #[test]
    fn archive_contains_three_named_entries() {
        let archive =
            build_credential_archive(&manifest(), "PRIVATE-PEM\n", "CERT-PEM\n").unwrap();
        assert_eq!(archive.file_name, "credential-abc-123-xyz.zip");

        let mut zip = zip::ZipArchive::new(Cursor::new(archive.bytes)).unwrap();
        assert_eq!(zip.len(), 3);

        let mut read = |name: &str| {
            let mut s = String::new();
            zip.by_name(name).unwrap().read_to_string(&mut s).unwrap();
            s
        };
        assert!(read("Manifest.txt").starts_with("Partner Connection Credential"));
        assert_eq!(read("client-rsa-private-key-abc-123-xyz.pem"), "PRIVATE-PEM\n");
        assert_eq!(read("client-certificate-abc-123-xyz.pem"), "CERT-PEM\n");
    }

    #[test]
    fn manifest_from_registration_response() {
        let cert = RegisteredCertificate {
            fingerprint: Some("fp".to_owned()),
            subject_dn: Some("CN=x".to_owned()),
            ..RegisteredCertificate::default()
        };
        let m = Manifest::for_certificate("k-k-k", "20250101-000000".to_owned(), None, &cert);
        let text = m.render();
        assert!(text.contains("email of requester: N/A"));
        assert!(text.contains("SHA256 fingerprint: fp"));
        assert!(text.contains("notAfter: N/A"));
    }
}
