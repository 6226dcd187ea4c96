//! Client certificate issuance.
//!
//! A run is a fixed pipeline: generate a keypair, export it, check the
//! developer email, have the backend sign and register the public key,
//! package the credential archive, deliver it. Progress is reported as
//! human-readable status lines. A failed run reports one `Error` line,
//! delivers nothing, and leaves the workflow ready for another attempt.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Local;
use devportal_core::archive::{self, CredentialArchive, Manifest};
use devportal_core::error::CryptoError;
use devportal_core::keygen::{self, ClientKeyPair, ExportedKeys, RSA_MODULUS_BITS};
use tracing::{error, info};

use crate::backend::BackendClient;
use crate::error::PortalError;

/// Receives status lines as the workflow advances.
pub trait ProgressSink: Send + Sync {
    fn status(&self, line: &str);
}

impl<F> ProgressSink for F
where
    F: Fn(&str) + Send + Sync,
{
    fn status(&self, line: &str) {
        self(line);
    }
}

/// Final destination of a credential archive.
#[async_trait]
pub trait ArchiveSink: Send + Sync {
    async fn deliver(&self, archive: &CredentialArchive) -> Result<(), PortalError>;
}

/// Writes archives into a directory, owner-readable only on Unix.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, file_name: &str) -> PathBuf {
        self.dir.join(file_name)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl ArchiveSink for DirectorySink {
    async fn deliver(&self, archive: &CredentialArchive) -> Result<(), PortalError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(&archive.file_name);
        tokio::fs::write(&path, &archive.bytes).await?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600)).await?;
        }

        info!(path = %path.display(), "credential archive written");
        Ok(())
    }
}

/// Summary of a successful issuance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedCredential {
    pub key_id: String,
    pub archive_file_name: String,
    pub fingerprint: Option<String>,
    pub certificate_id: Option<String>,
    pub not_after: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Keys,
    Email,
    Registration,
}

impl Stage {
    fn failure_line(self, err: &PortalError) -> String {
        match self {
            Self::Email => "Error: Could not retrieve developer email. Cannot proceed.".to_owned(),
            Self::Registration => {
                format!("Error: Failed backend registration. {}", err.user_message())
            }
            Self::Keys => format!("Error during key generation/export: {}", err.user_message()),
        }
    }
}

type StageResult<T> = Result<T, (Stage, PortalError)>;

trait AtStage<T> {
    fn at(self, stage: Stage) -> StageResult<T>;
}

impl<T, E: Into<PortalError>> AtStage<T> for Result<T, E> {
    fn at(self, stage: Stage) -> StageResult<T> {
        self.map_err(|e| (stage, e.into()))
    }
}

/// Clears the in-progress flag however the run ends.
struct InProgress<'a>(&'a AtomicBool);

impl<'a> InProgress<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self, PortalError> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| PortalError::IssuanceInProgress)?;
        Ok(Self(flag))
    }
}

impl Drop for InProgress<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Issues client certificates for the signed-in developer.
pub struct CertificateWorkflow {
    backend: Arc<BackendClient>,
    pacing: Duration,
    in_progress: AtomicBool,
}

impl CertificateWorkflow {
    pub fn new(backend: Arc<BackendClient>) -> Self {
        Self {
            backend,
            pacing: Duration::ZERO,
            in_progress: AtomicBool::new(false),
        }
    }

    /// Pause for `pacing` before each step.
    #[must_use]
    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn is_in_progress(&self) -> bool {
        self.in_progress.load(Ordering::SeqCst)
    }

    /// Run one issuance.
    ///
    /// # Errors
    ///
    /// Returns `PortalError::IssuanceInProgress` if another run is active,
    /// otherwise the error of the step that failed. Nothing is delivered to
    /// `sink` on failure.
    pub async fn issue(
        &self,
        progress: &dyn ProgressSink,
        sink: &dyn ArchiveSink,
    ) -> Result<IssuedCredential, PortalError> {
        let _running = InProgress::acquire(&self.in_progress)?;
        match self.run(progress, sink).await {
            Ok(issued) => Ok(issued),
            Err((stage, err)) => {
                error!(?stage, error = %err, "certificate issuance failed");
                progress.status(&stage.failure_line(&err));
                Err(err)
            }
        }
    }

    async fn run(
        &self,
        progress: &dyn ProgressSink,
        sink: &dyn ArchiveSink,
    ) -> StageResult<IssuedCredential> {
        self.pace().await;
        progress.status(&format!(
            "Generating an RSA keypair, with modulus length of {RSA_MODULUS_BITS}..."
        ));
        let keys = generate_keys().await.at(Stage::Keys)?;

        self.pace().await;
        progress.status("Exporting the public and private keys...");
        let ExportedKeys {
            private_key_pem,
            public_key_pem,
        } = keys.export().at(Stage::Keys)?;
        drop(keys);

        let created = archive::manifest_timestamp(&Local::now());
        let key_id = keygen::generate_key_id();

        let email = self.developer_email().await.at(Stage::Email)?;

        self.pace().await;
        progress.status("Sending the request to generate and register a certificate...");
        let cert = self
            .backend
            .register_certificate(&key_id, &public_key_pem)
            .await
            .at(Stage::Registration)?;

        self.pace().await;
        progress.status(&format!(
            "Received the certificate. Fingerprint: {}",
            cert.fingerprint.as_deref().unwrap_or("N/A")
        ));

        self.pace().await;
        progress.status("Creating a ZIP archive with your key and certificate...");
        let manifest = Manifest::for_certificate(&key_id, created, Some(email.as_str()), &cert);
        let credential = archive::build_credential_archive(&manifest, &private_key_pem, &cert.pem)
            .at(Stage::Keys)?;
        drop(private_key_pem);

        self.pace().await;
        progress.status("Initiating the download...");
        sink.deliver(&credential).await.at(Stage::Keys)?;

        progress.status("Done.");
        info!(key_id = %key_id, "client certificate issued");
        Ok(IssuedCredential {
            key_id,
            archive_file_name: credential.file_name,
            fingerprint: cert.fingerprint,
            certificate_id: cert.certificate_id,
            not_after: cert.not_after,
        })
    }

    async fn developer_email(&self) -> Result<String, PortalError> {
        let details = self.backend.developer_details().await?;
        details
            .email()
            .map(str::to_owned)
            .ok_or(PortalError::MissingDeveloperEmail)
    }

    async fn pace(&self) {
        if !self.pacing.is_zero() {
            tokio::time::sleep(self.pacing).await;
        }
    }
}

/// Key generation is CPU-bound; keep it off the async workers.
async fn generate_keys() -> Result<ClientKeyPair, PortalError> {
    let generated = tokio::task::spawn_blocking(ClientKeyPair::generate)
        .await
        .map_err(|e| CryptoError::KeyGeneration {
            reason: e.to_string(),
        })?;
    Ok(generated?)
}
