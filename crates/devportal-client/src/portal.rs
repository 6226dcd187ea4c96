//! Entry point wiring identity, session, interceptor, cache and backend
//! client together for one user.

use std::path::Path;
use std::sync::Arc;

use devportal_core::cache::{Clock, PortalCache, SystemClock};
use devportal_core::model::{DeveloperDetails, RegisteredCertificate};
use devportal_core::validate;
use tracing::{info, warn};

use crate::backend::BackendClient;
use crate::certificate::{ArchiveSink, CertificateWorkflow, IssuedCredential, ProgressSink};
use crate::config::ClientConfig;
use crate::error::PortalError;
use crate::identity::IdentityProvider;
use crate::interceptor::AuthInterceptor;
use crate::session::SessionCoordinator;
use crate::transport::{HttpTransport, SessionCookieJar, Transport};

/// Where sign-in left the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignInOutcome {
    /// The backend knows the user as a developer.
    Registered(DeveloperDetails),
    /// Signed in, but the user still has to confirm developer registration.
    NeedsRegistration,
}

/// A developer-portal client for one signed-in user.
pub struct Portal {
    config: ClientConfig,
    session: Arc<SessionCoordinator>,
    backend: Arc<BackendClient>,
    certificates: CertificateWorkflow,
}

impl Portal {
    /// Build a portal over an arbitrary transport with the system clock.
    pub fn new(
        config: ClientConfig,
        identity: Arc<dyn IdentityProvider>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self::with_clock(config, identity, transport, Arc::new(SystemClock))
    }

    /// Build a portal whose read cache uses `clock`.
    pub fn with_clock(
        config: ClientConfig,
        identity: Arc<dyn IdentityProvider>,
        transport: Arc<dyn Transport>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let cache = Arc::new(PortalCache::new(config.cache_ttl, clock));
        let session = Arc::new(SessionCoordinator::new(
            Arc::clone(&transport),
            identity,
            Arc::clone(&cache),
        ));
        let intercepted: Arc<dyn Transport> = Arc::new(AuthInterceptor::new(
            transport,
            Arc::clone(&session),
            config.unauthorized_policy,
        ));
        let backend = Arc::new(BackendClient::new(intercepted, cache));
        let certificates =
            CertificateWorkflow::new(Arc::clone(&backend)).with_pacing(config.issuance_pacing);

        Self {
            config,
            session,
            backend,
            certificates,
        }
    }

    /// Build a portal talking HTTP to `config.base_url`, keeping the session
    /// cookie in `cookies`.
    ///
    /// # Errors
    ///
    /// Returns `PortalError::Network` if the HTTP client cannot be built.
    pub fn connect(
        config: ClientConfig,
        identity: Arc<dyn IdentityProvider>,
        cookies: Arc<SessionCookieJar>,
    ) -> Result<Self, PortalError> {
        let transport = Arc::new(HttpTransport::new(&config, cookies)?);
        Ok(Self::new(config, identity, transport))
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn backend(&self) -> &BackendClient {
        &self.backend
    }

    pub fn session(&self) -> &SessionCoordinator {
        &self.session
    }

    pub fn is_signed_in(&self) -> bool {
        self.session.is_active()
    }

    /// Continue a session whose cookie was restored from storage.
    pub fn resume(&self) {
        self.session.mark_active();
    }

    /// Establish the backend session and look the user up as a developer.
    ///
    /// # Errors
    ///
    /// Returns the login error, or the developer lookup error for anything
    /// other than "not registered"; in the latter case the session is
    /// signed out again first.
    pub async fn sign_in(&self) -> Result<SignInOutcome, PortalError> {
        self.session.sign_in().await?;
        match self.backend.developer_details().await {
            Ok(details) => {
                info!(developer = %details.developer_id, "developer signed in");
                Ok(SignInOutcome::Registered(details))
            }
            Err(e) if e.is_not_found() => {
                info!("signed-in user is not registered as a developer");
                Ok(SignInOutcome::NeedsRegistration)
            }
            Err(e) => {
                warn!(error = %e, "developer lookup failed after sign-in");
                if self.session.is_active() {
                    if let Err(sign_out_err) = self.session.sign_out().await {
                        warn!(error = %sign_out_err, "sign-out after failed lookup failed");
                    }
                }
                Err(e)
            }
        }
    }

    /// Register the signed-in user as a developer and return the new
    /// record.
    ///
    /// # Errors
    ///
    /// Returns the backend or network error.
    pub async fn complete_registration(&self) -> Result<DeveloperDetails, PortalError> {
        self.backend.register_self_as_developer().await?;
        self.backend.developer_details().await
    }

    /// # Errors
    ///
    /// Returns the identity provider's sign-out error.
    pub async fn sign_out(&self) -> Result<(), PortalError> {
        self.session.sign_out().await
    }

    /// Run the certificate issuance workflow.
    ///
    /// # Errors
    ///
    /// See [`CertificateWorkflow::issue`].
    pub async fn issue_certificate(
        &self,
        progress: &dyn ProgressSink,
        sink: &dyn ArchiveSink,
    ) -> Result<IssuedCredential, PortalError> {
        self.certificates.issue(progress, sink).await
    }

    /// Upload an existing `.pem`/`.cer` certificate file.
    ///
    /// # Errors
    ///
    /// Returns `PortalError::Validation` for a wrong extension or an empty
    /// file, `PortalError::Io` if the file cannot be read, otherwise the
    /// backend or network error.
    pub async fn upload_certificate_file(
        &self,
        path: &Path,
    ) -> Result<RegisteredCertificate, PortalError> {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        validate::validate_certificate_file_name(&file_name)?;
        let contents = tokio::fs::read_to_string(path).await?;
        self.backend.upload_certificate(&contents).await
    }
}
