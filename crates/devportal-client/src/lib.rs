//! Backend client for the API developer portal.
//!
//! [`Portal`] ties the pieces together: an [`IdentityProvider`] supplies ID
//! tokens, the [`SessionCoordinator`] trades them for a backend session
//! cookie, the [`AuthInterceptor`] reacts to rejected sessions, and the
//! [`BackendClient`] serves cached reads and mutations over a
//! [`Transport`]. The [`CertificateWorkflow`] issues mTLS client
//! certificates on top.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use devportal_client::{ClientConfig, Portal, SessionCookieJar, SignInOutcome, StaticTokenIdentity};
//!
//! # async fn example(id_token: String) -> Result<(), devportal_client::PortalError> {
//! let config = ClientConfig::from_env()?;
//! let identity = Arc::new(StaticTokenIdentity::new(id_token)?);
//! let portal = Portal::connect(config, identity, Arc::new(SessionCookieJar::new()))?;
//!
//! if let SignInOutcome::Registered(me) = portal.sign_in().await? {
//!     let apps = portal.backend().developer_apps().await?;
//!     tracing::info!(email = %me.email, apps = apps.len(), "signed in");
//! }
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod certificate;
pub mod config;
pub mod error;
pub mod identity;
pub mod interceptor;
pub mod portal;
pub mod session;
pub mod transport;

pub use backend::BackendClient;
pub use certificate::{
    ArchiveSink, CertificateWorkflow, DirectorySink, IssuedCredential, ProgressSink,
};
pub use config::{ClientConfig, UnauthorizedPolicy};
pub use error::PortalError;
pub use identity::{IdentityProvider, IdentityUser, SecureTokenIdentity, StaticTokenIdentity};
pub use interceptor::AuthInterceptor;
pub use portal::{Portal, SignInOutcome};
pub use session::SessionCoordinator;
pub use transport::{ApiRequest, ApiResponse, HttpTransport, SessionCookieJar, Transport};
