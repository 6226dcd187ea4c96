//! Backend session lifecycle.
//!
//! Sign-in trades an identity token for the backend's session cookie;
//! sign-out tears down the local caches, the backend session and the
//! identity, in that order. Forced sign-outs triggered by 401 responses
//! collapse into one, however many requests fail at once.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use devportal_core::cache::PortalCache;
use devportal_core::model::LoginResponse;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::PortalError;
use crate::identity::IdentityProvider;
use crate::transport::{ApiRequest, Transport};

pub const LOGIN_PATH: &str = "/api/auth/login";
pub const LOGOUT_PATH: &str = "/api/auth/logout";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LoginRequest<'a> {
    id_token: &'a str,
}

/// Owns the backend session for one signed-in user.
///
/// Talks to the raw transport, never to the interceptor, so that its own
/// login and logout calls cannot trigger recovery.
pub struct SessionCoordinator {
    transport: Arc<dyn Transport>,
    identity: Arc<dyn IdentityProvider>,
    cache: Arc<PortalCache<PortalError>>,
    active: AtomicBool,
    /// Latched by the first sign-out, reset by sign-in. Independent of
    /// `active` so a session that was never marked live still signs out.
    signed_out: AtomicBool,
    sign_outs: AtomicUsize,
}

impl SessionCoordinator {
    pub fn new(
        transport: Arc<dyn Transport>,
        identity: Arc<dyn IdentityProvider>,
        cache: Arc<PortalCache<PortalError>>,
    ) -> Self {
        Self {
            transport,
            identity,
            cache,
            active: AtomicBool::new(false),
            signed_out: AtomicBool::new(false),
            sign_outs: AtomicUsize::new(0),
        }
    }

    pub fn identity(&self) -> &Arc<dyn IdentityProvider> {
        &self.identity
    }

    pub fn cache(&self) -> &Arc<PortalCache<PortalError>> {
        &self.cache
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Number of sign-outs performed so far.
    pub fn sign_out_count(&self) -> usize {
        self.sign_outs.load(Ordering::SeqCst)
    }

    /// Treat an existing session cookie as live, e.g. one restored from
    /// disk.
    pub fn mark_active(&self) {
        self.signed_out.store(false, Ordering::SeqCst);
        self.active.store(true, Ordering::SeqCst);
    }

    /// Exchange the current identity token for a backend session.
    ///
    /// # Errors
    ///
    /// Returns the identity error if no token is available, or the backend
    /// error if login is rejected.
    pub async fn sign_in(&self) -> Result<LoginResponse, PortalError> {
        let token = self.identity.id_token(false).await?;
        let login = self.login(&token).await?;
        self.cache.clear_all();
        self.signed_out.store(false, Ordering::SeqCst);
        self.active.store(true, Ordering::SeqCst);
        info!(email = login.email.as_deref().unwrap_or("unknown"), "backend session established");
        Ok(login)
    }

    /// Log in again with a freshly minted identity token.
    ///
    /// # Errors
    ///
    /// Returns the identity or backend error that prevented re-login.
    pub async fn reestablish(&self) -> Result<(), PortalError> {
        let token = self.identity.id_token(true).await?;
        self.login(&token).await?;
        info!("backend session re-established with a refreshed identity token");
        Ok(())
    }

    /// User-initiated sign-out. Backend logout failures are logged and
    /// ignored.
    ///
    /// # Errors
    ///
    /// Returns the identity provider's error if it fails to sign out.
    pub async fn sign_out(&self) -> Result<(), PortalError> {
        self.signed_out.store(true, Ordering::SeqCst);
        self.active.store(false, Ordering::SeqCst);
        self.tear_down().await
    }

    /// Recovery path for a rejected session: clears the caches every time
    /// and signs out only if nothing has signed out since the last sign-in.
    /// Returns whether this call performed the sign-out.
    pub async fn handle_unauthorized(&self) -> bool {
        self.cache.clear_all();
        self.active.store(false, Ordering::SeqCst);
        if self.signed_out.swap(true, Ordering::SeqCst) {
            return false;
        }
        warn!("backend rejected the session, signing out");
        if let Err(e) = self.tear_down().await {
            warn!(error = %e, "identity sign-out failed");
        }
        true
    }

    async fn login(&self, id_token: &str) -> Result<LoginResponse, PortalError> {
        let request = ApiRequest::post(LOGIN_PATH, &LoginRequest { id_token })?;
        let response = self.transport.send(&request).await?.into_result()?;
        response.json::<Option<LoginResponse>>().map(Option::unwrap_or_default)
    }

    async fn tear_down(&self) -> Result<(), PortalError> {
        self.sign_outs.fetch_add(1, Ordering::SeqCst);
        self.cache.clear_all();

        let logout = match ApiRequest::post(LOGOUT_PATH, &serde_json::json!({})) {
            Ok(req) => self.transport.send(&req).await.and_then(|r| r.into_result()),
            Err(e) => Err(e),
        };
        if let Err(e) = logout {
            warn!(error = %e, "backend logout failed, continuing sign-out");
        }

        self.identity.sign_out().await?;
        info!("signed out");
        Ok(())
    }
}
