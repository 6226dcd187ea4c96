//! Identity bridge.
//!
//! The portal backend trusts ID tokens issued by an external identity
//! provider. This module hides where the token comes from: a token pasted
//! by the user, or a refresh token exchanged at a secure-token endpoint.
//! The signed-in user is published on a `watch` channel.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::Deserialize;
use tokio::sync::{Mutex, watch};
use tracing::{debug, info};
use zeroize::Zeroizing;

use crate::config::ClientConfig;
use crate::error::PortalError;

/// Refresh an ID token this long before the provider says it expires.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);
const DEFAULT_TOKEN_LIFETIME_SECS: u64 = 3600;

/// The signed-in identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityUser {
    pub uid: String,
    pub email: Option<String>,
}

/// Source of identity tokens and of the current user.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// The signed-in user, if any.
    fn current_user(&self) -> Option<IdentityUser>;

    /// Stream of user changes; `None` after sign-out.
    fn subscribe(&self) -> watch::Receiver<Option<IdentityUser>>;

    /// A currently valid ID token. With `force_refresh` the provider must
    /// not hand back a cached token.
    async fn id_token(&self, force_refresh: bool) -> Result<String, PortalError>;

    /// Forget the user and every token.
    async fn sign_out(&self) -> Result<(), PortalError>;
}

#[derive(Deserialize)]
struct Claims {
    #[serde(default)]
    sub: Option<String>,
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    email: Option<String>,
}

/// Read the user from an ID token's payload without verifying it; the
/// backend verifies the signature when the token is exchanged.
///
/// # Errors
///
/// Returns `PortalError::Identity` if the token is not a three-part JWT with
/// a JSON payload naming a subject.
pub fn user_from_id_token(token: &str) -> Result<IdentityUser, PortalError> {
    let invalid = |reason: &str| PortalError::Identity {
        reason: format!("malformed ID token: {reason}"),
    };
    let mut parts = token.trim().split('.');
    let (Some(_header), Some(payload), Some(_sig), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(invalid("expected three dot-separated segments"));
    };
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|_| invalid("payload is not base64url"))?;
    let claims: Claims =
        serde_json::from_slice(&bytes).map_err(|_| invalid("payload is not a JSON object"))?;

    let uid = claims
        .user_id
        .or(claims.sub)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| invalid("no subject claim"))?;
    Ok(IdentityUser {
        uid,
        email: claims.email.filter(|e| !e.is_empty()),
    })
}

/// Identity backed by a single ID token supplied up front. It cannot
/// refresh, so a forced refresh hands back the same token.
pub struct StaticTokenIdentity {
    token: Mutex<Option<Zeroizing<String>>>,
    user: watch::Sender<Option<IdentityUser>>,
}

impl StaticTokenIdentity {
    /// # Errors
    ///
    /// Returns `PortalError::Identity` if the token's claims cannot be read.
    pub fn new(id_token: impl Into<String>) -> Result<Self, PortalError> {
        let id_token = Zeroizing::new(id_token.into());
        let user = user_from_id_token(&id_token)?;
        let (tx, _rx) = watch::channel(Some(user));
        Ok(Self {
            token: Mutex::new(Some(id_token)),
            user: tx,
        })
    }
}

#[async_trait]
impl IdentityProvider for StaticTokenIdentity {
    fn current_user(&self) -> Option<IdentityUser> {
        self.user.borrow().clone()
    }

    fn subscribe(&self) -> watch::Receiver<Option<IdentityUser>> {
        self.user.subscribe()
    }

    async fn id_token(&self, _force_refresh: bool) -> Result<String, PortalError> {
        self.token
            .lock()
            .await
            .as_ref()
            .map(|t| t.as_str().to_owned())
            .ok_or(PortalError::NotSignedIn)
    }

    async fn sign_out(&self) -> Result<(), PortalError> {
        self.token.lock().await.take();
        self.user.send_replace(None);
        Ok(())
    }
}

/// Response of the secure-token endpoint.
#[derive(Deserialize)]
struct TokenResponse {
    id_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    /// Seconds, sent as a string.
    #[serde(default)]
    expires_in: Option<serde_json::Value>,
}

impl TokenResponse {
    fn lifetime(&self) -> Duration {
        let secs = match &self.expires_in {
            Some(serde_json::Value::String(s)) => s.parse().ok(),
            Some(serde_json::Value::Number(n)) => n.as_u64(),
            _ => None,
        };
        Duration::from_secs(secs.unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS))
    }
}

struct TokenState {
    refresh_token: Option<Zeroizing<String>>,
    id_token: Option<(Zeroizing<String>, Instant)>,
}

/// Identity backed by a long-lived refresh token, exchanged for short-lived
/// ID tokens at a Firebase-compatible secure-token endpoint.
pub struct SecureTokenIdentity {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    state: Mutex<TokenState>,
    user: watch::Sender<Option<IdentityUser>>,
}

impl SecureTokenIdentity {
    /// # Errors
    ///
    /// Returns `PortalError::Config` if no identity API key is configured.
    pub fn new(config: &ClientConfig, refresh_token: impl Into<String>) -> Result<Self, PortalError> {
        let api_key = config.identity_api_key.clone().ok_or_else(|| {
            PortalError::Config(
                "refresh-token sign-in needs DEVPORTAL_FIREBASE_API_KEY".to_owned(),
            )
        })?;
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let (tx, _rx) = watch::channel(None);
        Ok(Self {
            http: builder.build()?,
            endpoint: config.token_endpoint.clone(),
            api_key,
            state: Mutex::new(TokenState {
                refresh_token: Some(Zeroizing::new(refresh_token.into())),
                id_token: None,
            }),
            user: tx,
        })
    }

    /// The current refresh token, for persisting the sign-in. The provider
    /// may rotate it on every exchange.
    pub async fn refresh_token(&self) -> Option<String> {
        self.state
            .lock()
            .await
            .refresh_token
            .as_ref()
            .map(|t| t.as_str().to_owned())
    }

    async fn exchange(&self, refresh_token: &str) -> Result<TokenResponse, PortalError> {
        let resp = self
            .http
            .post(&self.endpoint)
            .query(&[("key", self.api_key.as_str())])
            .form(&[("grant_type", "refresh_token"), ("refresh_token", refresh_token)])
            .send()
            .await?;
        let status = resp.status().as_u16();
        let body = resp.text().await?;
        if !(200..300).contains(&status) {
            return Err(PortalError::Identity {
                reason: format!(
                    "token refresh rejected: {}",
                    PortalError::from_response(status, &body).user_message()
                ),
            });
        }
        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl IdentityProvider for SecureTokenIdentity {
    fn current_user(&self) -> Option<IdentityUser> {
        self.user.borrow().clone()
    }

    fn subscribe(&self) -> watch::Receiver<Option<IdentityUser>> {
        self.user.subscribe()
    }

    async fn id_token(&self, force_refresh: bool) -> Result<String, PortalError> {
        let mut state = self.state.lock().await;
        if !force_refresh {
            if let Some((token, expires_at)) = &state.id_token {
                if Instant::now() + EXPIRY_MARGIN < *expires_at {
                    return Ok(token.as_str().to_owned());
                }
            }
        }

        let refresh_token = state.refresh_token.clone().ok_or(PortalError::NotSignedIn)?;
        debug!(force_refresh, "exchanging refresh token for a new ID token");
        let response = self.exchange(&refresh_token).await?;
        let user = user_from_id_token(&response.id_token)?;

        let expires_at = Instant::now() + response.lifetime();
        if let Some(rotated) = response.refresh_token.as_deref().filter(|t| !t.is_empty()) {
            state.refresh_token = Some(Zeroizing::new(rotated.to_owned()));
        }
        let token = response.id_token.clone();
        state.id_token = Some((Zeroizing::new(response.id_token), expires_at));

        if self.user.borrow().as_ref() != Some(&user) {
            info!(uid = %user.uid, "identity signed in");
            self.user.send_replace(Some(user));
        }
        Ok(token)
    }

    async fn sign_out(&self) -> Result<(), PortalError> {
        let mut state = self.state.lock().await;
        state.refresh_token = None;
        state.id_token = None;
        self.user.send_replace(None);
        Ok(())
    }
}
