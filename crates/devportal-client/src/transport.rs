//! HTTP transport to the portal backend.
//!
//! Everything above this module speaks in [`ApiRequest`] / [`ApiResponse`]
//! pairs so the session logic and the read cache can run against an
//! in-memory transport in tests.

use std::sync::{Arc, PoisonError};

use async_trait::async_trait;
use reqwest::Method;
use reqwest::cookie::CookieStore;
use reqwest::header::HeaderValue;
use reqwest_cookie_store::CookieStoreMutex;
use serde::Serialize;
use tracing::debug;

use crate::config::ClientConfig;
use crate::error::PortalError;

/// One backend call. `path` is relative to the base URL and already
/// percent-encoded.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<serde_json::Value>,
}

impl ApiRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            path: path.into(),
            body: None,
        }
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self {
            method: Method::DELETE,
            path: path.into(),
            body: None,
        }
    }

    /// POST with a JSON body.
    ///
    /// # Errors
    ///
    /// Returns `PortalError::Json` if `body` cannot be serialized.
    pub fn post<B: Serialize>(path: impl Into<String>, body: &B) -> Result<Self, PortalError> {
        Ok(Self {
            method: Method::POST,
            path: path.into(),
            body: Some(serde_json::to_value(body)?),
        })
    }
}

/// Status and raw body of a backend response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
}

impl ApiResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Turn a non-success response into a tagged error.
    ///
    /// # Errors
    ///
    /// Returns `PortalError::Unauthorized` for 401 and `PortalError::Api`
    /// for every other non-2xx status.
    pub fn into_result(self) -> Result<Self, PortalError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(PortalError::from_response(self.status, &self.body))
        }
    }

    /// Decode the body as JSON. An empty body decodes as `null`.
    ///
    /// # Errors
    ///
    /// Returns `PortalError::Json` if the body does not match `T`.
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, PortalError> {
        let text = if self.body.trim().is_empty() {
            "null"
        } else {
            self.body.as_str()
        };
        Ok(serde_json::from_str(text)?)
    }
}

/// Sends requests to the backend.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one request. Non-success statuses are returned as responses,
    /// not errors; only transport failures are `Err`.
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, PortalError>;
}

/// Cookie jar holding the backend session cookie.
///
/// Backed by `cookie_store`, so `Expires`, `Max-Age`, `Path` and `Domain`
/// are honoured the way a browser would. The jar serializes to JSON,
/// session cookies included, to carry a session across process runs.
pub struct SessionCookieJar {
    inner: CookieStoreMutex,
}

impl Default for SessionCookieJar {
    fn default() -> Self {
        Self {
            inner: CookieStoreMutex::new(cookie_store::CookieStore::default()),
        }
    }
}

impl std::fmt::Debug for SessionCookieJar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCookieJar")
            .field("cookies", &self.lock().iter_unexpired().count())
            .finish()
    }
}

impl SessionCookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Jar restored from [`SessionCookieJar::to_json`] output. Cookies that
    /// expired in the meantime are dropped.
    ///
    /// # Errors
    ///
    /// Returns `PortalError::Cookies` if `json` is not a saved cookie store.
    pub fn from_json(json: &str) -> Result<Self, PortalError> {
        let store = cookie_store::serde::json::load(json.as_bytes())
            .map_err(|e| PortalError::Cookies(e.to_string()))?;
        Ok(Self {
            inner: CookieStoreMutex::new(store),
        })
    }

    /// Serialize every cookie, including those without an expiry.
    ///
    /// # Errors
    ///
    /// Returns `PortalError::Cookies` if serialization fails.
    pub fn to_json(&self) -> Result<String, PortalError> {
        let mut buf = Vec::new();
        cookie_store::serde::json::save_incl_expired_and_nonpersistent(&self.lock(), &mut buf)
            .map_err(|e| PortalError::Cookies(e.to_string()))?;
        String::from_utf8(buf).map_err(|e| PortalError::Cookies(e.to_string()))
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn is_empty(&self) -> bool {
        self.lock().iter_unexpired().next().is_none()
    }

    /// Apply one `Set-Cookie` header value received from `url`.
    pub fn store(&self, set_cookie: &str, url: &reqwest::Url) {
        match self.lock().parse(set_cookie, url) {
            Ok(_) => debug!("session cookie updated"),
            Err(e) => debug!(error = %e, "ignoring malformed Set-Cookie"),
        }
    }

    /// Value for a `Cookie` request header to `url`, if any cookie applies.
    pub fn header_value(&self, url: &reqwest::Url) -> Option<String> {
        let store = self.lock();
        let pairs: Vec<String> = store
            .get_request_values(url)
            .map(|(name, value)| format!("{name}={value}"))
            .collect();
        (!pairs.is_empty()).then(|| pairs.join("; "))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, cookie_store::CookieStore> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl CookieStore for SessionCookieJar {
    fn set_cookies(&self, cookie_headers: &mut dyn Iterator<Item = &HeaderValue>, url: &reqwest::Url) {
        CookieStore::set_cookies(&self.inner, cookie_headers, url);
    }

    fn cookies(&self, url: &reqwest::Url) -> Option<HeaderValue> {
        CookieStore::cookies(&self.inner, url)
    }
}

/// [`Transport`] over `reqwest` with the session cookie jar attached.
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    cookies: Arc<SessionCookieJar>,
}

impl HttpTransport {
    /// Build a transport for `config.base_url` using `cookies` as the jar.
    ///
    /// # Errors
    ///
    /// Returns `PortalError::Network` if the HTTP client cannot be built.
    pub fn new(config: &ClientConfig, cookies: Arc<SessionCookieJar>) -> Result<Self, PortalError> {
        let mut builder = reqwest::Client::builder()
            .user_agent(concat!("devportal/", env!("CARGO_PKG_VERSION")))
            .cookie_provider(Arc::clone(&cookies));
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            cookies,
        })
    }

    pub fn cookies(&self) -> &Arc<SessionCookieJar> {
        &self.cookies
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, PortalError> {
        let url = format!("{}{}", self.base_url, request.path);
        debug!(method = %request.method, path = %request.path, "backend request");

        let mut req = self.client.request(request.method.clone(), &url);
        if let Some(body) = &request.body {
            req = req.json(body);
        }
        let resp = req.send().await?;
        let status = resp.status().as_u16();
        let body = resp.text().await?;

        debug!(method = %request.method, path = %request.path, status, "backend response");
        Ok(ApiResponse { status, body })
    }
}
