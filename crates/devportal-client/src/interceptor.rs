//! Global handling of rejected sessions.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::config::UnauthorizedPolicy;
use crate::error::PortalError;
use crate::session::{LOGIN_PATH, LOGOUT_PATH, SessionCoordinator};
use crate::transport::{ApiRequest, ApiResponse, Transport};

const UNAUTHORIZED: u16 = 401;

/// [`Transport`] wrapper that reacts to 401 responses according to an
/// [`UnauthorizedPolicy`].
///
/// The 401 response itself is still handed back to the caller, which turns
/// it into [`PortalError::Unauthorized`].
pub struct AuthInterceptor {
    inner: Arc<dyn Transport>,
    session: Arc<SessionCoordinator>,
    policy: UnauthorizedPolicy,
}

impl AuthInterceptor {
    pub fn new(
        inner: Arc<dyn Transport>,
        session: Arc<SessionCoordinator>,
        policy: UnauthorizedPolicy,
    ) -> Self {
        Self {
            inner,
            session,
            policy,
        }
    }
}

fn is_auth_endpoint(path: &str) -> bool {
    let path = path.split('?').next().unwrap_or(path);
    path == LOGIN_PATH || path == LOGOUT_PATH
}

#[async_trait]
impl Transport for AuthInterceptor {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, PortalError> {
        let response = self.inner.send(request).await?;
        if response.status != UNAUTHORIZED || is_auth_endpoint(&request.path) {
            return Ok(response);
        }
        warn!(method = %request.method, path = %request.path, "request unauthorized");

        if self.policy == UnauthorizedPolicy::RefreshThenSignOut && self.session.is_active() {
            match self.session.reestablish().await {
                Ok(()) => {
                    let retried = self.inner.send(request).await?;
                    if retried.status != UNAUTHORIZED {
                        return Ok(retried);
                    }
                    warn!(path = %request.path, "request still unauthorized after re-login");
                }
                Err(e) => warn!(error = %e, "session re-login failed"),
            }
        }

        self.session.handle_unauthorized().await;
        Ok(response)
    }
}
