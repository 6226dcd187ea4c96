//! Shared fixtures: a scripted in-memory transport and a counting identity.

#![allow(clippy::unwrap_used, dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use devportal_client::{
    ApiRequest, ApiResponse, ClientConfig, IdentityProvider, IdentityUser, Portal, PortalError,
    Transport, UnauthorizedPolicy,
};
use devportal_core::cache::{Clock, ManualClock};
use reqwest::Method;
use tokio::sync::watch;

type Route = (Method, String);

/// Transport answering from a script. Queued one-shot responses win over
/// the standing response for a route; unknown routes answer 404.
#[derive(Default)]
pub struct MockTransport {
    standing: Mutex<HashMap<Route, ApiResponse>>,
    queued: Mutex<HashMap<Route, VecDeque<ApiResponse>>>,
    calls: Mutex<Vec<ApiRequest>>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn respond(&self, method: Method, path: &str, status: u16, body: &str) {
        self.standing
            .lock()
            .unwrap()
            .insert((method, path.to_owned()), ApiResponse::new(status, body));
    }

    pub fn respond_once(&self, method: Method, path: &str, status: u16, body: &str) {
        self.queued
            .lock()
            .unwrap()
            .entry((method, path.to_owned()))
            .or_default()
            .push_back(ApiResponse::new(status, body));
    }

    pub fn calls(&self) -> Vec<ApiRequest> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, method: &Method, path: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| &c.method == method && c.path == path)
            .count()
    }

    pub fn last_body(&self, method: &Method, path: &str) -> Option<serde_json::Value> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|c| &c.method == method && c.path == path)
            .and_then(|c| c.body.clone())
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, PortalError> {
        self.calls.lock().unwrap().push(request.clone());
        // Let concurrent callers interleave as they would over a network.
        tokio::task::yield_now().await;

        let route = (request.method.clone(), request.path.clone());
        if let Some(resp) = self
            .queued
            .lock()
            .unwrap()
            .get_mut(&route)
            .and_then(VecDeque::pop_front)
        {
            return Ok(resp);
        }
        Ok(self
            .standing
            .lock()
            .unwrap()
            .get(&route)
            .cloned()
            .unwrap_or_else(|| ApiResponse::new(404, r#"{"error": "not found"}"#)))
    }
}

/// Unsigned JWT with the given subject and email.
pub fn fake_jwt(sub: &str, email: &str) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none"}"#);
    let claims = serde_json::json!({"sub": sub, "user_id": sub, "email": email});
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{header}.{payload}.sig")
}

/// Identity handing out `token-N`, bumping N on every forced refresh.
pub struct CountingIdentity {
    generation: AtomicUsize,
    sign_outs: AtomicUsize,
    user: watch::Sender<Option<IdentityUser>>,
}

impl CountingIdentity {
    pub fn new() -> Arc<Self> {
        let (tx, _rx) = watch::channel(Some(IdentityUser {
            uid: "uid-1".to_owned(),
            email: Some("dev@example.com".to_owned()),
        }));
        Arc::new(Self {
            generation: AtomicUsize::new(1),
            sign_outs: AtomicUsize::new(0),
            user: tx,
        })
    }

    pub fn sign_outs(&self) -> usize {
        self.sign_outs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityProvider for CountingIdentity {
    fn current_user(&self) -> Option<IdentityUser> {
        self.user.borrow().clone()
    }

    fn subscribe(&self) -> watch::Receiver<Option<IdentityUser>> {
        self.user.subscribe()
    }

    async fn id_token(&self, force_refresh: bool) -> Result<String, PortalError> {
        if self.user.borrow().is_none() {
            return Err(PortalError::NotSignedIn);
        }
        let n = if force_refresh {
            self.generation.fetch_add(1, Ordering::SeqCst) + 1
        } else {
            self.generation.load(Ordering::SeqCst)
        };
        Ok(format!("token-{n}"))
    }

    async fn sign_out(&self) -> Result<(), PortalError> {
        self.sign_outs.fetch_add(1, Ordering::SeqCst);
        self.user.send_replace(None);
        Ok(())
    }
}

pub const DEVELOPER_JSON: &str = r#"{
    "email": "dev@example.com",
    "developerId": "dev-1",
    "firstName": "Dana",
    "apps": ["orders"],
    "certificates": [{"id": "cert-1", "fingerprint": "AbC="}]
}"#;

pub struct Fixture {
    pub portal: Portal,
    pub transport: Arc<MockTransport>,
    pub identity: Arc<CountingIdentity>,
    pub clock: Arc<ManualClock>,
}

pub fn fixture(policy: UnauthorizedPolicy) -> Fixture {
    let transport = MockTransport::new();
    transport.respond(Method::POST, "/api/auth/login", 200, r#"{"message": "ok", "email": "dev@example.com"}"#);
    transport.respond(Method::POST, "/api/auth/logout", 200, "{}");
    transport.respond(Method::GET, "/api/me", 200, DEVELOPER_JSON);

    let identity = CountingIdentity::new();
    let clock = Arc::new(ManualClock::new());
    let config = ClientConfig {
        unauthorized_policy: policy,
        ..ClientConfig::default()
    };
    let portal = Portal::with_clock(
        config,
        Arc::clone(&identity) as Arc<dyn IdentityProvider>,
        Arc::clone(&transport) as Arc<dyn Transport>,
        Arc::clone(&clock) as Arc<dyn Clock>,
    );
    Fixture {
        portal,
        transport,
        identity,
        clock,
    }
}

/// Fixture already signed in.
pub async fn signed_in(policy: UnauthorizedPolicy) -> Fixture {
    let f = fixture(policy);
    f.portal.sign_in().await.unwrap();
    f
}
