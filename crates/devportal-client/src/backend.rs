//! REST client for the portal backend with cached reads.
//!
//! Reads of the app list, per-app details and the developer record go
//! through the session's [`PortalCache`]; every mutation drops the entries
//! it makes stale once the backend has answered, successfully or not.

use std::sync::Arc;

use devportal_core::cache::PortalCache;
use devportal_core::model::{
    ApiProduct, CertificateRequest, DeveloperApp, DeveloperDetails, NewDeveloperApp,
    RegisteredCertificate,
};
use devportal_core::validate;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::error::PortalError;
use crate::transport::{ApiRequest, ApiResponse, Transport};

/// Key id the backend expects for uploaded (not generated) certificates.
pub const UPLOAD_KEY_ID: &str = "placeholder-keyid";

/// Typed access to the backend's REST endpoints.
pub struct BackendClient {
    transport: Arc<dyn Transport>,
    cache: Arc<PortalCache<PortalError>>,
}

impl BackendClient {
    /// `transport` should be the interceptor-wrapped transport so that 401
    /// handling applies to every call made here.
    pub fn new(transport: Arc<dyn Transport>, cache: Arc<PortalCache<PortalError>>) -> Self {
        Self { transport, cache }
    }

    pub fn cache(&self) -> &Arc<PortalCache<PortalError>> {
        &self.cache
    }

    /// `GET /api/apiproducts`. Not cached.
    ///
    /// # Errors
    ///
    /// Returns the backend or network error.
    pub async fn api_products(&self) -> Result<Vec<ApiProduct>, PortalError> {
        let products: Option<Vec<ApiProduct>> = self.get_json("/api/apiproducts".to_owned()).await?;
        Ok(products.unwrap_or_default())
    }

    /// `GET /api/myapps`: names of the developer's apps.
    ///
    /// # Errors
    ///
    /// Returns the backend or network error.
    pub async fn developer_app_names(&self) -> Result<Vec<String>, PortalError> {
        self.cache
            .app_names
            .get_or_fetch((), || async {
                let names: Option<Vec<String>> = self.get_json("/api/myapps".to_owned()).await?;
                debug!(count = names.as_ref().map_or(0, Vec::len), "fetched app names");
                Ok::<_, PortalError>(names.unwrap_or_default())
            })
            .await
    }

    /// `GET /api/myapps/{name}`.
    ///
    /// # Errors
    ///
    /// Returns the backend or network error.
    pub async fn developer_app(&self, name: &str) -> Result<DeveloperApp, PortalError> {
        self.cache
            .app_details
            .get_or_fetch(name.to_owned(), || {
                self.get_json(format!("/api/myapps/{}", urlencoding::encode(name)))
            })
            .await
    }

    /// Every app with its details. An app whose detail read fails shows up
    /// as a placeholder instead of failing the list.
    ///
    /// # Errors
    ///
    /// Returns the error of the name-list read, or `Unauthorized` if the
    /// session was rejected part-way.
    pub async fn developer_apps(&self) -> Result<Vec<DeveloperApp>, PortalError> {
        let names = self.developer_app_names().await?;
        let mut apps = Vec::with_capacity(names.len());
        for name in &names {
            match self.developer_app(name).await {
                Ok(app) => apps.push(app),
                Err(e @ PortalError::Unauthorized { .. }) => return Err(e),
                Err(e) => {
                    warn!(app = %name, error = %e, "failed to load app details");
                    apps.push(DeveloperApp::load_error_placeholder(name));
                }
            }
        }
        Ok(apps)
    }

    /// `POST /api/myapps` after local validation.
    ///
    /// # Errors
    ///
    /// Returns `PortalError::Validation` for an empty name or no products,
    /// otherwise the backend or network error.
    pub async fn create_developer_app(
        &self,
        name: &str,
        api_products: &[String],
    ) -> Result<DeveloperApp, PortalError> {
        let (name, api_products) = validate::validate_new_app(name, api_products)?;
        let request = ApiRequest::post(
            "/api/myapps",
            &NewDeveloperApp {
                name: name.clone(),
                api_products,
            },
        )?;
        let result = self.execute(request).await;
        self.cache.clear_apps();

        let created: Option<DeveloperApp> = result?.json()?;
        info!(app = %name, "developer app created");
        Ok(created.unwrap_or_else(|| DeveloperApp {
            name,
            ..DeveloperApp::default()
        }))
    }

    /// `DELETE /api/myapps/{name}`.
    ///
    /// # Errors
    ///
    /// Returns the backend or network error.
    pub async fn delete_developer_app(&self, name: &str) -> Result<(), PortalError> {
        let name = validate::require_identifier(name, "App name")?;
        let result = self
            .execute(ApiRequest::delete(format!("/api/myapps/{}", urlencoding::encode(name))))
            .await;
        self.cache.clear_apps();
        result?;
        info!(app = %name, "developer app deleted");
        Ok(())
    }

    /// `GET /api/me`.
    ///
    /// # Errors
    ///
    /// Returns the backend or network error; 404 means the user is not
    /// registered as a developer yet.
    pub async fn developer_details(&self) -> Result<DeveloperDetails, PortalError> {
        self.cache
            .developer
            .get_or_fetch((), || self.get_json("/api/me".to_owned()))
            .await
    }

    /// `POST /api/me/certificates` with a freshly generated public key; the
    /// backend signs and registers a certificate for it.
    ///
    /// # Errors
    ///
    /// Returns `PortalError::MissingCertificate` if a success response has
    /// no signed PEM, otherwise the backend or network error.
    pub async fn register_certificate(
        &self,
        key_id: &str,
        public_key_pem: &str,
    ) -> Result<RegisteredCertificate, PortalError> {
        let cert = self
            .post_certificate(CertificateRequest {
                key_id: key_id.to_owned(),
                public_key: Some(public_key_pem.to_owned()),
                certificate: None,
            })
            .await?;
        if cert.pem.trim().is_empty() {
            warn!(key_id, "signing response carried no certificate");
            return Err(PortalError::MissingCertificate);
        }
        Ok(cert)
    }

    /// `POST /api/me/certificates` with an existing PEM certificate.
    ///
    /// # Errors
    ///
    /// Returns `PortalError::Validation` for an empty certificate, otherwise
    /// the backend or network error.
    pub async fn upload_certificate(
        &self,
        certificate_pem: &str,
    ) -> Result<RegisteredCertificate, PortalError> {
        validate::validate_certificate_contents(certificate_pem)?;
        self.post_certificate(CertificateRequest {
            key_id: UPLOAD_KEY_ID.to_owned(),
            public_key: None,
            certificate: Some(certificate_pem.to_owned()),
        })
        .await
    }

    /// `DELETE /api/me/certificates/{id}`.
    ///
    /// # Errors
    ///
    /// Returns the backend or network error.
    pub async fn deregister_certificate(&self, certificate_id: &str) -> Result<(), PortalError> {
        let id = validate::require_identifier(certificate_id, "Certificate ID")?;
        let result = self
            .execute(ApiRequest::delete(format!(
                "/api/me/certificates/{}",
                urlencoding::encode(id)
            )))
            .await;
        self.cache.clear_developer();
        result?;
        info!(certificate = %id, "certificate deregistered");
        Ok(())
    }

    /// `POST /api/registerSelfAsDeveloper`.
    ///
    /// # Errors
    ///
    /// Returns the backend or network error.
    pub async fn register_self_as_developer(&self) -> Result<(), PortalError> {
        let request = ApiRequest::post("/api/registerSelfAsDeveloper", &serde_json::json!({}))?;
        let result = self.execute(request).await;
        self.cache.clear_developer();
        result?;
        info!("registered as developer");
        Ok(())
    }

    async fn post_certificate(
        &self,
        body: CertificateRequest,
    ) -> Result<RegisteredCertificate, PortalError> {
        let key_id = body.key_id.clone();
        let request = ApiRequest::post("/api/me/certificates", &body)?;
        let result = self.execute(request).await;
        self.cache.clear_developer();

        let cert: Option<RegisteredCertificate> = result?.json()?;
        info!(key_id = %key_id, "certificate registered");
        Ok(cert.unwrap_or_default())
    }

    async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, PortalError> {
        self.transport.send(&request).await?.into_result()
    }

    async fn get_json<T: DeserializeOwned>(&self, path: String) -> Result<T, PortalError> {
        self.execute(ApiRequest::get(path)).await?.json()
    }
}
