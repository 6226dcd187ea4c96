//! Portal data model as exchanged with the backend.
//!
//! Field names follow the backend's JSON. Everything except the identifying
//! fields is optional because the backend passes upstream records through
//! without normalizing them.

use serde::{Deserialize, Deserializer, Serialize};

/// A catalog entry a developer app can be granted access to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiProduct {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// URL of the API specification, if published.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec_url: Option<String>,
}

/// Grant status of one API product inside a credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiProductStatus {
    pub apiproduct: String,
    pub status: String,
}

/// Consumer key/secret pair of a developer app.
///
/// Only ever read from the backend; never built client-side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    #[serde(default)]
    pub api_products: Vec<ApiProductStatus>,
    pub consumer_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consumer_secret: Option<String>,
    /// `"-1"` for non-expiring keys, otherwise epoch milliseconds.
    #[serde(default, deserialize_with = "string_or_number")]
    pub expires_at: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub issued_at: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

/// Name/value attribute attached to an app or developer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    pub value: String,
}

/// A named credential bundle owned by the developer.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeveloperApp {
    #[serde(default)]
    pub app_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(
        default,
        deserialize_with = "string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub created_at: Option<String>,
    #[serde(
        default,
        deserialize_with = "string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_modified_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub developer_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_family: Option<String>,
    #[serde(default)]
    pub attributes: Vec<Attribute>,
    #[serde(default)]
    pub credentials: Vec<Credential>,
}

impl DeveloperApp {
    /// Stand-in shown when an app's detail read fails, so one broken app
    /// does not hide the rest of the list.
    pub fn load_error_placeholder(name: &str) -> Self {
        Self {
            name: format!("{name} (Error Loading)"),
            status: Some("Error".to_owned()),
            ..Self::default()
        }
    }
}

/// Certificate registered against the developer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeveloperCertificate {
    pub id: String,
    pub fingerprint: String,
}

/// The authenticated developer as returned by `GET /api/me`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeveloperDetails {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub developer_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    #[serde(default)]
    pub apps: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(
        default,
        deserialize_with = "string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub created_at: Option<String>,
    #[serde(
        default,
        deserialize_with = "string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_modified_at: Option<String>,
    /// The backend names this list `attribute`, singular.
    #[serde(default, rename = "attribute")]
    pub attributes: Vec<Attribute>,
    #[serde(default)]
    pub certificates: Vec<DeveloperCertificate>,
}

impl DeveloperDetails {
    /// Email if the backend supplied a non-blank one.
    pub fn email(&self) -> Option<&str> {
        let email = self.email.trim();
        (!email.is_empty()).then_some(email)
    }
}

/// Backend response to a certificate registration or upload.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RegisteredCertificate {
    /// PEM-encoded signed certificate.
    #[serde(default)]
    pub pem: String,
    #[serde(default)]
    pub fingerprint: Option<String>,
    #[serde(default, rename = "certificate-id")]
    pub certificate_id: Option<String>,
    #[serde(default, rename = "subjectDN")]
    pub subject_dn: Option<String>,
    #[serde(default, rename = "notBefore")]
    pub not_before: Option<String>,
    #[serde(default, rename = "notAfter")]
    pub not_after: Option<String>,
}

/// Body of `POST /api/myapps`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewDeveloperApp {
    pub name: String,
    pub api_products: Vec<String>,
}

/// Body of `POST /api/me/certificates`.
///
/// The backend signs a certificate when `publicKey` is present and
/// validates an uploaded one when `certificate` is present.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateRequest {
    pub key_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate: Option<String>,
}

/// Backend response to `POST /api/auth/login`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoginResponse {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

/// Timestamps arrive as strings from some upstream records and as bare
/// numbers from others.
fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<serde_json::Value>::deserialize(deserializer)? {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    })
}
