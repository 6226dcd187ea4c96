//! Local checks on user input before anything is sent to the backend.

use crate::error::ValidationError;

const CERTIFICATE_EXTENSIONS: [&str; 2] = [".pem", ".cer"];

/// Accept `.pem` and `.cer` files by name only; contents are not inspected.
///
/// # Errors
///
/// Returns `ValidationError::InvalidCertificateFile` for any other suffix.
pub fn validate_certificate_file_name(file_name: &str) -> Result<(), ValidationError> {
    let lower = file_name.to_lowercase();
    if CERTIFICATE_EXTENSIONS.iter().any(|ext| lower.ends_with(ext)) {
        Ok(())
    } else {
        Err(ValidationError::InvalidCertificateFile {
            file_name: file_name.to_owned(),
        })
    }
}

/// Reject an empty certificate body.
///
/// # Errors
///
/// Returns `ValidationError::EmptyCertificate` if `contents` is blank.
pub fn validate_certificate_contents(contents: &str) -> Result<(), ValidationError> {
    if contents.trim().is_empty() {
        return Err(ValidationError::EmptyCertificate);
    }
    Ok(())
}

/// Check a new-app form and return the trimmed name with the product list.
///
/// # Errors
///
/// Returns `EmptyAppName` or `NoProductSelected`.
pub fn validate_new_app(
    name: &str,
    api_products: &[String],
) -> Result<(String, Vec<String>), ValidationError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ValidationError::EmptyAppName);
    }
    let products: Vec<String> = api_products
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .map(str::to_owned)
        .collect();
    if products.is_empty() {
        return Err(ValidationError::NoProductSelected);
    }
    Ok((name.to_owned(), products))
}

/// Require a non-blank identifier such as an app name or certificate id.
///
/// # Errors
///
/// Returns `ValidationError::MissingIdentifier` naming `what`.
pub fn require_identifier<'a>(value: &'a str, what: &'static str) -> Result<&'a str, ValidationError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ValidationError::MissingIdentifier { what });
    }
    Ok(value)
}
