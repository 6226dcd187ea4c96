//! Error types for `devportal-core`.
//!
//! Crypto errors never include key material, only a description of the
//! operation that failed.

/// Errors from client keypair generation and export.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CryptoError {
    /// RSA key generation failed.
    #[error("key generation failed: {reason}")]
    KeyGeneration { reason: String },

    /// Exporting a key to its standard DER encoding failed.
    #[error("key export failed ({format}): {reason}")]
    Export { format: &'static str, reason: String },
}

/// Errors from user input that fails local validation.
///
/// The display strings are shown to the user as-is.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// App name was empty or whitespace.
    #[error("App name cannot be empty.")]
    EmptyAppName,

    /// No API product was selected for a new app.
    #[error("Please select at least one API Product.")]
    NoProductSelected,

    /// Certificate file does not carry an accepted extension.
    #[error("Invalid file type. Please select a .pem or .cer file.")]
    InvalidCertificateFile { file_name: String },

    /// Certificate file was empty.
    #[error("Could not read the selected file.")]
    EmptyCertificate,

    /// Identifier required by a delete call was empty.
    #[error("{what} is required")]
    MissingIdentifier { what: &'static str },
}

/// Errors from building the credential archive.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ArchiveError {
    /// The ZIP writer rejected an entry or failed to finish.
    #[error("failed to write archive entry '{entry}': {reason}")]
    Write { entry: String, reason: String },
}
