//! Core library for `devportal`.
//!
//! Holds the portal data model, the per-session read cache, client keypair
//! generation with PEM encoding, the credential archive, date formatting and
//! input validation. Nothing in this crate performs network I/O; the
//! `devportal-client` crate wires these pieces to the backend.

pub mod archive;
pub mod cache;
pub mod catalog;
pub mod error;
pub mod format;
pub mod keygen;
pub mod model;
pub mod pem;
pub mod validate;
