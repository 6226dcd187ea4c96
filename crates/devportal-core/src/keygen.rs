//! Client keypair generation for mTLS credentials.
//!
//! The keypair is RSA-2048 with public exponent 65537, intended for
//! RSASSA-PKCS1-v1_5 with SHA-256. Only the public half ever leaves the
//! process; the private half is exported straight into a zeroizing PEM
//! buffer for the credential archive.

use rand::Rng;
use rand::rngs::OsRng;
use rsa::pkcs8::{EncodePrivateKey, EncodePublicKey};
use rsa::{BigUint, RsaPrivateKey};
use zeroize::Zeroizing;

use crate::error::CryptoError;
use crate::pem;

pub const RSA_MODULUS_BITS: usize = 2048;
pub const RSA_PUBLIC_EXPONENT: u32 = 65_537;

const KEY_ID_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const KEY_ID_SEGMENTS: usize = 3;
const KEY_ID_SEGMENT_LEN: usize = 3;

/// A freshly generated client keypair.
pub struct ClientKeyPair {
    private_key: RsaPrivateKey,
}

impl std::fmt::Debug for ClientKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientKeyPair")
            .field("bits", &RSA_MODULUS_BITS)
            .finish_non_exhaustive()
    }
}

/// Both halves of a keypair in PEM form.
pub struct ExportedKeys {
    /// PKCS#8 private key, wiped on drop.
    pub private_key_pem: Zeroizing<String>,
    /// SPKI public key.
    pub public_key_pem: String,
}

impl ClientKeyPair {
    /// Generate a new keypair from the OS random source.
    ///
    /// This is CPU-bound and takes noticeable time; async callers should run
    /// it on a blocking thread.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::KeyGeneration` if prime generation fails.
    pub fn generate() -> Result<Self, CryptoError> {
        let exponent = BigUint::from(RSA_PUBLIC_EXPONENT);
        let private_key = RsaPrivateKey::new_with_exp(&mut OsRng, RSA_MODULUS_BITS, &exponent)
            .map_err(|e| CryptoError::KeyGeneration {
                reason: e.to_string(),
            })?;
        Ok(Self { private_key })
    }

    /// Export the private key as PKCS#8 and the public key as SPKI, both
    /// PEM-wrapped.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::Export` if DER encoding fails.
    pub fn export(&self) -> Result<ExportedKeys, CryptoError> {
        let private_der = self
            .private_key
            .to_pkcs8_der()
            .map_err(|e| CryptoError::Export {
                format: "pkcs8",
                reason: e.to_string(),
            })?;
        let public_der = self
            .private_key
            .to_public_key()
            .to_public_key_der()
            .map_err(|e| CryptoError::Export {
                format: "spki",
                reason: e.to_string(),
            })?;

        Ok(ExportedKeys {
            private_key_pem: pem::encode_private_key(private_der.as_bytes()),
            public_key_pem: pem::encode_public_key(public_der.as_bytes()),
        })
    }
}

/// Random identifier for a new key, e.g. `k3x-0pa-zz9`.
pub fn generate_key_id() -> String {
    generate_key_id_with(&mut rand::thread_rng())
}

/// [`generate_key_id`] with a caller-supplied RNG.
pub fn generate_key_id_with<R: Rng + ?Sized>(rng: &mut R) -> String {
    let mut id = String::with_capacity(KEY_ID_SEGMENTS * (KEY_ID_SEGMENT_LEN + 1));
    for segment in 0..KEY_ID_SEGMENTS {
        if segment > 0 {
            id.push('-');
        }
        for _ in 0..KEY_ID_SEGMENT_LEN {
            let idx = rng.gen_range(0..KEY_ID_ALPHABET.len());
            id.push(char::from(KEY_ID_ALPHABET[idx]));
        }
    }
    id
}
