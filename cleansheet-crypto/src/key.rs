//! Key derivation.

use crate::error::{CryptoError, CryptoResult};
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Symmetric key size in bytes (ChaCha20-Poly1305).
pub const KEY_SIZE: usize = 32;

/// Per-token KDF salt size in bytes.
pub const SALT_SIZE: usize = 32;

/// Random salt mixed into every key derivation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Salt(pub [u8; SALT_SIZE]);

impl Salt {
    pub fn random() -> Self {
        let mut bytes = [0u8; SALT_SIZE];
        rand::rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; SALT_SIZE] {
        &self.0
    }
}

/// Derived symmetric key. Zeroized on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct DerivedKey(pub(crate) [u8; KEY_SIZE]);

impl DerivedKey {
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

/// Derives a symmetric key from secret material (device secret or password)
/// using Argon2id with default parameters.
pub fn derive_key(secret: &[u8], salt: &Salt) -> CryptoResult<DerivedKey> {
    let mut out = [0u8; KEY_SIZE];
    argon2::Argon2::default()
        .hash_password_into(secret, salt.as_bytes(), &mut out)
        .map_err(|e| CryptoError::Kdf(e.to_string()))?;
    Ok(DerivedKey(out))
}
