//! Crypto error types.

use thiserror::Error;

/// Result type for crypto operations.
pub type CryptoResult<T> = Result<T, CryptoError>;

/// Errors that can occur in crypto operations.
///
/// `WrongKey` and `Malformed` are deliberately distinct: a restore flow must
/// tell "wrong password" apart from "corrupted file" because the user's
/// corrective action differs.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("encryption failed: {0}")]
    Encryption(String),

    /// Authenticated decryption failed — wrong password or device key, or
    /// tampered ciphertext. The cipher cannot distinguish these.
    #[error("decryption failed (wrong key or tampered data)")]
    WrongKey,

    /// The token could not be parsed at all (bad base64, truncated).
    #[error("malformed ciphertext token: {0}")]
    Malformed(String),

    #[error("password must be at least 8 characters")]
    PasswordTooShort,

    #[error("key derivation failed: {0}")]
    Kdf(String),

    #[error("encryption self-test failed")]
    SelfTest,
}
