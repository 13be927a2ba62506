//! Token format and the authenticated cipher.
//!
//! A ciphertext token is `base64(salt ‖ nonce ‖ ciphertext+tag)`. The salt
//! feeds key derivation, the nonce feeds ChaCha20-Poly1305; both are random
//! per operation, so identical plaintext never produces identical tokens.

use crate::error::{CryptoError, CryptoResult};
use crate::key::{DerivedKey, Salt, SALT_SIZE};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chacha20poly1305::aead::Aead;
use chacha20poly1305::{ChaCha20Poly1305, KeyInit, Nonce};
use rand::RngCore;

/// ChaCha20-Poly1305 nonce size in bytes.
pub const NONCE_SIZE: usize = 12;

/// Poly1305 authentication tag size in bytes.
pub const TAG_SIZE: usize = 16;

/// Parsed components of a ciphertext token.
pub struct Token {
    pub salt: Salt,
    pub nonce: [u8; NONCE_SIZE],
    pub ciphertext: Vec<u8>,
}

/// Encrypts plaintext under the derived key, producing the token body for
/// the given salt.
pub(crate) fn seal(key: &DerivedKey, salt: &Salt, plaintext: &[u8]) -> CryptoResult<String> {
    let cipher = ChaCha20Poly1305::new(key.as_bytes().into());

    let mut nonce = [0u8; NONCE_SIZE];
    rand::rng().fill_bytes(&mut nonce);

    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|e| CryptoError::Encryption(e.to_string()))?;

    let mut combined = Vec::with_capacity(SALT_SIZE + NONCE_SIZE + ciphertext.len());
    combined.extend_from_slice(salt.as_bytes());
    combined.extend_from_slice(&nonce);
    combined.extend_from_slice(&ciphertext);
    Ok(BASE64.encode(combined))
}

/// Decrypts a parsed token under the derived key.
///
/// An AEAD failure maps to [`CryptoError::WrongKey`] — the cipher cannot
/// tell a wrong key from tampered data, but both are distinct from a token
/// that fails to parse.
pub(crate) fn open(key: &DerivedKey, token: &Token) -> CryptoResult<Vec<u8>> {
    let cipher = ChaCha20Poly1305::new(key.as_bytes().into());
    cipher
        .decrypt(Nonce::from_slice(&token.nonce), token.ciphertext.as_ref())
        .map_err(|_| CryptoError::WrongKey)
}

/// Splits a base64 token into salt, nonce and ciphertext.
pub fn parse_token(token: &str) -> CryptoResult<Token> {
    let combined = BASE64
        .decode(token)
        .map_err(|e| CryptoError::Malformed(format!("base64 decode: {e}")))?;

    if combined.len() < SALT_SIZE + NONCE_SIZE + TAG_SIZE {
        return Err(CryptoError::Malformed(format!(
            "token too short: {} bytes",
            combined.len()
        )));
    }

    let mut salt = [0u8; SALT_SIZE];
    salt.copy_from_slice(&combined[..SALT_SIZE]);
    let mut nonce = [0u8; NONCE_SIZE];
    nonce.copy_from_slice(&combined[SALT_SIZE..SALT_SIZE + NONCE_SIZE]);

    Ok(Token {
        salt: Salt(salt),
        nonce,
        ciphertext: combined[SALT_SIZE + NONCE_SIZE..].to_vec(),
    })
}
