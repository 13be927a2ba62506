//! Encryption layer for Cleansheet.
//!
//! Provides the crypto provider the storage middleware and backup paths sit
//! on top of:
//! - Argon2id key derivation from device-local secret material or a
//!   user-supplied password
//! - ChaCha20-Poly1305 authenticated encryption
//! - Opaque base64 ciphertext tokens carrying their own salt and nonce
//!
//! Every token is produced with a fresh random salt and nonce, so encrypting
//! the same plaintext twice never yields the same token. Device secrets are
//! never serialized and are zeroized on drop.

mod cipher;
mod error;
mod key;
mod provider;

pub use cipher::{parse_token, Token, NONCE_SIZE, TAG_SIZE};
pub use error::{CryptoError, CryptoResult};
pub use key::{derive_key, DerivedKey, Salt, KEY_SIZE, SALT_SIZE};
pub use provider::{self_test, CryptoProvider, DeviceCrypto, DeviceSecret};
