//! The crypto provider contract and its device-key implementation.

use crate::cipher::{open, parse_token, seal};
use crate::error::{CryptoError, CryptoResult};
use crate::key::{derive_key, Salt};
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

const MIN_PASSWORD_LEN: usize = 8;

/// Encryption provider used by the storage middleware and backup paths.
///
/// `encrypt`/`decrypt` use the implementation's own key material (a device
/// secret); the password variants derive a throwaway key from a
/// user-supplied password and are used for portable backups.
pub trait CryptoProvider: Send + Sync {
    fn encrypt(&self, plaintext: &str) -> CryptoResult<String>;
    fn decrypt(&self, token: &str) -> CryptoResult<String>;
    fn encrypt_with_password(&self, plaintext: &str, password: &str) -> CryptoResult<String>;
    fn decrypt_with_password(&self, token: &str, password: &str) -> CryptoResult<String>;
}

/// Device-local secret material. Never serialized, zeroized on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct DeviceSecret(Vec<u8>);

impl DeviceSecret {
    /// Generates fresh random secret material for a new device.
    pub fn generate() -> Self {
        let mut bytes = vec![0u8; 32];
        rand::rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Reconstructs a secret from persisted bytes (platform keystore).
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

/// Crypto provider bound to one device's secret.
///
/// Two devices hold different secrets, so the same plaintext encrypts to
/// different tokens on each — moving data between devices requires a
/// password-based backup and re-encryption on import.
pub struct DeviceCrypto {
    secret: DeviceSecret,
}

impl DeviceCrypto {
    pub fn new(secret: DeviceSecret) -> Self {
        Self { secret }
    }

    fn seal_with(&self, material: &[u8], plaintext: &str) -> CryptoResult<String> {
        let salt = Salt::random();
        let key = derive_key(material, &salt)?;
        seal(&key, &salt, plaintext.as_bytes())
    }

    fn open_with(&self, material: &[u8], token: &str) -> CryptoResult<String> {
        let parsed = parse_token(token)?;
        let key = derive_key(material, &parsed.salt)?;
        let plaintext = open(&key, &parsed)?;
        String::from_utf8(plaintext)
            .map_err(|e| CryptoError::Malformed(format!("plaintext not utf-8: {e}")))
    }
}

impl CryptoProvider for DeviceCrypto {
    fn encrypt(&self, plaintext: &str) -> CryptoResult<String> {
        self.seal_with(&self.secret.0, plaintext)
    }

    fn decrypt(&self, token: &str) -> CryptoResult<String> {
        self.open_with(&self.secret.0, token)
    }

    fn encrypt_with_password(&self, plaintext: &str, password: &str) -> CryptoResult<String> {
        if password.len() < MIN_PASSWORD_LEN {
            return Err(CryptoError::PasswordTooShort);
        }
        self.seal_with(password.as_bytes(), plaintext)
    }

    fn decrypt_with_password(&self, token: &str, password: &str) -> CryptoResult<String> {
        if password.len() < MIN_PASSWORD_LEN {
            return Err(CryptoError::PasswordTooShort);
        }
        self.open_with(password.as_bytes(), token)
    }
}

/// Round-trips a short known string through the provider. Callers that
/// enable encryption must fail closed when this errors rather than silently
/// running unencrypted.
pub fn self_test(provider: &dyn CryptoProvider) -> CryptoResult<()> {
    const PROBE: &str = "cleansheet-self-test";
    let token = provider.encrypt(PROBE)?;
    let recovered = provider.decrypt(&token)?;
    if recovered != PROBE {
        return Err(CryptoError::SelfTest);
    }
    Ok(())
}
