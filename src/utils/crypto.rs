// Cryptographic utilities for random tokens and sealed cookie payloads

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Key, Nonce,
};
use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose, Engine as _};
use rand::RngCore;
use serde::{de::DeserializeOwned, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Nonce size for AES-256-GCM encryption (96 bits)
pub const NONCE_SIZE: usize = 12;

/// Encryption key size for AES-256 (256 bits)
pub const ENCRYPTION_KEY_SIZE: usize = 32;

/// Generate a cryptographically secure CSRF token for the OAuth `state` parameter
///
/// 24 bytes (192 bits) of entropy, base64url encoded to 32 characters.
#[must_use]
pub fn generate_csrf_token() -> String {
    generate_nonce(24)
}

/// Generate `length` random bytes, base64url encoded without padding
#[must_use]
pub fn generate_nonce(length: usize) -> String {
    let mut nonce = vec![0u8; length];
    rand::rng().fill_bytes(&mut nonce);
    general_purpose::URL_SAFE_NO_PAD.encode(nonce)
}

/// Encrypt data using AES-256-GCM
///
/// The output is `base64url(nonce || ciphertext || tag)`. GCM authenticates the
/// payload, so any modification is detected on decryption.
///
/// # Errors
///
/// Returns an error if the key has the wrong length, serialization fails, or
/// encryption fails
pub fn encrypt_data<T: Serialize>(data: &T, key: &[u8]) -> Result<String> {
    if key.len() != ENCRYPTION_KEY_SIZE {
        return Err(anyhow!(
            "Invalid key length: expected {ENCRYPTION_KEY_SIZE} bytes, got {}",
            key.len()
        ));
    }

    let json_data = serde_json::to_vec(data).context("Failed to serialize data")?;

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    rand::rng().fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let ciphertext = cipher
        .encrypt(nonce, json_data.as_slice())
        .map_err(|e| anyhow!("AES encryption failed: {e}"))?;

    let mut combined = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    combined.extend_from_slice(&nonce_bytes);
    combined.extend_from_slice(&ciphertext);

    Ok(general_purpose::URL_SAFE_NO_PAD.encode(&combined))
}

/// Decrypt data produced by [`encrypt_data`]
///
/// # Errors
///
/// Returns an error if the key has the wrong length, the input is not valid
/// base64url, authentication fails, or the plaintext does not deserialize to `T`
pub fn decrypt_data<T: DeserializeOwned>(encrypted_data: &str, key: &[u8]) -> Result<T> {
    if key.len() != ENCRYPTION_KEY_SIZE {
        return Err(anyhow!(
            "Invalid key length: expected {ENCRYPTION_KEY_SIZE} bytes, got {}",
            key.len()
        ));
    }

    let combined = general_purpose::URL_SAFE_NO_PAD
        .decode(encrypted_data)
        .context("Failed to decode base64 data")?;

    if combined.len() < NONCE_SIZE {
        return Err(anyhow!("Invalid data length"));
    }

    let (nonce_bytes, ciphertext) = combined.split_at(NONCE_SIZE);
    let nonce = Nonce::from_slice(nonce_bytes);

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let plaintext = cipher
        .decrypt(nonce, ciphertext)
        .map_err(|e| anyhow!("AES decryption failed: {e}"))?;

    serde_json::from_slice(&plaintext).context("Failed to deserialize data from decrypted JSON")
}

/// Derive the 256-bit cookie key from the configured session secret
#[must_use]
pub fn derive_encryption_key(input_key: &[u8]) -> [u8; ENCRYPTION_KEY_SIZE] {
    let mut hasher = Sha256::new();
    hasher.update(b"aurora-gate/session-cookie/v1");
    hasher.update(input_key);
    hasher.finalize().into()
}

/// Compare two secrets without an early exit on the first differing byte
#[must_use]
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    let a_bytes = a.as_bytes();
    let b_bytes = b.as_bytes();
    if a_bytes.len() != b_bytes.len() {
        return false;
    }
    a_bytes.ct_eq(b_bytes).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Payload {
        name: String,
        count: u32,
    }

    fn test_key() -> [u8; ENCRYPTION_KEY_SIZE] {
        derive_encryption_key(b"unit-test-secret")
    }

    #[test]
    fn test_csrf_token_shape() {
        let token = generate_csrf_token();
        assert_eq!(token.len(), 32);
        assert!(token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        assert_ne!(token, generate_csrf_token());
    }

    #[test]
    fn test_encrypt_decrypt() {
        let key = test_key();
        let payload = Payload {
            name: "Ada".to_string(),
            count: 3,
        };

        let sealed = encrypt_data(&payload, &key).unwrap();
        assert!(!sealed.contains("Ada"));

        let opened: Payload = decrypt_data(&sealed, &key).unwrap();
        assert_eq!(opened, payload);
    }

    #[test]
    fn test_decrypt_rejects_tampering() {
        let key = test_key();
        let sealed = encrypt_data(&"hello", &key).unwrap();

        let mut bytes = general_purpose::URL_SAFE_NO_PAD.decode(&sealed).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        let tampered = general_purpose::URL_SAFE_NO_PAD.encode(bytes);

        assert!(decrypt_data::<String>(&tampered, &key).is_err());
    }

    #[test]
    fn test_decrypt_with_wrong_key_fails() {
        let sealed = encrypt_data(&"hello", &test_key()).unwrap();
        let other = derive_encryption_key(b"another-secret");
        assert!(decrypt_data::<String>(&sealed, &other).is_err());
    }

    #[test]
    fn test_decrypt_rejects_short_input() {
        assert!(decrypt_data::<String>("AAAA", &test_key()).is_err());
        assert!(decrypt_data::<String>("not base64!", &test_key()).is_err());
    }

    #[test]
    fn test_invalid_key_length() {
        assert!(encrypt_data(&"x", b"short").is_err());
    }

    #[test]
    fn test_key_derivation_is_stable() {
        assert_eq!(derive_encryption_key(b"abc"), derive_encryption_key(b"abc"));
        assert_ne!(derive_encryption_key(b"abc"), derive_encryption_key(b"abd"));
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq("state-123", "state-123"));
        assert!(!constant_time_eq("state-123", "state-124"));
        assert!(!constant_time_eq("short", "longer-value"));
    }
}
