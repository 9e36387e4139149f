//! Value-level encrypt/decrypt for secret fields persisted at the storage
//! boundary (spec §9 design note: per-user external provider API keys, the
//! JWT secret's at-rest counterpart). One symmetric key from `AppConfig::
//! encryption_key` feeds every call; there is no per-record key.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use sha2::{Digest, Sha256};
use thiserror::Error;

const NONCE_LEN: usize = 12;

#[derive(Debug, Error)]
pub enum SecretError {
    #[error("encryption failed")]
    Encrypt,
    #[error("decryption failed")]
    Decrypt,
    #[error("ciphertext too short")]
    Malformed,
}

/// `encryption_key` is an operator-chosen string of any length; hash it down
/// to a 256-bit AES key rather than requiring exactly 32 bytes from the env.
fn cipher(encryption_key: &str) -> Aes256Gcm {
    let digest = Sha256::digest(encryption_key.as_bytes());
    Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&digest))
}

/// Encrypts `plaintext`, returning `nonce || ciphertext` for storage verbatim
/// in a secret-bearing column.
pub fn encrypt(encryption_key: &str, plaintext: &[u8]) -> Result<Vec<u8>, SecretError> {
    let cipher = cipher(encryption_key);
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let ciphertext = cipher.encrypt(&nonce, plaintext).map_err(|_| SecretError::Encrypt)?;

    let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Inverse of [`encrypt`]. Fails closed on a malformed payload or a key that
/// doesn't match what the value was encrypted under.
pub fn decrypt(encryption_key: &str, payload: &[u8]) -> Result<Vec<u8>, SecretError> {
    if payload.len() < NONCE_LEN {
        return Err(SecretError::Malformed);
    }
    let (nonce_bytes, ciphertext) = payload.split_at(NONCE_LEN);
    let cipher = cipher(encryption_key);
    cipher
        .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
        .map_err(|_| SecretError::Decrypt)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_encrypt_decrypt() {
        let key = "operator-chosen-passphrase";
        let plaintext = b"sk-live-example-provider-key";

        let encrypted = encrypt(key, plaintext).expect("encrypt");
        assert_ne!(encrypted, plaintext);

        let decrypted = decrypt(key, &encrypted).expect("decrypt");
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn each_encryption_uses_a_fresh_nonce() {
        let key = "operator-chosen-passphrase";
        let a = encrypt(key, b"same plaintext").unwrap();
        let b = encrypt(key, b"same plaintext").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn wrong_key_fails_closed() {
        let encrypted = encrypt("key-a", b"secret").unwrap();
        assert!(decrypt("key-b", &encrypted).is_err());
    }

    #[test]
    fn truncated_payload_is_malformed() {
        assert!(matches!(decrypt("any-key", &[0u8; 4]), Err(SecretError::Malformed)));
    }
}
