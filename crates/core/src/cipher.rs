//! Authenticated encryption of raw physician messages.
//!
//! The message key is derived once per process with PBKDF2-HMAC-SHA256 over a fixed salt and
//! held in memory that is zeroed on drop. Messages are sealed with AES-256-GCM under a fresh
//! random 96-bit nonce and rendered as an opaque base64 blob:
//!
//! ```text
//! base64( [12-byte nonce][ciphertext || 16-byte tag] )
//! ```
//!
//! Decryption checks the GCM tag, so a wrong key, a flipped bit or a truncated blob is always
//! reported as an error rather than producing garbled plaintext.

use crate::config::EncryptionPassphrase;
use crate::constants::{KEY_DERIVATION_SALT, MIN_PBKDF2_ITERATIONS, PBKDF2_ITERATIONS};
use crate::error::CryptoError;
use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::{engine::general_purpose, Engine as _};
use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;
use zeroize::Zeroizing;

pub const KEY_LENGTH: usize = 32;
const NONCE_LENGTH: usize = 12;
const TAG_LENGTH: usize = 16;

/// AES-256 key for message encryption, zeroed on drop.
pub struct MessageCipher {
    key: Zeroizing<[u8; KEY_LENGTH]>,
}

impl MessageCipher {
    /// Derive the process-wide key from the configured passphrase and the fixed salt.
    pub fn from_passphrase(passphrase: &EncryptionPassphrase) -> Result<Self, CryptoError> {
        Self::derive(passphrase.expose(), KEY_DERIVATION_SALT, PBKDF2_ITERATIONS)
    }

    /// Derive a key with PBKDF2-HMAC-SHA256.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::WeakWorkFactor`] if `iterations` is below
    /// [`MIN_PBKDF2_ITERATIONS`].
    pub fn derive(passphrase: &str, salt: &[u8], iterations: u32) -> Result<Self, CryptoError> {
        if iterations < MIN_PBKDF2_ITERATIONS {
            return Err(CryptoError::WeakWorkFactor {
                min: MIN_PBKDF2_ITERATIONS,
                got: iterations,
            });
        }

        let mut key = Zeroizing::new([0u8; KEY_LENGTH]);
        pbkdf2_hmac::<Sha256>(passphrase.as_bytes(), salt, iterations, &mut key[..]);
        Ok(Self { key })
    }

    /// Encrypt `plaintext` into an opaque base64 blob.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.key[..]));

        let mut nonce_bytes = [0u8; NONCE_LENGTH];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| CryptoError::EncryptionFailed)?;

        let mut bytes = Vec::with_capacity(NONCE_LENGTH + ciphertext.len());
        bytes.extend_from_slice(&nonce_bytes);
        bytes.extend_from_slice(&ciphertext);
        Ok(general_purpose::STANDARD.encode(bytes))
    }

    /// Decrypt a blob produced by [`encrypt`](Self::encrypt).
    ///
    /// # Errors
    ///
    /// - [`CryptoError::InvalidEncoding`] if the blob is not base64
    /// - [`CryptoError::Truncated`] if it cannot hold a nonce and tag
    /// - [`CryptoError::IntegrityCheckFailed`] on a wrong key or tampered data
    /// - [`CryptoError::InvalidUtf8`] if the authenticated plaintext is not text
    pub fn decrypt(&self, blob: &str) -> Result<String, CryptoError> {
        let bytes = general_purpose::STANDARD
            .decode(blob.trim())
            .map_err(CryptoError::InvalidEncoding)?;

        if bytes.len() < NONCE_LENGTH + TAG_LENGTH {
            return Err(CryptoError::Truncated(bytes.len()));
        }

        let (nonce_bytes, ciphertext) = bytes.split_at(NONCE_LENGTH);
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.key[..]));

        let plaintext = cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| CryptoError::IntegrityCheckFailed)?;

        String::from_utf8(plaintext).map_err(|_| CryptoError::InvalidUtf8)
    }
}

impl std::fmt::Debug for MessageCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("MessageCipher(<key redacted>)")
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::sync::{Arc, OnceLock};

    /// Shared cipher so the slow key derivation runs once per test binary.
    pub(crate) fn shared_cipher() -> Arc<MessageCipher> {
        static CIPHER: OnceLock<Arc<MessageCipher>> = OnceLock::new();
        CIPHER
            .get_or_init(|| {
                Arc::new(
                    MessageCipher::derive("test passphrase 1", b"test-salt", MIN_PBKDF2_ITERATIONS)
                        .unwrap(),
                )
            })
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::shared_cipher;
    use super::*;

    #[test]
    fn encrypt_decrypt_round_trip() {
        let cipher = shared_cipher();
        for text in ["temp:39.5 bp:185/90 patientid:P42", "", "toux et céphalée 🤒"] {
            let blob = cipher.encrypt(text).unwrap();
            assert_eq!(cipher.decrypt(&blob).unwrap(), text);
        }
    }

    #[test]
    fn blob_does_not_contain_plaintext() {
        let cipher = shared_cipher();
        let blob = cipher.encrypt("patientid:P42").unwrap();
        assert!(!blob.contains("P42"));
    }

    #[test]
    fn same_plaintext_encrypts_differently() {
        let cipher = shared_cipher();
        let a = cipher.encrypt("same data").unwrap();
        let b = cipher.encrypt("same data").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn decrypt_with_wrong_key_fails() {
        let cipher = shared_cipher();
        let other =
            MessageCipher::derive("another passphrase", b"test-salt", MIN_PBKDF2_ITERATIONS)
                .unwrap();
        let blob = cipher.encrypt("secret").unwrap();
        assert!(matches!(
            other.decrypt(&blob),
            Err(CryptoError::IntegrityCheckFailed)
        ));
    }

    #[test]
    fn tampered_blob_is_rejected() {
        let cipher = shared_cipher();
        let blob = cipher.encrypt("secret data").unwrap();
        let mut bytes = general_purpose::STANDARD.decode(&blob).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        let tampered = general_purpose::STANDARD.encode(bytes);
        assert!(matches!(
            cipher.decrypt(&tampered),
            Err(CryptoError::IntegrityCheckFailed)
        ));
    }

    #[test]
    fn malformed_blobs_are_rejected() {
        let cipher = shared_cipher();
        assert!(matches!(
            cipher.decrypt("not base64!!"),
            Err(CryptoError::InvalidEncoding(_))
        ));
        let short = general_purpose::STANDARD.encode([0u8; 10]);
        assert!(matches!(
            cipher.decrypt(&short),
            Err(CryptoError::Truncated(10))
        ));
    }

    #[test]
    fn derive_rejects_weak_work_factor() {
        let result = MessageCipher::derive("passphrase", b"salt", 1_000);
        assert!(matches!(
            result,
            Err(CryptoError::WeakWorkFactor { got: 1_000, .. })
        ));
    }

    #[test]
    fn derive_is_deterministic() {
        let a = MessageCipher::derive("passphrase", b"salt", MIN_PBKDF2_ITERATIONS).unwrap();
        let b = MessageCipher::derive("passphrase", b"salt", MIN_PBKDF2_ITERATIONS).unwrap();
        assert_eq!(*a.key, *b.key);
        let blob = a.encrypt("hello").unwrap();
        assert_eq!(b.decrypt(&blob).unwrap(), "hello");
    }
}
