use aes_gcm::{
    Aes256Gcm, Key, Nonce,
    aead::{Aead, KeyInit},
};

use crate::{CryptoError, Result};

/// Algorithm URI of AES-256-GCM as written in encryption.xml.
pub const ALGORITHM_AES256_GCM: &str = "http://www.w3.org/2009/xmlenc11#aes256-gcm";

const NONCE_LEN: usize = 12;

/// AES-256-GCM encrypter for publication resources.
///
/// Nonces come from a per-encrypter counter (big-endian u64 in the first
/// eight bytes), so one encrypter must be used for at most one key.
#[derive(Debug, Default)]
pub struct GcmEncrypter {
    counter: u64,
}

impl GcmEncrypter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Encrypt one resource. Returns nonce || ciphertext || tag.
    pub fn encrypt(&mut self, key: &[u8; 32], plaintext: &[u8]) -> Result<Vec<u8>> {
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));

        let mut nonce_bytes = [0u8; NONCE_LEN];
        nonce_bytes[..8].copy_from_slice(&self.counter.to_be_bytes());
        self.counter += 1;

        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
            .map_err(|e| CryptoError::Encryption(e.to_string()))?;

        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }
}

/// Decrypt a nonce-prefixed AES-256-GCM resource.
pub fn decrypt(key: &[u8; 32], data: &[u8]) -> Result<Vec<u8>> {
    if data.len() < NONCE_LEN {
        return Err(CryptoError::Decryption("missing nonce".into()));
    }
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let (nonce, ciphertext) = data.split_at(NONCE_LEN);

    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|e| CryptoError::Decryption(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::generate_content_key;

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let key = generate_content_key();
        let mut enc = GcmEncrypter::new();

        let out = enc.encrypt(&key, b"<html>chapter one</html>").unwrap();
        assert_eq!(decrypt(&key, &out).unwrap(), b"<html>chapter one</html>");
    }

    #[test]
    fn nonce_is_a_big_endian_counter() {
        let key = generate_content_key();
        let mut enc = GcmEncrypter::new();

        let first = enc.encrypt(&key, b"a").unwrap();
        let second = enc.encrypt(&key, b"b").unwrap();
        assert_eq!(first[..NONCE_LEN], [0u8; NONCE_LEN]);
        assert_eq!(second[..NONCE_LEN], [0, 0, 0, 0, 0, 0, 0, 1, 0, 0, 0, 0]);
    }

    #[test]
    fn wrong_key_fails() {
        let mut enc = GcmEncrypter::new();
        let out = enc.encrypt(&generate_content_key(), b"secret").unwrap();
        assert!(decrypt(&generate_content_key(), &out).is_err());
    }
}
