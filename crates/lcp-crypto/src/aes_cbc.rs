use aes::Aes256;
use aes_gcm::aead::OsRng;
use aes_gcm::aead::rand_core::RngCore;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit, block_padding::Pkcs7};

use crate::{CryptoError, Result};

/// Algorithm URI of AES-256-CBC as written in license documents.
pub const ALGORITHM_AES256_CBC: &str = "http://www.w3.org/2001/04/xmlenc#aes256-cbc";

const IV_LEN: usize = 16;

type Encryptor = cbc::Encryptor<Aes256>;
type Decryptor = cbc::Decryptor<Aes256>;

/// Encrypt with AES-256-CBC. Returns IV || ciphertext.
pub fn encrypt(key: &[u8; 32], plaintext: &[u8]) -> Result<Vec<u8>> {
    let mut iv = [0u8; IV_LEN];
    OsRng.fill_bytes(&mut iv);

    let ciphertext = Encryptor::new(key.into(), &iv.into()).encrypt_padded_vec_mut::<Pkcs7>(plaintext);

    let mut out = Vec::with_capacity(IV_LEN + ciphertext.len());
    out.extend_from_slice(&iv);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypt an IV-prefixed AES-256-CBC message.
pub fn decrypt(key: &[u8; 32], data: &[u8]) -> Result<Vec<u8>> {
    if data.len() < 2 * IV_LEN || data.len() % IV_LEN != 0 {
        return Err(CryptoError::Decryption(format!(
            "ciphertext length {} is not a whole number of blocks",
            data.len()
        )));
    }
    let (iv, ciphertext) = data.split_at(IV_LEN);
    let iv: [u8; IV_LEN] = iv
        .try_into()
        .map_err(|_| CryptoError::Decryption("short IV".into()))?;

    Decryptor::new(key.into(), &iv.into())
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|e| CryptoError::Decryption(e.to_string()))
}
