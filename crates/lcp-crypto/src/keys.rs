use aes_gcm::aead::OsRng;
use aes_gcm::aead::rand_core::RngCore;
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};

use crate::{CryptoError, Result, aes_cbc};

/// The only passphrase hash algorithm of the basic and 1.0 profiles.
pub const USER_KEY_ALGORITHM_SHA256: &str = "http://www.w3.org/2001/04/xmlenc#sha256";

/// Generate a random 256-bit content key.
pub fn generate_content_key() -> [u8; 32] {
    let mut key = [0u8; 32];
    OsRng.fill_bytes(&mut key);
    key
}

/// Decode the hex passphrase hash supplied by a provider into the AES user key.
pub fn user_key_from_hex(passphrase_hash: &str) -> Result<[u8; 32]> {
    let bytes = hex::decode(passphrase_hash.trim())
        .map_err(|e| CryptoError::InvalidUserKey(e.to_string()))?;
    let got = bytes.len();
    bytes
        .try_into()
        .map_err(|_| CryptoError::InvalidUserKey(format!("expected 32 bytes, got {}", got)))
}

/// Content keys are stored as raw bytes; they must be AES-256 keys.
pub fn content_key_from_slice(bytes: &[u8]) -> Result<[u8; 32]> {
    bytes.try_into().map_err(|_| CryptoError::InvalidKeyLength {
        expected: 32,
        got: bytes.len(),
    })
}

/// Build the key check: the license id encrypted under the user key.
pub fn key_check(user_key: &[u8; 32], license_id: &str) -> Result<Vec<u8>> {
    aes_cbc::encrypt(user_key, license_id.as_bytes())
}

/// Verify a candidate user key against a key check, as a reading app would.
pub fn verify_key_check(user_key: &[u8; 32], license_id: &str, check: &[u8]) -> bool {
    matches!(aes_cbc::decrypt(user_key, check), Ok(plain) if plain == license_id.as_bytes())
}

/// Encrypt a user field and encode it the way it is stored in the license.
pub fn encrypt_field(user_key: &[u8; 32], value: &str) -> Result<String> {
    Ok(BASE64.encode(aes_cbc::encrypt(user_key, value.as_bytes())?))
}
