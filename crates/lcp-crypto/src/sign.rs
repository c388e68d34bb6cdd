use p256::ecdsa::{Signature as EcdsaSignature, SigningKey as EcdsaKey, VerifyingKey as EcdsaVerifyingKey};
use rsa::RsaPrivateKey;
use rsa::pkcs1v15::{Signature as RsaSignature, SigningKey as RsaKey};
use rsa::signature::{Keypair as _, SignatureEncoding as _, Signer as _, Verifier as _};
use serde::Serialize;
use sha2::Sha256;
use tracing::debug;

use lcp_types::license::Signature;

use crate::canon::canonical;
use crate::{CryptoError, Result};

pub const ALGORITHM_RSA_SHA256: &str = "http://www.w3.org/2001/04/xmldsig-more#rsa-sha256";
pub const ALGORITHM_ECDSA_SHA256: &str = "http://www.w3.org/2001/04/xmldsig-more#ecdsa-sha256";

enum Key {
    Rsa(RsaKey<Sha256>),
    Ecdsa(EcdsaKey),
}

/// Signs license documents with the provider certificate's private key.
pub struct Signer {
    key: Key,
    /// DER of the provider certificate, embedded in every signature.
    certificate: Vec<u8>,
}

impl Signer {
    pub fn rsa(key: RsaPrivateKey, certificate: Vec<u8>) -> Self {
        Self {
            key: Key::Rsa(RsaKey::<Sha256>::new(key)),
            certificate,
        }
    }

    pub fn ecdsa(key: EcdsaKey, certificate: Vec<u8>) -> Self {
        Self {
            key: Key::Ecdsa(key),
            certificate,
        }
    }

    /// Load a signer from a PEM certificate chain and a PEM private key.
    ///
    /// Accepts PKCS#8 (RSA or P-256), PKCS#1 RSA and SEC1 EC keys.
    pub fn from_pem(certificate_pem: &str, key_pem: &str) -> Result<Self> {
        let certificate = pem::parse_many(certificate_pem)
            .map_err(|e| CryptoError::Certificate(e.to_string()))?
            .into_iter()
            .find(|p| p.tag() == "CERTIFICATE")
            .ok_or_else(|| CryptoError::Certificate("no CERTIFICATE block found".into()))?
            .into_contents();

        let key = pem::parse(key_pem).map_err(|e| CryptoError::Key(e.to_string()))?;
        let der = key.contents();

        let signer = match key.tag() {
            "PRIVATE KEY" => {
                if let Ok(k) = <RsaPrivateKey as rsa::pkcs8::DecodePrivateKey>::from_pkcs8_der(der) {
                    Self::rsa(k, certificate)
                } else {
                    let k = <EcdsaKey as p256::pkcs8::DecodePrivateKey>::from_pkcs8_der(der)
                        .map_err(|e| CryptoError::Key(e.to_string()))?;
                    Self::ecdsa(k, certificate)
                }
            }
            "RSA PRIVATE KEY" => {
                let k = <RsaPrivateKey as rsa::pkcs1::DecodeRsaPrivateKey>::from_pkcs1_der(der)
                    .map_err(|e| CryptoError::Key(e.to_string()))?;
                Self::rsa(k, certificate)
            }
            "EC PRIVATE KEY" => {
                let secret = p256::SecretKey::from_sec1_der(der).map_err(|e| CryptoError::Key(e.to_string()))?;
                Self::ecdsa(EcdsaKey::from(secret), certificate)
            }
            other => return Err(CryptoError::Key(format!("unsupported PEM block {}", other))),
        };

        debug!("Loaded {} signing key", signer.algorithm());
        Ok(signer)
    }

    pub fn algorithm(&self) -> &'static str {
        match self.key {
            Key::Rsa(_) => ALGORITHM_RSA_SHA256,
            Key::Ecdsa(_) => ALGORITHM_ECDSA_SHA256,
        }
    }

    pub fn certificate(&self) -> &[u8] {
        &self.certificate
    }

    /// Sign the canonical JSON of `doc`.
    pub fn sign<T: Serialize>(&self, doc: &T) -> Result<Signature> {
        let plain = canonical(doc)?;

        let value = match &self.key {
            Key::Rsa(k) => k
                .try_sign(&plain)
                .map_err(|e| CryptoError::Signing(e.to_string()))?
                .to_vec(),
            // r || s, each left-padded to the curve size
            Key::Ecdsa(k) => {
                let sig: EcdsaSignature = k.try_sign(&plain).map_err(|e| CryptoError::Signing(e.to_string()))?;
                sig.to_bytes().to_vec()
            }
        };

        Ok(Signature {
            certificate: self.certificate.clone(),
            value,
            algorithm: self.algorithm().to_string(),
        })
    }

    /// Check a signature produced by this signer against `doc`.
    pub fn verify<T: Serialize>(&self, doc: &T, signature: &Signature) -> Result<()> {
        if signature.algorithm != self.algorithm() {
            return Err(CryptoError::Signing(format!("unexpected algorithm {}", signature.algorithm)));
        }
        let plain = canonical(doc)?;

        match &self.key {
            Key::Rsa(k) => {
                let sig = RsaSignature::try_from(signature.value.as_slice())
                    .map_err(|e| CryptoError::Signing(e.to_string()))?;
                k.verifying_key()
                    .verify(&plain, &sig)
                    .map_err(|e| CryptoError::Signing(e.to_string()))
            }
            Key::Ecdsa(k) => {
                let sig = EcdsaSignature::from_slice(&signature.value)
                    .map_err(|e| CryptoError::Signing(e.to_string()))?;
                EcdsaVerifyingKey::from(k)
                    .verify(&plain, &sig)
                    .map_err(|e| CryptoError::Signing(e.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_core::OsRng;
    use serde_json::json;

    fn cert_pem() -> String {
        pem::encode(&pem::Pem::new("CERTIFICATE", vec![0x30, 0x03, 0x02, 0x01, 0x01]))
    }

    #[test]
    fn ecdsa_signature_is_raw_r_and_s() {
        let signer = Signer::ecdsa(EcdsaKey::random(&mut OsRng), vec![1, 2, 3]);
        let doc = json!({"id": "L1", "provider": "https://provider.example"});

        let sig = signer.sign(&doc).unwrap();
        assert_eq!(sig.algorithm, ALGORITHM_ECDSA_SHA256);
        assert_eq!(sig.value.len(), 64);
        assert_eq!(sig.certificate, vec![1, 2, 3]);
        signer.verify(&doc, &sig).unwrap();
    }

    #[test]
    fn rsa_signature_verifies_and_detects_tampering() {
        let key = RsaPrivateKey::new(&mut OsRng, 1024).unwrap();
        let signer = Signer::rsa(key, vec![9]);
        let doc = json!({"id": "L1", "rights": {"print": 10}});

        let sig = signer.sign(&doc).unwrap();
        assert_eq!(sig.algorithm, ALGORITHM_RSA_SHA256);
        signer.verify(&doc, &sig).unwrap();

        let tampered = json!({"id": "L1", "rights": {"print": 1000}});
        assert!(signer.verify(&tampered, &sig).is_err());
    }

    #[test]
    fn signature_member_is_excluded_from_signed_bytes() {
        let signer = Signer::ecdsa(EcdsaKey::random(&mut OsRng), vec![]);
        let doc = json!({"id": "L1"});
        let sig = signer.sign(&doc).unwrap();

        let signed = json!({"id": "L1", "signature": serde_json::to_value(&sig).unwrap()});
        signer.verify(&signed, &sig).unwrap();
    }

    #[test]
    fn loads_pkcs8_keys_from_pem() {
        use p256::pkcs8::EncodePrivateKey;

        let key = EcdsaKey::random(&mut OsRng);
        let key_pem = key.to_pkcs8_pem(p256::pkcs8::LineEnding::LF).unwrap();

        let signer = Signer::from_pem(&cert_pem(), &key_pem).unwrap();
        assert_eq!(signer.algorithm(), ALGORITHM_ECDSA_SHA256);
        assert_eq!(signer.certificate(), &[0x30, 0x03, 0x02, 0x01, 0x01]);
    }

    #[test]
    fn rejects_unknown_key_blocks() {
        let bogus = pem::encode(&pem::Pem::new("DSA PRIVATE KEY", vec![1, 2, 3]));
        assert!(Signer::from_pem(&cert_pem(), &bogus).is_err());
        assert!(Signer::from_pem("garbage", &bogus).is_err());
    }
}
