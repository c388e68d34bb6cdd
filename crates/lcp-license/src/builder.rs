//! License builder.
//!
//! Turns a draft (metadata plus the provider's passphrase hash) and the
//! content record into a signed license. The passphrase hash only ever lives
//! in the draft: the returned license carries the key check, never the key.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use tracing::debug;

use lcp_crypto::aes_cbc::{self, ALGORITHM_AES256_CBC};
use lcp_crypto::keys::{self, USER_KEY_ALGORITHM_SHA256};
use lcp_crypto::sign::Signer;
use lcp_types::license::{
    ContentKey, ContentRecord, Encryption, License, LicenseDraft, Link, UserInfo, UserKey, UserKeyRequest,
};
use lcp_types::{CONTENT_TYPE_EPUB, CONTENT_TYPE_LSD_JSON};

use crate::{LicenseError, Result};

pub const PROFILE_BASIC: &str = "http://readium.org/lcp/basic-profile";
pub const PROFILE_1_0: &str = "http://readium.org/lcp/profile-1.0";

/// Encryption profile written into every license.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Profile {
    #[default]
    Basic,
    V1,
}

impl Profile {
    pub fn uri(self) -> &'static str {
        match self {
            Profile::Basic => PROFILE_BASIC,
            Profile::V1 => PROFILE_1_0,
        }
    }
}

impl FromStr for Profile {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "basic" => Ok(Profile::Basic),
            "1.0" => Ok(Profile::V1),
            other => Err(format!("unknown LCP profile: {}", other)),
        }
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.uri())
    }
}

pub struct LicenseBuilder {
    profile: Profile,
    /// Where a reader learns how to recover a forgotten passphrase.
    hint_link: String,
    /// Contains `{publication_id}`.
    publication_link: String,
    /// Contains `{license_id}`.
    status_link: String,
    signer: Arc<Signer>,
}

impl LicenseBuilder {
    pub fn new(
        profile: Profile,
        hint_link: String,
        publication_link: String,
        status_link: String,
        signer: Arc<Signer>,
    ) -> Self {
        Self {
            profile,
            hint_link,
            publication_link,
            status_link,
            signer,
        }
    }

    pub fn profile(&self) -> Profile {
        self.profile
    }

    /// Encrypt, link and sign a license. Persistence is up to the caller.
    pub fn build(&self, draft: &LicenseDraft, content: &ContentRecord) -> Result<License> {
        if self.hint_link.is_empty() {
            return Err(LicenseError::Internal("no hint link configured".into()));
        }
        let user_key = user_key(&draft.user_key)?;

        let content_key = keys::content_key_from_slice(&content.encryption_key)?;
        let encrypted_value = aes_cbc::encrypt(&user_key, &content_key)?;

        let mut license = License {
            provider: draft.provider.clone(),
            id: draft.id.clone(),
            issued: draft.issued,
            updated: draft.updated,
            encryption: Encryption {
                profile: self.profile.uri().to_string(),
                content_key: ContentKey {
                    algorithm: ALGORITHM_AES256_CBC.to_string(),
                    encrypted_value,
                },
                user_key: UserKey {
                    algorithm: USER_KEY_ALGORITHM_SHA256.to_string(),
                    text_hint: draft.user_key.text_hint.clone(),
                    key_check: keys::key_check(&user_key, &draft.id)?,
                },
            },
            links: self.links(&draft.id, content),
            user: encrypt_user(&draft.user, &user_key)?,
            rights: draft.rights.clone(),
            signature: None,
        };

        license.signature = Some(self.signer.sign(&license)?);
        debug!(license_id = %license.id, content_id = %content.id, "License built");
        Ok(license)
    }

    fn links(&self, license_id: &str, content: &ContentRecord) -> Vec<Link> {
        let hint = Link {
            rel: "hint".to_string(),
            href: self.hint_link.clone(),
            ..Default::default()
        };

        let mut publication = Link::new(
            "publication",
            self.publication_link.replace("{publication_id}", &content.id),
            CONTENT_TYPE_EPUB,
        );
        publication.title = (!content.location.is_empty()).then(|| content.location.clone());
        publication.length = Some(content.length);
        publication.hash = (!content.sha256.is_empty()).then(|| content.sha256.clone());

        let status = Link::new(
            "status",
            self.status_link.replace("{license_id}", license_id),
            CONTENT_TYPE_LSD_JSON,
        );

        vec![hint, publication, status]
    }
}

fn user_key(req: &UserKeyRequest) -> Result<[u8; 32]> {
    if req.value.is_empty() {
        return Err(LicenseError::Validation("the user passphrase hash is missing".into()));
    }
    if req.text_hint.is_empty() {
        return Err(LicenseError::Validation("the user passphrase hint is missing".into()));
    }
    match req.algorithm.as_deref() {
        None | Some("") | Some(USER_KEY_ALGORITHM_SHA256) => {}
        Some(other) => {
            return Err(LicenseError::Validation(format!(
                "unsupported user key algorithm {}",
                other
            )));
        }
    }
    Ok(keys::user_key_from_hex(&req.value)?)
}

/// Encrypt every field named in `encrypted`; absent fields are dropped from the list.
fn encrypt_user(user: &UserInfo, key: &[u8; 32]) -> Result<UserInfo> {
    let mut out = UserInfo {
        id: user.id.clone(),
        email: user.email.clone(),
        name: user.name.clone(),
        encrypted: Vec::new(),
    };

    for field in &user.encrypted {
        let slot = match field.as_str() {
            "email" => &mut out.email,
            "name" => &mut out.name,
            other => {
                return Err(LicenseError::Validation(format!(
                    "user field {} cannot be encrypted",
                    other
                )));
            }
        };
        if out.encrypted.contains(field) {
            continue;
        }
        if let Some(plain) = slot.take() {
            *slot = Some(keys::encrypt_field(key, &plain)?);
            out.encrypted.push(field.clone());
        }
    }
    Ok(out)
}
