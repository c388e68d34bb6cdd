use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

// -- Links --

/// Link carried by both license and status documents.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Link {
    pub rel: String,
    pub href: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub templated: bool,
}

impl Link {
    pub fn new(rel: &str, href: impl Into<String>, media_type: &str) -> Self {
        Self {
            rel: rel.to_string(),
            href: href.into(),
            media_type: Some(media_type.to_string()),
            ..Default::default()
        }
    }

    pub fn templated(mut self) -> Self {
        self.templated = true;
        self
    }
}

// -- User and rights --

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UserInfo {
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Names of the fields above which are delivered encrypted.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub encrypted: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Rights {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub print: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub copy: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<DateTime<Utc>>,
}

impl Rights {
    /// Overlay every field set in `other` onto these rights.
    pub fn merge(&mut self, other: &Rights) {
        if other.print.is_some() {
            self.print = other.print;
        }
        if other.copy.is_some() {
            self.copy = other.copy;
        }
        if other.start.is_some() {
            self.start = other.start;
        }
        if other.end.is_some() {
            self.end = other.end;
        }
    }

    /// Drop fractional seconds from `start` and `end`.
    pub fn truncated(mut self) -> Self {
        self.start = self.start.map(|t| t.trunc_subsecs(0));
        self.end = self.end.map(|t| t.trunc_subsecs(0));
        self
    }
}

// -- Encryption block --

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentKey {
    pub algorithm: String,
    #[serde(with = "crate::b64")]
    pub encrypted_value: Vec<u8>,
}

/// Public half of the user key: the passphrase hash itself has no field here
/// and therefore can never be serialized into a delivered license.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserKey {
    pub algorithm: String,
    pub text_hint: String,
    #[serde(with = "crate::b64")]
    pub key_check: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Encryption {
    pub profile: String,
    pub content_key: ContentKey,
    pub user_key: UserKey,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    #[serde(with = "crate::b64")]
    pub certificate: Vec<u8>,
    #[serde(with = "crate::b64")]
    pub value: Vec<u8>,
    pub algorithm: String,
}

// -- License --

/// A complete license as delivered to a reading app.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct License {
    pub provider: String,
    pub id: String,
    pub issued: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<DateTime<Utc>>,
    pub encryption: Encryption,
    #[serde(default)]
    pub links: Vec<Link>,
    pub user: UserInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rights: Option<Rights>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<Signature>,
}

/// The part of a license the status server needs to create a status row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicenseHeader {
    pub id: String,
    pub issued: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rights: Option<Rights>,
}

impl From<&License> for LicenseHeader {
    fn from(l: &License) -> Self {
        Self {
            id: l.id.clone(),
            issued: l.issued,
            updated: l.updated,
            rights: l.rights.clone(),
        }
    }
}

/// User key input supplied by the provider when a license is requested.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserKeyRequest {
    #[serde(default)]
    pub text_hint: String,
    /// Hex encoded hash of the user passphrase.
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub algorithm: Option<String>,
}

/// Partial license posted by a provider: what it knows before encryption.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LicenseRequest {
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub user: UserInfo,
    #[serde(default)]
    pub encryption: EncryptionRequest,
    #[serde(default)]
    pub rights: Option<Rights>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EncryptionRequest {
    #[serde(default)]
    pub user_key: UserKeyRequest,
}

/// An initialized license awaiting encryption and signature.
///
/// Holds the passphrase hash, so it is deliberately not `Serialize`.
#[derive(Debug, Clone)]
pub struct LicenseDraft {
    pub id: String,
    pub provider: String,
    pub issued: DateTime<Utc>,
    pub updated: Option<DateTime<Utc>>,
    pub user: UserInfo,
    pub rights: Option<Rights>,
    pub user_key: UserKeyRequest,
}

/// Stored encryption metadata of one protected publication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentRecord {
    pub id: String,
    pub encryption_key: Vec<u8>,
    pub location: String,
    pub length: i64,
    pub sha256: String,
}

/// License metadata as kept by the issuing server: no keys, no signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredLicense {
    pub id: String,
    pub provider: String,
    pub user_id: String,
    pub issued: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<DateTime<Utc>>,
    pub rights: Rights,
    pub content_id: String,
    /// Outcome of the last push to the status server, 0 if never acknowledged.
    pub lsd_status: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContentRequest {
    #[serde(with = "crate::b64")]
    pub encryption_key: Vec<u8>,
    pub location: String,
    pub length: i64,
    pub sha256: String,
}
