//! Shared data model for the license and status servers.
//!
//! Everything that crosses a crate or process boundary lives here: the signed
//! license document, the license status document, the device event ledger
//! entries, the RPC payloads exchanged between the two servers and the HTTP
//! query/body shapes.

pub mod api;
pub mod license;
pub mod rpc;
pub mod status;

/// Content type of a license document.
pub const CONTENT_TYPE_LCP_JSON: &str = "application/vnd.readium.lcp.license.v1.0+json";

/// Content type of a license status document.
pub const CONTENT_TYPE_LSD_JSON: &str = "application/vnd.readium.license.status.v1.0+json";

/// Content type of an RFC 7807 problem document.
pub const CONTENT_TYPE_PROBLEM_JSON: &str = "application/problem+json";

/// Content type of an EPUB publication.
pub const CONTENT_TYPE_EPUB: &str = "application/epub+zip";

/// Serde adapter for binary fields carried as standard base64 strings.
pub mod b64 {
    use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&BASE64.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(d)?;
        BASE64.decode(encoded).map_err(serde::de::Error::custom)
    }
}
