use serde::Serialize;
use serde_json::Value;

use crate::Result;

/// Canonical JSON of a document, as signed and verified.
///
/// Keys are sorted (serde_json maps are ordered), output is compact, nothing
/// is HTML-escaped and there is no trailing newline. A top level `signature`
/// member is dropped so that a signed document canonicalizes to the bytes
/// that were signed.
pub fn canonical<T: Serialize>(doc: &T) -> Result<Vec<u8>> {
    let mut value = serde_json::to_value(doc)?;
    if let Value::Object(map) = &mut value {
        map.remove("signature");
    }
    Ok(serde_json::to_vec(&value)?)
}
