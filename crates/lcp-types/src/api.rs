use serde::{Deserialize, Serialize};

use crate::status::Status;

/// Base of the problem type URIs returned by the status server.
pub const ERROR_BASE_URL: &str = "http://readium.org/license-status-document/error/";

// -- Problem documents --

/// Error categories with a dedicated problem type URI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProblemKind {
    Server,
    Registration,
    Return,
    Renew,
    RenewDate,
    Cancel,
    Filter,
}

impl ProblemKind {
    pub fn type_uri(self) -> String {
        let suffix = match self {
            ProblemKind::Server => "server",
            ProblemKind::Registration => "registration",
            ProblemKind::Return => "return",
            ProblemKind::Renew => "renew",
            ProblemKind::RenewDate => "renew/date",
            ProblemKind::Cancel => "cancel",
            ProblemKind::Filter => "filter",
        };
        format!("{}{}", ERROR_BASE_URL, suffix)
    }
}

/// RFC 7807 problem document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Problem {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    pub title: String,
    pub status: u16,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub detail: String,
}

// -- Status server queries --

/// `?id=&name=` device identification on register / return.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeviceParams {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

/// `?end=&id=&name=` on renew. `end` is parsed later so that a malformed
/// date yields a problem document rather than a bare rejection.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RenewParams {
    #[serde(default)]
    pub end: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FilterParams {
    #[serde(default)]
    pub devices: Option<String>,
    #[serde(default)]
    pub page: Option<String>,
    #[serde(default)]
    pub per_page: Option<String>,
}

/// Paging of the issuing server's license listings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageParams {
    #[serde(default)]
    pub page: Option<String>,
    #[serde(default)]
    pub per_page: Option<String>,
}

/// Body of `PATCH /licenses/{key}/status`.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusChange {
    pub status: Status,
    #[serde(default)]
    pub message: Option<String>,
}

/// `POST /compliancetest` query.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ComplianceParams {
    #[serde(default)]
    pub test_stage: Option<String>,
    #[serde(default)]
    pub test_number: Option<String>,
    #[serde(default)]
    pub test_result: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn problem_type_uris() {
        assert_eq!(
            ProblemKind::RenewDate.type_uri(),
            "http://readium.org/license-status-document/error/renew/date"
        );
        assert_eq!(
            ProblemKind::Server.type_uri(),
            "http://readium.org/license-status-document/error/server"
        );
    }

    #[test]
    fn status_change_rejects_unknown_status() {
        let ok: StatusChange = serde_json::from_str(r#"{"status":"revoked","message":"fraud"}"#).unwrap();
        assert_eq!(ok.status, Status::Revoked);
        assert!(serde_json::from_str::<StatusChange>(r#"{"status":"gone"}"#).is_err());
    }
}
