use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Commands understood by the server-to-server notification endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// Status server -> issuing server: new rights end for a license.
    UpdateLicense,
    /// Status rows updated since a given time.
    Licenses,
    /// One status row.
    LicenseStatus,
    /// Purge the status rows of deleted licenses.
    LicensesDeleted,
    /// Issuing server -> status server: a license was just issued.
    UpdateLicenseStatus,
    Renew,
    Cancel,
    Revoke,
}

impl Command {
    pub const ALL: [Command; 8] = [
        Command::UpdateLicense,
        Command::Licenses,
        Command::LicenseStatus,
        Command::LicensesDeleted,
        Command::UpdateLicenseStatus,
        Command::Renew,
        Command::Cancel,
        Command::Revoke,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Command::UpdateLicense => "UPDATELICENSE",
            Command::Licenses => "LICENSES",
            Command::LicenseStatus => "LICENSESTATUS",
            Command::LicensesDeleted => "LICENSESDELETED",
            Command::UpdateLicenseStatus => "UPDATELICENSESTATUS",
            Command::Renew => "RENEW",
            Command::Cancel => "CANCEL",
            Command::Revoke => "REVOKE",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Command::ALL.into_iter().find(|c| c.as_str() == s)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request body: shared credentials wrapped around a command payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub user: String,
    pub password: String,
    pub payload: T,
}

/// The only error shape a notification endpoint ever replies with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyError {
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    #[serde(default)]
    pub affected: usize,
}

// -- Payloads --

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicenseIdPayload {
    pub license_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicenseIdsPayload {
    pub license_ids: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SincePayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenewPayload {
    pub license_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<DateTime<Utc>>,
}

/// New rights end pushed to the issuing server after a lifecycle change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RightsUpdate {
    pub license_id: String,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicenseSummary {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_names_roundtrip() {
        for cmd in Command::ALL {
            assert_eq!(Command::from_str(cmd.as_str()), Some(cmd));
        }
        assert_eq!(Command::from_str("updatelicense"), None);
        assert_eq!(Command::from_str("GETLICENSES"), None);
    }

    #[test]
    fn envelope_layout() {
        let env = Envelope {
            user: "lsd".to_string(),
            password: "secret".to_string(),
            payload: LicenseIdPayload { license_id: "L1".into() },
        };
        let json = serde_json::to_value(&env).unwrap();
        assert_eq!(json["payload"]["license_id"], "L1");
        assert_eq!(json["user"], "lsd");
    }
}
