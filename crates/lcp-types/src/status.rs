use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::license::Link;

// -- Status --

/// Lifecycle state of a license, as seen by the status server.
///
/// The discriminant is the value persisted in `license_status.status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Ready = 0,
    Active = 1,
    Revoked = 2,
    Returned = 3,
    Cancelled = 4,
    Expired = 5,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Ready => "ready",
            Status::Active => "active",
            Status::Revoked => "revoked",
            Status::Returned => "returned",
            Status::Cancelled => "cancelled",
            Status::Expired => "expired",
        }
    }

    pub fn code(self) -> i64 {
        self as i64
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Status::Ready),
            1 => Some(Status::Active),
            2 => Some(Status::Revoked),
            3 => Some(Status::Returned),
            4 => Some(Status::Cancelled),
            5 => Some(Status::Expired),
            _ => None,
        }
    }

    /// Rights can only be exercised by a reading app in these states.
    pub fn is_usable(self) -> bool {
        matches!(self, Status::Ready | Status::Active)
    }

    /// Human readable message returned in the status document.
    pub fn message(self) -> &'static str {
        match self {
            Status::Ready => "The license is ready to be used.",
            Status::Active => "The license is active.",
            Status::Revoked => "The license has been revoked by its provider.",
            Status::Returned => "The license has been returned.",
            Status::Cancelled => "The license has been cancelled.",
            Status::Expired => "The license has expired.",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ready" => Ok(Status::Ready),
            "active" => Ok(Status::Active),
            "revoked" => Ok(Status::Revoked),
            "returned" => Ok(Status::Returned),
            "cancelled" => Ok(Status::Cancelled),
            "expired" => Ok(Status::Expired),
            other => Err(format!("unknown license status: {}", other)),
        }
    }
}

// -- Events --

/// Kind of a device interaction recorded in the event ledger.
///
/// Stored codes reuse the status codes of the state each event leads to;
/// renewals, which have no state of their own, use 6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Register = 1,
    Revoke = 2,
    Return = 3,
    Cancel = 4,
    Renew = 6,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Register => "register",
            EventType::Revoke => "revoke",
            EventType::Return => "return",
            EventType::Cancel => "cancel",
            EventType::Renew => "renew",
        }
    }

    pub fn code(self) -> i64 {
        self as i64
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(EventType::Register),
            2 => Some(EventType::Revoke),
            3 => Some(EventType::Return),
            4 => Some(EventType::Cancel),
            6 => Some(EventType::Renew),
            _ => None,
        }
    }

    /// A device whose last event is one of these currently holds the license.
    pub fn keeps_device_active(self) -> bool {
        matches!(self, EventType::Register | EventType::Renew)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One immutable entry of the device event ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionEvent {
    pub id: i64,
    pub license_status_fk: i64,
    pub device_id: String,
    pub device_name: String,
    pub timestamp: DateTime<Utc>,
    pub kind: EventType,
}

/// Event as it appears in a status document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub kind: EventType,
    pub name: String,
    pub id: String,
    pub timestamp: DateTime<Utc>,
}

impl From<&TransactionEvent> for Event {
    fn from(e: &TransactionEvent) -> Self {
        Self {
            kind: e.kind,
            name: e.device_name.clone(),
            id: e.device_id.clone(),
            timestamp: e.timestamp,
        }
    }
}

/// A device which registered a license, as listed to administrators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredDevice {
    pub id: String,
    pub name: String,
    pub timestamp: DateTime<Utc>,
}

// -- License status --

/// Revocable state of exactly one license, owned by the status server.
///
/// `device_count` and `version` are internal bookkeeping and never leave the
/// server: neither the status document nor the RPC record carries them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LicenseStatus {
    pub id: i64,
    pub license_ref: String,
    pub status: Status,
    pub license_updated: DateTime<Utc>,
    pub status_updated: DateTime<Utc>,
    pub device_count: Option<i64>,
    pub potential_rights_end: Option<DateTime<Utc>>,
    pub current_end: Option<DateTime<Utc>>,
    pub version: i64,
}

impl LicenseStatus {
    /// A license with an enforced end date is a loan.
    pub fn is_loan(&self) -> bool {
        self.current_end.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Updated {
    pub license: DateTime<Utc>,
    pub status: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PotentialRights {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<DateTime<Utc>>,
}

/// License Status Document served to reading apps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusDocument {
    pub id: String,
    pub status: Status,
    pub message: String,
    pub updated: Updated,
    pub links: Vec<Link>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub potential_rights: Option<PotentialRights>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<Event>,
}

/// Status row as exchanged between servers and listed to administrators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusRecord {
    pub license_id: String,
    pub status: Status,
    pub license_updated: DateTime<Utc>,
    pub status_updated: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub potential_rights_end: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_end: Option<DateTime<Utc>>,
}

impl From<&LicenseStatus> for StatusRecord {
    fn from(ls: &LicenseStatus) -> Self {
        Self {
            license_id: ls.license_ref.clone(),
            status: ls.status,
            license_updated: ls.license_updated,
            status_updated: ls.status_updated,
            potential_rights_end: ls.potential_rights_end,
            current_end: ls.current_end,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_are_stable() {
        let all = [
            Status::Ready,
            Status::Active,
            Status::Revoked,
            Status::Returned,
            Status::Cancelled,
            Status::Expired,
        ];
        for (code, status) in all.iter().enumerate() {
            assert_eq!(status.code(), code as i64);
            assert_eq!(Status::from_code(code as i64), Some(*status));
            assert_eq!(status.as_str().parse::<Status>().unwrap(), *status);
        }
        assert_eq!(Status::from_code(6), None);
    }

    #[test]
    fn renew_event_has_its_own_code() {
        assert_eq!(EventType::Renew.code(), 6);
        assert_eq!(EventType::from_code(5), None);
        assert!(EventType::Renew.keeps_device_active());
        assert!(!EventType::Return.keeps_device_active());
    }

    #[test]
    fn status_document_serializes_lsd_shape() {
        let ts = "2024-01-10T00:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let doc = StatusDocument {
            id: "L1".into(),
            status: Status::Active,
            message: Status::Active.message().into(),
            updated: Updated { license: ts, status: ts },
            links: vec![],
            potential_rights: Some(PotentialRights { end: Some(ts) }),
            events: vec![Event {
                kind: EventType::Register,
                name: "N1".into(),
                id: "D1".into(),
                timestamp: ts,
            }],
        };

        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["status"], "active");
        assert_eq!(json["updated"]["license"], "2024-01-10T00:00:00Z");
        assert_eq!(json["events"][0]["type"], "register");
        assert!(json.get("device_count").is_none());
    }
}
