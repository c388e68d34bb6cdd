//! Write-side row types and the mapping from SQLite rows to domain values.
//!
//! Reads return `lcp_types` values directly; these structs only describe what
//! goes in.

use chrono::{DateTime, Utc};
use lcp_types::license::Rights;
use lcp_types::status::{EventType, LicenseStatus, Status, TransactionEvent};
use rusqlite::Row;
use rusqlite::types::Type;

pub struct NewLicenseStatus {
    pub license_ref: String,
    pub status: Status,
    pub license_updated: DateTime<Utc>,
    pub status_updated: DateTime<Utc>,
    pub potential_rights_end: Option<DateTime<Utc>>,
    pub current_end: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEvent {
    pub device_id: String,
    pub device_name: String,
    pub timestamp: DateTime<Utc>,
    pub kind: EventType,
}

/// One atomic status change: optional ledger entry plus the new row values.
///
/// Applied only if the row still carries `expected_version`.
#[derive(Debug, Clone)]
pub struct Transition {
    pub status_id: i64,
    pub expected_version: i64,
    pub status: Status,
    pub license_updated: DateTime<Utc>,
    pub status_updated: DateTime<Utc>,
    pub current_end: Option<DateTime<Utc>>,
    pub device_count: Option<i64>,
    pub event: Option<NewEvent>,
}

/// License as stored by the issuing server: no keys, no signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LicenseRow {
    pub id: String,
    pub user_id: String,
    pub provider: String,
    pub issued: DateTime<Utc>,
    pub updated: Option<DateTime<Utc>>,
    pub rights: Rights,
    pub content_id: String,
    pub lsd_status: i64,
}

pub(crate) const STATUS_COLUMNS: &str = "id, license_ref, status, license_updated, status_updated, device_count, potential_rights_end, rights_end, version";

pub(crate) fn license_status_from_row(row: &Row<'_>) -> rusqlite::Result<LicenseStatus> {
    let code: i64 = row.get(2)?;
    let status = Status::from_code(code).ok_or_else(|| bad_code(2, "status", code))?;

    Ok(LicenseStatus {
        id: row.get(0)?,
        license_ref: row.get(1)?,
        status,
        license_updated: row.get(3)?,
        status_updated: row.get(4)?,
        device_count: row.get(5)?,
        potential_rights_end: row.get(6)?,
        current_end: row.get(7)?,
        version: row.get(8)?,
    })
}

pub(crate) const EVENT_COLUMNS: &str = "id, license_status_fk, device_id, device_name, timestamp, type";

pub(crate) fn event_from_row(row: &Row<'_>) -> rusqlite::Result<TransactionEvent> {
    let code: i64 = row.get(5)?;
    let kind = EventType::from_code(code).ok_or_else(|| bad_code(5, "event type", code))?;

    Ok(TransactionEvent {
        id: row.get(0)?,
        license_status_fk: row.get(1)?,
        device_id: row.get(2)?,
        device_name: row.get(3)?,
        timestamp: row.get(4)?,
        kind,
    })
}

fn bad_code(idx: usize, what: &str, code: i64) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Integer, format!("unknown {} code {}", what, code).into())
}
