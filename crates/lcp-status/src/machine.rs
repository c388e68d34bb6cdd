//! License status lifecycle rules.
//!
//! Pure functions over the current row and the device's ledger history; the
//! service decides when to call them and persists what they return.
//!
//! | current       | request  | result                         |
//! |---------------|----------|--------------------------------|
//! | ready         | register | active                         |
//! | active        | register | active (no-op if device known) |
//! | ready         | cancel   | cancelled                      |
//! | ready, active | revoke   | revoked                        |
//! | active        | return   | returned                       |
//! | ready         | return   | cancelled                      |
//! | active        | renew    | active, later end              |
//!
//! Anything else is refused. `expired` is only ever observed on read.

use chrono::{DateTime, Duration, SubsecRound, Utc};

use lcp_db::models::NewLicenseStatus;
use lcp_types::license::LicenseHeader;
use lcp_types::status::{EventType, LicenseStatus, Status};

use crate::{Result, StatusError};

/// Longest accepted device id or device name, in bytes.
pub const MAX_DEVICE_FIELD_LEN: usize = 255;

/// Actor recorded for server-initiated events.
pub const SYSTEM_DEVICE: &str = "system";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    pub id: String,
    pub name: String,
}

impl Device {
    pub fn system() -> Self {
        Self {
            id: SYSTEM_DEVICE.to_string(),
            name: SYSTEM_DEVICE.to_string(),
        }
    }
}

/// Current time at the storage precision.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(0)
}

/// Device identification for registration: both fields mandatory.
pub fn required_device(id: Option<&str>, name: Option<&str>) -> Result<Device> {
    let id = id.unwrap_or_default();
    let name = name.unwrap_or_default();
    if id.is_empty() || name.is_empty() || id.len() > MAX_DEVICE_FIELD_LEN || name.len() > MAX_DEVICE_FIELD_LEN {
        return Err(StatusError::Validation(format!(
            "device id and device name are mandatory and their maximum length is {} bytes",
            MAX_DEVICE_FIELD_LEN
        )));
    }
    Ok(Device {
        id: id.to_string(),
        name: name.to_string(),
    })
}

/// Device identification for return and renew: both fields optional.
pub fn optional_device(id: Option<&str>, name: Option<&str>) -> Result<Device> {
    let id = id.unwrap_or_default();
    let name = name.unwrap_or_default();
    if id.len() > MAX_DEVICE_FIELD_LEN || name.len() > MAX_DEVICE_FIELD_LEN {
        return Err(StatusError::Validation(format!(
            "device id and device name are limited to {} bytes",
            MAX_DEVICE_FIELD_LEN
        )));
    }
    Ok(Device {
        id: id.to_string(),
        name: name.to_string(),
    })
}

/// Initial status row of a newly issued license.
pub fn make_license_status(
    license: &LicenseHeader,
    register_enabled: bool,
    renting_days: u32,
    now: DateTime<Utc>,
) -> NewLicenseStatus {
    let end = license.rights.as_ref().and_then(|r| r.end).map(|e| e.trunc_subsecs(0));
    let issued = license.issued.trunc_subsecs(0);

    // Only loans get a renewal ceiling
    let potential_rights_end = end.map(|end| {
        if renting_days > 0 {
            let from_config = issued + Duration::days(i64::from(renting_days));
            end.max(from_config)
        } else {
            end
        }
    });

    NewLicenseStatus {
        license_ref: license.id.clone(),
        status: if register_enabled { Status::Ready } else { Status::Active },
        license_updated: license.updated.unwrap_or(issued).trunc_subsecs(0),
        status_updated: now,
        potential_rights_end,
        current_end: end,
    }
}

/// `Some(Expired)` when a usable loan's end has passed.
pub fn lapsed(ls: &LicenseStatus, now: DateTime<Utc>) -> Option<Status> {
    match ls.current_end {
        Some(end) if end < now && ls.status.is_usable() => Some(Status::Expired),
        _ => None,
    }
}

fn forbidden(status: Status, action: &str) -> StatusError {
    StatusError::Forbidden(format!("the current license status is {}; {} forbidden", status, action))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// Device already holds the license; nothing to write.
    AlreadyActive,
    Activate { device_count: i64 },
}

pub fn register(ls: &LicenseStatus, last_event: Option<EventType>) -> Result<Registration> {
    if !ls.status.is_usable() {
        return Err(forbidden(ls.status, "register"));
    }

    match last_event {
        Some(kind) if kind.keeps_device_active() => Ok(Registration::AlreadyActive),
        Some(EventType::Return) => Err(StatusError::Forbidden(
            "this device has already returned the license".into(),
        )),
        _ => Ok(Registration::Activate {
            device_count: ls.device_count.unwrap_or(0) + 1,
        }),
    }
}

pub fn returned_status(current: Status) -> Result<Status> {
    match current {
        Status::Active => Ok(Status::Returned),
        // an unused loan is cancelled rather than returned
        Status::Ready => Ok(Status::Cancelled),
        other => Err(forbidden(other, "return")),
    }
}

pub fn cancelled_status(current: Status) -> Result<Status> {
    match current {
        Status::Ready => Ok(Status::Cancelled),
        other => Err(forbidden(other, "cancel")),
    }
}

pub fn revoked_status(current: Status) -> Result<Status> {
    match current {
        Status::Ready | Status::Active => Ok(Status::Revoked),
        other => Err(forbidden(other, "revoke")),
    }
}

/// Strict RFC 3339 parse of a caller supplied end date.
pub fn parse_end(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc).trunc_subsecs(0))
        .map_err(|e| StatusError::InvalidDate(format!("{:?}: {}", raw, e)))
}

/// New end of a renewed loan.
///
/// Without an explicit end the loan is extended by `renew_days`. The result
/// must lie between the current end (and now) and the potential rights end;
/// out of range requests are refused, never clamped.
pub fn renewal_end(
    ls: &LicenseStatus,
    requested: Option<DateTime<Utc>>,
    renew_days: u32,
    now: DateTime<Utc>,
) -> Result<DateTime<Utc>> {
    if ls.status != Status::Active {
        return Err(forbidden(ls.status, "renew"));
    }
    let Some(current_end) = ls.current_end else {
        return Err(StatusError::Forbidden("this license is not a loan; renew forbidden".into()));
    };
    let Some(ceiling) = ls.potential_rights_end else {
        return Err(StatusError::Forbidden(
            "this license has no upper date for the loan; renew forbidden".into(),
        ));
    };

    let suggested = match requested {
        Some(end) => end,
        None if renew_days == 0 => {
            return Err(StatusError::Internal(
                "no explicit end value and renew_days is not configured".into(),
            ));
        }
        None => current_end + Duration::days(i64::from(renew_days)),
    };

    if suggested > ceiling {
        return Err(StatusError::Forbidden(
            "attempt to renew with a date greater than potential rights end".into(),
        ));
    }
    if suggested < current_end {
        return Err(StatusError::Forbidden(
            "attempt to renew with a date before the current end".into(),
        ));
    }
    if suggested < now {
        return Err(StatusError::Forbidden("attempt to renew with a date before now".into()));
    }
    Ok(suggested)
}
