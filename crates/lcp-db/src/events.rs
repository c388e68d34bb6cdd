use anyhow::Result;
use lcp_types::status::{EventType, RegisteredDevice, TransactionEvent};
use rusqlite::{Connection, params};

use crate::models::{EVENT_COLUMNS, NewEvent, event_from_row};
use crate::{Database, OptionalExt};

impl Database {
    // -- Event ledger --

    /// Append one event outside of any status change.
    #[cfg(test)]
    pub fn add_event(&self, status_id: i64, event: &NewEvent) -> Result<i64> {
        self.with_conn(|conn| insert_event(conn, status_id, event))
    }

    /// Every event of a license, oldest first.
    pub fn list_events(&self, status_id: i64) -> Result<Vec<TransactionEvent>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM event WHERE license_status_fk = ?1 ORDER BY timestamp, id",
                EVENT_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([status_id], event_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Type of the most recent event of one device on one license.
    pub fn last_device_event(&self, status_id: i64, device_id: &str) -> Result<Option<EventType>> {
        self.with_conn(|conn| {
            let code: Option<i64> = conn
                .query_row(
                    "SELECT type FROM event
                     WHERE license_status_fk = ?1 AND device_id = ?2
                     ORDER BY timestamp DESC, id DESC
                     LIMIT 1",
                    params![status_id, device_id],
                    |row| row.get(0),
                )
                .optional()?;

            match code {
                None => Ok(None),
                Some(code) => EventType::from_code(code)
                    .map(Some)
                    .ok_or_else(|| anyhow::anyhow!("unknown event type code {}", code)),
            }
        })
    }

    pub fn list_registered_devices(&self, status_id: i64) -> Result<Vec<RegisteredDevice>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT device_id, device_name, timestamp FROM event
                 WHERE license_status_fk = ?1 AND type = ?2
                 ORDER BY timestamp, id",
            )?;
            let rows = stmt
                .query_map(params![status_id, EventType::Register.code()], |row| {
                    Ok(RegisteredDevice {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        timestamp: row.get(2)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

/// Shared by the ledger and by status transitions.
pub(crate) fn insert_event(conn: &Connection, status_id: i64, event: &NewEvent) -> Result<i64> {
    conn.execute(
        "INSERT INTO event (device_name, timestamp, type, device_id, license_status_fk)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            event.device_name,
            event.timestamp,
            event.kind.code(),
            event.device_id,
            status_id,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Schema;
    use crate::models::NewLicenseStatus;
    use chrono::{DateTime, Utc};
    use lcp_types::status::Status;

    fn ts(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    fn event(device: &str, at: &str, kind: EventType) -> NewEvent {
        NewEvent {
            device_id: device.to_string(),
            device_name: format!("{} name", device),
            timestamp: ts(at),
            kind,
        }
    }

    fn setup() -> (Database, i64) {
        let db = Database::open_in_memory(Schema::Status).unwrap();
        let id = db
            .insert_status(&NewLicenseStatus {
                license_ref: "L1".into(),
                status: Status::Active,
                license_updated: ts("2024-01-01T00:00:00Z"),
                status_updated: ts("2024-01-01T00:00:00Z"),
                potential_rights_end: None,
                current_end: None,
            })
            .unwrap();
        (db, id)
    }

    #[test]
    fn last_event_wins_by_timestamp_then_id() {
        let (db, id) = setup();
        db.add_event(id, &event("D1", "2024-01-02T00:00:00Z", EventType::Register)).unwrap();
        db.add_event(id, &event("D1", "2024-01-03T00:00:00Z", EventType::Return)).unwrap();
        assert_eq!(db.last_device_event(id, "D1").unwrap(), Some(EventType::Return));

        // same second: insertion order breaks the tie
        db.add_event(id, &event("D1", "2024-01-03T00:00:00Z", EventType::Renew)).unwrap();
        assert_eq!(db.last_device_event(id, "D1").unwrap(), Some(EventType::Renew));

        assert_eq!(db.last_device_event(id, "D2").unwrap(), None);
    }

    #[test]
    fn events_listed_in_order() {
        let (db, id) = setup();
        db.add_event(id, &event("D2", "2024-01-05T00:00:00Z", EventType::Register)).unwrap();
        db.add_event(id, &event("D1", "2024-01-02T00:00:00Z", EventType::Register)).unwrap();

        let events = db.list_events(id).unwrap();
        assert_eq!(events[0].device_id, "D1");
        assert_eq!(events[1].device_id, "D2");
        assert_eq!(events[1].license_status_fk, id);
    }

    #[test]
    fn registered_devices_only_lists_registrations() {
        let (db, id) = setup();
        db.add_event(id, &event("D1", "2024-01-02T00:00:00Z", EventType::Register)).unwrap();
        db.add_event(id, &event("D1", "2024-01-03T00:00:00Z", EventType::Renew)).unwrap();
        db.add_event(id, &event("D2", "2024-01-04T00:00:00Z", EventType::Register)).unwrap();

        let devices = db.list_registered_devices(id).unwrap();
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].name, "D1 name");
        assert_eq!(devices[1].timestamp, ts("2024-01-04T00:00:00Z"));
    }

    #[test]
    fn events_require_an_existing_status() {
        let db = Database::open_in_memory(Schema::Status).unwrap();
        assert!(db.add_event(42, &event("D1", "2024-01-02T00:00:00Z", EventType::Register)).is_err());
    }
}
