use anyhow::Result;
use chrono::{DateTime, SubsecRound, Utc};
use lcp_types::status::LicenseStatus;
use rusqlite::{Connection, params};

use crate::events::insert_event;
use crate::models::{NewLicenseStatus, STATUS_COLUMNS, Transition, license_status_from_row};
use crate::{Database, OptionalExt};

impl Database {
    // -- License statuses --

    pub fn insert_status(&self, new: &NewLicenseStatus) -> Result<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO license_status
                    (status, license_updated, status_updated, device_count, potential_rights_end, license_ref, rights_end)
                 VALUES (?1, ?2, ?3, NULL, ?4, ?5, ?6)",
                params![
                    new.status.code(),
                    new.license_updated,
                    new.status_updated,
                    new.potential_rights_end,
                    new.license_ref,
                    new.current_end,
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn get_status_by_ref(&self, license_ref: &str) -> Result<Option<LicenseStatus>> {
        self.with_conn(|conn| query_status_by_ref(conn, license_ref))
    }

    /// Rows with at least `devices` registered devices, newest first.
    pub fn list_statuses_by_device_count(&self, devices: i64, limit: i64, offset: i64) -> Result<Vec<LicenseStatus>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM license_status WHERE device_count >= ?1 ORDER BY id DESC LIMIT ?2 OFFSET ?3",
                STATUS_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![devices, limit, offset], license_status_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Rows whose license or status changed at or after `since`, taken at
    /// whole-second precision; all rows when `None`.
    pub fn list_statuses_since(&self, since: Option<DateTime<Utc>>) -> Result<Vec<LicenseStatus>> {
        self.with_conn(|conn| {
            let rows = match since {
                Some(since) => {
                    // stored timestamps carry no fraction, so compare in that format
                    let since = since.trunc_subsecs(0);
                    let sql = format!(
                        "SELECT {} FROM license_status WHERE status_updated >= ?1 OR license_updated >= ?1 ORDER BY id",
                        STATUS_COLUMNS
                    );
                    let mut stmt = conn.prepare(&sql)?;
                    stmt.query_map([since], license_status_from_row)?
                        .collect::<std::result::Result<Vec<_>, _>>()?
                }
                None => {
                    let sql = format!("SELECT {} FROM license_status ORDER BY id", STATUS_COLUMNS);
                    let mut stmt = conn.prepare(&sql)?;
                    stmt.query_map([], license_status_from_row)?
                        .collect::<std::result::Result<Vec<_>, _>>()?
                }
            };
            Ok(rows)
        })
    }

    /// Delete status rows (and, by cascade, their events). Returns rows removed.
    pub fn delete_statuses(&self, license_refs: &[String]) -> Result<usize> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let mut removed = 0;
            {
                let mut stmt = tx.prepare("DELETE FROM license_status WHERE license_ref = ?1")?;
                for license_ref in license_refs {
                    removed += stmt.execute([license_ref])?;
                }
            }
            tx.commit()?;
            Ok(removed)
        })
    }

    /// Apply a transition in one transaction. Returns `false`, writing
    /// nothing, when the row's version moved since it was read.
    pub fn commit_transition(&self, t: &Transition) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let updated = tx.execute(
                "UPDATE license_status
                 SET status = ?1, license_updated = ?2, status_updated = ?3, rights_end = ?4, device_count = ?5,
                     version = version + 1
                 WHERE id = ?6 AND version = ?7",
                params![
                    t.status.code(),
                    t.license_updated,
                    t.status_updated,
                    t.current_end,
                    t.device_count,
                    t.status_id,
                    t.expected_version,
                ],
            )?;
            if updated == 0 {
                // dropped tx rolls back
                return Ok(false);
            }

            if let Some(event) = &t.event {
                insert_event(&tx, t.status_id, event)?;
            }

            tx.commit()?;
            Ok(true)
        })
    }
}

fn query_status_by_ref(conn: &Connection, license_ref: &str) -> Result<Option<LicenseStatus>> {
    let sql = format!("SELECT {} FROM license_status WHERE license_ref = ?1", STATUS_COLUMNS);
    let mut stmt = conn.prepare(&sql)?;
    stmt.query_row([license_ref], license_status_from_row).optional()
}
