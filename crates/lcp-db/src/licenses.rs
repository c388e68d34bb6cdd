use anyhow::Result;
use chrono::{DateTime, Utc};
use lcp_types::license::{ContentRecord, Rights};
use rusqlite::{Connection, Row, params};

use crate::models::LicenseRow;
use crate::{Database, OptionalExt};

const LICENSE_COLUMNS: &str =
    "id, user_id, provider, issued, updated, rights_print, rights_copy, rights_start, rights_end, content_fk, lsd_status";

impl Database {
    // -- Contents --

    /// Insert or replace a content record. Returns `true` when it is new.
    pub fn upsert_content(&self, content: &ContentRecord) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let exists: bool = tx.query_row("SELECT EXISTS(SELECT 1 FROM content WHERE id = ?1)", [&content.id], |r| {
                r.get(0)
            })?;

            tx.execute(
                "INSERT INTO content (id, encryption_key, location, length, sha256) VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(id) DO UPDATE SET
                    encryption_key = excluded.encryption_key,
                    location = excluded.location,
                    length = excluded.length,
                    sha256 = excluded.sha256",
                params![content.id, content.encryption_key, content.location, content.length, content.sha256],
            )?;
            tx.commit()?;
            Ok(!exists)
        })
    }

    pub fn get_content(&self, id: &str) -> Result<Option<ContentRecord>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, encryption_key, location, length, sha256 FROM content WHERE id = ?1",
                [id],
                |row| {
                    Ok(ContentRecord {
                        id: row.get(0)?,
                        encryption_key: row.get(1)?,
                        location: row.get(2)?,
                        length: row.get(3)?,
                        sha256: row.get(4)?,
                    })
                },
            )
            .optional()
        })
    }

    // -- Licenses --

    pub fn insert_license(&self, license: &LicenseRow) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO license
                    (id, user_id, provider, issued, updated, rights_print, rights_copy, rights_start, rights_end, content_fk, lsd_status)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    license.id,
                    license.user_id,
                    license.provider,
                    license.issued,
                    license.updated,
                    license.rights.print,
                    license.rights.copy,
                    license.rights.start,
                    license.rights.end,
                    license.content_id,
                    license.lsd_status,
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_license(&self, id: &str) -> Result<Option<LicenseRow>> {
        self.with_conn(|conn| query_license(conn, id))
    }

    /// Overwrite the stored rights. Returns `false` if the license is unknown.
    pub fn update_license_rights(&self, id: &str, rights: &Rights, updated: DateTime<Utc>) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE license
                 SET rights_print = ?1, rights_copy = ?2, rights_start = ?3, rights_end = ?4, updated = ?5
                 WHERE id = ?6",
                params![rights.print, rights.copy, rights.start, rights.end, updated, id],
            )?;
            Ok(n > 0)
        })
    }

    pub fn set_license_end(&self, id: &str, end: DateTime<Utc>, updated: DateTime<Utc>) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE license SET rights_end = ?1, updated = ?2 WHERE id = ?3",
                params![end, updated, id],
            )?;
            Ok(n > 0)
        })
    }

    /// One page of licenses, newest first; restricted to one content when given.
    pub fn list_licenses(&self, content_id: Option<&str>, limit: i64, offset: i64) -> Result<Vec<LicenseRow>> {
        self.with_conn(|conn| {
            let rows = match content_id {
                Some(content_id) => {
                    let sql = format!(
                        "SELECT {} FROM license WHERE content_fk = ?1 ORDER BY issued DESC, id LIMIT ?2 OFFSET ?3",
                        LICENSE_COLUMNS
                    );
                    let mut stmt = conn.prepare(&sql)?;
                    stmt.query_map(params![content_id, limit, offset], license_from_row)?
                        .collect::<std::result::Result<Vec<_>, _>>()?
                }
                None => {
                    let sql = format!(
                        "SELECT {} FROM license ORDER BY issued DESC, id LIMIT ?1 OFFSET ?2",
                        LICENSE_COLUMNS
                    );
                    let mut stmt = conn.prepare(&sql)?;
                    stmt.query_map(params![limit, offset], license_from_row)?
                        .collect::<std::result::Result<Vec<_>, _>>()?
                }
            };
            Ok(rows)
        })
    }

    /// Record the HTTP-like code of the last push to the status server.
    pub fn set_lsd_status(&self, id: &str, code: i64) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("UPDATE license SET lsd_status = ?1 WHERE id = ?2", params![code, id])?;
            Ok(())
        })
    }
}

fn query_license(conn: &Connection, id: &str) -> Result<Option<LicenseRow>> {
    let sql = format!("SELECT {} FROM license WHERE id = ?1", LICENSE_COLUMNS);
    let mut stmt = conn.prepare(&sql)?;
    stmt.query_row([id], license_from_row).optional()
}

fn license_from_row(row: &Row<'_>) -> rusqlite::Result<LicenseRow> {
    Ok(LicenseRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        provider: row.get(2)?,
        issued: row.get(3)?,
        updated: row.get(4)?,
        rights: Rights {
            print: row.get(5)?,
            copy: row.get(6)?,
            start: row.get(7)?,
            end: row.get(8)?,
        },
        content_id: row.get(9)?,
        lsd_status: row.get(10)?,
    })
}
