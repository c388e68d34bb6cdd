use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

/// Which server owns the database file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schema {
    /// Status server: license_status + event.
    Status,
    /// Issuing server: content + license.
    License,
}

impl Schema {
    pub fn name(&self) -> &'static str {
        match self {
            Schema::Status => "Status",
            Schema::License => "License",
        }
    }
}

pub fn run(conn: &Connection, schema: Schema) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    match schema {
        Schema::Status => migrate_status(conn, version)?,
        Schema::License => migrate_license(conn, version)?,
    }

    info!("{} DB migrations complete", schema.name());
    Ok(())
}

fn migrate_status(conn: &Connection, version: i64) -> Result<()> {
    if version < 1 {
        info!("Status DB: running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE license_status (
                id                    INTEGER PRIMARY KEY AUTOINCREMENT,
                status                INTEGER NOT NULL,
                license_updated       TEXT NOT NULL,
                status_updated        TEXT NOT NULL,
                device_count          INTEGER,
                potential_rights_end  TEXT,
                license_ref           TEXT NOT NULL UNIQUE,
                rights_end            TEXT
            );

            CREATE INDEX idx_license_status_ref ON license_status(license_ref);

            CREATE TABLE event (
                id                 INTEGER PRIMARY KEY AUTOINCREMENT,
                device_name        TEXT NOT NULL,
                timestamp          TEXT NOT NULL,
                type               INTEGER NOT NULL,
                device_id          TEXT NOT NULL,
                license_status_fk  INTEGER NOT NULL REFERENCES license_status(id) ON DELETE CASCADE
            );

            CREATE INDEX idx_event_status ON event(license_status_fk, timestamp);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    if version < 2 {
        info!("Status DB: running migration v2 (optimistic version column)");
        conn.execute_batch(
            "
            ALTER TABLE license_status ADD COLUMN version INTEGER NOT NULL DEFAULT 0;

            INSERT INTO schema_version (version) VALUES (2);
            ",
        )?;
    }

    Ok(())
}

fn migrate_license(conn: &Connection, version: i64) -> Result<()> {
    if version < 1 {
        info!("License DB: running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE content (
                id              TEXT PRIMARY KEY,
                encryption_key  BLOB NOT NULL,
                location        TEXT NOT NULL,
                length          INTEGER NOT NULL,
                sha256          TEXT NOT NULL
            );

            CREATE TABLE license (
                id            TEXT PRIMARY KEY,
                user_id       TEXT NOT NULL,
                provider      TEXT NOT NULL,
                issued        TEXT NOT NULL,
                updated       TEXT,
                rights_print  INTEGER,
                rights_copy   INTEGER,
                rights_start  TEXT,
                rights_end    TEXT,
                content_fk    TEXT NOT NULL REFERENCES content(id),
                lsd_status    INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX idx_license_content ON license(content_fk);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    Ok(())
}
