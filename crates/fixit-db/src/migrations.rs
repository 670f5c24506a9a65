use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id                  TEXT PRIMARY KEY,
                username            TEXT NOT NULL UNIQUE,
                password            TEXT NOT NULL,
                first_name          TEXT NOT NULL DEFAULT '',
                last_name           TEXT NOT NULL DEFAULT '',
                email               TEXT NOT NULL DEFAULT '',
                barangay            TEXT NOT NULL DEFAULT '',
                municipality        TEXT NOT NULL DEFAULT '',
                role                TEXT NOT NULL DEFAULT 'member',
                rep_points          INTEGER NOT NULL DEFAULT 0,
                rep_level           TEXT NOT NULL DEFAULT 'Newcomer',
                verified_reports    INTEGER NOT NULL DEFAULT 0,
                resolved_reports    INTEGER NOT NULL DEFAULT 0,
                last_login          TEXT,
                created_at          TEXT NOT NULL
            );

            -- Suspended accounts: full user snapshot plus suspension metadata.
            CREATE TABLE suspended_users (
                id                  TEXT PRIMARY KEY,
                original_user_id    TEXT NOT NULL UNIQUE,
                username            TEXT NOT NULL,
                password            TEXT NOT NULL,
                first_name          TEXT NOT NULL DEFAULT '',
                last_name           TEXT NOT NULL DEFAULT '',
                email               TEXT NOT NULL DEFAULT '',
                barangay            TEXT NOT NULL DEFAULT '',
                municipality        TEXT NOT NULL DEFAULT '',
                role                TEXT NOT NULL DEFAULT 'member',
                rep_points          INTEGER NOT NULL DEFAULT 0,
                rep_level           TEXT NOT NULL DEFAULT 'Newcomer',
                verified_reports    INTEGER NOT NULL DEFAULT 0,
                resolved_reports    INTEGER NOT NULL DEFAULT 0,
                last_login          TEXT,
                created_at          TEXT NOT NULL,
                reason              TEXT NOT NULL,
                suspended_at        TEXT NOT NULL,
                suspended_by        TEXT NOT NULL
            );

            CREATE INDEX idx_suspended_username ON suspended_users(username);

            -- Comments and flags live inside the report row (JSON arrays).
            CREATE TABLE reports (
                id              TEXT PRIMARY KEY,
                owner_id        TEXT NOT NULL,
                title           TEXT NOT NULL,
                description     TEXT NOT NULL,
                category        TEXT NOT NULL,
                location        TEXT NOT NULL,
                latitude        REAL,
                longitude       REAL,
                geo_tagged      INTEGER NOT NULL DEFAULT 0,
                is_urgent       INTEGER NOT NULL DEFAULT 0,
                media           TEXT NOT NULL DEFAULT '[]',
                comments        TEXT NOT NULL DEFAULT '[]',
                flags           TEXT NOT NULL DEFAULT '[]',
                status          TEXT NOT NULL,
                verified_by     TEXT,
                verified_at     TEXT,
                created_at      TEXT NOT NULL,
                updated_at      TEXT NOT NULL
            );

            CREATE INDEX idx_reports_status ON reports(status, created_at);
            CREATE INDEX idx_reports_owner ON reports(owner_id);

            CREATE TABLE resolved_reports (
                id                      TEXT PRIMARY KEY,
                original_report_id      TEXT NOT NULL UNIQUE,
                owner_id                TEXT NOT NULL,
                title                   TEXT NOT NULL,
                description             TEXT NOT NULL,
                category                TEXT NOT NULL,
                location                TEXT NOT NULL,
                latitude                REAL,
                longitude               REAL,
                is_urgent               INTEGER NOT NULL DEFAULT 0,
                media                   TEXT NOT NULL DEFAULT '[]',
                comments                TEXT NOT NULL DEFAULT '[]',
                resolution_description  TEXT NOT NULL,
                proof_media             TEXT NOT NULL,
                resolved_by             TEXT NOT NULL,
                resolved_at             TEXT NOT NULL,
                created_at              TEXT NOT NULL
            );

            CREATE INDEX idx_resolved_at ON resolved_reports(resolved_at);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
