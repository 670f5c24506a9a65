use anyhow::Result;
use rusqlite::{Connection, OptionalExtension, Row, params};

use fixit_types::models::{Report, ReportStatus, ResolvedReport};

use crate::{Database, conversion_error, is_constraint_violation, json_column};

const REPORT_COLUMNS: &str = "id, owner_id, title, description, category, location, latitude, \
     longitude, geo_tagged, is_urgent, media, comments, flags, status, verified_by, verified_at, \
     created_at, updated_at";

const RESOLVED_COLUMNS: &str = "id, original_report_id, owner_id, title, description, category, \
     location, latitude, longitude, is_urgent, media, comments, resolution_description, \
     proof_media, resolved_by, resolved_at, created_at";

impl Database {
    // -- Live reports --

    pub fn insert_report(&self, report: &Report) -> Result<()> {
        let media = serde_json::to_string(&report.media)?;
        let comments = serde_json::to_string(&report.comments)?;
        let flags = serde_json::to_string(&report.flags)?;
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO reports (id, owner_id, title, description, category, location, latitude,
                                      longitude, geo_tagged, is_urgent, media, comments, flags,
                                      status, verified_by, verified_at, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
                         ?17, ?18)",
                params![
                    report.id,
                    report.owner_id,
                    report.title,
                    report.description,
                    report.category,
                    report.location,
                    report.latitude,
                    report.longitude,
                    report.geo_tagged,
                    report.is_urgent,
                    media,
                    comments,
                    flags,
                    report.status.as_str(),
                    report.verified_by,
                    report.verified_at,
                    report.created_at,
                    report.updated_at,
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_report(&self, id: &str) -> Result<Option<Report>> {
        self.with_conn(|conn| query_report(conn, id))
    }

    /// Read-modify-write of one report under the connection lock.
    ///
    /// Returns `None` when the report does not exist. When `f` returns `Err`
    /// nothing is written and the error is handed back inside `Some`.
    pub fn update_report<T, E, F>(&self, id: &str, f: F) -> Result<Option<std::result::Result<T, E>>>
    where
        F: FnOnce(&mut Report) -> std::result::Result<T, E>,
    {
        self.with_conn_mut(|conn| {
            let Some(mut report) = query_report(conn, id)? else {
                return Ok(None);
            };
            match f(&mut report) {
                Ok(value) => {
                    write_report(conn, &report)?;
                    Ok(Some(Ok(value)))
                }
                Err(e) => Ok(Some(Err(e))),
            }
        })
    }

    /// Live reports, newest first, optionally restricted to one status.
    pub fn list_reports(&self, status: Option<ReportStatus>) -> Result<Vec<Report>> {
        self.with_conn(|conn| match status {
            Some(status) => query_reports(
                conn,
                "WHERE status = ?1 ORDER BY created_at DESC",
                [status.as_str()],
            ),
            None => query_reports(conn, "ORDER BY created_at DESC", []),
        })
    }

    pub fn list_reports_by_owner(&self, owner_id: &str) -> Result<Vec<Report>> {
        self.with_conn(|conn| {
            query_reports(conn, "WHERE owner_id = ?1 ORDER BY created_at DESC", [owner_id])
        })
    }

    /// Live reports carrying at least one flag.
    pub fn list_flagged_reports(&self) -> Result<Vec<Report>> {
        self.with_conn(|conn| {
            query_reports(
                conn,
                "WHERE json_array_length(flags) > 0 ORDER BY updated_at DESC",
                [],
            )
        })
    }

    pub fn count_reports(&self, status: Option<ReportStatus>) -> Result<u64> {
        self.with_conn(|conn| {
            let n: i64 = match status {
                Some(status) => conn.query_row(
                    "SELECT COUNT(*) FROM reports WHERE status = ?1",
                    [status.as_str()],
                    |r| r.get(0),
                )?,
                None => conn.query_row("SELECT COUNT(*) FROM reports", [], |r| r.get(0))?,
            };
            Ok(n as u64)
        })
    }

    pub fn count_reports_by_owner(&self, owner_id: &str) -> Result<u64> {
        self.with_conn(|conn| {
            let n: i64 = conn.query_row(
                "SELECT COUNT(*) FROM reports WHERE owner_id = ?1",
                [owner_id],
                |r| r.get(0),
            )?;
            Ok(n as u64)
        })
    }

    pub fn delete_report(&self, id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| Ok(conn.execute("DELETE FROM reports WHERE id = ?1", [id])? > 0))
    }

    /// Delete one report when `check` accepts its current state, reading and
    /// deleting under the same lock.
    ///
    /// Returns `None` when the report does not exist. When `check` returns
    /// `Err` the report is left in place and the error is handed back.
    pub fn delete_report_if<E, F>(&self, id: &str, check: F) -> Result<Option<std::result::Result<Report, E>>>
    where
        F: FnOnce(&Report) -> std::result::Result<(), E>,
    {
        self.with_conn_mut(|conn| {
            let Some(report) = query_report(conn, id)? else {
                return Ok(None);
            };
            if let Err(e) = check(&report) {
                return Ok(Some(Err(e)));
            }
            conn.execute("DELETE FROM reports WHERE id = ?1", [id])?;
            Ok(Some(Ok(report)))
        })
    }

    /// Delete every listed report that exists. Returns how many were removed.
    pub fn delete_reports(&self, ids: &[String]) -> Result<usize> {
        self.with_conn_mut(|conn| {
            let mut stmt = conn.prepare("DELETE FROM reports WHERE id = ?1")?;
            let mut deleted = 0;
            for id in ids {
                deleted += stmt.execute([id])?;
            }
            Ok(deleted)
        })
    }

    // -- Resolved reports --

    /// Archive a resolved report. Returns `false` when a record for the same
    /// original report already exists.
    pub fn insert_resolved(&self, resolved: &ResolvedReport) -> Result<bool> {
        let media = serde_json::to_string(&resolved.media)?;
        let comments = serde_json::to_string(&resolved.comments)?;
        let proof_media = serde_json::to_string(&resolved.proof_media)?;
        self.with_conn_mut(|conn| {
            let inserted = conn.execute(
                "INSERT INTO resolved_reports (id, original_report_id, owner_id, title, description,
                                               category, location, latitude, longitude, is_urgent,
                                               media, comments, resolution_description,
                                               proof_media, resolved_by, resolved_at, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
                params![
                    resolved.id,
                    resolved.original_report_id,
                    resolved.owner_id,
                    resolved.title,
                    resolved.description,
                    resolved.category,
                    resolved.location,
                    resolved.latitude,
                    resolved.longitude,
                    resolved.is_urgent,
                    media,
                    comments,
                    resolved.resolution_description,
                    proof_media,
                    resolved.resolved_by,
                    resolved.resolved_at,
                    resolved.created_at,
                ],
            );
            match inserted {
                Ok(_) => Ok(true),
                Err(e) if is_constraint_violation(&e) => Ok(false),
                Err(e) => Err(e.into()),
            }
        })
    }

    pub fn get_resolved_by_original_id(&self, original_report_id: &str) -> Result<Option<ResolvedReport>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM resolved_reports WHERE original_report_id = ?1",
                RESOLVED_COLUMNS
            );
            Ok(conn.query_row(&sql, [original_report_id], resolved_from_row).optional()?)
        })
    }

    pub fn list_resolved(&self) -> Result<Vec<ResolvedReport>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM resolved_reports ORDER BY resolved_at DESC",
                RESOLVED_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([], resolved_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn count_resolved(&self) -> Result<u64> {
        self.with_conn(|conn| {
            let n: i64 = conn.query_row("SELECT COUNT(*) FROM resolved_reports", [], |r| r.get(0))?;
            Ok(n as u64)
        })
    }
}

fn query_report(conn: &Connection, id: &str) -> Result<Option<Report>> {
    let sql = format!("SELECT {} FROM reports WHERE id = ?1", REPORT_COLUMNS);
    Ok(conn.query_row(&sql, [id], report_from_row).optional()?)
}

fn query_reports<P: rusqlite::Params>(conn: &Connection, clause: &str, params: P) -> Result<Vec<Report>> {
    let sql = format!("SELECT {} FROM reports {}", REPORT_COLUMNS, clause);
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params, report_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn write_report(conn: &Connection, report: &Report) -> Result<()> {
    conn.execute(
        "UPDATE reports SET title = ?2, description = ?3, category = ?4, location = ?5,
                            latitude = ?6, longitude = ?7, geo_tagged = ?8, is_urgent = ?9,
                            media = ?10, comments = ?11, flags = ?12, status = ?13,
                            verified_by = ?14, verified_at = ?15, updated_at = ?16
         WHERE id = ?1",
        params![
            report.id,
            report.title,
            report.description,
            report.category,
            report.location,
            report.latitude,
            report.longitude,
            report.geo_tagged,
            report.is_urgent,
            serde_json::to_string(&report.media)?,
            serde_json::to_string(&report.comments)?,
            serde_json::to_string(&report.flags)?,
            report.status.as_str(),
            report.verified_by,
            report.verified_at,
            report.updated_at,
        ],
    )?;
    Ok(())
}

fn report_from_row(row: &Row<'_>) -> rusqlite::Result<Report> {
    let status: String = row.get(13)?;
    Ok(Report {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        category: row.get(4)?,
        location: row.get(5)?,
        latitude: row.get(6)?,
        longitude: row.get(7)?,
        geo_tagged: row.get(8)?,
        is_urgent: row.get(9)?,
        media: json_column(row, 10)?,
        comments: json_column(row, 11)?,
        flags: json_column(row, 12)?,
        status: status
            .parse::<ReportStatus>()
            .map_err(|e| conversion_error(13, e))?,
        verified_by: row.get(14)?,
        verified_at: row.get(15)?,
        created_at: row.get(16)?,
        updated_at: row.get(17)?,
    })
}

fn resolved_from_row(row: &Row<'_>) -> rusqlite::Result<ResolvedReport> {
    Ok(ResolvedReport {
        id: row.get(0)?,
        original_report_id: row.get(1)?,
        owner_id: row.get(2)?,
        title: row.get(3)?,
        description: row.get(4)?,
        category: row.get(5)?,
        location: row.get(6)?,
        latitude: row.get(7)?,
        longitude: row.get(8)?,
        is_urgent: row.get(9)?,
        media: json_column(row, 10)?,
        comments: json_column(row, 11)?,
        resolution_description: row.get(12)?,
        proof_media: json_column(row, 13)?,
        resolved_by: row.get(14)?,
        resolved_at: row.get(15)?,
        created_at: row.get(16)?,
    })
}
