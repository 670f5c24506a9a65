use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};

use fixit_types::models::{Reputation, Role, SuspendedUser, User};

use crate::{Database, conversion_error, is_constraint_violation};

const USER_COLUMNS: &str = "id, username, password, first_name, last_name, email, barangay, \
     municipality, role, rep_points, rep_level, verified_reports, resolved_reports, \
     last_login, created_at";

const SUSPENDED_COLUMNS: &str = "id, original_user_id, username, password, first_name, last_name, \
     email, barangay, municipality, role, rep_points, rep_level, verified_reports, \
     resolved_reports, last_login, created_at, reason, suspended_at, suspended_by";

/// Outcome of [`Database::try_insert_user`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserInsert {
    Inserted,
    IdTaken,
    UsernameTaken,
}

impl Database {
    // -- Active users --

    pub fn insert_user(&self, user: &User) -> Result<()> {
        self.with_conn_mut(|conn| {
            insert_user_row(conn, user)?;
            Ok(())
        })
    }

    /// Insert `user` under its own id. A collision is reported instead of
    /// failing, naming whether the id or the username was already taken.
    pub fn try_insert_user(&self, user: &User) -> Result<UserInsert> {
        self.with_conn_mut(|conn| match insert_user_row(conn, user) {
            Ok(()) => Ok(UserInsert::Inserted),
            Err(e) if is_constraint_violation(&e) => {
                let id_taken: bool = conn.query_row(
                    "SELECT EXISTS(SELECT 1 FROM users WHERE id = ?1)",
                    [&user.id],
                    |r| r.get(0),
                )?;
                Ok(if id_taken {
                    UserInsert::IdTaken
                } else {
                    UserInsert::UsernameTaken
                })
            }
            Err(e) => Err(e.into()),
        })
    }

    /// Overwrite every profile field of the user with `user.id`, inserting
    /// the row if it is missing.
    pub fn upsert_user(&self, user: &User) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO users (id, username, password, first_name, last_name, email, barangay,
                                    municipality, role, rep_points, rep_level, verified_reports,
                                    resolved_reports, last_login, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
                 ON CONFLICT(id) DO UPDATE SET
                    username = excluded.username,
                    password = excluded.password,
                    first_name = excluded.first_name,
                    last_name = excluded.last_name,
                    email = excluded.email,
                    barangay = excluded.barangay,
                    municipality = excluded.municipality,
                    role = excluded.role,
                    rep_points = excluded.rep_points,
                    rep_level = excluded.rep_level,
                    verified_reports = excluded.verified_reports,
                    resolved_reports = excluded.resolved_reports,
                    last_login = excluded.last_login,
                    created_at = excluded.created_at",
                user_params(user),
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<User>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS);
            Ok(conn.query_row(&sql, [id], |row| user_from_row(row, 0)).optional()?)
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {} FROM users WHERE username = ?1", USER_COLUMNS);
            Ok(conn.query_row(&sql, [username], |row| user_from_row(row, 0)).optional()?)
        })
    }

    pub fn list_users(&self) -> Result<Vec<User>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {} FROM users ORDER BY created_at DESC", USER_COLUMNS);
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([], |row| user_from_row(row, 0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn delete_user(&self, id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| Ok(conn.execute("DELETE FROM users WHERE id = ?1", [id])? > 0))
    }

    pub fn update_last_login(&self, id: &str, at: DateTime<Utc>) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute("UPDATE users SET last_login = ?2 WHERE id = ?1", params![id, at])?;
            Ok(())
        })
    }

    /// Apply `award` to the reputation of an active user. Returns `false`
    /// when the user is not in the active store.
    pub fn update_reputation<F>(&self, id: &str, award: F) -> Result<bool>
    where
        F: FnOnce(&mut Reputation),
    {
        self.with_conn_mut(|conn| {
            let sql = format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS);
            let Some(mut user) = conn.query_row(&sql, [id], |row| user_from_row(row, 0)).optional()?
            else {
                return Ok(false);
            };
            award(&mut user.reputation);
            conn.execute(
                "UPDATE users SET rep_points = ?2, rep_level = ?3, verified_reports = ?4,
                                  resolved_reports = ?5
                 WHERE id = ?1",
                params![
                    id,
                    user.reputation.points,
                    user.reputation.level,
                    user.reputation.verified_reports,
                    user.reputation.resolved_reports,
                ],
            )?;
            Ok(true)
        })
    }

    pub fn count_users(&self) -> Result<u64> {
        self.with_conn(|conn| {
            let n: i64 = conn.query_row("SELECT COUNT(*) FROM users", [], |r| r.get(0))?;
            Ok(n as u64)
        })
    }

    pub fn count_users_active_since(&self, since: DateTime<Utc>) -> Result<u64> {
        self.with_conn(|conn| {
            let n: i64 = conn.query_row(
                "SELECT COUNT(*) FROM users WHERE last_login IS NOT NULL AND last_login >= ?1",
                [since],
                |r| r.get(0),
            )?;
            Ok(n as u64)
        })
    }

    // -- Suspended users --

    /// Store a suspension record. Returns `false` when the user already has
    /// one.
    pub fn insert_suspended(&self, record: &SuspendedUser) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let u = &record.snapshot;
            let inserted = conn.execute(
                "INSERT INTO suspended_users (id, original_user_id, username, password, first_name,
                                              last_name, email, barangay, municipality, role,
                                              rep_points, rep_level, verified_reports,
                                              resolved_reports, last_login, created_at, reason,
                                              suspended_at, suspended_by)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
                         ?17, ?18, ?19)",
                params![
                    record.id,
                    record.original_user_id,
                    u.username,
                    u.password_hash,
                    u.first_name,
                    u.last_name,
                    u.email,
                    u.barangay,
                    u.municipality,
                    u.role.as_str(),
                    u.reputation.points,
                    u.reputation.level,
                    u.reputation.verified_reports,
                    u.reputation.resolved_reports,
                    u.last_login,
                    u.created_at,
                    record.reason,
                    record.suspended_at,
                    record.suspended_by,
                ],
            );
            match inserted {
                Ok(_) => Ok(true),
                Err(e) if is_constraint_violation(&e) => Ok(false),
                Err(e) => Err(e.into()),
            }
        })
    }

    /// Apply `award` to the reputation kept in a suspension snapshot, so it
    /// survives the restore. Returns `false` when no record exists.
    pub fn update_suspended_reputation<F>(&self, original_user_id: &str, award: F) -> Result<bool>
    where
        F: FnOnce(&mut Reputation),
    {
        self.with_conn_mut(|conn| {
            let sql = format!(
                "SELECT {} FROM suspended_users WHERE original_user_id = ?1",
                SUSPENDED_COLUMNS
            );
            let Some(mut record) = conn
                .query_row(&sql, [original_user_id], suspended_from_row)
                .optional()?
            else {
                return Ok(false);
            };
            let rep = &mut record.snapshot.reputation;
            award(rep);
            conn.execute(
                "UPDATE suspended_users SET rep_points = ?2, rep_level = ?3, verified_reports = ?4,
                                            resolved_reports = ?5
                 WHERE id = ?1",
                params![
                    record.id,
                    rep.points,
                    rep.level,
                    rep.verified_reports,
                    rep.resolved_reports,
                ],
            )?;
            Ok(true)
        })
    }

    pub fn get_suspended_by_original_id(&self, original_user_id: &str) -> Result<Option<SuspendedUser>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM suspended_users WHERE original_user_id = ?1",
                SUSPENDED_COLUMNS
            );
            Ok(conn.query_row(&sql, [original_user_id], suspended_from_row).optional()?)
        })
    }

    /// Look a suspension up by either its own id or the suspended user's
    /// original id.
    pub fn find_suspended(&self, identifier: &str) -> Result<Option<SuspendedUser>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM suspended_users WHERE id = ?1 OR original_user_id = ?1 LIMIT 1",
                SUSPENDED_COLUMNS
            );
            Ok(conn.query_row(&sql, [identifier], suspended_from_row).optional()?)
        })
    }

    pub fn get_suspended_by_username(&self, username: &str) -> Result<Option<SuspendedUser>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM suspended_users WHERE username = ?1 LIMIT 1",
                SUSPENDED_COLUMNS
            );
            Ok(conn.query_row(&sql, [username], suspended_from_row).optional()?)
        })
    }

    pub fn list_suspended(&self) -> Result<Vec<SuspendedUser>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM suspended_users ORDER BY suspended_at DESC",
                SUSPENDED_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([], suspended_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn delete_suspended(&self, id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            Ok(conn.execute("DELETE FROM suspended_users WHERE id = ?1", [id])? > 0)
        })
    }

    /// Distinct accounts across both stores. A suspension record whose user
    /// is also active counts once.
    pub fn count_accounts(&self) -> Result<u64> {
        self.with_conn(|conn| {
            let n: i64 = conn.query_row(
                "SELECT (SELECT COUNT(*) FROM users)
                      + (SELECT COUNT(*) FROM suspended_users s
                         WHERE NOT EXISTS (SELECT 1 FROM users u WHERE u.id = s.original_user_id))",
                [],
                |r| r.get(0),
            )?;
            Ok(n as u64)
        })
    }

    pub fn count_suspended(&self) -> Result<u64> {
        self.with_conn(|conn| {
            let n: i64 = conn.query_row("SELECT COUNT(*) FROM suspended_users", [], |r| r.get(0))?;
            Ok(n as u64)
        })
    }
}

fn insert_user_row(conn: &Connection, user: &User) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO users (id, username, password, first_name, last_name, email, barangay,
                            municipality, role, rep_points, rep_level, verified_reports,
                            resolved_reports, last_login, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
        user_params(user),
    )?;
    Ok(())
}

fn user_params(user: &User) -> impl rusqlite::Params + '_ {
    (
        &user.id,
        &user.username,
        &user.password_hash,
        &user.first_name,
        &user.last_name,
        &user.email,
        &user.barangay,
        &user.municipality,
        user.role.as_str(),
        user.reputation.points,
        &user.reputation.level,
        user.reputation.verified_reports,
        user.reputation.resolved_reports,
        user.last_login,
        user.created_at,
    )
}

/// Map the user columns starting at `offset`.
fn user_from_row(row: &Row<'_>, offset: usize) -> rusqlite::Result<User> {
    let role: String = row.get(offset + 8)?;
    Ok(User {
        id: row.get(offset)?,
        username: row.get(offset + 1)?,
        password_hash: row.get(offset + 2)?,
        first_name: row.get(offset + 3)?,
        last_name: row.get(offset + 4)?,
        email: row.get(offset + 5)?,
        barangay: row.get(offset + 6)?,
        municipality: row.get(offset + 7)?,
        role: role
            .parse::<Role>()
            .map_err(|e| conversion_error(offset + 8, e))?,
        reputation: Reputation {
            points: row.get(offset + 9)?,
            level: row.get(offset + 10)?,
            verified_reports: row.get(offset + 11)?,
            resolved_reports: row.get(offset + 12)?,
        },
        last_login: row.get(offset + 13)?,
        created_at: row.get(offset + 14)?,
    })
}

fn suspended_from_row(row: &Row<'_>) -> rusqlite::Result<SuspendedUser> {
    let original_user_id: String = row.get(1)?;
    // Columns 2.. mirror the user layout minus the id.
    let role: String = row.get(9)?;
    let snapshot = User {
        id: original_user_id.clone(),
        username: row.get(2)?,
        password_hash: row.get(3)?,
        first_name: row.get(4)?,
        last_name: row.get(5)?,
        email: row.get(6)?,
        barangay: row.get(7)?,
        municipality: row.get(8)?,
        role: role.parse::<Role>().map_err(|e| conversion_error(9, e))?,
        reputation: Reputation {
            points: row.get(10)?,
            level: row.get(11)?,
            verified_reports: row.get(12)?,
            resolved_reports: row.get(13)?,
        },
        last_login: row.get(14)?,
        created_at: row.get(15)?,
    };
    Ok(SuspendedUser {
        id: row.get(0)?,
        original_user_id,
        snapshot,
        reason: row.get(16)?,
        suspended_at: row.get(17)?,
        suspended_by: row.get(18)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: &str, username: &str) -> User {
        User {
            id: id.to_string(),
            username: username.to_string(),
            password_hash: "hash".into(),
            first_name: "Ana".into(),
            last_name: "Reyes".into(),
            email: format!("{}@example.com", username),
            barangay: "Barretto".into(),
            municipality: "Olongapo".into(),
            role: Role::Member,
            reputation: Reputation::default(),
            last_login: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_user_roundtrip_and_duplicate_insert() {
        let db = Database::open_in_memory().unwrap();
        let u = user("u1", "ana");
        db.insert_user(&u).unwrap();

        let loaded = db.get_user_by_id("u1").unwrap().unwrap();
        assert_eq!(loaded.username, "ana");
        assert_eq!(loaded.password_hash, "hash");
        assert_eq!(loaded.role, Role::Member);
        assert_eq!(loaded.created_at, u.created_at);

        assert_eq!(db.try_insert_user(&u).unwrap(), UserInsert::IdTaken);
        assert_eq!(
            db.try_insert_user(&user("u1", "cara")).unwrap(),
            UserInsert::IdTaken
        );
        assert_eq!(
            db.try_insert_user(&user("u2", "ana")).unwrap(),
            UserInsert::UsernameTaken
        );
        assert_eq!(db.try_insert_user(&user("u2", "ben")).unwrap(), UserInsert::Inserted);
        assert_eq!(db.count_users().unwrap(), 2);
    }

    #[test]
    fn test_upsert_overwrites_in_place() {
        let db = Database::open_in_memory().unwrap();
        db.insert_user(&user("u1", "ana")).unwrap();
        let mut changed = user("u1", "ana");
        changed.first_name = "Ann".into();
        db.upsert_user(&changed).unwrap();
        assert_eq!(db.get_user_by_id("u1").unwrap().unwrap().first_name, "Ann");
        assert_eq!(db.count_users().unwrap(), 1);
    }

    #[test]
    fn test_update_reputation() {
        let db = Database::open_in_memory().unwrap();
        db.insert_user(&user("u1", "ana")).unwrap();
        assert!(db.update_reputation("u1", |r| r.award_resolved()).unwrap());
        assert!(!db.update_reputation("missing", |r| r.award_resolved()).unwrap());
        let rep = db.get_user_by_id("u1").unwrap().unwrap().reputation;
        assert_eq!(rep.points, Reputation::RESOLVED_POINTS);
        assert_eq!(rep.resolved_reports, 1);
    }

    #[test]
    fn test_suspended_lookup_by_either_id() {
        let db = Database::open_in_memory().unwrap();
        let record = SuspendedUser {
            id: "s1".into(),
            original_user_id: "u1".into(),
            snapshot: user("u1", "ana"),
            reason: "spam".into(),
            suspended_at: Utc::now(),
            suspended_by: "admin".into(),
        };
        assert!(db.insert_suspended(&record).unwrap());
        assert!(!db.insert_suspended(&SuspendedUser { id: "s2".into(), ..record.clone() }).unwrap());

        let by_own = db.find_suspended("s1").unwrap().unwrap();
        let by_original = db.find_suspended("u1").unwrap().unwrap();
        assert_eq!(by_own, by_original);
        assert_eq!(by_own.snapshot.id, "u1");
        assert_eq!(by_own.snapshot.password_hash, "hash");
        assert!(db.find_suspended("nope").unwrap().is_none());

        assert!(db.delete_suspended("s1").unwrap());
        assert_eq!(db.count_suspended().unwrap(), 0);
    }
}
