use std::collections::HashMap;

use anyhow::Result;
use chrono::Utc;
use rusqlite::{Connection, params};
use uuid::Uuid;

use pulse_types::models::{Role, UserSummary};

use crate::models::UserRow;
use crate::{Database, OptionalExt, enum_col, uuid_col};

impl Database {
    // -- Users --

    pub fn create_user(
        &self,
        id: Uuid,
        full_name: &str,
        email: &str,
        password_hash: &str,
        role: Role,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, full_name, email, password, role, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![id.to_string(), full_name, email, password_hash, role.as_str(), Utc::now()],
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_id(&self, id: Uuid) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id", &id.to_string()))
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "email", email))
    }

    pub fn user_exists(&self, id: Uuid) -> Result<bool> {
        self.with_conn(|conn| {
            let found: Option<i64> = conn
                .query_row("SELECT 1 FROM users WHERE id = ?1", [id.to_string()], |r| r.get(0))
                .optional()?;
            Ok(found.is_some())
        })
    }

    pub fn get_user_role(&self, id: Uuid) -> Result<Option<Role>> {
        self.with_conn(|conn| query_role(conn, id))
    }

    /// Batch-fetch public user summaries, keyed by id. Unknown ids are skipped.
    pub fn get_user_summaries(&self, ids: &[Uuid]) -> Result<HashMap<Uuid, UserSummary>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        self.with_conn(|conn| {
            let placeholders: Vec<String> = (1..=ids.len()).map(|i| format!("?{}", i)).collect();
            let sql = format!(
                "SELECT id, full_name, profile_photo FROM users WHERE id IN ({})",
                placeholders.join(", ")
            );

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(
                    rusqlite::params_from_iter(ids.iter().map(|id| id.to_string())),
                    |row| {
                        Ok(UserSummary {
                            id: uuid_col(row, 0)?,
                            full_name: row.get(1)?,
                            profile_photo: row.get(2)?,
                        })
                    },
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows.into_iter().map(|u| (u.id, u)).collect())
        })
    }

    // -- Follows --

    /// Toggle `follower -> followee`. Returns true when the edge now exists.
    ///
    /// One row carries both sides of the relation, so the follower's
    /// `following` and the followee's `followers` change together.
    pub fn toggle_follow(&self, follower: Uuid, followee: Uuid) -> Result<bool> {
        self.with_conn(|conn| {
            let removed = conn.execute(
                "DELETE FROM follows WHERE follower_id = ?1 AND followee_id = ?2",
                params![follower.to_string(), followee.to_string()],
            )?;
            if removed > 0 {
                return Ok(false);
            }

            conn.execute(
                "INSERT INTO follows (follower_id, followee_id, created_at) VALUES (?1, ?2, ?3)",
                params![follower.to_string(), followee.to_string(), Utc::now()],
            )?;
            Ok(true)
        })
    }

    pub fn get_followers(&self, user_id: Uuid) -> Result<Vec<Uuid>> {
        self.with_conn(|conn| {
            query_ids(
                conn,
                "SELECT follower_id FROM follows WHERE followee_id = ?1 ORDER BY created_at",
                user_id,
            )
        })
    }

    pub fn get_following(&self, user_id: Uuid) -> Result<Vec<Uuid>> {
        self.with_conn(|conn| {
            query_ids(
                conn,
                "SELECT followee_id FROM follows WHERE follower_id = ?1 ORDER BY created_at",
                user_id,
            )
        })
    }
}

fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    let sql = format!(
        "SELECT id, full_name, email, password, profile_photo, role, created_at
         FROM users WHERE {} = ?1",
        column
    );
    let mut stmt = conn.prepare(&sql)?;

    let row = stmt
        .query_row([value], |row| {
            Ok(UserRow {
                id: uuid_col(row, 0)?,
                full_name: row.get(1)?,
                email: row.get(2)?,
                password: row.get(3)?,
                profile_photo: row.get(4)?,
                role: enum_col(row, 5, Role::parse)?,
                created_at: row.get(6)?,
            })
        })
        .optional()?;

    Ok(row)
}

pub(crate) fn query_role(conn: &Connection, id: Uuid) -> Result<Option<Role>> {
    conn.query_row("SELECT role FROM users WHERE id = ?1", [id.to_string()], |row| {
        enum_col(row, 0, Role::parse)
    })
    .optional()
}

/// Run a single-parameter query returning one UUID column.
pub(crate) fn query_ids(conn: &Connection, sql: &str, param: Uuid) -> Result<Vec<Uuid>> {
    let mut stmt = conn.prepare(sql)?;
    let ids = stmt
        .query_map([param.to_string()], |row| uuid_col(row, 0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(ids)
}
