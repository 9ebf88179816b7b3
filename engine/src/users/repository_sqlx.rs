use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{AnyPool, Row};

use crate::time::{from_ms, to_ms};
use crate::users::model::User;
use crate::users::repository::UserRepo;

/// SQLx-backed implementation of UserRepo.
/// Responsible only for persistence and row mapping.
pub struct SqlxUserRepo {
    pool: AnyPool,
}

impl SqlxUserRepo {
    pub fn new(pool: AnyPool) -> Self {
        Self { pool }
    }
}

const USER_COLUMNS: &str =
    "user_id, username, flakes, vials, xp, joined_ms, last_daily_ms, last_work_ms";

#[async_trait]
impl UserRepo for SqlxUserRepo {
    async fn get(&self, user_id: &str) -> Result<Option<User>> {
        let row = sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE user_id = ?;"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("get user {user_id}"))?;

        match row {
            Some(r) => Ok(Some(row_to_user(&r)?)),
            None => Ok(None),
        }
    }

    async fn get_or_create(
        &self,
        user_id: &str,
        username: &str,
        now: DateTime<Utc>,
    ) -> Result<User> {
        sqlx::query(
            r#"
INSERT INTO users (user_id, username, flakes, vials, xp, joined_ms, last_daily_ms, last_work_ms)
SELECT ?, ?, 0, 0, 0, ?, NULL, NULL
WHERE NOT EXISTS (SELECT 1 FROM users WHERE user_id = ?);
"#,
        )
        .bind(user_id)
        .bind(username)
        .bind(to_ms(now))
        .bind(user_id)
        .execute(&self.pool)
        .await
        .with_context(|| format!("create user {user_id}"))?;

        self.get(user_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("user {user_id} absent after get_or_create"))
    }

    async fn update_balance(&self, user_id: &str, delta: i64) -> Result<bool> {
        let res = sqlx::query(
            r#"
UPDATE users
SET flakes = flakes + ?
WHERE user_id = ? AND flakes + ? >= 0;
"#,
        )
        .bind(delta)
        .bind(user_id)
        .bind(delta)
        .execute(&self.pool)
        .await
        .with_context(|| format!("update_balance user={user_id} delta={delta}"))?;

        Ok(res.rows_affected() == 1)
    }

    async fn update_last_daily(&self, user_id: &str, at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE users SET last_daily_ms = ? WHERE user_id = ?;")
            .bind(to_ms(at))
            .bind(user_id)
            .execute(&self.pool)
            .await
            .with_context(|| format!("update_last_daily user={user_id}"))?;

        Ok(())
    }

    async fn update_last_work(&self, user_id: &str, at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE users SET last_work_ms = ? WHERE user_id = ?;")
            .bind(to_ms(at))
            .bind(user_id)
            .execute(&self.pool)
            .await
            .with_context(|| format!("update_last_work user={user_id}"))?;

        Ok(())
    }

    async fn list(&self) -> Result<Vec<User>> {
        let rows = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users;"))
            .fetch_all(&self.pool)
            .await
            .context("list users")?;

        let mut out = Vec::with_capacity(rows.len());
        for r in rows {
            match row_to_user(&r) {
                Ok(u) => out.push(u),
                Err(e) => {
                    // poison-row resilience: skip but don't fail the scan
                    tracing::warn!(error = %e, "skipping malformed user row");
                }
            }
        }

        Ok(out)
    }
}

pub(crate) fn row_to_user(r: &sqlx::any::AnyRow) -> Result<User> {
    let joined = from_ms(r.get::<i64, _>("joined_ms"))
        .ok_or_else(|| anyhow::anyhow!("joined_ms out of range"))?;

    let last_daily = match r.get::<Option<i64>, _>("last_daily_ms") {
        Some(ms) => Some(from_ms(ms).ok_or_else(|| anyhow::anyhow!("last_daily_ms out of range"))?),
        None => None,
    };
    let last_work = match r.get::<Option<i64>, _>("last_work_ms") {
        Some(ms) => Some(from_ms(ms).ok_or_else(|| anyhow::anyhow!("last_work_ms out of range"))?),
        None => None,
    };

    Ok(User {
        user_id: r.get::<String, _>("user_id"),
        username: r.get::<String, _>("username"),
        flakes: r.get::<i64, _>("flakes"),
        vials: r.get::<i64, _>("vials"),
        xp: r.get::<i64, _>("xp"),
        joined,
        last_daily,
        last_work,
    })
}
