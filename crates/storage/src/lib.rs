use std::{fs, path::Path, str::FromStr};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Pool, Row, Sqlite,
};

use shared::domain::Role;

/// Local persisted session storage. Holds the bearer token and role the
/// promotion page reads on startup; a single session row per database.
#[derive(Clone)]
pub struct SessionStore {
    pool: Pool<Sqlite>,
}

#[derive(Debug, Clone)]
pub struct StoredSession {
    pub token: String,
    pub role: Role,
    pub username: String,
    pub saved_at: DateTime<Utc>,
}

impl SessionStore {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connect_options)
            .await?;
        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS session (
                id        INTEGER PRIMARY KEY CHECK (id = 1),
                token     TEXT NOT NULL,
                role      TEXT NOT NULL,
                username  TEXT NOT NULL,
                saved_at  TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("failed to ensure session table exists")?;
        Ok(())
    }

    pub async fn save_session(&self, token: &str, role: Role, username: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO session (id, token, role, username, saved_at)
             VALUES (1, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
               token=excluded.token, role=excluded.role,
               username=excluded.username, saved_at=excluded.saved_at",
        )
        .bind(token)
        .bind(role.as_str())
        .bind(username)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn load_session(&self) -> Result<Option<StoredSession>> {
        let row = sqlx::query("SELECT token, role, username, saved_at FROM session WHERE id = 1")
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let role_text: String = row.get(1);
        let role = role_text
            .parse::<Role>()
            .with_context(|| format!("corrupt session row: role '{role_text}'"))?;
        let saved_at_text: String = row.get(3);
        let saved_at = DateTime::parse_from_rfc3339(&saved_at_text)
            .with_context(|| format!("corrupt session row: saved_at '{saved_at_text}'"))?
            .with_timezone(&Utc);

        Ok(Some(StoredSession {
            token: row.get(0),
            role,
            username: row.get(2),
            saved_at,
        }))
    }

    pub async fn clear_session(&self) -> Result<()> {
        sqlx::query("DELETE FROM session WHERE id = 1")
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    if database_url == "sqlite::memory:" || !database_url.starts_with("sqlite:") {
        return Ok(());
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return Ok(());
    }

    let Some(parent) = Path::new(path).parent() else {
        return Ok(());
    };

    if parent.as_os_str().is_empty() {
        return Ok(());
    }

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
