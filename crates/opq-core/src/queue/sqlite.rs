//! SQLite-backed request store.
//!
//! Single `requests` table, migrations run at open. The database file lives
//! under the XDG state directory (`~/.local/state/opq/requests.db`).

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Row, Sqlite};
use std::path::Path;

use async_trait::async_trait;

use super::store::{RequestStore, StoreError};
use crate::request::{ClientId, RequestId, RequestState, SavePageRequest};

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Failure(e.to_string())
    }
}

/// Percent-encode a path for use in a sqlite:// URI so spaces and special
/// chars don't break parsing.
fn path_to_sqlite_uri(path: &Path) -> String {
    let s = path.to_string_lossy();
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '%' => out.push_str("%25"),
            ' ' => out.push_str("%20"),
            '#' => out.push_str("%23"),
            '?' => out.push_str("%3F"),
            '&' => out.push_str("%26"),
            c => out.push(c),
        }
    }
    format!("sqlite://{}", out)
}

/// Handle to the SQLite request store.
#[derive(Clone)]
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Open (or create) the default store and run migrations.
    pub async fn open_default() -> Result<Self, StoreError> {
        let xdg_dirs = xdg::BaseDirectories::with_prefix("opq")
            .map_err(|e| StoreError::Failure(e.to_string()))?;
        let state_dir = xdg_dirs.get_state_home();
        let db_path = state_dir.join("requests.db");

        tokio::fs::create_dir_all(&state_dir)
            .await
            .map_err(|e| StoreError::Failure(e.to_string()))?;

        let uri = path_to_sqlite_uri(&db_path) + "?mode=rwc";
        let pool = SqlitePoolOptions::new().max_connections(8).connect(&uri).await?;

        let store = SqliteStore { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Open (or create) the store at a specific path. Creates parent dirs if
    /// needed. Intended for tests so the DB can live in a temp directory.
    pub async fn open_at(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::Failure(e.to_string()))?;
        }
        let uri = path_to_sqlite_uri(path) + "?mode=rwc";
        let pool = SqlitePoolOptions::new().max_connections(8).connect(&uri).await?;
        let store = SqliteStore { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Open an in-memory store (no disk I/O).
    pub async fn open_memory() -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        let store = SqliteStore { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), StoreError> {
        // Request ids are coordinator-assigned, so the primary key is plain
        // (no AUTOINCREMENT).
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS requests (
                id INTEGER PRIMARY KEY,
                url TEXT NOT NULL,
                client_namespace TEXT NOT NULL,
                client_id TEXT NOT NULL,
                creation_time INTEGER NOT NULL,
                activation_time INTEGER,
                user_requested INTEGER NOT NULL,
                started_attempt_count INTEGER NOT NULL DEFAULT 0,
                completed_attempt_count INTEGER NOT NULL DEFAULT 0,
                state TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn row_to_request(row: &sqlx::sqlite::SqliteRow) -> SavePageRequest {
    let state_str: String = row.get("state");
    SavePageRequest {
        id: row.get("id"),
        url: row.get("url"),
        client_id: ClientId {
            name_space: row.get("client_namespace"),
            id: row.get("client_id"),
        },
        creation_time: row.get("creation_time"),
        activation_time: row.get("activation_time"),
        user_requested: row.get::<i64, _>("user_requested") != 0,
        started_attempt_count: row.get::<i64, _>("started_attempt_count") as u32,
        completed_attempt_count: row.get::<i64, _>("completed_attempt_count") as u32,
        state: RequestState::from_str(&state_str),
    }
}

#[async_trait]
impl RequestStore for SqliteStore {
    async fn add(&self, request: &SavePageRequest) -> Result<(), StoreError> {
        if self.get(request.id).await?.is_some() {
            return Err(StoreError::AlreadyExists(request.id));
        }
        sqlx::query(
            r#"
            INSERT INTO requests (
                id, url, client_namespace, client_id, creation_time,
                activation_time, user_requested, started_attempt_count,
                completed_attempt_count, state
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(request.id)
        .bind(&request.url)
        .bind(&request.client_id.name_space)
        .bind(&request.client_id.id)
        .bind(request.creation_time)
        .bind(request.activation_time)
        .bind(request.user_requested as i64)
        .bind(request.started_attempt_count as i64)
        .bind(request.completed_attempt_count as i64)
        .bind(request.state.as_str())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, id: RequestId) -> Result<Option<SavePageRequest>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, url, client_namespace, client_id, creation_time,
                   activation_time, user_requested, started_attempt_count,
                   completed_attempt_count, state
            FROM requests
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(row_to_request))
    }

    async fn get_all(&self) -> Result<Vec<SavePageRequest>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, url, client_namespace, client_id, creation_time,
                   activation_time, user_requested, started_attempt_count,
                   completed_attempt_count, state
            FROM requests
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(row_to_request).collect())
    }

    async fn update(&self, request: &SavePageRequest) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE requests
            SET url = ?1,
                client_namespace = ?2,
                client_id = ?3,
                creation_time = ?4,
                activation_time = ?5,
                user_requested = ?6,
                started_attempt_count = ?7,
                completed_attempt_count = ?8,
                state = ?9
            WHERE id = ?10
            "#,
        )
        .bind(&request.url)
        .bind(&request.client_id.name_space)
        .bind(&request.client_id.id)
        .bind(request.creation_time)
        .bind(request.activation_time)
        .bind(request.user_requested as i64)
        .bind(request.started_attempt_count as i64)
        .bind(request.completed_attempt_count as i64)
        .bind(request.state.as_str())
        .bind(request.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(request.id));
        }
        Ok(())
    }

    async fn remove(&self, id: RequestId) -> Result<SavePageRequest, StoreError> {
        let body = self.get(id).await?.ok_or(StoreError::NotFound(id))?;
        sqlx::query("DELETE FROM requests WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(body)
    }
}
