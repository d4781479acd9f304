use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};

use crate::db::models::*;

#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Initialize database connection and create tables
    pub async fn new(database_path: &str) -> Result<Self, sqlx::Error> {
        // Use sqlite:// with ?mode=rwc to create if it doesn't exist
        let database_url = format!("sqlite://{}?mode=rwc", database_path);
        info!("Connecting to {}", database_url);
        let pool = SqlitePool::connect(&database_url).await?;

        let db = Database { pool };
        db.create_tables().await?;
        Ok(db)
    }

    /// Private in-memory database, for tests and throwaway sessions
    ///
    /// Every sqlite connection to `:memory:` is a separate database, so the
    /// pool is pinned to one connection that never expires.
    pub async fn new_in_memory() -> Result<Self, sqlx::Error> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;

        let db = Database { pool };
        db.create_tables().await?;
        Ok(db)
    }

    /// Create all necessary tables
    async fn create_tables(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS audio_files (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                file_name TEXT NOT NULL UNIQUE,
                data BLOB NOT NULL,
                upload_time TEXT NOT NULL,
                is_active BOOLEAN NOT NULL DEFAULT FALSE
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS snippets (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                audio_file_id INTEGER NOT NULL,
                region_id TEXT NOT NULL,
                start_time REAL NOT NULL,
                end_time REAL NOT NULL,
                name TEXT NOT NULL,
                is_active BOOLEAN NOT NULL DEFAULT FALSE,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_snippets_audio_file_id ON snippets (audio_file_id)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_snippets_region_id ON snippets (region_id)")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_snippets_region_audio
             ON snippets (region_id, audio_file_id)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_audio_files_upload_time ON audio_files (upload_time)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Insert an audio file, or find the existing row with the same file name
    ///
    /// Returns the row id either way. An existing row keeps its data and
    /// upload time.
    pub async fn upsert_audio_file(&self, file: &NewAudioFile) -> Result<i64, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO audio_files (file_name, data, upload_time, is_active)
            VALUES (?, ?, ?, FALSE)
            ON CONFLICT(file_name) DO NOTHING
            "#,
        )
        .bind(&file.file_name)
        .bind(&file.data)
        .bind(format_timestamp(&file.upload_time))
        .execute(&mut *tx)
        .await?;

        let id: i64 = sqlx::query_scalar("SELECT id FROM audio_files WHERE file_name = ?")
            .bind(&file.file_name)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(id)
    }

    /// Get all audio files without their data, oldest first
    pub async fn get_audio_files(&self) -> Result<Vec<DbAudioFileInfo>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT id, file_name, length(data) AS size_bytes, upload_time, is_active
            FROM audio_files
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut files = Vec::with_capacity(rows.len());
        for row in rows {
            files.push(DbAudioFileInfo {
                id: row.get("id"),
                file_name: row.get("file_name"),
                size_bytes: row.get("size_bytes"),
                upload_time: parse_timestamp(&row.get::<String, _>("upload_time"))?,
                is_active: row.get("is_active"),
            });
        }

        Ok(files)
    }

    /// Get one audio file including its data
    pub async fn get_audio_file_by_id(&self, id: i64) -> Result<Option<DbAudioFile>, sqlx::Error> {
        let row = sqlx::query("SELECT * FROM audio_files WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(DbAudioFile {
                id: row.get("id"),
                file_name: row.get("file_name"),
                data: row.get("data"),
                upload_time: parse_timestamp(&row.get::<String, _>("upload_time"))?,
                is_active: row.get("is_active"),
            })),
            None => Ok(None),
        }
    }

    /// Set the active flag of an audio file
    ///
    /// Activating clears the flag on every other file in the same
    /// transaction. Returns false if the file does not exist.
    pub async fn set_audio_file_active(
        &self,
        id: i64,
        is_active: bool,
    ) -> Result<bool, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        if is_active {
            sqlx::query("UPDATE audio_files SET is_active = FALSE WHERE id != ?")
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }

        let result = sqlx::query("UPDATE audio_files SET is_active = ? WHERE id = ?")
            .bind(is_active)
            .bind(id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        tx.commit().await?;
        Ok(true)
    }

    /// Delete an audio file row. Snippets are not touched.
    pub async fn delete_audio_file(&self, id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM audio_files WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Ids of audio files uploaded strictly before `cutoff`
    pub async fn get_audio_file_ids_uploaded_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<i64>, sqlx::Error> {
        sqlx::query_scalar("SELECT id FROM audio_files WHERE upload_time < ? ORDER BY id")
            .bind(format_timestamp(&cutoff))
            .fetch_all(&self.pool)
            .await
    }

    /// Insert or update the snippet keyed by (region_id, audio_file_id)
    ///
    /// One statement against the unique compound index, so concurrent
    /// upserts of the same key converge on a single row.
    pub async fn upsert_snippet(&self, snippet: &SnippetRecord) -> Result<i64, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO snippets (
                audio_file_id, region_id, start_time, end_time, name, is_active, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(region_id, audio_file_id) DO UPDATE SET
                start_time = excluded.start_time,
                end_time = excluded.end_time,
                name = excluded.name,
                is_active = excluded.is_active,
                updated_at = excluded.updated_at
            RETURNING id
            "#,
        )
        .bind(snippet.audio_file_id)
        .bind(&snippet.region_id)
        .bind(snippet.start_time)
        .bind(snippet.end_time)
        .bind(&snippet.name)
        .bind(snippet.is_active)
        .bind(format_timestamp(&Utc::now()))
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        debug!(
            "Upserted snippet {} (region {}, audio file {})",
            id, snippet.region_id, snippet.audio_file_id
        );
        Ok(id)
    }

    /// Get all snippets for an audio file, in insertion order
    pub async fn get_snippets_for_audio_file(
        &self,
        audio_file_id: i64,
    ) -> Result<Vec<DbSnippet>, sqlx::Error> {
        let rows = sqlx::query("SELECT * FROM snippets WHERE audio_file_id = ? ORDER BY id")
            .bind(audio_file_id)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(snippet_from_row).collect()
    }

    /// Get one snippet by its compound key
    pub async fn get_snippet(
        &self,
        region_id: &str,
        audio_file_id: i64,
    ) -> Result<Option<DbSnippet>, sqlx::Error> {
        let row = sqlx::query("SELECT * FROM snippets WHERE region_id = ? AND audio_file_id = ?")
            .bind(region_id)
            .bind(audio_file_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(snippet_from_row).transpose()
    }

    /// Flip only the active flag of a snippet. Returns false if no row matched.
    pub async fn set_snippet_active(
        &self,
        region_id: &str,
        audio_file_id: i64,
        is_active: bool,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE snippets SET is_active = ?, updated_at = ?
            WHERE region_id = ? AND audio_file_id = ?
            "#,
        )
        .bind(is_active)
        .bind(format_timestamp(&Utc::now()))
        .bind(region_id)
        .bind(audio_file_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn delete_snippet(
        &self,
        region_id: &str,
        audio_file_id: i64,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM snippets WHERE region_id = ? AND audio_file_id = ?")
            .bind(region_id)
            .bind(audio_file_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete every snippet of an audio file, returning how many went
    pub async fn delete_snippets_for_audio_file(
        &self,
        audio_file_id: i64,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM snippets WHERE audio_file_id = ?")
            .bind(audio_file_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

fn snippet_from_row(row: &SqliteRow) -> Result<DbSnippet, sqlx::Error> {
    Ok(DbSnippet {
        id: row.get("id"),
        audio_file_id: row.get("audio_file_id"),
        region_id: row.get("region_id"),
        start_time: row.get("start_time"),
        end_time: row.get("end_time"),
        name: row.get("name"),
        is_active: row.get("is_active"),
        updated_at: parse_timestamp(&row.get::<String, _>("updated_at"))?,
    })
}

// Fixed-width UTC text so that string comparison in SQL orders by time.
fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(text: &str) -> Result<DateTime<Utc>, sqlx::Error> {
    DateTime::parse_from_rfc3339(text)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| sqlx::Error::Decode(Box::new(e)))
}
