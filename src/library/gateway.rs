use crate::db::{DbAudioFile, DbAudioFileInfo, DbSnippet, NewAudioFile, SnippetRecord};
use thiserror::Error;

/// Tracks older than this are purged on startup unless configured otherwise
pub const DEFAULT_RETENTION_DAYS: i64 = 7;

#[derive(Error, Debug)]
pub enum LibraryError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Access contract for the durable track/snippet store
///
/// Every call may suspend and may fail; callers await each write before
/// issuing one that depends on it.
#[async_trait::async_trait]
pub trait PersistenceGateway: Send + Sync {
    /// Insert a track or return the id of the existing one with the same name
    async fn upsert_track(&self, track: &NewAudioFile) -> Result<i64, LibraryError>;

    async fn list_tracks(&self) -> Result<Vec<DbAudioFileInfo>, LibraryError>;

    /// Load one track including its audio bytes
    async fn get_track(&self, id: i64) -> Result<Option<DbAudioFile>, LibraryError>;

    /// Set a track's active flag; activating deactivates all others
    async fn set_track_active(&self, id: i64, is_active: bool) -> Result<(), LibraryError>;

    /// Delete a track after deleting all of its snippets
    async fn delete_track(&self, id: i64) -> Result<(), LibraryError>;

    /// Insert or update by (region_id, audio_file_id); returns the row id
    async fn upsert_snippet(&self, snippet: &SnippetRecord) -> Result<i64, LibraryError>;

    /// Flip the active flag of one snippet; false if no row matched
    async fn set_snippet_active(
        &self,
        region_id: &str,
        audio_file_id: i64,
        is_active: bool,
    ) -> Result<bool, LibraryError>;

    async fn list_snippets_for_track(
        &self,
        audio_file_id: i64,
    ) -> Result<Vec<DbSnippet>, LibraryError>;

    async fn delete_snippet(&self, region_id: &str, audio_file_id: i64) -> Result<(), LibraryError>;

    /// Delete tracks (and their snippets) uploaded more than `age` ago
    ///
    /// Returns the ids of purged tracks.
    async fn purge_older_than(&self, age: chrono::Duration) -> Result<Vec<i64>, LibraryError>;
}
