use crate::db::{Database, DbAudioFile, DbAudioFileInfo, DbSnippet, NewAudioFile, SnippetRecord};
use crate::library::gateway::{LibraryError, PersistenceGateway};
use chrono::Utc;
use tracing::{debug, info};

/// The library manager for track and snippet persistence
///
/// Handles:
/// - Track upload with name deduplication and exclusive activation
/// - Snippet upserts keyed by (region id, track id)
/// - Cascading deletes and the age-based retention purge
#[derive(Debug, Clone)]
pub struct LibraryManager {
    database: Database,
}

impl LibraryManager {
    /// Create a new library manager
    pub fn new(database: Database) -> Self {
        LibraryManager { database }
    }

    /// Upload a track and make it the active one
    ///
    /// Uploading a name that already exists reactivates the stored track.
    pub async fn add_track(&self, file_name: &str, data: Vec<u8>) -> Result<i64, LibraryError> {
        let id = self
            .upsert_track(&NewAudioFile::new(file_name, data))
            .await?;
        self.set_track_active(id, true).await?;
        info!("Track '{}' is active as {}", file_name, id);
        Ok(id)
    }
}

#[async_trait::async_trait]
impl PersistenceGateway for LibraryManager {
    async fn upsert_track(&self, track: &NewAudioFile) -> Result<i64, LibraryError> {
        Ok(self.database.upsert_audio_file(track).await?)
    }

    async fn list_tracks(&self) -> Result<Vec<DbAudioFileInfo>, LibraryError> {
        Ok(self.database.get_audio_files().await?)
    }

    async fn get_track(&self, id: i64) -> Result<Option<DbAudioFile>, LibraryError> {
        Ok(self.database.get_audio_file_by_id(id).await?)
    }

    async fn set_track_active(&self, id: i64, is_active: bool) -> Result<(), LibraryError> {
        if self.database.set_audio_file_active(id, is_active).await? {
            Ok(())
        } else {
            Err(LibraryError::NotFound(format!("track {}", id)))
        }
    }

    async fn delete_track(&self, id: i64) -> Result<(), LibraryError> {
        // Snippets first, confirmed, then the track row
        let removed = self.database.delete_snippets_for_audio_file(id).await?;
        debug!("Deleted {} snippets of track {}", removed, id);

        if !self.database.delete_audio_file(id).await? {
            return Err(LibraryError::NotFound(format!("track {}", id)));
        }
        info!("Deleted track {}", id);
        Ok(())
    }

    async fn upsert_snippet(&self, snippet: &SnippetRecord) -> Result<i64, LibraryError> {
        Ok(self.database.upsert_snippet(snippet).await?)
    }

    async fn set_snippet_active(
        &self,
        region_id: &str,
        audio_file_id: i64,
        is_active: bool,
    ) -> Result<bool, LibraryError> {
        Ok(self
            .database
            .set_snippet_active(region_id, audio_file_id, is_active)
            .await?)
    }

    async fn list_snippets_for_track(
        &self,
        audio_file_id: i64,
    ) -> Result<Vec<DbSnippet>, LibraryError> {
        Ok(self
            .database
            .get_snippets_for_audio_file(audio_file_id)
            .await?)
    }

    async fn delete_snippet(
        &self,
        region_id: &str,
        audio_file_id: i64,
    ) -> Result<(), LibraryError> {
        self.database.delete_snippet(region_id, audio_file_id).await?;
        Ok(())
    }

    async fn purge_older_than(&self, age: chrono::Duration) -> Result<Vec<i64>, LibraryError> {
        let cutoff = Utc::now() - age;
        let expired = self.database.get_audio_file_ids_uploaded_before(cutoff).await?;

        for id in &expired {
            self.delete_track(*id).await?;
        }

        if !expired.is_empty() {
            info!(
                "Purged {} tracks uploaded before {}",
                expired.len(),
                cutoff.to_rfc3339()
            );
        }
        Ok(expired)
    }
}
