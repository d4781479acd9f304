// Test support utilities for both unit and integration tests

use crate::db::{DbAudioFile, DbAudioFileInfo, DbSnippet, NewAudioFile, SnippetRecord};
use crate::library::{ExportError, LibraryError, PersistenceGateway, Transcoder, TrimRequest};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Gateway wrapper whose writes can be switched to fail
///
/// Reads always go through to the inner gateway so tests can inspect what
/// was stored before the failure started.
pub struct FlakyGateway {
    inner: Arc<dyn PersistenceGateway>,
    failing: AtomicBool,
    failed_writes: AtomicUsize,
}

impl FlakyGateway {
    pub fn new(inner: Arc<dyn PersistenceGateway>) -> Self {
        FlakyGateway {
            inner,
            failing: AtomicBool::new(false),
            failed_writes: AtomicUsize::new(0),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of writes rejected so far
    pub fn failed_writes(&self) -> usize {
        self.failed_writes.load(Ordering::SeqCst)
    }

    fn check(&self, operation: &str) -> Result<(), LibraryError> {
        if self.failing.load(Ordering::SeqCst) {
            self.failed_writes.fetch_add(1, Ordering::SeqCst);
            Err(LibraryError::Unavailable(format!("{} rejected", operation)))
        } else {
            Ok(())
        }
    }
}

#[async_trait::async_trait]
impl PersistenceGateway for FlakyGateway {
    async fn upsert_track(&self, track: &NewAudioFile) -> Result<i64, LibraryError> {
        self.check("upsert_track")?;
        self.inner.upsert_track(track).await
    }

    async fn list_tracks(&self) -> Result<Vec<DbAudioFileInfo>, LibraryError> {
        self.inner.list_tracks().await
    }

    async fn get_track(&self, id: i64) -> Result<Option<DbAudioFile>, LibraryError> {
        self.inner.get_track(id).await
    }

    async fn set_track_active(&self, id: i64, is_active: bool) -> Result<(), LibraryError> {
        self.check("set_track_active")?;
        self.inner.set_track_active(id, is_active).await
    }

    async fn delete_track(&self, id: i64) -> Result<(), LibraryError> {
        self.check("delete_track")?;
        self.inner.delete_track(id).await
    }

    async fn upsert_snippet(&self, snippet: &SnippetRecord) -> Result<i64, LibraryError> {
        self.check("upsert_snippet")?;
        self.inner.upsert_snippet(snippet).await
    }

    async fn set_snippet_active(
        &self,
        region_id: &str,
        audio_file_id: i64,
        is_active: bool,
    ) -> Result<bool, LibraryError> {
        self.check("set_snippet_active")?;
        self.inner
            .set_snippet_active(region_id, audio_file_id, is_active)
            .await
    }

    async fn list_snippets_for_track(
        &self,
        audio_file_id: i64,
    ) -> Result<Vec<DbSnippet>, LibraryError> {
        self.inner.list_snippets_for_track(audio_file_id).await
    }

    async fn delete_snippet(
        &self,
        region_id: &str,
        audio_file_id: i64,
    ) -> Result<(), LibraryError> {
        self.check("delete_snippet")?;
        self.inner.delete_snippet(region_id, audio_file_id).await
    }

    async fn purge_older_than(&self, age: chrono::Duration) -> Result<Vec<i64>, LibraryError> {
        self.check("purge_older_than")?;
        self.inner.purge_older_than(age).await
    }
}

/// Recorded trim call
#[derive(Debug, Clone, PartialEq)]
pub struct TrimCall {
    pub source_name: String,
    pub start: f64,
    pub end: f64,
    pub title: String,
}

/// Transcoder that returns canned bytes instead of running ffmpeg
#[derive(Default)]
pub struct MockTranscoder {
    calls: Mutex<Vec<TrimCall>>,
    fail_with: Option<String>,
}

impl MockTranscoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// A transcoder whose every trim fails with `message`
    pub fn failing(message: &str) -> Self {
        MockTranscoder {
            calls: Mutex::new(Vec::new()),
            fail_with: Some(message.to_string()),
        }
    }

    pub fn calls(&self) -> Vec<TrimCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Transcoder for MockTranscoder {
    async fn trim(&self, request: &TrimRequest<'_>) -> Result<Vec<u8>, ExportError> {
        self.calls.lock().unwrap().push(TrimCall {
            source_name: request.source_name.to_string(),
            start: request.start,
            end: request.end,
            title: request.title.to_string(),
        });

        match &self.fail_with {
            Some(message) => Err(ExportError::ExportFailed(message.clone())),
            None => Ok(format!("clip:{}-{}", request.start, request.end).into_bytes()),
        }
    }
}
