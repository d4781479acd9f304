use crate::audio_probe::probe_duration;
use crate::db::{DbSnippet, SnippetRecord};
use crate::library::{
    ExportError, ExportService, ExportedClip, LibraryError, PersistenceGateway, Transcoder,
};
use crate::notify::EventHub;
use crate::playback::{LoopMode, PlaybackCoordinator, PlaybackHandle};
use crate::regions::{ActivationChange, Region, RegionError, RegionId, RegionStore, RegionUpdate};
use crate::snippet_text::{format_snippets, parse_snippets, SkippedLine};
use crate::waveform::{RegionSpec, WaveformEvent, WaveformHandle};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc as tokio_mpsc;
use tracing::{debug, error, info, warn};

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("No track is loaded")]
    NoTrack,
    #[error("Region error: {0}")]
    Region(#[from] RegionError),
    #[error("Library error: {0}")]
    Library(#[from] LibraryError),
    #[error("Export error: {0}")]
    Export(#[from] ExportError),
}

/// Non-blocking messages for the user
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    /// A store write failed; the in-memory state was kept
    PersistenceFailed { operation: String, message: String },
    ExportFailed { message: String },
}

/// The track currently shown on the waveform
#[derive(Debug, Clone)]
pub struct LoadedTrack {
    pub id: i64,
    pub file_name: String,
    pub data: Vec<u8>,
    pub duration: Option<f64>,
}

/// Outcome of a text import
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportReport {
    pub imported: Vec<RegionId>,
    pub skipped: Vec<SkippedLine>,
}

/// Adapter between the waveform renderer and the region core
///
/// Owns the region store and the loop state machine for one session.
/// Waveform events come in through `handle_event`; drawing and transport
/// commands go out through the two handles. Every store write is awaited,
/// and a failed write is reported as a `Notice` without undoing the
/// in-memory change.
pub struct WaveformBridge {
    library: Arc<dyn PersistenceGateway>,
    regions: RegionStore,
    playback: PlaybackCoordinator,
    view: WaveformHandle,
    transport: PlaybackHandle,
    notices: EventHub<Notice>,
    track: Option<LoadedTrack>,
}

impl WaveformBridge {
    pub fn new(
        library: Arc<dyn PersistenceGateway>,
        view: WaveformHandle,
        transport: PlaybackHandle,
    ) -> Self {
        WaveformBridge {
            library,
            regions: RegionStore::new(),
            playback: PlaybackCoordinator::new(),
            view,
            transport,
            notices: EventHub::new(),
            track: None,
        }
    }

    pub fn regions(&self) -> &RegionStore {
        &self.regions
    }

    pub fn playback(&self) -> &PlaybackCoordinator {
        &self.playback
    }

    pub fn track(&self) -> Option<&LoadedTrack> {
        self.track.as_ref()
    }

    pub fn subscribe_notices(&self) -> tokio_mpsc::UnboundedReceiver<Notice> {
        self.notices.subscribe()
    }

    // ---- Track lifecycle ----

    /// Make a stored track the active one and load its regions
    ///
    /// Persisted snippets are recreated with their ids. If several are
    /// marked active the most recently written one that loads wins and the
    /// others are cleared in the store.
    pub async fn activate_track(&mut self, id: i64) -> Result<(), SessionError> {
        self.library.set_track_active(id, true).await?;
        let stored = self
            .library
            .get_track(id)
            .await?
            .ok_or_else(|| LibraryError::NotFound(format!("track {}", id)))?;
        let snippets = self.library.list_snippets_for_track(id).await?;

        self.unload_track();

        let duration = match probe_duration(&stored.data, &stored.file_name) {
            Ok(duration) => Some(duration),
            Err(e) => {
                warn!("Could not read duration of {}: {}", stored.file_name, e);
                None
            }
        };
        info!(
            "Loaded track {} '{}' ({} snippets)",
            id,
            stored.file_name,
            snippets.len()
        );

        self.track = Some(LoadedTrack {
            id,
            file_name: stored.file_name,
            data: stored.data,
            duration,
        });

        self.rehydrate(id, &snippets).await;

        // Bound new edits only after stored regions are back
        self.regions.set_duration(duration);
        self.playback.set_duration(duration);
        Ok(())
    }

    async fn rehydrate(&mut self, track_id: i64, snippets: &[DbSnippet]) {
        let mut loaded: Vec<&DbSnippet> = Vec::with_capacity(snippets.len());
        for snippet in snippets {
            match self.regions.insert_region(
                &snippet.region_id,
                snippet.start_time,
                snippet.end_time,
                Some(&snippet.name),
            ) {
                Ok(region) => {
                    self.view.add_region(&region);
                    loaded.push(snippet);
                }
                Err(e) => warn!("Skipping stored snippet {}: {}", snippet.id, e),
            }
        }

        // Only a row that made it into the store can win
        let winner = loaded
            .iter()
            .filter(|s| s.is_active)
            .max_by_key(|s| (s.updated_at, s.id))
            .map(|s| s.region_id.clone());

        if let Some(winner) = &winner {
            if self.regions.set_active(winner).is_ok() {
                if let Some(region) = self.regions.get(winner) {
                    self.view.update_region(region);
                }
            }
        }

        let stale: Vec<&DbSnippet> = snippets
            .iter()
            .filter(|s| s.is_active && Some(&s.region_id) != winner.as_ref())
            .collect();
        for snippet in stale {
            warn!(
                "Clearing stale active flag on snippet {} of track {}",
                snippet.region_id, track_id
            );
            if let Err(e) = self
                .library
                .set_snippet_active(&snippet.region_id, track_id, false)
                .await
            {
                self.report_persistence_failure("repair active snippet", &e);
            }
        }
    }

    /// Drop the loaded track and its regions from the session
    pub fn unload_track(&mut self) {
        if let Some(track) = self.track.take() {
            debug!("Unloading track {}", track.id);
        }
        self.regions.clear();
        self.playback.reset();
        self.view.clear_regions();
    }

    /// Delete a stored track, unloading it first if it is the loaded one
    pub async fn delete_track(&mut self, id: i64) -> Result<(), SessionError> {
        self.library.delete_track(id).await?;
        if self.track.as_ref().map(|t| t.id) == Some(id) {
            self.unload_track();
        }
        Ok(())
    }

    // ---- Waveform events ----

    pub async fn handle_event(&mut self, event: WaveformEvent) {
        debug!("Waveform event: {:?}", event);
        match event {
            WaveformEvent::Ready { duration } => {
                let duration = Some(duration).filter(|d| d.is_finite() && *d > 0.0);
                self.regions.set_duration(duration);
                self.playback.set_duration(duration);
                if let Some(track) = self.track.as_mut() {
                    track.duration = duration;
                }
            }
            WaveformEvent::RegionCreated(spec) | WaveformEvent::RegionUpdated(spec)
                if self.regions.contains(&spec.id) =>
            {
                self.on_region_updated(spec).await;
            }
            WaveformEvent::RegionCreated(spec) | WaveformEvent::RegionUpdated(spec) => {
                self.on_region_created(spec).await;
            }
            WaveformEvent::RegionClicked { id } => {
                if let Err(e) = self.select_region(&id).await {
                    debug!("Ignoring click on {}: {}", id, e);
                    return;
                }
                if let Some(region) = self.regions.get(&id) {
                    self.transport.play_region(region.start, region.end);
                }
            }
            WaveformEvent::RegionOut { id } => {
                if let Some(command) = self.playback.on_region_out(&self.regions, &id) {
                    self.transport.send(command);
                }
            }
            WaveformEvent::Seek { progress } => {
                self.playback.seek_progress(progress);
            }
            WaveformEvent::TimeUpdate { time } => self.playback.set_position(time),
            WaveformEvent::Play => self.playback.set_playing(true),
            WaveformEvent::Pause => self.playback.set_playing(false),
            WaveformEvent::Finish => {
                let command = self.playback.on_finish();
                self.transport.send(command);
            }
        }
    }

    async fn on_region_created(&mut self, spec: RegionSpec) {
        if self.track.is_none() {
            warn!("Region {} drawn with no track loaded", spec.id);
            self.view.remove_region(&spec.id);
            return;
        }
        match self
            .regions
            .insert_region(&spec.id, spec.start, spec.end, spec.label.as_deref())
        {
            Ok(region) => {
                self.view.update_region(&region);
                if let Err(e) = self.activate(&region.id).await {
                    warn!("Could not activate new region {}: {}", region.id, e);
                }
            }
            Err(e) => {
                warn!("Rejected new region {}: {}", spec.id, e);
                self.view.remove_region(&spec.id);
            }
        }
    }

    async fn on_region_updated(&mut self, spec: RegionSpec) {
        let update = RegionUpdate {
            start: Some(spec.start),
            end: Some(spec.end),
            label: spec.label,
        };
        match self.regions.update_region(&spec.id, update) {
            Ok(region) => self.persist_region(&region).await,
            Err(e) => {
                warn!("Rejected update of region {}: {}", spec.id, e);
                // Put the drawn region back where the store has it
                if let Some(region) = self.regions.get(&spec.id) {
                    self.view.update_region(region);
                }
            }
        }
    }

    // ---- User operations ----

    /// Create a region from form input and make it active
    pub async fn create_region(
        &mut self,
        start: f64,
        end: f64,
        label: Option<&str>,
    ) -> Result<Region, SessionError> {
        self.loaded_track_id()?;
        let region = self.regions.add_region(start, end, label)?;
        self.view.add_region(&region);
        self.activate(&region.id).await?;
        Ok(self.regions.get(&region.id).cloned().unwrap_or(region))
    }

    /// Edit start, end, or label; the active region does not change
    pub async fn update_region(
        &mut self,
        id: &str,
        update: RegionUpdate,
    ) -> Result<Region, SessionError> {
        let region = self.regions.update_region(id, update)?;
        self.view.update_region(&region);
        self.persist_region(&region).await;
        Ok(region)
    }

    pub async fn rename_region(&mut self, id: &str, label: &str) -> Result<Region, SessionError> {
        self.update_region(id, RegionUpdate::label(label)).await
    }

    /// Remove a region and its snippet; unknown ids are a no-op
    pub async fn remove_region(&mut self, id: &str) -> Option<Region> {
        let removed = self.regions.remove_region(id)?;
        self.playback.forget_region(id);
        self.view.remove_region(id);

        if let Some(track_id) = self.track.as_ref().map(|t| t.id) {
            if let Err(e) = self.library.delete_snippet(id, track_id).await {
                self.report_persistence_failure("delete snippet", &e);
            }
        }
        Some(removed)
    }

    /// Make a region the active one without starting playback
    pub async fn select_region(&mut self, id: &str) -> Result<(), SessionError> {
        self.activate(id).await?;
        Ok(())
    }

    pub async fn set_loop_mode(&mut self, mode: LoopMode) {
        let change = self.playback.set_loop_mode(mode, &mut self.regions);
        self.persist_activation(&change).await;
    }

    pub fn play_pause(&mut self) {
        let command = self.playback.play_pause(&self.regions);
        self.transport.send(command);
    }

    pub fn skip(&mut self, offset: f64) {
        let command = self.playback.skip(offset);
        self.transport.send(command);
    }

    pub fn seek_to(&mut self, time: f64) {
        let command = self.playback.seek_to(time);
        self.transport.send(command);
    }

    /// Add regions from share text
    ///
    /// Every imported region is stored inactive; the last one then becomes
    /// the active region.
    pub async fn import_snippets(&mut self, text: &str) -> Result<ImportReport, SessionError> {
        self.loaded_track_id()?;
        let parsed = parse_snippets(text);
        let mut report = ImportReport {
            imported: Vec::new(),
            skipped: parsed.skipped,
        };

        for snippet in parsed.snippets {
            match self
                .regions
                .add_region(snippet.start, snippet.end, Some(&snippet.name))
            {
                Ok(region) => {
                    self.view.add_region(&region);
                    self.persist_region(&region).await;
                    report.imported.push(region.id);
                }
                Err(e) => report.skipped.push(SkippedLine {
                    line_number: snippet.line_number,
                    reason: e.to_string(),
                }),
            }
        }
        report.skipped.sort_by_key(|s| s.line_number);

        if let Some(last) = report.imported.last().cloned() {
            self.activate(&last).await?;
        }
        info!(
            "Imported {} snippets, skipped {} lines",
            report.imported.len(),
            report.skipped.len()
        );
        Ok(report)
    }

    /// Current regions as share text
    pub fn export_snippets(&self) -> String {
        format_snippets(self.regions.list())
    }

    /// Cut one region out of the loaded track
    pub async fn export_region(
        &self,
        id: &str,
        transcoder: &dyn Transcoder,
    ) -> Result<ExportedClip, SessionError> {
        let track = self.track.as_ref().ok_or(SessionError::NoTrack)?;
        let region = self
            .regions
            .get(id)
            .ok_or_else(|| RegionError::NotFound(id.to_string()))?;

        match ExportService::export_clip(&track.file_name, &track.data, region, transcoder).await {
            Ok(clip) => Ok(clip),
            Err(e) => {
                error!("Export of region {} failed: {}", id, e);
                self.notices.publish(Notice::ExportFailed {
                    message: e.to_string(),
                });
                Err(e.into())
            }
        }
    }

    // ---- Persistence ----

    /// Swap the active region in memory, then mirror it to the store
    async fn activate(&mut self, id: &str) -> Result<(), RegionError> {
        let change = self.regions.set_active(id)?;
        self.persist_activation(&change).await;
        Ok(())
    }

    /// The deactivation write completes before the activation write starts
    async fn persist_activation(&self, change: &ActivationChange) {
        if let Some(previous) = &change.deactivated {
            if let Some(region) = self.regions.get(previous) {
                self.view.update_region(region);
            }
            if let Some(track_id) = self.track.as_ref().map(|t| t.id) {
                if let Err(e) = self
                    .library
                    .set_snippet_active(previous, track_id, false)
                    .await
                {
                    self.report_persistence_failure("deactivate snippet", &e);
                }
            }
        }

        if let Some(current) = &change.activated {
            if let Some(region) = self.regions.get(current) {
                self.view.update_region(region);
                self.persist_region(region).await;
            }
        }
    }

    async fn persist_region(&self, region: &Region) {
        let Some(track_id) = self.track.as_ref().map(|t| t.id) else {
            return;
        };
        let record = SnippetRecord {
            audio_file_id: track_id,
            region_id: region.id.clone(),
            start_time: region.start,
            end_time: region.end,
            name: region.label.clone(),
            is_active: region.is_active,
        };
        if let Err(e) = self.library.upsert_snippet(&record).await {
            self.report_persistence_failure("save snippet", &e);
        }
    }

    fn report_persistence_failure(&self, operation: &str, error: &LibraryError) {
        warn!("Failed to {}: {}", operation, error);
        self.notices.publish(Notice::PersistenceFailed {
            operation: operation.to_string(),
            message: error.to_string(),
        });
    }

    fn loaded_track_id(&self) -> Result<i64, SessionError> {
        self.track.as_ref().map(|t| t.id).ok_or(SessionError::NoTrack)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::library::LibraryManager;
    use crate::playback::PlaybackCommand;
    use crate::waveform::WaveformCommand;

    struct Session {
        bridge: WaveformBridge,
        library: Arc<LibraryManager>,
        track_id: i64,
        view_rx: tokio_mpsc::UnboundedReceiver<WaveformCommand>,
        transport_rx: tokio_mpsc::UnboundedReceiver<PlaybackCommand>,
    }

    async fn session() -> Session {
        let library = Arc::new(LibraryManager::new(Database::new_in_memory().await.unwrap()));
        let track_id = library.add_track("song.mp3", vec![0u8; 16]).await.unwrap();
        let (view, view_rx) = WaveformHandle::channel();
        let (transport, transport_rx) = PlaybackHandle::channel();
        let mut bridge = WaveformBridge::new(library.clone(), view, transport);
        bridge.activate_track(track_id).await.unwrap();
        Session {
            bridge,
            library,
            track_id,
            view_rx,
            transport_rx,
        }
    }

    fn spec(id: &str, start: f64, end: f64) -> RegionSpec {
        RegionSpec {
            id: id.to_string(),
            start,
            end,
            label: None,
        }
    }

    #[tokio::test]
    async fn test_create_region_persists_active_snippet() {
        let mut s = session().await;
        let region = s.bridge.create_region(10.0, 20.5, Some("Intro")).await.unwrap();

        assert!(region.is_active);
        let snippets = s.library.list_snippets_for_track(s.track_id).await.unwrap();
        assert_eq!(snippets.len(), 1);
        assert_eq!(snippets[0].start_time, 10.0);
        assert_eq!(snippets[0].end_time, 20.5);
        assert_eq!(snippets[0].name, "Intro");
        assert!(snippets[0].is_active);
    }

    #[tokio::test]
    async fn test_drawn_region_replaces_active_one() {
        let mut s = session().await;
        s.bridge
            .handle_event(WaveformEvent::RegionCreated(spec("a", 1.0, 2.0)))
            .await;
        s.bridge
            .handle_event(WaveformEvent::RegionCreated(spec("b", 3.0, 4.0)))
            .await;

        assert_eq!(s.bridge.regions().active_id(), Some("b"));
        let active: Vec<String> = s
            .library
            .list_snippets_for_track(s.track_id)
            .await
            .unwrap()
            .into_iter()
            .filter(|snippet| snippet.is_active)
            .map(|snippet| snippet.region_id)
            .collect();
        assert_eq!(active, vec!["b".to_string()]);
    }

    #[tokio::test]
    async fn test_invalid_drag_restores_stored_geometry() {
        let mut s = session().await;
        s.bridge
            .handle_event(WaveformEvent::RegionCreated(spec("a", 1.0, 2.0)))
            .await;
        while s.view_rx.try_recv().is_ok() {}

        s.bridge
            .handle_event(WaveformEvent::RegionUpdated(spec("a", 5.0, 4.0)))
            .await;

        let region = s.bridge.regions().get("a").unwrap();
        assert_eq!((region.start, region.end), (1.0, 2.0));
        match s.view_rx.try_recv().unwrap() {
            WaveformCommand::UpdateRegion(view) => assert_eq!((view.start, view.end), (1.0, 2.0)),
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_click_activates_and_plays_region() {
        let mut s = session().await;
        s.bridge
            .handle_event(WaveformEvent::RegionCreated(spec("a", 1.0, 2.0)))
            .await;
        s.bridge
            .handle_event(WaveformEvent::RegionCreated(spec("b", 3.0, 4.0)))
            .await;

        s.bridge
            .handle_event(WaveformEvent::RegionClicked {
                id: "a".to_string(),
            })
            .await;

        assert_eq!(s.bridge.regions().active_id(), Some("a"));
        assert_eq!(
            s.transport_rx.try_recv().unwrap(),
            PlaybackCommand::PlayRegion { start: 1.0, end: 2.0 }
        );
    }

    #[tokio::test]
    async fn test_region_without_track_is_removed_from_view() {
        let library = Arc::new(LibraryManager::new(Database::new_in_memory().await.unwrap()));
        let (view, mut view_rx) = WaveformHandle::channel();
        let (transport, _transport_rx) = PlaybackHandle::channel();
        let mut bridge = WaveformBridge::new(library, view, transport);

        bridge
            .handle_event(WaveformEvent::RegionCreated(spec("a", 1.0, 2.0)))
            .await;

        assert!(bridge.regions().is_empty());
        assert_eq!(
            view_rx.try_recv().unwrap(),
            WaveformCommand::RemoveRegion {
                id: "a".to_string()
            }
        );
        assert!(matches!(
            bridge.create_region(1.0, 2.0, None).await,
            Err(SessionError::NoTrack)
        ));
    }

    #[tokio::test]
    async fn test_remove_region_deletes_snippet() {
        let mut s = session().await;
        let region = s.bridge.create_region(1.0, 2.0, None).await.unwrap();

        assert!(s.bridge.remove_region(&region.id).await.is_some());
        assert!(s.bridge.remove_region(&region.id).await.is_none());
        assert!(s
            .library
            .list_snippets_for_track(s.track_id)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_finish_in_track_loop_restarts() {
        let mut s = session().await;
        s.bridge.set_loop_mode(LoopMode::LoopTrack).await;
        s.bridge.handle_event(WaveformEvent::Finish).await;

        assert_eq!(s.transport_rx.try_recv().unwrap(), PlaybackCommand::PlayFrom(0.0));
    }
}
