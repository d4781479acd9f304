use crate::notify::EventHub;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc as tokio_mpsc;
use tracing::debug;
use uuid::Uuid;

pub const DEFAULT_REGION_LABEL: &str = "New Region";

pub type RegionId = String;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegionError {
    #[error("Region not found: {0}")]
    NotFound(RegionId),
    #[error("Invalid range: start {start} must be before end {end} and within the track")]
    InvalidRange { start: f64, end: f64 },
    #[error("Region already exists: {0}")]
    DuplicateId(RegionId),
}

/// A labelled time interval over the loaded track
///
/// `0 <= start < end <= duration` holds for every region in a store.
/// Regions may overlap each other.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub id: RegionId,
    pub start: f64,
    pub end: f64,
    pub label: String,
    pub is_active: bool,
}

impl Region {
    pub fn contains(&self, time: f64) -> bool {
        time >= self.start && time <= self.end
    }
}

/// Partial update for a region; `None` fields are left as they are
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegionUpdate {
    pub start: Option<f64>,
    pub end: Option<f64>,
    pub label: Option<String>,
}

impl RegionUpdate {
    pub fn range(start: f64, end: f64) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
            label: None,
        }
    }

    pub fn label(label: impl Into<String>) -> Self {
        Self {
            label: Some(label.into()),
            ..Default::default()
        }
    }
}

/// Which regions had their active flag flipped by one store call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActivationChange {
    pub deactivated: Option<RegionId>,
    pub activated: Option<RegionId>,
}

impl ActivationChange {
    pub fn is_empty(&self) -> bool {
        self.deactivated.is_none() && self.activated.is_none()
    }
}

/// Change notifications published by the store
#[derive(Debug, Clone, PartialEq)]
pub enum RegionChange {
    Added(RegionId),
    Updated(RegionId),
    Removed(RegionId),
    ActiveChanged {
        previous: Option<RegionId>,
        current: Option<RegionId>,
    },
    Cleared,
}

/// Authoritative in-memory regions of the loaded track
///
/// Holds the only "active region" pointer in the process. Regions are kept in
/// insertion order. At most one region has `is_active` set, and activation
/// swaps the flag inside a single `&mut self` call so no caller can observe
/// zero or two active regions in between.
#[derive(Debug, Default)]
pub struct RegionStore {
    regions: Vec<Region>,
    active: Option<RegionId>,
    /// Track duration in seconds, once known
    duration: Option<f64>,
    changes: EventHub<RegionChange>,
}

impl RegionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to change notifications (re-render signal for views)
    pub fn subscribe(&self) -> tokio_mpsc::UnboundedReceiver<RegionChange> {
        self.changes.subscribe()
    }

    pub fn duration(&self) -> Option<f64> {
        self.duration
    }

    /// Set the duration used to bound region ends. Existing regions are not
    /// re-validated.
    pub fn set_duration(&mut self, duration: Option<f64>) {
        self.duration = duration.filter(|d| d.is_finite() && *d > 0.0);
    }

    /// Create a region with a fresh id. Does not activate it.
    pub fn add_region(
        &mut self,
        start: f64,
        end: f64,
        label: Option<&str>,
    ) -> Result<Region, RegionError> {
        let id = Uuid::new_v4().to_string();
        self.insert_region(&id, start, end, label)
    }

    /// Insert a region under an id chosen elsewhere (waveform or persisted
    /// snippet). Does not activate it.
    pub fn insert_region(
        &mut self,
        id: &str,
        start: f64,
        end: f64,
        label: Option<&str>,
    ) -> Result<Region, RegionError> {
        if self.contains(id) {
            return Err(RegionError::DuplicateId(id.to_string()));
        }
        self.validate_range(start, end)?;

        let region = Region {
            id: id.to_string(),
            start,
            end,
            label: normalize_label(label),
            is_active: false,
        };
        debug!(
            "Adding region {} [{:.3}, {:.3}] '{}'",
            region.id, region.start, region.end, region.label
        );
        self.regions.push(region.clone());
        self.changes.publish(RegionChange::Added(region.id.clone()));
        Ok(region)
    }

    /// Merge `update` into region `id`
    ///
    /// When the update moves either edge the merged range must still be
    /// valid; otherwise the region is left untouched. A label-only update
    /// never re-checks the range.
    pub fn update_region(&mut self, id: &str, update: RegionUpdate) -> Result<Region, RegionError> {
        let index = self
            .position(id)
            .ok_or_else(|| RegionError::NotFound(id.to_string()))?;

        let current = &self.regions[index];
        let start = update.start.unwrap_or(current.start);
        let end = update.end.unwrap_or(current.end);
        if update.start.is_some() || update.end.is_some() {
            self.validate_range(start, end)?;
        }

        let region = &mut self.regions[index];
        region.start = start;
        region.end = end;
        if let Some(label) = update.label {
            region.label = normalize_label(Some(&label));
        }
        let updated = region.clone();

        self.changes.publish(RegionChange::Updated(updated.id.clone()));
        Ok(updated)
    }

    /// Remove a region. Unknown ids are ignored and return `None`.
    pub fn remove_region(&mut self, id: &str) -> Option<Region> {
        let index = self.position(id)?;
        let removed = self.regions.remove(index);

        if self.active.as_deref() == Some(id) {
            self.active = None;
            self.changes.publish(RegionChange::ActiveChanged {
                previous: Some(removed.id.clone()),
                current: None,
            });
        }
        self.changes.publish(RegionChange::Removed(removed.id.clone()));
        Some(removed)
    }

    /// Make `id` the single active region
    ///
    /// The previous active region is deactivated in the same call.
    /// Activating the already-active region is a no-op.
    pub fn set_active(&mut self, id: &str) -> Result<ActivationChange, RegionError> {
        let index = self
            .position(id)
            .ok_or_else(|| RegionError::NotFound(id.to_string()))?;

        if self.active.as_deref() == Some(id) {
            return Ok(ActivationChange::default());
        }

        let previous = self.active.take();
        if let Some(prev_id) = &previous {
            if let Some(prev_index) = self.position(prev_id) {
                self.regions[prev_index].is_active = false;
            }
        }
        self.regions[index].is_active = true;
        self.active = Some(id.to_string());

        self.changes.publish(RegionChange::ActiveChanged {
            previous: previous.clone(),
            current: self.active.clone(),
        });

        Ok(ActivationChange {
            deactivated: previous,
            activated: Some(id.to_string()),
        })
    }

    /// Clear the active pointer, returning the region that was active
    pub fn deactivate(&mut self) -> Option<RegionId> {
        let previous = self.active.take()?;
        if let Some(index) = self.position(&previous) {
            self.regions[index].is_active = false;
        }
        self.changes.publish(RegionChange::ActiveChanged {
            previous: Some(previous.clone()),
            current: None,
        });
        Some(previous)
    }

    /// Drop every region and the active pointer (track switch)
    pub fn clear(&mut self) {
        self.regions.clear();
        self.active = None;
        self.duration = None;
        self.changes.publish(RegionChange::Cleared);
    }

    /// Regions in insertion order
    pub fn list(&self) -> &[Region] {
        &self.regions
    }

    pub fn get(&self, id: &str) -> Option<&Region> {
        self.regions.iter().find(|r| r.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.position(id).is_some()
    }

    pub fn active_id(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn active(&self) -> Option<&Region> {
        self.active.as_deref().and_then(|id| self.get(id))
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.regions.iter().position(|r| r.id == id)
    }

    fn validate_range(&self, start: f64, end: f64) -> Result<(), RegionError> {
        let within_track = self.duration.map_or(true, |duration| end <= duration);
        if start.is_finite() && end.is_finite() && start >= 0.0 && start < end && within_track {
            Ok(())
        } else {
            Err(RegionError::InvalidRange { start, end })
        }
    }
}

fn normalize_label(label: Option<&str>) -> String {
    match label.map(str::trim) {
        Some(label) if !label.is_empty() => label.to_string(),
        _ => DEFAULT_REGION_LABEL.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn active_count(store: &RegionStore) -> usize {
        store.list().iter().filter(|r| r.is_active).count()
    }

    #[test]
    fn test_add_region_defaults_label_and_stays_inactive() {
        let mut store = RegionStore::new();
        let region = store.add_region(1.0, 2.0, None).unwrap();

        assert_eq!(region.label, DEFAULT_REGION_LABEL);
        assert!(!region.is_active);
        assert_eq!(store.active_id(), None);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_add_region_generates_unique_ids() {
        let mut store = RegionStore::new();
        let a = store.add_region(0.0, 1.0, Some("A")).unwrap();
        let b = store.add_region(0.0, 1.0, Some("B")).unwrap();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_invalid_ranges_rejected() {
        let mut store = RegionStore::new();
        assert!(matches!(
            store.add_region(5.0, 5.0, None),
            Err(RegionError::InvalidRange { .. })
        ));
        assert!(matches!(
            store.add_region(-1.0, 5.0, None),
            Err(RegionError::InvalidRange { .. })
        ));

        store.set_duration(Some(30.0));
        assert!(matches!(
            store.add_region(10.0, 31.0, None),
            Err(RegionError::InvalidRange { .. })
        ));
        assert!(store.add_region(10.0, 30.0, None).is_ok());
    }

    #[test]
    fn test_update_region_rejects_inverted_range_and_keeps_state() {
        let mut store = RegionStore::new();
        let region = store.add_region(10.0, 20.0, Some("Intro")).unwrap();

        let result = store.update_region(&region.id, RegionUpdate::range(25.0, 20.0));
        assert!(matches!(result, Err(RegionError::InvalidRange { .. })));

        let unchanged = store.get(&region.id).unwrap();
        assert_eq!(unchanged.start, 10.0);
        assert_eq!(unchanged.end, 20.0);
    }

    #[test]
    fn test_update_region_merges_fields() {
        let mut store = RegionStore::new();
        let region = store.add_region(10.0, 20.0, Some("Intro")).unwrap();

        let updated = store
            .update_region(
                &region.id,
                RegionUpdate {
                    end: Some(22.5),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!((updated.start, updated.end), (10.0, 22.5));
        assert_eq!(updated.label, "Intro");

        let renamed = store
            .update_region(&region.id, RegionUpdate::label("Verse"))
            .unwrap();
        assert_eq!(renamed.label, "Verse");
    }

    #[test]
    fn test_rename_ignores_shorter_duration() {
        let mut store = RegionStore::new();
        let region = store.insert_region("r", 5.0, 12.0, Some("Old")).unwrap();
        store.set_duration(Some(11.9));

        let renamed = store
            .update_region(&region.id, RegionUpdate::label("New"))
            .unwrap();
        assert_eq!(renamed.label, "New");
        assert_eq!((renamed.start, renamed.end), (5.0, 12.0));

        assert!(matches!(
            store.update_region(&region.id, RegionUpdate::range(5.0, 12.0)),
            Err(RegionError::InvalidRange { .. })
        ));
    }

    #[test]
    fn test_update_missing_region_is_not_found() {
        let mut store = RegionStore::new();
        assert_eq!(
            store.update_region("nope", RegionUpdate::label("x")),
            Err(RegionError::NotFound("nope".to_string()))
        );
    }

    #[test]
    fn test_overlapping_regions_allowed() {
        let mut store = RegionStore::new();
        store.add_region(0.0, 10.0, None).unwrap();
        store.add_region(5.0, 15.0, None).unwrap();
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_set_active_swaps_atomically() {
        let mut store = RegionStore::new();
        let a = store.add_region(0.0, 1.0, Some("A")).unwrap();
        let b = store.add_region(1.0, 2.0, Some("B")).unwrap();

        let change = store.set_active(&a.id).unwrap();
        assert_eq!(change.deactivated, None);
        assert_eq!(change.activated.as_deref(), Some(a.id.as_str()));

        let change = store.set_active(&b.id).unwrap();
        assert_eq!(change.deactivated.as_deref(), Some(a.id.as_str()));
        assert!(!store.get(&a.id).unwrap().is_active);
        assert!(store.get(&b.id).unwrap().is_active);
        assert_eq!(active_count(&store), 1);
    }

    #[test]
    fn test_single_active_invariant_over_sequence() {
        let mut store = RegionStore::new();
        let mut ids = Vec::new();
        for i in 0..6 {
            let region = store.add_region(i as f64, i as f64 + 1.0, None).unwrap();
            ids.push(region.id);
            for id in ids.iter().rev().step_by(2) {
                store.set_active(id).unwrap();
                assert!(active_count(&store) <= 1);
            }
        }
        assert_eq!(active_count(&store), 1);
    }

    #[test]
    fn test_set_active_missing_region() {
        let mut store = RegionStore::new();
        assert!(matches!(
            store.set_active("missing"),
            Err(RegionError::NotFound(_))
        ));
    }

    #[test]
    fn test_remove_active_region_clears_pointer() {
        let mut store = RegionStore::new();
        let a = store.add_region(0.0, 1.0, None).unwrap();
        store.set_active(&a.id).unwrap();

        let removed = store.remove_region(&a.id);
        assert!(removed.is_some());
        assert_eq!(store.active_id(), None);
        assert!(store.remove_region(&a.id).is_none());
    }

    #[test]
    fn test_list_keeps_insertion_order() {
        let mut store = RegionStore::new();
        store.add_region(50.0, 60.0, Some("late")).unwrap();
        store.add_region(1.0, 2.0, Some("early")).unwrap();

        let labels: Vec<&str> = store.list().iter().map(|r| r.label.as_str()).collect();
        assert_eq!(labels, vec!["late", "early"]);
    }

    #[test]
    fn test_clear_empties_store() {
        let mut store = RegionStore::new();
        let a = store.add_region(0.0, 1.0, None).unwrap();
        store.set_active(&a.id).unwrap();
        store.clear();

        assert!(store.is_empty());
        assert_eq!(store.active(), None);
    }

    #[test]
    fn test_changes_are_published() {
        let mut store = RegionStore::new();
        let mut rx = store.subscribe();

        let a = store.add_region(0.0, 1.0, None).unwrap();
        store.set_active(&a.id).unwrap();

        assert_eq!(rx.try_recv().unwrap(), RegionChange::Added(a.id.clone()));
        assert_eq!(
            rx.try_recv().unwrap(),
            RegionChange::ActiveChanged {
                previous: None,
                current: Some(a.id.clone()),
            }
        );
    }
}
