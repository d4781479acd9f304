mod bridge;

pub use bridge::{ImportReport, LoadedTrack, Notice, SessionError, WaveformBridge};

use crate::regions::{Region, RegionId};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc as tokio_mpsc;

/// Region geometry as reported by the waveform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionSpec {
    pub id: RegionId,
    pub start: f64,
    pub end: f64,
    #[serde(default)]
    pub label: Option<String>,
}

/// Events emitted by the external waveform renderer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum WaveformEvent {
    /// Track decoded; duration in seconds
    Ready { duration: f64 },
    RegionCreated(RegionSpec),
    RegionUpdated(RegionSpec),
    RegionClicked { id: RegionId },
    /// Playback left the region
    RegionOut { id: RegionId },
    /// User seek, as a fraction of the track
    Seek { progress: f64 },
    TimeUpdate { time: f64 },
    Play,
    Pause,
    Finish,
}

/// What the renderer needs to draw one region
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionView {
    pub id: RegionId,
    pub start: f64,
    pub end: f64,
    pub label: String,
    pub active: bool,
}

impl From<&Region> for RegionView {
    fn from(region: &Region) -> Self {
        RegionView {
            id: region.id.clone(),
            start: region.start,
            end: region.end,
            label: region.label.clone(),
            active: region.is_active,
        }
    }
}

/// Commands sent to the waveform renderer
#[derive(Debug, Clone, PartialEq)]
pub enum WaveformCommand {
    AddRegion(RegionView),
    /// Redraw with new geometry, label, or active styling
    UpdateRegion(RegionView),
    RemoveRegion { id: RegionId },
    ClearRegions,
}

#[derive(Clone, Debug)]
pub struct WaveformHandle {
    command_tx: tokio_mpsc::UnboundedSender<WaveformCommand>,
}

impl WaveformHandle {
    pub fn channel() -> (Self, tokio_mpsc::UnboundedReceiver<WaveformCommand>) {
        let (command_tx, command_rx) = tokio_mpsc::unbounded_channel();
        (WaveformHandle { command_tx }, command_rx)
    }

    pub fn add_region(&self, region: &Region) {
        let _ = self.command_tx.send(WaveformCommand::AddRegion(region.into()));
    }

    pub fn update_region(&self, region: &Region) {
        let _ = self
            .command_tx
            .send(WaveformCommand::UpdateRegion(region.into()));
    }

    pub fn remove_region(&self, id: &str) {
        let _ = self
            .command_tx
            .send(WaveformCommand::RemoveRegion { id: id.to_string() });
    }

    pub fn clear_regions(&self) {
        let _ = self.command_tx.send(WaveformCommand::ClearRegions);
    }
}
