use crate::playback::PlaybackCommand;
use crate::regions::{ActivationChange, RegionId, RegionStore};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, info};

/// What happens when playback reaches a boundary
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LoopMode {
    #[default]
    Off,
    /// Replay the active region when playback leaves it
    LoopSnippet,
    /// Restart the track when it finishes
    LoopTrack,
}

impl LoopMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoopMode::Off => "",
            LoopMode::LoopSnippet => "snippet",
            LoopMode::LoopTrack => "track",
        }
    }
}

impl fmt::Display for LoopMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoopMode::Off => f.write_str("off"),
            other => f.write_str(other.as_str()),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("Unknown loop mode: {0}")]
pub struct ParseLoopModeError(pub String);

impl FromStr for LoopMode {
    type Err = ParseLoopModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" | "off" => Ok(LoopMode::Off),
            "snippet" => Ok(LoopMode::LoopSnippet),
            "track" => Ok(LoopMode::LoopTrack),
            other => Err(ParseLoopModeError(other.to_string())),
        }
    }
}

/// Last known state of the external transport
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransportState {
    pub position: f64,
    pub duration: Option<f64>,
    pub playing: bool,
}

/// Loop-mode state machine and transport decisions
///
/// Decisions are returned as commands; the caller forwards them to the audio
/// engine. The active region is always read from the `RegionStore`, never
/// cached here, except for the region suspended while looping is off.
#[derive(Debug, Default)]
pub struct PlaybackCoordinator {
    loop_mode: LoopMode,
    transport: TransportState,
    /// Region deactivated by leaving `LoopSnippet`, restored on return
    suspended_region: Option<RegionId>,
}

impl PlaybackCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn loop_mode(&self) -> LoopMode {
        self.loop_mode
    }

    pub fn transport(&self) -> &TransportState {
        &self.transport
    }

    pub fn suspended_region(&self) -> Option<&str> {
        self.suspended_region.as_deref()
    }

    pub fn set_duration(&mut self, duration: Option<f64>) {
        self.transport.duration = duration.filter(|d| d.is_finite() && *d > 0.0);
        self.transport.position = self.clamp_time(self.transport.position);
    }

    pub fn set_position(&mut self, time: f64) {
        self.transport.position = self.clamp_time(time);
    }

    pub fn set_playing(&mut self, playing: bool) {
        self.transport.playing = playing;
    }

    /// Apply a seek expressed as a fraction of the track, returning seconds
    ///
    /// Without a known duration the position is left unchanged.
    pub fn seek_progress(&mut self, progress: f64) -> f64 {
        if let Some(duration) = self.transport.duration {
            let fraction = if progress.is_finite() {
                progress.clamp(0.0, 1.0)
            } else {
                0.0
            };
            self.transport.position = fraction * duration;
        }
        self.transport.position
    }

    /// Switch loop mode, updating which region is active
    ///
    /// Leaving `LoopSnippet` deactivates the active region and remembers it;
    /// entering `LoopSnippet` restores it unless another region has become
    /// active meanwhile.
    pub fn set_loop_mode(&mut self, mode: LoopMode, regions: &mut RegionStore) -> ActivationChange {
        if mode == self.loop_mode {
            return ActivationChange::default();
        }
        info!("Loop mode {} -> {}", self.loop_mode, mode);
        self.loop_mode = mode;

        let mut change = ActivationChange::default();
        match mode {
            LoopMode::LoopSnippet => {
                if regions.active_id().is_some() {
                    self.suspended_region = None;
                } else if let Some(id) = self.suspended_region.take() {
                    match regions.set_active(&id) {
                        Ok(activation) => change = activation,
                        Err(e) => debug!("Suspended region no longer available: {}", e),
                    }
                }
            }
            LoopMode::Off | LoopMode::LoopTrack => {
                if let Some(previous) = regions.deactivate() {
                    self.suspended_region = Some(previous.clone());
                    change.deactivated = Some(previous);
                }
            }
        }
        change
    }

    /// Playback left region `id`
    pub fn on_region_out(&self, regions: &RegionStore, id: &str) -> Option<PlaybackCommand> {
        if self.loop_mode != LoopMode::LoopSnippet || regions.active_id() != Some(id) {
            return None;
        }
        let region = regions.get(id)?;
        debug!("Looping region {} from {:.3}", id, region.start);
        Some(PlaybackCommand::PlayRegion {
            start: region.start,
            end: region.end,
        })
    }

    /// The track played to its end
    pub fn on_finish(&mut self) -> PlaybackCommand {
        if self.loop_mode == LoopMode::LoopTrack {
            self.transport.position = 0.0;
            self.transport.playing = true;
            PlaybackCommand::PlayFrom(0.0)
        } else {
            self.transport.playing = false;
            PlaybackCommand::Stop
        }
    }

    /// Decide what a play/pause press does
    ///
    /// When looping a snippet from a paused play-head outside the active
    /// region, playback starts at the region instead of resuming in place.
    pub fn play_pause(&self, regions: &RegionStore) -> PlaybackCommand {
        if self.loop_mode == LoopMode::LoopSnippet && !self.transport.playing {
            if let Some(region) = regions.active() {
                if !region.contains(self.transport.position) {
                    return PlaybackCommand::PlayRegion {
                        start: region.start,
                        end: region.end,
                    };
                }
            }
        }
        PlaybackCommand::TogglePlayPause
    }

    /// Seek relative to the current position, clamped to the track
    pub fn skip(&mut self, offset: f64) -> PlaybackCommand {
        let target = if offset.is_finite() {
            self.transport.position + offset
        } else {
            self.transport.position
        };
        self.seek_to(target)
    }

    /// Seek to an absolute time, clamped to the track
    pub fn seek_to(&mut self, time: f64) -> PlaybackCommand {
        self.transport.position = self.clamp_time(time);
        PlaybackCommand::Seek(self.transport.position)
    }

    /// Drop any memory of a removed region
    pub fn forget_region(&mut self, id: &str) {
        if self.suspended_region.as_deref() == Some(id) {
            self.suspended_region = None;
        }
    }

    /// Track switch: forget transport and suspended region, keep loop mode
    pub fn reset(&mut self) {
        self.transport = TransportState::default();
        self.suspended_region = None;
    }

    fn clamp_time(&self, time: f64) -> f64 {
        if !time.is_finite() || time < 0.0 {
            return 0.0;
        }
        match self.transport.duration {
            Some(duration) => time.min(duration),
            None => time,
        }
    }
}
