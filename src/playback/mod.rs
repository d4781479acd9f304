mod coordinator;

pub use coordinator::{LoopMode, ParseLoopModeError, PlaybackCoordinator, TransportState};

use tokio::sync::mpsc as tokio_mpsc;

/// Transport commands sent to the external audio engine
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackCommand {
    /// Play `[start, end]` and stop at `end`
    PlayRegion { start: f64, end: f64 },
    PlayFrom(f64),
    TogglePlayPause,
    Seek(f64),
    Stop,
}

/// Handle for sending commands to the audio engine
#[derive(Clone, Debug)]
pub struct PlaybackHandle {
    command_tx: tokio_mpsc::UnboundedSender<PlaybackCommand>,
}

impl PlaybackHandle {
    /// Create a handle and the receiver the audio engine drains
    pub fn channel() -> (Self, tokio_mpsc::UnboundedReceiver<PlaybackCommand>) {
        let (command_tx, command_rx) = tokio_mpsc::unbounded_channel();
        (PlaybackHandle { command_tx }, command_rx)
    }

    pub fn send(&self, command: PlaybackCommand) {
        let _ = self.command_tx.send(command);
    }

    pub fn play_region(&self, start: f64, end: f64) {
        self.send(PlaybackCommand::PlayRegion { start, end });
    }
}
