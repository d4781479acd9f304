// Library exports for the CLI host and integration tests

pub mod config;

pub mod audio_probe;
pub mod db;
pub mod library;
pub mod notify;
pub mod playback;
pub mod regions;
pub mod snippet_text;
pub mod time_codec;
pub mod waveform;

pub use library::{LibraryError, LibraryManager, PersistenceGateway};
pub use playback::{LoopMode, PlaybackCommand, PlaybackCoordinator};
pub use regions::{Region, RegionError, RegionId, RegionStore};
pub use waveform::{WaveformBridge, WaveformEvent};

// Test support (only available with test-utils feature)
#[cfg(feature = "test-utils")]
pub mod test_support;
