#![allow(dead_code)]

use snipper::db::Database;
use snipper::playback::{PlaybackCommand, PlaybackHandle};
use snipper::waveform::{WaveformCommand, WaveformHandle};
use snipper::{LibraryManager, PersistenceGateway, WaveformBridge};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::mpsc as tokio_mpsc;

/// Initialize tracing for tests with proper test output handling
pub fn tracing_init() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Library backed by a database file in a fresh temp dir
///
/// Keep the `TempDir` alive for as long as the library is used.
pub async fn file_library() -> (Arc<LibraryManager>, Database, TempDir) {
    tracing_init();

    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test.db");
    let database = Database::new(db_path.to_str().unwrap())
        .await
        .expect("Failed to create database");
    let library = Arc::new(LibraryManager::new(database.clone()));

    (library, database, temp_dir)
}

pub struct TestSession {
    pub bridge: WaveformBridge,
    pub view_rx: tokio_mpsc::UnboundedReceiver<WaveformCommand>,
    pub transport_rx: tokio_mpsc::UnboundedReceiver<PlaybackCommand>,
}

impl TestSession {
    pub fn new(library: Arc<dyn PersistenceGateway>) -> Self {
        let (view, view_rx) = WaveformHandle::channel();
        let (transport, transport_rx) = PlaybackHandle::channel();
        TestSession {
            bridge: WaveformBridge::new(library, view, transport),
            view_rx,
            transport_rx,
        }
    }

    /// Transport commands sent since the last call
    pub fn drain_transport(&mut self) -> Vec<PlaybackCommand> {
        let mut commands = Vec::new();
        while let Ok(command) = self.transport_rx.try_recv() {
            commands.push(command);
        }
        commands
    }

    pub fn drain_view(&mut self) -> Vec<WaveformCommand> {
        let mut commands = Vec::new();
        while let Ok(command) = self.view_rx.try_recv() {
            commands.push(command);
        }
        commands
    }
}

/// Minimal 16-bit mono PCM WAV of `seconds` length
pub fn wav_bytes(seconds: u32) -> Vec<u8> {
    let sample_rate: u32 = 8000;
    let data_len = sample_rate * seconds * 2;
    let mut out = Vec::new();
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data_len).to_le_bytes());
    out.extend_from_slice(b"WAVE");
    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&sample_rate.to_le_bytes());
    out.extend_from_slice(&(sample_rate * 2).to_le_bytes());
    out.extend_from_slice(&2u16.to_le_bytes());
    out.extend_from_slice(&16u16.to_le_bytes());
    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());
    out.resize(out.len() + data_len as usize, 0);
    out
}
